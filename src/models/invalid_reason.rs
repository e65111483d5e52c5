//! Taxonomy of divergences for resources that belong in the index.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InvalidReason {
    ResourceNotInIndex,
    ResourceDocIdsNotInDatabase,
    ResourceDocIdsDiffer,
    XmlFilesMissingForResource,
    HtmlFilesMissingForResource,
    HtmlFilesNotInIndex,
    IndexContainsMissingFiles,
    IndexContainsResourceWithInvalidPath,
    /// No inconsistency.
    #[default]
    NotDefined,
}

impl InvalidReason {
    pub const ALL: [InvalidReason; 9] = [
        Self::ResourceNotInIndex,
        Self::ResourceDocIdsNotInDatabase,
        Self::ResourceDocIdsDiffer,
        Self::XmlFilesMissingForResource,
        Self::HtmlFilesMissingForResource,
        Self::HtmlFilesNotInIndex,
        Self::IndexContainsMissingFiles,
        Self::IndexContainsResourceWithInvalidPath,
        Self::NotDefined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResourceNotInIndex => "resource_not_in_index",
            Self::ResourceDocIdsNotInDatabase => "resource_doc_ids_not_in_database",
            Self::ResourceDocIdsDiffer => "resource_doc_ids_differ",
            Self::XmlFilesMissingForResource => "xml_files_missing_for_resource",
            Self::HtmlFilesMissingForResource => "html_files_missing_for_resource",
            Self::HtmlFilesNotInIndex => "html_files_not_in_index",
            Self::IndexContainsMissingFiles => "index_contains_missing_files",
            Self::IndexContainsResourceWithInvalidPath => {
                "index_contains_resource_with_invalid_path"
            }
            Self::NotDefined => "not_defined",
        }
    }

    /// Operator-facing description used in reports.
    pub fn description(&self) -> &'static str {
        match self {
            Self::ResourceNotInIndex => "Resource not in search index",
            Self::ResourceDocIdsNotInDatabase => "Document ids missing from database",
            Self::ResourceDocIdsDiffer => "Database and index document ids differ",
            Self::XmlFilesMissingForResource => "Source XML files missing",
            Self::HtmlFilesMissingForResource => "Rendered HTML files missing",
            Self::HtmlFilesNotInIndex => "Rendered HTML files not in index",
            Self::IndexContainsMissingFiles => "Index references files missing on disk",
            Self::IndexContainsResourceWithInvalidPath => "Index contains invalid paths",
            Self::NotDefined => "Consistent",
        }
    }

    pub fn is_inconsistent(&self) -> bool {
        *self != Self::NotDefined
    }
}

impl std::fmt::Display for InvalidReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
