//! Assigns one inconsistency reason to a resource.
//!
//! Resources that belong in the index are checked against an ordered rule
//! list where the first matching rule wins. Resources that do not belong in
//! the index must have no footprint in either the index or the database.

use serde::Serialize;
use tracing::debug;

use crate::models::{
    ContentStatus, ContentStatusCode, DocIdRange, IndexDocumentSet, InvalidReason, Resource,
};

/// Everything known about one resource at classification time.
#[derive(Debug, Clone, Copy)]
pub struct ClassifierInput<'a> {
    pub resource: &'a Resource,
    pub index_set: Option<&'a IndexDocumentSet>,
    pub db_range: Option<DocIdRange>,
    pub content: &'a ContentStatus,
    /// Id of another resource with the same isbn that belongs in the index.
    pub shared_isbn_owner: Option<i64>,
}

/// Verdict for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub should_index: bool,
    pub reason: InvalidReason,
    pub remove_from_index: bool,
    pub remove_from_db: bool,
    /// Index removal skipped because this resource shares its isbn.
    pub shared_isbn_owner: Option<i64>,
}

impl Classification {
    fn indexed(reason: InvalidReason) -> Self {
        Self {
            should_index: true,
            reason,
            remove_from_index: false,
            remove_from_db: false,
            shared_isbn_owner: None,
        }
    }

    /// Something should be repaired or reported.
    pub fn needs_remediation(&self) -> bool {
        if self.should_index {
            self.reason.is_inconsistent()
        } else {
            self.remove_from_index || self.remove_from_db
        }
    }
}

struct Rule {
    reason: InvalidReason,
    applies: fn(&ClassifierInput<'_>) -> bool,
}

const RULES: &[Rule] = &[
    Rule {
        reason: InvalidReason::ResourceNotInIndex,
        applies: |input| input.index_set.is_none(),
    },
    Rule {
        reason: InvalidReason::IndexContainsResourceWithInvalidPath,
        applies: |input| input.index_set.is_some_and(IndexDocumentSet::has_invalid_paths),
    },
    Rule {
        reason: InvalidReason::ResourceDocIdsNotInDatabase,
        applies: |input| input.db_range.is_none(),
    },
    Rule {
        reason: InvalidReason::ResourceDocIdsDiffer,
        applies: |input| match (input.index_set, input.db_range) {
            (Some(set), Some(range)) => set.range() != range,
            _ => false,
        },
    },
    Rule {
        reason: InvalidReason::XmlFilesMissingForResource,
        applies: |input| input.content.status.is_missing_source(),
    },
    Rule {
        reason: InvalidReason::HtmlFilesMissingForResource,
        applies: |input| input.content.status.is_missing_rendered(),
    },
    Rule {
        reason: InvalidReason::HtmlFilesNotInIndex,
        applies: |input| input.content.status == ContentStatusCode::HtmlFilesNotInIndex,
    },
    Rule {
        reason: InvalidReason::IndexContainsMissingFiles,
        applies: |input| input.content.status == ContentStatusCode::IndexContainsMissingFiles,
    },
];

pub fn classify(input: &ClassifierInput<'_>) -> Classification {
    let resource = input.resource;

    if resource.should_be_indexed() {
        let reason = RULES
            .iter()
            .find(|rule| (rule.applies)(input))
            .map(|rule| rule.reason)
            .unwrap_or(InvalidReason::NotDefined);
        if reason == InvalidReason::NotDefined {
            debug!(isbn = %resource.isbn, resource_id = resource.id, "doc ids match");
        }
        return Classification::indexed(reason);
    }

    let mut remove_from_index = input.index_set.is_some();
    if remove_from_index {
        if let Some(owner) = input.shared_isbn_owner {
            debug!(
                isbn = %resource.isbn,
                resource_id = resource.id,
                owner,
                "isbn belongs to another indexed resource; leaving index untouched"
            );
            remove_from_index = false;
        }
    }

    Classification {
        should_index: false,
        reason: InvalidReason::NotDefined,
        remove_from_index,
        remove_from_db: input.db_range.is_some(),
        shared_isbn_owner: input.shared_isbn_owner,
    }
}
