//! Result of comparing a resource's on-disk content with itself and the index.

use serde::{Deserialize, Serialize};

/// Outcome code of a content probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentStatusCode {
    #[default]
    Unknown,
    Exception,
    Ok,
    XmlAndHtmlOk,
    XmlDirectoryMissing,
    XmlDirectoryEmpty,
    HtmlDirectoryMissing,
    HtmlDirectoryEmpty,
    MissingHtmlFiles,
    MissingXmlFiles,
    IndexContainsMissingFiles,
    HtmlFilesNotInIndex,
    MissingHtmlGlossaryFiles,
}

impl ContentStatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Exception => "exception",
            Self::Ok => "ok",
            Self::XmlAndHtmlOk => "xml_and_html_ok",
            Self::XmlDirectoryMissing => "xml_directory_missing",
            Self::XmlDirectoryEmpty => "xml_directory_empty",
            Self::HtmlDirectoryMissing => "html_directory_missing",
            Self::HtmlDirectoryEmpty => "html_directory_empty",
            Self::MissingHtmlFiles => "missing_html_files",
            Self::MissingXmlFiles => "missing_xml_files",
            Self::IndexContainsMissingFiles => "index_contains_missing_files",
            Self::HtmlFilesNotInIndex => "html_files_not_in_index",
            Self::MissingHtmlGlossaryFiles => "missing_html_glossary_files",
        }
    }

    /// Source (XML) content is absent or incomplete.
    pub fn is_missing_source(&self) -> bool {
        matches!(
            self,
            Self::XmlDirectoryMissing | Self::XmlDirectoryEmpty | Self::MissingXmlFiles
        )
    }

    /// Rendered (HTML) content is absent or incomplete.
    pub fn is_missing_rendered(&self) -> bool {
        matches!(
            self,
            Self::HtmlDirectoryMissing
                | Self::HtmlDirectoryEmpty
                | Self::MissingHtmlFiles
                | Self::MissingHtmlGlossaryFiles
        )
    }
}

impl std::fmt::Display for ContentStatusCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Content probe result for one resource. Never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ContentStatus {
    pub status: ContentStatusCode,
    pub messages: Vec<String>,
    pub xml_file_count: u64,
    pub xml_bytes: u64,
    pub html_file_count: u64,
    pub html_bytes: u64,
    /// Source file names found on disk.
    #[serde(skip)]
    pub source_files: Vec<String>,
    /// Rendered files expected to appear in the search index.
    #[serde(skip)]
    pub indexable_html_files: Vec<String>,
}

impl ContentStatus {
    pub fn with_status(status: ContentStatusCode) -> Self {
        Self {
            status,
            ..Default::default()
        }
    }

    /// Probe failure: the error text becomes the only message.
    pub fn exception(message: impl Into<String>) -> Self {
        Self {
            status: ContentStatusCode::Exception,
            messages: vec![message.into()],
            ..Default::default()
        }
    }

    /// Record a finding and move the status to `code` (last write wins).
    pub fn escalate(&mut self, code: ContentStatusCode, message: impl Into<String>) {
        self.status = code;
        self.messages.push(message.into());
    }

    pub fn is_exception(&self) -> bool {
        self.status == ContentStatusCode::Exception
    }
}
