//! Search index access for the reconciliation engine.
//!
//! The index holds one searchable document per rendered file, keyed by a
//! numeric document id and tagged with the resource isbn. Backends implement
//! [`SearchIndex`]; the engine reads the whole index once per run through an
//! [`IndexSnapshot`].

mod memory;
mod tantivy_backend;

use std::collections::{BTreeMap, HashSet};

use async_trait::async_trait;

pub use memory::InMemorySearchIndex;
pub use tantivy_backend::TantivySearchIndex;

use crate::models::{ContentStatus, ContentStatusCode, DocIdRow, IndexDocumentSet};
use crate::storage::ContentLayout;

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Errors from search index backends.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Search index error: {0}")]
    Tantivy(#[from] tantivy::TantivyError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Index schema is missing field '{0}'")]
    MissingField(&'static str),
    #[error("Invalid document id: {0}")]
    InvalidDocumentId(i64),
    #[error("Index task failed: {0}")]
    Task(String),
}

/// A full-text index holding per-resource documents.
#[async_trait]
pub trait SearchIndex: Send + Sync {
    /// Every document in the index grouped by isbn.
    async fn list_all(&self) -> IndexResult<IndexSnapshot>;

    /// Documents held for one isbn, or `None` when the isbn is absent.
    async fn list_documents(&self, isbn: &str) -> IndexResult<Option<IndexDocumentSet>>;

    /// Add documents for an isbn. Returns the number added.
    async fn add_documents(&self, isbn: &str, documents: &[DocIdRow]) -> IndexResult<usize>;

    /// Remove every document of `set` from the index. Returns the number removed.
    async fn remove_documents(&self, set: &IndexDocumentSet, resource_id: i64)
        -> IndexResult<usize>;
}

/// Immutable view of the whole index captured at the start of a run.
#[derive(Debug, Clone, Default)]
pub struct IndexSnapshot {
    sets: BTreeMap<String, IndexDocumentSet>,
}

impl IndexSnapshot {
    /// Group `(isbn, document_id, filename)` entries into per-isbn sets.
    pub fn from_entries<I>(entries: I) -> Self
    where
        I: IntoIterator<Item = (String, i64, String)>,
    {
        let mut grouped: BTreeMap<String, Vec<(i64, String)>> = BTreeMap::new();
        for (isbn, document_id, filename) in entries {
            grouped.entry(isbn).or_default().push((document_id, filename));
        }
        let sets = grouped
            .into_iter()
            .map(|(isbn, pairs)| {
                let set = IndexDocumentSet::from_pairs(&isbn, pairs);
                (isbn, set)
            })
            .collect();
        Self { sets }
    }

    pub fn get(&self, isbn: &str) -> Option<&IndexDocumentSet> {
        self.sets.get(isbn)
    }

    /// Number of isbns in the index.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn document_count(&self) -> usize {
        self.sets.values().map(IndexDocumentSet::len).sum()
    }

    /// Sets ordered by isbn.
    pub fn iter(&self) -> impl Iterator<Item = &IndexDocumentSet> {
        self.sets.values()
    }
}

/// Cross-check an index set against the probed content.
///
/// Indexed files missing on disk, or without a source counterpart, escalate to
/// `IndexContainsMissingFiles`. Rendered files absent from the index escalate
/// to `HtmlFilesNotInIndex`. Whichever finding is recorded last wins.
pub fn validate_against_content(
    set: &IndexDocumentSet,
    content: &mut ContentStatus,
    layout: &ContentLayout,
) {
    let rendered: HashSet<String> = content.indexable_html_files.iter().cloned().collect();
    let sources: HashSet<String> = content.source_files.iter().cloned().collect();

    for doc in &set.documents {
        if !rendered.contains(&doc.filename) {
            content.escalate(
                ContentStatusCode::IndexContainsMissingFiles,
                format!(
                    "Indexed file {} (doc id {}) missing from rendered content",
                    doc.filename, doc.document_id
                ),
            );
            continue;
        }
        if layout.is_glossary(&doc.filename) {
            continue;
        }
        let source = layout.source_name(&doc.filename);
        if !sources.contains(&source) {
            content.escalate(
                ContentStatusCode::IndexContainsMissingFiles,
                format!(
                    "Indexed file {} (doc id {}) has no source file {}",
                    doc.filename, doc.document_id, source
                ),
            );
        }
    }

    let indexed: HashSet<&str> = set.documents.iter().map(|d| d.filename.as_str()).collect();
    let rendered_files = content.indexable_html_files.clone();
    for name in &rendered_files {
        if !indexed.contains(name.as_str()) {
            content.escalate(
                ContentStatusCode::HtmlFilesNotInIndex,
                format!("Rendered file {} not in index", name),
            );
        }
    }
}

/// Entries that should not be in the index: structurally invalid paths and
/// files whose rendered copy no longer exists.
pub fn invalid_docs_in_index(set: &IndexDocumentSet, layout: &ContentLayout) -> IndexDocumentSet {
    set.filtered(|doc| {
        doc.is_invalid_path || !layout.rendered_path(&set.isbn, &doc.filename).is_file()
    })
}
