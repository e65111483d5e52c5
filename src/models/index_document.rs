//! Search-index view of a resource's documents.

use serde::{Deserialize, Serialize};

use super::DocIdRange;

/// One searchable document as the index records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocument {
    pub document_id: i64,
    pub filename: String,
    pub is_invalid_path: bool,
}

/// All documents the index holds for one isbn.
///
/// Documents are kept ordered by id; `min_document_id`/`max_document_id`
/// are the extremes of that order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDocumentSet {
    pub isbn: String,
    pub documents: Vec<IndexDocument>,
    pub min_document_id: i64,
    pub max_document_id: i64,
}

impl IndexDocumentSet {
    pub fn new(isbn: impl Into<String>, mut documents: Vec<IndexDocument>) -> Self {
        documents.sort_by_key(|d| d.document_id);
        let min_document_id = documents.first().map(|d| d.document_id).unwrap_or(0);
        let max_document_id = documents.last().map(|d| d.document_id).unwrap_or(0);
        Self {
            isbn: isbn.into(),
            documents,
            min_document_id,
            max_document_id,
        }
    }

    /// Build a set from `(document_id, filename)` pairs, flagging invalid paths.
    pub fn from_pairs<I, S>(isbn: &str, pairs: I) -> Self
    where
        I: IntoIterator<Item = (i64, S)>,
        S: Into<String>,
    {
        let documents = pairs
            .into_iter()
            .map(|(document_id, filename)| {
                let filename = filename.into();
                IndexDocument {
                    document_id,
                    is_invalid_path: is_invalid_index_path(&filename, isbn),
                    filename,
                }
            })
            .collect();
        Self::new(isbn, documents)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    pub fn range(&self) -> DocIdRange {
        DocIdRange::new(self.min_document_id, self.max_document_id)
    }

    pub fn has_invalid_paths(&self) -> bool {
        self.documents.iter().any(|d| d.is_invalid_path)
    }

    /// Entry count matches the span implied by min/max.
    pub fn is_contiguous(&self) -> bool {
        !self.documents.is_empty() && self.documents.len() as i64 == self.range().span()
    }

    /// Subset of documents matching `keep`, with min/max recomputed.
    pub fn filtered<F>(&self, mut keep: F) -> Self
    where
        F: FnMut(&IndexDocument) -> bool,
    {
        let documents = self.documents.iter().filter(|d| keep(d)).cloned().collect();
        Self::new(self.isbn.clone(), documents)
    }
}

/// An index filename is structurally invalid when it cannot name a file
/// inside the resource's own rendered directory.
pub fn is_invalid_index_path(filename: &str, isbn: &str) -> bool {
    filename.trim().is_empty()
        || filename.starts_with('/')
        || filename.contains('\\')
        || filename.contains('/')
        || filename.contains("..")
        || !filename.contains(isbn)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISBN: &str = "9781111111111";

    #[test]
    fn min_max_follow_sorted_ids() {
        let set = IndexDocumentSet::from_pairs(
            ISBN,
            vec![
                (12, format!("ch2.{ISBN}.html")),
                (10, format!("ch0.{ISBN}.html")),
                (11, format!("ch1.{ISBN}.html")),
            ],
        );
        assert_eq!(set.min_document_id, 10);
        assert_eq!(set.max_document_id, 12);
        assert_eq!(set.documents[0].document_id, 10);
        assert!(set.is_contiguous());
    }

    #[test]
    fn gap_breaks_contiguity() {
        let set = IndexDocumentSet::from_pairs(
            ISBN,
            vec![(1, format!("a.{ISBN}.html")), (3, format!("b.{ISBN}.html"))],
        );
        assert!(!set.is_contiguous());
    }

    #[test]
    fn invalid_paths_are_flagged() {
        assert!(is_invalid_index_path("", ISBN));
        assert!(is_invalid_index_path("../etc/passwd", ISBN));
        assert!(is_invalid_index_path(&format!("html/{ISBN}/a.html"), ISBN));
        assert!(is_invalid_index_path("ch1.9780000000000.html", ISBN));
        assert!(!is_invalid_index_path(&format!("sect1.{ISBN}.ch0001.html"), ISBN));
    }

    #[test]
    fn filtered_recomputes_extremes() {
        let set = IndexDocumentSet::from_pairs(
            ISBN,
            vec![
                (5, format!("a.{ISBN}.html")),
                (6, "bogus.html".to_string()),
                (7, format!("c.{ISBN}.html")),
                (8, "../x".to_string()),
            ],
        );
        let bad = set.filtered(|d| d.is_invalid_path);
        assert_eq!(bad.len(), 2);
        assert_eq!(bad.min_document_id, 6);
        assert_eq!(bad.max_document_id, 8);
    }
}
