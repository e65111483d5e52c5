//! In-memory index backend.

use std::collections::BTreeMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::{IndexResult, IndexSnapshot, SearchIndex};
use crate::models::{DocIdRow, IndexDocumentSet};

#[derive(Debug, Clone)]
struct StoredDocument {
    isbn: String,
    filename: String,
}

/// Index kept in a map keyed by document id. Adding an existing id replaces it.
#[derive(Debug, Default)]
pub struct InMemorySearchIndex {
    documents: RwLock<BTreeMap<i64, StoredDocument>>,
}

impl InMemorySearchIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of documents held.
    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }
}

#[async_trait]
impl SearchIndex for InMemorySearchIndex {
    async fn list_all(&self) -> IndexResult<IndexSnapshot> {
        let documents = self.documents.read().await;
        Ok(IndexSnapshot::from_entries(documents.iter().map(|(id, doc)| {
            (doc.isbn.clone(), *id, doc.filename.clone())
        })))
    }

    async fn list_documents(&self, isbn: &str) -> IndexResult<Option<IndexDocumentSet>> {
        let documents = self.documents.read().await;
        let pairs: Vec<(i64, String)> = documents
            .iter()
            .filter(|(_, doc)| doc.isbn == isbn)
            .map(|(id, doc)| (*id, doc.filename.clone()))
            .collect();
        if pairs.is_empty() {
            return Ok(None);
        }
        Ok(Some(IndexDocumentSet::from_pairs(isbn, pairs)))
    }

    async fn add_documents(&self, isbn: &str, documents: &[DocIdRow]) -> IndexResult<usize> {
        let mut stored = self.documents.write().await;
        for row in documents {
            stored.insert(
                row.document_id,
                StoredDocument {
                    isbn: isbn.to_string(),
                    filename: row.filename.clone(),
                },
            );
        }
        Ok(documents.len())
    }

    async fn remove_documents(
        &self,
        set: &IndexDocumentSet,
        _resource_id: i64,
    ) -> IndexResult<usize> {
        let mut stored = self.documents.write().await;
        let removed = set
            .documents
            .iter()
            .filter(|doc| stored.remove(&doc.document_id).is_some())
            .count();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_remove_subset() {
        let index = InMemorySearchIndex::new();
        let rows: Vec<DocIdRow> = (1..=4)
            .map(|id| DocIdRow {
                document_id: id,
                filename: format!("f{id}.isbn.html"),
            })
            .collect();
        index.add_documents("isbn", &rows).await.unwrap();

        let set = index.list_documents("isbn").await.unwrap().unwrap();
        let subset = set.filtered(|d| d.document_id > 2);
        assert_eq!(index.remove_documents(&subset, 1).await.unwrap(), 2);
        assert_eq!(index.remove_documents(&subset, 1).await.unwrap(), 0);

        let remaining = index.list_documents("isbn").await.unwrap().unwrap();
        assert_eq!((remaining.min_document_id, remaining.max_document_id), (1, 2));
        assert_eq!(index.document_count().await, 2);
    }
}
