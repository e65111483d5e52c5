//! On-disk Tantivy index backend.
//!
//! Schema: `isbn` (raw string), `document_id` (indexed u64) and `filename`
//! (raw string), all stored. Deletions go through the `document_id` term.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tantivy::collector::{Count, DocSetCollector};
use tantivy::query::{AllQuery, Query, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value, FAST, INDEXED, STORED, STRING};
use tantivy::{doc, Index, TantivyDocument, Term};
use tracing::{debug, info};

use super::{IndexError, IndexResult, IndexSnapshot, SearchIndex};
use crate::models::{DocIdRow, IndexDocumentSet};

const WRITER_MEMORY_BYTES: usize = 50_000_000;

#[derive(Debug, Clone, Copy)]
struct IndexFields {
    isbn: Field,
    document_id: Field,
    filename: Field,
}

impl IndexFields {
    fn build_schema() -> Schema {
        let mut builder = Schema::builder();
        builder.add_text_field("isbn", STRING | STORED);
        builder.add_u64_field("document_id", INDEXED | STORED | FAST);
        builder.add_text_field("filename", STRING | STORED);
        builder.build()
    }

    fn from_schema(schema: &Schema) -> IndexResult<Self> {
        let field = |name: &'static str| {
            schema
                .get_field(name)
                .map_err(|_| IndexError::MissingField(name))
        };
        Ok(Self {
            isbn: field("isbn")?,
            document_id: field("document_id")?,
            filename: field("filename")?,
        })
    }
}

fn to_index_id(document_id: i64) -> IndexResult<u64> {
    u64::try_from(document_id).map_err(|_| IndexError::InvalidDocumentId(document_id))
}

/// Tantivy index stored in a directory.
#[derive(Clone)]
pub struct TantivySearchIndex {
    index: Index,
    fields: IndexFields,
    path: PathBuf,
}

impl TantivySearchIndex {
    /// Open the index in `path`, creating an empty one when none exists.
    pub fn open_or_create(path: &Path) -> IndexResult<Self> {
        std::fs::create_dir_all(path)?;
        let index = if path.join("meta.json").exists() {
            Index::open_in_dir(path)?
        } else {
            info!("Creating search index at {}", path.display());
            Index::create_in_dir(path, IndexFields::build_schema())?
        };
        let fields = IndexFields::from_schema(&index.schema())?;
        Ok(Self {
            index,
            fields,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn collect(&self, query: &dyn Query) -> IndexResult<Vec<(String, i64, String)>> {
        let reader = self.index.reader()?;
        let searcher = reader.searcher();
        let addresses = searcher.search(query, &DocSetCollector)?;

        let mut entries = Vec::with_capacity(addresses.len());
        for address in addresses {
            let doc: TantivyDocument = searcher.doc(address)?;
            let isbn = doc
                .get_first(self.fields.isbn)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let raw_id = doc
                .get_first(self.fields.document_id)
                .and_then(|v| v.as_u64())
                .ok_or(IndexError::MissingField("document_id"))?;
            let document_id =
                i64::try_from(raw_id).map_err(|_| IndexError::InvalidDocumentId(i64::MAX))?;
            let filename = doc
                .get_first(self.fields.filename)
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            entries.push((isbn, document_id, filename));
        }
        Ok(entries)
    }

    fn list_all_blocking(&self) -> IndexResult<IndexSnapshot> {
        let entries = self.collect(&AllQuery)?;
        debug!(documents = entries.len(), "Listed search index");
        Ok(IndexSnapshot::from_entries(entries))
    }

    fn list_documents_blocking(&self, isbn: &str) -> IndexResult<Option<IndexDocumentSet>> {
        let term = Term::from_field_text(self.fields.isbn, isbn);
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let entries = self.collect(&query)?;
        if entries.is_empty() {
            return Ok(None);
        }
        Ok(Some(IndexDocumentSet::from_pairs(
            isbn,
            entries.into_iter().map(|(_, id, filename)| (id, filename)),
        )))
    }

    fn add_documents_blocking(&self, isbn: &str, documents: &[DocIdRow]) -> IndexResult<usize> {
        let mut writer = self.index.writer::<TantivyDocument>(WRITER_MEMORY_BYTES)?;
        for row in documents {
            writer.add_document(doc!(
                self.fields.isbn => isbn,
                self.fields.document_id => to_index_id(row.document_id)?,
                self.fields.filename => row.filename.as_str(),
            ))?;
        }
        writer.commit()?;
        Ok(documents.len())
    }

    /// Returns the number of documents that were present when the delete was issued.
    fn remove_documents_blocking(&self, set: &IndexDocumentSet) -> IndexResult<usize> {
        let searcher = self.index.reader()?.searcher();
        let mut writer = self.index.writer::<TantivyDocument>(WRITER_MEMORY_BYTES)?;
        let mut removed = 0;
        for document in &set.documents {
            let id = to_index_id(document.document_id)?;
            let term = Term::from_field_u64(self.fields.document_id, id);
            removed += searcher.search(
                &TermQuery::new(term.clone(), IndexRecordOption::Basic),
                &Count,
            )?;
            writer.delete_term(term);
        }
        writer.commit()?;
        Ok(removed)
    }

    async fn blocking<T, F>(&self, f: F) -> IndexResult<T>
    where
        T: Send + 'static,
        F: FnOnce(TantivySearchIndex) -> IndexResult<T> + Send + 'static,
    {
        let this = self.clone();
        tokio::task::spawn_blocking(move || f(this))
            .await
            .map_err(|e| IndexError::Task(e.to_string()))?
    }
}

#[async_trait]
impl SearchIndex for TantivySearchIndex {
    async fn list_all(&self) -> IndexResult<IndexSnapshot> {
        self.blocking(|index| index.list_all_blocking()).await
    }

    async fn list_documents(&self, isbn: &str) -> IndexResult<Option<IndexDocumentSet>> {
        let isbn = isbn.to_string();
        self.blocking(move |index| index.list_documents_blocking(&isbn))
            .await
    }

    async fn add_documents(&self, isbn: &str, documents: &[DocIdRow]) -> IndexResult<usize> {
        let isbn = isbn.to_string();
        let documents = documents.to_vec();
        self.blocking(move |index| index.add_documents_blocking(&isbn, &documents))
            .await
    }

    async fn remove_documents(
        &self,
        set: &IndexDocumentSet,
        resource_id: i64,
    ) -> IndexResult<usize> {
        let owned = set.clone();
        let removed = self
            .blocking(move |index| index.remove_documents_blocking(&owned))
            .await?;
        debug!(isbn = %set.isbn, resource_id, removed, "Removed documents from index");
        Ok(removed)
    }
}
