//! Collaborator contracts the reconciliation engine depends on.
//!
//! The catalog, doc-id store and transform queue live outside the engine;
//! Diesel-backed implementations are in [`crate::repository`].

use std::collections::HashMap;

use async_trait::async_trait;

use crate::models::{DocIdRange, DocIdRow, Resource};

/// Queue status of an entry that has not been picked up by the transformer.
pub const QUEUE_STATUS_PENDING: &str = "A";

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors from catalog, doc-id store and queue operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] diesel::result::Error),
    #[error("{0}")]
    Other(String),
}

/// Source of the resources to audit.
#[async_trait]
pub trait ResourceCatalog: Send + Sync {
    /// Resources with `min_id <= id <= max_id`, ordered by id.
    async fn resources_in_range(
        &self,
        min_id: Option<i64>,
        max_id: Option<i64>,
        limit: usize,
        descending: bool,
    ) -> StoreResult<Vec<Resource>>;

    /// Every resource carrying one of the given isbns.
    async fn resources_by_isbns(&self, isbns: &[String]) -> StoreResult<Vec<Resource>>;
}

/// Per-resource document-id rows in the relational store.
#[async_trait]
pub trait DocIdStore: Send + Sync {
    /// `resource_id -> (min, max)` for every resource with rows.
    async fn all_ranges(&self) -> StoreResult<HashMap<i64, DocIdRange>>;

    async fn range(&self, resource_id: i64) -> StoreResult<Option<DocIdRange>>;

    /// Returns the number of rows deleted.
    async fn delete_by_resource(&self, resource_id: i64) -> StoreResult<usize>;

    /// Returns the number of rows inserted. All rows land or none do.
    async fn insert_batch(&self, resource_id: i64, rows: &[DocIdRow]) -> StoreResult<usize>;

    /// Atomically swap a resource's rows for `rows`. Returns `(deleted, inserted)`;
    /// on error the previous rows are left in place.
    async fn replace_rows(
        &self,
        resource_id: i64,
        rows: &[DocIdRow],
    ) -> StoreResult<(usize, usize)>;

    /// Remove every row. Returns the number of rows deleted.
    async fn truncate(&self) -> StoreResult<usize>;
}

/// Work queue feeding the content transformation pipeline.
#[async_trait]
pub trait TransformQueue: Send + Sync {
    async fn count(&self, resource_id: i64, isbn: &str, status: &str) -> StoreResult<u64>;

    async fn enqueue(&self, resource_id: i64, isbn: &str, status: &str) -> StoreResult<()>;
}
