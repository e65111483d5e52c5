//! Reconciliation engine.
//!
//! Compares the content store, the database doc-id rows and the search index
//! per resource, classifies divergence and drives repairs.

pub mod backend;
pub mod classifier;
mod error;
pub mod executor;
pub mod options;
pub mod pager;
pub mod runner;
pub mod summary;

pub use backend::{
    DocIdStore, ResourceCatalog, StoreError, StoreResult, TransformQueue, QUEUE_STATUS_PENDING,
};
pub use classifier::{classify, Classification, ClassifierInput};
pub use error::{with_timeout, ReconcileError};
pub use executor::{RebuildResult, RemediationOutcome, RemediationRecord, Remediator};
pub use options::{RunOptions, RunnerConfig, Selection, DEFAULT_PAGE_SIZE, DEFAULT_QUERY_TIMEOUT};
pub use pager::ResourcePager;
pub use runner::{write_index_list, BatchRunner, ReconcileEvent};
pub use summary::{format_bytes, ResourceFailure, Summary};
