//! Run-level errors.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;

use super::backend::StoreError;
use crate::search_index::IndexError;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Search index error: {0}")]
    Index(#[from] IndexError),
    #[error("{operation} timed out after {seconds}s")]
    Timeout {
        operation: &'static str,
        seconds: u64,
    },
    #[error("Run cancelled")]
    Cancelled,
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Await a store or index call, failing with [`ReconcileError::Timeout`] once
/// `limit` elapses.
pub async fn with_timeout<T, E, F>(
    operation: &'static str,
    limit: Duration,
    fut: F,
) -> Result<T, ReconcileError>
where
    F: Future<Output = Result<T, E>>,
    ReconcileError: From<E>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result.map_err(ReconcileError::from),
        Err(_) => Err(ReconcileError::Timeout {
            operation,
            seconds: limit.as_secs(),
        }),
    }
}
