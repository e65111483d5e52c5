//! Document-id bookkeeping persisted in the database.

use serde::{Deserialize, Serialize};

/// Inclusive document-id span recorded for one resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocIdRange {
    pub min: i64,
    pub max: i64,
}

impl DocIdRange {
    pub fn new(min: i64, max: i64) -> Self {
        Self { min, max }
    }

    /// Number of ids a contiguous span covers.
    pub fn span(&self) -> i64 {
        self.max - self.min + 1
    }
}

impl std::fmt::Display for DocIdRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.min, self.max)
    }
}

/// One `(document_id, filename)` row of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocIdRow {
    pub document_id: i64,
    pub filename: String,
}
