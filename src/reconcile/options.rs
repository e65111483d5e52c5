//! What a run audits and which repairs it may perform.

use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

/// Default timeout for a single index or database call.
pub const DEFAULT_QUERY_TIMEOUT: Duration = Duration::from_secs(600);

/// Default number of resources fetched per catalog page.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Resources to audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Selection {
    /// Resources with ids inside the window, at most `max_resources` of them.
    Range {
        min_id: Option<i64>,
        max_id: Option<i64>,
        max_resources: Option<usize>,
    },
    /// Every resource carrying one of the isbns.
    Isbns(Vec<String>),
}

impl Selection {
    pub fn all() -> Self {
        Selection::Range {
            min_id: None,
            max_id: None,
            max_resources: None,
        }
    }

    /// Upper bound on resources the selection can yield, when known.
    pub fn max_resources(&self) -> Option<usize> {
        match self {
            Selection::Range { max_resources, .. } => *max_resources,
            Selection::Isbns(_) => None,
        }
    }
}

impl Default for Selection {
    fn default() -> Self {
        Self::all()
    }
}

/// Repair switches. Everything defaults to off, which makes a run report-only.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunOptions {
    pub fix_doc_ids_in_db: bool,
    pub remove_bad_resources_from_index: bool,
    pub remove_bad_database_doc_ids: bool,
    pub add_bad_resources_to_transform_queue: bool,
    pub truncate_and_reload_table: bool,
    /// Write the index snapshot as JSON lines to this file before auditing.
    pub generate_index_list_file: Option<PathBuf>,
}

impl RunOptions {
    /// No repair is enabled.
    pub fn is_dry_run(&self) -> bool {
        !(self.fix_doc_ids_in_db
            || self.remove_bad_resources_from_index
            || self.remove_bad_database_doc_ids
            || self.add_bad_resources_to_transform_queue
            || self.truncate_and_reload_table)
    }
}

/// Runner tuning independent of a single run.
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub page_size: usize,
    pub descending: bool,
    pub query_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            page_size: DEFAULT_PAGE_SIZE,
            descending: true,
            query_timeout: DEFAULT_QUERY_TIMEOUT,
        }
    }
}
