//! Run counters and reports.

use std::collections::BTreeMap;
use std::fmt::Write;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;

use super::classifier::Classification;
use super::executor::{RemediationOutcome, RemediationRecord};
use crate::models::{ContentStatus, InvalidReason, Resource, ResourceStatus};

/// A resource whose processing failed; the run carried on.
#[derive(Debug, Clone, Serialize)]
pub struct ResourceFailure {
    pub resource_id: i64,
    pub isbn: String,
    pub reason: Option<InvalidReason>,
    pub error: String,
}

/// Everything a run counted.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Summary {
    pub resources_processed: u64,
    pub by_status: BTreeMap<ResourceStatus, u64>,
    pub by_reason: BTreeMap<InvalidReason, u64>,
    pub should_not_be_indexed: u64,
    pub probe_failures: u64,

    pub xml_files: u64,
    pub xml_bytes: u64,
    pub html_files: u64,
    pub html_bytes: u64,

    pub index_isbns: usize,
    pub index_documents: usize,

    pub documents_removed_from_index: u64,
    pub resources_removed_from_index: u64,
    pub db_rows_deleted: u64,
    pub db_rows_inserted: u64,
    pub resources_rebuilt: u64,
    pub rebuilds_rejected: u64,
    pub enqueued: u64,
    pub already_queued: u64,

    /// Rows removed by a truncate-and-reload pass.
    pub rows_truncated: Option<u64>,
    pub resources_reloaded: u64,
    pub index_list_file: Option<PathBuf>,

    pub failures: Vec<ResourceFailure>,
    pub cancelled: bool,
    pub elapsed_secs: f64,

    /// Findings kept for the detail report.
    #[serde(skip)]
    pub records: Vec<RemediationRecord>,
}

impl Summary {
    pub fn record_resource(&mut self, resource: &Resource) {
        self.resources_processed += 1;
        *self.by_status.entry(resource.status).or_default() += 1;
    }

    pub fn record_content(&mut self, content: &ContentStatus) {
        self.xml_files += content.xml_file_count;
        self.xml_bytes += content.xml_bytes;
        self.html_files += content.html_file_count;
        self.html_bytes += content.html_bytes;
        if content.is_exception() {
            self.probe_failures += 1;
        }
    }

    pub fn record_classification(&mut self, classification: &Classification) {
        if classification.should_index {
            *self.by_reason.entry(classification.reason).or_default() += 1;
        } else {
            self.should_not_be_indexed += 1;
        }
    }

    pub fn record_outcome(&mut self, outcome: &RemediationOutcome) {
        self.documents_removed_from_index += outcome.documents_removed_from_index as u64;
        if outcome.resource_removed_from_index {
            self.resources_removed_from_index += 1;
        }
        self.db_rows_deleted += outcome.db_rows_deleted as u64;
        self.db_rows_inserted += outcome.db_rows_inserted as u64;
        if outcome.rebuilt {
            self.resources_rebuilt += 1;
        }
        if outcome.rebuild_rejected {
            self.rebuilds_rejected += 1;
        }
        if outcome.enqueued {
            self.enqueued += 1;
        }
        if outcome.already_queued {
            self.already_queued += 1;
        }
    }

    pub fn record_failure(
        &mut self,
        resource: &Resource,
        reason: Option<InvalidReason>,
        error: impl ToString,
    ) {
        self.failures.push(ResourceFailure {
            resource_id: resource.id,
            isbn: resource.isbn.clone(),
            reason,
            error: error.to_string(),
        });
    }

    pub fn set_elapsed(&mut self, elapsed: Duration) {
        self.elapsed_secs = elapsed.as_secs_f64();
    }

    pub fn reason_count(&self, reason: InvalidReason) -> u64 {
        self.by_reason.get(&reason).copied().unwrap_or(0)
    }

    /// Resources that belong in the index but diverge.
    pub fn inconsistent(&self) -> u64 {
        self.by_reason
            .iter()
            .filter(|(reason, _)| reason.is_inconsistent())
            .map(|(_, n)| n)
            .sum()
    }

    /// Plain-text run summary.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Resources processed:        {}", self.resources_processed);
        for (status, n) in &self.by_status {
            let _ = writeln!(out, "  {:<26}{}", status.label(), n);
        }
        let _ = writeln!(out, "Should not be indexed:      {}", self.should_not_be_indexed);
        let _ = writeln!(out, "Inconsistent:               {}", self.inconsistent());
        for reason in InvalidReason::ALL {
            let n = self.reason_count(reason);
            if n > 0 {
                let _ = writeln!(out, "  {:<40}{}", reason.description(), n);
            }
        }
        if self.probe_failures > 0 {
            let _ = writeln!(out, "Content probe failures:     {}", self.probe_failures);
        }
        let _ = writeln!(
            out,
            "Source files:               {} ({})",
            self.xml_files,
            format_bytes(self.xml_bytes)
        );
        let _ = writeln!(
            out,
            "Rendered files:             {} ({})",
            self.html_files,
            format_bytes(self.html_bytes)
        );
        let _ = writeln!(
            out,
            "Index:                      {} isbns, {} documents",
            self.index_isbns, self.index_documents
        );
        if let Some(rows) = self.rows_truncated {
            let _ = writeln!(
                out,
                "Table truncated:            {} rows, {} resources reloaded",
                rows, self.resources_reloaded
            );
        }
        let _ = writeln!(
            out,
            "Removed from index:         {} documents, {} resources",
            self.documents_removed_from_index, self.resources_removed_from_index
        );
        let _ = writeln!(
            out,
            "Database doc ids:           {} deleted, {} inserted, {} rebuilt, {} rejected",
            self.db_rows_deleted,
            self.db_rows_inserted,
            self.resources_rebuilt,
            self.rebuilds_rejected
        );
        let _ = writeln!(
            out,
            "Transform queue:            {} added, {} already queued",
            self.enqueued, self.already_queued
        );
        if !self.failures.is_empty() {
            let _ = writeln!(out, "Failures:                   {}", self.failures.len());
        }
        if self.cancelled {
            let _ = writeln!(out, "Run cancelled before completion");
        }
        let _ = writeln!(out, "Elapsed:                    {:.1}s", self.elapsed_secs);
        out
    }

    /// Findings grouped by reason, one line per resource.
    pub fn detail_report(&self) -> String {
        let mut groups: BTreeMap<&'static str, Vec<&RemediationRecord>> = BTreeMap::new();
        for record in &self.records {
            groups.entry(record.label()).or_default().push(record);
        }

        let mut out = String::new();
        for (label, records) in groups {
            let _ = writeln!(out, "== {} ({}) ==", label, records.len());
            for record in records {
                let index = record
                    .index_set
                    .as_ref()
                    .map(|s| format!("{} ({} docs)", s.range(), s.len()))
                    .unwrap_or_else(|| "-".to_string());
                let db = record
                    .db_range
                    .map(|r| r.to_string())
                    .unwrap_or_else(|| "-".to_string());
                let _ = writeln!(
                    out,
                    "{}\t{}\t{}\tindex={}\tdb={}\tcontent={}",
                    record.resource.id,
                    record.resource.isbn,
                    record.resource.status.label(),
                    index,
                    db,
                    record.content_status
                );
                for message in &record.messages {
                    let _ = writeln!(out, "\t{}", message);
                }
            }
            let _ = writeln!(out);
        }

        if !self.failures.is_empty() {
            let _ = writeln!(out, "== Failures ({}) ==", self.failures.len());
            for failure in &self.failures {
                let _ = writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    failure.resource_id,
                    failure.isbn,
                    failure.reason.map(|r| r.as_str()).unwrap_or("-"),
                    failure.error
                );
            }
        }
        out
    }
}

/// Format bytes as human-readable string.
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} bytes", bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512 bytes");
        assert_eq!(format_bytes(2048), "2.00 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_outcome_accumulates() {
        let mut summary = Summary::default();
        let outcome = RemediationOutcome {
            documents_removed_from_index: 5,
            resource_removed_from_index: true,
            db_rows_deleted: 5,
            enqueued: true,
            ..Default::default()
        };
        summary.record_outcome(&outcome);
        summary.record_outcome(&outcome);
        assert_eq!(summary.documents_removed_from_index, 10);
        assert_eq!(summary.resources_removed_from_index, 2);
        assert_eq!(summary.db_rows_deleted, 10);
        assert_eq!(summary.enqueued, 2);
    }

    #[test]
    fn test_summary_serializes_reason_keys() {
        let mut summary = Summary::default();
        summary
            .by_reason
            .insert(InvalidReason::ResourceDocIdsDiffer, 3);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["by_reason"]["resource_doc_ids_differ"], 3);
        assert!(summary.render().contains("Database and index document ids differ"));
    }
}
