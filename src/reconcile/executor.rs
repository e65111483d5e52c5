//! Carries out repairs for classified resources.
//!
//! Every action is gated by a [`RunOptions`] switch. A disabled action is
//! logged as "no action taken" and noted on the outcome.

use std::time::Duration;

use serde::Serialize;
use tracing::{info, warn};

use super::backend::{DocIdStore, TransformQueue, QUEUE_STATUS_PENDING};
use super::classifier::Classification;
use super::error::{with_timeout, ReconcileError};
use super::options::RunOptions;
use crate::models::{ContentStatusCode, DocIdRange, DocIdRow, IndexDocumentSet, InvalidReason, Resource};
use crate::search_index::{invalid_docs_in_index, SearchIndex};
use crate::storage::ContentLayout;

/// One resource with a finding, plus the snapshots the finding was based on.
#[derive(Debug, Clone, Serialize)]
pub struct RemediationRecord {
    pub resource: Resource,
    pub classification: Classification,
    pub index_set: Option<IndexDocumentSet>,
    pub db_range: Option<DocIdRange>,
    pub content_status: ContentStatusCode,
    pub messages: Vec<String>,
}

impl RemediationRecord {
    /// Report label: the reason, or "should not be indexed".
    pub fn label(&self) -> &'static str {
        if self.classification.should_index {
            self.classification.reason.description()
        } else {
            "Should not be indexed"
        }
    }
}

/// What executing a record changed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RemediationOutcome {
    pub documents_removed_from_index: usize,
    pub resource_removed_from_index: bool,
    pub db_rows_deleted: usize,
    pub db_rows_inserted: usize,
    pub rebuilt: bool,
    pub rebuild_rejected: bool,
    pub enqueued: bool,
    pub already_queued: bool,
    /// Human-readable action log, including skipped actions.
    pub actions: Vec<String>,
}

/// Result of rebuilding a resource's doc-id rows from the index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebuildResult {
    Rebuilt { deleted: usize, inserted: usize },
    /// Index entries do not form a contiguous id span; nothing was written.
    Rejected { entries: usize, span: i64 },
}

pub struct Remediator<'a> {
    index: &'a dyn SearchIndex,
    doc_ids: &'a dyn DocIdStore,
    queue: &'a dyn TransformQueue,
    layout: &'a ContentLayout,
    timeout: Duration,
}

impl<'a> Remediator<'a> {
    pub fn new(
        index: &'a dyn SearchIndex,
        doc_ids: &'a dyn DocIdStore,
        queue: &'a dyn TransformQueue,
        layout: &'a ContentLayout,
        timeout: Duration,
    ) -> Self {
        Self {
            index,
            doc_ids,
            queue,
            layout,
            timeout,
        }
    }

    pub async fn execute(
        &self,
        record: &RemediationRecord,
        options: &RunOptions,
    ) -> Result<RemediationOutcome, ReconcileError> {
        let mut outcome = RemediationOutcome::default();
        let classification = &record.classification;

        if !classification.should_index {
            // The database cleanup runs even when the index removal failed
            let removal = match (&record.index_set, classification.remove_from_index) {
                (Some(set), true) => {
                    self.remove_from_index(record, set, options, &mut outcome)
                        .await
                }
                _ => Ok(()),
            };
            if let Err(e) = &removal {
                warn!(
                    isbn = %record.resource.isbn,
                    resource_id = record.resource.id,
                    error = %e,
                    "Index removal failed"
                );
            }
            if classification.remove_from_db {
                self.delete_db_doc_ids(record, options, &mut outcome).await?;
            }
            removal?;
            return Ok(outcome);
        }

        match classification.reason {
            InvalidReason::NotDefined => {}
            InvalidReason::ResourceNotInIndex
            | InvalidReason::HtmlFilesMissingForResource
            | InvalidReason::HtmlFilesNotInIndex
            | InvalidReason::IndexContainsMissingFiles => {
                self.enqueue(record, options, &mut outcome).await?;
            }
            InvalidReason::IndexContainsResourceWithInvalidPath => {
                if let Some(set) = &record.index_set {
                    let invalid = invalid_docs_in_index(set, self.layout);
                    if !invalid.is_empty() {
                        self.remove_from_index(record, &invalid, options, &mut outcome)
                            .await?;
                    }
                }
                self.enqueue(record, options, &mut outcome).await?;
            }
            InvalidReason::ResourceDocIdsNotInDatabase | InvalidReason::ResourceDocIdsDiffer => {
                let rebuilt = match (&record.index_set, options.fix_doc_ids_in_db) {
                    (Some(set), true) => self.rebuild(record, set, &mut outcome).await?,
                    (Some(_), false) => {
                        self.note(
                            record,
                            &mut outcome,
                            "Would rebuild database doc ids from index (no action taken)",
                        );
                        false
                    }
                    (None, _) => false,
                };
                if !rebuilt {
                    self.enqueue(record, options, &mut outcome).await?;
                }
            }
            InvalidReason::XmlFilesMissingForResource => {
                self.note(
                    record,
                    &mut outcome,
                    "Source content must be reloaded (no automatic action)",
                );
            }
        }

        Ok(outcome)
    }

    /// Replace the resource's doc-id rows with one row per index entry.
    pub async fn rebuild_from_index(
        &self,
        resource_id: i64,
        set: &IndexDocumentSet,
    ) -> Result<RebuildResult, ReconcileError> {
        if !set.is_contiguous() {
            return Ok(RebuildResult::Rejected {
                entries: set.len(),
                span: set.range().span(),
            });
        }

        let rows: Vec<DocIdRow> = set
            .documents
            .iter()
            .map(|doc| DocIdRow {
                document_id: doc.document_id,
                filename: doc.filename.clone(),
            })
            .collect();

        let (deleted, inserted) = with_timeout(
            "doc id rebuild",
            self.timeout,
            self.doc_ids.replace_rows(resource_id, &rows),
        )
        .await?;

        Ok(RebuildResult::Rebuilt { deleted, inserted })
    }

    async fn rebuild(
        &self,
        record: &RemediationRecord,
        set: &IndexDocumentSet,
        outcome: &mut RemediationOutcome,
    ) -> Result<bool, ReconcileError> {
        let resource = &record.resource;
        match self.rebuild_from_index(resource.id, set).await? {
            RebuildResult::Rebuilt { deleted, inserted } => {
                info!(
                    isbn = %resource.isbn,
                    resource_id = resource.id,
                    deleted,
                    inserted,
                    range = %set.range(),
                    "Rebuilt database doc ids from index"
                );
                outcome.db_rows_deleted += deleted;
                outcome.db_rows_inserted += inserted;
                outcome.rebuilt = true;
                outcome
                    .actions
                    .push(format!("Rebuilt doc ids {} ({} rows)", set.range(), inserted));
                Ok(true)
            }
            RebuildResult::Rejected { entries, span } => {
                warn!(
                    isbn = %resource.isbn,
                    resource_id = resource.id,
                    entries,
                    span,
                    "Index doc ids are not contiguous; refusing to rebuild database rows"
                );
                outcome.rebuild_rejected = true;
                outcome.actions.push(format!(
                    "Rebuild rejected: {entries} index entries for a span of {span} ids"
                ));
                Ok(false)
            }
        }
    }

    async fn remove_from_index(
        &self,
        record: &RemediationRecord,
        set: &IndexDocumentSet,
        options: &RunOptions,
        outcome: &mut RemediationOutcome,
    ) -> Result<(), ReconcileError> {
        let resource = &record.resource;
        if !options.remove_bad_resources_from_index {
            self.note(
                record,
                outcome,
                &format!(
                    "Would remove {} documents from index (no action taken)",
                    set.len()
                ),
            );
            return Ok(());
        }

        let removed = with_timeout(
            "index removal",
            self.timeout,
            self.index.remove_documents(set, resource.id),
        )
        .await?;
        info!(
            isbn = %resource.isbn,
            resource_id = resource.id,
            removed,
            "Removed documents from index"
        );
        outcome.documents_removed_from_index += removed;
        outcome.resource_removed_from_index = true;
        outcome
            .actions
            .push(format!("Removed {removed} documents from index"));
        Ok(())
    }

    async fn delete_db_doc_ids(
        &self,
        record: &RemediationRecord,
        options: &RunOptions,
        outcome: &mut RemediationOutcome,
    ) -> Result<(), ReconcileError> {
        let resource = &record.resource;
        if !options.remove_bad_database_doc_ids {
            self.note(
                record,
                outcome,
                "Would delete database doc ids (no action taken)",
            );
            return Ok(());
        }

        let deleted = with_timeout(
            "doc id delete",
            self.timeout,
            self.doc_ids.delete_by_resource(resource.id),
        )
        .await?;
        info!(
            isbn = %resource.isbn,
            resource_id = resource.id,
            deleted,
            "Deleted database doc ids"
        );
        outcome.db_rows_deleted += deleted;
        outcome
            .actions
            .push(format!("Deleted {deleted} database doc id rows"));
        Ok(())
    }

    async fn enqueue(
        &self,
        record: &RemediationRecord,
        options: &RunOptions,
        outcome: &mut RemediationOutcome,
    ) -> Result<(), ReconcileError> {
        let resource = &record.resource;
        if !options.add_bad_resources_to_transform_queue {
            self.note(
                record,
                outcome,
                "Would add to transform queue (no action taken)",
            );
            return Ok(());
        }

        let queued = with_timeout(
            "transform queue lookup",
            self.timeout,
            self.queue
                .count(resource.id, &resource.isbn, QUEUE_STATUS_PENDING),
        )
        .await?;
        if queued > 0 {
            info!(
                isbn = %resource.isbn,
                resource_id = resource.id,
                "Already in transform queue"
            );
            outcome.already_queued = true;
            outcome.actions.push("Already in transform queue".to_string());
            return Ok(());
        }

        with_timeout(
            "transform queue insert",
            self.timeout,
            self.queue
                .enqueue(resource.id, &resource.isbn, QUEUE_STATUS_PENDING),
        )
        .await?;
        info!(
            isbn = %resource.isbn,
            resource_id = resource.id,
            reason = %record.classification.reason,
            "Added to transform queue"
        );
        outcome.enqueued = true;
        outcome.actions.push("Added to transform queue".to_string());
        Ok(())
    }

    fn note(&self, record: &RemediationRecord, outcome: &mut RemediationOutcome, action: &str) {
        info!(
            isbn = %record.resource.isbn,
            resource_id = record.resource.id,
            reason = %record.classification.reason,
            "{}",
            action
        );
        outcome.actions.push(action.to_string());
    }
}
