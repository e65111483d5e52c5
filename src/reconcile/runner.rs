//! Batch runner: walks the selected resources and reconciles each one.
//!
//! The index listing and the database ranges are captured once per run.
//! Resources are processed one at a time; a failure on one resource is
//! recorded in the summary and the run moves on.

use std::collections::HashMap;
use std::io::Write;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use super::backend::{DocIdStore, ResourceCatalog, TransformQueue};
use super::classifier::{classify, Classification, ClassifierInput};
use super::error::{with_timeout, ReconcileError};
use super::executor::{RebuildResult, RemediationRecord, Remediator};
use super::options::{RunOptions, RunnerConfig, Selection};
use super::pager::ResourcePager;
use super::summary::Summary;
use crate::models::{ContentStatus, ContentStatusCode, DocIdRange, InvalidReason, Resource};
use crate::search_index::{validate_against_content, IndexSnapshot, SearchIndex};
use crate::storage::FileSystemContentProbe;

/// Progress events emitted while a run is in flight.
#[derive(Debug, Clone)]
pub enum ReconcileEvent {
    Started {
        max_resources: Option<usize>,
        index_documents: usize,
    },
    ResourceStarted {
        resource_id: i64,
        isbn: String,
    },
    ResourceCompleted {
        resource_id: i64,
        finding: Option<String>,
    },
    ResourceFailed {
        resource_id: i64,
        error: String,
    },
    Complete {
        processed: u64,
        inconsistent: u64,
        failed: usize,
    },
}

#[derive(Serialize)]
struct IndexListEntry<'a> {
    isbn: &'a str,
    document_id: i64,
    filename: &'a str,
}

pub struct BatchRunner {
    catalog: Arc<dyn ResourceCatalog>,
    doc_ids: Arc<dyn DocIdStore>,
    queue: Arc<dyn TransformQueue>,
    index: Arc<dyn SearchIndex>,
    probe: FileSystemContentProbe,
    config: RunnerConfig,
}

impl BatchRunner {
    pub fn new(
        catalog: Arc<dyn ResourceCatalog>,
        doc_ids: Arc<dyn DocIdStore>,
        queue: Arc<dyn TransformQueue>,
        index: Arc<dyn SearchIndex>,
        probe: FileSystemContentProbe,
        config: RunnerConfig,
    ) -> Self {
        Self {
            catalog,
            doc_ids,
            queue,
            index,
            probe,
            config,
        }
    }

    fn remediator(&self) -> Remediator<'_> {
        Remediator::new(
            self.index.as_ref(),
            self.doc_ids.as_ref(),
            self.queue.as_ref(),
            self.probe.layout(),
            self.config.query_timeout,
        )
    }

    /// Reconcile every selected resource.
    ///
    /// Errors are returned only for run-level failures: the index snapshot,
    /// the database ranges, the resource listing or the pre-run passes.
    pub async fn run(
        &self,
        selection: &Selection,
        options: &RunOptions,
        event_tx: mpsc::Sender<ReconcileEvent>,
        cancel: watch::Receiver<bool>,
    ) -> Result<Summary, ReconcileError> {
        let started = Instant::now();
        let timeout = self.config.query_timeout;
        let mut summary = Summary::default();

        info!(?selection, dry_run = options.is_dry_run(), "Starting reconciliation run");

        let snapshot = with_timeout("index listing", timeout, self.index.list_all()).await?;
        summary.index_isbns = snapshot.len();
        summary.index_documents = snapshot.document_count();
        info!(
            isbns = snapshot.len(),
            documents = snapshot.document_count(),
            "Captured search index snapshot"
        );

        if let Some(path) = &options.generate_index_list_file {
            write_index_list(&snapshot, path)?;
            info!("Wrote index list to {}", path.display());
            summary.index_list_file = Some(path.clone());
        }

        if options.truncate_and_reload_table {
            self.truncate_and_reload(selection, &snapshot, &mut summary, &cancel)
                .await?;
        }

        let ranges = with_timeout("doc id ranges", timeout, self.doc_ids.all_ranges()).await?;
        debug!(resources = ranges.len(), "Loaded database doc id ranges");

        let _ = event_tx
            .send(ReconcileEvent::Started {
                max_resources: selection.max_resources(),
                index_documents: snapshot.document_count(),
            })
            .await;

        let remediator = self.remediator();
        let mut pager = ResourcePager::new(
            self.catalog.as_ref(),
            selection,
            self.config.page_size,
            self.config.descending,
        );

        'pages: loop {
            let page = with_timeout("resource listing", timeout, pager.next_page()).await?;
            if page.is_empty() {
                break;
            }

            for resource in page {
                if *cancel.borrow() {
                    warn!("Cancellation requested; stopping after {} resources", summary.resources_processed);
                    summary.cancelled = true;
                    break 'pages;
                }

                let _ = event_tx
                    .send(ReconcileEvent::ResourceStarted {
                        resource_id: resource.id,
                        isbn: resource.isbn.clone(),
                    })
                    .await;

                let result = self
                    .process_resource(&resource, &snapshot, &ranges, options, &remediator, &mut summary)
                    .await;

                match result {
                    Ok(finding) => {
                        let _ = event_tx
                            .send(ReconcileEvent::ResourceCompleted {
                                resource_id: resource.id,
                                finding,
                            })
                            .await;
                    }
                    Err((reason, e)) => {
                        error!(
                            isbn = %resource.isbn,
                            resource_id = resource.id,
                            reason = reason.map(|r| r.as_str()).unwrap_or("-"),
                            "Failed to reconcile resource: {}",
                            e
                        );
                        summary.record_failure(&resource, reason, &e);
                        let _ = event_tx
                            .send(ReconcileEvent::ResourceFailed {
                                resource_id: resource.id,
                                error: e.to_string(),
                            })
                            .await;
                    }
                }
            }
        }

        summary.set_elapsed(started.elapsed());
        info!(
            processed = summary.resources_processed,
            inconsistent = summary.inconsistent(),
            failures = summary.failures.len(),
            elapsed_secs = summary.elapsed_secs,
            "Reconciliation run finished"
        );

        let _ = event_tx
            .send(ReconcileEvent::Complete {
                processed: summary.resources_processed,
                inconsistent: summary.inconsistent(),
                failed: summary.failures.len(),
            })
            .await;

        Ok(summary)
    }

    /// Probe, classify and remediate one resource. Returns the finding label
    /// when there was one.
    async fn process_resource(
        &self,
        resource: &Resource,
        snapshot: &IndexSnapshot,
        ranges: &HashMap<i64, DocIdRange>,
        options: &RunOptions,
        remediator: &Remediator<'_>,
        summary: &mut Summary,
    ) -> Result<Option<String>, (Option<InvalidReason>, ReconcileError)> {
        summary.record_resource(resource);

        let index_set = snapshot.get(&resource.isbn);
        let db_range = ranges.get(&resource.id).copied();
        let should_index = resource.should_be_indexed();

        let content = if should_index {
            let mut content = self.probe.probe(resource);
            summary.record_content(&content);
            if let Some(set) = index_set {
                if content.status == ContentStatusCode::XmlAndHtmlOk {
                    validate_against_content(set, &mut content, self.probe.layout());
                    if content.status == ContentStatusCode::XmlAndHtmlOk {
                        content.status = ContentStatusCode::Ok;
                    }
                }
            }
            content
        } else {
            ContentStatus::default()
        };

        let shared_isbn_owner = if !should_index && index_set.is_some() {
            self.shared_isbn_owner(resource).await.map_err(|e| (None, e))?
        } else {
            None
        };

        let classification = classify(&ClassifierInput {
            resource,
            index_set,
            db_range,
            content: &content,
            shared_isbn_owner,
        });
        summary.record_classification(&classification);

        if !classification.needs_remediation() {
            return Ok(None);
        }

        let record = RemediationRecord {
            resource: resource.clone(),
            classification,
            index_set: index_set.cloned(),
            db_range,
            content_status: content.status,
            messages: content.messages,
        };
        let label = record.label().to_string();
        info!(
            isbn = %resource.isbn,
            resource_id = resource.id,
            reason = %classification.reason,
            should_index,
            "{}",
            label
        );

        let result = remediator.execute(&record, options).await;
        summary.records.push(record);
        let outcome = result.map_err(|e| (reason_of(&classification), e))?;
        summary.record_outcome(&outcome);
        Ok(Some(label))
    }

    /// Another resource with the same isbn that belongs in the index.
    async fn shared_isbn_owner(&self, resource: &Resource) -> Result<Option<i64>, ReconcileError> {
        let isbns = [resource.isbn.clone()];
        let siblings = with_timeout(
            "isbn lookup",
            self.config.query_timeout,
            self.catalog.resources_by_isbns(&isbns),
        )
        .await?;
        Ok(siblings
            .iter()
            .find(|r| r.id != resource.id && r.should_be_indexed())
            .map(|r| r.id))
    }

    /// Empty the doc-id table, then rebuild rows for every selected resource
    /// that belongs in the index and is present in it.
    async fn truncate_and_reload(
        &self,
        selection: &Selection,
        snapshot: &IndexSnapshot,
        summary: &mut Summary,
        cancel: &watch::Receiver<bool>,
    ) -> Result<(), ReconcileError> {
        let timeout = self.config.query_timeout;
        let truncated = with_timeout("doc id truncate", timeout, self.doc_ids.truncate()).await?;
        warn!(rows = truncated, "Truncated database doc id table");
        summary.rows_truncated = Some(truncated as u64);

        let remediator = self.remediator();
        let mut pager = ResourcePager::new(
            self.catalog.as_ref(),
            selection,
            self.config.page_size,
            self.config.descending,
        );

        loop {
            let page = with_timeout("resource listing", timeout, pager.next_page()).await?;
            if page.is_empty() {
                break;
            }
            for resource in page {
                if *cancel.borrow() {
                    return Err(ReconcileError::Cancelled);
                }
                if !resource.should_be_indexed() {
                    continue;
                }
                let Some(set) = snapshot.get(&resource.isbn) else {
                    continue;
                };
                match remediator.rebuild_from_index(resource.id, set).await {
                    Ok(RebuildResult::Rebuilt { inserted, .. }) => {
                        summary.resources_reloaded += 1;
                        summary.db_rows_inserted += inserted as u64;
                    }
                    Ok(RebuildResult::Rejected { entries, span }) => {
                        warn!(
                            isbn = %resource.isbn,
                            resource_id = resource.id,
                            entries,
                            span,
                            "Skipping reload of non-contiguous index doc ids"
                        );
                        summary.rebuilds_rejected += 1;
                    }
                    Err(e) => {
                        error!(
                            isbn = %resource.isbn,
                            resource_id = resource.id,
                            "Failed to reload doc ids: {}",
                            e
                        );
                        summary.record_failure(&resource, None, &e);
                    }
                }
            }
        }

        info!(
            reloaded = summary.resources_reloaded,
            "Reloaded database doc ids from index"
        );
        Ok(())
    }
}

fn reason_of(classification: &Classification) -> Option<InvalidReason> {
    classification.should_index.then_some(classification.reason)
}

/// Write the snapshot as JSON lines of `isbn`, `document_id`, `filename`.
pub fn write_index_list(snapshot: &IndexSnapshot, path: &Path) -> Result<(), ReconcileError> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut writer = std::io::BufWriter::new(std::fs::File::create(path)?);
    for set in snapshot.iter() {
        for doc in &set.documents {
            serde_json::to_writer(
                &mut writer,
                &IndexListEntry {
                    isbn: &set.isbn,
                    document_id: doc.document_id,
                    filename: &doc.filename,
                },
            )?;
            writer.write_all(b"\n")?;
        }
    }
    writer.flush()?;
    Ok(())
}
