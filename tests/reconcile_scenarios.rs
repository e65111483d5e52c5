//! End-to-end reconciliation runs against SQLite, the in-memory index and a
//! temporary content store.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tempfile::{tempdir, TempDir};
use tokio::sync::{mpsc, watch};

use docsync::models::{
    ContentStatusCode, DocIdRange, DocIdRow, IndexDocumentSet, InvalidReason, Resource,
    ResourceStatus,
};
use docsync::reconcile::{
    BatchRunner, ReconcileError, RunOptions, RunnerConfig, Selection, Summary,
    QUEUE_STATUS_PENDING,
};
use docsync::repository::{migrations, DieselDbContext};
use docsync::search_index::{
    InMemorySearchIndex, IndexError, IndexResult, IndexSnapshot, SearchIndex,
};
use docsync::storage::{ContentLayout, FileSystemContentProbe};

struct Harness {
    ctx: DieselDbContext,
    index: Arc<InMemorySearchIndex>,
    layout: ContentLayout,
    dir: TempDir,
}

impl Harness {
    async fn new() -> Self {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("docsync.db");
        migrations::run_migrations(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        let layout = ContentLayout::new(dir.path().join("xml"), dir.path().join("html"));
        Self {
            ctx: DieselDbContext::from_sqlite_path(&db_path),
            index: Arc::new(InMemorySearchIndex::new()),
            layout,
            dir,
        }
    }

    fn path(&self, name: &str) -> std::path::PathBuf {
        self.dir.path().join(name)
    }

    async fn resource(&self, id: i64, isbn: &str, status: ResourceStatus, deleted: bool) {
        let resource = Resource::new(id, isbn, status).soft_deleted(deleted);
        self.ctx.resources().save(&resource).await.unwrap();
    }

    /// Matching source and rendered files for each document id.
    fn content(&self, isbn: &str, ids: std::ops::RangeInclusive<i64>) {
        let xml_dir = self.layout.xml_dir(isbn);
        let html_dir = self.layout.html_dir(isbn);
        std::fs::create_dir_all(&xml_dir).unwrap();
        std::fs::create_dir_all(&html_dir).unwrap();
        std::fs::write(xml_dir.join(format!("book.{isbn}.xml")), "<book/>").unwrap();
        for id in ids {
            write(&xml_dir.join(format!("ch{id}.{isbn}.xml")), "<chapter/>");
            write(&html_dir.join(format!("ch{id}.{isbn}.html")), "<html/>");
        }
    }

    async fn index_docs(&self, isbn: &str, ids: impl IntoIterator<Item = i64>) {
        self.index.add_documents(isbn, &rows(isbn, ids)).await.unwrap();
    }

    async fn db_docs(&self, resource_id: i64, isbn: &str, ids: impl IntoIterator<Item = i64>) {
        self.ctx
            .doc_ids()
            .insert_batch(resource_id, &rows(isbn, ids))
            .await
            .unwrap();
    }

    async fn db_range(&self, resource_id: i64) -> Option<DocIdRange> {
        self.ctx.doc_ids().range(resource_id).await.unwrap()
    }

    async fn queued(&self, resource_id: i64, isbn: &str) -> u64 {
        self.ctx
            .transform_queue()
            .count(resource_id, isbn, QUEUE_STATUS_PENDING)
            .await
            .unwrap()
    }

    fn runner(&self) -> BatchRunner {
        self.runner_with(self.index.clone())
    }

    fn runner_with(&self, index: Arc<dyn SearchIndex>) -> BatchRunner {
        BatchRunner::new(
            Arc::new(self.ctx.resources()),
            Arc::new(self.ctx.doc_ids()),
            Arc::new(self.ctx.transform_queue()),
            index,
            FileSystemContentProbe::new(self.layout.clone()),
            RunnerConfig {
                page_size: 2,
                descending: true,
                query_timeout: Duration::from_secs(30),
            },
        )
    }

    async fn run(&self, selection: &Selection, options: &RunOptions) -> Summary {
        self.try_run(selection, options, false).await.unwrap()
    }

    async fn try_run(
        &self,
        selection: &Selection,
        options: &RunOptions,
        cancelled: bool,
    ) -> Result<Summary, ReconcileError> {
        run_with(&self.runner(), selection, options, cancelled).await
    }
}

async fn run_with(
    runner: &BatchRunner,
    selection: &Selection,
    options: &RunOptions,
    cancelled: bool,
) -> Result<Summary, ReconcileError> {
    let (event_tx, event_rx) = mpsc::channel(16);
    drop(event_rx);
    let (_cancel_tx, cancel_rx) = watch::channel(cancelled);
    runner.run(selection, options, event_tx, cancel_rx).await
}

/// Serves reads from an in-memory index but refuses every removal.
struct RemovalFailingIndex {
    inner: Arc<InMemorySearchIndex>,
}

#[async_trait]
impl SearchIndex for RemovalFailingIndex {
    async fn list_all(&self) -> IndexResult<IndexSnapshot> {
        self.inner.list_all().await
    }

    async fn list_documents(&self, isbn: &str) -> IndexResult<Option<IndexDocumentSet>> {
        self.inner.list_documents(isbn).await
    }

    async fn add_documents(&self, isbn: &str, documents: &[DocIdRow]) -> IndexResult<usize> {
        self.inner.add_documents(isbn, documents).await
    }

    async fn remove_documents(
        &self,
        _set: &IndexDocumentSet,
        _resource_id: i64,
    ) -> IndexResult<usize> {
        Err(IndexError::Task("index is read-only".to_string()))
    }
}

fn write(path: &Path, contents: &str) {
    std::fs::write(path, contents).unwrap();
}

fn rows(isbn: &str, ids: impl IntoIterator<Item = i64>) -> Vec<DocIdRow> {
    ids.into_iter()
        .map(|id| DocIdRow {
            document_id: id,
            filename: format!("ch{id}.{isbn}.html"),
        })
        .collect()
}

fn repair_all() -> RunOptions {
    RunOptions {
        fix_doc_ids_in_db: true,
        remove_bad_resources_from_index: true,
        remove_bad_database_doc_ids: true,
        add_bad_resources_to_transform_queue: true,
        ..Default::default()
    }
}

const ISBN_A: &str = "9780000000100";
const ISBN_B: &str = "9780000000200";
const ISBN_C: &str = "9780000000300";

#[tokio::test]
async fn missing_resource_is_queued_once() {
    let h = Harness::new().await;
    h.resource(100, ISBN_A, ResourceStatus::Active, false).await;
    h.content(ISBN_A, 1..=3);

    let options = RunOptions {
        add_bad_resources_to_transform_queue: true,
        ..Default::default()
    };
    let summary = h.run(&Selection::all(), &options).await;
    assert_eq!(summary.reason_count(InvalidReason::ResourceNotInIndex), 1);
    assert_eq!(summary.enqueued, 1);
    assert_eq!(h.queued(100, ISBN_A).await, 1);

    let again = h.run(&Selection::all(), &options).await;
    assert_eq!(again.enqueued, 0);
    assert_eq!(again.already_queued, 1);
    assert_eq!(h.queued(100, ISBN_A).await, 1);
}

#[tokio::test]
async fn deleted_resource_is_purged_from_index_and_database() {
    let h = Harness::new().await;
    h.resource(200, ISBN_B, ResourceStatus::Archived, true).await;
    h.index_docs(ISBN_B, 20..=24).await;
    h.db_docs(200, ISBN_B, 20..=24).await;

    let summary = h.run(&Selection::all(), &repair_all()).await;
    assert_eq!(summary.should_not_be_indexed, 1);
    assert_eq!(summary.documents_removed_from_index, 5);
    assert_eq!(summary.resources_removed_from_index, 1);
    assert_eq!(summary.db_rows_deleted, 5);
    assert!(h.index.list_documents(ISBN_B).await.unwrap().is_none());
    assert_eq!(h.db_range(200).await, None);
    assert_eq!(h.queued(200, ISBN_B).await, 0);
}

#[tokio::test]
async fn report_only_run_changes_nothing() {
    let h = Harness::new().await;
    h.resource(200, ISBN_B, ResourceStatus::Archived, true).await;
    h.index_docs(ISBN_B, 20..=24).await;
    h.db_docs(200, ISBN_B, 20..=24).await;
    h.resource(300, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_C, 10..=15);
    h.index_docs(ISBN_C, 10..=15).await;
    h.db_docs(300, ISBN_C, 10..=14).await;

    let summary = h.run(&Selection::all(), &RunOptions::default()).await;
    assert_eq!(summary.reason_count(InvalidReason::ResourceDocIdsDiffer), 1);
    assert_eq!(summary.records.len(), 2);
    assert_eq!(summary.documents_removed_from_index, 0);
    assert_eq!(summary.db_rows_deleted + summary.db_rows_inserted, 0);
    assert_eq!(h.index.document_count().await, 11);
    assert_eq!(h.db_range(300).await, Some(DocIdRange::new(10, 14)));
    assert_eq!(h.db_range(200).await, Some(DocIdRange::new(20, 24)));
}

#[tokio::test]
async fn differing_doc_ids_are_rebuilt_from_index() {
    let h = Harness::new().await;
    h.resource(300, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_C, 10..=15);
    h.index_docs(ISBN_C, 10..=15).await;
    h.db_docs(300, ISBN_C, 10..=14).await;

    let summary = h.run(&Selection::all(), &repair_all()).await;
    assert_eq!(summary.reason_count(InvalidReason::ResourceDocIdsDiffer), 1);
    assert_eq!(summary.resources_rebuilt, 1);
    assert_eq!(summary.db_rows_deleted, 5);
    assert_eq!(summary.db_rows_inserted, 6);
    assert_eq!(summary.enqueued, 0);
    assert_eq!(h.db_range(300).await, Some(DocIdRange::new(10, 15)));

    let rows = h.ctx.doc_ids().rows(300).await.unwrap();
    assert_eq!(rows.len(), 6);
    assert!(rows.iter().all(|r| r.filename.contains(ISBN_C)));

    // A second pass finds nothing left to repair
    let again = h.run(&Selection::all(), &repair_all()).await;
    assert_eq!(again.inconsistent(), 0);
    assert_eq!(again.resources_rebuilt, 0);
    assert_eq!(again.enqueued, 0);
}

#[tokio::test]
async fn non_contiguous_index_ids_are_not_rebuilt() {
    let h = Harness::new().await;
    h.resource(300, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_C, 10..=13);
    h.index_docs(ISBN_C, [10, 11, 13]).await;

    let summary = h.run(&Selection::all(), &repair_all()).await;
    assert_eq!(
        summary.reason_count(InvalidReason::ResourceDocIdsNotInDatabase),
        1
    );
    assert_eq!(summary.rebuilds_rejected, 1);
    assert_eq!(summary.resources_rebuilt, 0);
    assert_eq!(summary.enqueued, 1);
    assert_eq!(h.db_range(300).await, None);
}

#[tokio::test]
async fn consistent_resource_needs_no_remediation() {
    let h = Harness::new().await;
    h.resource(300, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_C, 10..=12);
    h.index_docs(ISBN_C, 10..=12).await;
    h.db_docs(300, ISBN_C, 10..=12).await;

    let summary = h.run(&Selection::all(), &repair_all()).await;
    assert_eq!(summary.resources_processed, 1);
    assert_eq!(summary.reason_count(InvalidReason::NotDefined), 1);
    assert_eq!(summary.inconsistent(), 0);
    assert!(summary.records.is_empty());
    assert_eq!(summary.xml_files, 4);
    assert_eq!(summary.html_files, 3);
}

#[tokio::test]
async fn first_matching_reason_wins() {
    let h = Harness::new().await;
    // Missing from the database and missing a rendered file: the database
    // finding is reported.
    h.resource(300, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_C, 10..=12);
    std::fs::remove_file(h.layout.html_dir(ISBN_C).join(format!("ch12.{ISBN_C}.html"))).unwrap();
    h.index_docs(ISBN_C, 10..=11).await;

    let summary = h.run(&Selection::all(), &RunOptions::default()).await;
    assert_eq!(
        summary.reason_count(InvalidReason::ResourceDocIdsNotInDatabase),
        1
    );
    assert_eq!(
        summary.reason_count(InvalidReason::HtmlFilesMissingForResource),
        0
    );
}

#[tokio::test]
async fn missing_rendered_file_is_queued() {
    let h = Harness::new().await;
    h.resource(300, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_C, 10..=12);
    std::fs::remove_file(h.layout.html_dir(ISBN_C).join(format!("ch12.{ISBN_C}.html"))).unwrap();
    h.index_docs(ISBN_C, 10..=11).await;
    h.db_docs(300, ISBN_C, 10..=11).await;

    let summary = h.run(&Selection::all(), &repair_all()).await;
    assert_eq!(
        summary.reason_count(InvalidReason::HtmlFilesMissingForResource),
        1
    );
    assert_eq!(h.queued(300, ISBN_C).await, 1);
    assert_eq!(h.db_range(300).await, Some(DocIdRange::new(10, 11)));
}

#[tokio::test]
async fn shared_isbn_keeps_index_documents() {
    let h = Harness::new().await;
    h.resource(400, ISBN_C, ResourceStatus::Inactive, false).await;
    h.resource(401, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_C, 1..=2);
    h.index_docs(ISBN_C, 1..=2).await;
    h.db_docs(401, ISBN_C, 1..=2).await;

    let summary = h.run(&Selection::all(), &repair_all()).await;
    assert_eq!(summary.should_not_be_indexed, 1);
    assert_eq!(summary.documents_removed_from_index, 0);
    assert_eq!(h.index.document_count().await, 2);
    assert_eq!(summary.inconsistent(), 0);
}

#[tokio::test]
async fn selection_by_isbn_and_window() {
    let h = Harness::new().await;
    for (id, isbn) in [(100, ISBN_A), (200, ISBN_B), (300, ISBN_C)] {
        h.resource(id, isbn, ResourceStatus::Active, false).await;
    }

    let by_isbn = h
        .run(&Selection::Isbns(vec![ISBN_B.to_string()]), &RunOptions::default())
        .await;
    assert_eq!(by_isbn.resources_processed, 1);

    let window = Selection::Range {
        min_id: Some(150),
        max_id: None,
        max_resources: None,
    };
    assert_eq!(h.run(&window, &RunOptions::default()).await.resources_processed, 2);

    let capped = Selection::Range {
        min_id: None,
        max_id: None,
        max_resources: Some(1),
    };
    let summary = h.run(&capped, &RunOptions::default()).await;
    assert_eq!(summary.resources_processed, 1);
    // Descending order starts at the highest id
    assert_eq!(summary.records[0].resource.id, 300);
}

#[tokio::test]
async fn truncate_and_reload_restores_rows_from_index() {
    let h = Harness::new().await;
    h.resource(100, ISBN_A, ResourceStatus::Active, false).await;
    h.resource(300, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_A, 1..=3);
    h.content(ISBN_C, 10..=12);
    h.index_docs(ISBN_A, 1..=3).await;
    h.index_docs(ISBN_C, 10..=12).await;
    h.db_docs(100, ISBN_A, 1..=2).await;
    h.db_docs(300, ISBN_C, 10..=12).await;

    let options = RunOptions {
        truncate_and_reload_table: true,
        ..Default::default()
    };
    let summary = h.run(&Selection::all(), &options).await;
    assert_eq!(summary.rows_truncated, Some(5));
    assert_eq!(summary.resources_reloaded, 2);
    assert_eq!(summary.inconsistent(), 0);
    assert_eq!(h.db_range(100).await, Some(DocIdRange::new(1, 3)));
    assert_eq!(h.db_range(300).await, Some(DocIdRange::new(10, 12)));
}

#[tokio::test]
async fn index_list_file_is_written() {
    let h = Harness::new().await;
    h.index_docs(ISBN_A, 1..=3).await;
    h.index_docs(ISBN_B, 7..=8).await;
    let path = h.path("out/index.jsonl");

    let options = RunOptions {
        generate_index_list_file: Some(path.clone()),
        ..Default::default()
    };
    let summary = h.run(&Selection::all(), &options).await;
    assert_eq!(summary.index_list_file.as_deref(), Some(path.as_path()));
    assert_eq!(summary.index_documents, 5);

    let contents = std::fs::read_to_string(&path).unwrap();
    let lines: Vec<serde_json::Value> = contents
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    assert_eq!(lines.len(), 5);
    assert_eq!(lines[0]["isbn"], ISBN_A);
    assert_eq!(lines[0]["document_id"], 1);
}

#[tokio::test]
async fn cancelled_run_returns_partial_summary() {
    let h = Harness::new().await;
    h.resource(100, ISBN_A, ResourceStatus::Active, false).await;

    let summary = h
        .try_run(&Selection::all(), &RunOptions::default(), true)
        .await
        .unwrap();
    assert!(summary.cancelled);
    assert_eq!(summary.resources_processed, 0);
}

#[tokio::test]
async fn failed_rebuild_keeps_existing_rows() {
    let h = Harness::new().await;
    h.resource(100, ISBN_A, ResourceStatus::Active, false).await;
    h.content(ISBN_A, 20..=22);
    h.index_docs(ISBN_A, 20..=22).await;
    h.db_docs(100, ISBN_A, 10..=11).await;
    // Document id 21 is still held by a row of another resource
    h.db_docs(999, ISBN_B, [21]).await;

    let summary = h.run(&Selection::all(), &repair_all()).await;
    assert_eq!(summary.reason_count(InvalidReason::ResourceDocIdsDiffer), 1);
    assert_eq!(summary.resources_rebuilt, 0);
    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].resource_id, 100);
    assert_eq!(
        summary.failures[0].reason,
        Some(InvalidReason::ResourceDocIdsDiffer)
    );
    assert_eq!(h.db_range(100).await, Some(DocIdRange::new(10, 11)));
    assert_eq!(h.ctx.doc_ids().rows(100).await.unwrap().len(), 2);
    assert_eq!(h.db_range(999).await, Some(DocIdRange::new(21, 21)));
}

#[tokio::test]
async fn index_removal_failure_still_deletes_database_rows() {
    let h = Harness::new().await;
    h.resource(200, ISBN_B, ResourceStatus::Archived, true).await;
    h.index_docs(ISBN_B, 20..=24).await;
    h.db_docs(200, ISBN_B, 20..=24).await;
    h.resource(100, ISBN_A, ResourceStatus::Active, false).await;
    h.content(ISBN_A, 1..=3);

    let runner = h.runner_with(Arc::new(RemovalFailingIndex {
        inner: h.index.clone(),
    }));
    let summary = run_with(&runner, &Selection::all(), &repair_all(), false)
        .await
        .unwrap();

    assert_eq!(summary.failures.len(), 1);
    assert_eq!(summary.failures[0].resource_id, 200);
    assert_eq!(summary.failures[0].reason, None);
    assert_eq!(h.db_range(200).await, None);
    assert_eq!(h.index.document_count().await, 5);

    // The run carries on with the next resource
    assert_eq!(summary.resources_processed, 2);
    assert_eq!(summary.reason_count(InvalidReason::ResourceNotInIndex), 1);
    assert_eq!(h.queued(100, ISBN_A).await, 1);
}

#[cfg(unix)]
#[tokio::test]
async fn content_read_failure_is_counted_and_run_continues() {
    let h = Harness::new().await;
    h.resource(300, ISBN_C, ResourceStatus::Active, false).await;
    h.content(ISBN_C, 10..=12);
    std::os::unix::fs::symlink(
        h.path("nowhere.xml"),
        h.layout.xml_dir(ISBN_C).join(format!("ch13.{ISBN_C}.xml")),
    )
    .unwrap();
    h.resource(100, ISBN_A, ResourceStatus::Active, false).await;
    h.content(ISBN_A, 1..=3);
    h.index_docs(ISBN_A, 1..=3).await;
    h.db_docs(100, ISBN_A, 1..=3).await;

    let summary = h.run(&Selection::all(), &RunOptions::default()).await;
    assert_eq!(summary.resources_processed, 2);
    assert_eq!(summary.probe_failures, 1);
    assert!(summary.failures.is_empty());
    assert_eq!(summary.reason_count(InvalidReason::NotDefined), 1);

    let record = summary
        .records
        .iter()
        .find(|r| r.resource.id == 300)
        .unwrap();
    assert_eq!(record.content_status, ContentStatusCode::Exception);
}
