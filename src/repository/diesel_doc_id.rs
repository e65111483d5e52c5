//! Diesel-backed document-id store.
//!
//! One row per `(document_id, filename, resource_id)`. A resource's range is
//! the min/max of its rows.

use std::collections::HashMap;

use async_trait::async_trait;
use diesel::dsl::{max as sql_max, min as sql_min};
use diesel::prelude::*;
use diesel_async::{AsyncConnection, RunQueryDsl};

use super::models::{DocIdRecord, NewDocId};
use super::pool::{DbPool, DieselError};
use crate::models::{DocIdRange, DocIdRow};
use crate::reconcile::backend::{DocIdStore, StoreResult};
use crate::schema::resource_doc_ids;
use crate::with_conn;

#[derive(Clone)]
pub struct DieselDocIdRepository {
    pool: DbPool,
}

impl DieselDocIdRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn all_ranges(&self) -> Result<HashMap<i64, DocIdRange>, DieselError> {
        let rows: Vec<(i64, Option<i64>, Option<i64>)> = with_conn!(self.pool, conn => {
            resource_doc_ids::table
                .group_by(resource_doc_ids::resource_id)
                .select((
                    resource_doc_ids::resource_id,
                    sql_min(resource_doc_ids::document_id),
                    sql_max(resource_doc_ids::document_id),
                ))
                .load(&mut conn)
                .await?
        });

        Ok(rows
            .into_iter()
            .filter_map(|(resource_id, lo, hi)| Some((resource_id, DocIdRange::new(lo?, hi?))))
            .collect())
    }

    pub async fn range(&self, resource_id: i64) -> Result<Option<DocIdRange>, DieselError> {
        let (lo, hi): (Option<i64>, Option<i64>) = with_conn!(self.pool, conn => {
            resource_doc_ids::table
                .filter(resource_doc_ids::resource_id.eq(resource_id))
                .select((
                    sql_min(resource_doc_ids::document_id),
                    sql_max(resource_doc_ids::document_id),
                ))
                .first(&mut conn)
                .await?
        });

        Ok(lo.zip(hi).map(|(lo, hi)| DocIdRange::new(lo, hi)))
    }

    /// Rows for one resource ordered by document id.
    pub async fn rows(&self, resource_id: i64) -> Result<Vec<DocIdRow>, DieselError> {
        let records: Vec<DocIdRecord> = with_conn!(self.pool, conn => {
            resource_doc_ids::table
                .filter(resource_doc_ids::resource_id.eq(resource_id))
                .order(resource_doc_ids::document_id.asc())
                .load::<DocIdRecord>(&mut conn)
                .await?
        });

        Ok(records
            .into_iter()
            .map(|r| DocIdRow {
                document_id: r.document_id,
                filename: r.filename,
            })
            .collect())
    }

    pub async fn delete_by_resource(&self, resource_id: i64) -> Result<usize, DieselError> {
        with_conn!(self.pool, conn => {
            diesel::delete(
                resource_doc_ids::table.filter(resource_doc_ids::resource_id.eq(resource_id)),
            )
            .execute(&mut conn)
            .await
        })
    }

    /// Insert rows for one resource. All rows land or none do.
    pub async fn insert_batch(
        &self,
        resource_id: i64,
        rows: &[DocIdRow],
    ) -> Result<usize, DieselError> {
        let records = new_records(resource_id, rows);
        let records = &records;

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let mut inserted = 0usize;
                    for record in records {
                        inserted += diesel::insert_into(resource_doc_ids::table)
                            .values(record)
                            .execute(conn)
                            .await?;
                    }
                    Ok(inserted)
                })
            })
            .await
        })
    }

    /// Replace a resource's rows in one transaction.
    ///
    /// Returns `(deleted, inserted)`. On error the previous rows are kept.
    pub async fn replace_rows(
        &self,
        resource_id: i64,
        rows: &[DocIdRow],
    ) -> Result<(usize, usize), DieselError> {
        let records = new_records(resource_id, rows);
        let records = &records;

        with_conn!(self.pool, conn => {
            conn.transaction(|conn| {
                Box::pin(async move {
                    let deleted = diesel::delete(
                        resource_doc_ids::table
                            .filter(resource_doc_ids::resource_id.eq(resource_id)),
                    )
                    .execute(conn)
                    .await?;

                    let mut inserted = 0usize;
                    for record in records {
                        inserted += diesel::insert_into(resource_doc_ids::table)
                            .values(record)
                            .execute(conn)
                            .await?;
                    }
                    Ok((deleted, inserted))
                })
            })
            .await
        })
    }

    pub async fn truncate(&self) -> Result<usize, DieselError> {
        with_conn!(self.pool, conn => {
            diesel::delete(resource_doc_ids::table)
                .execute(&mut conn)
                .await
        })
    }
}

fn new_records(resource_id: i64, rows: &[DocIdRow]) -> Vec<NewDocId<'_>> {
    rows.iter()
        .map(|row| NewDocId {
            document_id: row.document_id,
            filename: &row.filename,
            resource_id,
        })
        .collect()
}

#[async_trait]
impl DocIdStore for DieselDocIdRepository {
    async fn all_ranges(&self) -> StoreResult<HashMap<i64, DocIdRange>> {
        Ok(DieselDocIdRepository::all_ranges(self).await?)
    }

    async fn range(&self, resource_id: i64) -> StoreResult<Option<DocIdRange>> {
        Ok(DieselDocIdRepository::range(self, resource_id).await?)
    }

    async fn delete_by_resource(&self, resource_id: i64) -> StoreResult<usize> {
        Ok(DieselDocIdRepository::delete_by_resource(self, resource_id).await?)
    }

    async fn insert_batch(&self, resource_id: i64, rows: &[DocIdRow]) -> StoreResult<usize> {
        Ok(DieselDocIdRepository::insert_batch(self, resource_id, rows).await?)
    }

    async fn replace_rows(
        &self,
        resource_id: i64,
        rows: &[DocIdRow],
    ) -> StoreResult<(usize, usize)> {
        Ok(DieselDocIdRepository::replace_rows(self, resource_id, rows).await?)
    }

    async fn truncate(&self) -> StoreResult<usize> {
        Ok(DieselDocIdRepository::truncate(self).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::migrations;
    use tempfile::tempdir;

    async fn setup_test_db() -> (DbPool, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        migrations::run_migrations(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        (DbPool::sqlite_from_path(&db_path), dir)
    }

    fn rows(ids: std::ops::RangeInclusive<i64>) -> Vec<DocIdRow> {
        ids.map(|id| DocIdRow {
            document_id: id,
            filename: format!("doc{id}.html"),
        })
        .collect()
    }

    #[tokio::test]
    async fn test_insert_range_delete() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselDocIdRepository::new(pool);

        assert!(repo.range(7).await.unwrap().is_none());

        assert_eq!(repo.insert_batch(7, &rows(10..=14)).await.unwrap(), 5);
        assert_eq!(repo.range(7).await.unwrap(), Some(DocIdRange::new(10, 14)));
        assert_eq!(repo.rows(7).await.unwrap().len(), 5);

        assert_eq!(repo.delete_by_resource(7).await.unwrap(), 5);
        assert_eq!(repo.delete_by_resource(7).await.unwrap(), 0);
        assert!(repo.range(7).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_all_ranges_and_truncate() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselDocIdRepository::new(pool);
        repo.insert_batch(1, &rows(1..=3)).await.unwrap();
        repo.insert_batch(2, &rows(4..=1203)).await.unwrap();

        let ranges = repo.all_ranges().await.unwrap();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[&1], DocIdRange::new(1, 3));
        assert_eq!(ranges[&2], DocIdRange::new(4, 1203));

        assert_eq!(repo.truncate().await.unwrap(), 1203);
        assert!(repo.all_ranges().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_insert_batch_is_all_or_nothing() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselDocIdRepository::new(pool);
        repo.insert_batch(1, &rows(5..=5)).await.unwrap();

        // Row 5 collides on the primary key after 3 and 4 were written
        assert!(repo.insert_batch(2, &rows(3..=6)).await.is_err());
        assert!(repo.range(2).await.unwrap().is_none());
        assert_eq!(repo.range(1).await.unwrap(), Some(DocIdRange::new(5, 5)));
    }

    #[tokio::test]
    async fn test_replace_rows() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselDocIdRepository::new(pool);
        repo.insert_batch(1, &rows(10..=11)).await.unwrap();

        assert_eq!(repo.replace_rows(1, &rows(20..=22)).await.unwrap(), (2, 3));
        assert_eq!(repo.range(1).await.unwrap(), Some(DocIdRange::new(20, 22)));
        assert_eq!(repo.replace_rows(1, &[]).await.unwrap(), (3, 0));
        assert!(repo.range(1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_failed_replace_keeps_previous_rows() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselDocIdRepository::new(pool);
        repo.insert_batch(1, &rows(10..=11)).await.unwrap();
        repo.insert_batch(2, &rows(21..=21)).await.unwrap();

        assert!(repo.replace_rows(1, &rows(20..=22)).await.is_err());
        assert_eq!(repo.range(1).await.unwrap(), Some(DocIdRange::new(10, 11)));
        assert_eq!(repo.rows(1).await.unwrap().len(), 2);
        assert_eq!(repo.range(2).await.unwrap(), Some(DocIdRange::new(21, 21)));
    }
}
