//! Diesel-backed transform queue.

use async_trait::async_trait;
use chrono::Utc;
use diesel::dsl::count_star;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewTransformQueueEntry, TransformQueueRecord};
use super::pool::{DbPool, DieselError};
use crate::reconcile::backend::{StoreResult, TransformQueue};
use crate::schema::transform_queue;
use crate::with_conn;

#[derive(Clone)]
pub struct DieselTransformQueueRepository {
    pool: DbPool,
}

impl DieselTransformQueueRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub async fn count(
        &self,
        resource_id: i64,
        isbn: &str,
        status: &str,
    ) -> Result<u64, DieselError> {
        let n: i64 = with_conn!(self.pool, conn => {
            transform_queue::table
                .filter(transform_queue::resource_id.eq(resource_id))
                .filter(transform_queue::isbn.eq(isbn))
                .filter(transform_queue::status.eq(status))
                .select(count_star())
                .first(&mut conn)
                .await?
        });
        Ok(n.max(0) as u64)
    }

    pub async fn enqueue(
        &self,
        resource_id: i64,
        isbn: &str,
        status: &str,
    ) -> Result<(), DieselError> {
        let now = Utc::now().to_rfc3339();
        let entry = NewTransformQueueEntry {
            resource_id,
            isbn,
            status,
            queued_at: &now,
        };
        with_conn!(self.pool, conn => {
            diesel::insert_into(transform_queue::table)
                .values(&entry)
                .execute(&mut conn)
                .await?;
            Ok(())
        })
    }

    /// Number of entries with the given status.
    pub async fn count_by_status(&self, status: &str) -> Result<u64, DieselError> {
        let n: i64 = with_conn!(self.pool, conn => {
            transform_queue::table
                .filter(transform_queue::status.eq(status))
                .select(count_star())
                .first(&mut conn)
                .await?
        });
        Ok(n.max(0) as u64)
    }

    /// Entries with the given status, oldest first.
    pub async fn list_by_status(
        &self,
        status: &str,
        limit: usize,
    ) -> Result<Vec<TransformQueueRecord>, DieselError> {
        with_conn!(self.pool, conn => {
            transform_queue::table
                .filter(transform_queue::status.eq(status))
                .order(transform_queue::id.asc())
                .limit(limit as i64)
                .load::<TransformQueueRecord>(&mut conn)
                .await
        })
    }
}

#[async_trait]
impl TransformQueue for DieselTransformQueueRepository {
    async fn count(&self, resource_id: i64, isbn: &str, status: &str) -> StoreResult<u64> {
        Ok(DieselTransformQueueRepository::count(self, resource_id, isbn, status).await?)
    }

    async fn enqueue(&self, resource_id: i64, isbn: &str, status: &str) -> StoreResult<()> {
        Ok(DieselTransformQueueRepository::enqueue(self, resource_id, isbn, status).await?)
    }
}
