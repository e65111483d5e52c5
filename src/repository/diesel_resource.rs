//! Diesel-backed resource catalog.
//!
//! Works with both SQLite and PostgreSQL through [`DbPool`].

use async_trait::async_trait;
use chrono::Utc;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use super::models::{NewResource, ResourceRecord};
use super::pool::{DbPool, DieselError};
use crate::models::{Resource, ResourceStatus};
use crate::reconcile::backend::{ResourceCatalog, StoreResult};
use crate::schema::resources;
use crate::{with_conn, with_conn_split};

impl From<ResourceRecord> for Resource {
    fn from(record: ResourceRecord) -> Self {
        Resource {
            id: record.id,
            isbn: record.isbn,
            title: record.title,
            status: ResourceStatus::from_str(&record.status),
            soft_deleted: record.soft_deleted,
        }
    }
}

#[derive(Clone)]
pub struct DieselResourceRepository {
    pool: DbPool,
}

impl DieselResourceRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Get a resource by ID.
    pub async fn get(&self, id: i64) -> Result<Option<Resource>, DieselError> {
        with_conn!(self.pool, conn => {
            resources::table
                .find(id)
                .first::<ResourceRecord>(&mut conn)
                .await
                .optional()
                .map(|opt| opt.map(Resource::from))
        })
    }

    /// Insert or update a resource.
    pub async fn save(&self, resource: &Resource) -> Result<(), DieselError> {
        let now = Utc::now().to_rfc3339();
        let record = NewResource {
            id: resource.id,
            isbn: &resource.isbn,
            title: &resource.title,
            status: resource.status.as_str(),
            soft_deleted: resource.soft_deleted,
            updated_at: &now,
        };

        with_conn_split!(self.pool,
            sqlite: conn => {
                diesel::replace_into(resources::table)
                    .values(&record)
                    .execute(&mut conn)
                    .await?;
                Ok(())
            },
            postgres: conn => {
                diesel::insert_into(resources::table)
                    .values(&record)
                    .on_conflict(resources::id)
                    .do_update()
                    .set(&record)
                    .execute(&mut conn)
                    .await?;
                Ok(())
            }
        )
    }

    /// One page of resources inside an id window.
    pub async fn in_range(
        &self,
        min_id: Option<i64>,
        max_id: Option<i64>,
        limit: usize,
        descending: bool,
    ) -> Result<Vec<Resource>, DieselError> {
        with_conn!(self.pool, conn => {
            let mut query = resources::table.into_boxed();
            if let Some(min_id) = min_id {
                query = query.filter(resources::id.ge(min_id));
            }
            if let Some(max_id) = max_id {
                query = query.filter(resources::id.le(max_id));
            }
            query = if descending {
                query.order(resources::id.desc())
            } else {
                query.order(resources::id.asc())
            };
            query
                .limit(limit as i64)
                .load::<ResourceRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Resource::from).collect())
        })
    }

    /// All resources carrying any of the given isbns, newest id first.
    pub async fn by_isbns(&self, isbns: &[String]) -> Result<Vec<Resource>, DieselError> {
        if isbns.is_empty() {
            return Ok(Vec::new());
        }
        with_conn!(self.pool, conn => {
            resources::table
                .filter(resources::isbn.eq_any(isbns))
                .order(resources::id.desc())
                .load::<ResourceRecord>(&mut conn)
                .await
                .map(|records| records.into_iter().map(Resource::from).collect())
        })
    }
}

#[async_trait]
impl ResourceCatalog for DieselResourceRepository {
    async fn resources_in_range(
        &self,
        min_id: Option<i64>,
        max_id: Option<i64>,
        limit: usize,
        descending: bool,
    ) -> StoreResult<Vec<Resource>> {
        Ok(self.in_range(min_id, max_id, limit, descending).await?)
    }

    async fn resources_by_isbns(&self, isbns: &[String]) -> StoreResult<Vec<Resource>> {
        Ok(self.by_isbns(isbns).await?)
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

    #[tokio::test]
    async fn test_resource_crud() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselResourceRepository::new(pool);

        let resource = Resource::new(100, "9781111111111", ResourceStatus::Active);
        repo.save(&resource).await.unwrap();

        let fetched = repo.get(100).await.unwrap().unwrap();
        assert_eq!(fetched, resource);

        repo.save(&resource.clone().soft_deleted(true)).await.unwrap();
        assert!(repo.get(100).await.unwrap().unwrap().soft_deleted);
        assert!(repo.get(101).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_range_ordering_and_limit() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselResourceRepository::new(pool);
        for id in 1..=10 {
            repo.save(&Resource::new(id, format!("isbn-{id}"), ResourceStatus::Active))
                .await
                .unwrap();
        }

        let desc = repo.in_range(Some(3), Some(8), 4, true).await.unwrap();
        let ids: Vec<i64> = desc.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![8, 7, 6, 5]);

        let asc = repo.in_range(None, Some(3), 100, false).await.unwrap();
        let ids: Vec<i64> = asc.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_by_isbns_returns_every_edition() {
        let (pool, _dir) = setup_test_db().await;
        let repo = DieselResourceRepository::new(pool);
        repo.save(&Resource::new(1, "shared", ResourceStatus::Inactive))
            .await
            .unwrap();
        repo.save(&Resource::new(2, "shared", ResourceStatus::Active))
            .await
            .unwrap();
        repo.save(&Resource::new(3, "other", ResourceStatus::Active))
            .await
            .unwrap();

        let found = repo.by_isbns(&["shared".to_string()]).await.unwrap();
        assert_eq!(found.len(), 2);
        assert!(repo.by_isbns(&[]).await.unwrap().is_empty());
    }
}
