//! Keyset pagination over the resource catalog.

use tracing::debug;

use super::backend::{ResourceCatalog, StoreResult};
use super::options::Selection;
use crate::models::Resource;

/// Yields the selected resources one page at a time, ordered by id.
///
/// Each page resumes after the last id of the previous one, so resources
/// added behind the cursor during a run are not revisited.
pub struct ResourcePager<'a> {
    catalog: &'a dyn ResourceCatalog,
    selection: Selection,
    page_size: usize,
    descending: bool,
    min_id: Option<i64>,
    max_id: Option<i64>,
    remaining: Option<usize>,
    exhausted: bool,
}

impl<'a> ResourcePager<'a> {
    pub fn new(
        catalog: &'a dyn ResourceCatalog,
        selection: &Selection,
        page_size: usize,
        descending: bool,
    ) -> Self {
        let (min_id, max_id, remaining) = match selection {
            Selection::Range {
                min_id,
                max_id,
                max_resources,
            } => (*min_id, *max_id, *max_resources),
            Selection::Isbns(_) => (None, None, None),
        };
        Self {
            catalog,
            selection: selection.clone(),
            page_size: page_size.max(1),
            descending,
            min_id,
            max_id,
            remaining,
            exhausted: false,
        }
    }

    /// Next page; empty once the selection is exhausted.
    pub async fn next_page(&mut self) -> StoreResult<Vec<Resource>> {
        if self.exhausted || self.remaining == Some(0) {
            return Ok(Vec::new());
        }

        if let Selection::Isbns(isbns) = &self.selection {
            self.exhausted = true;
            let mut resources = self.catalog.resources_by_isbns(isbns).await?;
            if self.descending {
                resources.sort_by(|a, b| b.id.cmp(&a.id));
            } else {
                resources.sort_by_key(|r| r.id);
            }
            return Ok(resources);
        }

        let limit = match self.remaining {
            Some(remaining) => remaining.min(self.page_size),
            None => self.page_size,
        };
        let page = self
            .catalog
            .resources_in_range(self.min_id, self.max_id, limit, self.descending)
            .await?;
        debug!(
            min_id = ?self.min_id,
            max_id = ?self.max_id,
            fetched = page.len(),
            "Fetched resource page"
        );

        if page.len() < limit {
            self.exhausted = true;
        }
        if let Some(last) = page.last() {
            if self.descending {
                self.max_id = Some(last.id - 1);
            } else {
                self.min_id = Some(last.id + 1);
            }
        }
        if let Some(remaining) = self.remaining.as_mut() {
            *remaining = remaining.saturating_sub(page.len());
        }
        Ok(page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResourceStatus;
    use crate::repository::{migrations, DbPool, DieselResourceRepository};
    use tempfile::tempdir;

    async fn catalog_with(ids: std::ops::RangeInclusive<i64>) -> (DieselResourceRepository, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("test.db");
        migrations::run_migrations(&format!("sqlite:{}", db_path.display()))
            .await
            .unwrap();
        let repo = DieselResourceRepository::new(DbPool::sqlite_from_path(&db_path));
        for id in ids {
            let isbn = if id % 2 == 0 { "even" } else { "odd" };
            repo.save(&Resource::new(id, isbn, ResourceStatus::Active))
                .await
                .unwrap();
        }
        (repo, dir)
    }

    async fn drain(pager: &mut ResourcePager<'_>) -> Vec<i64> {
        let mut ids = Vec::new();
        loop {
            let page = pager.next_page().await.unwrap();
            if page.is_empty() {
                break;
            }
            ids.extend(page.iter().map(|r| r.id));
        }
        ids
    }

    #[tokio::test]
    async fn test_pages_descending_across_boundaries() {
        let (repo, _dir) = catalog_with(1..=7).await;
        let mut pager = ResourcePager::new(&repo, &Selection::all(), 3, true);
        assert_eq!(drain(&mut pager).await, vec![7, 6, 5, 4, 3, 2, 1]);
    }

    #[tokio::test]
    async fn test_max_resources_and_window() {
        let (repo, _dir) = catalog_with(1..=20).await;
        let selection = Selection::Range {
            min_id: Some(5),
            max_id: Some(15),
            max_resources: Some(4),
        };
        let mut pager = ResourcePager::new(&repo, &selection, 3, false);
        assert_eq!(drain(&mut pager).await, vec![5, 6, 7, 8]);
    }

    #[tokio::test]
    async fn test_isbn_selection_single_page() {
        let (repo, _dir) = catalog_with(1..=6).await;
        let selection = Selection::Isbns(vec!["even".to_string()]);
        let mut pager = ResourcePager::new(&repo, &selection, 2, true);
        assert_eq!(drain(&mut pager).await, vec![6, 4, 2]);
    }
}
