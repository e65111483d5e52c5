//! Application settings.

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::reconcile::RunnerConfig;
use crate::repository::util::is_postgres_url;
use crate::repository::DieselDbContext;
use crate::search_index::{IndexResult, TantivySearchIndex};
use crate::storage::ContentLayout;

use super::DEFAULT_DATABASE_FILENAME;

const XML_SUBDIR: &str = "content/xml";
const HTML_SUBDIR: &str = "content/html";
const INDEX_SUBDIR: &str = "index";

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Base data directory.
    pub data_dir: PathBuf,
    /// Database filename.
    pub database_filename: String,
    /// Database URL (overrides data_dir/database_filename if set).
    /// Supports sqlite: and postgres:// URLs.
    pub database_url: Option<String>,
    /// Root of per-isbn source directories.
    pub xml_root: PathBuf,
    /// Root of per-isbn rendered directories.
    pub html_root: PathBuf,
    /// Search index directory.
    pub index_dir: PathBuf,
    /// Timeout for a single index or database call, in seconds.
    pub query_timeout_secs: u64,
    /// Resources fetched per catalog page.
    pub page_size: usize,
    /// Process resources from the highest id down.
    pub descending: bool,
    pub source_extension: String,
    pub rendered_extension: String,
    pub manifest_prefixes: Vec<String>,
    pub glossary_marker: String,
    pub search_metadata_prefix: String,
}

impl Default for Settings {
    fn default() -> Self {
        // ~/Documents/docsync, falling back to the home dir, then the CWD
        let data_dir = dirs::document_dir()
            .or_else(dirs::home_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("docsync");
        Self::with_data_dir(data_dir)
    }
}

impl Settings {
    /// Create settings with a custom data directory.
    pub fn with_data_dir(data_dir: PathBuf) -> Self {
        let runner = RunnerConfig::default();
        let layout = ContentLayout::new(data_dir.join(XML_SUBDIR), data_dir.join(HTML_SUBDIR));
        Self {
            xml_root: layout.xml_root,
            html_root: layout.html_root,
            index_dir: data_dir.join(INDEX_SUBDIR),
            data_dir,
            database_filename: DEFAULT_DATABASE_FILENAME.to_string(),
            database_url: None,
            query_timeout_secs: runner.query_timeout.as_secs(),
            page_size: runner.page_size,
            descending: runner.descending,
            source_extension: layout.source_extension,
            rendered_extension: layout.rendered_extension,
            manifest_prefixes: layout.manifest_prefixes,
            glossary_marker: layout.glossary_marker,
            search_metadata_prefix: layout.search_metadata_prefix,
        }
    }

    /// Re-root every directory that hangs off the data directory.
    pub fn set_data_dir(&mut self, data_dir: PathBuf) {
        self.xml_root = data_dir.join(XML_SUBDIR);
        self.html_root = data_dir.join(HTML_SUBDIR);
        self.index_dir = data_dir.join(INDEX_SUBDIR);
        self.data_dir = data_dir;
    }

    /// Get the database URL, constructing from path if not explicitly set.
    pub fn database_url(&self) -> String {
        if let Some(ref url) = self.database_url {
            url.clone()
        } else {
            let path = self.data_dir.join(&self.database_filename);
            format!("sqlite:{}", path.display())
        }
    }

    /// Check if using PostgreSQL (vs SQLite).
    pub fn is_postgres(&self) -> bool {
        self.database_url
            .as_ref()
            .is_some_and(|url| is_postgres_url(url))
    }

    /// Get the full path to the database (for SQLite file-based databases).
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join(&self.database_filename)
    }

    /// Default destination for `reconcile --generate-index-list-file`.
    pub fn index_list_path(&self) -> PathBuf {
        self.data_dir.join("index_list.jsonl")
    }

    /// For SQLite checks the file exists; PostgreSQL is assumed to exist.
    pub fn database_exists(&self) -> bool {
        self.is_postgres() || self.database_path().exists()
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_secs(self.query_timeout_secs)
    }

    pub fn content_layout(&self) -> ContentLayout {
        ContentLayout {
            xml_root: self.xml_root.clone(),
            html_root: self.html_root.clone(),
            source_extension: self.source_extension.clone(),
            rendered_extension: self.rendered_extension.clone(),
            manifest_prefixes: self.manifest_prefixes.clone(),
            glossary_marker: self.glossary_marker.clone(),
            search_metadata_prefix: self.search_metadata_prefix.clone(),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            page_size: self.page_size,
            descending: self.descending,
            query_timeout: self.query_timeout(),
        }
    }

    /// Ensure all directories exist.
    pub fn ensure_directories(&self) -> std::io::Result<()> {
        for (label, dir) in [
            ("data", &self.data_dir),
            ("source content", &self.xml_root),
            ("rendered content", &self.html_root),
            ("index", &self.index_dir),
        ] {
            tracing::debug!("{} dir: {}", label, dir.display());
            fs::create_dir_all(dir).map_err(|e| {
                std::io::Error::new(
                    e.kind(),
                    format!(
                        "Failed to create {} directory '{}': {}",
                        label,
                        dir.display(),
                        e
                    ),
                )
            })?;
        }
        Ok(())
    }

    /// Create a database context using the configured database URL or path.
    pub fn create_db_context(&self) -> Result<DieselDbContext, diesel::result::Error> {
        DieselDbContext::from_url(&self.database_url())
    }

    /// Create a database context and verify the connection works.
    pub async fn create_db_context_validated(&self) -> Result<DieselDbContext, String> {
        let ctx = self
            .create_db_context()
            .map_err(|e| format!("Failed to create database context: {}", e))?;
        ctx.test_connection()
            .await
            .map_err(|e| format!("Failed to connect to database: {}", e))?;
        Ok(ctx)
    }

    /// Open the search index, creating it when missing.
    pub fn open_index(&self) -> IndexResult<TantivySearchIndex> {
        TantivySearchIndex::open_or_create(&self.index_dir)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paths_follow_data_dir() {
        let mut settings = Settings::with_data_dir(PathBuf::from("/data"));
        assert_eq!(settings.database_url(), "sqlite:/data/docsync.db");
        assert_eq!(settings.index_dir, PathBuf::from("/data/index"));
        assert_eq!(
            settings.index_list_path(),
            PathBuf::from("/data/index_list.jsonl")
        );

        settings.set_data_dir(PathBuf::from("/other"));
        assert_eq!(settings.xml_root, PathBuf::from("/other/content/xml"));
        assert_eq!(
            settings.content_layout().html_dir("978"),
            PathBuf::from("/other/content/html/978")
        );
    }

    #[test]
    fn test_runner_defaults() {
        let settings = Settings::with_data_dir(PathBuf::from("/data"));
        let runner = settings.runner_config();
        assert_eq!(runner.query_timeout, Duration::from_secs(600));
        assert!(runner.descending);
    }
}
