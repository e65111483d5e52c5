//! Configuration management using the prefer crate.
//!
//! Precedence, lowest to highest: built-in defaults, the config file
//! (`--config`, next to `--target`, or discovered by prefer), then the
//! `DATABASE_URL` environment variable.

mod settings;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use settings::Settings;

use crate::repository::util::{is_postgres_url, validate_database_url};

/// Default SQLite database filename.
pub const DEFAULT_DATABASE_FILENAME: &str = "docsync.db";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to parse {format} config {path}: {message}")]
    Parse {
        format: &'static str,
        path: PathBuf,
        message: String,
    },
    #[error("{0}")]
    DatabaseUrl(String),
}

/// Content store naming conventions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, prefer::FromValue)]
pub struct ContentConfig {
    /// Root of per-isbn source directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub xml_root: Option<String>,
    /// Root of per-isbn rendered directories.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub html_root: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rendered_extension: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    #[prefer(default)]
    pub manifest_prefixes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub glossary_marker: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_metadata_prefix: Option<String>,
}

impl ContentConfig {
    pub fn is_default(&self) -> bool {
        *self == Self::default()
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize, prefer::FromValue)]
pub struct Config {
    /// Data directory path.
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "target")]
    pub data_dir: Option<String>,
    /// Database filename or URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// Search index directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index_dir: Option<String>,
    /// Timeout for a single index or database call, in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_timeout_secs: Option<u64>,
    /// Resources fetched per catalog page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_size: Option<usize>,
    /// Process resources from the highest id down.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub descending: Option<bool>,
    #[serde(default, skip_serializing_if = "ContentConfig::is_default")]
    #[prefer(default)]
    pub content: ContentConfig,
    /// Path to the config file this was loaded from (not serialized).
    #[serde(skip)]
    #[prefer(skip)]
    pub source_path: Option<PathBuf>,
}

impl Config {
    /// Load configuration using prefer for discovery of `docsync.*` files in
    /// standard locations.
    pub async fn load() -> Result<Self, ConfigError> {
        match prefer::load("docsync").await {
            Ok(pref_config) => match pref_config.source_path() {
                Some(path) => Self::load_from_path(path).await,
                None => Ok(Self::default()),
            },
            Err(e) => {
                tracing::debug!("No config file discovered: {}", e);
                Ok(Self::default())
            }
        }
    }

    /// Load configuration from a specific file path.
    /// JSON, TOML and YAML are picked by file extension.
    pub async fn load_from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let mut config = Self::parse(&contents, path)?;
        config.source_path = Some(path.to_path_buf());
        Ok(config)
    }

    fn parse(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("json");
        let parse_error = |format: &'static str, message: String| ConfigError::Parse {
            format,
            path: path.to_path_buf(),
            message,
        };
        match ext {
            "toml" => toml::from_str(contents).map_err(|e| parse_error("TOML", e.to_string())),
            "yaml" | "yml" => {
                serde_yaml::from_str(contents).map_err(|e| parse_error("YAML", e.to_string()))
            }
            _ => serde_json::from_str(contents).map_err(|e| parse_error("JSON", e.to_string())),
        }
    }

    /// Get the base directory for resolving relative paths.
    pub fn base_dir(&self) -> Option<PathBuf> {
        self.source_path
            .as_ref()
            .and_then(|p| p.parent().map(|p| p.to_path_buf()))
    }

    /// Resolve a path that may be relative to the config file.
    /// - Absolute paths are returned as-is
    /// - Paths starting with ~ are expanded
    /// - Relative paths are resolved against `base_dir`
    pub fn resolve_path(&self, path_str: &str, base_dir: &Path) -> PathBuf {
        let expanded = shellexpand::tilde(path_str);
        let path = Path::new(expanded.as_ref());

        if path.is_absolute() {
            path.to_path_buf()
        } else {
            base_dir.join(path)
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings, base_dir: &Path) {
        if let Some(ref data_dir) = self.data_dir {
            settings.set_data_dir(self.resolve_path(data_dir, base_dir));
        }
        if let Some(ref database) = self.database {
            if is_postgres_url(database) || database.starts_with("sqlite:") {
                settings.database_url = Some(database.clone());
            } else {
                settings.database_filename = database.clone();
            }
        }
        if let Some(ref index_dir) = self.index_dir {
            settings.index_dir = self.resolve_path(index_dir, base_dir);
        }
        if let Some(timeout) = self.query_timeout_secs {
            settings.query_timeout_secs = timeout;
        }
        if let Some(page_size) = self.page_size {
            settings.page_size = page_size.max(1);
        }
        if let Some(descending) = self.descending {
            settings.descending = descending;
        }

        let content = &self.content;
        if let Some(ref root) = content.xml_root {
            settings.xml_root = self.resolve_path(root, base_dir);
        }
        if let Some(ref root) = content.html_root {
            settings.html_root = self.resolve_path(root, base_dir);
        }
        if let Some(ref ext) = content.source_extension {
            settings.source_extension = ext.trim_start_matches('.').to_string();
        }
        if let Some(ref ext) = content.rendered_extension {
            settings.rendered_extension = ext.trim_start_matches('.').to_string();
        }
        if !content.manifest_prefixes.is_empty() {
            settings.manifest_prefixes = content.manifest_prefixes.clone();
        }
        if let Some(ref marker) = content.glossary_marker {
            settings.glossary_marker = marker.clone();
        }
        if let Some(ref prefix) = content.search_metadata_prefix {
            settings.search_metadata_prefix = prefix.clone();
        }
    }
}

/// Options for loading settings.
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Explicit config file path (overrides auto-discovery).
    pub config_path: Option<PathBuf>,
    /// Data directory (--target flag).
    pub target: Option<PathBuf>,
}

/// Look for `docsync.{ext}` or `config.{ext}` inside the data directory.
fn find_config_in_dir(data_dir: &Path) -> Option<PathBuf> {
    let extensions = ["json", "yaml", "yml", "toml"];
    let basenames = ["docsync", "config"];

    for basename in basenames {
        for ext in extensions {
            let path = data_dir.join(format!("{}.{}", basename, ext));
            if path.exists() {
                return Some(path);
            }
        }
    }
    None
}

fn absolute(path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir()
            .unwrap_or_else(|_| PathBuf::from("."))
            .join(path)
    }
}

async fn load_file_config(
    options: &LoadOptions,
    target: Option<&PathBuf>,
) -> Result<Config, ConfigError> {
    // Priority 1: explicit --config flag
    if let Some(ref config_path) = options.config_path {
        return Config::load_from_path(config_path).await;
    }

    // Priority 2: config inside the target directory
    if let Some(config_path) = target.and_then(|dir| find_config_in_dir(dir)) {
        tracing::debug!("Found config in target dir: {}", config_path.display());
        return Config::load_from_path(&config_path).await;
    }

    // Priority 3: auto-discover via prefer
    Config::load().await
}

/// Load settings with explicit options.
pub async fn load_settings_with_options(
    options: LoadOptions,
) -> Result<(Settings, Config), ConfigError> {
    let target = options.target.as_deref().map(absolute);
    let config = load_file_config(&options, target.as_ref()).await?;

    let mut settings = Settings::default();
    let base_dir = config
        .base_dir()
        .unwrap_or_else(|| absolute(Path::new(".")));
    config.apply_to_settings(&mut settings, &base_dir);

    // --target takes precedence over the config file's data_dir
    if let Some(target) = target {
        settings.set_data_dir(target);
    }

    // DATABASE_URL environment variable takes highest precedence
    if let Some(database_url) = std::env::var("DATABASE_URL").ok().filter(|s| !s.is_empty()) {
        validate_database_url(&database_url).map_err(ConfigError::DatabaseUrl)?;
        tracing::debug!("Using DATABASE_URL from environment");
        settings.database_url = Some(database_url);
    }

    Ok((settings, config))
}
