//! On-disk content store layout and the filesystem content probe.
//!
//! Each resource owns two directories keyed by isbn:
//! `{xml_root}/{isbn}/` holds source files and `{html_root}/{isbn}/` holds the
//! rendered files produced from them. A source `name.xml` is paired with the
//! rendered `name.html`.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::models::{ContentStatus, ContentStatusCode, Resource};

/// Naming conventions of the content store.
#[derive(Debug, Clone)]
pub struct ContentLayout {
    pub xml_root: PathBuf,
    pub html_root: PathBuf,
    pub source_extension: String,
    pub rendered_extension: String,
    /// Source manifests that never get a rendered counterpart.
    pub manifest_prefixes: Vec<String>,
    /// Marker identifying glossary files.
    pub glossary_marker: String,
    /// Rendered search-metadata files that have no source counterpart.
    pub search_metadata_prefix: String,
}

impl ContentLayout {
    pub fn new(xml_root: impl Into<PathBuf>, html_root: impl Into<PathBuf>) -> Self {
        Self {
            xml_root: xml_root.into(),
            html_root: html_root.into(),
            source_extension: "xml".to_string(),
            rendered_extension: "html".to_string(),
            manifest_prefixes: vec!["book.".to_string(), "toc.".to_string()],
            glossary_marker: "glossary".to_string(),
            search_metadata_prefix: "search_".to_string(),
        }
    }

    pub fn xml_dir(&self, isbn: &str) -> PathBuf {
        self.xml_root.join(isbn)
    }

    pub fn html_dir(&self, isbn: &str) -> PathBuf {
        self.html_root.join(isbn)
    }

    /// Path of a rendered file, as the index refers to it.
    pub fn rendered_path(&self, isbn: &str, filename: &str) -> PathBuf {
        self.html_dir(isbn).join(filename)
    }

    pub fn is_manifest(&self, name: &str) -> bool {
        self.manifest_prefixes.iter().any(|p| name.starts_with(p.as_str()))
    }

    pub fn is_glossary(&self, name: &str) -> bool {
        name.to_ascii_lowercase()
            .contains(&self.glossary_marker.to_ascii_lowercase())
    }

    pub fn is_search_metadata(&self, name: &str) -> bool {
        name.starts_with(self.search_metadata_prefix.as_str())
    }

    pub fn is_source_file(&self, name: &str) -> bool {
        has_extension(name, &self.source_extension)
    }

    pub fn is_rendered_file(&self, name: &str) -> bool {
        has_extension(name, &self.rendered_extension)
    }

    /// Rendered counterpart name of a source file.
    pub fn rendered_name(&self, source_name: &str) -> String {
        swap_extension(source_name, &self.rendered_extension)
    }

    /// Source counterpart name of a rendered file.
    pub fn source_name(&self, rendered_name: &str) -> String {
        swap_extension(rendered_name, &self.source_extension)
    }

    /// Rendered files the index is expected to hold.
    pub fn is_indexable(&self, rendered_name: &str) -> bool {
        self.is_rendered_file(rendered_name) && !self.is_search_metadata(rendered_name)
    }
}

fn has_extension(name: &str, extension: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

fn swap_extension(name: &str, extension: &str) -> String {
    match name.rsplit_once('.') {
        Some((stem, _)) => format!("{stem}.{extension}"),
        None => format!("{name}.{extension}"),
    }
}

/// Regular files in a directory with their sizes, sorted by name.
///
/// Symlinks are followed, so a dangling link is an error.
fn list_files(dir: &Path) -> io::Result<Vec<(String, u64)>> {
    let mut files = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let metadata = std::fs::metadata(entry.path())?;
        if !metadata.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            files.push((name.to_string(), metadata.len()));
        }
    }
    files.sort();
    Ok(files)
}

/// Read-only inspection of a resource's source and rendered directories.
#[derive(Debug, Clone)]
pub struct FileSystemContentProbe {
    layout: ContentLayout,
}

impl FileSystemContentProbe {
    pub fn new(layout: ContentLayout) -> Self {
        Self { layout }
    }

    pub fn layout(&self) -> &ContentLayout {
        &self.layout
    }

    /// Inspect the resource's content. I/O failures become an `Exception`
    /// status instead of an error.
    pub fn probe(&self, resource: &Resource) -> ContentStatus {
        match self.try_probe(&resource.isbn) {
            Ok(status) => status,
            Err(e) => {
                warn!(
                    isbn = %resource.isbn,
                    resource_id = resource.id,
                    "Content probe failed: {}",
                    e
                );
                ContentStatus::exception(e.to_string())
            }
        }
    }

    fn try_probe(&self, isbn: &str) -> io::Result<ContentStatus> {
        let layout = &self.layout;

        let xml_dir = layout.xml_dir(isbn);
        if !xml_dir.is_dir() {
            let mut status = ContentStatus::default();
            status.escalate(
                ContentStatusCode::XmlDirectoryMissing,
                format!("Source directory missing: {}", xml_dir.display()),
            );
            return Ok(status);
        }
        let xml_files = list_files(&xml_dir)?;
        if xml_files.is_empty() {
            let mut status = ContentStatus::default();
            status.escalate(
                ContentStatusCode::XmlDirectoryEmpty,
                format!("Source directory empty: {}", xml_dir.display()),
            );
            return Ok(status);
        }

        let mut status = ContentStatus {
            xml_file_count: xml_files.len() as u64,
            xml_bytes: xml_files.iter().map(|(_, size)| size).sum(),
            source_files: xml_files.iter().map(|(name, _)| name.clone()).collect(),
            ..Default::default()
        };

        let html_dir = layout.html_dir(isbn);
        if !html_dir.is_dir() {
            status.escalate(
                ContentStatusCode::HtmlDirectoryMissing,
                format!("Rendered directory missing: {}", html_dir.display()),
            );
            return Ok(status);
        }
        let html_files = list_files(&html_dir)?;
        if html_files.is_empty() {
            status.escalate(
                ContentStatusCode::HtmlDirectoryEmpty,
                format!("Rendered directory empty: {}", html_dir.display()),
            );
            return Ok(status);
        }

        status.html_file_count = html_files.len() as u64;
        status.html_bytes = html_files.iter().map(|(_, size)| size).sum();
        status.indexable_html_files = html_files
            .iter()
            .filter(|(name, _)| layout.is_indexable(name))
            .map(|(name, _)| name.clone())
            .collect();

        let xml_names: HashSet<&str> = xml_files.iter().map(|(n, _)| n.as_str()).collect();
        let html_names: HashSet<&str> = html_files.iter().map(|(n, _)| n.as_str()).collect();

        let mut missing_html = false;
        let mut missing_glossary = false;
        for (name, _) in &xml_files {
            if !layout.is_source_file(name) || layout.is_manifest(name) {
                continue;
            }
            let rendered = layout.rendered_name(name);
            if html_names.contains(rendered.as_str()) {
                continue;
            }
            status
                .messages
                .push(format!("Rendered file missing for {name}: {rendered}"));
            if layout.is_glossary(name) {
                missing_glossary = true;
            } else {
                missing_html = true;
            }
        }
        if missing_html {
            status.status = ContentStatusCode::MissingHtmlFiles;
        } else if missing_glossary {
            status.status = ContentStatusCode::MissingHtmlGlossaryFiles;
        }

        for (name, _) in &html_files {
            if !layout.is_rendered_file(name)
                || layout.is_search_metadata(name)
                || layout.is_glossary(name)
            {
                continue;
            }
            let source = layout.source_name(name);
            if !xml_names.contains(source.as_str()) {
                status.escalate(
                    ContentStatusCode::MissingXmlFiles,
                    format!("Source file missing for {name}: {source}"),
                );
            }
        }

        if status.messages.is_empty() {
            status.status = ContentStatusCode::XmlAndHtmlOk;
        }

        debug!(
            isbn,
            status = %status.status,
            xml_files = status.xml_file_count,
            html_files = status.html_file_count,
            "Probed content"
        );
        Ok(status)
    }
}
