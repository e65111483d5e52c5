//! Catalog resources.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a catalog resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceStatus {
    Active,
    Archived,
    Forthcoming,
    Inactive,
    /// Registered but not yet released for sale.
    PrePublication,
    Unknown,
}

impl ResourceStatus {
    /// Single-letter code stored in the catalog.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "A",
            Self::Archived => "R",
            Self::Forthcoming => "F",
            Self::Inactive => "I",
            Self::PrePublication => "P",
            Self::Unknown => "U",
        }
    }

    pub fn from_str(s: &str) -> Self {
        match s.trim() {
            "A" | "a" | "active" => Self::Active,
            "R" | "r" | "archived" => Self::Archived,
            "F" | "f" | "forthcoming" => Self::Forthcoming,
            "I" | "i" | "inactive" => Self::Inactive,
            "P" | "p" | "pre_publication" => Self::PrePublication,
            _ => Self::Unknown,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Active => "Active",
            Self::Archived => "Archived",
            Self::Forthcoming => "Forthcoming",
            Self::Inactive => "Inactive",
            Self::PrePublication => "Pre-publication",
            Self::Unknown => "Unknown",
        }
    }
}

/// One catalog item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource {
    pub id: i64,
    pub isbn: String,
    #[serde(default)]
    pub title: String,
    pub status: ResourceStatus,
    pub soft_deleted: bool,
}

impl Resource {
    pub fn new(id: i64, isbn: impl Into<String>, status: ResourceStatus) -> Self {
        Self {
            id,
            isbn: isbn.into(),
            title: String::new(),
            status,
            soft_deleted: false,
        }
    }

    pub fn soft_deleted(mut self, soft_deleted: bool) -> Self {
        self.soft_deleted = soft_deleted;
        self
    }

    /// Only active or archived, non-deleted resources belong in the index.
    pub fn should_be_indexed(&self) -> bool {
        matches!(self.status, ResourceStatus::Active | ResourceStatus::Archived)
            && !self.soft_deleted
    }
}
