//! docsync - keeps rendered content, the doc-id table and the search index
//! in agreement.
//!
//! The engine audits each resource in the catalog against the three stores,
//! classifies any divergence and optionally repairs it.

#![allow(clippy::should_implement_trait)]

pub mod cli;
pub mod config;
pub mod migrations;
pub mod models;
pub mod reconcile;
pub mod repository;
pub mod schema;
pub mod search_index;
pub mod storage;
