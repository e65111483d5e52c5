//! Repository layer for database persistence.
//!
//! All database access uses Diesel ORM. Supports both SQLite and PostgreSQL
//! backends.

pub mod diesel_context;
pub mod diesel_doc_id;
pub mod diesel_resource;
pub mod diesel_transform_queue;
pub mod migrations;
pub mod models;
pub mod pool;
pub mod util;

pub use diesel_context::DieselDbContext;
pub use diesel_doc_id::DieselDocIdRepository;
pub use diesel_resource::DieselResourceRepository;
pub use diesel_transform_queue::DieselTransformQueueRepository;
pub use pool::{DbPool, DieselError};
