//! Diesel ORM models for database tables.

use diesel::prelude::*;

use crate::schema;

/// Resource record from the catalog table.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::resources)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct ResourceRecord {
    pub id: i64,
    pub isbn: String,
    pub title: String,
    pub status: String,
    pub soft_deleted: bool,
    pub updated_at: String,
}

/// New resource for insertion.
#[derive(Insertable, AsChangeset, Debug)]
#[diesel(table_name = schema::resources)]
pub struct NewResource<'a> {
    pub id: i64,
    pub isbn: &'a str,
    pub title: &'a str,
    pub status: &'a str,
    pub soft_deleted: bool,
    pub updated_at: &'a str,
}

/// One document-id row.
#[derive(Queryable, Selectable, Debug, Clone)]
#[diesel(table_name = schema::resource_doc_ids)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct DocIdRecord {
    pub document_id: i64,
    pub filename: String,
    pub resource_id: i64,
}

/// New document-id row for insertion.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::resource_doc_ids)]
pub struct NewDocId<'a> {
    pub document_id: i64,
    pub filename: &'a str,
    pub resource_id: i64,
}

/// Transform queue entry.
#[derive(Queryable, Selectable, Identifiable, Debug, Clone)]
#[diesel(table_name = schema::transform_queue)]
#[diesel(check_for_backend(diesel::sqlite::Sqlite))]
pub struct TransformQueueRecord {
    pub id: i32,
    pub resource_id: i64,
    pub isbn: String,
    pub status: String,
    pub queued_at: String,
    pub processed_at: Option<String>,
}

/// New transform queue entry.
#[derive(Insertable, Debug)]
#[diesel(table_name = schema::transform_queue)]
pub struct NewTransformQueueEntry<'a> {
    pub resource_id: i64,
    pub isbn: &'a str,
    pub status: &'a str,
    pub queued_at: &'a str,
}
