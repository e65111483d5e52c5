use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0001_initial_schema")
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE resources (
    id INTEGER PRIMARY KEY NOT NULL,
    isbn TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    soft_deleted BOOLEAN NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS resources (
    id BIGINT PRIMARY KEY,
    isbn TEXT NOT NULL,
    title TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL,
    soft_deleted BOOLEAN NOT NULL DEFAULT FALSE,
    updated_at TEXT NOT NULL
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend("sqlite", "CREATE INDEX idx_resources_isbn ON resources(isbn)")
                .for_backend("postgres", "CREATE INDEX idx_resources_isbn ON resources(isbn)"),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE resource_doc_ids (
    document_id INTEGER PRIMARY KEY NOT NULL,
    filename TEXT NOT NULL,
    resource_id INTEGER NOT NULL
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS resource_doc_ids (
    document_id BIGINT PRIMARY KEY,
    filename TEXT NOT NULL,
    resource_id BIGINT NOT NULL
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_resource_doc_ids_resource ON resource_doc_ids(resource_id)",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_resource_doc_ids_resource ON resource_doc_ids(resource_id)",
                ),
        )
}
