use cetane::prelude::*;

pub fn migration() -> Migration {
    Migration::new("0002_transform_queue")
        .depends_on(&["0001_initial_schema"])
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    r#"CREATE TABLE transform_queue (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    resource_id INTEGER NOT NULL,
    isbn TEXT NOT NULL,
    status TEXT NOT NULL,
    queued_at TEXT NOT NULL,
    processed_at TEXT
)"#,
                )
                .for_backend(
                    "postgres",
                    r#"CREATE TABLE IF NOT EXISTS transform_queue (
    id SERIAL PRIMARY KEY,
    resource_id BIGINT NOT NULL,
    isbn TEXT NOT NULL,
    status TEXT NOT NULL,
    queued_at TEXT NOT NULL,
    processed_at TEXT
)"#,
                ),
        )
        .operation(
            RunSql::portable()
                .for_backend(
                    "sqlite",
                    "CREATE INDEX idx_transform_queue_lookup ON transform_queue(resource_id, isbn, status)",
                )
                .for_backend(
                    "postgres",
                    "CREATE INDEX idx_transform_queue_lookup ON transform_queue(resource_id, isbn, status)",
                ),
        )
}
