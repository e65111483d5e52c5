//! Database migrations using cetane.
//!
//! Runs migrations via blocking tasks to work with async connections.

use cetane::migrator::MigrationStateStore;
use tracing::info;

use super::pool::DieselError;

/// Run pending migrations for a database URL.
pub async fn run_migrations(database_url: &str) -> Result<(), DieselError> {
    let url = database_url.to_string();

    if super::util::is_postgres_url(&url) {
        #[cfg(feature = "postgres")]
        {
            run_postgres_migrations_async(&url).await
        }
        #[cfg(not(feature = "postgres"))]
        {
            Err(DieselError::QueryBuilderError(
                "PostgreSQL support not compiled. Use --features postgres".into(),
            ))
        }
    } else {
        run_sqlite_migrations_async(&url).await
    }
}

fn migration_error(msg: impl std::fmt::Display) -> DieselError {
    DieselError::QueryBuilderError(msg.to_string().into())
}

async fn run_sqlite_migrations_async(database_url: &str) -> Result<(), DieselError> {
    use cetane::backend::Sqlite;
    use cetane::migrator::Migrator;

    let url = database_url
        .strip_prefix("sqlite:")
        .unwrap_or(database_url)
        .to_string();

    tokio::task::spawn_blocking(move || {
        let conn = rusqlite::Connection::open(&url).map_err(migration_error)?;
        let backend = Sqlite;
        let registry = crate::migrations::registry();
        let state = SqliteState::new(&conn)?;

        let mut migrator = Migrator::new(&registry, &backend, state);
        let applied = migrator
            .migrate_forward(|sql| conn.execute_batch(sql).map_err(|e| e.to_string()))
            .map_err(migration_error)?;

        for name in &applied {
            info!("Applied migration: {}", name);
        }

        if applied.is_empty() {
            info!("No pending migrations");
        }

        Ok(())
    })
    .await
    .map_err(|e| DieselError::QueryBuilderError(Box::new(e)))?
}

/// PostgreSQL migrations execute the resolved forward SQL over diesel-async.
#[cfg(feature = "postgres")]
async fn run_postgres_migrations_async(database_url: &str) -> Result<(), DieselError> {
    use cetane::backend::Postgres;
    use diesel_async::{AsyncConnection, AsyncPgConnection, RunQueryDsl, SimpleAsyncConnection};

    #[derive(diesel::QueryableByName)]
    struct AppliedName {
        #[diesel(sql_type = diesel::sql_types::Text)]
        name: String,
    }

    let mut conn = AsyncPgConnection::establish(database_url)
        .await
        .map_err(migration_error)?;

    conn.batch_execute(
        "CREATE TABLE IF NOT EXISTS __cetane_migrations (
            name TEXT PRIMARY KEY NOT NULL,
            applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )",
    )
    .await?;

    let applied: Vec<String> = diesel::sql_query("SELECT name FROM __cetane_migrations")
        .load::<AppliedName>(&mut conn)
        .await?
        .into_iter()
        .map(|row| row.name)
        .collect();

    let registry = crate::migrations::registry();
    let backend = Postgres;
    let order = registry.resolve_order().map_err(migration_error)?;

    let mut newly_applied = 0usize;
    for name in order {
        if applied.iter().any(|a| a == name) {
            continue;
        }
        let migration = registry
            .get(name)
            .ok_or_else(|| migration_error(format!("migration {} not registered", name)))?;
        for stmt in migration.forward_sql(&backend) {
            if stmt.trim().is_empty() {
                continue;
            }
            conn.batch_execute(&stmt).await?;
        }
        diesel::sql_query("INSERT INTO __cetane_migrations (name) VALUES ($1) ON CONFLICT DO NOTHING")
            .bind::<diesel::sql_types::Text, _>(name)
            .execute(&mut conn)
            .await?;
        info!("Applied migration: {}", name);
        newly_applied += 1;
    }

    if newly_applied == 0 {
        info!("No pending migrations");
    }

    Ok(())
}

// -- SQLite state store --

struct SqliteState<'a> {
    conn: &'a rusqlite::Connection,
}

impl<'a> SqliteState<'a> {
    fn new(conn: &'a rusqlite::Connection) -> Result<Self, DieselError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS __cetane_migrations (
                name TEXT PRIMARY KEY NOT NULL,
                applied_at TEXT NOT NULL DEFAULT (datetime('now'))
            )",
        )
        .map_err(migration_error)?;

        Ok(Self { conn })
    }
}

impl MigrationStateStore for SqliteState<'_> {
    fn applied_migrations(&mut self) -> Result<Vec<String>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT name FROM __cetane_migrations ORDER BY name")
            .map_err(|e| e.to_string())?;

        let names = stmt
            .query_map([], |row| row.get(0))
            .map_err(|e| e.to_string())?
            .collect::<Result<Vec<String>, _>>()
            .map_err(|e| e.to_string())?;

        Ok(names)
    }

    fn mark_applied(&mut self, name: &str) -> Result<(), String> {
        self.conn
            .execute(
                "INSERT OR IGNORE INTO __cetane_migrations (name) VALUES (?1)",
                [name],
            )
            .map_err(|e| e.to_string())?;
        Ok(())
    }

    fn mark_unapplied(&mut self, name: &str) -> Result<(), String> {
        self.conn
            .execute("DELETE FROM __cetane_migrations WHERE name = ?1", [name])
            .map_err(|e| e.to_string())?;
        Ok(())
    }
}
