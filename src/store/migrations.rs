//! Version-tracked schema migrations for the libSQL store.
//!
//! Each migration has a version number and SQL. `run_migrations()` checks
//! the current version and applies only the new ones, in order.

use libsql::Connection;

use crate::error::StoreError;

/// A single migration step.
struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

/// All migrations in order. Add new versions to the end.
static MIGRATIONS: &[Migration] = &[Migration {
    version: 1,
    name: "kv_store",
    sql: r#"
        CREATE TABLE IF NOT EXISTS kv (
            scope TEXT NOT NULL,
            key TEXT NOT NULL,
            value TEXT NOT NULL,
            updated_at TEXT NOT NULL,
            PRIMARY KEY (scope, key)
        );
        CREATE INDEX IF NOT EXISTS idx_kv_scope ON kv(scope);
    "#,
}];

/// Apply every migration newer than the database's current version.
pub async fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS _migrations (
            version INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            applied_at TEXT NOT NULL DEFAULT (datetime('now'))
        )",
        (),
    )
    .await
    .map_err(|e| StoreError::Migration(format!("Failed to create _migrations table: {e}")))?;

    let current_version = current_version(conn).await?;

    for migration in MIGRATIONS.iter().filter(|m| m.version > current_version) {
        conn.execute_batch(migration.sql).await.map_err(|e| {
            StoreError::Migration(format!(
                "V{} ({}) failed: {e}",
                migration.version, migration.name
            ))
        })?;
        conn.execute(
            "INSERT INTO _migrations (version, name) VALUES (?1, ?2)",
            libsql::params![migration.version, migration.name],
        )
        .await
        .map_err(|e| StoreError::Migration(format!("Failed to record V{}: {e}", migration.version)))?;
        tracing::info!(version = migration.version, name = migration.name, "Applied migration");
    }

    Ok(())
}

async fn current_version(conn: &Connection) -> Result<i64, StoreError> {
    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM _migrations", ())
        .await
        .map_err(|e| StoreError::Migration(format!("Failed to read migration version: {e}")))?;

    match rows.next().await {
        Ok(Some(row)) => Ok(row.get::<i64>(0).unwrap_or(0)),
        Ok(None) => Ok(0),
        Err(e) => Err(StoreError::Migration(format!(
            "Failed to read migration version: {e}"
        ))),
    }
}
