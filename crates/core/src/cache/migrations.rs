//! Partition store schema.
//!
//! Each step runs in its own transaction together with its row in
//! `schema_history`, so a crash mid-upgrade never records a step that did
//! not apply.

use super::Error;
use tokio_rusqlite::{Connection, params};

struct Migration {
    version: i64,
    name: &'static str,
    sql: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration { version: 1, name: "partitions", sql: include_str!("../../migrations/001_partitions.sql") },
    Migration { version: 2, name: "entries", sql: include_str!("../../migrations/002_entries.sql") },
];

/// Bring the schema up to the latest version.
///
/// # Errors
///
/// Returns [`Error::MigrationFailed`] naming the step whose SQL was rejected.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_history (
                version INTEGER PRIMARY KEY,
                name TEXT NOT NULL,
                applied_at TEXT NOT NULL
            )",
        )?;

        let applied: i64 =
            conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_history", [], |row| row.get(0))?;

        for step in MIGRATIONS.iter().filter(|m| m.version > applied) {
            let tx = conn.transaction()?;
            tx.execute_batch(step.sql)
                .map_err(|e| Error::MigrationFailed(format!("{:03}_{}: {e}", step.version, step.name)))?;
            tx.execute(
                "INSERT INTO schema_history (version, name, applied_at) VALUES (?1, ?2, ?3)",
                params![step.version, step.name, chrono::Utc::now().to_rfc3339()],
            )?;
            tx.commit()?;
            tracing::debug!(version = step.version, name = step.name, "applied schema step");
        }

        Ok(())
    })
    .await
    .map_err(Error::from)
}

/// Highest applied schema version, 0 for a fresh database.
pub async fn current_version(conn: &Connection) -> Result<i64, Error> {
    conn.call(|conn| -> Result<i64, Error> {
        Ok(conn.query_row("SELECT COALESCE(MAX(version), 0) FROM schema_history", [], |row| row.get(0))?)
    })
    .await
    .map_err(Error::from)
}
