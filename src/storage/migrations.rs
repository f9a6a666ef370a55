//! Database migrations for tapline.
//!
//! Each migration is a function that upgrades the schema by one version.
//! Migrations are run automatically when the database is opened.

use rusqlite::Connection;

use crate::error::TaplineError;

/// Current schema version.
const CURRENT_VERSION: i32 = 1;

/// Get the current schema version from the database.
///
/// Returns 0 if no version has been set (new database).
pub fn get_version(conn: &Connection) -> Result<i32, TaplineError> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| TaplineError::Storage(format!("Failed to get schema version: {e}")))?;

    Ok(version)
}

/// Set the schema version in the database.
fn set_version(conn: &Connection, version: i32) -> Result<(), TaplineError> {
    conn.execute_batch(&format!("PRAGMA user_version = {version};"))
        .map_err(|e| TaplineError::Storage(format!("Failed to set schema version: {e}")))
}

/// Run all pending migrations.
pub fn run(conn: &Connection) -> Result<(), TaplineError> {
    let current = get_version(conn)?;

    if current >= CURRENT_VERSION {
        return Ok(());
    }

    for version in (current + 1)..=CURRENT_VERSION {
        run_migration(conn, version)?;
        set_version(conn, version)?;
    }

    Ok(())
}

/// Run a specific migration.
fn run_migration(conn: &Connection, version: i32) -> Result<(), TaplineError> {
    match version {
        1 => migrate_v1(conn),
        _ => Err(TaplineError::Storage(format!(
            "Unknown migration version: {version}"
        ))),
    }
}

/// Migration v1: Initial schema.
///
/// Creates the `outbox` table holding queued offline operations.
fn migrate_v1(conn: &Connection) -> Result<(), TaplineError> {
    conn.execute_batch(
        r"
        -- Outbox of not-yet-confirmed operations
        CREATE TABLE IF NOT EXISTS outbox (
            id TEXT PRIMARY KEY,
            operation_name TEXT NOT NULL,
            payload TEXT NOT NULL,
            idempotency_key TEXT NOT NULL,
            enqueued_at TEXT NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0,
            last_attempt_at TEXT,
            last_error TEXT,
            state TEXT NOT NULL DEFAULT 'queued',
            terminal_reason TEXT,
            conflict TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_outbox_state
        ON outbox(state);

        CREATE INDEX IF NOT EXISTS idx_outbox_enqueued
        ON outbox(enqueued_at);
        ",
    )
    .map_err(|e| TaplineError::Storage(format!("Migration v1 failed: {e}")))
}
