//! Durable store contract and the SQLite implementation.

use rusqlite::types::Type;
use rusqlite::{params, OptionalExtension, Row};
use uuid::Uuid;

use crate::error::TaplineError;
use crate::outbox::operation::{OperationState, QueuedOperation, TerminalReason};

use super::Database;

/// Crash-consistent persistence for queued operations.
///
/// A `put` that returns `Ok` must survive an immediate process restart.
pub trait DurableStore: Send {
    /// Fetch one operation by id.
    fn get(&self, id: Uuid) -> Result<Option<QueuedOperation>, TaplineError>;

    /// Insert or replace an operation.
    fn put(&self, item: &QueuedOperation) -> Result<(), TaplineError>;

    /// Delete an operation. Returns whether a row was removed.
    fn delete(&self, id: Uuid) -> Result<bool, TaplineError>;

    /// All stored operations, ordered by enqueue time ascending.
    fn list_all(&self) -> Result<Vec<QueuedOperation>, TaplineError>;
}

/// SQLite-backed durable store.
pub struct SqliteStore {
    db: Database,
}

impl SqliteStore {
    /// Create a store over an open database.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }

    /// Open the store at the default database location.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open() -> Result<Self, TaplineError> {
        Ok(Self::new(Database::open()?))
    }

    /// Open an in-memory store (useful for testing).
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened.
    pub fn open_in_memory() -> Result<Self, TaplineError> {
        Ok(Self::new(Database::open_in_memory()?))
    }
}

impl DurableStore for SqliteStore {
    fn get(&self, id: Uuid) -> Result<Option<QueuedOperation>, TaplineError> {
        let conn = self.db.connection();

        let mut stmt = conn
            .prepare(
                r"SELECT id, operation_name, payload, idempotency_key, enqueued_at,
                         retry_count, last_attempt_at, last_error, state,
                         terminal_reason, conflict
                  FROM outbox
                  WHERE id = ?1",
            )
            .map_err(|e| TaplineError::Storage(format!("Failed to prepare query: {e}")))?;

        stmt.query_row([id.to_string()], row_to_operation)
            .optional()
            .map_err(|e| TaplineError::Storage(format!("Failed to query operation: {e}")))
    }

    fn put(&self, item: &QueuedOperation) -> Result<(), TaplineError> {
        let conn = self.db.connection();

        let conflict_json = item
            .conflict
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| TaplineError::Payload(format!("Failed to serialize conflict: {e}")))?;

        conn.execute(
            r"INSERT OR REPLACE INTO outbox
              (id, operation_name, payload, idempotency_key, enqueued_at,
               retry_count, last_attempt_at, last_error, state, terminal_reason, conflict)
              VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                item.id.to_string(),
                item.operation_name,
                item.payload.to_string(),
                item.idempotency_key,
                item.enqueued_at.to_rfc3339(),
                item.retry_count,
                item.last_attempt_at.map(|t| t.to_rfc3339()),
                item.last_error,
                item.state.as_str(),
                item.terminal_reason.map(|r| r.as_str()),
                conflict_json,
            ],
        )
        .map_err(|e| TaplineError::Storage(format!("Failed to persist operation: {e}")))?;

        Ok(())
    }

    fn delete(&self, id: Uuid) -> Result<bool, TaplineError> {
        let conn = self.db.connection();

        let rows = conn
            .execute("DELETE FROM outbox WHERE id = ?1", [id.to_string()])
            .map_err(|e| TaplineError::Storage(format!("Failed to delete operation: {e}")))?;

        Ok(rows > 0)
    }

    fn list_all(&self) -> Result<Vec<QueuedOperation>, TaplineError> {
        let conn = self.db.connection();

        let mut stmt = conn
            .prepare(
                r"SELECT id, operation_name, payload, idempotency_key, enqueued_at,
                         retry_count, last_attempt_at, last_error, state,
                         terminal_reason, conflict
                  FROM outbox
                  ORDER BY enqueued_at ASC",
            )
            .map_err(|e| TaplineError::Storage(format!("Failed to prepare query: {e}")))?;

        let rows = stmt
            .query_map([], row_to_operation)
            .map_err(|e| TaplineError::Storage(format!("Failed to list operations: {e}")))?;

        let mut operations = Vec::new();
        for row in rows {
            operations.push(row.map_err(|e| TaplineError::Storage(e.to_string()))?);
        }

        Ok(operations)
    }
}

fn row_to_operation(row: &Row<'_>) -> Result<QueuedOperation, rusqlite::Error> {
    let id_str: String = row.get(0)?;
    let operation_name: String = row.get(1)?;
    let payload_str: String = row.get(2)?;
    let idempotency_key: String = row.get(3)?;
    let enqueued_at_str: String = row.get(4)?;
    let retry_count: u32 = row.get(5)?;
    let last_attempt_str: Option<String> = row.get(6)?;
    let last_error: Option<String> = row.get(7)?;
    let state_str: String = row.get(8)?;
    let reason_str: Option<String> = row.get(9)?;
    let conflict_str: Option<String> = row.get(10)?;

    let id = Uuid::parse_str(&id_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(0, Type::Text, Box::new(e)))?;

    let payload = serde_json::from_str(&payload_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(2, Type::Text, Box::new(e)))?;

    let enqueued_at = chrono::DateTime::parse_from_rfc3339(&enqueued_at_str)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(4, Type::Text, Box::new(e)))?
        .with_timezone(&chrono::Utc);

    let last_attempt_at = last_attempt_str.and_then(|s| {
        chrono::DateTime::parse_from_rfc3339(&s)
            .map(|t| t.with_timezone(&chrono::Utc))
            .ok()
    });

    // A corrupt conflict blob degrades to "no suggestion" rather than
    // losing the whole row
    let conflict = conflict_str.and_then(|s| serde_json::from_str(&s).ok());

    Ok(QueuedOperation {
        id,
        operation_name,
        payload,
        idempotency_key,
        enqueued_at,
        retry_count,
        last_attempt_at,
        last_error,
        state: OperationState::parse(&state_str),
        terminal_reason: reason_str.as_deref().and_then(TerminalReason::parse),
        conflict,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn test_store() -> SqliteStore {
        SqliteStore::open_in_memory().unwrap()
    }

    fn sample_op() -> QueuedOperation {
        QueuedOperation::new("adjust_inventory", json!({"sku": "hops", "delta": -5}), Utc::now())
    }

    #[test]
    fn test_put_and_get() {
        let store = test_store();
        let op = sample_op();

        store.put(&op).unwrap();

        let loaded = store.get(op.id).unwrap().unwrap();
        assert_eq!(loaded.id, op.id);
        assert_eq!(loaded.operation_name, "adjust_inventory");
        assert_eq!(loaded.payload, op.payload);
        assert_eq!(loaded.idempotency_key, op.idempotency_key);
        assert_eq!(loaded.state, OperationState::Queued);
    }

    #[test]
    fn test_get_missing_returns_none() {
        let store = test_store();
        assert!(store.get(Uuid::new_v4()).unwrap().is_none());
    }

    #[test]
    fn test_put_replaces_existing() {
        let store = test_store();
        let mut op = sample_op();

        store.put(&op).unwrap();
        op.retry_count = 2;
        op.last_error = Some("server hiccup".to_string());
        store.put(&op).unwrap();

        let loaded = store.get(op.id).unwrap().unwrap();
        assert_eq!(loaded.retry_count, 2);
        assert_eq!(loaded.last_error.as_deref(), Some("server hiccup"));
        assert_eq!(store.list_all().unwrap().len(), 1);
    }

    #[test]
    fn test_delete() {
        let store = test_store();
        let op = sample_op();

        store.put(&op).unwrap();
        assert!(store.delete(op.id).unwrap());
        assert!(!store.delete(op.id).unwrap());
        assert!(store.get(op.id).unwrap().is_none());
    }

    #[test]
    fn test_list_all_ordered_by_enqueued_at() {
        let store = test_store();
        let base = Utc::now();

        for offset in [2i64, 0, 1] {
            let op = QueuedOperation::new(
                "update_batch",
                json!({"offset": offset}),
                base + chrono::Duration::seconds(offset),
            );
            store.put(&op).unwrap();
        }

        let all = store.list_all().unwrap();
        let offsets: Vec<i64> = all
            .iter()
            .map(|op| op.payload["offset"].as_i64().unwrap())
            .collect();
        assert_eq!(offsets, vec![0, 1, 2]);
    }

    #[test]
    fn test_survives_reopen() {
        let temp_dir = tempfile::TempDir::new().unwrap();
        let db_path = temp_dir.path().join("outbox.db");
        let op = sample_op();

        {
            let store = SqliteStore::new(Database::open_at(&db_path).unwrap());
            store.put(&op).unwrap();
        }

        let store = SqliteStore::new(Database::open_at(&db_path).unwrap());
        let loaded = store.get(op.id).unwrap().unwrap();
        assert_eq!(loaded.idempotency_key, op.idempotency_key);
    }

    #[test]
    fn test_conflict_blob_roundtrip() {
        use crate::conflict::{ConflictCase, ConflictKind};

        let store = test_store();
        let mut op = sample_op();
        op.state = OperationState::AwaitingResolution;
        op.conflict = Some(ConflictCase {
            operation_id: op.id,
            kind: ConflictKind::DataConflict,
            local_snapshot: op.payload.clone(),
            server_snapshot: Some(json!({"sku": "hops", "delta": -3})),
            constraint_details: None,
            suggested_merge: None,
            detected_at: Utc::now(),
        });

        store.put(&op).unwrap();

        let loaded = store.get(op.id).unwrap().unwrap();
        assert_eq!(loaded.state, OperationState::AwaitingResolution);
        let conflict = loaded.conflict.unwrap();
        assert_eq!(conflict.kind, ConflictKind::DataConflict);
        assert_eq!(conflict.operation_id, op.id);
    }
}
