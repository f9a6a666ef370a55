//! Transport collaborator contract.
//!
//! The core does not implement a concrete transport. It depends on the
//! ability to submit one batch and receive a structured outcome per item;
//! HTTP, RPC or anything else is the application's concern.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflict::ConflictKind;
use crate::error::TaplineError;

/// One operation as submitted to the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchItem {
    /// Queued operation id; outcomes are keyed by it.
    pub id: Uuid,
    /// Handler tag, opaque to the core.
    pub operation_name: String,
    /// Handler payload.
    pub payload: serde_json::Value,
    /// Stable across every retry of this operation.
    pub idempotency_key: String,
}

/// The server's verdict on one submitted item.
#[derive(Debug, Clone)]
pub struct ItemOutcome {
    /// Id of the submitted operation this outcome belongs to.
    pub id: Uuid,
    /// What happened to it.
    pub outcome: Outcome,
}

/// Outcome categories the core can interpret.
#[derive(Debug, Clone)]
pub enum Outcome {
    /// Applied.
    Success,
    /// The idempotency key was already applied; same effect as success.
    Duplicate,
    /// Network/5xx/timeout class failure; will be retried with backoff.
    Transient(String),
    /// Local and server state diverged; requires explicit resolution.
    Conflict(ConflictSignal),
    /// The server will never accept the operation as submitted.
    Permanent(String),
}

/// Conflict details as reported by the server.
///
/// The dispatcher combines this with the local payload into a full
/// [`ConflictCase`](crate::conflict::ConflictCase).
#[derive(Debug, Clone)]
pub struct ConflictSignal {
    /// Divergence class.
    pub kind: ConflictKind,
    /// The server's view of the record, when it has one.
    pub server_snapshot: Option<serde_json::Value>,
    /// Free-text detail for constraint conflicts.
    pub constraint_details: Option<String>,
}

/// Submits batches of queued operations to the authoritative server.
///
/// The returned outcome ids must be a subset of the submitted ids; the
/// dispatcher treats a submitted id with no outcome as a transient failure.
pub trait Transport: Send + Sync {
    /// Submit one batch and return one outcome per item.
    ///
    /// # Errors
    ///
    /// An error means the batch as a whole never reached the server; every
    /// submitted item will be treated as a transient failure.
    fn submit_batch(&self, items: &[BatchItem]) -> Result<Vec<ItemOutcome>, TaplineError>;
}
