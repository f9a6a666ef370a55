//! Queued operation types.
//!
//! A [`QueuedOperation`] is one user-initiated, state-changing intent. The
//! core treats its payload as opaque JSON; the [`OperationKind`] enum exists
//! only at the business boundary so handlers dispatch on a type rather than
//! a string.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::conflict::ConflictCase;

use super::key;

/// Operation kinds known to the application boundary.
///
/// The core itself stores only the string name, so unknown names queued by a
/// newer client survive a round trip through an older one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Adjust stock levels for an inventory item.
    AdjustInventory,
    /// Record a gravity/temperature reading for a fermenting batch.
    RecordFermentationReading,
    /// Update batch metadata (status, notes, schedule).
    UpdateBatch,
}

impl OperationKind {
    /// The stable wire name for this kind.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::AdjustInventory => "adjust_inventory",
            Self::RecordFermentationReading => "record_fermentation_reading",
            Self::UpdateBatch => "update_batch",
        }
    }

    /// Parse a wire name into a known kind.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "adjust_inventory" => Some(Self::AdjustInventory),
            "record_fermentation_reading" => Some(Self::RecordFermentationReading),
            "update_batch" => Some(Self::UpdateBatch),
            _ => None,
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Lifecycle state of a queued operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationState {
    /// Waiting for the next dispatch cycle.
    Queued,
    /// Submitted in the current dispatch cycle; outcome pending.
    InFlight,
    /// Suspended on a conflict until an explicit resolution.
    AwaitingResolution,
    /// No further automatic action will be taken.
    Terminal,
}

impl OperationState {
    /// Stable storage encoding.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
            Self::AwaitingResolution => "awaiting_resolution",
            Self::Terminal => "terminal",
        }
    }

    /// Parse the storage encoding. Unknown strings are treated as queued so
    /// a row written by a newer build is retried rather than lost.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        match s {
            "in_flight" => Self::InFlight,
            "awaiting_resolution" => Self::AwaitingResolution,
            "terminal" => Self::Terminal,
            _ => Self::Queued,
        }
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Why a terminal operation is terminal.
///
/// Kept distinct so operators can tell "the server rejected this" from "it
/// never got through" from "someone discarded it".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    /// The server will never accept the operation as submitted.
    Rejected,
    /// Transient failures persisted past the retry budget.
    RetriesExhausted,
    /// An operator explicitly discarded the operation.
    Discarded,
}

impl TerminalReason {
    /// Stable storage encoding.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Rejected => "rejected",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Discarded => "discarded",
        }
    }

    /// Parse the storage encoding.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "rejected" => Some(Self::Rejected),
            "retries_exhausted" => Some(Self::RetriesExhausted),
            "discarded" => Some(Self::Discarded),
            _ => None,
        }
    }
}

/// One user-initiated, state-changing intent, queued for submission.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueuedOperation {
    /// Locally generated identifier, immutable once assigned.
    pub id: Uuid,
    /// Which external handler the payload targets. Opaque to the core.
    pub operation_name: String,
    /// Handler payload. The core never inspects its fields except when
    /// computing a merge suggestion.
    pub payload: serde_json::Value,
    /// Derived once at enqueue time and never regenerated.
    pub idempotency_key: String,
    /// Defines FIFO submission order.
    pub enqueued_at: DateTime<Utc>,
    /// Incremented only on transient-failure outcomes.
    pub retry_count: u32,
    /// Most recent submission attempt, `None` until the first.
    pub last_attempt_at: Option<DateTime<Utc>>,
    /// Last failure message, cleared on success or manual reset.
    pub last_error: Option<String>,
    /// Lifecycle state.
    pub state: OperationState,
    /// Populated when `state` is [`OperationState::Terminal`].
    pub terminal_reason: Option<TerminalReason>,
    /// Populated while `state` is [`OperationState::AwaitingResolution`].
    pub conflict: Option<ConflictCase>,
}

impl QueuedOperation {
    /// Create a new queued operation with a fresh id and idempotency key.
    #[must_use]
    pub fn new(
        operation_name: impl Into<String>,
        payload: serde_json::Value,
        enqueued_at: DateTime<Utc>,
    ) -> Self {
        let operation_name = operation_name.into();
        let idempotency_key = key::derive(&operation_name, &payload, enqueued_at, Uuid::new_v4());

        Self {
            id: Uuid::new_v4(),
            operation_name,
            payload,
            idempotency_key,
            enqueued_at,
            retry_count: 0,
            last_attempt_at: None,
            last_error: None,
            state: OperationState::Queued,
            terminal_reason: None,
            conflict: None,
        }
    }

    /// The boundary kind for this operation, if the name is known.
    #[must_use]
    pub fn kind(&self) -> Option<OperationKind> {
        OperationKind::parse(&self.operation_name)
    }

    /// Whether this operation has reached a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        self.state == OperationState::Terminal
    }
}
