//! Conflict case types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::resolver::Resolution;

/// The class of divergence the server reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictKind {
    /// Local and server edits touched the same record.
    DataConflict,
    /// The operation cannot be applied because a resource ran short
    /// (e.g. insufficient stock for an inventory adjustment).
    ResourceConstraint,
    /// The record version the operation was built against is stale.
    VersionMismatch,
}

impl ConflictKind {
    /// Display name for this kind.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::DataConflict => "data conflict",
            Self::ResourceConstraint => "resource constraint",
            Self::VersionMismatch => "version mismatch",
        }
    }
}

impl std::fmt::Display for ConflictKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// Divergence raised for one submitted operation.
///
/// Created by the dispatcher when a batch outcome signals conflict, stored on
/// the suspended operation, and consumed by the
/// [`ConflictResolver`](super::ConflictResolver).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConflictCase {
    /// The queued operation this conflict belongs to.
    pub operation_id: Uuid,
    /// Divergence class.
    pub kind: ConflictKind,
    /// The payload as the client submitted it.
    pub local_snapshot: serde_json::Value,
    /// The server's view of the same record. Absent for
    /// [`ConflictKind::ResourceConstraint`].
    pub server_snapshot: Option<serde_json::Value>,
    /// Free-text detail for constraint conflicts.
    pub constraint_details: Option<String>,
    /// Field-level merge suggestion, computed for data conflicts with both
    /// snapshots present. A suggestion only; never applied automatically.
    pub suggested_merge: Option<serde_json::Value>,
    /// When the dispatcher observed the conflict.
    pub detected_at: DateTime<Utc>,
}

impl ConflictCase {
    /// The resolutions this case admits.
    ///
    /// Data conflicts offer the full set; constraint and version conflicts
    /// carry no merge basis, so only retry and discard apply.
    #[must_use]
    pub const fn options(&self) -> &'static [Resolution] {
        match self.kind {
            ConflictKind::DataConflict => &[
                Resolution::KeepLocal,
                Resolution::KeepServer,
                Resolution::Merge,
                Resolution::Retry,
                Resolution::Discard,
            ],
            ConflictKind::ResourceConstraint | ConflictKind::VersionMismatch => {
                &[Resolution::Retry, Resolution::Discard]
            },
        }
    }

    /// Whether the given resolution is admissible for this case.
    #[must_use]
    pub fn admits(&self, choice: Resolution) -> bool {
        self.options().contains(&choice)
    }
}
