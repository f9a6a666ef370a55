//! Applies explicit resolutions to suspended conflicts.

use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::error::TaplineError;
use crate::outbox::operation::{OperationState, TerminalReason};
use crate::outbox::Outbox;

/// An operator's (or policy's) decision for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    /// Re-submit the local payload as a new intent.
    KeepLocal,
    /// Accept the server's state; drop the local intent.
    KeepServer,
    /// Re-submit the suggested merge as a new intent.
    Merge,
    /// Try the original operation again from a clean retry budget.
    Retry,
    /// Give up on the operation, keeping it visible as terminal.
    Discard,
}

impl Resolution {
    /// Display name for this resolution.
    #[must_use]
    pub const fn display_name(&self) -> &'static str {
        match self {
            Self::KeepLocal => "keep local",
            Self::KeepServer => "keep server",
            Self::Merge => "merge",
            Self::Retry => "retry",
            Self::Discard => "discard",
        }
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// What applying a resolution actually did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolved {
    /// A new operation replaced the conflicted one. The replacement is a
    /// new intent and carries a new idempotency key.
    Reenqueued {
        /// Id of the removed original.
        original: Uuid,
        /// Id of the replacement operation.
        replacement: Uuid,
    },
    /// The original was removed with no replacement.
    Removed(Uuid),
    /// The original returned to the queue with a zeroed retry budget.
    Requeued(Uuid),
    /// The original was kept, terminal, for the record.
    Discarded(Uuid),
    /// The conflict was already resolved; nothing changed.
    AlreadyResolved(Uuid),
}

/// Applies resolutions against an outbox.
pub struct ConflictResolver<'a> {
    outbox: &'a Outbox,
}

impl<'a> ConflictResolver<'a> {
    /// Create a resolver over an outbox.
    #[must_use]
    pub const fn new(outbox: &'a Outbox) -> Self {
        Self { outbox }
    }

    /// Apply a resolution to the conflict attached to `id`.
    ///
    /// Idempotent: if the operation is gone or no longer awaiting
    /// resolution, the call reports [`Resolved::AlreadyResolved`] and
    /// changes nothing.
    ///
    /// # Errors
    ///
    /// Returns [`TaplineError::Resolution`] when the case does not admit
    /// the choice (e.g. `Merge` on a constraint conflict), or a storage
    /// error if applying the decision cannot be persisted.
    pub fn resolve(&self, id: Uuid, choice: Resolution) -> Result<Resolved, TaplineError> {
        let Some(op) = self.outbox.get(id) else {
            return Ok(Resolved::AlreadyResolved(id));
        };
        if op.state != OperationState::AwaitingResolution {
            return Ok(Resolved::AlreadyResolved(id));
        }

        let Some(case) = op.conflict else {
            return Err(TaplineError::Resolution(format!(
                "operation {id} is awaiting resolution but has no conflict attached"
            )));
        };

        if !case.admits(choice) {
            return Err(TaplineError::Resolution(format!(
                "a {} does not admit \"{choice}\"",
                case.kind
            )));
        }

        match choice {
            Resolution::KeepLocal => {
                let replacement = self
                    .outbox
                    .enqueue(&op.operation_name, case.local_snapshot)?;
                self.outbox.remove(id)?;
                info!(original = %id, %replacement, "conflict resolved: kept local");
                Ok(Resolved::Reenqueued {
                    original: id,
                    replacement,
                })
            },
            Resolution::Merge => {
                let merged = case.suggested_merge.ok_or_else(|| {
                    TaplineError::Resolution(format!(
                        "operation {id} has no merge suggestion to apply"
                    ))
                })?;
                let replacement = self.outbox.enqueue(&op.operation_name, merged)?;
                self.outbox.remove(id)?;
                info!(original = %id, %replacement, "conflict resolved: merged");
                Ok(Resolved::Reenqueued {
                    original: id,
                    replacement,
                })
            },
            Resolution::KeepServer => {
                self.outbox.remove(id)?;
                info!(%id, "conflict resolved: kept server");
                Ok(Resolved::Removed(id))
            },
            Resolution::Retry => {
                self.outbox.reset(id)?;
                info!(%id, "conflict resolved: retrying");
                Ok(Resolved::Requeued(id))
            },
            Resolution::Discard => {
                self.outbox
                    .mark_terminal(id, TerminalReason::Discarded, None)?;
                info!(%id, "conflict resolved: discarded");
                Ok(Resolved::Discarded(id))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SyncConfig;
    use crate::conflict::{merge, ConflictCase, ConflictKind};
    use crate::storage::SqliteStore;
    use chrono::Utc;
    use serde_json::{json, Value};

    fn test_outbox() -> Outbox {
        let store = SqliteStore::open_in_memory().unwrap();
        Outbox::load(Box::new(store), SyncConfig::default()).unwrap()
    }

    fn suspend_with_conflict(outbox: &Outbox, kind: ConflictKind, server: Option<Value>) -> Uuid {
        let local = json!({"status": "conditioning", "tags": ["hazy"]});
        let id = outbox.enqueue("update_batch", local.clone()).unwrap();
        outbox.mark_in_flight(&[id]).unwrap();

        let suggested_merge = match (kind, &server) {
            (ConflictKind::DataConflict, Some(s)) => Some(merge::suggest_merge(&local, s)),
            _ => None,
        };
        outbox
            .mark_conflict(
                id,
                ConflictCase {
                    operation_id: id,
                    kind,
                    local_snapshot: local,
                    server_snapshot: server,
                    constraint_details: None,
                    suggested_merge,
                    detected_at: Utc::now(),
                },
            )
            .unwrap();
        id
    }

    #[test]
    fn test_keep_local_reenqueues_as_new_intent() {
        let outbox = test_outbox();
        let id = suspend_with_conflict(
            &outbox,
            ConflictKind::DataConflict,
            Some(json!({"status": "packaged"})),
        );
        let original_key = outbox.get(id).unwrap().idempotency_key;

        let resolver = ConflictResolver::new(&outbox);
        let resolved = resolver.resolve(id, Resolution::KeepLocal).unwrap();

        let (original, replacement) = match resolved {
            Resolved::Reenqueued {
                original,
                replacement,
            } => (original, replacement),
            other => panic!("expected re-enqueue, got {other:?}"),
        };
        assert_eq!(original, id);
        assert!(outbox.get(id).is_none());

        let new_op = outbox.get(replacement).unwrap();
        assert_eq!(new_op.payload, json!({"status": "conditioning", "tags": ["hazy"]}));
        // A new intent gets a new idempotency key
        assert_ne!(new_op.idempotency_key, original_key);
        assert_eq!(new_op.retry_count, 0);
    }

    #[test]
    fn test_merge_reenqueues_suggestion() {
        let outbox = test_outbox();
        let id = suspend_with_conflict(
            &outbox,
            ConflictKind::DataConflict,
            Some(json!({"status": "packaged", "tags": ["ipa"]})),
        );

        let resolver = ConflictResolver::new(&outbox);
        let resolved = resolver.resolve(id, Resolution::Merge).unwrap();

        let replacement = match resolved {
            Resolved::Reenqueued { replacement, .. } => replacement,
            other => panic!("expected re-enqueue, got {other:?}"),
        };
        let new_op = outbox.get(replacement).unwrap();
        assert_eq!(
            new_op.payload,
            json!({"status": "conditioning", "tags": ["hazy", "ipa"]})
        );
    }

    #[test]
    fn test_keep_server_removes_without_replacement() {
        let outbox = test_outbox();
        let id = suspend_with_conflict(
            &outbox,
            ConflictKind::DataConflict,
            Some(json!({"status": "packaged"})),
        );

        let resolver = ConflictResolver::new(&outbox);
        assert_eq!(
            resolver.resolve(id, Resolution::KeepServer).unwrap(),
            Resolved::Removed(id)
        );
        assert!(outbox.get(id).is_none());
        assert!(outbox.all().is_empty());
    }

    #[test]
    fn test_retry_requeues_with_fresh_budget() {
        let outbox = test_outbox();
        let id = suspend_with_conflict(&outbox, ConflictKind::VersionMismatch, None);
        let key = outbox.get(id).unwrap().idempotency_key;

        let resolver = ConflictResolver::new(&outbox);
        assert_eq!(
            resolver.resolve(id, Resolution::Retry).unwrap(),
            Resolved::Requeued(id)
        );

        let op = outbox.get(id).unwrap();
        assert_eq!(op.state, OperationState::Queued);
        assert_eq!(op.retry_count, 0);
        assert!(op.conflict.is_none());
        // Retry is the same intent: the key is unchanged
        assert_eq!(op.idempotency_key, key);
    }

    #[test]
    fn test_discard_is_terminal_and_visible() {
        let outbox = test_outbox();
        let id = suspend_with_conflict(&outbox, ConflictKind::ResourceConstraint, None);

        let resolver = ConflictResolver::new(&outbox);
        assert_eq!(
            resolver.resolve(id, Resolution::Discard).unwrap(),
            Resolved::Discarded(id)
        );

        let op = outbox.get(id).unwrap();
        assert_eq!(op.state, OperationState::Terminal);
        assert_eq!(op.terminal_reason, Some(TerminalReason::Discarded));
    }

    #[test]
    fn test_resolving_twice_is_a_no_op() {
        let outbox = test_outbox();
        let id = suspend_with_conflict(&outbox, ConflictKind::ResourceConstraint, None);

        let resolver = ConflictResolver::new(&outbox);
        resolver.resolve(id, Resolution::Discard).unwrap();

        // Second discard: already resolved, nothing changes
        assert_eq!(
            resolver.resolve(id, Resolution::Discard).unwrap(),
            Resolved::AlreadyResolved(id)
        );
        assert_eq!(
            outbox.get(id).unwrap().terminal_reason,
            Some(TerminalReason::Discarded)
        );

        // Same for a resolution that removed the item
        let removed = suspend_with_conflict(
            &outbox,
            ConflictKind::DataConflict,
            Some(json!({"status": "packaged"})),
        );
        resolver.resolve(removed, Resolution::KeepServer).unwrap();
        assert_eq!(
            resolver.resolve(removed, Resolution::KeepServer).unwrap(),
            Resolved::AlreadyResolved(removed)
        );
    }

    #[test]
    fn test_unknown_id_reports_already_resolved() {
        let outbox = test_outbox();
        let resolver = ConflictResolver::new(&outbox);

        assert!(matches!(
            resolver.resolve(Uuid::new_v4(), Resolution::Discard).unwrap(),
            Resolved::AlreadyResolved(_)
        ));
    }

    #[test]
    fn test_constraint_conflict_rejects_merge_choices() {
        let outbox = test_outbox();
        let id = suspend_with_conflict(&outbox, ConflictKind::ResourceConstraint, None);

        let resolver = ConflictResolver::new(&outbox);
        for choice in [Resolution::KeepLocal, Resolution::KeepServer, Resolution::Merge] {
            let err = resolver.resolve(id, choice);
            assert!(matches!(err, Err(TaplineError::Resolution(_))), "{choice}");
        }

        // The item is still suspended and resolvable
        assert_eq!(
            outbox.get(id).unwrap().state,
            OperationState::AwaitingResolution
        );
    }

    #[test]
    fn test_merge_without_suggestion_is_an_error() {
        let outbox = test_outbox();
        // Data conflict whose server snapshot was absent: no merge computed
        let id = suspend_with_conflict(&outbox, ConflictKind::DataConflict, None);

        let resolver = ConflictResolver::new(&outbox);
        let err = resolver.resolve(id, Resolution::Merge);
        assert!(matches!(err, Err(TaplineError::Resolution(_))));
    }
}
