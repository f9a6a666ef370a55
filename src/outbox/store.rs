//! The outbox: in-memory view over the durable store.
//!
//! Owns the canonical ordering and lifecycle of queued items. Every
//! mutation writes through to the [`DurableStore`] before the in-memory
//! view changes, so the view never claims something the disk does not hold.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::conflict::ConflictCase;
use crate::error::TaplineError;
use crate::storage::DurableStore;
use crate::sync::backoff;

use super::operation::{OperationState, QueuedOperation, TerminalReason};

/// Durable, ordered collection of not-yet-confirmed operations.
pub struct Outbox {
    config: SyncConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    store: Box<dyn DurableStore>,
    items: Vec<QueuedOperation>,
}

/// Queue statistics for inspection surfaces.
#[derive(Debug, Clone)]
pub struct OutboxStats {
    /// Items waiting for dispatch.
    pub queued: usize,
    /// Items submitted in the current cycle.
    pub in_flight: usize,
    /// Items suspended on a conflict.
    pub awaiting_resolution: usize,
    /// Items no automatic action will touch again.
    pub terminal: usize,
    /// Oldest queued item's enqueue timestamp.
    pub oldest_queued: Option<DateTime<Utc>>,
}

impl Outbox {
    /// Load the outbox from a durable store.
    ///
    /// Items found `InFlight` are demoted to `Queued`: the process died
    /// mid-dispatch, and the stable idempotency key makes re-submission
    /// safe.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read or recovery writes fail.
    pub fn load(store: Box<dyn DurableStore>, config: SyncConfig) -> Result<Self, TaplineError> {
        let mut items = store.list_all()?;
        items.sort_by_key(|op| op.enqueued_at);

        let mut recovered = 0usize;
        for item in &mut items {
            if item.state == OperationState::InFlight {
                item.state = OperationState::Queued;
                store.put(item)?;
                recovered += 1;
            }
        }

        if recovered > 0 {
            info!(recovered, "recovered in-flight operations from previous run");
        }
        debug!(count = items.len(), "outbox loaded");

        Ok(Self {
            config,
            inner: Mutex::new(Inner { store, items }),
        })
    }

    /// Record a new operation.
    ///
    /// The operation gets a fresh id and idempotency key and is persisted
    /// before this returns. A storage failure means the intent was not
    /// recorded anywhere; the caller must retry the user action.
    ///
    /// # Errors
    ///
    /// Returns [`TaplineError::Storage`] if persistence fails.
    pub fn enqueue(
        &self,
        operation_name: &str,
        payload: serde_json::Value,
    ) -> Result<Uuid, TaplineError> {
        let op = QueuedOperation::new(operation_name, payload, Utc::now());
        let id = op.id;

        let mut inner = self.inner.lock();
        inner.store.put(&op)?;
        inner.items.push(op);

        debug!(%id, operation_name, "operation enqueued");
        Ok(id)
    }

    /// All items eligible for submission at `now`, FIFO by enqueue time.
    ///
    /// Eligible means `Queued`, under the retry budget, and past the
    /// backoff window for its retry count.
    #[must_use]
    pub fn list_eligible(&self, now: DateTime<Utc>) -> Vec<QueuedOperation> {
        let inner = self.inner.lock();
        Self::eligible_sorted(&self.config, &inner.items, now)
            .into_iter()
            .cloned()
            .collect()
    }

    /// Atomically list eligible items and mark them `InFlight`.
    ///
    /// This is the `list_eligible` / `mark_in_flight` pair fused under one
    /// lock so a concurrent enqueue cannot interleave between them. Used by
    /// the dispatcher; `limit` bounds the batch size.
    ///
    /// # Errors
    ///
    /// Returns an error only if no item could be claimed at all; a write
    /// failure partway stops the claim and returns the consistent prefix.
    pub fn claim_eligible(
        &self,
        now: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<QueuedOperation>, TaplineError> {
        let mut inner = self.inner.lock();
        let Inner { store, items } = &mut *inner;

        let eligible: Vec<usize> = {
            let mut pairs: Vec<(usize, DateTime<Utc>)> = items
                .iter()
                .enumerate()
                .filter(|(_, op)| Self::is_eligible(&self.config, op, now))
                .map(|(i, op)| (i, op.enqueued_at))
                .collect();
            pairs.sort_by_key(|(_, at)| *at);
            pairs.into_iter().take(limit).map(|(i, _)| i).collect()
        };

        let mut claimed = Vec::with_capacity(eligible.len());
        for index in eligible {
            let item = &mut items[index];
            item.state = OperationState::InFlight;
            if let Err(e) = store.put(item) {
                item.state = OperationState::Queued;
                warn!(id = %item.id, error = %e, "failed to claim operation, stopping claim");
                if claimed.is_empty() {
                    return Err(e);
                }
                break;
            }
            claimed.push(item.clone());
        }

        Ok(claimed)
    }

    /// Mark queued items `InFlight`. Items not in `Queued` are skipped.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub fn mark_in_flight(&self, ids: &[Uuid]) -> Result<(), TaplineError> {
        let mut inner = self.inner.lock();
        let Inner { store, items } = &mut *inner;

        for id in ids {
            let Some(item) = items.iter_mut().find(|op| op.id == *id) else {
                warn!(%id, "mark_in_flight: unknown operation");
                continue;
            };
            if item.state != OperationState::Queued {
                warn!(%id, state = %item.state, "mark_in_flight: not queued, skipping");
                continue;
            }
            item.state = OperationState::InFlight;
            store.put(item)?;
        }

        Ok(())
    }

    /// Remove confirmed items. Unknown ids are ignored so the call is safe
    /// to repeat after a crash between store write and response handling.
    ///
    /// # Errors
    ///
    /// Returns the first storage error; remaining ids are still processed.
    pub fn mark_succeeded(&self, ids: &[Uuid]) -> Result<(), TaplineError> {
        let mut inner = self.inner.lock();
        let Inner { store, items } = &mut *inner;

        let mut first_error = None;
        for id in ids {
            match store.delete(*id) {
                Ok(_) => items.retain(|op| op.id != *id),
                Err(e) => {
                    warn!(%id, error = %e, "failed to remove confirmed operation");
                    first_error.get_or_insert(e);
                },
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => Err(e),
        }
    }

    /// Record a transient failure.
    ///
    /// Increments the retry count and stamps the attempt. When the count
    /// reaches the retry budget the item escalates to
    /// `Terminal`/`RetriesExhausted` instead of returning to `Queued`.
    ///
    /// # Errors
    ///
    /// Returns [`TaplineError::UnknownOperation`] for an unknown id, or a
    /// storage error if the update cannot be persisted.
    pub fn mark_failed(
        &self,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) -> Result<OperationState, TaplineError> {
        let mut inner = self.inner.lock();
        let Inner { store, items } = &mut *inner;

        let item = items
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(TaplineError::UnknownOperation(id))?;

        item.retry_count += 1;
        item.last_attempt_at = Some(now);
        item.last_error = Some(error.to_string());

        if item.retry_count >= self.config.max_retries {
            item.state = OperationState::Terminal;
            item.terminal_reason = Some(TerminalReason::RetriesExhausted);
            warn!(%id, retries = item.retry_count, "retries exhausted, operation surfaced as terminal");
        } else {
            item.state = OperationState::Queued;
            debug!(%id, retries = item.retry_count, "transient failure recorded");
        }

        store.put(item)?;
        Ok(item.state)
    }

    /// Suspend an item on a conflict until an explicit resolution.
    ///
    /// # Errors
    ///
    /// Returns [`TaplineError::UnknownOperation`] for an unknown id, or a
    /// storage error if the update cannot be persisted.
    pub fn mark_conflict(&self, id: Uuid, conflict: ConflictCase) -> Result<(), TaplineError> {
        let mut inner = self.inner.lock();
        let Inner { store, items } = &mut *inner;

        let item = items
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(TaplineError::UnknownOperation(id))?;

        item.state = OperationState::AwaitingResolution;
        item.last_attempt_at = Some(conflict.detected_at);
        item.conflict = Some(conflict);
        store.put(item)?;

        info!(%id, "operation suspended awaiting conflict resolution");
        Ok(())
    }

    /// Move an item to `Terminal` with the given reason.
    ///
    /// # Errors
    ///
    /// Returns [`TaplineError::UnknownOperation`] for an unknown id, or a
    /// storage error if the update cannot be persisted.
    pub fn mark_terminal(
        &self,
        id: Uuid,
        reason: TerminalReason,
        error: Option<&str>,
    ) -> Result<(), TaplineError> {
        let mut inner = self.inner.lock();
        let Inner { store, items } = &mut *inner;

        let item = items
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(TaplineError::UnknownOperation(id))?;

        item.state = OperationState::Terminal;
        item.terminal_reason = Some(reason);
        if let Some(error) = error {
            item.last_error = Some(error.to_string());
        }
        store.put(item)?;

        warn!(%id, reason = reason.as_str(), "operation surfaced as terminal");
        Ok(())
    }

    /// Return an item to `Queued` with a zeroed retry budget.
    ///
    /// Clears the last error, attempt stamp, terminal reason and any
    /// attached conflict. The idempotency key is untouched: a reset is the
    /// same intent, not a new one.
    ///
    /// # Errors
    ///
    /// Returns [`TaplineError::UnknownOperation`] for an unknown id, or a
    /// storage error if the update cannot be persisted.
    pub fn reset(&self, id: Uuid) -> Result<(), TaplineError> {
        let mut inner = self.inner.lock();
        let Inner { store, items } = &mut *inner;

        let item = items
            .iter_mut()
            .find(|op| op.id == id)
            .ok_or(TaplineError::UnknownOperation(id))?;

        item.state = OperationState::Queued;
        item.retry_count = 0;
        item.last_attempt_at = None;
        item.last_error = None;
        item.terminal_reason = None;
        item.conflict = None;
        store.put(item)?;

        debug!(%id, "operation reset to queued");
        Ok(())
    }

    /// Remove an item permanently. Returns whether it existed.
    ///
    /// # Errors
    ///
    /// Returns a storage error if the delete cannot be persisted.
    pub fn remove(&self, id: Uuid) -> Result<bool, TaplineError> {
        let mut inner = self.inner.lock();
        let existed = inner.store.delete(id)?;
        inner.items.retain(|op| op.id != id);
        Ok(existed)
    }

    /// Fetch one item by id.
    #[must_use]
    pub fn get(&self, id: Uuid) -> Option<QueuedOperation> {
        let inner = self.inner.lock();
        inner.items.iter().find(|op| op.id == id).cloned()
    }

    /// All items, FIFO by enqueue time, for inspection and export.
    #[must_use]
    pub fn all(&self) -> Vec<QueuedOperation> {
        let inner = self.inner.lock();
        let mut items = inner.items.clone();
        items.sort_by_key(|op| op.enqueued_at);
        items
    }

    /// Whether any item is waiting for dispatch.
    #[must_use]
    pub fn has_pending(&self) -> bool {
        let inner = self.inner.lock();
        inner
            .items
            .iter()
            .any(|op| op.state == OperationState::Queued)
    }

    /// Per-state counts plus the oldest queued timestamp.
    #[must_use]
    pub fn stats(&self) -> OutboxStats {
        let inner = self.inner.lock();
        let mut stats = OutboxStats {
            queued: 0,
            in_flight: 0,
            awaiting_resolution: 0,
            terminal: 0,
            oldest_queued: None,
        };

        for op in &inner.items {
            match op.state {
                OperationState::Queued => {
                    stats.queued += 1;
                    let older = stats
                        .oldest_queued
                        .is_none_or(|oldest| op.enqueued_at < oldest);
                    if older {
                        stats.oldest_queued = Some(op.enqueued_at);
                    }
                },
                OperationState::InFlight => stats.in_flight += 1,
                OperationState::AwaitingResolution => stats.awaiting_resolution += 1,
                OperationState::Terminal => stats.terminal += 1,
            }
        }

        stats
    }

    /// Delete terminal items whose last activity predates `older_than`.
    ///
    /// Queued, in-flight and awaiting-resolution items are never purged.
    /// Returns the number of items removed.
    ///
    /// # Errors
    ///
    /// Returns the first storage error encountered.
    pub fn purge_terminal(&self, older_than: DateTime<Utc>) -> Result<usize, TaplineError> {
        let mut inner = self.inner.lock();
        let Inner { store, items } = &mut *inner;

        let expired: Vec<Uuid> = items
            .iter()
            .filter(|op| {
                op.state == OperationState::Terminal
                    && op.last_attempt_at.unwrap_or(op.enqueued_at) < older_than
            })
            .map(|op| op.id)
            .collect();

        for id in &expired {
            store.delete(*id)?;
            items.retain(|op| op.id != *id);
        }

        if !expired.is_empty() {
            debug!(purged = expired.len(), "purged terminal operations");
        }
        Ok(expired.len())
    }

    fn is_eligible(config: &SyncConfig, op: &QueuedOperation, now: DateTime<Utc>) -> bool {
        if op.state != OperationState::Queued || op.retry_count >= config.max_retries {
            return false;
        }

        match op.last_attempt_at {
            None => true,
            Some(last) => now
                .signed_duration_since(last)
                .to_std()
                .is_ok_and(|elapsed| elapsed >= backoff::delay(config, op.retry_count)),
        }
    }

    fn eligible_sorted<'a>(
        config: &SyncConfig,
        items: &'a [QueuedOperation],
        now: DateTime<Utc>,
    ) -> Vec<&'a QueuedOperation> {
        let mut eligible: Vec<&QueuedOperation> = items
            .iter()
            .filter(|op| Self::is_eligible(config, op, now))
            .collect();
        eligible.sort_by_key(|op| op.enqueued_at);
        eligible
    }
}
