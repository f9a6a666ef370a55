//! Sync dispatcher: drives one batched submission cycle.
//!
//! At most one cycle runs at a time. A cycle claims every eligible outbox
//! item, submits the batch through the transport, and applies the per-item
//! outcomes. One item's failure never blocks the rest of the batch.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::SyncConfig;
use crate::conflict::{merge, ConflictCase, ConflictKind};
use crate::error::TaplineError;
use crate::outbox::operation::{OperationState, QueuedOperation, TerminalReason};
use crate::outbox::Outbox;

use super::connectivity::ConnectivityMonitor;
use super::transport::{BatchItem, ConflictSignal, Outcome, Transport};

/// Why a dispatch call did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The connectivity monitor reports offline.
    Offline,
    /// Another dispatch cycle is already running.
    AlreadyRunning,
}

/// Tallies for one dispatch cycle.
#[derive(Debug, Clone, Default)]
pub struct DispatchReport {
    /// Set when the cycle did not run at all.
    pub skipped: Option<SkipReason>,
    /// Items submitted in the batch.
    pub submitted: usize,
    /// Items confirmed applied (includes duplicates).
    pub succeeded: usize,
    /// Of the succeeded, how many the server had already applied.
    pub duplicates: usize,
    /// Items rescheduled for retry.
    pub transient_failures: usize,
    /// Items escalated to terminal after exhausting the retry budget.
    pub retries_exhausted: usize,
    /// Items suspended awaiting conflict resolution.
    pub conflicts: usize,
    /// Items the server permanently rejected.
    pub rejected: usize,
}

impl DispatchReport {
    /// An empty report for a cycle with nothing to do.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// A report for a cycle that never ran.
    #[must_use]
    pub fn skip(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Self::default()
        }
    }

    /// Whether every submitted item was confirmed applied.
    #[must_use]
    pub const fn all_succeeded(&self) -> bool {
        self.succeeded == self.submitted
    }
}

/// Orchestrates batched submission of eligible outbox items.
pub struct SyncDispatcher<'a, T: Transport> {
    outbox: &'a Outbox,
    transport: &'a T,
    connectivity: &'a ConnectivityMonitor,
    config: SyncConfig,
    running: AtomicBool,
}

impl<'a, T: Transport> SyncDispatcher<'a, T> {
    /// Create a dispatcher over an outbox and transport.
    #[must_use]
    pub const fn new(
        outbox: &'a Outbox,
        transport: &'a T,
        connectivity: &'a ConnectivityMonitor,
        config: SyncConfig,
    ) -> Self {
        Self {
            outbox,
            transport,
            connectivity,
            config,
            running: AtomicBool::new(false),
        }
    }

    /// Run one dispatch cycle at the given instant.
    ///
    /// Single-flight: if a cycle is already in progress the call returns an
    /// empty report marked [`SkipReason::AlreadyRunning`] instead of queuing
    /// a second cycle. Offline, the call returns immediately with
    /// [`SkipReason::Offline`].
    ///
    /// # Errors
    ///
    /// Returns an error only when the outbox itself fails; transport and
    /// per-item failures are recorded on the items and tallied in the
    /// report.
    pub fn dispatch(&self, now: DateTime<Utc>) -> Result<DispatchReport, TaplineError> {
        if !self.connectivity.is_online() {
            debug!("dispatch skipped: offline");
            return Ok(DispatchReport::skip(SkipReason::Offline));
        }

        if self
            .running
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("dispatch skipped: cycle already running");
            return Ok(DispatchReport::skip(SkipReason::AlreadyRunning));
        }

        let result = self.run_cycle(now);
        self.running.store(false, Ordering::SeqCst);
        result
    }

    fn run_cycle(&self, now: DateTime<Utc>) -> Result<DispatchReport, TaplineError> {
        let items = self.outbox.claim_eligible(now, self.config.batch_limit)?;
        if items.is_empty() {
            return Ok(DispatchReport::empty());
        }

        let batch: Vec<BatchItem> = items
            .iter()
            .map(|op| BatchItem {
                id: op.id,
                operation_name: op.operation_name.clone(),
                payload: op.payload.clone(),
                idempotency_key: op.idempotency_key.clone(),
            })
            .collect();

        info!(count = batch.len(), "submitting batch");

        let mut report = DispatchReport {
            submitted: items.len(),
            ..DispatchReport::default()
        };

        let outcomes = match self.transport.submit_batch(&batch) {
            Ok(outcomes) => outcomes,
            Err(e) => {
                // The batch never reached the server: every item is a
                // transient failure
                warn!(error = %e, "batch submission failed");
                let message = e.to_string();
                for item in &items {
                    self.apply_transient(&mut report, item.id, &message, now);
                }
                return Ok(report);
            },
        };

        let mut by_id: HashMap<Uuid, Outcome> = HashMap::new();
        for outcome in outcomes {
            by_id.insert(outcome.id, outcome.outcome);
        }

        for item in &items {
            match by_id.remove(&item.id) {
                Some(Outcome::Success) => {
                    self.apply_success(&mut report, item.id, false);
                },
                Some(Outcome::Duplicate) => {
                    // The server recognized the idempotency key: the effect
                    // is already applied, so this is a success
                    self.apply_success(&mut report, item.id, true);
                },
                Some(Outcome::Transient(error)) => {
                    self.apply_transient(&mut report, item.id, &error, now);
                },
                Some(Outcome::Conflict(signal)) => {
                    self.apply_conflict(&mut report, item, signal, now);
                },
                Some(Outcome::Permanent(error)) => {
                    self.apply_permanent(&mut report, item.id, &error);
                },
                None => {
                    self.apply_transient(
                        &mut report,
                        item.id,
                        "no outcome returned for operation",
                        now,
                    );
                },
            }
        }

        for id in by_id.keys() {
            warn!(%id, "server returned an outcome for an operation that was not submitted");
        }

        info!(
            succeeded = report.succeeded,
            transient = report.transient_failures,
            conflicts = report.conflicts,
            rejected = report.rejected,
            "dispatch cycle complete"
        );
        Ok(report)
    }

    fn apply_success(&self, report: &mut DispatchReport, id: Uuid, duplicate: bool) {
        if let Err(e) = self.outbox.mark_succeeded(&[id]) {
            warn!(%id, error = %e, "failed to record success");
            return;
        }
        report.succeeded += 1;
        if duplicate {
            report.duplicates += 1;
        }
    }

    fn apply_transient(
        &self,
        report: &mut DispatchReport,
        id: Uuid,
        error: &str,
        now: DateTime<Utc>,
    ) {
        match self.outbox.mark_failed(id, error, now) {
            Ok(OperationState::Terminal) => report.retries_exhausted += 1,
            Ok(_) => report.transient_failures += 1,
            Err(e) => warn!(%id, error = %e, "failed to record transient failure"),
        }
    }

    fn apply_conflict(
        &self,
        report: &mut DispatchReport,
        item: &QueuedOperation,
        signal: ConflictSignal,
        now: DateTime<Utc>,
    ) {
        let suggested_merge = match (signal.kind, &signal.server_snapshot) {
            (ConflictKind::DataConflict, Some(server)) => {
                Some(merge::suggest_merge(&item.payload, server))
            },
            _ => None,
        };

        let case = ConflictCase {
            operation_id: item.id,
            kind: signal.kind,
            local_snapshot: item.payload.clone(),
            server_snapshot: signal.server_snapshot,
            constraint_details: signal.constraint_details,
            suggested_merge,
            detected_at: now,
        };

        match self.outbox.mark_conflict(item.id, case) {
            Ok(()) => report.conflicts += 1,
            Err(e) => warn!(id = %item.id, error = %e, "failed to record conflict"),
        }
    }

    fn apply_permanent(&self, report: &mut DispatchReport, id: Uuid, error: &str) {
        match self
            .outbox
            .mark_terminal(id, TerminalReason::Rejected, Some(error))
        {
            Ok(()) => report.rejected += 1,
            Err(e) => warn!(%id, error = %e, "failed to record permanent rejection"),
        }
    }
}
