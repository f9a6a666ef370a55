//! Batched submission of queued operations.
//!
//! The dispatcher drains eligible outbox items into a single batch per
//! cycle, hands it to the [`Transport`] collaborator, and applies the
//! per-item outcomes back onto the outbox. At most one cycle runs at a
//! time; retries are paced by the backoff schedule.

pub mod backoff;
pub mod connectivity;
pub mod dispatcher;
pub mod transport;

pub use connectivity::ConnectivityMonitor;
pub use dispatcher::{DispatchReport, SkipReason, SyncDispatcher};
pub use transport::{BatchItem, ConflictSignal, ItemOutcome, Outcome, Transport};
