//! tapline - offline outbox and sync core for brewery operations clients
//!
//! A client that loses connectivity keeps recording state-changing
//! operations (inventory adjustments, fermentation readings, batch updates)
//! into a durable outbox. When connectivity returns, the dispatcher submits
//! them in batches with stable idempotency keys, so a retry is never applied
//! twice, and surfaces divergence as conflict cases with explicit,
//! deterministic resolutions.
//!
//! The crate deliberately stops at the sync boundary: the concrete
//! transport, the business handlers behind each operation name, and any UI
//! over the queue are the application's concern.

#![deny(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod conflict;
pub mod error;
pub mod outbox;
pub mod storage;
pub mod sync;

pub use config::Config;
pub use conflict::{ConflictCase, ConflictKind, ConflictResolver, Resolution, Resolved};
pub use error::TaplineError;
pub use outbox::{OperationKind, OperationState, Outbox, QueuedOperation, TerminalReason};
pub use storage::{Database, DurableStore, SqliteStore};
pub use sync::{ConnectivityMonitor, DispatchReport, SyncDispatcher, Transport};
