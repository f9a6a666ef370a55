//! Durable, ordered outbox of not-yet-confirmed operations.
//!
//! Operations recorded while the client is offline (or while a sync is
//! pending) live here until the server confirms them. The outbox owns the
//! canonical ordering and lifecycle of queued items; physical persistence
//! goes through the [`DurableStore`](crate::storage::DurableStore) trait.

pub mod key;
pub mod operation;
pub mod store;

pub use operation::{OperationKind, OperationState, QueuedOperation, TerminalReason};
pub use store::{Outbox, OutboxStats};
