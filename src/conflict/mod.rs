//! Conflict detection and resolution.
//!
//! When the server reports that a submitted operation diverged from its own
//! state, the dispatcher suspends the operation and attaches a
//! [`ConflictCase`]. Nothing here resolves automatically: a conflict waits
//! until someone applies an explicit [`Resolution`].

pub mod case;
pub mod merge;
pub mod resolver;

pub use case::{ConflictCase, ConflictKind};
pub use resolver::{ConflictResolver, Resolution, Resolved};
