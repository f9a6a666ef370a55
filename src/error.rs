//! Error types for tapline.
//!
//! Every fallible operation in the crate returns `Result<_, TaplineError>`.
//! Failures that belong to a single queued operation (transient submit
//! errors, conflicts, permanent rejections) are recorded on the operation
//! itself and never abort processing of the rest of a batch.

use thiserror::Error;
use uuid::Uuid;

/// Errors that can occur in tapline.
#[derive(Debug, Error)]
pub enum TaplineError {
    /// Durable storage operation failed.
    ///
    /// When returned from `Outbox::enqueue`, the intent was not recorded and
    /// the caller must retry the user action.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Payload could not be serialized or deserialized.
    #[error("Payload error: {0}")]
    Payload(String),

    /// The whole batch submission failed before per-item outcomes were
    /// produced (transport unreachable).
    #[error("Transport error: {0}")]
    Transport(String),

    /// No queued operation exists with the given id.
    #[error("Unknown operation: {0}")]
    UnknownOperation(Uuid),

    /// The requested conflict resolution cannot be applied.
    #[error("Resolution error: {0}")]
    Resolution(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = TaplineError::Storage("disk full".to_string());
        assert_eq!(err.to_string(), "Storage error: disk full");

        let id = Uuid::nil();
        let err = TaplineError::UnknownOperation(id);
        assert!(err.to_string().contains(&id.to_string()));
    }
}
