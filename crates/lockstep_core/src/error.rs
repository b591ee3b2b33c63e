//! Error types for the engine.

use crate::types::WorkerId;
use thiserror::Error;

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

/// Errors that can occur in engine operations.
///
/// [`Deadlock`](EngineError::Deadlock) and [`Overflow`](EngineError::Overflow)
/// are expected outcomes of contention: the transaction has been fully undone
/// and the caller retries with a fresh index triple. The remaining variants
/// indicate programming errors and must not be retried.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Granting the request would close a wait-for cycle.
    #[error("deadlock: granting {worker} a lock on record {record} would close a wait cycle")]
    Deadlock {
        /// The worker whose request was refused.
        worker: WorkerId,
        /// The record the worker was about to wait on.
        record: usize,
    },

    /// A write would take the record value outside the i64 range.
    #[error("overflow: adding {delta} to record {record} at value {origin}")]
    Overflow {
        /// The record being written.
        record: usize,
        /// Value of the record before the write.
        origin: i64,
        /// The delta that overflowed.
        delta: i64,
    },

    /// Operation used outside its legal lifecycle.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the misuse.
        message: String,
    },

    /// Argument outside the container's domain.
    #[error("invalid argument: {message}")]
    InvalidArgument {
        /// Description of the bad argument.
        message: String,
    },
}

impl EngineError {
    /// Creates an invalid state error.
    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Creates an invalid argument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// Whether the failed call may be retried with a fresh index triple.
    ///
    /// True for contention outcomes (deadlock, overflow); false for
    /// programming errors.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Deadlock { .. } | Self::Overflow { .. })
    }
}
