//! State engine error types

use thiserror::Error;

/// Errors surfaced by the consensus state engine.
///
/// Handlers never panic: anything recoverable inside block processing is
/// logged and skipped, so the only synchronous caller-visible failures are
/// rollbacks beyond the retained window and historical seeks.
#[derive(Debug, Error)]
pub enum StateError {
    /// A transaction failed a pre-dispatch sanity check.
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    /// The transaction store could not resolve a spent output.
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// A rollback target is below the oldest retained height.
    #[error("rollback to {target} is beyond the retained window (oldest {oldest})")]
    RollbackBeyondWindow {
        /// Requested rollback height
        target: u64,
        /// Oldest height still in the history window
        oldest: u64,
    },

    /// A historical seek target is above the current height.
    #[error("seek to {target} is out of range (current {current})")]
    SeekOutOfRange {
        /// Requested seek height
        target: u64,
        /// Current committed height
        current: u64,
    },

    /// A stake address has no recorded votes for the producer.
    #[error("stake address not found in producer")]
    StakeAddressNotFound,

    /// A refer key does not name a recorded vote.
    #[error("refer key not found")]
    ReferKeyNotFound,

    /// An optional hook was called before registration.
    #[error("hook not registered: {0}")]
    HookUnregistered(&'static str),
}

/// Result type alias for state engine operations
pub type Result<T> = std::result::Result<T, StateError>;
