//! Validation errors for core types.

use std::time::Duration;

use thiserror::Error;

/// Errors from parsing or validating core types.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// TTL text is not a positive duration like `1h` or `1h30m`.
    #[error("invalid ttl '{0}'")]
    InvalidTtl(String),

    /// TTL exceeds the maximum note lifetime.
    #[error("ttl {requested:?} exceeds maximum {max:?}")]
    TtlTooLong {
        /// Requested lifetime
        requested: Duration,
        /// Maximum lifetime
        max: Duration,
    },

    /// Note identifier is not a UUID.
    #[error("invalid note id")]
    InvalidNoteId,
}
