//! Failures reported to the user.

use thiserror::Error;

/// Outcomes reported to the user as failures.
#[derive(Debug, Error)]
pub enum CliError {
    #[error("note not found: it never existed, was already read, or expired")]
    Gone,

    #[error("server unreachable: {0}")]
    Unreachable(String),

    #[error("could not obtain a passphrase from the server")]
    NoPassphrase,

    #[error("no passphrase given")]
    NoSecret,

    #[error("wrong passphrase")]
    WrongPassphrase,

    #[error("cancelled")]
    Cancelled,

    #[error("terminal i/o failed: {0}")]
    Io(#[from] std::io::Error),
}
