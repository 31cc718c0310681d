use thiserror::Error;

use crate::gateway::GatewayError;

/// Errors from client-side state machines and runners.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ClientError {
    /// Submitted an empty note.
    #[error("note must not be empty")]
    EmptyNote,

    /// No passphrase is held yet.
    #[error("no passphrase available")]
    NoPassphrase,

    /// A submission is already in flight.
    #[error("note submission already in progress")]
    AlreadySubmitting,

    /// The note was already stored; reset the form to write another.
    #[error("note already created")]
    AlreadyCreated,

    /// Text is neither a share link nor a note id.
    #[error("invalid share link: {0}")]
    InvalidLink(String),

    /// The remote call failed.
    #[error(transparent)]
    Gateway(#[from] GatewayError),
}
