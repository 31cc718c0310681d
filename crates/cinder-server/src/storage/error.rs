use thiserror::Error;

/// Errors from storage backends.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StorageError {
    /// Backend I/O or transaction failure.
    ///
    /// The operation did not apply. Transient: the same call may succeed.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// Stored bytes could not be encoded or decoded.
    ///
    /// Indicates corruption or a format change. Not transient.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A note with this id already exists.
    #[error("note id already exists")]
    Conflict,
}

impl StorageError {
    /// Returns true if retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_))
    }
}
