//! Driver error types.
//!
//! Every request-level failure maps to one wire error code; see
//! [`DriverError::to_payload`].

use std::fmt;

use cinder_core::CoreError;
use cinder_crypto::CryptoError;
use cinder_proto::{ErrorPayload, ProtocolError};

use crate::storage::StorageError;

/// Errors that can occur while the driver handles an event.
#[derive(Debug)]
pub enum DriverError {
    /// Event for a session the driver never accepted or already closed.
    SessionNotFound(u64),

    /// The request failed validation (bad TTL, empty or oversized note,
    /// malformed key, response opcode sent as a request).
    InvalidRequest(String),

    /// The note does not exist, was already read, or expired.
    ///
    /// The three cases are deliberately indistinguishable.
    NotFound,

    /// The ciphertext could not be authenticated under the given key.
    DecryptFailed,

    /// Storage operation failed.
    ///
    /// Wraps errors from the storage backend. Transient for I/O errors.
    Storage(StorageError),

    /// Frame encoding/decoding error.
    Protocol(String),
}

impl DriverError {
    /// Wire representation sent back to the client.
    ///
    /// Storage and internal messages are not forwarded verbatim; the client
    /// learns only the class of failure.
    pub fn to_payload(&self) -> ErrorPayload {
        match self {
            Self::InvalidRequest(msg) => ErrorPayload::invalid_request(msg.clone()),
            Self::NotFound => ErrorPayload::not_found(),
            Self::DecryptFailed => ErrorPayload::decrypt_failed(),
            Self::Storage(_) => ErrorPayload::storage_error("storage unavailable"),
            Self::SessionNotFound(_) | Self::Protocol(_) => {
                ErrorPayload::internal("internal server error")
            },
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionNotFound(id) => write!(f, "session not found: {id}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
            Self::NotFound => write!(f, "note not found"),
            Self::DecryptFailed => write!(f, "decryption failed"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            _ => None,
        }
    }
}

impl From<StorageError> for DriverError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<ProtocolError> for DriverError {
    fn from(err: ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<CoreError> for DriverError {
    fn from(err: CoreError) -> Self {
        Self::InvalidRequest(err.to_string())
    }
}

impl From<CryptoError> for DriverError {
    fn from(err: CryptoError) -> Self {
        match err {
            CryptoError::InvalidPassphrase { .. } => Self::InvalidRequest(err.to_string()),
            CryptoError::BodyTooShort { .. } | CryptoError::DecryptionFailed => {
                Self::DecryptFailed
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_error_display() {
        assert_eq!(DriverError::SessionNotFound(42).to_string(), "session not found: 42");
        assert_eq!(DriverError::NotFound.to_string(), "note not found");
        assert_eq!(
            DriverError::InvalidRequest("empty note".to_string()).to_string(),
            "invalid request: empty note"
        );
    }

    #[test]
    fn storage_details_stay_on_the_server() {
        let err = DriverError::Storage(StorageError::Io("/var/lib/cinder: disk full".to_string()));
        let payload = err.to_payload();

        assert_eq!(payload.code, ErrorPayload::STORAGE_ERROR);
        assert!(!payload.message.contains("disk full"));
        assert!(payload.is_transient());
    }

    #[test]
    fn crypto_errors_map_to_wire_classes() {
        assert!(matches!(DriverError::from(CryptoError::DecryptionFailed), DriverError::DecryptFailed));
        assert!(matches!(
            DriverError::from(CryptoError::BodyTooShort { len: 3 }),
            DriverError::DecryptFailed
        ));
        assert!(matches!(
            DriverError::from(CryptoError::InvalidPassphrase { reason: "short".to_string() }),
            DriverError::InvalidRequest(_)
        ));
    }
}
