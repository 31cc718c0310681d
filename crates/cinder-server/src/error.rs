//! Server runtime error types.

use std::fmt;

use crate::{driver_error::DriverError, storage::StorageError};

/// Errors from the server runtime (startup, transport, I/O).
#[derive(Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, unreadable TLS files).
    ///
    /// Fatal at startup. Fix configuration and restart.
    Config(String),

    /// Transport/network error.
    ///
    /// Fatal for the affected connection or stream only.
    Transport(String),

    /// A peer sent bytes that are not a valid frame.
    Protocol(String),

    /// The storage backend could not be opened.
    Storage(StorageError),

    /// Driver error (from `ServerDriver` processing).
    Driver(DriverError),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "configuration error: {msg}"),
            Self::Transport(msg) => write!(f, "transport error: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol error: {msg}"),
            Self::Storage(err) => write!(f, "storage error: {err}"),
            Self::Driver(err) => write!(f, "driver error: {err}"),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Driver(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DriverError> for ServerError {
    fn from(err: DriverError) -> Self {
        Self::Driver(err)
    }
}

impl From<StorageError> for ServerError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

impl From<cinder_proto::ProtocolError> for ServerError {
    fn from(err: cinder_proto::ProtocolError) -> Self {
        Self::Protocol(err.to_string())
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}
