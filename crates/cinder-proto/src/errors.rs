//! Protocol errors.

use thiserror::Error;

/// Result alias for wire-format operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors produced while parsing or building frames.
///
/// None of these are transient: a peer that sends a malformed frame will keep
/// sending it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    /// Buffer is shorter than a frame header.
    #[error("frame too short: expected {expected} bytes, got {actual}")]
    FrameTooShort {
        /// Required length
        expected: usize,
        /// Available length
        actual: usize,
    },

    /// Payload is shorter than the header claims.
    #[error("frame truncated: expected {expected} payload bytes, got {actual}")]
    FrameTruncated {
        /// Payload size claimed by the header
        expected: usize,
        /// Payload bytes actually present
        actual: usize,
    },

    /// Magic number mismatch.
    #[error("invalid magic number")]
    InvalidMagic,

    /// Unsupported protocol version.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// Payload exceeds the protocol limit.
    #[error("payload too large: {size} bytes (max {max})")]
    PayloadTooLarge {
        /// Payload size
        size: usize,
        /// Protocol limit
        max: usize,
    },

    /// Opcode is not part of the protocol.
    #[error("unknown opcode: {0:#06x}")]
    UnknownOpcode(u16),

    /// Payload could not be encoded.
    #[error("CBOR encode failed: {0}")]
    CborEncode(String),

    /// Payload could not be decoded.
    #[error("CBOR decode failed: {0}")]
    CborDecode(String),
}
