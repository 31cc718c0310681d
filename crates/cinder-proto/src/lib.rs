//! Wire format for the cinder note service.
//!
//! Every call is a single request frame answered by a single response frame on
//! its own QUIC bidirectional stream. A [`Frame`] is a fixed 16-byte binary
//! [`FrameHeader`] followed by a CBOR-encoded [`Payload`]. The header carries
//! the [`Opcode`] that identifies the payload type, so the payload itself is
//! encoded without a variant tag.
//!
//! | call          | request                 | response                       |
//! |---------------|-------------------------|--------------------------------|
//! | create a note | [`Opcode::CreateNote`]  | [`Opcode::NoteCreated`]        |
//! | read once     | [`Opcode::FetchNote`]   | [`Opcode::NoteBody`] or error  |
//! | decrypt       | [`Opcode::Decrypt`]     | [`Opcode::Plaintext`] or error |
//! | issue a key   | [`Opcode::IssueKey`]    | [`Opcode::IssuedKey`]          |

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod errors;
mod frame;
mod header;
pub mod payloads;

pub use errors::{ProtocolError, Result};
pub use frame::Frame;
pub use header::FrameHeader;
pub use payloads::{ErrorPayload, Payload};

/// ALPN protocol identifier negotiated during the QUIC handshake.
pub const ALPN_PROTOCOL: &[u8] = b"cinder";

/// Operation codes carried in the frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Opcode {
    /// Error response for any request.
    Error,
    /// Store a new note.
    CreateNote,
    /// Identifier of a freshly stored note.
    NoteCreated,
    /// Destructive single read of a note.
    FetchNote,
    /// Stored body returned by a successful read.
    NoteBody,
    /// Decrypt a body with a passphrase.
    Decrypt,
    /// Recovered plaintext.
    Plaintext,
    /// Request a freshly generated passphrase.
    IssueKey,
    /// Freshly generated passphrase.
    IssuedKey,
}

impl Opcode {
    /// Raw wire value.
    #[must_use]
    pub const fn to_u16(self) -> u16 {
        match self {
            Self::Error => 0x0001,
            Self::CreateNote => 0x0100,
            Self::NoteCreated => 0x0101,
            Self::FetchNote => 0x0102,
            Self::NoteBody => 0x0103,
            Self::Decrypt => 0x0104,
            Self::Plaintext => 0x0105,
            Self::IssueKey => 0x0106,
            Self::IssuedKey => 0x0107,
        }
    }

    /// Parse a raw wire value. `None` if unrecognized.
    #[must_use]
    pub const fn from_u16(value: u16) -> Option<Self> {
        match value {
            0x0001 => Some(Self::Error),
            0x0100 => Some(Self::CreateNote),
            0x0101 => Some(Self::NoteCreated),
            0x0102 => Some(Self::FetchNote),
            0x0103 => Some(Self::NoteBody),
            0x0104 => Some(Self::Decrypt),
            0x0105 => Some(Self::Plaintext),
            0x0106 => Some(Self::IssueKey),
            0x0107 => Some(Self::IssuedKey),
            _ => None,
        }
    }

    /// Whether a client may send this opcode as a request.
    #[must_use]
    pub const fn is_request(self) -> bool {
        matches!(self, Self::CreateNote | Self::FetchNote | Self::Decrypt | Self::IssueKey)
    }
}
