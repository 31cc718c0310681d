//! CBOR-encoded protocol messages.
//!
//! Frame headers are raw binary, payloads use CBOR. The payload type is fixed
//! by the header opcode, so only the inner struct is serialized and a
//! mismatched opcode/payload pair fails to decode instead of being
//! misinterpreted.

pub mod note;

use bytes::BufMut;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{
    Frame, FrameHeader, Opcode,
    errors::{ProtocolError, Result},
};

/// All possible frame payloads
///
/// # Invariants
///
/// - Each variant maps to exactly one [`Opcode`] via [`Payload::opcode`].
/// - Encoding a payload and decoding it with the same opcode yields an equal
///   value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Store a new note
    CreateNote(note::CreateNote),
    /// Identifier of the stored note
    NoteCreated(note::NoteCreated),
    /// Destructive single read
    FetchNote(note::FetchNote),
    /// Body returned by a successful read
    NoteBody(note::NoteBody),
    /// Decrypt a body
    Decrypt(note::Decrypt),
    /// Decrypted plaintext
    Plaintext(note::Plaintext),
    /// Request a passphrase (no body)
    IssueKey,
    /// Issued passphrase
    IssuedKey(note::IssuedKey),
    /// Error response
    Error(ErrorPayload),
}

/// Error payload for error frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    /// Error code identifying the type of error.
    pub code: u16,
    /// Human-readable error message.
    pub message: String,
}

impl ErrorPayload {
    /// Note does not exist, was already read, or expired.
    pub const NOT_FOUND: u16 = 0x0001;
    /// Request was malformed or failed validation.
    pub const INVALID_REQUEST: u16 = 0x0002;
    /// Passphrase is wrong or the body was tampered with.
    pub const DECRYPT_FAILED: u16 = 0x0003;
    /// Storage operation failed.
    pub const STORAGE_ERROR: u16 = 0x0004;
    /// Unexpected server failure.
    pub const INTERNAL: u16 = 0x0005;

    /// Fixed message for [`Self::NOT_FOUND`].
    ///
    /// Never varies with the cause, so callers cannot tell a consumed note
    /// from an expired or unknown one.
    pub const NOT_FOUND_MESSAGE: &'static str = "note not found";

    /// Create a not found error.
    pub fn not_found() -> Self {
        Self { code: Self::NOT_FOUND, message: Self::NOT_FOUND_MESSAGE.to_string() }
    }

    /// Create an invalid request error.
    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self { code: Self::INVALID_REQUEST, message: msg.into() }
    }

    /// Create a decryption failure error.
    pub fn decrypt_failed() -> Self {
        Self {
            code: Self::DECRYPT_FAILED,
            message: "message has been tampered with or secret is invalid".to_string(),
        }
    }

    /// Create a storage error.
    pub fn storage_error(msg: impl Into<String>) -> Self {
        Self { code: Self::STORAGE_ERROR, message: msg.into() }
    }

    /// Create an internal error.
    pub fn internal(msg: impl Into<String>) -> Self {
        Self { code: Self::INTERNAL, message: msg.into() }
    }

    /// Whether the same request may succeed if sent again.
    pub fn is_transient(&self) -> bool {
        matches!(self.code, Self::STORAGE_ERROR | Self::INTERNAL)
    }
}

impl Payload {
    /// Opcode corresponding to this payload type.
    #[must_use]
    pub const fn opcode(&self) -> Opcode {
        match self {
            Self::CreateNote(_) => Opcode::CreateNote,
            Self::NoteCreated(_) => Opcode::NoteCreated,
            Self::FetchNote(_) => Opcode::FetchNote,
            Self::NoteBody(_) => Opcode::NoteBody,
            Self::Decrypt(_) => Opcode::Decrypt,
            Self::Plaintext(_) => Opcode::Plaintext,
            Self::IssueKey => Opcode::IssueKey,
            Self::IssuedKey(_) => Opcode::IssuedKey,
            Self::Error(_) => Opcode::Error,
        }
    }

    /// Encode payload to buffer
    ///
    /// Serializes only the inner struct, not the variant tag. Size limits are
    /// enforced later by [`Frame::encode`].
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn encode(&self, dst: &mut impl BufMut) -> Result<()> {
        let mut writer = dst.writer();

        match self {
            Self::CreateNote(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::NoteCreated(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::FetchNote(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::NoteBody(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Decrypt(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Plaintext(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::IssueKey => Ok(()), // Zero-byte payload
            Self::IssuedKey(inner) => ciborium::ser::into_writer(inner, &mut writer),
            Self::Error(inner) => ciborium::ser::into_writer(inner, &mut writer),
        }
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))
    }

    /// Decode payload from bytes based on opcode
    ///
    /// # Errors
    ///
    /// - `ProtocolError::PayloadTooLarge` if bytes exceed `MAX_PAYLOAD_SIZE`
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn decode(opcode: Opcode, bytes: &[u8]) -> Result<Self> {
        if bytes.len() > FrameHeader::MAX_PAYLOAD_SIZE as usize {
            return Err(ProtocolError::PayloadTooLarge {
                size: bytes.len(),
                max: FrameHeader::MAX_PAYLOAD_SIZE as usize,
            });
        }

        let payload = match opcode {
            Opcode::CreateNote => Self::CreateNote(from_cbor(bytes)?),
            Opcode::NoteCreated => Self::NoteCreated(from_cbor(bytes)?),
            Opcode::FetchNote => Self::FetchNote(from_cbor(bytes)?),
            Opcode::NoteBody => Self::NoteBody(from_cbor(bytes)?),
            Opcode::Decrypt => Self::Decrypt(from_cbor(bytes)?),
            Opcode::Plaintext => Self::Plaintext(from_cbor(bytes)?),
            Opcode::IssueKey => Self::IssueKey,
            Opcode::IssuedKey => Self::IssuedKey(from_cbor(bytes)?),
            Opcode::Error => Self::Error(from_cbor(bytes)?),
        };

        Ok(payload)
    }

    /// Convert payload into a transport frame
    ///
    /// Encodes the payload and stamps its opcode into `header`.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::CborEncode` if serialization fails
    pub fn into_frame(self, mut header: FrameHeader) -> Result<Frame> {
        let mut buf = Vec::new();
        self.encode(&mut buf)?;
        header.opcode = self.opcode().to_u16().to_be_bytes();
        Ok(Frame::new(header, buf))
    }

    /// Parse payload from a raw transport frame
    ///
    /// # Errors
    ///
    /// - `ProtocolError::UnknownOpcode` if the header opcode is not recognized
    /// - `ProtocolError::CborDecode` if CBOR deserialization fails
    pub fn from_frame(frame: &Frame) -> Result<Self> {
        let opcode = frame
            .header
            .opcode_enum()
            .ok_or(ProtocolError::UnknownOpcode(frame.header.opcode()))?;
        Self::decode(opcode, &frame.payload)
    }
}

fn from_cbor<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
