//! Note lifecycle payloads.
//!
//! Field names follow the public contract of the service: a note is created
//! from `{note, secret, delete_after}` and identified by `{id}`.

use serde::{Deserialize, Serialize};

/// Store a new note.
///
/// The server encrypts `note` under `secret` before storing it, so the store
/// only ever holds ciphertext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateNote {
    /// Plaintext note.
    pub note: String,
    /// URL-safe base64 encoded 32-byte passphrase.
    pub secret: String,
    /// Time to live, e.g. `"1h"`, `"24h"`, `"3d"`.
    pub delete_after: String,
}

/// Identifier of a freshly stored note.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteCreated {
    /// Hyphenated UUID. Holding it grants one read.
    pub id: String,
}

/// Destructive single read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchNote {
    /// Note identifier.
    pub id: String,
}

/// Stored body: nonce followed by ciphertext and tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteBody {
    /// Encrypted body bytes.
    pub body: Vec<u8>,
}

/// Decrypt a body with a passphrase. Touches no stored state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decrypt {
    /// Encrypted body as returned by a read.
    pub message: Vec<u8>,
    /// URL-safe base64 encoded 32-byte passphrase.
    pub secret: String,
}

/// Recovered plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plaintext {
    /// Decrypted note.
    pub note: String,
}

/// Freshly generated passphrase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssuedKey {
    /// URL-safe base64 encoded 32-byte passphrase.
    pub secret: String,
}
