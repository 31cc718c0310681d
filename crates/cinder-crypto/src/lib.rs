//! Cinder Cryptographic Primitives
//!
//! Pure functions for sealing and opening note bodies. Callers provide the
//! nonce and key material, so outputs are deterministic under test.
//!
//! # Body format
//!
//! ```text
//! [nonce: 12 bytes][ChaCha20-Poly1305 ciphertext + 16-byte tag]
//! ```
//!
//! # Passphrases
//!
//! A [`Passphrase`] is a 32-byte ChaCha20-Poly1305 key written as URL-safe
//! base64. Server-issued and user-supplied passphrases share the format.
//!
//! # Purity
//!
//! [`open`] reads its inputs and nothing else. Calling it any number of times,
//! with any passphrases, in any order, never changes the body or the outcome of
//! a later call. This is what makes decrypt attempts freely retryable.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod error;
mod passphrase;
mod seal;

pub use error::CryptoError;
pub use passphrase::Passphrase;
pub use seal::{NONCE_SIZE, TAG_SIZE, open, open_utf8, seal};

/// ChaCha20-Poly1305 key size in bytes.
pub const KEY_SIZE: usize = 32;
