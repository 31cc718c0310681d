use thiserror::Error;

/// Errors from passphrase parsing and body opening.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CryptoError {
    /// Passphrase is not URL-safe base64 of exactly 32 bytes.
    #[error("invalid passphrase: {reason}")]
    InvalidPassphrase {
        /// Why parsing failed
        reason: String,
    },

    /// Body cannot hold a nonce and tag.
    #[error("ciphertext too short: {len} bytes")]
    BodyTooShort {
        /// Body length
        len: usize,
    },

    /// Authentication failed: wrong passphrase or tampered body.
    #[error("message has been tampered with or secret is invalid")]
    DecryptionFailed,
}
