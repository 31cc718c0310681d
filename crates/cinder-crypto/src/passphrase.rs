//! Passphrase type.

use std::{fmt, str::FromStr};

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use zeroize::Zeroizing;

use crate::{CryptoError, KEY_SIZE};

/// A 32-byte note key in its transferable text form.
///
/// Key bytes are zeroized on drop. `Debug` never prints the key.
#[derive(Clone, PartialEq, Eq)]
pub struct Passphrase {
    key: Zeroizing<[u8; KEY_SIZE]>,
}

impl Passphrase {
    /// Wrap raw key bytes.
    pub fn from_bytes(key: [u8; KEY_SIZE]) -> Self {
        Self { key: Zeroizing::new(key) }
    }

    /// Parse the text form.
    ///
    /// Accepts URL-safe base64 with or without `=` padding. Surrounding
    /// whitespace is ignored.
    pub fn parse(encoded: &str) -> Result<Self, CryptoError> {
        let trimmed = encoded.trim().trim_end_matches('=');
        if trimmed.is_empty() {
            return Err(CryptoError::InvalidPassphrase { reason: "empty".to_string() });
        }

        let decoded = Zeroizing::new(
            URL_SAFE_NO_PAD
                .decode(trimmed)
                .map_err(|e| CryptoError::InvalidPassphrase { reason: e.to_string() })?,
        );

        let key: [u8; KEY_SIZE] =
            decoded.as_slice().try_into().map_err(|_| CryptoError::InvalidPassphrase {
                reason: format!("expected {KEY_SIZE} bytes, got {}", decoded.len()),
            })?;

        Ok(Self::from_bytes(key))
    }

    /// Text form: unpadded URL-safe base64.
    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.key.as_slice())
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8; KEY_SIZE] {
        &self.key
    }
}

impl FromStr for Passphrase {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Debug for Passphrase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Passphrase(<redacted>)")
    }
}
