//! Body sealing with ChaCha20-Poly1305.

use chacha20poly1305::{ChaCha20Poly1305, Key, KeyInit, Nonce, aead::Aead};

use crate::{CryptoError, Passphrase};

/// Nonce size in bytes, stored as the body prefix.
pub const NONCE_SIZE: usize = 12;

/// Poly1305 tag size in bytes.
pub const TAG_SIZE: usize = 16;

/// Encrypt `plaintext` under `passphrase`.
///
/// Returns `nonce || ciphertext || tag`. The caller supplies a fresh random
/// nonce; reusing one with the same passphrase breaks confidentiality.
pub fn seal(plaintext: &[u8], passphrase: &Passphrase, nonce: [u8; NONCE_SIZE]) -> Vec<u8> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(passphrase.as_bytes()));

    let Ok(ciphertext) = cipher.encrypt(Nonce::from_slice(&nonce), plaintext) else {
        unreachable!("ChaCha20-Poly1305 encryption cannot fail with valid inputs");
    };

    let mut body = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
    body.extend_from_slice(&nonce);
    body.extend_from_slice(&ciphertext);
    body
}

/// Decrypt a sealed body.
///
/// # Errors
///
/// - `BodyTooShort`: body cannot contain a nonce and tag
/// - `DecryptionFailed`: wrong passphrase or tampered body
pub fn open(body: &[u8], passphrase: &Passphrase) -> Result<Vec<u8>, CryptoError> {
    if body.len() < NONCE_SIZE + TAG_SIZE {
        return Err(CryptoError::BodyTooShort { len: body.len() });
    }

    let (nonce, ciphertext) = body.split_at(NONCE_SIZE);
    let cipher = ChaCha20Poly1305::new(Key::from_slice(passphrase.as_bytes()));

    cipher.decrypt(Nonce::from_slice(nonce), ciphertext).map_err(|_| CryptoError::DecryptionFailed)
}

/// Decrypt a sealed body holding UTF-8 text.
///
/// Invalid UTF-8 behind a valid tag is reported as `DecryptionFailed`; notes
/// are always created from text.
pub fn open_utf8(body: &[u8], passphrase: &Passphrase) -> Result<String, CryptoError> {
    let plaintext = open(body, passphrase)?;
    String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
}
