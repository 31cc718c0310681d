//! Fuzz target for body decryption
//!
//! `open` sees bodies straight off the wire. Truncated, tampered or random
//! bodies must be rejected without panicking, and a body sealed under one
//! key must never open under a different one.

#![no_main]

use arbitrary::Arbitrary;
use cinder_crypto::{Passphrase, open, seal};
use libfuzzer_sys::fuzz_target;

#[derive(Debug, Arbitrary)]
struct Input {
    key: [u8; 32],
    other_key: [u8; 32],
    nonce: [u8; 12],
    plaintext: Vec<u8>,
    garbage: Vec<u8>,
    flip: Option<(u16, u8)>,
}

fuzz_target!(|input: Input| {
    let passphrase = Passphrase::from_bytes(input.key);
    let _ = open(&input.garbage, &passphrase);

    let mut body = seal(&input.plaintext, &passphrase, input.nonce);
    assert_eq!(open(&body, &passphrase).ok().as_deref(), Some(input.plaintext.as_slice()));

    if input.other_key != input.key {
        assert!(open(&body, &Passphrase::from_bytes(input.other_key)).is_err());
    }

    if let Some((index, mask)) = input.flip.filter(|&(_, mask)| mask != 0) {
        let index = usize::from(index) % body.len();
        body[index] ^= mask;
        assert!(open(&body, &passphrase).is_err());
    }
});
