//! Fuzz target for `Payload::decode`
//!
//! Feeds the same bytes to every opcode: malformed CBOR, type confusion and
//! oversized strings must all come back as errors.

#![no_main]

use cinder_proto::{Opcode, Payload};
use libfuzzer_sys::fuzz_target;

const OPCODES: [Opcode; 9] = [
    Opcode::Error,
    Opcode::CreateNote,
    Opcode::NoteCreated,
    Opcode::FetchNote,
    Opcode::NoteBody,
    Opcode::Decrypt,
    Opcode::Plaintext,
    Opcode::IssueKey,
    Opcode::IssuedKey,
];

fuzz_target!(|data: &[u8]| {
    for opcode in OPCODES {
        if let Ok(payload) = Payload::decode(opcode, data) {
            assert_eq!(payload.opcode(), opcode);
        }
    }
});
