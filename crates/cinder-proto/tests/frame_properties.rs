//! Property-based tests for the wire format
//!
//! Frames arrive from untrusted peers, so decoding must reject garbage with an
//! error rather than panic, and every payload a client can build must survive
//! the trip through the wire unchanged.

use cinder_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::note::{CreateNote, Decrypt, FetchNote},
};
use proptest::prelude::*;

fn request_payload() -> impl Strategy<Value = Payload> {
    prop_oneof![
        (".{0,64}", "[A-Za-z0-9_-]{0,44}", "[0-9]{1,2}[mhd]").prop_map(
            |(note, secret, delete_after)| {
                Payload::CreateNote(CreateNote { note, secret, delete_after })
            }
        ),
        "[0-9a-f-]{0,36}".prop_map(|id| Payload::FetchNote(FetchNote { id })),
        (prop::collection::vec(any::<u8>(), 0..128), "[A-Za-z0-9_-]{0,44}")
            .prop_map(|(message, secret)| Payload::Decrypt(Decrypt { message, secret })),
        Just(Payload::IssueKey),
    ]
}

#[test]
fn prop_request_survives_wire() {
    proptest!(|(payload in request_payload(), request_id in any::<u32>())| {
        let mut header = FrameHeader::new(payload.opcode());
        header.set_request_id(request_id);
        let frame = payload.clone().into_frame(header).expect("encode payload");

        let mut wire = Vec::new();
        frame.encode(&mut wire).expect("encode frame");
        let decoded = Frame::decode(&wire).expect("decode frame");

        // PROPERTY: request id and payload are preserved
        prop_assert_eq!(decoded.header.request_id(), request_id);
        prop_assert!(decoded.header.opcode_enum().is_some_and(Opcode::is_request));
        prop_assert_eq!(Payload::from_frame(&decoded).expect("decode payload"), payload);
    });
}

#[test]
fn prop_garbage_never_panics() {
    proptest!(|(bytes in prop::collection::vec(any::<u8>(), 0..512))| {
        // PROPERTY: arbitrary input yields Ok or Err, never a panic
        if let Ok(frame) = Frame::decode(&bytes) {
            let _ = Payload::from_frame(&frame);
        }
    });
}

#[test]
fn prop_valid_header_with_garbage_payload_is_rejected_cleanly() {
    proptest!(|(
        opcode in prop_oneof![
            Just(Opcode::CreateNote),
            Just(Opcode::FetchNote),
            Just(Opcode::Decrypt),
            Just(Opcode::NoteBody),
        ],
        garbage in prop::collection::vec(any::<u8>(), 1..64),
    )| {
        let frame = Frame::new(FrameHeader::new(opcode), garbage);
        // PROPERTY: decoding either fails or yields the payload type the opcode names
        if let Ok(payload) = Payload::from_frame(&frame) {
            prop_assert_eq!(payload.opcode(), opcode);
        }
    });
}
