//! Fuzz target for `Frame::decode`
//!
//! Arbitrary bytes must never panic the header or payload parser. Anything
//! that decodes as a frame is also pushed through `Payload::from_frame`.

#![no_main]

use cinder_proto::{Frame, Payload};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(frame) = Frame::decode(data) {
        let _ = Payload::from_frame(&frame);
    }
});
