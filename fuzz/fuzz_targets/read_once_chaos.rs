//! Fuzz target for the read-once guarantee under storage failures
//!
//! Drives `ServerDriver` over a `ChaoticStorage` with an arbitrary mix of
//! creates, reads, clock jumps and ticks.
//!
//! # Invariants
//!
//! - The driver NEVER panics on storage errors
//! - Every request gets exactly one response carrying its request id
//! - A note body is handed out at most once
//! - A note is never handed out after its expiry

#![no_main]

use std::{collections::HashMap, time::Duration};

use arbitrary::Arbitrary;
use cinder_core::{NoteId, env::Environment};
use cinder_crypto::Passphrase;
use cinder_harness::SimEnv;
use cinder_proto::{
    Frame, FrameHeader, Opcode, Payload,
    payloads::note::{CreateNote, FetchNote},
};
use cinder_server::{
    ChaoticStorage, DriverConfig, MemoryStorage, ServerAction, ServerDriver, ServerEvent,
};
use libfuzzer_sys::fuzz_target;

const SESSION: u64 = 1;
const TTLS: [(&str, u64); 4] = [("1m", 60), ("1h", 3600), ("24h", 86_400), ("3d", 259_200)];

#[derive(Debug, Arbitrary)]
struct Scenario {
    env_seed: u64,
    chaos_seed: u64,
    /// 0-9 maps to 0%-90%
    failure_rate_tenth: u8,
    operations: Vec<Operation>,
}

#[derive(Debug, Arbitrary)]
enum Operation {
    Create { ttl: u8, key: [u8; 32] },
    Fetch { slot: u8 },
    FetchUnknown { id: [u8; 16] },
    Advance { secs: u16 },
    Tick,
}

struct Note {
    id: String,
    expires_at: u64,
    delivered: bool,
}

fuzz_target!(|scenario: Scenario| {
    let failure_rate = f64::from(scenario.failure_rate_tenth % 10) / 10.0;
    let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, scenario.chaos_seed);
    let env = SimEnv::with_seed(scenario.env_seed);
    let mut driver = ServerDriver::new(env.clone(), storage, DriverConfig::default());

    if driver.process_event(ServerEvent::ConnectionAccepted { session_id: SESSION }).is_err() {
        return;
    }

    let mut notes: Vec<Note> = Vec::new();
    let mut deliveries: HashMap<String, usize> = HashMap::new();
    let mut request_id = 0u32;

    for op in scenario.operations {
        match op {
            Operation::Create { ttl, key } => {
                let (delete_after, ttl_secs) = TTLS[usize::from(ttl) % TTLS.len()];
                let payload = Payload::CreateNote(CreateNote {
                    note: "fuzz".to_string(),
                    secret: Passphrase::from_bytes(key).encode(),
                    delete_after: delete_after.to_string(),
                });
                request_id = request_id.wrapping_add(1);
                let now = env.wall_clock_secs();
                if let Payload::NoteCreated(created) = call(&mut driver, payload, request_id) {
                    notes.push(Note { id: created.id, expires_at: now + ttl_secs, delivered: false });
                }
            },
            Operation::Fetch { slot } => {
                if notes.is_empty() {
                    continue;
                }
                let index = usize::from(slot) % notes.len();
                let id = notes[index].id.clone();
                request_id = request_id.wrapping_add(1);
                let now = env.wall_clock_secs();
                if let Payload::NoteBody(_) =
                    call(&mut driver, Payload::FetchNote(FetchNote { id: id.clone() }), request_id)
                {
                    let note = &mut notes[index];
                    assert!(!note.delivered, "note {id} delivered twice");
                    assert!(now < note.expires_at, "note {id} delivered after expiry");
                    note.delivered = true;
                    *deliveries.entry(id).or_default() += 1;
                }
            },
            Operation::FetchUnknown { id } => {
                let id = NoteId::from_bytes(id).to_string();
                if notes.iter().any(|note| note.id == id) {
                    continue;
                }
                request_id = request_id.wrapping_add(1);
                let response = call(&mut driver, Payload::FetchNote(FetchNote { id }), request_id);
                assert!(!matches!(response, Payload::NoteBody(_)));
            },
            Operation::Advance { secs } => env.advance(Duration::from_secs(u64::from(secs))),
            Operation::Tick => {
                let _ = driver.process_event(ServerEvent::Tick);
            },
        }
    }

    assert!(deliveries.values().all(|&count| count == 1));
});

/// Send one request and return its single response payload.
fn call<E, S>(driver: &mut ServerDriver<E, S>, payload: Payload, request_id: u32) -> Payload
where
    E: Environment,
    S: cinder_server::NoteStore,
{
    let mut header = FrameHeader::new(Opcode::Error);
    header.set_request_id(request_id);
    let frame = payload.into_frame(header).expect("request payload encodes");

    let actions = driver
        .process_event(ServerEvent::RequestReceived { session_id: SESSION, frame })
        .expect("live session request is answered");

    let responses: Vec<Frame> = actions
        .into_iter()
        .filter_map(|action| match action {
            ServerAction::Respond { frame, .. } => Some(frame),
            _ => None,
        })
        .collect();
    assert_eq!(responses.len(), 1, "expected exactly one response");

    let response = &responses[0];
    assert_eq!(response.header.request_id(), request_id);
    Payload::from_frame(response).expect("response decodes")
}
