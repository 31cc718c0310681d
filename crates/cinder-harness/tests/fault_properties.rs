//! Property tests: lossy networks and failing storage never break
//! burn-after-read.
//!
//! Viewers retry through lost requests, lost responses and injected storage
//! failures. Whatever the schedule, the standard invariants must hold: a body
//! is handed out at most once and sessions stay within their fetch bound.

use cinder_client::{
    CreateNoteRequest, DecryptFailure, NoteGateway, NoteId, Passphrase, RetrievalState, Ttl,
    session::RetrievalSession,
};
use cinder_harness::{
    FaultPlan, FaultyGateway, InvariantRegistry, LoopbackGateway, SimEnv, SimServer,
    SystemSnapshot,
};
use cinder_server::{ChaoticStorage, DriverConfig, MemoryStorage, NoteStore};
use proptest::prelude::*;

const MAX_FETCH_ATTEMPTS: u32 = 3;
const MAX_DECRYPT_ATTEMPTS: usize = 5;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

async fn seed_note<S: NoteStore>(server: &SimServer<S>) -> (NoteId, Passphrase) {
    let gateway = server.connect().await.unwrap();
    let passphrase = Passphrase::from_bytes([0x11; 32]);
    let request = CreateNoteRequest {
        plaintext: "burn after reading".to_string(),
        passphrase: passphrase.clone(),
        ttl: Ttl::ONE_HOUR,
    };

    // Storage faults may reject a create; retry until it lands.
    loop {
        if let Ok(id) = gateway.create_note(&request).await {
            return (id, passphrase);
        }
    }
}

/// Drive a viewer to a terminal state or a stable failure.
async fn view<G: NoteGateway>(session: &mut RetrievalSession<G>, passphrase: &Passphrase) {
    session.open().await;
    while matches!(session.state(), RetrievalState::FetchFailed { .. }) {
        session.retry_fetch().await;
    }

    for _ in 0..MAX_DECRYPT_ATTEMPTS {
        match session.state() {
            RetrievalState::AwaitingSecret
            | RetrievalState::DecryptFailed { failure: DecryptFailure::Transport(_) } => {
                session.submit_secret(passphrase.clone()).await;
            },
            _ => break,
        }
    }
}

async fn run_viewers<S: NoteStore>(
    server: &SimServer<S>,
    viewers: usize,
    plan: FaultPlan,
    seed: u64,
) -> Vec<RetrievalSession<FaultyGateway<LoopbackGateway<S>>>> {
    let (id, passphrase) = seed_note(server).await;

    let mut sessions = Vec::with_capacity(viewers);
    for i in 0..viewers {
        let connection = server.connect().await.unwrap();
        let gateway = FaultyGateway::new(connection, plan, seed.wrapping_add(i as u64));
        let (session, _handle) = RetrievalSession::new(gateway, id, MAX_FETCH_ATTEMPTS);
        sessions.push(session);
    }

    for session in &mut sessions {
        view(session, &passphrase).await;
    }
    sessions
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn lossy_network_never_delivers_twice(
        seed in any::<u64>(),
        viewers in 1usize..5,
        drop_request in 0.0f64..0.6,
        drop_response in 0.0f64..0.6,
    ) {
        let plan = FaultPlan { drop_request, drop_response };
        let (snapshot, decrypted) = runtime().block_on(async {
            let server = SimServer::new(SimEnv::with_seed(seed));
            let sessions = run_viewers(&server, viewers, plan, seed).await;

            let machines: Vec<_> = sessions.iter().map(RetrievalSession::machine).collect();
            let decrypted = machines
                .iter()
                .filter(|m| matches!(m.state(), RetrievalState::Decrypted { .. }))
                .count();
            (SystemSnapshot::capture(&server, &machines), decrypted)
        });

        // PROPERTY: at most one viewer ever reads the note
        prop_assert!(decrypted <= 1);
        InvariantRegistry::standard().assert_all(&snapshot, "after lossy run");
    }

    #[test]
    fn failing_storage_never_delivers_twice(
        seed in any::<u64>(),
        viewers in 1usize..5,
        failure_rate in 0.0f64..0.5,
    ) {
        let snapshot = runtime().block_on(async {
            let storage = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
            let server =
                SimServer::with_storage(SimEnv::with_seed(seed), storage, DriverConfig::default());
            let sessions = run_viewers(&server, viewers, FaultPlan::NONE, seed).await;

            let machines: Vec<_> = sessions.iter().map(RetrievalSession::machine).collect();
            SystemSnapshot::capture(&server, &machines)
        });

        InvariantRegistry::standard().assert_all(&snapshot, "after storage chaos");
    }

    #[test]
    fn reliable_network_first_viewer_wins(seed in any::<u64>(), viewers in 1usize..5) {
        let states = runtime().block_on(async {
            let server = SimServer::new(SimEnv::with_seed(seed));
            let sessions = run_viewers(&server, viewers, FaultPlan::NONE, seed).await;
            sessions.iter().map(|s| s.state().clone()).collect::<Vec<_>>()
        });

        // ORACLE: sequential viewers on a perfect network
        prop_assert!(matches!(states[0], RetrievalState::Decrypted { .. }), "expected Decrypted state, got {:?}", states[0]);
        for state in &states[1..] {
            prop_assert_eq!(state, &RetrievalState::Gone);
        }
    }
}
