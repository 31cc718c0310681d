//! End-to-end scenarios over the simulated server.
//!
//! Creator and viewers run the real client state machines against the real
//! driver through loopback gateways; time is advanced by hand.

use std::time::Duration;

use cinder_client::{
    Composer, DecryptFailure, NoteGateway, NoteId, Passphrase, RetrievalState, Ttl,
    gateway::FetchOutcome,
    parse_share_link,
    session::{ProvisionerSession, RetrievalSession, submit_note},
};
use cinder_harness::{InvariantRegistry, SimEnv, SimServer, SystemSnapshot};

const MAX_FETCH_ATTEMPTS: u32 = 3;

async fn create_note(server: &SimServer, text: &str, ttl: Ttl) -> (NoteId, Passphrase) {
    let gateway = server.connect().await.unwrap();
    let provisioner = ProvisionerSession::new(gateway);
    let mut composer = Composer::new("https://view.example");

    let passphrase = provisioner.ensure(composer.provisioner_mut()).await.unwrap();
    composer.set_note(text);
    composer.set_ttl(ttl);

    let link = submit_note(provisioner.gateway(), &mut composer).await.unwrap();
    (parse_share_link(&link).unwrap(), passphrase)
}

#[tokio::test]
async fn second_fetch_is_not_found() {
    let server = SimServer::new(SimEnv::with_seed(1));
    let (id, _) = create_note(&server, "hello", Ttl::ONE_HOUR).await;
    let gateway = server.connect().await.unwrap();

    let FetchOutcome::Found(body) = gateway.fetch_note(id).await.unwrap() else {
        panic!("first fetch should return the body");
    };
    assert!(!body.windows(5).any(|w| w == b"hello"), "stored body must not contain plaintext");

    assert_eq!(gateway.fetch_note(id).await.unwrap(), FetchOutcome::NotFound);
}

#[tokio::test]
async fn wrong_then_right_passphrase_single_fetch() {
    let server = SimServer::new(SimEnv::with_seed(2));
    let (id, passphrase) = create_note(&server, "hello", Ttl::ONE_HOUR).await;

    let (mut viewer, _handle) =
        RetrievalSession::new(server.connect().await.unwrap(), id, MAX_FETCH_ATTEMPTS);
    assert_eq!(viewer.open().await, &RetrievalState::AwaitingSecret);

    let wrong = Passphrase::from_bytes([0xAA; 32]);
    assert_eq!(viewer.submit_secret(wrong).await, &RetrievalState::DecryptFailed {
        failure: DecryptFailure::Rejected
    });
    assert_eq!(viewer.submit_secret(passphrase).await, &RetrievalState::Decrypted {
        plaintext: "hello".to_string()
    });

    let stats = server.stats().await;
    assert_eq!(stats.notes_read, 1);
    assert_eq!(stats.decrypt_failures, 1);
    assert_eq!(stats.decryptions, 1);
    assert_eq!(viewer.machine().fetch_requests(), 1);

    let snapshot = SystemSnapshot::capture(&server, &[viewer.machine()]);
    InvariantRegistry::standard().assert_all(&snapshot, "after decrypt");
}

#[tokio::test]
async fn never_created_looks_like_consumed() {
    let server = SimServer::new(SimEnv::with_seed(3));
    let (consumed, _) = create_note(&server, "hello", Ttl::ONE_HOUR).await;

    let gateway = server.connect().await.unwrap();
    assert!(matches!(gateway.fetch_note(consumed).await.unwrap(), FetchOutcome::Found(_)));

    let unknown = NoteId::from_bytes([0x42; 16]);
    let (mut a, _) = RetrievalSession::new(server.connect().await.unwrap(), unknown, 1);
    let (mut b, _) = RetrievalSession::new(server.connect().await.unwrap(), consumed, 1);

    assert_eq!(a.open().await, &RetrievalState::Gone);
    assert_eq!(b.open().await, &RetrievalState::Gone);
}

#[tokio::test]
async fn concurrent_viewers_exactly_one_body() {
    let server = SimServer::new(SimEnv::with_seed(4));
    let (id, _) = create_note(&server, "hello", Ttl::ONE_HOUR).await;

    let (mut first, _h1) =
        RetrievalSession::new(server.connect().await.unwrap(), id, MAX_FETCH_ATTEMPTS);
    let (mut second, _h2) =
        RetrievalSession::new(server.connect().await.unwrap(), id, MAX_FETCH_ATTEMPTS);

    let (a, b) = tokio::join!(first.open(), second.open());
    let states = [a.clone(), b.clone()];

    assert_eq!(states.iter().filter(|s| **s == RetrievalState::AwaitingSecret).count(), 1);
    assert_eq!(states.iter().filter(|s| **s == RetrievalState::Gone).count(), 1);

    let snapshot = SystemSnapshot::capture(&server, &[first.machine(), second.machine()]);
    InvariantRegistry::standard().assert_all(&snapshot, "after concurrent viewers");
}

#[tokio::test]
async fn expired_note_is_gone_even_if_never_read() {
    let server = SimServer::new(SimEnv::with_seed(5));
    let (id, _) = create_note(&server, "hello", Ttl::ONE_HOUR).await;

    server.env().advance(Duration::from_secs(3600));

    let (mut viewer, _handle) =
        RetrievalSession::new(server.connect().await.unwrap(), id, MAX_FETCH_ATTEMPTS);
    assert_eq!(viewer.open().await, &RetrievalState::Gone);
    assert!(server.deliveries().is_empty());
}

#[tokio::test]
async fn readable_until_the_last_second() {
    let server = SimServer::new(SimEnv::with_seed(6));
    let (id, passphrase) = create_note(&server, "hello", Ttl::ONE_HOUR).await;

    server.env().advance(Duration::from_secs(3599));

    let (mut viewer, _handle) =
        RetrievalSession::new(server.connect().await.unwrap(), id, MAX_FETCH_ATTEMPTS);
    assert_eq!(viewer.open().await, &RetrievalState::AwaitingSecret);

    // Decrypting never depends on the note still being stored.
    server.env().advance(Duration::from_secs(3600));
    assert!(matches!(viewer.submit_secret(passphrase).await, RetrievalState::Decrypted { .. }));
}

#[tokio::test]
async fn sweep_removes_expired_unread_notes() {
    let server = SimServer::new(SimEnv::with_seed(7));
    create_note(&server, "short", Ttl::ONE_HOUR).await;
    create_note(&server, "long", Ttl::ONE_DAY).await;
    assert_eq!(server.stored_notes().await.unwrap(), 2);

    server.env().advance(Duration::from_secs(2 * 3600));
    server.tick().await;

    assert_eq!(server.stored_notes().await.unwrap(), 1);
    assert_eq!(server.stats().await.notes_purged, 1);
}

#[tokio::test]
async fn reset_issues_a_fresh_key() {
    let server = SimServer::new(SimEnv::with_seed(8));
    let provisioner = ProvisionerSession::new(server.connect().await.unwrap());
    let mut composer = Composer::new("https://view.example");

    let first = provisioner.ensure(composer.provisioner_mut()).await.unwrap();
    composer.set_note("draft");
    let actions = composer.reset();
    let second = provisioner.execute(composer.provisioner_mut(), actions).await.unwrap();

    assert_ne!(first, second);
    assert_eq!(composer.note(), "");
    assert_eq!(server.stats().await.keys_issued, 2);
}
