//! End-to-end tests: client state machines over QUIC against a real server.

use std::{net::SocketAddr, sync::Arc};

use cinder_client::{
    Composer, DecryptFailure, NoteGateway, Passphrase, RetrievalState, Ttl,
    gateway::{DecryptOutcome, FetchOutcome},
    parse_share_link,
    session::{ProvisionerSession, RetrievalSession, submit_note},
    transport::{QuicGateway, TransportConfig},
};
use cinder_server::{Server, ServerRuntimeConfig};
use tokio::sync::oneshot;

struct RunningServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

fn start_server() -> RunningServer {
    let config =
        ServerRuntimeConfig { bind_address: "127.0.0.1:0".to_string(), ..Default::default() };
    let server = Server::bind(config).expect("server should bind");
    let addr = server.local_addr().expect("bound address");

    let (tx, rx) = oneshot::channel::<()>();
    tokio::spawn(server.run_until(async move {
        let _ = rx.await;
    }));

    RunningServer { addr, shutdown: Some(tx) }
}

fn connect(server: &RunningServer) -> Arc<QuicGateway> {
    Arc::new(
        QuicGateway::new(&server.addr.to_string(), TransportConfig::development())
            .expect("gateway should build"),
    )
}

#[tokio::test]
async fn create_read_once_then_decrypt() {
    let server = start_server();
    let gateway = connect(&server);

    let provisioner = ProvisionerSession::new(Arc::clone(&gateway));
    let mut composer = Composer::new("https://view.example");
    let passphrase =
        provisioner.ensure(composer.provisioner_mut()).await.expect("server issues a key");
    composer.set_note("hello");
    composer.set_ttl(Ttl::ONE_HOUR);

    let link = submit_note(gateway.as_ref(), &mut composer).await.expect("note created");
    let id = parse_share_link(&link).expect("link carries the id");

    let (mut viewer, _handle) = RetrievalSession::new(Arc::clone(&gateway), id, 3);
    assert_eq!(viewer.open().await, &RetrievalState::AwaitingSecret);

    let wrong = Passphrase::from_bytes([0x55; 32]);
    assert_eq!(viewer.submit_secret(wrong).await, &RetrievalState::DecryptFailed {
        failure: DecryptFailure::Rejected
    });
    assert_eq!(viewer.submit_secret(passphrase).await, &RetrievalState::Decrypted {
        plaintext: "hello".to_string()
    });
    assert_eq!(viewer.machine().fetch_requests(), 1);

    // The note is gone for everyone else.
    let (mut second, _handle) = RetrievalSession::new(Arc::clone(&gateway), id, 3);
    assert_eq!(second.open().await, &RetrievalState::Gone);

    gateway.close().await;
}

#[tokio::test]
async fn unknown_note_is_not_found() {
    let server = start_server();
    let gateway = connect(&server);

    let outcome = gateway
        .fetch_note(cinder_client::NoteId::from_bytes([0xEE; 16]))
        .await
        .expect("server answers");
    assert_eq!(outcome, FetchOutcome::NotFound);

    gateway.close().await;
}

#[tokio::test]
async fn concurrent_viewers_exactly_one_wins() {
    let server = start_server();
    let gateway = connect(&server);

    let key = gateway.issue_key().await.expect("key issued");
    let mut composer = Composer::new("https://view.example");
    composer.provisioner_mut().supply(key);
    composer.set_note("only once");
    let link = submit_note(gateway.as_ref(), &mut composer).await.expect("note created");
    let id = parse_share_link(&link).expect("link carries the id");

    let first = connect(&server);
    let second = connect(&server);
    let (a, b) = tokio::join!(first.fetch_note(id), second.fetch_note(id));
    let outcomes = [a.expect("server answers"), b.expect("server answers")];

    let found = outcomes.iter().filter(|o| matches!(o, FetchOutcome::Found(_))).count();
    assert_eq!(found, 1, "exactly one viewer receives the body: {outcomes:?}");

    first.close().await;
    second.close().await;
    gateway.close().await;
}

#[tokio::test]
async fn decrypt_is_repeatable() {
    let server = start_server();
    let gateway = connect(&server);

    let key = gateway.issue_key().await.expect("key issued");
    let mut composer = Composer::new("https://view.example");
    composer.provisioner_mut().supply(key.clone());
    composer.set_note("idempotent");
    let link = submit_note(gateway.as_ref(), &mut composer).await.expect("note created");
    let id = parse_share_link(&link).expect("link carries the id");

    let FetchOutcome::Found(body) = gateway.fetch_note(id).await.expect("server answers") else {
        panic!("freshly created note should be readable");
    };

    for _ in 0..3 {
        let outcome = gateway.decrypt(&body, &key).await.expect("server answers");
        assert_eq!(outcome, DecryptOutcome::Plaintext("idempotent".to_string()));
    }

    gateway.close().await;
}
