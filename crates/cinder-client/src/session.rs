//! Async runners executing state machine actions against a gateway.
//!
//! The runners own no protocol logic. They feed gateway results back into
//! the Sans-IO machines and stop waiting on a remote call as soon as the
//! viewer abandons the session; dropping the pending call cancels it.

use std::{collections::VecDeque, time::Duration};

use cinder_core::NoteId;
use cinder_crypto::Passphrase;
use tokio::sync::watch;

use crate::{
    composer::{Composer, ComposerAction},
    error::ClientError,
    gateway::NoteGateway,
    provisioner::{Provisioner, ProvisionerAction},
    retrieval::{Retrieval, RetrievalAction, RetrievalEvent, RetrievalState},
};

/// Abandons a [`RetrievalSession`] from anywhere, e.g. on navigation away.
#[derive(Debug)]
pub struct AbandonHandle(watch::Sender<bool>);

impl AbandonHandle {
    /// Abandon the session. Any in-flight fetch is cancelled.
    pub fn abandon(&self) {
        self.0.send_replace(true);
    }
}

/// Viewer session bound to one note.
#[derive(Debug)]
pub struct RetrievalSession<G> {
    gateway: G,
    machine: Retrieval,
    pending: Vec<RetrievalAction>,
    abandoned: watch::Receiver<bool>,
}

impl<G: NoteGateway> RetrievalSession<G> {
    /// Prepare a session for `id`. Nothing is sent until [`Self::open`].
    pub fn new(gateway: G, id: NoteId, max_fetch_attempts: u32) -> (Self, AbandonHandle) {
        let (machine, pending) = Retrieval::start(id, max_fetch_attempts);
        let (tx, rx) = watch::channel(false);
        (Self { gateway, machine, pending, abandoned: rx }, AbandonHandle(tx))
    }

    /// Fetch the note. Resolves once the fetch settled or was abandoned.
    pub async fn open(&mut self) -> &RetrievalState {
        let actions = std::mem::take(&mut self.pending);
        self.run(actions).await;
        self.machine.state()
    }

    /// Retry a fetch that failed in transport.
    pub async fn retry_fetch(&mut self) -> &RetrievalState {
        let actions = self.machine.retry_fetch();
        self.run(actions).await;
        self.machine.state()
    }

    /// Try a passphrase against the cached body.
    pub async fn submit_secret(&mut self, passphrase: Passphrase) -> &RetrievalState {
        let actions = self.machine.submit_secret(passphrase);
        self.run(actions).await;
        self.machine.state()
    }

    /// Current visible state.
    pub fn state(&self) -> &RetrievalState {
        self.machine.state()
    }

    /// Underlying state machine.
    pub fn machine(&self) -> &Retrieval {
        &self.machine
    }

    async fn run(&mut self, actions: Vec<RetrievalAction>) {
        let mut queue = VecDeque::from(actions);

        while let Some(action) = queue.pop_front() {
            let follow_up = match action {
                RetrievalAction::FetchNote { id, attempt } => {
                    let event = tokio::select! {
                        biased;
                        () = abandoned(&mut self.abandoned) => RetrievalEvent::Abandon,
                        result = self.gateway.fetch_note(id) => match result {
                            Ok(outcome) => RetrievalEvent::FetchCompleted { attempt, outcome },
                            Err(e) => RetrievalEvent::FetchFailed { attempt, reason: e.to_string() },
                        },
                    };
                    self.machine.handle(event)
                },
                RetrievalAction::Decrypt { body, passphrase, attempt } => {
                    let event = tokio::select! {
                        biased;
                        () = abandoned(&mut self.abandoned) => RetrievalEvent::Abandon,
                        result = self.gateway.decrypt(&body, &passphrase) => match result {
                            Ok(outcome) => RetrievalEvent::DecryptCompleted { attempt, outcome },
                            Err(e) => RetrievalEvent::DecryptFailed { attempt, reason: e.to_string() },
                        },
                    };
                    self.machine.handle(event)
                },
                RetrievalAction::CancelFetch { attempt } => {
                    tracing::debug!(note = ?self.machine.id(), attempt, "fetch cancelled");
                    Vec::new()
                },
                RetrievalAction::Render => {
                    tracing::trace!(state = ?self.machine.state(), "render");
                    Vec::new()
                },
            };
            queue.extend(follow_up);
        }
    }
}

/// Resolves once the session is abandoned. Never resolves if the handle is
/// dropped without abandoning.
async fn abandoned(rx: &mut watch::Receiver<bool>) {
    if rx.wait_for(|abandoned| *abandoned).await.is_err() {
        std::future::pending::<()>().await;
    }
}

/// Executes [`Provisioner`] issuances against a gateway.
#[derive(Debug)]
pub struct ProvisionerSession<G> {
    gateway: G,
    retry_delay: Duration,
    max_attempts: u32,
}

impl<G: NoteGateway> ProvisionerSession<G> {
    /// Default retry delay between failed issuances.
    pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_millis(500);

    /// Default issuance attempts per call.
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

    /// Runner with default retry settings.
    pub fn new(gateway: G) -> Self {
        Self {
            gateway,
            retry_delay: Self::DEFAULT_RETRY_DELAY,
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Override retry settings. An attempt bound of zero is treated as one.
    #[must_use]
    pub fn with_retry(mut self, retry_delay: Duration, max_attempts: u32) -> Self {
        self.retry_delay = retry_delay;
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Make sure `provisioner` holds a passphrase.
    ///
    /// Failed issuances are retried on the same rule (empty means issue) up
    /// to the attempt bound. Returns `None` if all attempts failed.
    pub async fn ensure(&self, provisioner: &mut Provisioner) -> Option<Passphrase> {
        let actions = provisioner.evaluate();
        self.execute(provisioner, actions).await
    }

    /// Discard the held passphrase and obtain a fresh one.
    pub async fn reset(&self, provisioner: &mut Provisioner) -> Option<Passphrase> {
        let actions = provisioner.clear();
        self.execute(provisioner, actions).await
    }

    /// Gateway this runner calls.
    pub fn gateway(&self) -> &G {
        &self.gateway
    }

    /// Execute actions a [`Provisioner`] returned, e.g. from
    /// [`Composer::reset`].
    pub async fn execute(
        &self,
        provisioner: &mut Provisioner,
        mut actions: Vec<ProvisionerAction>,
    ) -> Option<Passphrase> {
        let mut failures = 0;

        while let Some(ProvisionerAction::IssueKey { request_id }) = actions.pop() {
            actions = match self.gateway.issue_key().await {
                Ok(passphrase) => provisioner.issued(request_id, passphrase),
                Err(e) => {
                    let follow_up = provisioner.issue_failed(request_id, &e.to_string());
                    failures += 1;
                    if !follow_up.is_empty() {
                        follow_up
                    } else if failures >= self.max_attempts {
                        break;
                    } else {
                        tokio::time::sleep(self.retry_delay).await;
                        provisioner.evaluate()
                    }
                },
            };
        }

        provisioner.passphrase().cloned()
    }
}

/// Submit the composer's note. Returns the share link.
///
/// # Errors
///
/// - Validation errors from [`Composer::submit`]
/// - `ClientError::Gateway` if the create call failed; the composer moves to
///   its failed state and keeps the input
pub async fn submit_note<G: NoteGateway>(
    gateway: &G,
    composer: &mut Composer,
) -> Result<String, ClientError> {
    let ComposerAction::SubmitNote(request) = composer.submit()?;

    match gateway.create_note(&request).await {
        Ok(id) => {
            tracing::info!(note = ?id, ttl = %request.ttl, "note created");
            Ok(composer.created(id))
        },
        Err(e) => {
            composer.create_failed(&e);
            Err(e.into())
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{
        collections::VecDeque,
        sync::{
            Arc, Mutex,
            atomic::{AtomicU32, Ordering},
        },
    };

    use cinder_core::Ttl;
    use tokio::sync::Notify;

    use super::*;
    use crate::{
        DecryptFailure,
        gateway::{CreateNoteRequest, DecryptOutcome, FetchOutcome, GatewayError},
    };

    const BODY: &[u8] = b"sealed body";
    const PLAINTEXT: &str = "hello";

    fn right_key() -> Passphrase {
        Passphrase::from_bytes([1; 32])
    }

    fn wrong_key() -> Passphrase {
        Passphrase::from_bytes([2; 32])
    }

    /// Scripted gateway counting every call.
    #[derive(Default)]
    struct ScriptedGateway {
        fetch_results: Mutex<VecDeque<Result<FetchOutcome, GatewayError>>>,
        issue_results: Mutex<VecDeque<Result<Passphrase, GatewayError>>>,
        fetches: AtomicU32,
        decrypts: AtomicU32,
        issues: AtomicU32,
    }

    impl ScriptedGateway {
        fn with_fetches(results: Vec<Result<FetchOutcome, GatewayError>>) -> Self {
            Self { fetch_results: Mutex::new(results.into()), ..Self::default() }
        }

        fn with_issues(results: Vec<Result<Passphrase, GatewayError>>) -> Self {
            Self { issue_results: Mutex::new(results.into()), ..Self::default() }
        }
    }

    impl NoteGateway for ScriptedGateway {
        async fn create_note(&self, _request: &CreateNoteRequest) -> Result<NoteId, GatewayError> {
            Ok(NoteId::from_bytes([9; 16]))
        }

        async fn fetch_note(&self, _id: NoteId) -> Result<FetchOutcome, GatewayError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.fetch_results.lock().unwrap().pop_front().unwrap_or(Ok(FetchOutcome::NotFound))
        }

        async fn decrypt(
            &self,
            body: &[u8],
            passphrase: &Passphrase,
        ) -> Result<DecryptOutcome, GatewayError> {
            self.decrypts.fetch_add(1, Ordering::SeqCst);
            if body == BODY && *passphrase == right_key() {
                Ok(DecryptOutcome::Plaintext(PLAINTEXT.to_string()))
            } else {
                Ok(DecryptOutcome::Rejected)
            }
        }

        async fn issue_key(&self) -> Result<Passphrase, GatewayError> {
            self.issues.fetch_add(1, Ordering::SeqCst);
            self.issue_results.lock().unwrap().pop_front().unwrap_or(Ok(right_key()))
        }
    }

    /// Gateway whose fetch never answers.
    #[derive(Default)]
    struct StallingGateway {
        fetch_started: Notify,
    }

    impl NoteGateway for StallingGateway {
        async fn create_note(&self, _request: &CreateNoteRequest) -> Result<NoteId, GatewayError> {
            Err(GatewayError::Timeout)
        }

        async fn fetch_note(&self, _id: NoteId) -> Result<FetchOutcome, GatewayError> {
            self.fetch_started.notify_one();
            std::future::pending().await
        }

        async fn decrypt(
            &self,
            _body: &[u8],
            _passphrase: &Passphrase,
        ) -> Result<DecryptOutcome, GatewayError> {
            Err(GatewayError::Timeout)
        }

        async fn issue_key(&self) -> Result<Passphrase, GatewayError> {
            Err(GatewayError::Timeout)
        }
    }

    fn note() -> NoteId {
        NoteId::from_bytes([4; 16])
    }

    #[tokio::test]
    async fn many_decrypt_attempts_one_fetch() {
        let gateway =
            Arc::new(ScriptedGateway::with_fetches(vec![Ok(FetchOutcome::Found(BODY.to_vec()))]));
        let (mut session, _handle) = RetrievalSession::new(Arc::clone(&gateway), note(), 3);

        assert_eq!(session.open().await, &RetrievalState::AwaitingSecret);

        for _ in 0..3 {
            assert_eq!(session.submit_secret(wrong_key()).await, &RetrievalState::DecryptFailed {
                failure: DecryptFailure::Rejected
            });
        }
        assert_eq!(session.submit_secret(right_key()).await, &RetrievalState::Decrypted {
            plaintext: PLAINTEXT.to_string()
        });

        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 1);
        assert_eq!(gateway.decrypts.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn unknown_note_is_gone() {
        let gateway = Arc::new(ScriptedGateway::with_fetches(vec![Ok(FetchOutcome::NotFound)]));
        let (mut session, _handle) = RetrievalSession::new(Arc::clone(&gateway), note(), 3);

        assert_eq!(session.open().await, &RetrievalState::Gone);
        assert_eq!(session.retry_fetch().await, &RetrievalState::Gone);
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_failure_then_retry_succeeds() {
        let gateway = Arc::new(ScriptedGateway::with_fetches(vec![
            Err(GatewayError::Unreachable("connection refused".to_string())),
            Ok(FetchOutcome::Found(BODY.to_vec())),
        ]));
        let (mut session, _handle) = RetrievalSession::new(Arc::clone(&gateway), note(), 3);

        assert!(matches!(session.open().await, RetrievalState::FetchFailed { attempts: 1, .. }));
        assert_eq!(session.retry_fetch().await, &RetrievalState::AwaitingSecret);
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn abandon_cancels_in_flight_fetch() {
        let gateway = Arc::new(StallingGateway::default());
        let (mut session, handle) = RetrievalSession::new(Arc::clone(&gateway), note(), 3);

        let task = tokio::spawn(async move { session.open().await.clone() });
        gateway.fetch_started.notified().await;
        handle.abandon();

        assert_eq!(task.await.unwrap(), RetrievalState::Abandoned);
    }

    #[tokio::test]
    async fn abandoned_before_open_never_fetches() {
        let gateway = Arc::new(ScriptedGateway::default());
        let (mut session, handle) = RetrievalSession::new(Arc::clone(&gateway), note(), 3);

        handle.abandon();
        assert_eq!(session.open().await, &RetrievalState::Abandoned);
        assert_eq!(gateway.fetches.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn provisioner_retries_failed_issuance() {
        let gateway = ScriptedGateway::with_issues(vec![
            Err(GatewayError::Timeout),
            Err(GatewayError::Unreachable("down".to_string())),
        ]);
        let runner = ProvisionerSession::new(gateway);
        let mut provisioner = Provisioner::new();

        assert_eq!(runner.ensure(&mut provisioner).await, Some(right_key()));
        assert_eq!(runner.gateway().issues.load(Ordering::SeqCst), 3);

        // Already held: no further issuance
        assert_eq!(runner.ensure(&mut provisioner).await, Some(right_key()));
        assert_eq!(runner.gateway().issues.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn provisioner_gives_up_after_bound() {
        let gateway = ScriptedGateway::with_issues(vec![
            Err(GatewayError::Timeout),
            Err(GatewayError::Timeout),
        ]);
        let runner = ProvisionerSession::new(gateway).with_retry(Duration::from_secs(1), 2);
        let mut provisioner = Provisioner::new();

        assert_eq!(runner.ensure(&mut provisioner).await, None);
        assert!(!provisioner.is_pending());
        assert_eq!(runner.reset(&mut provisioner).await, Some(right_key()));
    }

    #[tokio::test]
    async fn submit_note_returns_share_link() {
        let gateway = ScriptedGateway::default();
        let runner = ProvisionerSession::new(gateway);
        let mut composer = Composer::new("https://view.example");

        runner.ensure(composer.provisioner_mut()).await;
        composer.set_note(PLAINTEXT);
        composer.set_ttl(Ttl::ONE_HOUR);

        let link = submit_note(runner.gateway(), &mut composer).await.unwrap();
        assert_eq!(link, format!("https://view.example/notes/{}", NoteId::from_bytes([9; 16])));
    }
}
