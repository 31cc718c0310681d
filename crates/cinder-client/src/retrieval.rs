//! Viewer state machine: fetch once, decrypt many.
//!
//! Reading a note destroys it, so a session issues at most one successful
//! read. The fetched body is cached and every decrypt attempt reuses it.
//! A fetch is only re-issued after a transport failure that delivered no
//! body, and only up to the configured attempt bound.
//!
//! ```text
//!  Fetching ──Found──▶ AwaitingSecret ──secret──▶ Decrypting ──ok──▶ Decrypted
//!     │  ▲                                  ▲         │
//!     │  └─retry── FetchFailed              └─secret─ DecryptFailed
//!     ├─NotFound──▶ Gone
//!     └─failure at bound──▶ Unreachable          (any live state) ──▶ Abandoned
//! ```

use std::{fmt, sync::Arc};

use cinder_core::NoteId;
use cinder_crypto::Passphrase;

use crate::gateway::{DecryptOutcome, FetchOutcome};

/// Why the last decrypt attempt produced no plaintext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecryptFailure {
    /// Wrong passphrase or tampered body.
    Rejected,
    /// The decrypt call never got an answer.
    Transport(String),
}

/// What the viewer sees.
#[derive(Clone, PartialEq, Eq)]
pub enum RetrievalState {
    /// Reading the note from the store.
    Fetching {
        /// Fetch attempt in flight, starting at 1.
        attempt: u32,
    },
    /// The fetch failed in transport before any body arrived. Retryable.
    FetchFailed {
        /// Transport failure description.
        reason: String,
        /// Fetch attempts made so far.
        attempts: u32,
    },
    /// Body is cached; waiting for a passphrase.
    AwaitingSecret,
    /// Decrypting the cached body.
    Decrypting {
        /// Decrypt attempt in flight, starting at 1.
        attempt: u32,
    },
    /// The last decrypt attempt failed; a new passphrase may be submitted.
    DecryptFailed {
        /// What went wrong.
        failure: DecryptFailure,
    },
    /// Terminal. The note text.
    Decrypted {
        /// Recovered note text.
        plaintext: String,
    },
    /// Terminal. The note does not exist, was already read, or expired.
    Gone,
    /// Terminal. Every allowed fetch attempt failed in transport.
    Unreachable {
        /// Last transport failure.
        reason: String,
    },
    /// Terminal. The viewer left.
    Abandoned,
}

impl RetrievalState {
    /// Whether the session is over.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Decrypted { .. } | Self::Gone | Self::Unreachable { .. } | Self::Abandoned
        )
    }

    /// Whether a passphrase may be submitted.
    pub fn accepts_secret(&self) -> bool {
        matches!(self, Self::AwaitingSecret | Self::DecryptFailed { .. })
    }
}

impl fmt::Debug for RetrievalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fetching { attempt } => f.debug_struct("Fetching").field("attempt", attempt).finish(),
            Self::FetchFailed { reason, attempts } => f
                .debug_struct("FetchFailed")
                .field("reason", reason)
                .field("attempts", attempts)
                .finish(),
            Self::AwaitingSecret => f.write_str("AwaitingSecret"),
            Self::Decrypting { attempt } => {
                f.debug_struct("Decrypting").field("attempt", attempt).finish()
            },
            Self::DecryptFailed { failure } => {
                f.debug_struct("DecryptFailed").field("failure", failure).finish()
            },
            Self::Decrypted { plaintext } => f
                .debug_struct("Decrypted")
                .field("plaintext_len", &plaintext.len())
                .finish_non_exhaustive(),
            Self::Gone => f.write_str("Gone"),
            Self::Unreachable { reason } => {
                f.debug_struct("Unreachable").field("reason", reason).finish()
            },
            Self::Abandoned => f.write_str("Abandoned"),
        }
    }
}

/// Inputs to [`Retrieval::handle`].
#[derive(Debug, Clone)]
pub enum RetrievalEvent {
    /// The store answered a fetch.
    FetchCompleted {
        /// Attempt the answer belongs to.
        attempt: u32,
        /// Body or not found.
        outcome: FetchOutcome,
    },
    /// A fetch got no answer.
    FetchFailed {
        /// Attempt that failed.
        attempt: u32,
        /// Transport failure description.
        reason: String,
    },
    /// The viewer entered a passphrase.
    SecretSubmitted(Passphrase),
    /// The decrypt service answered.
    DecryptCompleted {
        /// Attempt the answer belongs to.
        attempt: u32,
        /// Plaintext or rejection.
        outcome: DecryptOutcome,
    },
    /// A decrypt call got no answer.
    DecryptFailed {
        /// Attempt that failed.
        attempt: u32,
        /// Transport failure description.
        reason: String,
    },
    /// The viewer asked to try the fetch again.
    RetryFetch,
    /// The viewer left.
    Abandon,
}

/// Outputs of [`Retrieval::handle`], executed by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetrievalAction {
    /// Issue a destructive read.
    FetchNote {
        /// Note to read.
        id: NoteId,
        /// Attempt number to report back.
        attempt: u32,
    },
    /// Drop the in-flight fetch.
    CancelFetch {
        /// Attempt to cancel.
        attempt: u32,
    },
    /// Decrypt the cached body.
    Decrypt {
        /// Cached body, shared with the session.
        body: Arc<[u8]>,
        /// Passphrase to try.
        passphrase: Passphrase,
        /// Attempt number to report back.
        attempt: u32,
    },
    /// The visible state changed.
    Render,
}

/// Viewer session for one note.
///
/// # Invariants
///
/// - Once a body has been received no further `FetchNote` is emitted.
/// - At most `max_fetch_attempts` fetches are emitted per session.
/// - `Decrypt` is only emitted while a body is cached.
/// - Terminal states emit nothing.
#[derive(Clone)]
pub struct Retrieval {
    id: NoteId,
    state: RetrievalState,
    body: Option<Arc<[u8]>>,
    max_fetch_attempts: u32,
    fetch_requests: u32,
    decrypt_requests: u32,
}

impl Retrieval {
    /// Begin a session for `id`.
    ///
    /// Returns the machine in [`RetrievalState::Fetching`] and the single
    /// fetch to issue. A bound of zero is treated as one.
    pub fn start(id: NoteId, max_fetch_attempts: u32) -> (Self, Vec<RetrievalAction>) {
        let mut machine = Self {
            id,
            state: RetrievalState::Fetching { attempt: 1 },
            body: None,
            max_fetch_attempts: max_fetch_attempts.max(1),
            fetch_requests: 0,
            decrypt_requests: 0,
        };
        let actions = machine.fetch();
        (machine, actions)
    }

    /// Feed one event, returning the actions it triggers.
    ///
    /// Events that do not apply to the current state, including answers for
    /// superseded attempts, are ignored.
    pub fn handle(&mut self, event: RetrievalEvent) -> Vec<RetrievalAction> {
        match event {
            RetrievalEvent::FetchCompleted { attempt, outcome } => {
                self.on_fetch_completed(attempt, outcome)
            },
            RetrievalEvent::FetchFailed { attempt, reason } => self.on_fetch_failed(attempt, reason),
            RetrievalEvent::SecretSubmitted(passphrase) => self.submit_secret(passphrase),
            RetrievalEvent::DecryptCompleted { attempt, outcome } => {
                self.on_decrypt_completed(attempt, outcome)
            },
            RetrievalEvent::DecryptFailed { attempt, reason } => {
                self.on_decrypt_failed(attempt, reason)
            },
            RetrievalEvent::RetryFetch => self.retry_fetch(),
            RetrievalEvent::Abandon => self.abandon(),
        }
    }

    /// Try a passphrase against the cached body.
    pub fn submit_secret(&mut self, passphrase: Passphrase) -> Vec<RetrievalAction> {
        if !self.state.accepts_secret() {
            tracing::debug!(state = ?self.state, "ignoring passphrase");
            return Vec::new();
        }
        let Some(body) = self.body.clone() else {
            return Vec::new();
        };

        self.decrypt_requests += 1;
        let attempt = self.decrypt_requests;
        self.state = RetrievalState::Decrypting { attempt };
        vec![RetrievalAction::Decrypt { body, passphrase, attempt }, RetrievalAction::Render]
    }

    /// Re-issue a fetch that failed in transport.
    ///
    /// Only valid in [`RetrievalState::FetchFailed`], which is only ever
    /// entered while no body has been received.
    pub fn retry_fetch(&mut self) -> Vec<RetrievalAction> {
        let RetrievalState::FetchFailed { .. } = self.state else {
            return Vec::new();
        };
        if self.body.is_some() || self.fetch_requests >= self.max_fetch_attempts {
            return Vec::new();
        }

        self.state = RetrievalState::Fetching { attempt: self.fetch_requests + 1 };
        self.fetch()
    }

    /// End the session. Cancels an in-flight fetch.
    pub fn abandon(&mut self) -> Vec<RetrievalAction> {
        if self.state.is_terminal() {
            return Vec::new();
        }

        let mut actions = Vec::with_capacity(2);
        if let RetrievalState::Fetching { attempt } = self.state {
            actions.push(RetrievalAction::CancelFetch { attempt });
        }
        self.body = None;
        self.state = RetrievalState::Abandoned;
        actions.push(RetrievalAction::Render);
        actions
    }

    fn fetch(&mut self) -> Vec<RetrievalAction> {
        self.fetch_requests += 1;
        vec![
            RetrievalAction::FetchNote { id: self.id, attempt: self.fetch_requests },
            RetrievalAction::Render,
        ]
    }

    fn on_fetch_completed(&mut self, attempt: u32, outcome: FetchOutcome) -> Vec<RetrievalAction> {
        if self.state != (RetrievalState::Fetching { attempt }) {
            return Vec::new();
        }

        self.state = match outcome {
            FetchOutcome::Found(body) => {
                self.body = Some(Arc::from(body));
                RetrievalState::AwaitingSecret
            },
            FetchOutcome::NotFound => RetrievalState::Gone,
        };
        vec![RetrievalAction::Render]
    }

    fn on_fetch_failed(&mut self, attempt: u32, reason: String) -> Vec<RetrievalAction> {
        if self.state != (RetrievalState::Fetching { attempt }) {
            return Vec::new();
        }

        tracing::warn!(note = ?self.id, attempt, %reason, "fetch failed");
        self.state = if self.fetch_requests >= self.max_fetch_attempts {
            RetrievalState::Unreachable { reason }
        } else {
            RetrievalState::FetchFailed { reason, attempts: self.fetch_requests }
        };
        vec![RetrievalAction::Render]
    }

    fn on_decrypt_completed(
        &mut self,
        attempt: u32,
        outcome: DecryptOutcome,
    ) -> Vec<RetrievalAction> {
        if self.state != (RetrievalState::Decrypting { attempt }) {
            return Vec::new();
        }

        self.state = match outcome {
            DecryptOutcome::Plaintext(plaintext) => {
                self.body = None;
                RetrievalState::Decrypted { plaintext }
            },
            DecryptOutcome::Rejected => {
                RetrievalState::DecryptFailed { failure: DecryptFailure::Rejected }
            },
        };
        vec![RetrievalAction::Render]
    }

    fn on_decrypt_failed(&mut self, attempt: u32, reason: String) -> Vec<RetrievalAction> {
        if self.state != (RetrievalState::Decrypting { attempt }) {
            return Vec::new();
        }

        tracing::warn!(note = ?self.id, attempt, %reason, "decrypt call failed");
        self.state =
            RetrievalState::DecryptFailed { failure: DecryptFailure::Transport(reason) };
        vec![RetrievalAction::Render]
    }

    /// Note this session reads.
    pub fn id(&self) -> NoteId {
        self.id
    }

    /// Current visible state.
    pub fn state(&self) -> &RetrievalState {
        &self.state
    }

    /// Fetches emitted so far.
    pub fn fetch_requests(&self) -> u32 {
        self.fetch_requests
    }

    /// Decrypts emitted so far.
    pub fn decrypt_requests(&self) -> u32 {
        self.decrypt_requests
    }

    /// Whether a body is cached.
    pub fn has_body(&self) -> bool {
        self.body.is_some()
    }

    /// Fetch attempts allowed for this session.
    pub fn max_fetch_attempts(&self) -> u32 {
        self.max_fetch_attempts
    }
}

impl fmt::Debug for Retrieval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Retrieval")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("has_body", &self.body.is_some())
            .field("fetch_requests", &self.fetch_requests)
            .field("decrypt_requests", &self.decrypt_requests)
            .finish()
    }
}
