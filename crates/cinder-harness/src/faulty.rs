//! Gateway wrapper that loses traffic on a seeded schedule.
//!
//! A lost request never reaches the server. A lost response means the server
//! acted (a read may have consumed the note) but the caller only sees a
//! transport failure. Both surface as `GatewayError::Unreachable`.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use cinder_client::{
    CreateNoteRequest, DecryptOutcome, FetchOutcome, GatewayError, NoteGateway, NoteId,
    Passphrase,
};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Loss probabilities, each in `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FaultPlan {
    /// Chance a request is dropped before the server sees it.
    pub drop_request: f64,
    /// Chance a response is dropped after the server handled the request.
    pub drop_response: f64,
}

impl FaultPlan {
    /// No faults.
    pub const NONE: Self = Self { drop_request: 0.0, drop_response: 0.0 };
}

/// [`NoteGateway`] that drops traffic according to a [`FaultPlan`].
#[derive(Debug)]
pub struct FaultyGateway<G> {
    inner: G,
    plan: FaultPlan,
    rng: Mutex<ChaCha8Rng>,
    dropped_requests: AtomicUsize,
    dropped_responses: AtomicUsize,
}

impl<G: NoteGateway> FaultyGateway<G> {
    /// Wrap `inner`.
    ///
    /// # Panics
    ///
    /// Panics if a probability is outside `[0.0, 1.0]`.
    pub fn new(inner: G, plan: FaultPlan, seed: u64) -> Self {
        for rate in [plan.drop_request, plan.drop_response] {
            assert!((0.0..=1.0).contains(&rate), "fault rate must be within [0.0, 1.0], got {rate}");
        }

        Self {
            inner,
            plan,
            rng: Mutex::new(ChaCha8Rng::seed_from_u64(seed)),
            dropped_requests: AtomicUsize::new(0),
            dropped_responses: AtomicUsize::new(0),
        }
    }

    /// Wrapped gateway.
    pub fn inner(&self) -> &G {
        &self.inner
    }

    /// Requests dropped so far.
    pub fn dropped_requests(&self) -> usize {
        self.dropped_requests.load(Ordering::Relaxed)
    }

    /// Responses dropped so far.
    pub fn dropped_responses(&self) -> usize {
        self.dropped_responses.load(Ordering::Relaxed)
    }

    fn roll(&self, rate: f64) -> bool {
        rate > 0.0 && self.rng.lock().unwrap_or_else(PoisonError::into_inner).gen_bool(rate)
    }

    fn before(&self) -> Result<(), GatewayError> {
        if self.roll(self.plan.drop_request) {
            self.dropped_requests.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::Unreachable("request lost".to_string()));
        }
        Ok(())
    }

    fn after<T>(&self, result: Result<T, GatewayError>) -> Result<T, GatewayError> {
        if result.is_ok() && self.roll(self.plan.drop_response) {
            self.dropped_responses.fetch_add(1, Ordering::Relaxed);
            return Err(GatewayError::Unreachable("response lost".to_string()));
        }
        result
    }
}

impl<G: NoteGateway> NoteGateway for FaultyGateway<G> {
    async fn create_note(&self, request: &CreateNoteRequest) -> Result<NoteId, GatewayError> {
        self.before()?;
        let result = self.inner.create_note(request).await;
        self.after(result)
    }

    async fn fetch_note(&self, id: NoteId) -> Result<FetchOutcome, GatewayError> {
        self.before()?;
        let result = self.inner.fetch_note(id).await;
        self.after(result)
    }

    async fn decrypt(
        &self,
        body: &[u8],
        passphrase: &Passphrase,
    ) -> Result<DecryptOutcome, GatewayError> {
        self.before()?;
        let result = self.inner.decrypt(body, passphrase).await;
        self.after(result)
    }

    async fn issue_key(&self) -> Result<Passphrase, GatewayError> {
        self.before()?;
        let result = self.inner.issue_key().await;
        self.after(result)
    }
}
