//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test error handling and
//! recovery. A failure is injected before the wrapped store is touched, so a
//! failed operation never partially applies.

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use cinder_core::NoteId;

use super::{NoteStore, StorageError, StoredNote};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying store but fails operations based on a
/// configured failure rate. The RNG is seeded, so a chaos run is reproducible.
#[derive(Clone)]
pub struct ChaoticStorage<S: NoteStore> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    rng: Arc<Mutex<ChaoticRng>>,
    operation_count: Arc<AtomicUsize>,
    injected_failures: Arc<AtomicUsize>,
}

/// Linear congruential generator; fast and deterministic.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // Numerical Recipes constants
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: NoteStore> ChaoticStorage<S> {
    /// Create a chaotic wrapper with the default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
            injected_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Number of operations that were failed on purpose.
    pub fn injected_failures(&self) -> usize {
        self.injected_failures.load(Ordering::Relaxed)
    }

    fn inject(&self) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        // A poisoned RNG lock means another test thread panicked; stop injecting.
        let roll = self.rng.lock().map(|mut rng| rng.next()).unwrap_or(1.0);
        if roll < self.failure_rate {
            self.injected_failures.fetch_add(1, Ordering::Relaxed);
            return Err(StorageError::Io("chaotic failure injection".to_string()));
        }
        Ok(())
    }
}

impl<S: NoteStore> NoteStore for ChaoticStorage<S> {
    fn put(&self, id: NoteId, note: &StoredNote) -> Result<(), StorageError> {
        self.inject()?;
        self.inner.put(id, note)
    }

    fn take(&self, id: NoteId, now_secs: u64) -> Result<Option<Vec<u8>>, StorageError> {
        self.inject()?;
        self.inner.take(id, now_secs)
    }

    fn purge_expired(&self, now_secs: u64) -> Result<usize, StorageError> {
        self.inject()?;
        self.inner.purge_expired(now_secs)
    }

    fn count(&self) -> Result<usize, StorageError> {
        self.inject()?;
        self.inner.count()
    }
}
