//! Production environment backed by the OS clock and entropy.

use std::time::Duration;

use cinder_core::env::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// Monotonic time comes from `std::time::Instant`, note expiry from
/// `SystemTime`, sleeping from tokio, and randomness from getrandom.
///
/// # Panics
///
/// Panics if the OS RNG fails. Note ids, nonces and issued keys all depend on
/// it; there is no safe degraded mode.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = std::time::Instant;

    fn now(&self) -> Self::Instant {
        std::time::Instant::now()
    }

    fn wall_clock_secs(&self) -> u64 {
        // A clock before 1970 reads as the epoch; every note then looks fresh
        // until the clock is corrected.
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map_or(0, |elapsed| elapsed.as_secs())
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("invariant: OS RNG failure is unrecoverable");
    }
}
