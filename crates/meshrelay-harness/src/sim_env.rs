//! Deterministic [`Environment`] implementation for tests.
//!
//! Time only moves when a test calls [`SimEnv::advance`] or awaits
//! [`SimEnv::sleep`] (which fast-forwards rather than actually waiting);
//! randomness is drawn from a seeded `ChaCha8Rng` so a failing test's exact
//! packet IDs and nonces are reproducible from the seed alone.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use meshrelay_core::Environment;
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A deterministic, manually-clocked [`Environment`].
///
/// `Self::Instant` is a plain [`Duration`] elapsed since the simulation
/// started, which already satisfies `Copy + Ord + Sub<Output = Duration>`
/// without needing a newtype.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha8Rng>>,
    clock_secs: Arc<AtomicU64>,
}

impl SimEnv {
    /// Build a new environment seeded with `seed`, clock starting at zero.
    #[must_use]
    pub fn with_seed(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha8Rng::seed_from_u64(seed))), clock_secs: Arc::new(AtomicU64::new(0)) }
    }

    /// Move the virtual clock forward by `secs` seconds.
    pub fn advance(&self, secs: u64) {
        self.clock_secs.fetch_add(secs, Ordering::SeqCst);
    }
}

impl Environment for SimEnv {
    type Instant = Duration;

    fn now(&self) -> Self::Instant {
        Duration::from_secs(self.clock_secs.load(Ordering::SeqCst))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        let clock = Arc::clone(&self.clock_secs);
        async move {
            clock.fetch_add(duration.as_secs(), Ordering::SeqCst);
        }
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // INVARIANT: the mutex is never held across an await point in this
        // crate, so this cannot deadlock or block another task.
        #[allow(clippy::expect_used)]
        self.rng.lock().expect("sim RNG mutex poisoned").fill_bytes(buffer);
    }

    fn wall_clock_secs(&self) -> u64 {
        self.clock_secs.load(Ordering::SeqCst)
    }
}
