//! Time source for the scheduler: real time in production, virtual time
//! in tests and headless runs.

use std::sync::Mutex;
use std::time::{Duration, Instant};

pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Suspend the calling thread for up to `duration`.
    /// Returning early is allowed; callers treat it as a normal wake.
    fn sleep(&self, duration: Duration);
}

/// Monotonic wall clock. Sleeps by parking the thread, so an `unpark`
/// from another thread ends the sleep early.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::park_timeout(duration);
    }
}

/// Virtual clock. Time only moves through `advance` or `sleep`.
#[derive(Debug)]
pub struct ManualClock {
    origin:  Instant,
    elapsed: Mutex<Duration>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin:  Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut elapsed = self.elapsed.lock().unwrap_or_else(|p| p.into_inner());
        *elapsed += by;
    }

    /// Virtual time since construction.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Default for ManualClock {
    fn default() -> Self { Self::new() }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + self.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
    }
}
