//! Time source for the reader loop.
//!
//! The loop never reads the wall clock or sleeps directly; it goes through a
//! [`Clock`] so tests can drive idle timeouts without real waiting.

use std::time::{Duration, Instant};

use parking_lot::Mutex;

pub trait Clock {
    fn now(&self) -> Instant;

    /// Cooperative wait between input polls.
    fn sleep(&self, duration: Duration);
}

/// Monotonic OS clock with real sleeps.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Clock that only moves when slept on or advanced by hand.
#[derive(Debug)]
pub struct ManualClock {
    origin: Instant,
    elapsed: Mutex<Duration>,
    sleeps: Mutex<usize>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            elapsed: Mutex::new(Duration::ZERO),
            sleeps: Mutex::new(0),
        }
    }

    pub fn advance(&self, duration: Duration) {
        *self.elapsed.lock() += duration;
    }

    /// Time elapsed since construction.
    pub fn elapsed(&self) -> Duration {
        *self.elapsed.lock()
    }

    /// Number of `sleep` calls so far.
    pub fn sleeps(&self) -> usize {
        *self.sleeps.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        self.origin + *self.elapsed.lock()
    }

    fn sleep(&self, duration: Duration) {
        *self.sleeps.lock() += 1;
        self.advance(duration);
    }
}
