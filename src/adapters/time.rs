//! Clock adapters.
//!
//! - [`SystemClock`]: wall-clock pacing for the real instrument, built
//!   on `std::time::Instant` and `std::thread::sleep`.
//! - [`SimClock`]: virtual time for simulations and tests.  `sleep`
//!   advances the clock instantly, so a 20-minute profile runs in
//!   milliseconds.

use std::time::{Duration, Instant};

use crate::app::ports::Clock;

/// Monotonic host clock.
pub struct SystemClock {
    start: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    fn sleep(&mut self, duration: Duration) {
        if !duration.is_zero() {
            std::thread::sleep(duration);
        }
    }
}

/// Virtual clock that only moves when slept on.
#[derive(Debug, Default, Clone)]
pub struct SimClock {
    now: Duration,
    sleeps: u64,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move time forward without counting a sleep.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
    }

    /// Number of `sleep` calls so far.
    pub fn sleeps(&self) -> u64 {
        self.sleeps
    }
}

impl Clock for SimClock {
    fn elapsed(&self) -> Duration {
        self.now
    }

    fn sleep(&mut self, duration: Duration) {
        self.now += duration;
        self.sleeps += 1;
    }
}
