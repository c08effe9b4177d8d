//! Monotonic time sources for the scheduler
//!
//! Time is expressed as a `Duration` since the source was created. The simulation
//! keeps its own clock on top of this; a time source only ever reports real time.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub trait TimeSource {
    /// Monotonic real time since the source was created.
    fn now(&self) -> Duration;
}

/// Wall clock backed by `Instant`.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for SystemClock {
    fn now(&self) -> Duration {
        self.start.elapsed()
    }
}

/// Hand-driven clock. Clones share the same time, so a test can keep one handle
/// and give another to the scheduler.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    micros: Arc<AtomicU64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, now: Duration) {
        self.micros.store(now.as_micros() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, delta: Duration) {
        self.micros
            .fetch_add(delta.as_micros() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualClock {
    fn now(&self) -> Duration {
        Duration::from_micros(self.micros.load(Ordering::SeqCst))
    }
}

/// Rounds `time` down to a whole number of `tick`s.
pub fn floor_to_tick(time: Duration, tick: Duration) -> Duration {
    let tick_us = tick.as_micros().max(1);
    let time_us = time.as_micros();
    Duration::from_micros((time_us - time_us % tick_us) as u64)
}
