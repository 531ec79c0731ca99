//! Monotonic millisecond clocks.
use crate::constants::Millis;
use crossbeam::atomic::AtomicCell;
use std::sync::Arc;
use std::time::Instant;

/// Source of the current time.
pub trait Clock {
    /// Milliseconds since the clock was started.
    fn now(&self) -> Millis;
}

/// Clock backed by `Instant`, started when it is created.
#[derive(Clone, Copy, Debug)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    /// Starts a new clock.
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Millis {
        self.start.elapsed().as_millis() as Millis
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same time, so one handle can be given to a controller
/// while another one drives it.
#[derive(Clone, Default)]
pub struct ManualClock(Arc<AtomicCell<Millis>>);

impl ManualClock {
    /// Creates a clock showing `now`.
    pub fn new(now: Millis) -> Self {
        Self(Arc::new(AtomicCell::new(now)))
    }

    /// Sets the time.
    pub fn set(&self, now: Millis) {
        self.0.store(now);
    }

    /// Moves the time forward.
    pub fn advance(&self, by: Millis) {
        self.0.fetch_add(by);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Millis {
        self.0.load()
    }
}
