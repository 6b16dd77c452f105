//! Monotonic per-state stopwatch.

use std::time::{Duration, Instant};

/// Measures how long the owning state has been active.
///
/// A `Timer` is a plain value over [`Instant`]; states reset theirs on
/// every entry, and guards or callbacks read the elapsed time to drive
/// time-based transitions.
///
/// # Example
///
/// ```rust
/// use stateflow::Timer;
/// use std::time::Duration;
///
/// let timer = Timer::start();
/// assert!(timer.elapsed() < Duration::from_secs(1));
/// ```
#[derive(Clone, Copy, Debug)]
pub struct Timer {
    started: Instant,
}

impl Timer {
    /// Start a new timer at the current instant.
    pub fn start() -> Self {
        Self {
            started: Instant::now(),
        }
    }

    /// Restart the measurement from the current instant.
    pub fn reset(&mut self) {
        self.started = Instant::now();
    }

    /// Time elapsed since the last reset.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Elapsed time in seconds, convenient for frame-rate style guards.
    pub fn elapsed_secs(&self) -> f32 {
        self.elapsed().as_secs_f32()
    }

    /// Exclude `delta` from the measurement by shifting the start point
    /// forward. Hosts call this while the simulation is paused so paused
    /// frames do not count toward the elapsed time. A delta too large to
    /// represent leaves the measurement unchanged.
    pub fn pause(&mut self, delta: Duration) {
        if let Some(shifted) = self.started.checked_add(delta) {
            self.started = shifted;
        }
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::start()
    }
}
