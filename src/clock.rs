//! Injectable time sources.
//!
//! Every component that reads or waits on time does so through the
//! [`Clock`] trait, so the whole loop can be driven deterministically in
//! tests with a [`ManualClock`] instead of wall-clock sleeps.

use std::sync::Mutex;
use std::time::{Duration, Instant};

/// A monotonic time source plus a way to wait on it.
///
/// `sleep` belongs on the same trait because a virtual clock must be able
/// to satisfy a sleep request by advancing its own notion of "now" rather
/// than blocking the calling thread.
pub trait Clock {
    /// Current monotonic timestamp.
    fn now(&self) -> Instant;

    /// Block (or virtually advance) for `d`.
    fn sleep(&self, d: Duration);
}

/// A shared clock is still a clock; lets several components observe one
/// `ManualClock` in tests.
impl<C: Clock + ?Sized> Clock for std::sync::Arc<C> {
    fn now(&self) -> Instant {
        (**self).now()
    }

    fn sleep(&self, d: Duration) {
        (**self).sleep(d)
    }
}

// ── MonotonicClock ────────────────────────────────────────────────────────────

/// Production clock: `Instant::now()` (CLOCK_MONOTONIC on Linux) and a
/// real `thread::sleep`.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, d: Duration) {
        std::thread::sleep(d);
    }
}

// ── ManualClock ───────────────────────────────────────────────────────────────

/// Hand-advanced clock for tests and simulations.
///
/// `sleep` advances the clock instead of blocking, so a scheduler driven
/// by a `ManualClock` runs its backoff path at full speed.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Instant>,
}

impl ManualClock {
    /// Start the clock at an arbitrary epoch.
    pub fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
        }
    }

    /// Move the clock forward by `d`.
    pub fn advance(&self, d: Duration) {
        let mut now = self.now.lock().expect("manual clock poisoned");
        *now += d;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock().expect("manual clock poisoned")
    }

    fn sleep(&self, d: Duration) {
        self.advance(d);
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_advances_on_demand() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_millis(250));
        assert_eq!(clock.now() - t0, Duration::from_millis(250));
    }

    #[test]
    fn manual_clock_sleep_advances_instead_of_blocking() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        let wall0 = Instant::now();
        clock.sleep(Duration::from_secs(3600));
        assert_eq!(clock.now() - t0, Duration::from_secs(3600));
        assert!(
            Instant::now() - wall0 < Duration::from_secs(1),
            "sleep must not block the thread"
        );
    }

    #[test]
    fn monotonic_clock_never_goes_backwards() {
        let clock = MonotonicClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
