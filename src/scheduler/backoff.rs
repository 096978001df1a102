/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Backoff strategies for cycles rejected by admission control.
//!
//! Rejection must never busy-spin; the loop sleeps a bounded, configurable
//! delay instead.  Strategies are injected so tests can observe the chosen
//! delays without wall-clock sleeps.

use std::time::Duration;

use crate::config::{BackoffConfig, BackoffKind};

/// Delay source consulted on every rejected cycle.
///
/// `reset` is called on every admitted cycle, so a strategy's state spans
/// one contiguous run of rejections.
pub trait BackoffStrategy: Send {
    /// Delay to sleep before the next admission attempt.
    fn next_delay(&mut self) -> Duration;

    /// An admission happened; start over.
    fn reset(&mut self);
}

/// Build the configured strategy.
pub fn from_config(cfg: &BackoffConfig) -> Box<dyn BackoffStrategy> {
    match cfg.kind {
        BackoffKind::Fixed => Box::new(FixedDelay::new(cfg.base)),
        BackoffKind::Exponential => Box::new(ExponentialBackoff::new(cfg.base, cfg.max)),
    }
}

// ── FixedDelay ────────────────────────────────────────────────────────────────

/// Constant delay — typically on the order of one token refill period.
#[derive(Debug, Clone, Copy)]
pub struct FixedDelay {
    delay: Duration,
}

impl FixedDelay {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

impl BackoffStrategy for FixedDelay {
    fn next_delay(&mut self) -> Duration {
        self.delay
    }

    fn reset(&mut self) {}
}

// ── ExponentialBackoff ────────────────────────────────────────────────────────

/// Doubling delay, capped at `max`, restarting at `base` after each
/// admitted cycle.
#[derive(Debug, Clone, Copy)]
pub struct ExponentialBackoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        Self {
            base,
            max,
            current: base,
        }
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = (self.current * 2).min(self.max);
        delay
    }

    fn reset(&mut self) {
        self.current = self.base;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_delay_is_constant() {
        let mut b = FixedDelay::new(Duration::from_millis(5));
        for _ in 0..10 {
            assert_eq!(b.next_delay(), Duration::from_millis(5));
        }
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(5));
    }

    #[test]
    fn exponential_doubles_until_cap() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(8));
        assert_eq!(b.next_delay(), Duration::from_millis(1));
        assert_eq!(b.next_delay(), Duration::from_millis(2));
        assert_eq!(b.next_delay(), Duration::from_millis(4));
        assert_eq!(b.next_delay(), Duration::from_millis(8));
        assert_eq!(b.next_delay(), Duration::from_millis(8), "capped");
    }

    #[test]
    fn exponential_reset_restarts_at_base() {
        let mut b = ExponentialBackoff::new(Duration::from_millis(1), Duration::from_millis(64));
        for _ in 0..5 {
            b.next_delay();
        }
        b.reset();
        assert_eq!(b.next_delay(), Duration::from_millis(1));
    }

    #[test]
    fn from_config_picks_the_requested_strategy() {
        let fixed = from_config(&BackoffConfig {
            kind: BackoffKind::Fixed,
            base: Duration::from_millis(3),
            max: Duration::from_millis(3),
        });
        let mut fixed = fixed;
        assert_eq!(fixed.next_delay(), Duration::from_millis(3));
        assert_eq!(fixed.next_delay(), Duration::from_millis(3));

        let mut exp = from_config(&BackoffConfig {
            kind: BackoffKind::Exponential,
            base: Duration::from_millis(3),
            max: Duration::from_millis(24),
        });
        assert_eq!(exp.next_delay(), Duration::from_millis(3));
        assert_eq!(exp.next_delay(), Duration::from_millis(6));
    }
}
