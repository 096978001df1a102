/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Degrade policy: maps deadline-miss streaks and resource pressure to an
//! operating mode.
//!
//! Escalation is immediate — the first cycle that satisfies a trigger
//! condition changes the mode.  Recovery is hysteretic — the policy steps
//! back down one severity level only after `recovery_streak` consecutive
//! qualifying cycles (no misses, all pressure values inside the recovery
//! band).  SafeStop is a reduced-functionality state, not a crash state;
//! the loop keeps running in it indefinitely and can recover out of it.

use tracing::info;

use crate::work::PressureReading;

// ── Mode ──────────────────────────────────────────────────────────────────────

/// Operating mode, ordered by severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub enum Mode {
    /// Full fidelity and rate.
    #[default]
    Normal,
    /// Reduced fidelity/rate to win back timing headroom.
    Degraded,
    /// Minimal safe behaviour only (conservative commands, lowest cost).
    SafeStop,
}

impl Mode {
    /// One severity step down.  `Normal` stays `Normal`.
    fn step_down(self) -> Mode {
        match self {
            Mode::SafeStop => Mode::Degraded,
            Mode::Degraded => Mode::Normal,
            Mode::Normal => Mode::Normal,
        }
    }

    /// Label used in logs.
    pub fn label(self) -> &'static str {
        match self {
            Mode::Normal => "normal",
            Mode::Degraded => "degraded",
            Mode::SafeStop => "safe-stop",
        }
    }
}

// ── DegradePolicy ─────────────────────────────────────────────────────────────

/// Pure-transition state machine over [`Mode`], initial state `Normal`.
#[derive(Debug)]
pub struct DegradePolicy {
    escalate_threshold: u32,
    safe_threshold: u32,
    recovery_streak: u32,
    mode: Mode,
    /// Consecutive qualifying cycles counted towards the next step down.
    recovery_run: u32,
}

impl DegradePolicy {
    /// Invariants `escalate_threshold ≥ 1`, `safe_threshold >
    /// escalate_threshold` and `recovery_streak ≥ 1` are enforced by
    /// config validation before this constructor is reached.
    pub fn new(escalate_threshold: u32, safe_threshold: u32, recovery_streak: u32) -> Self {
        Self {
            escalate_threshold,
            safe_threshold,
            recovery_streak,
            mode: Mode::Normal,
            recovery_run: 0,
        }
    }

    /// Feed one cycle's observations and return the (possibly unchanged)
    /// operating mode.
    ///
    /// Transition rules:
    /// * `miss_streak ≥ safe_threshold` or any pressure value over its
    ///   safe threshold → `SafeStop`, from any mode.
    /// * otherwise `miss_streak ≥ escalate_threshold` or any pressure
    ///   value over its escalate threshold → at least `Degraded`.
    /// * otherwise, a qualifying cycle (`miss_streak == 0`, every pressure
    ///   value below its recover threshold) advances the recovery run;
    ///   after `recovery_streak` of them the mode steps down one level.
    /// * any other cycle resets the recovery run and holds the mode.
    pub fn next_mode(&mut self, miss_streak: u32, pressure: &[PressureReading]) -> Mode {
        let safe_trigger = miss_streak >= self.safe_threshold
            || pressure.iter().any(PressureReading::exceeds_safe);
        let escalate_trigger = miss_streak >= self.escalate_threshold
            || pressure.iter().any(PressureReading::exceeds_escalate);

        let previous = self.mode;

        if safe_trigger {
            self.mode = Mode::SafeStop;
            self.recovery_run = 0;
        } else if escalate_trigger {
            // Escalation never lowers severity.
            self.mode = self.mode.max(Mode::Degraded);
            self.recovery_run = 0;
        } else if miss_streak == 0 && pressure.iter().all(PressureReading::below_recover) {
            self.recovery_run += 1;
            if self.recovery_run >= self.recovery_streak && self.mode != Mode::Normal {
                self.mode = self.mode.step_down();
                self.recovery_run = 0;
            }
        } else {
            // Neither a trigger nor a qualifying cycle: hold.
            self.recovery_run = 0;
        }

        if self.mode != previous {
            info!(
                from = previous.label(),
                to = self.mode.label(),
                miss_streak,
                "operating mode changed"
            );
        }

        self.mode
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
