/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Collaborator traits: the work unit the loop drives and the read-only
//! pressure probes the degrade policy consumes.
//!
//! Both sit at the boundary of this crate — inference, sensor reads,
//! actuation, CPU/network/battery sampling all live behind these traits.

use crate::policy::Mode;

// ── Work unit ─────────────────────────────────────────────────────────────────

/// Result of one work-unit invocation.
///
/// `Failed` does not stop the loop; the scheduler treats it as a
/// miss-equivalent signal for degrade purposes.  Any within-cycle fallback
/// is the work unit's own responsibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkOutcome {
    Completed,
    Failed,
}

/// The expensive periodic operation the loop rate-limits and measures.
///
/// Owned by the caller, borrowed by the scheduler. `run` is synchronous
/// and blocking — the loop never overlaps invocations, and it does not
/// preempt one in progress, so implementations must bound their own
/// worst-case duration.
pub trait WorkUnit {
    /// Execute one cycle under the given operating mode.
    fn run(&mut self, mode: Mode) -> WorkOutcome;

    /// Called once whenever the degrade policy changes mode, before the
    /// next `run`.  Implementations adjust their own tunables here
    /// (resolution, frame rate, model size — opaque to the loop).
    fn apply_mode(&mut self, mode: Mode) {
        let _ = mode;
    }
}

// ── Pressure probes ───────────────────────────────────────────────────────────

/// Read-only resource-pressure probe (CPU load, network RTT, battery…),
/// sampled once per cycle.
pub trait PressureProbe {
    /// Stable name used in logs and threshold lookups.
    fn name(&self) -> &str;

    /// Current pressure value, in whatever unit the paired thresholds use.
    fn current_value(&self) -> f64;
}

/// Escalate / safe / recover threshold triple for one probe.
///
/// Invariant (enforced by config validation): `recover < escalate ≤ safe`
/// — the recovery band sits strictly below the escalation band so the
/// mode ladder cannot oscillate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PressureThresholds {
    /// Above this the policy escalates Normal → Degraded.
    pub escalate: f64,
    /// Above this the policy escalates to SafeStop.
    pub safe: f64,
    /// Recovery cycles only count while the value is below this.
    pub recover: f64,
}

/// One per-cycle sample: probe value paired with its thresholds.
#[derive(Debug, Clone, Copy)]
pub struct PressureReading {
    pub value: f64,
    pub thresholds: PressureThresholds,
}

impl PressureReading {
    pub fn exceeds_escalate(&self) -> bool {
        self.value > self.thresholds.escalate
    }

    pub fn exceeds_safe(&self) -> bool {
        self.value > self.thresholds.safe
    }

    pub fn below_recover(&self) -> bool {
        self.value < self.thresholds.recover
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
