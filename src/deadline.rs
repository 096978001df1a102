/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Per-cycle deadline measurement.
//!
//! [`DeadlineMonitor`] wraps one work invocation with start/end timestamps
//! from the injected [`Clock`], classifies the cycle as on-time or missed,
//! and tracks the consecutive-miss streak the degrade policy consumes.
//!
//! The monitor is measurement-and-react only: it never preempts a running
//! work unit.  A `work` call that never returns is an external fault
//! outside this component's contract.

use std::time::Duration;

use crate::clock::Clock;
use crate::work::WorkOutcome;

/// Timing classification of one cycle.
///
/// The boundary case `elapsed == deadline` is on time — a cycle misses
/// only when it is strictly late.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    OnTime,
    Missed,
}

/// Everything the scheduler needs to know about one measured cycle.
#[derive(Debug, Clone, Copy)]
pub struct CycleReport {
    /// Timing classification, with work failure folded in as a miss.
    pub outcome: CycleOutcome,
    /// Wall-clock duration of the work invocation.
    pub elapsed: Duration,
    /// What the work unit itself reported.
    pub work: WorkOutcome,
}

/// Measures one work cycle against a fixed deadline.
#[derive(Debug)]
pub struct DeadlineMonitor {
    deadline: Duration,
    last_elapsed: Duration,
    miss_streak: u32,
}

impl DeadlineMonitor {
    pub fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            last_elapsed: Duration::ZERO,
            miss_streak: 0,
        }
    }

    /// Run `work` under measurement and record the outcome.
    ///
    /// A [`WorkOutcome::Failed`] result is recorded as a miss regardless
    /// of elapsed time: for degrade purposes a failed cycle and a late
    /// cycle carry the same weight.
    pub fn measure(
        &mut self,
        clock: &dyn Clock,
        work: impl FnOnce() -> WorkOutcome,
    ) -> CycleReport {
        let start = clock.now();
        let result = work();
        // A non-monotonic clock reading clamps to zero elapsed.
        let elapsed = clock
            .now()
            .checked_duration_since(start)
            .unwrap_or_default();

        let outcome = match result {
            WorkOutcome::Failed => CycleOutcome::Missed,
            WorkOutcome::Completed => classify(self.deadline, elapsed),
        };

        match outcome {
            CycleOutcome::Missed => self.miss_streak += 1,
            CycleOutcome::OnTime => self.miss_streak = 0,
        }
        self.last_elapsed = elapsed;

        CycleReport {
            outcome,
            elapsed,
            work: result,
        }
    }

    /// Consecutive misses up to and including the most recent cycle.
    pub fn miss_streak(&self) -> u32 {
        self.miss_streak
    }

    /// Duration of the most recent cycle.
    pub fn last_elapsed(&self) -> Duration {
        self.last_elapsed
    }

    /// Configured deadline.
    pub fn deadline(&self) -> Duration {
        self.deadline
    }
}

/// Pure classification: missed iff strictly over the deadline.
fn classify(deadline: Duration, elapsed: Duration) -> CycleOutcome {
    if elapsed > deadline {
        CycleOutcome::Missed
    } else {
        CycleOutcome::OnTime
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
