/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! The real-time execution loop.
//!
//! [`RealTimeScheduler`] owns the periodic execution context and
//! orchestrates the three leaf components around a caller-supplied
//! [`WorkUnit`]:
//!
//! ```text
//! wake → TokenBucket::try_consume(now)
//!          │ admitted                       │ rejected
//!          ▼                                ▼
//!        DeadlineMonitor::measure(work)   BackoffStrategy::next_delay
//!          ▼                                ▼
//!        DegradePolicy::next_mode         clock.sleep(delay)
//!          ▼
//!        WorkUnit::apply_mode (on change, before the next cycle)
//! ```
//!
//! # Concurrency model
//! One dedicated thread runs [`run`](RealTimeScheduler::run); every
//! mutable field is owned by that thread.  The only shared state is the
//! cooperative shutdown flag (checked once per cycle) and the status
//! snapshot, which external readers copy out under a short-held mutex —
//! they never block the loop beyond that copy.  At most one work
//! invocation is ever in flight, and an invocation in progress is never
//! interrupted: timeouts are measurement-and-react, not preemption.
//!
//! # Error handling
//! Nothing in the loop body is fatal.  RT setup failure is logged and the
//! loop continues best-effort; deadline misses and work failures are
//! signals consumed by the degrade policy; only the shutdown flag ends
//! the loop.

pub mod backoff;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::bucket::TokenBucket;
use crate::clock::Clock;
use crate::config::LoopConfig;
use crate::deadline::{CycleOutcome, CycleReport, DeadlineMonitor};
use crate::policy::{DegradePolicy, Mode};
use crate::rt::RtCapability;
use crate::work::{PressureProbe, PressureReading, PressureThresholds, WorkOutcome, WorkUnit};

use backoff::BackoffStrategy;

// ── Status snapshot ───────────────────────────────────────────────────────────

/// Copy-out telemetry snapshot of the loop.
///
/// Updated once per cycle by the scheduler thread; read by anyone holding
/// a [`StatusHandle`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LoopStatus {
    pub mode: Mode,
    pub last_elapsed: Duration,
    pub miss_streak: u32,
    /// Total wake-ups, admitted or not.
    pub cycles: u64,
    pub admitted: u64,
    pub rejected: u64,
    pub missed: u64,
    pub work_failures: u64,
}

/// Read-side handle to the loop's status snapshot.
#[derive(Debug, Clone)]
pub struct StatusHandle(Arc<Mutex<LoopStatus>>);

impl StatusHandle {
    /// Copy the current snapshot.
    pub fn snapshot(&self) -> LoopStatus {
        *self.0.lock().expect("status mutex poisoned")
    }
}

/// Cooperative shutdown switch; checked by the loop once per cycle.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn request(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

// ── Pressure wiring ───────────────────────────────────────────────────────────

/// A pressure probe paired with its configured threshold band.
pub struct PressureSource {
    pub probe: Box<dyn PressureProbe>,
    pub thresholds: PressureThresholds,
}

/// What one call to [`RealTimeScheduler::cycle`] did.
#[derive(Debug, Clone, Copy)]
pub enum CycleStep {
    /// Work ran under measurement.
    Executed(CycleReport),
    /// Admission rejected; slept for the contained backoff delay.
    Rejected(Duration),
}

// ── RealTimeScheduler ─────────────────────────────────────────────────────────

/// Deadline-aware, rate-limited execution loop.
///
/// All state is owned; multiple independent schedulers can run side by
/// side (there are no process-wide accumulators).
pub struct RealTimeScheduler<C: Clock> {
    config: LoopConfig,
    clock: C,
    rt: Box<dyn RtCapability>,
    bucket: TokenBucket,
    monitor: DeadlineMonitor,
    policy: DegradePolicy,
    backoff: Box<dyn BackoffStrategy>,
    pressure: Vec<PressureSource>,
    mode: Mode,
    shutdown: Arc<AtomicBool>,
    status: Arc<Mutex<LoopStatus>>,
    counters: LoopStatus,
}

impl<C: Clock> RealTimeScheduler<C> {
    /// Build a loop from validated configuration.
    ///
    /// `pressure` must pair each probe with the threshold band configured
    /// for it; probes without configured thresholds should not be wired.
    pub fn new(
        config: LoopConfig,
        clock: C,
        rt: Box<dyn RtCapability>,
        pressure: Vec<PressureSource>,
    ) -> Self {
        let now = clock.now();
        let bucket = TokenBucket::new(config.capacity, config.refill_rate, now);
        let monitor = DeadlineMonitor::new(config.deadline);
        let policy = DegradePolicy::new(
            config.escalate_threshold,
            config.safe_threshold,
            config.recovery_streak,
        );
        let backoff = backoff::from_config(&config.backoff);

        Self {
            config,
            clock,
            rt,
            bucket,
            monitor,
            policy,
            backoff,
            pressure,
            mode: Mode::Normal,
            shutdown: Arc::new(AtomicBool::new(false)),
            status: Arc::new(Mutex::new(LoopStatus::default())),
            counters: LoopStatus::default(),
        }
    }

    /// Handle for requesting shutdown from another thread.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(Arc::clone(&self.shutdown))
    }

    /// Handle for reading status snapshots from another thread.
    pub fn status_handle(&self) -> StatusHandle {
        StatusHandle(Arc::clone(&self.status))
    }

    /// Current operating mode.
    pub fn mode(&self) -> Mode {
        self.mode
    }

    /// Run until the shutdown flag is set.
    ///
    /// Requests RT priority and CPU affinity once at start; a denial is
    /// logged and the loop continues in best-effort mode.
    pub fn run(&mut self, work: &mut dyn WorkUnit) {
        self.setup_realtime();
        info!(
            capacity = self.config.capacity,
            refill_rate = self.config.refill_rate,
            deadline_us = self.config.deadline.as_micros() as u64,
            "execution loop started"
        );

        while !self.shutdown.load(Ordering::Relaxed) {
            self.cycle(work);
        }

        info!(
            cycles = self.counters.cycles,
            admitted = self.counters.admitted,
            missed = self.counters.missed,
            "execution loop stopped on shutdown request"
        );
    }

    /// One loop iteration: admission, measured execution, degrade
    /// decision, status publication.  Public so tests (and embedders with
    /// their own outer loop) can drive the scheduler step by step.
    pub fn cycle(&mut self, work: &mut dyn WorkUnit) -> CycleStep {
        self.counters.cycles += 1;
        let now = self.clock.now();

        if !self.bucket.try_consume(now) {
            let delay = self.backoff.next_delay();
            debug!(delay_us = delay.as_micros() as u64, "admission rejected, backing off");
            self.counters.rejected += 1;
            self.publish_status();
            self.clock.sleep(delay);
            return CycleStep::Rejected(delay);
        }

        self.backoff.reset();
        self.counters.admitted += 1;

        let mode = self.mode;
        let report = self.monitor.measure(&self.clock, || work.run(mode));

        if report.outcome == CycleOutcome::Missed {
            self.counters.missed += 1;
            warn!(
                elapsed_us = report.elapsed.as_micros() as u64,
                deadline_us = self.config.deadline.as_micros() as u64,
                miss_streak = self.monitor.miss_streak(),
                work_failed = report.work == WorkOutcome::Failed,
                "cycle missed its deadline"
            );
        }
        if report.work == WorkOutcome::Failed {
            self.counters.work_failures += 1;
        }

        let readings = self.sample_pressure();
        let new_mode = self.policy.next_mode(self.monitor.miss_streak(), &readings);
        if new_mode != self.mode {
            // Must be visible to the work unit before its next run.
            work.apply_mode(new_mode);
            self.mode = new_mode;
        }

        self.publish_status();
        CycleStep::Executed(report)
    }

    fn setup_realtime(&self) {
        match self.config.rt_priority {
            Some(prio) => match self.rt.set_fifo_priority(prio) {
                Ok(()) => info!(priority = prio, "SCHED_FIFO priority acquired"),
                Err(e) => warn!(
                    priority = prio,
                    error = %e,
                    "could not acquire real-time priority — continuing best-effort"
                ),
            },
            None => info!("no real-time priority configured, running best-effort"),
        }

        match self.config.cpu_core {
            Some(core) => match self.rt.pin_to_cpu(core) {
                Ok(()) => info!(core, "pinned to isolated CPU core"),
                Err(e) => warn!(
                    core,
                    error = %e,
                    "could not pin to CPU core — continuing unpinned"
                ),
            },
            None => debug!("no CPU core configured, leaving affinity unset"),
        }
    }

    /// Sample every wired probe once.  Probes are read-only collaborators;
    /// a probe wanting to signal trouble does so through its value.
    fn sample_pressure(&self) -> Vec<PressureReading> {
        self.pressure
            .iter()
            .map(|src| PressureReading {
                value: src.probe.current_value(),
                thresholds: src.thresholds,
            })
            .collect()
    }

    fn publish_status(&mut self) {
        self.counters.mode = self.mode;
        self.counters.last_elapsed = self.monitor.last_elapsed();
        self.counters.miss_streak = self.monitor.miss_streak();
        // Short-held lock: a plain struct copy, nothing else.
        *self.status.lock().expect("status mutex poisoned") = self.counters;
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
