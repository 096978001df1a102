/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::{Duration, Instant};

use clap::Parser;
use tracing::{info, warn};

use metronome::clock::MonotonicClock;
use metronome::config::LoopConfig;
use metronome::policy::Mode;
use metronome::rt::OsRt;
use metronome::scheduler::{PressureSource, RealTimeScheduler};
use metronome::work::{PressureProbe, WorkOutcome, WorkUnit};

// ── CLI argument definition ───────────────────────────────────────────────────

/// Metronome execution loop (demo binary).
///
/// Example:
///   metronome --config demos/metronome.yaml --duration-secs 30
#[derive(Debug, Parser)]
#[command(
    name = "metronome",
    about = "Deadline-aware, rate-limited real-time execution loop",
    long_about = None,
)]
struct Cli {
    /// Path to the YAML loop configuration file.
    #[arg(short = 'c', long = "config")]
    config: Option<PathBuf>,

    /// Override the CPU core to pin the loop thread to.
    #[arg(long = "core")]
    core: Option<usize>,

    /// Override the SCHED_FIFO priority to request (1–99).
    #[arg(long = "priority")]
    priority: Option<i32>,

    /// Stop after this many seconds (0 = run until killed).
    #[arg(long = "duration-secs", default_value_t = 0)]
    duration_secs: u64,
}

// ── Demo work unit ────────────────────────────────────────────────────────────

/// Stand-in for an inference call: burns a per-mode amount of time so the
/// degrade ladder is visible end to end.  Replace with a real model /
/// sensor / actuation wrapper in production.
struct SimulatedInference {
    cost: Duration,
}

impl SimulatedInference {
    fn new() -> Self {
        Self {
            cost: Self::cost_for(Mode::Normal),
        }
    }

    fn cost_for(mode: Mode) -> Duration {
        match mode {
            Mode::Normal => Duration::from_millis(8),
            Mode::Degraded => Duration::from_millis(3),
            Mode::SafeStop => Duration::from_millis(1),
        }
    }
}

impl WorkUnit for SimulatedInference {
    fn run(&mut self, _mode: Mode) -> WorkOutcome {
        thread::sleep(self.cost);
        WorkOutcome::Completed
    }

    fn apply_mode(&mut self, mode: Mode) {
        self.cost = Self::cost_for(mode);
        info!(
            mode = mode.label(),
            cost_ms = self.cost.as_millis() as u64,
            "work unit reconfigured"
        );
    }
}

// ── Demo pressure probe ───────────────────────────────────────────────────────

/// One-minute load average read from /proc/loadavg (0.0 off Linux).
struct CpuLoadProbe;

impl PressureProbe for CpuLoadProbe {
    fn name(&self) -> &str {
        "cpu_load"
    }

    fn current_value(&self) -> f64 {
        #[cfg(target_os = "linux")]
        {
            if let Ok(content) = std::fs::read_to_string("/proc/loadavg") {
                if let Some(first) = content.split_whitespace().next() {
                    if let Ok(load) = first.parse::<f64>() {
                        return load;
                    }
                }
            }
        }
        0.0
    }
}

/// Wire the probes this binary knows about to their configured bands.
fn build_pressure_sources(config: &LoopConfig) -> Vec<PressureSource> {
    let mut sources = Vec::new();
    for (name, thresholds) in &config.pressure {
        match name.as_str() {
            "cpu_load" => sources.push(PressureSource {
                probe: Box::new(CpuLoadProbe),
                thresholds: *thresholds,
            }),
            other => warn!(
                probe = other,
                "no probe implementation for configured thresholds — ignoring"
            ),
        }
    }
    sources
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() {
    // Initialise structured logging.
    // Level is controlled by the RUST_LOG env-var (e.g. RUST_LOG=debug).
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!("Metronome starting up...");

    let cli = Cli::parse();

    // ── Load loop configuration ───────────────────────────────────────────────
    let mut config = match &cli.config {
        Some(path) => match LoopConfig::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                tracing::error!("Failed to load configuration: {:#}", e);
                process::exit(1);
            }
        },
        None => {
            warn!("No configuration file provided, using default loop settings");
            LoopConfig::default()
        }
    };

    // CLI overrides win over the file.
    if cli.core.is_some() {
        config.cpu_core = cli.core;
    }
    if cli.priority.is_some() {
        config.rt_priority = cli.priority;
    }
    if let Err(e) = config.validate() {
        tracing::error!("Invalid configuration: {e}");
        process::exit(1);
    }

    info!(
        refill_rate = config.refill_rate,
        capacity = config.capacity,
        deadline_ms = config.deadline.as_millis() as u64,
        cpu_core = ?config.cpu_core,
        rt_priority = ?config.rt_priority,
        duration_secs = cli.duration_secs,
        "Configuration"
    );

    // ── Build and run the loop ────────────────────────────────────────────────
    let pressure = build_pressure_sources(&config);
    let mut scheduler =
        RealTimeScheduler::new(config, MonotonicClock, Box::new(OsRt), pressure);

    let shutdown = scheduler.shutdown_handle();
    let status = scheduler.status_handle();
    let duration = Duration::from_secs(cli.duration_secs);

    // Telemetry / watchdog thread: reports once a second and requests
    // shutdown when the demo duration elapses (duration 0 = run forever).
    let reporter = thread::spawn(move || {
        let started = Instant::now();
        loop {
            thread::sleep(Duration::from_secs(1));
            let snap = status.snapshot();
            info!(
                mode = snap.mode.label(),
                cycles = snap.cycles,
                admitted = snap.admitted,
                rejected = snap.rejected,
                missed = snap.missed,
                miss_streak = snap.miss_streak,
                last_elapsed_us = snap.last_elapsed.as_micros() as u64,
                "loop status"
            );
            if !duration.is_zero() && started.elapsed() >= duration {
                info!("demo duration elapsed, requesting shutdown");
                shutdown.request();
                return;
            }
        }
    });

    let mut work = SimulatedInference::new();
    scheduler.run(&mut work);

    // The reporter only returns after it has requested shutdown itself.
    if let Err(e) = reporter.join() {
        warn!("telemetry thread panicked: {e:?}");
    }

    info!("Metronome stopped");
}
