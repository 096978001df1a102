/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Metronome – deadline-aware, rate-limited real-time execution loop
//!
//! Module layout:
//!
//! ```text
//! lib.rs
//! ├── config/         – YAML loop configuration
//! ├── bucket          – token-bucket admission control
//! ├── deadline        – per-cycle deadline measurement
//! ├── policy          – Normal / Degraded / SafeStop degrade ladder
//! ├── scheduler/      – the real-time loop itself (+ backoff strategies)
//! ├── rt              – SCHED_FIFO / CPU-affinity platform layer
//! ├── clock           – injectable monotonic / manual clocks
//! └── work            – WorkUnit and PressureProbe collaborator traits
//! ```

pub mod bucket;
pub mod clock;
pub mod config;
pub mod deadline;
pub mod policy;
pub mod rt;
pub mod scheduler;
pub mod work;
