/*
SPDX-FileCopyrightText: Copyright 2026 LG Electronics Inc.
SPDX-License-Identifier: MIT
*/

//! Real-time platform layer: fixed-priority scheduling and CPU pinning.
//!
//! The scheduler requests these through the [`RtCapability`] trait so the
//! loop logic stays portable: [`OsRt`] issues the real `SCHED_FIFO` /
//! affinity syscalls on Linux, [`NoopRt`] grants everything for tests and
//! non-privileged environments.  Setup failure is never fatal — the loop
//! runs best-effort; only its timeliness depends on the scheduling class,
//! not its correctness.

use thiserror::Error;

/// Failure of one RT setup request.
#[derive(Debug, Error)]
pub enum RtError {
    #[error("SCHED_FIFO setup failed: {0} (try running as root)")]
    SchedFifo(String),

    #[error("CPU pinning failed: {0}")]
    CpuPinning(String),

    #[error("real-time features not supported on this platform")]
    Unsupported,
}

/// Capability interface for environment-dependent RT setup calls.
///
/// Both methods act on the calling thread and are invoked once, from the
/// scheduler thread, before the first cycle.
pub trait RtCapability {
    /// Request `SCHED_FIFO` with the given priority (clamped to 1–99).
    fn set_fifo_priority(&self, priority: i32) -> Result<(), RtError>;

    /// Pin the calling thread to one CPU core.
    fn pin_to_cpu(&self, core_id: usize) -> Result<(), RtError>;
}

// ── OsRt ──────────────────────────────────────────────────────────────────────

/// Production implementation backed by the OS scheduler.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRt;

#[cfg(target_os = "linux")]
impl RtCapability for OsRt {
    fn set_fifo_priority(&self, priority: i32) -> Result<(), RtError> {
        // Valid SCHED_FIFO priorities are 1–99.
        let param = libc::sched_param {
            sched_priority: priority.clamp(1, 99),
        };
        let rc = unsafe { libc::sched_setscheduler(0, libc::SCHED_FIFO, &param) };
        if rc != 0 {
            return Err(RtError::SchedFifo(
                std::io::Error::last_os_error().to_string(),
            ));
        }
        Ok(())
    }

    fn pin_to_cpu(&self, core_id: usize) -> Result<(), RtError> {
        let max_cpus = 8 * std::mem::size_of::<libc::cpu_set_t>();
        if core_id >= max_cpus {
            return Err(RtError::CpuPinning(format!(
                "core index {core_id} out of range (max {max_cpus})"
            )));
        }
        unsafe {
            let mut set: libc::cpu_set_t = std::mem::zeroed();
            libc::CPU_SET(core_id, &mut set);
            let rc = libc::pthread_setaffinity_np(
                libc::pthread_self(),
                std::mem::size_of::<libc::cpu_set_t>(),
                &set,
            );
            if rc != 0 {
                return Err(RtError::CpuPinning(
                    std::io::Error::from_raw_os_error(rc).to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(not(target_os = "linux"))]
impl RtCapability for OsRt {
    fn set_fifo_priority(&self, _priority: i32) -> Result<(), RtError> {
        Err(RtError::Unsupported)
    }

    fn pin_to_cpu(&self, _core_id: usize) -> Result<(), RtError> {
        Err(RtError::Unsupported)
    }
}

// ── NoopRt ────────────────────────────────────────────────────────────────────

/// Grants every request without touching the OS.
///
/// Used in tests and wherever the loop should run best-effort by
/// construction (CI, developer machines without CAP_SYS_NICE).
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRt;

impl RtCapability for NoopRt {
    fn set_fifo_priority(&self, _priority: i32) -> Result<(), RtError> {
        Ok(())
    }

    fn pin_to_cpu(&self, _core_id: usize) -> Result<(), RtError> {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn noop_rt_grants_everything() {
        let rt = NoopRt;
        assert!(rt.set_fifo_priority(80).is_ok());
        assert!(rt.pin_to_cpu(3).is_ok());
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn os_rt_rejects_out_of_range_core() {
        let rt = OsRt;
        let err = rt.pin_to_cpu(100_000).unwrap_err();
        assert!(matches!(err, RtError::CpuPinning(_)));
    }

    #[test]
    #[cfg(target_os = "linux")]
    fn os_rt_fifo_request_either_succeeds_or_reports_os_error() {
        // Without CAP_SYS_NICE this fails with EPERM; with it, it succeeds.
        // Either way the call must return a usable result, never panic.
        match OsRt.set_fifo_priority(10) {
            Ok(()) => {}
            Err(RtError::SchedFifo(msg)) => assert!(!msg.is_empty()),
            Err(other) => panic!("unexpected error variant: {other}"),
        }
    }
}
