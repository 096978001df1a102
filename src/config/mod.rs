//! Loop configuration loading and validation.
//!
//! The expected YAML structure is:
//! ```yaml
//! rate:
//!   refill_rate: 50.0        # tokens per second
//!   capacity: 10             # burst tokens
//! deadline_ms: 50
//! degrade:
//!   escalate_threshold: 1
//!   safe_threshold: 3
//!   recovery_streak: 5
//! realtime:
//!   cpu_core: 3
//!   priority: 80
//! backoff:
//!   strategy: "exponential"  # or "fixed"
//!   base_ms: 1
//!   max_ms: 20
//! pressure:
//!   cpu_load:
//!     escalate: 0.85
//!     safe: 0.95
//!     recover: 0.60
//! ```
//!
//! Everything is optional; missing sections fall back to the defaults
//! above (minus the realtime section, which defaults to best-effort).
//! All values are static startup configuration — nothing here is mutated
//! at runtime.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};

use crate::work::PressureThresholds;

// ── Private YAML deserialization types ────────────────────────────────────────

/// Top-level wrapper that maps directly onto the YAML file layout.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    #[serde(default)]
    rate: RateEntry,
    #[serde(default = "default_deadline_ms")]
    deadline_ms: u64,
    #[serde(default)]
    degrade: DegradeEntry,
    #[serde(default)]
    realtime: RealtimeEntry,
    #[serde(default)]
    backoff: BackoffEntry,
    #[serde(default)]
    pressure: BTreeMap<String, PressureEntry>,
}

#[derive(Debug, Deserialize)]
struct RateEntry {
    #[serde(default = "default_refill_rate")]
    refill_rate: f64,
    #[serde(default = "default_capacity")]
    capacity: u32,
}

#[derive(Debug, Deserialize)]
struct DegradeEntry {
    #[serde(default = "default_escalate_threshold")]
    escalate_threshold: u32,
    #[serde(default = "default_safe_threshold")]
    safe_threshold: u32,
    #[serde(default = "default_recovery_streak")]
    recovery_streak: u32,
}

#[derive(Debug, Default, Deserialize)]
struct RealtimeEntry {
    cpu_core: Option<usize>,
    priority: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct BackoffEntry {
    #[serde(default = "default_backoff_strategy")]
    strategy: String,
    #[serde(default = "default_backoff_base_ms")]
    base_ms: u64,
    #[serde(default = "default_backoff_max_ms")]
    max_ms: u64,
}

#[derive(Debug, Deserialize)]
struct PressureEntry {
    escalate: f64,
    safe: f64,
    recover: f64,
}

fn default_refill_rate() -> f64 {
    50.0
}
fn default_capacity() -> u32 {
    10
}
fn default_deadline_ms() -> u64 {
    50
}
fn default_escalate_threshold() -> u32 {
    1
}
fn default_safe_threshold() -> u32 {
    3
}
fn default_recovery_streak() -> u32 {
    5
}
fn default_backoff_strategy() -> String {
    "fixed".to_string()
}
fn default_backoff_base_ms() -> u64 {
    1
}
fn default_backoff_max_ms() -> u64 {
    20
}

impl Default for RateEntry {
    fn default() -> Self {
        Self {
            refill_rate: default_refill_rate(),
            capacity: default_capacity(),
        }
    }
}

impl Default for DegradeEntry {
    fn default() -> Self {
        Self {
            escalate_threshold: default_escalate_threshold(),
            safe_threshold: default_safe_threshold(),
            recovery_streak: default_recovery_streak(),
        }
    }
}

impl Default for BackoffEntry {
    fn default() -> Self {
        Self {
            strategy: default_backoff_strategy(),
            base_ms: default_backoff_base_ms(),
            max_ms: default_backoff_max_ms(),
        }
    }
}

// ── Validation errors ─────────────────────────────────────────────────────────

/// Configuration rejected during validation.
///
/// Every variant carries the offending values so the startup log tells
/// the operator exactly what to fix.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("refill_rate must be finite and ≥ 0, got {0}")]
    InvalidRefillRate(f64),

    #[error("deadline_ms must be ≥ 1")]
    ZeroDeadline,

    #[error("escalate_threshold must be ≥ 1")]
    ZeroEscalateThreshold,

    #[error("safe_threshold ({safe}) must be greater than escalate_threshold ({escalate})")]
    SafeThresholdTooLow { escalate: u32, safe: u32 },

    #[error("recovery_streak must be ≥ 1")]
    ZeroRecoveryStreak,

    #[error("realtime priority {0} outside SCHED_FIFO range 1–99")]
    PriorityOutOfRange(i32),

    #[error("unknown backoff strategy: '{0}' (valid: fixed, exponential)")]
    UnknownBackoffStrategy(String),

    #[error("backoff base_ms must be ≥ 1 and ≤ max_ms ({base_ms} / {max_ms})")]
    InvalidBackoffWindow { base_ms: u64, max_ms: u64 },

    #[error(
        "pressure probe '{name}': thresholds must satisfy recover < escalate ≤ safe \
         (got recover={recover}, escalate={escalate}, safe={safe})"
    )]
    InvalidPressureBand {
        name: String,
        escalate: f64,
        safe: f64,
        recover: f64,
    },
}

// ── Public configuration ──────────────────────────────────────────────────────

/// Rejection backoff strategy selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackoffKind {
    Fixed,
    Exponential,
}

/// Backoff parameters for cycles rejected by admission control.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BackoffConfig {
    pub kind: BackoffKind,
    pub base: Duration,
    pub max: Duration,
}

/// Validated startup configuration for one execution loop.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopConfig {
    /// Token-bucket refill rate, tokens per second.
    pub refill_rate: f64,
    /// Token-bucket burst capacity.
    pub capacity: u32,
    /// Per-cycle deadline.
    pub deadline: Duration,
    /// Consecutive misses before Normal → Degraded.
    pub escalate_threshold: u32,
    /// Consecutive misses before → SafeStop.
    pub safe_threshold: u32,
    /// Qualifying cycles required per recovery step.
    pub recovery_streak: u32,
    /// Isolated CPU core to pin the loop thread to, if any.
    pub cpu_core: Option<usize>,
    /// SCHED_FIFO priority to request, if any.
    pub rt_priority: Option<i32>,
    /// Rejection backoff parameters.
    pub backoff: BackoffConfig,
    /// Per-probe pressure thresholds, keyed by probe name.
    /// `BTreeMap` so iteration (and therefore logging) is deterministic.
    pub pressure: BTreeMap<String, PressureThresholds>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        // Must stay in sync with the serde field defaults above.
        Self {
            refill_rate: default_refill_rate(),
            capacity: default_capacity(),
            deadline: Duration::from_millis(default_deadline_ms()),
            escalate_threshold: default_escalate_threshold(),
            safe_threshold: default_safe_threshold(),
            recovery_streak: default_recovery_streak(),
            cpu_core: None,
            rt_priority: None,
            backoff: BackoffConfig {
                kind: BackoffKind::Fixed,
                base: Duration::from_millis(default_backoff_base_ms()),
                max: Duration::from_millis(default_backoff_max_ms()),
            },
            pressure: BTreeMap::new(),
        }
    }
}

impl LoopConfig {
    /// Parse and validate a YAML configuration file.
    ///
    /// # Errors
    /// Returns an error if the file cannot be opened, the YAML is
    /// structurally invalid, or validation rejects the values.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        info!("Loading loop configuration from: {}", path.display());

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Cannot open configuration file: {}", path.display()))?;

        let file: ConfigFile = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse YAML file: {}", path.display()))?;

        let config = Self::from_file(file)?;

        info!(
            refill_rate = config.refill_rate,
            capacity = config.capacity,
            deadline_ms = config.deadline.as_millis() as u64,
            escalate_threshold = config.escalate_threshold,
            safe_threshold = config.safe_threshold,
            recovery_streak = config.recovery_streak,
            cpu_core = ?config.cpu_core,
            rt_priority = ?config.rt_priority,
            probes = config.pressure.len(),
            "Configuration loaded"
        );

        Ok(config)
    }

    fn from_file(file: ConfigFile) -> Result<Self, ConfigError> {
        let kind = match file.backoff.strategy.as_str() {
            "fixed" => BackoffKind::Fixed,
            "exponential" => BackoffKind::Exponential,
            other => return Err(ConfigError::UnknownBackoffStrategy(other.to_string())),
        };

        let mut pressure = BTreeMap::new();
        for (name, entry) in file.pressure {
            debug!(
                probe = %name,
                escalate = entry.escalate,
                safe = entry.safe,
                recover = entry.recover,
                "pressure thresholds"
            );
            pressure.insert(
                name,
                PressureThresholds {
                    escalate: entry.escalate,
                    safe: entry.safe,
                    recover: entry.recover,
                },
            );
        }

        let config = Self {
            refill_rate: file.rate.refill_rate,
            capacity: file.rate.capacity,
            deadline: Duration::from_millis(file.deadline_ms),
            escalate_threshold: file.degrade.escalate_threshold,
            safe_threshold: file.degrade.safe_threshold,
            recovery_streak: file.degrade.recovery_streak,
            cpu_core: file.realtime.cpu_core,
            rt_priority: file.realtime.priority,
            backoff: BackoffConfig {
                kind,
                base: Duration::from_millis(file.backoff.base_ms),
                max: Duration::from_millis(file.backoff.max_ms),
            },
            pressure,
        };
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants the components rely on.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.refill_rate.is_finite() || self.refill_rate < 0.0 {
            return Err(ConfigError::InvalidRefillRate(self.refill_rate));
        }
        if self.deadline.is_zero() {
            return Err(ConfigError::ZeroDeadline);
        }
        if self.escalate_threshold == 0 {
            return Err(ConfigError::ZeroEscalateThreshold);
        }
        if self.safe_threshold <= self.escalate_threshold {
            return Err(ConfigError::SafeThresholdTooLow {
                escalate: self.escalate_threshold,
                safe: self.safe_threshold,
            });
        }
        if self.recovery_streak == 0 {
            return Err(ConfigError::ZeroRecoveryStreak);
        }
        if let Some(prio) = self.rt_priority {
            if !(1..=99).contains(&prio) {
                return Err(ConfigError::PriorityOutOfRange(prio));
            }
        }
        if self.backoff.base.is_zero() || self.backoff.base > self.backoff.max {
            return Err(ConfigError::InvalidBackoffWindow {
                base_ms: self.backoff.base.as_millis() as u64,
                max_ms: self.backoff.max.as_millis() as u64,
            });
        }
        for (name, t) in &self.pressure {
            if !(t.recover < t.escalate && t.escalate <= t.safe) {
                return Err(ConfigError::InvalidPressureBand {
                    name: name.clone(),
                    escalate: t.escalate,
                    safe: t.safe,
                    recover: t.recover,
                });
            }
        }
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    /// Helper: write a YAML string to a temp file and return it.
    fn yaml_tempfile(content: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(content.as_bytes()).unwrap();
        f
    }

    #[test]
    fn load_full_yaml() {
        let yaml = r#"
rate:
  refill_rate: 25.0
  capacity: 4
deadline_ms: 20
degrade:
  escalate_threshold: 2
  safe_threshold: 6
  recovery_streak: 8
realtime:
  cpu_core: 3
  priority: 80
backoff:
  strategy: "exponential"
  base_ms: 2
  max_ms: 64
pressure:
  cpu_load:
    escalate: 0.85
    safe: 0.95
    recover: 0.60
  net_rtt_ms:
    escalate: 40.0
    safe: 150.0
    recover: 25.0
"#;
        let f = yaml_tempfile(yaml);
        let cfg = LoopConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.refill_rate, 25.0);
        assert_eq!(cfg.capacity, 4);
        assert_eq!(cfg.deadline, Duration::from_millis(20));
        assert_eq!(cfg.escalate_threshold, 2);
        assert_eq!(cfg.safe_threshold, 6);
        assert_eq!(cfg.recovery_streak, 8);
        assert_eq!(cfg.cpu_core, Some(3));
        assert_eq!(cfg.rt_priority, Some(80));
        assert_eq!(cfg.backoff.kind, BackoffKind::Exponential);
        assert_eq!(cfg.backoff.base, Duration::from_millis(2));
        assert_eq!(cfg.backoff.max, Duration::from_millis(64));
        assert_eq!(cfg.pressure.len(), 2);
        assert_eq!(cfg.pressure["cpu_load"].escalate, 0.85);
        assert_eq!(cfg.pressure["net_rtt_ms"].safe, 150.0);
    }

    #[test]
    fn missing_sections_use_defaults() {
        let f = yaml_tempfile("deadline_ms: 10\n");
        let cfg = LoopConfig::load_from_file(f.path()).unwrap();

        assert_eq!(cfg.deadline, Duration::from_millis(10));
        assert_eq!(cfg.refill_rate, 50.0);
        assert_eq!(cfg.capacity, 10);
        assert_eq!(cfg.escalate_threshold, 1);
        assert_eq!(cfg.safe_threshold, 3);
        assert_eq!(cfg.recovery_streak, 5);
        assert_eq!(cfg.cpu_core, None);
        assert_eq!(cfg.rt_priority, None);
        assert_eq!(cfg.backoff.kind, BackoffKind::Fixed);
        assert!(cfg.pressure.is_empty());
    }

    #[test]
    fn default_config_passes_validation() {
        assert_eq!(LoopConfig::default().validate(), Ok(()));
    }

    #[test]
    fn missing_file_returns_error() {
        let result = LoopConfig::load_from_file(Path::new("/nonexistent/metronome.yaml"));
        assert!(result.is_err());
    }

    #[test]
    fn malformed_yaml_returns_error() {
        let f = yaml_tempfile("rate: [not, a, mapping]\n");
        assert!(LoopConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let f = yaml_tempfile("deadlnie_ms: 10\n"); // typo must not pass silently
        assert!(LoopConfig::load_from_file(f.path()).is_err());
    }

    #[test]
    fn zero_deadline_is_rejected() {
        let f = yaml_tempfile("deadline_ms: 0\n");
        let err = LoopConfig::load_from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("deadline_ms"));
    }

    #[test]
    fn safe_threshold_must_exceed_escalate_threshold() {
        let mut cfg = LoopConfig::default();
        cfg.escalate_threshold = 3;
        cfg.safe_threshold = 3;
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::SafeThresholdTooLow {
                escalate: 3,
                safe: 3
            })
        );
    }

    #[test]
    fn escalate_threshold_zero_is_rejected() {
        let mut cfg = LoopConfig::default();
        cfg.escalate_threshold = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::ZeroEscalateThreshold));
    }

    #[test]
    fn negative_refill_rate_is_rejected() {
        let mut cfg = LoopConfig::default();
        cfg.refill_rate = -1.0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidRefillRate(-1.0)));
    }

    #[test]
    fn zero_refill_rate_is_valid_permanent_cutoff() {
        let mut cfg = LoopConfig::default();
        cfg.refill_rate = 0.0;
        assert_eq!(cfg.validate(), Ok(()));
    }

    #[test]
    fn priority_out_of_fifo_range_is_rejected() {
        let mut cfg = LoopConfig::default();
        cfg.rt_priority = Some(120);
        assert_eq!(cfg.validate(), Err(ConfigError::PriorityOutOfRange(120)));
        cfg.rt_priority = Some(0);
        assert_eq!(cfg.validate(), Err(ConfigError::PriorityOutOfRange(0)));
    }

    #[test]
    fn unknown_backoff_strategy_is_rejected() {
        let f = yaml_tempfile("backoff:\n  strategy: \"quadratic\"\n");
        let err = LoopConfig::load_from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("quadratic"));
    }

    #[test]
    fn backoff_base_above_max_is_rejected() {
        let mut cfg = LoopConfig::default();
        cfg.backoff.base = Duration::from_millis(100);
        cfg.backoff.max = Duration::from_millis(10);
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidBackoffWindow { .. })
        ));
    }

    #[test]
    fn pressure_band_with_recover_above_escalate_is_rejected() {
        let yaml = r#"
pressure:
  cpu_load:
    escalate: 0.5
    safe: 0.9
    recover: 0.7
"#;
        let f = yaml_tempfile(yaml);
        let err = LoopConfig::load_from_file(f.path()).unwrap_err();
        assert!(err.to_string().contains("cpu_load"));
    }
}
