use std::path::PathBuf;

use chrono::{Duration, NaiveTime};
use thiserror::Error;

use crate::enrollment::LivenessPolicy;
use crate::gate::OperatorGate;
use crate::policy::DecisionPolicy;
use crate::resolver::ResolverRules;
use crate::types::ShiftWindow;

#[derive(Error, Debug, PartialEq)]
pub enum ConfigError {
    #[error("{name} must be a finite, non-negative number (got {value})")]
    InvalidThreshold { name: &'static str, value: f32 },
    #[error("confident distance {confident} exceeds suspicious distance {suspicious}")]
    ThresholdOrder { confident: f32, suspicious: f32 },
}

/// Runtime configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database file.
    pub db_path: PathBuf,
    /// Directory for frames captured with suspicious matches.
    pub evidence_dir: PathBuf,
    /// Largest Euclidean distance accepted as a confident match.
    pub confident_max_distance: f32,
    /// Largest distance still recorded as a suspicious case.
    pub suspicious_max_distance: f32,
    /// Minimum movement between the two enrollment captures.
    pub min_enrollment_movement: f32,
    /// Optional runner-up margin that demotes confident matches.
    pub ambiguity_margin: Option<f32>,
    /// Minimum seconds between two accepted events for one identity.
    pub cooldown_secs: u64,
    /// Window used for timesheets when an identity has no shift.
    pub default_shift: ShiftWindow,
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = default_data_dir();
        Self {
            db_path: data_dir.join("attendance.db"),
            evidence_dir: data_dir.join("evidence"),
            confident_max_distance: 0.5,
            suspicious_max_distance: 0.6,
            min_enrollment_movement: 0.08,
            ambiguity_margin: None,
            cooldown_secs: 300,
            default_shift: default_shift(),
        }
    }
}

impl Config {
    /// Load configuration from `ATTENDO_*` environment variables with defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let db_path = std::env::var("ATTENDO_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);
        let evidence_dir = std::env::var("ATTENDO_EVIDENCE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.evidence_dir);

        let default_shift = match std::env::var("ATTENDO_DEFAULT_SHIFT") {
            Ok(raw) => raw.parse().unwrap_or_else(|e| {
                tracing::warn!(error = %e, "ignoring ATTENDO_DEFAULT_SHIFT");
                defaults.default_shift
            }),
            Err(_) => defaults.default_shift,
        };

        Self {
            db_path,
            evidence_dir,
            confident_max_distance: env_f32(
                "ATTENDO_CONFIDENT_MAX_DISTANCE",
                defaults.confident_max_distance,
            ),
            suspicious_max_distance: env_f32(
                "ATTENDO_SUSPICIOUS_MAX_DISTANCE",
                defaults.suspicious_max_distance,
            ),
            min_enrollment_movement: env_f32(
                "ATTENDO_MIN_ENROLLMENT_MOVEMENT",
                defaults.min_enrollment_movement,
            ),
            ambiguity_margin: std::env::var("ATTENDO_AMBIGUITY_MARGIN")
                .ok()
                .and_then(|v| v.parse().ok()),
            cooldown_secs: env_u64("ATTENDO_COOLDOWN_SECS", defaults.cooldown_secs),
            default_shift,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let thresholds = [
            ("confident_max_distance", Some(self.confident_max_distance)),
            ("suspicious_max_distance", Some(self.suspicious_max_distance)),
            ("min_enrollment_movement", Some(self.min_enrollment_movement)),
            ("ambiguity_margin", self.ambiguity_margin),
        ];
        for (name, value) in thresholds {
            if let Some(value) = value {
                if !value.is_finite() || value < 0.0 {
                    return Err(ConfigError::InvalidThreshold { name, value });
                }
            }
        }
        if self.confident_max_distance > self.suspicious_max_distance {
            return Err(ConfigError::ThresholdOrder {
                confident: self.confident_max_distance,
                suspicious: self.suspicious_max_distance,
            });
        }
        Ok(())
    }

    pub fn policy(&self) -> DecisionPolicy {
        DecisionPolicy {
            confident_max_distance: self.confident_max_distance,
            suspicious_max_distance: self.suspicious_max_distance,
            ambiguity_margin: self.ambiguity_margin,
        }
    }

    pub fn rules(&self) -> ResolverRules {
        ResolverRules {
            cooldown: Duration::seconds(
                i64::try_from(self.cooldown_secs)
                    .unwrap_or(i64::MAX)
                    .min(i64::MAX / 1000),
            ),
        }
    }

    pub fn liveness(&self) -> LivenessPolicy {
        LivenessPolicy {
            min_movement: self.min_enrollment_movement,
        }
    }

    /// Operators must clear the same bar as a confident kiosk match.
    pub fn operator_gate(&self) -> OperatorGate {
        OperatorGate {
            max_distance: self.confident_max_distance,
        }
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("attendo")
}

fn default_shift() -> ShiftWindow {
    let midnight = NaiveTime::default();
    ShiftWindow::new(
        midnight + Duration::hours(9),
        midnight + Duration::hours(17),
    )
}

fn env_f32(key: &str, default: f32) -> f32 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
