//! Runtime-mutable schedule document
//!
//! Persisted as TOML next to the database. A missing or unreadable document
//! is replaced by the defaults and written back so operators have a file to
//! edit.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

use super::{defaults, ConfigError};
use crate::schedule::Recurrence;
use crate::types::HealthStatus;

/// When checks run, how results are classified, and who hears about it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Master switch. When false `start` arms no timers.
    pub enabled: bool,
    /// Cadence of the full sweep over every module
    pub global_interval: String,
    /// Per-module cadences, keyed by module name
    pub module_intervals: BTreeMap<String, String>,
    pub alert_thresholds: AlertThresholds,
    /// When false results are still classified and stored but no alerts go out
    pub alerts_enabled: bool,
    pub alert_channels: Vec<String>,
    /// Check results older than this many days are purged nightly
    pub retention_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            global_interval: defaults::GLOBAL_INTERVAL.to_string(),
            module_intervals: defaults::MODULE_INTERVALS
                .iter()
                .map(|(m, e)| ((*m).to_string(), (*e).to_string()))
                .collect(),
            alert_thresholds: AlertThresholds::default(),
            alerts_enabled: true,
            alert_channels: defaults::ALERT_CHANNELS.iter().map(|c| (*c).to_string()).collect(),
            retention_days: defaults::RETENTION_DAYS,
        }
    }
}

impl ScheduleConfig {
    /// Load the document at `path`, falling back to defaults (and persisting
    /// them) when it is missing, unparsable or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match Self::load_from_file(path) {
                Ok(config) => {
                    info!(path = %path.display(), modules = config.module_intervals.len(), "Loaded schedule");
                    return config;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Schedule unreadable, replacing with defaults");
                }
            }
        } else {
            info!(path = %path.display(), "No schedule found, writing defaults");
        }

        let config = Self::default();
        if let Err(e) = config.save_to_file(path) {
            warn!(error = %e, "Failed to persist default schedule");
        }
        config
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Schedule saved");
        Ok(())
    }

    /// Rules:
    /// - every schedule expression parses
    /// - critical <= warning <= 100 (equal thresholds leave no warning band)
    /// - retention is at least one day
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();

        if let Err(e) = Recurrence::parse(&self.global_interval) {
            errors.push(format!("global_interval: {e}"));
        }
        for (module, expr) in &self.module_intervals {
            if module.trim().is_empty() {
                errors.push("module_intervals: module name must not be empty".to_string());
            }
            if let Err(e) = Recurrence::parse(expr) {
                errors.push(format!("module_intervals.{module}: {e}"));
            }
        }

        let t = &self.alert_thresholds;
        if t.critical_score > t.warning_score || t.warning_score > 100 {
            errors.push(format!(
                "alert_thresholds: expected critical ({}) <= warning ({}) <= 100",
                t.critical_score, t.warning_score
            ));
        }
        if self.retention_days == 0 {
            errors.push("retention_days must be > 0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

/// Score cut-offs used to classify check results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertThresholds {
    /// Below this score a result is critical
    pub critical_score: u8,
    /// Below this score a result is a warning
    pub warning_score: u8,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            critical_score: defaults::CRITICAL_SCORE,
            warning_score: defaults::WARNING_SCORE,
        }
    }
}

impl AlertThresholds {
    pub fn classify(&self, score: u8) -> HealthStatus {
        if score < self.critical_score {
            HealthStatus::Critical
        } else if score < self.warning_score {
            HealthStatus::Warning
        } else {
            HealthStatus::Healthy
        }
    }
}
