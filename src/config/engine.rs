//! Engine configuration: paths, performance monitor, remediation commands,
//! report layout and the administrator roster.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use super::defaults;
use crate::notify::AdminAccount;
use crate::report::ReportFormat;

// ============================================================================
// Top-level Config
// ============================================================================

/// Process-level configuration for the health engine.
///
/// Loaded once at startup. Search order:
/// 1. `$HEALTH_SENTINEL_CONFIG` env var
/// 2. `./health_sentinel.toml`
/// 3. Built-in defaults
///
/// The schedule and the remediation rule set live in their own documents
/// (see [`super::ScheduleConfig`] and [`super::RuleSet`]) because they are
/// rewritten at runtime.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub performance: PerformanceConfig,

    #[serde(default)]
    pub probes: ProbeConfig,

    #[serde(default)]
    pub remediation: RemediationConfig,

    #[serde(default)]
    pub report: ReportConfig,

    /// Accounts that receive alerts, reports and remediation notices
    #[serde(default)]
    pub administrators: Vec<AdminAccount>,
}

impl EngineConfig {
    /// Load configuration using the standard search order.
    pub fn load() -> Self {
        // 1. Check env var
        if let Ok(path) = std::env::var(defaults::CONFIG_ENV_VAR) {
            let p = PathBuf::from(&path);
            if p.exists() {
                match Self::load_from_file(&p) {
                    Ok(config) => {
                        info!(path = %p.display(), "Loaded engine config from {}", defaults::CONFIG_ENV_VAR);
                        return config;
                    }
                    Err(e) => {
                        warn!(path = %p.display(), error = %e, "Failed to load engine config, falling back");
                    }
                }
            } else {
                warn!(path = %path, "{} points to non-existent file, falling back", defaults::CONFIG_ENV_VAR);
            }
        }

        // 2. Check ./health_sentinel.toml
        let local = PathBuf::from(defaults::LOCAL_CONFIG_FILE);
        if local.exists() {
            match Self::load_from_file(&local) {
                Ok(config) => {
                    info!("Loaded engine config from ./{}", defaults::LOCAL_CONFIG_FILE);
                    return config;
                }
                Err(e) => {
                    warn!(error = %e, "Failed to load ./{}, using defaults", defaults::LOCAL_CONFIG_FILE);
                }
            }
        }

        // 3. Defaults
        info!("No engine config found, using built-in defaults");
        Self::default()
    }

    /// Load from a specific TOML file path.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let config: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(ConfigError::Serialize)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        let contents = self.to_toml()?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), "Engine config saved");
        Ok(())
    }

    /// Validate values for internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let p = &self.performance;

        if p.interval_secs == 0 {
            errors.push("performance.interval_secs must be > 0".to_string());
        }
        if p.history_capacity == 0 {
            errors.push("performance.history_capacity must be > 0".to_string());
        }
        for (name, value) in [
            ("performance.thresholds.cpu_usage_pct", p.thresholds.cpu_usage_pct),
            ("performance.thresholds.memory_usage_pct", p.thresholds.memory_usage_pct),
            ("performance.thresholds.error_rate_pct", p.thresholds.error_rate_pct),
        ] {
            if !value.is_finite() || !(0.0..=100.0).contains(&value) {
                errors.push(format!("{name} must be within 0..=100 (got {value})"));
            }
        }
        if !p.thresholds.response_time_ms.is_finite() || p.thresholds.response_time_ms <= 0.0 {
            errors.push(format!(
                "performance.thresholds.response_time_ms must be > 0 (got {})",
                p.thresholds.response_time_ms
            ));
        }
        if self.probes.command_template.trim().is_empty() {
            errors.push("probes.command_template must not be empty".to_string());
        }
        if self.report.rows_per_page == 0 {
            errors.push("report.rows_per_page must be > 0".to_string());
        }

        let mut seen = std::collections::HashSet::new();
        for admin in &self.administrators {
            if admin.id.trim().is_empty() {
                errors.push("administrators: id must not be empty".to_string());
            } else if !seen.insert(admin.id.as_str()) {
                errors.push(format!("administrators: duplicate id '{}'", admin.id));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors))
        }
    }
}

// ============================================================================
// Paths
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Database, lock file and runtime documents
    pub data_dir: PathBuf,
    /// Rendered reports
    pub reports_dir: PathBuf,
    /// Root for `run_script` remediation steps
    pub scripts_dir: PathBuf,
    /// Schedule document; relative paths resolve against `data_dir`
    pub schedule_file: PathBuf,
    /// Remediation rule document; relative paths resolve against `data_dir`
    pub rules_file: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(defaults::DATA_DIR),
            reports_dir: PathBuf::from(defaults::REPORTS_DIR),
            scripts_dir: PathBuf::from(defaults::SCRIPTS_DIR),
            schedule_file: PathBuf::from(defaults::SCHEDULE_FILE),
            rules_file: PathBuf::from(defaults::RULES_FILE),
        }
    }
}

impl PathsConfig {
    pub fn schedule_path(&self) -> PathBuf {
        self.in_data_dir(&self.schedule_file)
    }

    pub fn rules_path(&self) -> PathBuf {
        self.in_data_dir(&self.rules_file)
    }

    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("health.db")
    }

    fn in_data_dir(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.data_dir.join(path)
        }
    }
}

// ============================================================================
// Performance Monitor
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// Collection interval in seconds
    pub interval_secs: u64,
    /// Snapshots kept in memory (1 440 = 24 h at 60 s)
    pub history_capacity: usize,
    pub thresholds: PerformanceThresholds,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            interval_secs: defaults::PERFORMANCE_INTERVAL_SECS,
            history_capacity: defaults::PERFORMANCE_HISTORY_CAPACITY,
            thresholds: PerformanceThresholds::default(),
        }
    }
}

impl PerformanceConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
}

/// Alert thresholds for the performance monitor. Exceeding any of them logs
/// a warning on every collection tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceThresholds {
    pub cpu_usage_pct: f64,
    pub memory_usage_pct: f64,
    pub response_time_ms: f64,
    pub error_rate_pct: f64,
}

impl Default for PerformanceThresholds {
    fn default() -> Self {
        Self {
            cpu_usage_pct: defaults::CPU_ALERT_PCT,
            memory_usage_pct: defaults::MEMORY_ALERT_PCT,
            response_time_ms: defaults::RESPONSE_TIME_ALERT_MS,
            error_rate_pct: defaults::ERROR_RATE_ALERT_PCT,
        }
    }
}

// ============================================================================
// Module Probes
// ============================================================================

/// How the command-backed provider reaches each module's probe.
///
/// A probe is a shell command that prints a JSON report on stdout.
/// `{module}` in the template is replaced with the module name.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProbeConfig {
    pub command_template: String,
    /// Per-module commands that replace the template
    pub commands: BTreeMap<String, String>,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            command_template: defaults::PROBE_COMMAND_TEMPLATE.to_string(),
            commands: BTreeMap::new(),
        }
    }
}

impl ProbeConfig {
    pub fn command_for(&self, module: &str) -> String {
        self.commands
            .get(module)
            .cloned()
            .unwrap_or_else(|| self.command_template.replace("{module}", module))
    }
}

// ============================================================================
// Remediation
// ============================================================================

/// Command tables used by the remediation action handlers.
///
/// Each entry maps a target name (as used in rules) to a shell command.
/// A target missing from its table fails the action.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RemediationConfig {
    /// Seconds to wait after the last action before re-checking the module
    pub settle_delay_secs: u64,
    pub services: BTreeMap<String, String>,
    pub caches: BTreeMap<String, String>,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        let services = [
            ("auth", "pm2 restart auth-service"),
            ("websocket", "pm2 restart websocket-server"),
            ("queue", "pm2 restart queue-worker"),
            ("all", "pm2 restart all"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let caches = [
            ("redis", "redis-cli FLUSHDB"),
            ("jwt_keys", "redis-cli DEL \"jwt:*\""),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        Self {
            settle_delay_secs: defaults::SETTLE_DELAY_SECS,
            services,
            caches,
        }
    }
}

impl RemediationConfig {
    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }
}

// ============================================================================
// Reports
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub default_format: ReportFormat,
    /// Module table rows per page in paginated formats
    pub rows_per_page: usize,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            default_format: ReportFormat::Markdown,
            rows_per_page: defaults::REPORT_ROWS_PER_PAGE,
        }
    }
}

// ============================================================================
// Error Type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {1}", .0.display())]
    Io(PathBuf, #[source] std::io::Error),
    #[error("Config parse error ({}): {1}", .0.display())]
    Parse(PathBuf, #[source] toml::de::Error),
    #[error("Config serialization error: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config validation failed:\n  - {}", .0.join("\n  - "))]
    Validation(Vec<String>),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::Role;

    #[test]
    fn test_config_error_messages() {
        use std::error::Error as _;

        let err = ConfigError::Validation(vec!["a must be > 0".into(), "b is empty".into()]);
        assert_eq!(err.to_string(), "Config validation failed:\n  - a must be > 0\n  - b is empty");

        let io = ConfigError::Io(
            PathBuf::from("/etc/sentinel.toml"),
            std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        );
        assert_eq!(io.to_string(), "Config I/O error (/etc/sentinel.toml): gone");
        assert!(io.source().is_some());
    }

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.performance.history_capacity, 1_440);
        assert_eq!(config.remediation.settle_delay(), Duration::from_secs(5));
        assert_eq!(config.remediation.caches["redis"], "redis-cli FLUSHDB");
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let toml_str = r#"
            [paths]
            data_dir = "/var/lib/sentinel"

            [performance.thresholds]
            cpu_usage_pct = 70.0

            [[administrators]]
            id = "ops-1"
            role = "ADMIN"
        "#;
        let config: EngineConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.performance.thresholds.cpu_usage_pct, 70.0);
        assert_eq!(config.performance.thresholds.memory_usage_pct, 85.0);
        assert_eq!(config.paths.schedule_path(), PathBuf::from("/var/lib/sentinel/schedule.toml"));
        assert_eq!(config.administrators.len(), 1);
        assert_eq!(config.administrators[0].role, Role::Admin);
        assert!(config.administrators[0].active);
    }

    #[test]
    fn test_validation_collects_all_errors() {
        let mut config = EngineConfig::default();
        config.performance.interval_secs = 0;
        config.performance.thresholds.cpu_usage_pct = 150.0;
        config.report.rows_per_page = 0;

        match config.validate() {
            Err(ConfigError::Validation(errors)) => assert_eq!(errors.len(), 3),
            other => panic!("expected validation errors, got {other:?}"),
        }
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("engine.toml");
        let mut config = EngineConfig::default();
        config.remediation.settle_delay_secs = 1;
        config.save_to_file(&path).unwrap();

        let loaded = EngineConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.remediation.settle_delay_secs, 1);
    }
}
