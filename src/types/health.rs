//! Health check result types: HealthStatus, SubCheck, HealthCheckResult

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Highest score a module can report.
pub const MAX_SCORE: u8 = 100;

// ============================================================================
// Status
// ============================================================================

/// Module health classification
///
/// Derived from the score against the configured thresholds, except for
/// `Unknown`, which is reserved for probes that failed to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
    Critical,
    Unknown,
}

impl HealthStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Healthy => "healthy",
            Self::Warning => "warning",
            Self::Critical => "critical",
            Self::Unknown => "unknown",
        }
    }

    /// Whether this status should reach administrators as an alert
    pub fn is_alerting(self) -> bool {
        !matches!(self, Self::Healthy)
    }

    /// Critical, or a probe that failed to run. Both go to remediation.
    pub fn is_critical(self) -> bool {
        matches!(self, Self::Critical | Self::Unknown)
    }
}

impl std::fmt::Display for HealthStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one named sub-check inside a module probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckOutcome {
    Pass,
    Warn,
    Fail,
    Skip,
}

/// A single sub-check reported by a module probe
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubCheck {
    /// Sub-check identifier (e.g. `connection_test`)
    pub name: String,
    pub status: CheckOutcome,
    /// Optional human readable detail
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SubCheck {
    pub fn new(name: impl Into<String>, status: CheckOutcome) -> Self {
        Self {
            name: name.into(),
            status,
            message: None,
        }
    }
}

// ============================================================================
// Result
// ============================================================================

/// Standardized outcome of probing one module at one point in time.
///
/// Immutable once persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealthCheckResult {
    /// Module identifier (e.g. `auth-system`)
    pub module: String,
    /// When the probe completed
    pub timestamp: DateTime<Utc>,
    pub status: HealthStatus,
    /// Health score, always within 0..=100
    pub score: u8,
    /// Ordered sub-check outcomes
    #[serde(default)]
    pub checks: Vec<SubCheck>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub errors: Vec<String>,
    /// Wall-clock probe duration
    #[serde(default)]
    pub execution_time_ms: u64,
}

impl HealthCheckResult {
    /// Create an empty result for `module`; status is filled in by classification.
    pub fn new(module: impl Into<String>, timestamp: DateTime<Utc>, score: u8) -> Self {
        Self {
            module: module.into(),
            timestamp,
            status: HealthStatus::Unknown,
            score: score.min(MAX_SCORE),
            checks: Vec::new(),
            warnings: Vec::new(),
            errors: Vec::new(),
            execution_time_ms: 0,
        }
    }

    /// Degraded result recorded when the probe itself could not run.
    pub fn probe_failure(module: impl Into<String>, timestamp: DateTime<Utc>, cause: &str) -> Self {
        Self {
            status: HealthStatus::Unknown,
            score: 0,
            errors: vec![format!("Failed to execute health check: {cause}")],
            ..Self::new(module, timestamp, 0)
        }
    }

    /// True when the named sub-check is present and failed.
    pub fn check_failed(&self, name: &str) -> bool {
        self.checks
            .iter()
            .any(|c| c.name == name && c.status == CheckOutcome::Fail)
    }

    pub fn with_checks(mut self, checks: Vec<SubCheck>) -> Self {
        self.checks = checks;
        self
    }

    pub fn with_warnings(mut self, warnings: Vec<String>) -> Self {
        self.warnings = warnings;
        self
    }

    pub fn with_errors(mut self, errors: Vec<String>) -> Self {
        self.errors = errors;
        self
    }
}
