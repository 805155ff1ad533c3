//! Module Check Provider
//!
//! The scheduler knows modules only by name. A provider turns a name into a
//! [`HealthCheckResult`]. Errors are expected to be rare (degraded modules
//! report a low score rather than failing); any `Err` becomes an `unknown`
//! result with score 0.

use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use tokio::process::Command;
use tracing::debug;

use crate::config::ProbeConfig;
use crate::types::{HealthCheckResult, SubCheck};

/// Errors raised while probing a module
#[derive(Debug, thiserror::Error)]
pub enum ProbeError {
    #[error("no probe registered for module '{0}'")]
    UnknownModule(String),
    #[error("{0}")]
    Failed(String),
    #[error("probe process error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid probe output: {0}")]
    InvalidOutput(String),
}

/// Produces the current health of a named module
#[async_trait]
pub trait ModuleCheckProvider: Send + Sync {
    async fn check(&self, module: &str) -> Result<HealthCheckResult, ProbeError>;
}

// ============================================================================
// Command-backed provider
// ============================================================================

/// JSON document a probe command prints on stdout
#[derive(Debug, Deserialize)]
struct ProbeReport {
    score: i64,
    #[serde(default)]
    checks: Vec<SubCheck>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    errors: Vec<String>,
}

/// Runs one shell command per module and parses its JSON report.
///
/// A non-zero exit without a parseable report is a probe failure carrying
/// the last stderr line.
pub struct CommandProvider {
    config: ProbeConfig,
}

impl CommandProvider {
    pub fn new(config: ProbeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl ModuleCheckProvider for CommandProvider {
    async fn check(&self, module: &str) -> Result<HealthCheckResult, ProbeError> {
        if module.trim().is_empty() {
            return Err(ProbeError::UnknownModule(module.to_string()));
        }
        let command = self.config.command_for(module);
        debug!(module = %module, command = %command, "Running probe");

        let output = Command::new("sh").arg("-c").arg(&command).output().await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        match serde_json::from_str::<ProbeReport>(stdout.trim()) {
            Ok(report) => Ok(report.into_result(module)),
            Err(parse_err) if output.status.success() => {
                Err(ProbeError::InvalidOutput(parse_err.to_string()))
            }
            Err(_) => {
                let stderr = String::from_utf8_lossy(&output.stderr);
                let cause = stderr
                    .lines()
                    .rev()
                    .find(|l| !l.trim().is_empty())
                    .map_or_else(|| format!("probe exited with {}", output.status), str::to_string);
                Err(ProbeError::Failed(cause))
            }
        }
    }
}

impl ProbeReport {
    fn into_result(self, module: &str) -> HealthCheckResult {
        let score = u8::try_from(self.score.clamp(0, 100)).unwrap_or(0);
        HealthCheckResult::new(module, Utc::now(), score)
            .with_checks(self.checks)
            .with_warnings(self.warnings)
            .with_errors(self.errors)
    }
}
