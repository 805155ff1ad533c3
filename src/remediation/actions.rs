//! Remediation action execution
//!
//! `restart_service` and `clear_cache` go through an [`ActionHandlers`]
//! implementation so deployments (and tests) can swap the mechanism.
//! `run_script` and `database_cleanup` are executed by the engine itself.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use tokio::process::Command;
use tracing::{info, warn};

use crate::config::RemediationConfig;

/// Errors raised by a remediation action
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error("unknown {kind} target '{target}'")]
    UnknownTarget { kind: &'static str, target: String },
    #[error("script '{0}' not found")]
    ScriptNotFound(PathBuf),
    #[error("script path '{0}' escapes the scripts directory")]
    ScriptOutsideRoot(String),
    #[error("command '{command}' exited with {status}: {stderr}")]
    CommandFailed {
        command: String,
        status: String,
        stderr: String,
    },
    #[error("failed to spawn '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("cleanup failed: {0}")]
    Cleanup(String),
}

/// Service and cache operations used by remediation rules
#[async_trait]
pub trait ActionHandlers: Send + Sync {
    async fn restart_service(&self, target: &str) -> Result<(), ActionError>;
    async fn clear_cache(&self, target: &str) -> Result<(), ActionError>;
}

/// Resolves targets through the command tables of the engine config and
/// runs them with `sh -c`.
pub struct CommandHandlers {
    services: BTreeMap<String, String>,
    caches: BTreeMap<String, String>,
}

impl CommandHandlers {
    pub fn new(config: &RemediationConfig) -> Self {
        Self {
            services: config.services.clone(),
            caches: config.caches.clone(),
        }
    }
}

#[async_trait]
impl ActionHandlers for CommandHandlers {
    async fn restart_service(&self, target: &str) -> Result<(), ActionError> {
        let command = self.services.get(target).ok_or_else(|| ActionError::UnknownTarget {
            kind: "service",
            target: target.to_string(),
        })?;
        run_shell(command).await?;
        info!(service = %target, "Service restarted");
        Ok(())
    }

    async fn clear_cache(&self, target: &str) -> Result<(), ActionError> {
        let command = self.caches.get(target).ok_or_else(|| ActionError::UnknownTarget {
            kind: "cache",
            target: target.to_string(),
        })?;
        run_shell(command).await?;
        info!(cache = %target, "Cache cleared");
        Ok(())
    }
}

/// Run `command` through `sh -c`, failing on a non-zero exit.
pub async fn run_shell(command: &str) -> Result<(), ActionError> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .output()
        .await
        .map_err(|source| ActionError::Spawn {
            command: command.to_string(),
            source,
        })?;
    check_exit(command, &output)
}

/// Run `bash <scripts_dir>/<relative>`, failing on a non-zero exit.
///
/// Absolute paths and `..` components are rejected.
pub async fn run_script(scripts_dir: &Path, relative: &str) -> Result<(), ActionError> {
    let rel = Path::new(relative);
    if rel.is_absolute() || rel.components().any(|c| matches!(c, Component::ParentDir)) {
        return Err(ActionError::ScriptOutsideRoot(relative.to_string()));
    }
    let full = scripts_dir.join(rel);
    if !full.is_file() {
        return Err(ActionError::ScriptNotFound(full));
    }

    let command = format!("bash {}", full.display());
    let output = Command::new("bash")
        .arg(&full)
        .output()
        .await
        .map_err(|source| ActionError::Spawn {
            command: command.clone(),
            source,
        })?;

    let stderr = String::from_utf8_lossy(&output.stderr);
    if output.status.success() && !stderr.trim().is_empty() {
        warn!(script = %relative, stderr = %stderr.trim(), "Script wrote to stderr");
    }
    check_exit(&command, &output)?;
    info!(script = %relative, "Script executed");
    Ok(())
}

fn check_exit(command: &str, output: &std::process::Output) -> Result<(), ActionError> {
    if output.status.success() {
        return Ok(());
    }
    Err(ActionError::CommandFailed {
        command: command.to_string(),
        status: output.status.to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unknown_targets_fail() {
        let handlers = CommandHandlers::new(&RemediationConfig::default());
        assert!(matches!(
            handlers.restart_service("mainframe").await,
            Err(ActionError::UnknownTarget { kind: "service", .. })
        ));
        assert!(matches!(
            handlers.clear_cache("memcached").await,
            Err(ActionError::UnknownTarget { kind: "cache", .. })
        ));
    }

    #[tokio::test]
    async fn test_command_table_is_used() {
        let mut config = RemediationConfig::default();
        config.services.insert("ok".into(), "true".into());
        config.caches.insert("broken".into(), "echo nope >&2; exit 2".into());
        let handlers = CommandHandlers::new(&config);

        assert!(handlers.restart_service("ok").await.is_ok());
        match handlers.clear_cache("broken").await {
            Err(ActionError::CommandFailed { stderr, .. }) => assert_eq!(stderr, "nope"),
            other => panic!("expected command failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_run_script() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("remediation")).unwrap();
        std::fs::write(dir.path().join("remediation/ok.sh"), "exit 0\n").unwrap();
        std::fs::write(dir.path().join("remediation/fail.sh"), "exit 1\n").unwrap();

        assert!(run_script(dir.path(), "remediation/ok.sh").await.is_ok());
        assert!(matches!(
            run_script(dir.path(), "remediation/fail.sh").await,
            Err(ActionError::CommandFailed { .. })
        ));
        assert!(matches!(
            run_script(dir.path(), "remediation/missing.sh").await,
            Err(ActionError::ScriptNotFound(_))
        ));
        assert!(matches!(
            run_script(dir.path(), "../outside.sh").await,
            Err(ActionError::ScriptOutsideRoot(_))
        ));
    }
}
