//! Remediation rule document
//!
//! Rules are operator-edited TOML (`[[rules]]` tables). The document is read
//! once at engine construction and rewritten whenever rules are managed at
//! runtime.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

use super::ConfigError;
use crate::types::{ActionStep, RemediationAction, RemediationRule, RuleCondition};

/// Ordered list of remediation rules. Order decides precedence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleSet {
    #[serde(default)]
    pub rules: Vec<RemediationRule>,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self {
            rules: default_rules(),
        }
    }
}

impl RuleSet {
    pub fn new(rules: Vec<RemediationRule>) -> Self {
        Self { rules }
    }

    /// Load the document at `path`, falling back to the stock rules (and
    /// persisting them) when it is missing, unparsable or invalid.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            match Self::load_from_file(path) {
                Ok(set) => {
                    info!(path = %path.display(), rules = set.rules.len(), "Loaded remediation rules");
                    return set;
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Remediation rules unreadable, using stock rules");
                }
            }
        } else {
            info!(path = %path.display(), "No remediation rules found, writing stock rules");
        }

        let set = Self::default();
        if let Err(e) = set.save_to_file(path) {
            warn!(error = %e, "Failed to persist stock remediation rules");
        }
        set
    }

    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        let set: Self =
            toml::from_str(&contents).map_err(|e| ConfigError::Parse(path.to_path_buf(), e))?;
        set.validate()?;
        Ok(set)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Io(parent.to_path_buf(), e))?;
        }
        let contents = toml::to_string_pretty(self).map_err(ConfigError::Serialize)?;
        std::fs::write(path, contents).map_err(|e| ConfigError::Io(path.to_path_buf(), e))?;
        info!(path = %path.display(), rules = self.rules.len(), "Remediation rules saved");
        Ok(())
    }

    /// Rules:
    /// - ids are non-empty and unique
    /// - every rule has at least one action
    /// - max_attempts and cooldown_minutes are > 0
    /// - script paths are relative and stay inside the scripts directory
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors: Vec<String> = Vec::new();
        let mut ids = HashSet::new();

        for rule in &self.rules {
            let id = rule.id.as_str();
            if id.trim().is_empty() {
                errors.push("rule id must not be empty".to_string());
            } else if !ids.insert(id) {
                errors.push(format!("duplicate rule id '{id}'"));
            }
            if rule.module.trim().is_empty() {
                errors.push(format!("{id}: module must not be empty"));
            }
            if rule.actions.is_empty() {
                errors.push(format!("{id}: at least one action is required"));
            }
            if rule.max_attempts == 0 {
                errors.push(format!("{id}: max_attempts must be > 0"));
            }
            if rule.cooldown_minutes == 0 {
                errors.push(format!("{id}: cooldown_minutes must be > 0"));
            }
            for action in &rule.actions {
                if let ActionStep::RunScript { path } = &action.step {
                    let p = Path::new(path);
                    if p.is_absolute()
                        || p.components().any(|c| matches!(c, std::path::Component::ParentDir))
                    {
                        errors.push(format!("{id}: script path '{path}' must stay inside the scripts directory"));
                    }
                }
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
// Stock Rules
// ============================================================================

/// Rules shipped for the stock module catalogue.
pub fn default_rules() -> Vec<RemediationRule> {
    vec![
        RemediationRule {
            id: "auth-jwt-fix".into(),
            module: "auth-system".into(),
            condition: RuleCondition::ErrorContains {
                pattern: "JWT verification failed".into(),
            },
            actions: vec![
                RemediationAction::new(
                    ActionStep::ClearCache { target: "jwt_keys".into() },
                    "Clear JWT key cache",
                ),
                RemediationAction::new(
                    ActionStep::RestartService { target: "auth".into() },
                    "Restart authentication service",
                ),
            ],
            enabled: true,
            max_attempts: 3,
            cooldown_minutes: 15,
            notify_on_success: true,
            notify_on_failure: true,
        },
        RemediationRule {
            id: "database-connection-fix".into(),
            module: "database-health".into(),
            // Conditions do not compose; the score half is the conservative
            // default. A failed connection_test alone is left to operators.
            condition: RuleCondition::ScoreBelow { threshold: 50 },
            actions: vec![RemediationAction::new(
                ActionStep::RunScript {
                    path: "remediation/restart-database-pool.sh".into(),
                },
                "Restart database connection pool (score below 50)",
            )],
            enabled: true,
            max_attempts: 2,
            cooldown_minutes: 30,
            notify_on_success: true,
            notify_on_failure: true,
        },
        RemediationRule {
            id: "notification-queue-fix".into(),
            module: "notification-system".into(),
            condition: RuleCondition::WarningContains {
                pattern: "queue backlog".into(),
            },
            actions: vec![RemediationAction::new(
                ActionStep::RunScript {
                    path: "remediation/flush-notification-queue.sh".into(),
                },
                "Flush stale notification queue items",
            )],
            enabled: true,
            max_attempts: 5,
            cooldown_minutes: 10,
            notify_on_success: false,
            notify_on_failure: true,
        },
        RemediationRule {
            id: "chat-websocket-fix".into(),
            module: "chat-system".into(),
            condition: RuleCondition::ErrorContains {
                pattern: "WebSocket connection lost".into(),
            },
            actions: vec![RemediationAction::new(
                ActionStep::RestartService { target: "websocket".into() },
                "Restart WebSocket server",
            )],
            enabled: true,
            max_attempts: 3,
            cooldown_minutes: 20,
            notify_on_success: true,
            notify_on_failure: true,
        },
        RemediationRule {
            id: "cache-cleanup".into(),
            module: "database-health".into(),
            condition: RuleCondition::WarningContains {
                pattern: "cache size exceeded".into(),
            },
            actions: vec![
                RemediationAction::new(ActionStep::ClearCache { target: "redis".into() }, "Clear Redis cache"),
                RemediationAction::new(
                    ActionStep::DatabaseCleanup { target: "old_sessions".into() },
                    "Clean old session data",
                ),
            ],
            enabled: true,
            max_attempts: 2,
            cooldown_minutes: 60,
            notify_on_success: false,
            notify_on_failure: true,
        },
        RemediationRule {
            id: "ai-token-limit".into(),
            module: "ai-system".into(),
            condition: RuleCondition::WarningContains {
                pattern: "token limit approaching".into(),
            },
            actions: vec![
                RemediationAction::new(ActionStep::NotifyOnly, "Alert administrators about token usage"),
                RemediationAction::new(
                    ActionStep::RunScript {
                        path: "remediation/reset-ai-limits.sh".into(),
                    },
                    "Reset daily AI token limits",
                ),
            ],
            enabled: true,
            max_attempts: 1,
            cooldown_minutes: 1_440,
            notify_on_success: true,
            notify_on_failure: false,
        },
    ]
}
