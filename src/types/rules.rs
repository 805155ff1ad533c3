//! Remediation types: RuleCondition, ActionStep, RemediationRule, RemediationAttempt

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{HealthCheckResult, HealthStatus};

// ============================================================================
// Conditions
// ============================================================================

/// Predicate deciding whether a rule applies to a health check result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    /// Score strictly below `threshold`
    ScoreBelow { threshold: u8 },
    /// Case-insensitive substring present in any error
    ErrorContains { pattern: String },
    /// Case-insensitive substring present in any warning
    WarningContains { pattern: String },
    /// Named sub-check present with a failing outcome
    CheckFailed { check: String },
}

impl RuleCondition {
    /// Evaluate the predicate against a result.
    ///
    /// `ScoreBelow` never matches an `unknown` result: its zero score is
    /// synthesized from a probe failure, not measured.
    pub fn matches(&self, result: &HealthCheckResult) -> bool {
        match self {
            Self::ScoreBelow { threshold } => {
                result.status != HealthStatus::Unknown && result.score < *threshold
            }
            Self::ErrorContains { pattern } => contains_ignore_case(&result.errors, pattern),
            Self::WarningContains { pattern } => contains_ignore_case(&result.warnings, pattern),
            Self::CheckFailed { check } => result.check_failed(check),
        }
    }
}

impl std::fmt::Display for RuleCondition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ScoreBelow { threshold } => write!(f, "score < {threshold}"),
            Self::ErrorContains { pattern } => write!(f, "error contains '{pattern}'"),
            Self::WarningContains { pattern } => write!(f, "warning contains '{pattern}'"),
            Self::CheckFailed { check } => write!(f, "check '{check}' failed"),
        }
    }
}

fn contains_ignore_case(haystack: &[String], needle: &str) -> bool {
    let needle = needle.to_lowercase();
    haystack.iter().any(|s| s.to_lowercase().contains(&needle))
}

// ============================================================================
// Actions
// ============================================================================

/// What a remediation action does
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionStep {
    /// Restart a named service through its registered handler
    RestartService { target: String },
    /// Clear a named cache through its registered handler
    ClearCache { target: String },
    /// Run a script relative to the scripts directory
    RunScript { path: String },
    /// Bulk-delete stale rows from an auxiliary collection
    DatabaseCleanup { target: String },
    /// No-op that exists to trigger the post-attempt notification
    NotifyOnly,
}

impl ActionStep {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RestartService { .. } => "restart_service",
            Self::ClearCache { .. } => "clear_cache",
            Self::RunScript { .. } => "run_script",
            Self::DatabaseCleanup { .. } => "database_cleanup",
            Self::NotifyOnly => "notify_only",
        }
    }
}

/// One ordered step of a remediation rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationAction {
    pub step: ActionStep,
    /// Operator-facing description, recorded in the attempt audit trail
    pub description: String,
}

impl RemediationAction {
    pub fn new(step: ActionStep, description: impl Into<String>) -> Self {
        Self {
            step,
            description: description.into(),
        }
    }
}

// ============================================================================
// Rules
// ============================================================================

/// Declarative condition-to-actions mapping for one module
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemediationRule {
    pub id: String,
    /// Module the rule targets
    pub module: String,
    pub condition: RuleCondition,
    pub actions: Vec<RemediationAction>,
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Attempts allowed inside one cooldown window
    pub max_attempts: u32,
    /// Length of the sliding attempt window
    pub cooldown_minutes: u32,
    #[serde(default)]
    pub notify_on_success: bool,
    #[serde(default = "default_true")]
    pub notify_on_failure: bool,
}

fn default_true() -> bool {
    true
}

impl RemediationRule {
    /// Enabled, targets the result's module, and its condition holds.
    pub fn applies_to(&self, result: &HealthCheckResult) -> bool {
        self.enabled && self.module == result.module && self.condition.matches(result)
    }
}

/// Audit record of one executed remediation attempt (append-only)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAttempt {
    pub rule_id: String,
    pub module: String,
    pub timestamp: DateTime<Utc>,
    pub success: bool,
    /// Descriptions of the actions run, ending at the first failure
    pub actions_executed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub health_score_before: u8,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub health_score_after: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CheckOutcome, SubCheck};

    fn result(score: u8, status: HealthStatus) -> HealthCheckResult {
        let mut r = HealthCheckResult::new("auth-system", Utc::now(), score);
        r.status = status;
        r
    }

    #[test]
    fn test_score_below_is_strict() {
        let cond = RuleCondition::ScoreBelow { threshold: 50 };
        assert!(cond.matches(&result(49, HealthStatus::Critical)));
        assert!(!cond.matches(&result(50, HealthStatus::Critical)));
    }

    #[test]
    fn test_score_below_ignores_unknown() {
        let r = HealthCheckResult::probe_failure("auth-system", Utc::now(), "timeout");
        assert!(!RuleCondition::ScoreBelow { threshold: 90 }.matches(&r));
    }

    #[test]
    fn test_error_contains_case_insensitive() {
        let r = result(30, HealthStatus::Critical)
            .with_errors(vec!["jwt VERIFICATION failed for key 3".into()]);
        let cond = RuleCondition::ErrorContains {
            pattern: "JWT verification failed".into(),
        };
        assert!(cond.matches(&r));
        let other = RuleCondition::WarningContains {
            pattern: "JWT verification failed".into(),
        };
        assert!(!other.matches(&r));
    }

    #[test]
    fn test_check_failed() {
        let r = result(30, HealthStatus::Critical)
            .with_checks(vec![SubCheck::new("connection_test", CheckOutcome::Fail)]);
        assert!(RuleCondition::CheckFailed {
            check: "connection_test".into()
        }
        .matches(&r));
    }

    #[test]
    fn test_disabled_rule_never_applies() {
        let rule = RemediationRule {
            id: "r1".into(),
            module: "auth-system".into(),
            condition: RuleCondition::ScoreBelow { threshold: 100 },
            actions: vec![],
            enabled: false,
            max_attempts: 1,
            cooldown_minutes: 1,
            notify_on_success: false,
            notify_on_failure: false,
        };
        assert!(!rule.applies_to(&result(10, HealthStatus::Critical)));
    }

    #[test]
    fn test_rule_toml_shape() {
        let toml_str = r#"
id = "cache-cleanup"
module = "database-health"
condition = { type = "warning_contains", pattern = "cache size exceeded" }
max_attempts = 2
cooldown_minutes = 60

[[actions]]
description = "Clear Redis cache"
step = { type = "clear_cache", target = "redis" }

[[actions]]
description = "Alert only"
step = { type = "notify_only" }
"#;
        let rule: RemediationRule = toml::from_str(toml_str).unwrap();
        assert!(rule.enabled);
        assert!(rule.notify_on_failure);
        assert!(!rule.notify_on_success);
        assert_eq!(rule.actions.len(), 2);
        assert_eq!(rule.actions[1].step, ActionStep::NotifyOnly);
    }
}
