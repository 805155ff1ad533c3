//! Remediation Engine
//!
//! Maps failing results to operator-defined rules and runs the rule's
//! actions, bounded by a per-rule sliding attempt window.
//!
//! ## Evaluation
//!
//! 1. Enabled rules for the result's module, in configured order, whose
//!    condition holds
//! 2. The first rule that can claim a throttle slot runs; throttled rules
//!    are skipped (not a failure)
//! 3. Actions run in order and stop at the first failure
//! 4. After a settle delay the module is re-probed: success means the score
//!    improved (or the re-probe was unavailable)
//! 5. The attempt is persisted and administrators notified per rule flags

mod actions;
mod throttle;

pub use actions::{run_script, run_shell, ActionError, ActionHandlers, CommandHandlers};
pub use throttle::AttemptThrottle;

use chrono::Duration as ChronoDuration;
use serde_json::json;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tracing::{error, info, warn};

use crate::config::{defaults, ConfigError, RuleSet};
use crate::notify::{Notification, NotificationKind, Notifier, Priority};
use crate::probe::ModuleCheckProvider;
use crate::schedule::Clock;
use crate::storage::{AuxCollection, ResultStore};
use crate::types::{ActionStep, HealthCheckResult, RemediationAttempt, RemediationRule};

/// Collaborators and settings of a [`RemediationEngine`]
pub struct RemediationDeps {
    pub handlers: Arc<dyn ActionHandlers>,
    pub provider: Arc<dyn ModuleCheckProvider>,
    pub store: Arc<dyn ResultStore>,
    pub notifier: Notifier,
    pub clock: Arc<dyn Clock>,
    /// Root for `run_script` actions
    pub scripts_dir: PathBuf,
    /// Wait between the last action and the verification probe
    pub settle_delay: Duration,
}

pub struct RemediationEngine {
    rules: RwLock<Vec<RemediationRule>>,
    /// Where rule mutations persist; `None` keeps them in memory
    rules_path: Option<PathBuf>,
    throttle: AttemptThrottle,
    deps: RemediationDeps,
}

impl RemediationEngine {
    pub fn new(rules: RuleSet, rules_path: Option<PathBuf>, deps: RemediationDeps) -> Self {
        Self {
            rules: RwLock::new(rules.rules),
            rules_path,
            throttle: AttemptThrottle::new(),
            deps,
        }
    }

    // ========================================================================
    // Evaluation
    // ========================================================================

    /// Run the first applicable, unthrottled rule for `result`.
    ///
    /// Returns `None` when no rule applies or every applicable rule is in
    /// its cooldown window.
    pub async fn evaluate_and_remediate(&self, result: &HealthCheckResult) -> Option<RemediationAttempt> {
        let candidates: Vec<RemediationRule> = self
            .rules
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .filter(|rule| rule.applies_to(result))
            .cloned()
            .collect();

        if candidates.is_empty() {
            info!(module = %result.module, score = result.score, "No remediation rule applies");
            return None;
        }

        for rule in candidates {
            let now = self.deps.clock.now();
            if !self
                .throttle
                .try_acquire(&rule.id, rule.max_attempts, rule.cooldown_minutes, now)
            {
                info!(
                    rule = %rule.id,
                    max_attempts = rule.max_attempts,
                    cooldown_minutes = rule.cooldown_minutes,
                    "Skipping rule, attempt limit reached in cooldown window"
                );
                continue;
            }
            return Some(self.execute_rule(&rule, result).await);
        }

        None
    }

    async fn execute_rule(&self, rule: &RemediationRule, result: &HealthCheckResult) -> RemediationAttempt {
        info!(rule = %rule.id, module = %rule.module, condition = %rule.condition, "Executing remediation");

        let mut attempt = RemediationAttempt {
            rule_id: rule.id.clone(),
            module: rule.module.clone(),
            timestamp: self.deps.clock.now(),
            success: false,
            actions_executed: Vec::new(),
            error: None,
            health_score_before: result.score,
            health_score_after: None,
        };

        for action in &rule.actions {
            info!(rule = %rule.id, action = action.step.kind(), "Executing action: {}", action.description);
            attempt.actions_executed.push(action.description.clone());
            if let Err(e) = self.execute_step(&action.step).await {
                warn!(rule = %rule.id, action = action.step.kind(), error = %e, "Remediation action failed");
                attempt.error = Some(format!("Action failed: {}: {e}", action.description));
                break;
            }
        }

        if attempt.error.is_none() {
            tokio::time::sleep(self.deps.settle_delay).await;
            match self.deps.provider.check(&rule.module).await {
                Ok(after) => {
                    attempt.health_score_after = Some(after.score);
                    attempt.success = after.score > result.score;
                }
                Err(e) => {
                    warn!(module = %rule.module, error = %e, "Verification probe unavailable, assuming success");
                    attempt.success = true;
                }
            }
        }

        info!(
            rule = %rule.id,
            success = attempt.success,
            before = attempt.health_score_before,
            after = ?attempt.health_score_after,
            "Remediation attempt finished"
        );

        if let Err(e) = self.deps.store.store_attempt(&attempt) {
            error!(rule = %rule.id, error = %e, "Failed to persist remediation attempt");
        }

        if (attempt.success && rule.notify_on_success) || (!attempt.success && rule.notify_on_failure) {
            let notification = attempt_notification(rule, &attempt);
            self.deps.notifier.notify_admins(&notification).await;
        }

        attempt
    }

    async fn execute_step(&self, step: &ActionStep) -> Result<(), ActionError> {
        match step {
            ActionStep::RestartService { target } => self.deps.handlers.restart_service(target).await,
            ActionStep::ClearCache { target } => self.deps.handlers.clear_cache(target).await,
            ActionStep::RunScript { path } => run_script(&self.deps.scripts_dir, path).await,
            ActionStep::DatabaseCleanup { target } => self.database_cleanup(target).map(|_| ()),
            ActionStep::NotifyOnly => {
                info!("Notification-only action");
                Ok(())
            }
        }
    }

    /// Bulk-delete stale auxiliary rows. Returns the number removed.
    fn database_cleanup(&self, target: &str) -> Result<usize, ActionError> {
        let (collection, days) = match target {
            "old_sessions" => (AuxCollection::Sessions, defaults::SESSION_RETENTION_DAYS),
            "old_notifications" => (AuxCollection::Notifications, defaults::NOTIFICATION_RETENTION_DAYS),
            other => {
                return Err(ActionError::UnknownTarget {
                    kind: "cleanup",
                    target: other.to_string(),
                })
            }
        };
        let cutoff = self.deps.clock.now() - ChronoDuration::days(days);
        let removed = self
            .deps
            .store
            .purge_auxiliary(collection, cutoff)
            .map_err(|e| ActionError::Cleanup(e.to_string()))?;
        info!(cleanup = %target, removed, "Database cleanup completed");
        Ok(removed)
    }

    // ========================================================================
    // Rule management
    // ========================================================================

    /// Snapshot of the configured rules, in evaluation order
    pub fn rules(&self) -> Vec<RemediationRule> {
        self.rules.read().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace the rule with the same id in place, or append a new one.
    pub fn add_or_update_rule(&self, rule: RemediationRule) -> Result<(), ConfigError> {
        self.mutate(|rules| {
            match rules.iter_mut().find(|r| r.id == rule.id) {
                Some(existing) => *existing = rule,
                None => rules.push(rule),
            }
            true
        })
        .map(|_| ())
    }

    /// Remove a rule. Returns false when no rule had that id.
    pub fn remove_rule(&self, rule_id: &str) -> Result<bool, ConfigError> {
        let removed = self.mutate(|rules| {
            let before = rules.len();
            rules.retain(|r| r.id != rule_id);
            rules.len() != before
        })?;
        if removed {
            self.throttle.forget(rule_id);
        }
        Ok(removed)
    }

    /// Enable or disable a rule. Returns false when no rule had that id.
    pub fn toggle_rule(&self, rule_id: &str, enabled: bool) -> Result<bool, ConfigError> {
        self.mutate(|rules| match rules.iter_mut().find(|r| r.id == rule_id) {
            Some(rule) => {
                rule.enabled = enabled;
                true
            }
            None => false,
        })
    }

    /// Replace the whole rule set.
    pub fn replace_rules(&self, rules: RuleSet) -> Result<(), ConfigError> {
        self.mutate(|current| {
            *current = rules.rules;
            true
        })
        .map(|_| ())
    }

    /// Apply `edit` to a copy, validate and persist it, then publish.
    fn mutate<F>(&self, edit: F) -> Result<bool, ConfigError>
    where
        F: FnOnce(&mut Vec<RemediationRule>) -> bool,
    {
        let mut rules = self.rules.write().unwrap_or_else(|e| e.into_inner());
        let mut candidate = rules.clone();
        if !edit(&mut candidate) {
            return Ok(false);
        }

        let set = RuleSet::new(candidate);
        set.validate()?;
        if let Some(path) = &self.rules_path {
            set.save_to_file(path)?;
        }
        *rules = set.rules;
        Ok(true)
    }
}

fn attempt_notification(rule: &RemediationRule, attempt: &RemediationAttempt) -> Notification {
    let (kind, priority, title) = if attempt.success {
        (
            NotificationKind::RemediationSucceeded,
            Priority::Normal,
            format!("Auto-remediation succeeded: {}", rule.module),
        )
    } else {
        (
            NotificationKind::RemediationFailed,
            Priority::High,
            format!("Auto-remediation failed: {}", rule.module),
        )
    };

    let mut message = format!(
        "Rule {} ran {} action(s): {}. Score before: {}",
        rule.id,
        attempt.actions_executed.len(),
        attempt.actions_executed.join(", "),
        attempt.health_score_before
    );
    if let Some(after) = attempt.health_score_after {
        message.push_str(&format!(", after: {after}"));
    }
    if let Some(err) = &attempt.error {
        message.push_str(&format!(". Error: {err}"));
    }

    Notification::new(kind, priority, title, message).with_data(json!({
        "rule_id": rule.id,
        "module": rule.module,
        "success": attempt.success,
        "actions_executed": attempt.actions_executed,
        "health_score_before": attempt.health_score_before,
        "health_score_after": attempt.health_score_after,
        "error": attempt.error,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notify::{AdminAccount, NotificationDispatcher, NotifyError, Role, StaticDirectory};
    use crate::probe::ProbeError;
    use crate::schedule::ManualClock;
    use crate::storage::InMemoryStore;
    use crate::types::{HealthStatus, RemediationAction, RuleCondition};
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandlers {
        calls: Mutex<Vec<String>>,
        fail_service: Option<String>,
    }

    #[async_trait]
    impl ActionHandlers for RecordingHandlers {
        async fn restart_service(&self, target: &str) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(format!("restart:{target}"));
            if self.fail_service.as_deref() == Some(target) {
                return Err(ActionError::CommandFailed {
                    command: "restart".into(),
                    status: "exit 1".into(),
                    stderr: String::new(),
                });
            }
            Ok(())
        }

        async fn clear_cache(&self, target: &str) -> Result<(), ActionError> {
            self.calls.lock().unwrap().push(format!("clear:{target}"));
            Ok(())
        }
    }

    struct ScoreAfter(Option<u8>);

    #[async_trait]
    impl ModuleCheckProvider for ScoreAfter {
        async fn check(&self, module: &str) -> Result<HealthCheckResult, ProbeError> {
            match self.0 {
                Some(score) => Ok(HealthCheckResult::new(module, Utc::now(), score)),
                None => Err(ProbeError::Failed("unreachable".into())),
            }
        }
    }

    #[derive(Default)]
    struct Inbox(Mutex<Vec<Notification>>);

    #[async_trait]
    impl NotificationDispatcher for Inbox {
        async fn send_to_user(&self, _user: &str, n: &Notification) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(n.clone());
            Ok(())
        }
    }

    struct Fixture {
        engine: RemediationEngine,
        handlers: Arc<RecordingHandlers>,
        store: Arc<InMemoryStore>,
        inbox: Arc<Inbox>,
        clock: Arc<ManualClock>,
    }

    fn fixture(rules: Vec<RemediationRule>, handlers: RecordingHandlers, after: Option<u8>) -> Fixture {
        let handlers = Arc::new(handlers);
        let store = Arc::new(InMemoryStore::new());
        let inbox = Arc::new(Inbox::default());
        let clock = Arc::new(ManualClock::new(Utc.with_ymd_and_hms(2026, 3, 2, 10, 0, 0).unwrap()));
        let engine = RemediationEngine::new(
            RuleSet::new(rules),
            None,
            RemediationDeps {
                handlers: handlers.clone(),
                provider: Arc::new(ScoreAfter(after)),
                store: store.clone(),
                notifier: Notifier::new(
                    Arc::new(StaticDirectory::new(vec![AdminAccount::new("admin", Role::Admin)])),
                    inbox.clone(),
                ),
                clock: clock.clone(),
                scripts_dir: PathBuf::from("/nonexistent"),
                settle_delay: Duration::ZERO,
            },
        );
        Fixture {
            engine,
            handlers,
            store,
            inbox,
            clock,
        }
    }

    fn rule(id: &str, condition: RuleCondition, steps: Vec<ActionStep>) -> RemediationRule {
        RemediationRule {
            id: id.into(),
            module: "auth-system".into(),
            condition,
            actions: steps
                .into_iter()
                .enumerate()
                .map(|(i, s)| RemediationAction::new(s, format!("step {i}")))
                .collect(),
            enabled: true,
            max_attempts: 2,
            cooldown_minutes: 15,
            notify_on_success: true,
            notify_on_failure: true,
        }
    }

    fn critical(score: u8) -> HealthCheckResult {
        let mut r = HealthCheckResult::new("auth-system", Utc::now(), score)
            .with_errors(vec!["JWT verification failed".into()]);
        r.status = HealthStatus::Critical;
        r
    }

    #[tokio::test]
    async fn test_successful_attempt_is_persisted_and_notified() {
        let f = fixture(
            vec![rule(
                "jwt",
                RuleCondition::ErrorContains {
                    pattern: "jwt".into(),
                },
                vec![
                    ActionStep::ClearCache { target: "jwt_keys".into() },
                    ActionStep::RestartService { target: "auth".into() },
                ],
            )],
            RecordingHandlers::default(),
            Some(85),
        );

        let attempt = f.engine.evaluate_and_remediate(&critical(40)).await.unwrap();
        assert!(attempt.success);
        assert_eq!(attempt.health_score_after, Some(85));
        assert_eq!(*f.handlers.calls.lock().unwrap(), vec!["clear:jwt_keys", "restart:auth"]);

        let far = f.clock.now() + ChronoDuration::days(1);
        assert_eq!(f.store.attempts_between(f.clock.now(), far).unwrap().len(), 1);
        assert_eq!(f.inbox.0.lock().unwrap()[0].kind, NotificationKind::RemediationSucceeded);
    }

    #[tokio::test]
    async fn test_first_failure_stops_actions() {
        let f = fixture(
            vec![rule(
                "jwt",
                RuleCondition::ScoreBelow { threshold: 60 },
                vec![
                    ActionStep::RestartService { target: "auth".into() },
                    ActionStep::ClearCache { target: "jwt_keys".into() },
                ],
            )],
            RecordingHandlers {
                fail_service: Some("auth".into()),
                ..Default::default()
            },
            Some(99),
        );

        let attempt = f.engine.evaluate_and_remediate(&critical(40)).await.unwrap();
        assert!(!attempt.success);
        assert_eq!(attempt.actions_executed, vec!["step 0".to_string()]);
        assert!(attempt.error.as_deref().unwrap().starts_with("Action failed: step 0"));
        assert_eq!(attempt.health_score_after, None);
        assert_eq!(*f.handlers.calls.lock().unwrap(), vec!["restart:auth"]);
        assert_eq!(f.inbox.0.lock().unwrap()[0].kind, NotificationKind::RemediationFailed);
    }

    #[tokio::test]
    async fn test_no_improvement_is_failure_and_unavailable_probe_is_success() {
        let cond = RuleCondition::ScoreBelow { threshold: 60 };
        let f = fixture(vec![rule("r", cond.clone(), vec![ActionStep::NotifyOnly])], RecordingHandlers::default(), Some(40));
        assert!(!f.engine.evaluate_and_remediate(&critical(40)).await.unwrap().success);

        let f = fixture(vec![rule("r", cond, vec![ActionStep::NotifyOnly])], RecordingHandlers::default(), None);
        let attempt = f.engine.evaluate_and_remediate(&critical(40)).await.unwrap();
        assert!(attempt.success);
        assert_eq!(attempt.health_score_after, None);
    }

    #[tokio::test]
    async fn test_throttled_rule_falls_through_to_next() {
        let cond = RuleCondition::ScoreBelow { threshold: 60 };
        let mut first = rule("first", cond.clone(), vec![ActionStep::NotifyOnly]);
        first.max_attempts = 1;
        let second = rule("second", cond, vec![ActionStep::NotifyOnly]);
        let f = fixture(vec![first, second], RecordingHandlers::default(), Some(90));

        assert_eq!(f.engine.evaluate_and_remediate(&critical(40)).await.unwrap().rule_id, "first");
        f.clock.advance(ChronoDuration::minutes(1));
        assert_eq!(f.engine.evaluate_and_remediate(&critical(40)).await.unwrap().rule_id, "second");
        f.clock.advance(ChronoDuration::minutes(1));
        assert_eq!(f.engine.evaluate_and_remediate(&critical(40)).await.unwrap().rule_id, "second");
        f.clock.advance(ChronoDuration::minutes(1));
        assert!(f.engine.evaluate_and_remediate(&critical(40)).await.is_none());
    }

    #[tokio::test]
    async fn test_disabled_and_foreign_rules_are_ignored() {
        let cond = RuleCondition::ScoreBelow { threshold: 60 };
        let mut disabled = rule("off", cond.clone(), vec![ActionStep::NotifyOnly]);
        disabled.enabled = false;
        let mut foreign = rule("other", cond, vec![ActionStep::NotifyOnly]);
        foreign.module = "chat-system".into();
        let f = fixture(vec![disabled, foreign], RecordingHandlers::default(), Some(90));
        assert!(f.engine.evaluate_and_remediate(&critical(10)).await.is_none());
    }

    #[tokio::test]
    async fn test_database_cleanup_purges_old_sessions() {
        let f = fixture(
            vec![rule(
                "cleanup",
                RuleCondition::ScoreBelow { threshold: 60 },
                vec![ActionStep::DatabaseCleanup { target: "old_sessions".into() }],
            )],
            RecordingHandlers::default(),
            Some(90),
        );
        let now = f.clock.now();
        let entry = json!({ "user": "u" });
        f.store
            .record_auxiliary(AuxCollection::Sessions, now - ChronoDuration::days(40), &entry)
            .unwrap();
        f.store
            .record_auxiliary(AuxCollection::Sessions, now - ChronoDuration::days(2), &entry)
            .unwrap();

        assert!(f.engine.evaluate_and_remediate(&critical(40)).await.unwrap().success);
        assert_eq!(f.store.auxiliary_entries(AuxCollection::Sessions).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_rule_management() {
        let f = fixture(Vec::new(), RecordingHandlers::default(), None);
        let r = rule("r", RuleCondition::ScoreBelow { threshold: 60 }, vec![ActionStep::NotifyOnly]);
        f.engine.add_or_update_rule(r.clone()).unwrap();
        f.engine
            .add_or_update_rule(RemediationRule {
                max_attempts: 9,
                ..r.clone()
            })
            .unwrap();
        assert_eq!(f.engine.rules().len(), 1);
        assert_eq!(f.engine.rules()[0].max_attempts, 9);

        assert!(f.engine.toggle_rule("r", false).unwrap());
        assert!(!f.engine.rules()[0].enabled);
        assert!(!f.engine.toggle_rule("missing", true).unwrap());

        let invalid = RemediationRule {
            actions: Vec::new(),
            ..r
        };
        assert!(f.engine.add_or_update_rule(invalid).is_err());
        assert_eq!(f.engine.rules()[0].actions.len(), 1);

        assert!(f.engine.remove_rule("r").unwrap());
        assert!(!f.engine.remove_rule("r").unwrap());
    }

    #[tokio::test]
    async fn test_rule_mutations_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rules.toml");
        let f = fixture(Vec::new(), RecordingHandlers::default(), None);
        let engine = RemediationEngine::new(RuleSet::default(), Some(path.clone()), f.engine.deps);

        assert!(engine.toggle_rule("auth-jwt-fix", false).unwrap());
        let reloaded = RuleSet::load_from_file(&path).unwrap();
        assert!(!reloaded.rules.iter().find(|r| r.id == "auth-jwt-fix").unwrap().enabled);
    }
}
