//! End-to-end scenarios over a fully wired engine.
//!
//! Each test builds an `Orchestrator` against in-memory collaborators and a
//! manual clock (see `common`), drives one behaviour through the public
//! entry points and asserts on persisted records and delivered
//! notifications.

mod common;

use chrono::Duration;
use common::{epoch, harness, seed};
use health_sentinel::config::RuleSet;
use health_sentinel::notify::NotificationKind;
use health_sentinel::orchestrator::{ConfigurationUpdate, ExportFormat};
use health_sentinel::remediation::AttemptThrottle;
use health_sentinel::report::{ReportFormat, Trend};
use health_sentinel::schedule::Clock;
use health_sentinel::storage::ResultStore;
use health_sentinel::types::{
    ActionStep, HealthCheckResult, HealthStatus, RemediationAction, RemediationRule, RuleCondition,
};
use health_sentinel::ScheduleConfig;

fn rule(id: &str, module: &str, condition: RuleCondition, max_attempts: u32, cooldown_minutes: u32) -> RemediationRule {
    RemediationRule {
        id: id.into(),
        module: module.into(),
        condition,
        actions: vec![RemediationAction::new(
            ActionStep::RestartService { target: "auth".into() },
            "Restart auth service",
        )],
        enabled: true,
        max_attempts,
        cooldown_minutes,
        notify_on_success: true,
        notify_on_failure: true,
    }
}

fn critical(module: &str, score: u8) -> HealthCheckResult {
    let mut r = HealthCheckResult::new(module, epoch(), score);
    r.status = HealthStatus::Critical;
    r
}

fn schedule_for(modules: &[&str]) -> ScheduleConfig {
    let mut config = ScheduleConfig::default();
    config.module_intervals = modules.iter().map(|m| ((*m).to_string(), "1h".to_string())).collect();
    config
}

// ============================================================================
// Scheduler
// ============================================================================

#[tokio::test]
async fn critical_result_alerts_every_active_admin() {
    let h = harness();
    h.provider.script("database", vec![Ok(40)]);

    let result = h.orchestrator.scheduler().run_module_check("database").await;

    assert_eq!(result.status, HealthStatus::Critical);
    assert_eq!(result.score, 40);
    let stored = h.store.recent_results(1).unwrap();
    assert_eq!(stored[0].status, HealthStatus::Critical);
    assert_eq!(h.inbox.recipients(), vec!["admin-1".to_string(), "root".to_string()]);
    let delivered = h.inbox.delivered.lock().unwrap();
    assert!(delivered.iter().all(|(_, n)| n.kind == NotificationKind::HealthAlert));
}

#[tokio::test]
async fn probe_failure_degrades_to_unknown_without_matching_rules() {
    let h = harness();
    h.provider.script("payment-system", vec![Err("timeout".into())]);
    h.orchestrator
        .remediation()
        .replace_rules(RuleSet::new(vec![
            rule("low-score", "payment-system", RuleCondition::ScoreBelow { threshold: 90 }, 3, 10),
            rule(
                "declines",
                "payment-system",
                RuleCondition::ErrorContains {
                    pattern: "card declined".into(),
                },
                3,
                10,
            ),
        ]))
        .unwrap();

    let result = h.orchestrator.scheduler().run_module_check("payment-system").await;

    assert_eq!(result.status, HealthStatus::Unknown);
    assert_eq!(result.score, 0);
    assert_eq!(result.errors, vec!["Failed to execute health check: timeout".to_string()]);
    assert_eq!(result.execution_time_ms, 0);

    assert!(h.orchestrator.remediation().evaluate_and_remediate(&result).await.is_none());
    assert!(h.handlers.calls.lock().unwrap().is_empty());
}

#[tokio::test]
async fn retention_sweep_deletes_only_older_records() {
    let h = harness();
    let cutoff = h.clock.now() - Duration::days(30);
    seed(&h.store, "auth-system", cutoff - Duration::seconds(1), 90, HealthStatus::Healthy);
    seed(&h.store, "auth-system", cutoff, 90, HealthStatus::Healthy);
    seed(&h.store, "auth-system", cutoff + Duration::seconds(1), 90, HealthStatus::Healthy);

    assert_eq!(h.orchestrator.scheduler().cleanup_old_results(), 1);

    let left = h
        .store
        .results_between(cutoff - Duration::days(1), h.clock.now())
        .unwrap();
    assert_eq!(left.len(), 2);
    assert!(left.iter().all(|r| r.timestamp >= cutoff));
}

// ============================================================================
// Remediation
// ============================================================================

#[tokio::test]
async fn cooldown_window_skips_then_reopens() {
    let h = harness();
    h.provider.script("auth-system", vec![Ok(90)]);
    h.orchestrator
        .remediation()
        .replace_rules(RuleSet::new(vec![rule(
            "auth-restart",
            "auth-system",
            RuleCondition::ScoreBelow { threshold: 50 },
            2,
            15,
        )]))
        .unwrap();
    let engine = h.orchestrator.remediation();
    let failing = critical("auth-system", 30);

    assert!(engine.evaluate_and_remediate(&failing).await.is_some());
    h.clock.set(epoch() + Duration::minutes(5));
    assert!(engine.evaluate_and_remediate(&failing).await.is_some());
    h.clock.set(epoch() + Duration::minutes(12));
    assert!(engine.evaluate_and_remediate(&failing).await.is_none());
    h.clock.set(epoch() + Duration::minutes(16));
    let attempt = engine.evaluate_and_remediate(&failing).await.unwrap();

    assert!(attempt.success);
    assert_eq!(attempt.health_score_before, 30);
    assert_eq!(attempt.health_score_after, Some(90));
    let persisted = h
        .store
        .attempts_between(epoch() - Duration::hours(1), epoch() + Duration::hours(1))
        .unwrap();
    assert_eq!(persisted.len(), 3);
    assert_eq!(h.handlers.calls.lock().unwrap().len(), 3);
}

#[test]
fn throttle_allows_exactly_max_attempts_per_window() {
    for (max, cooldown) in [(1_u32, 5_u32), (2, 15), (5, 60)] {
        let throttle = AttemptThrottle::new();
        let t0 = epoch();
        for i in 0..max {
            assert!(throttle.try_acquire("r", max, cooldown, t0 + Duration::seconds(i64::from(i))));
        }
        let inside = t0 + Duration::minutes(i64::from(cooldown)) - Duration::seconds(1);
        assert!(!throttle.try_acquire("r", max, cooldown, inside));
        let after = t0 + Duration::minutes(i64::from(cooldown)) + Duration::seconds(i64::from(max));
        assert!(throttle.try_acquire("r", max, cooldown, after));
    }
}

#[tokio::test]
async fn manual_check_remediates_and_rechecks() {
    let h = harness();
    h.provider.script("auth-system", vec![Ok(30), Ok(95)]);
    h.orchestrator
        .remediation()
        .replace_rules(RuleSet::new(vec![rule(
            "auth-restart",
            "auth-system",
            RuleCondition::ScoreBelow { threshold: 50 },
            3,
            15,
        )]))
        .unwrap();

    let outcomes = h
        .orchestrator
        .run_manual_check_with_remediation(Some("auth-system"))
        .await;

    assert_eq!(outcomes.len(), 1);
    let outcome = &outcomes[0];
    assert_eq!(outcome.original.status, HealthStatus::Critical);
    let attempt = outcome.remediation.as_ref().unwrap();
    assert_eq!(attempt.rule_id, "auth-restart");
    assert_eq!(attempt.actions_executed, vec!["Restart auth service".to_string()]);
    assert!(attempt.success);
    assert_eq!(outcome.after_remediation.as_ref().unwrap().score, 95);
    assert_eq!(*h.handlers.calls.lock().unwrap(), vec!["restart:auth".to_string()]);
}

#[tokio::test]
async fn healthy_manual_check_is_left_alone() {
    let h = harness();
    h.provider.script("chat-system", vec![Ok(97)]);

    let outcomes = h
        .orchestrator
        .run_manual_check_with_remediation(Some("chat-system"))
        .await;

    assert_eq!(outcomes[0].original.status, HealthStatus::Healthy);
    assert!(outcomes[0].remediation.is_none());
    assert!(outcomes[0].after_remediation.is_none());
    assert_eq!(h.inbox.count(), 0);
}

// ============================================================================
// Reports
// ============================================================================

#[tokio::test]
async fn report_classifies_degrading_module() {
    let h = harness();
    let end = epoch();
    let start = end - Duration::days(7);
    for (day, score, status) in [
        (1, 90, HealthStatus::Healthy),
        (2, 85, HealthStatus::Healthy),
        (3, 95, HealthStatus::Healthy),
        (4, 40, HealthStatus::Critical),
    ] {
        seed(&h.store, "chat-system", start + Duration::days(day), score, status);
    }
    seed(&h.store, "chat-system", start - Duration::days(2), 80, HealthStatus::Healthy);
    seed(&h.store, "chat-system", start - Duration::days(5), 80, HealthStatus::Healthy);

    let report = h
        .orchestrator
        .generate_report(Some((start, end)), Some(ReportFormat::Json))
        .await
        .unwrap();

    let stats = &report.data.modules[0];
    assert_eq!(stats.module, "chat-system");
    assert_eq!(stats.avg_score, 78);
    assert_eq!(stats.uptime_pct, 75);
    assert_eq!(stats.trend, Trend::Degrading);
    assert_eq!(stats.failure_count, 1);
    assert_eq!(report.data.incidents.len(), 1);
    assert!(report.path.is_file());
    assert!(report.filename.ends_with(".json"));

    let delivered = h.inbox.delivered.lock().unwrap();
    assert_eq!(delivered.len(), 2);
    assert!(delivered.iter().all(|(_, n)| n.kind == NotificationKind::HealthReport));
}

#[tokio::test]
async fn default_report_covers_last_week() {
    let h = harness();
    seed(&h.store, "auth-system", epoch() - Duration::days(1), 88, HealthStatus::Healthy);
    seed(&h.store, "auth-system", epoch() - Duration::days(9), 10, HealthStatus::Critical);

    let report = h.orchestrator.generate_report(None, None).await.unwrap();

    assert_eq!(report.data.total_checks, 1);
    assert_eq!(report.data.period_end, epoch());
    assert_eq!(report.data.period_start, epoch() - Duration::days(7));
    assert!(report.filename.ends_with(".md"));
    assert_eq!(h.orchestrator.reports().report_history().len(), 1);
}

// ============================================================================
// Status, export, configuration
// ============================================================================

#[test]
fn system_status_uses_latest_result_per_module() {
    let h = harness();
    let now = h.clock.now();
    seed(&h.store, "auth-system", now - Duration::hours(2), 50, HealthStatus::Critical);
    seed(&h.store, "auth-system", now - Duration::hours(1), 90, HealthStatus::Healthy);
    seed(&h.store, "chat-system", now - Duration::minutes(10), 70, HealthStatus::Warning);
    seed(&h.store, "database-health", now - Duration::hours(30), 20, HealthStatus::Critical);

    let status = h.orchestrator.system_status();

    assert!(!status.orchestrator_running);
    assert!(status.next_weekly_report.is_none());
    let stats = &status.system_stats;
    assert_eq!(stats.total_modules, 2);
    assert_eq!(stats.healthy_modules, 1);
    assert_eq!(stats.warning_modules, 1);
    assert_eq!(stats.critical_modules, 0);
    assert_eq!(stats.overall_score, Some(80));
    assert_eq!(status.enabled_rules, RuleSet::default().rules.len());
}

#[test]
fn export_range_is_inclusive() {
    let h = harness();
    let start = epoch() - Duration::days(1);
    let end = epoch();
    seed(&h.store, "auth-system", start - Duration::seconds(1), 90, HealthStatus::Healthy);
    seed(&h.store, "auth-system", start, 91, HealthStatus::Healthy);
    seed(&h.store, "auth-system", start + Duration::hours(6), 92, HealthStatus::Healthy);
    seed(&h.store, "auth-system", end, 93, HealthStatus::Healthy);

    let json = h.orchestrator.export_data(ExportFormat::Json, start, end).unwrap();
    let rows: Vec<HealthCheckResult> = serde_json::from_str(&json).unwrap();
    assert_eq!(rows.iter().map(|r| r.score).collect::<Vec<_>>(), vec![91, 92, 93]);

    let csv = h.orchestrator.export_data(ExportFormat::Csv, start, end).unwrap();
    let lines: Vec<&str> = csv.lines().collect();
    assert_eq!(lines.len(), 4);
    assert!(lines[0].starts_with("module,timestamp,status,score"));
}

#[tokio::test]
async fn configuration_update_applies_each_part() {
    let h = harness();
    let mut performance = h.orchestrator.monitor().config().as_ref().clone();
    performance.history_capacity = 5;

    h.orchestrator
        .update_configuration(ConfigurationUpdate {
            schedule: Some(schedule_for(&["auth-system"])),
            rules: Some(vec![rule(
                "auth-restart",
                "auth-system",
                RuleCondition::ScoreBelow { threshold: 50 },
                1,
                5,
            )]),
            performance: Some(performance),
        })
        .unwrap();

    assert_eq!(h.orchestrator.scheduler().config().module_intervals.len(), 1);
    assert!(h.orchestrator.remediation().rules().iter().any(|r| r.id == "auth-restart"));
    assert_eq!(h.orchestrator.monitor().config().history_capacity, 5);

    let on_disk = ScheduleConfig::load_from_file(&h.dir.path().join("data/schedule.toml")).unwrap();
    assert_eq!(on_disk.module_intervals.len(), 1);

    let mut invalid = schedule_for(&["auth-system"]);
    invalid.retention_days = 0;
    assert!(h
        .orchestrator
        .update_configuration(ConfigurationUpdate {
            schedule: Some(invalid),
            ..ConfigurationUpdate::default()
        })
        .is_err());
}

#[tokio::test]
async fn lifecycle_start_sweeps_and_stop_is_idempotent() {
    let h = harness();
    h.provider.script("auth-system", vec![Ok(40), Ok(85)]);
    h.orchestrator
        .update_configuration(ConfigurationUpdate {
            schedule: Some(schedule_for(&["auth-system"])),
            rules: Some(vec![rule(
                "auth-restart",
                "auth-system",
                RuleCondition::ScoreBelow { threshold: 50 },
                3,
                15,
            )]),
            ..ConfigurationUpdate::default()
        })
        .unwrap();

    h.orchestrator.start().await;
    assert!(h.orchestrator.is_running());
    assert!(h.orchestrator.monitor().is_running());
    assert!(h
        .orchestrator
        .scheduler()
        .timer_names()
        .contains(&"auth-system".to_string()));
    // the startup sweep found a critical module and remediated it
    assert_eq!(h.handlers.calls.lock().unwrap().len(), 1);

    h.orchestrator.start().await;
    assert_eq!(h.handlers.calls.lock().unwrap().len(), 1);

    let status = h.orchestrator.system_status();
    assert!(status.orchestrator_running);
    assert_eq!(
        status.next_weekly_report,
        Some(epoch() + Duration::days(7) - Duration::hours(1))
    );
    assert_eq!(h.orchestrator.performance_metrics().cpu.usage_pct, 12.0);

    h.orchestrator.stop();
    h.orchestrator.stop();
    assert!(!h.orchestrator.is_running());
    assert!(!h.orchestrator.monitor().is_running());
    assert!(h.orchestrator.scheduler().timer_names().is_empty());
}

#[tokio::test]
async fn startup_sweep_remediates_failed_probes() {
    let h = harness();
    h.provider.script("auth-system", vec![Err("timeout".into()), Ok(85)]);
    h.orchestrator
        .update_configuration(ConfigurationUpdate {
            schedule: Some(schedule_for(&["auth-system"])),
            rules: Some(vec![rule(
                "auth-timeout",
                "auth-system",
                RuleCondition::ErrorContains {
                    pattern: "timeout".into(),
                },
                3,
                15,
            )]),
            ..ConfigurationUpdate::default()
        })
        .unwrap();

    h.orchestrator.start().await;

    assert_eq!(*h.handlers.calls.lock().unwrap(), vec!["restart:auth".to_string()]);
    let attempts = h
        .store
        .attempts_between(epoch() - Duration::hours(1), epoch() + Duration::hours(1))
        .unwrap();
    assert_eq!(attempts.len(), 1);
    assert_eq!(attempts[0].rule_id, "auth-timeout");
    assert_eq!(attempts[0].health_score_after, Some(85));

    h.orchestrator.stop();
}
