//! Orchestrator: wires scheduler, remediation, performance monitor and
//! report generator into one engine with a two-state lifecycle.
//!
//! Constructed once at process start and handed to callers; `start` and
//! `stop` are the only lifecycle hooks.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use serde::Serialize;
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{error, info, warn};

use crate::config::{defaults, ConfigError, EngineConfig, PerformanceConfig, RuleSet, ScheduleConfig};
use crate::monitor::{PerformanceMonitor, SystemSampler};
use crate::notify::{NotificationDispatcher, Notifier, StaticDirectory};
use crate::probe::ModuleCheckProvider;
use crate::remediation::{ActionHandlers, RemediationDeps, RemediationEngine};
use crate::report::{csv_field, GeneratedReport, ReportFormat, ReportGenerator};
use crate::schedule::{Clock, Recurrence, RecurringTimer};
use crate::scheduler::{CriticalResultHandler, HealthScheduler};
use crate::storage::{ResultStore, StoreError};
use crate::types::{HealthCheckResult, HealthStatus, PerformanceSnapshot, RemediationAttempt, RemediationRule};

const WEEKLY_REPORT_TIMER: &str = "weekly-report";

// ============================================================================
// Wiring
// ============================================================================

/// External collaborators the engine runs against
pub struct Collaborators {
    pub provider: Arc<dyn ModuleCheckProvider>,
    pub handlers: Arc<dyn ActionHandlers>,
    pub store: Arc<dyn ResultStore>,
    pub dispatcher: Arc<dyn NotificationDispatcher>,
    pub sampler: Arc<dyn SystemSampler>,
    pub clock: Arc<dyn Clock>,
}

#[async_trait]
impl CriticalResultHandler for RemediationEngine {
    async fn on_critical(&self, result: &HealthCheckResult) {
        self.evaluate_and_remediate(result).await;
    }
}

// ============================================================================
// Query results
// ============================================================================

/// A manual check and what remediation did about it
#[derive(Debug, Clone, Serialize)]
pub struct ManualCheckOutcome {
    pub original: HealthCheckResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<RemediationAttempt>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_remediation: Option<HealthCheckResult>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ModuleStatus {
    pub name: String,
    pub status: HealthStatus,
    pub score: u8,
    pub last_check: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStats {
    pub total_modules: usize,
    pub healthy_modules: usize,
    pub warning_modules: usize,
    pub critical_modules: usize,
    pub unknown_modules: usize,
    /// Mean of the latest scores; `None` without recent results
    pub overall_score: Option<u8>,
    pub modules: Vec<ModuleStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SystemStatus {
    pub orchestrator_running: bool,
    pub scheduler_config: ScheduleConfig,
    pub enabled_rules: usize,
    pub system_stats: SystemStats,
    pub next_weekly_report: Option<DateTime<Utc>>,
}

/// Partial runtime configuration change
#[derive(Debug, Clone, Default)]
pub struct ConfigurationUpdate {
    pub schedule: Option<ScheduleConfig>,
    /// Added or replaced by id
    pub rules: Option<Vec<RemediationRule>>,
    pub performance: Option<PerformanceConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Json,
    Csv,
}

impl FromStr for ExportFormat {
    type Err = ExportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(Self::Json),
            "csv" => Ok(Self::Csv),
            other => Err(ExportError::UnknownFormat(other.to_string())),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("unknown export format '{0}' (expected json or csv)")]
    UnknownFormat(String),
    #[error("failed to read results: {0}")]
    Store(#[from] StoreError),
    #[error("failed to serialize results: {0}")]
    Serialize(#[from] serde_json::Error),
}

// ============================================================================
// Orchestrator
// ============================================================================

pub struct Orchestrator {
    scheduler: HealthScheduler,
    remediation: Arc<RemediationEngine>,
    monitor: PerformanceMonitor,
    reports: Arc<ReportGenerator>,
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    weekly_report: Mutex<Option<RecurringTimer>>,
    running: AtomicBool,
}

impl Orchestrator {
    /// Build the engine from its settings. The schedule and the rule set are
    /// loaded from their documents, falling back to (and persisting) defaults.
    pub fn new(config: &EngineConfig, collaborators: Collaborators) -> Self {
        let Collaborators {
            provider,
            handlers,
            store,
            dispatcher,
            sampler,
            clock,
        } = collaborators;

        let notifier = Notifier::new(
            Arc::new(StaticDirectory::new(config.administrators.clone())),
            dispatcher,
        );

        let schedule_path = config.paths.schedule_path();
        let scheduler = HealthScheduler::new(
            Arc::clone(&provider),
            Arc::clone(&store),
            notifier.clone(),
            Arc::clone(&clock),
            ScheduleConfig::load_or_default(&schedule_path),
            Some(schedule_path),
        );

        let rules_path = config.paths.rules_path();
        let remediation = Arc::new(RemediationEngine::new(
            RuleSet::load_or_default(&rules_path),
            Some(rules_path),
            RemediationDeps {
                handlers,
                provider,
                store: Arc::clone(&store),
                notifier: notifier.clone(),
                clock: Arc::clone(&clock),
                scripts_dir: config.paths.scripts_dir.clone(),
                settle_delay: config.remediation.settle_delay(),
            },
        ));
        scheduler.set_critical_handler(remediation.clone());

        let monitor = PerformanceMonitor::new(
            config.performance.clone(),
            Arc::clone(&store),
            Arc::clone(&clock),
            sampler,
            scheduler.in_flight(),
        );

        let reports = Arc::new(ReportGenerator::new(
            Arc::clone(&store),
            notifier,
            Arc::clone(&clock),
            config.paths.reports_dir.clone(),
            config.report.clone(),
        ));

        Self {
            scheduler,
            remediation,
            monitor,
            reports,
            store,
            clock,
            weekly_report: Mutex::new(None),
            running: AtomicBool::new(false),
        }
    }

    pub fn scheduler(&self) -> &HealthScheduler {
        &self.scheduler
    }

    pub fn remediation(&self) -> &RemediationEngine {
        &self.remediation
    }

    pub fn monitor(&self) -> &PerformanceMonitor {
        &self.monitor
    }

    pub fn reports(&self) -> &ReportGenerator {
        &self.reports
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Boot every component and run one immediate sweep, remediating any
    /// critical result. A second call while running is a logged no-op.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Orchestrator is already running");
            return;
        }
        info!("Starting health check orchestrator");

        self.scheduler.start();

        let reports = Arc::clone(&self.reports);
        *self.weekly_report.lock().unwrap_or_else(|e| e.into_inner()) = Some(RecurringTimer::spawn(
            WEEKLY_REPORT_TIMER,
            weekly_recurrence(),
            Arc::clone(&self.clock),
            move || {
                let reports = Arc::clone(&reports);
                async move {
                    if reports.generate_weekly_report().await.is_none() {
                        error!("Weekly report was not produced");
                    }
                }
            },
        ));

        self.monitor.start();
        info!("Health check orchestrator operational");

        self.run_initial_check().await;
    }

    /// Cancel future firings everywhere. In-flight work completes. Idempotent.
    pub fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Orchestrator is not running");
            return;
        }
        info!("Stopping health check orchestrator");

        if let Some(timer) = self.weekly_report.lock().unwrap_or_else(|e| e.into_inner()).take() {
            timer.cancel();
        }
        self.scheduler.stop();
        self.monitor.stop();
        info!("Health check orchestrator stopped");
    }

    async fn run_initial_check(&self) {
        info!("Running initial system check");
        let results = self.scheduler.run_all_checks().await;
        for result in results.iter().filter(|r| r.status.is_critical()) {
            warn!(module = %result.module, score = result.score, "Critical issue detected at startup");
            self.remediation.evaluate_and_remediate(result).await;
        }
        info!(modules = results.len(), "Initial check completed");
    }

    // ========================================================================
    // Entry points
    // ========================================================================

    /// Run the check(s); every warning or critical result goes through
    /// remediation and, when a rule ran, the module is checked again.
    pub async fn run_manual_check_with_remediation(&self, module: Option<&str>) -> Vec<ManualCheckOutcome> {
        info!(module = module.unwrap_or("all"), "Running manual check");
        let results = self.scheduler.run_manual_check(module).await;

        let mut outcomes = Vec::with_capacity(results.len());
        for original in results {
            let mut outcome = ManualCheckOutcome {
                original,
                remediation: None,
                after_remediation: None,
            };
            if matches!(outcome.original.status, HealthStatus::Critical | HealthStatus::Warning) {
                if let Some(attempt) = self.remediation.evaluate_and_remediate(&outcome.original).await {
                    outcome.after_remediation = Some(self.scheduler.run_module_check(&outcome.original.module).await);
                    outcome.remediation = Some(attempt);
                }
            }
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Report for `range`, or for the last seven days.
    pub async fn generate_report(
        &self,
        range: Option<(DateTime<Utc>, DateTime<Utc>)>,
        format: Option<ReportFormat>,
    ) -> Option<GeneratedReport> {
        let (start, end) = range.unwrap_or_else(|| {
            let end = self.clock.now();
            (end - ChronoDuration::days(defaults::DEFAULT_REPORT_DAYS), end)
        });
        let format = format.unwrap_or_else(|| self.reports.default_format());
        self.reports.generate_report(start, end, format, "manual").await
    }

    /// Latest result per module within the status window.
    pub fn system_status(&self) -> SystemStatus {
        let now = self.clock.now();
        let since = now - ChronoDuration::hours(defaults::STATUS_WINDOW_HOURS);
        let recent = match self.store.results_between(since, now + ChronoDuration::nanoseconds(1)) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Recent results unavailable for status");
                Vec::new()
            }
        };

        // ascending order, so later entries win
        let mut latest: BTreeMap<String, HealthCheckResult> = BTreeMap::new();
        for r in recent {
            latest.insert(r.module.clone(), r);
        }
        let count = |s: HealthStatus| latest.values().filter(|r| r.status == s).count();
        let overall_score = if latest.is_empty() {
            None
        } else {
            let sum: u64 = latest.values().map(|r| u64::from(r.score)).sum();
            Some((sum as f64 / latest.len() as f64).round() as u8)
        };

        let system_stats = SystemStats {
            total_modules: latest.len(),
            healthy_modules: count(HealthStatus::Healthy),
            warning_modules: count(HealthStatus::Warning),
            critical_modules: count(HealthStatus::Critical),
            unknown_modules: count(HealthStatus::Unknown),
            overall_score,
            modules: latest
                .values()
                .map(|r| ModuleStatus {
                    name: r.module.clone(),
                    status: r.status,
                    score: r.score,
                    last_check: r.timestamp,
                })
                .collect(),
        };

        let running = self.is_running();
        SystemStatus {
            orchestrator_running: running,
            scheduler_config: (*self.scheduler.config()).clone(),
            enabled_rules: self.remediation.rules().iter().filter(|r| r.enabled).count(),
            system_stats,
            next_weekly_report: running.then(|| weekly_recurrence().next_after(now)).flatten(),
        }
    }

    /// Serialize results with `start <= timestamp <= end`.
    pub fn export_data(
        &self,
        format: ExportFormat,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<String, ExportError> {
        let results = self
            .store
            .results_between(start, end + ChronoDuration::nanoseconds(1))?;
        info!(records = results.len(), ?format, "Exporting check results");
        match format {
            ExportFormat::Json => Ok(serde_json::to_string_pretty(&results)?),
            ExportFormat::Csv => results_to_csv(&results),
        }
    }

    /// Apply the parts of `update` that are present.
    pub fn update_configuration(&self, update: ConfigurationUpdate) -> Result<(), ConfigError> {
        if let Some(schedule) = update.schedule {
            self.scheduler.update_config(schedule)?;
        }
        if let Some(rules) = update.rules {
            let count = rules.len();
            for rule in rules {
                self.remediation.add_or_update_rule(rule)?;
            }
            info!(rules = count, "Remediation rules updated");
        }
        if let Some(performance) = update.performance {
            self.monitor.update_config(performance);
        }
        Ok(())
    }

    pub fn performance_metrics(&self) -> PerformanceSnapshot {
        self.monitor.current()
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(timer) = self.weekly_report.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            timer.cancel();
        }
    }
}

fn weekly_recurrence() -> Recurrence {
    let (hour, minute) = defaults::WEEKLY_REPORT_AT;
    Recurrence::Weekly(
        Weekday::Mon,
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap_or(NaiveTime::MIN),
    )
}

fn results_to_csv(results: &[HealthCheckResult]) -> Result<String, ExportError> {
    let mut out = String::from("module,timestamp,status,score,execution_time_ms,checks,warnings,errors\n");
    for r in results {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{}\n",
            csv_field(&r.module),
            r.timestamp.to_rfc3339(),
            r.status,
            r.score,
            r.execution_time_ms,
            csv_field(&serde_json::to_string(&r.checks)?),
            csv_field(&r.warnings.join("; ")),
            csv_field(&r.errors.join("; ")),
        ));
    }
    Ok(out)
}
