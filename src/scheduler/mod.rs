//! Health Check Scheduler
//!
//! Owns one recurring timer per module, one timer for the full sweep and one
//! nightly retention timer. Every tick runs the same pipeline:
//!
//! ```text
//! probe -> classify -> persist -> alert -> (critical handler)
//! ```
//!
//! No step is allowed to abort the pipeline: a failed probe becomes an
//! `unknown` result, a failed write is logged, a failed delivery is logged
//! per recipient.

mod alerts;
mod in_flight;

pub use in_flight::{InFlight, InFlightGuard};

use arc_swap::ArcSwap;
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveTime};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::config::{defaults, ConfigError, ScheduleConfig};
use crate::notify::Notifier;
use crate::probe::ModuleCheckProvider;
use crate::schedule::{Clock, Recurrence, RecurringTimer, TimerSet};
use crate::storage::ResultStore;
use crate::types::HealthCheckResult;

/// Timer names for the non-module timers
const SWEEP_TIMER: &str = "global-sweep";
const RETENTION_TIMER: &str = "retention-sweep";

/// Reacts to critical results produced by scheduled ticks
///
/// Manual checks do not reach the handler; their caller decides what to do
/// with the returned results.
#[async_trait]
pub trait CriticalResultHandler: Send + Sync {
    async fn on_critical(&self, result: &HealthCheckResult);
}

/// Why a check is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    /// Timer tick: skipped when the module is already running, feeds the
    /// critical handler
    Scheduled,
    /// Operator request: never skipped
    Manual,
}

pub struct HealthScheduler {
    inner: Arc<SchedulerInner>,
    timers: Mutex<TimerSet>,
    running: AtomicBool,
}

struct SchedulerInner {
    provider: Arc<dyn ModuleCheckProvider>,
    store: Arc<dyn ResultStore>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    config: ArcSwap<ScheduleConfig>,
    /// Where `update_config` persists; `None` keeps changes in memory
    config_path: Option<PathBuf>,
    in_flight: InFlight,
    critical_handler: RwLock<Option<Arc<dyn CriticalResultHandler>>>,
}

impl HealthScheduler {
    pub fn new(
        provider: Arc<dyn ModuleCheckProvider>,
        store: Arc<dyn ResultStore>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        config: ScheduleConfig,
        config_path: Option<PathBuf>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                provider,
                store,
                notifier,
                clock,
                config: ArcSwap::from_pointee(config),
                config_path,
                in_flight: InFlight::new(),
                critical_handler: RwLock::new(None),
            }),
            timers: Mutex::new(TimerSet::new()),
            running: AtomicBool::new(false),
        }
    }

    pub fn set_critical_handler(&self, handler: Arc<dyn CriticalResultHandler>) {
        *self
            .inner
            .critical_handler
            .write()
            .unwrap_or_else(|e| e.into_inner()) = Some(handler);
    }

    /// Current schedule snapshot
    pub fn config(&self) -> Arc<ScheduleConfig> {
        self.inner.config.load_full()
    }

    /// Shared in-flight registry
    pub fn in_flight(&self) -> InFlight {
        self.inner.in_flight.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Names of armed timers, sorted
    pub fn timer_names(&self) -> Vec<String> {
        self.timers.lock().unwrap_or_else(|e| e.into_inner()).names()
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Arm every timer described by the current config.
    ///
    /// A disabled schedule arms nothing. Calling `start` on a running
    /// scheduler re-arms from the current config.
    pub fn start(&self) {
        let config = self.config();
        if !config.enabled {
            info!("Scheduler disabled by configuration, no timers armed");
            return;
        }

        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        timers.cancel_all();

        for (module, expr) in &config.module_intervals {
            let recurrence = match Recurrence::parse(expr) {
                Ok(r) => r,
                Err(e) => {
                    error!(module = %module, error = %e, "Skipping module with invalid schedule");
                    continue;
                }
            };
            let inner = Arc::clone(&self.inner);
            let module_name = module.clone();
            timers.insert(RecurringTimer::spawn(
                module.clone(),
                recurrence,
                Arc::clone(&self.inner.clock),
                move || {
                    let inner = Arc::clone(&inner);
                    let module = module_name.clone();
                    async move {
                        inner.run_check(&module, Trigger::Scheduled).await;
                    }
                },
            ));
            info!(module = %module, schedule = %expr, "Scheduled module check");
        }

        match Recurrence::parse(&config.global_interval) {
            Ok(recurrence) => {
                let inner = Arc::clone(&self.inner);
                timers.insert(RecurringTimer::spawn(
                    SWEEP_TIMER,
                    recurrence,
                    Arc::clone(&self.inner.clock),
                    move || {
                        let inner = Arc::clone(&inner);
                        async move {
                            inner.run_sweep(Trigger::Scheduled).await;
                        }
                    },
                ));
                info!(schedule = %config.global_interval, "Scheduled global sweep");
            }
            Err(e) => error!(error = %e, "Global sweep not scheduled"),
        }

        let (hour, minute) = defaults::RETENTION_SWEEP_AT;
        if let Some(at) = NaiveTime::from_hms_opt(hour, minute, 0) {
            let inner = Arc::clone(&self.inner);
            timers.insert(RecurringTimer::spawn(
                RETENTION_TIMER,
                Recurrence::Daily(at),
                Arc::clone(&self.inner.clock),
                move || {
                    let inner = Arc::clone(&inner);
                    async move {
                        inner.cleanup_old_results();
                    }
                },
            ));
        }

        self.running.store(true, Ordering::SeqCst);
        info!(timers = timers.len(), "Health check scheduler started");
    }

    /// Cancel every timer. In-flight checks run to completion. Idempotent.
    pub fn stop(&self) {
        let mut timers = self.timers.lock().unwrap_or_else(|e| e.into_inner());
        if !timers.is_empty() {
            timers.cancel_all();
            info!("Health check scheduler stopped");
        }
        self.running.store(false, Ordering::SeqCst);
    }

    // ========================================================================
    // Checks
    // ========================================================================

    /// Probe one module now. Never skipped, never fails.
    pub async fn run_module_check(&self, module: &str) -> HealthCheckResult {
        self.inner
            .run_check(module, Trigger::Manual)
            .await
            .unwrap_or_else(|| HealthCheckResult::probe_failure(module, self.inner.clock.now(), "check skipped"))
    }

    /// Probe every configured module concurrently.
    pub async fn run_all_checks(&self) -> Vec<HealthCheckResult> {
        self.inner.run_sweep(Trigger::Manual).await
    }

    /// One module when named, otherwise all of them.
    pub async fn run_manual_check(&self, module: Option<&str>) -> Vec<HealthCheckResult> {
        match module {
            Some(m) => vec![self.run_module_check(m).await],
            None => self.run_all_checks().await,
        }
    }

    /// Delete results older than the retention window. Returns the count.
    pub fn cleanup_old_results(&self) -> usize {
        self.inner.cleanup_old_results()
    }

    // ========================================================================
    // Configuration
    // ========================================================================

    /// Validate, persist and apply a new schedule, re-arming timers when running.
    pub fn update_config(&self, config: ScheduleConfig) -> Result<(), ConfigError> {
        config.validate()?;
        if let Some(path) = &self.inner.config_path {
            config.save_to_file(path)?;
        }
        self.inner.config.store(Arc::new(config));
        info!("Schedule configuration updated");

        if self.is_running() {
            self.stop();
            self.start();
        }
        Ok(())
    }
}

impl Drop for HealthScheduler {
    fn drop(&mut self) {
        self.timers
            .get_mut()
            .unwrap_or_else(|e| e.into_inner())
            .cancel_all();
    }
}

impl SchedulerInner {
    /// Full pipeline for one module. `None` when a scheduled tick was
    /// skipped because the module is still running.
    async fn run_check(&self, module: &str, trigger: Trigger) -> Option<HealthCheckResult> {
        let _guard = match trigger {
            Trigger::Scheduled => {
                let Some(guard) = self.in_flight.try_enter(module) else {
                    debug!(module = %module, "Previous check still running, tick skipped");
                    return None;
                };
                guard
            }
            Trigger::Manual => self.in_flight.enter(module),
        };

        let config = self.config.load_full();
        let result = self.probe(module, &config).await;

        if let Err(e) = self.store.store_result(&result) {
            error!(module = %module, error = %e, "Failed to persist check result");
        }

        info!(
            module = %module,
            score = result.score,
            status = %result.status,
            elapsed_ms = result.execution_time_ms,
            "Health check completed"
        );

        if config.alerts_enabled {
            if let Some(alert) = alerts::result_alert(&result, &config.alert_channels) {
                let delivered = self.notifier.notify_admins(&alert).await;
                debug!(module = %module, delivered, "Alert dispatched");
            }
        }

        if trigger == Trigger::Scheduled && result.status.is_critical() {
            let handler = self
                .critical_handler
                .read()
                .unwrap_or_else(|e| e.into_inner())
                .clone();
            if let Some(handler) = handler {
                handler.on_critical(&result).await;
            }
        }

        Some(result)
    }

    /// Invoke the provider and normalize its answer.
    async fn probe(&self, module: &str, config: &ScheduleConfig) -> HealthCheckResult {
        let started = Instant::now();
        match self.provider.check(module).await {
            Ok(mut result) => {
                result.module = module.to_string();
                result.timestamp = self.clock.now();
                result.execution_time_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
                result.score = result.score.min(crate::types::MAX_SCORE);
                result.status = config.alert_thresholds.classify(result.score);
                result
            }
            Err(e) => {
                warn!(module = %module, error = %e, "Health check failed to execute");
                HealthCheckResult::probe_failure(module, self.clock.now(), &e.to_string())
            }
        }
    }

    async fn run_sweep(&self, trigger: Trigger) -> Vec<HealthCheckResult> {
        let config = self.config.load_full();
        let modules: Vec<&String> = config.module_intervals.keys().collect();
        info!(modules = modules.len(), "Running health check sweep");

        let results: Vec<HealthCheckResult> = join_all(modules.iter().map(|m| self.run_check(m, trigger)))
            .await
            .into_iter()
            .flatten()
            .collect();

        if results.is_empty() {
            return results;
        }

        let mean = results.iter().map(|r| f64::from(r.score)).sum::<f64>() / results.len() as f64;
        info!(checked = results.len(), average_score = mean, "Sweep completed");

        if config.alerts_enabled && mean < f64::from(config.alert_thresholds.critical_score) {
            let alert = alerts::system_critical_alert(mean, &results, &config.alert_channels);
            self.notifier.notify_admins(&alert).await;
        }

        results
    }

    fn cleanup_old_results(&self) -> usize {
        let retention_days = self.config.load().retention_days;
        let cutoff = self.clock.now() - ChronoDuration::days(i64::from(retention_days));
        match self.store.delete_results_before(cutoff) {
            Ok(deleted) => {
                info!(deleted, retention_days, "Old health check results purged");
                deleted
            }
            Err(e) => {
                error!(error = %e, "Retention sweep failed");
                0
            }
        }
    }
}
