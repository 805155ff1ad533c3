//! Performance Monitor
//!
//! Fixed-interval collector, independent of the check schedule. Each tick
//! samples the host, derives datastore / API / check-throughput figures from
//! persisted check results, appends the snapshot to a bounded ring buffer
//! and persists it best-effort.
//!
//! Threshold breaches log a warning on every tick; there is no
//! deduplication, so a sustained breach repeats.

mod system;

pub use system::{SysinfoSampler, SystemSampler};

use arc_swap::ArcSwap;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use crate::config::{defaults, PerformanceConfig};
use crate::scheduler::InFlight;
use crate::schedule::{Clock, Recurrence, RecurringTimer};
use crate::storage::ResultStore;
use crate::types::{
    ApiMetrics, CheckThroughput, DatabaseMetrics, HealthCheckResult, HealthStatus, PerformanceSnapshot,
};

/// Push a value while maintaining a maximum size
trait BoundedPush<T> {
    fn push_bounded(&mut self, value: T, max_size: usize);
}

impl<T> BoundedPush<T> for VecDeque<T> {
    #[inline]
    fn push_bounded(&mut self, value: T, max_size: usize) {
        while self.len() >= max_size.max(1) {
            self.pop_front();
        }
        self.push_back(value);
    }
}

// ============================================================================
// Aggregates
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spread {
    pub avg: f64,
    pub min: f64,
    pub max: f64,
}

impl Spread {
    fn of(values: &[f64]) -> Self {
        Self {
            avg: Statistics::mean(values).round(),
            min: Statistics::min(values),
            max: Statistics::max(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiAggregate {
    pub avg_response_time_ms: f64,
    pub total_requests: u64,
    pub avg_error_rate_pct: f64,
}

/// Summary of the in-memory snapshots inside a trailing window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    pub window_minutes: u32,
    pub samples: usize,
    pub cpu: Spread,
    pub memory: Spread,
    pub api: ApiAggregate,
}

// ============================================================================
// Monitor
// ============================================================================

pub struct PerformanceMonitor {
    inner: Arc<MonitorInner>,
    timer: Mutex<Option<RecurringTimer>>,
}

struct MonitorInner {
    config: ArcSwap<PerformanceConfig>,
    store: Arc<dyn ResultStore>,
    clock: Arc<dyn Clock>,
    sampler: Arc<dyn SystemSampler>,
    in_flight: InFlight,
    history: Mutex<VecDeque<PerformanceSnapshot>>,
}

impl PerformanceMonitor {
    pub fn new(
        config: PerformanceConfig,
        store: Arc<dyn ResultStore>,
        clock: Arc<dyn Clock>,
        sampler: Arc<dyn SystemSampler>,
        in_flight: InFlight,
    ) -> Self {
        let capacity = config.history_capacity;
        Self {
            inner: Arc::new(MonitorInner {
                config: ArcSwap::from_pointee(config),
                store,
                clock,
                sampler,
                in_flight,
                history: Mutex::new(VecDeque::with_capacity(capacity.min(defaults::PERFORMANCE_HISTORY_CAPACITY))),
            }),
            timer: Mutex::new(None),
        }
    }

    pub fn config(&self) -> Arc<PerformanceConfig> {
        self.inner.config.load_full()
    }

    pub fn is_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }

    /// Start collecting on the configured interval. No-op when running.
    pub fn start(&self) {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.is_some() {
            debug!("Performance monitor already running");
            return;
        }
        let config = self.config();
        let inner = Arc::clone(&self.inner);
        *timer = Some(RecurringTimer::spawn(
            "performance-monitor",
            Recurrence::Interval(config.interval()),
            Arc::clone(&self.inner.clock),
            move || {
                let inner = Arc::clone(&inner);
                async move {
                    inner.collect();
                }
            },
        ));
        info!(interval_secs = config.interval_secs, "Performance monitor started");
    }

    /// Stop collecting. Idempotent.
    pub fn stop(&self) {
        if let Some(timer) = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take() {
            timer.cancel();
            info!("Performance monitor stopped");
        }
    }

    /// Apply new settings, trimming the buffer and restarting when running.
    pub fn update_config(&self, config: PerformanceConfig) {
        let capacity = config.history_capacity.max(1);
        self.inner.config.store(Arc::new(config));
        {
            let mut history = self.inner.history.lock().unwrap_or_else(|e| e.into_inner());
            while history.len() > capacity {
                history.pop_front();
            }
        }
        info!(capacity, "Performance monitor configuration updated");

        if self.is_running() {
            self.stop();
            self.start();
        }
    }

    /// Collect one snapshot now.
    pub fn collect(&self) -> PerformanceSnapshot {
        self.inner.collect()
    }

    /// Latest snapshot, collecting one when the buffer is empty.
    pub fn current(&self) -> PerformanceSnapshot {
        let latest = self
            .inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .back()
            .cloned();
        latest.unwrap_or_else(|| self.inner.collect())
    }

    /// In-memory snapshots, oldest first
    pub fn snapshots(&self) -> Vec<PerformanceSnapshot> {
        self.inner
            .history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .iter()
            .cloned()
            .collect()
    }

    /// avg/min/max over in-memory snapshots from the last `window_minutes`.
    /// `None` when the window holds no samples.
    pub fn aggregate_stats(&self, window_minutes: u32) -> Option<AggregateStats> {
        let cutoff = self.inner.clock.now() - ChronoDuration::minutes(i64::from(window_minutes));
        let history = self.inner.history.lock().unwrap_or_else(|e| e.into_inner());
        let window: Vec<&PerformanceSnapshot> = history.iter().filter(|s| s.timestamp >= cutoff).collect();
        if window.is_empty() {
            return None;
        }

        let cpu: Vec<f64> = window.iter().map(|s| s.cpu.usage_pct).collect();
        let memory: Vec<f64> = window.iter().map(|s| s.memory.percentage).collect();
        let response: Vec<f64> = window.iter().map(|s| s.api.response_time_ms).collect();
        let error_rate: Vec<f64> = window.iter().map(|s| s.api.error_rate_pct).collect();

        Some(AggregateStats {
            window_minutes,
            samples: window.len(),
            cpu: Spread::of(&cpu),
            memory: Spread::of(&memory),
            api: ApiAggregate {
                avg_response_time_ms: Statistics::mean(&response).round(),
                total_requests: window.iter().map(|s| u64::from(s.api.requests_per_minute)).sum(),
                avg_error_rate_pct: Statistics::mean(&error_rate).round(),
            },
        })
    }

    /// Snapshots with `start <= timestamp <= end`.
    ///
    /// Served from memory when the buffer reaches back to `start`, otherwise
    /// from the store (falling back to memory if the store fails).
    pub fn history(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<PerformanceSnapshot> {
        let (covered, from_memory) = {
            let history = self.inner.history.lock().unwrap_or_else(|e| e.into_inner());
            let covered = history.front().is_some_and(|oldest| oldest.timestamp <= start);
            let filtered: Vec<PerformanceSnapshot> = history
                .iter()
                .filter(|s| s.timestamp >= start && s.timestamp <= end)
                .cloned()
                .collect();
            (covered, filtered)
        };
        if covered {
            return from_memory;
        }

        match self
            .inner
            .store
            .snapshots_between(start, end + ChronoDuration::nanoseconds(1))
        {
            Ok(persisted) if !persisted.is_empty() => persisted,
            Ok(_) => from_memory,
            Err(e) => {
                warn!(error = %e, "Snapshot history unavailable from store, serving memory");
                from_memory
            }
        }
    }
}

impl Drop for PerformanceMonitor {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.get_mut().unwrap_or_else(|e| e.into_inner()).take() {
            timer.cancel();
        }
    }
}

impl MonitorInner {
    fn collect(&self) -> PerformanceSnapshot {
        let now = self.clock.now();
        let config = self.config.load_full();

        let mut snapshot = PerformanceSnapshot::empty(now);
        snapshot.cpu = self.sampler.cpu();
        snapshot.memory = self.sampler.memory();
        snapshot.database = self.database_metrics();
        snapshot.api = self.api_metrics(now);
        snapshot.health_checks = self.check_throughput(now);

        self.history
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push_bounded(snapshot.clone(), config.history_capacity);

        if let Err(e) = self.store.store_snapshot(&snapshot) {
            warn!(error = %e, "Failed to persist performance snapshot");
        }

        self.check_thresholds(&snapshot, &config);
        debug!(
            cpu = snapshot.cpu.usage_pct,
            memory = snapshot.memory.percentage,
            checks_per_hour = snapshot.health_checks.checks_per_hour,
            "Performance snapshot collected"
        );
        snapshot
    }

    /// Datastore load from the execution times of the most recent results
    fn database_metrics(&self) -> DatabaseMetrics {
        let recent = match self.store.recent_results(defaults::RECENT_CHECK_SAMPLE) {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Database metrics unavailable");
                Vec::new()
            }
        };
        DatabaseMetrics {
            active_connections: u32::try_from(self.in_flight.total()).unwrap_or(u32::MAX),
            avg_query_time_ms: mean_execution_ms(&recent),
            slow_query_count: count_u32(recent.iter().filter(|r| r.execution_time_ms > defaults::SLOW_QUERY_MS)),
        }
    }

    /// API responsiveness from check volume and failures in the last minute
    fn api_metrics(&self, now: DateTime<Utc>) -> ApiMetrics {
        let window = self.results_since(now - ChronoDuration::minutes(1), now);
        ApiMetrics {
            response_time_ms: mean_execution_ms(&window),
            requests_per_minute: count_u32(window.iter()),
            error_rate_pct: critical_rate(&window),
        }
    }

    /// Check throughput over the last hour
    fn check_throughput(&self, now: DateTime<Utc>) -> CheckThroughput {
        let window = self.results_since(now - ChronoDuration::hours(1), now);
        CheckThroughput {
            avg_execution_time_ms: mean_execution_ms(&window).round(),
            checks_per_hour: count_u32(window.iter()),
            failure_rate_pct: critical_rate(&window).round(),
        }
    }

    fn results_since(&self, start: DateTime<Utc>, now: DateTime<Utc>) -> Vec<HealthCheckResult> {
        match self
            .store
            .results_between(start, now + ChronoDuration::nanoseconds(1))
        {
            Ok(r) => r,
            Err(e) => {
                warn!(error = %e, "Check results unavailable for performance metrics");
                Vec::new()
            }
        }
    }

    fn check_thresholds(&self, s: &PerformanceSnapshot, config: &PerformanceConfig) {
        let t = &config.thresholds;
        if s.cpu.usage_pct > t.cpu_usage_pct {
            warn!(cpu = s.cpu.usage_pct, threshold = t.cpu_usage_pct, "CPU usage high");
        }
        if s.memory.percentage > t.memory_usage_pct {
            warn!(memory = s.memory.percentage, threshold = t.memory_usage_pct, "Memory usage high");
        }
        if s.api.response_time_ms > t.response_time_ms {
            warn!(response_ms = s.api.response_time_ms, threshold = t.response_time_ms, "API response time slow");
        }
        if s.api.error_rate_pct > t.error_rate_pct {
            warn!(error_rate = s.api.error_rate_pct, threshold = t.error_rate_pct, "API error rate high");
        }
    }
}

fn mean_execution_ms(results: &[HealthCheckResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    results.iter().map(|r| r.execution_time_ms as f64).mean()
}

fn critical_rate(results: &[HealthCheckResult]) -> f64 {
    if results.is_empty() {
        return 0.0;
    }
    let critical = results.iter().filter(|r| r.status == HealthStatus::Critical).count();
    critical as f64 / results.len() as f64 * 100.0
}

fn count_u32<I: Iterator>(iter: I) -> u32 {
    u32::try_from(iter.count()).unwrap_or(u32::MAX)
}
