//! Performance snapshot types collected by the performance monitor

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CpuMetrics {
    /// Global CPU usage (0-100%)
    pub usage_pct: f64,
    /// 1, 5 and 15 minute load averages
    pub load: [f64; 3],
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MemoryMetrics {
    pub total_bytes: u64,
    pub used_bytes: u64,
    pub free_bytes: u64,
    /// Used / total (0-100%)
    pub percentage: f64,
}

/// Datastore load, approximated from recent check execution times
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DatabaseMetrics {
    /// Module checks currently in flight
    pub active_connections: u32,
    pub avg_query_time_ms: f64,
    pub slow_query_count: u32,
}

/// API responsiveness, approximated from check volume in the last minute
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApiMetrics {
    pub response_time_ms: f64,
    pub requests_per_minute: u32,
    pub error_rate_pct: f64,
}

/// Health-check throughput over the last hour
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CheckThroughput {
    pub avg_execution_time_ms: f64,
    pub checks_per_hour: u32,
    pub failure_rate_pct: f64,
}

/// One sample of system, datastore, API and check metrics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceSnapshot {
    pub timestamp: DateTime<Utc>,
    pub cpu: CpuMetrics,
    pub memory: MemoryMetrics,
    pub database: DatabaseMetrics,
    pub api: ApiMetrics,
    pub health_checks: CheckThroughput,
}

impl PerformanceSnapshot {
    /// Zeroed snapshot at `timestamp`
    pub fn empty(timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            cpu: CpuMetrics::default(),
            memory: MemoryMetrics::default(),
            database: DatabaseMetrics::default(),
            api: ApiMetrics::default(),
            health_checks: CheckThroughput::default(),
        }
    }
}
