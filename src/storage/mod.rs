//! Result Storage
//!
//! Append-only persistence for check results, remediation attempts and
//! performance snapshots, plus the auxiliary collections (sessions,
//! notifications, audit) that cleanup actions and report auditing touch.
//!
//! Backends:
//! - [`SledStore`]: durable, one sled tree per collection, keyed by
//!   big-endian timestamp so range scans come back in time order
//! - [`InMemoryStore`]: tests and ephemeral runs

mod memory;
mod sled_store;
pub mod lockfile;

pub use lockfile::ProcessLock;
pub use memory::InMemoryStore;
pub use sled_store::SledStore;

use chrono::{DateTime, Utc};

use crate::types::{HealthCheckResult, PerformanceSnapshot, RemediationAttempt};

/// Trait for pluggable persistence backends
///
/// Implementations must be thread-safe (Send + Sync) for shared access
/// across async tasks. Range queries are half-open `[start, end)` and return
/// records in ascending timestamp order.
pub trait ResultStore: Send + Sync {
    fn store_result(&self, result: &HealthCheckResult) -> Result<(), StoreError>;

    fn results_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HealthCheckResult>, StoreError>;

    /// Most recent results, newest first
    fn recent_results(&self, limit: usize) -> Result<Vec<HealthCheckResult>, StoreError>;

    /// Delete results strictly older than `cutoff`, returning how many went
    fn delete_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;

    fn store_attempt(&self, attempt: &RemediationAttempt) -> Result<(), StoreError>;

    fn attempts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemediationAttempt>, StoreError>;

    fn store_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<(), StoreError>;

    fn snapshots_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PerformanceSnapshot>, StoreError>;

    /// Append a free-form entry to an auxiliary collection
    fn record_auxiliary(
        &self,
        collection: AuxCollection,
        at: DateTime<Utc>,
        entry: &serde_json::Value,
    ) -> Result<(), StoreError>;

    /// Entries of an auxiliary collection, oldest first
    fn auxiliary_entries(
        &self,
        collection: AuxCollection,
    ) -> Result<Vec<(DateTime<Utc>, serde_json::Value)>, StoreError>;

    /// Delete auxiliary entries strictly older than `cutoff`
    fn purge_auxiliary(
        &self,
        collection: AuxCollection,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError>;

    /// Backend name for logging
    fn backend_name(&self) -> &'static str;
}

/// Secondary collections owned by the wider platform
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuxCollection {
    /// User sessions, timestamped by last activity
    Sessions,
    Notifications,
    /// Audit trail of report generation and other administrative actions
    Audit,
}

impl AuxCollection {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Sessions => "sessions",
            Self::Notifications => "notifications",
            Self::Audit => "audit",
        }
    }
}

impl std::fmt::Display for AuxCollection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Storage errors
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<sled::Error> for StoreError {
    fn from(e: sled::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Order-preserving 8-byte key prefix for a timestamp.
///
/// Nanoseconds since the epoch with the sign bit flipped, so pre-epoch
/// instants still sort before post-epoch ones.
pub(crate) fn time_key(at: DateTime<Utc>) -> [u8; 8] {
    let nanos = at
        .timestamp_nanos_opt()
        .unwrap_or_else(|| at.timestamp().saturating_mul(1_000_000_000));
    #[allow(clippy::cast_sign_loss)]
    let biased = (nanos as u64) ^ (1 << 63);
    biased.to_be_bytes()
}
