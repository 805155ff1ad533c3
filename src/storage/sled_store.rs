//! Sled-backed result store

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info, warn};

use super::{time_key, AuxCollection, ResultStore, StoreError};
use crate::types::{HealthCheckResult, PerformanceSnapshot, RemediationAttempt};

const RESULTS_TREE: &str = "check_results";
const ATTEMPTS_TREE: &str = "remediation_attempts";
const SNAPSHOTS_TREE: &str = "performance_snapshots";

/// Durable store, one tree per collection.
///
/// Keys are `time_key(timestamp) ++ discriminator` where the discriminator is
/// the module name for results and attempts and a sled-generated id
/// elsewhere, so same-instant records never overwrite each other.
#[derive(Clone)]
pub struct SledStore {
    db: sled::Db,
    results: sled::Tree,
    attempts: sled::Tree,
    snapshots: sled::Tree,
    sessions: sled::Tree,
    notifications: sled::Tree,
    audit: sled::Tree,
}

impl SledStore {
    /// Open or create the database at `path`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref();
        let db = sled::open(path)?;
        let store = Self {
            results: db.open_tree(RESULTS_TREE)?,
            attempts: db.open_tree(ATTEMPTS_TREE)?,
            snapshots: db.open_tree(SNAPSHOTS_TREE)?,
            sessions: db.open_tree(AuxCollection::Sessions.as_str())?,
            notifications: db.open_tree(AuxCollection::Notifications.as_str())?,
            audit: db.open_tree(AuxCollection::Audit.as_str())?,
            db,
        };
        info!(path = %path.display(), results = store.results.len(), "Result store opened");
        Ok(store)
    }

    /// Temporary database for tests; removed when dropped
    pub fn temporary() -> Result<Self, StoreError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self {
            results: db.open_tree(RESULTS_TREE)?,
            attempts: db.open_tree(ATTEMPTS_TREE)?,
            snapshots: db.open_tree(SNAPSHOTS_TREE)?,
            sessions: db.open_tree(AuxCollection::Sessions.as_str())?,
            notifications: db.open_tree(AuxCollection::Notifications.as_str())?,
            audit: db.open_tree(AuxCollection::Audit.as_str())?,
            db,
        })
    }

    pub fn flush(&self) -> Result<(), StoreError> {
        self.db.flush()?;
        Ok(())
    }

    fn aux_tree(&self, collection: AuxCollection) -> &sled::Tree {
        match collection {
            AuxCollection::Sessions => &self.sessions,
            AuxCollection::Notifications => &self.notifications,
            AuxCollection::Audit => &self.audit,
        }
    }

    fn unique_suffix(&self) -> Result<[u8; 8], StoreError> {
        Ok(self.db.generate_id()?.to_be_bytes())
    }

    fn insert<T: Serialize>(
        tree: &sled::Tree,
        at: DateTime<Utc>,
        suffix: &[u8],
        value: &T,
    ) -> Result<(), StoreError> {
        let mut key = time_key(at).to_vec();
        key.extend_from_slice(suffix);
        let bytes = serde_json::to_vec(value)?;
        tree.insert(key, bytes)?;
        Ok(())
    }

    /// Decode every record in `[start, end)`, skipping corrupt entries.
    fn scan<T: DeserializeOwned>(
        tree: &sled::Tree,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<T>, StoreError> {
        if start >= end {
            return Ok(Vec::new());
        }
        let mut out = Vec::new();
        for item in tree.range(time_key(start)..time_key(end)) {
            let (_key, value) = item?;
            match serde_json::from_slice::<T>(&value) {
                Ok(record) => out.push(record),
                Err(e) => warn!(tree = ?tree.name(), error = %e, "Skipping corrupt record"),
            }
        }
        Ok(out)
    }

    /// Delete every key whose time prefix is older than `cutoff`.
    fn purge(tree: &sled::Tree, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff_key = time_key(cutoff);
        let mut keys_to_delete = Vec::new();
        for item in tree.range(..cutoff_key) {
            let (key, _value) = item?;
            keys_to_delete.push(key);
        }
        let deleted = keys_to_delete.len();
        for key in keys_to_delete {
            tree.remove(key)?;
        }
        Ok(deleted)
    }
}

impl ResultStore for SledStore {
    fn store_result(&self, result: &HealthCheckResult) -> Result<(), StoreError> {
        let mut suffix = result.module.as_bytes().to_vec();
        suffix.extend_from_slice(&self.unique_suffix()?);
        Self::insert(&self.results, result.timestamp, &suffix, result)?;
        debug!(module = %result.module, score = result.score, status = %result.status, "Stored check result");
        Ok(())
    }

    fn results_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HealthCheckResult>, StoreError> {
        Self::scan(&self.results, start, end)
    }

    fn recent_results(&self, limit: usize) -> Result<Vec<HealthCheckResult>, StoreError> {
        let mut out = Vec::with_capacity(limit.min(1_024));
        for item in self.results.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_key, value) = item?;
            match serde_json::from_slice::<HealthCheckResult>(&value) {
                Ok(result) => out.push(result),
                Err(e) => {
                    warn!(error = %e, "Skipping corrupt check result");
                    continue;
                }
            }
        }
        Ok(out)
    }

    fn delete_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let deleted = Self::purge(&self.results, cutoff)?;
        if deleted > 0 {
            self.results.flush()?;
        }
        Ok(deleted)
    }

    fn store_attempt(&self, attempt: &RemediationAttempt) -> Result<(), StoreError> {
        let mut suffix = attempt.rule_id.as_bytes().to_vec();
        suffix.extend_from_slice(&self.unique_suffix()?);
        Self::insert(&self.attempts, attempt.timestamp, &suffix, attempt)
    }

    fn attempts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemediationAttempt>, StoreError> {
        Self::scan(&self.attempts, start, end)
    }

    fn store_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<(), StoreError> {
        let suffix = self.unique_suffix()?;
        Self::insert(&self.snapshots, snapshot.timestamp, &suffix, snapshot)
    }

    fn snapshots_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PerformanceSnapshot>, StoreError> {
        Self::scan(&self.snapshots, start, end)
    }

    fn record_auxiliary(
        &self,
        collection: AuxCollection,
        at: DateTime<Utc>,
        entry: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let suffix = self.unique_suffix()?;
        let record = AuxRecord {
            at,
            entry: entry.clone(),
        };
        Self::insert(self.aux_tree(collection), at, &suffix, &record)
    }

    fn auxiliary_entries(
        &self,
        collection: AuxCollection,
    ) -> Result<Vec<(DateTime<Utc>, serde_json::Value)>, StoreError> {
        let mut out = Vec::new();
        for item in self.aux_tree(collection).iter() {
            let (_key, value) = item?;
            match serde_json::from_slice::<AuxRecord>(&value) {
                Ok(record) => out.push((record.at, record.entry)),
                Err(e) => warn!(collection = %collection, error = %e, "Skipping corrupt entry"),
            }
        }
        Ok(out)
    }

    fn purge_auxiliary(
        &self,
        collection: AuxCollection,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        Self::purge(self.aux_tree(collection), cutoff)
    }

    fn backend_name(&self) -> &'static str {
        "sled"
    }
}

#[derive(serde::Serialize, serde::Deserialize)]
struct AuxRecord {
    at: DateTime<Utc>,
    entry: serde_json::Value,
}
