//! In-memory result store for tests and ephemeral runs
//!
//! Thread-safe via `RwLock`. Not durable: data is lost on restart.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::RwLock;

use super::{AuxCollection, ResultStore, StoreError};
use crate::types::{HealthCheckResult, PerformanceSnapshot, RemediationAttempt};

#[derive(Default)]
pub struct InMemoryStore {
    results: RwLock<Vec<HealthCheckResult>>,
    attempts: RwLock<Vec<RemediationAttempt>>,
    snapshots: RwLock<Vec<PerformanceSnapshot>>,
    auxiliary: RwLock<HashMap<AuxCollection, Vec<(DateTime<Utc>, serde_json::Value)>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

/// Insert keeping ascending timestamp order; equal timestamps keep arrival order.
fn insert_sorted<T: Clone>(vec: &mut Vec<T>, item: &T, at: DateTime<Utc>, ts: impl Fn(&T) -> DateTime<Utc>) {
    let idx = vec.partition_point(|existing| ts(existing) <= at);
    vec.insert(idx, item.clone());
}

fn in_range(at: DateTime<Utc>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    at >= start && at < end
}

fn poisoned<E: std::fmt::Display>(e: E) -> StoreError {
    StoreError::Storage(e.to_string())
}

impl ResultStore for InMemoryStore {
    fn store_result(&self, result: &HealthCheckResult) -> Result<(), StoreError> {
        let mut results = self.results.write().map_err(poisoned)?;
        insert_sorted(&mut results, result, result.timestamp, |r| r.timestamp);
        Ok(())
    }

    fn results_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<HealthCheckResult>, StoreError> {
        let results = self.results.read().map_err(poisoned)?;
        Ok(results
            .iter()
            .filter(|r| in_range(r.timestamp, start, end))
            .cloned()
            .collect())
    }

    fn recent_results(&self, limit: usize) -> Result<Vec<HealthCheckResult>, StoreError> {
        let results = self.results.read().map_err(poisoned)?;
        Ok(results.iter().rev().take(limit).cloned().collect())
    }

    fn delete_results_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut results = self.results.write().map_err(poisoned)?;
        let before = results.len();
        results.retain(|r| r.timestamp >= cutoff);
        Ok(before - results.len())
    }

    fn store_attempt(&self, attempt: &RemediationAttempt) -> Result<(), StoreError> {
        let mut attempts = self.attempts.write().map_err(poisoned)?;
        insert_sorted(&mut attempts, attempt, attempt.timestamp, |a| a.timestamp);
        Ok(())
    }

    fn attempts_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<RemediationAttempt>, StoreError> {
        let attempts = self.attempts.read().map_err(poisoned)?;
        Ok(attempts
            .iter()
            .filter(|a| in_range(a.timestamp, start, end))
            .cloned()
            .collect())
    }

    fn store_snapshot(&self, snapshot: &PerformanceSnapshot) -> Result<(), StoreError> {
        let mut snapshots = self.snapshots.write().map_err(poisoned)?;
        insert_sorted(&mut snapshots, snapshot, snapshot.timestamp, |s| s.timestamp);
        Ok(())
    }

    fn snapshots_between(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<Vec<PerformanceSnapshot>, StoreError> {
        let snapshots = self.snapshots.read().map_err(poisoned)?;
        Ok(snapshots
            .iter()
            .filter(|s| in_range(s.timestamp, start, end))
            .cloned()
            .collect())
    }

    fn record_auxiliary(
        &self,
        collection: AuxCollection,
        at: DateTime<Utc>,
        entry: &serde_json::Value,
    ) -> Result<(), StoreError> {
        let mut aux = self.auxiliary.write().map_err(poisoned)?;
        let entries = aux.entry(collection).or_default();
        insert_sorted(entries, &(at, entry.clone()), at, |(t, _)| *t);
        Ok(())
    }

    fn auxiliary_entries(
        &self,
        collection: AuxCollection,
    ) -> Result<Vec<(DateTime<Utc>, serde_json::Value)>, StoreError> {
        let aux = self.auxiliary.read().map_err(poisoned)?;
        Ok(aux.get(&collection).cloned().unwrap_or_default())
    }

    fn purge_auxiliary(
        &self,
        collection: AuxCollection,
        cutoff: DateTime<Utc>,
    ) -> Result<usize, StoreError> {
        let mut aux = self.auxiliary.write().map_err(poisoned)?;
        let Some(entries) = aux.get_mut(&collection) else {
            return Ok(0);
        };
        let before = entries.len();
        entries.retain(|(at, _)| *at >= cutoff);
        Ok(before - entries.len())
    }

    fn backend_name(&self) -> &'static str {
        "in-memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_out_of_order_inserts_come_back_sorted() {
        let store = InMemoryStore::new();
        let now = Utc::now();
        store
            .store_result(&HealthCheckResult::new("b", now, 20))
            .unwrap();
        store
            .store_result(&HealthCheckResult::new("a", now - Duration::minutes(5), 10))
            .unwrap();

        let all = store
            .results_between(now - Duration::hours(1), now + Duration::seconds(1))
            .unwrap();
        assert_eq!(all.iter().map(|r| r.module.as_str()).collect::<Vec<_>>(), vec!["a", "b"]);
        assert_eq!(store.recent_results(1).unwrap()[0].module, "b");
    }

    #[test]
    fn test_purge_missing_collection_is_zero() {
        let store = InMemoryStore::new();
        assert_eq!(
            store.purge_auxiliary(AuxCollection::Notifications, Utc::now()).unwrap(),
            0
        );
    }
}
