//! Sliding-window attempt throttle, keyed by rule id.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashMap;
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct AttemptThrottle {
    attempts: Mutex<HashMap<String, Vec<DateTime<Utc>>>>,
}

impl AttemptThrottle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim an attempt slot for `rule_id` at `now`.
    ///
    /// Prunes attempts that are `cooldown_minutes` or more in the past, then
    /// records `now` and returns true if fewer than `max_attempts` remain.
    /// Pruning, counting and recording happen under one lock.
    pub fn try_acquire(
        &self,
        rule_id: &str,
        max_attempts: u32,
        cooldown_minutes: u32,
        now: DateTime<Utc>,
    ) -> bool {
        let window = Duration::minutes(i64::from(cooldown_minutes));
        let mut attempts = self.attempts.lock().unwrap_or_else(|e| e.into_inner());
        let history = attempts.entry(rule_id.to_string()).or_default();
        history.retain(|t| now - *t < window);

        if history.len() >= max_attempts as usize {
            return false;
        }
        history.push(now);
        true
    }

    /// Attempts still inside the window for `rule_id` as of the last claim
    pub fn recent(&self, rule_id: &str) -> usize {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(rule_id)
            .map_or(0, Vec::len)
    }

    /// Forget the history of a rule (used when the rule is removed)
    pub fn forget(&self, rule_id: &str) {
        self.attempts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(rule_id);
    }
}
