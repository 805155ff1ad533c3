//! Shared data structures for the health-check automation engine
//!
//! - `health`: HealthCheckResult and its status/sub-check vocabulary
//! - `rules`: RemediationRule, RuleCondition, ActionStep, RemediationAttempt
//! - `performance`: PerformanceSnapshot and its metric groups

mod health;
mod performance;
mod rules;

pub use health::*;
pub use performance::*;
pub use rules::*;
