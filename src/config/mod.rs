//! Configuration Module
//!
//! Three documents, all TOML:
//!
//! - [`EngineConfig`]: process-level settings (paths, performance monitor,
//!   remediation commands, report layout, administrators). Loaded once.
//! - [`ScheduleConfig`]: cadences, thresholds and retention. Rewritten at
//!   runtime by `update_config`.
//! - [`RuleSet`]: remediation rules. Rewritten by rule management calls.
//!
//! ## Loading Order (engine config)
//!
//! 1. `HEALTH_SENTINEL_CONFIG` environment variable (path to TOML file)
//! 2. `health_sentinel.toml` in the current working directory
//! 3. Built-in defaults

pub mod defaults;
mod engine;
mod rules;
mod schedule;

pub use engine::{
    ConfigError, EngineConfig, PathsConfig, PerformanceConfig, PerformanceThresholds,
    ProbeConfig, RemediationConfig, ReportConfig,
};
pub use rules::{default_rules, RuleSet};
pub use schedule::{AlertThresholds, ScheduleConfig};
