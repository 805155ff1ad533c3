//! Health Sentinel: health-check automation and self-healing engine
//!
//! Periodically probes named modules, persists standardized results, raises
//! threshold alerts, runs throttled remediation rules, samples host and
//! pipeline performance on its own cadence and synthesizes trend reports.
//!
//! ## Architecture
//!
//! - **Scheduler**: per-module timers, global sweep, retention sweep
//! - **Remediation Engine**: rule matching, sliding-window throttle, ordered actions, re-verification
//! - **Performance Monitor**: fixed-interval snapshots in a bounded ring buffer
//! - **Report Generator**: per-module statistics, trend, incidents, rendered artifacts
//! - **Orchestrator**: lifecycle and manual entry points over all of the above

pub mod config;
pub mod monitor;
pub mod notify;
pub mod orchestrator;
pub mod probe;
pub mod remediation;
pub mod report;
pub mod schedule;
pub mod scheduler;
pub mod storage;
pub mod types;

// Re-export configuration
pub use config::{EngineConfig, RuleSet, ScheduleConfig};

// Re-export commonly used types
pub use types::{
    ActionStep, HealthCheckResult, HealthStatus, PerformanceSnapshot, RemediationAction, RemediationAttempt,
    RemediationRule, RuleCondition,
};

// Re-export components
pub use monitor::PerformanceMonitor;
pub use orchestrator::{Collaborators, Orchestrator};
pub use remediation::RemediationEngine;
pub use report::{ReportFormat, ReportGenerator};
pub use scheduler::HealthScheduler;

// Re-export storage
pub use storage::{InMemoryStore, ResultStore, SledStore, StoreError};
