//! System-wide default constants.
//!
//! Grouped by subsystem for easy discovery.

// ============================================================================
// Config discovery
// ============================================================================

/// Environment variable pointing at the engine TOML file.
pub const CONFIG_ENV_VAR: &str = "HEALTH_SENTINEL_CONFIG";

/// Engine config file looked up in the working directory.
pub const LOCAL_CONFIG_FILE: &str = "health_sentinel.toml";

/// Default data directory (sled database, schedule and rule documents, lock file).
pub const DATA_DIR: &str = "./data";

/// Default reports directory.
pub const REPORTS_DIR: &str = "./data/reports/health-checks";

/// Default remediation scripts directory.
pub const SCRIPTS_DIR: &str = "./scripts";

/// Schedule document name inside the data directory.
pub const SCHEDULE_FILE: &str = "schedule.toml";

/// Remediation rule document name inside the data directory.
pub const RULES_FILE: &str = "remediation_rules.toml";

/// Probe command for modules without an explicit entry
pub const PROBE_COMMAND_TEMPLATE: &str = "bash ./scripts/health-checks/{module}.sh";

// ============================================================================
// Scheduler
// ============================================================================

/// Full sweep cadence.
pub const GLOBAL_INTERVAL: &str = "*/30 * * * *";

/// Per-module cadences of the stock module catalogue.
pub const MODULE_INTERVALS: &[(&str, &str)] = &[
    ("auth-system", "*/15 * * * *"),
    ("database-health", "*/5 * * * *"),
    ("notification-system", "*/30 * * * *"),
    ("backup-system", "0 */6 * * *"),
    ("chat-system", "*/20 * * * *"),
    ("payment-system", "0 * * * *"),
    ("ai-system", "*/30 * * * *"),
    ("request-system", "*/15 * * * *"),
];

/// Score below which a result is critical.
pub const CRITICAL_SCORE: u8 = 60;

/// Score below which a result is a warning.
pub const WARNING_SCORE: u8 = 80;

/// Days of check results kept by the retention sweep.
pub const RETENTION_DAYS: u32 = 30;

/// Retention sweep time of day (UTC, hour and minute).
pub const RETENTION_SWEEP_AT: (u32, u32) = (2, 0);

/// Default alert delivery channels.
pub const ALERT_CHANNELS: &[&str] = &["email", "websocket"];

// ============================================================================
// Remediation
// ============================================================================

/// Delay between the last action and the verification re-check (seconds).
pub const SETTLE_DELAY_SECS: u64 = 5;

/// Sessions untouched for this long are removed by `old_sessions` cleanup.
pub const SESSION_RETENTION_DAYS: i64 = 30;

/// Notifications older than this are removed by `old_notifications` cleanup.
pub const NOTIFICATION_RETENTION_DAYS: i64 = 60;

// ============================================================================
// Performance Monitor
// ============================================================================

/// Collection interval (seconds).
pub const PERFORMANCE_INTERVAL_SECS: u64 = 60;

/// In-memory snapshot capacity. 1 440 = 24 hours at 60 s resolution.
pub const PERFORMANCE_HISTORY_CAPACITY: usize = 1_440;

/// Number of most recent check results used for datastore approximations.
pub const RECENT_CHECK_SAMPLE: usize = 100;

/// Check execution time above which a check counts as a slow query (ms).
pub const SLOW_QUERY_MS: u64 = 1_000;

pub const CPU_ALERT_PCT: f64 = 80.0;
pub const MEMORY_ALERT_PCT: f64 = 85.0;
pub const RESPONSE_TIME_ALERT_MS: f64 = 1_000.0;
pub const ERROR_RATE_ALERT_PCT: f64 = 5.0;

// ============================================================================
// Reports
// ============================================================================

/// Weekly report trigger (Monday, UTC hour and minute).
pub const WEEKLY_REPORT_AT: (u32, u32) = (9, 0);

/// Module table rows per rendered page.
pub const REPORT_ROWS_PER_PAGE: usize = 25;

/// Maximum critical incidents listed per report.
pub const REPORT_MAX_INCIDENTS: usize = 10;

/// Modules averaging below this need immediate attention.
pub const ATTENTION_SCORE: f64 = 60.0;

/// Modules with uptime below this need stability work (%).
pub const LOW_UPTIME_PCT: u32 = 90;

// ============================================================================
// Orchestrator
// ============================================================================

/// Look-back window for the status snapshot (hours).
pub const STATUS_WINDOW_HOURS: i64 = 24;

/// Default on-demand report range (days).
pub const DEFAULT_REPORT_DAYS: i64 = 7;
