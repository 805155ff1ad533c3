//! Report Generator
//!
//! Aggregates persisted check results over a period into per-module
//! statistics, trend and incidents, renders them and distributes the
//! artifact to administrators.

mod generator;
mod render;
mod stats;

pub use generator::{previous_week, GeneratedReport, ReportFile, ReportGenerator};
pub use render::{csv_field, render, ReportFormat};
pub use stats::{
    incidents, module_stats, overall_health, recommendations, uptime_pct, Incident, ModuleStats, ReportData, Trend,
};

use chrono::{DateTime, Utc};
use std::path::PathBuf;

use crate::storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("unknown report format '{0}' (expected markdown, csv or json)")]
    UnknownFormat(String),
    #[error("invalid report range: {start} is not before {end}")]
    InvalidRange { start: DateTime<Utc>, end: DateTime<Utc> },
    #[error("failed to read results: {0}")]
    Store(#[from] StoreError),
    #[error("failed to write report {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}
