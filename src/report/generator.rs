//! Report generation, persistence and distribution

use chrono::{DateTime, Datelike, Duration, NaiveTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::render::{render, ReportFormat};
use super::stats::ReportData;
use super::ReportError;
use crate::config::{defaults, ReportConfig};
use crate::notify::{Notification, NotificationKind, Notifier, Priority};
use crate::schedule::Clock;
use crate::storage::{AuxCollection, ResultStore};

const FILE_PREFIX: &str = "health-report-";

/// A report written to the reports directory
#[derive(Debug, Clone, Serialize)]
pub struct GeneratedReport {
    pub filename: String,
    pub path: PathBuf,
    pub format: ReportFormat,
    pub size_bytes: u64,
    pub data: ReportData,
}

/// An entry of the report history
#[derive(Debug, Clone, Serialize)]
pub struct ReportFile {
    pub filename: String,
    pub path: PathBuf,
    pub size_bytes: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
}

pub struct ReportGenerator {
    store: Arc<dyn ResultStore>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    reports_dir: PathBuf,
    config: ReportConfig,
}

impl ReportGenerator {
    pub fn new(
        store: Arc<dyn ResultStore>,
        notifier: Notifier,
        clock: Arc<dyn Clock>,
        reports_dir: impl Into<PathBuf>,
        config: ReportConfig,
    ) -> Self {
        Self {
            store,
            notifier,
            clock,
            reports_dir: reports_dir.into(),
            config,
        }
    }

    pub fn reports_dir(&self) -> &Path {
        &self.reports_dir
    }

    pub fn default_format(&self) -> ReportFormat {
        self.config.default_format
    }

    /// Compute report data for `[start, end)` against the preceding period of
    /// equal length.
    pub fn build(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Result<ReportData, ReportError> {
        if end <= start {
            return Err(ReportError::InvalidRange { start, end });
        }
        let current = self.store.results_between(start, end)?;
        let previous = self.store.results_between(start - (end - start), start)?;
        Ok(ReportData::build(start, end, self.clock.now(), &current, &previous))
    }

    /// Generate the report for the Monday-start week before the current one.
    pub async fn generate_weekly_report(&self) -> Option<GeneratedReport> {
        let (start, end) = previous_week(self.clock.now());
        let filename = format!(
            "{FILE_PREFIX}{}.{}",
            start.format("%Y-%m-%d"),
            self.config.default_format.extension()
        );
        self.generate_audited(start, end, self.config.default_format, filename, "weekly-schedule")
            .await
    }

    /// Generate a report for `[start, end)`.
    ///
    /// Failures are logged and audited; the caller only sees `None`.
    pub async fn generate_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        format: ReportFormat,
        triggered_by: &str,
    ) -> Option<GeneratedReport> {
        let filename = format!(
            "{FILE_PREFIX}{}-to-{}.{}",
            start.format("%Y-%m-%d"),
            end.format("%Y-%m-%d"),
            format.extension()
        );
        self.generate_audited(start, end, format, filename, triggered_by).await
    }

    async fn generate_audited(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        format: ReportFormat,
        filename: String,
        triggered_by: &str,
    ) -> Option<GeneratedReport> {
        let started = Instant::now();
        self.audit(json!({
            "action": "HEALTH_REPORT_GENERATION_START",
            "triggered_by": triggered_by,
            "start": start,
            "end": end,
            "format": format,
        }));
        info!(%start, %end, %format, "Generating health report");

        match self.write_report(start, end, format, filename).await {
            Ok(report) => {
                let elapsed_ms = elapsed_ms(started);
                self.audit(json!({
                    "action": "HEALTH_REPORT_GENERATION_SUCCESS",
                    "triggered_by": triggered_by,
                    "filename": report.filename,
                    "size_bytes": report.size_bytes,
                    "start": start,
                    "end": end,
                    "format": format,
                    "execution_time_ms": elapsed_ms,
                }));
                info!(
                    file = %report.filename,
                    size_kb = report.size_bytes.div_ceil(1024),
                    elapsed_ms,
                    "Report generated"
                );
                self.distribute(&report).await;
                Some(report)
            }
            Err(e) => {
                self.audit(json!({
                    "action": "HEALTH_REPORT_GENERATION_FAILED",
                    "triggered_by": triggered_by,
                    "start": start,
                    "end": end,
                    "format": format,
                    "error": e.to_string(),
                    "execution_time_ms": elapsed_ms(started),
                }));
                error!(error = %e, "Report generation failed");
                None
            }
        }
    }

    async fn write_report(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        format: ReportFormat,
        filename: String,
    ) -> Result<GeneratedReport, ReportError> {
        let data = self.build(start, end)?;
        let body = render(&data, format, self.config.rows_per_page)?;

        tokio::fs::create_dir_all(&self.reports_dir)
            .await
            .map_err(|source| ReportError::Io {
                path: self.reports_dir.clone(),
                source,
            })?;
        let path = self.reports_dir.join(&filename);
        tokio::fs::write(&path, body.as_bytes())
            .await
            .map_err(|source| ReportError::Io {
                path: path.clone(),
                source,
            })?;

        Ok(GeneratedReport {
            filename,
            path,
            format,
            size_bytes: body.len() as u64,
            data,
        })
    }

    async fn distribute(&self, report: &GeneratedReport) {
        let notification = Notification::new(
            NotificationKind::HealthReport,
            Priority::Normal,
            "Health Check Report",
            format!(
                "The health check report for {} - {} is available.",
                report.data.period_start.format("%Y-%m-%d"),
                report.data.period_end.format("%Y-%m-%d")
            ),
        )
        .with_data(json!({
            "report_path": report.path,
            "filename": report.filename,
            "period_start": report.data.period_start,
            "overall_health": report.data.overall_health,
        }))
        .with_channels(defaults::ALERT_CHANNELS.iter().map(|c| (*c).to_string()).collect());

        let delivered = self.notifier.notify_admins(&notification).await;
        info!(recipients = delivered, "Report sent to administrators");
    }

    fn audit(&self, entry: serde_json::Value) {
        if let Err(e) = self
            .store
            .record_auxiliary(AuxCollection::Audit, self.clock.now(), &entry)
        {
            warn!(error = %e, "Failed to record report audit entry");
        }
    }

    /// Generated reports, most recently modified first.
    pub fn report_history(&self) -> Vec<ReportFile> {
        let entries = match std::fs::read_dir(&self.reports_dir) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(dir = %self.reports_dir.display(), error = %e, "No report history");
                return Vec::new();
            }
        };

        let mut reports: Vec<ReportFile> = entries
            .filter_map(Result::ok)
            .filter_map(|entry| {
                let filename = entry.file_name().to_string_lossy().into_owned();
                if !is_report_file(&filename) {
                    return None;
                }
                let meta = entry.metadata().ok()?;
                if !meta.is_file() {
                    return None;
                }
                Some(ReportFile {
                    path: entry.path(),
                    size_bytes: meta.len(),
                    created: meta.created().ok().map(DateTime::<Utc>::from),
                    modified: meta.modified().ok().map_or_else(Utc::now, DateTime::<Utc>::from),
                    filename,
                })
            })
            .collect();

        reports.sort_by(|a, b| b.modified.cmp(&a.modified));
        reports
    }

    /// Path of a generated report, `None` if missing or not a plain file name.
    pub fn report_path(&self, filename: &str) -> Option<PathBuf> {
        if Path::new(filename).file_name().and_then(|n| n.to_str()) != Some(filename) {
            warn!(filename, "Rejected report lookup outside the reports directory");
            return None;
        }
        let path = self.reports_dir.join(filename);
        if path.is_file() {
            Some(path)
        } else {
            debug!(filename, "Report file not found");
            None
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

fn is_report_file(name: &str) -> bool {
    name.starts_with(FILE_PREFIX)
        && [ReportFormat::Markdown, ReportFormat::Csv, ReportFormat::Json]
            .iter()
            .any(|f| name.ends_with(&format!(".{}", f.extension())))
}

/// `[monday, next monday)` of the week before the one containing `now`.
pub fn previous_week(now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
    let today = now.date_naive();
    let this_monday = today - Duration::days(i64::from(today.weekday().num_days_from_monday()));
    let end = this_monday.and_time(NaiveTime::MIN).and_utc();
    (end - Duration::days(7), end)
}
