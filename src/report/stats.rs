//! Period statistics: per-module aggregates, trend, incidents, recommendations

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use std::collections::BTreeMap;

use crate::config::defaults;
use crate::types::{HealthCheckResult, HealthStatus};

/// Period-over-period direction of a module's average score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Trend {
    Improving,
    Stable,
    Degrading,
}

impl Trend {
    /// Compare unrounded period averages.
    pub fn between(current_avg: f64, previous_avg: f64) -> Self {
        if current_avg > previous_avg {
            Self::Improving
        } else if current_avg < previous_avg {
            Self::Degrading
        } else {
            Self::Stable
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Stable => "stable",
            Self::Degrading => "degrading",
        }
    }

    pub fn arrow(self) -> &'static str {
        match self {
            Self::Improving => "↑",
            Self::Stable => "→",
            Self::Degrading => "↓",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleStats {
    pub module: String,
    pub avg_score: u8,
    pub min_score: u8,
    pub max_score: u8,
    pub total_checks: usize,
    /// Critical results in the period
    pub failure_count: usize,
    pub warning_count: usize,
    pub uptime_pct: u8,
    pub trend: Trend,
}

/// A critical result surfaced in the report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Incident {
    pub module: String,
    pub timestamp: DateTime<Utc>,
    pub score: u8,
    pub errors: Vec<String>,
}

/// Everything a rendered report contains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportData {
    pub period_start: DateTime<Utc>,
    pub period_end: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub overall_health: u8,
    pub total_checks: usize,
    /// Worst average score first
    pub modules: Vec<ModuleStats>,
    /// Most recent first
    pub incidents: Vec<Incident>,
    pub recommendations: Vec<String>,
}

impl ReportData {
    /// Build report data from the current period's results and those of the
    /// preceding period of equal length.
    pub fn build(
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        generated_at: DateTime<Utc>,
        current: &[HealthCheckResult],
        previous: &[HealthCheckResult],
    ) -> Self {
        let modules = module_stats(current, previous);
        let recommendations = recommendations(&modules);
        Self {
            period_start,
            period_end,
            generated_at,
            overall_health: overall_health(current),
            total_checks: current.len(),
            modules,
            incidents: incidents(current, defaults::REPORT_MAX_INCIDENTS),
            recommendations,
        }
    }
}

fn mean_score<'a>(results: impl IntoIterator<Item = &'a HealthCheckResult>) -> Option<f64> {
    let scores: Vec<f64> = results.into_iter().map(|r| f64::from(r.score)).collect();
    if scores.is_empty() {
        None
    } else {
        Some(Statistics::mean(&scores))
    }
}

fn round_score(value: f64) -> u8 {
    value.round().clamp(0.0, 100.0) as u8
}

/// Share of healthy results, rounded. `None` for an empty slice.
pub fn uptime_pct(results: &[&HealthCheckResult]) -> Option<u8> {
    if results.is_empty() {
        return None;
    }
    let healthy = results.iter().filter(|r| r.status == HealthStatus::Healthy).count();
    Some(round_score(healthy as f64 / results.len() as f64 * 100.0))
}

/// Rounded mean score of all results; 0 when there are none.
pub fn overall_health(results: &[HealthCheckResult]) -> u8 {
    mean_score(results).map_or(0, round_score)
}

/// Per-module statistics, sorted ascending by average score.
pub fn module_stats(current: &[HealthCheckResult], previous: &[HealthCheckResult]) -> Vec<ModuleStats> {
    let mut grouped: BTreeMap<&str, Vec<&HealthCheckResult>> = BTreeMap::new();
    for r in current {
        grouped.entry(r.module.as_str()).or_default().push(r);
    }

    let mut stats: Vec<ModuleStats> = grouped
        .into_iter()
        .filter_map(|(module, results)| {
            let avg = mean_score(results.iter().copied())?;
            // no prior data reads as stable
            let prev_avg = mean_score(previous.iter().filter(|r| r.module == module)).unwrap_or(avg);
            Some(ModuleStats {
                module: module.to_string(),
                avg_score: round_score(avg),
                min_score: results.iter().map(|r| r.score).min().unwrap_or(0),
                max_score: results.iter().map(|r| r.score).max().unwrap_or(0),
                total_checks: results.len(),
                failure_count: results.iter().filter(|r| r.status == HealthStatus::Critical).count(),
                warning_count: results.iter().filter(|r| r.status == HealthStatus::Warning).count(),
                uptime_pct: uptime_pct(&results).unwrap_or(0),
                trend: Trend::between(avg, prev_avg),
            })
        })
        .collect();

    stats.sort_by_key(|s| s.avg_score);
    stats
}

/// Up to `limit` critical results, most recent first.
pub fn incidents(results: &[HealthCheckResult], limit: usize) -> Vec<Incident> {
    let mut critical: Vec<&HealthCheckResult> =
        results.iter().filter(|r| r.status == HealthStatus::Critical).collect();
    critical.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    critical
        .into_iter()
        .take(limit)
        .map(|r| Incident {
            module: r.module.clone(),
            timestamp: r.timestamp,
            score: r.score,
            errors: r.errors.clone(),
        })
        .collect()
}

/// Qualitative recommendations derived from module statistics.
pub fn recommendations(stats: &[ModuleStats]) -> Vec<String> {
    fn names<'a>(it: impl Iterator<Item = &'a ModuleStats>) -> Vec<&'a str> {
        it.map(|s| s.module.as_str()).collect()
    }

    let mut out = Vec::new();

    let attention = names(stats.iter().filter(|s| f64::from(s.avg_score) < defaults::ATTENTION_SCORE));
    if !attention.is_empty() {
        out.push(format!("Immediate attention required for: {}", attention.join(", ")));
    }

    let degrading = names(stats.iter().filter(|s| s.trend == Trend::Degrading));
    if !degrading.is_empty() {
        out.push(format!("Closely monitor degrading modules: {}", degrading.join(", ")));
    }

    let low_uptime = names(stats.iter().filter(|s| u32::from(s.uptime_pct) < defaults::LOW_UPTIME_PCT));
    if !low_uptime.is_empty() {
        out.push(format!("Improve stability for: {}", low_uptime.join(", ")));
    }

    if out.is_empty() {
        out.push("System generally stable, continue regular monitoring".to_string());
        out.push("Consider optimizing modules scoring below 90".to_string());
    }
    out
}
