//! Report rendering: Markdown document, CSV table, JSON

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::stats::ReportData;
use super::ReportError;

const DATE: &str = "%Y-%m-%d";
const DATE_TIME: &str = "%Y-%m-%d %H:%M UTC";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    #[default]
    Markdown,
    Csv,
    Json,
}

impl ReportFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Markdown => "md",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Markdown => "markdown",
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

impl std::fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = ReportError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "markdown" | "md" => Ok(Self::Markdown),
            "csv" => Ok(Self::Csv),
            "json" => Ok(Self::Json),
            other => Err(ReportError::UnknownFormat(other.to_string())),
        }
    }
}

/// Render `data` in `format`. Markdown module tables are split into pages of
/// `rows_per_page` rows.
pub fn render(data: &ReportData, format: ReportFormat, rows_per_page: usize) -> Result<String, ReportError> {
    match format {
        ReportFormat::Markdown => Ok(markdown(data, rows_per_page)),
        ReportFormat::Csv => Ok(csv(data)),
        ReportFormat::Json => Ok(serde_json::to_string_pretty(data)?),
    }
}

fn markdown(data: &ReportData, rows_per_page: usize) -> String {
    let mut out = String::from("# Health Check Report\n\n");
    out.push_str(&format!(
        "Period: {} - {}  \n",
        data.period_start.format(DATE),
        data.period_end.format(DATE)
    ));
    out.push_str(&format!("Generated: {}\n\n", data.generated_at.format(DATE_TIME)));

    out.push_str("## Summary\n\n");
    out.push_str(&format!("- Overall health score: {}/100\n", data.overall_health));
    out.push_str(&format!("- Total checks: {}\n", data.total_checks));
    out.push_str(&format!("- Modules monitored: {}\n\n", data.modules.len()));

    out.push_str("## Module Status\n\n");
    if data.modules.is_empty() {
        out.push_str("No checks recorded in this period.\n\n");
    } else {
        let pages: Vec<_> = data.modules.chunks(rows_per_page.max(1)).collect();
        let page_count = pages.len();
        for (i, page) in pages.into_iter().enumerate() {
            if page_count > 1 {
                out.push_str(&format!("### Page {} of {}\n\n", i + 1, page_count));
            }
            out.push_str("| Module | Avg Score | Uptime % | Failures | Trend |\n");
            out.push_str("|---|---|---|---|---|\n");
            for s in page {
                out.push_str(&format!(
                    "| {} | {}/100 | {}% | {} | {} {} |\n",
                    s.module,
                    s.avg_score,
                    s.uptime_pct,
                    s.failure_count,
                    s.trend.arrow(),
                    s.trend.as_str()
                ));
            }
            out.push('\n');
        }
    }

    if !data.incidents.is_empty() {
        out.push_str("## Critical Incidents\n\n");
        for incident in &data.incidents {
            out.push_str(&format!(
                "- {} - {} (score {}/100)\n",
                incident.timestamp.format("%m-%d %H:%M"),
                incident.module,
                incident.score
            ));
            if !incident.errors.is_empty() {
                out.push_str(&format!("  {}\n", incident.errors.join(", ")));
            }
        }
        out.push('\n');
    }

    out.push_str("## Recommendations\n\n");
    for rec in &data.recommendations {
        out.push_str(&format!("- {rec}\n"));
    }

    out.push_str("\n---\n_Report generated automatically by health-sentinel_\n");
    out
}

fn csv(data: &ReportData) -> String {
    let mut out = String::from(
        "module,avg_score,min_score,max_score,total_checks,failure_count,warning_count,uptime_pct,trend\n",
    );
    for s in &data.modules {
        out.push_str(&format!(
            "{},{},{},{},{},{},{},{},{}\n",
            csv_field(&s.module),
            s.avg_score,
            s.min_score,
            s.max_score,
            s.total_checks,
            s.failure_count,
            s.warning_count,
            s.uptime_pct,
            s.trend.as_str()
        ));
    }
    out
}

/// Quote a CSV field when it contains a delimiter, quote or newline.
pub fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}
