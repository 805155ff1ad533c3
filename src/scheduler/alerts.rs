//! Alert notifications raised by the scheduler

use serde_json::json;

use crate::notify::{Notification, NotificationKind, Priority};
use crate::types::{HealthCheckResult, HealthStatus};

/// Errors quoted in an alert body
const MAX_QUOTED_ERRORS: usize = 3;

/// Alert for one classified result, or `None` when the result is healthy.
///
/// `unknown` results alert with critical priority: a probe that cannot run
/// is at least as bad as one that reports a failing score.
pub fn result_alert(result: &HealthCheckResult, channels: &[String]) -> Option<Notification> {
    let (priority, label) = match result.status {
        HealthStatus::Healthy => return None,
        HealthStatus::Warning => (Priority::High, "Warning"),
        HealthStatus::Critical => (Priority::Urgent, "Critical"),
        HealthStatus::Unknown => (Priority::Urgent, "Unreachable"),
    };

    let mut message = format!(
        "Module {} reported status {} with score {}/100.",
        result.module, result.status, result.score
    );
    if !result.errors.is_empty() {
        message.push_str(" Errors: ");
        message.push_str(
            &result
                .errors
                .iter()
                .take(MAX_QUOTED_ERRORS)
                .cloned()
                .collect::<Vec<_>>()
                .join("; "),
        );
    }

    Some(
        Notification::new(
            NotificationKind::HealthAlert,
            priority,
            format!("{label} health alert: {}", result.module),
            message,
        )
        .with_data(json!({
            "module": result.module,
            "status": result.status,
            "score": result.score,
            "errors": result.errors,
            "warnings": result.warnings,
            "timestamp": result.timestamp,
        }))
        .with_channels(channels.to_vec()),
    )
}

/// Summary alert after a full sweep whose mean score fell below critical
pub fn system_critical_alert(mean_score: f64, results: &[HealthCheckResult], channels: &[String]) -> Notification {
    let failing: Vec<&str> = results
        .iter()
        .filter(|r| matches!(r.status, HealthStatus::Critical | HealthStatus::Unknown))
        .map(|r| r.module.as_str())
        .collect();

    Notification::new(
        NotificationKind::SystemCritical,
        Priority::Urgent,
        "System health critical",
        format!(
            "Average health score across {} modules is {:.1}/100. Failing modules: {}.",
            results.len(),
            mean_score,
            if failing.is_empty() { "none".to_string() } else { failing.join(", ") }
        ),
    )
    .with_data(json!({
        "average_score": mean_score,
        "modules_checked": results.len(),
        "failing_modules": failing,
    }))
    .with_channels(channels.to_vec())
}
