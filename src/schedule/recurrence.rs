//! Recurrence rules and next-fire computation
//!
//! Accepted expressions:
//! - `every 15m`, `15m`, `90s`, `6h`, `1d`, `500ms`: fixed intervals aligned to the epoch
//! - 5-field cron (`*/15 * * * *`) or 6/7-field cron with seconds (`0 */15 * * * *`)
//!
//! `Daily` and `Weekly` are built in code for the retention sweep and the
//! weekly report trigger.

use chrono::{DateTime, Datelike, Duration as ChronoDuration, NaiveTime, Utc, Weekday};
use cron::Schedule;
use std::str::FromStr;
use std::time::Duration;

/// Errors raised while parsing schedule expressions
#[derive(Debug, thiserror::Error)]
pub enum ScheduleError {
    #[error("invalid schedule expression '{expr}': {message}")]
    InvalidExpression { expr: String, message: String },
}

/// When a recurring timer fires
#[derive(Debug, Clone)]
pub enum Recurrence {
    /// Every fixed interval, aligned to multiples of the interval since the epoch
    Interval(Duration),
    /// Cron schedule (seconds-resolution)
    Cron(Box<Schedule>),
    /// Once per day at the given UTC time
    Daily(NaiveTime),
    /// Once per week on the given weekday at the given UTC time
    Weekly(Weekday, NaiveTime),
}

impl Recurrence {
    /// Parse a schedule expression (see module docs for the accepted forms).
    pub fn parse(expr: &str) -> Result<Self, ScheduleError> {
        let trimmed = expr.trim();
        let invalid = |message: &str| ScheduleError::InvalidExpression {
            expr: expr.to_string(),
            message: message.to_string(),
        };

        if trimmed.is_empty() {
            return Err(invalid("empty expression"));
        }

        if let Some(rest) = trimmed.strip_prefix("every ") {
            return parse_interval(rest.trim())
                .map(Self::Interval)
                .ok_or_else(|| invalid("expected an interval such as '15m' or '6h'"));
        }

        if let Some(interval) = parse_interval(trimmed) {
            return Ok(Self::Interval(interval));
        }

        // Classic 5-field cron has no seconds column; pin it to second 0
        let normalized = if trimmed.split_whitespace().count() == 5 {
            format!("0 {trimmed}")
        } else {
            trimmed.to_string()
        };

        Schedule::from_str(&normalized)
            .map(|s| Self::Cron(Box::new(s)))
            .map_err(|e| invalid(&e.to_string()))
    }

    /// First fire time strictly after `after`.
    pub fn next_after(&self, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        match self {
            Self::Interval(interval) => {
                let step = i64::try_from(interval.as_millis()).ok()?;
                if step <= 0 {
                    return None;
                }
                let now_ms = after.timestamp_millis();
                let next_ms = (now_ms.div_euclid(step) + 1) * step;
                DateTime::from_timestamp_millis(next_ms)
            }
            Self::Cron(schedule) => schedule.after(&after).next(),
            Self::Daily(at) => {
                let candidate = after.date_naive().and_time(*at).and_utc();
                if candidate > after {
                    Some(candidate)
                } else {
                    Some(candidate + ChronoDuration::days(1))
                }
            }
            Self::Weekly(weekday, at) => {
                let today = after.weekday().num_days_from_monday();
                let target = weekday.num_days_from_monday();
                let days_ahead = (7 + target - today) % 7;
                let candidate = (after.date_naive() + ChronoDuration::days(i64::from(days_ahead)))
                    .and_time(*at)
                    .and_utc();
                if candidate > after {
                    Some(candidate)
                } else {
                    Some(candidate + ChronoDuration::weeks(1))
                }
            }
        }
    }
}

impl std::fmt::Display for Recurrence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval(d) => write!(f, "every {}s", d.as_secs_f64()),
            Self::Cron(schedule) => write!(f, "cron({schedule})"),
            Self::Daily(at) => write!(f, "daily at {}", at.format("%H:%M")),
            Self::Weekly(day, at) => write!(f, "weekly on {day} at {}", at.format("%H:%M")),
        }
    }
}

/// Parse `<number><unit>` where unit is one of ms, s, m, h, d.
fn parse_interval(s: &str) -> Option<Duration> {
    let split = s.find(|c: char| !c.is_ascii_digit())?;
    let (digits, unit) = s.split_at(split);
    let value: u64 = digits.parse().ok()?;
    if value == 0 {
        return None;
    }
    let duration = match unit.trim() {
        "ms" => Duration::from_millis(value),
        "s" => Duration::from_secs(value),
        "m" => Duration::from_secs(value.checked_mul(60)?),
        "h" => Duration::from_secs(value.checked_mul(3_600)?),
        "d" => Duration::from_secs(value.checked_mul(86_400)?),
        _ => return None,
    };
    Some(duration)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(y: i32, mo: u32, d: u32, h: u32, mi: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, mo, d, h, mi, s).unwrap()
    }

    #[test]
    fn test_parse_interval_forms() {
        assert!(matches!(
            Recurrence::parse("every 15m").unwrap(),
            Recurrence::Interval(d) if d == Duration::from_secs(900)
        ));
        assert!(matches!(
            Recurrence::parse("6h").unwrap(),
            Recurrence::Interval(d) if d == Duration::from_secs(21_600)
        ));
        assert!(matches!(
            Recurrence::parse("250ms").unwrap(),
            Recurrence::Interval(d) if d == Duration::from_millis(250)
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(Recurrence::parse("").is_err());
        assert!(Recurrence::parse("every fortnight").is_err());
        assert!(Recurrence::parse("0m").is_err());
        assert!(Recurrence::parse("not a cron").is_err());
    }

    #[test]
    fn test_interval_is_epoch_aligned() {
        let r = Recurrence::parse("15m").unwrap();
        let next = r.next_after(at(2026, 3, 2, 10, 7, 30)).unwrap();
        assert_eq!(next, at(2026, 3, 2, 10, 15, 0));
        // Exactly on a boundary moves to the following slot
        let next = r.next_after(at(2026, 3, 2, 10, 15, 0)).unwrap();
        assert_eq!(next, at(2026, 3, 2, 10, 30, 0));
    }

    #[test]
    fn test_five_field_cron() {
        let r = Recurrence::parse("*/5 * * * *").unwrap();
        let next = r.next_after(at(2026, 3, 2, 10, 7, 30)).unwrap();
        assert_eq!(next, at(2026, 3, 2, 10, 10, 0));

        let hourly = Recurrence::parse("0 * * * *").unwrap();
        assert_eq!(
            hourly.next_after(at(2026, 3, 2, 10, 7, 30)).unwrap(),
            at(2026, 3, 2, 11, 0, 0)
        );
    }

    #[test]
    fn test_daily() {
        let r = Recurrence::Daily(NaiveTime::from_hms_opt(2, 0, 0).unwrap());
        assert_eq!(
            r.next_after(at(2026, 3, 2, 1, 59, 0)).unwrap(),
            at(2026, 3, 2, 2, 0, 0)
        );
        assert_eq!(
            r.next_after(at(2026, 3, 2, 2, 0, 0)).unwrap(),
            at(2026, 3, 3, 2, 0, 0)
        );
    }

    #[test]
    fn test_weekly_monday_morning() {
        let r = Recurrence::Weekly(Weekday::Mon, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        // 2026-03-04 is a Wednesday
        assert_eq!(
            r.next_after(at(2026, 3, 4, 12, 0, 0)).unwrap(),
            at(2026, 3, 9, 9, 0, 0)
        );
        // Monday before 09:00 fires the same day
        assert_eq!(
            r.next_after(at(2026, 3, 9, 8, 0, 0)).unwrap(),
            at(2026, 3, 9, 9, 0, 0)
        );
        // Monday after 09:00 waits a week
        assert_eq!(
            r.next_after(at(2026, 3, 9, 9, 30, 0)).unwrap(),
            at(2026, 3, 16, 9, 0, 0)
        );
    }
}
