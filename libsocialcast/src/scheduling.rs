//! Scheduling and time parsing utilities
//!
//! This module turns the human-readable times accepted by `social-queue`
//! into UTC timestamps.

use chrono::{DateTime, Duration, NaiveDateTime, Utc};

use crate::{Result, SocialcastError};

/// Absolute formats accepted in addition to RFC 3339, interpreted as UTC
const ABSOLUTE_FORMATS: &[&str] = &["%Y-%m-%d %H:%M", "%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M"];

/// Parse a schedule string into a future DateTime
///
/// Supports multiple formats:
/// - Relative durations: "1h", "30m", "2d", "1 hour"
/// - Natural language: "tomorrow", "tomorrow 9am", "next monday 10am"
/// - Absolute times: "2025-11-20 15:00" (UTC) or RFC 3339
///
/// # Errors
///
/// Returns an error if the input is empty, cannot be parsed, or names a
/// time that has already passed.
pub fn parse_schedule(input: &str) -> Result<DateTime<Utc>> {
    parse_schedule_at(input, Utc::now())
}

/// [`parse_schedule`] relative to an explicit `now`
pub fn parse_schedule_at(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    let input = input.trim();
    if input.is_empty() {
        return Err(SocialcastError::InvalidInput(
            "Schedule string cannot be empty".to_string(),
        ));
    }

    let when = parse_duration(input)
        .map(|duration| now + duration)
        .or_else(|_| parse_absolute(input))
        .or_else(|_| parse_natural_language(input, now))
        .map_err(|_| {
            SocialcastError::InvalidInput(format!(
                "Could not parse schedule string: '{}'. \
                 Try '30m', 'tomorrow 9am' or '2025-11-20 15:00'",
                input
            ))
        })?;

    if when < now {
        return Err(SocialcastError::InvalidInput(format!(
            "Scheduled time {} is in the past",
            when.format("%Y-%m-%d %H:%M:%S UTC")
        )));
    }

    Ok(when)
}

/// Parse a duration string into a chrono::Duration
fn parse_duration(input: &str) -> Result<Duration> {
    // Try humantime for simple formats like "1h", "30m"
    let std_duration = humantime::parse_duration(input)
        .map_err(|e| SocialcastError::InvalidInput(format!("Could not parse duration: {}", e)))?;

    let seconds = i64::try_from(std_duration.as_secs())
        .map_err(|_| SocialcastError::InvalidInput("Duration out of range".to_string()))?;
    Duration::try_seconds(seconds)
        .ok_or_else(|| SocialcastError::InvalidInput("Duration out of range".to_string()))
}

fn parse_absolute(input: &str) -> Result<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(input) {
        return Ok(dt.with_timezone(&Utc));
    }

    ABSOLUTE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(input, format).ok())
        .map(|naive| naive.and_utc())
        .ok_or_else(|| SocialcastError::InvalidInput(format!("Not an absolute time: {}", input)))
}

/// Parse natural language time expression
fn parse_natural_language(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    chrono_english::parse_date_string(input, now, chrono_english::Dialect::Us)
        .map_err(|e| SocialcastError::InvalidInput(format!("Could not parse time: {}", e)))
}
