/// Date bound parsing for tool arguments.
///
/// Tool callers (usually an LLM) pass dates as `YYYYMMDD`, the documented
/// form, but `YYYY-MM-DD` and full RFC 3339 timestamps show up too. All of
/// them resolve to a UTC instant; bare dates mean UTC midnight.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use crate::model::GeoglowsError;

const DATE_FORMATS: &[&str] = &["%Y%m%d", "%Y-%m-%d"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

/// Parses a caller-supplied date bound into a UTC instant.
pub fn parse_date_bound(text: &str) -> Result<DateTime<Utc>, GeoglowsError> {
    let trimmed = text.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&Utc));
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(naive.and_utc());
        }
    }

    for fmt in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(date.and_time(NaiveTime::MIN).and_utc());
        }
    }

    Err(GeoglowsError::InvalidDate(text.to_string()))
}

/// Parses an optional bound, treating `None` and blank strings as "no bound".
pub fn parse_optional_bound(text: Option<&str>) -> Result<Option<DateTime<Utc>>, GeoglowsError> {
    match text {
        Some(t) if !t.trim().is_empty() => parse_date_bound(t).map(Some),
        _ => Ok(None),
    }
}

/// Checks a forecast date argument is `YYYYMMDD` and normalizes the other
/// accepted spellings to it, since that is what the data service expects.
pub fn normalize_forecast_date(text: &str) -> Result<String, GeoglowsError> {
    parse_date_bound(text).map(|dt| dt.format("%Y%m%d").to_string())
}
