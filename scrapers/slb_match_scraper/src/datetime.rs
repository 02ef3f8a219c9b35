use chrono::{DateTime, FixedOffset, LocalResult, NaiveDate, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde_json::Value;
use tracing::error;

use crate::error::{MatchError, Result};

const US_12H_FORMAT: &str = "%m/%d/%Y %I:%M:%S %p";
const STORED_FIELDS: [&str; 5] = ["year", "month", "day", "hour", "minute"];

/// `"29-11-2025"` + `"18:00"` in `tz`.
pub fn parse_dd_mm_yyyy_time(date: &str, time: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let invalid = || {
        error!("Parse error: date='{}', time='{}'", date, time);
        MatchError::format(format!("Invalid date/time format: '{}' '{}'", date, time))
    };

    let date_parts: Vec<&str> = date.trim().split('-').collect();
    let time_parts: Vec<&str> = time.trim().split(':').collect();
    if date_parts.len() != 3 || time_parts.len() != 2 {
        return Err(invalid());
    }

    let number = |part: &str| part.trim().parse::<u32>().map_err(|_| invalid());
    let day = number(date_parts[0])?;
    let month = number(date_parts[1])?;
    let year = date_parts[2].trim().parse::<i32>().map_err(|_| invalid())?;
    let hour = number(time_parts[0])?;
    let minute = number(time_parts[1])?;

    let naive = NaiveDate::from_ymd_opt(year, month, day)
        .and_then(|d| d.and_hms_opt(hour, minute, 0))
        .ok_or_else(invalid)?;
    localize(&naive, tz)
}

/// ISO-8601 with `Z` or an explicit offset, converted into `tz`. Seconds are
/// optional (`2025-11-29T18:00Z`); a value without any offset is read as UTC.
pub fn parse_iso_datetime(value: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let trimmed = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Ok(dt.with_timezone(&tz));
    }

    let with_offset = match trimmed.strip_suffix('Z') {
        Some(rest) => format!("{}+00:00", rest),
        None => trimmed.to_string(),
    };
    for format in ["%Y-%m-%dT%H:%M%:z", "%Y-%m-%dT%H:%M:%S%.f%:z"] {
        if let Ok(dt) = DateTime::<FixedOffset>::parse_from_str(&with_offset, format) {
            return Ok(dt.with_timezone(&tz));
        }
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Ok(Utc.from_utc_datetime(&naive).with_timezone(&tz));
        }
    }

    error!("ISO parse error: '{}'", value);
    Err(MatchError::format(format!("Invalid ISO datetime: '{}'", value)))
}

/// `"11/29/2025 6:00:00 PM"`. The value is already local to `tz`, so it is
/// tagged rather than converted.
pub fn parse_us_datetime_12h(value: &str, tz: Tz) -> Result<DateTime<Tz>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), US_12H_FORMAT).map_err(|e| {
        error!("US datetime parse error: '{}': {}", value, e);
        MatchError::format(format!("Invalid US datetime: '{}'", value))
    })?;
    localize(&naive, tz)
}

/// The decomposed `{year, month, day, hour, minute}` shape of the match file.
pub fn parse_stored_fields(value: &Value, tz: Tz) -> Result<DateTime<Tz>> {
    let mut parts = [0i64; 5];
    for (slot, key) in parts.iter_mut().zip(STORED_FIELDS) {
        *slot = value.get(key).and_then(coerce_int).ok_or_else(|| {
            error!("Match data parse error: missing or invalid '{}' in {}", key, value);
            MatchError::format(format!("Invalid match data format: field '{}'", key))
        })?;
    }
    let [year, month, day, hour, minute] = parts;

    let naive = i32::try_from(year)
        .ok()
        .zip(u32::try_from(month).ok())
        .zip(u32::try_from(day).ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
        .zip(u32::try_from(hour).ok().zip(u32::try_from(minute).ok()))
        .and_then(|(date, (h, min))| date.and_hms_opt(h, min, 0))
        .ok_or_else(|| MatchError::format("Invalid match data format: date out of range"))?;
    localize(&naive, tz)
}

pub fn format_dd_mm_yyyy(dt: &DateTime<Tz>) -> String {
    dt.format("%d-%m-%Y").to_string()
}

pub fn format_hh_mm(dt: &DateTime<Tz>) -> String {
    dt.format("%H:%M").to_string()
}

fn localize(naive: &NaiveDateTime, tz: Tz) -> Result<DateTime<Tz>> {
    match tz.from_local_datetime(naive) {
        LocalResult::Single(dt) => Ok(dt),
        LocalResult::Ambiguous(earliest, _) => Ok(earliest),
        LocalResult::None => Err(MatchError::format(format!(
            "{} does not exist in {}",
            naive,
            tz.name()
        ))),
    }
}

fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}
