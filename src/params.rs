//! Query-string parameter normalization.
//!
//! Every accessor takes the parsed query map, a parameter name and a default,
//! and returns a typed value. Empty or absent values always yield the default
//! and never an error.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

use crate::error::AppError;
use crate::model::Direction;

/// Parsed query-string parameters.
pub type Params = HashMap<String, String>;

/// Integer parameter: empty means default, anything else must be base-10.
pub fn int_param(params: &Params, name: &str, default: i64) -> Result<i64, AppError> {
    let value = match params.get(name) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(default),
    };

    value
        .parse::<i64>()
        .map_err(|e| AppError::InvalidParameter(format!("invalid value '{}' for {}: {}", value, name, e)))
}

/// Timestamp parameter. Accepted forms, in resolution order:
///
/// 1. a value containing `.` parses as fractional unix seconds, with the
///    fractional part rounded to millisecond precision to avoid float jitter;
/// 2. an integer, disambiguated by the *length* of the input string: 10
///    characters or fewer means seconds since epoch, longer means nanoseconds.
///    This heuristic is the documented compatibility contract for existing
///    clients and must not be replaced by a magnitude check;
/// 3. an RFC 3339 date-time.
pub fn time_param(params: &Params, name: &str, default: DateTime<Utc>) -> Result<DateTime<Utc>, AppError> {
    let value = match params.get(name) {
        Some(v) if !v.is_empty() => v.as_str(),
        _ => return Ok(default),
    };

    if value.contains('.') {
        if let Ok(t) = value.parse::<f64>() {
            let mut secs = t.trunc() as i64;
            let frac = (t.fract() * 1000.0).round() / 1000.0;
            let mut nanos = (frac * 1e9) as i64;
            if nanos < 0 {
                secs -= 1;
                nanos += 1_000_000_000;
            }
            return DateTime::from_timestamp(secs, nanos as u32).ok_or_else(|| {
                AppError::InvalidParameter(format!("timestamp '{}' for {} is out of range", value, name))
            });
        }
    }

    match value.parse::<i64>() {
        Ok(n) => {
            if value.len() <= 10 {
                DateTime::from_timestamp(n, 0).ok_or_else(|| {
                    AppError::InvalidParameter(format!("timestamp '{}' for {} is out of range", value, name))
                })
            } else {
                Ok(DateTime::from_timestamp_nanos(n))
            }
        }
        Err(_) => DateTime::parse_from_rfc3339(value)
            .map(|ts| ts.with_timezone(&Utc))
            .map_err(|e| AppError::InvalidParameter(format!("invalid timestamp '{}' for {}: {}", value, name, e))),
    }
}

/// Direction parameter: case-insensitive FORWARD/BACKWARD.
pub fn direction_param(params: &Params, name: &str, default: Direction) -> Result<Direction, AppError> {
    let value = match params.get(name) {
        Some(v) if !v.is_empty() => v,
        _ => return Ok(default),
    };

    Direction::parse(value).ok_or_else(|| AppError::InvalidParameter(format!("invalid direction '{}'", value)))
}

/// Default step for the query range API, dynamically calculated from the time
/// range so that any range resolves to roughly 250 points, never below 1s.
pub fn default_query_range_step(start: DateTime<Utc>, end: DateTime<Utc>) -> i64 {
    (((end - start).num_seconds() as f64) / 250.0).floor().max(1.0) as i64
}
