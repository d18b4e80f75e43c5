//! Builds typed query requests from raw query-string parameters.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::time::Duration;

use crate::error::AppError;
use crate::logql::Selector;
use crate::model::Direction;
use crate::params::{self, Params};

pub const DEFAULT_QUERY_LIMIT: i64 = 100;
/// Default lookback window when `start` is absent.
pub const DEFAULT_SINCE_SECONDS: i64 = 3600;
/// Upper bound for the tail `delay_for` parameter, in seconds.
pub const MAX_DELAY_FOR_SECONDS: u32 = 5;

#[derive(Debug, Clone)]
pub struct RangeQueryRequest {
    pub query: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub step: Duration,
    pub limit: u32,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct InstantQueryRequest {
    pub query: String,
    pub ts: DateTime<Utc>,
    pub limit: u32,
    pub direction: Direction,
}

#[derive(Debug, Clone)]
pub struct TailRequest {
    pub query: String,
    pub start: DateTime<Utc>,
    pub limit: u32,
    /// Seconds the tailing service holds entries back so slow producers can
    /// still be ordered correctly before delivery.
    pub delay_for: u32,
}

pub fn range_query_request(params: &Params) -> Result<RangeQueryRequest, AppError> {
    let query = params.get("query").cloned().unwrap_or_default();
    let (limit, start, end) = lookback(params)?;

    let step = params::int_param(params, "step", params::default_query_range_step(start, end))?;
    if step < 1 {
        return Err(AppError::InvalidParameter(format!(
            "step must be a positive number of seconds, got {}",
            step
        )));
    }

    let direction = params::direction_param(params, "direction", Direction::Backward)?;

    Ok(RangeQueryRequest {
        query,
        start,
        end,
        step: Duration::from_secs(step as u64),
        limit,
        direction,
    })
}

pub fn instant_query_request(params: &Params) -> Result<InstantQueryRequest, AppError> {
    let query = params.get("query").cloned().unwrap_or_default();
    let limit = limit_param(params)?;
    let ts = params::time_param(params, "time", Utc::now())?;
    let direction = params::direction_param(params, "direction", Direction::Backward)?;

    Ok(InstantQueryRequest {
        query,
        ts,
        limit,
        direction,
    })
}

/// Builds a tail request, including the legacy `regexp` combination. A
/// `delay_for` above [`MAX_DELAY_FOR_SECONDS`] is rejected here, before any
/// connection upgrade is attempted.
pub fn tail_request(params: &Params) -> Result<TailRequest, AppError> {
    let query = parse_regex_query(params)?;
    let (limit, start, _) = lookback(params)?;

    let delay_for = params::int_param(params, "delay_for", 0)?;
    let delay_for = u32::try_from(delay_for).map_err(|_| {
        AppError::InvalidParameter(format!("delay_for must be non-negative, got {}", delay_for))
    })?;
    if delay_for > MAX_DELAY_FOR_SECONDS {
        return Err(AppError::DelayTooLarge(MAX_DELAY_FOR_SECONDS));
    }

    Ok(TailRequest {
        query,
        start,
        limit,
        delay_for,
    })
}

/// Shared limit/start/end defaults: limit 100, start now-1h, end now.
fn lookback(params: &Params) -> Result<(u32, DateTime<Utc>, DateTime<Utc>), AppError> {
    let now = Utc::now();

    let limit = limit_param(params)?;
    let start = params::time_param(params, "start", now - ChronoDuration::seconds(DEFAULT_SINCE_SECONDS))?;
    let end = params::time_param(params, "end", now)?;

    Ok((limit, start, end))
}

fn limit_param(params: &Params) -> Result<u32, AppError> {
    let limit = params::int_param(params, "limit", DEFAULT_QUERY_LIMIT)?;
    u32::try_from(limit)
        .map_err(|_| AppError::InvalidParameter(format!("limit must be non-negative, got {}", limit)))
}

/// Combines the `query` and legacy `regexp` parameters into a single selector
/// string. Kept only until the `regexp` parameter is fully deprecated: the
/// query is parsed, a regex line-filter stage is appended, and the result is
/// re-serialized to canonical form.
pub fn parse_regex_query(params: &Params) -> Result<String, AppError> {
    let query = params.get("query").cloned().unwrap_or_default();
    let regexp = match params.get("regexp") {
        Some(r) if !r.is_empty() => r,
        _ => return Ok(query),
    };

    let selector = Selector::parse(&query).map_err(|e| AppError::InvalidParameter(e.to_string()))?;
    Ok(selector.with_regex_filter(regexp).to_string())
}
