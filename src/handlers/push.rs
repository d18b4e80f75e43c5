use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use chrono::DateTime;
use serde::Deserialize;

use crate::{
    error::AppError,
    handlers::query::AppState,
    model::{Entry, Labels},
};

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub streams: Vec<PushStream>,
}

#[derive(Debug, Deserialize)]
pub struct PushStream {
    pub stream: Labels,
    /// Pairs of [nanosecond timestamp string, line]
    pub values: Vec<(String, String)>,
}

/// Handle POST /loki/api/v1/push: ingest entries into the engine. Feeds both
/// stored queries and live tail sessions.
pub async fn push(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> Result<StatusCode, AppError> {
    let max = state.config.load().limits.max_entries_per_push;
    let total: usize = request.streams.iter().map(|s| s.values.len()).sum();
    if total > max {
        return Err(AppError::InvalidParameter(format!(
            "push of {} entries exceeds the per-request maximum of {}",
            total, max
        )));
    }

    let mut accepted = 0usize;
    for stream in request.streams {
        let mut entries = Vec::with_capacity(stream.values.len());
        for (ts, line) in stream.values {
            let nanos = ts.parse::<i64>().map_err(|e| {
                AppError::InvalidParameter(format!("invalid entry timestamp '{}': {}", ts, e))
            })?;
            entries.push(Entry {
                timestamp: DateTime::from_timestamp_nanos(nanos),
                line,
            });
        }
        accepted += entries.len();
        state.engine.push(stream.stream, entries);
    }

    tracing::debug!(entries = accepted, "Accepted push request");

    Ok(StatusCode::NO_CONTENT)
}
