use axum::{
    extract::{Path, Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use chrono::{Duration as ChronoDuration, Utc};

use crate::{
    error::AppError,
    handlers::query::AppState,
    marshal::{self, ApiVersion},
    metrics,
    model::LabelRequest,
    params::{self, Params},
};

/// Default lookback for label queries when `start` is absent.
const LABEL_LOOKBACK_HOURS: i64 = 6;

/// Handle GET /loki/api/v1/label (and the legacy path)
pub async fn label_names(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<Params>,
) -> Result<Response, AppError> {
    label_query(state, uri, params, None).await
}

/// Handle GET /loki/api/v1/label/:name/values (and the legacy path)
pub async fn label_values(
    State(state): State<AppState>,
    uri: Uri,
    Path(name): Path<String>,
    Query(params): Query<Params>,
) -> Result<Response, AppError> {
    label_query(state, uri, params, Some(name)).await
}

async fn label_query(
    state: AppState,
    uri: Uri,
    params: Params,
    name: Option<String>,
) -> Result<Response, AppError> {
    metrics::record_request("label");

    let now = Utc::now();
    let end = params::time_param(&params, "end", now)?;
    let start = params::time_param(&params, "start", end - ChronoDuration::hours(LABEL_LOOKBACK_HOURS))?;

    let req = LabelRequest { name, start, end };

    tracing::debug!(name = ?req.name, start = %req.start, end = %req.end, "Executing label query");

    let result = state.engine.label(&req).await?;

    let body = marshal::write_label_response(ApiVersion::from_path(uri.path()), &result)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}
