use axum::{
    extract::{Query, State},
    http::{header, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use std::time::Instant;

use crate::{
    config::Config,
    engine::Engine,
    error::AppError,
    marshal::{self, ApiVersion},
    metrics,
    model::QueryResult,
    params::Params,
    request,
};

/// Application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<arc_swap::ArcSwap<Config>>,
    pub engine: Arc<Engine>,
}

/// Handle GET /loki/api/v1/query_range
pub async fn query_range(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<Params>,
) -> Result<Response, AppError> {
    let start = Instant::now();
    metrics::record_request("query_range");

    let req = request::range_query_request(&params)?;

    tracing::debug!(
        query = %req.query,
        start = %req.start,
        end = %req.end,
        step_secs = req.step.as_secs(),
        limit = req.limit,
        direction = %req.direction,
        "Executing range query"
    );

    let query = state.engine.new_range_query(&req);
    let result = exec_with_deadline(&state, query.exec()).await?;

    let response = encode_query_result(ApiVersion::from_path(uri.path()), &result)?;
    metrics::record_duration("query_range", start.elapsed());
    Ok(response)
}

/// Handle GET /loki/api/v1/query
pub async fn instant_query(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<Params>,
) -> Result<Response, AppError> {
    let start = Instant::now();
    metrics::record_request("query");

    let req = request::instant_query_request(&params)?;

    tracing::debug!(
        query = %req.query,
        ts = %req.ts,
        limit = req.limit,
        direction = %req.direction,
        "Executing instant query"
    );

    let query = state.engine.new_instant_query(&req);
    let result = exec_with_deadline(&state, query.exec()).await?;

    let response = encode_query_result(ApiVersion::from_path(uri.path()), &result)?;
    metrics::record_duration("query", start.elapsed());
    Ok(response)
}

/// Handle GET /api/prom/query: the legacy log query endpoint, which still
/// accepts the deprecated `regexp` parameter.
pub async fn log_query(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<Params>,
) -> Result<Response, AppError> {
    let start = Instant::now();
    metrics::record_request("log_query");

    let mut req = request::range_query_request(&params)?;
    req.query = request::parse_regex_query(&params)?;

    tracing::debug!(query = %req.query, limit = req.limit, "Executing legacy log query");

    let query = state.engine.new_range_query(&req);
    let result = exec_with_deadline(&state, query.exec()).await?;

    let response = encode_query_result(ApiVersion::from_path(uri.path()), &result)?;
    metrics::record_duration("log_query", start.elapsed());
    Ok(response)
}

/// Enforce the configured query timeout while the engine executes. The
/// deadline covers only the engine call, not normalization or encoding.
async fn exec_with_deadline(
    state: &AppState,
    exec: impl std::future::Future<Output = Result<QueryResult, AppError>>,
) -> Result<QueryResult, AppError> {
    let timeout = state.config.load().limits.query_timeout();
    tokio::time::timeout(timeout, exec)
        .await
        .map_err(|_| AppError::Engine(format!("query timed out after {:?}", timeout)))?
}

fn encode_query_result(version: ApiVersion, result: &QueryResult) -> Result<Response, AppError> {
    let body = marshal::write_query_response(version, result)?;
    Ok((
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/json")],
        body,
    )
        .into_response())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::model::{Entry, Labels};
    use arc_swap::ArcSwap;
    use chrono::{TimeZone, Utc};

    pub(crate) fn test_state() -> AppState {
        AppState {
            config: Arc::new(ArcSwap::from_pointee(Config::default())),
            engine: Arc::new(Engine::new()),
        }
    }

    fn params(pairs: &[(&str, &str)]) -> Params {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn seed(state: &AppState) {
        let mut labels = Labels::new();
        labels.insert("app".to_string(), "x".to_string());
        state.engine.push(
            labels,
            vec![Entry {
                timestamp: Utc.timestamp_opt(1_700_000_000, 0).unwrap(),
                line: "error: it broke".to_string(),
            }],
        );
    }

    #[tokio::test]
    async fn test_query_range_happy_path() {
        let state = test_state();
        seed(&state);

        let response = query_range(
            State(state),
            Uri::from_static("/loki/api/v1/query_range"),
            Query(params(&[
                ("query", r#"{app="x"}"#),
                ("start", "1690000000"),
                ("end", "1710000000"),
            ])),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_query_range_bad_parameter_is_400() {
        let state = test_state();
        let err = query_range(
            State(state),
            Uri::from_static("/loki/api/v1/query_range"),
            Query(params(&[("limit", "abc")])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_bad_query_is_400() {
        let state = test_state();
        let err = instant_query(
            State(state),
            Uri::from_static("/loki/api/v1/query"),
            Query(params(&[("query", "not a selector")])),
        )
        .await
        .unwrap_err();
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_log_query_combines_regexp() {
        let state = test_state();
        seed(&state);

        let response = log_query(
            State(state),
            Uri::from_static("/api/prom/query"),
            Query(params(&[
                ("query", r#"{app="x"}"#),
                ("regexp", "error.*"),
                ("start", "1690000000"),
                ("end", "1710000000"),
            ])),
        )
        .await
        .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
