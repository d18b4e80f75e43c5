//! Version-aware JSON encoding for query results, label responses, and tail
//! frames. The API version is derived from the request path once and the
//! matching encoder is passed down, rather than branching at every write site.

use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::AppError;
use crate::model::{format_labels, LabelResponse, LogStream, QueryResult, TailResponse};

/// API version marker parsed from the request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiVersion {
    V1,
    Legacy,
}

impl ApiVersion {
    pub fn from_path(path: &str) -> ApiVersion {
        if path.starts_with("/loki/api/v1") {
            ApiVersion::V1
        } else {
            ApiVersion::Legacy
        }
    }
}

#[derive(Serialize)]
struct V1QueryResponse<'a> {
    status: &'static str,
    data: V1QueryData<'a>,
}

#[derive(Serialize)]
struct V1QueryData<'a> {
    #[serde(rename = "resultType")]
    result_type: &'static str,
    result: Vec<V1Stream<'a>>,
}

#[derive(Serialize)]
struct V1Stream<'a> {
    stream: &'a BTreeMap<String, String>,
    values: Vec<(String, &'a str)>,
}

#[derive(Serialize)]
struct LegacyQueryResponse<'a> {
    streams: Vec<LegacyStream<'a>>,
}

#[derive(Serialize)]
struct LegacyStream<'a> {
    labels: String,
    entries: Vec<LegacyEntry<'a>>,
}

#[derive(Serialize)]
struct LegacyEntry<'a> {
    ts: String,
    line: &'a str,
}

#[derive(Serialize)]
struct V1LabelResponse<'a> {
    status: &'static str,
    data: &'a [String],
}

#[derive(Serialize)]
struct LegacyLabelResponse<'a> {
    values: &'a [String],
}

#[derive(Serialize)]
struct V1TailFrame<'a> {
    streams: Vec<V1Stream<'a>>,
}

#[derive(Serialize)]
struct LegacyTailFrame<'a> {
    streams: Vec<LegacyStream<'a>>,
}

pub fn write_query_response(version: ApiVersion, result: &QueryResult) -> Result<String, AppError> {
    let json = match version {
        ApiVersion::V1 => serde_json::to_string(&V1QueryResponse {
            status: "success",
            data: V1QueryData {
                result_type: "streams",
                result: result.streams.iter().map(v1_stream).collect(),
            },
        })?,
        ApiVersion::Legacy => serde_json::to_string(&LegacyQueryResponse {
            streams: result.streams.iter().map(legacy_stream).collect(),
        })?,
    };
    Ok(json)
}

pub fn write_label_response(version: ApiVersion, response: &LabelResponse) -> Result<String, AppError> {
    let json = match version {
        ApiVersion::V1 => serde_json::to_string(&V1LabelResponse {
            status: "success",
            data: &response.values,
        })?,
        ApiVersion::Legacy => serde_json::to_string(&LegacyLabelResponse {
            values: &response.values,
        })?,
    };
    Ok(json)
}

pub fn write_tail_response(version: ApiVersion, response: &TailResponse) -> Result<String, AppError> {
    let json = match version {
        ApiVersion::V1 => serde_json::to_string(&V1TailFrame {
            streams: response.streams.iter().map(v1_stream).collect(),
        })?,
        ApiVersion::Legacy => serde_json::to_string(&LegacyTailFrame {
            streams: response.streams.iter().map(legacy_stream).collect(),
        })?,
    };
    Ok(json)
}

fn v1_stream(stream: &LogStream) -> V1Stream<'_> {
    V1Stream {
        stream: &stream.labels,
        values: stream
            .entries
            .iter()
            .map(|e| {
                (
                    e.timestamp.timestamp_nanos_opt().unwrap_or(0).to_string(),
                    e.line.as_str(),
                )
            })
            .collect(),
    }
}

fn legacy_stream(stream: &LogStream) -> LegacyStream<'_> {
    LegacyStream {
        labels: format_labels(&stream.labels),
        entries: stream
            .entries
            .iter()
            .map(|e| LegacyEntry {
                ts: e.timestamp.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
                line: &e.line,
            })
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Entry, Labels};
    use chrono::{TimeZone, Utc};
    use serde_json::{json, Value};

    fn sample_result() -> QueryResult {
        let mut labels = Labels::new();
        labels.insert("app".to_string(), "x".to_string());
        QueryResult {
            streams: vec![LogStream {
                labels,
                entries: vec![Entry {
                    timestamp: Utc.timestamp_opt(1, 500_000_000).unwrap(),
                    line: "hello".to_string(),
                }],
            }],
        }
    }

    #[test]
    fn test_version_from_path() {
        assert_eq!(ApiVersion::from_path("/loki/api/v1/query_range"), ApiVersion::V1);
        assert_eq!(ApiVersion::from_path("/loki/api/v1/tail"), ApiVersion::V1);
        assert_eq!(ApiVersion::from_path("/api/prom/query"), ApiVersion::Legacy);
        assert_eq!(ApiVersion::from_path("/api/prom/tail"), ApiVersion::Legacy);
    }

    #[test]
    fn test_v1_query_response_shape() {
        let body = write_query_response(ApiVersion::V1, &sample_result()).unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(
            value,
            json!({
                "status": "success",
                "data": {
                    "resultType": "streams",
                    "result": [
                        {"stream": {"app": "x"}, "values": [["1500000000", "hello"]]}
                    ]
                }
            })
        );
    }

    #[test]
    fn test_legacy_query_response_shape() {
        let body = write_query_response(ApiVersion::Legacy, &sample_result()).unwrap();
        let value: Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["streams"][0]["labels"], json!(r#"{app="x"}"#));
        assert_eq!(value["streams"][0]["entries"][0]["line"], json!("hello"));
        assert_eq!(
            value["streams"][0]["entries"][0]["ts"],
            json!("1970-01-01T00:00:01.500000000Z")
        );
    }

    #[test]
    fn test_label_response_shapes() {
        let resp = LabelResponse {
            values: vec!["app".to_string(), "env".to_string()],
        };
        let v1: Value = serde_json::from_str(&write_label_response(ApiVersion::V1, &resp).unwrap()).unwrap();
        assert_eq!(v1, json!({"status": "success", "data": ["app", "env"]}));

        let legacy: Value =
            serde_json::from_str(&write_label_response(ApiVersion::Legacy, &resp).unwrap()).unwrap();
        assert_eq!(legacy, json!({"values": ["app", "env"]}));
    }

    #[test]
    fn test_tail_frame_shapes() {
        let frame = TailResponse {
            streams: sample_result().streams,
        };
        let v1: Value = serde_json::from_str(&write_tail_response(ApiVersion::V1, &frame).unwrap()).unwrap();
        assert_eq!(v1["streams"][0]["values"][0], json!(["1500000000", "hello"]));

        let legacy: Value =
            serde_json::from_str(&write_tail_response(ApiVersion::Legacy, &frame).unwrap()).unwrap();
        assert_eq!(legacy["streams"][0]["labels"], json!(r#"{app="x"}"#));
    }
}
