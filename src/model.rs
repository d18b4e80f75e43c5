use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Ordering of returned log entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Direction {
    /// Oldest entries first
    Forward,
    /// Newest entries first
    Backward,
}

impl Direction {
    /// Case-insensitive parse of a direction value.
    pub fn parse(value: &str) -> Option<Direction> {
        match value.to_uppercase().as_str() {
            "FORWARD" => Some(Direction::Forward),
            "BACKWARD" => Some(Direction::Backward),
            _ => None,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "FORWARD"),
            Direction::Backward => write!(f, "BACKWARD"),
        }
    }
}

/// A single log line with its timestamp.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entry {
    pub timestamp: DateTime<Utc>,
    pub line: String,
}

/// Label set for a stream. BTreeMap keeps label ordering deterministic,
/// which the canonical text form depends on.
pub type Labels = BTreeMap<String, String>;

/// A log stream: one label set plus its entries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogStream {
    pub labels: Labels,
    pub entries: Vec<Entry>,
}

/// Result of a range or instant query.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct QueryResult {
    pub streams: Vec<LogStream>,
}

/// Request for label names or label values over a time range.
#[derive(Debug, Clone)]
pub struct LabelRequest {
    /// When set, return the values of this label; otherwise label names.
    pub name: Option<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Response for label name/value queries.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelResponse {
    pub values: Vec<String>,
}

/// One frame of a live tail: newly arrived entries grouped by stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailResponse {
    pub streams: Vec<LogStream>,
}

/// Canonical text form of a label set: `{a="b", c="d"}`.
pub fn format_labels(labels: &Labels) -> String {
    let mut out = String::from("{");
    for (i, (name, value)) in labels.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(name);
        out.push_str("=\"");
        for c in value.chars() {
            match c {
                '"' => out.push_str("\\\""),
                '\\' => out.push_str("\\\\"),
                _ => out.push(c),
            }
        }
        out.push('"');
    }
    out.push('}');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_direction_parse() {
        assert_eq!(Direction::parse("forward"), Some(Direction::Forward));
        assert_eq!(Direction::parse("BACKWARD"), Some(Direction::Backward));
        assert_eq!(Direction::parse("Backward"), Some(Direction::Backward));
        assert_eq!(Direction::parse("sideways"), None);
    }

    #[test]
    fn test_format_labels() {
        let mut labels = Labels::new();
        labels.insert("app".to_string(), "x".to_string());
        labels.insert("env".to_string(), "prod".to_string());
        assert_eq!(format_labels(&labels), r#"{app="x", env="prod"}"#);
    }

    #[test]
    fn test_format_labels_escapes_quotes() {
        let mut labels = Labels::new();
        labels.insert("msg".to_string(), "say \"hi\"".to_string());
        assert_eq!(format_labels(&labels), r#"{msg="say \"hi\""}"#);
    }
}
