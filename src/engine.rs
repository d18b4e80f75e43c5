//! The query and tailing engine behind the HTTP handlers.
//!
//! The handlers only depend on the contract here: build a query, execute it
//! under a caller-supplied deadline, fetch labels, or start a tail session.
//! This implementation keeps streams in memory, keyed by their canonical
//! label text, and fans newly pushed entries out to live tail subscribers
//! over a broadcast channel.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::debug;

use crate::error::AppError;
use crate::logql::{CompiledSelector, Selector};
use crate::model::{
    format_labels, Direction, Entry, LabelRequest, LabelResponse, Labels, LogStream, QueryResult,
    TailResponse,
};
use crate::request::{InstantQueryRequest, RangeQueryRequest, TailRequest};
use crate::tail::TailSession;

const TAIL_BROADCAST_CAPACITY: usize = 1024;
const TAIL_CHANNEL_CAPACITY: usize = 64;

/// One entry fanned out to live tail subscribers.
#[derive(Debug, Clone)]
struct LiveEntry {
    labels: Arc<Labels>,
    entry: Entry,
}

struct StoredStream {
    labels: Labels,
    entries: Vec<Entry>,
}

/// In-memory log engine. Safe for concurrent use by many sessions.
pub struct Engine {
    streams: Arc<DashMap<String, StoredStream>>,
    live: broadcast::Sender<LiveEntry>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub fn new() -> Self {
        let (live, _) = broadcast::channel(TAIL_BROADCAST_CAPACITY);
        Engine {
            streams: Arc::new(DashMap::new()),
            live,
        }
    }

    /// Ingest entries for one label set, appending to the stored stream and
    /// fanning out to live tail subscribers.
    pub fn push(&self, labels: Labels, entries: Vec<Entry>) {
        let key = format_labels(&labels);
        let shared = Arc::new(labels.clone());

        self.streams
            .entry(key)
            .or_insert_with(|| StoredStream {
                labels,
                entries: Vec::new(),
            })
            .entries
            .extend(entries.iter().cloned());

        for entry in entries {
            // send only fails when there are no subscribers
            let _ = self.live.send(LiveEntry {
                labels: shared.clone(),
                entry,
            });
        }
    }

    pub fn new_range_query(&self, request: &RangeQueryRequest) -> Query {
        Query {
            streams: self.streams.clone(),
            query: request.query.clone(),
            start: request.start,
            end: request.end,
            limit: request.limit,
            direction: request.direction,
        }
    }

    pub fn new_instant_query(&self, request: &InstantQueryRequest) -> Query {
        Query {
            streams: self.streams.clone(),
            query: request.query.clone(),
            // instant evaluation: everything up to the requested timestamp
            start: DateTime::<Utc>::MIN_UTC,
            end: request.ts,
            limit: request.limit,
            direction: request.direction,
        }
    }

    /// Label names, or the values of one label, across streams with entries
    /// overlapping the requested time range.
    pub async fn label(&self, request: &LabelRequest) -> Result<LabelResponse, AppError> {
        let mut values: Vec<String> = Vec::new();
        for stream in self.streams.iter() {
            let overlaps = stream
                .entries
                .iter()
                .any(|e| e.timestamp >= request.start && e.timestamp <= request.end);
            if !overlaps {
                continue;
            }
            match &request.name {
                Some(name) => {
                    if let Some(value) = stream.labels.get(name) {
                        values.push(value.clone());
                    }
                }
                None => values.extend(stream.labels.keys().cloned()),
            }
        }
        values.sort();
        values.dedup();
        Ok(LabelResponse { values })
    }

    /// Start a live subscription for a tail request. Sends a backfill frame
    /// of stored entries newer than `start` (capped by the limit), then
    /// forwards matching live entries, holding each back until it is older
    /// than now minus `delay_for`.
    pub fn tail(&self, request: &TailRequest) -> Result<TailSession, AppError> {
        let selector = Selector::parse(&request.query)
            .map_err(|e| AppError::Engine(e.to_string()))?
            .compile()
            .map_err(|e| AppError::Engine(e.to_string()))?;

        let (entry_tx, entry_rx) = mpsc::channel(TAIL_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = mpsc::channel(1);

        let backfill = self.collect(
            &selector,
            request.start,
            Utc::now(),
            request.limit,
            Direction::Forward,
        );

        let mut live_rx = self.live.subscribe();
        let delay = ChronoDuration::seconds(i64::from(request.delay_for));

        let task = tokio::spawn(async move {
            if !backfill.streams.is_empty() {
                if entry_tx.send(backfill).await.is_err() {
                    return;
                }
            }

            loop {
                match live_rx.recv().await {
                    Ok(live) => {
                        if !selector.matches(&live.labels) || !selector.accepts(&live.entry.line) {
                            continue;
                        }
                        // hold young entries so slower producers stay ordered
                        let deliver_at = live.entry.timestamp + delay;
                        let wait = deliver_at - Utc::now();
                        if wait > ChronoDuration::zero() {
                            if let Ok(wait) = wait.to_std() {
                                tokio::time::sleep(wait).await;
                            }
                        }
                        let frame = TailResponse {
                            streams: vec![LogStream {
                                labels: (*live.labels).clone(),
                                entries: vec![live.entry],
                            }],
                        };
                        if entry_tx.send(frame).await.is_err() {
                            debug!("tail subscriber gone, stopping fan-out");
                            return;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        let _ = err_tx.send(format!("tail fell behind, dropped {} entries", n)).await;
                        return;
                    }
                    Err(broadcast::error::RecvError::Closed) => {
                        let _ = err_tx.send("tailing service shut down".to_string()).await;
                        return;
                    }
                }
            }
        });

        Ok(TailSession::new(entry_rx, err_rx, task))
    }

    fn collect(
        &self,
        selector: &CompiledSelector,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        limit: u32,
        direction: Direction,
    ) -> TailResponse {
        let result = evaluate(&self.streams, selector, start, end, limit, direction);
        TailResponse { streams: result.streams }
    }
}

/// A bounded query, ready to execute. The deadline is applied by the caller
/// around `exec`, per the handler contract.
pub struct Query {
    streams: Arc<DashMap<String, StoredStream>>,
    query: String,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: u32,
    direction: Direction,
}

impl Query {
    pub async fn exec(self) -> Result<QueryResult, AppError> {
        let selector = Selector::parse(&self.query)
            .map_err(|e| AppError::Engine(e.to_string()))?
            .compile()
            .map_err(|e| AppError::Engine(e.to_string()))?;

        Ok(evaluate(
            &self.streams,
            &selector,
            self.start,
            self.end,
            self.limit,
            self.direction,
        ))
    }
}

fn evaluate(
    streams: &DashMap<String, StoredStream>,
    selector: &CompiledSelector,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    limit: u32,
    direction: Direction,
) -> QueryResult {
    // gather matching entries across streams, then order and cap globally
    let mut hits: Vec<(String, Labels, Entry)> = Vec::new();
    for stream in streams.iter() {
        if !selector.matches(&stream.labels) {
            continue;
        }
        for entry in &stream.entries {
            if entry.timestamp < start || entry.timestamp > end {
                continue;
            }
            if !selector.accepts(&entry.line) {
                continue;
            }
            hits.push((stream.key().clone(), stream.labels.clone(), entry.clone()));
        }
    }

    match direction {
        Direction::Forward => hits.sort_by_key(|(_, _, e)| e.timestamp),
        Direction::Backward => {
            hits.sort_by_key(|(_, _, e)| std::cmp::Reverse(e.timestamp));
        }
    }
    hits.truncate(limit as usize);

    let mut grouped: BTreeMap<String, LogStream> = BTreeMap::new();
    for (key, labels, entry) in hits {
        grouped
            .entry(key)
            .or_insert_with(|| LogStream {
                labels,
                entries: Vec::new(),
            })
            .entries
            .push(entry);
    }

    QueryResult {
        streams: grouped.into_values().collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Direction;
    use chrono::TimeZone;
    use std::time::Duration;

    fn labels(pairs: &[(&str, &str)]) -> Labels {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    fn entry(ts: i64, line: &str) -> Entry {
        Entry {
            timestamp: Utc.timestamp_opt(ts, 0).unwrap(),
            line: line.to_string(),
        }
    }

    fn seeded_engine() -> Engine {
        let engine = Engine::new();
        engine.push(
            labels(&[("app", "x")]),
            vec![entry(10, "error one"), entry(20, "all fine"), entry(30, "error two")],
        );
        engine.push(labels(&[("app", "y")]), vec![entry(15, "unrelated")]);
        engine
    }

    fn range_request(query: &str, direction: Direction, limit: u32) -> RangeQueryRequest {
        RangeQueryRequest {
            query: query.to_string(),
            start: Utc.timestamp_opt(0, 0).unwrap(),
            end: Utc.timestamp_opt(100, 0).unwrap(),
            step: Duration::from_secs(1),
            limit,
            direction,
        }
    }

    #[tokio::test]
    async fn test_range_query_matches_selector() {
        let engine = seeded_engine();
        let result = engine
            .new_range_query(&range_request(r#"{app="x"}"#, Direction::Forward, 100))
            .exec()
            .await
            .unwrap();
        assert_eq!(result.streams.len(), 1);
        assert_eq!(result.streams[0].entries.len(), 3);
        assert_eq!(result.streams[0].entries[0].line, "error one");
    }

    #[tokio::test]
    async fn test_range_query_applies_line_filters() {
        let engine = seeded_engine();
        let result = engine
            .new_range_query(&range_request(r#"{app="x"} |~ "err.*""#, Direction::Forward, 100))
            .exec()
            .await
            .unwrap();
        let lines: Vec<_> = result.streams[0].entries.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["error one", "error two"]);
    }

    #[tokio::test]
    async fn test_range_query_direction_and_limit() {
        let engine = seeded_engine();
        let result = engine
            .new_range_query(&range_request(r#"{app="x"}"#, Direction::Backward, 2))
            .exec()
            .await
            .unwrap();
        let lines: Vec<_> = result.streams[0].entries.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["error two", "all fine"]);
    }

    #[tokio::test]
    async fn test_bad_selector_is_engine_error() {
        let engine = seeded_engine();
        let err = engine
            .new_range_query(&range_request("not a selector", Direction::Forward, 10))
            .exec()
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Engine(_)));
    }

    #[tokio::test]
    async fn test_instant_query_cuts_off_at_timestamp() {
        let engine = seeded_engine();
        let result = engine
            .new_instant_query(&InstantQueryRequest {
                query: r#"{app="x"}"#.to_string(),
                ts: Utc.timestamp_opt(20, 0).unwrap(),
                limit: 100,
                direction: Direction::Backward,
            })
            .exec()
            .await
            .unwrap();
        let lines: Vec<_> = result.streams[0].entries.iter().map(|e| e.line.as_str()).collect();
        assert_eq!(lines, vec!["all fine", "error one"]);
    }

    #[tokio::test]
    async fn test_label_names_and_values() {
        let engine = seeded_engine();
        let names = engine
            .label(&LabelRequest {
                name: None,
                start: Utc.timestamp_opt(0, 0).unwrap(),
                end: Utc.timestamp_opt(100, 0).unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(names.values, vec!["app".to_string()]);

        let values = engine
            .label(&LabelRequest {
                name: Some("app".to_string()),
                start: Utc.timestamp_opt(0, 0).unwrap(),
                end: Utc.timestamp_opt(100, 0).unwrap(),
            })
            .await
            .unwrap();
        assert_eq!(values.values, vec!["x".to_string(), "y".to_string()]);
    }

    #[tokio::test]
    async fn test_label_respects_time_range() {
        let engine = seeded_engine();
        let values = engine
            .label(&LabelRequest {
                name: Some("app".to_string()),
                start: Utc.timestamp_opt(25, 0).unwrap(),
                end: Utc.timestamp_opt(100, 0).unwrap(),
            })
            .await
            .unwrap();
        // only app=x has entries after t=25
        assert_eq!(values.values, vec!["x".to_string()]);
    }

    #[tokio::test]
    async fn test_tail_receives_live_entries() {
        let engine = seeded_engine();
        let mut session = engine
            .tail(&TailRequest {
                query: r#"{app="x"} |~ "err.*""#.to_string(),
                start: Utc.timestamp_opt(0, 0).unwrap(),
                limit: 10,
                delay_for: 0,
            })
            .unwrap();

        // backfill first: the two stored error lines
        let backfill = tokio::time::timeout(Duration::from_secs(5), session.entries.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(backfill.streams[0].entries.len(), 2);

        engine.push(labels(&[("app", "x")]), vec![entry(40, "error three")]);
        engine.push(labels(&[("app", "y")]), vec![entry(41, "error ignored")]);

        let frame = tokio::time::timeout(Duration::from_secs(5), session.entries.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(frame.streams[0].entries[0].line, "error three");

        session.close();
    }

    #[tokio::test]
    async fn test_tail_rejects_bad_selector() {
        let engine = Engine::new();
        let err = engine
            .tail(&TailRequest {
                query: "garbage".to_string(),
                start: Utc::now(),
                limit: 10,
                delay_for: 0,
            })
            .unwrap_err();
        assert!(matches!(err, AppError::Engine(_)));
    }
}
