//! Live tail session: channel ownership and the streaming event loop.
//!
//! A session is owned exclusively by one connection's event loop. The loop
//! waits on three sources at once: new entries, a terminal error from the
//! tailing service, and a liveness timer. Frames go out in the order events
//! are observed, and every exit path releases the subscription and sends a
//! best-effort close frame where one is due.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error};

use crate::marshal::{self, ApiVersion};
use crate::metrics;
use crate::model::TailResponse;

/// Interval between liveness probe frames. Fixed and independent of traffic;
/// it exists to reclaim dead connections when no entries are flowing.
pub const WS_PING_PERIOD: Duration = Duration::from_secs(1);

/// A live subscription handle: entry channel, terminal-error channel, and the
/// producer task feeding them. Consumed exactly once by [`run_tail_loop`];
/// dropping or closing it releases the subscription.
#[derive(Debug)]
pub struct TailSession {
    pub entries: mpsc::Receiver<TailResponse>,
    pub errors: mpsc::Receiver<String>,
    task: JoinHandle<()>,
}

impl TailSession {
    pub fn new(
        entries: mpsc::Receiver<TailResponse>,
        errors: mpsc::Receiver<String>,
        task: JoinHandle<()>,
    ) -> Self {
        TailSession { entries, errors, task }
    }

    /// Release the subscription. Takes `self`, so release happens at most once.
    pub fn close(self) {
        self.task.abort();
    }
}

/// One outgoing frame on the streaming connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A JSON-encoded tail response
    Data(String),
    /// Liveness probe
    Ping,
    /// Terminal close with a UTF-8 reason
    Close(String),
}

/// Where frames are written. The WebSocket sender implements this; tests use
/// an in-memory sink.
pub trait FrameSink {
    fn send(&mut self, frame: Frame) -> impl std::future::Future<Output = Result<(), axum::Error>> + Send;
}

/// Runs a tail session to completion: forwards entries, forwards errors,
/// emits periodic pings, and tears everything down on the first terminal
/// event. The session is released on every exit path.
pub async fn run_tail_loop<S: FrameSink>(
    mut session: TailSession,
    mut sink: S,
    version: ApiVersion,
    ping_period: Duration,
) {
    let mut ticker = tokio::time::interval(ping_period);
    // the first tick fires immediately; a probe before any traffic is noise
    ticker.tick().await;

    loop {
        tokio::select! {
            response = session.entries.recv() => {
                let Some(response) = response else {
                    debug!("tail entry channel closed");
                    let _ = sink.send(Frame::Close("tail stream ended".to_string())).await;
                    break;
                };
                match marshal::write_tail_response(version, &response) {
                    Ok(json) => {
                        if let Err(e) = sink.send(Frame::Data(json)).await {
                            debug!(error = %e, "error writing tail frame, closing connection");
                            break;
                        }
                        metrics::record_tail_frame("data");
                    }
                    Err(e) => {
                        error!(error = %e, "error encoding tail frame");
                        let _ = sink.send(Frame::Close(e.to_string())).await;
                        break;
                    }
                }
            }
            err = session.errors.recv() => {
                let reason = err.unwrap_or_else(|| "tail stream closed".to_string());
                error!(error = %reason, "terminal error from tailing service");
                let _ = sink.send(Frame::Close(reason)).await;
                break;
            }
            _ = ticker.tick() => {
                if let Err(e) = sink.send(Frame::Ping).await {
                    debug!(error = %e, "error writing ping, closing connection");
                    break;
                }
                metrics::record_tail_frame("ping");
            }
        }
    }

    session.close();
}
