//! WebSocket tail handler.
//!
//! Lifecycle: build the tail request (rejecting bad parameters before the
//! upgrade), upgrade the connection, start a subscription with the engine,
//! then run the streaming event loop until a terminal event. Post-upgrade
//! failures have no HTTP status to return; they are reported via a
//! best-effort close frame and logged.

use axum::{
    extract::{
        ws::{close_code, CloseFrame, Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::Uri,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::{
    handlers::query::AppState,
    marshal::ApiVersion,
    metrics,
    params::Params,
    request,
    tail::{run_tail_loop, Frame, FrameSink, WS_PING_PERIOD},
};

/// Handle GET /loki/api/v1/tail and /api/prom/tail
pub async fn tail(
    State(state): State<AppState>,
    uri: Uri,
    Query(params): Query<Params>,
    ws: WebSocketUpgrade,
) -> Response {
    // parameter problems (including delay_for above the maximum) surface as
    // a structured 400 before any upgrade is attempted
    let req = match request::tail_request(&params) {
        Ok(req) => req,
        Err(e) => return e.into_response(),
    };

    let version = ApiVersion::from_path(uri.path());

    ws.on_upgrade(move |socket| handle_tail_socket(socket, state, req, version))
}

async fn handle_tail_socket(
    socket: WebSocket,
    state: AppState,
    req: request::TailRequest,
    version: ApiVersion,
) {
    let mut sink = WsSink { socket };

    let session = match state.engine.tail(&req) {
        Ok(session) => session,
        Err(e) => {
            error!(error = %e, query = %req.query, "Error starting tail subscription");
            let _ = sink.send(Frame::Close(e.to_string())).await;
            return;
        }
    };

    debug!(query = %req.query, delay_for = req.delay_for, "Tail session started");
    metrics::tail_session_started();

    run_tail_loop(session, sink, version, WS_PING_PERIOD).await;

    metrics::tail_session_ended();
    debug!(query = %req.query, "Tail session ended");
}

/// Frame sink backed by the upgraded WebSocket. The connection itself is
/// released when the socket drops at the end of the session.
struct WsSink {
    socket: WebSocket,
}

impl FrameSink for WsSink {
    async fn send(&mut self, frame: Frame) -> Result<(), axum::Error> {
        let message = match frame {
            Frame::Data(json) => Message::Text(json),
            Frame::Ping => Message::Ping(Vec::new()),
            Frame::Close(reason) => Message::Close(Some(CloseFrame {
                code: close_code::ERROR,
                reason: reason.into(),
            })),
        };
        self.socket.send(message).await
    }
}
