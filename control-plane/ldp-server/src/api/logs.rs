//! Websocket log streaming. Browsers cannot attach headers to upgrade
//! requests, so the handshake consumes a short-lived temp token instead;
//! after the upgrade one task pumps pod log lines out while another
//! enforces the client keep-alive protocol. The first failure on either
//! side cancels both through a shared token.

use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use futures::stream::{SplitSink, SplitStream};
use futures::{AsyncBufReadExt, SinkExt, StreamExt};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::api::AppState;
use crate::core::{Authentication, LogStream};
use crate::errors::{ServerError, ServerResult};

/// The client must send a `ping` text frame at least this often.
const PING_DEADLINE: Duration = Duration::from_secs(20);
/// Budget for writing one log line to the socket.
const WRITE_DEADLINE: Duration = Duration::from_secs(1);

#[derive(Debug, Deserialize)]
pub struct LogStreamQuery {
    pub token: Option<String>,
    pub replica: Option<usize>,
}

pub async fn service_logs(
    State(state): State<AppState>,
    Path(id): Path<i32>,
    Query(query): Query<LogStreamQuery>,
    ws: WebSocketUpgrade,
) -> ServerResult<Response> {
    let token = query
        .token
        .ok_or_else(|| ServerError::unauthorized("Token is not provided"))?;
    let username = state
        .core
        .tokens
        .consume_temp_token(&token)
        .await?
        .ok_or_else(|| ServerError::forbidden("Invalid token provided"))?;
    let replica = query.replica.unwrap_or(0);
    let auth = Authentication::user(username);

    Ok(ws.on_upgrade(move |socket| {
        handle_log_socket(state, socket, id, replica, auth)
    }))
}

async fn handle_log_socket(
    state: AppState,
    socket: WebSocket,
    service_id: i32,
    replica: usize,
    auth: Authentication,
) {
    let stream = match state
        .core
        .services
        .stream_service_logs(service_id, replica, &auth)
        .await
    {
        Ok(stream) => stream,
        Err(err) => {
            error!(error = %err, service_id, "failed to open pod log stream");
            return;
        }
    };

    let cancel = CancellationToken::new();
    let (sender, receiver) = socket.split();
    let monitor = tokio::spawn(monitor_pings(receiver, cancel.clone()));

    pump_logs(stream, sender, cancel.clone()).await;

    cancel.cancel();
    let _ = monitor.await;
    debug!(service_id, "log stream closed");
}

/// Require a `ping` text frame within every deadline window; anything
/// else tears the stream down.
async fn monitor_pings(
    mut receiver: SplitStream<WebSocket>,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = tokio::time::timeout(PING_DEADLINE, receiver.next()) => frame,
        };
        match frame {
            Err(_) => {
                warn!("websocket ping read timed out");
                cancel.cancel();
                return;
            }
            Ok(None) | Ok(Some(Ok(Message::Close(_)))) => {
                debug!("websocket connection closed by client");
                cancel.cancel();
                return;
            }
            Ok(Some(Err(err))) => {
                warn!(error = %err, "websocket ping read failed");
                cancel.cancel();
                return;
            }
            Ok(Some(Ok(Message::Text(text)))) if text.as_str() == "ping" => {
                debug!("ping received");
            }
            Ok(Some(Ok(_))) => {
                warn!("unexpected websocket message instead of ping");
                cancel.cancel();
                return;
            }
        }
    }
}

async fn pump_logs(
    stream: LogStream,
    mut sender: SplitSink<WebSocket, Message>,
    cancel: CancellationToken,
) {
    let mut lines = stream.lines();
    loop {
        let next = tokio::select! {
            _ = cancel.cancelled() => return,
            line = lines.next() => line,
        };
        let line = match next {
            Some(Ok(line)) => line,
            Some(Err(err)) => {
                warn!(error = %err, "failed to read service logs");
                cancel.cancel();
                return;
            }
            None => {
                cancel.cancel();
                return;
            }
        };
        let send = sender.send(Message::Text(format!("{line}\n").into()));
        match tokio::time::timeout(WRITE_DEADLINE, send).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                warn!(error = %err, "failed to write service logs to websocket");
                cancel.cancel();
                return;
            }
            Err(_) => {
                warn!("websocket write timed out");
                cancel.cancel();
                return;
            }
        }
    }
}
