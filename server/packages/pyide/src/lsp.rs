//! `/lsp` WebSocket endpoint.
//!
//! Every connection gets its own relay and, once the client sends `initialize`,
//! its own language-server process. Closing the socket stops that process.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::Response;
use futures::stream::SplitSink;
use futures::{SinkExt, StreamExt};
use pyide_lsp_relay::{Relay, RelayReport};
use serde_json::Value;
use tokio::sync::mpsc;

use crate::router::AppState;

const CHANNEL_CAPACITY: usize = 256;

/// WebSocket upgrade handler for language-server connections
pub async fn lsp_ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.on_upgrade(move |socket| handle_lsp_socket(socket, state))
}

async fn handle_lsp_socket(socket: WebSocket, state: Arc<AppState>) {
    let _active = state.relay_started();
    let (ws_sender, mut ws_receiver) = socket.split();
    let (client_tx, client_rx) = mpsc::channel::<Value>(CHANNEL_CAPACITY);
    let (incoming_tx, incoming_rx) = mpsc::channel::<String>(CHANNEL_CAPACITY);

    let relay = Relay::new(
        state.language_server_launcher(),
        state.relay_config(),
        client_tx,
    );
    let mut relay_task = tokio::spawn(relay.run(incoming_rx, state.shutdown_receiver()));
    let output_task = tokio::spawn(forward_to_client(client_rx, ws_sender));
    tracing::info!("lsp client connected");

    let mut finished = None;
    loop {
        tokio::select! {
            report = &mut relay_task => {
                finished = Some(report);
                break;
            }
            message = ws_receiver.next() => {
                let text = match message {
                    Some(Ok(Message::Text(text))) => text,
                    Some(Ok(Message::Binary(data))) => match String::from_utf8(data) {
                        Ok(text) => text,
                        Err(err) => {
                            tracing::warn!(error = %err, "dropping non-UTF-8 lsp frame");
                            continue;
                        }
                    },
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => continue,
                    Some(Err(err)) => {
                        tracing::debug!(error = %err, "lsp socket error");
                        break;
                    }
                };
                if incoming_tx.send(text).await.is_err() {
                    break;
                }
            }
        }
    }

    // Relay sees the closed channel and stops the server.
    drop(incoming_tx);
    let report = match finished {
        Some(report) => report,
        None => relay_task.await,
    };
    match report {
        Ok(report) => log_report(&report),
        Err(err) => tracing::error!(error = %err, "lsp relay task failed"),
    }

    if let Err(err) = output_task.await {
        tracing::debug!(error = %err, "lsp output task ended abnormally");
    }
}

/// Forwards relay messages to the socket until the relay drops its sender.
async fn forward_to_client(
    mut client_rx: mpsc::Receiver<Value>,
    mut ws_sender: SplitSink<WebSocket, Message>,
) {
    while let Some(message) = client_rx.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(err) => {
                tracing::warn!(error = %err, "failed to serialize lsp message");
                continue;
            }
        };
        if ws_sender.send(Message::Text(text)).await.is_err() {
            // Client is gone; keep draining so the relay never blocks.
            while client_rx.recv().await.is_some() {}
            return;
        }
    }
    let _ = ws_sender.send(Message::Close(None)).await;
}

fn log_report(report: &RelayReport) {
    tracing::info!(
        last_state = ?report.last_state,
        frames_to_server = report.frames_to_server,
        frames_to_client = report.frames_to_client,
        unanswered_requests = report.unanswered_requests,
        "lsp client disconnected"
    );
}
