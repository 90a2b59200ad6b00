use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::interval;

use crate::state::AppState;
use crate::ws::protocol;
use crate::ws::Connection;

/// Keepalive ping interval. Pings keep intermediaries from dropping idle
/// sockets; a missing pong never closes the connection.
const PING_INTERVAL: Duration = Duration::from_secs(30);

/// Run the actor-per-connection pattern for an admitted WebSocket.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Reader loop: decodes incoming text frames and dispatches them
///
/// The registry holds a clone of the channel sender, so any part of the
/// system can reach this client through `SessionRegistry::send`.
pub async fn run_connection(socket: WebSocket, state: AppState, account_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::unbounded_channel::<Message>();

    let connection = Connection::new(tx.clone());
    let connection_id = connection.id();
    state.registry.admit(&account_id, connection);

    tracing::info!(
        account_id = %account_id,
        connection_id = %connection_id,
        "WebSocket actor started"
    );

    let writer_handle = tokio::spawn(writer_task(ws_sender, rx));

    let ping_tx = tx.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(PING_INTERVAL);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;
            if ping_tx.send(Message::Ping(Vec::new().into())).is_err() {
                // Writer task has died, connection is gone
                break;
            }
        }
    });

    // Frames from one connection are handled strictly in arrival order.
    loop {
        match ws_receiver.next().await {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_frame(text.as_str(), &state.dispatch, &account_id);
                }
                Message::Binary(data) => {
                    tracing::debug!(
                        account_id = %account_id,
                        bytes = data.len(),
                        "Ignoring binary frame (expected JSON text)"
                    );
                }
                // tungstenite answers pings on its own
                Message::Ping(_) | Message::Pong(_) => {}
                Message::Close(frame) => {
                    tracing::info!(
                        account_id = %account_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    account_id = %account_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(account_id = %account_id, "WebSocket stream ended");
                break;
            }
        }
    }

    writer_handle.abort();
    ping_handle.abort();

    state.registry.remove(&account_id, connection_id);

    tracing::info!(
        account_id = %account_id,
        connection_id = %connection_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if ws_sender.send(msg).await.is_err() {
            break;
        }
    }
}
