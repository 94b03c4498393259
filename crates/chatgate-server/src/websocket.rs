//! WebSocket transport for relay sessions

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
};
use futures::channel::mpsc as frames;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::registry::ConnectionId;
use crate::session::{InboundFrame, RelaySession};
use crate::state::AppState;

/// Inbound frames buffered ahead of the session
const INBOUND_BUFFER: usize = 8;

pub async fn websocket_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let id = ConnectionId::new();
    let (mut sender, mut receiver) = socket.split();
    let cancel = CancellationToken::new();

    let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(state.config.upstream.outbound_buffer);
    let (mut inbound_tx, inbound_rx) = frames::channel::<InboundFrame>(INBOUND_BUFFER);

    // Outbound queue -> socket
    let writer_cancel = cancel.clone();
    let send_task = tokio::spawn(async move {
        while let Some(text) = outbound_rx.recv().await {
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        writer_cancel.cancel();
        let _ = sender.close().await;
    });

    // Socket -> inbound frames
    let reader_cancel = cancel.clone();
    let recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            let frame = match msg {
                Message::Text(text) => InboundFrame::Text(text),
                Message::Close(_) => {
                    let _ = inbound_tx.send(InboundFrame::Close).await;
                    break;
                }
                other => {
                    trace!("Ignoring non-text frame: {:?}", other);
                    InboundFrame::Ignored
                }
            };
            if inbound_tx.send(frame).await.is_err() {
                break;
            }
        }
        reader_cancel.cancel();
    });

    let session = RelaySession::new(id, state.pipeline.clone(), state.registry.clone());
    let reason = session.run(outbound_tx, inbound_rx, cancel.clone()).await;
    debug!(connection = %id, ?reason, "WebSocket session finished");

    // The session's binding (and with it the last outbound sender) is gone,
    // so the writer drains what is queued and then exits.
    cancel.cancel();
    recv_task.abort();
    let _ = send_task.await;
}
