//! WebSocket route handler.
//!
//! Each connection follows one job's live topic and forwards every payload
//! as a text frame until either side goes away.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Path, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use futures::{SinkExt, StreamExt};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, warn};

use crate::notifications::{LiveChannel, LiveMessage};
use crate::server::state::{GuardedJobRegistry, GuardedLiveChannel};

/// Route handler for `GET /v1/jobs/{id}/live`.
pub async fn live_ws_handler(
    ws: WebSocketUpgrade,
    Path(job_id): Path<String>,
    State(registry): State<GuardedJobRegistry>,
    State(live): State<GuardedLiveChannel>,
) -> Response {
    if registry.get_job(&job_id).is_none() {
        return StatusCode::NOT_FOUND.into_response();
    }

    let topic = LiveChannel::topic_for_job(&job_id);
    // Subscribe before upgrading so nothing published in between is lost.
    let receiver = live.subscribe(&topic).await;
    debug!("WebSocket upgrade for live topic {}", topic);

    ws.on_upgrade(move |socket| handle_socket(socket, topic, receiver))
}

async fn handle_socket(
    socket: WebSocket,
    topic: String,
    receiver: broadcast::Receiver<LiveMessage>,
) {
    let (ws_sink, mut ws_stream) = socket.split();

    let mut outgoing_handle = tokio::spawn(forward_outgoing(ws_sink, receiver));

    loop {
        tokio::select! {
            _ = &mut outgoing_handle => break,
            incoming = ws_stream.next() => match incoming {
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => debug!("Ignoring client message on {}", topic),
                Some(Err(e)) => {
                    debug!("WebSocket error on {}: {}", topic, e);
                    break;
                }
            }
        }
    }

    outgoing_handle.abort();
    debug!("WebSocket disconnected from {}", topic);
}

/// Forward messages from the live topic to the WebSocket.
async fn forward_outgoing(
    mut ws_sink: futures::stream::SplitSink<WebSocket, Message>,
    mut receiver: broadcast::Receiver<LiveMessage>,
) {
    loop {
        match receiver.recv().await {
            Ok(message) => {
                if ws_sink
                    .send(Message::Text(message.payload.into()))
                    .await
                    .is_err()
                {
                    break;
                }
            }
            Err(RecvError::Lagged(skipped)) => {
                warn!("Live subscriber lagged, {} messages skipped", skipped);
            }
            Err(RecvError::Closed) => {
                let _ = ws_sink.send(Message::Close(None)).await;
                break;
            }
        }
    }
}
