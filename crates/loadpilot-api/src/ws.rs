//! WebSocket transport for observers.

use std::sync::Arc;

use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info};

use loadpilot_queue::QueueCommandPort;

use crate::hub::BroadcastHub;
use crate::protocol::{Frame, ProtocolError};

/// Point-to-point replies queued per connection.
const DIRECT_CAPACITY: usize = 16;

/// `GET /ws` — upgrade and attach the socket to the hub.
pub async fn ws_handler<P: QueueCommandPort>(
    State(hub): State<Arc<BroadcastHub<P>>>,
    ws: WebSocketUpgrade,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(hub, socket))
}

async fn handle_socket<P: QueueCommandPort>(hub: Arc<BroadcastHub<P>>, socket: WebSocket) {
    let observer = hub.connect().await;
    info!(observers = hub.observer_count(), "observer attached");

    let (mut sink, mut stream) = socket.split();
    let (direct_tx, mut direct_rx) = mpsc::channel::<Frame>(DIRECT_CAPACITY);

    // Writer: initial frame first, then broadcasts and direct replies as
    // they arrive.
    let mut feed = observer.feed;
    let initial = observer.initial;
    let mut writer = tokio::spawn(async move {
        if sink.send(text(initial)).await.is_err() {
            return;
        }
        loop {
            let frame = tokio::select! {
                received = feed.recv() => match received {
                    Ok(frame) => frame,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(skipped, "observer lagging, dropped updates");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
                direct = direct_rx.recv() => match direct {
                    Some(frame) => frame,
                    None => break,
                },
            };
            if sink.send(text(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    // Reader: commands in, replies out through the writer.
    let reader_hub = Arc::clone(&hub);
    let mut reader = tokio::spawn(async move {
        while let Some(message) = stream.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => {
                    debug!(error = %e, "observer socket error");
                    break;
                }
            };
            let reply = match message {
                Message::Text(body) => reader_hub.handle_text(body.as_str()).await,
                Message::Binary(_) => Some(reader_hub.reject(ProtocolError::BinaryFrame)),
                Message::Close(_) => break,
                // Pings are answered by axum.
                Message::Ping(_) | Message::Pong(_) => None,
            };
            if let Some(reply) = reply {
                if direct_tx.send(reply.to_frame()).await.is_err() {
                    break;
                }
            }
        }
    });

    tokio::select! {
        _ = &mut writer => reader.abort(),
        _ = &mut reader => writer.abort(),
    }
    info!("observer detached");
}

fn text(frame: Frame) -> Message {
    Message::Text(frame.as_ref().into())
}
