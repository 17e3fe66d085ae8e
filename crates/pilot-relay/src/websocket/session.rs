//! One WebSocket connection from upgrade through disconnect.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use chrono::Utc;
use futures::{Sink, SinkExt, StreamExt};
use metrics::{counter, gauge};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, trace};

use crate::broker::RelayBroker;

/// How long the writer gets to flush a Close frame once the session ends.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

/// Text carried by a data frame. Binary frames count as text when they are
/// valid UTF-8.
fn frame_text(msg: Message) -> Option<String> {
    match msg {
        Message::Text(text) => Some(text.to_string()),
        Message::Binary(data) => String::from_utf8(data.to_vec()).ok(),
        Message::Ping(_) | Message::Pong(_) | Message::Close(_) => None,
    }
}

/// Drain queued frames into the socket until `closed` fires or a write fails.
///
/// A failed write cancels `closed` so the reader stops and the endpoint is
/// disconnected. A relay-side close sends a Close frame first.
async fn write_loop<S>(
    mut ws_tx: S,
    mut send_rx: mpsc::Receiver<Arc<String>>,
    closed: CancellationToken,
) where
    S: Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    loop {
        tokio::select! {
            msg = send_rx.recv() => {
                let Some(text) = msg else { break };
                if let Err(e) = ws_tx.send(Message::Text(text.as_str().into())).await {
                    debug!(error = %e, "socket write failed");
                    closed.cancel();
                    break;
                }
            }
            () = closed.cancelled() => {
                let _ = ws_tx.send(Message::Close(None)).await;
                break;
            }
        }
    }
}

/// Run a relay session for an upgraded socket.
///
/// 1. Registers an endpoint with the broker
/// 2. Forwards queued frames to the socket, sending Close once the endpoint
///    is closed (eviction or shutdown); a failed write closes the endpoint
/// 3. Feeds inbound text to the broker in arrival order
/// 4. Disconnects the endpoint when either side goes away
#[instrument(skip_all, fields(conn_id))]
pub async fn run_ws_session(ws: WebSocket, broker: Arc<RelayBroker>, max_send_queue: usize) {
    let (ws_tx, mut ws_rx) = ws.split();
    let (send_tx, send_rx) = mpsc::channel::<Arc<String>>(max_send_queue.max(1));
    let endpoint = broker.on_connect(send_tx);
    let conn_id = endpoint.id().clone();
    let _ = tracing::Span::current().record("conn_id", tracing::field::display(&conn_id));

    counter!("relay_connections_total").increment(1);
    gauge!("relay_connections_active").increment(1.0);

    let mut writer = tokio::spawn(write_loop(ws_tx, send_rx, endpoint.closed_token()));

    let closed = endpoint.closed_token();
    loop {
        let next = tokio::select! {
            next = ws_rx.next() => next,
            () = closed.cancelled() => {
                debug!("endpoint closed by relay");
                break;
            }
        };
        let Some(Ok(msg)) = next else { break };

        match msg {
            Message::Ping(_) | Message::Pong(_) => {
                endpoint.mark_alive();
                continue;
            }
            Message::Close(_) => {
                info!("peer sent close frame");
                break;
            }
            msg @ (Message::Text(_) | Message::Binary(_)) => {
                let Some(text) = frame_text(msg) else {
                    debug!("non-UTF-8 binary frame ignored");
                    continue;
                };
                let outcome = broker.on_frame(&conn_id, &text);
                trace!(?outcome, "frame handled");
            }
        }
    }

    endpoint.close();
    if tokio::time::timeout(CLOSE_GRACE, &mut writer).await.is_err() {
        writer.abort();
    }
    broker.on_disconnect(&conn_id);

    let connected_secs = (Utc::now() - endpoint.connected_at()).num_seconds();
    info!(connected_secs, dropped = endpoint.drop_count(), "session ended");
    gauge!("relay_connections_active").decrement(1.0);
}
