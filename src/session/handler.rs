//! AudioConnector WebSocket handler.
//!
//! Upgrades the HTTP connection and runs one [`ProtocolSession`] per
//! socket. The socket is split: a dedicated sender task drains the wire
//! channel so at most one write is in flight, while the main loop
//! multiplexes peer frames with bridge and DTMF events through a single
//! `select!`, keeping the session single-task.

use std::sync::Arc;

use axum::{
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::Response,
};
use futures::{SinkExt, StreamExt};
use tokio::select;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::state::AppState;

use super::{ProtocolSession, WireFrame};

/// Channel buffer size for the outbound wire channel.
const WIRE_BUFFER_SIZE: usize = 256;

/// Channel buffer size for bridge events.
const EVENT_BUFFER_SIZE: usize = 256;

/// Maximum WebSocket frame size (1 MB). Well above the configured binary
/// frame cap; oversized frames indicate a misbehaving peer.
const MAX_WS_FRAME_SIZE: usize = 1024 * 1024;

/// AudioConnector WebSocket endpoint.
///
/// Upgrades the HTTP connection to a WebSocket carrying sequenced JSON
/// control messages and binary PCMU audio.
pub async fn voicebot_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    info!("audioconnector WebSocket upgrade requested");

    ws.max_frame_size(MAX_WS_FRAME_SIZE)
        .max_message_size(MAX_WS_FRAME_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    info!("audioconnector WebSocket connection established");

    let (mut sender, mut receiver) = socket.split();
    let (wire_tx, mut wire_rx) = mpsc::channel::<WireFrame>(WIRE_BUFFER_SIZE);

    // Sender task: sole writer to the socket.
    let sender_task = tokio::spawn(async move {
        while let Some(frame) = wire_rx.recv().await {
            let should_close = matches!(frame, WireFrame::Close);

            let result = match frame {
                WireFrame::Text(json) => sender.send(Message::Text(json.into())).await,
                WireFrame::Binary(data) => sender.send(Message::Binary(data)).await,
                WireFrame::Close => {
                    info!("closing audioconnector WebSocket connection");
                    sender.send(Message::Close(None)).await
                }
            };

            if let Err(e) = result {
                error!(error = %e, "failed to send WebSocket frame");
                break;
            }
            if should_close {
                break;
            }
        }
    });

    let (bridge_tx, mut bridge_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let (dtmf_tx, mut dtmf_rx) = mpsc::channel(EVENT_BUFFER_SIZE);
    let cancel = CancellationToken::new();

    let mut session = ProtocolSession::new(
        state.config.clone(),
        state.connector.clone(),
        wire_tx,
        bridge_tx,
        dtmf_tx,
        cancel,
    );

    loop {
        select! {
            frame = receiver.next() => {
                match frame {
                    Some(Ok(Message::Text(text))) => {
                        session.process_text_message(&text).await;
                    }
                    Some(Ok(Message::Binary(data))) => {
                        session.process_binary_message(data).await;
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("peer closed the WebSocket");
                        break;
                    }
                    // axum answers pings itself.
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error");
                        break;
                    }
                    None => {
                        debug!("WebSocket stream ended");
                        break;
                    }
                }
            }
            event = bridge_rx.recv() => {
                match event {
                    Some(event) => session.on_bridge_event(event).await,
                    None => break,
                }
            }
            event = dtmf_rx.recv() => {
                if let Some(event) = event {
                    session.on_dtmf_event(event).await;
                }
            }
        }

        if session.is_closed() {
            break;
        }
    }

    session.close().await;
    let _ = sender_task.await;

    info!(
        session_id = session.session_id().as_deref().unwrap_or(""),
        "audioconnector session finished"
    );
}
