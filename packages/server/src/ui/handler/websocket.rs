//! WebSocket connection handlers.
//!
//! Each connection runs two pumps as separate tasks:
//!
//! - inbound: reads frames and drives the Broadcaster (join / message), then
//!   runs `leave` exactly once
//! - outbound: drains the connection's queue into the socket and keeps the
//!   connection alive with pings
//!
//! The outbound pump ends when its queue is closed or a write fails. The
//! inbound pump only checks for that between frames, so a join or send that
//! has started always runs to completion.

use std::{fmt, sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
};
use futures_util::{
    sink::{Sink, SinkExt},
    stream::{Stream, StreamExt},
};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};

use crate::{
    config::ConnectionConfig,
    domain::{Connection, ConnectionState, MessageDraft, Payload, RoomId, UserId},
    infrastructure::dto::{
        conversion::encode_error,
        websocket::{InboundMessage, MessageType},
    },
    ui::state::AppState,
};

const ANONYMOUS: &str = "anonymous";

pub async fn websocket_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    let max_frame_size = state.connection_config.max_frame_size;
    ws.max_message_size(max_frame_size)
        .max_frame_size(max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let config = state.connection_config.clone();
    let (connection, rx) = Connection::new(config.outbound_queue_capacity);
    let connection_id = connection.id();
    state.broadcaster.attach(&connection).await;
    tracing::info!("Connection {} opened", connection_id);

    let (sender, receiver) = socket.split();
    let (outbound_done_tx, outbound_done_rx) = oneshot::channel::<()>();

    let outbound = tokio::spawn(async move {
        outbound_pump(rx, sender, &config).await;
        tracing::debug!("Outbound pump of {} finished", connection_id);
        drop(outbound_done_tx);
    });

    let pong_wait = state.connection_config.pong_wait;
    let inbound_state = state.clone();
    let inbound = tokio::spawn(async move {
        let mut connection = inbound_pump(
            inbound_state.clone(),
            connection,
            receiver,
            pong_wait,
            outbound_done_rx,
        )
        .await;
        tracing::debug!("Inbound pump of {} finished", connection_id);
        inbound_state.broadcaster.leave(&mut connection).await;
    });

    if let Err(e) = inbound.await {
        tracing::error!("Inbound task of {} failed: {}", connection_id, e);
    }
    if let Err(e) = outbound.await {
        tracing::error!("Outbound task of {} failed: {}", connection_id, e);
    }
    tracing::info!("Connection {} closed", connection_id);
}

/// Read frames until the peer goes away, stays silent for `pong_wait`, or the
/// outbound side has ended. Hands the connection back for `leave`.
async fn inbound_pump<S>(
    state: Arc<AppState>,
    mut connection: Connection,
    mut receiver: S,
    pong_wait: Duration,
    mut outbound_done: oneshot::Receiver<()>,
) -> Connection
where
    S: Stream<Item = Result<Message, axum::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            biased;
            _ = &mut outbound_done => {
                tracing::debug!("Outbound side of {} ended; stopping reads", connection.id());
                return connection;
            }
            next = tokio::time::timeout(pong_wait, receiver.next()) => next,
        };

        let msg = match next {
            Ok(Some(Ok(msg))) => msg,
            Ok(Some(Err(e))) => {
                tracing::debug!("WebSocket error on {}: {}", connection.id(), e);
                return connection;
            }
            Ok(None) => return connection,
            Err(_) => {
                tracing::info!(
                    "Connection {} silent for {:?}; closing",
                    connection.id(),
                    pong_wait
                );
                return connection;
            }
        };

        match msg {
            Message::Text(text) => handle_frame(&state, &mut connection, text.as_str()).await,
            Message::Close(_) => {
                tracing::debug!("Connection {} requested close", connection.id());
                return connection;
            }
            Message::Binary(_) => {
                tracing::debug!("Ignoring binary frame from {}", connection.id());
            }
            // Pings are answered by the transport; any frame counts as liveness.
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }
}

async fn handle_frame(state: &AppState, connection: &mut Connection, text: &str) {
    let frame: InboundMessage = match serde_json::from_str(text) {
        Ok(frame) => frame,
        Err(e) => {
            tracing::warn!("Dropping malformed frame from {}: {}", connection.id(), e);
            return;
        }
    };

    match frame.r#type {
        MessageType::Join => {
            let room_id = match RoomId::new(frame.room) {
                Ok(room_id) => room_id,
                Err(e) => {
                    reply_error(state, connection, e.to_string()).await;
                    return;
                }
            };
            let display_name = match frame.user.trim() {
                "" => ANONYMOUS.to_string(),
                name => name.to_string(),
            };
            if let Err(e) = state
                .broadcaster
                .join(connection, room_id, UserId::generate(), display_name)
                .await
            {
                reply_error(state, connection, e.to_string()).await;
            }
        }
        MessageType::Message => {
            // Fan-out follows the bound room; the frame's `room` is informational.
            let (room_id, user_id) = match connection.state() {
                ConnectionState::Joined {
                    room_id, user_id, ..
                } => (room_id.clone(), user_id.clone()),
                _ => {
                    reply_error(state, connection, "join a room first").await;
                    return;
                }
            };
            let draft = MessageDraft {
                user: frame.user,
                payload: Payload::new(frame.encrypted),
                iv: frame.iv,
            };
            if let Err(e) = state.broadcaster.send(&room_id, draft, &user_id).await {
                tracing::debug!("Send from {} rejected: {}", connection.id(), e);
                reply_error(state, connection, e.to_string()).await;
            }
        }
        other => {
            tracing::debug!(
                "Ignoring frame of type {:?} from {}",
                other,
                connection.id()
            );
        }
    }
}

async fn reply_error(state: &AppState, connection: &Connection, reason: impl Into<String>) {
    match encode_error(reason) {
        Ok(frame) => state.broadcaster.reply(&connection.id(), &frame).await,
        Err(e) => tracing::error!("Failed to encode error frame: {}", e),
    }
}

/// Drain the outbound queue into the socket until it is closed or a write fails.
async fn outbound_pump<S>(mut rx: mpsc::Receiver<String>, mut sender: S, config: &ConnectionConfig)
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let mut keepalive = tokio::time::interval_at(
        Instant::now() + config.keepalive_interval,
        config.keepalive_interval,
    );

    loop {
        tokio::select! {
            frame = rx.recv() => {
                let Some(frame) = frame else {
                    // Queue closed: the connection was dropped or has left.
                    let _ = tokio::time::timeout(
                        config.write_timeout,
                        sender.send(Message::Close(None)),
                    )
                    .await;
                    return;
                };
                if !write_batch(&mut sender, &mut rx, frame, config.write_timeout).await {
                    return;
                }
            }
            _ = keepalive.tick() => {
                let ping = sender.send(Message::Ping(Bytes::new()));
                if !matches!(tokio::time::timeout(config.write_timeout, ping).await, Ok(Ok(()))) {
                    tracing::debug!("Keepalive ping failed; closing");
                    return;
                }
            }
        }
    }
}

/// Write `first` plus everything already queued, then flush once.
async fn write_batch<S>(
    sender: &mut S,
    rx: &mut mpsc::Receiver<String>,
    first: String,
    write_timeout: Duration,
) -> bool
where
    S: Sink<Message> + Unpin,
    S::Error: fmt::Display,
{
    let write = async {
        sender.feed(Message::Text(first.into())).await?;
        while let Ok(next) = rx.try_recv() {
            sender.feed(Message::Text(next.into())).await?;
        }
        sender.flush().await
    };

    match tokio::time::timeout(write_timeout, write).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::debug!("WebSocket write failed: {}", e);
            false
        }
        Err(_) => {
            tracing::warn!("WebSocket write timed out after {:?}", write_timeout);
            false
        }
    }
}
