//! WebSocket transport
//!
//! Each upgraded socket gets a connection handle with a bounded outbound
//! queue, a writer task draining that queue into the socket, and a reader
//! loop feeding frames to the router until the socket closes.

use crate::server::registry::{ClientConnection, OutboundMessage};
use crate::server::router::{Dispatch, MessageRouter};

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
    routing::get,
    Router,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Shared state for WebSocket handlers
#[derive(Clone)]
pub struct WsState {
    pub router: MessageRouter,
    /// Depth of each connection's outbound queue
    pub outbound_buffer: usize,
}

/// Create the HTTP router. Upgrades are accepted on `/` and `/ws`.
pub fn create_router(state: WsState) -> Router {
    Router::new()
        .route("/", get(ws_handler))
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .with_state(state)
}

async fn health_handler() -> &'static str {
    "ok"
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<WsState>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: WsState) {
    let (mut sender, mut receiver) = socket.split();

    let (tx, mut rx) = mpsc::channel::<OutboundMessage>(state.outbound_buffer.max(1));
    let conn = Arc::new(ClientConnection::new(tx));
    let conn_id = conn.id;

    info!(conn_id = %conn_id, "WebSocket client connected");

    // Spawn task to forward outbound messages to the socket
    let send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if sender.send(Message::Text(msg.payload.into())).await.is_err() {
                break;
            }
        }
    });

    // Process incoming messages
    while let Some(msg_result) = receiver.next().await {
        match msg_result {
            Ok(Message::Text(text)) => {
                route(&state.router, &conn, text.as_str().as_bytes());
            }
            Ok(Message::Binary(data)) => {
                route(&state.router, &conn, &data);
            }
            Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => {
                // Handled automatically by axum
            }
            Ok(Message::Close(_)) => break,
            Err(e) => {
                warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                break;
            }
        }
    }

    // Cleanup
    debug!(conn_id = %conn_id, "WebSocket client disconnected");
    state.router.handle_disconnect(&conn);
    send_task.abort();
}

fn route(router: &MessageRouter, conn: &Arc<ClientConnection>, raw: &[u8]) {
    match router.handle_message(conn, raw) {
        Dispatch::Delivered(count) => {
            debug!(conn_id = %conn.id, delivered = count, "Message routed");
        }
        Dispatch::Rejected(_) => {}
        // The write finishes on its own task; its notice does not involve this connection.
        Dispatch::Deferred(_) => {}
    }
}
