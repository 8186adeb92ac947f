use axum::{
    extract::{State, WebSocketUpgrade},
    response::Response,
};

use crate::AppState;
use crate::ws;

/// Session WebSocket - one connection can join any number of sessions
pub async fn session_websocket_handler(
    State(state): State<AppState>,
    ws: WebSocketUpgrade,
) -> Response {
    let hub = state.hub.clone();
    let metrics = state.metrics.clone();
    let outbox_capacity = state.session_config.outbox_capacity;
    let shutdown = state.shutdown.clone();

    ws.max_message_size(state.session_config.max_frame_bytes)
        .on_upgrade(move |socket| {
            ws::handle_session_ws(socket, hub, metrics, outbox_capacity, shutdown)
        })
}
