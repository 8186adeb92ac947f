//! WebSocket Handler
//!
//! One task pair per socket: a sender draining the connection's outbox into
//! text frames, and an input loop turning client frames into hub commands.

use axum::extract::ws::{Message, WebSocket};
use futures::{sink::SinkExt, stream::StreamExt};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::HubError;
use crate::hub::{HubHandle, Outbox};
use crate::metrics::ServerMetrics;

use super::protocol::{ClientMessage, ServerMessage};

/// Handle one session WebSocket connection until either side closes it.
pub async fn handle_session_ws(
    socket: WebSocket,
    hub: HubHandle,
    metrics: Arc<ServerMetrics>,
    outbox_capacity: usize,
    shutdown: CancellationToken,
) {
    let connection_id = uuid::Uuid::new_v4().to_string();
    info!(conn_id = %connection_id, "New session WebSocket connection");
    metrics.connection_opened();

    let (mut ws_sender, mut ws_receiver) = socket.split();
    let (tx, mut rx) = mpsc::channel::<ServerMessage>(outbox_capacity);

    if let Err(e) = hub.connect(&connection_id, tx.clone()).await {
        error!(conn_id = %connection_id, "Failed to register connection: {}", e);
        metrics.connection_closed();
        return;
    }

    // Task to send messages to WebSocket
    let sender_task = async move {
        while let Some(msg) = rx.recv().await {
            let json = match serde_json::to_string(&msg) {
                Ok(j) => j,
                Err(e) => {
                    error!("Failed to serialize message: {}", e);
                    continue;
                }
            };
            if ws_sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    };

    // Task to handle incoming messages
    let hub_input = hub.clone();
    let metrics_input = metrics.clone();
    let conn_input = connection_id.clone();
    let input_task = async move {
        while let Some(msg) = ws_receiver.next().await {
            let text = match msg {
                Ok(Message::Text(text)) => text,
                Ok(Message::Close(_)) => break,
                Ok(Message::Binary(_)) => {
                    metrics_input.message_received();
                    metrics_input.validation_error();
                    debug!(conn_id = %conn_input, "Ignoring binary frame");
                    continue;
                }
                Ok(_) => continue,
                Err(e) => {
                    debug!(conn_id = %conn_input, "WebSocket receive error: {}", e);
                    break;
                }
            };
            metrics_input.message_received();

            let client_msg = match parse_client_message(&text) {
                Ok(m) => m,
                Err(reason) => {
                    metrics_input.validation_error();
                    warn!(conn_id = %conn_input, "Dropping message: {}", reason);
                    continue;
                }
            };

            match dispatch(&hub_input, &conn_input, &tx, client_msg).await {
                Ok(()) => {}
                Err(HubError::HubUnavailable) => {
                    warn!(conn_id = %conn_input, "Session hub unavailable, closing connection");
                    break;
                }
                Err(e) => debug!(conn_id = %conn_input, "Message rejected: {}", e),
            }
        }
    };

    tokio::select! {
        _ = sender_task => debug!("Sender task ended"),
        _ = input_task => debug!("Input task ended"),
        _ = shutdown.cancelled() => debug!("Server shutting down"),
    }

    // Leave every session this connection was in and drop its outbox
    match hub.disconnect(&connection_id).await {
        Ok(departures) => {
            for departure in &departures {
                debug!(
                    conn_id = %connection_id,
                    session = %departure.session_id,
                    "Left session on disconnect"
                );
            }
        }
        Err(e) => warn!(conn_id = %connection_id, "Disconnect cleanup failed: {}", e),
    }

    metrics.connection_closed();
    info!(conn_id = %connection_id, "Session WebSocket connection closed");
}

/// Decode a client frame and reject messages with an empty session id.
fn parse_client_message(text: &str) -> Result<ClientMessage, String> {
    let msg: ClientMessage =
        serde_json::from_str(text).map_err(|e| format!("malformed message: {}", e))?;
    if msg.session_id().is_some_and(|id| id.trim().is_empty()) {
        return Err("session_id must not be empty".to_string());
    }
    Ok(msg)
}

async fn dispatch(
    hub: &HubHandle,
    connection_id: &str,
    outbox: &Outbox,
    msg: ClientMessage,
) -> Result<(), HubError> {
    match msg {
        ClientMessage::Join {
            session_id,
            display_name,
        } => {
            hub.join(connection_id, &session_id, display_name).await?;
        }
        ClientMessage::ContentChange {
            session_id,
            content,
        } => {
            hub.change_content(connection_id, &session_id, content)
                .await?;
        }
        ClientMessage::ModeChange { session_id, mode } => {
            hub.change_mode(connection_id, &session_id, mode).await?;
        }
        ClientMessage::Leave { session_id } => {
            if hub.leave(connection_id, &session_id).await?.is_none() {
                debug!(conn_id = %connection_id, session = %session_id, "Leave for session not joined");
            }
        }
        ClientMessage::Ping => {
            if outbox.send(ServerMessage::Pong).await.is_err() {
                debug!(conn_id = %connection_id, "Outbox closed before pong");
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_join() {
        let msg = parse_client_message(r#"{"type":"Join","session_id":"abc"}"#).unwrap();
        assert!(matches!(
            msg,
            ClientMessage::Join { ref session_id, display_name: None } if session_id == "abc"
        ));
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(parse_client_message("not json").is_err());
        assert!(parse_client_message(r#"{"type":"Explode"}"#).is_err());
        assert!(parse_client_message(r#"{"type":"ContentChange","session_id":"abc"}"#).is_err());
    }

    #[test]
    fn test_parse_rejects_blank_session_id() {
        let err = parse_client_message(r#"{"type":"Leave","session_id":"  "}"#).unwrap_err();
        assert!(err.contains("session_id"));
    }

    #[test]
    fn test_parse_ping_has_no_session() {
        let msg = parse_client_message(r#"{"type":"Ping"}"#).unwrap();
        assert!(matches!(msg, ClientMessage::Ping));
    }
}
