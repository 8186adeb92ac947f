//! Socket-level tests: a real listener on an ephemeral port, driven by
//! tokio-tungstenite clients speaking the JSON protocol.

use futures::{SinkExt, StreamExt};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};

use crate::AppState;
use crate::config::SessionFileConfig;
use crate::test_helpers::test_app_state_with;
use crate::ws::{ClientMessage, ServerMessage};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server(session: SessionFileConfig) -> (SocketAddr, AppState) {
    let state = test_app_state_with(session);
    let app = crate::build_router(state.clone(), true);
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, state)
}

async fn recv(ws: &mut Socket) -> ServerMessage {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send(ws: &mut Socket, msg: &ClientMessage) {
    let json = serde_json::to_string(msg).unwrap();
    ws.send(Message::Text(json.into())).await.unwrap();
}

async fn connect(addr: SocketAddr) -> (Socket, String) {
    let (mut ws, _) = connect_async(format!("ws://{}/api/ws", addr)).await.unwrap();
    match recv(&mut ws).await {
        ServerMessage::Connected { connection_id } => (ws, connection_id),
        other => panic!("Expected Connected, got {:?}", other),
    }
}

fn join(session_id: &str, name: &str) -> ClientMessage {
    ClientMessage::Join {
        session_id: session_id.to_string(),
        display_name: Some(name.to_string()),
    }
}

#[tokio::test]
async fn test_two_clients_pair_over_websocket() {
    let (addr, state) = start_server(SessionFileConfig::default()).await;
    let sid = state.hub.create_session().await.unwrap().id;

    let (mut alice, alice_id) = connect(addr).await;
    let (mut bob, bob_id) = connect(addr).await;
    assert_ne!(alice_id, bob_id);

    send(&mut alice, &join(&sid, "Alice")).await;
    assert!(matches!(recv(&mut alice).await, ServerMessage::Joined { .. }));
    assert!(matches!(
        recv(&mut alice).await,
        ServerMessage::SessionState { .. }
    ));

    send(&mut bob, &join(&sid, "Bob")).await;
    match recv(&mut alice).await {
        ServerMessage::Joined { participants, .. } => {
            let names: Vec<_> = participants.iter().map(|p| p.display_name.as_str()).collect();
            assert_eq!(names, vec!["Alice", "Bob"]);
        }
        other => panic!("Expected Joined, got {:?}", other),
    }
    assert!(matches!(recv(&mut bob).await, ServerMessage::Joined { .. }));
    assert!(matches!(recv(&mut bob).await, ServerMessage::SessionState { .. }));

    send(
        &mut alice,
        &ClientMessage::ContentChange {
            session_id: sid.clone(),
            content: "fn main() {}".into(),
        },
    )
    .await;
    assert_eq!(
        recv(&mut bob).await,
        ServerMessage::ContentChanged {
            session_id: sid.clone(),
            content: "fn main() {}".into()
        }
    );
    // No echo: the next frame Alice sees is her pong.
    send(&mut alice, &ClientMessage::Ping).await;
    assert_eq!(recv(&mut alice).await, ServerMessage::Pong);

    send(
        &mut bob,
        &ClientMessage::ModeChange {
            session_id: sid.clone(),
            mode: "rust".into(),
        },
    )
    .await;
    let expected = ServerMessage::ModeChanged {
        session_id: sid.clone(),
        mode: "rust".into(),
    };
    assert_eq!(recv(&mut alice).await, expected);
    assert_eq!(recv(&mut bob).await, expected);

    bob.close(None).await.unwrap();
    assert_eq!(
        recv(&mut alice).await,
        ServerMessage::Left {
            session_id: sid.clone(),
            connection_id: bob_id
        }
    );

    let snap = state.hub.get_session(&sid).await.unwrap();
    assert_eq!(snap.content, "fn main() {}");
    assert_eq!(snap.mode, "rust");
    assert_eq!(snap.participants.len(), 1);
    assert_eq!(snap.participants[0].connection_id, alice_id);
}

#[tokio::test]
async fn test_join_unknown_session_gets_error_frame() {
    let (addr, _state) = start_server(SessionFileConfig::default()).await;
    let (mut ws, _) = connect(addr).await;

    send(&mut ws, &join("no-such-session", "Alice")).await;
    assert_eq!(
        recv(&mut ws).await,
        ServerMessage::SessionError {
            reason: "Session not found".into()
        }
    );
}

#[tokio::test]
async fn test_malformed_frames_are_dropped_without_closing() {
    let (addr, state) = start_server(SessionFileConfig::default()).await;
    let (mut ws, _) = connect(addr).await;

    ws.send(Message::Text("{not json".into())).await.unwrap();
    ws.send(Message::Text(r#"{"type":"Join","session_id":""}"#.into()))
        .await
        .unwrap();
    send(&mut ws, &ClientMessage::Ping).await;
    assert_eq!(recv(&mut ws).await, ServerMessage::Pong);
    assert_eq!(state.metrics.snapshot().errors.validation, 2);
}

#[tokio::test]
async fn test_disconnect_leaves_session_pending_cleanup() {
    let session = SessionFileConfig {
        grace_period_secs: 3600,
        ..Default::default()
    };
    let (addr, state) = start_server(session).await;
    let sid = state.hub.create_session().await.unwrap().id;

    let (mut ws, _) = connect(addr).await;
    send(&mut ws, &join(&sid, "Solo")).await;
    recv(&mut ws).await;
    recv(&mut ws).await;
    ws.close(None).await.unwrap();

    // The server notices the close asynchronously.
    let mut stats = state.hub.stats().await.unwrap();
    for _ in 0..50 {
        if stats.pending_cleanup == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
        stats = state.hub.stats().await.unwrap();
    }
    assert_eq!(stats.pending_cleanup, 1);
    assert_eq!(stats.connections, 0);
    assert!(state.hub.get_session(&sid).await.is_ok());
}

#[tokio::test]
async fn test_oversized_frame_closes_socket() {
    let session = SessionFileConfig {
        max_content_kb: 1,
        ..Default::default()
    };
    let (addr, state) = start_server(session).await;
    let sid = state.hub.create_session().await.unwrap().id;

    let (mut ws, _) = connect(addr).await;
    send(&mut ws, &join(&sid, "Flood")).await;
    recv(&mut ws).await;
    recv(&mut ws).await;

    let flood = ClientMessage::ContentChange {
        session_id: sid.clone(),
        content: "x".repeat(256 * 1024),
    };
    let json = serde_json::to_string(&flood).unwrap();
    // The server may already be gone by the time the write is flushed.
    let _ = ws.send(Message::Text(json.into())).await;

    let closed = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match ws.next().await {
                None | Some(Err(_)) | Some(Ok(Message::Close(_))) => return true,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await
    .expect("socket stayed open after an oversized frame");
    assert!(closed);

    let snap = state.hub.get_session(&sid).await.unwrap();
    assert_eq!(snap.content, "// Write your code here\n");
}
