//! End-to-end relay behaviour over real WebSocket connections.

use std::sync::Arc;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use futures_util::{SinkExt, StreamExt};
use inkroom_core::{
    ClientMessage, Collaboration, ConnectionState, NativeClient, ServerMessage, Stroke, SyncEvent,
};
use inkroom_server::{AppState, LogMailer, ServerConfig, router};
use kurbo::Point;
use tokio::net::TcpStream;
use tokio::time::{sleep, timeout};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

const RECV_TIMEOUT: Duration = Duration::from_secs(2);
const QUIET_PERIOD: Duration = Duration::from_millis(200);

async fn spawn_server() -> (String, Arc<AppState>) {
    let state = Arc::new(AppState::new(
        ServerConfig::default(),
        Arc::new(LogMailer::new("test@localhost")),
    ));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (format!("ws://{addr}/ws"), state)
}

async fn connect(base: &str, query: &str) -> Client {
    let (client, _) = connect_async(format!("{base}?{query}")).await.unwrap();
    client
}

/// Admission happens after the upgrade completes, so wait for the registry.
async fn wait_for_members(state: &AppState, session: &str, count: usize) {
    for _ in 0..200 {
        if state.registry.member_count(session) == count {
            return;
        }
        sleep(Duration::from_millis(10)).await;
    }
    panic!(
        "session {session} has {} members, expected {count}",
        state.registry.member_count(session)
    );
}

async fn join(base: &str, state: &AppState, session: &str, token: &str, expected: usize) -> Client {
    let client = connect(base, &format!("sessionId={session}&token={token}")).await;
    wait_for_members(state, session, expected).await;
    client
}

async fn send(client: &mut Client, msg: &ClientMessage) {
    client.send(Message::text(msg.encode().unwrap())).await.unwrap();
}

async fn recv(client: &mut Client) -> ServerMessage {
    loop {
        let frame = timeout(RECV_TIMEOUT, client.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return ServerMessage::decode(text.as_str()).unwrap();
        }
    }
}

async fn assert_quiet(client: &mut Client) {
    if let Ok(Some(Ok(frame))) = timeout(QUIET_PERIOD, client.next()).await {
        panic!("unexpected frame: {frame:?}");
    }
}

fn token_for(username: &str) -> String {
    let claims = format!(r#"{{"preferred_username":"{username}"}}"#);
    format!("e30.{}.sig", URL_SAFE_NO_PAD.encode(claims))
}

fn stroke(id: &str) -> Stroke {
    Stroke {
        id: id.to_string(),
        points: vec![0.0, 0.0, 1.0, 1.0],
        color: "#000".to_string(),
        width: 4.0,
    }
}

#[tokio::test]
async fn stroke_and_undo_reach_other_member_only() {
    let (base, state) = spawn_server().await;
    let mut c1 = join(&base, &state, "S1", "tok", 1).await;
    let mut c2 = join(&base, &state, "S1", "tok", 2).await;

    send(&mut c1, &ClientMessage::StrokeCreated(stroke("s1"))).await;
    assert_eq!(recv(&mut c2).await, ServerMessage::StrokeCreated(stroke("s1")));

    send(&mut c1, &ClientMessage::StrokeUndo { stroke_id: "s1".to_string() }).await;
    assert_eq!(
        recv(&mut c2).await,
        ServerMessage::StrokeUndo { stroke_id: "s1".to_string() }
    );

    assert_quiet(&mut c1).await;
}

#[tokio::test]
async fn chat_is_echoed_to_every_member() {
    let (base, state) = spawn_server().await;
    let mut clients = Vec::new();
    for n in 1..=3 {
        clients.push(join(&base, &state, "room", &token_for("carol"), n).await);
    }

    send(&mut clients[0], &ClientMessage::ChatMessage { message: "hi all".to_string() }).await;

    let mut ids = Vec::new();
    for client in &mut clients {
        match recv(client).await {
            ServerMessage::ChatMessage(chat) => {
                assert_eq!(chat.message, "hi all");
                assert_eq!(chat.username, "carol");
                assert!(chat.timestamp > 0);
                ids.push(chat.id);
            }
            other => panic!("expected chat, got {other:?}"),
        }
    }
    assert!(ids.iter().all(|id| id == &ids[0]));
}

#[tokio::test]
async fn cursor_carries_identity_and_departure_is_announced() {
    let (base, state) = spawn_server().await;
    let mut c1 = join(&base, &state, "S1", &token_for("alice"), 1).await;
    let mut c2 = join(&base, &state, "S1", "opaque", 2).await;

    send(&mut c1, &ClientMessage::Cursor { x: 10.0, y: 20.0 }).await;
    let c1_id = match recv(&mut c2).await {
        ServerMessage::Cursor(update) => {
            assert_eq!(update.username, "alice");
            assert_eq!((update.x, update.y), (10.0, 20.0));
            update.id
        }
        other => panic!("expected cursor, got {other:?}"),
    };

    send(&mut c2, &ClientMessage::Cursor { x: 1.0, y: 1.0 }).await;
    match recv(&mut c1).await {
        ServerMessage::Cursor(update) => assert_eq!(update.username, "Anonymous"),
        other => panic!("expected cursor, got {other:?}"),
    }

    c1.close(None).await.unwrap();
    assert_eq!(recv(&mut c2).await, ServerMessage::ParticipantLeft { id: c1_id });
    wait_for_members(&state, "S1", 1).await;
}

#[tokio::test]
async fn last_member_leaving_ends_session() {
    let (base, state) = spawn_server().await;
    let mut c1 = join(&base, &state, "solo", "tok", 1).await;
    assert_eq!(state.registry.session_count(), 1);

    c1.close(None).await.unwrap();
    wait_for_members(&state, "solo", 0).await;
    assert_eq!(state.registry.session_count(), 0);
}

#[tokio::test]
async fn invalid_payload_is_dropped_without_closing() {
    let (base, state) = spawn_server().await;
    let mut c1 = join(&base, &state, "S1", "tok", 1).await;
    let mut c2 = join(&base, &state, "S1", "tok", 2).await;

    c1.send(Message::text("{\"type\":\"stroke-created\",\"id\":\"x\"}")).await.unwrap();
    c1.send(Message::text("garbage")).await.unwrap();
    send(&mut c1, &ClientMessage::StrokeCreated(stroke("ok"))).await;

    assert_eq!(recv(&mut c2).await, ServerMessage::StrokeCreated(stroke("ok")));
    assert_eq!(state.registry.member_count("S1"), 2);
}

#[tokio::test]
async fn sessions_do_not_leak_into_each_other() {
    let (base, state) = spawn_server().await;
    let mut a = join(&base, &state, "A", "tok", 1).await;
    let mut b1 = join(&base, &state, "B", "tok", 1).await;
    let mut b2 = join(&base, &state, "B", "tok", 2).await;

    send(&mut a, &ClientMessage::StrokeCreated(stroke("a1"))).await;
    send(&mut b1, &ClientMessage::StrokeCreated(stroke("b1"))).await;

    assert_eq!(recv(&mut b2).await, ServerMessage::StrokeCreated(stroke("b1")));
    assert_quiet(&mut b2).await;
}

#[tokio::test]
async fn missing_credential_is_rejected_with_reason() {
    let (base, state) = spawn_server().await;
    let mut client = connect(&base, "sessionId=S1").await;

    let frame = timeout(RECV_TIMEOUT, client.next()).await.unwrap().unwrap().unwrap();
    match frame {
        Message::Close(Some(close)) => {
            assert_eq!(close.code, CloseCode::Policy);
            assert_eq!(close.reason.as_str(), "Authentication error: No token provided");
        }
        other => panic!("expected close frame, got {other:?}"),
    }
    assert_eq!(state.registry.session_count(), 0);
}

#[tokio::test]
async fn missing_session_id_is_rejected_first() {
    let (base, _state) = spawn_server().await;
    let mut client = connect(&base, "").await;

    let frame = timeout(RECV_TIMEOUT, client.next()).await.unwrap().unwrap().unwrap();
    match frame {
        Message::Close(Some(close)) => assert_eq!(close.reason.as_str(), "No session ID provided"),
        other => panic!("expected close frame, got {other:?}"),
    }
}

#[tokio::test]
async fn bearer_header_is_accepted() {
    use tokio_tungstenite::tungstenite::client::IntoClientRequest;

    let (base, state) = spawn_server().await;
    let mut request = format!("{base}?sessionId=S1").into_client_request().unwrap();
    request.headers_mut().insert(
        "authorization",
        format!("Bearer {}", token_for("dave")).parse().unwrap(),
    );
    let (mut c1, _) = connect_async(request).await.unwrap();
    wait_for_members(&state, "S1", 1).await;

    send(&mut c1, &ClientMessage::ChatMessage { message: "me".to_string() }).await;
    match recv(&mut c1).await {
        ServerMessage::ChatMessage(chat) => assert_eq!(chat.username, "dave"),
        other => panic!("expected chat, got {other:?}"),
    }
}

#[tokio::test]
async fn collaboration_undo_redo_round_trip() {
    let (base, state) = spawn_server().await;
    let mut c1 = join(&base, &state, "S1", "tok", 1).await;
    let mut c2 = join(&base, &state, "S1", "tok", 2).await;

    let mut alice = Collaboration::new();
    let mut bob = Collaboration::new();

    alice.begin_stroke(Point::new(0.0, 0.0));
    alice.extend_stroke(Point::new(5.0, 5.0));
    let id = alice.end_stroke().unwrap().id.clone();
    alice.undo();
    alice.redo();

    let outgoing = alice.take_outgoing();
    assert_eq!(outgoing.len(), 4);
    for json in outgoing {
        c1.send(Message::text(json)).await.unwrap();
    }

    for _ in 0..4 {
        bob.apply(recv(&mut c2).await);
    }
    assert_eq!(bob.board().strokes(), alice.board().strokes());
    assert!(bob.board().stroke(&id).is_some());
    assert_eq!(bob.board().cursors().count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn native_client_sees_rejection_reason() {
    let (base, _state) = spawn_server().await;
    let mut client = NativeClient::new();
    client.connect(&base, "", "S1").unwrap();

    let mut reason = None;
    for _ in 0..200 {
        for event in client.poll_events() {
            if let SyncEvent::Disconnected { reason: r } = event {
                reason = Some(r);
            }
        }
        if reason.is_some() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(
        reason.flatten().as_deref(),
        Some("Authentication error: No token provided")
    );
    assert_eq!(client.state(), ConnectionState::Disconnected);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn native_client_receives_relayed_strokes() {
    let (base, state) = spawn_server().await;
    let mut native = NativeClient::new();
    native.connect(&base, "tok", "S1").unwrap();
    wait_for_members(&state, "S1", 1).await;
    let mut c2 = join(&base, &state, "S1", "tok", 2).await;

    send(&mut c2, &ClientMessage::StrokeCreated(stroke("n1"))).await;

    let mut received = None;
    for _ in 0..200 {
        for event in native.poll_events() {
            if let SyncEvent::Message(msg) = event {
                received = Some(msg);
            }
        }
        if received.is_some() {
            break;
        }
        sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(received, Some(ServerMessage::StrokeCreated(stroke("n1"))));
    assert!(native.is_connected());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn native_client_flushes_bursts_promptly() {
    const BURST: usize = 40;

    let (base, state) = spawn_server().await;
    let mut native = NativeClient::new();
    native.connect(&base, "tok", "S1").unwrap();
    wait_for_members(&state, "S1", 1).await;
    let mut c2 = join(&base, &state, "S1", "tok", 2).await;

    let started = std::time::Instant::now();
    for i in 0..BURST {
        let msg = ClientMessage::Cursor { x: i as f64, y: 0.0 };
        native.send(&msg.encode().unwrap()).unwrap();
    }
    for i in 0..BURST {
        match recv(&mut c2).await {
            ServerMessage::Cursor(update) => assert_eq!(update.x, i as f64),
            other => panic!("expected cursor, got {other:?}"),
        }
    }
    assert!(
        started.elapsed() < Duration::from_millis(500),
        "{BURST} sends took {:?}",
        started.elapsed()
    );
}

#[tokio::test]
async fn chat_id_and_timestamp_are_assigned_by_server() {
    let (base, state) = spawn_server().await;
    let mut c1 = join(&base, &state, "S1", "tok", 1).await;
    let mut c2 = join(&base, &state, "S1", "tok", 2).await;

    c1.send(Message::text(
        r#"{"type":"chat-message","message":"x","id":"client-id","timestamp":1}"#,
    ))
    .await
    .unwrap();

    for client in [&mut c1, &mut c2] {
        match recv(client).await {
            ServerMessage::ChatMessage(chat) => {
                assert_ne!(chat.id, "client-id");
                assert!(uuid::Uuid::parse_str(&chat.id).is_ok());
                assert_ne!(chat.timestamp, 1);
                assert_eq!(chat.message, "x");
            }
            other => panic!("expected chat, got {other:?}"),
        }
    }
}
