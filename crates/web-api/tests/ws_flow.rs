mod support;

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message as TungsteniteMessage};
use uuid::Uuid;

use domain::{ChatId, UserId};
use support::{build_app, TestApp};

type WsStream =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

struct TestServer {
    addr: std::net::SocketAddr,
    _shutdown: oneshot::Sender<()>,
}

async fn spawn_server(app: &TestApp) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let router = app.router.clone();

    tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
            })
            .await
            .ok();
    });

    TestServer {
        addr,
        _shutdown: shutdown_tx,
    }
}

async fn connect_ws(server: &TestServer, token: &str) -> WsStream {
    let url = format!("ws://{}/ws?token={}", server.addr, token);
    let (stream, _) = connect_async(&url).await.expect("websocket connect");
    stream
}

/// 读取下一个指定类型的事件，跳过无关事件。
async fn next_event_of(stream: &mut WsStream, event_type: &str) -> Value {
    loop {
        let frame = timeout(Duration::from_secs(2), stream.next())
            .await
            .unwrap_or_else(|_| panic!("timed out waiting for {event_type}"))
            .expect("stream ended")
            .expect("websocket error");
        if let TungsteniteMessage::Text(text) = frame {
            let value: Value = serde_json::from_str(&text).expect("json frame");
            if value["type"] == event_type {
                return value;
            }
        }
    }
}

#[tokio::test]
async fn message_round_trip_between_two_clients() {
    let app = build_app();
    let server = spawn_server(&app).await;

    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let chat_id = Uuid::new_v4();
    app.directory
        .add_member(ChatId::new(chat_id), UserId::new(alice))
        .await;
    app.directory
        .add_member(ChatId::new(chat_id), UserId::new(bob))
        .await;

    let alice_token = app.authenticator.generate_token(alice, "alice").unwrap();
    let bob_token = app.authenticator.generate_token(bob, "bob").unwrap();

    let mut alice_ws = connect_ws(&server, &alice_token).await;
    let mut bob_ws = connect_ws(&server, &bob_token).await;

    // bob 上线后 alice 看到 user_joined
    let joined = next_event_of(&mut alice_ws, "user_joined").await;
    assert_eq!(joined["data"]["user_id"], bob.to_string());

    alice_ws
        .send(TungsteniteMessage::Text(
            json!({
                "type": "send_message",
                "data": {"chat_id": chat_id, "content": "hi"}
            })
            .to_string()
            .into(),
        ))
        .await
        .expect("send command");

    // 双方都收到已落库的消息，发起者也不例外
    for ws in [&mut alice_ws, &mut bob_ws] {
        let event = next_event_of(ws, "new_message").await;
        assert_eq!(event["data"]["message"]["chat_id"], chat_id.to_string());
        assert_eq!(event["data"]["message"]["sender_id"], alice.to_string());
        assert_eq!(event["data"]["message"]["sender_username"], "alice");
        assert_eq!(event["data"]["message"]["content"], "hi");
    }
    assert_eq!(app.store.messages_in(ChatId::new(chat_id)).await.len(), 1);
}

#[tokio::test]
async fn invalid_token_is_rejected_at_upgrade() {
    let app = build_app();
    let server = spawn_server(&app).await;

    let url = format!("ws://{}/ws?token=garbage", server.addr);
    match connect_async(&url).await {
        Err(tokio_tungstenite::tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 401);
        }
        other => panic!("expected http rejection, got: {other:?}"),
    }
}

#[tokio::test]
async fn malformed_command_gets_error_without_disconnect() {
    let app = build_app();
    let server = spawn_server(&app).await;

    let user = Uuid::new_v4();
    let chat_id = Uuid::new_v4();
    app.directory
        .add_member(ChatId::new(chat_id), UserId::new(user))
        .await;
    let token = app.authenticator.generate_token(user, "alice").unwrap();
    let mut ws = connect_ws(&server, &token).await;

    ws.send(TungsteniteMessage::Text(
        json!({"type": "fly_to_moon", "data": {}}).to_string().into(),
    ))
    .await
    .expect("send frame");
    let error = next_event_of(&mut ws, "error").await;
    assert!(error["data"]["message"].as_str().unwrap().contains("malformed"));

    // 连接仍然可用
    ws.send(TungsteniteMessage::Text(
        json!({
            "type": "send_message",
            "data": {"chat_id": chat_id, "content": "still here"}
        })
        .to_string()
        .into(),
    ))
    .await
    .expect("send command");
    let event = next_event_of(&mut ws, "new_message").await;
    assert_eq!(event["data"]["message"]["content"], "still here");
}

#[tokio::test]
async fn disconnect_broadcasts_offline_to_chat_peers() {
    let app = build_app();
    let server = spawn_server(&app).await;

    let (alice, bob) = (Uuid::new_v4(), Uuid::new_v4());
    let chat_id = Uuid::new_v4();
    app.directory
        .add_member(ChatId::new(chat_id), UserId::new(alice))
        .await;
    app.directory
        .add_member(ChatId::new(chat_id), UserId::new(bob))
        .await;

    let alice_token = app.authenticator.generate_token(alice, "alice").unwrap();
    let bob_token = app.authenticator.generate_token(bob, "bob").unwrap();

    let mut alice_ws = connect_ws(&server, &alice_token).await;
    let mut bob_ws = connect_ws(&server, &bob_token).await;
    next_event_of(&mut alice_ws, "user_joined").await;

    bob_ws.close(None).await.expect("close bob");

    let left = next_event_of(&mut alice_ws, "user_left").await;
    assert_eq!(left["data"]["user_id"], bob.to_string());
    assert_eq!(left["data"]["chat_id"], chat_id.to_string());

    // 在线状态收敛
    timeout(Duration::from_secs(2), async {
        while app.hub.is_user_online(UserId::new(bob)).await {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("bob should go offline");
}
