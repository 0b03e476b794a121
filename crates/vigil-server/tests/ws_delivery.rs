//! End-to-end realtime delivery over a live WebSocket connection.

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use futures_util::{SinkExt, StreamExt};
use rusqlite::params;
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_tungstenite::{connect_async, tungstenite};
use tower::ServiceExt;
use uuid::Uuid;
use vigil_server::realtime::RealtimeChannel;
use vigil_server::{app, auth, AppState};

const TEST_SECRET: &str = "integration-secret";

/// Builds the app, serves one clone on an ephemeral port (for WebSocket
/// clients), and returns another clone for driving HTTP with `oneshot`.
/// Both clones share the same state.
async fn setup_server() -> (axum::Router, SocketAddr, vigil_db::DbPool, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("vigil.db");
    let pool = vigil_db::create_pool(
        db_path.to_str().unwrap(),
        vigil_db::DbRuntimeSettings::default(),
    )
    .unwrap();
    {
        let conn = pool.get().unwrap();
        vigil_db::run_migrations(&conn).unwrap();
    }

    let state = AppState {
        pool: pool.clone(),
        token_secret: auth::derive_token_secret(TEST_SECRET),
        realtime: RealtimeChannel::new(),
        push: vigil_push::PushClient::disabled(),
    };

    let app = app(state);
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let served = app.clone();
    tokio::spawn(async move {
        axum::serve(
            listener,
            served.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    (app, addr, pool, dir)
}

fn seed_user(pool: &vigil_db::DbPool, role: &str) -> (String, String) {
    let id = Uuid::new_v4().to_string();
    let conn = pool.get().unwrap();
    conn.execute(
        "INSERT INTO users (id, display_name, role) VALUES (?1, ?2, ?3)",
        params![id, format!("user-{}", &id[..8]), role],
    )
    .unwrap();
    let token = auth::issue_token(&id, 3600, &auth::derive_token_secret(TEST_SECRET));
    (id, token)
}

fn request(method: &str, uri: &str, token: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {token}"));
    match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// Confirms the session is registered in its room: the pong reply is
/// queued by the session loop, which only runs after the room join.
async fn await_ready<S>(ws: &mut S)
where
    S: futures_util::Stream<Item = Result<tungstenite::Message, tungstenite::Error>>
        + futures_util::Sink<tungstenite::Message>
        + Unpin,
    <S as futures_util::Sink<tungstenite::Message>>::Error: std::fmt::Debug,
{
    ws.send(tungstenite::Message::Text(
        r#"{"event":"ping"}"#.to_string().into(),
    ))
    .await
    .unwrap();
    let frame = next_frame(ws).await;
    assert_eq!(frame["event"], "pong");
}

/// Waits for the next text frame and parses it.
async fn next_frame<S>(ws: &mut S) -> Value
where
    S: futures_util::Stream<Item = Result<tungstenite::Message, tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a websocket frame")
            .expect("websocket closed unexpectedly")
            .expect("websocket error");
        if let tungstenite::Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("frame should be JSON");
        }
    }
}

#[tokio::test]
async fn connecting_without_a_credential_is_refused() {
    let (_app, addr, _pool, _dir) = setup_server().await;

    let err = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect_err("handshake must be refused");
    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP refusal, got {other:?}"),
    }

    let err = connect_async(format!("ws://{addr}/ws?token=garbage"))
        .await
        .expect_err("bad token must be refused");
    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("expected HTTP refusal, got {other:?}"),
    }
}

#[tokio::test]
async fn ping_is_answered_with_pong() {
    let (_app, addr, pool, _dir) = setup_server().await;
    let (_user, token) = seed_user(&pool, "citizen");

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .expect("authenticated connect should succeed");

    ws.send(tungstenite::Message::Text(
        r#"{"event":"ping"}"#.to_string().into(),
    ))
    .await
    .unwrap();

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "pong");
}

#[tokio::test]
async fn report_creation_pushes_one_notification_to_the_owner() {
    let (app, addr, pool, _dir) = setup_server().await;
    let (_citizen, token) = seed_user(&pool, "citizen");

    let (mut ws, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .expect("authenticated connect should succeed");
    await_ready(&mut ws).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/reports",
            &token,
            Some(json!({ "category": "arson" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "notification");
    assert_eq!(frame["data"]["message"], "New report submitted: arson");
    assert_eq!(frame["data"]["kind"], "new_report");

    // The pushed payload is the persisted record
    let response = app
        .oneshot(request("GET", "/api/notifications", &token, None))
        .await
        .unwrap();
    let listed = body_json(response).await;
    assert_eq!(listed["data"][0]["id"], frame["data"]["id"]);

    // Exactly one event for one trigger
    ws.send(tungstenite::Message::Text(
        r#"{"event":"ping"}"#.to_string().into(),
    ))
    .await
    .unwrap();
    let frame = next_frame(&mut ws).await;
    assert_eq!(frame["event"], "pong", "no duplicate notification frame");
}

#[tokio::test]
async fn notifications_are_not_cross_delivered() {
    let (app, addr, pool, _dir) = setup_server().await;
    let (_alice, alice_token) = seed_user(&pool, "citizen");
    let (_eve, eve_token) = seed_user(&pool, "citizen");

    let (mut eve_ws, _) = connect_async(format!("ws://{addr}/ws?token={eve_token}"))
        .await
        .expect("authenticated connect should succeed");
    await_ready(&mut eve_ws).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/reports",
            &alice_token,
            Some(json!({ "category": "theft" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    // Eve's room stays silent; the next frame she sees is her own pong
    eve_ws
        .send(tungstenite::Message::Text(
            r#"{"event":"ping"}"#.to_string().into(),
        ))
        .await
        .unwrap();
    let frame = next_frame(&mut eve_ws).await;
    assert_eq!(frame["event"], "pong");
}

#[tokio::test]
async fn chat_replies_reach_the_other_participant() {
    let (app, addr, pool, _dir) = setup_server().await;
    let (_citizen, citizen_token) = seed_user(&pool, "citizen");
    let (officer, officer_token) = seed_user(&pool, "officer");

    let (mut citizen_ws, _) = connect_async(format!("ws://{addr}/ws?token={citizen_token}"))
        .await
        .expect("authenticated connect should succeed");
    await_ready(&mut citizen_ws).await;

    // Citizen opens the conversation
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/chat",
            &citizen_token,
            Some(json!({ "text": "there is a prowler outside" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    let chat_id = created["data"]["id"].as_str().unwrap().to_string();

    // Officer replies; the citizen's live session gets the message frame
    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/chat",
            &officer_token,
            Some(json!({ "text": "stay inside, a unit is close", "chat_id": chat_id })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let frame = next_frame(&mut citizen_ws).await;
    assert_eq!(frame["event"], "message");
    assert_eq!(frame["data"]["type"], "new_message");
    assert_eq!(frame["data"]["chatId"], chat_id.as_str());
    assert_eq!(frame["data"]["senderId"], officer.as_str());
    assert_eq!(frame["data"]["senderRole"], "officer");
    assert_eq!(frame["data"]["body"], "stay inside, a unit is close");
}

#[tokio::test]
async fn every_session_of_the_user_gets_the_event() {
    let (app, addr, pool, _dir) = setup_server().await;
    let (_citizen, token) = seed_user(&pool, "citizen");

    // Two concurrent sessions for the same user join the same room
    let (mut ws_a, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .unwrap();
    let (mut ws_b, _) = connect_async(format!("ws://{addr}/ws?token={token}"))
        .await
        .unwrap();
    await_ready(&mut ws_a).await;
    await_ready(&mut ws_b).await;

    let response = app
        .clone()
        .oneshot(request(
            "POST",
            "/api/reports",
            &token,
            Some(json!({ "category": "fraud" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let frame_a = next_frame(&mut ws_a).await;
    let frame_b = next_frame(&mut ws_b).await;
    assert_eq!(frame_a["event"], "notification");
    assert_eq!(frame_b["event"], "notification");
    assert_eq!(frame_a["data"]["id"], frame_b["data"]["id"]);
}
