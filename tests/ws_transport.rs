//! The WebSocket connector and the `reqwest` collaborators against an
//! `axum` fixture playing the marketplace backend.

#![allow(clippy::panic)]

use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::sync::broadcast;

use wedding_realtime::api::{ChatApi, RestClient};
use wedding_realtime::chat::ChatTarget;
use wedding_realtime::domain::events::names;
use wedding_realtime::domain::{ChatId, Identity, IdentityId, NotificationId};
use wedding_realtime::transport::{ConnectionManager, ReconnectPolicy, WsConnector};
use wedding_realtime::{RealtimeClient, RealtimeConfig, RealtimeError};

/// In-memory marketplace backend.
#[derive(Debug)]
struct Fixture {
    messages: Mutex<Vec<Value>>,
    frames: Mutex<Vec<(String, Value)>>,
    read: Mutex<Vec<String>>,
    /// (channel, encoded frame) fan-out to sockets in that channel.
    channels: broadcast::Sender<(String, String)>,
}

type Shared = Arc<Fixture>;

fn guard<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Fixture {
    fn publish(&self, channel: &str, event: &str, data: Value) {
        let text = json!({ "event": event, "data": data }).to_string();
        let _ = self.channels.send((channel.to_string(), text));
    }

    fn frames_named(&self, event: &str) -> usize {
        guard(&self.frames).iter().filter(|(name, _)| name == event).count()
    }
}

async fn ws_handler(ws: WebSocketUpgrade, State(fixture): State<Shared>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| run_socket(socket, fixture))
}

async fn run_socket(socket: WebSocket, fixture: Shared) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let mut fan_out = fixture.channels.subscribe();
    let mut joined: HashSet<String> = HashSet::new();

    loop {
        tokio::select! {
            msg = ws_rx.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let Ok(frame) = serde_json::from_str::<Value>(text.as_str()) else {
                            continue;
                        };
                        let event = frame.get("event").and_then(Value::as_str).unwrap_or_default().to_string();
                        let data = frame.get("data").cloned().unwrap_or(Value::Null);
                        let field = |key: &str| data.get(key).and_then(Value::as_str).unwrap_or_default().to_string();
                        match event.as_str() {
                            "joinRoom" => {
                                joined.insert(field("chatId"));
                            }
                            "registerUser" => {
                                joined.insert(format!("user:{}", field("userId")));
                            }
                            "registerVendor" => {
                                joined.insert(format!("vendor:{}", field("vendorId")));
                            }
                            "sendMessage" => fixture.publish(&field("chatId"), "receiveMessage", data.clone()),
                            "typing" => fixture.publish(&field("chatId"), "typing", data.clone()),
                            _ => {}
                        }
                        guard(&fixture.frames).push((event, data));
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    _ => {}
                }
            }
            out = fan_out.recv() => {
                match out {
                    Ok((channel, text)) => {
                        if joined.contains(&channel) && ws_tx.send(Message::text(text)).await.is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => {}
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    }
}

async fn list_messages(Path(chat_id): Path<String>, State(fixture): State<Shared>) -> impl IntoResponse {
    if chat_id == "broken" {
        return (StatusCode::INTERNAL_SERVER_ERROR, "store offline").into_response();
    }
    let messages: Vec<Value> = guard(&fixture.messages)
        .iter()
        .filter(|m| m.get("chatId").and_then(Value::as_str) == Some(chat_id.as_str()))
        .cloned()
        .collect();
    Json(messages).into_response()
}

async fn create_message(
    Path(chat_id): Path<String>,
    State(fixture): State<Shared>,
    Json(mut body): Json<Value>,
) -> impl IntoResponse {
    let mut messages = guard(&fixture.messages);
    let id = format!("m{}", messages.len().saturating_add(1));
    if let Some(doc) = body.as_object_mut() {
        doc.insert("_id".into(), json!(id));
        doc.insert("chatId".into(), json!(chat_id));
    }
    messages.push(body.clone());
    (StatusCode::CREATED, Json(body))
}

async fn list_notifications(Path((id, kind)): Path<(String, String)>) -> impl IntoResponse {
    Json(json!([{
        "_id": "n1",
        "recipientId": id,
        "recipientType": kind,
        "message": "Your booking was confirmed",
        "type": "booking",
        "isRead": false
    }]))
}

async fn mark_read(Path(id): Path<String>, State(fixture): State<Shared>) -> impl IntoResponse {
    guard(&fixture.read).push(id);
    StatusCode::OK
}

async fn serve() -> (SocketAddr, Shared) {
    let (channels, _) = broadcast::channel(64);
    let fixture = Arc::new(Fixture {
        messages: Mutex::new(Vec::new()),
        frames: Mutex::new(Vec::new()),
        read: Mutex::new(Vec::new()),
        channels,
    });
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/api/chat/{id}/messages", get(list_messages))
        .route("/api/chat/{id}/message", post(create_message))
        .route("/api/notifications/{id}/{kind}", get(list_notifications))
        .route("/api/notifications/mark-read/{id}", put(mark_read))
        .with_state(Arc::clone(&fixture));
    let Ok(listener) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("fixture must bind");
    };
    let Ok(addr) = listener.local_addr() else {
        panic!("fixture must have an address");
    };
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    (addr, fixture)
}

fn client_for(addr: SocketAddr) -> RealtimeClient {
    let Ok(config) = RealtimeConfig::new(&format!("http://{addr}")) else {
        panic!("config must load");
    };
    let Ok(client) = RealtimeClient::new(config) else {
        panic!("client must build");
    };
    client
}

async fn eventually(check: impl Fn() -> bool) -> bool {
    for _ in 0..300 {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}

#[tokio::test]
async fn two_parties_exchange_a_message() {
    let (addr, fixture) = serve().await;
    let user = client_for(addr);
    let vendor = client_for(addr);

    let vendor_session = vendor
        .open_chat(ChatTarget {
            chat_id: ChatId::from("c1"),
            viewer: Identity::vendor("vendorB"),
            peer: IdentityId::from("userA"),
        })
        .await;
    assert!(eventually(|| fixture.frames_named(names::JOIN_ROOM) == 1).await);

    let user_session = user
        .open_chat(ChatTarget {
            chat_id: ChatId::from("c1"),
            viewer: Identity::user("userA"),
            peer: IdentityId::from("vendorB"),
        })
        .await;
    assert!(eventually(|| fixture.frames_named(names::JOIN_ROOM) == 2).await);
    assert!(user_session.is_ready());

    let Ok(receipt) = user_session.send("Hi").await else {
        panic!("send must be accepted");
    };
    assert!(receipt.is_complete());
    assert_eq!(
        receipt.persisted.ok().flatten().map(|id| id.as_str().to_string()),
        Some("m1".to_string())
    );

    assert!(eventually(|| vendor_session.messages().iter().any(|m| m.content == "Hi")).await);
    assert!(eventually(|| fixture.frames_named(names::MARK_SEEN) >= 3).await);

    let mine = user_session.messages();
    assert_eq!(mine.len(), 1);
    let Some(entry) = mine.first() else {
        panic!("own message must be visible");
    };
    assert_eq!(entry.id.as_ref().map(|id| id.as_str()), Some("m1"));
    assert_eq!(guard(&fixture.messages).len(), 1);
}

#[tokio::test]
async fn notifications_bootstrap_push_and_mark_read() {
    let (addr, fixture) = serve().await;
    let client = client_for(addr);

    let feed = client.start_notifications(Identity::user("u1")).await;
    assert_eq!(feed.unread_count(), 1);
    assert!(eventually(|| fixture.frames_named(names::REGISTER_USER) == 1).await);

    fixture.publish(
        "user:u1",
        names::NEW_NOTIFICATION,
        json!({ "_id": "n2", "message": "New message", "type": "message" }),
    );
    fixture.publish(
        "user:u1",
        names::NEW_NOTIFICATION,
        json!({ "_id": "n2", "message": "New message", "type": "message" }),
    );
    assert!(eventually(|| feed.unread_count() == 2).await);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(feed.notifications().len(), 2);
    assert!(client.surface().has_shown("notification:n2"));

    let Ok(changed) = feed.mark_read(&NotificationId::from("n1")).await else {
        panic!("mark-read must succeed");
    };
    assert!(changed);
    assert_eq!(feed.unread_count(), 1);
    assert_eq!(*guard(&fixture.read), vec!["n1".to_string()]);
}

#[tokio::test]
async fn failing_history_fetch_leaves_session_failed() {
    let (addr, _fixture) = serve().await;
    let client = client_for(addr);

    let session = client
        .open_chat(ChatTarget {
            chat_id: ChatId::from("broken"),
            viewer: Identity::user("userA"),
            peer: IdentityId::from("vendorB"),
        })
        .await;
    assert!(!session.is_ready());
    assert!(matches!(
        session.last_error(),
        Some(RealtimeError::Status { status: 500, .. })
    ));
    assert!(matches!(session.send("Hi").await, Err(RealtimeError::NotReady(_))));
}

#[tokio::test]
async fn rest_client_reads_posted_history() {
    let (addr, _fixture) = serve().await;
    let Ok(config) = RealtimeConfig::new(&format!("http://{addr}")) else {
        panic!("config must load");
    };
    let Ok(rest) = RestClient::new(&config) else {
        panic!("client must build");
    };
    let Ok(content) = wedding_realtime::domain::MessageContent::parse("See you Saturday") else {
        panic!("content must parse");
    };
    let body = wedding_realtime::api::NewMessage::new(
        ChatId::from("c7"),
        IdentityId::from("userA"),
        &content,
        IdentityId::from("vendorB"),
    );
    let Ok(Some(stored)) = rest.post_message(&body).await else {
        panic!("post must return the stored document");
    };
    assert_eq!(stored.content, "See you Saturday");

    let Ok(history) = rest.fetch_messages(&ChatId::from("c7")).await else {
        panic!("history must load");
    };
    assert_eq!(history.len(), 1);
    assert!(history.iter().all(|m| m.id == stored.id));
}

#[tokio::test]
async fn unreachable_socket_reports_transport_error() {
    let Ok(vacant) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("port must bind");
    };
    let Ok(addr) = vacant.local_addr() else {
        panic!("port must have an address");
    };
    drop(vacant);

    let manager = ConnectionManager::new(
        format!("ws://{addr}/ws"),
        Arc::new(WsConnector::default()),
        ReconnectPolicy::default(),
    );
    assert!(matches!(
        manager.connect().await,
        Err(RealtimeError::TransportUnavailable(_))
    ));
    assert!(!manager.is_connected());
}
