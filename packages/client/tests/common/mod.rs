//! In-process fake chat backend for integration tests.
//!
//! Speaks the `{"event", "data"}` WebSocket protocol and serves the REST routes
//! the client calls. Room membership is tracked per socket; `send_message` is
//! stamped with an id and timestamp and delivered to every member of the room,
//! sender included; presence and `seen` go to the other members.

#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet},
    future::Future,
    net::SocketAddr,
    sync::{
        Arc, Mutex,
        atomic::{AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use axum::{
    Json, Router,
    extract::{
        Path, State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::{
    net::TcpListener,
    sync::{Notify, mpsc},
    task::JoinHandle,
};

struct Peer {
    rooms: HashSet<String>,
    tx: mpsc::UnboundedSender<String>,
    kicked: Arc<Notify>,
}

struct BackendState {
    token: String,
    handshakes: AtomicUsize,
    next_peer: AtomicU64,
    peers: Mutex<HashMap<u64, Peer>>,
    history: Mutex<HashMap<String, Vec<Value>>>,
}

impl BackendState {
    fn register(&self, tx: mpsc::UnboundedSender<String>) -> (u64, Arc<Notify>) {
        let id = self.next_peer.fetch_add(1, Ordering::SeqCst);
        let kicked = Arc::new(Notify::new());
        self.peers.lock().unwrap().insert(
            id,
            Peer {
                rooms: HashSet::new(),
                tx,
                kicked: kicked.clone(),
            },
        );
        (id, kicked)
    }

    fn unregister(&self, id: u64) {
        self.peers.lock().unwrap().remove(&id);
    }

    /// Deliver a frame to room members, optionally skipping `except`
    fn broadcast(&self, room_id: &str, frame: &Value, except: Option<u64>) {
        let text = frame.to_string();
        for (id, peer) in self.peers.lock().unwrap().iter() {
            if Some(*id) != except && peer.rooms.contains(room_id) {
                let _ = peer.tx.send(text.clone());
            }
        }
    }

    fn reply(&self, peer_id: u64, frame: &Value) {
        if let Some(peer) = self.peers.lock().unwrap().get(&peer_id) {
            let _ = peer.tx.send(frame.to_string());
        }
    }

    fn handle_frame(&self, peer_id: u64, text: &str) {
        let Ok(frame) = serde_json::from_str::<Value>(text) else {
            return;
        };
        let event = frame["event"].as_str().unwrap_or_default();
        let data = &frame["data"];
        let room_id = data["room_id"].as_str().unwrap_or_default().to_string();

        match event {
            "join_room" => {
                if let Some(peer) = self.peers.lock().unwrap().get_mut(&peer_id) {
                    peer.rooms.insert(room_id.clone());
                }
                self.reply(
                    peer_id,
                    &json!({"event": "room_joined", "data": {"room_id": room_id}}),
                );
            }
            "leave_room" => {
                if let Some(peer) = self.peers.lock().unwrap().get_mut(&peer_id) {
                    peer.rooms.remove(&room_id);
                }
            }
            "send_message" => {
                let message = json!({
                    "_id": uuid::Uuid::new_v4().to_string(),
                    "room_id": room_id,
                    "user_id": data["user_id"],
                    "user_type": data["user_type"],
                    "content": data["content"],
                    "created_at": chrono::Utc::now().to_rfc3339(),
                    "reply_to": data.get("reply_to").cloned().unwrap_or(Value::Null),
                });
                self.history
                    .lock()
                    .unwrap()
                    .entry(room_id.clone())
                    .or_default()
                    .push(message.clone());
                self.broadcast(
                    &room_id,
                    &json!({"event": "new_message", "data": message}),
                    None,
                );
            }
            "typing" | "stop_typing" | "seen" => {
                self.broadcast(&room_id, &frame, Some(peer_id));
            }
            _ => {}
        }
    }
}

pub struct FakeBackend {
    addr: SocketAddr,
    state: Arc<BackendState>,
    task: JoinHandle<()>,
}

impl FakeBackend {
    /// Start a backend accepting `Bearer <token>`
    pub async fn start(token: &str) -> Self {
        let state = Arc::new(BackendState {
            token: token.to_string(),
            handshakes: AtomicUsize::new(0),
            next_peer: AtomicU64::new(0),
            peers: Mutex::new(HashMap::new()),
            history: Mutex::new(HashMap::new()),
        });

        let app = Router::new()
            .route("/ws", get(websocket_handler))
            .route("/api/public/rooms", post(ensure_room))
            .route("/api/public/rooms/{room_id}/messages", get(history))
            .route("/api/admin/rooms/{room_id}/messages", get(history))
            .route("/api/admin/rooms/{room_id}/mark-read", post(mark_read))
            .route("/api/admin/rooms/{room_id}/last-seen", get(last_seen))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state, task }
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    pub fn api_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn handshakes(&self) -> usize {
        self.state.handshakes.load(Ordering::SeqCst)
    }

    pub fn room_members(&self, room_id: &str) -> usize {
        self.state
            .peers
            .lock()
            .unwrap()
            .values()
            .filter(|peer| peer.rooms.contains(room_id))
            .count()
    }

    /// Drop every open socket from the server side
    pub fn kick_all(&self) {
        for peer in self.state.peers.lock().unwrap().values() {
            peer.kicked.notify_one();
        }
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn websocket_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<Arc<BackendState>>,
) -> Response {
    state.handshakes.fetch_add(1, Ordering::SeqCst);

    let expected = format!("Bearer {}", state.token);
    let authorized = headers
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value == expected);
    if !authorized {
        return StatusCode::UNAUTHORIZED.into_response();
    }

    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<BackendState>) {
    let (mut sender, mut receiver) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel::<String>();
    let (peer_id, kicked) = state.register(tx);
    state.reply(peer_id, &json!({"event": "authenticated", "data": {}}));

    let writer = tokio::spawn(async move {
        while let Some(text) = rx.recv().await {
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            _ = kicked.notified() => break,
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => state.handle_frame(peer_id, text.as_str()),
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.unregister(peer_id);
    writer.abort();
}

async fn ensure_room(Json(body): Json<Value>) -> Json<Value> {
    Json(json!({"room_id": body["customer_id"]}))
}

async fn history(
    Path(room_id): Path<String>,
    State(state): State<Arc<BackendState>>,
) -> Json<Vec<Value>> {
    let history = state.history.lock().unwrap();
    Json(history.get(&room_id).cloned().unwrap_or_default())
}

async fn mark_read(Path(_room_id): Path<String>) -> StatusCode {
    StatusCode::OK
}

async fn last_seen(Path(_room_id): Path<String>) -> Json<Value> {
    Json(Value::Null)
}

/// Poll `condition` until it holds or five seconds pass
pub async fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    within(async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    })
    .await
}

/// Whether `future` completes within five seconds
pub async fn within<F: Future<Output = ()>>(future: F) -> bool {
    tokio::time::timeout(Duration::from_secs(5), future)
        .await
        .is_ok()
}
