#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Path, State, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::sync::{mpsc, Semaphore};

use wayfarer_client::config::{ChannelConfig, Config};
use wayfarer_client::nav::NavigationCapability;
use wayfarer_client::realtime::frame::{self, Frame, Incoming};
use wayfarer_client::realtime::message::room_topic;
use wayfarer_client::store::{KeyValueStore, MemoryStore};
use wayfarer_client::Client;

/// Password the fake backend accepts for every user.
pub const PASSWORD: &str = "secret";

/// Broker timestamp stamped on every fanned-out message.
pub const BROKER_TIMESTAMP: &str = "2026-03-01T09:30:00Z";

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

/// Shape of a successful `POST /api/auth/login` answer.
#[derive(Debug, Clone)]
pub enum LoginMode {
    /// `{user, token}`
    Current,
    /// `{user}` without a token.
    CurrentWithoutToken,
    /// `{message, user: null}` from the legacy backend.
    Legacy(String),
    /// `{user, token}` where the user object carries no `username`.
    CurrentWithoutUsername,
}

pub struct BackendInner {
    login_mode: Mutex<LoginMode>,
    /// token → username
    tokens: Mutex<HashMap<String, String>>,
    /// (path, Authorization header) of every HTTP request, in arrival order.
    seen: Mutex<Vec<(String, Option<String>)>>,
    logout_calls: AtomicUsize,
    logout_status: Mutex<StatusCode>,
    /// While set, login requests wait for a permit before answering.
    login_gate: Mutex<Option<Arc<Semaphore>>>,
    pub broker: Broker,
}

#[derive(Clone)]
pub struct FakeBackend {
    pub addr: SocketAddr,
    inner: Arc<BackendInner>,
}

impl std::ops::Deref for FakeBackend {
    type Target = BackendInner;

    fn deref(&self) -> &BackendInner {
        &self.inner
    }
}

/// Start the fake backend on an ephemeral port. The server runs in the
/// background for the rest of the test.
pub async fn start_backend() -> FakeBackend {
    let inner = Arc::new(BackendInner {
        login_mode: Mutex::new(LoginMode::Current),
        tokens: Mutex::new(HashMap::new()),
        seen: Mutex::new(Vec::new()),
        logout_calls: AtomicUsize::new(0),
        logout_status: Mutex::new(StatusCode::OK),
        login_gate: Mutex::new(None),
        broker: Broker::default(),
    });

    let app = Router::new()
        .route("/api/auth/login", post(login))
        .route("/api/auth/register", post(register))
        .route("/api/auth/logout", post(logout))
        .route("/api/auth/check", get(check))
        .route("/api/v1/parking-reservations/me", get(my_reservations))
        .route("/api/v1/parking-reservations/{id}", delete(cancel_reservation))
        .route("/api/search/condition", get(search_conditions))
        .route("/api/chat/{room}/{cursor}", get(chat_history))
        .route("/ws", get(ws_upgrade))
        .with_state(Arc::clone(&inner));

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    FakeBackend { addr, inner }
}

impl BackendInner {
    pub fn set_login_mode(&self, mode: LoginMode) {
        *self.login_mode.lock() = mode;
    }

    /// Hold every login request until [`BackendInner::release_logins`].
    pub fn hold_logins(&self) {
        *self.login_gate.lock() = Some(Arc::new(Semaphore::new(0)));
    }

    pub fn release_logins(&self) {
        if let Some(gate) = self.login_gate.lock().take() {
            gate.close();
        }
    }

    pub fn set_logout_status(&self, status: StatusCode) {
        *self.logout_status.lock() = status;
    }

    /// Accept `token` as a valid bearer for `username`.
    pub fn issue_token(&self, token: &str, username: &str) {
        self.tokens.lock().insert(token.to_string(), username.to_string());
    }

    /// Expire every issued token.
    pub fn revoke_all_tokens(&self) {
        self.tokens.lock().clear();
    }

    pub fn logout_calls(&self) -> usize {
        self.logout_calls.load(Ordering::SeqCst)
    }

    /// Authorization headers seen on `path`, in order.
    pub fn auth_headers_for(&self, path: &str) -> Vec<Option<String>> {
        self.seen
            .lock()
            .iter()
            .filter(|(p, _)| p == path)
            .map(|(_, h)| h.clone())
            .collect()
    }

    fn record(&self, path: &str, headers: &HeaderMap) -> Option<String> {
        let auth = headers
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        self.seen.lock().push((path.to_string(), auth.clone()));
        auth
    }

    fn user_for(&self, auth: Option<&str>) -> Option<String> {
        let token = auth?.strip_prefix("Bearer ")?;
        self.tokens.lock().get(token).cloned()
    }
}

type AppState = State<Arc<BackendInner>>;

async fn login(State(b): AppState, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    b.record("/api/auth/login", &headers);
    let gate = b.login_gate.lock().clone();
    if let Some(gate) = gate {
        let _permit = gate.acquire().await;
    }
    let username = body["username"].as_str().unwrap_or_default().to_string();
    if body["password"] != PASSWORD {
        return (StatusCode::UNAUTHORIZED, Json(json!({"error": "bad credentials"}))).into_response();
    }

    let user = json!({"username": username, "nickname": format!("{username}!")});
    let mode = b.login_mode.lock().clone();
    match mode {
        LoginMode::Current => {
            let token = format!("tok-{username}");
            b.issue_token(&token, &username);
            Json(json!({"user": user, "token": token})).into_response()
        }
        LoginMode::CurrentWithoutToken => Json(json!({"user": user})).into_response(),
        LoginMode::Legacy(message) => Json(json!({"message": message, "user": null})).into_response(),
        LoginMode::CurrentWithoutUsername => {
            let token = format!("tok-{username}");
            b.issue_token(&token, &username);
            Json(json!({"user": {"id": 7}, "token": token})).into_response()
        }
    }
}

async fn register(State(b): AppState, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    b.record("/api/auth/register", &headers);
    if body["username"] == "taken" {
        return (StatusCode::CONFLICT, "username taken").into_response();
    }
    (StatusCode::CREATED, Json(json!({"id": 1, "username": body["username"]}))).into_response()
}

async fn logout(State(b): AppState, headers: HeaderMap) -> Response {
    b.record("/api/auth/logout", &headers);
    b.logout_calls.fetch_add(1, Ordering::SeqCst);
    let status = *b.logout_status.lock();
    status.into_response()
}

async fn check(State(b): AppState, headers: HeaderMap) -> Response {
    let auth = b.record("/api/auth/check", &headers);
    match (auth.as_deref(), b.user_for(auth.as_deref())) {
        (None, _) => Json(json!({"user": null})).into_response(),
        (Some(_), Some(username)) => Json(json!({"user": {"username": username}})).into_response(),
        (Some(_), None) => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn my_reservations(State(b): AppState, headers: HeaderMap) -> Response {
    let auth = b.record("/api/v1/parking-reservations/me", &headers);
    match b.user_for(auth.as_deref()) {
        Some(username) => Json(json!([{"id": "r1", "owner": username}])).into_response(),
        None => StatusCode::UNAUTHORIZED.into_response(),
    }
}

async fn cancel_reservation(State(b): AppState, headers: HeaderMap, Path(id): Path<String>) -> Response {
    let auth = b.record("/api/v1/parking-reservations/{id}", &headers);
    if b.user_for(auth.as_deref()).is_none() {
        return StatusCode::UNAUTHORIZED.into_response();
    }
    if id == "missing" {
        return (StatusCode::NOT_FOUND, "no such reservation").into_response();
    }
    StatusCode::NO_CONTENT.into_response()
}

async fn search_conditions(State(b): AppState, headers: HeaderMap) -> Response {
    b.record("/api/search/condition", &headers);
    Json(json!({"regions": ["Seoul", "Busan"]})).into_response()
}

async fn chat_history(
    State(b): AppState,
    headers: HeaderMap,
    Path((room, cursor)): Path<(String, String)>,
) -> Response {
    b.record("/api/chat/{room}/{cursor}", &headers);
    Json(json!({"room": room, "cursor": cursor, "messages": []})).into_response()
}

// ---------------------------------------------------------------------------
// Fake STOMP broker
// ---------------------------------------------------------------------------

enum Outbound {
    Text(String),
    Close,
}

struct Peer {
    tx: mpsc::UnboundedSender<Outbound>,
    /// destination → subscription id
    subscriptions: HashMap<String, String>,
}

pub struct Broker {
    next_peer: AtomicU64,
    peers: Mutex<HashMap<u64, Peer>>,
    heart_beat: Mutex<String>,
    connects: AtomicUsize,
    received: Mutex<Vec<Value>>,
}

impl Default for Broker {
    fn default() -> Self {
        Self {
            next_peer: AtomicU64::new(1),
            peers: Mutex::new(HashMap::new()),
            heart_beat: Mutex::new("0,0".to_string()),
            connects: AtomicUsize::new(0),
            received: Mutex::new(Vec::new()),
        }
    }
}

impl Broker {
    /// `heart-beat` header sent in CONNECTED. The broker itself never sends
    /// heart-beats, so promising any makes clients time out.
    pub fn set_heart_beat(&self, value: &str) {
        *self.heart_beat.lock() = value.to_string();
    }

    /// Number of CONNECT frames handled so far.
    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn subscription_count(&self) -> usize {
        self.peers.lock().values().map(|p| p.subscriptions.len()).sum()
    }

    pub fn is_subscribed(&self, room_id: &str) -> bool {
        let topic = room_topic(room_id);
        self.peers
            .lock()
            .values()
            .any(|p| p.subscriptions.contains_key(&topic))
    }

    /// Bodies of every SEND frame received.
    pub fn received(&self) -> Vec<Value> {
        self.received.lock().clone()
    }

    /// Server-side publish to a room. Returns how many subscribers got it.
    pub fn publish(&self, room_id: &str, sender_id: &str, body: &str) -> usize {
        self.fan_out(json!({"roomId": room_id, "senderId": sender_id, "body": body}))
    }

    /// Send an ERROR frame to every connected client.
    pub fn send_error(&self, message: &str, details: &str) {
        let wire = Frame::new(frame::ERROR)
            .header("message", message)
            .with_body(details)
            .encode();
        for peer in self.peers.lock().values() {
            let _ = peer.tx.send(Outbound::Text(wire.clone()));
        }
    }

    /// Close every client socket, as a broker restart would.
    pub fn drop_connections(&self) {
        for (_, peer) in self.peers.lock().drain() {
            let _ = peer.tx.send(Outbound::Close);
        }
    }

    fn join(&self, tx: mpsc::UnboundedSender<Outbound>) -> u64 {
        let id = self.next_peer.fetch_add(1, Ordering::SeqCst);
        self.peers.lock().insert(
            id,
            Peer {
                tx,
                subscriptions: HashMap::new(),
            },
        );
        id
    }

    fn leave(&self, peer: u64) {
        self.peers.lock().remove(&peer);
    }

    fn reply(&self, peer: u64, frame: Frame) {
        if let Some(p) = self.peers.lock().get(&peer) {
            let _ = p.tx.send(Outbound::Text(frame.encode()));
        }
    }

    fn handle(&self, peer: u64, frame: Frame) {
        match frame.command.as_str() {
            frame::CONNECT => {
                self.connects.fetch_add(1, Ordering::SeqCst);
                let hb = self.heart_beat.lock().clone();
                self.reply(
                    peer,
                    Frame::new(frame::CONNECTED)
                        .header("version", "1.2")
                        .header("heart-beat", hb),
                );
            }
            frame::SUBSCRIBE => {
                let (Some(id), Some(dest)) = (frame.get("id"), frame.get("destination")) else {
                    return;
                };
                if let Some(p) = self.peers.lock().get_mut(&peer) {
                    p.subscriptions.insert(dest.to_string(), id.to_string());
                }
            }
            frame::UNSUBSCRIBE => {
                let Some(id) = frame.get("id") else { return };
                if let Some(p) = self.peers.lock().get_mut(&peer) {
                    p.subscriptions.retain(|_, sub| sub != id);
                }
            }
            frame::SEND => {
                let Ok(body) = serde_json::from_str::<Value>(&frame.body) else {
                    self.reply(
                        peer,
                        Frame::new(frame::ERROR)
                            .header("message", "malformed body")
                            .with_body(frame.body.clone()),
                    );
                    return;
                };
                self.received.lock().push(body.clone());
                self.fan_out(body);
            }
            frame::DISCONNECT => {
                if let Some(receipt) = frame.get("receipt") {
                    self.reply(peer, Frame::new(frame::RECEIPT).header("receipt-id", receipt));
                }
                if let Some(p) = self.peers.lock().remove(&peer) {
                    let _ = p.tx.send(Outbound::Close);
                }
            }
            _ => {}
        }
    }

    fn fan_out(&self, mut body: Value) -> usize {
        let room = body["roomId"].as_str().unwrap_or_default().to_string();
        body["timestamp"] = json!(BROKER_TIMESTAMP);
        let topic = room_topic(&room);
        let payload = body.to_string();

        let peers = self.peers.lock();
        let mut delivered = 0;
        for peer in peers.values() {
            let Some(sub) = peer.subscriptions.get(&topic) else {
                continue;
            };
            let wire = Frame::new(frame::MESSAGE)
                .header("subscription", sub.as_str())
                .header("destination", topic.as_str())
                .header("message-id", format!("m-{delivered}"))
                .header("content-type", "application/json")
                .with_body(payload.clone())
                .encode();
            if peer.tx.send(Outbound::Text(wire)).is_ok() {
                delivered += 1;
            }
        }
        delivered
    }
}

async fn ws_upgrade(ws: WebSocketUpgrade, State(b): AppState) -> impl IntoResponse {
    ws.on_upgrade(move |socket| broker_session(socket, b))
}

async fn broker_session(socket: WebSocket, backend: Arc<BackendInner>) {
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (tx, mut rx) = mpsc::unbounded_channel();
    let peer = backend.broker.join(tx);

    let writer = tokio::spawn(async move {
        while let Some(out) = rx.recv().await {
            match out {
                Outbound::Text(text) => {
                    if ws_tx.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Outbound::Close => {
                    let _ = ws_tx.send(Message::Close(None)).await;
                    break;
                }
            }
        }
    });

    while let Some(Ok(msg)) = ws_rx.next().await {
        let Message::Text(text) = msg else { continue };
        let Ok(items) = frame::decode(text.as_str()) else { continue };
        for item in items {
            if let Incoming::Frame(f) = item {
                backend.broker.handle(peer, f);
            }
        }
    }

    backend.broker.leave(peer);
    writer.abort();
}

// ---------------------------------------------------------------------------
// Client side
// ---------------------------------------------------------------------------

/// Navigator that counts redirects.
#[derive(Default)]
pub struct RecordingNavigator {
    redirects: AtomicUsize,
}

impl RecordingNavigator {
    pub fn count(&self) -> usize {
        self.redirects.load(Ordering::SeqCst)
    }
}

impl NavigationCapability for RecordingNavigator {
    fn redirect_to_login(&self) {
        self.redirects.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct TestClient {
    pub client: Client,
    pub kv: Arc<MemoryStore>,
    pub navigator: Arc<RecordingNavigator>,
}

impl std::ops::Deref for TestClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        &self.client
    }
}

pub fn test_config(addr: SocketAddr) -> Config {
    let mut channel = ChannelConfig::new(format!("ws://{addr}/ws"));
    channel.reconnect_delay = Duration::from_millis(200);
    Config {
        api_base_url: format!("http://{addr}"),
        token_store_path: std::env::temp_dir().join("wayfarer-unused.json"),
        request_timeout: Duration::from_secs(5),
        channel,
    }
}

pub fn client_with(config: Config) -> TestClient {
    let kv = Arc::new(MemoryStore::new());
    let navigator = Arc::new(RecordingNavigator::default());
    let client = Client::new(
        config,
        Arc::clone(&kv) as Arc<dyn KeyValueStore>,
        Arc::clone(&navigator) as Arc<dyn NavigationCapability>,
    )
    .expect("build client");
    TestClient {
        client,
        kv,
        navigator,
    }
}

pub fn client_for(backend: &FakeBackend) -> TestClient {
    client_with(test_config(backend.addr))
}

/// Poll `check` until it holds, failing the test after five seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !check() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

