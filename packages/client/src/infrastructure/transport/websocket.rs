//! WebSocket connection manager.
//!
//! ## 責務
//!
//! - 認証済み Identity ごとに一つの接続を所有する
//! - 切断時の再接続（上限付きバックオフ）
//! - 受信フレームのデコードと `EventDispatcher` への配送
//! - 送信イベントのエンコード（接続がない場合は破棄、キューイングしない）
//!
//! ## 設計ノート
//!
//! 接続は作り直すもので、書き換えない。`connect` で別の Identity に切り替えると
//! 古い接続のハンドラは全て外れ、呼び出し側は新しい接続に対して
//! 再度 `subscribe` する必要がある。

use std::sync::{
    Arc, Mutex, MutexGuard, PoisonError,
    atomic::{AtomicU64, Ordering},
};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::{mpsc, watch},
    task::JoinHandle,
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{
        self,
        client::IntoClientRequest,
        http::{HeaderValue, header::AUTHORIZATION},
        protocol::Message,
    },
};

use crate::{
    domain::{
        ConnectionState, EventDispatcher, EventEmitter, EventKind, EventSource, Identity,
        InboundEvent, OutboundEvent, ProtocolError, ReconnectPolicy, Subscription, TransportError,
        reconnect::{should_attempt_reconnect, should_exit_immediately},
    },
    infrastructure::dto::conversion::{decode_frame, encode_frame},
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Connection state shared between the manager and its driver tasks.
///
/// Each connection gets a generation; a driver may only publish while its
/// generation is current, so a torn-down connection can never overwrite the
/// state of its replacement.
struct StateCell {
    tx: watch::Sender<ConnectionState>,
    generation: AtomicU64,
}

impl StateCell {
    fn new() -> Self {
        let (tx, _rx) = watch::channel(ConnectionState::Disconnected);
        Self {
            tx,
            generation: AtomicU64::new(0),
        }
    }

    fn current(&self) -> ConnectionState {
        *self.tx.borrow()
    }

    /// Start a new generation in `Connecting`
    fn begin(&self) -> u64 {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.publish(generation, ConnectionState::Connecting);
        generation
    }

    /// Invalidate the current generation and report `Disconnected`
    fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.tx.send_if_modified(|state| {
            if *state == ConnectionState::Disconnected {
                return false;
            }
            *state = ConnectionState::Disconnected;
            true
        });
    }

    fn publish(&self, generation: u64, next: ConnectionState) {
        self.tx.send_if_modified(|state| {
            if self.generation.load(Ordering::SeqCst) != generation || *state == next {
                return false;
            }
            tracing::debug!("Connection state: {} -> {}", state, next);
            *state = next;
            true
        });
    }
}

/// A live connection owned by the manager
struct Connection {
    identity: Identity,
    dispatcher: EventDispatcher,
    outbound: mpsc::UnboundedSender<String>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Connection {
    fn is_live(&self) -> bool {
        !self.task.is_finished()
    }

    /// Detach all handlers and ask the driver to close the link
    fn close(self) {
        self.dispatcher.clear();
        // The driver may already have stopped after exhausting its retries.
        let _ = self.shutdown.send(true);
    }
}

/// Owns the single realtime connection of a signed-in identity.
pub struct ConnectionManager {
    url: String,
    policy: ReconnectPolicy,
    slot: Mutex<Option<Connection>>,
    state: Arc<StateCell>,
}

impl ConnectionManager {
    /// Create a manager for the WebSocket endpoint at `url`
    pub fn new(url: impl Into<String>, policy: ReconnectPolicy) -> Self {
        Self {
            url: url.into(),
            policy,
            slot: Mutex::new(None),
            state: Arc::new(StateCell::new()),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Option<Connection>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Open a connection for `identity`.
    ///
    /// A no-op if a live connection for the same identity exists. Any other
    /// connection is torn down first. Without a token nothing happens besides an
    /// error log. Must be called from within a Tokio runtime.
    pub fn connect(&self, identity: Identity, token: Option<&str>) {
        let Some(token) = token.filter(|token| !token.trim().is_empty()) else {
            tracing::error!(
                "Cannot connect as '{}': auth token is missing",
                identity.id
            );
            return;
        };

        let mut slot = self.slot();
        if let Some(current) = slot.as_ref()
            && current.identity == identity
            && current.is_live()
        {
            tracing::debug!("Connection for '{}' is already live", identity.id);
            return;
        }
        if let Some(previous) = slot.take() {
            tracing::info!("Tearing down connection for '{}'", previous.identity.id);
            previous.close();
        }

        let generation = self.state.begin();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let dispatcher = EventDispatcher::new();

        let driver = Driver {
            url: self.url.clone(),
            token: token.to_string(),
            label: identity.id.to_string(),
            policy: self.policy,
            dispatcher: dispatcher.clone(),
            outbound: outbound_rx,
            shutdown: shutdown_rx,
            state: self.state.clone(),
            generation,
        };
        let task = tokio::spawn(driver.run());

        tracing::info!("Connecting to {} as '{}' ({})", self.url, identity.id, identity.role);
        *slot = Some(Connection {
            identity,
            dispatcher,
            outbound: outbound_tx,
            shutdown: shutdown_tx,
            task,
        });
    }

    /// Release the connection. Idempotent.
    pub fn disconnect(&self) {
        let previous = self.slot().take();
        self.state.reset();
        if let Some(connection) = previous {
            tracing::info!("Disconnecting '{}'", connection.identity.id);
            connection.close();
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state.current()
    }

    pub fn is_connected(&self) -> bool {
        self.state().is_connected()
    }

    /// Observe state transitions
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.tx.subscribe()
    }

    /// Identity of the current connection, if any
    pub fn identity(&self) -> Option<Identity> {
        self.slot().as_ref().map(|connection| connection.identity.clone())
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(connection) = self.slot().take() {
            connection.close();
        }
    }
}

impl EventEmitter for ConnectionManager {
    fn emit(&self, event: OutboundEvent) -> bool {
        let slot = self.slot();
        let Some(connection) = slot.as_ref() else {
            tracing::debug!("No connection; dropping '{}'", event.name());
            return false;
        };

        let state = self.state.current();
        if !state.is_connected() {
            tracing::debug!("Connection is {}; dropping '{}'", state, event.name());
            return false;
        }

        let text = match encode_frame(&event, &connection.identity) {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Failed to encode '{}': {}", event.name(), e);
                return false;
            }
        };

        if connection.outbound.send(text).is_err() {
            tracing::debug!("Connection task stopped; dropping '{}'", event.name());
            return false;
        }
        tracing::debug!("Emitted '{}' for room '{}'", event.name(), event.room_id());
        true
    }
}

impl EventSource for ConnectionManager {
    fn subscribe(
        &self,
        kind: EventKind,
        handler: Box<dyn Fn(&InboundEvent) + Send + Sync>,
    ) -> Subscription {
        match self.slot().as_ref() {
            Some(connection) => connection.dispatcher.subscribe(kind, handler),
            None => {
                tracing::warn!("No connection; '{}' handler was not attached", kind);
                Subscription::detached(kind)
            }
        }
    }
}

/// Why a link ended
enum LinkEnd {
    Shutdown,
    Lost(String),
}

/// Background task driving one connection through its reconnect cycle
struct Driver {
    url: String,
    token: String,
    label: String,
    policy: ReconnectPolicy,
    dispatcher: EventDispatcher,
    outbound: mpsc::UnboundedReceiver<String>,
    shutdown: watch::Receiver<bool>,
    state: Arc<StateCell>,
    generation: u64,
}

impl Driver {
    async fn run(mut self) {
        let mut retries: u32 = 0;

        loop {
            let phase = if retries == 0 {
                ConnectionState::Connecting
            } else {
                ConnectionState::Reconnecting
            };
            self.state.publish(self.generation, phase);

            let opened = tokio::select! {
                biased;
                _ = cancelled(&mut self.shutdown) => return,
                opened = open_link(&self.url, &self.token) => opened,
            };

            let error = match opened {
                Ok(stream) => {
                    retries = 0;
                    discard_stale(&mut self.outbound);
                    self.state.publish(self.generation, ConnectionState::Connected);
                    tracing::info!("Connected to {} as '{}'", self.url, self.label);

                    match run_link(
                        stream,
                        &self.dispatcher,
                        &mut self.outbound,
                        &mut self.shutdown,
                    )
                    .await
                    {
                        LinkEnd::Shutdown => return,
                        LinkEnd::Lost(reason) => {
                            tracing::warn!("Connection lost: {}", reason);
                            TransportError::ConnectionError(reason)
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", self.url, e);
                    e
                }
            };

            if !should_attempt_reconnect(&error, retries, self.policy.max_attempts) {
                if should_exit_immediately(&error) {
                    tracing::error!("Not retrying for '{}': {}", self.label, error);
                } else {
                    tracing::error!(
                        "Failed to reconnect after {} attempts. Staying disconnected.",
                        self.policy.max_attempts
                    );
                }
                break;
            }

            retries += 1;
            let delay = self.policy.delay_for(retries);
            self.state
                .publish(self.generation, ConnectionState::Reconnecting);
            tracing::info!(
                "Reconnecting in {:?}... (attempt {}/{})",
                delay,
                retries,
                self.policy.max_attempts
            );

            tokio::select! {
                biased;
                _ = cancelled(&mut self.shutdown) => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        self.state
            .publish(self.generation, ConnectionState::Disconnected);
    }
}

/// Resolve once shutdown is requested or the manager side is gone
async fn cancelled(shutdown: &mut watch::Receiver<bool>) {
    loop {
        if *shutdown.borrow_and_update() {
            return;
        }
        if shutdown.changed().await.is_err() {
            return;
        }
    }
}

/// Drop frames emitted before the previous link died
fn discard_stale(outbound: &mut mpsc::UnboundedReceiver<String>) {
    let mut dropped = 0usize;
    while outbound.try_recv().is_ok() {
        dropped += 1;
    }
    if dropped > 0 {
        tracing::debug!("Discarded {} frame(s) queued on the dead link", dropped);
    }
}

/// Perform the WebSocket handshake with a bearer token
async fn open_link(url: &str, token: &str) -> Result<WsStream, TransportError> {
    let mut request = url
        .into_client_request()
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    let bearer = HeaderValue::from_str(&format!("Bearer {}", token))
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    request.headers_mut().insert(AUTHORIZATION, bearer);

    match connect_async(request).await {
        Ok((stream, _response)) => Ok(stream),
        Err(tungstenite::Error::Http(response)) => {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                Err(TransportError::Unauthorized(format!(
                    "handshake answered HTTP {}",
                    status
                )))
            } else {
                Err(TransportError::ConnectionError(format!(
                    "handshake answered HTTP {}",
                    status
                )))
            }
        }
        Err(e) => Err(TransportError::ConnectionError(e.to_string())),
    }
}

/// Pump frames in both directions until the link ends
async fn run_link(
    stream: WsStream,
    dispatcher: &EventDispatcher,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    shutdown: &mut watch::Receiver<bool>,
) -> LinkEnd {
    let (mut write, mut read) = stream.split();

    loop {
        tokio::select! {
            biased;
            _ = cancelled(shutdown) => {
                let _ = write.send(Message::Close(None)).await;
                return LinkEnd::Shutdown;
            }
            frame = outbound.recv() => match frame {
                Some(text) => {
                    if let Err(e) = write.send(Message::Text(text.into())).await {
                        return LinkEnd::Lost(e.to_string());
                    }
                }
                None => {
                    let _ = write.send(Message::Close(None)).await;
                    return LinkEnd::Shutdown;
                }
            },
            incoming = read.next() => match incoming {
                Some(Ok(Message::Text(text))) => dispatch_text(dispatcher, text.as_str()),
                Some(Ok(Message::Binary(data))) => {
                    tracing::debug!("Ignoring {} bytes of binary data", data.len());
                }
                Some(Ok(Message::Close(_))) => {
                    return LinkEnd::Lost("server closed the connection".to_string());
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => return LinkEnd::Lost(e.to_string()),
                None => return LinkEnd::Lost("stream ended".to_string()),
            },
        }
    }
}

fn dispatch_text(dispatcher: &EventDispatcher, text: &str) {
    match decode_frame(text) {
        Ok(event) => {
            tracing::debug!("Received '{}'", event.kind());
            dispatcher.dispatch(&event);
        }
        Err(ProtocolError::UnknownEvent(name)) => {
            tracing::debug!("Ignoring unknown event '{}'", name);
        }
        Err(e) => tracing::warn!("Dropping undecodable frame: {}", e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RoomId, UserId};

    // ========================================
    // 【何をテストするか】
    // - ネットワークに到達しない範囲での ConnectionManager の振る舞い
    // - トークン欠如、接続前の emit 破棄、Identity 切り替え時のハンドラ解除
    // - ローカルのリスナーを相手にした再試行の上限と回数のリセット
    //
    // メッセージのやり取りは tests/ の統合テストで検証する
    // ========================================

    // Nothing listens on the discard port in the test environment.
    const UNREACHABLE_URL: &str = "ws://127.0.0.1:9/ws";

    fn customer(id: &str) -> Identity {
        Identity::customer(UserId::new(id).unwrap())
    }

    fn join(room: &str) -> OutboundEvent {
        OutboundEvent::JoinRoom {
            room_id: RoomId::new(room).unwrap(),
        }
    }

    fn fast_policy(max_attempts: u32) -> ReconnectPolicy {
        ReconnectPolicy {
            max_attempts,
            initial_delay: std::time::Duration::from_millis(10),
            max_delay: std::time::Duration::from_millis(20),
        }
    }

    /// A local listener counting accepted sockets. Sockets whose 1-based index
    /// satisfies `handshake` complete the WebSocket handshake and are then
    /// closed; all others are dropped right after accept.
    async fn flaky_listener(
        handshake: impl Fn(usize) -> bool + Send + 'static,
    ) -> (String, Arc<std::sync::atomic::AtomicUsize>) {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let accepts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let counter = accepts.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if handshake(index) {
                    let _ = tokio_tungstenite::accept_async(stream).await;
                }
            }
        });
        (url, accepts)
    }

    async fn wait_for_state(manager: &ConnectionManager, target: ConnectionState) {
        let mut rx = manager.watch_state();
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            loop {
                if *rx.borrow_and_update() == target {
                    return;
                }
                rx.changed().await.unwrap();
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test]
    async fn test_connect_without_token_does_nothing() {
        // テスト項目: トークンがない場合は接続せず、状態は Disconnected のまま
        // given (前提条件):
        let manager = ConnectionManager::new(UNREACHABLE_URL, ReconnectPolicy::default());

        // when (操作):
        manager.connect(customer("c1"), None);
        manager.connect(customer("c1"), Some("  "));

        // then (期待する結果):
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.identity(), None);
    }

    #[tokio::test]
    async fn test_emit_without_connection_is_dropped() {
        // テスト項目: 接続がない場合の emit は破棄される
        // given (前提条件):
        let manager = ConnectionManager::new(UNREACHABLE_URL, ReconnectPolicy::default());

        // when (操作):
        let sent = manager.emit(join("c1"));

        // then (期待する結果):
        assert!(!sent);
    }

    #[tokio::test]
    async fn test_emit_while_connecting_is_dropped() {
        // テスト項目: 接続確立前の emit はキューに積まれず破棄される
        // given (前提条件):
        let manager = ConnectionManager::new(UNREACHABLE_URL, ReconnectPolicy::default());
        manager.connect(customer("c1"), Some("token"));

        // when (操作):
        let sent = manager.emit(join("c1"));

        // then (期待する結果):
        assert!(!sent);
        assert_ne!(manager.state(), ConnectionState::Connected);
        assert_eq!(manager.identity(), Some(customer("c1")));
    }

    #[tokio::test]
    async fn test_connect_same_identity_keeps_handlers() {
        // テスト項目: 同じ Identity で再度 connect しても接続とハンドラは維持される
        // given (前提条件):
        let manager = ConnectionManager::new(UNREACHABLE_URL, ReconnectPolicy::default());
        manager.connect(customer("c1"), Some("token"));
        let subscription =
            manager.subscribe(EventKind::NewMessage, Box::new(|_: &InboundEvent| {}));

        // when (操作):
        manager.connect(customer("c1"), Some("token"));

        // then (期待する結果):
        assert!(subscription.is_active());
    }

    #[tokio::test]
    async fn test_identity_change_detaches_handlers() {
        // テスト項目: 別の Identity で connect すると古いハンドラは外れる
        // given (前提条件):
        let manager = ConnectionManager::new(UNREACHABLE_URL, ReconnectPolicy::default());
        manager.connect(customer("c1"), Some("token"));
        let subscription =
            manager.subscribe(EventKind::NewMessage, Box::new(|_: &InboundEvent| {}));

        // when (操作):
        manager.connect(customer("c2"), Some("token"));

        // then (期待する結果):
        assert!(!subscription.is_active());
        assert_eq!(manager.identity(), Some(customer("c2")));
    }

    #[tokio::test]
    async fn test_disconnect_is_idempotent() {
        // テスト項目: disconnect は何度呼んでも Disconnected になるだけ
        // given (前提条件):
        let manager = ConnectionManager::new(UNREACHABLE_URL, ReconnectPolicy::default());
        manager.connect(customer("c1"), Some("token"));
        let subscription =
            manager.subscribe(EventKind::Seen, Box::new(|_: &InboundEvent| {}));

        // when (操作):
        manager.disconnect();
        manager.disconnect();

        // then (期待する結果):
        assert_eq!(manager.state(), ConnectionState::Disconnected);
        assert_eq!(manager.identity(), None);
        assert!(!subscription.is_active());
    }

    #[tokio::test]
    async fn test_subscribe_without_connection_is_detached() {
        // テスト項目: 接続がない状態の subscribe は何にも紐付かない
        // given (前提条件):
        let manager = ConnectionManager::new(UNREACHABLE_URL, ReconnectPolicy::default());

        // when (操作):
        let subscription =
            manager.subscribe(EventKind::Typing, Box::new(|_: &InboundEvent| {}));

        // then (期待する結果):
        assert!(!subscription.is_active());
    }

    #[tokio::test]
    async fn test_gives_up_after_max_retries_until_next_connect() {
        // テスト項目: 初回の接続と 5 回の再試行がすべて失敗したら Disconnected に留まり、次の connect で新しく接続を試みる
        // given (前提条件):
        let (url, accepts) = flaky_listener(|_| false).await;
        let manager = ConnectionManager::new(url, fast_policy(5));

        // when (操作):
        manager.connect(customer("c1"), Some("token"));
        wait_for_state(&manager, ConnectionState::Disconnected).await;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
        let after_exhaustion = accepts.load(Ordering::SeqCst);
        let state_after_exhaustion = manager.state();

        manager.connect(customer("c1"), Some("token"));
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while accepts.load(Ordering::SeqCst) <= after_exhaustion {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();
        manager.disconnect();

        // then (期待する結果):
        assert_eq!(after_exhaustion, 6);
        assert_eq!(state_after_exhaustion, ConnectionState::Disconnected);
        assert!(accepts.load(Ordering::SeqCst) > after_exhaustion);
    }

    #[tokio::test]
    async fn test_successful_link_resets_retry_count() {
        // テスト項目: 再試行中に接続が確立すると再試行回数が 0 に戻り、切断後は改めて上限まで再試行する
        // given (前提条件):
        // 2 本目だけハンドシェイクに成功し、すぐに閉じられる
        let (url, accepts) = flaky_listener(|index| index == 2).await;
        let manager = ConnectionManager::new(url, fast_policy(2));

        // when (操作):
        manager.connect(customer("c1"), Some("token"));
        wait_for_state(&manager, ConnectionState::Disconnected).await;
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;

        // then (期待する結果):
        // 初回 + 再試行 1 回 (成功) + リセット後の再試行 2 回
        assert_eq!(accepts.load(Ordering::SeqCst), 4);
        assert_eq!(manager.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_state_cell_ignores_stale_generation() {
        // テスト項目: 古い世代の接続は新しい接続の状態を上書きできない
        // given (前提条件):
        let cell = StateCell::new();
        let old = cell.begin();
        let current = cell.begin();

        // when (操作):
        cell.publish(old, ConnectionState::Disconnected);
        cell.publish(current, ConnectionState::Connected);

        // then (期待する結果):
        assert_eq!(cell.current(), ConnectionState::Connected);
    }

    #[test]
    fn test_state_cell_reset_invalidates_driver() {
        // テスト項目: reset 後はドライバーからの状態更新が無視される
        // given (前提条件):
        let cell = StateCell::new();
        let generation = cell.begin();

        // when (操作):
        cell.reset();
        cell.publish(generation, ConnectionState::Connected);

        // then (期待する結果):
        assert_eq!(cell.current(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_discard_stale_drains_queue() {
        // テスト項目: 切断中に積まれたフレームは再接続前に捨てられる
        // given (前提条件):
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.send("a".to_string()).unwrap();
        tx.send("b".to_string()).unwrap();

        // when (操作):
        discard_stale(&mut rx);

        // then (期待する結果):
        assert!(rx.try_recv().is_err());
    }
}
