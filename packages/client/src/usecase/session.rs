//! Chat session facade.
//!
//! Wires the room controller, typing coordinator and read-receipt tracker to an
//! [`EventSource`] and a connection state stream. Handlers hold weak references
//! so that a dispatcher outliving the session keeps nothing alive.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use livedesk_shared::time::{Clock, SystemClock};
use tokio::{
    sync::{broadcast, watch},
    task::JoinHandle,
};

use crate::{
    config::SessionOptions,
    domain::{
        ChatApi, ConnectionState, EventEmitter, EventKind, EventSource, Identity, InboundEvent,
        MessageId, RoomId, Subscription,
    },
};

use super::{
    context::SessionContext,
    read_receipt::ReadReceiptTracker,
    room_session::{self, RoomSessionController, RoomView},
    typing::TypingCoordinator,
    update::SessionUpdate,
};

const UPDATE_CAPACITY: usize = 256;

pub struct ChatSession {
    ctx: Arc<SessionContext>,
    rooms: Arc<RoomSessionController>,
    typing: Arc<TypingCoordinator>,
    receipts: Arc<ReadReceiptTracker>,
    subscriptions: Mutex<Vec<Subscription>>,
    watcher: Mutex<Option<JoinHandle<()>>>,
}

impl ChatSession {
    pub fn new(
        identity: Identity,
        emitter: Arc<dyn EventEmitter>,
        api: Arc<dyn ChatApi>,
        options: SessionOptions,
    ) -> Self {
        Self::with_clock(identity, emitter, api, options, Arc::new(SystemClock))
    }

    pub fn with_clock(
        identity: Identity,
        emitter: Arc<dyn EventEmitter>,
        api: Arc<dyn ChatApi>,
        options: SessionOptions,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let (updates, _) = broadcast::channel(UPDATE_CAPACITY);
        let ctx = Arc::new(SessionContext::new(identity, emitter, updates));
        let (rooms, typing, receipts) = room_session::build(ctx.clone(), api, clock, options);
        Self {
            ctx,
            rooms,
            typing,
            receipts,
            subscriptions: Mutex::new(Vec::new()),
            watcher: Mutex::new(None),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.ctx.identity
    }

    pub fn updates(&self) -> broadcast::Receiver<SessionUpdate> {
        self.ctx.subscribe_updates()
    }

    fn subscriptions(&self) -> MutexGuard<'_, Vec<Subscription>> {
        self.subscriptions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Register the session's handlers on `source`, replacing earlier ones
    pub fn attach(&self, source: &dyn EventSource) {
        self.detach();

        let rooms = Arc::downgrade(&self.rooms);
        let typing = Arc::downgrade(&self.typing);
        let receipts = Arc::downgrade(&self.receipts);
        let ctx = Arc::downgrade(&self.ctx);

        let subscriptions = vec![
            on(source, EventKind::NewMessage, &rooms, |rooms, event| {
                if let InboundEvent::NewMessage(message) = event {
                    rooms.handle_new_message(message);
                }
            }),
            on(source, EventKind::Typing, &typing, |typing, event| {
                if let InboundEvent::Typing(signal) = event {
                    typing.handle_remote(signal, true);
                }
            }),
            on(source, EventKind::StopTyping, &typing, |typing, event| {
                if let InboundEvent::StopTyping(signal) = event {
                    typing.handle_remote(signal, false);
                }
            }),
            on(source, EventKind::Seen, &receipts, |receipts, event| {
                if let InboundEvent::Seen(signal) = event {
                    receipts.handle_remote(signal);
                }
            }),
            on(source, EventKind::NewRoom, &rooms, |rooms, _| {
                rooms.handle_room_list_signal();
            }),
            on(source, EventKind::UpdateRoomList, &rooms, |rooms, _| {
                rooms.handle_room_list_signal();
            }),
            on(source, EventKind::RoomJoined, &rooms, |rooms, event| {
                if let InboundEvent::RoomJoined { room_id } = event {
                    rooms.handle_room_joined(room_id);
                }
            }),
            on(source, EventKind::Authenticated, &ctx, |ctx, _| {
                tracing::info!("Authenticated as '{}'", ctx.identity.id);
            }),
            on(source, EventKind::AuthError, &ctx, |ctx, event| {
                if let InboundEvent::AuthError { message } = event {
                    tracing::error!("Authentication failed: {}", message);
                    ctx.publish(SessionUpdate::ServerError(message.clone()));
                }
            }),
            on(source, EventKind::MessageError, &ctx, |ctx, event| {
                if let InboundEvent::MessageError { error } = event {
                    tracing::warn!("Server rejected message: {}", error);
                    ctx.publish(SessionUpdate::ServerError(error.clone()));
                }
            }),
        ];

        *self.subscriptions() = subscriptions;
    }

    /// Remove every handler registered by `attach`
    pub fn detach(&self) {
        let subscriptions = std::mem::take(&mut *self.subscriptions());
        for subscription in subscriptions {
            subscription.unsubscribe();
        }
    }

    /// Follow connection state; the active room is re-joined on every `Connected`
    pub fn watch_connection(&self, mut state: watch::Receiver<ConnectionState>) {
        let rooms: Weak<RoomSessionController> = Arc::downgrade(&self.rooms);
        let ctx = Arc::downgrade(&self.ctx);

        let task = tokio::spawn(async move {
            loop {
                let current = *state.borrow_and_update();
                let (Some(rooms), Some(ctx)) = (rooms.upgrade(), ctx.upgrade()) else {
                    return;
                };
                ctx.publish(SessionUpdate::Connection(current));
                if current == ConnectionState::Connected {
                    rooms.rejoin();
                }
                drop((rooms, ctx));

                if state.changed().await.is_err() {
                    return;
                }
            }
        });

        let previous = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace(task);
        if let Some(previous) = previous {
            previous.abort();
        }
    }

    pub async fn select_room(&self, room_id: RoomId) {
        self.rooms.select_room(room_id).await;
    }

    /// Customer only: ensure and select the customer's own room
    pub async fn open_own_room(&self, display_name: &str) {
        self.rooms.open_own_room(display_name).await;
    }

    pub fn leave_room(&self) {
        self.rooms.leave_room();
    }

    pub fn input_changed(&self, text: &str) {
        self.typing.input_changed(text);
    }

    pub fn send_message(&self, content: &str, reply_to: Option<MessageId>) -> bool {
        self.rooms.send_message(content, reply_to)
    }

    pub fn focus_regained(&self) {
        self.receipts.focus_regained();
    }

    pub fn view(&self) -> RoomView {
        self.rooms.view()
    }

    /// Leave the active room and drop every handler
    pub fn close(&self) {
        self.rooms.leave_room();
        self.detach();
        self.stop_watcher();
    }

    fn stop_watcher(&self) {
        let watcher = self
            .watcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(watcher) = watcher {
            watcher.abort();
        }
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.detach();
        self.stop_watcher();
    }
}

/// Subscribe a handler that upgrades `target` before every call
fn on<T, F>(source: &dyn EventSource, kind: EventKind, target: &Weak<T>, handler: F) -> Subscription
where
    T: Send + Sync + 'static,
    F: Fn(&T, &InboundEvent) + Send + Sync + 'static,
{
    let target = target.clone();
    source.subscribe(
        kind,
        Box::new(move |event: &InboundEvent| {
            if let Some(target) = target.upgrade() {
                handler(target.as_ref(), event);
            }
        }),
    )
}
