//! Test doubles shared by the use case tests.

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI64, Ordering},
    },
};

use async_trait::async_trait;
use livedesk_shared::time::Clock;
use tokio::sync::{Notify, broadcast};

use crate::domain::{
    ApiError, ChatApi, EventEmitter, Identity, Message, MessageId, OutboundEvent, Role, RoomId,
    SeenMarker, Sender, Timestamp, UserId,
};

use super::{context::SessionContext, update::SessionUpdate};

/// Emitter that records every event it accepts
pub struct RecordingEmitter {
    events: Mutex<Vec<OutboundEvent>>,
    connected: AtomicBool,
}

impl RecordingEmitter {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
            connected: AtomicBool::new(true),
        })
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<OutboundEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.events().iter().map(OutboundEvent::name).collect()
    }

    pub fn count(&self, name: &str) -> usize {
        self.names().into_iter().filter(|n| *n == name).count()
    }

    pub fn clear(&self) {
        self.events.lock().unwrap().clear();
    }
}

impl EventEmitter for RecordingEmitter {
    fn emit(&self, event: OutboundEvent) -> bool {
        if !self.connected.load(Ordering::SeqCst) {
            return false;
        }
        self.events.lock().unwrap().push(event);
        true
    }
}

/// Clock moved by hand
#[derive(Default)]
pub struct ManualClock(AtomicI64);

impl ManualClock {
    pub fn at(millis: i64) -> Arc<Self> {
        Arc::new(Self(AtomicI64::new(millis)))
    }

    pub fn advance(&self, millis: i64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.0.load(Ordering::SeqCst)
    }
}

pub fn room(id: &str) -> RoomId {
    RoomId::new(id).unwrap()
}

pub fn admin() -> Identity {
    Identity::admin(UserId::new("admin-1").unwrap())
}

pub fn customer(id: &str) -> Identity {
    Identity::customer(UserId::new(id).unwrap())
}

/// A message in `room_id` sent by `role`, at `created_at` milliseconds
pub fn message(id: &str, room_id: &str, role: Role, content: &str, created_at: i64) -> Message {
    let user_id = match role {
        Role::Admin => "admin-1",
        Role::Customer => room_id,
    };
    Message {
        id: MessageId::new(id).unwrap(),
        room_id: room(room_id),
        sender: Sender {
            user_id: UserId::new(user_id).unwrap(),
            role,
        },
        content: content.to_string(),
        created_at: Timestamp::new(created_at),
        reply_to: None,
        reply_preview: None,
    }
}

pub fn context(identity: Identity, emitter: Arc<RecordingEmitter>) -> Arc<SessionContext> {
    let (updates, _) = broadcast::channel(64);
    Arc::new(SessionContext::new(identity, emitter, updates))
}

/// Drain every update currently buffered
pub fn drain(rx: &mut broadcast::Receiver<SessionUpdate>) -> Vec<SessionUpdate> {
    let mut updates = Vec::new();
    while let Ok(update) = rx.try_recv() {
        updates.push(update);
    }
    updates
}

/// REST double whose history for one room resolves only when released
pub struct GatedApi {
    gated_room: RoomId,
    entered: Notify,
    gate: Notify,
    histories: HashMap<RoomId, Vec<Message>>,
}

impl GatedApi {
    pub fn new(gated_room: &str, histories: Vec<(&str, Vec<Message>)>) -> Arc<Self> {
        Arc::new(Self {
            gated_room: room(gated_room),
            entered: Notify::new(),
            gate: Notify::new(),
            histories: histories
                .into_iter()
                .map(|(id, messages)| (room(id), messages))
                .collect(),
        })
    }

    /// Wait until the gated fetch is in flight
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }
}

#[async_trait]
impl ChatApi for GatedApi {
    async fn ensure_room(
        &self,
        _customer_id: &UserId,
        _customer_name: &str,
    ) -> Result<(), ApiError> {
        Ok(())
    }

    async fn fetch_history(&self, room_id: &RoomId) -> Result<Vec<Message>, ApiError> {
        if *room_id == self.gated_room {
            self.entered.notify_one();
            self.gate.notified().await;
        }
        Ok(self.histories.get(room_id).cloned().unwrap_or_default())
    }

    async fn mark_read(&self, _room_id: &RoomId) -> Result<(), ApiError> {
        Ok(())
    }

    async fn fetch_last_seen(
        &self,
        _room_id: &RoomId,
    ) -> Result<Option<SeenMarker>, ApiError> {
        Ok(None)
    }
}
