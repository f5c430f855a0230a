//! State shared by the session components.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;

use crate::domain::{EventEmitter, Identity, MessageLog, OutboundEvent, RoomSelection, SeenMarker};

use super::update::SessionUpdate;

/// Per-session mutable state, guarded by a single mutex.
///
/// `log`, `remote_typing` and `seen` always describe the active room and are
/// reset whenever the selection changes.
#[derive(Debug, Default)]
pub(crate) struct SessionState {
    pub selection: RoomSelection,
    pub log: MessageLog,
    pub remote_typing: bool,
    pub seen: Option<SeenMarker>,
}

impl SessionState {
    pub fn reset_room(&mut self) {
        self.log.clear();
        self.remote_typing = false;
        self.seen = None;
    }
}

pub(crate) struct SessionContext {
    pub identity: Identity,
    emitter: Arc<dyn EventEmitter>,
    state: Mutex<SessionState>,
    updates: broadcast::Sender<SessionUpdate>,
}

impl SessionContext {
    pub fn new(
        identity: Identity,
        emitter: Arc<dyn EventEmitter>,
        updates: broadcast::Sender<SessionUpdate>,
    ) -> Self {
        Self {
            identity,
            emitter,
            state: Mutex::new(SessionState::default()),
            updates,
        }
    }

    /// Lock the session state.
    ///
    /// Lock order: session state, then the typing burst, then the receipt marker.
    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn emit(&self, event: OutboundEvent) -> bool {
        self.emitter.emit(event)
    }

    pub fn publish(&self, update: SessionUpdate) {
        // No subscriber is not an error.
        let _ = self.updates.send(update);
    }

    pub fn subscribe_updates(&self) -> broadcast::Receiver<SessionUpdate> {
        self.updates.subscribe()
    }
}
