//! Read receipts.
//!
//! Outbound: `seen` is emitted once for every distinct last message of the
//! active room, and again on every focus regain. Inbound: the counterpart's
//! marker for the active room, last arrival wins, with REST snapshots only
//! filling the gap until a live `seen` arrives.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::domain::{MessageId, OutboundEvent, RoomId, SeenMarker, SeenSignal, SeenSource};

use super::{
    context::{SessionContext, SessionState},
    update::SessionUpdate,
};

pub struct ReadReceiptTracker {
    ctx: Arc<SessionContext>,
    last_marked: Mutex<Option<(RoomId, MessageId)>>,
}

impl ReadReceiptTracker {
    pub(crate) fn new(ctx: Arc<SessionContext>) -> Self {
        Self {
            ctx,
            last_marked: Mutex::new(None),
        }
    }

    fn last_marked(&self) -> MutexGuard<'_, Option<(RoomId, MessageId)>> {
        self.last_marked
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Emit `seen` and remember the pair only when the emit went out
    fn mark_seen(&self, room_id: &RoomId, last_message_id: &MessageId) {
        tracing::debug!("Marking '{}' seen up to '{}'", room_id, last_message_id);
        let sent = self.ctx.emit(OutboundEvent::Seen {
            room_id: room_id.clone(),
            last_message_id: last_message_id.clone(),
        });
        if sent {
            *self.last_marked() = Some((room_id.clone(), last_message_id.clone()));
        } else {
            tracing::debug!("Seen for '{}' not sent; will retry", room_id);
        }
    }

    /// Called with the state lock held after the active room's log changed
    pub(crate) fn log_changed(&self, state: &SessionState) {
        let Some(room_id) = state.selection.active() else {
            return;
        };
        let Some(last) = state.log.last() else {
            return;
        };

        let already_marked = self
            .last_marked()
            .as_ref()
            .is_some_and(|(room, id)| room == room_id && *id == last.id);
        if already_marked {
            return;
        }

        self.mark_seen(room_id, &last.id);
    }

    /// The view regained focus
    pub fn focus_regained(&self) {
        let state = self.ctx.state();
        let Some(room_id) = state.selection.active() else {
            return;
        };
        let Some(last) = state.log.last() else {
            tracing::debug!("Focus regained on empty room '{}'", room_id);
            return;
        };
        self.mark_seen(room_id, &last.id);
    }

    /// Forget the last marked message; the next log change marks again
    pub(crate) fn reset(&self) {
        *self.last_marked() = None;
    }

    /// Apply a live `seen` event
    pub fn handle_remote(&self, signal: &SeenSignal) {
        let mut state = self.ctx.state();
        if !state.selection.is_active(&signal.room_id) {
            tracing::debug!("Seen for inactive room '{}' ignored", signal.room_id);
            return;
        }
        if signal.role != self.ctx.identity.role.counterpart() {
            return;
        }

        let marker = SeenMarker {
            room_id: signal.room_id.clone(),
            observer: signal.user_id.clone(),
            observer_role: signal.role,
            last_message_id: signal.last_message_id.clone(),
            source: SeenSource::Live,
        };
        state.seen = Some(marker.clone());
        drop(state);

        self.ctx.publish(SessionUpdate::SeenUpdated(marker));
    }

    /// Seed the marker from a REST snapshot taken for the selection at `epoch`
    pub(crate) fn seed_snapshot(&self, room_id: &RoomId, epoch: u64, marker: SeenMarker) {
        let mut state = self.ctx.state();
        if !state.selection.is_current(room_id, epoch) {
            tracing::debug!("Discarding stale last-seen snapshot for '{}'", room_id);
            return;
        }
        if state.seen.is_some() {
            tracing::debug!("Live seen already known for '{}'; snapshot ignored", room_id);
            return;
        }
        state.seen = Some(marker.clone());
        drop(state);

        self.ctx.publish(SessionUpdate::SeenUpdated(marker));
    }
}
