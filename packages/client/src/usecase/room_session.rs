//! Room session controller.
//!
//! Owns the active room selection and the message log. A selection goes
//! `Idle` -> `Joining` -> `Active`; every REST response is checked against the
//! selection epoch it was issued for before it is applied.

use std::sync::Arc;

use livedesk_shared::time::Clock;

use crate::{
    config::SessionOptions,
    domain::{
        ChatApi, Message, MessageId, OutboundEvent, Role, RoomId, RoomPhase, SeenMarker,
        SelectionChange,
    },
};

use super::{
    context::SessionContext, notification::NotificationThrottle, read_receipt::ReadReceiptTracker,
    typing::TypingCoordinator, update::SessionUpdate,
};

/// Point-in-time view of the active room
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomView {
    pub room_id: Option<RoomId>,
    pub phase: RoomPhase,
    pub messages: Vec<Message>,
    pub remote_typing: bool,
    pub seen: Option<SeenMarker>,
}

pub struct RoomSessionController {
    ctx: Arc<SessionContext>,
    api: Arc<dyn ChatApi>,
    typing: Arc<TypingCoordinator>,
    receipts: Arc<ReadReceiptTracker>,
    throttle: NotificationThrottle,
}

impl RoomSessionController {
    pub(crate) fn new(
        ctx: Arc<SessionContext>,
        api: Arc<dyn ChatApi>,
        typing: Arc<TypingCoordinator>,
        receipts: Arc<ReadReceiptTracker>,
        throttle: NotificationThrottle,
    ) -> Self {
        Self {
            ctx,
            api,
            typing,
            receipts,
            throttle,
        }
    }

    fn is_admin(&self) -> bool {
        self.ctx.identity.role == Role::Admin
    }

    /// Make `room_id` the active room.
    ///
    /// A no-op when it already is. Otherwise leaves the previous room, joins the
    /// new one, then merges its history and marks it read.
    pub async fn select_room(&self, room_id: RoomId) {
        let Some(change) = self.switch_to(room_id) else {
            return;
        };
        tracing::info!("Selected room '{}'", change.joined);
        self.ctx.publish(SessionUpdate::RoomSelected {
            room_id: change.joined.clone(),
            left: change.left.clone(),
        });

        self.load(&change.joined, change.epoch).await;
    }

    fn switch_to(&self, room_id: RoomId) -> Option<SelectionChange> {
        let mut state = self.ctx.state();
        if state.selection.is_active(&room_id) {
            tracing::debug!("Room '{}' is already active", room_id);
            return None;
        }

        self.typing.room_switched();
        let change = state.selection.select(room_id)?;
        if let Some(left) = &change.left {
            self.ctx.emit(OutboundEvent::LeaveRoom {
                room_id: left.clone(),
            });
        }
        state.reset_room();
        self.receipts.reset();
        self.ctx.emit(OutboundEvent::JoinRoom {
            room_id: change.joined.clone(),
        });
        Some(change)
    }

    async fn load(&self, room_id: &RoomId, epoch: u64) {
        let history_loaded = match self.api.fetch_history(room_id).await {
            Ok(history) => {
                self.apply_history(room_id, epoch, history);
                true
            }
            Err(e) => {
                tracing::warn!("Failed to fetch history for '{}': {}", room_id, e);
                let current = {
                    let mut state = self.ctx.state();
                    let current = state.selection.is_current(room_id, epoch);
                    if current {
                        state.selection.mark_active(room_id);
                    }
                    current
                };
                if current {
                    self.ctx.publish(SessionUpdate::HistoryFailed {
                        room_id: room_id.clone(),
                        reason: e.to_string(),
                    });
                }
                false
            }
        };

        match self.api.mark_read(room_id).await {
            Ok(()) if self.is_admin() => self.ctx.publish(SessionUpdate::RoomListStale),
            Ok(()) => {}
            Err(e) => tracing::warn!("Failed to mark '{}' read: {}", room_id, e),
        }

        let still_current = self.ctx.state().selection.is_current(room_id, epoch);
        if self.is_admin() && history_loaded && still_current {
            match self.api.fetch_last_seen(room_id).await {
                Ok(Some(marker)) => self.receipts.seed_snapshot(room_id, epoch, marker),
                Ok(None) => {}
                Err(e) => tracing::warn!("Failed to fetch last seen for '{}': {}", room_id, e),
            }
        }
    }

    fn apply_history(&self, room_id: &RoomId, epoch: u64, history: Vec<Message>) {
        let mut state = self.ctx.state();
        if !state.selection.is_current(room_id, epoch) {
            tracing::debug!("Discarding stale history for '{}'", room_id);
            return;
        }
        let added = state.log.merge_history(history);
        state.selection.mark_active(room_id);
        self.receipts.log_changed(&state);
        drop(state);

        tracing::debug!("Merged {} history message(s) into '{}'", added, room_id);
        self.ctx.publish(SessionUpdate::HistoryLoaded {
            room_id: room_id.clone(),
            added,
        });
    }

    /// Vacate the active room without selecting another
    pub fn leave_room(&self) {
        let mut state = self.ctx.state();
        if state.selection.active().is_none() {
            tracing::debug!("No active room to leave");
            return;
        }

        self.typing.room_switched();
        let Some(left) = state.selection.leave() else {
            return;
        };
        self.ctx.emit(OutboundEvent::LeaveRoom {
            room_id: left.clone(),
        });
        state.reset_room();
        self.receipts.reset();
        drop(state);

        tracing::info!("Left room '{}'", left);
        self.ctx.publish(SessionUpdate::RoomLeft { room_id: left });
    }

    /// Customer only: ensure the own room exists, then select it
    pub async fn open_own_room(&self, display_name: &str) {
        let Some(room_id) = self.ctx.identity.own_room() else {
            tracing::warn!("Only customers have an own room");
            return;
        };
        if let Err(e) = self
            .api
            .ensure_room(&self.ctx.identity.id, display_name)
            .await
        {
            tracing::warn!("Failed to ensure room '{}': {}", room_id, e);
        }
        self.select_room(room_id).await;
    }

    /// Send `content` to the active room. Blank content is dropped.
    pub fn send_message(&self, content: &str, reply_to: Option<MessageId>) -> bool {
        if content.trim().is_empty() {
            tracing::debug!("Blank message dropped");
            return false;
        }
        let state = self.ctx.state();
        let Some(room_id) = state.selection.active().cloned() else {
            tracing::warn!("No active room; message dropped");
            return false;
        };

        self.typing.message_sent(&room_id);
        self.ctx.emit(OutboundEvent::SendMessage {
            room_id,
            content: content.to_string(),
            reply_to,
        })
    }

    /// Handle a live `new_message`
    pub fn handle_new_message(&self, message: &Message) {
        let from_customer = message.sender.role == Role::Customer;
        if self.is_admin() && from_customer && self.throttle.allow() {
            self.ctx.publish(SessionUpdate::Notification(message.clone()));
        }

        let mut state = self.ctx.state();
        if !state.selection.is_active(&message.room_id) {
            tracing::debug!("Message for inactive room '{}' ignored", message.room_id);
            return;
        }
        if !state.log.insert(message.clone()) {
            tracing::debug!("Duplicate message '{}' ignored", message.id);
            return;
        }
        self.receipts.log_changed(&state);
        drop(state);

        self.ctx
            .publish(SessionUpdate::MessageAppended(message.clone()));
        if self.is_admin() && from_customer {
            self.spawn_mark_read(message.room_id.clone());
        }
    }

    /// Fire-and-forget mark-read from inside an event handler
    fn spawn_mark_read(&self, room_id: RoomId) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime; '{}' not marked read", room_id);
            return;
        };
        let api = self.api.clone();
        let ctx = self.ctx.clone();
        runtime.spawn(async move {
            match api.mark_read(&room_id).await {
                Ok(()) => ctx.publish(SessionUpdate::RoomListStale),
                Err(e) => tracing::warn!("Failed to mark '{}' read: {}", room_id, e),
            }
        });
    }

    /// The server acknowledged a join
    pub fn handle_room_joined(&self, room_id: &RoomId) {
        if self.ctx.state().selection.mark_active(room_id) {
            tracing::debug!("Join of '{}' acknowledged", room_id);
        }
    }

    /// `new_room` or `update_room_list` arrived
    pub fn handle_room_list_signal(&self) {
        if self.is_admin() {
            self.ctx.publish(SessionUpdate::RoomListStale);
        }
    }

    /// Re-join the active room after the connection came back
    pub fn rejoin(&self) {
        let state = self.ctx.state();
        if let Some(room_id) = state.selection.active() {
            tracing::info!("Re-joining room '{}'", room_id);
            self.ctx.emit(OutboundEvent::JoinRoom {
                room_id: room_id.clone(),
            });
            // A `seen` dropped while the link was down goes out now.
            self.receipts.log_changed(&state);
        }
    }

    pub fn view(&self) -> RoomView {
        let state = self.ctx.state();
        RoomView {
            room_id: state.selection.active().cloned(),
            phase: state.selection.phase(),
            messages: state.log.messages().to_vec(),
            remote_typing: state.remote_typing,
            seen: state.seen.clone(),
        }
    }
}

/// Build the controller together with the components it drives
pub(crate) fn build(
    ctx: Arc<SessionContext>,
    api: Arc<dyn ChatApi>,
    clock: Arc<dyn Clock>,
    options: SessionOptions,
) -> (
    Arc<RoomSessionController>,
    Arc<TypingCoordinator>,
    Arc<ReadReceiptTracker>,
) {
    let typing = Arc::new(TypingCoordinator::new(ctx.clone(), options.typing_idle));
    let receipts = Arc::new(ReadReceiptTracker::new(ctx.clone()));
    let throttle = NotificationThrottle::new(clock, options.notification_window);
    let rooms = Arc::new(RoomSessionController::new(
        ctx,
        api,
        typing.clone(),
        receipts.clone(),
        throttle,
    ));
    (rooms, typing, receipts)
}
