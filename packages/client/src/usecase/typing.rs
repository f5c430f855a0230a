//! Presence/typing coordination.
//!
//! Local typing is coalesced into bursts: `typing` goes out once when a burst
//! starts, and exactly one `stop_typing` closes it, triggered by whichever comes
//! first of the idle timer, an empty input, a sent message or a room switch.
//!
//! Remote typing is a plain flag for the active room with no timeout: a lost
//! `stop_typing` leaves the indicator on until the next signal or room switch.

use std::{
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    time::Duration,
};

use tokio::task::JoinHandle;

use crate::domain::{OutboundEvent, PresenceSignal, RoomId};

use super::{context::SessionContext, update::SessionUpdate};

#[derive(Default)]
struct Burst {
    /// Room of the outstanding burst
    room: Option<RoomId>,
    /// Bumped whenever the idle timer is re-armed or cancelled
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

impl Burst {
    fn cancel_timer(&mut self) {
        self.generation += 1;
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    /// Close the outstanding burst, returning its room
    fn close(&mut self) -> Option<RoomId> {
        self.cancel_timer();
        self.room.take()
    }
}

pub struct TypingCoordinator {
    ctx: Arc<SessionContext>,
    idle: Duration,
    burst: Arc<Mutex<Burst>>,
}

impl TypingCoordinator {
    pub(crate) fn new(ctx: Arc<SessionContext>, idle: Duration) -> Self {
        Self {
            ctx,
            idle,
            burst: Arc::new(Mutex::new(Burst::default())),
        }
    }

    fn burst(&self) -> MutexGuard<'_, Burst> {
        lock(&self.burst)
    }

    /// React to the local input box changing to `text`
    pub fn input_changed(&self, text: &str) {
        let state = self.ctx.state();

        if text.trim().is_empty() {
            self.stop();
            return;
        }

        let Some(active) = state.selection.active().cloned() else {
            tracing::debug!("Typing ignored: no active room");
            return;
        };

        let mut burst = self.burst();
        if burst.room.as_ref() != Some(&active) {
            if let Some(previous) = burst.close() {
                self.ctx.emit(OutboundEvent::StopTyping { room_id: previous });
            }
            if self.ctx.emit(OutboundEvent::Typing {
                room_id: active.clone(),
            }) {
                burst.room = Some(active);
            }
        }

        if burst.room.is_some() {
            self.arm_timer(&mut burst);
        }
    }

    /// Close the outstanding burst, if any
    pub fn stop(&self) -> bool {
        let room = self.burst().close();
        match room {
            Some(room_id) => {
                self.ctx.emit(OutboundEvent::StopTyping { room_id });
                true
            }
            None => false,
        }
    }

    /// A message was sent to `room_id`: `stop_typing` goes out unconditionally
    pub fn message_sent(&self, room_id: &RoomId) {
        self.burst().close();
        self.ctx.emit(OutboundEvent::StopTyping {
            room_id: room_id.clone(),
        });
    }

    /// The active room is about to change
    pub fn room_switched(&self) {
        self.stop();
    }

    /// Whether a local burst is outstanding
    pub fn is_typing(&self) -> bool {
        self.burst().room.is_some()
    }

    fn arm_timer(&self, burst: &mut Burst) {
        burst.cancel_timer();
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("No async runtime; typing idle timer not armed");
            return;
        };

        let generation = burst.generation;
        let shared = self.burst.clone();
        let ctx = self.ctx.clone();
        let idle = self.idle;
        burst.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(idle).await;
            let room = {
                let mut burst = lock(&shared);
                if burst.generation != generation {
                    return;
                }
                burst.timer = None;
                burst.room.take()
            };
            if let Some(room_id) = room {
                tracing::debug!("Typing idle for {:?} in '{}'", idle, room_id);
                ctx.emit(OutboundEvent::StopTyping { room_id });
            }
        }));
    }

    /// Apply a remote `typing` (`typing == true`) or `stop_typing` signal
    pub fn handle_remote(&self, signal: &PresenceSignal, typing: bool) {
        let mut state = self.ctx.state();
        if !state.selection.is_active(&signal.room_id) {
            tracing::debug!("Typing signal for inactive room '{}' ignored", signal.room_id);
            return;
        }
        if signal.role != self.ctx.identity.role.counterpart() {
            return;
        }
        if state.remote_typing == typing {
            return;
        }
        state.remote_typing = typing;
        drop(state);

        self.ctx.publish(SessionUpdate::TypingChanged {
            room_id: signal.room_id.clone(),
            typing,
        });
    }
}

fn lock(burst: &Mutex<Burst>) -> MutexGuard<'_, Burst> {
    burst.lock().unwrap_or_else(PoisonError::into_inner)
}
