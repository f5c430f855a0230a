//! Active room selection state machine.
//!
//! `Idle` -> `Joining` -> `Active`, and back to `Idle` on leave or straight to
//! `Joining` when another room is selected. Every selection bumps an epoch so that
//! responses issued for an earlier selection can be recognised as stale.

use super::value_object::RoomId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoomPhase {
    Idle,
    Joining,
    Active,
}

/// Result of switching to a new room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionChange {
    /// Room that was vacated, if any
    pub left: Option<RoomId>,
    pub joined: RoomId,
    pub epoch: u64,
}

#[derive(Debug, Clone)]
pub struct RoomSelection {
    active: Option<RoomId>,
    phase: RoomPhase,
    epoch: u64,
}

impl Default for RoomSelection {
    fn default() -> Self {
        Self {
            active: None,
            phase: RoomPhase::Idle,
            epoch: 0,
        }
    }
}

impl RoomSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&RoomId> {
        self.active.as_ref()
    }

    pub fn phase(&self) -> RoomPhase {
        self.phase
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn is_active(&self, room_id: &RoomId) -> bool {
        self.active.as_ref() == Some(room_id)
    }

    /// Whether a response for `room_id` issued at `epoch` still applies
    pub fn is_current(&self, room_id: &RoomId, epoch: u64) -> bool {
        self.is_active(room_id) && self.epoch == epoch
    }

    /// Switch to `room_id`. Returns `None` when it is already the active room.
    pub fn select(&mut self, room_id: RoomId) -> Option<SelectionChange> {
        if self.is_active(&room_id) {
            return None;
        }
        self.epoch += 1;
        self.phase = RoomPhase::Joining;
        let left = self.active.replace(room_id.clone());
        Some(SelectionChange {
            left,
            joined: room_id,
            epoch: self.epoch,
        })
    }

    /// Leave the active room, returning it
    pub fn leave(&mut self) -> Option<RoomId> {
        let left = self.active.take()?;
        self.epoch += 1;
        self.phase = RoomPhase::Idle;
        Some(left)
    }

    /// Promote `Joining` to `Active` if `room_id` is still the selected room
    pub fn mark_active(&mut self, room_id: &RoomId) -> bool {
        if self.is_active(room_id) && self.phase == RoomPhase::Joining {
            self.phase = RoomPhase::Active;
            return true;
        }
        false
    }
}
