//! ==============================================================================
//! pending.rs - operator-chosen directions not yet committed
//! ==============================================================================
//!
//! purpose:
//!     independent of the snapshot store. an entry only exists while it differs
//!     from the direction the service reported when the edit was made; choosing
//!     the reported direction again removes it.
//!
//! relationships:
//!     - owned by: controller.rs (edit path, cleared on configure success)
//!     - read by: reconcile.rs
//!
//! ==============================================================================

use crate::domain::{Direction, Position};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// entry created or overwritten
    Recorded,
    /// choice equals the reported direction, any entry was dropped
    Reverted,
}

#[derive(Debug, Clone, Default)]
pub struct PendingEditTracker {
    edits: BTreeMap<Position, Direction>,
}

impl PendingEditTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// record `desired` for `position`, or forget the edit when it matches
    /// `server_direction`
    pub fn set(&mut self, position: Position, desired: Direction, server_direction: Direction) -> EditOutcome {
        if desired == server_direction {
            self.edits.remove(&position);
            EditOutcome::Reverted
        } else {
            self.edits.insert(position, desired);
            EditOutcome::Recorded
        }
    }

    pub fn clear(&mut self, position: Position) -> Option<Direction> {
        self.edits.remove(&position)
    }

    pub fn get(&self, position: Position) -> Option<Direction> {
        self.edits.get(&position).copied()
    }

    pub fn len(&self) -> usize {
        self.edits.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }
}
