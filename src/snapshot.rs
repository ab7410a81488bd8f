//! ==============================================================================
//! snapshot.rs - last-known state of every pin as reported by the service
//! ==============================================================================
//!
//! purpose:
//!     pure data holder. the whole map is swapped after a full pull; a single
//!     pin is replaced after a successful action. the store is only reachable
//!     through the controller's lock, so a reader sees either the full old map
//!     or the full new one.
//!
//! epochs:
//!     every single-pin mutation takes a fresh epoch. a pull records the epoch
//!     it started at; when it lands, pins mutated after that point are newer
//!     than the pulled data and are kept (replace_since).
//!
//! relationships:
//!     - owned by: controller.rs (ControllerState)
//!     - read by: reconcile.rs (reconcile_all)
//!
//! ==============================================================================

use crate::domain::{Pin, Position};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct PinSnapshotStore {
    pins: BTreeMap<Position, Pin>,
    epoch: u64,
    /// epoch of the last single-pin mutation, per position
    touched: BTreeMap<Position, u64>,
}

impl PinSnapshotStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// current mutation epoch; record it before a pull goes out
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// swap the entire snapshot after a full pull
    pub fn replace_all(&mut self, pins: BTreeMap<Position, Pin>) {
        self.pins = pins;
        self.touched.clear();
        self.epoch += 1;
    }

    /// swap in a pull that started at `pulled_at`, keeping every pin mutated
    /// since then. returns the positions that were kept.
    pub fn replace_since(&mut self, mut pins: BTreeMap<Position, Pin>, pulled_at: u64) -> Vec<Position> {
        let mut kept = Vec::new();
        for (position, epoch) in &self.touched {
            if *epoch <= pulled_at {
                continue;
            }
            if let (Some(slot), Some(current)) = (pins.get_mut(position), self.pins.get(position)) {
                *slot = current.clone();
                kept.push(*position);
            }
        }
        self.replace_all(pins);
        kept
    }

    /// replace one pin after a successful single-pin action
    pub fn update_one(&mut self, position: Position, mut pin: Pin) -> Option<Pin> {
        pin.position = position;
        self.touch(position);
        self.pins.insert(position, pin)
    }

    pub fn get(&self, position: Position) -> Option<&Pin> {
        self.pins.get(&position)
    }

    /// in-place patch; counts as a single-pin mutation
    pub fn get_mut(&mut self, position: Position) -> Option<&mut Pin> {
        if self.pins.contains_key(&position) {
            self.touch(position);
        }
        self.pins.get_mut(&position)
    }

    fn touch(&mut self, position: Position) {
        self.epoch += 1;
        self.touched.insert(position, self.epoch);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Pin> {
        self.pins.values()
    }

    pub fn len(&self) -> usize {
        self.pins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pins.is_empty()
    }

    /// true when `other` covers exactly the positions already held
    pub fn same_positions(&self, other: &BTreeMap<Position, Pin>) -> bool {
        self.pins.len() == other.len() && self.pins.keys().eq(other.keys())
    }
}
