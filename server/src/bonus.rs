//! Fixed slot table of time-limited pickups
//!
//! Peers address pickups by slot index, so a bonus keeps its slot for its whole
//! life and a freed slot is reused by the next spawn.

use crate::physics::Vector2;
use shared::PickupKind;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq)]
pub struct Bonus {
    pub position: Vector2,
    pub kind: PickupKind,
    /// Simulated time the bonus appeared
    pub spawn_time: Duration,
}

#[derive(Debug, Clone)]
pub struct BonusTable {
    slots: Vec<Option<Bonus>>,
}

impl BonusTable {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![None; capacity],
        }
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_full(&self) -> bool {
        self.first_free().is_none()
    }

    pub fn first_free(&self) -> Option<u8> {
        self.slots
            .iter()
            .position(|slot| slot.is_none())
            .map(|i| i as u8)
    }

    /// Places a bonus in the first free slot. Returns `None` when the table is full.
    pub fn insert(&mut self, bonus: Bonus) -> Option<u8> {
        let slot = self.first_free()?;
        self.slots[slot as usize] = Some(bonus);
        Some(slot)
    }

    pub fn get(&self, slot: u8) -> Option<&Bonus> {
        self.slots.get(slot as usize).and_then(|s| s.as_ref())
    }

    /// Frees a slot and hands back what was in it.
    pub fn take(&mut self, slot: u8) -> Option<Bonus> {
        self.slots.get_mut(slot as usize).and_then(|s| s.take())
    }

    /// Slots whose bonus has been around longer than `lifetime` at `now`.
    pub fn expired(&self, now: Duration, lifetime: Duration) -> Vec<u8> {
        self.iter()
            .filter(|(_, bonus)| now.saturating_sub(bonus.spawn_time) > lifetime)
            .map(|(slot, _)| slot)
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u8, &Bonus)> {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, slot)| slot.as_ref().map(|b| (i as u8, b)))
    }

    pub fn clear(&mut self) {
        self.slots.iter_mut().for_each(|slot| *slot = None);
    }
}
