//! Battle items and the item registry
//!
//! Items live in a slot arena. Removing an item frees its slot and moves
//! the record to a graveyard, so anything still holding the id mid-turn
//! can tell it was removed. The graveyard is purged at teardown.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::battle::constants::AMMO_SLOT_MAX;
use crate::battle::rules::{BattleType, ItemRule};
use crate::core::types::{ItemId, Position, UnitId};

/// Where an item currently is. An item has exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ItemOwner {
    #[default]
    None,
    Unit(UnitId),
    Tile(Position),
    /// Loaded into a weapon's ammo slot
    Weapon(ItemId),
}

impl ItemOwner {
    pub fn is_none(&self) -> bool {
        matches!(self, ItemOwner::None)
    }
}

/// A single item in the battle
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BattleItem {
    pub id: ItemId,
    pub rule: String,
    pub battle_type: BattleType,
    pub owner: ItemOwner,
    /// Last unit to carry it
    pub previous_owner: Option<UnitId>,
    pub ammo_slots: [Option<ItemId>; AMMO_SLOT_MAX],
    /// Rounds left (ammo only)
    pub ammo_quantity: i32,
    /// Body items point at the unit they stand for
    pub represented_unit: Option<UnitId>,
    pub fuse_timer: Option<i32>,
    /// Brought into the battle by the player side
    pub player_property: bool,
    /// Built into its carrier
    pub fixed: bool,
}

impl BattleItem {
    pub fn new(id: ItemId, rule: &ItemRule) -> Self {
        Self {
            id,
            rule: rule.name.clone(),
            battle_type: rule.battle_type,
            owner: ItemOwner::None,
            previous_owner: None,
            ammo_slots: [None; AMMO_SLOT_MAX],
            ammo_quantity: if rule.battle_type == BattleType::Ammo {
                rule.clip_size
            } else {
                0
            },
            represented_unit: None,
            fuse_timer: None,
            player_property: false,
            fixed: rule.fixed,
        }
    }

    pub fn is_body(&self) -> bool {
        self.represented_unit.is_some()
    }

    pub fn loaded_ammo(&self) -> impl Iterator<Item = ItemId> + '_ {
        self.ammo_slots.iter().flatten().copied()
    }

    pub fn carrier(&self) -> Option<UnitId> {
        match self.owner {
            ItemOwner::Unit(unit) => Some(unit),
            _ => None,
        }
    }
}

/// Arena of live items plus the graveyard of removed ones
#[derive(Debug, Clone, Default)]
pub struct ItemRegistry {
    slots: Vec<Option<BattleItem>>,
    lookup: AHashMap<ItemId, usize>,
    deleted: Vec<BattleItem>,
    next_id: i32,
}

impl ItemRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a fresh, unowned item with a unique id
    pub fn allocate(&mut self, rule: &ItemRule) -> ItemId {
        let id = ItemId(self.next_id);
        self.insert(BattleItem::new(id, rule));
        id
    }

    /// Insert an existing record (used when loading)
    pub fn insert(&mut self, item: BattleItem) {
        self.next_id = self.next_id.max(item.id.0 + 1);
        if let Some(&slot) = self.lookup.get(&item.id) {
            self.slots[slot] = Some(item);
            return;
        }
        self.lookup.insert(item.id, self.slots.len());
        self.slots.push(Some(item));
    }

    pub fn get(&self, id: ItemId) -> Option<&BattleItem> {
        self.lookup.get(&id).and_then(|&slot| self.slots[slot].as_ref())
    }

    pub fn get_mut(&mut self, id: ItemId) -> Option<&mut BattleItem> {
        match self.lookup.get(&id) {
            Some(&slot) => self.slots[slot].as_mut(),
            None => None,
        }
    }

    pub fn contains(&self, id: ItemId) -> bool {
        self.lookup.contains_key(&id)
    }

    /// Live items in creation order
    pub fn iter(&self) -> impl Iterator<Item = &BattleItem> {
        self.slots.iter().flatten()
    }

    pub fn ids(&self) -> Vec<ItemId> {
        self.iter().map(|i| i.id).collect()
    }

    pub fn len(&self) -> usize {
        self.lookup.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lookup.is_empty()
    }

    pub fn next_id(&self) -> i32 {
        self.next_id
    }

    fn take(&mut self, id: ItemId) -> Option<BattleItem> {
        let slot = self.lookup.remove(&id)?;
        self.slots[slot].take()
    }

    /// Move a live item to the graveyard
    pub fn discard(&mut self, id: ItemId) -> bool {
        match self.take(id) {
            Some(item) => {
                self.deleted.push(item);
                true
            }
            None => false,
        }
    }

    /// Drop a just-allocated item that could not be attached anywhere
    pub fn rollback(&mut self, id: ItemId) {
        self.take(id);
    }

    pub fn deleted(&self) -> &[BattleItem] {
        &self.deleted
    }

    pub fn is_deleted(&self, id: ItemId) -> bool {
        self.deleted.iter().any(|i| i.id == id)
    }

    /// Free the graveyard and compact the arena. Returns how many were purged.
    pub fn purge_deleted(&mut self) -> usize {
        let purged = self.deleted.len();
        self.deleted.clear();
        self.slots.retain(|slot| slot.is_some());
        self.lookup = self
            .slots
            .iter()
            .enumerate()
            .filter_map(|(slot, item)| item.as_ref().map(|i| (i.id, slot)))
            .collect();
        purged
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clip() -> ItemRule {
        ItemRule::new("clip", BattleType::Ammo).with_clip_size(20)
    }

    #[test]
    fn test_allocate_unique_ids() {
        let mut registry = ItemRegistry::new();
        let a = registry.allocate(&clip());
        let b = registry.allocate(&clip());
        assert_ne!(a, b);
        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(a).map(|i| i.ammo_quantity), Some(20));
        assert!(registry.get(a).map(|i| i.owner.is_none()).unwrap_or(false));
    }

    #[test]
    fn test_discard_goes_to_graveyard() {
        let mut registry = ItemRegistry::new();
        let a = registry.allocate(&clip());
        let b = registry.allocate(&clip());

        assert!(registry.discard(a));
        assert!(!registry.contains(a));
        assert!(registry.is_deleted(a));
        assert!(!registry.discard(a));
        assert_eq!(registry.ids(), vec![b]);
    }

    #[test]
    fn test_rollback_skips_graveyard() {
        let mut registry = ItemRegistry::new();
        let a = registry.allocate(&clip());
        registry.rollback(a);
        assert!(!registry.contains(a));
        assert!(registry.deleted().is_empty());
    }

    #[test]
    fn test_purge_compacts_and_keeps_lookup() {
        let mut registry = ItemRegistry::new();
        let ids: Vec<ItemId> = (0..5).map(|_| registry.allocate(&clip())).collect();
        registry.discard(ids[1]);
        registry.discard(ids[3]);

        assert_eq!(registry.purge_deleted(), 2);
        assert!(registry.deleted().is_empty());
        assert_eq!(registry.ids(), vec![ids[0], ids[2], ids[4]]);
        assert!(registry.get(ids[4]).is_some());
    }

    #[test]
    fn test_insert_advances_next_id() {
        let mut registry = ItemRegistry::new();
        let mut item = BattleItem::new(ItemId(41), &clip());
        item.owner = ItemOwner::Tile(Position::new(1, 1, 0));
        registry.insert(item);
        assert_eq!(registry.allocate(&clip()), ItemId(42));
    }
}
