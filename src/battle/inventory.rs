//! Item ownership: creating, moving, loading and removing items
//!
//! An item has exactly one owner at a time. Every transfer validates the
//! destination first, then detaches and attaches, so a failed call leaves
//! everything where it was.

use std::sync::Arc;

use crate::battle::constants::AMMO_SLOT_MAX;
use crate::battle::execution::BattleState;
use crate::battle::items::ItemOwner;
use crate::battle::rules::BattleType;
use crate::battle::units::Faction;
use crate::core::error::{BattleError, Result};
use crate::core::types::{ItemId, Position, UnitId};

impl BattleState {
    /// Create an item in a unit's inventory. Rolls back if it doesn't fit.
    pub fn create_item_for_unit(&mut self, rule: &str, unit: UnitId) -> Result<ItemId> {
        let rules = Arc::clone(&self.rules);
        let item_rule = rules.require_item(rule)?;
        let player_side = self.unit(unit)?.original_faction == Faction::Player;
        let id = self.items.allocate(item_rule);
        if let Some(item) = self.items.get_mut(id) {
            item.player_property = player_side;
        }
        if let Err(err) = self.attach_item(id, ItemOwner::Unit(unit)) {
            self.items.rollback(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Create an item lying on a tile
    pub fn create_item_for_tile(&mut self, rule: &str, pos: Position) -> Result<ItemId> {
        let rules = Arc::clone(&self.rules);
        let item_rule = rules.require_item(rule)?;
        let id = self.items.allocate(item_rule);
        if let Err(err) = self.attach_item(id, ItemOwner::Tile(pos)) {
            self.items.rollback(id);
            return Err(err);
        }
        Ok(id)
    }

    /// Give an unowned item to an owner
    pub fn attach_item(&mut self, id: ItemId, owner: ItemOwner) -> Result<()> {
        let item = self.items.get(id).ok_or(BattleError::ItemNotFound(id))?;
        if !item.owner.is_none() {
            return Err(BattleError::AlreadyOwned(id));
        }
        let slot = self.check_destination(id, owner)?;
        self.link(id, owner, slot);
        Ok(())
    }

    /// Move an item to a new owner in one step
    pub fn move_item(&mut self, id: ItemId, owner: ItemOwner) -> Result<()> {
        let current = self.items.get(id).ok_or(BattleError::ItemNotFound(id))?.owner;
        if current == owner {
            return Ok(());
        }
        let slot = self.check_destination(id, owner)?;
        self.detach_item(id);
        self.link(id, owner, slot);
        Ok(())
    }

    /// Remove an item from play. Clips loaded in it go with it.
    pub fn remove_item(&mut self, id: ItemId) -> Result<()> {
        let item = self.items.get(id).ok_or(BattleError::ItemNotFound(id))?;
        let clips: Vec<ItemId> = item.loaded_ammo().collect();
        for clip in clips {
            self.remove_item(clip)?;
        }
        self.detach_item(id);
        self.items.discard(id);
        tracing::debug!(item = id.0, "Item removed");
        Ok(())
    }

    /// Load a clip into a weapon slot, taking it from wherever it was
    pub fn load_ammo(&mut self, weapon: ItemId, slot: usize, clip: ItemId) -> Result<()> {
        self.check_ammo(weapon, clip)?;
        let free = self
            .items
            .get(weapon)
            .and_then(|w| w.ammo_slots.get(slot))
            .map(|s| s.is_none())
            .unwrap_or(false);
        if !free {
            return Err(BattleError::AmmoSlotOccupied { weapon, slot });
        }
        self.detach_item(clip);
        self.link(clip, ItemOwner::Weapon(weapon), Some(slot));
        Ok(())
    }

    /// Take the clip out of a weapon slot and hand it to whoever holds the weapon
    pub fn unload_ammo(&mut self, weapon: ItemId, slot: usize) -> Result<Option<ItemId>> {
        let held = self.items.get(weapon).ok_or(BattleError::ItemNotFound(weapon))?;
        let Some(clip) = held.ammo_slots.get(slot).copied().flatten() else {
            return Ok(None);
        };
        let destination = match held.owner {
            ItemOwner::Unit(unit) => {
                let carrier = self.unit(unit)?;
                if carrier.has_inventory_space() {
                    ItemOwner::Unit(unit)
                } else if carrier.is_on_grid() {
                    ItemOwner::Tile(carrier.position)
                } else {
                    return Err(BattleError::InventoryFull(unit));
                }
            }
            ItemOwner::Tile(pos) => ItemOwner::Tile(pos),
            ItemOwner::Weapon(_) | ItemOwner::None => ItemOwner::None,
        };
        self.detach_item(clip);
        if !destination.is_none() {
            self.link(clip, destination, None);
        }
        Ok(Some(clip))
    }

    /// Equip built-in items: weapons first, then ammo loaded into them
    pub fn add_fixed_items(&mut self, unit: UnitId, names: &[String]) -> Result<()> {
        let rules = Arc::clone(&self.rules);
        let mut ammo = Vec::new();
        for name in names {
            let Some(rule) = rules.item(name) else {
                tracing::warn!(item = %name, "Unknown built-in item skipped");
                continue;
            };
            if rule.battle_type == BattleType::Ammo {
                ammo.push(rule);
                continue;
            }
            let id = self.items.allocate(rule);
            if let Some(item) = self.items.get_mut(id) {
                item.fixed = true;
            }
            if let Err(err) = self.attach_item(id, ItemOwner::Unit(unit)) {
                self.items.rollback(id);
                return Err(err);
            }
        }

        for rule in ammo {
            let weapon = self.unit(unit)?.inventory.iter().copied().find_map(|w| {
                let item = self.items.get(w)?;
                let slot = item.ammo_slots.iter().position(|s| s.is_none())?;
                let accepts = item.fixed && rules.item(&item.rule)?.accepts_ammo(&rule.name);
                accepts.then_some((w, slot))
            });
            let clip = self.items.allocate(rule);
            if let Some(item) = self.items.get_mut(clip) {
                item.fixed = true;
            }
            let owner = match weapon {
                Some((w, _)) => ItemOwner::Weapon(w),
                None => ItemOwner::Unit(unit),
            };
            if let Err(err) = self.attach_item(clip, owner) {
                self.items.rollback(clip);
                return Err(err);
            }
        }
        Ok(())
    }

    // === Internals ===

    /// Validate a destination without touching anything.
    /// For weapons, returns the slot the item would go into.
    fn check_destination(&self, id: ItemId, owner: ItemOwner) -> Result<Option<usize>> {
        match owner {
            ItemOwner::None => Ok(None),
            ItemOwner::Unit(unit) => {
                let fixed = self.items.get(id).map(|i| i.fixed).unwrap_or(false);
                let carrier = self.unit(unit)?;
                if !fixed && !carrier.has_inventory_space() {
                    return Err(BattleError::InventoryFull(unit));
                }
                Ok(None)
            }
            ItemOwner::Tile(pos) => {
                if self.map.get_tile(pos).is_none() {
                    return Err(BattleError::OutOfBounds(pos));
                }
                Ok(None)
            }
            ItemOwner::Weapon(weapon) => {
                self.check_ammo(weapon, id)?;
                let slot = self
                    .items
                    .get(weapon)
                    .and_then(|w| w.ammo_slots.iter().position(|s| s.is_none()))
                    .ok_or(BattleError::AmmoSlotOccupied {
                        weapon,
                        slot: AMMO_SLOT_MAX,
                    })?;
                Ok(Some(slot))
            }
        }
    }

    fn check_ammo(&self, weapon: ItemId, clip: ItemId) -> Result<()> {
        let held = self.items.get(weapon).ok_or(BattleError::ItemNotFound(weapon))?;
        let ammo = self.items.get(clip).ok_or(BattleError::ItemNotFound(clip))?;
        let accepts = self
            .rules
            .item(&held.rule)
            .map(|r| r.battle_type.takes_ammo() && r.accepts_ammo(&ammo.rule))
            .unwrap_or(false);
        if !accepts || ammo.battle_type != BattleType::Ammo || weapon == clip {
            return Err(BattleError::IncompatibleAmmo { weapon, ammo: clip });
        }
        Ok(())
    }

    /// Unhook an item from its owner, leaving it unowned
    fn detach_item(&mut self, id: ItemId) {
        let Some(item) = self.items.get_mut(id) else {
            return;
        };
        let owner = std::mem::take(&mut item.owner);
        if let ItemOwner::Unit(unit) = owner {
            item.previous_owner = Some(unit);
        }
        match owner {
            ItemOwner::None => {}
            ItemOwner::Unit(unit) => {
                if let Some(carrier) = self.units.get_mut(unit) {
                    carrier.inventory.retain(|&i| i != id);
                }
            }
            ItemOwner::Tile(pos) => {
                if let Some(tile) = self.map.get_tile_mut(pos) {
                    tile.remove_item(id);
                }
            }
            ItemOwner::Weapon(weapon) => {
                if let Some(held) = self.items.get_mut(weapon) {
                    for slot in held.ammo_slots.iter_mut() {
                        if *slot == Some(id) {
                            *slot = None;
                        }
                    }
                }
            }
        }
    }

    /// Write an already validated ownership link
    fn link(&mut self, id: ItemId, owner: ItemOwner, slot: Option<usize>) {
        let represented = match self.items.get_mut(id) {
            Some(item) => {
                item.owner = owner;
                item.represented_unit
            }
            None => return,
        };
        match owner {
            ItemOwner::None => {}
            ItemOwner::Unit(unit) => {
                if let Some(carrier) = self.units.get_mut(unit) {
                    carrier.inventory.push(id);
                }
            }
            ItemOwner::Tile(pos) => {
                if let Some(tile) = self.map.get_tile_mut(pos) {
                    tile.items.push(id);
                }
            }
            ItemOwner::Weapon(weapon) => {
                if let (Some(held), Some(slot)) = (self.items.get_mut(weapon), slot) {
                    held.ammo_slots[slot] = Some(id);
                }
            }
        }

        // a body follows the item that represents it
        if let Some(body) = represented.and_then(|u| self.units.get_mut(u)) {
            match owner {
                ItemOwner::Unit(_) => body.position = Position::OFF_GRID,
                ItemOwner::Tile(pos) => body.position = pos,
                _ => {}
            }
        }
    }
}
