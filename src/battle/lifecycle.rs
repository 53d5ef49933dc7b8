//! Unit status transitions that touch the grid and the item registry
//!
//! Collapsing units become bodies on the floor, bodies get back up when
//! their stun wears off, and anything left without a floor falls.

use crate::battle::execution::{BattleEventType, BattleState};
use crate::battle::items::ItemOwner;
use crate::battle::units::UnitStatus;
use crate::core::types::{ItemId, Position, UnitId};

impl BattleState {
    /// Finalise every collapsing unit as dead or unconscious.
    ///
    /// The footprint is cleared, carried items are dropped on the unit's
    /// tile and one body item per footprint cell takes its place.
    pub fn check_for_casualties(&mut self) -> Vec<UnitId> {
        let collapsing: Vec<UnitId> = self
            .units
            .iter()
            .filter(|u| u.status == UnitStatus::Collapsing)
            .map(|u| u.id)
            .collect();

        for &id in &collapsing {
            let Some(unit) = self.units.get_mut(id) else {
                continue;
            };
            let dead = unit.health == 0;
            unit.status = if dead {
                UnitStatus::Dead
            } else {
                UnitStatus::Unconscious
            };
            unit.fire_turns = 0;
            unit.ai_target_node = None;
            let origin = unit.position;
            let cells = unit.footprint();
            let corpse = unit.corpse_items.clone();
            let inventory = unit.inventory.clone();

            for &cell in &cells {
                if self.map.get_tile(cell).and_then(|t| t.unit) == Some(id) {
                    self.map.set_unit(cell, None);
                }
            }
            if self.selected == Some(id) {
                self.selected = None;
            }

            if !cells.is_empty() {
                self.drop_inventory(id, &inventory, origin);
                for (cell, rule) in cells.iter().zip(corpse.iter()) {
                    match self.create_item_for_tile(rule, *cell) {
                        Ok(body) => {
                            if let Some(item) = self.items.get_mut(body) {
                                item.represented_unit = Some(id);
                            }
                        }
                        Err(err) => tracing::warn!(unit = id.0, %err, "Could not place body item"),
                    }
                }
            }

            let (event, verb) = if dead {
                (BattleEventType::UnitKilled { unit: id }, "killed")
            } else {
                (BattleEventType::UnitKnockedOut { unit: id }, "knocked out")
            };
            tracing::info!(unit = id.0, "Unit {}", verb);
            self.log_event(event, format!("Unit {} {}", id.0, verb));
        }
        collapsing
    }

    fn drop_inventory(&mut self, id: UnitId, inventory: &[ItemId], at: Position) {
        for &item in inventory {
            let fixed = self.items.get(item).map(|i| i.fixed).unwrap_or(false);
            let result = if fixed {
                self.remove_item(item)
            } else {
                self.move_item(item, ItemOwner::Tile(at))
            };
            if let Err(err) = result {
                tracing::warn!(unit = id.0, item = item.0, %err, "Could not drop item");
            }
        }
    }

    /// Stand up unconscious units whose stun has dropped below their health.
    ///
    /// A unit that finds no room stays down until a later turn.
    pub fn revive_unconscious_units(&mut self, no_tu: bool) -> Vec<UnitId> {
        let mut revived = Vec::new();
        for id in self.units.ids() {
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            if unit.size != 1
                || unit.status != UnitStatus::Unconscious
                || unit.stun >= unit.health
                || unit.health <= 0
            {
                continue;
            }

            let mut origin = unit.position;
            if origin.is_off_grid() {
                let carrier = self
                    .items
                    .iter()
                    .find(|i| i.represented_unit == Some(id))
                    .and_then(|i| i.carrier())
                    .and_then(|c| self.units.get(c));
                if let Some(carrier) = carrier {
                    origin = carrier.position;
                }
            }

            let large_friend = self
                .unit_at(origin)
                .map(|other| other.id != id && other.size != 1)
                .unwrap_or(false);

            // placement refuses downed units, so stand up first
            self.set_unit_status(id, UnitStatus::Standing);
            if self.place_unit_near_position(id, origin, large_friend) {
                if no_tu {
                    if let Some(unit) = self.units.get_mut(id) {
                        unit.tu = 0;
                    }
                }
                self.remove_unconscious_body_item(id);
                tracing::info!(unit = id.0, "Unit regained consciousness");
                self.log_event(
                    BattleEventType::UnitRevived { unit: id },
                    format!("Unit {} revived", id.0),
                );
                revived.push(id);
            } else {
                self.set_unit_status(id, UnitStatus::Unconscious);
            }
        }
        revived
    }

    fn set_unit_status(&mut self, id: UnitId, status: UnitStatus) {
        if let Some(unit) = self.units.get_mut(id) {
            unit.status = status;
        }
    }

    /// Remove the body items standing in for a unit
    pub fn remove_unconscious_body_item(&mut self, id: UnitId) {
        let size = self.units.get(id).map(|u| u.size).unwrap_or(1);
        let bodies: Vec<ItemId> = self
            .items
            .iter()
            .filter(|i| i.represented_unit == Some(id))
            .map(|i| i.id)
            .take((size * size) as usize)
            .collect();
        for body in bodies {
            if let Err(err) = self.remove_item(body) {
                tracing::warn!(unit = id.0, %err, "Could not remove body item");
            }
        }
    }

    pub fn add_falling_unit(&mut self, id: UnitId) {
        if !self.falling_units.contains(&id) {
            self.falling_units.push(id);
        }
    }

    /// First supported position at or below `pos`
    fn landing_position(&self, pos: Position) -> Position {
        let mut current = pos;
        while current.z > 0 && self.map.has_no_floor(current) {
            current = current.below();
        }
        current
    }

    /// Drop everything a tile can no longer hold.
    ///
    /// Items land on the first supported tile below. Walking units are
    /// queued as falling. Returns the landing position.
    pub fn apply_gravity(&mut self, pos: Position) -> Position {
        let Some(tile) = self.map.get_tile(pos) else {
            return pos;
        };
        if pos.z == 0 || !self.map.has_no_floor(pos) {
            return pos;
        }
        let occupant = tile.unit;
        let items = tile.items.clone();
        let landing = self.landing_position(pos);

        for item in items {
            if let Err(err) = self.move_item(item, ItemOwner::Tile(landing)) {
                tracing::warn!(item = item.0, %err, "Item could not fall");
            }
        }
        if let Some(unit) = occupant.and_then(|id| self.units.get(id)) {
            if !unit.can_fly() && !unit.is_out() {
                let id = unit.id;
                self.add_falling_unit(id);
            }
        }
        landing
    }

    /// Bring every falling unit down to the first layer that holds it
    pub fn resolve_falling_units(&mut self) {
        let falling = std::mem::take(&mut self.falling_units);
        for id in falling {
            let Some(unit) = self.units.get(id) else {
                continue;
            };
            if unit.is_out() || !unit.is_on_grid() {
                continue;
            }
            let cells = unit.footprint();
            let mut target = unit.position;
            while target.z > 0
                && cells
                    .iter()
                    .all(|c| self.map.has_no_floor(Position::new(c.x, c.y, target.z)))
            {
                target = target.below();
            }
            if target == unit.position {
                continue;
            }
            if !self.set_unit_position(id, target, false)
                && !self.place_unit_near_position(id, target, false)
            {
                tracing::warn!(unit = id.0, ?target, "Falling unit found no place to land");
                continue;
            }
            if let Some(unit) = self.units.get_mut(id) {
                if unit.status == UnitStatus::Walking {
                    unit.status = UnitStatus::Standing;
                }
            }
            tracing::debug!(unit = id.0, ?target, "Unit landed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::battle_map::TileGrid;
    use crate::battle::rules::{BattleType, ItemRule, Ruleset};
    use crate::battle::terrain::{MapData, MapDataSet, TerrainRef, TilePart};
    use crate::battle::units::{BattleUnit, DamageKind, Faction};
    use crate::core::config::BattleConfig;
    use std::sync::Arc;

    const FLOOR: TerrainRef = TerrainRef { set: 0, id: 0 };

    fn battle(x: i32, y: i32, z: i32) -> BattleState {
        let mut set = MapDataSet::new("test");
        set.push(MapData::new("floor", TilePart::Floor));
        let mut map = TileGrid::new(x, y, z, vec![set]);
        for tile in map.tiles_mut() {
            if tile.position.z == 0 {
                tile.set_part(TilePart::Floor, Some(FLOOR));
            }
        }
        let mut rules = Ruleset::new();
        rules.add_item(ItemRule::new("corpse", BattleType::Corpse));
        rules.add_item(ItemRule::new("grenade", BattleType::Grenade));
        rules.add_item(ItemRule::new("claw", BattleType::Melee).fixed());
        BattleState::new(map, Arc::new(rules), BattleConfig::default())
    }

    fn soldier(battle: &mut BattleState, id: i32, pos: Position) -> UnitId {
        let mut unit = BattleUnit::new(UnitId(id), "soldier", Faction::Player);
        unit.corpse_items = vec!["corpse".into()];
        let id = battle.add_unit(unit);
        assert!(battle.set_unit_position(id, pos, false));
        id
    }

    fn knock_out(battle: &mut BattleState, id: UnitId) {
        if let Some(unit) = battle.units.get_mut(id) {
            let health = unit.health;
            unit.damage(health, DamageKind::Stun);
        }
        battle.check_for_casualties();
    }

    #[test]
    fn test_casualty_drops_items_and_leaves_body() {
        let mut battle = battle(5, 5, 1);
        let pos = Position::new(2, 2, 0);
        let id = soldier(&mut battle, 1, pos);
        let grenade = battle.create_item_for_unit("grenade", id).expect("grenade");
        let claw = battle.create_item_for_unit("claw", id).expect("claw");

        if let Some(unit) = battle.units.get_mut(id) {
            unit.damage(500, DamageKind::Normal);
        }
        assert_eq!(battle.check_for_casualties(), vec![id]);

        let unit = battle.unit(id).expect("record kept");
        assert_eq!(unit.status, UnitStatus::Dead);
        assert!(battle.unit_at(pos).is_none());
        let tile = battle.map.get_tile(pos).expect("tile");
        assert!(tile.items.contains(&grenade));
        assert!(!battle.items.contains(claw));
        assert_eq!(tile.items.len(), 2);
        assert!(battle
            .items
            .iter()
            .any(|i| i.represented_unit == Some(id) && i.owner == ItemOwner::Tile(pos)));
        assert!(battle.occupancy_consistent());
    }

    #[test]
    fn test_revive_with_free_tile() {
        let mut battle = battle(5, 5, 1);
        let pos = Position::new(2, 2, 0);
        let id = soldier(&mut battle, 1, pos);
        knock_out(&mut battle, id);
        assert_eq!(battle.unit(id).map(|u| u.status).ok(), Some(UnitStatus::Unconscious));

        // someone steps onto the body
        soldier(&mut battle, 2, pos);
        if let Some(unit) = battle.units.get_mut(id) {
            unit.stun = 0;
        }

        assert_eq!(battle.revive_unconscious_units(true), vec![id]);
        let unit = battle.unit(id).expect("unit");
        assert_eq!(unit.status, UnitStatus::Standing);
        assert_eq!(unit.tu, 0);
        assert_ne!(unit.position, pos);
        assert!(!battle.items.iter().any(|i| i.represented_unit == Some(id)));
        assert!(battle.occupancy_consistent());
    }

    #[test]
    fn test_revive_deferred_without_room() {
        let mut battle = battle(3, 3, 1);
        let centre = Position::new(1, 1, 0);
        let id = soldier(&mut battle, 1, centre);
        knock_out(&mut battle, id);

        let mut next = 10;
        for x in 0..3 {
            for y in 0..3 {
                soldier(&mut battle, next, Position::new(x, y, 0));
                next += 1;
            }
        }
        if let Some(unit) = battle.units.get_mut(id) {
            unit.stun = 0;
        }
        let items_before = battle.items.len();

        assert!(battle.revive_unconscious_units(false).is_empty());
        assert_eq!(battle.unit(id).map(|u| u.status).ok(), Some(UnitStatus::Unconscious));
        assert_eq!(battle.items.len(), items_before);
    }

    #[test]
    fn test_revive_from_carrier_position() {
        let mut battle = battle(5, 5, 1);
        let id = soldier(&mut battle, 1, Position::new(0, 0, 0));
        knock_out(&mut battle, id);
        let carrier = soldier(&mut battle, 2, Position::new(3, 3, 0));
        let body = battle
            .items
            .iter()
            .find(|i| i.represented_unit == Some(id))
            .map(|i| i.id)
            .expect("body");
        battle.move_item(body, ItemOwner::Unit(carrier)).expect("pick up");
        if let Some(unit) = battle.units.get_mut(id) {
            unit.stun = 0;
        }

        assert_eq!(battle.revive_unconscious_units(false), vec![id]);
        let pos = battle.unit(id).map(|u| u.position).expect("unit");
        assert_eq!(pos.horizontal_distance(&Position::new(3, 3, 0)), 1);
        assert!(battle.unit(carrier).map(|u| u.inventory.is_empty()).unwrap_or(false));
    }

    #[test]
    fn test_gravity_drops_items_and_units() {
        let mut battle = battle(3, 3, 3);
        let high = Position::new(1, 1, 2);
        let item = battle.create_item_for_tile("grenade", high).expect("item");
        assert_eq!(battle.apply_gravity(high), Position::new(1, 1, 0));
        assert_eq!(
            battle.items.get(item).map(|i| i.owner),
            Some(ItemOwner::Tile(Position::new(1, 1, 0)))
        );

        // stand a unit on a floor that then disappears
        let ledge = Position::new(0, 0, 1);
        battle
            .map
            .set_part(ledge, TilePart::Floor, Some(FLOOR))
            .expect("in bounds");
        let id = soldier(&mut battle, 1, ledge);
        battle.map.destroy_part(ledge, TilePart::Floor, Default::default());
        battle.apply_gravity(ledge);
        assert_eq!(battle.falling_units, vec![id]);

        battle.resolve_falling_units();
        assert!(battle.falling_units.is_empty());
        assert_eq!(battle.unit(id).map(|u| u.position).ok(), Some(Position::new(0, 0, 0)));
        assert!(battle.occupancy_consistent());
    }
}
