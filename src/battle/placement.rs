//! Putting units on the grid
//!
//! Every footprint cell is checked before anything is written, so a
//! failed placement never leaves partial occupancy behind.

use crate::battle::execution::BattleState;
use crate::battle::terrain::{TilePart, FULL_HEIGHT_LEVEL, NEVER};
use crate::battle::units::{BattleUnit, Faction};
use crate::core::types::{Direction, Position, UnitId};

/// Edges checked between the cells of a large unit's footprint
const LARGE_UNIT_EDGES: [Direction; 3] = [Direction::East, Direction::SouthEast, Direction::South];

impl BattleState {
    /// Dry run of a placement.
    ///
    /// Returns the origin the unit would end up on, which is one layer up
    /// from `target` for every full-height object under the footprint.
    pub fn can_place_unit(&self, unit: &BattleUnit, target: Position) -> Option<Position> {
        let size = unit.size - 1;
        let flying = unit.can_fly();
        let mut z_offset = 0;

        'scan: loop {
            for x in (0..=size).rev() {
                for y in (0..=size).rev() {
                    let cell = Position::new(target.x + x, target.y + y, target.z + z_offset);
                    let tile = self.map.get_tile(cell)?;
                    if matches!(tile.unit, Some(other) if other != unit.id) {
                        return None;
                    }
                    if let Some(object) = self.map.part_data(cell, TilePart::Object) {
                        if object.tu_cost(flying) == NEVER || object.big_wall.blocks_standing() {
                            return None;
                        }
                    }
                    if !flying && self.map.has_no_floor(cell) {
                        return None;
                    }
                    if self.map.terrain_level(cell) == FULL_HEIGHT_LEVEL {
                        z_offset += 1;
                        continue 'scan;
                    }
                }
            }
            break;
        }

        let origin = Position::new(target.x, target.y, target.z + z_offset);
        if size > 0
            && LARGE_UNIT_EDGES
                .iter()
                .any(|&dir| self.map.is_blocked(origin, dir, Some(unit.id), flying))
        {
            return None;
        }
        Some(origin)
    }

    /// Place a unit with its origin at `target`.
    ///
    /// With `test_only` nothing changes; otherwise the old footprint is
    /// cleared and the new one written. Units out of play are refused.
    pub fn set_unit_position(&mut self, id: UnitId, target: Position, test_only: bool) -> bool {
        let Some(unit) = self.units.get(id) else {
            return false;
        };
        if unit.is_out() {
            return false;
        }
        let Some(origin) = self.can_place_unit(unit, target) else {
            return false;
        };
        if test_only {
            return true;
        }

        let old_cells = unit.footprint();
        let new_cells = unit.footprint_at(origin);
        for cell in old_cells {
            if self.map.get_tile(cell).and_then(|t| t.unit) == Some(id) {
                self.map.set_unit(cell, None);
            }
        }
        for cell in new_cells {
            self.map.set_unit(cell, Some(id));
        }
        if let Some(unit) = self.units.get_mut(id) {
            unit.position = origin;
        }
        true
    }

    /// Place a unit on or around `entry`.
    ///
    /// Tries the entry itself, then a ring of eight neighbours (spaced out
    /// further when a large unit stands at the entry), then the tile above
    /// for flyers.
    pub fn place_unit_near_position(&mut self, id: UnitId, entry: Position, large_friend: bool) -> bool {
        if entry.x < 0 || entry.y < 0 {
            return false;
        }
        if self.set_unit_position(id, entry, false) {
            return true;
        }
        let Some(unit) = self.units.get(id) else {
            return false;
        };
        let flying = unit.can_fly();
        let me = -unit.size;
        let you = if large_friend { 2 } else { 1 };
        let ring_x = [0, you, you, you, 0, me, me, me];
        let ring_y = [me, me, 0, you, you, you, 0, me];

        for (index, dir) in Direction::ALL.iter().enumerate() {
            let offset = Position::new(ring_x[index], ring_y[index], 0);
            let candidate = entry + offset;
            if self.map.get_tile(candidate).is_none() {
                continue;
            }
            if self.map.is_blocked(entry + offset / 2, *dir, Some(id), flying) {
                continue;
            }
            if self.set_unit_position(id, candidate, false) {
                return true;
            }
        }

        if flying {
            let above = entry.above();
            if self.map.get_tile(above).is_some()
                && self.map.has_no_floor(above)
                && self.set_unit_position(id, above, false)
            {
                return true;
            }
        }
        false
    }

    /// Rewrite occupancy for every unit in play, typically after a load
    pub fn reset_unit_tiles(&mut self) {
        for tile in self.map.tiles_mut() {
            tile.unit = None;
        }
        let placements: Vec<(UnitId, Vec<Position>)> = self
            .units
            .iter()
            .filter(|u| !u.is_out())
            .map(|u| (u.id, u.footprint()))
            .collect();
        for (id, cells) in placements {
            for cell in cells {
                self.map.set_unit(cell, Some(id));
            }
        }
        for unit in self.units.iter_mut() {
            if unit.faction == Faction::Player {
                unit.visible = true;
            }
        }
        self.before_game = false;
    }

    /// Every tile pointing at a unit lies in its footprint, and every
    /// in-play unit's footprint points back at it.
    pub fn occupancy_consistent(&self) -> bool {
        for tile in self.map.tiles() {
            if let Some(id) = tile.unit {
                let Some(unit) = self.units.get(id) else {
                    return false;
                };
                if unit.is_out() || !unit.footprint().contains(&tile.position) {
                    return false;
                }
            }
        }
        self.units
            .iter()
            .filter(|u| !u.is_out() && u.is_on_grid())
            .all(|u| {
                u.footprint()
                    .iter()
                    .all(|&cell| self.map.get_tile(cell).and_then(|t| t.unit) == Some(u.id))
            })
    }
}
