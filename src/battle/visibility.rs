//! Lighting and field of view
//!
//! The battle core never traces lines of sight itself. It asks a
//! `VisionService` after anything that may change what units see.

use ahash::AHashSet;

use crate::battle::battle_map::TileGrid;
use crate::battle::constants::{DEFAULT_VISION_RANGE, VISION_LAYER_BAND};
use crate::battle::execution::BattleState;
use crate::battle::units::{BattleUnit, Faction, UnitRegistry};
use crate::core::types::{Position, UnitId};

/// Light level of a burning tile
pub const FIRE_LIGHT: u8 = 15;
pub const DAYLIGHT: u8 = 15;

/// Black-box lighting and visibility calculations
pub trait VisionService: std::fmt::Debug {
    /// Refresh per-tile light levels
    fn calculate_lighting(&self, grid: &mut TileGrid);

    /// Refresh every unit's visible set and visibility flag
    fn recalculate_fov(&self, grid: &TileGrid, units: &mut UnitRegistry);

    /// Can `viewer` see the tile at `target`?
    fn can_see(&self, grid: &TileGrid, viewer: &BattleUnit, target: Position) -> bool;
}

/// Range-only vision: no walls, just distance and layer band
#[derive(Debug, Clone)]
pub struct RangeVision {
    pub range: i32,
    pub layer_band: i32,
    pub ambient_light: u8,
}

impl Default for RangeVision {
    fn default() -> Self {
        Self {
            range: DEFAULT_VISION_RANGE,
            layer_band: VISION_LAYER_BAND,
            ambient_light: DAYLIGHT,
        }
    }
}

impl VisionService for RangeVision {
    fn calculate_lighting(&self, grid: &mut TileGrid) {
        for tile in grid.tiles_mut() {
            tile.light = if tile.is_burning() {
                FIRE_LIGHT
            } else {
                self.ambient_light
            };
        }
    }

    fn recalculate_fov(&self, grid: &TileGrid, units: &mut UnitRegistry) {
        let snapshot: Vec<(UnitId, Faction, Position, bool)> = units
            .iter()
            .map(|u| (u.id, u.faction, u.position, !u.is_out() && u.is_on_grid()))
            .collect();

        let mut seen_by_player = AHashSet::new();
        let mut seen_by_hostile = AHashSet::new();

        for viewer in units.iter_mut() {
            viewer.visible_units.clear();
            if viewer.is_out() || !viewer.is_on_grid() {
                continue;
            }
            for &(id, faction, position, in_play) in &snapshot {
                if !in_play || faction == viewer.faction {
                    continue;
                }
                if self.can_see(grid, viewer, position) {
                    viewer.visible_units.push(id);
                    match viewer.faction {
                        Faction::Player => {
                            seen_by_player.insert(id);
                        }
                        Faction::Hostile => {
                            seen_by_hostile.insert(id);
                        }
                        Faction::Neutral => {}
                    }
                }
            }
            viewer.visible_units.sort();
        }

        for unit in units.iter_mut() {
            if unit.faction == Faction::Player || seen_by_player.contains(&unit.id) {
                unit.visible = true;
            }
            if seen_by_hostile.contains(&unit.id) {
                unit.turns_since_spotted = 0;
            }
        }
    }

    fn can_see(&self, grid: &TileGrid, viewer: &BattleUnit, target: Position) -> bool {
        if viewer.is_out() || !viewer.is_on_grid() || grid.get_tile(target).is_none() {
            return false;
        }
        viewer.position.horizontal_distance(&target) <= self.range
            && (viewer.position.z - target.z).abs() <= self.layer_band
    }
}

impl BattleState {
    /// Does any unit of `faction` currently see `target`?
    pub fn eyes_on_target(&self, faction: Faction, target: UnitId) -> bool {
        self.units
            .iter()
            .filter(|u| u.faction == faction && !u.is_out())
            .any(|u| u.visible_units.contains(&target))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn place(unit: &mut BattleUnit, pos: Position) {
        unit.position = pos;
    }

    #[test]
    fn test_range_and_layer_band() {
        let grid = TileGrid::new(30, 30, 4, Vec::new());
        let vision = RangeVision {
            range: 5,
            layer_band: 1,
            ambient_light: 0,
        };
        let mut viewer = BattleUnit::new(UnitId(1), "a", Faction::Player);
        place(&mut viewer, Position::new(0, 0, 0));

        assert!(vision.can_see(&grid, &viewer, Position::new(5, 3, 1)));
        assert!(!vision.can_see(&grid, &viewer, Position::new(6, 0, 0)));
        assert!(!vision.can_see(&grid, &viewer, Position::new(1, 1, 2)));
    }

    #[test]
    fn test_fov_marks_spotted_hostiles_visible() {
        let grid = TileGrid::new(30, 30, 1, Vec::new());
        let vision = RangeVision::default();
        let mut units = UnitRegistry::new();

        let mut soldier = BattleUnit::new(UnitId(1), "a", Faction::Player);
        place(&mut soldier, Position::new(1, 1, 0));
        let mut near = BattleUnit::new(UnitId(1_000_001), "b", Faction::Hostile);
        place(&mut near, Position::new(4, 4, 0));
        let mut far = BattleUnit::new(UnitId(1_000_002), "c", Faction::Hostile);
        place(&mut far, Position::new(29, 29, 0));
        units.add(soldier);
        units.add(near);
        units.add(far);

        vision.recalculate_fov(&grid, &mut units);

        assert_eq!(
            units.get(UnitId(1)).map(|u| u.visible_units.clone()),
            Some(vec![UnitId(1_000_001)])
        );
        assert!(units.get(UnitId(1_000_001)).map(|u| u.visible).unwrap_or(false));
        assert!(!units.get(UnitId(1_000_002)).map(|u| u.visible).unwrap_or(true));
        // the hostile saw the soldier back
        assert_eq!(units.get(UnitId(1)).map(|u| u.turns_since_spotted), Some(0));
    }

    #[test]
    fn test_lighting_follows_fire() {
        let mut grid = TileGrid::new(2, 1, 1, Vec::new());
        if let Some(tile) = grid.get_tile_mut(Position::new(1, 0, 0)) {
            tile.fire = 2;
        }
        let vision = RangeVision {
            ambient_light: 3,
            ..RangeVision::default()
        };
        vision.calculate_lighting(&mut grid);
        assert_eq!(grid.get_tile(Position::new(0, 0, 0)).map(|t| t.light), Some(3));
        assert_eq!(grid.get_tile(Position::new(1, 0, 0)).map(|t| t.light), Some(FIRE_LIGHT));
    }
}
