//! Battle state and event log
//!
//! `BattleState` owns everything one encounter needs: grid, units, items,
//! AI nodes, the RNG and the turn cursor. Behaviour is split over the
//! sibling modules as further `impl BattleState` blocks:
//! placement -> inventory -> lifecycle -> environment -> turn

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::battle::battle_map::TileGrid;
use crate::battle::items::ItemRegistry;
use crate::battle::nodes::Node;
use crate::battle::rules::Ruleset;
use crate::battle::terrain::{SpecialTileType, TilePart};
use crate::battle::units::{BattleUnit, Faction, UnitRegistry};
use crate::battle::visibility::{RangeVision, VisionService};
use crate::core::config::{BattleConfig, ChronoTrigger};
use crate::core::error::{BattleError, Result};
use crate::core::types::{Position, Turn, UnitId};

/// Log entry for battle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleEvent {
    pub turn: Turn,
    pub event_type: BattleEventType,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BattleEventType {
    TurnStarted { side: Faction },
    FactionSkipped { side: Faction },
    CheatingEnabled,
    UnitKilled { unit: UnitId },
    UnitKnockedOut { unit: UnitId },
    UnitRevived { unit: UnitId },
    CivilianConverted { unit: UnitId },
    TileIgnited { position: Position },
    TerrainDestroyed { position: Position, part: TilePart },
    ObjectiveDestroyed,
    AllObjectivesDestroyed { must_destroy: bool },
    TurnLimitReached { trigger: ChronoTrigger },
    BattleEnded,
}

/// Turn-stamped events, oldest first
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BattleEventLog {
    pub events: Vec<BattleEvent>,
}

impl BattleEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event_type: BattleEventType, description: String, turn: Turn) {
        self.events.push(BattleEvent {
            turn,
            event_type,
            description,
        });
    }

    pub fn count(&self, predicate: impl Fn(&BattleEventType) -> bool) -> usize {
        self.events.iter().filter(|e| predicate(&e.event_type)).count()
    }
}

/// Complete battle state
#[derive(Debug)]
pub struct BattleState {
    // Core state
    pub map: TileGrid,
    pub units: UnitRegistry,
    pub items: ItemRegistry,
    pub nodes: Vec<Node>,
    pub rules: Arc<Ruleset>,
    pub config: BattleConfig,
    pub(crate) rng: ChaCha8Rng,

    // Turn cursor, only moved by `end_turn` and `reset_turn_counter`
    pub(crate) side: Faction,
    pub(crate) turn: Turn,
    pub(crate) cheating: bool,

    // Selection
    pub selected: Option<UnitId>,
    pub last_selected: Option<UnitId>,

    // Objectives
    pub objective_type: SpecialTileType,
    pub objectives_needed: u32,
    pub objectives_destroyed: u32,

    // Outcome
    pub aborted: bool,
    pub chrono_result: Option<ChronoTrigger>,
    pub(crate) torn_down: bool,
    /// Placement has not been finalised by `reset_unit_tiles` yet
    pub before_game: bool,

    /// Units that lost their footing and are waiting to land
    pub falling_units: Vec<UnitId>,
    pub vision: Box<dyn VisionService>,

    // Log
    pub battle_log: BattleEventLog,
}

impl BattleState {
    pub fn new(map: TileGrid, rules: Arc<Ruleset>, config: BattleConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        Self {
            map,
            units: UnitRegistry::new(),
            items: ItemRegistry::new(),
            nodes: Vec::new(),
            rules,
            config,
            rng,
            side: Faction::Player,
            turn: 1,
            cheating: false,
            selected: None,
            last_selected: None,
            objective_type: SpecialTileType::None,
            objectives_needed: 0,
            objectives_destroyed: 0,
            aborted: false,
            chrono_result: None,
            torn_down: false,
            before_game: true,
            falling_units: Vec::new(),
            vision: Box::new(RangeVision::default()),
            battle_log: BattleEventLog::new(),
        }
    }

    /// Swap in another vision service
    pub fn with_vision(mut self, vision: Box<dyn VisionService>) -> Self {
        self.vision = vision;
        self
    }

    pub fn side(&self) -> Faction {
        self.side
    }

    pub fn turn(&self) -> Turn {
        self.turn
    }

    pub fn is_cheating(&self) -> bool {
        self.cheating
    }

    /// Log a battle event
    pub fn log_event(&mut self, event_type: BattleEventType, description: String) {
        self.battle_log.push(event_type, description, self.turn);
    }

    // === Units ===

    /// Register a unit without placing it
    pub fn add_unit(&mut self, unit: BattleUnit) -> UnitId {
        let id = unit.id;
        self.units.add(unit);
        id
    }

    /// Create a generated unit from a template and put it on the map.
    ///
    /// Returns the id even when no free cell was found; the unit then
    /// stays off grid.
    pub fn spawn_unit(&mut self, template: &str, faction: Faction, near: Position) -> Result<UnitId> {
        let rule = self
            .rules
            .unit_template(template)
            .ok_or_else(|| BattleError::UnknownUnitTemplate(template.to_string()))?;
        let id = self.units.next_generated_id();
        let unit = BattleUnit::from_template(id, rule, faction);
        let fixed = unit.fixed_items.clone();
        self.add_unit(unit);
        self.add_fixed_items(id, &fixed)?;
        if !self.place_unit_near_position(id, near, false) {
            tracing::warn!(unit = id.0, ?near, "No room to place spawned unit");
        }
        Ok(id)
    }

    pub fn unit(&self, id: UnitId) -> Result<&BattleUnit> {
        self.units.get(id).ok_or(BattleError::UnitNotFound(id))
    }

    pub fn unit_mut(&mut self, id: UnitId) -> Result<&mut BattleUnit> {
        self.units.get_mut(id).ok_or(BattleError::UnitNotFound(id))
    }

    /// Unit standing on a tile, if any
    pub fn unit_at(&self, pos: Position) -> Option<&BattleUnit> {
        self.map
            .get_tile(pos)
            .and_then(|t| t.unit)
            .and_then(|id| self.units.get(id))
    }

    /// Count live hostiles and live player soldiers.
    ///
    /// Player units under hostile control count as hostile.
    pub fn tally_units(&self) -> (usize, usize) {
        let mut hostiles = 0;
        let mut players = 0;
        for unit in self.units.iter().filter(|u| !u.is_out()) {
            match unit.original_faction {
                Faction::Hostile => hostiles += 1,
                Faction::Player if unit.faction == Faction::Player => players += 1,
                Faction::Player => hostiles += 1,
                Faction::Neutral => {}
            }
        }
        (hostiles, players)
    }

    // === Selection ===

    /// Select the unit on a tile. Units out of play are ignored.
    pub fn select_unit(&mut self, pos: Position) -> Option<UnitId> {
        let found = self.unit_at(pos).filter(|u| !u.is_out()).map(|u| u.id);
        if found.is_some() {
            self.selected = found;
        }
        found
    }

    pub fn select_next_player_unit(&mut self, check_reselect: bool, set_reselect: bool, check_inventory: bool) -> Option<UnitId> {
        self.select_player_unit(true, check_reselect, set_reselect, check_inventory)
    }

    pub fn select_previous_player_unit(&mut self, check_reselect: bool, set_reselect: bool, check_inventory: bool) -> Option<UnitId> {
        self.select_player_unit(false, check_reselect, set_reselect, check_inventory)
    }

    /// Walk the unit list from the current selection, wrapping around,
    /// until a unit selectable by the active side turns up.
    fn select_player_unit(&mut self, forward: bool, check_reselect: bool, set_reselect: bool, check_inventory: bool) -> Option<UnitId> {
        if set_reselect {
            if let Some(unit) = self.selected.and_then(|id| self.units.get_mut(id)) {
                unit.dont_reselect = true;
            }
        }
        let ids = self.units.ids();
        let count = ids.len();
        if count == 0 {
            return None;
        }
        let start = self.selected.and_then(|s| ids.iter().position(|&id| id == s));

        for step in 1..=count {
            let index = match (start, forward) {
                (Some(s), true) => (s + step) % count,
                (Some(s), false) => (s + count - step % count) % count,
                (None, true) => step - 1,
                (None, false) => count - step,
            };
            let Some(unit) = self.units.get(ids[index]) else {
                continue;
            };
            if Some(unit.id) == self.selected {
                // back where we started
                if check_reselect && unit.dont_reselect {
                    self.selected = None;
                }
                return self.selected;
            }
            if unit.is_selectable(self.side, check_reselect, check_inventory) {
                self.selected = Some(unit.id);
                return self.selected;
            }
        }
        self.selected = None;
        None
    }

    // === Objectives ===

    pub fn set_objective_type(&mut self, objective: SpecialTileType) {
        self.objective_type = objective;
    }

    pub fn set_objective_count(&mut self, needed: u32) {
        self.objectives_needed = needed;
        self.objectives_destroyed = 0;
    }

    pub fn add_destroyed_objective(&mut self) {
        if self.all_objectives_destroyed() {
            return;
        }
        self.objectives_destroyed += 1;
        self.log_event(
            BattleEventType::ObjectiveDestroyed,
            format!(
                "Objective destroyed ({}/{})",
                self.objectives_destroyed, self.objectives_needed
            ),
        );
        if self.all_objectives_destroyed() {
            let must_destroy = self.objective_type == SpecialTileType::MustDestroy;
            tracing::info!(must_destroy, "All objectives destroyed");
            self.log_event(
                BattleEventType::AllObjectivesDestroyed { must_destroy },
                "All objectives destroyed".into(),
            );
        }
    }

    pub fn all_objectives_destroyed(&self) -> bool {
        self.objectives_needed > 0 && self.objectives_destroyed == self.objectives_needed
    }

    /// Abort the mission; takes effect at teardown
    pub fn abort(&mut self) {
        self.aborted = true;
    }

    /// Recompute lighting and field of view through the vision service
    pub fn recalculate_vision(&mut self) {
        self.vision.calculate_lighting(&mut self.map);
        self.vision.recalculate_fov(&self.map, &mut self.units);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::terrain::{MapData, MapDataSet, TerrainRef};

    fn state() -> BattleState {
        let mut set = MapDataSet::new("test");
        set.push(MapData::new("floor", TilePart::Floor));
        let mut map = TileGrid::new(6, 6, 1, vec![set]);
        for tile in map.tiles_mut() {
            tile.set_part(TilePart::Floor, Some(TerrainRef::new(0, 0)));
        }
        BattleState::new(map, Arc::new(Ruleset::new()), BattleConfig::default())
    }

    #[test]
    fn test_new_battle_starts_on_player_turn_one() {
        let battle = state();
        assert_eq!(battle.side(), Faction::Player);
        assert_eq!(battle.turn(), 1);
        assert!(!battle.is_cheating());
    }

    #[test]
    fn test_selection_wraps_around() {
        let mut battle = state();
        let a = battle.add_unit(BattleUnit::new(UnitId(1), "a", Faction::Player));
        battle.add_unit(BattleUnit::new(UnitId(2), "alien", Faction::Hostile));
        let b = battle.add_unit(BattleUnit::new(UnitId(3), "b", Faction::Player));

        assert_eq!(battle.select_next_player_unit(false, false, false), Some(a));
        assert_eq!(battle.select_next_player_unit(false, false, false), Some(b));
        assert_eq!(battle.select_next_player_unit(false, false, false), Some(a));
        assert_eq!(battle.select_previous_player_unit(false, false, false), Some(b));
    }

    #[test]
    fn test_selection_with_reselect_exhausts() {
        let mut battle = state();
        let a = battle.add_unit(BattleUnit::new(UnitId(1), "a", Faction::Player));
        assert_eq!(battle.select_next_player_unit(true, false, false), Some(a));
        // marking the only unit as done leaves nothing to select
        assert_eq!(battle.select_next_player_unit(true, true, false), None);
    }

    #[test]
    fn test_select_unit_ignores_out_units() {
        let mut battle = state();
        let id = battle.add_unit(BattleUnit::new(UnitId(1), "a", Faction::Player));
        assert!(battle.set_unit_position(id, Position::new(2, 2, 0), false));
        assert_eq!(battle.select_unit(Position::new(2, 2, 0)), Some(id));

        battle.selected = None;
        if let Some(unit) = battle.units.get_mut(id) {
            unit.status = crate::battle::units::UnitStatus::Dead;
        }
        assert_eq!(battle.select_unit(Position::new(2, 2, 0)), None);
        assert_eq!(battle.selected, None);
    }

    #[test]
    fn test_objectives_complete_once() {
        let mut battle = state();
        battle.set_objective_type(SpecialTileType::MustDestroy);
        assert!(!battle.all_objectives_destroyed());
        battle.set_objective_count(2);
        battle.add_destroyed_objective();
        assert!(!battle.all_objectives_destroyed());
        battle.add_destroyed_objective();
        battle.add_destroyed_objective();
        assert!(battle.all_objectives_destroyed());
        assert_eq!(battle.objectives_destroyed, 2);
        assert_eq!(
            battle.battle_log.count(|e| matches!(
                e,
                BattleEventType::AllObjectivesDestroyed { must_destroy: true }
            )),
            1
        );
    }

    #[test]
    fn test_tally_counts_mind_controlled_soldier_as_hostile() {
        let mut battle = state();
        let mut soldier = BattleUnit::new(UnitId(1), "a", Faction::Player);
        soldier.convert_to_faction(Faction::Hostile);
        battle.add_unit(soldier);
        battle.add_unit(BattleUnit::new(UnitId(2), "b", Faction::Player));
        battle.add_unit(BattleUnit::new(UnitId(3), "civ", Faction::Neutral));
        assert_eq!(battle.tally_units(), (1, 1));
    }
}
