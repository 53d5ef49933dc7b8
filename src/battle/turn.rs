//! Turn protocol
//!
//! The active side and the turn counter only move through `end_turn` and
//! `reset_turn_counter`.

use serde::{Deserialize, Serialize};

use crate::battle::constants::{
    CIVILIAN_CONVERT_LAYERS, CIVILIAN_CONVERT_RANGE, CIVILIAN_PANIC_LAYERS, CIVILIAN_PANIC_RANGE,
};
use crate::battle::environment::EnvironmentReport;
use crate::battle::execution::{BattleEventType, BattleState};
use crate::battle::units::Faction;
use crate::core::config::{ChronoTrigger, TurnOrder};
use crate::core::types::{Position, Turn, UnitId};

/// Outcome of a single `end_turn` call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TurnReport {
    /// Side now active
    pub side: Faction,
    pub turn: Turn,
    /// Sides passed over for having nobody to move
    pub skipped: Vec<Faction>,
    /// Set when the cycle wrapped back to the player
    pub environment: Option<EnvironmentReport>,
    pub cheating_started: bool,
    /// Civilians won over by player units
    pub converted: Vec<UnitId>,
    /// Fired when the turn limit has run out
    pub chrono_trigger: Option<ChronoTrigger>,
}

impl TurnOrder {
    /// Sides in the order they act, player first
    pub fn sides(&self) -> [Faction; 3] {
        match self {
            TurnOrder::Standard => [Faction::Player, Faction::Hostile, Faction::Neutral],
            TurnOrder::CiviliansFirst => [Faction::Player, Faction::Neutral, Faction::Hostile],
        }
    }
}

/// Within `range` tiles horizontally and `layers` vertically
fn within(a: Position, b: Position, range: i32, layers: i32) -> bool {
    (a.x - b.x).abs() <= range && (a.y - b.y).abs() <= range && (a.z - b.z).abs() <= layers
}

impl BattleState {
    /// Back to turn 1 with the player to move
    pub fn reset_turn_counter(&mut self) {
        self.turn = 1;
        self.side = Faction::Player;
        self.cheating = false;
        self.before_game = true;
    }

    fn has_selectable_unit(&self, side: Faction) -> bool {
        self.units.iter().any(|u| u.is_selectable(side, false, false))
    }

    /// Hand control to the next side.
    ///
    /// Sides with nobody to move are skipped. Wrapping back to the player
    /// runs the environment pass and starts a new turn.
    pub fn end_turn(&mut self) -> TurnReport {
        let mut report = TurnReport::default();

        if self.side == Faction::Player {
            if let Some(unit) = self.selected.and_then(|id| self.units.get(id)) {
                if unit.original_faction == Faction::Player {
                    self.last_selected = Some(unit.id);
                }
            }
            self.selected = None;
        }

        let order = self.config.turns.order.sides();
        let mut cursor = order.iter().position(|&s| s == self.side).unwrap_or(0);
        loop {
            cursor = (cursor + 1) % order.len();
            let next = order[cursor];
            if next == Faction::Player {
                self.start_new_cycle(&mut report);
                break;
            }
            if self.has_selectable_unit(next) {
                self.side = next;
                break;
            }
            tracing::debug!(side = ?next, "Nobody to move, skipping");
            self.log_event(
                BattleEventType::FactionSkipped { side: next },
                format!("{:?} has no units to move", next),
            );
            report.skipped.push(next);
        }

        let (live_hostiles, _) = self.tally_units();
        let cheat_turn = self.config.turns.cheat_turn;
        if !self.cheating
            && ((self.turn > cheat_turn / 2 && live_hostiles <= 2) || self.turn > cheat_turn)
        {
            self.cheating = true;
            report.cheating_started = true;
            tracing::info!(turn = self.turn, live_hostiles, "Hostiles now know where the player is");
            self.log_event(BattleEventType::CheatingEnabled, "Hostile AI is cheating".into());
        }

        if self.side == Faction::Player {
            let cheating = self.cheating;
            for unit in self.units.iter_mut() {
                unit.bump_turns_since_spotted();
                if cheating && unit.faction == Faction::Player && !unit.is_out() {
                    unit.turns_since_spotted = 0;
                }
                unit.turns_left_spotted_for_snipers = unit.turns_left_spotted_for_snipers.saturating_sub(1);
            }
        }

        let side = self.side;
        for unit in self.units.iter_mut() {
            if unit.faction == side {
                unit.prepare_new_turn();
            } else if unit.original_faction == side {
                unit.update_stats();
            }
            if unit.faction != Faction::Player {
                unit.visible = false;
            }
        }

        if self.config.turns.extended_civilians {
            report.converted = self.convert_civilians();
        }

        self.recalculate_vision();
        if self.side != Faction::Player {
            self.selected = None;
            self.select_next_player_unit(false, false, false);
        }

        report.side = self.side;
        report.turn = self.turn;
        self.log_event(
            BattleEventType::TurnStarted { side: self.side },
            format!("Turn {}: {:?} to move", self.turn, self.side),
        );
        tracing::info!(turn = self.turn, side = ?self.side, "Turn handed over");
        report
    }

    fn start_new_cycle(&mut self, report: &mut TurnReport) {
        report.environment = Some(self.prepare_new_turn());
        self.turn += 1;
        self.side = Faction::Player;

        let restored = self
            .last_selected
            .and_then(|id| self.units.get(id))
            .filter(|u| u.is_selectable(Faction::Player, false, false))
            .map(|u| u.id);
        match restored {
            Some(id) => self.selected = Some(id),
            None => {
                self.select_next_player_unit(false, false, false);
            }
        }

        if let Some(limit) = self.config.turns.turn_limit {
            if self.turn > limit {
                let trigger = self.config.turns.chrono_trigger;
                self.chrono_result = Some(trigger);
                if trigger == ChronoTrigger::ForceAbort {
                    self.aborted = true;
                }
                report.chrono_trigger = Some(trigger);
                tracing::warn!(turn = self.turn, limit, ?trigger, "Turn limit reached");
                self.log_event(
                    BattleEventType::TurnLimitReached { trigger },
                    format!("Turn limit {} reached", limit),
                );
            }
        }
    }

    /// Civilians in sight of a nearby player soldier join the player.
    ///
    /// Each civilian converts at most once per call and the change is seen
    /// by the field-of-view pass that follows.
    fn convert_civilians(&mut self) -> Vec<UnitId> {
        let mut converted = Vec::new();
        let civilians: Vec<UnitId> = self
            .units
            .iter()
            .filter(|u| u.original_faction == Faction::Neutral && u.faction != Faction::Player && !u.is_out())
            .map(|u| u.id)
            .collect();

        for id in civilians {
            let Some(civilian) = self.units.get(id) else {
                continue;
            };
            let origin = civilian.position;
            let converter = self
                .units
                .iter()
                .filter(|p| {
                    !p.is_out()
                        && p.faction == Faction::Player
                        && p.original_faction == Faction::Player
                        && !p.panicking
                })
                .map(|p| p.position)
                .find(|&target| {
                    within(origin, target, CIVILIAN_CONVERT_RANGE, CIVILIAN_CONVERT_LAYERS)
                        && self.vision.can_see(&self.map, civilian, target)
                });
            let Some(target) = converter else {
                continue;
            };

            let Some(civilian) = self.units.get_mut(id) else {
                continue;
            };
            civilian.convert_to_faction(Faction::Player);
            civilian.tu = civilian.stats.tu;
            civilian.energy = civilian.stats.stamina;
            civilian.dont_reselect = false;
            if within(origin, target, CIVILIAN_PANIC_RANGE, CIVILIAN_PANIC_LAYERS) {
                civilian.panicking = false;
            }
            tracing::info!(unit = id.0, "Civilian joined the player");
            self.log_event(
                BattleEventType::CivilianConverted { unit: id },
                format!("Civilian {} joined the squad", id.0),
            );
            converted.push(id);
        }
        converted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::battle_map::TileGrid;
    use crate::battle::rules::Ruleset;
    use crate::battle::terrain::{MapData, MapDataSet, TerrainRef, TilePart};
    use crate::battle::units::{BattleUnit, UnitStatus};
    use crate::battle::visibility::RangeVision;
    use crate::core::config::BattleConfig;
    use std::sync::Arc;

    fn battle(config: BattleConfig) -> BattleState {
        let mut set = MapDataSet::new("test");
        set.push(MapData::new("floor", TilePart::Floor));
        let mut map = TileGrid::new(20, 20, 1, vec![set]);
        for tile in map.tiles_mut() {
            tile.set_part(TilePart::Floor, Some(TerrainRef { set: 0, id: 0 }));
        }
        BattleState::new(map, Arc::new(Ruleset::new()), config)
    }

    fn place(battle: &mut BattleState, id: i32, faction: Faction, x: i32, y: i32) -> UnitId {
        let id = battle.add_unit(BattleUnit::new(UnitId(id), "u", faction));
        assert!(battle.set_unit_position(id, Position::new(x, y, 0), false));
        id
    }

    #[test]
    fn test_full_cycle_advances_turn_once() {
        let mut battle = battle(BattleConfig::default());
        place(&mut battle, 1, Faction::Player, 1, 1);
        place(&mut battle, 1_000_000, Faction::Hostile, 18, 18);
        place(&mut battle, 1_000_001, Faction::Neutral, 10, 10);

        let report = battle.end_turn();
        assert_eq!((report.side, report.turn), (Faction::Hostile, 1));
        assert!(report.environment.is_none());
        assert_eq!(battle.end_turn().side, Faction::Neutral);

        let report = battle.end_turn();
        assert_eq!((report.side, report.turn), (Faction::Player, 2));
        assert!(report.environment.is_some());
    }

    #[test]
    fn test_empty_side_is_skipped() {
        let mut battle = battle(BattleConfig::default());
        place(&mut battle, 1, Faction::Player, 1, 1);
        place(&mut battle, 1_000_000, Faction::Hostile, 18, 18);

        assert_eq!(battle.end_turn().side, Faction::Hostile);
        let report = battle.end_turn();
        assert_eq!(report.skipped, vec![Faction::Neutral]);
        assert_eq!((report.side, report.turn), (Faction::Player, 2));
    }

    #[test]
    fn test_civilians_first_order() {
        let mut config = BattleConfig::default();
        config.turns.order = TurnOrder::CiviliansFirst;
        let mut battle = battle(config);
        place(&mut battle, 1, Faction::Player, 1, 1);
        place(&mut battle, 1_000_000, Faction::Hostile, 18, 18);
        place(&mut battle, 1_000_001, Faction::Neutral, 10, 10);

        assert_eq!(battle.end_turn().side, Faction::Neutral);
        assert_eq!(battle.end_turn().side, Faction::Hostile);
    }

    #[test]
    fn test_selection_restored_after_cycle() {
        let mut battle = battle(BattleConfig::default());
        place(&mut battle, 1, Faction::Player, 1, 1);
        let second = place(&mut battle, 2, Faction::Player, 2, 2);
        let alien = place(&mut battle, 1_000_000, Faction::Hostile, 18, 18);
        battle.selected = Some(second);

        battle.end_turn();
        assert_eq!(battle.selected, Some(alien));
        assert_eq!(battle.last_selected, Some(second));
        battle.end_turn();
        assert_eq!(battle.selected, Some(second));
    }

    #[test]
    fn test_cheating_and_spotting() {
        let mut config = BattleConfig::default();
        config.turns.cheat_turn = 4;
        let mut battle = battle(config);
        battle.vision = Box::new(RangeVision {
            range: 5,
            ..RangeVision::default()
        });
        let soldier = place(&mut battle, 1, Faction::Player, 1, 1);
        for i in 0..3 {
            place(&mut battle, 1_000_000 + i, Faction::Hostile, 15 + i, 18);
        }
        if let Some(u) = battle.units.get_mut(soldier) {
            u.turns_since_spotted = 7;
            u.turns_left_spotted_for_snipers = 2;
        }

        battle.end_turn();
        battle.end_turn();
        // turn 2 is not past half the cheat turn with three hostiles left
        assert_eq!(battle.turn(), 2);
        assert!(!battle.is_cheating());
        let unit = battle.unit(soldier).expect("unit");
        assert_eq!(unit.turns_since_spotted, 8);
        assert_eq!(unit.turns_left_spotted_for_snipers, 1);

        // drop to two hostiles: turn 3 > 4 / 2
        if let Some(u) = battle.units.get_mut(UnitId(1_000_000)) {
            u.status = UnitStatus::Dead;
        }
        battle.end_turn();
        let report = battle.end_turn();
        assert!(report.cheating_started);
        assert!(battle.is_cheating());
        assert_eq!(battle.unit(soldier).map(|u| u.turns_since_spotted).ok(), Some(0));
    }

    #[test]
    fn test_turn_limit_forces_abort() {
        let mut config = BattleConfig::default();
        config.turns.turn_limit = Some(1);
        config.turns.chrono_trigger = ChronoTrigger::ForceAbort;
        let mut battle = battle(config);
        place(&mut battle, 1, Faction::Player, 1, 1);

        let report = battle.end_turn();
        assert_eq!(report.turn, 2);
        assert_eq!(report.chrono_trigger, Some(ChronoTrigger::ForceAbort));
        assert!(battle.aborted);
        assert_eq!(battle.chrono_result, Some(ChronoTrigger::ForceAbort));
    }

    #[test]
    fn test_extended_civilians_convert_in_sight() {
        let mut config = BattleConfig::default();
        config.turns.extended_civilians = true;
        let mut battle = battle(config);
        place(&mut battle, 1, Faction::Player, 1, 1);
        let near = place(&mut battle, 1_000_000, Faction::Neutral, 2, 2);
        let far = place(&mut battle, 1_000_001, Faction::Neutral, 15, 15);
        place(&mut battle, 1_000_002, Faction::Hostile, 18, 1);
        if let Some(u) = battle.units.get_mut(near) {
            u.panicking = true;
            u.tu = 0;
        }

        let report = battle.end_turn();
        assert_eq!(report.converted, vec![near]);
        let unit = battle.unit(near).expect("unit");
        assert_eq!(unit.faction, Faction::Player);
        assert!(!unit.panicking);
        assert_eq!(unit.tu, unit.stats.tu);
        assert_eq!(battle.unit(far).map(|u| u.faction).ok(), Some(Faction::Neutral));
    }

    #[test]
    fn test_reset_turn_counter() {
        let mut battle = battle(BattleConfig::default());
        place(&mut battle, 1, Faction::Player, 1, 1);
        battle.end_turn();
        battle.reset_turn_counter();
        assert_eq!((battle.side(), battle.turn()), (Faction::Player, 1));
        assert!(!battle.is_cheating());
    }
}
