//! Morale modifiers
//!
//! Rank steadies soldiers: a unit's own rank shields it from morale loss,
//! and the best officer still standing shields the whole squad. Hostile
//! morale scales with how many of them are left.

use crate::battle::execution::BattleState;
use crate::battle::units::{BattleUnit, Faction};
use crate::core::types::UnitId;

/// Neutral morale modifier, in percent
pub const BASE_MORALE_MODIFIER: i32 = 100;

/// Per-rank bonus for a unit's own morale, as (minimum rank, bonus)
const UNIT_RANK_BONUS: [(u8, i32); 4] = [(5, 25), (4, 20), (3, 10), (2, 20)];

/// Per-rank bonus granted to the whole player side by its best officer
const LEADER_RANK_BONUS: [(u8, i32); 4] = [(5, 25), (4, 10), (3, 5), (2, 10)];

/// Each live hostile adds this much to the hostile modifier
const HOSTILE_MORALE_PER_UNIT: i32 = 6;

fn rank_bonus(rank: u8, table: &[(u8, i32)]) -> i32 {
    BASE_MORALE_MODIFIER
        + table
            .iter()
            .filter(|(min_rank, _)| rank >= *min_rank)
            .map(|(_, bonus)| bonus)
            .sum::<i32>()
}

/// Morale modifier for a single unit.
///
/// Only units recruited by the player carry ranks that count.
pub fn unit_morale_modifier(unit: &BattleUnit) -> i32 {
    if unit.original_faction != Faction::Player {
        return BASE_MORALE_MODIFIER;
    }
    rank_bonus(unit.rank, &UNIT_RANK_BONUS)
}

impl BattleState {
    /// Highest-ranked player unit still in play
    pub fn highest_ranked_player_unit(&self) -> Option<UnitId> {
        let mut best: Option<&BattleUnit> = None;
        for unit in self.units.iter() {
            if unit.original_faction != Faction::Player || unit.is_out() {
                continue;
            }
            if best.map(|b| unit.rank > b.rank).unwrap_or(true) {
                best = Some(unit);
            }
        }
        best.map(|u| u.id)
    }

    /// Morale modifier applied to every unit of a faction
    pub fn faction_morale_modifier(&self, faction: Faction) -> i32 {
        match faction {
            Faction::Player => {
                let rank = self
                    .highest_ranked_player_unit()
                    .and_then(|id| self.units.get(id))
                    .map(|u| u.rank)
                    .unwrap_or(0);
                rank_bonus(rank, &LEADER_RANK_BONUS)
            }
            Faction::Hostile => {
                let live = self.units.count_live_original(Faction::Hostile) as i32;
                (HOSTILE_MORALE_PER_UNIT * live).max(BASE_MORALE_MODIFIER)
            }
            Faction::Neutral => BASE_MORALE_MODIFIER,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::battle::battle_map::TileGrid;
    use crate::battle::rules::Ruleset;
    use crate::battle::units::UnitStatus;
    use crate::core::config::BattleConfig;
    use std::sync::Arc;

    fn battle() -> BattleState {
        BattleState::new(
            TileGrid::new(4, 4, 1, Vec::new()),
            Arc::new(Ruleset::new()),
            BattleConfig::default(),
        )
    }

    #[test]
    fn test_unit_modifier_by_rank() {
        let expected = [100, 100, 120, 130, 150, 175, 175];
        for (rank, want) in expected.iter().enumerate() {
            let unit = BattleUnit::new(UnitId(1), "s", Faction::Player).with_rank(rank as u8);
            assert_eq!(unit_morale_modifier(&unit), *want, "rank {}", rank);
        }
    }

    #[test]
    fn test_unit_modifier_ignores_non_player_ranks() {
        let alien = BattleUnit::new(UnitId(1_000_000), "a", Faction::Hostile).with_rank(5);
        assert_eq!(unit_morale_modifier(&alien), 100);

        // a converted civilian keeps its original side
        let mut civilian = BattleUnit::new(UnitId(1_000_001), "c", Faction::Neutral).with_rank(5);
        civilian.convert_to_faction(Faction::Player);
        assert_eq!(unit_morale_modifier(&civilian), 100);
    }

    #[test]
    fn test_player_modifier_follows_best_living_officer() {
        let mut battle = battle();
        battle.add_unit(BattleUnit::new(UnitId(1), "rookie", Faction::Player).with_rank(0));
        let captain = battle.add_unit(BattleUnit::new(UnitId(2), "captain", Faction::Player).with_rank(4));
        battle.add_unit(BattleUnit::new(UnitId(3), "sergeant", Faction::Player).with_rank(2));

        assert_eq!(battle.highest_ranked_player_unit(), Some(captain));
        assert_eq!(battle.faction_morale_modifier(Faction::Player), 125);

        if let Some(unit) = battle.units.get_mut(captain) {
            unit.status = UnitStatus::Dead;
        }
        assert_eq!(battle.faction_morale_modifier(Faction::Player), 110);
    }

    #[test]
    fn test_hostile_modifier_floor() {
        let mut battle = battle();
        for i in 0..20 {
            battle.add_unit(BattleUnit::new(UnitId(1_000_000 + i), "a", Faction::Hostile));
        }
        assert_eq!(battle.faction_morale_modifier(Faction::Hostile), 120);

        let mut small = self::battle();
        small.add_unit(BattleUnit::new(UnitId(1_000_000), "a", Faction::Hostile));
        assert_eq!(small.faction_morale_modifier(Faction::Hostile), 100);
        assert_eq!(small.faction_morale_modifier(Faction::Neutral), 100);
    }

    #[test]
    fn test_hostile_modifier_ignores_conversions() {
        let mut battle = battle();
        for i in 0..20 {
            battle.add_unit(BattleUnit::new(UnitId(1_000_000 + i), "a", Faction::Hostile));
            battle.add_unit(BattleUnit::new(UnitId(100 + i), "s", Faction::Player));
        }
        for i in 0..10 {
            if let Some(alien) = battle.units.get_mut(UnitId(1_000_000 + i)) {
                alien.convert_to_faction(Faction::Player);
            }
            if let Some(soldier) = battle.units.get_mut(UnitId(100 + i)) {
                soldier.convert_to_faction(Faction::Hostile);
            }
        }
        assert_eq!(battle.faction_morale_modifier(Faction::Hostile), 120);
    }
}
