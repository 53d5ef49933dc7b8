//! End of battle: who made it, what gets carried home, and the score
//!
//! The campaign side owns the storage and the debriefing; this module only
//! fills them in from the finished battle.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::battle::execution::{BattleEventType, BattleState};
use crate::battle::items::BattleItem;
use crate::battle::rules::BattleType;
use crate::battle::units::{Faction, UnitStatus};
use crate::core::config::ChronoTrigger;
use crate::core::types::{ItemId, Turn, UnitId};

// Debriefing categories
pub const STAT_ALIENS_KILLED: &str = "aliens_killed";
pub const STAT_ALIEN_CORPSES: &str = "alien_corpses_recovered";
pub const STAT_LIVE_ALIENS: &str = "live_aliens_recovered";
pub const STAT_ARTIFACTS: &str = "alien_artifacts_recovered";
pub const STAT_CIVILIANS_SAVED: &str = "civilians_saved";
pub const STAT_CIVILIANS_KILLED: &str = "civilians_killed";
pub const STAT_OPERATIVES_KILLED: &str = "operatives_killed";
pub const STAT_OPERATIVES_MISSING: &str = "operatives_missing";

/// Persistent storage, item name to quantity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemContainer {
    items: AHashMap<String, i32>,
}

impl ItemContainer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_item(&mut self, name: &str, quantity: i32) {
        if quantity <= 0 {
            return;
        }
        *self.items.entry(name.to_string()).or_insert(0) += quantity;
    }

    /// Take up to `quantity` out, returning how many were removed
    pub fn remove_item(&mut self, name: &str, quantity: i32) -> i32 {
        let Some(held) = self.items.get_mut(name) else {
            return 0;
        };
        let taken = quantity.clamp(0, *held);
        *held -= taken;
        if *held == 0 {
            self.items.remove(name);
        }
        taken
    }

    pub fn item_count(&self, name: &str) -> i32 {
        self.items.get(name).copied().unwrap_or(0)
    }

    pub fn total_items(&self) -> i32 {
        self.items.values().sum()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i32)> {
        self.items.iter().map(|(k, &v)| (k.as_str(), v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebriefingStat {
    pub item: String,
    pub qty: i32,
    pub score: i32,
}

/// Scoring accumulated per named category
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebriefingStats {
    pub stats: Vec<DebriefingStat>,
}

impl DebriefingStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_stat(&mut self, name: &str, quantity: i32, score: i32) {
        match self.stats.iter_mut().find(|s| s.item == name) {
            Some(stat) => {
                stat.qty += quantity;
                stat.score += score;
            }
            None => self.stats.push(DebriefingStat {
                item: name.to_string(),
                qty: quantity,
                score,
            }),
        }
    }

    pub fn get(&self, name: &str) -> Option<&DebriefingStat> {
        self.stats.iter().find(|s| s.item == name)
    }

    pub fn total_score(&self) -> i32 {
        self.stats.iter().map(|s| s.score).sum()
    }
}

/// Where the battle was fought
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum MissionTarget {
    Ufo { name: String, landed: bool },
    AlienBase { name: String },
    MissionSite { name: String, deployment: String },
    BaseDefense { base: String },
}

impl MissionTarget {
    pub fn name(&self) -> &str {
        match self {
            MissionTarget::Ufo { name, .. }
            | MissionTarget::AlienBase { name }
            | MissionTarget::MissionSite { name, .. } => name,
            MissionTarget::BaseDefense { base } => base,
        }
    }

    /// Debriefing category credited for winning here
    pub fn success_stat(&self) -> &'static str {
        match self {
            MissionTarget::Ufo { landed: true, .. } => "ufo_captured",
            MissionTarget::Ufo { landed: false, .. } => "ufo_crash_recovered",
            MissionTarget::AlienBase { .. } => "alien_base_destroyed",
            MissionTarget::MissionSite { .. } => "mission_site_cleared",
            MissionTarget::BaseDefense { .. } => "base_defended",
        }
    }

    /// Is the whole field recovered on a win, or only what was carried?
    pub fn recovers_field(&self) -> bool {
        // a defended base keeps its own floor stock
        !matches!(self, MissionTarget::BaseDefense { .. })
    }
}

/// What became of a unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitFate {
    Survived,
    Dead,
    Unconscious,
    /// Left behind when the mission was aborted
    Missing,
}

/// Everything the campaign needs from a finished battle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleSummary {
    pub target: MissionTarget,
    pub turns: Turn,
    pub aborted: bool,
    pub victory: bool,
    pub chrono_result: Option<ChronoTrigger>,
    pub fates: Vec<(UnitId, UnitFate)>,
    pub stats: DebriefingStats,
    pub storage: ItemContainer,
    /// Removed items dropped from the graveyard
    pub purged: usize,
}

impl BattleState {
    /// Did the player win?
    pub fn is_victory(&self) -> bool {
        match self.chrono_result {
            Some(ChronoTrigger::ForceWin) => return true,
            Some(_) => return false,
            None => {}
        }
        if self.aborted {
            return false;
        }
        let (hostiles, players) = self.tally_units();
        (hostiles == 0 && players > 0) || self.all_objectives_destroyed()
    }

    /// Move items into storage and score them.
    ///
    /// Clips are counted by rounds and handed over as full clips, fixed
    /// items stay behind, and the list is empty afterwards.
    pub fn recover_items(&mut self, ids: &mut Vec<ItemId>, storage: &mut ItemContainer, stats: &mut DebriefingStats) {
        let rules = Arc::clone(&self.rules);
        let mut rounds: AHashMap<String, i32> = AHashMap::new();

        for id in ids.drain(..) {
            let Some(item) = self.items.get(id).cloned() else {
                continue;
            };
            let Some(rule) = rules.item(&item.rule) else {
                tracing::warn!(item = id.0, rule = %item.rule, "No rule for recovered item");
                continue;
            };
            if item.fixed || rule.fixed {
                continue;
            }

            if item.is_body() {
                self.score_body(&item, storage, stats);
            } else {
                if rule.recovery_points > 0 && !item.player_property {
                    stats.add_stat(STAT_ARTIFACTS, 1, rule.recovery_points);
                }
                if rule.recoverable {
                    match rule.battle_type {
                        BattleType::Ammo => *rounds.entry(item.rule.clone()).or_insert(0) += item.ammo_quantity,
                        BattleType::Firearm | BattleType::Melee => {
                            storage.add_item(&item.rule, 1);
                            for clip in item.loaded_ammo().filter_map(|c| self.items.get(c)) {
                                *rounds.entry(clip.rule.clone()).or_insert(0) += clip.ammo_quantity;
                            }
                        }
                        _ => storage.add_item(&item.rule, 1),
                    }
                }
            }

            for clip in item.loaded_ammo() {
                self.items.discard(clip);
            }
            self.items.discard(id);
        }

        for (name, total) in rounds {
            let clip_size = rules.item(&name).map(|r| r.clip_size).unwrap_or(0);
            let clips = if clip_size > 0 { total / clip_size } else { total };
            storage.add_item(&name, clips);
        }
    }

    fn score_body(&self, item: &BattleItem, storage: &mut ItemContainer, stats: &mut DebriefingStats) {
        let Some(unit) = item.represented_unit.and_then(|id| self.units.get(id)) else {
            return;
        };
        match (unit.original_faction, unit.status) {
            (Faction::Hostile, UnitStatus::Dead) => {
                stats.add_stat(STAT_ALIEN_CORPSES, 1, unit.value);
                storage.add_item(&item.rule, 1);
            }
            (Faction::Hostile, UnitStatus::Unconscious) => {
                stats.add_stat(STAT_LIVE_ALIENS, 1, unit.value);
            }
            (Faction::Neutral, UnitStatus::Unconscious) => {
                stats.add_stat(STAT_CIVILIANS_SAVED, 1, unit.value);
            }
            _ => {}
        }
    }

    /// Close the battle down. Only the first call does anything.
    ///
    /// Unit fates are settled, items are recovered (the whole field on a
    /// win, only what survivors carry otherwise) and removed items are
    /// purged for good.
    pub fn teardown(&mut self, target: MissionTarget) -> Option<BattleSummary> {
        if self.torn_down {
            return None;
        }
        self.torn_down = true;
        self.check_for_casualties();

        let victory = self.is_victory();
        let mut stats = DebriefingStats::new();
        let mut storage = ItemContainer::new();
        let mut fates = Vec::with_capacity(self.units.len());

        for unit in self.units.iter() {
            let fate = match unit.status {
                UnitStatus::Dead => UnitFate::Dead,
                UnitStatus::Unconscious if self.aborted => UnitFate::Missing,
                UnitStatus::Unconscious => UnitFate::Unconscious,
                _ if self.aborted && !unit.is_on_grid() && unit.original_faction == Faction::Player => {
                    UnitFate::Missing
                }
                _ => UnitFate::Survived,
            };
            match (unit.original_faction, fate) {
                (Faction::Hostile, UnitFate::Dead) => stats.add_stat(STAT_ALIENS_KILLED, 1, unit.value),
                (Faction::Neutral, UnitFate::Dead) => stats.add_stat(STAT_CIVILIANS_KILLED, 1, -unit.value),
                (Faction::Player, UnitFate::Dead) => stats.add_stat(STAT_OPERATIVES_KILLED, 1, -unit.value),
                (Faction::Player, UnitFate::Missing) => stats.add_stat(STAT_OPERATIVES_MISSING, 1, -unit.value),
                _ => {}
            }
            fates.push((unit.id, fate));
        }

        let carriers: Vec<UnitId> = fates
            .iter()
            .filter(|(_, fate)| *fate == UnitFate::Survived)
            .map(|(id, _)| *id)
            .filter(|&id| {
                self.units
                    .get(id)
                    .map(|u| u.original_faction == Faction::Player)
                    .unwrap_or(false)
            })
            .collect();
        for id in carriers {
            let mut carried = self.units.get_mut(id).map(|u| std::mem::take(&mut u.inventory)).unwrap_or_default();
            self.recover_items(&mut carried, &mut storage, &mut stats);
        }

        if victory {
            stats.add_stat(target.success_stat(), 1, 0);
            if target.recovers_field() {
                for index in 0..self.map.len() {
                    let pos = self.map.position_of(index);
                    let mut field = self
                        .map
                        .get_tile_mut(pos)
                        .map(|t| std::mem::take(&mut t.items))
                        .unwrap_or_default();
                    if !field.is_empty() {
                        self.recover_items(&mut field, &mut storage, &mut stats);
                    }
                }
            }
        }

        let purged = self.items.purge_deleted();
        self.log_event(BattleEventType::BattleEnded, format!("Battle at {} ended", target.name()));
        tracing::info!(
            target = target.name(),
            victory,
            aborted = self.aborted,
            score = stats.total_score(),
            "Battle torn down"
        );

        Some(BattleSummary {
            target,
            turns: self.turn,
            aborted: self.aborted,
            victory,
            chrono_result: self.chrono_result,
            fates,
            stats,
            storage,
            purged,
        })
    }
}
