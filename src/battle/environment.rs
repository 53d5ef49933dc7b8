//! Fire and smoke propagation
//!
//! Runs once per full turn cycle. Both passes read from a snapshot taken
//! before they start and collect their effects before applying any, so
//! the result never depends on which tile is visited first.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::battle::constants::{
    IGNITION_BONUS, IGNITION_SMOKE_MAX_REDUCTION, IGNITION_SMOKE_MIN_REDUCTION, SMOKE_CAP,
};
use crate::battle::execution::{BattleEventType, BattleState};
use crate::battle::terrain::{BlockKind, TilePart};
use crate::battle::units::{DamageKind, Faction};
use crate::core::types::{Direction, Position, UnitId};

/// What the new-turn environment pass did
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentReport {
    pub ignited: Vec<Position>,
    pub burned_out: Vec<Position>,
    pub casualties: Vec<UnitId>,
    pub revived: Vec<UnitId>,
}

/// Fire, smoke and overlap counters of a tile before a pass
#[derive(Debug, Clone, Copy)]
struct TileSnapshot {
    fire: u8,
    smoke: u8,
    overlaps: u8,
}

/// Smoke headed for `target`, sent by `source`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct SmokeContribution {
    target: usize,
    source: usize,
    amount: u8,
}

impl BattleState {
    /// Indices of every burning tile
    pub fn burning_tiles(&self) -> Vec<usize> {
        self.map
            .tiles()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.is_burning())
            .map(|(i, _)| i)
            .collect()
    }

    /// Indices of every tile holding smoke
    pub fn smoky_tiles(&self) -> Vec<usize> {
        self.map
            .tiles()
            .iter()
            .enumerate()
            .filter(|(_, t)| t.smoke > 0)
            .map(|(i, _)| i)
            .collect()
    }

    fn snapshot(&self) -> Vec<TileSnapshot> {
        self.map
            .tiles()
            .iter()
            .map(|t| TileSnapshot {
                fire: t.fire,
                smoke: t.smoke,
                overlaps: t.overlaps,
            })
            .collect()
    }

    /// Orthogonal neighbours of `index` not walled off for `kind`
    fn open_neighbours(&self, index: usize, kind: BlockKind) -> Vec<usize> {
        let from = self.map.position_of(index);
        Direction::CARDINAL
            .iter()
            .filter(|&&dir| !self.map.edge_blocked(from, dir, kind))
            .filter_map(|&dir| self.map.index(from + dir.offset()))
            .collect()
    }

    /// Environment step at the start of every turn cycle.
    ///
    /// Fire spreads and burns out, smoke spreads and thins, units standing
    /// in either are hurt, and then casualties, revivals and falls are
    /// resolved before vision is refreshed.
    pub fn prepare_new_turn(&mut self) -> EnvironmentReport {
        let mut report = EnvironmentReport::default();
        for unit in self.units.iter_mut() {
            unit.hit_by_fire = false;
        }

        let fire_sources = self.burning_tiles();
        let (ignited, burned_out) = self.propagate_fire(&fire_sources);
        let smoke_sources = self.smoky_tiles();
        self.propagate_smoke(&smoke_sources);

        if !fire_sources.is_empty() || !smoke_sources.is_empty() {
            self.apply_tile_effects();
        }
        for tile in self.map.tiles_mut() {
            tile.end_environment_pass();
        }
        self.burn_units();

        report.ignited = ignited.into_iter().map(|i| self.map.position_of(i)).collect();
        report.burned_out = burned_out.into_iter().map(|i| self.map.position_of(i)).collect();
        report.casualties = self.check_for_casualties();
        report.revived = self.revive_unconscious_units(false);
        self.resolve_falling_units();
        self.recalculate_vision();

        tracing::debug!(
            turn = self.turn,
            ignited = report.ignited.len(),
            burned_out = report.burned_out.len(),
            casualties = report.casualties.len(),
            "Environment pass complete"
        );
        report
    }

    // === Fire ===

    /// Burn down every source, spread to neighbours and destroy burnt-out
    /// terrain. Returns the tiles that caught fire and those that burned out.
    pub fn propagate_fire(&mut self, sources: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let mut sources = sources.to_vec();
        sources.sort_unstable();
        sources.dedup();
        let before = self.snapshot();

        let mut attempts: Vec<(usize, u8)> = Vec::new();
        let mut burned_out = Vec::new();

        for &source in &sources {
            let Some(state) = before.get(source) else {
                continue;
            };
            if state.fire == 0 || state.overlaps != 0 {
                continue;
            }
            let remaining = state.fire - 1;
            if remaining > 0 {
                for target in self.open_neighbours(source, BlockKind::Fire) {
                    if before[target].fire == 0 {
                        attempts.push((target, state.smoke));
                    }
                }
            } else {
                burned_out.push(source);
            }
            let pos = self.map.position_of(source);
            if let Some(tile) = self.map.get_tile_mut(pos) {
                tile.fire = remaining;
            }
        }

        for &source in &burned_out {
            self.burn_out(source);
        }

        // strongest attempt per target
        attempts.sort_unstable_by(|a, b| a.0.cmp(&b.0).then(b.1.cmp(&a.1)));
        attempts.dedup_by_key(|a| a.0);
        let ignited = attempts
            .into_iter()
            .filter(|&(target, power)| self.ignite(target, power))
            .map(|(target, _)| target)
            .collect();

        (ignited, burned_out)
    }

    fn burn_out(&mut self, index: usize) {
        let pos = self.map.position_of(index);
        if let Some(tile) = self.map.get_tile_mut(pos) {
            tile.smoke = 0;
        }

        let doomed: &[TilePart] = match (
            self.map.part_data(pos, TilePart::Object),
            self.map.part_data(pos, TilePart::Floor),
        ) {
            (Some(object), _) if object.burns_away() => &[TilePart::Object, TilePart::Floor],
            (Some(_), _) => &[],
            (None, Some(floor)) if floor.burns_away() => &[TilePart::Floor],
            _ => &[],
        };
        for &part in doomed {
            if self.map.get_tile(pos).and_then(|t| t.part(part)).is_none() {
                continue;
            }
            let objective = self.map.destroy_part(pos, part, self.objective_type);
            self.log_event(
                BattleEventType::TerrainDestroyed { position: pos, part },
                format!("{:?} burned away at {:?}", part, pos),
            );
            if objective {
                self.add_destroyed_objective();
            }
        }
        self.apply_gravity(pos);
    }

    /// Roll to set a tile alight.
    ///
    /// The roll is fixed by the battle seed, the turn and the tile, so the
    /// same fire spreads the same way however the pass is ordered.
    fn ignite(&mut self, index: usize, power: u8) -> bool {
        let pos = self.map.position_of(index);
        let flammability = self.map.flammability(pos);
        let fuel = self.map.fuel(pos);
        let burning = self.map.get_tile(pos).map(|t| t.is_burning()).unwrap_or(true);
        if burning || flammability == u8::MAX || fuel == 0 {
            return false;
        }

        let chance = (power as i32 - flammability as i32 / 10 + IGNITION_BONUS).max(0);
        let mut roll = ChaCha8Rng::seed_from_u64(self.ignition_key(index));
        if roll.gen_range(0..100) >= chance {
            return false;
        }

        tracing::debug!(?pos, power, "Tile ignited");
        self.set_alight(pos, flammability, fuel);
        true
    }

    /// Set a tile alight without a roll, as an incendiary would.
    ///
    /// Fireproof or fuel-less tiles and tiles already burning are left alone.
    pub fn start_fire(&mut self, pos: Position) -> bool {
        let flammability = self.map.flammability(pos);
        let fuel = self.map.fuel(pos);
        let burning = self.map.get_tile(pos).map(|t| t.is_burning()).unwrap_or(true);
        if burning || flammability == u8::MAX || fuel == 0 {
            return false;
        }
        self.set_alight(pos, flammability, fuel);
        true
    }

    fn set_alight(&mut self, pos: Position, flammability: u8, fuel: u8) {
        let reduction = (flammability as i32 / 10).clamp(IGNITION_SMOKE_MIN_REDUCTION, IGNITION_SMOKE_MAX_REDUCTION);
        if let Some(tile) = self.map.get_tile_mut(pos) {
            tile.fire = fuel.saturating_add(1);
            tile.smoke = (SMOKE_CAP as i32 - reduction) as u8;
            tile.overlaps = 1;
        }
        self.log_event(
            BattleEventType::TileIgnited { position: pos },
            format!("Fire started at {:?}", pos),
        );
    }

    fn ignition_key(&self, index: usize) -> u64 {
        self.config.seed
            ^ ((self.turn as u64) << 40)
            ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15)
    }

    // === Smoke ===

    /// Thin out and spread smoke from every source
    pub fn propagate_smoke(&mut self, sources: &[usize]) {
        let mut sources = sources.to_vec();
        sources.sort_unstable();
        sources.dedup();
        let before = self.snapshot();
        let mut contributions: Vec<SmokeContribution> = Vec::new();

        for &source in &sources {
            let Some(state) = before.get(source).copied() else {
                continue;
            };
            if state.smoke == 0 {
                continue;
            }
            let pos = self.map.position_of(source);

            if state.fire == 0 {
                let thinned = state.smoke - 1;
                if let Some(tile) = self.map.get_tile_mut(pos) {
                    tile.smoke = thinned;
                }
                if thinned == 0 {
                    continue;
                }
                for target in self.open_neighbours(source, BlockKind::Smoke) {
                    let t = before[target];
                    if t.smoke == 0 || (t.fire == 0 && t.overlaps != 0) {
                        contributions.push(SmokeContribution {
                            target,
                            source,
                            amount: thinned,
                        });
                    }
                }
            } else {
                let amount = state.smoke / 2;
                let above = pos.above();
                if let Some(target) = self.map.index(above) {
                    if self.map.has_no_floor(above) {
                        contributions.push(SmokeContribution { target, source, amount });
                    }
                }
                for target in self.open_neighbours(source, BlockKind::Smoke) {
                    contributions.push(SmokeContribution { target, source, amount });
                }
            }
        }

        contributions.sort_unstable();
        for c in contributions {
            let pos = self.map.position_of(c.target);
            if let Some(tile) = self.map.get_tile_mut(pos) {
                tile.add_smoke(c.amount);
            }
        }
    }

    // === Effects ===

    fn apply_tile_effects(&mut self) {
        let config = self.config.environment.clone();
        for index in 0..self.map.len() {
            let pos = self.map.position_of(index);
            let Some(tile) = self.map.get_tile_mut(pos) else {
                continue;
            };
            if tile.smoke == 0 {
                continue;
            }
            tile.average_smoke();
            let (smoke, burning, occupant) = (tile.smoke, tile.is_burning(), tile.unit);
            if smoke == 0 {
                continue;
            }
            let Some(unit) = occupant.and_then(|id| self.units.get_mut(id)) else {
                continue;
            };
            if unit.is_out() || (unit.size != 1 && unit.hit_by_fire) {
                continue;
            }

            if burning {
                unit.hit_by_fire = true;
                unit.damage(smoke as i32, DamageKind::Fire);
                let chance = (config.unit_ignite_chance as f32 * unit.fire_modifier) as i32;
                if self.rng.gen_range(0..100) < chance {
                    let longest = (config.unit_burn_turns as f32 * unit.fire_modifier) as i32;
                    let turns = self.rng.gen_range(0..=longest.max(0)).min(u8::MAX as i32) as u8;
                    if unit.fire_turns < turns {
                        unit.fire_turns = turns;
                    }
                }
            } else if unit.original_faction != Faction::Hostile
                && unit.smoke_modifier > 0.0
                && unit.size == 1
            {
                unit.damage(smoke as i32 / 4 + 1, DamageKind::Smoke);
            }
        }
    }

    /// Units on fire burn once per pass, unless tile fire already hit them
    fn burn_units(&mut self) {
        let (low, high) = (
            self.config.environment.burn_damage_min,
            self.config.environment.burn_damage_max.max(self.config.environment.burn_damage_min),
        );
        for id in self.units.ids() {
            let Some(unit) = self.units.get_mut(id) else {
                continue;
            };
            if unit.fire_turns == 0 || unit.is_out() || unit.hit_by_fire {
                continue;
            }
            let amount = self.rng.gen_range(low..=high);
            unit.damage(amount, DamageKind::Fire);
            unit.fire_turns -= 1;
        }
    }
}
