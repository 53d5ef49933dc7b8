//! A single cell of the battle grid

use serde::{Deserialize, Serialize};

use crate::battle::constants::SMOKE_CAP;
use crate::battle::terrain::{TerrainRef, TilePart};
use crate::core::types::{ItemId, Position, UnitId};

/// One cell of the 3D grid
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tile {
    pub position: Position,
    /// Terrain parts, indexed by `TilePart`
    pub parts: [Option<TerrainRef>; 4],
    /// Turns of fire remaining
    pub fire: u8,
    /// Smoke density
    pub smoke: u8,
    /// How many times fire or smoke was added this turn
    pub overlaps: u8,
    /// Occupant; any cell of a large unit's footprint points at it
    pub unit: Option<UnitId>,
    /// Items resting here, unordered
    pub items: Vec<ItemId>,
    /// Inside a pending blast radius
    pub danger: bool,
    /// Per-layer discovery (west wall, north wall, content)
    pub discovered: [bool; 3],
    pub light: u8,
}

impl Tile {
    pub fn new(position: Position) -> Self {
        Self {
            position,
            parts: [None; 4],
            fire: 0,
            smoke: 0,
            overlaps: 0,
            unit: None,
            items: Vec::new(),
            danger: false,
            discovered: [false; 3],
            light: 0,
        }
    }

    pub fn part(&self, part: TilePart) -> Option<TerrainRef> {
        self.parts[part.index()]
    }

    pub fn set_part(&mut self, part: TilePart, terrain: Option<TerrainRef>) {
        self.parts[part.index()] = terrain;
    }

    pub fn is_burning(&self) -> bool {
        self.fire > 0
    }

    /// Add smoke to the tile.
    ///
    /// Burning tiles ignore it. The first addition in a turn is clamped to
    /// the smoke cap; further ones accumulate and are averaged out later.
    pub fn add_smoke(&mut self, amount: u8) {
        if self.is_burning() {
            return;
        }
        if self.overlaps == 0 {
            let total = self.smoke as i32 + amount as i32;
            self.smoke = total.clamp(1, SMOKE_CAP as i32) as u8;
        } else {
            self.smoke = self.smoke.saturating_add(amount);
        }
        self.overlaps = self.overlaps.saturating_add(1);
    }

    /// Settle the smoke accumulated this turn
    pub fn average_smoke(&mut self) {
        if self.overlaps != 0 && self.smoke != 0 && !self.is_burning() {
            let averaged = self.smoke as i32 / self.overlaps as i32 - 1;
            self.smoke = averaged.clamp(0, SMOKE_CAP as i32) as u8;
        }
    }

    /// Clear the per-turn bookkeeping
    pub fn end_environment_pass(&mut self) {
        self.overlaps = 0;
        self.danger = false;
    }

    pub fn remove_item(&mut self, item: ItemId) -> bool {
        match self.items.iter().position(|&i| i == item) {
            Some(index) => {
                self.items.swap_remove(index);
                true
            }
            None => false,
        }
    }

    pub fn is_discovered(&self, layer: usize) -> bool {
        self.discovered.get(layer).copied().unwrap_or(false)
    }

    pub fn set_discovered(&mut self, layer: usize, value: bool) {
        if let Some(flag) = self.discovered.get_mut(layer) {
            *flag = value;
        }
    }
}
