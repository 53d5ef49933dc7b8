//! The battle grid: a flat 3D array of tiles plus the terrain catalogue
//!
//! Tiles are stored layer by layer, row by row. Everything outside the
//! bounds simply does not exist: lookups return `None` and edges leading
//! off the map count as blocked.

use serde::{Deserialize, Serialize};

use crate::battle::terrain::{
    BlockKind, MapData, MapDataSet, SpecialTileType, TerrainRef, TilePart, FULL_HEIGHT_LEVEL, NEVER,
};
use crate::battle::tile::Tile;
use crate::core::error::{BattleError, Result};
use crate::core::types::{Direction, Position, UnitId};

/// The full battle grid
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileGrid {
    pub size_x: i32,
    pub size_y: i32,
    pub size_z: i32,
    tiles: Vec<Tile>,
    pub data_sets: Vec<MapDataSet>,
}

impl TileGrid {
    /// Allocate an empty grid
    pub fn new(size_x: i32, size_y: i32, size_z: i32, data_sets: Vec<MapDataSet>) -> Self {
        let size_x = size_x.max(0);
        let size_y = size_y.max(0);
        let size_z = size_z.max(0);
        let count = size_x as usize * size_y as usize * size_z as usize;
        let mut tiles = Vec::with_capacity(count);
        for z in 0..size_z {
            for y in 0..size_y {
                for x in 0..size_x {
                    tiles.push(Tile::new(Position::new(x, y, z)));
                }
            }
        }
        Self {
            size_x,
            size_y,
            size_z,
            tiles,
            data_sets,
        }
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn in_bounds(&self, pos: Position) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && pos.z >= 0
            && pos.x < self.size_x
            && pos.y < self.size_y
            && pos.z < self.size_z
    }

    /// Flat index of a position, `None` outside the grid
    pub fn index(&self, pos: Position) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        Some((pos.z * (self.size_x * self.size_y) + pos.y * self.size_x + pos.x) as usize)
    }

    pub fn position_of(&self, index: usize) -> Position {
        let index = index as i32;
        let layer = self.size_x * self.size_y;
        Position::new(
            index % layer % self.size_x,
            index % layer / self.size_x,
            index / layer,
        )
    }

    pub fn get_tile(&self, pos: Position) -> Option<&Tile> {
        self.index(pos).map(|i| &self.tiles[i])
    }

    pub fn get_tile_mut(&mut self, pos: Position) -> Option<&mut Tile> {
        self.index(pos).map(move |i| &mut self.tiles[i])
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn tiles_mut(&mut self) -> &mut [Tile] {
        &mut self.tiles
    }

    /// Return every tile to its freshly allocated state, keeping terrain
    pub fn reset(&mut self) {
        for tile in &mut self.tiles {
            let parts = tile.parts;
            *tile = Tile::new(tile.position);
            tile.parts = parts;
        }
    }

    // === Terrain ===

    pub fn map_data(&self, terrain: TerrainRef) -> Option<&MapData> {
        self.data_sets
            .get(terrain.set as usize)
            .and_then(|set| set.get(terrain.id))
    }

    pub fn part_data(&self, pos: Position, part: TilePart) -> Option<&MapData> {
        self.get_tile(pos)
            .and_then(|t| t.part(part))
            .and_then(|r| self.map_data(r))
    }

    pub fn set_part(&mut self, pos: Position, part: TilePart, terrain: Option<TerrainRef>) -> Result<()> {
        let tile = self.get_tile_mut(pos).ok_or(BattleError::OutOfBounds(pos))?;
        tile.set_part(part, terrain);
        Ok(())
    }

    /// Lowest flammability among the tile's parts (255 when fireproof)
    pub fn flammability(&self, pos: Position) -> u8 {
        TilePart::ALL
            .iter()
            .filter_map(|&p| self.part_data(pos, p))
            .map(|d| d.flammable)
            .min()
            .unwrap_or(NEVER)
    }

    /// Highest fuel among the tile's parts
    pub fn fuel(&self, pos: Position) -> u8 {
        TilePart::ALL
            .iter()
            .filter_map(|&p| self.part_data(pos, p))
            .map(|d| d.fuel)
            .max()
            .unwrap_or(0)
    }

    /// Height offset of whatever stands on the tile; -24 is a full-height object
    pub fn terrain_level(&self, pos: Position) -> i32 {
        let floor = self
            .part_data(pos, TilePart::Floor)
            .map(|d| d.terrain_level)
            .unwrap_or(0);
        match self.part_data(pos, TilePart::Object) {
            Some(object) => floor.min(object.terrain_level),
            None => floor,
        }
    }

    /// True when nothing under `pos` carries weight
    pub fn has_no_floor(&self, pos: Position) -> bool {
        if self.get_tile(pos.below()).is_some() && self.terrain_level(pos.below()) == FULL_HEIGHT_LEVEL {
            return false;
        }
        match self.part_data(pos, TilePart::Floor) {
            Some(floor) => floor.no_floor,
            None => true,
        }
    }

    /// Assign or clear a tile's occupant.
    ///
    /// Returns whether the tile gives vertical support. Positions outside
    /// the grid are left alone and report no support.
    pub fn set_unit(&mut self, pos: Position, unit: Option<UnitId>) -> bool {
        let supported = self.get_tile(pos).is_some() && !self.has_no_floor(pos);
        if let Some(tile) = self.get_tile_mut(pos) {
            tile.unit = unit;
        }
        supported
    }

    /// Remove a terrain layer, replacing it with its destroyed form.
    ///
    /// Returns true when the destroyed part had the tracked objective type.
    pub fn destroy_part(&mut self, pos: Position, part: TilePart, objective: SpecialTileType) -> bool {
        let Some(current) = self.get_tile(pos).and_then(|t| t.part(part)) else {
            return false;
        };
        let (was_objective, replacement) = match self.map_data(current) {
            Some(data) => (
                objective != SpecialTileType::None && data.special == objective,
                data.die_into.map(|id| TerrainRef::new(current.set, id)),
            ),
            None => (false, None),
        };
        if let Some(tile) = self.get_tile_mut(pos) {
            tile.set_part(part, replacement);
        }
        tracing::debug!(?pos, ?part, was_objective, "Terrain part destroyed");
        was_objective
    }

    // === Blockage ===

    fn part_blocks(data: Option<&MapData>, kind: BlockKind) -> bool {
        match data {
            Some(d) => match kind {
                BlockKind::Movement => d.tu_walk == NEVER,
                BlockKind::Fire => d.blocks_fire,
                BlockKind::Smoke => d.blocks_smoke,
            },
            None => false,
        }
    }

    /// Does the object on `pos` act as a wall on the given side?
    fn object_wall_blocks(&self, pos: Position, side: Direction, kind: BlockKind) -> bool {
        let Some(object) = self.part_data(pos, TilePart::Object) else {
            return false;
        };
        let covers = match side {
            Direction::North => object.big_wall.covers_north(),
            Direction::East => object.big_wall.covers_east(),
            Direction::South => object.big_wall.covers_south(),
            Direction::West => object.big_wall.covers_west(),
            _ => false,
        };
        covers && Self::part_blocks(Some(object), kind)
    }

    fn orthogonal_blocked(&self, from: Position, dir: Direction, kind: BlockKind) -> bool {
        let to = from + dir.offset();
        if self.get_tile(from).is_none() || self.get_tile(to).is_none() {
            return true;
        }
        match dir {
            Direction::North => {
                Self::part_blocks(self.part_data(from, TilePart::NorthWall), kind)
                    || self.object_wall_blocks(from, Direction::North, kind)
                    || self.object_wall_blocks(to, Direction::South, kind)
            }
            Direction::West => {
                Self::part_blocks(self.part_data(from, TilePart::WestWall), kind)
                    || self.object_wall_blocks(from, Direction::West, kind)
                    || self.object_wall_blocks(to, Direction::East, kind)
            }
            Direction::South => {
                Self::part_blocks(self.part_data(to, TilePart::NorthWall), kind)
                    || self.object_wall_blocks(to, Direction::North, kind)
                    || self.object_wall_blocks(from, Direction::South, kind)
            }
            Direction::East => {
                Self::part_blocks(self.part_data(to, TilePart::WestWall), kind)
                    || self.object_wall_blocks(to, Direction::West, kind)
                    || self.object_wall_blocks(from, Direction::East, kind)
            }
            _ => true,
        }
    }

    /// Wall geometry blockage between `from` and its neighbour in `dir`.
    ///
    /// A diagonal step is blocked when any of the orthogonal edges around
    /// the corner is.
    pub fn edge_blocked(&self, from: Position, dir: Direction, kind: BlockKind) -> bool {
        match dir.legs() {
            None => self.orthogonal_blocked(from, dir, kind),
            Some((vertical, horizontal)) => {
                self.orthogonal_blocked(from, vertical, kind)
                    || self.orthogonal_blocked(from, horizontal, kind)
                    || self.orthogonal_blocked(from + vertical.offset(), horizontal, kind)
                    || self.orthogonal_blocked(from + horizontal.offset(), vertical, kind)
            }
        }
    }

    /// Can `mover` step from `from` into its neighbour in `dir`?
    ///
    /// Walls, impassable or full-tile objects and other units all block.
    pub fn is_blocked(&self, from: Position, dir: Direction, mover: Option<UnitId>, flying: bool) -> bool {
        if self.edge_blocked(from, dir, BlockKind::Movement) {
            return true;
        }
        let to = from + dir.offset();
        let Some(tile) = self.get_tile(to) else {
            return true;
        };
        if let Some(object) = self.part_data(to, TilePart::Object) {
            if object.tu_cost(flying) == NEVER || object.big_wall.blocks_standing() {
                return true;
            }
        }
        matches!(tile.unit, Some(occupant) if Some(occupant) != mover)
    }
}
