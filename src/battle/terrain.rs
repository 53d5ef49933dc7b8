//! Terrain layer data
//!
//! A tile is built from up to four parts. What a part does when burned,
//! blasted or walked through is read from its `MapData` entry. Destruction
//! follows the `die_into` link rather than per-type code paths.

use serde::{Deserialize, Serialize};

/// Terrain layers of a tile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TilePart {
    Floor = 0,
    WestWall = 1,
    NorthWall = 2,
    Object = 3,
}

impl TilePart {
    pub const ALL: [TilePart; 4] = [
        TilePart::Floor,
        TilePart::WestWall,
        TilePart::NorthWall,
        TilePart::Object,
    ];

    pub fn index(&self) -> usize {
        *self as usize
    }
}

/// Geometry of an object that behaves like a wall
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BigWall {
    #[default]
    None,
    /// Fills the whole tile
    Block,
    DiagonalNesw,
    DiagonalNwse,
    West,
    North,
    East,
    South,
    EastAndSouth,
    WestAndNorth,
}

impl BigWall {
    /// Units can never stand inside these
    pub fn blocks_standing(&self) -> bool {
        matches!(
            self,
            BigWall::Block | BigWall::DiagonalNesw | BigWall::DiagonalNwse
        )
    }

    pub fn covers_west(&self) -> bool {
        matches!(self, BigWall::West | BigWall::WestAndNorth)
    }

    pub fn covers_north(&self) -> bool {
        matches!(self, BigWall::North | BigWall::WestAndNorth)
    }

    pub fn covers_east(&self) -> bool {
        matches!(self, BigWall::East | BigWall::EastAndSouth)
    }

    pub fn covers_south(&self) -> bool {
        matches!(self, BigWall::South | BigWall::EastAndSouth)
    }
}

/// Special role a terrain part plays in mission objectives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SpecialTileType {
    #[default]
    None,
    StartPoint,
    UfoPowerSource,
    UfoNavigation,
    UfoConstruction,
    AlienFood,
    AlienReproduction,
    AlienEntertainment,
    AlienSurgery,
    ExaminationRoom,
    AlienAlloys,
    AlienHabitat,
    DeadTile,
    EndPoint,
    MustDestroy,
}

/// What a blockage test is asked for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Movement,
    Fire,
    Smoke,
}

/// Value used for "impassable", "indestructible" and "fireproof"
pub const NEVER: u8 = 255;

/// Terrain level of a full-height object that acts as floor for the layer above
pub const FULL_HEIGHT_LEVEL: i32 = -24;

/// Static properties of one terrain part
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapData {
    pub name: String,
    pub part: TilePart,
    /// Time-unit cost for walkers; 255 is impassable
    #[serde(default)]
    pub tu_walk: u8,
    /// Time-unit cost for flyers; 255 is impassable
    #[serde(default)]
    pub tu_fly: u8,
    /// Resistance to catching fire; 255 is fireproof
    #[serde(default = "default_flammable")]
    pub flammable: u8,
    /// Turns this part keeps a fire going
    #[serde(default)]
    pub fuel: u8,
    /// Damage needed to destroy; 255 is indestructible
    #[serde(default = "default_armor")]
    pub armor: u8,
    #[serde(default)]
    pub big_wall: BigWall,
    /// Height offset; -24 means the object fills the tile
    #[serde(default)]
    pub terrain_level: i32,
    /// Floor parts that do not carry weight (holes, lifts)
    #[serde(default)]
    pub no_floor: bool,
    #[serde(default = "default_true")]
    pub blocks_fire: bool,
    #[serde(default = "default_true")]
    pub blocks_smoke: bool,
    #[serde(default)]
    pub special: SpecialTileType,
    /// Index (within the same set) of the part this one turns into when destroyed
    #[serde(default)]
    pub die_into: Option<u16>,
}

fn default_flammable() -> u8 {
    NEVER
}

fn default_armor() -> u8 {
    NEVER
}

fn default_true() -> bool {
    true
}

impl MapData {
    pub fn new(name: &str, part: TilePart) -> Self {
        Self {
            name: name.to_string(),
            part,
            tu_walk: 4,
            tu_fly: 4,
            flammable: NEVER,
            fuel: 0,
            armor: NEVER,
            big_wall: BigWall::None,
            terrain_level: 0,
            no_floor: false,
            blocks_fire: true,
            blocks_smoke: true,
            special: SpecialTileType::None,
            die_into: None,
        }
    }

    pub fn with_fire(mut self, flammable: u8, fuel: u8) -> Self {
        self.flammable = flammable;
        self.fuel = fuel;
        self
    }

    pub fn with_armor(mut self, armor: u8) -> Self {
        self.armor = armor;
        self
    }

    pub fn with_big_wall(mut self, big_wall: BigWall) -> Self {
        self.big_wall = big_wall;
        self
    }

    pub fn with_terrain_level(mut self, level: i32) -> Self {
        self.terrain_level = level;
        self
    }

    pub fn with_special(mut self, special: SpecialTileType) -> Self {
        self.special = special;
        self
    }

    pub fn with_die_into(mut self, id: u16) -> Self {
        self.die_into = Some(id);
        self
    }

    pub fn impassable(mut self) -> Self {
        self.tu_walk = NEVER;
        self.tu_fly = NEVER;
        self
    }

    pub fn without_floor(mut self) -> Self {
        self.no_floor = true;
        self
    }

    pub fn is_fireproof(&self) -> bool {
        self.flammable == NEVER
    }

    pub fn is_indestructible(&self) -> bool {
        self.armor == NEVER
    }

    /// Can burning reduce this part to rubble?
    pub fn burns_away(&self) -> bool {
        !self.is_fireproof() && !self.is_indestructible()
    }

    pub fn tu_cost(&self, flying: bool) -> u8 {
        if flying {
            self.tu_fly
        } else {
            self.tu_walk
        }
    }
}

/// Reference from a tile part into the terrain catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TerrainRef {
    pub set: u16,
    pub id: u16,
}

impl TerrainRef {
    pub fn new(set: u16, id: u16) -> Self {
        Self { set, id }
    }
}

/// Named collection of terrain parts (one per terrain type)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapDataSet {
    pub name: String,
    pub objects: Vec<MapData>,
}

impl MapDataSet {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            objects: Vec::new(),
        }
    }

    /// Add a part, returning its id within the set
    pub fn push(&mut self, data: MapData) -> u16 {
        self.objects.push(data);
        (self.objects.len() - 1) as u16
    }

    pub fn get(&self, id: u16) -> Option<&MapData> {
        self.objects.get(id as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_fireproof_and_indestructible() {
        let data = MapData::new("concrete", TilePart::Floor);
        assert!(data.is_fireproof());
        assert!(data.is_indestructible());
        assert!(!data.burns_away());
    }

    #[test]
    fn test_wooden_object_burns_away() {
        let data = MapData::new("crate", TilePart::Object)
            .with_fire(20, 4)
            .with_armor(10);
        assert!(data.burns_away());
    }

    #[test]
    fn test_big_wall_standing_rules() {
        assert!(BigWall::Block.blocks_standing());
        assert!(BigWall::DiagonalNwse.blocks_standing());
        assert!(!BigWall::West.blocks_standing());
        assert!(BigWall::WestAndNorth.covers_north());
    }

    #[test]
    fn test_map_data_set_ids() {
        let mut set = MapDataSet::new("farm");
        let grass = set.push(MapData::new("grass", TilePart::Floor));
        let rubble = set.push(MapData::new("rubble", TilePart::Floor));
        assert_eq!(grass, 0);
        assert_eq!(set.get(rubble).map(|d| d.name.as_str()), Some("rubble"));
        assert!(set.get(9).is_none());
    }
}
