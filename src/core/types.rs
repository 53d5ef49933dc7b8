//! Core type definitions used throughout the codebase

use serde::{Deserialize, Serialize};

/// Identifier for battle units
///
/// Ids below [`MAX_SOLDIER_ID`] belong to campaign personnel; anything
/// above is a generated unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UnitId(pub i32);

/// First id handed out to generated (non-personnel) units
pub const MAX_SOLDIER_ID: i32 = 1_000_000;

impl UnitId {
    pub fn is_soldier(&self) -> bool {
        self.0 < MAX_SOLDIER_ID
    }
}

/// Identifier for battle items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ItemId(pub i32);

/// Index of an AI node in the battle's node list
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeId(pub usize);

/// Turn counter
pub type Turn = u32;

/// Integer grid coordinate (x, y, z)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl Position {
    /// Sentinel for units that are not on the grid (e.g. carried as a body)
    pub const OFF_GRID: Position = Position { x: -1, y: -1, z: -1 };

    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn is_off_grid(&self) -> bool {
        *self == Self::OFF_GRID
    }

    /// Chebyshev distance on the horizontal plane
    pub fn horizontal_distance(&self, other: &Self) -> i32 {
        (self.x - other.x).abs().max((self.y - other.y).abs())
    }

    pub fn above(&self) -> Self {
        Self::new(self.x, self.y, self.z + 1)
    }

    pub fn below(&self) -> Self {
        Self::new(self.x, self.y, self.z - 1)
    }
}

impl std::ops::Add for Position {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl std::ops::Sub for Position {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

/// Component-wise division, truncating toward zero
impl std::ops::Div<i32> for Position {
    type Output = Self;
    fn div(self, rhs: i32) -> Self {
        Self::new(self.x / rhs, self.y / rhs, self.z / rhs)
    }
}

/// Eight compass directions, clockwise from north (north is -y)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Direction {
    #[default]
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    SouthWest,
    West,
    NorthWest,
}

impl Direction {
    pub const ALL: [Direction; 8] = [
        Direction::North,
        Direction::NorthEast,
        Direction::East,
        Direction::SouthEast,
        Direction::South,
        Direction::SouthWest,
        Direction::West,
        Direction::NorthWest,
    ];

    /// The four orthogonal directions
    pub const CARDINAL: [Direction; 4] = [
        Direction::North,
        Direction::East,
        Direction::South,
        Direction::West,
    ];

    pub fn from_index(index: usize) -> Self {
        Self::ALL[index % 8]
    }

    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Unit vector for this direction
    pub fn offset(&self) -> Position {
        match self {
            Direction::North => Position::new(0, -1, 0),
            Direction::NorthEast => Position::new(1, -1, 0),
            Direction::East => Position::new(1, 0, 0),
            Direction::SouthEast => Position::new(1, 1, 0),
            Direction::South => Position::new(0, 1, 0),
            Direction::SouthWest => Position::new(-1, 1, 0),
            Direction::West => Position::new(-1, 0, 0),
            Direction::NorthWest => Position::new(-1, -1, 0),
        }
    }

    pub fn is_diagonal(&self) -> bool {
        self.index() % 2 == 1
    }

    /// Orthogonal legs of a diagonal direction (vertical leg first)
    pub fn legs(&self) -> Option<(Direction, Direction)> {
        match self {
            Direction::NorthEast => Some((Direction::North, Direction::East)),
            Direction::SouthEast => Some((Direction::South, Direction::East)),
            Direction::SouthWest => Some((Direction::South, Direction::West)),
            Direction::NorthWest => Some((Direction::North, Direction::West)),
            _ => None,
        }
    }
}
