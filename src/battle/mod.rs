//! Battlescape - turn-based tactical combat on a layered tile grid
//!
//! The battle owns the map, the units and their items, the AI node graph
//! and a seeded RNG. Everything advances through `BattleState::end_turn`;
//! fire, smoke and casualties are resolved once per full cycle.

pub mod battle_map;
pub mod constants;
pub mod environment;
pub mod execution;
pub mod inventory;
pub mod items;
pub mod lifecycle;
pub mod morale;
pub mod nodes;
pub mod persistence;
pub mod placement;
pub mod recovery;
pub mod rules;
pub mod terrain;
pub mod tile;
pub mod turn;
pub mod units;
pub mod visibility;

// Re-exports for convenient access
pub use battle_map::TileGrid;
pub use constants::*;
pub use environment::EnvironmentReport;
pub use execution::{BattleEvent, BattleEventLog, BattleEventType, BattleState};
pub use items::{BattleItem, ItemOwner, ItemRegistry};
pub use morale::{unit_morale_modifier, BASE_MORALE_MODIFIER};
pub use nodes::{Node, NodeType};
pub use persistence::{BattleSave, PersonnelRoster, SoldierRoster, TileData};
pub use recovery::{
    BattleSummary, DebriefingStat, DebriefingStats, ItemContainer, MissionTarget, UnitFate,
};
pub use rules::{load_ruleset, BaseStats, BattleType, ItemRule, MovementType, Ruleset, UnitTemplate};
pub use terrain::{BigWall, BlockKind, MapData, MapDataSet, SpecialTileType, TerrainRef, TilePart};
pub use tile::Tile;
pub use turn::TurnReport;
pub use units::{BattleUnit, DamageKind, Faction, UnitRegistry, UnitStatus};
pub use visibility::{RangeVision, VisionService};
