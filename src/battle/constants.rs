//! Battle system constants - all tunable values in one place
//!
//! Anything a battle config may want to change lives in `BattleConfig`
//! instead. These are fixed by the game rules.

// Items
pub const AMMO_SLOT_MAX: usize = 4;
/// Inventory capacity for units whose ruleset entry doesn't set one
pub const DEFAULT_CAPACITY: usize = 12;

// Fire and smoke
pub const SMOKE_CAP: u8 = 15;
/// Added to ignition power before the flammability test
pub const IGNITION_BONUS: i32 = 15;
/// Bounds for the flammability share subtracted from fresh fire smoke
pub const IGNITION_SMOKE_MIN_REDUCTION: i32 = 1;
pub const IGNITION_SMOKE_MAX_REDUCTION: i32 = 12;

// Units
/// Stun recovered by every unit at the start of its side's turn
pub const STUN_RECOVERY: i32 = 1;
pub const MAX_TURNS_SINCE_SPOTTED: u8 = 255;

// AI nodes: preferred node rank for each unit rank
pub const NODE_RANK_PREFERENCE: [u8; 8] = [4, 4, 5, 7, 3, 2, 2, 2];

// Extended civilians
/// Horizontal distance within which a player unit can win a civilian over
pub const CIVILIAN_CONVERT_RANGE: i32 = 8;
pub const CIVILIAN_CONVERT_LAYERS: i32 = 2;
/// A hostile this close stops the civilian from joining
pub const CIVILIAN_PANIC_RANGE: i32 = 2;
pub const CIVILIAN_PANIC_LAYERS: i32 = 1;

// Vision
pub const DEFAULT_VISION_RANGE: i32 = 20;
/// Layers above or below a viewer that it can still see into
pub const VISION_LAYER_BAND: i32 = 1;
