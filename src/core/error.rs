use thiserror::Error;

use crate::core::types::{ItemId, Position, UnitId};

#[derive(Error, Debug)]
pub enum BattleError {
    #[error("Unit not found: {0:?}")]
    UnitNotFound(UnitId),

    #[error("Item not found: {0:?}")]
    ItemNotFound(ItemId),

    #[error("Unknown item rule: {0}")]
    UnknownItemRule(String),

    #[error("Unknown unit template: {0}")]
    UnknownUnitTemplate(String),

    #[error("Inventory full for unit {0:?}")]
    InventoryFull(UnitId),

    #[error("Item {0:?} already has an owner")]
    AlreadyOwned(ItemId),

    #[error("Ammo {ammo:?} does not fit weapon {weapon:?}")]
    IncompatibleAmmo { weapon: ItemId, ammo: ItemId },

    #[error("Ammo slot {slot} of weapon {weapon:?} is occupied")]
    AmmoSlotOccupied { weapon: ItemId, slot: usize },

    #[error("Position out of bounds: {0:?}")]
    OutOfBounds(Position),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, BattleError>;
