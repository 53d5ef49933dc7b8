pub mod config;
pub mod error;
pub mod types;

pub use config::{BattleConfig, ChronoTrigger, TurnOrder};
pub use error::{BattleError, Result};
pub use types::{Direction, ItemId, NodeId, Position, Turn, UnitId};
