//! Battle configuration loaded from TOML
//!
//! Every tunable that changes how a battle plays out lives here. Sections
//! default individually, so a config file only needs the values it changes.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::error::{BattleError, Result};

/// Order in which factions take their turns after the player
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnOrder {
    /// Player, then hostile, then neutral
    #[default]
    Standard,
    /// Player, then neutral, then hostile
    CiviliansFirst,
}

/// What happens when the turn limit runs out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChronoTrigger {
    #[default]
    ForceLose,
    ForceAbort,
    ForceWin,
}

/// Turn protocol settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TurnConfig {
    pub order: TurnOrder,
    /// Civilians can be taken over by nearby player units
    pub extended_civilians: bool,
    /// Turn after which the hostile AI always knows where the player is.
    /// Half of it is enough once few hostiles remain.
    pub cheat_turn: u32,
    /// Last playable turn for timed missions
    pub turn_limit: Option<u32>,
    pub chrono_trigger: ChronoTrigger,
}

impl Default for TurnConfig {
    fn default() -> Self {
        Self {
            order: TurnOrder::Standard,
            extended_civilians: false,
            cheat_turn: 20,
            turn_limit: None,
            chrono_trigger: ChronoTrigger::ForceLose,
        }
    }
}

/// Fire and smoke tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EnvironmentConfig {
    /// Upper bound for smoke density on a single tile
    pub max_smoke: u8,
    /// Percent chance (before armor) that standing in fire sets a unit alight
    pub unit_ignite_chance: u8,
    /// Longest a unit keeps burning after catching fire
    pub unit_burn_turns: u8,
    /// Damage range taken each turn by a burning unit
    pub burn_damage_min: i32,
    pub burn_damage_max: i32,
}

impl Default for EnvironmentConfig {
    fn default() -> Self {
        Self {
            max_smoke: 15,
            unit_ignite_chance: 40,
            unit_burn_turns: 5,
            burn_damage_min: 5,
            burn_damage_max: 10,
        }
    }
}

/// Complete battle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleConfig {
    /// Seed for the battle RNG
    #[serde(default)]
    pub seed: u64,
    #[serde(default)]
    pub turns: TurnConfig,
    #[serde(default)]
    pub environment: EnvironmentConfig,
}

impl Default for BattleConfig {
    fn default() -> Self {
        Self {
            seed: 0,
            turns: TurnConfig::default(),
            environment: EnvironmentConfig::default(),
        }
    }
}

impl BattleConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML text
    pub fn parse_toml(content: &str) -> Result<Self> {
        let config: BattleConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a config from a TOML file on disk
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Validate configuration for internal consistency
    pub fn validate(&self) -> Result<()> {
        if self.turns.cheat_turn == 0 {
            return Err(BattleError::Config("cheat_turn must be positive".into()));
        }
        if self.environment.max_smoke == 0 {
            return Err(BattleError::Config("max_smoke must be positive".into()));
        }
        if self.environment.burn_damage_min > self.environment.burn_damage_max {
            return Err(BattleError::Config(format!(
                "burn_damage_min ({}) should be <= burn_damage_max ({})",
                self.environment.burn_damage_min, self.environment.burn_damage_max
            )));
        }
        Ok(())
    }
}

/// Load a named config from `data/{name}.toml`
pub fn load_config(name: &str) -> Result<BattleConfig> {
    BattleConfig::load_from_file(&config_path(name))
}

fn config_path(name: &str) -> PathBuf {
    PathBuf::from("data").join(format!("{}.toml", name))
}
