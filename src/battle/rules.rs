//! Item and unit rules, loaded from TOML
//!
//! Loads from `data/{name}.toml`. Rules are shared read-only by every
//! battle built from them.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::battle::constants::DEFAULT_CAPACITY;
use crate::core::error::{BattleError, Result};

/// What an item does in battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BattleType {
    #[default]
    None,
    Firearm,
    Ammo,
    Melee,
    Grenade,
    ProximityGrenade,
    Medikit,
    Scanner,
    PsiAmp,
    Flare,
    Corpse,
}

impl BattleType {
    /// Can hold ammo in its slots
    pub fn takes_ammo(&self) -> bool {
        matches!(self, BattleType::Firearm | BattleType::Melee)
    }
}

/// How a unit gets around
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    #[default]
    Walk,
    Fly,
}

/// Rule for one item type
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ItemRule {
    pub name: String,
    #[serde(default)]
    pub battle_type: BattleType,
    #[serde(default = "default_true")]
    pub recoverable: bool,
    /// Score for bringing one home
    #[serde(default)]
    pub recovery_points: i32,
    /// Rounds in a full clip (ammo only)
    #[serde(default)]
    pub clip_size: i32,
    /// Ammo rule names this weapon accepts
    #[serde(default)]
    pub compatible_ammo: Vec<String>,
    /// Built into a unit; never dropped or recovered
    #[serde(default)]
    pub fixed: bool,
}

fn default_true() -> bool {
    true
}

impl ItemRule {
    pub fn new(name: &str, battle_type: BattleType) -> Self {
        Self {
            name: name.to_string(),
            battle_type,
            recoverable: true,
            recovery_points: 0,
            clip_size: 0,
            compatible_ammo: Vec::new(),
            fixed: false,
        }
    }

    pub fn with_clip_size(mut self, clip_size: i32) -> Self {
        self.clip_size = clip_size;
        self
    }

    pub fn with_ammo(mut self, ammo: &[&str]) -> Self {
        self.compatible_ammo = ammo.iter().map(|a| a.to_string()).collect();
        self
    }

    pub fn with_recovery_points(mut self, points: i32) -> Self {
        self.recovery_points = points;
        self
    }

    pub fn fixed(mut self) -> Self {
        self.fixed = true;
        self
    }

    pub fn accepts_ammo(&self, ammo: &str) -> bool {
        self.compatible_ammo.iter().any(|a| a == ammo)
    }
}

/// Base stats a unit starts the battle with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaseStats {
    pub tu: i32,
    pub stamina: i32,
    pub health: i32,
    #[serde(default)]
    pub bravery: i32,
}

impl Default for BaseStats {
    fn default() -> Self {
        Self {
            tu: 60,
            stamina: 60,
            health: 35,
            bravery: 50,
        }
    }
}

/// Template for generated (non-personnel) units
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitTemplate {
    pub name: String,
    /// Footprint edge length
    #[serde(default = "default_size")]
    pub size: i32,
    #[serde(default)]
    pub movement: MovementType,
    #[serde(default)]
    pub rank: u8,
    #[serde(default)]
    pub stats: BaseStats,
    #[serde(default = "default_capacity")]
    pub capacity: usize,
    /// Damage multipliers
    #[serde(default = "default_modifier")]
    pub fire_modifier: f32,
    #[serde(default = "default_modifier")]
    pub smoke_modifier: f32,
    /// Body item per footprint cell, in footprint order
    #[serde(default)]
    pub corpse_items: Vec<String>,
    /// Built-in weapons and their ammo
    #[serde(default)]
    pub fixed_items: Vec<String>,
    /// Score for killing or capturing one
    #[serde(default)]
    pub value: i32,
}

fn default_size() -> i32 {
    1
}

fn default_capacity() -> usize {
    DEFAULT_CAPACITY
}

fn default_modifier() -> f32 {
    1.0
}

impl UnitTemplate {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            size: 1,
            movement: MovementType::Walk,
            rank: 0,
            stats: BaseStats::default(),
            capacity: DEFAULT_CAPACITY,
            fire_modifier: 1.0,
            smoke_modifier: 1.0,
            corpse_items: Vec::new(),
            fixed_items: Vec::new(),
            value: 0,
        }
    }
}

/// On-disk layout of a ruleset file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RulesetFile {
    #[serde(default)]
    items: Vec<ItemRule>,
    #[serde(default)]
    units: Vec<UnitTemplate>,
}

/// Indexed item and unit rules
#[derive(Debug, Clone, Default)]
pub struct Ruleset {
    items: AHashMap<String, ItemRule>,
    units: AHashMap<String, UnitTemplate>,
}

impl Ruleset {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse_toml(content: &str) -> Result<Self> {
        let file: RulesetFile = toml::from_str(content)?;
        let mut rules = Self::new();
        for item in file.items {
            rules.add_item(item);
        }
        for unit in file.units {
            rules.add_unit_template(unit);
        }
        rules.validate()?;
        Ok(rules)
    }

    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Every ammo and corpse reference must name a known item
    pub fn validate(&self) -> Result<()> {
        for item in self.items.values() {
            for ammo in &item.compatible_ammo {
                if !self.items.contains_key(ammo) {
                    return Err(BattleError::Config(format!(
                        "{} accepts unknown ammo {}",
                        item.name, ammo
                    )));
                }
            }
        }
        for unit in self.units.values() {
            if unit.size < 1 {
                return Err(BattleError::Config(format!("{} has size {}", unit.name, unit.size)));
            }
            for name in unit.corpse_items.iter().chain(unit.fixed_items.iter()) {
                if !self.items.contains_key(name) {
                    return Err(BattleError::UnknownItemRule(name.clone()));
                }
            }
        }
        Ok(())
    }

    pub fn add_item(&mut self, rule: ItemRule) {
        self.items.insert(rule.name.clone(), rule);
    }

    pub fn add_unit_template(&mut self, template: UnitTemplate) {
        self.units.insert(template.name.clone(), template);
    }

    pub fn item(&self, name: &str) -> Option<&ItemRule> {
        self.items.get(name)
    }

    /// Look up an item rule, failing on unknown names
    pub fn require_item(&self, name: &str) -> Result<&ItemRule> {
        self.items
            .get(name)
            .ok_or_else(|| BattleError::UnknownItemRule(name.to_string()))
    }

    pub fn unit_template(&self, name: &str) -> Option<&UnitTemplate> {
        self.units.get(name)
    }

    pub fn item_count(&self) -> usize {
        self.items.len()
    }
}

/// Load a named ruleset from `data/{name}.toml`
pub fn load_ruleset(name: &str) -> Result<Ruleset> {
    Ruleset::load_from_file(&ruleset_path(name))
}

fn ruleset_path(name: &str) -> PathBuf {
    PathBuf::from("data").join(format!("{}.toml", name))
}
