//! Battle units and the unit registry
//!
//! Units are created from campaign personnel or from ruleset templates.
//! Dead units stay in the registry as records for scoring.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::battle::constants::{DEFAULT_CAPACITY, MAX_TURNS_SINCE_SPOTTED, STUN_RECOVERY};
use crate::battle::rules::{BaseStats, MovementType, UnitTemplate};
use crate::core::types::{Direction, ItemId, NodeId, Position, UnitId, MAX_SOLDIER_ID};

/// The three sides of a battle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Faction {
    #[default]
    Player,
    Hostile,
    Neutral,
}

/// Unit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum UnitStatus {
    #[default]
    Standing,
    Walking,
    Kneeled,
    Aiming,
    /// Took lethal or stunning damage; resolved by the casualty check
    Collapsing,
    Unconscious,
    Dead,
    /// Out of play (e.g. left the map)
    IgnoreMe,
}

/// Damage channels that matter to the battle core
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DamageKind {
    Normal,
    Fire,
    Smoke,
    Stun,
}

/// A single combatant
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleUnit {
    pub id: UnitId,
    pub name: String,
    /// Ruleset template this unit was generated from
    pub template: Option<String>,
    pub faction: Faction,
    pub original_faction: Faction,
    pub status: UnitStatus,
    pub rank: u8,

    // Placement
    pub size: i32,
    pub movement: MovementType,
    pub position: Position,
    pub direction: Direction,

    // Vitals
    pub stats: BaseStats,
    pub health: i32,
    pub stun: i32,
    pub tu: i32,
    pub energy: i32,
    pub fatal_wounds: i32,
    /// Turns left burning
    pub fire_turns: u8,
    /// Already took fire damage during this environment pass
    pub hit_by_fire: bool,
    pub panicking: bool,

    // Inventory
    pub inventory: Vec<ItemId>,
    pub capacity: usize,
    /// Body item rule per footprint cell
    pub corpse_items: Vec<String>,
    pub fixed_items: Vec<String>,

    // Awareness
    pub visible: bool,
    pub visible_units: Vec<UnitId>,
    pub turns_since_spotted: u8,
    pub turns_left_spotted_for_snipers: u8,
    pub dont_reselect: bool,
    /// Patrol node this unit is heading for
    pub ai_target_node: Option<NodeId>,

    // Armor
    pub fire_modifier: f32,
    pub smoke_modifier: f32,

    /// Score for killing or capturing
    pub value: i32,
}

impl BattleUnit {
    pub fn new(id: UnitId, name: &str, faction: Faction) -> Self {
        let stats = BaseStats::default();
        Self {
            id,
            name: name.to_string(),
            template: None,
            faction,
            original_faction: faction,
            status: UnitStatus::Standing,
            rank: 0,
            size: 1,
            movement: MovementType::Walk,
            position: Position::OFF_GRID,
            direction: Direction::North,
            stats,
            health: stats.health,
            stun: 0,
            tu: stats.tu,
            energy: stats.stamina,
            fatal_wounds: 0,
            fire_turns: 0,
            hit_by_fire: false,
            panicking: false,
            inventory: Vec::new(),
            capacity: DEFAULT_CAPACITY,
            corpse_items: Vec::new(),
            fixed_items: Vec::new(),
            visible: false,
            visible_units: Vec::new(),
            turns_since_spotted: MAX_TURNS_SINCE_SPOTTED,
            turns_left_spotted_for_snipers: 0,
            dont_reselect: false,
            ai_target_node: None,
            fire_modifier: 1.0,
            smoke_modifier: 1.0,
            value: 0,
        }
    }

    /// Build a generated unit from a ruleset template
    pub fn from_template(id: UnitId, template: &UnitTemplate, faction: Faction) -> Self {
        let mut unit = Self::new(id, &template.name, faction);
        unit.template = Some(template.name.clone());
        unit.rank = template.rank;
        unit.size = template.size;
        unit.movement = template.movement;
        unit.stats = template.stats;
        unit.health = template.stats.health;
        unit.tu = template.stats.tu;
        unit.energy = template.stats.stamina;
        unit.capacity = template.capacity;
        unit.fire_modifier = template.fire_modifier;
        unit.smoke_modifier = template.smoke_modifier;
        unit.corpse_items = template.corpse_items.clone();
        unit.fixed_items = template.fixed_items.clone();
        unit.value = template.value;
        unit
    }

    pub fn with_size(mut self, size: i32) -> Self {
        self.size = size.max(1);
        self
    }

    pub fn with_rank(mut self, rank: u8) -> Self {
        self.rank = rank;
        self
    }

    pub fn with_movement(mut self, movement: MovementType) -> Self {
        self.movement = movement;
        self
    }

    pub fn is_soldier(&self) -> bool {
        self.id.0 < MAX_SOLDIER_ID
    }

    pub fn can_fly(&self) -> bool {
        self.movement == MovementType::Fly
    }

    pub fn is_large(&self) -> bool {
        self.size > 1
    }

    /// Dead, unconscious or out of play
    pub fn is_out(&self) -> bool {
        matches!(
            self.status,
            UnitStatus::Dead | UnitStatus::Unconscious | UnitStatus::IgnoreMe
        )
    }

    pub fn is_on_grid(&self) -> bool {
        !self.position.is_off_grid()
    }

    /// Can the side act with this unit right now?
    pub fn is_selectable(&self, side: Faction, check_reselect: bool, check_inventory: bool) -> bool {
        self.faction == side
            && !self.is_out()
            && (!check_reselect || !self.dont_reselect)
            && (!check_inventory || self.capacity > 0)
    }

    /// Cells covered when standing at `origin`
    pub fn footprint_at(&self, origin: Position) -> Vec<Position> {
        let mut cells = Vec::with_capacity((self.size * self.size) as usize);
        for x in 0..self.size {
            for y in 0..self.size {
                cells.push(Position::new(origin.x + x, origin.y + y, origin.z));
            }
        }
        cells
    }

    pub fn footprint(&self) -> Vec<Position> {
        if self.is_on_grid() {
            self.footprint_at(self.position)
        } else {
            Vec::new()
        }
    }

    /// Apply damage, returns true if the unit starts collapsing
    pub fn damage(&mut self, amount: i32, kind: DamageKind) -> bool {
        if self.is_out() || amount <= 0 {
            return false;
        }
        let scaled = match kind {
            DamageKind::Fire => (amount as f32 * self.fire_modifier) as i32,
            DamageKind::Smoke => (amount as f32 * self.smoke_modifier) as i32,
            DamageKind::Normal | DamageKind::Stun => amount,
        };
        match kind {
            DamageKind::Smoke | DamageKind::Stun => self.stun += scaled,
            DamageKind::Normal | DamageKind::Fire => self.health = (self.health - scaled).max(0),
        }
        if self.status != UnitStatus::Collapsing && (self.health == 0 || self.stun >= self.health) {
            self.status = UnitStatus::Collapsing;
            return true;
        }
        false
    }

    /// Start of this unit's side turn
    pub fn prepare_new_turn(&mut self) {
        if self.faction != self.original_faction {
            tracing::debug!(unit = self.id.0, "Mind control wears off");
            self.faction = self.original_faction;
        }
        self.tu = self.stats.tu;
        if !self.is_out() {
            self.energy = (self.energy + self.stats.tu / 3).min(self.stats.stamina);
        }
        self.recover_wounds_and_stun();
        self.hit_by_fire = false;
        self.dont_reselect = false;
        self.panicking = false;
    }

    /// Turn upkeep for units currently controlled by another side
    pub fn update_stats(&mut self) {
        self.recover_wounds_and_stun();
    }

    fn recover_wounds_and_stun(&mut self) {
        self.health = (self.health - self.fatal_wounds).max(0);
        if self.stun > 0 && (self.size == 1 || !self.is_out()) {
            self.stun = (self.stun - STUN_RECOVERY).max(0);
        }
    }

    pub fn convert_to_faction(&mut self, faction: Faction) {
        self.faction = faction;
    }

    pub fn bump_turns_since_spotted(&mut self) {
        if self.turns_since_spotted < MAX_TURNS_SINCE_SPOTTED {
            self.turns_since_spotted += 1;
        }
    }

    pub fn has_inventory_space(&self) -> bool {
        self.inventory.len() < self.capacity
    }
}

/// All units of the battle, in creation order
#[derive(Debug, Clone, Default)]
pub struct UnitRegistry {
    units: Vec<BattleUnit>,
    lookup: AHashMap<UnitId, usize>,
}

impl UnitRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a unit, replacing any previous record with the same id
    pub fn add(&mut self, unit: BattleUnit) {
        if let Some(&index) = self.lookup.get(&unit.id) {
            self.units[index] = unit;
            return;
        }
        self.lookup.insert(unit.id, self.units.len());
        self.units.push(unit);
    }

    pub fn get(&self, id: UnitId) -> Option<&BattleUnit> {
        self.lookup.get(&id).map(|&i| &self.units[i])
    }

    pub fn get_mut(&mut self, id: UnitId) -> Option<&mut BattleUnit> {
        match self.lookup.get(&id) {
            Some(&i) => Some(&mut self.units[i]),
            None => None,
        }
    }

    pub fn contains(&self, id: UnitId) -> bool {
        self.lookup.contains_key(&id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &BattleUnit> {
        self.units.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut BattleUnit> {
        self.units.iter_mut()
    }

    pub fn ids(&self) -> Vec<UnitId> {
        self.units.iter().map(|u| u.id).collect()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    /// Living units of a faction that are still in play
    pub fn count_live(&self, faction: Faction) -> usize {
        self.units
            .iter()
            .filter(|u| u.faction == faction && !u.is_out())
            .count()
    }

    /// Units that started on `faction` and are still in play, whoever
    /// controls them now
    pub fn count_live_original(&self, faction: Faction) -> usize {
        self.units
            .iter()
            .filter(|u| u.original_faction == faction && !u.is_out())
            .count()
    }

    /// Next free id for a generated unit
    pub fn next_generated_id(&self) -> UnitId {
        let highest = self
            .units
            .iter()
            .map(|u| u.id.0)
            .filter(|&id| id >= MAX_SOLDIER_ID)
            .max();
        UnitId(highest.map_or(MAX_SOLDIER_ID, |id| id + 1))
    }
}
