//! Saving and loading a battle in progress
//!
//! A save is a serde document written as JSON. Tiles are stored either as
//! verbose records or packed into a byte blob described by a
//! `TileSerializationKey`. Loading runs in two phases: every unit and item
//! is instantiated first, then owners, ammo and bodies are linked by id.
//! Records pointing at something that did not load are logged and skipped.

use ahash::{AHashMap, AHashSet};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::sync::Arc;

use crate::battle::battle_map::TileGrid;
use crate::battle::constants::AMMO_SLOT_MAX;
use crate::battle::execution::{BattleEventLog, BattleState};
use crate::battle::items::{BattleItem, ItemOwner};
use crate::battle::nodes::Node;
use crate::battle::rules::Ruleset;
use crate::battle::terrain::{MapDataSet, SpecialTileType, TerrainRef};
use crate::battle::tile::Tile;
use crate::battle::units::{BattleUnit, Faction, UnitStatus};
use crate::core::config::{BattleConfig, ChronoTrigger};
use crate::core::error::{BattleError, Result};
use crate::core::types::{Direction, ItemId, NodeId, Position, Turn, UnitId, MAX_SOLDIER_ID};

/// Campaign-side source of soldiers taking part in a battle
pub trait PersonnelRoster {
    /// Persistent record of a soldier, if the campaign still has it
    fn soldier(&self, id: UnitId) -> Option<BattleUnit>;
}

/// In-memory roster
#[derive(Debug, Clone, Default)]
pub struct SoldierRoster {
    soldiers: AHashMap<UnitId, BattleUnit>,
}

impl SoldierRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, soldier: BattleUnit) {
        self.soldiers.insert(soldier.id, soldier);
    }
}

impl PersonnelRoster for SoldierRoster {
    fn soldier(&self, id: UnitId) -> Option<BattleUnit> {
        self.soldiers.get(&id).cloned()
    }
}

// === Tiles ===

/// One tile written out in full
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileRecord {
    pub index: usize,
    pub parts: [Option<TerrainRef>; 4],
    pub fire: u8,
    pub smoke: u8,
    pub discovered: [bool; 3],
}

/// Byte widths of each field in a packed tile record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TileSerializationKey {
    pub index: u8,
    pub terrain_set: u8,
    pub terrain_id: u8,
    pub fire: u8,
    pub smoke: u8,
    pub flags: u8,
}

impl TileSerializationKey {
    /// Narrowest key able to address every tile of the grid
    pub fn for_grid(grid: &TileGrid) -> Self {
        let index = match grid.len() {
            0..=0xFF => 1,
            0x100..=0xFFFF => 2,
            _ => 4,
        };
        Self {
            index,
            terrain_set: 2,
            terrain_id: 2,
            fire: 1,
            smoke: 1,
            flags: 1,
        }
    }

    pub fn record_size(&self) -> usize {
        self.index as usize
            + 4 * (self.terrain_set as usize + self.terrain_id as usize)
            + self.fire as usize
            + self.smoke as usize
            + self.flags as usize
    }
}

/// Stored tiles, in either encoding
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", rename_all = "snake_case")]
pub enum TileData {
    Verbose { tiles: Vec<TileRecord> },
    Binary { key: TileSerializationKey, count: usize, data: Vec<u8> },
}

fn write_uint(buf: &mut Vec<u8>, value: u64, width: u8) {
    buf.extend_from_slice(&value.to_le_bytes()[..width as usize]);
}

fn read_uint(bytes: &[u8], offset: &mut usize, width: u8) -> u64 {
    let mut raw = [0u8; 8];
    let width = width as usize;
    raw[..width].copy_from_slice(&bytes[*offset..*offset + width]);
    *offset += width;
    u64::from_le_bytes(raw)
}

fn max_for(width: u8) -> u64 {
    if width >= 8 {
        u64::MAX
    } else {
        (1u64 << (8 * width as u32)) - 1
    }
}

impl TileRecord {
    fn from_tile(index: usize, tile: &Tile) -> Option<Self> {
        let blank = tile.parts.iter().all(Option::is_none)
            && tile.fire == 0
            && tile.smoke == 0
            && !tile.discovered.iter().any(|&d| d);
        if blank {
            return None;
        }
        Some(Self {
            index,
            parts: tile.parts,
            fire: tile.fire,
            smoke: tile.smoke,
            discovered: tile.discovered,
        })
    }

    fn apply(&self, tile: &mut Tile) {
        tile.parts = self.parts;
        tile.fire = self.fire;
        tile.smoke = self.smoke;
        tile.discovered = self.discovered;
    }

    fn pack(&self, key: &TileSerializationKey, buf: &mut Vec<u8>) {
        write_uint(buf, self.index as u64, key.index);
        for part in &self.parts {
            match part {
                Some(terrain) => {
                    write_uint(buf, terrain.set as u64, key.terrain_set);
                    write_uint(buf, terrain.id as u64, key.terrain_id);
                }
                None => {
                    write_uint(buf, max_for(key.terrain_set), key.terrain_set);
                    write_uint(buf, max_for(key.terrain_id), key.terrain_id);
                }
            }
        }
        write_uint(buf, self.fire as u64, key.fire);
        write_uint(buf, self.smoke as u64, key.smoke);
        let flags = self
            .discovered
            .iter()
            .enumerate()
            .fold(0u64, |acc, (bit, &d)| acc | ((d as u64) << bit));
        write_uint(buf, flags, key.flags);
    }

    fn unpack(key: &TileSerializationKey, bytes: &[u8], offset: &mut usize) -> Self {
        let index = read_uint(bytes, offset, key.index) as usize;
        let mut parts = [None; 4];
        for part in parts.iter_mut() {
            let set = read_uint(bytes, offset, key.terrain_set);
            let id = read_uint(bytes, offset, key.terrain_id);
            if set != max_for(key.terrain_set) {
                *part = Some(TerrainRef::new(set as u16, id as u16));
            }
        }
        let fire = read_uint(bytes, offset, key.fire) as u8;
        let smoke = read_uint(bytes, offset, key.smoke) as u8;
        let flags = read_uint(bytes, offset, key.flags);
        let mut discovered = [false; 3];
        for (bit, d) in discovered.iter_mut().enumerate() {
            *d = flags & (1 << bit) != 0;
        }
        Self {
            index,
            parts,
            fire,
            smoke,
            discovered,
        }
    }
}

impl TileData {
    fn capture(grid: &TileGrid, binary: bool) -> Self {
        let records: Vec<TileRecord> = grid
            .tiles()
            .iter()
            .enumerate()
            .filter_map(|(i, t)| TileRecord::from_tile(i, t))
            .collect();
        if !binary {
            return TileData::Verbose { tiles: records };
        }
        let key = TileSerializationKey::for_grid(grid);
        let mut data = Vec::with_capacity(records.len() * key.record_size());
        for record in &records {
            record.pack(&key, &mut data);
        }
        TileData::Binary {
            key,
            count: records.len(),
            data,
        }
    }

    fn records(&self) -> Vec<TileRecord> {
        match self {
            TileData::Verbose { tiles } => tiles.clone(),
            TileData::Binary { key, count, data } => {
                let size = key.record_size();
                let available = if size == 0 { 0 } else { data.len() / size };
                if available < *count {
                    tracing::warn!(count, available, "Tile blob is truncated");
                }
                let mut offset = 0;
                (0..(*count).min(available))
                    .map(|_| TileRecord::unpack(key, data, &mut offset))
                    .collect()
            }
        }
    }
}

// === Units and items ===

/// Battle state of a unit; identity comes from the roster or a template
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnitRecord {
    pub id: UnitId,
    pub name: String,
    pub template: Option<String>,
    pub faction: Faction,
    pub original_faction: Faction,
    pub status: UnitStatus,
    pub rank: u8,
    pub position: Position,
    pub direction: Direction,
    pub health: i32,
    pub stun: i32,
    pub tu: i32,
    pub energy: i32,
    pub fatal_wounds: i32,
    pub fire_turns: u8,
    pub panicking: bool,
    pub visible: bool,
    pub turns_since_spotted: u8,
    pub turns_left_spotted_for_snipers: u8,
    pub dont_reselect: bool,
    pub ai_target_node: Option<NodeId>,
}

impl UnitRecord {
    fn capture(unit: &BattleUnit) -> Self {
        Self {
            id: unit.id,
            name: unit.name.clone(),
            template: unit.template.clone(),
            faction: unit.faction,
            original_faction: unit.original_faction,
            status: unit.status,
            rank: unit.rank,
            position: unit.position,
            direction: unit.direction,
            health: unit.health,
            stun: unit.stun,
            tu: unit.tu,
            energy: unit.energy,
            fatal_wounds: unit.fatal_wounds,
            fire_turns: unit.fire_turns,
            panicking: unit.panicking,
            visible: unit.visible,
            turns_since_spotted: unit.turns_since_spotted,
            turns_left_spotted_for_snipers: unit.turns_left_spotted_for_snipers,
            dont_reselect: unit.dont_reselect,
            ai_target_node: unit.ai_target_node,
        }
    }

    fn apply(&self, unit: &mut BattleUnit) {
        unit.faction = self.faction;
        unit.original_faction = self.original_faction;
        unit.status = self.status;
        unit.rank = self.rank;
        unit.position = self.position;
        unit.direction = self.direction;
        unit.health = self.health;
        unit.stun = self.stun;
        unit.tu = self.tu;
        unit.energy = self.energy;
        unit.fatal_wounds = self.fatal_wounds;
        unit.fire_turns = self.fire_turns;
        unit.panicking = self.panicking;
        unit.visible = self.visible;
        unit.turns_since_spotted = self.turns_since_spotted;
        unit.turns_left_spotted_for_snipers = self.turns_left_spotted_for_snipers;
        unit.dont_reselect = self.dont_reselect;
        unit.ai_target_node = self.ai_target_node;
        unit.inventory.clear();
    }
}

/// An item and the ids it points at
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    pub id: ItemId,
    pub rule: String,
    pub owner: ItemOwner,
    pub previous_owner: Option<UnitId>,
    pub ammo_slots: [Option<ItemId>; AMMO_SLOT_MAX],
    pub ammo_quantity: i32,
    pub represented_unit: Option<UnitId>,
    pub fuse_timer: Option<i32>,
    pub player_property: bool,
    /// Built-in weapon that cannot be dropped
    #[serde(default)]
    pub fixed: bool,
}

impl ItemRecord {
    fn capture(item: &BattleItem) -> Self {
        Self {
            id: item.id,
            rule: item.rule.clone(),
            owner: item.owner,
            previous_owner: item.previous_owner,
            ammo_slots: item.ammo_slots,
            ammo_quantity: item.ammo_quantity,
            represented_unit: item.represented_unit,
            fuse_timer: item.fuse_timer,
            player_property: item.player_property,
            fixed: item.fixed,
        }
    }
}

/// RNG position, so a loaded battle rolls the same dice
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngState {
    pub seed: [u8; 32],
    pub stream: u64,
    pub word_pos_hi: u64,
    pub word_pos_lo: u64,
}

impl RngState {
    fn capture(rng: &ChaCha8Rng) -> Self {
        let pos = rng.get_word_pos();
        Self {
            seed: rng.get_seed(),
            stream: rng.get_stream(),
            word_pos_hi: (pos >> 64) as u64,
            word_pos_lo: pos as u64,
        }
    }

    fn restore(&self) -> ChaCha8Rng {
        let mut rng = ChaCha8Rng::from_seed(self.seed);
        rng.set_stream(self.stream);
        rng.set_word_pos(((self.word_pos_hi as u128) << 64) | self.word_pos_lo as u128);
        rng
    }
}

/// Complete saved battle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BattleSave {
    pub size_x: i32,
    pub size_y: i32,
    pub size_z: i32,
    pub map_data_sets: Vec<String>,
    pub tiles: TileData,
    pub nodes: Vec<Node>,
    pub units: Vec<UnitRecord>,
    pub items: Vec<ItemRecord>,

    pub config: BattleConfig,
    pub rng: RngState,
    pub turn: Turn,
    pub side: Faction,
    pub cheating: bool,
    pub selected: Option<UnitId>,
    pub last_selected: Option<UnitId>,
    pub objective_type: SpecialTileType,
    pub objectives_needed: u32,
    pub objectives_destroyed: u32,
    pub aborted: bool,
    pub chrono_result: Option<ChronoTrigger>,
    pub before_game: bool,
    #[serde(default)]
    pub battle_log: BattleEventLog,
}

impl BattleSave {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn write_to_file(&self, path: &Path) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    pub fn read_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }
}

impl BattleState {
    /// Capture the battle; `binary_tiles` packs tiles into a byte blob
    pub fn save(&self, binary_tiles: bool) -> BattleSave {
        BattleSave {
            size_x: self.map.size_x,
            size_y: self.map.size_y,
            size_z: self.map.size_z,
            map_data_sets: self.map.data_sets.iter().map(|s| s.name.clone()).collect(),
            tiles: TileData::capture(&self.map, binary_tiles),
            nodes: self.nodes.clone(),
            units: self.units.iter().map(UnitRecord::capture).collect(),
            items: self.items.iter().map(ItemRecord::capture).collect(),
            config: self.config.clone(),
            rng: RngState::capture(&self.rng),
            turn: self.turn,
            side: self.side,
            cheating: self.cheating,
            selected: self.selected,
            last_selected: self.last_selected,
            objective_type: self.objective_type,
            objectives_needed: self.objectives_needed,
            objectives_destroyed: self.objectives_destroyed,
            aborted: self.aborted,
            chrono_result: self.chrono_result,
            before_game: self.before_game,
            battle_log: self.battle_log.clone(),
        }
    }

    /// Rebuild a battle from a save.
    ///
    /// `data_sets` must contain every terrain set the save names. Units and
    /// items that cannot be rebuilt are dropped with a warning.
    pub fn load(
        save: BattleSave,
        rules: Arc<Ruleset>,
        data_sets: &[MapDataSet],
        roster: &dyn PersonnelRoster,
    ) -> Result<BattleState> {
        let mut sets = Vec::with_capacity(save.map_data_sets.len());
        for name in &save.map_data_sets {
            let set = data_sets
                .iter()
                .find(|s| &s.name == name)
                .ok_or_else(|| BattleError::Config(format!("missing terrain set '{}'", name)))?;
            sets.push(set.clone());
        }

        let mut map = TileGrid::new(save.size_x, save.size_y, save.size_z, sets);
        for record in save.tiles.records() {
            if record.index >= map.len() {
                tracing::warn!(index = record.index, "Tile record outside the map");
                continue;
            }
            let pos = map.position_of(record.index);
            if let Some(tile) = map.get_tile_mut(pos) {
                record.apply(tile);
            }
        }

        let mut battle = BattleState::new(map, Arc::clone(&rules), save.config.clone());
        battle.nodes = save.nodes;

        // Phase 1: instantiate
        for record in &save.units {
            let base = if record.id.0 < MAX_SOLDIER_ID {
                roster.soldier(record.id)
            } else {
                record
                    .template
                    .as_deref()
                    .and_then(|name| rules.unit_template(name))
                    .map(|t| BattleUnit::from_template(record.id, t, record.original_faction))
            };
            let Some(mut unit) = base else {
                tracing::warn!(unit = record.id.0, template = ?record.template, "Unit could not be rebuilt, skipping");
                continue;
            };
            record.apply(&mut unit);
            unit.name = record.name.clone();
            if let Some(node) = unit.ai_target_node {
                if node.0 >= battle.nodes.len() {
                    tracing::warn!(unit = record.id.0, node = node.0, "Unknown target node");
                    unit.ai_target_node = None;
                }
            }
            battle.units.add(unit);
        }

        let mut loaded = Vec::with_capacity(save.items.len());
        for record in &save.items {
            let Some(rule) = rules.item(&record.rule) else {
                tracing::warn!(item = record.id.0, rule = %record.rule, "Unknown item rule, skipping");
                continue;
            };
            let mut item = BattleItem::new(record.id, rule);
            item.ammo_quantity = record.ammo_quantity;
            item.fuse_timer = record.fuse_timer;
            item.player_property = record.player_property;
            item.fixed |= record.fixed;
            battle.items.insert(item);
            loaded.push(record);
        }

        // Phase 2: link
        let orphans = battle.orphaned_items(&loaded);
        for &id in &orphans {
            tracing::warn!(item = id.0, "Item holder did not load, dropping item");
            battle.items.rollback(id);
        }
        loaded.retain(|record| !orphans.contains(&record.id));
        for record in loaded {
            battle.link_loaded_item(record);
        }

        battle.rng = save.rng.restore();
        battle.turn = save.turn;
        battle.side = save.side;
        battle.cheating = save.cheating;
        battle.selected = save.selected.filter(|&id| battle.units.contains(id));
        battle.last_selected = save.last_selected.filter(|&id| battle.units.contains(id));
        battle.objective_type = save.objective_type;
        battle.objectives_needed = save.objectives_needed;
        battle.objectives_destroyed = save.objectives_destroyed;
        battle.aborted = save.aborted;
        battle.chrono_result = save.chrono_result;
        battle.battle_log = save.battle_log;
        battle.reset_unit_tiles();
        battle.before_game = save.before_game;

        tracing::info!(
            units = battle.units.len(),
            items = battle.items.len(),
            turn = battle.turn,
            "Battle loaded"
        );
        Ok(battle)
    }

    /// Loaded items whose holder is gone, plus any clips they carried
    fn orphaned_items(&self, records: &[&ItemRecord]) -> AHashSet<ItemId> {
        let present: AHashSet<ItemId> = records.iter().map(|r| r.id).collect();
        let mut orphans: AHashSet<ItemId> = records
            .iter()
            .filter(|r| match r.owner {
                ItemOwner::Unit(unit) => !self.units.contains(unit),
                ItemOwner::Tile(pos) => self.map.get_tile(pos).is_none(),
                ItemOwner::Weapon(weapon) => !present.contains(&weapon),
                ItemOwner::None => false,
            })
            .map(|r| r.id)
            .collect();
        let clips: Vec<ItemId> = records
            .iter()
            .filter(|r| matches!(r.owner, ItemOwner::Weapon(weapon) if orphans.contains(&weapon)))
            .map(|r| r.id)
            .collect();
        orphans.extend(clips);
        orphans
    }

    fn link_loaded_item(&mut self, record: &ItemRecord) {
        let id = record.id;
        let owner = match record.owner {
            ItemOwner::Unit(unit) => match self.units.get_mut(unit) {
                Some(u) => {
                    u.inventory.push(id);
                    ItemOwner::Unit(unit)
                }
                None => {
                    tracing::warn!(item = id.0, unit = unit.0, "Item owner did not load");
                    ItemOwner::None
                }
            },
            ItemOwner::Tile(pos) => match self.map.get_tile_mut(pos) {
                Some(tile) => {
                    tile.items.push(id);
                    ItemOwner::Tile(pos)
                }
                None => {
                    tracing::warn!(item = id.0, ?pos, "Item tile is off the map");
                    ItemOwner::None
                }
            },
            // linked from the weapon's side
            ItemOwner::Weapon(_) | ItemOwner::None => ItemOwner::None,
        };

        let mut slots = [None; AMMO_SLOT_MAX];
        for (slot, clip) in record.ammo_slots.iter().enumerate() {
            let Some(clip) = *clip else {
                continue;
            };
            match self.items.get_mut(clip) {
                Some(ammo) => {
                    ammo.owner = ItemOwner::Weapon(id);
                    slots[slot] = Some(clip);
                }
                None => tracing::warn!(weapon = id.0, clip = clip.0, "Loaded ammo did not load"),
            }
        }

        let represented = record.represented_unit.filter(|&u| {
            let known = self.units.contains(u);
            if !known {
                tracing::warn!(item = id.0, unit = u.0, "Body item for a unit that did not load");
            }
            known
        });
        let previous = record.previous_owner.filter(|&u| self.units.contains(u));

        if let Some(item) = self.items.get_mut(id) {
            if !owner.is_none() || item.owner.is_none() {
                item.owner = owner;
            }
            item.ammo_slots = slots;
            item.represented_unit = represented;
            item.previous_owner = previous;
        }
    }
}
