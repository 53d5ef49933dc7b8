//! Headless Battle Runner
//!
//! Plays out a seeded skirmish on a generated map and prints a JSON summary.
//! Shooting is a crude stand-in; the point is to drive turns, fire, smoke,
//! casualties and recovery end to end.

use std::path::PathBuf;
use std::sync::Arc;

use battlescape::battle::{
    load_ruleset, BattleState, BattleSummary, BattleUnit, DamageKind, Faction, MapData, MapDataSet,
    MissionTarget, Node, TerrainRef, TileGrid, TilePart,
};
use battlescape::core::config::load_config;
use battlescape::core::{Position, Result, UnitId};
use clap::Parser;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::Serialize;

/// Headless Battle Runner - seeded skirmish with JSON output
#[derive(Parser, Debug)]
#[command(name = "battle_runner")]
#[command(about = "Run a headless seeded battle and print a JSON summary")]
struct Args {
    /// Config name (loaded from data/{name}.toml)
    #[arg(long, default_value = "battle_config")]
    config: String,

    /// Ruleset name (loaded from data/{name}.toml)
    #[arg(long, default_value = "ruleset")]
    ruleset: String,

    /// Map width in tiles
    #[arg(long, default_value_t = 30)]
    width: i32,

    /// Map length in tiles
    #[arg(long, default_value_t = 30)]
    length: i32,

    /// Number of full turns to play at most
    #[arg(long, default_value_t = 20)]
    turns: u32,

    #[arg(long, default_value_t = 6)]
    soldiers: usize,

    /// Hostile unit template to field
    #[arg(long, default_value = "sectoid")]
    alien: String,

    #[arg(long, default_value_t = 6)]
    aliens: usize,

    #[arg(long, default_value_t = 4)]
    civilians: usize,

    /// Tiles set alight before the first turn
    #[arg(long, default_value_t = 3)]
    fires: usize,

    /// Random seed, overrides the config
    #[arg(long)]
    seed: Option<u64>,

    /// Write a save file here when done
    #[arg(long)]
    save: Option<PathBuf>,

    /// Pack tiles into the binary encoding when saving
    #[arg(long)]
    binary_tiles: bool,

    /// Print each turn's events to stderr
    #[arg(long, short = 'v')]
    verbose: bool,
}

/// JSON output structure
#[derive(Serialize)]
struct RunResult {
    seed: u64,
    turns_played: u32,
    events: usize,
    tiles_ignited: usize,
    tiles_burned_out: usize,
    summary: BattleSummary,
}

const GRASS: TerrainRef = TerrainRef { set: 0, id: 0 };
const DIRT: TerrainRef = TerrainRef { set: 0, id: 1 };
const CRATE: TerrainRef = TerrainRef { set: 0, id: 2 };

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let args = Args::parse();

    let mut config = load_config(&args.config)?;
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    let seed = config.seed;
    let rules = Arc::new(load_ruleset(&args.ruleset)?);
    // Separate stream for the stand-in shooting so the battle RNG is untouched
    let mut dice = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));

    let map = build_map(args.width, args.length, &mut dice);
    let mut battle = BattleState::new(map, rules, config);
    battle.nodes = build_nodes(args.width, args.length, battle.rules.unit_template(&args.alien).map(|t| t.rank).unwrap_or(0));

    deploy(&mut battle, &args, &mut dice)?;
    tracing::info!(seed, units = battle.units.len(), "Battle deployed");

    let mut tiles_ignited = 0;
    let mut tiles_burned_out = 0;
    for _ in 0..args.fires {
        let pos = Position::new(dice.gen_range(0..args.width), dice.gen_range(0..args.length), 0);
        if battle.start_fire(pos) {
            tiles_ignited += 1;
        }
    }

    while battle.turn() <= args.turns && !battle.aborted && !battle_over(&battle) {
        let events_before = battle.battle_log.events.len();
        match battle.side() {
            Faction::Player => exchange_fire(&mut battle, Faction::Player, &mut dice),
            Faction::Hostile => {
                patrol(&mut battle);
                exchange_fire(&mut battle, Faction::Hostile, &mut dice);
            }
            Faction::Neutral => {}
        }
        let report = battle.end_turn();
        if let Some(env) = &report.environment {
            tiles_ignited += env.ignited.len();
            tiles_burned_out += env.burned_out.len();
        }
        if args.verbose {
            for event in battle.battle_log.events.iter().skip(events_before) {
                eprintln!("  [{}] {:?}: {}", event.turn, event.event_type, event.description);
            }
        }
    }

    if let Some(path) = &args.save {
        battle.save(args.binary_tiles).write_to_file(path)?;
        tracing::info!(path = %path.display(), "Battle saved");
    }

    let turns_played = battle.turn();
    let events = battle.battle_log.events.len();
    let target = MissionTarget::Ufo {
        name: "Small Scout".to_string(),
        landed: true,
    };
    let Some(summary) = battle.teardown(target) else {
        return Ok(());
    };

    let result = RunResult {
        seed,
        turns_played,
        events,
        tiles_ignited,
        tiles_burned_out,
        summary,
    };
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn battle_over(battle: &BattleState) -> bool {
    let (hostiles, players) = battle.tally_units();
    hostiles == 0 || players == 0
}

/// Single-layer field of grass and dirt with a scattering of crates
fn build_map(width: i32, length: i32, dice: &mut ChaCha8Rng) -> TileGrid {
    let mut set = MapDataSet::new("farm");
    set.push(MapData::new("grass", TilePart::Floor).with_fire(30, 4).with_armor(10));
    set.push(MapData::new("dirt", TilePart::Floor));
    set.push(MapData::new("crate", TilePart::Object).with_fire(20, 5).with_armor(20));

    let mut map = TileGrid::new(width, length, 1, vec![set]);
    for tile in map.tiles_mut() {
        let floor = if dice.gen_bool(0.7) { GRASS } else { DIRT };
        tile.set_part(TilePart::Floor, Some(floor));
        // keep the deployment edges clear
        if tile.position.x > 2 && tile.position.x < width - 3 && dice.gen_bool(0.08) {
            tile.set_part(TilePart::Object, Some(CRATE));
        }
    }
    map
}

/// Linked grid of spawn and patrol nodes over the east half
fn build_nodes(width: i32, length: i32, rank: u8) -> Vec<Node> {
    let step = 5;
    let columns: Vec<i32> = (width / 2..width).step_by(step as usize).collect();
    let rows: Vec<i32> = (2..length).step_by(step as usize).collect();
    let mut nodes = Vec::new();
    for (ci, &x) in columns.iter().enumerate() {
        for (ri, &y) in rows.iter().enumerate() {
            let id = nodes.len();
            let mut links = Vec::new();
            if ci > 0 {
                links.push((id - rows.len()) as i32);
            }
            if ci + 1 < columns.len() {
                links.push((id + rows.len()) as i32);
            }
            if ri > 0 {
                links.push(id as i32 - 1);
            }
            if ri + 1 < rows.len() {
                links.push(id as i32 + 1);
            }
            nodes.push(
                Node::new(id, Position::new(x, y, 0))
                    .with_rank(rank)
                    .with_priority(1 + (ci + ri) as u8 % 5)
                    .with_flags((ci % 3) as u8 + 1)
                    .with_links(&links),
            );
        }
    }
    nodes
}

fn deploy(battle: &mut BattleState, args: &Args, dice: &mut ChaCha8Rng) -> Result<()> {
    for i in 0..args.soldiers {
        let mut soldier = BattleUnit::new(UnitId(i as i32 + 1), &format!("Soldier {}", i + 1), Faction::Player)
            .with_rank((i % 6) as u8);
        soldier.corpse_items = vec!["soldier_corpse".to_string()];
        soldier.value = 20;
        let id = battle.add_unit(soldier);
        let rifle = battle.create_item_for_unit("rifle", id)?;
        let clip = battle.create_item_for_unit("rifle_clip", id)?;
        battle.load_ammo(rifle, 0, clip)?;
        for id in [rifle, clip] {
            if let Some(item) = battle.items.get_mut(id) {
                item.player_property = true;
            }
        }
        let entry = Position::new(1, (i as i32 * 2 + 1).min(args.length - 1), 0);
        if !battle.place_unit_near_position(id, entry, false) {
            tracing::warn!(unit = id.0, "No room for soldier");
        }
    }

    let centre = Position::new(args.width * 3 / 4, args.length / 2, 0);
    for _ in 0..args.aliens {
        let id = battle.spawn_unit(&args.alien, Faction::Hostile, centre)?;
        let rank = battle.unit(id)?.rank;
        if let Some(node) = battle.get_spawn_node(rank, id) {
            let pos = battle.nodes.get(node.0).map(|n| n.position).unwrap_or(centre);
            if battle.set_unit_position(id, pos, false) {
                if let Ok(unit) = battle.unit_mut(id) {
                    unit.ai_target_node = Some(node);
                }
            }
        }
    }

    for _ in 0..args.civilians {
        let pos = Position::new(dice.gen_range(0..args.width), dice.gen_range(0..args.length), 0);
        battle.spawn_unit("civilian", Faction::Neutral, pos)?;
    }

    battle.reset_turn_counter();
    battle.reset_unit_tiles();
    battle.recalculate_vision();
    Ok(())
}

/// Move each hostile on to its next patrol node
fn patrol(battle: &mut BattleState) {
    let hostiles: Vec<UnitId> = battle
        .units
        .iter()
        .filter(|u| u.faction == Faction::Hostile && !u.is_out() && u.is_on_grid())
        .map(|u| u.id)
        .collect();
    for (n, id) in hostiles.into_iter().enumerate() {
        let from = battle.units.get(id).and_then(|u| u.ai_target_node);
        let Some(node) = battle.get_patrol_node(n % 3 == 0, id, from) else {
            continue;
        };
        let Some(pos) = battle.nodes.get(node.0).map(|n| n.position) else {
            continue;
        };
        if battle.set_unit_position(id, pos, false) {
            if let Some(unit) = battle.units.get_mut(id) {
                unit.ai_target_node = Some(node);
            }
        }
    }
}

/// Everyone on `side` with a target in view takes a shot
fn exchange_fire(battle: &mut BattleState, side: Faction, dice: &mut ChaCha8Rng) {
    let shooters: Vec<(UnitId, Vec<UnitId>)> = battle
        .units
        .iter()
        .filter(|u| u.faction == side && !u.is_out() && u.is_on_grid())
        .map(|u| (u.id, u.visible_units.clone()))
        .collect();
    for (shooter, seen) in shooters {
        let targets: Vec<UnitId> = seen
            .into_iter()
            .filter(|&t| battle.units.get(t).map(|u| u.faction != side && !u.is_out()).unwrap_or(false))
            .collect();
        let Some(&target) = targets.choose(dice) else {
            continue;
        };
        if !dice.gen_bool(0.45) {
            continue;
        }
        let amount = dice.gen_range(10..=30);
        if let Some(unit) = battle.units.get_mut(target) {
            if unit.damage(amount, DamageKind::Normal) {
                tracing::debug!(shooter = shooter.0, target = target.0, "Target down");
            }
        }
    }
    battle.check_for_casualties();
}
