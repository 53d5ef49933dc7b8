//! Battle system integration tests

use std::sync::Arc;

use battlescape::battle::*;
use battlescape::core::config::BattleConfig;
use battlescape::core::{BattleError, Position, UnitId};

const GRASS: TerrainRef = TerrainRef { set: 0, id: 0 };
const CONCRETE: TerrainRef = TerrainRef { set: 0, id: 1 };
const WALL: TerrainRef = TerrainRef { set: 0, id: 2 };

fn terrain() -> MapDataSet {
    let mut set = MapDataSet::new("test");
    set.push(MapData::new("grass", TilePart::Floor).with_fire(0, 3).with_armor(10));
    set.push(MapData::new("concrete", TilePart::Floor));
    set.push(MapData::new("wall", TilePart::WestWall));
    set
}

fn rules() -> Ruleset {
    let mut rules = Ruleset::new();
    rules.add_item(ItemRule::new("rifle", BattleType::Firearm).with_ammo(&["rifle_clip"]));
    rules.add_item(ItemRule::new("rifle_clip", BattleType::Ammo).with_clip_size(20));
    rules.add_item(ItemRule::new("soldier_corpse", BattleType::Corpse));
    rules
}

fn battle_with(x: i32, y: i32, floor: TerrainRef, seed: u64) -> BattleState {
    let mut map = TileGrid::new(x, y, 1, vec![terrain()]);
    for tile in map.tiles_mut() {
        tile.set_part(TilePart::Floor, Some(floor));
    }
    let config = BattleConfig {
        seed,
        ..BattleConfig::default()
    };
    BattleState::new(map, Arc::new(rules()), config)
}

fn soldier(battle: &mut BattleState, id: i32, pos: Position) -> UnitId {
    let mut unit = BattleUnit::new(UnitId(id), &format!("soldier {}", id), Faction::Player);
    unit.corpse_items = vec!["soldier_corpse".to_string()];
    let id = battle.add_unit(unit);
    assert!(battle.set_unit_position(id, pos, false));
    id
}

fn knock_out(battle: &mut BattleState, id: UnitId) {
    if let Some(unit) = battle.units.get_mut(id) {
        unit.damage(100, DamageKind::Stun);
    }
    battle.check_for_casualties();
}

#[test]
fn test_large_unit_footprint_round_trip() {
    let mut battle = battle_with(6, 6, CONCRETE, 0);
    let big = battle.add_unit(BattleUnit::new(UnitId(1_000_000), "reaper", Faction::Hostile).with_size(2));
    assert!(battle.set_unit_position(big, Position::new(2, 2, 0), false));

    let footprint = battle.unit(big).expect("unit").footprint();
    assert_eq!(footprint.len(), 4);
    for cell in &footprint {
        assert_eq!(battle.unit_at(*cell).map(|u| u.id), Some(big));
    }

    // nobody else can squeeze into the footprint
    let small = battle.add_unit(BattleUnit::new(UnitId(1), "s", Faction::Player));
    for cell in &footprint {
        assert!(!battle.set_unit_position(small, *cell, false));
    }

    assert!(battle.set_unit_position(big, Position::new(4, 4, 0), false));
    for cell in &footprint {
        assert!(battle.map.get_tile(*cell).and_then(|t| t.unit).is_none());
    }
    assert!(battle.occupancy_consistent());
}

#[test]
fn test_dry_run_placement_changes_nothing() {
    let mut battle = battle_with(5, 5, CONCRETE, 0);
    let id = soldier(&mut battle, 1, Position::new(0, 0, 0));
    let tiles_before = battle.map.tiles().to_vec();
    let target = Position::new(3, 3, 0);

    let first = battle.set_unit_position(id, target, true);
    let second = battle.set_unit_position(id, target, true);
    assert!(first);
    assert_eq!(first, second);
    assert_eq!(battle.map.tiles(), tiles_before.as_slice());
    assert_eq!(battle.unit(id).map(|u| u.position).ok(), Some(Position::new(0, 0, 0)));

    // out of bounds fails the same way twice
    let far = Position::new(9, 9, 0);
    assert!(!battle.set_unit_position(id, far, true));
    assert!(!battle.set_unit_position(id, far, true));
}

#[test]
fn test_end_turn_skips_empty_sides_in_one_call() {
    let mut battle = battle_with(4, 4, CONCRETE, 0);
    soldier(&mut battle, 1, Position::new(0, 0, 0));
    battle.reset_turn_counter();
    battle.reset_unit_tiles();

    for expected_turn in 2..6 {
        let report = battle.end_turn();
        assert_eq!(report.side, Faction::Player);
        assert_eq!(report.turn, expected_turn);
        assert_eq!(report.skipped, vec![Faction::Hostile, Faction::Neutral]);
        assert!(report.environment.is_some());
    }
}

#[test]
fn test_end_turn_on_empty_battle_still_advances() {
    let mut battle = battle_with(3, 3, CONCRETE, 0);
    battle.reset_turn_counter();
    let report = battle.end_turn();
    assert_eq!(report.side, Faction::Player);
    assert_eq!(battle.turn(), 2);
}

#[test]
fn test_fire_spreads_only_across_open_edges() {
    let run = |walled: bool| {
        let mut battle = battle_with(10, 10, CONCRETE, 3);
        let source = Position::new(5, 5, 0);
        let east = Position::new(6, 5, 0);
        for pos in [source, east] {
            battle.map.set_part(pos, TilePart::Floor, Some(GRASS)).expect("in bounds");
        }
        if walled {
            battle.map.set_part(east, TilePart::WestWall, Some(WALL)).expect("in bounds");
        }
        if let Some(tile) = battle.map.get_tile_mut(source) {
            tile.fire = 3;
            // enough smoke for a certain ignition roll
            tile.smoke = 85;
        }
        let (ignited, _) = battle.propagate_fire(&battle.burning_tiles());
        let east = battle.map.index(east).expect("in bounds");
        ignited.contains(&east)
    };
    assert!(run(false));
    assert!(!run(true));
}

#[test]
fn test_fire_burns_out_after_three_cycles() {
    let mut battle = battle_with(10, 10, CONCRETE, 5);
    let source = Position::new(5, 5, 0);
    battle.map.set_part(source, TilePart::Floor, Some(GRASS)).expect("in bounds");
    let mut unit = BattleUnit::new(UnitId(1), "asbestos", Faction::Player);
    unit.fire_modifier = 0.0;
    let id = battle.add_unit(unit);
    assert!(battle.set_unit_position(id, source, false));
    if let Some(tile) = battle.map.get_tile_mut(source) {
        tile.fire = 3;
        tile.smoke = 10;
    }
    battle.reset_turn_counter();
    battle.reset_unit_tiles();

    for remaining in [2, 1] {
        battle.end_turn();
        assert_eq!(battle.map.get_tile(source).map(|t| t.fire), Some(remaining));
    }
    let report = battle.end_turn();
    let environment = report.environment.expect("new cycle");
    assert_eq!(environment.burned_out, vec![source]);

    let tile = battle.map.get_tile(source).expect("tile");
    assert_eq!(tile.fire, 0);
    assert_eq!(tile.smoke, 0);
    assert!(tile.part(TilePart::Floor).is_none());
    assert_eq!(
        battle
            .battle_log
            .count(|e| matches!(e, BattleEventType::TerrainDestroyed { .. })),
        1
    );
    assert_eq!(battle.unit(id).map(|u| u.status).ok(), Some(UnitStatus::Standing));
}

#[test]
fn test_spawn_node_picks_among_best_priority() {
    let mut seen = std::collections::BTreeSet::new();
    for seed in 0..40 {
        let mut battle = battle_with(10, 10, CONCRETE, seed);
        battle.nodes = vec![
            Node::new(0, Position::new(1, 1, 0)).with_rank(2).with_priority(3),
            Node::new(1, Position::new(5, 1, 0)).with_rank(2).with_priority(5),
            Node::new(2, Position::new(8, 8, 0)).with_rank(2).with_priority(5),
            Node::new(3, Position::new(4, 4, 0)).with_rank(1).with_priority(9),
        ];
        let unit = battle.add_unit(BattleUnit::new(UnitId(1_000_000), "a", Faction::Hostile));
        let node = battle.get_spawn_node(2, unit).expect("a node");
        seen.insert(node.0);
    }
    assert_eq!(seen.into_iter().collect::<Vec<_>>(), vec![1, 2]);
}

#[test]
fn test_revive_needs_room() {
    // open field: the unit gets back up and its body goes away
    let mut open = battle_with(5, 5, CONCRETE, 0);
    let id = soldier(&mut open, 1, Position::new(2, 2, 0));
    knock_out(&mut open, id);
    assert_eq!(open.items.iter().filter(|i| i.represented_unit == Some(id)).count(), 1);
    if let Some(unit) = open.units.get_mut(id) {
        unit.stun = 0;
    }
    assert_eq!(open.revive_unconscious_units(false), vec![id]);
    assert_eq!(open.unit(id).map(|u| u.status).ok(), Some(UnitStatus::Standing));
    assert_eq!(open.items.iter().filter(|i| i.represented_unit == Some(id)).count(), 0);

    // every cell taken: the unit stays down and keeps its body
    let mut packed = battle_with(3, 3, CONCRETE, 0);
    let id = soldier(&mut packed, 1, Position::new(1, 1, 0));
    knock_out(&mut packed, id);
    let mut next = 10;
    for x in 0..3 {
        for y in 0..3 {
            soldier(&mut packed, next, Position::new(x, y, 0));
            next += 1;
        }
    }
    if let Some(unit) = packed.units.get_mut(id) {
        unit.stun = 0;
    }
    assert!(packed.revive_unconscious_units(false).is_empty());
    assert_eq!(packed.unit(id).map(|u| u.status).ok(), Some(UnitStatus::Unconscious));
    assert_eq!(packed.items.iter().filter(|i| i.represented_unit == Some(id)).count(), 1);
}

#[test]
fn test_item_cannot_have_two_owners() {
    let mut battle = battle_with(4, 4, CONCRETE, 0);
    let id = soldier(&mut battle, 1, Position::new(0, 0, 0));
    let pos = Position::new(2, 2, 0);
    let rifle = battle.create_item_for_tile("rifle", pos).expect("rifle");

    let result = battle.attach_item(rifle, ItemOwner::Unit(id));
    assert!(matches!(result, Err(BattleError::AlreadyOwned(_))));
    assert!(battle.unit(id).map(|u| u.inventory.is_empty()).unwrap_or(false));
    assert_eq!(battle.map.get_tile(pos).map(|t| t.items.clone()), Some(vec![rifle]));

    // moving hands it over in one step
    battle.move_item(rifle, ItemOwner::Unit(id)).expect("move");
    assert!(battle.map.get_tile(pos).map(|t| t.items.is_empty()).unwrap_or(false));
    assert_eq!(battle.unit(id).map(|u| u.inventory.clone()).ok(), Some(vec![rifle]));

    battle.remove_item(rifle).expect("remove");
    assert!(battle.unit(id).map(|u| u.inventory.is_empty()).unwrap_or(false));
    assert!(battle.items.is_deleted(rifle));
}

#[test]
fn test_saved_battle_continues_identically() {
    let setup = || {
        let mut battle = battle_with(8, 8, GRASS, 21);
        let id = soldier(&mut battle, 1, Position::new(0, 0, 0));
        let rifle = battle.create_item_for_unit("rifle", id).expect("rifle");
        let clip = battle.create_item_for_unit("rifle_clip", id).expect("clip");
        battle.load_ammo(rifle, 0, clip).expect("load");
        battle.start_fire(Position::new(4, 4, 0));
        battle.reset_turn_counter();
        battle.reset_unit_tiles();
        battle.end_turn();
        battle
    };

    let mut original = setup();
    let save = original.save(true);
    let json = save.to_json().expect("serialize");

    let mut roster = SoldierRoster::new();
    roster.add(BattleUnit::new(UnitId(1), "soldier 1", Faction::Player));
    let mut restored = BattleState::load(
        BattleSave::from_json(&json).expect("parse"),
        Arc::new(rules()),
        &[terrain()],
        &roster,
    )
    .expect("load");

    assert_eq!(restored.turn(), original.turn());
    assert_eq!(restored.map.tiles(), original.map.tiles());
    assert_eq!(restored.items.len(), original.items.len());

    for _ in 0..3 {
        let a = original.end_turn();
        let b = restored.end_turn();
        assert_eq!(a.environment, b.environment);
    }
    assert_eq!(restored.map.tiles(), original.map.tiles());
    let health = |b: &BattleState| b.unit(UnitId(1)).map(|u| u.health).ok();
    assert_eq!(health(&restored), health(&original));
}

#[test]
fn test_teardown_after_fight() {
    let mut battle = battle_with(6, 6, CONCRETE, 0);
    let id = soldier(&mut battle, 1, Position::new(0, 0, 0));
    battle.create_item_for_unit("rifle", id).expect("rifle");
    let alien = battle.add_unit(BattleUnit::new(UnitId(1_000_000), "a", Faction::Hostile));
    assert!(battle.set_unit_position(alien, Position::new(5, 5, 0), false));
    battle.reset_turn_counter();
    battle.reset_unit_tiles();

    battle.end_turn();
    assert_eq!(battle.side(), Faction::Hostile);
    if let Some(unit) = battle.units.get_mut(alien) {
        unit.damage(200, DamageKind::Normal);
    }
    battle.end_turn();
    assert!(battle.is_victory());

    let summary = battle
        .teardown(MissionTarget::MissionSite {
            name: "Farm".into(),
            deployment: "terror".into(),
        })
        .expect("summary");
    assert!(summary.victory);
    assert!(summary.fates.contains(&(alien, UnitFate::Dead)));
    assert_eq!(summary.storage.item_count("rifle"), 1);
    assert_eq!(summary.stats.get("mission_site_cleared").map(|s| s.qty), Some(1));
    assert!(battle.teardown(MissionTarget::BaseDefense { base: "HQ".into() }).is_none());
}
