//! Fire and smoke passes must not care which source they visit first

use std::sync::Arc;

use battlescape::battle::*;
use battlescape::core::config::BattleConfig;
use proptest::prelude::*;

const SIZE_X: i32 = 6;
const SIZE_Y: i32 = 6;
const SIZE_Z: i32 = 2;
const CELLS: usize = (SIZE_X * SIZE_Y * SIZE_Z) as usize;

/// Per-tile setup: fire, smoke, floor kind, wall, crate
type Cell = (u8, u8, u8, bool, bool);

fn cell() -> impl Strategy<Value = Cell> {
    (0u8..4, 0u8..16, 0u8..3, prop::bool::weighted(0.15), prop::bool::weighted(0.1))
}

fn build(cells: &[Cell], seed: u64) -> BattleState {
    let mut set = MapDataSet::new("props");
    set.push(MapData::new("grass", TilePart::Floor).with_fire(10, 3).with_armor(10));
    set.push(MapData::new("concrete", TilePart::Floor));
    set.push(MapData::new("wall", TilePart::WestWall).with_fire(40, 2).with_armor(30));
    set.push(MapData::new("crate", TilePart::Object).with_fire(20, 5).with_armor(20));

    let mut map = TileGrid::new(SIZE_X, SIZE_Y, SIZE_Z, vec![set]);
    for (tile, &(fire, smoke, floor, wall, object)) in map.tiles_mut().iter_mut().zip(cells) {
        match floor {
            0 => tile.set_part(TilePart::Floor, Some(TerrainRef::new(0, 0))),
            1 => tile.set_part(TilePart::Floor, Some(TerrainRef::new(0, 1))),
            _ => {}
        }
        if wall {
            tile.set_part(TilePart::WestWall, Some(TerrainRef::new(0, 2)));
        }
        if object {
            tile.set_part(TilePart::Object, Some(TerrainRef::new(0, 3)));
        }
        tile.fire = fire;
        tile.smoke = smoke;
    }
    let config = BattleConfig {
        seed,
        ..BattleConfig::default()
    };
    BattleState::new(map, Arc::new(Ruleset::new()), config)
}

/// `sources` reordered to follow `order`
fn permuted(sources: &[usize], order: &[usize]) -> Vec<usize> {
    order.iter().copied().filter(|i| sources.contains(i)).collect()
}

proptest! {
    #[test]
    fn fire_pass_ignores_source_order(
        cells in prop::collection::vec(cell(), CELLS),
        order in Just((0..CELLS).collect::<Vec<usize>>()).prop_shuffle(),
        seed in any::<u64>(),
    ) {
        let mut forward = build(&cells, seed);
        let mut shuffled = build(&cells, seed);
        let sources = forward.burning_tiles();

        let a = forward.propagate_fire(&sources);
        let b = shuffled.propagate_fire(&permuted(&sources, &order));

        prop_assert_eq!(a, b);
        prop_assert_eq!(forward.map.tiles(), shuffled.map.tiles());
        prop_assert_eq!(forward.objectives_destroyed, shuffled.objectives_destroyed);
    }

    #[test]
    fn smoke_pass_ignores_source_order(
        cells in prop::collection::vec(cell(), CELLS),
        order in Just((0..CELLS).collect::<Vec<usize>>()).prop_shuffle(),
    ) {
        let mut forward = build(&cells, 0);
        let mut shuffled = build(&cells, 0);
        let sources = forward.smoky_tiles();

        forward.propagate_smoke(&sources);
        shuffled.propagate_smoke(&permuted(&sources, &order));

        prop_assert_eq!(forward.map.tiles(), shuffled.map.tiles());
    }

    #[test]
    fn duplicate_sources_change_nothing(
        cells in prop::collection::vec(cell(), CELLS),
        seed in any::<u64>(),
    ) {
        let mut once = build(&cells, seed);
        let mut twice = build(&cells, seed);
        let sources = once.burning_tiles();
        let doubled: Vec<usize> = sources.iter().chain(sources.iter()).copied().collect();

        once.propagate_fire(&sources);
        twice.propagate_fire(&doubled);

        prop_assert_eq!(once.map.tiles(), twice.map.tiles());
    }
}
