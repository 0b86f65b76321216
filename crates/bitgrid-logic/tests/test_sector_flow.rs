//! Integration tests across the logic modules.
//!
//! Exercises: Catalog → Sector generation → Economy on the generated grid
//! → Arena on the same grid.
//!
//! All tests are pure logic: no storage, no timers, no rendering.

use std::collections::HashSet;

use bitgrid_logic::arena::{Arena, ArenaMap, ArenaPhase, CellKind, StepOutcome};
use bitgrid_logic::catalog::{BuildingKind, Catalog, GameRules};
use bitgrid_logic::constants::{names, GRID_CELLS, STORAGE_CAPACITY_PER_LEVEL};
use bitgrid_logic::economy::{
    collect, move_building, place, production_tick, remaining_allowance, total_storage_capacity,
    BaseState,
};
use bitgrid_logic::grid::Grid;
use bitgrid_logic::sector::{generate, SectorRng};

// ── Helpers ────────────────────────────────────────────────────────────

fn sector_ids() -> impl Iterator<Item = String> {
    (1..=300).map(|n| n.to_string())
}

fn kind_count(grid: &Grid, catalog: &Catalog, kind: BuildingKind) -> usize {
    grid.cells_of_kind(catalog, kind).len()
}

// ── Sector generation ──────────────────────────────────────────────────

#[test]
fn generation_is_deterministic_across_calls() {
    let catalog = Catalog::standard();
    for id in sector_ids().take(50) {
        let a = generate(&id, &catalog);
        let b = generate(&id, &catalog);
        assert_eq!(a.grid, b.grid, "sector {id} grid differs");
        assert_eq!(a.initial_bits, b.initial_bits, "sector {id} fill differs");
    }
}

#[test]
fn generation_respects_building_limits() {
    let catalog = Catalog::standard();
    for id in sector_ids() {
        let sector = generate(&id, &catalog);
        let grid = &sector.grid;
        assert_eq!(kind_count(grid, &catalog, BuildingKind::Hub), 1, "sector {id}");
        let storages = kind_count(grid, &catalog, BuildingKind::Storage);
        assert!((1..=2).contains(&storages), "sector {id}: {storages} storages");
        let mines = kind_count(grid, &catalog, BuildingKind::Producer);
        assert!((1..=2).contains(&mines), "sector {id}: {mines} mines");
        assert!(kind_count(grid, &catalog, BuildingKind::Lab) <= 1);
        assert!(kind_count(grid, &catalog, BuildingKind::Portal) <= 1);

        let placed = GRID_CELLS - grid.vacant_cells(&catalog).len();
        assert_eq!(
            placed,
            1 + storages
                + mines
                + kind_count(grid, &catalog, BuildingKind::Lab)
                + kind_count(grid, &catalog, BuildingKind::Portal),
            "sector {id}: overlapping placements"
        );
    }
}

#[test]
fn generation_fill_within_bounds() {
    let catalog = Catalog::standard();
    for id in sector_ids() {
        let sector = generate(&id, &catalog);
        let capacity = total_storage_capacity(&sector.grid, &catalog);
        assert!(capacity >= STORAGE_CAPACITY_PER_LEVEL);
        assert!(sector.initial_bits < capacity.min(2000));
    }
}

#[test]
fn different_ids_produce_variation() {
    let catalog = Catalog::standard();
    let layouts: HashSet<Grid> = sector_ids()
        .take(50)
        .map(|id| generate(&id, &catalog).grid)
        .collect();
    assert!(
        layouts.len() > 40,
        "50 sectors produced only {} distinct layouts",
        layouts.len()
    );
}

#[test]
fn optional_buildings_are_rare_but_present() {
    let catalog = Catalog::standard();
    let labs = sector_ids()
        .filter(|id| kind_count(&generate(id, &catalog).grid, &catalog, BuildingKind::Lab) > 0)
        .count();
    // 10% of 300 is 30; allow generous slack.
    assert!((5..=80).contains(&labs), "{labs} labs in 300 sectors");
}

// ── Economy scenarios ──────────────────────────────────────────────────

#[test]
fn capacity_invariant_holds_through_ticks_and_collects() {
    let rules = GameRules::standard();
    let catalog = &rules.catalog;
    let mut state = BaseState::new(Grid::starter(catalog), 0);
    let mine = catalog.code_of(names::BIT_MINE, 2).unwrap();
    state.grid.set(0, mine);
    state.grid.set(63, mine);

    let capacity = total_storage_capacity(&state.grid, catalog);
    for second in 0..400 {
        production_tick(&mut state, catalog);
        if second % 7 == 0 {
            let _ = collect(&mut state, 0, capacity);
        }
        assert!(state.bits + state.pending_total() <= capacity);
    }
    assert_eq!(state.bits + state.pending_total(), capacity);
}

#[test]
fn buy_then_move_keeps_yield() {
    let rules = GameRules::standard();
    let catalog = &rules.catalog;
    let mut state = BaseState::starter(catalog);

    let hub = state.grid.hub_level(catalog);
    let allowance = remaining_allowance(&state.grid, &rules, hub)[names::BIT_MINE];
    place(&mut state, catalog, 10, names::BIT_MINE, 500, allowance).unwrap();
    state.bits = 0;
    for _ in 0..12 {
        production_tick(&mut state, catalog);
    }
    assert_eq!(state.uncollected[&10], 120);

    move_building(&mut state, catalog, 10, 11).unwrap();
    assert_eq!(state.uncollected[&11], 120);
    assert!(!state.uncollected.contains_key(&10));
}

// ── Arena on generated sectors ─────────────────────────────────────────

#[test]
fn arena_builds_on_every_generated_sector() {
    let catalog = Catalog::standard();
    let mut rng = SectorRng::new(2024);
    for id in sector_ids().take(100) {
        let sector = generate(&id, &catalog);
        let map = ArenaMap::from_grid(&sector.grid, &catalog);
        let arena = Arena::new(map, &mut rng).unwrap();
        let p = arena.player().position.cell().unwrap();
        let o = arena.opponent().position.cell().unwrap();
        assert_ne!(p, o);
        assert_eq!(arena.map().kind_of_cell(p), Some(CellKind::Open));
        assert_eq!(arena.map().kind_of_cell(o), Some(CellKind::Open));
    }
}

#[test]
fn arena_sessions_always_terminate() {
    let catalog = Catalog::standard();
    let mut rng = SectorRng::new(7);
    for id in sector_ids().take(50) {
        let sector = generate(&id, &catalog);
        let mut arena = Arena::new(ArenaMap::from_grid(&sector.grid, &catalog), &mut rng).unwrap();
        arena.start();
        // 256 lattice points: the player's trail fills them within 256 steps.
        let mut steps = 0;
        while !arena.phase().is_terminal() {
            arena.step();
            steps += 1;
            assert!(steps <= 256, "sector {id} never ended");
        }
    }
}

#[test]
fn boxed_opponent_dies_then_player_wins() {
    let catalog = Catalog::standard();
    let mut grid = Grid::empty();
    let mine = catalog.code_of(names::BIT_MINE, 1).unwrap();
    grid.set(6, mine); // row 0, col 6
    grid.set(15, mine); // row 1, col 7
    grid.set(59, catalog.code_of(names::GRID_HALL, 1).unwrap()); // row 7, col 3
    let map = ArenaMap::from_grid(&grid, &catalog);

    let mut arena = Arena::with_starts(map, 56, 7).unwrap();
    arena.start();

    let outcomes: Vec<StepOutcome> = (0..6).map(|_| arena.step()).collect();
    assert_eq!(
        outcomes,
        vec![
            StepOutcome::Continued,
            StepOutcome::Continued,
            StepOutcome::Continued,
            StepOutcome::OpponentDown,
            StepOutcome::Continued,
            StepOutcome::Won,
        ]
    );
    assert_eq!(arena.phase(), ArenaPhase::Won);
    assert!(arena.opponent().trail.is_empty());
    assert_eq!(arena.step(), StepOutcome::Idle);
}
