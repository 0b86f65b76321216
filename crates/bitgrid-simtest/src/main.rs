//! BitGrid Headless Simulation Harness
//!
//! Validates the game rules, sector generator, arena, and session engine
//! without any UI. Runs entirely in-process with an in-memory store.
//!
//! Usage:
//!   cargo run -p bitgrid-simtest
//!   cargo run -p bitgrid-simtest -- --verbose

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use bitgrid_core::engine::GameEngine;
use bitgrid_core::persistence::{keys, MemoryStore};
use bitgrid_logic::arena::{Arena, ArenaMap, ArenaPhase, LossReason, StepOutcome};
use bitgrid_logic::catalog::{AllowancePolicy, BuildingKind, Catalog, GameRules};
use bitgrid_logic::constants::{names, GRID_CELLS, STARTER_HUB_INDEX, STARTER_STORAGE_INDEX};
use bitgrid_logic::economy::{self, BaseState};
use bitgrid_logic::grid::Grid;
use bitgrid_logic::sector::{self, SectorRng};

// ── Rule set (shipped JSON) ─────────────────────────────────────────────
const RULES_JSON: &str = include_str!("../../../data/rules.json");

// ── Test harness ────────────────────────────────────────────────────────

struct TestResult {
    name: String,
    passed: bool,
    detail: String,
}

fn main() {
    let verbose = std::env::args().any(|a| a == "--verbose");
    println!("=== BitGrid Simulation Harness ===\n");

    let mut results = Vec::new();

    // 1. Shipped rule file
    results.extend(validate_rules_file(verbose));

    // 2. Economy scenarios
    results.extend(validate_economy_logic(verbose));

    // 3. Sector generation sweep
    results.extend(validate_sector_generation(verbose));

    // 4. Arena sweep
    results.extend(validate_arena(verbose));

    // 5. Session engine
    results.extend(validate_engine(verbose));

    // ── Summary ──
    println!();
    let passed = results.iter().filter(|r| r.passed).count();
    let failed = results.iter().filter(|r| !r.passed).count();
    let total = results.len();

    for r in &results {
        let icon = if r.passed { "✓" } else { "✗" };
        if !r.passed || verbose {
            println!("  {} {}: {}", icon, r.name, r.detail);
        }
    }

    println!(
        "\n=== RESULT: {}/{} passed, {} failed ===",
        passed, total, failed
    );

    if failed > 0 {
        std::process::exit(1);
    }
}

// ── 1. Rule File ────────────────────────────────────────────────────────

fn validate_rules_file(verbose: bool) -> Vec<TestResult> {
    println!("--- Rule File ---");
    let mut results = Vec::new();

    let loaded: GameRules = match serde_json::from_str(RULES_JSON) {
        Ok(r) => r,
        Err(e) => {
            results.push(TestResult {
                name: "rules_parse".into(),
                passed: false,
                detail: format!("JSON parse error: {}", e),
            });
            return results;
        }
    };
    results.push(TestResult {
        name: "rules_parse".into(),
        passed: true,
        detail: format!("{} catalog entries", loaded.catalog.len()),
    });

    let standard = GameRules::standard();

    // Same code for every registered pair
    let mismatched: Vec<String> = standard
        .catalog
        .iter()
        .filter(|(code, def)| loaded.catalog.code_of(&def.name, def.level) != Some(*code))
        .map(|(_, def)| format!("{}@{}", def.name, def.level))
        .collect();
    results.push(TestResult {
        name: "rules_codes_match_builtin".into(),
        passed: mismatched.is_empty() && loaded.catalog.len() == standard.catalog.len(),
        detail: if mismatched.is_empty() {
            "all codes identical".into()
        } else {
            format!("mismatched: {:?}", mismatched)
        },
    });

    // Prices
    let price_diffs: Vec<&str> = names::ALL
        .iter()
        .copied()
        .filter(|&n| {
            loaded.prices.purchase_price(n) != standard.prices.purchase_price(n)
                || (1..=3).any(|l| {
                    loaded.prices.upgrade_cost(n, l) != standard.prices.upgrade_cost(n, l)
                })
        })
        .collect();
    results.push(TestResult {
        name: "rules_prices_match_builtin".into(),
        passed: price_diffs.is_empty(),
        detail: format!("{} buildings differ {:?}", price_diffs.len(), price_diffs),
    });

    // Allowances at every hub level, both policies
    let mut allowance_diffs = 0;
    for policy in [AllowancePolicy::HighestTier, AllowancePolicy::Cumulative] {
        let a = loaded.clone().with_policy(policy);
        let b = standard.clone().with_policy(policy);
        for hub in 0..=4 {
            for name in names::ALL {
                if a.allowed_count(name, hub) != b.allowed_count(name, hub)
                    || a.level_cap(name, hub) != b.level_cap(name, hub)
                {
                    allowance_diffs += 1;
                    if verbose {
                        println!("    {:?} hub {} {} differs", policy, hub, name);
                    }
                }
            }
        }
    }
    results.push(TestResult {
        name: "rules_allowances_match_builtin".into(),
        passed: allowance_diffs == 0,
        detail: format!("{} allowance differences", allowance_diffs),
    });

    // Hub tier only ever grows allowances
    let monotone = names::ALL.iter().all(|&name| {
        (1..3).all(|hub| standard.allowed_count(name, hub) <= standard.allowed_count(name, hub + 1))
    });
    results.push(TestResult {
        name: "rules_tiers_monotone".into(),
        passed: monotone,
        detail: "higher hub never allows fewer buildings".into(),
    });

    results
}

// ── 2. Economy Scenarios ────────────────────────────────────────────────

fn scenario_base(catalog: &Catalog) -> BaseState {
    let mut state = BaseState::new(Grid::empty(), 0);
    state.grid.set(
        STARTER_HUB_INDEX,
        catalog.code_of(names::GRID_HALL, 1).unwrap_or_default(),
    );
    state.grid.set(
        STARTER_STORAGE_INDEX,
        catalog.code_of(names::BIT_STORAGE, 1).unwrap_or_default(),
    );
    state
}

fn validate_economy_logic(_verbose: bool) -> Vec<TestResult> {
    println!("--- Economy ---");
    let mut results = Vec::new();
    let rules = GameRules::standard();
    let catalog = &rules.catalog;

    // One mine filling one storage
    let mut state = scenario_base(catalog);
    state
        .grid
        .set(10, catalog.code_of(names::BIT_MINE, 1).unwrap_or_default());
    economy::production_tick(&mut state, catalog);
    let after_one = state.uncollected.get(&10).copied().unwrap_or(0);
    results.push(TestResult {
        name: "economy_single_tick".into(),
        passed: after_one == 10,
        detail: format!("L1 mine after 1s → {} pending", after_one),
    });

    economy::advance(&mut state, catalog, 199);
    let after_200 = state.uncollected.get(&10).copied().unwrap_or(0);
    let extra = economy::advance(&mut state, catalog, 50);
    results.push(TestResult {
        name: "economy_fills_to_capacity".into(),
        passed: after_200 == 2000 && extra == 0,
        detail: format!("after 200s → {}, 50 more seconds → +{}", after_200, extra),
    });

    // Grid order favoured under contention
    let mut state = scenario_base(catalog);
    state.bits = 1985;
    state
        .grid
        .set(40, catalog.code_of(names::BIT_MINE, 1).unwrap_or_default());
    state
        .grid
        .set(2, catalog.code_of(names::BIT_MINE, 2).unwrap_or_default());
    economy::production_tick(&mut state, catalog);
    results.push(TestResult {
        name: "economy_grid_order_contention".into(),
        passed: state.uncollected.get(&2) == Some(&15) && !state.uncollected.contains_key(&40),
        detail: format!("15 spare across two mines → {:?}", state.uncollected),
    });

    // Purchase then allowance exhaustion
    let mut state = scenario_base(catalog);
    state.bits = 1500;
    let first = economy::place(&mut state, catalog, 5, names::BIT_STORAGE, 1000, 1);
    let second = economy::place(&mut state, catalog, 6, names::BIT_STORAGE, 1000, 0);
    results.push(TestResult {
        name: "economy_place_then_no_allowance".into(),
        passed: first.is_ok() && second.is_err() && state.bits == 500,
        detail: format!("first {:?}, second {:?}, pool {}", first, second, state.bits),
    });

    // Invariant sweep: random collects over a long run
    let mut state = scenario_base(catalog);
    let mine = catalog.code_of(names::BIT_MINE, 3).unwrap_or_default();
    for i in [0, 9, 18] {
        state.grid.set(i, mine);
    }
    let capacity = economy::total_storage_capacity(&state.grid, catalog);
    let mut rng = SectorRng::new(77);
    let mut violations = 0;
    for _ in 0..2000 {
        economy::production_tick(&mut state, catalog);
        if rng.chance(0.3) {
            let index = [0, 9, 18][rng.below(3) as usize];
            let _ = economy::collect(&mut state, index, capacity);
        }
        if state.bits + state.pending_total() > capacity {
            violations += 1;
        }
    }
    results.push(TestResult {
        name: "economy_capacity_invariant".into(),
        passed: violations == 0,
        detail: format!("2000 ticks, {} violations", violations),
    });

    // Display fill levels
    let mut grid = Grid::empty();
    grid.set(0, catalog.code_of(names::BIT_STORAGE, 2).unwrap_or_default());
    grid.set(1, catalog.code_of(names::BIT_STORAGE, 1).unwrap_or_default());
    let fills = economy::storage_fill_levels(&grid, catalog, 3000);
    let expected: BTreeMap<usize, u8> = [(0, 1), (1, 4)].into_iter().collect();
    results.push(TestResult {
        name: "economy_fill_levels".into(),
        passed: fills == expected,
        detail: format!("3000 bits over L2+L1 storage → {:?}", fills),
    });

    results
}

// ── 3. Sector Generation ────────────────────────────────────────────────

fn validate_sector_generation(verbose: bool) -> Vec<TestResult> {
    println!("--- Sector Generation ---");
    let mut results = Vec::new();
    let catalog = Catalog::standard();

    let mut bad_counts = Vec::new();
    let mut bad_fill = Vec::new();
    let mut nondeterministic = 0;
    let mut labs = 0;
    let mut portals = 0;
    let mut level2 = 0;

    for n in 1..=1000 {
        let id = n.to_string();
        let s = sector::generate(&id, &catalog);
        let count = |kind| s.grid.cells_of_kind(&catalog, kind).len();

        let hubs = count(BuildingKind::Hub);
        let storages = count(BuildingKind::Storage);
        let mines = count(BuildingKind::Producer);
        let lab = count(BuildingKind::Lab);
        let portal = count(BuildingKind::Portal);
        let occupied = GRID_CELLS - s.grid.vacant_cells(&catalog).len();
        if hubs != 1
            || !(1..=2).contains(&storages)
            || !(1..=2).contains(&mines)
            || lab > 1
            || portal > 1
            || occupied != hubs + storages + mines + lab + portal
        {
            bad_counts.push(id.clone());
        }
        labs += lab;
        portals += portal;
        level2 += s
            .grid
            .codes()
            .iter()
            .filter(|&&c| catalog.level_of(c) == Some(2))
            .count();

        let capacity = economy::total_storage_capacity(&s.grid, &catalog);
        if s.initial_bits >= capacity.min(2000) {
            bad_fill.push(id.clone());
        }

        if sector::generate(&id, &catalog) != s {
            nondeterministic += 1;
        }
    }

    results.push(TestResult {
        name: "sector_building_limits".into(),
        passed: bad_counts.is_empty(),
        detail: format!("{} of 1000 sectors out of limits {:?}", bad_counts.len(), bad_counts),
    });
    results.push(TestResult {
        name: "sector_fill_bounds".into(),
        passed: bad_fill.is_empty(),
        detail: format!("{} of 1000 fills out of range", bad_fill.len()),
    });
    results.push(TestResult {
        name: "sector_deterministic".into(),
        passed: nondeterministic == 0,
        detail: format!("{} sectors regenerated differently", nondeterministic),
    });
    results.push(TestResult {
        name: "sector_optional_rates".into(),
        passed: (50..=150).contains(&labs) && (50..=150).contains(&portals),
        detail: format!("{} labs, {} portals in 1000 (expect ~100)", labs, portals),
    });
    if verbose {
        println!("    level-2 buildings across 1000 sectors: {}", level2);
    }

    let chain = ["1", "2", "9", "99", "abc"].map(sector::next_sector_id);
    results.push(TestResult {
        name: "sector_next_id".into(),
        passed: chain == ["2", "3", "10", "100", "1"],
        detail: format!("{:?}", chain),
    });

    results
}

// ── 4. Arena ────────────────────────────────────────────────────────────

fn validate_arena(verbose: bool) -> Vec<TestResult> {
    println!("--- Arena ---");
    let mut results = Vec::new();
    let catalog = Catalog::standard();
    let mut rng = SectorRng::new(4242);

    let mut outcomes: BTreeMap<String, u32> = BTreeMap::new();
    let mut never_ended = 0;
    let mut bad_starts = 0;
    let mut multi_win = 0;

    for n in 1..=200 {
        let s = sector::generate(&n.to_string(), &catalog);
        let map = ArenaMap::from_grid(&s.grid, &catalog);
        let mut arena = match Arena::new(map, &mut rng) {
            Ok(a) => a,
            Err(_) => {
                bad_starts += 1;
                continue;
            }
        };
        if arena.player().position == arena.opponent().position {
            bad_starts += 1;
        }
        arena.start();

        let mut wins = 0;
        let mut steps = 0;
        while !arena.phase().is_terminal() && steps < 300 {
            if arena.step() == StepOutcome::Won {
                wins += 1;
            }
            steps += 1;
        }
        for _ in 0..3 {
            if arena.step() == StepOutcome::Won {
                wins += 1;
            }
        }
        if !arena.phase().is_terminal() {
            never_ended += 1;
        }
        if wins > 1 {
            multi_win += 1;
        }
        *outcomes.entry(format!("{:?}", arena.phase())).or_default() += 1;
    }

    results.push(TestResult {
        name: "arena_starts_distinct".into(),
        passed: bad_starts == 0,
        detail: format!("{} bad starts in 200 sessions", bad_starts),
    });
    results.push(TestResult {
        name: "arena_always_terminates".into(),
        passed: never_ended == 0,
        detail: format!("{} sessions still running after 300 steps", never_ended),
    });
    results.push(TestResult {
        name: "arena_win_reported_once".into(),
        passed: multi_win == 0,
        detail: format!("{} sessions reported more than one win", multi_win),
    });
    if verbose {
        println!("    outcomes: {:?}", outcomes);
    }

    // Scripted: opponent boxed in, player reaches the hub
    let mut grid = Grid::empty();
    let mine = catalog.code_of(names::BIT_MINE, 1).unwrap_or_default();
    grid.set(6, mine);
    grid.set(15, mine);
    grid.set(59, catalog.code_of(names::GRID_HALL, 1).unwrap_or_default());
    let scripted = Arena::with_starts(ArenaMap::from_grid(&grid, &catalog), 56, 7).map(|mut a| {
        a.start();
        let outcomes: Vec<StepOutcome> = (0..6).map(|_| a.step()).collect();
        (outcomes, a.phase())
    });
    results.push(TestResult {
        name: "arena_scripted_win".into(),
        passed: matches!(&scripted, Ok((o, ArenaPhase::Won)) if o.last() == Some(&StepOutcome::Won)),
        detail: format!("{:?}", scripted),
    });

    // Scripted: player runs straight off the right edge
    let open = ArenaMap::from_grid(&Grid::empty(), &catalog);
    let off_edge = Arena::with_starts(open, 7, 0).map(|mut a| {
        a.start();
        a.step();
        a.step()
    });
    results.push(TestResult {
        name: "arena_out_of_bounds".into(),
        passed: off_edge == Ok(StepOutcome::Lost(LossReason::OutOfBounds)),
        detail: format!("{:?}", off_edge),
    });

    results
}

// ── 5. Session Engine ───────────────────────────────────────────────────

fn validate_engine(_verbose: bool) -> Vec<TestResult> {
    println!("--- Session Engine ---");
    let mut results = Vec::new();
    let rules = Arc::new(GameRules::standard());

    let mut engine = match GameEngine::open(MemoryStore::new(), rules.clone()) {
        Ok(e) => e,
        Err(e) => {
            results.push(TestResult {
                name: "engine_open".into(),
                passed: false,
                detail: format!("{}", e),
            });
            return results;
        }
    };
    results.push(TestResult {
        name: "engine_open_defaults".into(),
        passed: engine.state().bits == 2000 && engine.sector_id() == "1",
        detail: format!("{} bits, sector {}", engine.state().bits, engine.sector_id()),
    });

    let bought = engine.buy(10, names::BIT_MINE);
    let mut produced = 0;
    let frame = Duration::from_nanos(16_666_667);
    for _ in 0..600 {
        produced += engine.update(frame).map(|r| r.produced).unwrap_or(0);
    }
    results.push(TestResult {
        name: "engine_production_cadence".into(),
        passed: bought.is_ok() && produced == 100,
        detail: format!("10s of 60fps frames → {} bits", produced),
    });

    let collected = engine.collect(10);
    let saved_bits = engine.repository().load_bits().ok().flatten();
    results.push(TestResult {
        name: "engine_collect_persists".into(),
        passed: matches!(collected, Ok(100)) && saved_bits == Some(1600),
        detail: format!("collected {:?}, saved pool {:?}", collected.as_ref().ok(), saved_bits),
    });

    let mut corrupt = MemoryStore::new();
    corrupt.insert(keys::GRID, "[9,9]");
    corrupt.insert(keys::UNCOLLECTED, "nope");
    let fallback = GameEngine::open(corrupt, rules.clone());
    results.push(TestResult {
        name: "engine_corrupt_state_defaults".into(),
        passed: fallback
            .as_ref()
            .map(|e| e.state().grid == Grid::starter(&rules.catalog))
            .unwrap_or(false),
        detail: "malformed grid and yield map replaced by defaults".into(),
    });

    let mut buffer = Vec::new();
    let snapshot_ok = engine.save_snapshot(&mut buffer).is_ok();
    let restored = GameEngine::open(MemoryStore::new(), rules.clone()).and_then(|mut other| {
        other.restore_snapshot(&buffer[..])?;
        Ok(other.state() == engine.state())
    });
    results.push(TestResult {
        name: "engine_snapshot_roundtrip".into(),
        passed: snapshot_ok && matches!(restored, Ok(true)),
        detail: format!("{} byte snapshot", buffer.len()),
    });

    engine.dispose();
    let after = engine.update(Duration::from_secs(10)).map(|r| r.produced);
    results.push(TestResult {
        name: "engine_dispose_stops_ticks".into(),
        passed: matches!(after, Ok(0)),
        detail: format!("10s after dispose → {:?}", after),
    });

    results
}
