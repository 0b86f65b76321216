//! Integration tests for the session engine.
//!
//! Exercises: GameEngine → Repository → KeyValueStore, across reopen, with
//! both the in-memory and the on-disk store.

use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use bitgrid_core::engine::{EngineError, GameEngine};
use bitgrid_core::persistence::{keys, DirStore, KeyValueStore, MemoryStore, PersistError};
use bitgrid_logic::arena::{Arena, ArenaMap, ArenaPhase, StepOutcome};
use bitgrid_logic::catalog::{AllowancePolicy, GameRules};
use bitgrid_logic::constants::names;
use bitgrid_logic::economy::PlacementDenied;
use bitgrid_logic::grid::Grid;

// ── Helpers ────────────────────────────────────────────────────────────

fn rules() -> Arc<GameRules> {
    Arc::new(GameRules::standard())
}

/// Fresh directory under the system temp dir.
fn scratch_dir(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("bitgrid-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    dir
}

/// Mines at 6 and 15 box the opponent into the top-right corner; hub at 59.
fn boxed_arena(rules: &GameRules) -> Arena {
    let catalog = &rules.catalog;
    let mut grid = Grid::empty();
    let mine = catalog.code_of(names::BIT_MINE, 1).unwrap();
    grid.set(6, mine);
    grid.set(15, mine);
    grid.set(59, catalog.code_of(names::GRID_HALL, 1).unwrap());
    Arena::with_starts(ArenaMap::from_grid(&grid, catalog), 56, 7).unwrap()
}

/// Refuses the next `failures` writes to one key.
struct FlakyStore {
    inner: MemoryStore,
    key: &'static str,
    failures: u32,
}

impl FlakyStore {
    fn new(key: &'static str, failures: u32) -> Self {
        Self { inner: MemoryStore::new(), key, failures }
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        self.inner.get(key)
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PersistError> {
        if key == self.key && self.failures > 0 {
            self.failures -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "disk full").into());
        }
        self.inner.set(key, value)
    }
}

// ── Persistence across sessions ────────────────────────────────────────

#[test]
fn dir_store_survives_reopen() {
    let dir = scratch_dir("reopen");
    {
        let store = DirStore::open(&dir).unwrap();
        let mut engine = GameEngine::open(store, rules()).unwrap();
        engine.buy(10, names::BIT_MINE).unwrap();
        engine.update(Duration::from_secs(3)).unwrap();
        engine.dispose();
    }

    let store = DirStore::open(&dir).unwrap();
    let engine = GameEngine::open(store, rules()).unwrap();
    assert_eq!(engine.state().bits, 1500);
    assert_eq!(engine.state().uncollected[&10], 30);
    assert!(!engine.state().grid.get(10).is_empty());

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn corrupt_grid_file_falls_back_to_starter() {
    let dir = scratch_dir("corrupt");
    let mut store = DirStore::open(&dir).unwrap();
    store.set(keys::GRID, "garbage".to_string()).unwrap();
    store.set(keys::BITS, "750".to_string()).unwrap();

    let engine = GameEngine::open(store, rules()).unwrap();
    assert_eq!(engine.state().grid, Grid::starter(&engine.rules().catalog));
    assert_eq!(engine.state().bits, 750);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn refused_action_writes_nothing() {
    let mut engine = GameEngine::open(MemoryStore::new(), rules()).unwrap();
    assert!(matches!(
        engine.buy(27, names::BIT_MINE),
        Err(EngineError::Placement(PlacementDenied::Occupied(27)))
    ));
    assert!(engine.repository().store().is_empty());
}

#[test]
fn failed_grid_write_never_stores_unpaid_building() {
    let mut engine = GameEngine::open(FlakyStore::new(keys::GRID, 1), rules()).unwrap();
    assert!(matches!(
        engine.buy(10, names::BIT_MINE),
        Err(EngineError::Persist(_))
    ));
    let repo = engine.repository();
    assert_eq!(repo.load_bits().unwrap(), Some(1500));
    assert_eq!(repo.load_grid().unwrap(), None);

    // The next successful write carries both purchases.
    engine.buy(11, names::BIT_MINE).unwrap();
    let grid = engine.repository().load_grid().unwrap().unwrap();
    assert!(!grid.get(10).is_empty());
    assert!(!grid.get(11).is_empty());
    assert_eq!(engine.repository().load_bits().unwrap(), Some(1000));
}

// ── Economy over time ──────────────────────────────────────────────────

#[test]
fn production_stops_at_capacity() {
    let mut store = MemoryStore::new();
    store.insert(keys::BITS, "1000");
    let mut engine = GameEngine::open(store, rules()).unwrap();
    engine.buy(10, names::BIT_MINE).unwrap();
    // pool 500 of 2000

    let mut produced = 0;
    for _ in 0..300 {
        produced += engine.update(Duration::from_secs(1)).unwrap().produced;
    }
    assert_eq!(produced, 1500);
    assert_eq!(engine.state().bits + engine.state().pending_total(), 2000);
    assert_eq!(engine.update(Duration::from_secs(1)).unwrap().produced, 0);
}

#[test]
fn cumulative_policy_allows_more_storage() {
    let open_at_hub_2 = |policy| {
        let mut store = MemoryStore::new();
        store.insert(keys::BITS, "100000");
        let rules = Arc::new(GameRules::standard().with_policy(policy));
        let mut engine = GameEngine::open(store, rules).unwrap();
        engine.level_up(27).unwrap();
        engine
    };

    let cumulative = open_at_hub_2(AllowancePolicy::Cumulative);
    let highest = open_at_hub_2(AllowancePolicy::HighestTier);
    // Starter storage already placed: 2 + 3 − 1 versus 3 − 1.
    assert_eq!(cumulative.remaining_allowance()[names::BIT_STORAGE], 4);
    assert_eq!(highest.remaining_allowance()[names::BIT_STORAGE], 2);
}

// ── Arena gate ─────────────────────────────────────────────────────────

#[test]
fn arena_win_advances_sector_once() {
    let rules = rules();
    let mut engine = GameEngine::open(MemoryStore::new(), rules.clone()).unwrap();
    engine.enter_arena_with(boxed_arena(&rules));
    assert!(engine.start_arena().unwrap());

    let report = engine.update(Duration::from_millis(1200)).unwrap();
    assert_eq!(report.arena_steps.last(), Some(&StepOutcome::Won));
    assert_eq!(report.advanced_to.as_deref(), Some("2"));
    assert_eq!(engine.sector_id(), "2");
    assert_eq!(engine.repository().load_sector_id().unwrap().as_deref(), Some("2"));

    let session = engine.arena().unwrap();
    assert_eq!(session.arena().phase(), ArenaPhase::Won);
    assert!(!session.is_ticking());

    let report = engine.update(Duration::from_secs(5)).unwrap();
    assert!(report.advanced_to.is_none());
    assert_eq!(engine.sector_id(), "2");
}

#[test]
fn arena_win_survives_failed_sector_write() {
    let rules = rules();
    let mut engine = GameEngine::open(FlakyStore::new(keys::SECTOR, 1), rules.clone()).unwrap();
    engine.enter_arena_with(boxed_arena(&rules));
    engine.start_arena().unwrap();

    let result = engine.update(Duration::from_millis(1200));
    assert!(matches!(result, Err(EngineError::Persist(PersistError::Io(_)))));
    assert_eq!(engine.sector_id(), "2");
    assert_eq!(engine.repository().load_sector_id().unwrap(), None);

    let report = engine.update(Duration::from_secs(5)).unwrap();
    assert!(report.advanced_to.is_none());
    assert_eq!(engine.sector_id(), "2");
    assert_eq!(engine.repository().load_sector_id().unwrap().as_deref(), Some("2"));
}

#[test]
fn arena_session_always_ends() {
    let mut engine = GameEngine::open(MemoryStore::new(), rules()).unwrap();
    let mut rng = rand::thread_rng();
    engine.enter_arena(&mut rng).unwrap();
    engine.start_arena().unwrap();

    // 256 lattice points at 200ms each.
    engine.update(Duration::from_secs(52)).unwrap();
    let phase = engine.arena().unwrap().arena().phase();
    assert!(phase.is_terminal(), "still {phase:?}");
}

#[test]
fn snapshot_moves_base_between_stores() {
    let mut source = GameEngine::open(MemoryStore::new(), rules()).unwrap();
    source.buy(3, names::BIT_MINE).unwrap();
    let mut buffer = Vec::new();
    source.save_snapshot(&mut buffer).unwrap();

    let dir = scratch_dir("snapshot");
    let mut target = GameEngine::open(DirStore::open(&dir).unwrap(), rules()).unwrap();
    target.restore_snapshot(&buffer[..]).unwrap();
    drop(target);

    let reopened = GameEngine::open(DirStore::open(&dir).unwrap(), rules()).unwrap();
    assert_eq!(reopened.state(), source.state());

    let _ = std::fs::remove_dir_all(&dir);
}
