//! Game engine - main entry point for running a base session
//!
//! Owns the player's base, the production timer, and at most one arena
//! session. Every successful action is written through the repository
//! before it returns.

use std::collections::BTreeMap;
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use thiserror::Error;

use bitgrid_logic::arena::{
    Arena, ArenaError, ArenaMap, ArenaPhase, Direction, SteerDenied, StepOutcome,
};
use bitgrid_logic::catalog::{CellCode, GameRules};
use bitgrid_logic::economy::{
    self, retain_producer_entries, BaseState, CollectDenied, MoveDenied, PlacementDenied,
    UpgradeDenied,
};
use bitgrid_logic::grid::Grid;
use bitgrid_logic::sector::{generate, next_sector_id, Sector};

use crate::persistence::{self, KeyValueStore, PersistError, Repository};
use crate::scheduler::TickTimer;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Placement(#[from] PlacementDenied),
    #[error(transparent)]
    Move(#[from] MoveDenied),
    #[error(transparent)]
    Upgrade(#[from] UpgradeDenied),
    #[error(transparent)]
    Collect(#[from] CollectDenied),
    #[error(transparent)]
    Arena(#[from] ArenaError),
    #[error(transparent)]
    Steer(#[from] SteerDenied),
    #[error(transparent)]
    Persist(#[from] PersistError),
    #[error("{0} is not sold in the shop")]
    NotForSale(String),
    #[error("no arena session is open")]
    NoArena,
}

/// What one `update` call did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Bits credited to uncollected yield.
    pub produced: u64,
    /// One entry per arena step taken.
    pub arena_steps: Vec<StepOutcome>,
    /// The sector moved to after an arena win.
    pub advanced_to: Option<String>,
}

/// An arena in progress plus its step timer.
#[derive(Debug, Clone)]
pub struct ArenaSession {
    arena: Arena,
    timer: TickTimer,
    sector: Sector,
}

impl ArenaSession {
    fn new(arena: Arena, sector: Sector) -> Self {
        Self {
            arena,
            timer: TickTimer::arena(),
            sector,
        }
    }

    /// Run the steps that are due. Stops at the first terminal outcome and
    /// cancels the timer.
    fn update(&mut self, delta: Duration) -> Vec<StepOutcome> {
        let due = self.timer.advance(delta);
        let mut outcomes = Vec::new();
        for _ in 0..due {
            let outcome = self.arena.step();
            if outcome != StepOutcome::Idle {
                outcomes.push(outcome);
            }
            if self.arena.phase().is_terminal() {
                self.timer.cancel();
                break;
            }
        }
        outcomes
    }

    pub fn arena(&self) -> &Arena {
        &self.arena
    }

    pub fn sector(&self) -> &Sector {
        &self.sector
    }

    pub fn is_ticking(&self) -> bool {
        self.timer.is_active()
    }
}

/// Main game engine
pub struct GameEngine<S: KeyValueStore> {
    rules: Arc<GameRules>,
    repo: Repository<S>,
    state: BaseState,
    sector_id: String,
    production: TickTimer,
    arena: Option<ArenaSession>,
    /// The sector id changed but the store has not accepted it yet.
    sector_unsaved: bool,
}

impl<S: KeyValueStore> GameEngine<S> {
    /// Load the saved base (defaults for anything missing) and start the
    /// production timer.
    pub fn open(store: S, rules: Arc<GameRules>) -> Result<Self, EngineError> {
        let repo = Repository::new(store);
        let (state, sector_id) = repo.load_state(&rules.catalog)?;
        log::info!(
            "opened base in sector {sector_id}: {} bits, {} pending",
            state.bits,
            state.pending_total()
        );
        Ok(Self {
            rules,
            repo,
            state,
            sector_id,
            production: TickTimer::production(),
            arena: None,
            sector_unsaved: false,
        })
    }

    /// Advance the simulation by `delta` of real time.
    pub fn update(&mut self, delta: Duration) -> Result<TickReport, EngineError> {
        let mut report = TickReport::default();
        if self.sector_unsaved {
            self.save_sector()?;
        }

        let ticks = self.production.advance(delta);
        if ticks > 0 {
            report.produced = economy::advance(&mut self.state, &self.rules.catalog, ticks);
            if report.produced > 0 {
                self.repo.save_uncollected(&self.state.uncollected)?;
            }
        }

        if let Some(session) = self.arena.as_mut() {
            report.arena_steps = session.update(delta);
        }
        for outcome in &report.arena_steps {
            match outcome {
                StepOutcome::Won => {
                    report.advanced_to = Some(self.advance_sector()?);
                }
                StepOutcome::Lost(reason) => {
                    log::info!("arena lost in sector {}: {reason:?}", self.sector_id);
                }
                _ => {}
            }
        }

        Ok(report)
    }

    /// Move to the next sector. The new id holds in memory even if the
    /// store refuses it; `update` keeps retrying the write.
    fn advance_sector(&mut self) -> Result<String, PersistError> {
        let next = next_sector_id(&self.sector_id);
        log::info!("sector {} cleared, advancing to {next}", self.sector_id);
        self.sector_id = next.clone();
        self.sector_unsaved = true;
        self.save_sector()?;
        Ok(next)
    }

    fn save_sector(&mut self) -> Result<(), PersistError> {
        self.repo.save_sector_id(&self.sector_id)?;
        self.sector_unsaved = false;
        Ok(())
    }

    /// Bits go first: a write that fails part way leaves the store charged
    /// but never holding a building it did not pay for.
    fn persist_base(&mut self) -> Result<(), PersistError> {
        self.repo.save_bits(self.state.bits)?;
        self.repo.save_uncollected(&self.state.uncollected)?;
        self.repo.save_grid(&self.state.grid)
    }

    // ── Base actions ─────────────────────────────────────────────────────

    /// Buy a level-1 `name` into the empty cell at `index`.
    pub fn buy(&mut self, index: usize, name: &str) -> Result<CellCode, EngineError> {
        let price = self
            .rules
            .prices
            .purchase_price(name)
            .ok_or_else(|| EngineError::NotForSale(name.to_string()))?;
        let allowance = self.remaining_allowance().get(name).copied().unwrap_or(0);
        let code = economy::place(
            &mut self.state,
            &self.rules.catalog,
            index,
            name,
            price,
            allowance,
        )?;
        log::debug!("bought {name} at {index} for {price}");
        self.persist_base()?;
        Ok(code)
    }

    /// Move a building to an empty cell.
    pub fn relocate(&mut self, from: usize, to: usize) -> Result<(), EngineError> {
        economy::move_building(&mut self.state, &self.rules.catalog, from, to)?;
        self.repo.save_grid(&self.state.grid)?;
        self.repo.save_uncollected(&self.state.uncollected)?;
        Ok(())
    }

    /// Upgrade the building at `index` one level, at shop cost, within the
    /// hub tier's cap.
    pub fn level_up(&mut self, index: usize) -> Result<CellCode, EngineError> {
        if !Grid::in_range(index) {
            return Err(UpgradeDenied::OutOfRange(index).into());
        }
        let catalog = &self.rules.catalog;
        let def = catalog
            .definition_of(self.state.grid.get(index))
            .ok_or(UpgradeDenied::EmptyCell(index))?;
        let next = def.level.saturating_add(1);
        let cap = self.rules.level_cap(&def.name, self.hub_level());
        let cost = match self.rules.prices.upgrade_cost(&def.name, next) {
            Some(cost) => cost,
            None if next > cap => {
                return Err(UpgradeDenied::MaxLevel {
                    requested: next,
                    max: cap,
                }
                .into())
            }
            None => return Err(EngineError::NotForSale(def.name.clone())),
        };

        let name = def.name.clone();
        let code = economy::upgrade(&mut self.state, catalog, index, next, cost, cap)?;
        log::debug!("upgraded {name} at {index} to level {next} for {cost}");
        self.repo.save_bits(self.state.bits)?;
        self.repo.save_grid(&self.state.grid)?;
        Ok(code)
    }

    /// Move pending yield at `index` into the pool.
    pub fn collect(&mut self, index: usize) -> Result<u64, EngineError> {
        let capacity = self.capacity();
        let amount = economy::collect(&mut self.state, index, capacity)?;
        self.repo.save_bits(self.state.bits)?;
        self.repo.save_uncollected(&self.state.uncollected)?;
        Ok(amount)
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub fn state(&self) -> &BaseState {
        &self.state
    }

    pub fn rules(&self) -> &GameRules {
        &self.rules
    }

    pub fn sector_id(&self) -> &str {
        &self.sector_id
    }

    pub fn hub_level(&self) -> u8 {
        self.state.grid.hub_level(&self.rules.catalog)
    }

    pub fn capacity(&self) -> u64 {
        economy::total_storage_capacity(&self.state.grid, &self.rules.catalog)
    }

    pub fn remaining_allowance(&self) -> BTreeMap<String, u32> {
        economy::remaining_allowance(&self.state.grid, &self.rules, self.hub_level())
    }

    /// Fill index per storage cell for the current pool.
    pub fn storage_fill_levels(&self) -> BTreeMap<usize, u8> {
        economy::storage_fill_levels(&self.state.grid, &self.rules.catalog, self.state.bits)
    }

    /// The generated layout of the current sector.
    pub fn current_sector(&self) -> Sector {
        generate(&self.sector_id, &self.rules.catalog)
    }

    pub fn repository(&self) -> &Repository<S> {
        &self.repo
    }

    // ── Arena ────────────────────────────────────────────────────────────

    /// Open an arena on the current sector's layout with random starts.
    /// Replaces any session already open.
    pub fn enter_arena(&mut self, rng: &mut impl Rng) -> Result<&Arena, EngineError> {
        let sector = self.current_sector();
        let map = ArenaMap::from_grid(&sector.grid, &self.rules.catalog);
        let arena = Arena::new(map, rng)?;
        log::info!("entering arena for sector {}", sector.id);
        Ok(self.install_arena(arena, sector))
    }

    /// Open a prepared arena (fixed starts or a custom map) under the
    /// current sector.
    pub fn enter_arena_with(&mut self, arena: Arena) -> &Arena {
        let sector = self.current_sector();
        self.install_arena(arena, sector)
    }

    fn install_arena(&mut self, arena: Arena, sector: Sector) -> &Arena {
        let session = self.arena.insert(ArenaSession::new(arena, sector));
        &session.arena
    }

    fn session_mut(&mut self) -> Result<&mut ArenaSession, EngineError> {
        self.arena.as_mut().ok_or(EngineError::NoArena)
    }

    /// Start the open session. False if it was already started or over.
    pub fn start_arena(&mut self) -> Result<bool, EngineError> {
        Ok(self.session_mut()?.arena.start())
    }

    pub fn steer(&mut self, dir: Direction) -> Result<(), EngineError> {
        self.session_mut()?.arena.steer(dir)?;
        Ok(())
    }

    /// Back to fresh starts on the same map.
    pub fn reset_arena(&mut self, rng: &mut impl Rng) -> Result<(), EngineError> {
        let session = self.session_mut()?;
        session.arena.reset(rng)?;
        session.timer.restart();
        Ok(())
    }

    /// Tear the session down. Returns the phase it ended in.
    pub fn leave_arena(&mut self) -> Option<ArenaPhase> {
        let mut session = self.arena.take()?;
        session.timer.cancel();
        Some(session.arena.phase())
    }

    pub fn arena(&self) -> Option<&ArenaSession> {
        self.arena.as_ref()
    }

    /// Stop all timers. Later `update` calls change nothing.
    pub fn dispose(&mut self) {
        self.production.cancel();
        self.leave_arena();
        log::debug!("engine disposed");
    }

    pub fn is_disposed(&self) -> bool {
        !self.production.is_active()
    }

    // ── Snapshots ────────────────────────────────────────────────────────

    /// Save the base to a writer
    pub fn save_snapshot<W: Write>(&self, writer: W) -> Result<(), EngineError> {
        persistence::save_snapshot(writer, &self.state, &self.sector_id)?;
        Ok(())
    }

    /// Replace the base with a snapshot and write it through to the store.
    pub fn restore_snapshot<R: Read>(&mut self, reader: R) -> Result<(), EngineError> {
        let snapshot = persistence::load_snapshot(reader)?;
        let mut state = snapshot.state;
        retain_producer_entries(&mut state, &self.rules.catalog);
        self.repo.save_state(&state, &snapshot.sector_id)?;
        self.state = state;
        self.sector_id = snapshot.sector_id;
        self.sector_unsaved = false;
        self.production.restart();
        self.leave_arena();
        log::info!("restored snapshot in sector {}", self.sector_id);
        Ok(())
    }
}
