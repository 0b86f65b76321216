//! Pure economy logic: storage capacity, production, and base actions.
//!
//! The caller owns a [`BaseState`] (grid, bit pool, uncollected yield) and
//! hands it to these functions together with the immutable [`Catalog`].
//! Nothing here keeps state between calls, reads the clock, or touches
//! storage.
//!
//! Invariant kept by every function: `bits + pending ≤ total capacity`
//! after each tick and each collection. Every refusal returns an error and
//! leaves the state exactly as it was.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{BuildingKind, Catalog, CellCode, GameRules};
use crate::constants::{
    names, MAX_FILL_LEVEL, MINE_RATE_PER_LEVEL, STARTING_BITS, STORAGE_CAPACITY_PER_LEVEL,
};
use crate::grid::Grid;

/// Grid index → bits waiting to be collected at that producer.
pub type YieldMap = BTreeMap<usize, u64>;

/// Everything the economy mutates.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BaseState {
    pub grid: Grid,
    /// The resource pool.
    pub bits: u64,
    #[serde(default)]
    pub uncollected: YieldMap,
}

impl BaseState {
    pub fn new(grid: Grid, bits: u64) -> Self {
        Self {
            grid,
            bits,
            uncollected: YieldMap::new(),
        }
    }

    /// Fresh save: starter layout and starting bits.
    pub fn starter(catalog: &Catalog) -> Self {
        Self::new(Grid::starter(catalog), STARTING_BITS)
    }

    /// Sum of all uncollected yield.
    pub fn pending_total(&self) -> u64 {
        self.uncollected.values().sum()
    }
}

// ── Refusals ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlacementDenied {
    #[error("cell {0} is outside the grid")]
    OutOfRange(usize),
    #[error("cell {0} is occupied")]
    Occupied(usize),
    #[error("no level-1 {0} in the catalog")]
    UnknownBuilding(String),
    #[error("no {0} left to place at this hub tier")]
    NoAllowance(String),
    #[error("costs {price} bits, pool holds {available}")]
    InsufficientFunds { price: u64, available: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoveDenied {
    #[error("cell {0} is outside the grid")]
    OutOfRange(usize),
    #[error("source and target are the same cell")]
    SameCell,
    #[error("cell {0} holds nothing to move")]
    SourceEmpty(usize),
    #[error("cell {0} is occupied")]
    TargetOccupied(usize),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpgradeDenied {
    #[error("cell {0} is outside the grid")]
    OutOfRange(usize),
    #[error("cell {0} holds nothing to upgrade")]
    EmptyCell(usize),
    #[error("level {requested} exceeds the cap of {max}")]
    MaxLevel { requested: u8, max: u8 },
    #[error("no {name} level {level} in the catalog")]
    UndefinedTier { name: String, level: u8 },
    #[error("costs {cost} bits, pool holds {available}")]
    InsufficientFunds { cost: u64, available: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CollectDenied {
    #[error("nothing pending at cell {0}")]
    NothingPending(usize),
    #[error("pool is already at capacity")]
    PoolFull,
}

fn refuse<E: std::fmt::Display>(action: &str, err: E) -> E {
    log::debug!("{action} refused: {err}");
    err
}

// ── Capacity & production ────────────────────────────────────────────────

/// Capacity contributed by the building at `index` (0 unless storage).
pub fn storage_capacity_at(grid: &Grid, catalog: &Catalog, index: usize) -> u64 {
    match catalog.definition_of(grid.get(index)) {
        Some(def) if def.kind == BuildingKind::Storage => {
            u64::from(def.level) * STORAGE_CAPACITY_PER_LEVEL
        }
        _ => 0,
    }
}

/// Sum of `level × 2000` over storage cells.
pub fn total_storage_capacity(grid: &Grid, catalog: &Catalog) -> u64 {
    (0..grid.codes().len())
        .map(|i| storage_capacity_at(grid, catalog, i))
        .sum()
}

/// Bits per second for a producer of `level`.
pub fn production_rate(level: u8) -> u64 {
    u64::from(level) * MINE_RATE_PER_LEVEL
}

pub fn is_producer(catalog: &Catalog, code: CellCode) -> bool {
    catalog.kind_of(code) == Some(BuildingKind::Producer)
}

/// Capacity not yet claimed by the pool or by pending yield.
pub fn spare_capacity(state: &BaseState, catalog: &Catalog) -> u64 {
    total_storage_capacity(&state.grid, catalog)
        .saturating_sub(state.bits)
        .saturating_sub(state.pending_total())
}

/// One second of production. Producers are credited in grid order, each
/// `min(rate, spare)`, stopping once spare capacity hits zero.
///
/// Returns the bits credited this tick.
pub fn production_tick(state: &mut BaseState, catalog: &Catalog) -> u64 {
    let mut spare = spare_capacity(state, catalog);
    if spare == 0 {
        log::trace!("production skipped: storage full");
        return 0;
    }

    let mut credited = 0;
    for index in state.grid.cells_of_kind(catalog, BuildingKind::Producer) {
        if spare == 0 {
            break;
        }
        let level = catalog.level_of(state.grid.get(index)).unwrap_or(0);
        let amount = production_rate(level).min(spare);
        *state.uncollected.entry(index).or_insert(0) += amount;
        spare -= amount;
        credited += amount;
    }
    credited
}

/// Drop yield entries whose cell no longer holds a producer. Returns how
/// many were dropped.
pub fn retain_producer_entries(state: &mut BaseState, catalog: &Catalog) -> usize {
    let before = state.uncollected.len();
    let grid = &state.grid;
    state
        .uncollected
        .retain(|&index, _| is_producer(catalog, grid.get(index)));
    before - state.uncollected.len()
}

/// Run one production tick per whole elapsed second.
pub fn advance(state: &mut BaseState, catalog: &Catalog, elapsed_seconds: u32) -> u64 {
    let mut credited = 0;
    for _ in 0..elapsed_seconds {
        let tick = production_tick(state, catalog);
        if tick == 0 {
            break;
        }
        credited += tick;
    }
    credited
}

// ── Actions ──────────────────────────────────────────────────────────────

/// Move pending yield at `index` into the pool, up to `capacity`. A fully
/// drained entry is removed from the map.
pub fn collect(state: &mut BaseState, index: usize, capacity: u64) -> Result<u64, CollectDenied> {
    let pending = state.uncollected.get(&index).copied().unwrap_or(0);
    if pending == 0 {
        return Err(refuse("collect", CollectDenied::NothingPending(index)));
    }
    let room = capacity.saturating_sub(state.bits);
    if room == 0 {
        return Err(refuse("collect", CollectDenied::PoolFull));
    }

    let amount = pending.min(room);
    state.bits += amount;
    if amount == pending {
        state.uncollected.remove(&index);
    } else {
        state.uncollected.insert(index, pending - amount);
    }
    Ok(amount)
}

/// Buy a level-1 `name` into an empty cell. `allowance` is how many more the
/// hub tier permits (see [`remaining_allowance`]).
pub fn place(
    state: &mut BaseState,
    catalog: &Catalog,
    index: usize,
    name: &str,
    price: u64,
    allowance: u32,
) -> Result<CellCode, PlacementDenied> {
    if !Grid::in_range(index) {
        return Err(refuse("place", PlacementDenied::OutOfRange(index)));
    }
    if !state.grid.is_vacant(index, catalog) {
        return Err(refuse("place", PlacementDenied::Occupied(index)));
    }
    let code = catalog
        .code_of(name, 1)
        .ok_or_else(|| refuse("place", PlacementDenied::UnknownBuilding(name.to_string())))?;
    if allowance == 0 {
        return Err(refuse("place", PlacementDenied::NoAllowance(name.to_string())));
    }
    if state.bits < price {
        return Err(refuse(
            "place",
            PlacementDenied::InsufficientFunds {
                price,
                available: state.bits,
            },
        ));
    }

    state.grid.set(index, code);
    state.bits -= price;
    if is_producer(catalog, code) {
        state.uncollected.insert(index, 0);
    }
    Ok(code)
}

/// Relocate a building to an empty cell, carrying a producer's pending
/// yield with it.
pub fn move_building(
    state: &mut BaseState,
    catalog: &Catalog,
    from: usize,
    to: usize,
) -> Result<(), MoveDenied> {
    for index in [from, to] {
        if !Grid::in_range(index) {
            return Err(refuse("move", MoveDenied::OutOfRange(index)));
        }
    }
    if from == to {
        return Err(refuse("move", MoveDenied::SameCell));
    }
    if state.grid.is_vacant(from, catalog) {
        return Err(refuse("move", MoveDenied::SourceEmpty(from)));
    }
    if !state.grid.is_vacant(to, catalog) {
        return Err(refuse("move", MoveDenied::TargetOccupied(to)));
    }

    let code = state.grid.get(from);
    state.grid.set(to, code);
    state.grid.set(from, CellCode::EMPTY);
    if is_producer(catalog, code) {
        if let Some(pending) = state.uncollected.remove(&from) {
            state.uncollected.insert(to, pending);
        }
    }
    Ok(())
}

/// Replace the building at `index` with its `next_level` tier.
pub fn upgrade(
    state: &mut BaseState,
    catalog: &Catalog,
    index: usize,
    next_level: u8,
    cost: u64,
    max_level: u8,
) -> Result<CellCode, UpgradeDenied> {
    if !Grid::in_range(index) {
        return Err(refuse("upgrade", UpgradeDenied::OutOfRange(index)));
    }
    let def = catalog
        .definition_of(state.grid.get(index))
        .ok_or_else(|| refuse("upgrade", UpgradeDenied::EmptyCell(index)))?;
    if next_level > max_level {
        return Err(refuse(
            "upgrade",
            UpgradeDenied::MaxLevel {
                requested: next_level,
                max: max_level,
            },
        ));
    }
    let code = catalog.code_of(&def.name, next_level).ok_or_else(|| {
        refuse(
            "upgrade",
            UpgradeDenied::UndefinedTier {
                name: def.name.clone(),
                level: next_level,
            },
        )
    })?;
    if state.bits < cost {
        return Err(refuse(
            "upgrade",
            UpgradeDenied::InsufficientFunds {
                cost,
                available: state.bits,
            },
        ));
    }

    state.grid.set(index, code);
    state.bits -= cost;
    Ok(code)
}

/// How many more of each building the hub tier permits:
/// `max(0, allowed − placed)` per name.
pub fn remaining_allowance(grid: &Grid, rules: &GameRules, hub_level: u8) -> BTreeMap<String, u32> {
    names::ALL
        .iter()
        .map(|&name| {
            let allowed = rules.allowed_count(name, hub_level);
            let placed = grid.count_named(&rules.catalog, name);
            (name.to_string(), allowed.saturating_sub(placed))
        })
        .collect()
}

// ── Display support ──────────────────────────────────────────────────────

/// Fill index (0–4) per storage cell for `amount` bits. Smaller storages
/// fill first; equal levels fill in grid order.
pub fn storage_fill_levels(grid: &Grid, catalog: &Catalog, amount: u64) -> BTreeMap<usize, u8> {
    let mut storages: Vec<(u8, usize)> = grid
        .cells_of_kind(catalog, BuildingKind::Storage)
        .into_iter()
        .map(|i| (catalog.level_of(grid.get(i)).unwrap_or(0), i))
        .collect();
    storages.sort_unstable();

    let mut remaining = amount;
    let mut fills = BTreeMap::new();
    for (_, index) in storages {
        let capacity = storage_capacity_at(grid, catalog, index);
        let assigned = remaining.min(capacity);
        remaining -= assigned;
        fills.insert(index, fill_level(assigned, capacity));
    }
    fills
}

/// `ceil(4 × assigned / capacity)`, clamped to 4.
pub fn fill_level(assigned: u64, capacity: u64) -> u8 {
    if capacity == 0 {
        return 0;
    }
    let max = u64::from(MAX_FILL_LEVEL);
    let level = (max * assigned).div_ceil(capacity).min(max);
    level as u8
}
