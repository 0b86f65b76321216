//! Game constants: grid dimensions, rates, capacities, building names.
//!
//! Plain values with no storage dependency. Both the session engine and the
//! simtest harness use these.

/// Cells along one side of the square base grid.
pub const GRID_SIDE: usize = 8;
/// Total cells in a grid (row-major).
pub const GRID_CELLS: usize = GRID_SIDE * GRID_SIDE;

/// Bits stored per storage level.
pub const STORAGE_CAPACITY_PER_LEVEL: u64 = 2000;
/// Bits produced per second per mine level.
pub const MINE_RATE_PER_LEVEL: u64 = 10;

/// Highest storage fill index reported to the view layer.
pub const MAX_FILL_LEVEL: u8 = 4;

/// Bits in the pool when nothing has been saved yet.
pub const STARTING_BITS: u64 = 2000;
/// Sector a fresh save starts in.
pub const DEFAULT_SECTOR_ID: &str = "1";
/// Upper bound (exclusive) of a generated sector's initial fill.
pub const MAX_INITIAL_FILL: u64 = 2000;

/// Milliseconds between production ticks.
pub const PRODUCTION_PERIOD_MS: u64 = 1000;
/// Milliseconds between arena steps.
pub const ARENA_STEP_MS: u64 = 200;

/// Starter layout: grid-hall position.
pub const STARTER_HUB_INDEX: usize = 27;
/// Starter layout: bit-storage position.
pub const STARTER_STORAGE_INDEX: usize = 36;

pub mod names {
    pub const GRID_HALL: &str = "grid-hall";
    pub const BIT_STORAGE: &str = "bit-storage";
    pub const BIT_MINE: &str = "bit-mine";
    pub const LAB: &str = "lab";
    pub const PORTAL: &str = "portal";

    /// All building names in shop order.
    pub const ALL: [&str; 5] = [GRID_HALL, BIT_STORAGE, BIT_MINE, LAB, PORTAL];
}

/// Row-major index of (row, col).
pub fn index_of(row: usize, col: usize) -> usize {
    row * GRID_SIDE + col
}

/// (row, col) of a row-major index.
pub fn row_col(index: usize) -> (usize, usize) {
    (index / GRID_SIDE, index % GRID_SIDE)
}
