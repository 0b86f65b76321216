//! Deterministic sector generation.
//!
//! A sector id hashes to a 32-bit seed, the seed drives a fixed-period
//! stream, and the stream places buildings in a fixed order:
//!
//! 1. one level-1 grid-hall
//! 2. one or two bit-storages (level 1 at 75%, level 2 at 25%)
//! 3. one or two bit-mines (level 1 at 85%, level 2 at 15%)
//! 4. a lab at 10%, then a portal at 10%
//! 5. the initial fill, in `[0, min(capacity, 2000))`
//!
//! The same id always yields the same grid and fill. Changing the order of
//! draws, the hash, or the stream breaks every saved sector.

use rand::{RngCore, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::constants::{names, DEFAULT_SECTOR_ID, GRID_CELLS, MAX_INITIAL_FILL};
use crate::economy::total_storage_capacity;
use crate::grid::Grid;

/// Rejection-sampling attempts before falling back to an ordered pick.
const MAX_DRAWS_PER_CELL: usize = GRID_CELLS * 4;

/// Fold an id into a 32-bit seed. Order-dependent: "12" and "21" differ.
pub fn sector_hash(id: &str) -> u32 {
    let mut h: u32 = 1_779_033_703 ^ id.chars().count() as u32;
    for c in id.chars() {
        h = (h ^ c as u32).wrapping_mul(3_432_918_353);
        h = h.rotate_left(13);
    }
    h = (h ^ (h >> 16)).wrapping_mul(2_246_822_507);
    h = (h ^ (h >> 13)).wrapping_mul(3_266_489_909);
    h ^ (h >> 16)
}

/// Small deterministic stream with a period of 2^32.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectorRng {
    state: u32,
}

impl SectorRng {
    pub fn new(seed: u32) -> Self {
        Self { state: seed }
    }

    pub fn from_sector(id: &str) -> Self {
        Self::new(sector_hash(id))
    }

    pub fn next_word(&mut self) -> u32 {
        self.state = self.state.wrapping_add(0x6D2B_79F5);
        let mut t = self.state;
        t = (t ^ (t >> 15)).wrapping_mul(t | 1);
        t ^= t.wrapping_add((t ^ (t >> 7)).wrapping_mul(t | 61));
        t ^ (t >> 14)
    }

    /// Uniform in `[0, 1)`.
    pub fn next_unit(&mut self) -> f64 {
        f64::from(self.next_word()) / 4_294_967_296.0
    }

    /// Uniform in `[0, n)`; 0 when `n` is 0.
    pub fn below(&mut self, n: u64) -> u64 {
        (self.next_unit() * n as f64) as u64
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_unit() < p
    }
}

impl RngCore for SectorRng {
    fn next_u32(&mut self) -> u32 {
        self.next_word()
    }

    fn next_u64(&mut self) -> u64 {
        let hi = u64::from(self.next_word());
        let lo = u64::from(self.next_word());
        (hi << 32) | lo
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next_word().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}

impl SeedableRng for SectorRng {
    type Seed = [u8; 4];

    fn from_seed(seed: Self::Seed) -> Self {
        Self::new(u32::from_le_bytes(seed))
    }
}

/// A generated sector: its layout and the bits shown in its storages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sector {
    pub id: String,
    pub grid: Grid,
    pub initial_bits: u64,
}

/// Draw a vacant cell. Rejection sampling first; if the draws keep hitting
/// claimed cells, pick from the vacant list so the loop always ends.
fn draw_vacant(grid: &Grid, catalog: &Catalog, rng: &mut SectorRng) -> Option<usize> {
    let vacant = grid.vacant_cells(catalog);
    if vacant.is_empty() {
        return None;
    }
    for _ in 0..MAX_DRAWS_PER_CELL {
        let index = rng.below(GRID_CELLS as u64) as usize;
        if grid.is_vacant(index, catalog) {
            return Some(index);
        }
    }
    let pick = rng.below(vacant.len() as u64) as usize;
    vacant.get(pick).copied()
}

fn place_at_random(
    grid: &mut Grid,
    catalog: &Catalog,
    rng: &mut SectorRng,
    name: &str,
    level: u8,
) -> Option<usize> {
    let code = catalog.code_of(name, level)?;
    let index = draw_vacant(grid, catalog, rng)?;
    grid.set(index, code);
    Some(index)
}

/// Generate the sector for `id`.
pub fn generate(id: &str, catalog: &Catalog) -> Sector {
    let mut rng = SectorRng::from_sector(id);
    let mut grid = Grid::empty();

    place_at_random(&mut grid, catalog, &mut rng, names::GRID_HALL, 1);

    let storages = 1 + rng.below(2);
    for _ in 0..storages {
        let level = if rng.chance(0.75) { 1 } else { 2 };
        place_at_random(&mut grid, catalog, &mut rng, names::BIT_STORAGE, level);
    }

    let mines = 1 + rng.below(2);
    for _ in 0..mines {
        let level = if rng.chance(0.85) { 1 } else { 2 };
        place_at_random(&mut grid, catalog, &mut rng, names::BIT_MINE, level);
    }

    if rng.chance(0.10) {
        place_at_random(&mut grid, catalog, &mut rng, names::LAB, 1);
    }
    if rng.chance(0.10) {
        place_at_random(&mut grid, catalog, &mut rng, names::PORTAL, 1);
    }

    let capacity = total_storage_capacity(&grid, catalog);
    let initial_bits = if capacity == 0 {
        0
    } else {
        rng.below(capacity.min(MAX_INITIAL_FILL))
    };

    log::debug!("generated sector {id}: capacity {capacity}, fill {initial_bits}");
    Sector {
        id: id.to_string(),
        grid,
        initial_bits,
    }
}

/// The sector after `id`. Numeric ids count up; anything else restarts at
/// the default sector.
pub fn next_sector_id(id: &str) -> String {
    match id.trim().parse::<u64>() {
        Ok(n) => n.saturating_add(1).to_string(),
        Err(_) => DEFAULT_SECTOR_ID.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{BuildingKind, CellCode};

    #[test]
    fn test_hash_is_order_dependent() {
        assert_ne!(sector_hash("12"), sector_hash("21"));
        assert_eq!(sector_hash("7"), sector_hash("7"));
    }

    #[test]
    fn test_stream_is_reproducible() {
        let mut a = SectorRng::new(99);
        let mut b = SectorRng::new(99);
        for _ in 0..100 {
            assert_eq!(a.next_word(), b.next_word());
        }
    }

    #[test]
    fn test_unit_range() {
        let mut rng = SectorRng::new(1);
        for _ in 0..1000 {
            let u = rng.next_unit();
            assert!((0.0..1.0).contains(&u));
        }
        assert_eq!(rng.below(0), 0);
    }

    #[test]
    fn test_seedable_matches_new() {
        let mut a = SectorRng::from_seed(42u32.to_le_bytes());
        let mut b = SectorRng::new(42);
        assert_eq!(a.next_u32(), b.next_word());
    }

    #[test]
    fn test_generate_is_deterministic() {
        let catalog = Catalog::standard();
        assert_eq!(generate("17", &catalog), generate("17", &catalog));
    }

    #[test]
    fn test_generate_places_one_hub() {
        let catalog = Catalog::standard();
        for n in 1..50 {
            let sector = generate(&n.to_string(), &catalog);
            let hubs = sector.grid.cells_of_kind(&catalog, BuildingKind::Hub);
            assert_eq!(hubs.len(), 1);
            assert_eq!(sector.grid.hub_level(&catalog), 1);
        }
    }

    #[test]
    fn test_draw_vacant_exhausted_grid() {
        let catalog = Catalog::standard();
        let mine = catalog.code_of(names::BIT_MINE, 1).unwrap();
        let mut grid = Grid::empty();
        for i in 0..GRID_CELLS {
            grid.set(i, mine);
        }
        let mut rng = SectorRng::new(5);
        assert_eq!(draw_vacant(&grid, &catalog, &mut rng), None);

        grid.set(63, CellCode::EMPTY);
        assert_eq!(draw_vacant(&grid, &catalog, &mut rng), Some(63));
    }

    #[test]
    fn test_next_sector_id() {
        assert_eq!(next_sector_id("1"), "2");
        assert_eq!(next_sector_id("41"), "42");
        assert_eq!(next_sector_id("alpha"), DEFAULT_SECTOR_ID);
    }
}
