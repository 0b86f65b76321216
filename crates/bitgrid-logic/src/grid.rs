//! The 8×8 base layout: a fixed-length, row-major sequence of cell codes.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::{BuildingKind, Catalog, CellCode};
use crate::constants::{names, GRID_CELLS, STARTER_HUB_INDEX, STARTER_STORAGE_INDEX};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("grid must hold 64 cells, found {0}")]
pub struct GridLengthError(pub usize);

/// Exactly `GRID_CELLS` cell codes. Codes the catalog does not know are
/// treated as empty by every lookup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "Vec<u8>", into = "Vec<u8>")]
pub struct Grid {
    cells: Vec<CellCode>,
}

impl Grid {
    pub fn empty() -> Self {
        Self {
            cells: vec![CellCode::EMPTY; GRID_CELLS],
        }
    }

    /// Default base for a fresh save: a level-1 grid-hall and one level-1
    /// bit-storage.
    pub fn starter(catalog: &Catalog) -> Self {
        let mut grid = Self::empty();
        if let Some(hub) = catalog.code_of(names::GRID_HALL, 1) {
            grid.set(STARTER_HUB_INDEX, hub);
        }
        if let Some(storage) = catalog.code_of(names::BIT_STORAGE, 1) {
            grid.set(STARTER_STORAGE_INDEX, storage);
        }
        grid
    }

    pub fn from_codes(codes: &[u8]) -> Result<Self, GridLengthError> {
        if codes.len() != GRID_CELLS {
            return Err(GridLengthError(codes.len()));
        }
        Ok(Self {
            cells: codes.iter().map(|&c| CellCode(c)).collect(),
        })
    }

    /// Code at `index`; out-of-range indices read as empty.
    pub fn get(&self, index: usize) -> CellCode {
        self.cells.get(index).copied().unwrap_or(CellCode::EMPTY)
    }

    /// Write a code. Returns false (and changes nothing) when out of range.
    pub fn set(&mut self, index: usize, code: CellCode) -> bool {
        match self.cells.get_mut(index) {
            Some(cell) => {
                *cell = code;
                true
            }
            None => false,
        }
    }

    pub fn in_range(index: usize) -> bool {
        index < GRID_CELLS
    }

    /// True when the cell holds nothing the catalog recognises.
    pub fn is_vacant(&self, index: usize, catalog: &Catalog) -> bool {
        Self::in_range(index) && catalog.definition_of(self.get(index)).is_none()
    }

    pub fn codes(&self) -> &[CellCode] {
        &self.cells
    }

    /// Indices holding a building of `kind`, in grid order.
    pub fn cells_of_kind(&self, catalog: &Catalog, kind: BuildingKind) -> Vec<usize> {
        self.cells
            .iter()
            .enumerate()
            .filter(|(_, &c)| catalog.kind_of(c) == Some(kind))
            .map(|(i, _)| i)
            .collect()
    }

    /// Level of the highest grid-hall present; 0 if there is none.
    pub fn hub_level(&self, catalog: &Catalog) -> u8 {
        self.cells
            .iter()
            .filter_map(|&c| catalog.definition_of(c))
            .filter(|d| d.kind == BuildingKind::Hub)
            .map(|d| d.level)
            .max()
            .unwrap_or(0)
    }

    /// Number of placed buildings called `name`, any level.
    pub fn count_named(&self, catalog: &Catalog, name: &str) -> u32 {
        self.cells
            .iter()
            .filter_map(|&c| catalog.definition_of(c))
            .filter(|d| d.name == name)
            .count() as u32
    }

    pub fn vacant_cells(&self, catalog: &Catalog) -> Vec<usize> {
        (0..GRID_CELLS)
            .filter(|&i| self.is_vacant(i, catalog))
            .collect()
    }
}

impl Default for Grid {
    fn default() -> Self {
        Self::empty()
    }
}

impl TryFrom<Vec<u8>> for Grid {
    type Error = GridLengthError;

    fn try_from(codes: Vec<u8>) -> Result<Self, Self::Error> {
        Self::from_codes(&codes)
    }
}

impl From<Grid> for Vec<u8> {
    fn from(grid: Grid) -> Self {
        grid.cells.into_iter().map(|c| c.0).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_starter_layout() {
        let catalog = Catalog::standard();
        let grid = Grid::starter(&catalog);
        assert_eq!(grid.hub_level(&catalog), 1);
        assert_eq!(grid.count_named(&catalog, names::BIT_STORAGE), 1);
        assert_eq!(grid.vacant_cells(&catalog).len(), GRID_CELLS - 2);
    }

    #[test]
    fn test_out_of_range_reads_empty() {
        let mut grid = Grid::empty();
        assert_eq!(grid.get(GRID_CELLS), CellCode::EMPTY);
        assert!(!grid.set(GRID_CELLS, CellCode(1)));
    }

    #[test]
    fn test_unknown_code_is_vacant() {
        let catalog = Catalog::standard();
        let mut grid = Grid::empty();
        grid.set(4, CellCode(250));
        assert!(grid.is_vacant(4, &catalog));
        assert_eq!(grid.hub_level(&catalog), 0);
    }

    #[test]
    fn test_wrong_length_rejected() {
        assert_eq!(Grid::from_codes(&[0; 10]), Err(GridLengthError(10)));
        let parsed: Result<Grid, _> = serde_json::from_str("[0, 1, 2]");
        assert!(parsed.is_err());
    }

    #[test]
    fn test_json_is_plain_code_list() {
        let catalog = Catalog::standard();
        let grid = Grid::starter(&catalog);
        let json = serde_json::to_string(&grid).unwrap();
        assert!(json.starts_with('['));
        let back: Grid = serde_json::from_str(&json).unwrap();
        assert_eq!(back, grid);
    }

    #[test]
    fn test_hub_level_takes_highest() {
        let catalog = Catalog::standard();
        let mut grid = Grid::empty();
        grid.set(0, catalog.code_of(names::GRID_HALL, 1).unwrap());
        grid.set(9, catalog.code_of(names::GRID_HALL, 3).unwrap());
        assert_eq!(grid.hub_level(&catalog), 3);
    }
}
