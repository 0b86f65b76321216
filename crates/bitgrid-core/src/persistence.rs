//! Save/Load for the player's base.
//!
//! Two layers:
//! - a [`Repository`] over any [`KeyValueStore`], one JSON value per slice of
//!   state (grid, bits, uncollected yield, sector id). A missing or corrupt
//!   slice loads as its default; the other slices are unaffected.
//! - a versioned bincode [`Snapshot`] of the whole base for export/import.

use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use bitgrid_logic::catalog::Catalog;
use bitgrid_logic::constants::{DEFAULT_SECTOR_ID, STARTING_BITS};
use bitgrid_logic::economy::{retain_producer_entries, BaseState, YieldMap};
use bitgrid_logic::grid::Grid;

/// Version number for snapshot format (increment when format changes)
pub const SNAPSHOT_VERSION: u32 = 1;

/// Store keys, one per slice of state.
pub mod keys {
    pub const GRID: &str = "bitgrid.grid";
    pub const BITS: &str = "bitgrid.bits";
    pub const UNCOLLECTED: &str = "bitgrid.uncollected";
    pub const SECTOR: &str = "bitgrid.sector";
}

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Serialization error: {0}")]
    Bincode(#[from] bincode::Error),
    #[error("Snapshot version mismatch: expected {expected}, found {found}")]
    VersionMismatch { expected: u32, found: u32 },
}

// ── Stores ───────────────────────────────────────────────────────────────

/// String-keyed string storage. The engine only ever goes through this.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError>;
    fn set(&mut self, key: &str, value: String) -> Result<(), PersistError>;
}

/// In-memory store for tests and headless runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    values: HashMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw access, e.g. to plant a corrupt value.
    pub fn insert(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PersistError> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }
}

/// One `<key>.json` file per key under a directory.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Creates the directory if needed.
    pub fn open(root: impl AsRef<Path>) -> Result<Self, PersistError> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.root.join(format!("{key}.json"))
    }
}

impl KeyValueStore for DirStore {
    fn get(&self, key: &str) -> Result<Option<String>, PersistError> {
        match std::fs::read_to_string(self.path_for(key)) {
            Ok(text) => Ok(Some(text)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn set(&mut self, key: &str, value: String) -> Result<(), PersistError> {
        std::fs::write(self.path_for(key), value)?;
        Ok(())
    }
}

// ── Repository ───────────────────────────────────────────────────────────

/// Typed load/save of each state slice over a [`KeyValueStore`].
#[derive(Debug, Clone, Default)]
pub struct Repository<S> {
    store: S,
}

impl<S: KeyValueStore> Repository<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    /// `None` when absent or unparseable. Store failures are errors.
    fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, PersistError> {
        let Some(text) = self.store.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&text) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!("ignoring malformed {key}: {e}");
                Ok(None)
            }
        }
    }

    fn save<T: Serialize + ?Sized>(&mut self, key: &str, value: &T) -> Result<(), PersistError> {
        let text = serde_json::to_string(value)?;
        self.store.set(key, text)
    }

    pub fn load_grid(&self) -> Result<Option<Grid>, PersistError> {
        self.load(keys::GRID)
    }

    pub fn save_grid(&mut self, grid: &Grid) -> Result<(), PersistError> {
        self.save(keys::GRID, grid)
    }

    pub fn load_bits(&self) -> Result<Option<u64>, PersistError> {
        self.load(keys::BITS)
    }

    pub fn save_bits(&mut self, bits: u64) -> Result<(), PersistError> {
        self.save(keys::BITS, &bits)
    }

    pub fn load_uncollected(&self) -> Result<Option<YieldMap>, PersistError> {
        self.load(keys::UNCOLLECTED)
    }

    pub fn save_uncollected(&mut self, uncollected: &YieldMap) -> Result<(), PersistError> {
        self.save(keys::UNCOLLECTED, uncollected)
    }

    pub fn load_sector_id(&self) -> Result<Option<String>, PersistError> {
        Ok(self
            .load::<String>(keys::SECTOR)?
            .filter(|id| !id.trim().is_empty()))
    }

    pub fn save_sector_id(&mut self, id: &str) -> Result<(), PersistError> {
        self.save(keys::SECTOR, id)
    }

    /// Load every slice, substituting defaults slice by slice. Yield entries
    /// that no longer sit on a producer are dropped.
    pub fn load_state(&self, catalog: &Catalog) -> Result<(BaseState, String), PersistError> {
        let grid = self.load_grid()?.unwrap_or_else(|| {
            log::info!("no saved grid, using starter layout");
            Grid::starter(catalog)
        });
        let bits = self.load_bits()?.unwrap_or(STARTING_BITS);
        let uncollected = self.load_uncollected()?.unwrap_or_default();
        let sector_id = self
            .load_sector_id()?
            .unwrap_or_else(|| DEFAULT_SECTOR_ID.to_string());

        let mut state = BaseState {
            grid,
            bits,
            uncollected,
        };
        let dropped = retain_producer_entries(&mut state, catalog);
        if dropped > 0 {
            log::warn!("dropped {dropped} yield entries not on a producer");
        }
        Ok((state, sector_id))
    }

    /// Write every slice, bits before grid.
    pub fn save_state(&mut self, state: &BaseState, sector_id: &str) -> Result<(), PersistError> {
        self.save_bits(state.bits)?;
        self.save_uncollected(&state.uncollected)?;
        self.save_grid(&state.grid)?;
        self.save_sector_id(sector_id)
    }
}

// ── Binary snapshot ──────────────────────────────────────────────────────

/// Whole-base export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Snapshot format version
    pub version: u32,
    pub sector_id: String,
    pub state: BaseState,
}

impl Snapshot {
    pub fn new(state: BaseState, sector_id: &str) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            sector_id: sector_id.to_string(),
            state,
        }
    }
}

/// Write a snapshot of `state` to a writer.
pub fn save_snapshot<W: Write>(
    writer: W,
    state: &BaseState,
    sector_id: &str,
) -> Result<(), PersistError> {
    let snapshot = Snapshot::new(state.clone(), sector_id);
    bincode::serialize_into(writer, &snapshot)?;
    Ok(())
}

/// Read a snapshot. Other format versions are refused.
pub fn load_snapshot<R: Read>(reader: R) -> Result<Snapshot, PersistError> {
    let snapshot: Snapshot = bincode::deserialize_from(reader)?;
    if snapshot.version != SNAPSHOT_VERSION {
        return Err(PersistError::VersionMismatch {
            expected: SNAPSHOT_VERSION,
            found: snapshot.version,
        });
    }
    Ok(snapshot)
}
