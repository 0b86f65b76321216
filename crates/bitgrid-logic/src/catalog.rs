//! Building catalog: cell codes, shop prices, and hub unlock tiers.
//!
//! The catalog is immutable configuration: built once at startup (or loaded
//! from JSON) and passed by reference into the engines. Code 0 is the empty
//! cell; every registered (name, level) pair gets exactly one non-zero code.
//!
//! ```
//! use bitgrid_logic::catalog::{BuildingKind, Catalog};
//!
//! let catalog = Catalog::standard();
//! let code = catalog.code_of("bit-mine", 2).unwrap();
//! assert_eq!(catalog.kind_of(code), Some(BuildingKind::Producer));
//! assert_eq!(catalog.code_of("bit-mine", 9), None);
//! ```

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::constants::names;

/// Index into the catalog. `CellCode::EMPTY` (0) means no building.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct CellCode(pub u8);

impl CellCode {
    pub const EMPTY: CellCode = CellCode(0);

    pub fn is_empty(self) -> bool {
        self == Self::EMPTY
    }
}

/// What a building does, independent of its level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildingKind {
    /// The grid-hall. Gates purchases; the arena goal.
    Hub,
    /// Adds to total storage capacity.
    Storage,
    /// Accrues uncollected yield every second.
    Producer,
    Lab,
    Portal,
}

/// A registered (name, level) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildingDef {
    pub name: String,
    pub level: u8,
    pub kind: BuildingKind,
}

impl BuildingDef {
    pub fn new(name: &str, level: u8, kind: BuildingKind) -> Self {
        Self {
            name: name.to_string(),
            level,
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogError {
    #[error("building {name} level {level} registered twice")]
    Duplicate { name: String, level: u8 },
    #[error("building {name} has level 0; levels start at 1")]
    ZeroLevel { name: String },
    #[error("catalog holds {0} entries; cell codes fit at most 255")]
    TooLarge(usize),
}

/// Ordered registry of building definitions with a reverse (name, level) index.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "Vec<BuildingDef>", into = "Vec<BuildingDef>")]
pub struct Catalog {
    /// `defs[i]` has cell code `i + 1`.
    defs: Vec<BuildingDef>,
    index: HashMap<(String, u8), CellCode>,
}

impl Catalog {
    /// Register definitions in order; the first gets code 1.
    pub fn from_defs(defs: Vec<BuildingDef>) -> Result<Self, CatalogError> {
        if defs.len() > usize::from(u8::MAX) {
            return Err(CatalogError::TooLarge(defs.len()));
        }
        let mut index = HashMap::with_capacity(defs.len());
        for (i, def) in defs.iter().enumerate() {
            if def.level == 0 {
                return Err(CatalogError::ZeroLevel {
                    name: def.name.clone(),
                });
            }
            // Bounded by the TooLarge check above.
            let code = CellCode((i + 1) as u8);
            if index.insert((def.name.clone(), def.level), code).is_some() {
                return Err(CatalogError::Duplicate {
                    name: def.name.clone(),
                    level: def.level,
                });
            }
        }
        Ok(Self { defs, index })
    }

    /// Index a list already known to be valid.
    fn indexed(defs: Vec<BuildingDef>) -> Self {
        let index = defs
            .iter()
            .zip(1u8..)
            .map(|(def, code)| ((def.name.clone(), def.level), CellCode(code)))
            .collect();
        Self { defs, index }
    }

    /// The shipped building set: grid-hall, bit-storage, and bit-mine at
    /// levels 1–3, lab and portal at level 1.
    pub fn standard() -> Self {
        Self::indexed(Self::standard_defs())
    }

    /// Eleven distinct (name, level) pairs, all at level 1 or above.
    fn standard_defs() -> Vec<BuildingDef> {
        let mut defs = Vec::new();
        for level in 1..=3 {
            defs.push(BuildingDef::new(names::GRID_HALL, level, BuildingKind::Hub));
        }
        for level in 1..=3 {
            defs.push(BuildingDef::new(
                names::BIT_STORAGE,
                level,
                BuildingKind::Storage,
            ));
        }
        for level in 1..=3 {
            defs.push(BuildingDef::new(
                names::BIT_MINE,
                level,
                BuildingKind::Producer,
            ));
        }
        defs.push(BuildingDef::new(names::LAB, 1, BuildingKind::Lab));
        defs.push(BuildingDef::new(names::PORTAL, 1, BuildingKind::Portal));
        defs
    }

    /// Reverse lookup. `None` for pairs that were never registered.
    pub fn code_of(&self, name: &str, level: u8) -> Option<CellCode> {
        self.index.get(&(name.to_string(), level)).copied()
    }

    /// Forward lookup. `None` for the empty code and for unknown codes.
    pub fn definition_of(&self, code: CellCode) -> Option<&BuildingDef> {
        let i = usize::from(code.0).checked_sub(1)?;
        self.defs.get(i)
    }

    pub fn kind_of(&self, code: CellCode) -> Option<BuildingKind> {
        self.definition_of(code).map(|d| d.kind)
    }

    pub fn level_of(&self, code: CellCode) -> Option<u8> {
        self.definition_of(code).map(|d| d.level)
    }

    /// Highest registered level for a building name.
    pub fn max_level(&self, name: &str) -> Option<u8> {
        self.defs
            .iter()
            .filter(|d| d.name == name)
            .map(|d| d.level)
            .max()
    }

    /// Kind of a building name, from any of its registered levels.
    pub fn kind_named(&self, name: &str) -> Option<BuildingKind> {
        self.defs.iter().find(|d| d.name == name).map(|d| d.kind)
    }

    /// All (code, definition) pairs in code order.
    pub fn iter(&self) -> impl Iterator<Item = (CellCode, &BuildingDef)> {
        self.defs
            .iter()
            .enumerate()
            .map(|(i, d)| (CellCode((i + 1) as u8), d))
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl TryFrom<Vec<BuildingDef>> for Catalog {
    type Error = CatalogError;

    fn try_from(defs: Vec<BuildingDef>) -> Result<Self, Self::Error> {
        Self::from_defs(defs)
    }
}

impl From<Catalog> for Vec<BuildingDef> {
    fn from(catalog: Catalog) -> Self {
        catalog.defs
    }
}

// ── Shop prices ──────────────────────────────────────────────────────────

/// Purchase prices and upgrade cost bases per building name.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PriceList {
    pub purchase: BTreeMap<String, u64>,
    /// Upgrade cost = base × target level.
    pub upgrade_base: BTreeMap<String, u64>,
}

impl PriceList {
    pub fn standard() -> Self {
        let mut purchase = BTreeMap::new();
        purchase.insert(names::BIT_STORAGE.to_string(), 1000);
        purchase.insert(names::BIT_MINE.to_string(), 500);
        purchase.insert(names::LAB.to_string(), 3000);
        purchase.insert(names::PORTAL.to_string(), 5000);

        let mut upgrade_base = BTreeMap::new();
        upgrade_base.insert(names::GRID_HALL.to_string(), 2500);
        upgrade_base.insert(names::BIT_STORAGE.to_string(), 1000);
        upgrade_base.insert(names::BIT_MINE.to_string(), 500);

        Self {
            purchase,
            upgrade_base,
        }
    }

    /// `None` when the building is not sold in the shop (e.g. the grid-hall).
    pub fn purchase_price(&self, name: &str) -> Option<u64> {
        self.purchase.get(name).copied()
    }

    pub fn upgrade_cost(&self, name: &str, target_level: u8) -> Option<u64> {
        self.upgrade_base
            .get(name)
            .map(|base| base * u64::from(target_level))
    }
}

// ── Hub unlock tiers ─────────────────────────────────────────────────────

/// What one hub tier allows for one building name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Allowance {
    /// Highest level the building may be upgraded to.
    pub level: u8,
    /// How many may be placed.
    pub count: u32,
}

/// Allowances unlocked by a hub of one particular level.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnlockTier {
    pub allowances: BTreeMap<String, Allowance>,
}

impl UnlockTier {
    fn with(mut self, name: &str, level: u8, count: u32) -> Self {
        self.allowances
            .insert(name.to_string(), Allowance { level, count });
        self
    }
}

/// How tiers combine when the hub is above level 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AllowancePolicy {
    /// Only the tier matching the hub level counts; later tiers replace
    /// earlier ones.
    #[default]
    HighestTier,
    /// Counts add up across every unlocked tier; the level is the highest
    /// unlocked.
    Cumulative,
}

/// `tiers[i]` applies once a hub of level `i + 1` exists.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UnlockTable {
    pub tiers: Vec<UnlockTier>,
}

impl UnlockTable {
    pub fn standard() -> Self {
        let tier1 = UnlockTier::default()
            .with(names::BIT_STORAGE, 1, 2)
            .with(names::BIT_MINE, 1, 2);
        let tier2 = UnlockTier::default()
            .with(names::BIT_STORAGE, 2, 3)
            .with(names::BIT_MINE, 2, 4)
            .with(names::LAB, 1, 1);
        let tier3 = UnlockTier::default()
            .with(names::BIT_STORAGE, 3, 4)
            .with(names::BIT_MINE, 3, 6)
            .with(names::LAB, 1, 1)
            .with(names::PORTAL, 1, 1);
        Self {
            tiers: vec![tier1, tier2, tier3],
        }
    }

    /// Effective allowance for `name` with a hub of `hub_level` present.
    /// A hub level beyond the table uses the last tier; no hub allows nothing.
    pub fn allowance(&self, name: &str, hub_level: u8, policy: AllowancePolicy) -> Allowance {
        let unlocked = usize::from(hub_level).min(self.tiers.len());
        if unlocked == 0 {
            return Allowance::default();
        }
        match policy {
            AllowancePolicy::HighestTier => self.tiers[unlocked - 1]
                .allowances
                .get(name)
                .copied()
                .unwrap_or_default(),
            AllowancePolicy::Cumulative => self.tiers[..unlocked]
                .iter()
                .filter_map(|t| t.allowances.get(name))
                .fold(Allowance::default(), |acc, a| Allowance {
                    level: acc.level.max(a.level),
                    count: acc.count + a.count,
                }),
        }
    }
}

// ── Rules bundle ─────────────────────────────────────────────────────────

/// Everything static the engines need, bundled for injection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GameRules {
    pub catalog: Catalog,
    pub prices: PriceList,
    pub unlocks: UnlockTable,
    #[serde(default)]
    pub policy: AllowancePolicy,
}

impl GameRules {
    pub fn standard() -> Self {
        Self {
            catalog: Catalog::standard(),
            prices: PriceList::standard(),
            unlocks: UnlockTable::standard(),
            policy: AllowancePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: AllowancePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// How many of `name` the hub tier allows in total.
    pub fn allowed_count(&self, name: &str, hub_level: u8) -> u32 {
        self.unlocks.allowance(name, hub_level, self.policy).count
    }

    /// Highest level `name` may reach with the given hub. The hub itself is
    /// capped only by the catalog.
    pub fn level_cap(&self, name: &str, hub_level: u8) -> u8 {
        let catalog_max = self.catalog.max_level(name).unwrap_or(0);
        if self.catalog.kind_named(name) == Some(BuildingKind::Hub) {
            return catalog_max;
        }
        self.unlocks
            .allowance(name, hub_level, self.policy)
            .level
            .min(catalog_max)
    }
}

impl Default for GameRules {
    fn default() -> Self {
        Self::standard()
    }
}
