//! BitGrid Core - session engine for the base-building game
//!
//! Wraps the pure rules in `bitgrid-logic` with the stateful parts of a
//! running game: fixed-cadence timers, a key-value persistence layer, and
//! one [`engine::GameEngine`] that routes player actions through both.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use bitgrid_core::prelude::*;
//!
//! let store = DirStore::open("save").unwrap();
//! let mut engine = GameEngine::open(store, Arc::new(GameRules::standard())).unwrap();
//!
//! loop {
//!     engine.update(Duration::from_millis(16)).unwrap(); // ~60 FPS
//! }
//! ```

pub mod engine;
pub mod persistence;
pub mod scheduler;

/// Commonly used types for convenient importing
pub mod prelude {
    pub use crate::engine::{EngineError, GameEngine, TickReport};
    pub use crate::persistence::{DirStore, KeyValueStore, MemoryStore, Repository};
    pub use crate::scheduler::TickTimer;
    pub use bitgrid_logic::arena::{ArenaPhase, Direction, StepOutcome};
    pub use bitgrid_logic::catalog::GameRules;
}
