//! Pure game logic for BitGrid.
//!
//! This crate contains all game logic that is independent of any storage,
//! timer, or renderer. Functions take plain data and return results, making
//! them unit-testable and portable across the browser shell, native CLI
//! tools, and the headless harness.
//!
//! # Module Overview
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`arena`] | Lightcycle arena: half-cell movement, trails, AI, win/loss |
//! | [`catalog`] | Building registry, cell codes, shop prices, hub unlock tiers |
//! | [`constants`] | Grid dimensions, rates, capacities, building names |
//! | [`economy`] | Storage capacity, production tick, place/move/upgrade/collect |
//! | [`grid`] | The 8×8 base layout of cell codes |
//! | [`sector`] | Seeded sector generation and sector id progression |

pub mod arena;
pub mod catalog;
pub mod constants;
pub mod economy;
pub mod grid;
pub mod sector;
