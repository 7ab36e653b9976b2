//! Clay Core -- the deterministic economy simulation behind an idle
//! civilization game.
//!
//! This crate owns the content catalog, the single serializable world state,
//! the fixed-step simulation pipeline, player commands with typed rejection
//! reasons, offline catch-up, prestige, save migration and replay. It has no
//! rendering, input or wall-clock dependencies: the host passes `now` in.
//!
//! # Fixed-Step Pipeline
//!
//! [`engine::Engine::advance`] converts elapsed seconds into whole 1-second
//! steps through an accumulator, so any partition of the same elapsed time
//! yields the same world. Each step runs:
//!
//! 1. **Inputs** -- passive modifiers, caps, placement, logistics factor.
//! 2. **Production** -- building and contract flows, storage clamp, collector.
//! 3. **Risk** -- exposure, security and hostility, then the raid roll.
//! 4. **Market** -- hourly price index drift.
//! 5. **Contracts and dispatches** -- expiry, renewal, outcome rolls.
//! 6. **Projects** -- progress, completion effects, queue, auto-planner.
//! 7. **Progression** -- domain tiers and achievements.
//! 8. **Events** -- chain triggers or a weighted random event.
//! 9. **Meters** -- cohesion and biosphere drift.
//!
//! # Commands
//!
//! Every player action has a `check_*` function that returns the same
//! [`command::CommandError`] the action would, without mutating anything:
//!
//! ```rust,ignore
//! if let Some(reason) = engine.building_block_reason("farm", 3, 4) {
//!     show_tooltip(reason.to_string());
//! }
//! let key = engine.start_building("farm", 3, 4)?;
//! ```
//!
//! # Key Types
//!
//! - [`engine::Engine`] -- Owns the world and drives the pipeline.
//! - [`catalog::Catalog`] -- Immutable, validated content tables.
//! - [`state::WorldState`] -- The complete persistent world.
//! - [`effect::Effect`] -- The closed vocabulary of content effects.
//! - [`derived::DerivedState`] -- Pure projections for display.
//! - [`serialize`] -- Versioned snapshots via bitcode, with migrations.

pub mod achievement;
pub mod catalog;
pub mod chain;
pub mod collector;
pub mod command;
pub mod config;
pub mod contract;
pub mod derived;
pub mod dispatch;
pub mod domain;
pub mod effect;
pub mod engine;
pub mod event;
pub mod guidance;
pub mod id;
pub mod logistics;
pub mod market;
pub mod meters;
pub mod migration;
pub mod people;
pub mod policy;
pub mod prestige;
pub mod production;
pub mod project;
pub mod replay;
pub mod risk;
pub mod rng;
pub mod serialize;
pub mod sim;
pub mod state;
pub mod validation;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
