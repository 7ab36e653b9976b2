//! Determinism checking and state comparison.
//!
//! Each area of the world is hashed independently so that when two runs
//! diverge the culprit subsystem can be named without a full diff.

use std::sync::Arc;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::sim::hash_encoded;
use crate::state::WorldState;

// ---------------------------------------------------------------------------
// Subsystem hashes
// ---------------------------------------------------------------------------

/// Per-area state hashes for debugging desyncs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubsystemHashes {
    pub ledger: u64,
    pub buildings: u64,
    pub projects: u64,
    pub factions: u64,
    pub dispatches: u64,
    pub collector: u64,
    pub market: u64,
    pub meters: u64,
    pub progression: u64,
    pub clock: u64,
}

impl SubsystemHashes {
    pub fn of(state: &WorldState) -> Self {
        Self {
            ledger: hash_encoded(&(&state.resources, &state.stats)),
            buildings: hash_encoded(&(&state.buildings, &state.unlocked_buildings, state.grid_size)),
            projects: hash_encoded(&(
                &state.projects,
                &state.queue,
                &state.completed_projects,
                &state.catalyst,
                state.chrono_shards,
            )),
            factions: hash_encoded(&(&state.factions, &state.unlocked_contracts)),
            dispatches: hash_encoded(&state.dispatches),
            collector: hash_encoded(&state.collector),
            market: hash_encoded(&state.market),
            meters: hash_encoded(&(&state.meters, &state.risk, &state.logistics)),
            progression: hash_encoded(&(
                &state.era,
                &state.domains,
                &state.achievements,
                &state.prestige,
                &state.flags,
                &state.policy,
                &state.people,
                &state.metahumans,
                &state.chains,
            )),
            clock: hash_encoded(&(&state.clock, &state.rng, state.next_serial)),
        }
    }

    fn areas(&self) -> [(&'static str, u64); 10] {
        [
            ("ledger", self.ledger),
            ("buildings", self.buildings),
            ("projects", self.projects),
            ("factions", self.factions),
            ("dispatches", self.dispatches),
            ("collector", self.collector),
            ("market", self.market),
            ("meters", self.meters),
            ("progression", self.progression),
            ("clock", self.clock),
        ]
    }
}

// ---------------------------------------------------------------------------
// Quick compare
// ---------------------------------------------------------------------------

/// Names of the areas whose hashes differ.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubsystemDiff {
    pub diverged: Vec<&'static str>,
}

impl SubsystemDiff {
    pub fn is_identical(&self) -> bool {
        self.diverged.is_empty()
    }
}

pub fn quick_compare(a: &WorldState, b: &WorldState) -> SubsystemDiff {
    let ha = SubsystemHashes::of(a);
    let hb = SubsystemHashes::of(b);
    let diverged = ha
        .areas()
        .into_iter()
        .zip(hb.areas())
        .filter(|((_, x), (_, y))| x != y)
        .map(|((name, _), _)| name)
        .collect();
    SubsystemDiff { diverged }
}

// ---------------------------------------------------------------------------
// Determinism validation
// ---------------------------------------------------------------------------

/// Result of a determinism validation run.
#[derive(Debug)]
pub struct DeterminismResult {
    pub is_deterministic: bool,
    /// First simulated hour at which the runs differed.
    pub divergence_hour: Option<u64>,
    /// (hour, hash of run A, hash of run B) per hour.
    pub hash_log: Vec<(u64, u64, u64)>,
    /// Areas that differed at the divergence point.
    pub diverged: Vec<&'static str>,
}

/// Run `hours` of simulation twice from the same world: once in one-hour
/// advances, once in `chunk_seconds` slices. Both must agree hour by hour.
pub fn validate_determinism(
    catalog: Arc<Catalog>,
    config: EngineConfig,
    state: WorldState,
    hours: u64,
    chunk_seconds: f64,
) -> DeterminismResult {
    let mut a = Engine::with_state(catalog.clone(), config.clone(), state.clone());
    let mut b = Engine::with_state(catalog, config, state);
    let chunk = chunk_seconds.clamp(1.0, 3_600.0);
    let slices = (3_600.0 / chunk).floor() as u64;
    let tail = 3_600.0 - slices as f64 * chunk;

    let mut hash_log = Vec::new();
    let mut divergence_hour = None;
    let mut diverged = Vec::new();
    let start = a.state().last_tick_at;
    for hour in 1..=hours {
        let end = start + hour as f64 * 3_600.0;
        a.advance(3_600.0, end, true);
        let mut now = end - 3_600.0;
        for i in 0..slices {
            now += chunk;
            let stamp = if i + 1 == slices && tail <= 0.0 { end } else { now };
            b.advance(chunk, stamp, true);
        }
        if tail > 0.0 {
            b.advance(tail, end, true);
        }
        let (ha, hb) = (a.state_hash(), b.state_hash());
        hash_log.push((hour, ha, hb));
        if ha != hb && divergence_hour.is_none() {
            divergence_hour = Some(hour);
            diverged = quick_compare(a.state(), b.state()).diverged;
            tracing::warn!(hour, ?diverged, "validation.diverged");
        }
    }
    DeterminismResult {
        is_deterministic: divergence_hour.is_none(),
        divergence_hour,
        hash_log,
        diverged,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn identical_states_compare_equal() {
        let catalog = fixture_catalog();
        let state = fixture_state(&catalog);
        assert!(quick_compare(&state, &state.clone()).is_identical());
    }

    #[test]
    fn divergence_names_the_area() {
        let catalog = fixture_catalog();
        let a = fixture_state(&catalog);
        let mut b = a.clone();
        b.collector.stored.insert("food".into(), 3.0);
        b.meters.cohesion = 0.1;
        assert_eq!(quick_compare(&a, &b).diverged, vec!["collector", "meters"]);
    }

    #[test]
    fn chunking_is_deterministic() {
        let catalog = Arc::new(fixture_catalog());
        let mut state = fixture_state(&catalog);
        place(&mut state, "farm", 0, 0);
        place(&mut state, "workshop", 1, 0);
        let result = validate_determinism(catalog, EngineConfig::default(), state, 3, 45.0);
        assert!(result.is_deterministic, "{:?}", result.diverged);
        assert_eq!(result.hash_log.len(), 3);
    }
}
