//! Property-based tests over the bundled content.
//!
//! Uses proptest to generate seeds, settlements and time partitions, then
//! checks that the world only depends on total simulated time and that
//! cached projections behave monotonically.

use std::path::PathBuf;
use std::sync::Arc;

use clay_core::catalog::Catalog;
use clay_core::config::EngineConfig;
use clay_core::domain;
use clay_core::engine::Engine;
use clay_core::production;
use clay_core::state::WorldState;
use clay_core::test_utils::*;
use clay_core::validation::{quick_compare, validate_determinism};
use proptest::prelude::*;

fn bundled() -> Arc<Catalog> {
    let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../content/pack.json");
    Arc::new(clay_data::load_catalog(&path).expect("bundled pack loads"))
}

// ===========================================================================
// Generators
// ===========================================================================

const KINDS: [&str; 5] = ["farm", "quarry", "storehouse", "palisade", "lodge"];

/// A stone-age settlement of up to `max` buildings on distinct tiles.
fn settlement(catalog: &Catalog, seed: u64, kinds: &[u8]) -> WorldState {
    let mut state = WorldState::new(catalog, &EngineConfig::default(), seed, 0.0);
    for (i, kind) in kinds.iter().enumerate() {
        let x = (i % 8) as i32;
        let y = (i / 8) as i32;
        place(&mut state, KINDS[*kind as usize % KINDS.len()], x, y);
    }
    production::refresh_caps(&mut state, catalog);
    state
}

fn arb_kinds(max: usize) -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(0..KINDS.len() as u8, 0..=max)
}

/// Split `total` seconds into 1..=8 positive slices.
fn arb_partition(total: u32) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::vec(1..total, 0..8).prop_map(move |mut cuts| {
        cuts.sort_unstable();
        cuts.dedup();
        let mut slices = Vec::with_capacity(cuts.len() + 1);
        let mut last = 0;
        for cut in cuts {
            slices.push(f64::from(cut - last));
            last = cut;
        }
        slices.push(f64::from(total - last));
        slices
    })
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(16))]

    /// Same seed and same inputs give the same world.
    #[test]
    fn same_seed_same_world(seed in any::<u64>(), kinds in arb_kinds(12)) {
        let catalog = bundled();
        let state = settlement(&catalog, seed, &kinds);
        let mut a = Engine::with_state(catalog.clone(), EngineConfig::default(), state.clone());
        let mut b = Engine::with_state(catalog, EngineConfig::default(), state);
        a.advance(7_200.0, 7_200.0, true);
        b.advance(7_200.0, 7_200.0, true);
        prop_assert_eq!(a.state_hash(), b.state_hash());
        prop_assert_eq!(a.state(), b.state());
    }

    /// Any partition of the same elapsed time yields the same world.
    #[test]
    fn partition_invariance(seed in any::<u64>(), kinds in arb_kinds(10), slices in arb_partition(5_400)) {
        let catalog = bundled();
        let state = settlement(&catalog, seed, &kinds);
        let mut whole = Engine::with_state(catalog.clone(), EngineConfig::default(), state.clone());
        let mut parts = Engine::with_state(catalog, EngineConfig::default(), state);
        whole.advance(5_400.0, 0.0, true);
        for slice in &slices {
            parts.advance(*slice, 0.0, true);
        }
        prop_assert_eq!(whole.state().clock.tick, 5_400);
        prop_assert_eq!(whole.state_hash(), parts.state_hash());
    }

    /// Stocks stay within [0, cap] and meters within [0, 1].
    #[test]
    fn stocks_and_meters_stay_bounded(seed in any::<u64>(), kinds in arb_kinds(16)) {
        let catalog = bundled();
        let state = settlement(&catalog, seed, &kinds);
        let mut engine = Engine::with_state(catalog, EngineConfig::default(), state);
        for hour in 1..=6 {
            engine.advance(3_600.0, f64::from(hour) * 3_600.0, true);
            for (id, resource) in &engine.state().resources {
                prop_assert!(resource.amount >= 0.0, "{} negative", id);
                prop_assert!(resource.amount <= resource.cap + 1e-9, "{} over cap", id);
            }
            let meters = &engine.state().meters;
            prop_assert!((0.0..=1.0).contains(&meters.cohesion));
            prop_assert!((0.0..=1.0).contains(&meters.biosphere));
        }
    }

    /// Adding a building never lowers any cap.
    #[test]
    fn caps_are_monotone_in_buildings(kinds in arb_kinds(12), extra in 0..KINDS.len() as u8) {
        let catalog = bundled();
        let config = EngineConfig::default();
        let base = settlement(&catalog, 1, &kinds);
        let mut grown = base.clone();
        place(&mut grown, KINDS[extra as usize], 9, 9);
        let before = Engine::with_state(catalog.clone(), config.clone(), base).derived().caps;
        let after = Engine::with_state(catalog, config, grown).derived().caps;
        for (id, cap) in &before {
            prop_assert!(after[id] >= *cap, "{} cap fell", id);
        }
    }

    /// Re-evaluating domain tiers without new points changes nothing.
    #[test]
    fn tier_unlocks_are_idempotent(points in 0u32..12, domain_index in 0usize..3) {
        let catalog = bundled();
        let mut state = WorldState::new(&catalog, &EngineConfig::default(), 9, 0.0);
        let domain_id = catalog.domains().iter().nth(domain_index).map(|d| d.id.clone()).unwrap();
        domain::grant_points(&mut state, &catalog, domain_id.as_str(), points).unwrap();
        let once = state.clone();
        domain::run(&mut state, &catalog);
        domain::run(&mut state, &catalog);
        prop_assert_eq!(&state, &once);
    }
}

// ===========================================================================
// Chunk validation
// ===========================================================================

#[test]
fn hourly_and_chunked_runs_agree() {
    let catalog = bundled();
    let state = settlement(&catalog, 0xC1A7, &[0, 0, 1, 2, 3, 4, 0, 1]);
    for chunk in [1.0, 17.0, 600.0, 1_337.0] {
        let result = validate_determinism(catalog.clone(), EngineConfig::default(), state.clone(), 4, chunk);
        assert!(
            result.is_deterministic,
            "chunk {chunk} diverged at {:?}: {:?}",
            result.divergence_hour, result.diverged
        );
        assert_eq!(result.hash_log.len(), 4);
    }
}

#[test]
fn multi_day_offline_runs_split_the_same_way() {
    const DAYS: f64 = 3.0;
    let total = DAYS * 86_400.0;
    let catalog = bundled();
    let state = settlement(&catalog, 0x5EED, &[0, 0, 1, 1, 2, 3, 4]);
    let config = EngineConfig::default();

    let mut whole = Engine::with_state(catalog.clone(), config.clone(), state.clone());
    whole.advance(total, total, true);

    let mut hourly = Engine::with_state(catalog.clone(), config.clone(), state.clone());
    for hour in 1..=(total / 3_600.0) as u32 {
        hourly.advance(3_600.0, f64::from(hour) * 3_600.0, true);
    }

    let mut ragged = Engine::with_state(catalog, config, state);
    let mut now = 0.0;
    for slice in [7.0, 5_000.0, 86_393.0, 1.0, 40_000.0, 127_799.0] {
        now += slice;
        ragged.advance(slice, now, true);
    }
    assert_eq!(now, total);

    for other in [&hourly, &ragged] {
        let diff = quick_compare(whole.state(), other.state());
        assert!(diff.is_identical(), "diverged: {:?}", diff.diverged);
        assert_eq!(whole.state().rng, other.state().rng);
        assert_eq!(whole.state().chains, other.state().chains);
        assert_eq!(whole.state().resources, other.state().resources);
        assert_eq!(whole.state().stats, other.state().stats);
    }
}
