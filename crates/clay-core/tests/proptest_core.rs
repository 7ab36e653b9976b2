//! Property-based tests for the Clay core engine.
//!
//! Uses proptest to generate random command and advance sequences against
//! the fixture catalog, then checks determinism, rejection atomicity and
//! save transparency.

use std::sync::Arc;

use clay_core::catalog::Catalog;
use clay_core::command::Command;
use clay_core::config::EngineConfig;
use clay_core::engine::Engine;
use clay_core::migration::MigrationRegistry;
use clay_core::serialize;
use clay_core::state::{DispatchStatus, ProjectSource};
use clay_core::test_utils::*;
use proptest::prelude::*;

// ===========================================================================
// Generators
// ===========================================================================

const BUILDINGS: [&str; 5] = ["farm", "workshop", "granary", "mill", "palisade"];
const PROJECTS: [&str; 4] = ["irrigation", "pottery", "sky_array", "deep_core"];
const POLICIES: [&str; 2] = ["rationing", "free_trade"];

#[derive(Debug, Clone)]
enum Op {
    Build(usize, i32, i32),
    Project(usize),
    Dispatch,
    CollectDispatches,
    CollectCache,
    Policy(usize),
    Advance(u32),
}

fn arb_ops(max: usize) -> impl Strategy<Value = Vec<Op>> {
    proptest::collection::vec(
        prop_oneof![
            (0..BUILDINGS.len(), 0..6i32, 0..6i32).prop_map(|(b, x, y)| Op::Build(b, x, y)),
            (0..PROJECTS.len()).prop_map(Op::Project),
            Just(Op::Dispatch),
            Just(Op::CollectDispatches),
            Just(Op::CollectCache),
            (0..POLICIES.len()).prop_map(Op::Policy),
            (1..7_200u32).prop_map(Op::Advance),
        ],
        1..=max,
    )
}

fn commands_for(engine: &Engine, op: &Op) -> Vec<Command> {
    match op {
        Op::Build(b, x, y) => vec![Command::StartBuilding {
            building: BUILDINGS[*b].into(),
            x: *x,
            y: *y,
        }],
        Op::Project(p) => vec![Command::StartProject {
            project: PROJECTS[*p].into(),
            source: ProjectSource::Research,
        }],
        Op::Dispatch => vec![Command::StartDispatch("forage".into())],
        Op::CollectDispatches => engine
            .state()
            .dispatches
            .iter()
            .filter(|(_, d)| d.status != DispatchStatus::Active)
            .map(|(key, _)| Command::CollectDispatch(key))
            .collect(),
        Op::CollectCache => vec![Command::CollectCache],
        Op::Policy(p) => vec![Command::SetPolicy {
            slot: "economy".into(),
            policy: Some(POLICIES[*p].into()),
        }],
        Op::Advance(_) => Vec::new(),
    }
}

fn engine(catalog: &Arc<Catalog>, seed: u64) -> Engine {
    let mut state = fixture_state(catalog);
    state.rng = clay_core::rng::SimRng::new(seed);
    fill_all(&mut state);
    Engine::with_state(catalog.clone(), EngineConfig::default(), state)
}

/// Apply one op. Returns how many commands were rejected.
fn apply(engine: &mut Engine, op: &Op, clock: &mut f64) -> usize {
    if let Op::Advance(secs) = op {
        *clock += f64::from(*secs);
        engine.advance(f64::from(*secs), *clock, true);
        return 0;
    }
    let mut rejected = 0;
    for command in commands_for(engine, op) {
        if engine.execute(&command).is_err() {
            rejected += 1;
        }
    }
    rejected
}

// ===========================================================================
// Properties
// ===========================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// The same seed and the same inputs give the same world.
    #[test]
    fn command_sequences_are_deterministic(seed in any::<u64>(), ops in arb_ops(24)) {
        let catalog = Arc::new(fixture_catalog());
        let mut a = engine(&catalog, seed);
        let mut b = engine(&catalog, seed);
        let (mut ca, mut cb) = (0.0, 0.0);
        for op in &ops {
            apply(&mut a, op, &mut ca);
            apply(&mut b, op, &mut cb);
        }
        prop_assert_eq!(a.state_hash(), b.state_hash());
    }

    /// A rejected command leaves the world exactly as it was.
    #[test]
    fn rejected_commands_are_atomic(seed in any::<u64>(), ops in arb_ops(24)) {
        let catalog = Arc::new(fixture_catalog());
        let mut engine = engine(&catalog, seed);
        let mut clock = 0.0;
        for op in &ops {
            if matches!(op, Op::Advance(_)) {
                apply(&mut engine, op, &mut clock);
                continue;
            }
            for command in commands_for(&engine, op) {
                let before = engine.state().clone();
                if engine.execute(&command).is_err() {
                    prop_assert_eq!(engine.state(), &before);
                }
            }
        }
    }

    /// Saving and loading mid-sequence does not change where the run ends.
    #[test]
    fn save_load_is_transparent(seed in any::<u64>(), ops in arb_ops(16), split in 0usize..16) {
        let catalog = Arc::new(fixture_catalog());
        let mut live = engine(&catalog, seed);
        let mut clock = 0.0;
        let split = split.min(ops.len());
        for op in &ops[..split] {
            apply(&mut live, op, &mut clock);
        }
        let bytes = serialize::serialize(live.state()).unwrap();
        let state = serialize::deserialize(&bytes, &catalog, &MigrationRegistry::default()).unwrap();
        let mut loaded = Engine::with_state(catalog.clone(), EngineConfig::default(), state);
        let mut loaded_clock = clock;
        for op in &ops[split..] {
            apply(&mut live, op, &mut clock);
            apply(&mut loaded, op, &mut loaded_clock);
        }
        prop_assert_eq!(live.state_hash(), loaded.state_hash());
    }
}
