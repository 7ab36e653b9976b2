//! Scenarios played against the bundled content pack.
//!
//! These load `content/pack.json` through the data loader and drive the
//! engine only through its command surface and `advance`, the way a host
//! would.

use std::path::PathBuf;
use std::sync::Arc;

use clay_core::catalog::Catalog;
use clay_core::command::{Command, CommandError};
use clay_core::config::EngineConfig;
use clay_core::engine::Engine;
use clay_core::production;
use clay_core::state::{DispatchStatus, ProjectSource, WorldState};
use clay_core::test_utils::*;

const SEED: u64 = 42;

fn pack_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../content/pack.json")
}

fn bundled() -> Arc<Catalog> {
    Arc::new(clay_data::load_catalog(&pack_path()).expect("bundled pack loads"))
}

fn fresh(catalog: &Arc<Catalog>) -> Engine {
    Engine::new(catalog.clone(), EngineConfig::default(), SEED, 0.0)
}

fn fresh_state(catalog: &Catalog) -> WorldState {
    WorldState::new(catalog, &EngineConfig::default(), SEED, 0.0)
}

// ===========================================================================
// Content
// ===========================================================================

#[test]
fn pack_covers_every_table() {
    let catalog = bundled();
    assert_eq!(catalog.eras().len(), 4);
    assert_eq!(catalog.starting_era().id.as_str(), "stone");
    assert!(catalog.hostile_faction().is_some());
    assert!(!catalog.chains().is_empty());
    assert!(!catalog.achievements().is_empty());
    assert_eq!(catalog.rules().cohesion_resource.as_ref().map(|r| r.as_str()), Some("influence"));
}

#[test]
fn fresh_world_starts_in_the_stone_age() {
    let catalog = bundled();
    let engine = fresh(&catalog);
    let state = engine.state();
    assert_eq!(state.era.as_str(), "stone");
    assert_eq!(state.crew_count, 2);
    assert!(state.unlocked_buildings.contains("farm"));
    assert!(!state.unlocked_buildings.contains("workshop"));
    assert_eq!(state.amount("food"), 80.0);
}

// ===========================================================================
// Opening
// ===========================================================================

#[test]
fn built_farm_feeds_the_settlement() {
    let catalog = bundled();
    let mut engine = fresh(&catalog);
    engine.start_building("farm", 2, 2).unwrap();
    engine.start_building("quarry", 3, 2).unwrap();
    assert_eq!(
        engine.building_block_reason("farm", 2, 2),
        Some(CommandError::TileOccupied)
    );

    engine.advance(900.0 + 1.0, 901.0, true);
    assert!(engine.state().projects.is_empty());
    let derived = engine.derived();
    assert!(derived.rates_per_hour["food"] > 0.0);
    assert!(derived.rates_per_hour["materials"] > 0.0);

    let produced = |engine: &Engine| engine.state().stats.produced.get("food").copied().unwrap_or(0.0);
    let before = produced(&engine);
    engine.advance(3_600.0, 4_501.0, true);
    assert!(produced(&engine) > before);
}

#[test]
fn keystone_opens_the_next_era() {
    let catalog = bundled();
    let mut engine = fresh(&catalog);
    let reason = engine.project_block_reason("bronze_working");
    assert_eq!(reason, Some(CommandError::ProjectLocked));

    engine.start_project("pottery", ProjectSource::Research).unwrap();
    engine.advance(10_800.0 + 1.0, 10_801.0, true);

    let state = engine.state();
    assert!(state.completed_projects.contains("pottery"));
    assert_eq!(state.era.as_str(), "bronze");
    assert!(state.unlocked_buildings.contains("workshop"));
    assert!(state.unlocked_projects.contains("bronze_working"));
    assert!(state.era_complete(catalog.era("stone").unwrap()));
}

#[test]
fn tagged_research_earns_domain_points() {
    let catalog = bundled();
    let mut engine = fresh(&catalog);
    engine.start_project("irrigation", ProjectSource::Research).unwrap();
    engine.advance(3_600.0 + 1.0, 3_601.0, true);
    assert_eq!(engine.state().domains.points.get("agrarian").copied(), Some(1));
}

// ===========================================================================
// Dispatches, contracts, policies
// ===========================================================================

#[test]
fn forage_round_trip() {
    let catalog = bundled();
    let mut engine = fresh(&catalog);
    assert_eq!(
        engine.dispatch_block_reason("deep_survey"),
        Some(CommandError::DispatchLocked)
    );
    let key = engine.start_dispatch("forage").unwrap();
    assert_eq!(
        engine.dispatch_block_reason("forage"),
        Some(CommandError::DispatchActive)
    );
    assert_eq!(
        engine.collect_dispatch(key),
        Err(CommandError::DispatchNotReady)
    );

    engine.advance(1_800.0 + 1.0, 1_801.0, true);
    assert_ne!(engine.state().dispatches[key].status, DispatchStatus::Active);
    engine.collect_dispatch(key).unwrap();
    assert!(engine.state().dispatches.is_empty());
    assert!(engine.state().stats.dispatch_rewards.get("food").copied().unwrap_or(0.0) > 0.0);
}

#[test]
fn contracts_respect_unlocks() {
    let catalog = bundled();
    let mut engine = fresh(&catalog);
    assert_eq!(
        engine.contract_block_reason("monastery_study"),
        Some(CommandError::ContractLocked)
    );
    assert_eq!(
        engine.contract_block_reason("mercenary_watch"),
        Some(CommandError::RelationshipTooLow)
    );
    engine.start_contract("grain_pact").unwrap();
    assert!(engine.state().contract_active("grain_pact"));
    assert_eq!(
        engine.contract_block_reason("grain_pact"),
        Some(CommandError::ContractActive)
    );
}

#[test]
fn levy_raises_security() {
    let catalog = bundled();
    let mut engine = fresh(&catalog);
    let before = engine.derived().risk.security;
    assert_eq!(
        engine.policy_block_reason("economy", Some("levy")),
        Some(CommandError::PolicySlotMismatch)
    );
    assert_eq!(
        engine.policy_block_reason("economy", Some("free_markets")),
        Some(CommandError::PolicyLocked)
    );
    engine.set_policy("military", Some("levy")).unwrap();
    let after = engine.derived().risk.security;
    assert!(after > before, "{after} <= {before}");
}

// ===========================================================================
// Megaprojects
// ===========================================================================

#[test]
fn great_work_is_exclusive() {
    let catalog = bundled();
    let mut state = fresh_state(&catalog);
    state.unlocked_projects.insert("colossus".into());
    state.unlocked_projects.insert("grand_canal".into());
    state.crew_count = 6;
    state.max_crew = 6;
    place(&mut state, "storehouse", 0, 0);
    production::refresh_caps(&mut state, &catalog);
    fill_all(&mut state);
    let mut engine = Engine::with_state(catalog.clone(), EngineConfig::default(), state);

    engine
        .execute(&Command::StartProject {
            project: "colossus".into(),
            source: ProjectSource::Megaproject,
        })
        .unwrap();
    let reason = engine.project_block_reason("grand_canal");
    assert_eq!(
        reason,
        Some(CommandError::FamilyLocked("the Great Work".to_string()))
    );
    assert_eq!(
        engine.state().chosen_families.get("great_work").map(|p| p.as_str()),
        Some("colossus")
    );
}

// ===========================================================================
// Prestige
// ===========================================================================

#[test]
fn ascension_keeps_legacy_and_upgrades() {
    let catalog = bundled();
    let mut state = fresh_state(&catalog);
    state.completed_projects.insert("bronze_working".into());
    state.completed_projects.insert("iron_smelting".into());
    let mut engine = Engine::with_state(catalog.clone(), EngineConfig::default(), state);
    assert_eq!(engine.legacy_gain_breakdown().era_points, 2);

    let gain = engine.ascend(100.0);
    assert_eq!(gain, 2);
    assert!(engine.state().completed_projects.is_empty());
    assert_eq!(engine.state().prestige.legacy_points, 2);
    assert_eq!(engine.state().prestige.ascensions, 1);

    engine.purchase_legacy_upgrade("head_start").unwrap();
    assert_eq!(engine.state().crew_count, 3);
    assert_eq!(
        engine.legacy_upgrade_block_reason("head_start"),
        Some(CommandError::AlreadyOwned)
    );

    // Owned upgrades re-apply on the next run.
    engine.ascend(200.0);
    assert_eq!(engine.state().crew_count, 3);
    assert_eq!(engine.state().prestige.ascensions, 2);
}

// ===========================================================================
// Long run
// ===========================================================================

#[test]
fn autoplanned_week_makes_progress() {
    let catalog = bundled();
    let mut engine = fresh(&catalog);
    engine.set_auto_planner_enabled(true);
    for tag in ["economy", "era", "science", "infrastructure"] {
        engine.set_auto_plan_tag(tag, true);
    }
    for hour in 1..=24 * 7 {
        if engine.state().dispatches.is_empty() && engine.dispatch_block_reason("forage").is_none() {
            engine.start_dispatch("forage").unwrap();
        }
        engine.advance(3_600.0, hour as f64 * 3_600.0, true);
        let ready: Vec<_> = engine
            .state()
            .dispatches
            .iter()
            .filter(|(_, d)| d.status != DispatchStatus::Active)
            .map(|(key, _)| key)
            .collect();
        for key in ready {
            engine.collect_dispatch(key).unwrap();
        }
    }
    let state = engine.state();
    assert!(!state.completed_projects.is_empty());
    assert!(state.stats.dispatches_completed > 0);
    for resource in state.resources.values() {
        assert!(resource.amount >= 0.0);
        assert!(resource.amount <= resource.cap + 1e-9);
    }
    assert!((0.0..=1.0).contains(&state.meters.cohesion));
    assert!((0.0..=1.0).contains(&state.meters.biosphere));
}
