//! Save migration framework.
//!
//! A registry of transforms keyed by the save version each one upgrades to.
//! Loading runs every step above the stored version in ascending order and
//! stamps the result with [`CURRENT_SAVE_VERSION`]. Each step only backfills
//! what is missing, so running it twice is harmless.

use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::production;
use crate::state::{
    CURRENT_SAVE_VERSION, Disposition, Meters, MetahumanState, PeopleState, WorldState,
};

/// Errors that can occur during migration.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MigrationError {
    #[error("save version {found} is newer than this build supports ({supported})")]
    FutureVersion { found: u32, supported: u32 },
    #[error("no migration path from version {from} to version {to}")]
    NoMigrationPath { from: u32, to: u32 },
}

/// A transform bringing a state up to the version it is registered under.
pub type MigrationFn = fn(&mut WorldState, &Catalog);

/// Registry of migration steps keyed by target version.
#[derive(Debug, Clone)]
pub struct MigrationRegistry {
    steps: BTreeMap<u32, MigrationFn>,
}

impl MigrationRegistry {
    /// Create an empty migration registry.
    pub fn new() -> Self {
        Self {
            steps: BTreeMap::new(),
        }
    }

    /// Register the step that upgrades a save to `version`.
    pub fn register(&mut self, version: u32, step: MigrationFn) {
        self.steps.insert(version, step);
    }

    /// Number of registered migration steps.
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Whether every step from `from + 1` through `to` is registered.
    pub fn can_migrate(&self, from: u32, to: u32) -> bool {
        if from >= to {
            return from == to;
        }
        (from + 1..=to).all(|v| self.steps.contains_key(&v))
    }

    /// Bring `state` to [`CURRENT_SAVE_VERSION`] and recompute cached caps.
    pub fn migrate(&self, state: &mut WorldState, catalog: &Catalog) -> Result<(), MigrationError> {
        self.migrate_to(state, catalog, CURRENT_SAVE_VERSION)
    }

    pub fn migrate_to(
        &self,
        state: &mut WorldState,
        catalog: &Catalog,
        target: u32,
    ) -> Result<(), MigrationError> {
        let from = state.save_version;
        if from > target {
            return Err(MigrationError::FutureVersion {
                found: from,
                supported: target,
            });
        }
        if !self.can_migrate(from, target) {
            return Err(MigrationError::NoMigrationPath { from, to: target });
        }
        for (&version, step) in self.steps.range(from + 1..=target) {
            step(state, catalog);
            tracing::debug!(version, "migration.step_applied");
        }
        if from < target {
            tracing::info!(from, to = target, "migration.completed");
        }
        state.save_version = target;
        production::refresh_caps(state, catalog);
        Ok(())
    }
}

impl Default for MigrationRegistry {
    /// The registry covering every save version this build has written.
    fn default() -> Self {
        let mut registry = Self::new();
        registry.register(2, backfill_market);
        registry.register(3, backfill_stats);
        registry.register(4, backfill_domains);
        registry.register(5, backfill_collector);
        registry.register(6, backfill_roster);
        registry.register(7, repair_era);
        registry
    }
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

fn backfill_market(state: &mut WorldState, catalog: &Catalog) {
    if state.market.index.is_empty() {
        state.market.index = catalog
            .resources()
            .iter()
            .map(|r| (r.id.clone(), 1.0))
            .collect();
    }
}

fn backfill_stats(state: &mut WorldState, catalog: &Catalog) {
    if state.stats.produced.is_empty() {
        for resource in catalog.resources().iter() {
            state.stats.produced.insert(resource.id.clone(), 0.0);
            state.stats.wasted.entry(resource.id.clone()).or_insert(0.0);
            state.stats.raid_loss.entry(resource.id.clone()).or_insert(0.0);
        }
    }
    // Raid-free streaks count from the last save, not from the dawn of time.
    if state.stats.last_raid_at.is_none() {
        state.stats.last_raid_at = Some(state.clock.seconds);
    }
}

fn backfill_domains(state: &mut WorldState, catalog: &Catalog) {
    if state.domains.points.is_empty() {
        for domain in catalog.domains().iter() {
            state.domains.points.insert(domain.id.clone(), 0);
            state.domains.tiers.entry(domain.id.clone()).or_insert(0);
        }
    }
}

fn backfill_collector(state: &mut WorldState, catalog: &Catalog) {
    if state.collector.capacity_hours <= 0.0 {
        state.collector.capacity_hours = catalog.rules().collector_capacity_hours;
    }
    if state.collector.stored.is_empty() {
        for resource in catalog.resources().iter() {
            state.collector.stored.insert(resource.id.clone(), 0.0);
        }
    }
}

fn backfill_roster(state: &mut WorldState, catalog: &Catalog) {
    if state.metahumans.is_empty() {
        for meta in catalog.metahumans().iter() {
            let (affinity, disposition) = if state.has_flag(&format!("metahuman:{}:ally", meta.id)) {
                (2, Disposition::Ally)
            } else if state.has_flag(&format!("metahuman:{}:enemy", meta.id)) {
                (-2, Disposition::Enemy)
            } else {
                (0, Disposition::Neutral)
            };
            state.metahumans.insert(
                meta.id.clone(),
                MetahumanState {
                    affinity,
                    disposition,
                    last_encounter_at: None,
                },
            );
        }
    }
    if state.people.recruited.is_empty() && state.people.max_roster == 0 {
        state.people = PeopleState {
            recruited: Vec::new(),
            max_roster: catalog.rules().max_roster,
        };
    }
}

fn repair_era(state: &mut WorldState, catalog: &Catalog) {
    let current = catalog.era_order(state.era.as_str()).unwrap_or(i32::MIN);
    let flagged = catalog
        .eras()
        .iter()
        .filter(|era| era.completion_flags.iter().any(|f| state.flags.contains(f)))
        .max_by_key(|era| era.sort_order);
    if let Some(era) = flagged {
        if era.sort_order > current {
            tracing::info!(from = %state.era, to = %era.id, "migration.era_promoted");
            state.era = era.id.clone();
        }
    }

    let current = catalog.era_order(state.era.as_str()).unwrap_or(i32::MIN);
    for era in catalog.eras().iter().filter(|e| e.sort_order <= current) {
        state
            .unlocked_buildings
            .extend(era.unlocks_building_ids.iter().cloned());
        state
            .unlocked_projects
            .extend(era.unlocks_project_ids.iter().cloned());
    }

    let defaults = Meters::default();
    if state.meters.cohesion <= 0.0 {
        state.meters.cohesion = defaults.cohesion;
    }
    if state.meters.biosphere <= 0.0 {
        state.meters.biosphere = defaults.biosphere;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn stale(state: &WorldState) -> WorldState {
        let mut old = state.clone();
        old.save_version = 1;
        old.market.index.clear();
        old.stats.produced.clear();
        old.stats.last_raid_at = None;
        old.domains.points.clear();
        old.domains.tiers.clear();
        old.collector.capacity_hours = 0.0;
        old.collector.stored.clear();
        old.metahumans.clear();
        old.people = PeopleState::default();
        old.meters.cohesion = 0.0;
        old
    }

    #[test]
    fn default_registry_covers_every_version() {
        let registry = MigrationRegistry::default();
        assert_eq!(registry.step_count(), 6);
        assert!(registry.can_migrate(1, CURRENT_SAVE_VERSION));
        assert!(registry.can_migrate(CURRENT_SAVE_VERSION, CURRENT_SAVE_VERSION));
        assert!(!registry.can_migrate(CURRENT_SAVE_VERSION, 1));
    }

    #[test]
    fn gap_is_rejected() {
        let catalog = fixture_catalog();
        let mut registry = MigrationRegistry::new();
        registry.register(2, backfill_market);
        registry.register(4, backfill_domains);
        let mut state = fixture_state(&catalog);
        state.save_version = 1;
        assert_eq!(
            registry.migrate_to(&mut state, &catalog, 4),
            Err(MigrationError::NoMigrationPath { from: 1, to: 4 })
        );
        assert_eq!(state.save_version, 1);
    }

    #[test]
    fn future_version_is_rejected() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        state.save_version = CURRENT_SAVE_VERSION + 1;
        assert_eq!(
            MigrationRegistry::default().migrate(&mut state, &catalog),
            Err(MigrationError::FutureVersion {
                found: CURRENT_SAVE_VERSION + 1,
                supported: CURRENT_SAVE_VERSION,
            })
        );
    }

    #[test]
    fn version_one_is_backfilled() {
        let catalog = fixture_catalog();
        let fresh = fixture_state(&catalog);
        let mut state = stale(&fresh);
        state.flags.insert("metahuman:warden:ally".into());

        MigrationRegistry::default().migrate(&mut state, &catalog).unwrap();
        assert_eq!(state.save_version, CURRENT_SAVE_VERSION);
        assert_eq!(state.market.index, fresh.market.index);
        assert_eq!(state.stats.produced.len(), catalog.resources().len());
        assert_eq!(state.stats.last_raid_at, Some(0.0));
        assert_eq!(state.domains.points, fresh.domains.points);
        assert_eq!(state.collector.capacity_hours, fresh.collector.capacity_hours);
        assert_eq!(state.people.max_roster, catalog.rules().max_roster);
        assert_eq!(state.metahumans["warden"].disposition, Disposition::Ally);
        assert_eq!(state.metahumans["warden"].affinity, 2);
        assert_eq!(state.meters.cohesion, 0.6);
    }

    #[test]
    fn migration_is_idempotent() {
        let catalog = fixture_catalog();
        let registry = MigrationRegistry::default();
        let mut once = stale(&fixture_state(&catalog));
        registry.migrate(&mut once, &catalog).unwrap();

        let mut twice = once.clone();
        twice.save_version = 1;
        registry.migrate(&mut twice, &catalog).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn completion_flag_promotes_era_and_syncs_unlocks() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        state.save_version = 6;
        state.flags.insert("bronze_complete".into());
        state.unlocked_buildings.clear();

        MigrationRegistry::default().migrate(&mut state, &catalog).unwrap();
        assert_eq!(state.era.as_str(), "bronze");
        assert!(state.unlocked_buildings.contains("farm"));
        assert!(state.unlocked_buildings.contains("forge"));
    }
}
