//! Effects: the closed vocabulary content uses to change the world.
//!
//! One-shot sources (project completion, domain tiers, achievements, event
//! choices, penalties, legacy upgrades) apply effects directly to the
//! [`WorldState`]. Passive sources (active policies, recruited people,
//! allied or hostile metahumans) are folded every step into a [`Modifiers`]
//! value; only the modifier variants contribute there.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::event::EventCategory;
use crate::id::*;
use crate::state::{Disposition, MetahumanState, WorldState};

// ---------------------------------------------------------------------------
// Effect
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Effect {
    AddResourceCap { resource: ResourceId, amount: f64 },
    /// Multiplies the production multiplier of one resource.
    AddResourceMultiplier { resource: ResourceId, multiplier: f64 },
    AddGlobalMultiplier { multiplier: f64 },
    UnlockBuilding { building: BuildingId },
    UnlockProject { project: ProjectId },
    UnlockEra { era: EraId },
    GrantResource { resource: ResourceId, amount: f64 },
    AdjustFaction { faction: FactionId, delta: i32 },
    AddCrew { count: u32 },
    ProjectSpeedBonus { amount: f64 },
    AddSecurityBonus { amount: f64 },
    AddLogisticsCap { amount: f64 },
    AddCohesion { amount: f64 },
    AddBiosphere { amount: f64 },
    /// Cohesion drift per hour. Passive sources only.
    AddCohesionRate { amount: f64 },
    /// Biosphere drift per hour. Passive sources only.
    AddBiosphereRate { amount: f64 },
    AddOfflineCap { days: u32 },
    AddCollectorCapacityHours { hours: f64 },
    UnlockCatalyst,
    GrantChronoShards { amount: u32 },
    UnlockContract { contract: ContractId },
    SetFlag { flag: FlagId },
    AdjustMetahumanAffinity { metahuman: MetahumanId, delta: i32 },
}

// ---------------------------------------------------------------------------
// Passive modifiers
// ---------------------------------------------------------------------------

/// Aggregate of passive effects, rebuilt from scratch whenever needed.
#[derive(Debug, Clone, PartialEq)]
pub struct Modifiers {
    pub resource_multipliers: BTreeMap<ResourceId, f64>,
    pub global_multiplier: f64,
    pub project_speed: f64,
    pub security: f64,
    pub logistics: f64,
    pub storage_additions: BTreeMap<ResourceId, f64>,
    pub cohesion_rate: f64,
    pub biosphere_rate: f64,
}

impl Default for Modifiers {
    fn default() -> Self {
        Self {
            resource_multipliers: BTreeMap::new(),
            global_multiplier: 1.0,
            project_speed: 0.0,
            security: 0.0,
            logistics: 0.0,
            storage_additions: BTreeMap::new(),
            cohesion_rate: 0.0,
            biosphere_rate: 0.0,
        }
    }
}

impl Modifiers {
    /// Fold every passive source currently in effect.
    pub fn collect(state: &WorldState, catalog: &Catalog) -> Self {
        let mut modifiers = Self::default();
        for policy_id in state.policy.active.values() {
            if let Some(policy) = catalog.policy(policy_id.as_str()) {
                modifiers.absorb_all(&policy.effects);
            }
        }
        for person_id in &state.people.recruited {
            if let Some(person) = catalog.person(person_id.as_str()) {
                modifiers.absorb_all(&person.effects);
            }
        }
        for (meta_id, meta_state) in &state.metahumans {
            let Some(meta) = catalog.metahuman(meta_id.as_str()) else {
                continue;
            };
            match meta_state.disposition {
                Disposition::Ally => modifiers.absorb_all(&meta.ally_passive_effects),
                Disposition::Enemy => modifiers.absorb_all(&meta.enemy_passive_effects),
                Disposition::Neutral => {}
            }
        }
        modifiers
    }

    pub fn absorb_all(&mut self, effects: &[Effect]) {
        for effect in effects {
            self.absorb(effect);
        }
    }

    /// Fold one effect. Non-modifier variants are ignored.
    pub fn absorb(&mut self, effect: &Effect) {
        match effect {
            Effect::AddResourceMultiplier {
                resource,
                multiplier,
            } => {
                *self
                    .resource_multipliers
                    .entry(resource.clone())
                    .or_insert(1.0) *= multiplier;
            }
            Effect::AddGlobalMultiplier { multiplier } => self.global_multiplier *= multiplier,
            Effect::ProjectSpeedBonus { amount } => self.project_speed += amount,
            Effect::AddSecurityBonus { amount } => self.security += amount,
            Effect::AddLogisticsCap { amount } => self.logistics += amount,
            Effect::AddResourceCap { resource, amount } => {
                *self.storage_additions.entry(resource.clone()).or_insert(0.0) += amount;
            }
            Effect::AddCohesionRate { amount } => self.cohesion_rate += amount,
            Effect::AddBiosphereRate { amount } => self.biosphere_rate += amount,
            _ => {}
        }
    }

    pub fn resource_multiplier(&self, resource: &str) -> f64 {
        self.resource_multipliers.get(resource).copied().unwrap_or(1.0)
    }
}

// ---------------------------------------------------------------------------
// One-shot application
// ---------------------------------------------------------------------------

pub fn apply_all(state: &mut WorldState, catalog: &Catalog, effects: &[Effect]) {
    for effect in effects {
        apply(state, catalog, effect);
    }
}

/// Apply one effect to the world. References to ids missing from the
/// catalog contribute nothing.
pub fn apply(state: &mut WorldState, catalog: &Catalog, effect: &Effect) {
    match effect {
        Effect::AddResourceCap { resource, amount } => {
            *state
                .bonuses
                .storage_additions
                .entry(resource.clone())
                .or_insert(0.0) += amount;
        }
        Effect::AddResourceMultiplier {
            resource,
            multiplier,
        } => {
            *state
                .bonuses
                .resource_multipliers
                .entry(resource.clone())
                .or_insert(1.0) *= multiplier;
        }
        Effect::AddGlobalMultiplier { multiplier } => {
            state.bonuses.global_multiplier *= multiplier;
        }
        Effect::UnlockBuilding { building } => {
            state.unlocked_buildings.insert(building.clone());
        }
        Effect::UnlockProject { project } => {
            state.unlocked_projects.insert(project.clone());
        }
        Effect::UnlockEra { era } => unlock_era(state, catalog, era),
        Effect::GrantResource { resource, amount } => {
            state.grant_resource(resource.as_str(), *amount);
        }
        Effect::AdjustFaction { faction, delta } => {
            state.adjust_faction(faction.as_str(), *delta);
        }
        Effect::AddCrew { count } => {
            state.crew_count += count;
            state.max_crew = state.max_crew.max(state.crew_count);
        }
        Effect::ProjectSpeedBonus { amount } => state.bonuses.project_speed += amount,
        Effect::AddSecurityBonus { amount } => state.bonuses.security += amount,
        Effect::AddLogisticsCap { amount } => state.bonuses.logistics += amount,
        Effect::AddCohesion { amount } => state.meters.add_cohesion(*amount),
        Effect::AddBiosphere { amount } => state.meters.add_biosphere(*amount),
        // Rates only exist as passive modifiers.
        Effect::AddCohesionRate { .. } | Effect::AddBiosphereRate { .. } => {}
        Effect::AddOfflineCap { days } => state.settings.offline_cap_days += days,
        Effect::AddCollectorCapacityHours { hours } => {
            state.collector.capacity_hours = (state.collector.capacity_hours + hours).max(0.0);
        }
        // Unlocking again shortens the cooldown instead.
        Effect::UnlockCatalyst => match state.catalyst.available_at {
            Some(_) => state.catalyst.level += 1,
            None => state.catalyst.available_at = Some(state.clock.seconds),
        },
        Effect::GrantChronoShards { amount } => state.chrono_shards += amount,
        Effect::UnlockContract { contract } => {
            state.unlocked_contracts.insert(contract.clone());
        }
        Effect::SetFlag { flag } => {
            state.flags.insert(flag.clone());
        }
        Effect::AdjustMetahumanAffinity { metahuman, delta } => {
            adjust_metahuman(state, catalog, metahuman, *delta);
        }
    }
}

fn unlock_era(state: &mut WorldState, catalog: &Catalog, era_id: &EraId) {
    let Some(era) = catalog.era(era_id.as_str()) else {
        return;
    };
    state
        .unlocked_buildings
        .extend(era.unlocks_building_ids.iter().cloned());
    state
        .unlocked_projects
        .extend(era.unlocks_project_ids.iter().cloned());
    let current = catalog.era_order(state.era.as_str()).unwrap_or(i32::MIN);
    if era.sort_order <= current {
        return;
    }
    tracing::info!(from = %state.era, to = %era.id, "era.advanced");
    state.era = era.id.clone();
    state.grid_size += catalog.rules().grid_growth_per_era;
    let message = format!("Entered {} era.", era.name);
    state.log(EventCategory::Era, "Era Advanced", message);
}

fn adjust_metahuman(state: &mut WorldState, catalog: &Catalog, id: &MetahumanId, delta: i32) {
    let now = state.clock.seconds;
    let entry = state
        .metahumans
        .entry(id.clone())
        .or_insert_with(MetahumanState::default);
    let previous = entry.disposition;
    entry.affinity = (entry.affinity + delta).clamp(-3, 3);
    entry.last_encounter_at = Some(now);
    entry.disposition = Disposition::from_affinity(entry.affinity);
    let current = entry.disposition;
    if previous == current {
        return;
    }
    let Some(meta) = catalog.metahuman(id.as_str()) else {
        return;
    };
    let (title, message) = match current {
        Disposition::Ally => (
            "Metahuman Allied",
            format!("{} is now supporting your cause.", meta.name),
        ),
        Disposition::Enemy => (
            "Metahuman Hostile",
            format!("{} has turned against you.", meta.name),
        ),
        Disposition::Neutral => ("Metahuman Neutral", format!("{} is now undecided.", meta.name)),
    };
    state.log(EventCategory::Metahuman, title, message);
}
