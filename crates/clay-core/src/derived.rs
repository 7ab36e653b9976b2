//! Derived-state projector.
//!
//! Pure reads over a [`WorldState`] snapshot: nothing here mutates, so the
//! presentation layer may call these at any frequency.

use std::collections::BTreeMap;

use crate::catalog::{Catalog, ResourceAmounts};
use crate::command::CommandError;
use crate::config::EngineConfig;
use crate::effect::Modifiers;
use crate::id::{BuildingKey, ResourceId};
use crate::meters;
use crate::production::{
    self, StepInputs, level_multiplier, logistics_level_multiplier, storage_level_multiplier,
};
use crate::project;
use crate::risk;
use crate::state::{LogisticsState, RiskState, WorldState};

/// Everything the UI reads about the world besides the raw state.
#[derive(Debug, Clone, PartialEq)]
pub struct DerivedState {
    /// Nominal net rates: inputs assumed available, logistics applied.
    pub rates_per_hour: BTreeMap<ResourceId, f64>,
    pub caps: BTreeMap<ResourceId, f64>,
    /// Hours until each resource fills; `None` when it is not rising.
    pub time_to_cap_hours: BTreeMap<ResourceId, Option<f64>>,
    pub active_crew: u32,
    pub available_crew: u32,
    pub project_speed: f64,
    pub risk: RiskState,
    pub cohesion: f64,
    pub biosphere: f64,
    /// Per-hour meter drift at the current state.
    pub cohesion_drift: f64,
    pub biosphere_drift: f64,
    pub logistics: LogisticsState,
    pub efficiency: f64,
    pub market: BTreeMap<ResourceId, f64>,
}

pub fn derive(state: &WorldState, catalog: &Catalog, config: &EngineConfig) -> DerivedState {
    let inputs = StepInputs::gather(state, catalog, config);
    let rates_per_hour = nominal_rates(state, catalog, &inputs);
    let time_to_cap_hours = state
        .resources
        .iter()
        .map(|(id, resource)| {
            let cap = inputs.caps.get(id).copied().unwrap_or(resource.cap);
            let rate = rates_per_hour.get(id).copied().unwrap_or(0.0);
            let hours = (rate > 0.0).then(|| ((cap - resource.amount) / rate).max(0.0));
            (id.clone(), hours)
        })
        .collect();
    let active_crew = state.crew_in_use(catalog);
    let risk = risk::compute(state, catalog, config, &inputs.modifiers, &inputs.caps);
    let (cohesion_drift, biosphere_drift) = meters::drift_per_hour(state, catalog, &inputs);
    DerivedState {
        rates_per_hour,
        time_to_cap_hours,
        active_crew,
        available_crew: state.crew_count.saturating_sub(active_crew),
        project_speed: project::base_speed(state, catalog, &inputs.modifiers).max(project::MIN_SPEED),
        risk,
        cohesion: state.meters.cohesion,
        biosphere: state.meters.biosphere,
        cohesion_drift,
        biosphere_drift,
        efficiency: state.stats.last_efficiency,
        market: catalog
            .resources()
            .iter()
            .map(|r| (r.id.clone(), state.market.index_of(r.id.as_str())))
            .collect(),
        logistics: inputs.logistics,
        caps: inputs.caps,
    }
}

/// Net hourly rates with every input assumed available and every contract
/// fully paid.
pub fn nominal_rates(
    state: &WorldState,
    catalog: &Catalog,
    inputs: &StepInputs,
) -> BTreeMap<ResourceId, f64> {
    let now = state.clock.seconds;
    let logistics = inputs.logistics.factor;
    let mut produced: BTreeMap<ResourceId, f64> = BTreeMap::new();
    let mut consumed: BTreeMap<ResourceId, f64> = BTreeMap::new();

    for (key, building) in &state.buildings {
        let Some(def) = catalog.building(building.building.as_str()) else {
            continue;
        };
        if inputs.locked.contains(&key) || state.building_disabled(key, now) {
            continue;
        }
        let multiplier = level_multiplier(building.level) * inputs.placement_of(key);
        // Input-free buildings keep their floor however congested logistics gets.
        let factor = if def.has_inputs() {
            logistics
        } else {
            def.efficiency_floor.max(logistics)
        };
        for (id, rate) in &def.production_per_hour {
            *produced.entry(id.clone()).or_insert(0.0) += rate * multiplier * factor;
        }
        for (id, rate) in &def.consumption_per_hour {
            *consumed.entry(id.clone()).or_insert(0.0) += rate * multiplier * factor;
        }
        for (id, rate) in &def.maintenance_per_hour {
            *consumed.entry(id.clone()).or_insert(0.0) += rate * factor;
        }
    }

    let mut contract_multipliers: BTreeMap<&ResourceId, f64> = BTreeMap::new();
    for contract in state.factions.values().flat_map(|f| f.contracts.iter()) {
        let Some(def) = catalog.contract(contract.contract.as_str()) else {
            continue;
        };
        for (id, amount) in &def.effects_per_hour {
            let price = state.market.index_of(id.as_str()) * def.price_index_multiplier;
            *produced.entry(id.clone()).or_insert(0.0) += amount * price;
        }
        for (id, rate) in &def.upkeep_per_hour {
            *consumed.entry(id.clone()).or_insert(0.0) += rate;
        }
        for (id, multiplier) in &def.multipliers {
            *contract_multipliers.entry(id).or_insert(1.0) *= multiplier;
        }
    }

    let cohesion_factor = 0.9 + 0.2 * state.meters.cohesion;
    let biosphere_factor = 0.85 + 0.3 * state.meters.biosphere;
    catalog
        .resources()
        .iter()
        .map(|r| {
            let id = &r.id;
            let mut multiplier = state.bonuses.global_multiplier
                * inputs.modifiers.global_multiplier
                * state.bonuses.resource_multiplier(id.as_str())
                * inputs.modifiers.resource_multiplier(id.as_str())
                * contract_multipliers.get(id).copied().unwrap_or(1.0)
                * cohesion_factor;
            if r.biosphere_sensitive {
                multiplier *= biosphere_factor;
            }
            let gross = produced.get(id).copied().unwrap_or(0.0) * multiplier;
            let net = gross - consumed.get(id).copied().unwrap_or(0.0);
            (id.clone(), net)
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Upgrade preview
// ---------------------------------------------------------------------------

/// What upgrading a building one level would cost and change.
#[derive(Debug, Clone, PartialEq)]
pub struct UpgradePreview {
    pub cost: ResourceAmounts,
    /// Wall time at the current project speed.
    pub duration_seconds: f64,
    pub production_delta: ResourceAmounts,
    pub consumption_delta: ResourceAmounts,
    pub storage_delta: ResourceAmounts,
    pub logistics_delta: f64,
    pub project_speed_delta: f64,
}

fn scale_delta(amounts: &ResourceAmounts, old: f64, new: f64) -> ResourceAmounts {
    amounts
        .iter()
        .map(|(id, rate)| (id.clone(), rate * (new - old)))
        .collect()
}

pub fn upgrade_preview(
    state: &WorldState,
    catalog: &Catalog,
    key: BuildingKey,
) -> Result<UpgradePreview, CommandError> {
    let building = state.buildings.get(key).ok_or(CommandError::BuildingNotFound)?;
    let def = catalog
        .building(building.building.as_str())
        .ok_or_else(|| CommandError::unknown("building", building.building.as_str()))?;
    if building.level >= def.max_level {
        return Err(CommandError::MaxLevel);
    }
    let level = building.level;
    let placement = production::GridIndex::new(state).placement_multiplier(catalog, building, def);
    let speed = project::base_speed(state, catalog, &Modifiers::collect(state, catalog))
        .max(project::MIN_SPEED);
    let old = level_multiplier(level) * placement;
    let new = level_multiplier(level + 1) * placement;
    Ok(UpgradePreview {
        cost: project::upgrade_cost(def, level),
        duration_seconds: project::upgrade_duration(def, level) / speed,
        production_delta: scale_delta(&def.production_per_hour, old, new),
        consumption_delta: scale_delta(&def.consumption_per_hour, old, new),
        storage_delta: scale_delta(
            &def.storage_cap_add,
            storage_level_multiplier(level),
            storage_level_multiplier(level + 1),
        ),
        logistics_delta: def.logistics_cap_add
            * (logistics_level_multiplier(level + 1) - logistics_level_multiplier(level)),
        project_speed_delta: def.project_speed_bonus,
    })
}
