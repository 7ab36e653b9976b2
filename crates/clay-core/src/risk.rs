//! Exposure, security, hostility and raids.

use std::collections::BTreeMap;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::effect::Modifiers;
use crate::event::EventCategory;
use crate::id::ResourceId;
use crate::state::{RiskState, WorldState};

/// Base hostility for the hostile faction's relationship level.
pub fn hostility_for_relationship(relationship: i32) -> f64 {
    match relationship {
        -2 => 1.0,
        -1 => 0.7,
        0 => 0.4,
        1 => 0.2,
        _ => 0.1,
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

pub fn compute(
    state: &WorldState,
    catalog: &Catalog,
    config: &EngineConfig,
    modifiers: &Modifiers,
    caps: &BTreeMap<ResourceId, f64>,
) -> RiskState {
    let (fill, counted) = state
        .resources
        .iter()
        .filter_map(|(id, r)| {
            let cap = caps.get(id).copied().unwrap_or(r.cap);
            (cap > 0.0).then(|| (r.amount / cap).min(1.0))
        })
        .fold((0.0, 0u32), |(sum, n), ratio| (sum + ratio, n + 1));
    let exposure = if counted > 0 { fill / counted as f64 } else { 0.0 };

    let defense: f64 = state
        .buildings
        .values()
        .filter_map(|b| catalog.building(b.building.as_str()))
        .map(|d| d.defense_score)
        .sum();
    let contracts: f64 = state
        .factions
        .values()
        .flat_map(|f| f.contracts.iter())
        .filter_map(|c| catalog.contract(c.contract.as_str()))
        .map(|d| d.security_bonus)
        .sum();
    let security =
        ((defense + contracts + state.bonuses.security + modifiers.security) / 100.0).min(1.0);

    let base = catalog
        .hostile_faction()
        .map_or(0.4, |f| hostility_for_relationship(state.relationship(f.id.as_str())));
    let hostility = (base + (0.5 - state.meters.cohesion) * 0.3).clamp(0.1, 1.0);

    let raid_chance_per_hour = (config.raid_base_rate
        * sigmoid((exposure - security) * hostility * config.raid_steepness))
        .clamp(0.0, 1.0);

    RiskState {
        exposure,
        security,
        hostility,
        raid_chance_per_hour,
    }
}

/// Bernoulli raid check for one sub-step. Always draws from the RNG so the
/// cursor advances identically whatever the odds.
pub fn roll_raid(state: &mut WorldState, config: &EngineConfig, dt: f64) -> bool {
    let p = state.risk.raid_chance_per_hour * dt / 3600.0;
    if state.rng.chance(p) {
        resolve_raid(state, config);
        true
    } else {
        false
    }
}

/// A raid drawn from the random-event table; weak odds mean it is deterred.
pub fn resolve_table_raid(state: &mut WorldState, config: &EngineConfig) {
    if state.risk.raid_chance_per_hour < config.raid_avert_threshold {
        state.log(
            EventCategory::Raid,
            "Raid Averted",
            "Security posture deterred an attempted raid.",
        );
        return;
    }
    resolve_raid(state, config);
}

pub fn resolve_raid(state: &mut WorldState, config: &EngineConfig) {
    let mitigation = 1.0 - state.risk.security.min(config.raid_security_cap);
    let mut stolen = 0.0;
    for (id, resource) in state.resources.iter_mut() {
        let theft = resource.amount * config.raid_theft_fraction * mitigation;
        resource.amount = (resource.amount - theft).max(0.0);
        stolen += theft;
        *state.stats.raid_loss.entry(id.clone()).or_insert(0.0) += theft;
    }
    state.meters.add_cohesion(-config.raid_cohesion_penalty);
    state.stats.last_raid_at = Some(state.clock.seconds);
    state.stats.raids += 1;
    tracing::info!(tick = state.clock.tick, stolen, "raid.resolved");
    state.log(
        EventCategory::Raid,
        "Raid",
        format!("Raiders breached outer stores. Estimated losses: {}.", stolen as i64),
    );
}
