//! Event timer, decision chains and the weighted random-event table.
//!
//! A single countdown drives both. When it runs out and no decision is
//! waiting on the player, an eligible chain is picked first; failing that,
//! one random event is drawn by weight. The countdown is then re-armed with
//! a uniform gap.

use std::collections::BTreeMap;

use crate::catalog::{Catalog, EventChainDefinition, EventDefinition, EventTrigger, RandomEventKind};
use crate::command::CommandError;
use crate::config::EngineConfig;
use crate::effect;
use crate::event::EventCategory;
use crate::id::{BuildingKey, ResourceId};
use crate::market;
use crate::production;
use crate::risk;
use crate::state::WorldState;

/// Resource fill that counts as "at cap" for triggers.
const AT_CAP_RATIO: f64 = 0.95;

/// Caps how many events fire per simulated hour. The allowance lives in
/// [`EventChainState`](crate::state::EventChainState) and refills on hour
/// boundaries of the sim clock, so splitting an advance never changes how
/// many events are drawn. `generated` counts what one advance call fired.
#[derive(Debug, Clone, Copy)]
pub struct EventBudget {
    pub limit: u32,
    pub generated: u32,
}

impl EventBudget {
    pub const ONLINE_LIMIT: u32 = 3;
    pub const OFFLINE_LIMIT: u32 = 20;

    pub fn new(offline: bool) -> Self {
        Self {
            limit: if offline {
                Self::OFFLINE_LIMIT
            } else {
                Self::ONLINE_LIMIT
            },
            generated: 0,
        }
    }
}

pub fn trigger_matches(
    state: &WorldState,
    catalog: &Catalog,
    trigger: &EventTrigger,
    caps: &BTreeMap<ResourceId, f64>,
) -> bool {
    let below = |bound: Option<f64>, value: f64| bound.is_some_and(|b| value < b);
    let above = |bound: Option<f64>, value: f64| bound.is_some_and(|b| value > b);
    if below(trigger.min_exposure, state.risk.exposure)
        || below(trigger.min_security, state.risk.security)
        || below(trigger.min_hostility, state.risk.hostility)
        || below(trigger.min_cohesion, state.meters.cohesion)
        || above(trigger.max_cohesion, state.meters.cohesion)
        || below(trigger.min_biosphere, state.meters.biosphere)
        || above(trigger.max_biosphere, state.meters.biosphere)
        || below(trigger.min_raid_chance, state.risk.raid_chance_per_hour)
        || above(trigger.logistics_below, state.logistics.factor)
    {
        return false;
    }
    if let Some(resource) = &trigger.resource_at_cap {
        let Some(entry) = state.resources.get(resource) else {
            return false;
        };
        let cap = caps.get(resource).copied().unwrap_or(entry.cap);
        if cap <= 0.0 || entry.amount < cap * AT_CAP_RATIO {
            return false;
        }
    }
    if let Some(era) = &trigger.requires_era {
        if !catalog.era_reached(state.era.as_str(), era.as_str()) {
            return false;
        }
    }
    if let Some(contract) = &trigger.requires_contract {
        if !state.contract_active(contract.as_str()) {
            return false;
        }
    }
    if let Some(flag) = &trigger.requires_flag {
        if !state.has_flag(flag.as_str()) {
            return false;
        }
    }
    if let Some(flag) = &trigger.requires_flag_not_set {
        if state.has_flag(flag.as_str()) {
            return false;
        }
    }
    true
}

fn chain_eligible(
    state: &WorldState,
    catalog: &Catalog,
    chain: &EventChainDefinition,
    caps: &BTreeMap<ResourceId, f64>,
) -> bool {
    let cooled = state
        .chains
        .cooldowns
        .get(&chain.id)
        .is_none_or(|&until| until <= state.clock.seconds);
    let fresh = chain
        .unique_flag
        .as_ref()
        .is_none_or(|flag| !state.has_flag(flag.as_str()));
    cooled && fresh && trigger_matches(state, catalog, &chain.trigger, caps)
}

/// Count down and fire due events within this hour's allowance.
pub fn run(
    state: &mut WorldState,
    catalog: &Catalog,
    config: &EngineConfig,
    caps: &BTreeMap<ResourceId, f64>,
    budget: &mut EventBudget,
    dt: f64,
) {
    let hour = state.clock.hour();
    if state.chains.budget_hour != hour {
        state.chains.budget_hour = hour;
        state.chains.budget_used = 0;
    }
    state.chains.next_event_in -= dt;
    if state.chains.pending.is_some() {
        return;
    }
    while state.chains.next_event_in <= 0.0 && state.chains.budget_used < budget.limit {
        let triggered = trigger_chain(state, catalog, caps);
        if !triggered {
            random_event(state, catalog, config);
        }
        state.chains.budget_used += 1;
        budget.generated += 1;
        state.chains.next_event_in += state.rng.range(config.event_gap_min, config.event_gap_max);
        if triggered {
            break;
        }
    }
}

fn trigger_chain(state: &mut WorldState, catalog: &Catalog, caps: &BTreeMap<ResourceId, f64>) -> bool {
    let candidates: Vec<&EventChainDefinition> = catalog
        .chains()
        .iter()
        .filter(|c| chain_eligible(state, catalog, c, caps))
        .collect();
    if candidates.is_empty() {
        return false;
    }
    let chosen = candidates[state.rng.index(candidates.len())];
    state.chains.pending = Some(chosen.id.clone());
    effect::apply_all(state, catalog, &chosen.effects);
    state.log(EventCategory::Decision, &chosen.title, chosen.description.clone());
    tracing::debug!(chain = %chosen.id, "chain.triggered");
    true
}

fn random_event(state: &mut WorldState, catalog: &Catalog, config: &EngineConfig) {
    let total: f64 = catalog.events().iter().map(|e| e.weight.max(0.0)).sum();
    if total <= 0.0 {
        return;
    }
    let roll = state.rng.range(0.0, total);
    let mut running = 0.0;
    let mut picked = None;
    for event in catalog.events().iter() {
        running += event.weight.max(0.0);
        picked = Some(event);
        if roll < running {
            break;
        }
    }
    if let Some(event) = picked {
        apply_event(state, catalog, config, event);
    }
}

pub fn apply_event(state: &mut WorldState, catalog: &Catalog, config: &EngineConfig, event: &EventDefinition) {
    match &event.kind {
        RandomEventKind::MarketShock { resource } => {
            market::shock(state, config, resource.as_str());
            let name = catalog
                .resource(resource.as_str())
                .map_or_else(|| resource.to_string(), |r| r.name.clone());
            state.log(
                EventCategory::Market,
                &event.title,
                format!("Markets contract briefly. {name} indices reduced for a time."),
            );
        }
        RandomEventKind::DiplomaticPressure { faction, delta } => {
            state.adjust_faction(faction.as_str(), *delta);
            state.log(
                EventCategory::Diplomacy,
                &event.title,
                "Hostility rises. Defensive readiness advised.",
            );
        }
        RandomEventKind::Discovery { shards } => {
            state.chrono_shards += shards;
            state.log(
                EventCategory::Discovery,
                &event.title,
                "A Chrono Shard has been recovered.",
            );
        }
        RandomEventKind::InfrastructureFailure => {
            let now = state.clock.seconds;
            let locked = production::locked_buildings(state);
            let operational: Vec<BuildingKey> = state
                .buildings
                .keys()
                .filter(|k| !locked.contains(k) && !state.building_disabled(*k, now))
                .collect();
            if operational.is_empty() {
                return;
            }
            let key = operational[state.rng.index(operational.len())];
            if let Some(building) = state.buildings.get_mut(key) {
                building.disabled_until = Some(now + config.infrastructure_failure_seconds);
            }
            state.log(
                EventCategory::Infrastructure,
                &event.title,
                "One facility is temporarily offline.",
            );
        }
        RandomEventKind::Raid => risk::resolve_table_raid(state, config),
        RandomEventKind::Narrative => {
            let category = EventCategory::from_label(&event.category);
            state.log(category, &event.title, event.description.clone());
        }
    }
}

pub fn check_resolve<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    chain: &str,
    choice: &str,
) -> Result<(&'c EventChainDefinition, &'c crate::catalog::EventChoiceDefinition), CommandError> {
    let def = catalog
        .chain(chain)
        .ok_or_else(|| CommandError::unknown("event chain", chain))?;
    let choice_def = def
        .choice(choice)
        .ok_or_else(|| CommandError::unknown("choice", choice))?;
    if let Some(pending) = &state.chains.pending {
        if pending.as_str() != chain {
            return Err(CommandError::EventNotPending);
        }
    }
    Ok((def, choice_def))
}

pub fn resolve(state: &mut WorldState, catalog: &Catalog, chain: &str, choice: &str) -> Result<(), CommandError> {
    let (def, choice_def) = check_resolve(state, catalog, chain, choice)?;
    effect::apply_all(state, catalog, &choice_def.effects);
    state.log(EventCategory::Decision, &def.title, choice_def.description.clone());
    let until = state.clock.seconds + def.cooldown_seconds;
    state.chains.cooldowns.insert(def.id.clone(), until);
    if let Some(flag) = &def.unique_flag {
        state.flags.insert(flag.clone());
    }
    state.chains.pending = choice_def
        .next
        .as_ref()
        .filter(|next| catalog.chain(next.as_str()).is_some())
        .cloned();
    Ok(())
}
