//! Faction contracts: start, expiry, auto-renew.
//!
//! Contract flows (upkeep drawn, output produced) run inside production so
//! they share the available ledger with buildings; this module owns only the
//! lifecycle.

use crate::catalog::{Catalog, ContractDefinition};
use crate::command::CommandError;
use crate::config::EngineConfig;
use crate::effect;
use crate::event::EventCategory;
use crate::id::FactionId;
use crate::state::{ContractInstance, WorldState};

/// Name of the first resource in `costs` the ledger cannot cover.
pub(crate) fn shortfall_error(
    state: &WorldState,
    catalog: &Catalog,
    costs: &crate::catalog::ResourceAmounts,
) -> Result<(), CommandError> {
    match state.first_shortfall(costs) {
        Some(id) => {
            let name = catalog
                .resource(id.as_str())
                .map_or_else(|| id.to_string(), |r| r.name.clone());
            Err(CommandError::Insufficient(name))
        }
        None => Ok(()),
    }
}

pub fn check_start<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    contract: &str,
) -> Result<&'c ContractDefinition, CommandError> {
    let def = catalog
        .contract(contract)
        .ok_or_else(|| CommandError::unknown("contract", contract))?;
    if !state.factions.contains_key(def.faction.as_str()) {
        return Err(CommandError::unknown("faction", def.faction.as_str()));
    }
    if state.relationship(def.faction.as_str()) < def.required_relationship {
        return Err(CommandError::RelationshipTooLow);
    }
    if state.contract_active(contract) {
        return Err(CommandError::ContractActive);
    }
    if def.requires_unlock && !state.unlocked_contracts.contains(contract) {
        return Err(CommandError::ContractLocked);
    }
    // One hour of upkeep must be on hand.
    shortfall_error(state, catalog, &def.upkeep_per_hour)?;
    Ok(def)
}

pub fn start(state: &mut WorldState, catalog: &Catalog, contract: &str) -> Result<(), CommandError> {
    let def = check_start(state, catalog, contract)?;
    let serial = state.next_serial();
    let instance = ContractInstance {
        serial,
        contract: def.id.clone(),
        remaining_seconds: def.duration_seconds,
        upkeep_missed: false,
    };
    if let Some(faction) = state.factions.get_mut(def.faction.as_str()) {
        faction.contracts.push(instance);
    }
    let faction_name = catalog
        .faction(def.faction.as_str())
        .map_or_else(|| def.faction.to_string(), |f| f.name.clone());
    state.log(
        EventCategory::Contract,
        "Contract Initiated",
        format!("{} signed with {}.", def.name, faction_name),
    );
    tracing::debug!(contract = %def.id, "contract.started");
    Ok(())
}

/// Count down every contract, settle the expired ones, then renew the
/// ones about to lapse.
pub fn run(state: &mut WorldState, catalog: &Catalog, config: &EngineConfig, dt: f64) {
    let mut expired: Vec<(FactionId, Vec<ContractInstance>)> = Vec::new();
    for (faction_id, faction) in state.factions.iter_mut() {
        for contract in faction.contracts.iter_mut() {
            contract.remaining_seconds -= dt;
        }
        if faction.contracts.iter().all(|c| c.remaining_seconds > 0.0) {
            continue;
        }
        let (done, live): (Vec<_>, Vec<_>) = faction
            .contracts
            .drain(..)
            .partition(|c| c.remaining_seconds <= 0.0);
        faction.contracts = live;
        expired.push((faction_id.clone(), done));
    }

    for (faction_id, done) in expired {
        let missed: Vec<&ContractInstance> = done.iter().filter(|c| c.upkeep_missed).collect();
        for contract in &missed {
            if let Some(def) = catalog.contract(contract.contract.as_str()) {
                effect::apply_all(state, catalog, &def.penalty_effects);
            }
        }
        let delta = if missed.is_empty() { 1 } else { -1 };
        state.adjust_faction(faction_id.as_str(), delta);
        let name = catalog
            .faction(faction_id.as_str())
            .map_or_else(|| faction_id.to_string(), |f| f.name.clone());
        let message = if missed.is_empty() {
            format!("Contracts with {name} fulfilled. Relations improved.")
        } else {
            format!("Contracts with {name} ended with missed upkeep. Relations soured.")
        };
        state.log(EventCategory::Contract, "Contract Completed", message);
    }

    if state.auto_plan.auto_renew_contracts {
        auto_renew(state, catalog, config);
    }
}

fn auto_renew(state: &mut WorldState, catalog: &Catalog, config: &EngineConfig) {
    let mut renewed = Vec::new();
    let faction_ids: Vec<FactionId> = state.factions.keys().cloned().collect();
    for faction_id in faction_ids {
        let relationship = state.relationship(faction_id.as_str());
        let count = state.factions.get(&faction_id).map_or(0, |f| f.contracts.len());
        for i in 0..count {
            let Some(contract) = state
                .factions
                .get(&faction_id)
                .and_then(|f| f.contracts.get(i).cloned())
            else {
                continue;
            };
            let Some(def) = catalog.contract(contract.contract.as_str()) else {
                continue;
            };
            if contract.remaining_seconds >= config.contract_renew_window_seconds
                || !def.renewable
                || relationship < def.required_relationship
                || !state.can_afford(&def.upkeep_per_hour)
            {
                continue;
            }
            if let Some(slot) = state
                .factions
                .get_mut(&faction_id)
                .and_then(|f| f.contracts.get_mut(i))
            {
                slot.remaining_seconds += def.duration_seconds;
                slot.upkeep_missed = false;
                renewed.push(def.name.clone());
            }
        }
    }
    for name in renewed {
        state.log(
            EventCategory::Contract,
            "Contract Renewed",
            format!("{name} extended automatically."),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn trade_id(catalog: &Catalog) -> String {
        catalog.contracts().iter().next().unwrap().id.to_string()
    }

    #[test]
    fn start_requires_relationship() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let id = trade_id(&catalog);
        let faction = catalog.contract(&id).unwrap().faction.clone();
        state.factions.get_mut(&faction).unwrap().relationship = -2;
        assert_eq!(
            start(&mut state, &catalog, &id),
            Err(CommandError::RelationshipTooLow)
        );
    }

    #[test]
    fn start_then_duplicate_rejected() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        fill_all(&mut state);
        let id = trade_id(&catalog);
        start(&mut state, &catalog, &id).unwrap();
        assert!(state.contract_active(&id));
        assert!(state.events.contains_title("Contract Initiated"));
        assert_eq!(
            start(&mut state, &catalog, &id),
            Err(CommandError::ContractActive)
        );
    }

    #[test]
    fn start_needs_an_hour_of_upkeep() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let id = trade_id(&catalog);
        let def = catalog.contract(&id).unwrap();
        for resource in def.upkeep_per_hour.keys() {
            set_amount(&mut state, resource.as_str(), 0.0);
        }
        assert!(matches!(
            start(&mut state, &catalog, &id),
            Err(CommandError::Insufficient(_))
        ));
    }

    #[test]
    fn clean_expiry_improves_relationship() {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        let mut state = fixture_state(&catalog);
        fill_all(&mut state);
        let id = trade_id(&catalog);
        let def = catalog.contract(&id).unwrap();
        let before = state.relationship(def.faction.as_str());
        start(&mut state, &catalog, &id).unwrap();
        run(&mut state, &catalog, &config, def.duration_seconds + 1.0);
        assert!(!state.contract_active(&id));
        assert_eq!(state.relationship(def.faction.as_str()), (before + 1).min(2));
        assert!(state.events.contains_title("Contract Completed"));
    }

    #[test]
    fn missed_upkeep_penalizes_on_expiry() {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        let mut state = fixture_state(&catalog);
        fill_all(&mut state);
        let id = trade_id(&catalog);
        let def = catalog.contract(&id).unwrap();
        let before = state.relationship(def.faction.as_str());
        start(&mut state, &catalog, &id).unwrap();
        state.factions.get_mut(&def.faction).unwrap().contracts[0].upkeep_missed = true;
        run(&mut state, &catalog, &config, def.duration_seconds + 1.0);
        assert_eq!(state.relationship(def.faction.as_str()), (before - 1).max(-2));
    }

    #[test]
    fn auto_renew_extends_inside_window() {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        let mut state = fixture_state(&catalog);
        fill_all(&mut state);
        state.auto_plan.auto_renew_contracts = true;
        let id = trade_id(&catalog);
        let def = catalog.contract(&id).unwrap();
        assert!(def.renewable);
        start(&mut state, &catalog, &id).unwrap();
        run(&mut state, &catalog, &config, def.duration_seconds - 1_800.0);
        let remaining = state.factions[&def.faction].contracts[0].remaining_seconds;
        assert!((remaining - (1_800.0 + def.duration_seconds)).abs() < 1e-9);
        assert!(state.events.contains_title("Contract Renewed"));
    }

    #[test]
    fn no_renew_when_disabled() {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        let mut state = fixture_state(&catalog);
        fill_all(&mut state);
        let id = trade_id(&catalog);
        let def = catalog.contract(&id).unwrap();
        start(&mut state, &catalog, &id).unwrap();
        run(&mut state, &catalog, &config, def.duration_seconds - 1_800.0);
        let remaining = state.factions[&def.faction].contracts[0].remaining_seconds;
        assert!((remaining - 1_800.0).abs() < 1e-9);
    }
}
