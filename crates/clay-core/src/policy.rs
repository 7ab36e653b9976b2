//! Policy slots. At most one policy per slot; a policy that leaves its slot
//! cannot be picked again until its cooldown runs out.

use crate::catalog::{Catalog, PolicyDefinition};
use crate::command::CommandError;
use crate::event::EventCategory;
use crate::id::PolicyId;
use crate::state::WorldState;

pub fn check_set<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    slot: &str,
    policy: Option<&str>,
) -> Result<Option<&'c PolicyDefinition>, CommandError> {
    let Some(policy) = policy else {
        if !state.policy.active.contains_key(slot) {
            return Err(CommandError::PolicySlotEmpty);
        }
        return Ok(None);
    };
    let def = catalog
        .policy(policy)
        .ok_or_else(|| CommandError::unknown("policy", policy))?;
    if state
        .policy
        .active
        .get(slot)
        .is_some_and(|active| active.as_str() == policy)
    {
        return Err(CommandError::PolicyActive);
    }
    if def.slot.as_str() != slot {
        return Err(CommandError::PolicySlotMismatch);
    }
    if state
        .policy
        .cooldowns
        .get(policy)
        .is_some_and(|&until| until > state.clock.seconds)
    {
        return Err(CommandError::PolicyCooldown);
    }
    if !catalog.era_reached(state.era.as_str(), def.era.as_str()) {
        return Err(CommandError::PolicyLocked);
    }
    Ok(Some(def))
}

pub fn set(
    state: &mut WorldState,
    catalog: &Catalog,
    slot: &str,
    policy: Option<&str>,
) -> Result<(), CommandError> {
    let def = check_set(state, catalog, slot, policy)?;
    let displaced = match def {
        Some(def) => state.policy.active.insert(def.slot.clone(), def.id.clone()),
        None => state.policy.active.remove(slot),
    };
    if let Some(previous) = displaced {
        start_cooldown(state, catalog, &previous);
    }
    let message = match def {
        Some(def) => format!("{} enacted.", def.name),
        None => format!("The {slot} slot is now empty."),
    };
    state.log(EventCategory::Policy, "Policy Changed", message);
    Ok(())
}

fn start_cooldown(state: &mut WorldState, catalog: &Catalog, policy: &PolicyId) {
    let seconds = catalog.policy(policy.as_str()).map_or(0.0, |p| p.cooldown_seconds);
    let until = state.clock.seconds + seconds;
    state.policy.cooldowns.insert(policy.clone(), until);
}
