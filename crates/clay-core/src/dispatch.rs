//! Crew dispatches: timed expeditions that return ready or failed.

use crate::catalog::{Catalog, DispatchDefinition};
use crate::command::CommandError;
use crate::event::EventCategory;
use crate::id::DispatchKey;
use crate::state::{DispatchInstance, DispatchStatus, WorldState};

/// Reward scale for a dispatch that came back failed.
const FAILED_REWARD_SCALE: f64 = 0.5;

pub fn check_start<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    dispatch: &str,
) -> Result<&'c DispatchDefinition, CommandError> {
    let def = catalog
        .dispatch(dispatch)
        .ok_or_else(|| CommandError::unknown("dispatch", dispatch))?;
    let flag_ok = def
        .requires_flag
        .as_ref()
        .is_none_or(|flag| state.has_flag(flag.as_str()));
    let flag_clear = def
        .requires_flag_not_set
        .as_ref()
        .is_none_or(|flag| !state.has_flag(flag.as_str()));
    if !catalog.era_reached(state.era.as_str(), def.era.as_str()) || !flag_ok || !flag_clear {
        return Err(CommandError::DispatchLocked);
    }
    if state.available_crew(catalog) < def.required_crew {
        return Err(CommandError::NoAvailableCrew);
    }
    if state
        .dispatches
        .values()
        .any(|d| d.dispatch == def.id && d.status == DispatchStatus::Active)
    {
        return Err(CommandError::DispatchActive);
    }
    Ok(def)
}

pub fn start(state: &mut WorldState, catalog: &Catalog, dispatch: &str) -> Result<DispatchKey, CommandError> {
    let def = check_start(state, catalog, dispatch)?;
    let key = state.dispatches.insert(DispatchInstance {
        dispatch: def.id.clone(),
        remaining_seconds: def.duration_seconds,
        started_at: state.clock.seconds,
        status: DispatchStatus::Active,
    });
    state.log(
        EventCategory::Dispatch,
        "Dispatch Launched",
        format!("{} set out.", def.name),
    );
    Ok(key)
}

/// Count down active dispatches and roll the outcome of finished ones.
pub fn run(state: &mut WorldState, catalog: &Catalog, dt: f64) {
    let mut finished = Vec::new();
    for (key, instance) in state.dispatches.iter_mut() {
        if instance.status != DispatchStatus::Active {
            continue;
        }
        instance.remaining_seconds -= dt;
        if instance.remaining_seconds <= 0.0 {
            instance.remaining_seconds = 0.0;
            finished.push(key);
        }
    }
    for key in finished {
        let Some(dispatch_id) = state.dispatches.get(key).map(|d| d.dispatch.clone()) else {
            continue;
        };
        let (status, name) = match catalog.dispatch(dispatch_id.as_str()) {
            Some(def) => {
                let failed = state.rng.next_f64() < def.risk_chance;
                let status = if failed {
                    DispatchStatus::Failed
                } else {
                    DispatchStatus::Ready
                };
                (status, def.name.clone())
            }
            None => (DispatchStatus::Failed, dispatch_id.to_string()),
        };
        if let Some(instance) = state.dispatches.get_mut(key) {
            instance.status = status;
        }
        let (title, message) = match status {
            DispatchStatus::Failed => ("Dispatch Failed", format!("{name} returned empty-handed.")),
            _ => ("Dispatch Ready", format!("{name} returned with rewards.")),
        };
        state.log(EventCategory::Dispatch, title, message);
    }
}

pub fn check_collect(state: &WorldState, key: DispatchKey) -> Result<&DispatchInstance, CommandError> {
    let instance = state
        .dispatches
        .get(key)
        .ok_or(CommandError::DispatchNotFound)?;
    if instance.status == DispatchStatus::Active {
        return Err(CommandError::DispatchNotReady);
    }
    Ok(instance)
}

pub fn collect(state: &mut WorldState, catalog: &Catalog, key: DispatchKey) -> Result<(), CommandError> {
    let instance = check_collect(state, key)?.clone();
    let scale = match instance.status {
        DispatchStatus::Ready => 1.0,
        _ => FAILED_REWARD_SCALE,
    };
    let name = match catalog.dispatch(instance.dispatch.as_str()) {
        Some(def) => {
            for (resource, amount) in &def.rewards {
                let reward = amount * scale;
                state.grant_resource(resource.as_str(), reward);
                *state.stats.produced.entry(resource.clone()).or_insert(0.0) += reward;
                *state
                    .stats
                    .dispatch_rewards
                    .entry(resource.clone())
                    .or_insert(0.0) += reward;
            }
            def.name.clone()
        }
        None => instance.dispatch.to_string(),
    };
    if instance.status == DispatchStatus::Ready {
        state.stats.dispatches_completed += 1;
    }
    state.dispatches.remove(key);
    state.log(
        EventCategory::Dispatch,
        "Dispatch Collected",
        format!("Rewards from {name} collected."),
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn start_takes_crew() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let free = state.available_crew(&catalog);
        start(&mut state, &catalog, "forage").unwrap();
        let crew = catalog.dispatch("forage").unwrap().required_crew;
        assert_eq!(state.available_crew(&catalog), free - crew);
        assert_eq!(
            start(&mut state, &catalog, "forage"),
            Err(CommandError::DispatchActive)
        );
    }

    #[test]
    fn flag_gated_dispatch_locked() {
        let catalog = fixture_catalog();
        let state = fixture_state(&catalog);
        assert_eq!(
            check_start(&state, &catalog, "deep_survey").unwrap_err(),
            CommandError::DispatchLocked
        );
    }

    #[test]
    fn no_crew_rejected() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        state.crew_count = 0;
        assert_eq!(
            start(&mut state, &catalog, "forage"),
            Err(CommandError::NoAvailableCrew)
        );
    }

    #[test]
    fn collect_before_ready_rejected() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let key = start(&mut state, &catalog, "forage").unwrap();
        assert_eq!(
            collect(&mut state, &catalog, key),
            Err(CommandError::DispatchNotReady)
        );
    }

    #[test]
    fn finished_dispatch_pays_out_and_frees_crew() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        set_amount(&mut state, "food", 0.0);
        let key = start(&mut state, &catalog, "forage").unwrap();
        let def = catalog.dispatch("forage").unwrap();
        run(&mut state, &catalog, def.duration_seconds);
        let status = state.dispatches[key].status;
        assert_ne!(status, DispatchStatus::Active);
        assert_eq!(state.available_crew(&catalog), state.crew_count);
        collect(&mut state, &catalog, key).unwrap();
        let full = def.rewards["food"];
        let expected = if status == DispatchStatus::Ready { full } else { full * 0.5 };
        assert!((state.amount("food") - expected).abs() < 1e-9);
        assert!(state.dispatches.is_empty());
        assert!(state.events.contains_title("Dispatch Collected"));
    }

    #[test]
    fn certain_failure_halves_rewards() {
        let mut pack = fixture_pack();
        for d in pack.dispatches.iter_mut() {
            d.risk_chance = 1.0;
        }
        let catalog = crate::catalog::Catalog::from_pack(pack).unwrap();
        let mut state = fixture_state(&catalog);
        set_amount(&mut state, "food", 0.0);
        let key = start(&mut state, &catalog, "forage").unwrap();
        run(&mut state, &catalog, 1e9);
        assert_eq!(state.dispatches[key].status, DispatchStatus::Failed);
        collect(&mut state, &catalog, key).unwrap();
        let full = catalog.dispatch("forage").unwrap().rewards["food"];
        assert!((state.amount("food") - full * 0.5).abs() < 1e-9);
        assert_eq!(state.stats.dispatches_completed, 0);
    }
}
