//! Cohesion and biosphere drift.

use crate::catalog::Catalog;
use crate::production::{StepInputs, level_multiplier};
use crate::state::WorldState;

/// Per-hour drift of `(cohesion, biosphere)` for the current world.
pub fn drift_per_hour(state: &WorldState, catalog: &Catalog, inputs: &StepInputs) -> (f64, f64) {
    let fill = catalog
        .rules()
        .cohesion_resource
        .as_ref()
        .map_or(0.0, |id| {
            let amount = state.amount(id.as_str());
            let cap = inputs.caps.get(id).copied().unwrap_or(0.0).max(1.0);
            (amount / cap).min(1.0)
        });
    let mut cohesion = (fill - 0.5) * 0.02 + inputs.modifiers.cohesion_rate;
    let mut biosphere = inputs.modifiers.biosphere_rate;
    let now = state.clock.seconds;
    for (key, building) in &state.buildings {
        let Some(def) = catalog.building(building.building.as_str()) else {
            continue;
        };
        if building.disabled_until.is_some_and(|until| until > now) {
            continue;
        }
        let multiplier = level_multiplier(building.level) * inputs.placement_of(key);
        cohesion += def.cohesion_per_hour * multiplier;
        biosphere += def.biosphere_per_hour * multiplier;
    }
    (cohesion, biosphere)
}

pub fn run(state: &mut WorldState, catalog: &Catalog, inputs: &StepInputs, dt: f64) {
    let hours = dt / 3600.0;
    if hours <= 0.0 {
        return;
    }
    let (cohesion, biosphere) = drift_per_hour(state, catalog, inputs);
    state.meters.add_cohesion(cohesion * hours);
    state.meters.add_biosphere(biosphere * hours);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::test_utils::*;

    #[test]
    fn empty_influence_erodes_cohesion() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        set_amount(&mut state, "influence", 0.0);
        let inputs = StepInputs::gather(&state, &catalog, &EngineConfig::default());
        let before = state.meters.cohesion;
        run(&mut state, &catalog, &inputs, 3600.0);
        assert!((state.meters.cohesion - (before - 0.01)).abs() < 1e-12);
    }

    #[test]
    fn buildings_push_biosphere() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        place(&mut state, "smelter", 0, 0);
        let inputs = StepInputs::gather(&state, &catalog, &EngineConfig::default());
        let (_, biosphere) = drift_per_hour(&state, &catalog, &inputs);
        assert!(biosphere < 0.0);
        let before = state.meters.biosphere;
        run(&mut state, &catalog, &inputs, 3600.0);
        assert!(state.meters.biosphere < before);
    }

    #[test]
    fn meters_stay_clamped() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        set_amount(&mut state, "influence", 0.0);
        state.meters.cohesion = 0.001;
        let inputs = StepInputs::gather(&state, &catalog, &EngineConfig::default());
        run(&mut state, &catalog, &inputs, 36_000.0);
        assert_eq!(state.meters.cohesion, 0.0);
    }
}
