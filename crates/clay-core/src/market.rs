//! Market price indices.
//!
//! Indices mean-revert toward 1.0 with a bounded random shock once per
//! simulated hour. They scale contract output.

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::state::WorldState;

/// Apply one drift for every simulated hour boundary crossed since the
/// last update.
pub fn drift(state: &mut WorldState, catalog: &Catalog, config: &EngineConfig) {
    let hour = state.clock.hour();
    while state.market.last_hour < hour {
        state.market.last_hour += 1;
        for resource in catalog.resources().iter() {
            let current = state.market.index_of(resource.id.as_str());
            let shock = state.rng.range(-config.market_shock, config.market_shock);
            let next = (current + (1.0 - current) * config.market_reversion + shock)
                .clamp(config.market_min, config.market_max);
            state.market.index.insert(resource.id.clone(), next);
        }
    }
}

/// Market-shock event: knock one index down by a fixed delta.
pub fn shock(state: &mut WorldState, config: &EngineConfig, resource: &str) {
    let current = state.market.index_of(resource);
    let next = (current - config.market_shock_event_delta).max(config.market_min);
    state.market.index.insert(resource.into(), next);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn no_drift_within_first_hour() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        state.clock.seconds = 3599.0;
        let before = state.market.clone();
        drift(&mut state, &catalog, &EngineConfig::default());
        assert_eq!(state.market, before);
    }

    #[test]
    fn drift_stays_in_band_and_reverts() {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        let mut state = fixture_state(&catalog);
        state.market.index.insert("food".into(), 1.4);
        for hour in 1..=200 {
            state.clock.seconds = hour as f64 * 3600.0;
            drift(&mut state, &catalog, &config);
            for idx in state.market.index.values() {
                assert!((0.6..=1.4).contains(idx));
            }
        }
        assert_eq!(state.market.last_hour, 200);
        assert!(state.market.index_of("food") < 1.4);
    }

    #[test]
    fn catch_up_applies_every_missed_hour() {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        let mut stepped = fixture_state(&catalog);
        let mut jumped = stepped.clone();
        for hour in 1..=5 {
            stepped.clock.seconds = hour as f64 * 3600.0;
            drift(&mut stepped, &catalog, &config);
        }
        jumped.clock.seconds = 5.0 * 3600.0;
        drift(&mut jumped, &catalog, &config);
        assert_eq!(stepped.market, jumped.market);
        assert_eq!(stepped.rng, jumped.rng);
    }

    #[test]
    fn shock_respects_floor() {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        let mut state = fixture_state(&catalog);
        state.market.index.insert("food".into(), 0.65);
        shock(&mut state, &config, "food");
        assert_eq!(state.market.index_of("food"), 0.6);
    }
}
