//! Logistics capacity versus demand.
//!
//! Demand grows with the raw throughput of every placed building; capacity
//! comes from a base value plus logistics buildings and bonuses. The ratio,
//! clamped to `[logistics_floor, 1]`, throttles all building output.

use slotmap::SecondaryMap;

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::effect::Modifiers;
use crate::id::BuildingKey;
use crate::production::logistics_level_multiplier;
use crate::state::{LogisticsState, WorldState};

pub fn compute(
    state: &WorldState,
    catalog: &Catalog,
    config: &EngineConfig,
    modifiers: &Modifiers,
    placement: &SecondaryMap<BuildingKey, f64>,
) -> LogisticsState {
    let mut capacity =
        config.logistics_base_capacity + state.bonuses.logistics + modifiers.logistics;
    let mut demand = 0.0;
    for (key, building) in &state.buildings {
        let Some(def) = catalog.building(building.building.as_str()) else {
            continue;
        };
        let multiplier = logistics_level_multiplier(building.level)
            * placement.get(key).copied().unwrap_or(1.0);
        capacity += def.logistics_cap_add * multiplier;
        let production: f64 = def.production_per_hour.values().sum();
        let consumption: f64 = def.consumption_per_hour.values().sum();
        demand += (production.abs() + consumption.abs()) * multiplier;
    }
    let factor = (capacity.max(0.0) / demand.max(1.0)).clamp(config.logistics_floor, 1.0);
    LogisticsState {
        capacity,
        demand,
        factor,
    }
}
