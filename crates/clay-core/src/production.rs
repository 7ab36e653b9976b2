//! Production, consumption, storage caps and the collector.
//!
//! Every sub-step each operational building draws its inputs from a running
//! "available" ledger, so buildings earlier in slot order get first claim on
//! scarce inputs. A converter whose inputs cover only a fraction of its
//! needs produces and consumes in that same fraction. Output that would
//! overflow a resource's cap spills into the collector up to its bound; the
//! remainder is recorded as waste.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use slotmap::SecondaryMap;

use crate::catalog::{BuildingDefinition, Catalog};
use crate::config::EngineConfig;
use crate::effect::Modifiers;
use crate::id::{BuildingKey, ResourceId};
use crate::logistics;
use crate::state::{BuildingInstance, LogisticsState, WorldState};

pub fn level_multiplier(level: u32) -> f64 {
    1.15_f64.powi(level.saturating_sub(1) as i32)
}

pub fn storage_level_multiplier(level: u32) -> f64 {
    1.12_f64.powi(level.saturating_sub(1) as i32)
}

pub fn logistics_level_multiplier(level: u32) -> f64 {
    1.1_f64.powi(level.saturating_sub(1) as i32)
}

// ---------------------------------------------------------------------------
// Grid placement
// ---------------------------------------------------------------------------

/// Lookup of placed buildings by grid cell.
pub struct GridIndex<'a> {
    cells: HashMap<(i32, i32), &'a BuildingInstance>,
}

impl<'a> GridIndex<'a> {
    pub fn new(state: &'a WorldState) -> Self {
        let cells = state
            .buildings
            .values()
            .map(|b| ((b.x, b.y), b))
            .collect();
        Self { cells }
    }

    pub fn at(&self, x: i32, y: i32) -> Option<&'a BuildingInstance> {
        self.cells.get(&(x, y)).copied()
    }

    fn neighbours(&self, x: i32, y: i32) -> impl Iterator<Item = &'a BuildingInstance> + '_ {
        [(x + 1, y), (x - 1, y), (x, y + 1), (x, y - 1)]
            .into_iter()
            .filter_map(move |(nx, ny)| self.at(nx, ny))
    }

    /// Bonus when any 4-neighbour is the required building.
    pub fn adjacency_multiplier(&self, building: &BuildingInstance, def: &BuildingDefinition) -> f64 {
        let Some(bonus) = &def.adjacency_bonus else {
            return 1.0;
        };
        if self
            .neighbours(building.x, building.y)
            .any(|n| n.building == bonus.requires_building)
        {
            bonus.multiplier
        } else {
            1.0
        }
    }

    /// Bonus when at least two 4-neighbours share the district tag.
    pub fn district_multiplier(
        &self,
        catalog: &Catalog,
        building: &BuildingInstance,
        def: &BuildingDefinition,
    ) -> f64 {
        let Some(tag) = def.district_tag.as_deref().filter(|t| !t.is_empty()) else {
            return 1.0;
        };
        let matches = self
            .neighbours(building.x, building.y)
            .filter_map(|n| catalog.building(n.building.as_str()))
            .filter(|d| d.district_tag.as_deref() == Some(tag))
            .count();
        if matches >= 2 { def.district_bonus } else { 1.0 }
    }

    pub fn placement_multiplier(
        &self,
        catalog: &Catalog,
        building: &BuildingInstance,
        def: &BuildingDefinition,
    ) -> f64 {
        self.adjacency_multiplier(building, def) * self.district_multiplier(catalog, building, def)
    }
}

/// Adjacency × district multiplier for every building with a known definition.
pub fn placement_multipliers(state: &WorldState, catalog: &Catalog) -> SecondaryMap<BuildingKey, f64> {
    let grid = GridIndex::new(state);
    let mut out = SecondaryMap::new();
    for (key, building) in &state.buildings {
        if let Some(def) = catalog.building(building.building.as_str()) {
            out.insert(key, grid.placement_multiplier(catalog, building, def));
        }
    }
    out
}

/// Buildings held by an active construction or upgrade project.
pub fn locked_buildings(state: &WorldState) -> BTreeSet<BuildingKey> {
    state.projects.values().filter_map(|p| p.building).collect()
}

/// Fraction of `[start, end)` a building spends operational.
pub fn active_fraction(building: &BuildingInstance, locked: bool, start: f64, end: f64) -> f64 {
    if locked || end <= start {
        return 0.0;
    }
    match building.disabled_until {
        Some(until) if until >= end => 0.0,
        Some(until) if until > start => (end - until) / (end - start),
        _ => 1.0,
    }
}

// ---------------------------------------------------------------------------
// Caps and collector bounds
// ---------------------------------------------------------------------------

pub fn compute_caps(state: &WorldState, catalog: &Catalog, modifiers: &Modifiers) -> BTreeMap<ResourceId, f64> {
    let mut caps: BTreeMap<ResourceId, f64> = catalog
        .resources()
        .iter()
        .map(|r| (r.id.clone(), r.base_cap))
        .collect();
    for building in state.buildings.values() {
        let Some(def) = catalog.building(building.building.as_str()) else {
            continue;
        };
        let multiplier = storage_level_multiplier(building.level);
        for (resource, amount) in &def.storage_cap_add {
            *caps.entry(resource.clone()).or_insert(0.0) += amount * multiplier;
        }
    }
    for (resource, amount) in state.bonuses.storage_additions.iter().chain(&modifiers.storage_additions) {
        if let Some(cap) = caps.get_mut(resource) {
            *cap += amount;
        }
    }
    caps
}

/// Recompute the cached caps and pull any amount above its cap back down.
/// The excess is recorded as waste.
pub fn refresh_caps(state: &mut WorldState, catalog: &Catalog) {
    let modifiers = Modifiers::collect(state, catalog);
    let caps = compute_caps(state, catalog, &modifiers);
    for (id, resource) in state.resources.iter_mut() {
        let Some(&cap) = caps.get(id) else {
            continue;
        };
        resource.cap = cap;
        if resource.amount > cap {
            let excess = resource.amount - cap.max(0.0);
            resource.amount = cap.max(0.0);
            state.stats.record_waste(id, excess);
        }
    }
}

/// Per-resource collector bound: base building output × capacity hours.
pub fn collector_bounds(state: &WorldState, catalog: &Catalog) -> BTreeMap<ResourceId, f64> {
    let mut bounds = BTreeMap::new();
    for building in state.buildings.values() {
        let Some(def) = catalog.building(building.building.as_str()) else {
            continue;
        };
        let multiplier = level_multiplier(building.level);
        for (resource, rate) in &def.production_per_hour {
            if *rate > 0.0 {
                *bounds.entry(resource.clone()).or_insert(0.0) += rate * multiplier;
            }
        }
    }
    let hours = state.collector.capacity_hours.max(0.0);
    for bound in bounds.values_mut() {
        *bound *= hours;
    }
    bounds
}

// ---------------------------------------------------------------------------
// Step inputs
// ---------------------------------------------------------------------------

/// Everything a sub-step reads that is derived from the world rather than
/// stored in it. Rebuilt at the start of every sub-step so constructions
/// completed in the previous sub-step are already reflected.
#[derive(Debug, Clone)]
pub struct StepInputs {
    pub modifiers: Modifiers,
    pub caps: BTreeMap<ResourceId, f64>,
    pub placement: SecondaryMap<BuildingKey, f64>,
    pub locked: BTreeSet<BuildingKey>,
    pub logistics: LogisticsState,
    pub collector_bounds: BTreeMap<ResourceId, f64>,
}

impl StepInputs {
    pub fn gather(state: &WorldState, catalog: &Catalog, config: &EngineConfig) -> Self {
        let modifiers = Modifiers::collect(state, catalog);
        let caps = compute_caps(state, catalog, &modifiers);
        let placement = placement_multipliers(state, catalog);
        let logistics = logistics::compute(state, catalog, config, &modifiers, &placement);
        Self {
            caps,
            locked: locked_buildings(state),
            collector_bounds: collector_bounds(state, catalog),
            placement,
            logistics,
            modifiers,
        }
    }

    pub fn placement_of(&self, key: BuildingKey) -> f64 {
        self.placement.get(key).copied().unwrap_or(1.0)
    }
}

/// What one sub-step of production did.
#[derive(Debug, Clone, Default)]
pub struct StepFlows {
    pub produced: BTreeMap<ResourceId, f64>,
    pub consumed: BTreeMap<ResourceId, f64>,
    /// Net change of each resource expressed per hour.
    pub net_per_hour: BTreeMap<ResourceId, f64>,
}

fn add(map: &mut BTreeMap<ResourceId, f64>, id: &ResourceId, amount: f64) {
    *map.entry(id.clone()).or_insert(0.0) += amount;
}

// ---------------------------------------------------------------------------
// Sub-step
// ---------------------------------------------------------------------------

/// Integrate production and consumption over `dt` seconds, clamp to caps,
/// and route overflow into the collector.
pub fn run(state: &mut WorldState, catalog: &Catalog, inputs: &StepInputs, dt: f64) -> StepFlows {
    let hours = dt / 3600.0;
    let start = state.clock.seconds;
    let end = start + dt;
    let mut available: BTreeMap<ResourceId, f64> = state
        .resources
        .iter()
        .map(|(id, r)| (id.clone(), r.amount))
        .collect();
    let mut flows = StepFlows::default();
    let mut efficiency_sum = 0.0;
    let mut efficiency_count = 0u32;

    for (key, building) in &state.buildings {
        let Some(def) = catalog.building(building.building.as_str()) else {
            continue;
        };
        let active = active_fraction(building, inputs.locked.contains(&key), start, end);
        if active <= 0.0 {
            continue;
        }
        let span = hours * active;
        let multiplier = level_multiplier(building.level) * inputs.placement_of(key);

        let mut input_factor: f64 = 1.0;
        let needs = def
            .consumption_per_hour
            .iter()
            .map(|(id, rate)| (id, rate * multiplier * span))
            .chain(def.maintenance_per_hour.iter().map(|(id, rate)| (id, rate * span)));
        for (id, needed) in needs {
            if needed > 0.0 {
                let have = available.get(id).copied().unwrap_or(0.0);
                input_factor = input_factor.min(have / needed);
            }
        }
        let input_factor = input_factor.clamp(0.0, 1.0);
        let base = input_factor * inputs.logistics.factor;
        let factor = if def.has_inputs() {
            base
        } else {
            def.efficiency_floor.max(base)
        };

        if factor > 0.0 {
            for (id, rate) in &def.production_per_hour {
                add(&mut flows.produced, id, rate * multiplier * span * factor);
            }
        }
        if base > 0.0 {
            let draws = def
                .consumption_per_hour
                .iter()
                .map(|(id, rate)| (id, rate * multiplier * span * base))
                .chain(
                    def.maintenance_per_hour
                        .iter()
                        .map(|(id, rate)| (id, rate * span * base)),
                );
            for (id, total) in draws {
                add(&mut flows.consumed, id, total);
                if let Some(have) = available.get_mut(id) {
                    *have = (*have - total).max(0.0);
                }
            }
        }
        efficiency_sum += base;
        efficiency_count += 1;
    }

    // Contracts: upkeep coverage scales both sides and their multipliers.
    let mut contract_multipliers: BTreeMap<ResourceId, f64> = BTreeMap::new();
    let market = &state.market;
    for faction in state.factions.values_mut() {
        for contract in faction.contracts.iter_mut() {
            let Some(def) = catalog.contract(contract.contract.as_str()) else {
                continue;
            };
            let mut coverage: f64 = 1.0;
            for (id, rate) in &def.upkeep_per_hour {
                let needed = rate * hours;
                if needed > 0.0 {
                    let have = available.get(id).copied().unwrap_or(0.0);
                    coverage = coverage.min(have / needed);
                }
            }
            let coverage = coverage.clamp(0.0, 1.0);
            if coverage < 1.0 && hours > 0.0 {
                contract.upkeep_missed = true;
            }
            for (id, rate) in &def.upkeep_per_hour {
                let total = rate * hours * coverage;
                add(&mut flows.consumed, id, total);
                if let Some(have) = available.get_mut(id) {
                    *have = (*have - total).max(0.0);
                }
            }
            for (id, amount) in &def.effects_per_hour {
                let price = market.index_of(id.as_str()) * def.price_index_multiplier;
                add(&mut flows.produced, id, amount * hours * price * coverage);
            }
            for (id, multiplier) in &def.multipliers {
                *contract_multipliers.entry(id.clone()).or_insert(1.0) *=
                    1.0 + (multiplier - 1.0) * coverage;
            }
        }
    }

    let cohesion_factor = 0.9 + 0.2 * state.meters.cohesion;
    let biosphere_factor = 0.85 + 0.3 * state.meters.biosphere;
    for (id, amount) in flows.produced.iter_mut() {
        let mut multiplier = state.bonuses.global_multiplier
            * inputs.modifiers.global_multiplier
            * state.bonuses.resource_multiplier(id.as_str())
            * inputs.modifiers.resource_multiplier(id.as_str())
            * contract_multipliers.get(id).copied().unwrap_or(1.0)
            * cohesion_factor;
        if catalog
            .resource(id.as_str())
            .is_some_and(|r| r.biosphere_sensitive)
        {
            multiplier *= biosphere_factor;
        }
        *amount *= multiplier;
    }

    state.stats.last_efficiency = if efficiency_count > 0 {
        efficiency_sum / efficiency_count as f64
    } else {
        1.0
    };

    for (id, resource) in state.resources.iter_mut() {
        let cap = inputs.caps.get(id).copied().unwrap_or(resource.cap);
        let produced = flows.produced.get(id).copied().unwrap_or(0.0);
        let consumed = flows.consumed.get(id).copied().unwrap_or(0.0);
        let next = resource.amount + produced - consumed;
        let overflow = (next - cap).max(0.0);
        resource.amount = next.min(cap).max(0.0);
        resource.cap = cap;
        if produced > 0.0 {
            add(&mut state.stats.produced, id, produced);
        }
        if overflow > 0.0 {
            let bound = inputs.collector_bounds.get(id).copied().unwrap_or(0.0);
            let stored = state.collector.stored.entry(id.clone()).or_insert(0.0);
            let taken = overflow.min((bound - *stored).max(0.0));
            *stored += taken;
            state.stats.record_waste(id, overflow - taken);
        }
        if hours > 0.0 {
            flows
                .net_per_hour
                .insert(id.clone(), (produced - consumed) / hours);
        }
    }

    // The bound follows the building set; anything above it is lost.
    for (id, stored) in state.collector.stored.iter_mut() {
        let bound = inputs.collector_bounds.get(id).copied().unwrap_or(0.0);
        if *stored > bound {
            state.stats.record_waste(id, *stored - bound);
            *stored = bound;
        }
    }

    flows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    fn step(state: &mut WorldState, catalog: &Catalog, dt: f64) -> StepFlows {
        let config = EngineConfig::default();
        let inputs = StepInputs::gather(state, catalog, &config);
        let flows = run(state, catalog, &inputs, dt);
        state.clock.advance_step(dt);
        flows
    }

    #[test]
    fn level_curves() {
        assert_eq!(level_multiplier(1), 1.0);
        assert!((level_multiplier(3) - 1.3225).abs() < 1e-12);
        assert!((storage_level_multiplier(2) - 1.12).abs() < 1e-12);
        assert!((logistics_level_multiplier(2) - 1.1).abs() < 1e-12);
        assert_eq!(level_multiplier(0), 1.0);
    }

    #[test]
    fn source_building_fills_stock() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        set_amount(&mut state, "food", 0.0);
        place(&mut state, "farm", 0, 0);
        let flows = step(&mut state, &catalog, 3600.0);
        assert!(state.amount("food") > 0.0);
        assert!(flows.produced["food"] > 0.0);
        assert!(state.stats.produced["food"] > 0.0);
    }

    #[test]
    fn converter_without_input_produces_nothing() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        set_amount(&mut state, "materials", 0.0);
        set_amount(&mut state, "tools", 0.0);
        place(&mut state, "workshop", 0, 0);
        for _ in 0..60 {
            step(&mut state, &catalog, 1.0);
        }
        assert_eq!(state.amount("tools"), 0.0);
    }

    #[test]
    fn converter_with_half_input_is_throttled() {
        let catalog = fixture_catalog();
        let def = catalog.building("workshop").unwrap();
        let input_rate = def.consumption_per_hour["materials"];

        let mut full = fixture_state(&catalog);
        set_amount(&mut full, "materials", 1_000.0);
        set_amount(&mut full, "tools", 0.0);
        place(&mut full, "workshop", 0, 0);
        step(&mut full, &catalog, 3600.0);

        let mut half = fixture_state(&catalog);
        set_amount(&mut half, "materials", input_rate / 2.0);
        set_amount(&mut half, "tools", 0.0);
        place(&mut half, "workshop", 0, 0);
        step(&mut half, &catalog, 3600.0);

        let full_tools = full.amount("tools");
        let half_tools = half.amount("tools");
        assert!(half_tools > 0.0);
        assert!((half_tools - full_tools / 2.0).abs() < 1e-9);
        assert!(half.amount("materials").abs() < 1e-9);
    }

    #[test]
    fn overflow_goes_to_collector_then_waste() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let cap = state.resources["food"].cap;
        set_amount(&mut state, "food", cap);
        place(&mut state, "farm", 0, 0);
        let inputs = StepInputs::gather(&state, &catalog, &EngineConfig::default());
        let bound = inputs.collector_bounds["food"];
        assert!(bound > 0.0);

        for _ in 0..(24 * 4) {
            step(&mut state, &catalog, 900.0);
        }
        assert_eq!(state.amount("food"), cap);
        let stored = state.collector.stored["food"];
        assert!(stored <= bound + 1e-9);
        assert!((stored - bound).abs() < 1e-6);
        assert!(state.stats.wasted["food"] > 0.0);
    }

    #[test]
    fn caps_include_storage_buildings_and_bonuses() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let base = catalog.resource("food").unwrap().base_cap;
        place(&mut state, "granary", 0, 0);
        state
            .bonuses
            .storage_additions
            .insert("food".into(), 10.0);
        let caps = compute_caps(&state, &catalog, &Modifiers::default());
        let add = catalog.building("granary").unwrap().storage_cap_add["food"];
        assert!((caps["food"] - (base + add + 10.0)).abs() < 1e-9);
    }

    #[test]
    fn adjacency_bonus_applies_to_neighbour() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let mill = place(&mut state, "mill", 0, 0);
        let alone = placement_multipliers(&state, &catalog)[mill];
        assert_eq!(alone, 1.0);
        place(&mut state, "farm", 1, 0);
        let boosted = placement_multipliers(&state, &catalog)[mill];
        let expected = catalog
            .building("mill")
            .unwrap()
            .adjacency_bonus
            .as_ref()
            .unwrap()
            .multiplier;
        assert_eq!(boosted, expected);
    }

    #[test]
    fn district_needs_two_neighbours() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let centre = place(&mut state, "farm", 5, 5);
        place(&mut state, "farm", 6, 5);
        assert_eq!(placement_multipliers(&state, &catalog)[centre], 1.0);
        place(&mut state, "farm", 4, 5);
        let bonus = catalog.building("farm").unwrap().district_bonus;
        assert_eq!(placement_multipliers(&state, &catalog)[centre], bonus);
    }

    #[test]
    fn disabled_fraction_counts_active_tail() {
        let building = BuildingInstance {
            building: "farm".into(),
            level: 1,
            x: 0,
            y: 0,
            disabled_until: Some(10.5),
        };
        assert_eq!(active_fraction(&building, false, 10.0, 11.0), 0.5);
        assert_eq!(active_fraction(&building, false, 0.0, 1.0), 0.0);
        assert_eq!(active_fraction(&building, false, 20.0, 21.0), 1.0);
        assert_eq!(active_fraction(&building, true, 20.0, 21.0), 0.0);
    }

    #[test]
    fn missing_definition_contributes_nothing() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        place(&mut state, "vanished", 0, 0);
        let before = state.amount("food");
        step(&mut state, &catalog, 60.0);
        assert_eq!(state.amount("food"), before);
        assert_eq!(state.stats.last_efficiency, 1.0);
    }
}
