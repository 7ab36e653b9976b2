//! Content catalog: the immutable rule tables the engine runs against.
//!
//! A [`ContentPack`] is the serde form authored by designers. It is turned
//! into a [`Catalog`] by [`CatalogBuilder`], which indexes every table by id
//! and checks referential integrity. Once built, the catalog is never
//! mutated by the engine.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;

use serde::{Deserialize, Serialize};

use crate::effect::Effect;
use crate::id::*;

/// Per-resource amounts (costs, rates, rewards).
pub type ResourceAmounts = BTreeMap<ResourceId, f64>;

// ---------------------------------------------------------------------------
// Definitions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceDefinition {
    pub id: ResourceId,
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
    #[serde(default)]
    pub starting_amount: f64,
    pub base_cap: f64,
    /// Production of this resource scales with biosphere health.
    #[serde(default)]
    pub biosphere_sensitive: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjacencyBonus {
    pub requires_building: BuildingId,
    pub multiplier: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildingDefinition {
    pub id: BuildingId,
    pub name: String,
    pub era: EraId,
    #[serde(default)]
    pub category: String,
    #[serde(default = "one_u32")]
    pub max_level: u32,
    #[serde(default)]
    pub base_cost: ResourceAmounts,
    #[serde(default = "one_f64")]
    pub cost_growth: f64,
    #[serde(default)]
    pub build_time_seconds: f64,
    #[serde(default)]
    pub production_per_hour: ResourceAmounts,
    /// Inputs; scale with level and throttle output when scarce.
    #[serde(default)]
    pub consumption_per_hour: ResourceAmounts,
    /// Flat upkeep; throttles output but does not scale with level.
    #[serde(default)]
    pub maintenance_per_hour: ResourceAmounts,
    #[serde(default)]
    pub storage_cap_add: ResourceAmounts,
    #[serde(default)]
    pub defense_score: f64,
    #[serde(default)]
    pub project_speed_bonus: f64,
    #[serde(default)]
    pub adjacency_bonus: Option<AdjacencyBonus>,
    #[serde(default)]
    pub logistics_cap_add: f64,
    #[serde(default)]
    pub district_tag: Option<String>,
    #[serde(default = "one_f64")]
    pub district_bonus: f64,
    /// Output factor a building without inputs never drops below.
    #[serde(default)]
    pub efficiency_floor: f64,
    #[serde(default)]
    pub cohesion_per_hour: f64,
    #[serde(default)]
    pub biosphere_per_hour: f64,
}

impl BuildingDefinition {
    pub fn has_inputs(&self) -> bool {
        !self.consumption_per_hour.is_empty() || !self.maintenance_per_hour.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDefinition {
    pub id: ProjectId,
    pub name: String,
    pub era: EraId,
    #[serde(default)]
    pub category: String,
    pub duration_seconds: f64,
    #[serde(default)]
    pub crew_required: u32,
    #[serde(default)]
    pub costs: ResourceAmounts,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EraDefinition {
    pub id: EraId,
    pub name: String,
    pub sort_order: i32,
    /// Completing any one of these projects completes the era.
    #[serde(default)]
    pub keystone_project_ids: Vec<ProjectId>,
    #[serde(default)]
    pub unlocks_building_ids: Vec<BuildingId>,
    #[serde(default)]
    pub unlocks_project_ids: Vec<ProjectId>,
    /// Flags that imply the world has reached this era; used when
    /// repairing saves written before era tracking was reliable.
    #[serde(default)]
    pub completion_flags: Vec<FlagId>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FactionDefinition {
    pub id: FactionId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub starting_relationship: i32,
    /// The relationship with a hostile faction drives raid hostility.
    #[serde(default)]
    pub hostile: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractDefinition {
    pub id: ContractId,
    pub name: String,
    pub faction: FactionId,
    #[serde(default)]
    pub required_relationship: i32,
    pub duration_seconds: f64,
    #[serde(default)]
    pub upkeep_per_hour: ResourceAmounts,
    #[serde(default)]
    pub effects_per_hour: ResourceAmounts,
    #[serde(default)]
    pub multipliers: ResourceAmounts,
    #[serde(default)]
    pub security_bonus: f64,
    #[serde(default = "one_f64")]
    pub price_index_multiplier: f64,
    #[serde(default)]
    pub renewable: bool,
    /// Only startable after an `unlock_contract` effect names it.
    #[serde(default)]
    pub requires_unlock: bool,
    #[serde(default)]
    pub penalty_effects: Vec<Effect>,
    #[serde(default)]
    pub description: String,
}

/// What a random event does when it fires.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RandomEventKind {
    MarketShock {
        resource: ResourceId,
    },
    DiplomaticPressure {
        faction: FactionId,
        delta: i32,
    },
    Discovery {
        shards: u32,
    },
    InfrastructureFailure,
    Raid,
    #[default]
    Narrative,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventDefinition {
    pub id: EventId,
    #[serde(default)]
    pub category: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub weight: f64,
    #[serde(default)]
    pub kind: RandomEventKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyDefinition {
    pub id: PolicyId,
    pub name: String,
    pub slot: PolicySlot,
    pub era: EraId,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub cooldown_seconds: f64,
    #[serde(default)]
    pub description: String,
}

/// Conditions that must all hold for an event chain to trigger.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EventTrigger {
    pub min_exposure: Option<f64>,
    pub min_security: Option<f64>,
    pub min_hostility: Option<f64>,
    pub min_cohesion: Option<f64>,
    pub max_cohesion: Option<f64>,
    pub min_biosphere: Option<f64>,
    pub max_biosphere: Option<f64>,
    pub min_raid_chance: Option<f64>,
    pub resource_at_cap: Option<ResourceId>,
    pub requires_era: Option<EraId>,
    pub requires_contract: Option<ContractId>,
    pub requires_flag: Option<FlagId>,
    pub requires_flag_not_set: Option<FlagId>,
    pub logistics_below: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventChoiceDefinition {
    pub id: ChoiceId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub next: Option<ChainId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventChainDefinition {
    pub id: ChainId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub trigger: EventTrigger,
    pub choices: Vec<EventChoiceDefinition>,
    /// Applied once when the chain triggers.
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub cooldown_seconds: f64,
    #[serde(default)]
    pub unique_flag: Option<FlagId>,
}

impl EventChainDefinition {
    pub fn choice(&self, id: &str) -> Option<&EventChoiceDefinition> {
        self.choices.iter().find(|c| c.id.as_str() == id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetahumanDefinition {
    pub id: MetahumanId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub ally_passive_effects: Vec<Effect>,
    #[serde(default)]
    pub enemy_passive_effects: Vec<Effect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonDefinition {
    pub id: PersonId,
    pub name: String,
    pub era: EraId,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub costs: ResourceAmounts,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LegacyUpgradeDefinition {
    pub id: LegacyUpgradeId,
    pub name: String,
    pub cost: u32,
    #[serde(default)]
    pub effects: Vec<Effect>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainTierDefinition {
    pub tier: u32,
    pub required_points: u32,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainDefinition {
    pub id: DomainId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Completing a project with any of these tags earns a point.
    pub tags: Vec<String>,
    pub tiers: Vec<DomainTierDefinition>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchDefinition {
    pub id: DispatchId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub duration_seconds: f64,
    #[serde(default)]
    pub required_crew: u32,
    #[serde(default)]
    pub rewards: ResourceAmounts,
    /// Probability the dispatch returns failed (half rewards).
    #[serde(default)]
    pub risk_chance: f64,
    pub era: EraId,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub requires_flag: Option<FlagId>,
    #[serde(default)]
    pub requires_flag_not_set: Option<FlagId>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MegaprojectFamilyDefinition {
    pub id: FamilyId,
    pub choices: Vec<ProjectId>,
    #[serde(default)]
    pub exclusive: bool,
    #[serde(default)]
    pub description: String,
}

/// Condition an achievement waits for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AchievementCondition {
    /// Net hourly rate of a resource at or above `amount`.
    ResourceRate { resource: ResourceId, amount: f64 },
    /// Lifetime production of a resource at or above `amount`.
    ResourceTotal { resource: ResourceId, amount: f64 },
    DomainTier { domain: DomainId, tier: u32 },
    /// No raid for at least `hours` of simulated time.
    RaidFreeHours { hours: f64 },
    CohesionAtLeast { amount: f64 },
    BiosphereAtLeast { amount: f64 },
    Flag { flag: FlagId },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AchievementDefinition {
    pub id: AchievementId,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub condition: AchievementCondition,
    #[serde(default)]
    pub effects: Vec<Effect>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrestigeDefinition {
    /// Resource whose lifetime production earns the energy bonus.
    pub energy_resource: Option<ResourceId>,
    /// The energy bonus only counts once this flag is set.
    pub energy_flag: Option<FlagId>,
    /// Orders of magnitude subtracted before the energy bonus counts.
    pub energy_log_offset: i32,
}

impl Default for PrestigeDefinition {
    fn default() -> Self {
        Self {
            energy_resource: None,
            energy_flag: None,
            energy_log_offset: 7,
        }
    }
}

/// Pack-wide rules and starting values.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesDefinition {
    pub collector_capacity_hours: f64,
    pub starting_crew: u32,
    pub grid_size: i32,
    pub grid_growth_per_era: i32,
    pub max_roster: u32,
    pub offline_cap_days: u32,
    /// Fill ratio of this resource pulls cohesion up or down.
    pub cohesion_resource: Option<ResourceId>,
    pub prestige: PrestigeDefinition,
}

impl Default for RulesDefinition {
    fn default() -> Self {
        Self {
            collector_capacity_hours: 8.0,
            starting_crew: 2,
            grid_size: 20,
            grid_growth_per_era: 10,
            max_roster: 8,
            offline_cap_days: 7,
            cohesion_resource: None,
            prestige: PrestigeDefinition::default(),
        }
    }
}

fn one_u32() -> u32 {
    1
}

fn one_f64() -> f64 {
    1.0
}

// ---------------------------------------------------------------------------
// Content pack (serde form)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentPack {
    pub resources: Vec<ResourceDefinition>,
    pub buildings: Vec<BuildingDefinition>,
    pub projects: Vec<ProjectDefinition>,
    pub eras: Vec<EraDefinition>,
    pub factions: Vec<FactionDefinition>,
    pub contracts: Vec<ContractDefinition>,
    pub events: Vec<EventDefinition>,
    pub policies: Vec<PolicyDefinition>,
    pub event_chains: Vec<EventChainDefinition>,
    pub metahumans: Vec<MetahumanDefinition>,
    pub people: Vec<PersonDefinition>,
    pub legacy_upgrades: Vec<LegacyUpgradeDefinition>,
    pub domains: Vec<DomainDefinition>,
    pub dispatches: Vec<DispatchDefinition>,
    pub megaproject_families: Vec<MegaprojectFamilyDefinition>,
    pub achievements: Vec<AchievementDefinition>,
    pub rules: RulesDefinition,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum CatalogError {
    #[error("duplicate {kind} id: {id}")]
    DuplicateId { kind: &'static str, id: String },
    #[error("{from} references unknown {kind} {id:?}")]
    UnresolvedRef {
        kind: &'static str,
        id: String,
        from: String,
    },
    #[error("invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
    #[error("content pack defines no eras")]
    NoEras,
}

// ---------------------------------------------------------------------------
// Indexed table
// ---------------------------------------------------------------------------

/// Definitions in authoring order plus an id index.
#[derive(Debug, Clone)]
pub struct Table<K, V> {
    items: Vec<V>,
    index: HashMap<K, usize>,
}

impl<K, V> Table<K, V>
where
    K: Eq + Hash + std::borrow::Borrow<str> + Clone + std::fmt::Display,
{
    fn build(
        kind: &'static str,
        items: Vec<V>,
        id_of: impl Fn(&V) -> &K,
    ) -> Result<Self, CatalogError> {
        let mut index = HashMap::with_capacity(items.len());
        for (i, item) in items.iter().enumerate() {
            let id = id_of(item);
            if index.insert(id.clone(), i).is_some() {
                return Err(CatalogError::DuplicateId {
                    kind,
                    id: id.to_string(),
                });
            }
        }
        Ok(Self { items, index })
    }

    pub fn get(&self, id: &str) -> Option<&V> {
        self.index.get(id).map(|&i| &self.items[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    /// Definitions in authoring order.
    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

// ---------------------------------------------------------------------------
// Builder
// ---------------------------------------------------------------------------

/// Builder for constructing an immutable [`Catalog`].
/// Three-phase lifecycle: registration -> mutation -> finalization.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    pack: ContentPack,
}

macro_rules! register_fns {
    ($($name:ident => $field:ident : $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self, def: $ty) -> &mut Self {
                self.pack.$field.push(def);
                self
            }
        )*
    };
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pack(pack: ContentPack) -> Self {
        Self { pack }
    }

    // Phase 1: registration.
    register_fns! {
        register_resource => resources: ResourceDefinition,
        register_building => buildings: BuildingDefinition,
        register_project => projects: ProjectDefinition,
        register_era => eras: EraDefinition,
        register_faction => factions: FactionDefinition,
        register_contract => contracts: ContractDefinition,
        register_event => events: EventDefinition,
        register_policy => policies: PolicyDefinition,
        register_chain => event_chains: EventChainDefinition,
        register_metahuman => metahumans: MetahumanDefinition,
        register_person => people: PersonDefinition,
        register_legacy_upgrade => legacy_upgrades: LegacyUpgradeDefinition,
        register_domain => domains: DomainDefinition,
        register_dispatch => dispatches: DispatchDefinition,
        register_family => megaproject_families: MegaprojectFamilyDefinition,
        register_achievement => achievements: AchievementDefinition,
    }

    pub fn rules(&mut self, rules: RulesDefinition) -> &mut Self {
        self.pack.rules = rules;
        self
    }

    /// Phase 2: mutate an existing building definition by id.
    pub fn mutate_building<F>(&mut self, id: &str, f: F) -> Result<(), CatalogError>
    where
        F: FnOnce(&mut BuildingDefinition),
    {
        let def = self
            .pack
            .buildings
            .iter_mut()
            .find(|b| b.id.as_str() == id)
            .ok_or_else(|| unresolved("building", id, "mutate_building"))?;
        f(def);
        Ok(())
    }

    /// Phase 2: mutate an existing project definition by id.
    pub fn mutate_project<F>(&mut self, id: &str, f: F) -> Result<(), CatalogError>
    where
        F: FnOnce(&mut ProjectDefinition),
    {
        let def = self
            .pack
            .projects
            .iter_mut()
            .find(|p| p.id.as_str() == id)
            .ok_or_else(|| unresolved("project", id, "mutate_project"))?;
        f(def);
        Ok(())
    }

    /// Phase 3: index, validate, and freeze.
    pub fn build(self) -> Result<Catalog, CatalogError> {
        let pack = self.pack;
        if pack.eras.is_empty() {
            return Err(CatalogError::NoEras);
        }
        if !(pack.rules.collector_capacity_hours > 0.0) {
            return Err(CatalogError::InvalidValue {
                field: "rules.collector_capacity_hours".into(),
                reason: "must be positive".into(),
            });
        }

        let catalog = Catalog {
            resources: Table::build("resource", pack.resources, |d| &d.id)?,
            buildings: Table::build("building", pack.buildings, |d| &d.id)?,
            projects: Table::build("project", pack.projects, |d| &d.id)?,
            eras: Table::build("era", pack.eras, |d| &d.id)?,
            factions: Table::build("faction", pack.factions, |d| &d.id)?,
            contracts: Table::build("contract", pack.contracts, |d| &d.id)?,
            events: Table::build("event", pack.events, |d| &d.id)?,
            policies: Table::build("policy", pack.policies, |d| &d.id)?,
            chains: Table::build("event chain", pack.event_chains, |d| &d.id)?,
            metahumans: Table::build("metahuman", pack.metahumans, |d| &d.id)?,
            people: Table::build("person", pack.people, |d| &d.id)?,
            legacy_upgrades: Table::build("legacy upgrade", pack.legacy_upgrades, |d| &d.id)?,
            domains: Table::build("domain", pack.domains, |d| &d.id)?,
            dispatches: Table::build("dispatch", pack.dispatches, |d| &d.id)?,
            families: Table::build("megaproject family", pack.megaproject_families, |d| &d.id)?,
            achievements: Table::build("achievement", pack.achievements, |d| &d.id)?,
            rules: pack.rules,
        };
        catalog.validate_refs()?;
        Ok(catalog)
    }
}

fn unresolved(kind: &'static str, id: &str, from: impl Into<String>) -> CatalogError {
    CatalogError::UnresolvedRef {
        kind,
        id: id.to_string(),
        from: from.into(),
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Immutable, validated content. Frozen after [`CatalogBuilder::build`].
#[derive(Debug, Clone)]
pub struct Catalog {
    resources: Table<ResourceId, ResourceDefinition>,
    buildings: Table<BuildingId, BuildingDefinition>,
    projects: Table<ProjectId, ProjectDefinition>,
    eras: Table<EraId, EraDefinition>,
    factions: Table<FactionId, FactionDefinition>,
    contracts: Table<ContractId, ContractDefinition>,
    events: Table<EventId, EventDefinition>,
    policies: Table<PolicyId, PolicyDefinition>,
    chains: Table<ChainId, EventChainDefinition>,
    metahumans: Table<MetahumanId, MetahumanDefinition>,
    people: Table<PersonId, PersonDefinition>,
    legacy_upgrades: Table<LegacyUpgradeId, LegacyUpgradeDefinition>,
    domains: Table<DomainId, DomainDefinition>,
    dispatches: Table<DispatchId, DispatchDefinition>,
    families: Table<FamilyId, MegaprojectFamilyDefinition>,
    achievements: Table<AchievementId, AchievementDefinition>,
    rules: RulesDefinition,
}

impl Catalog {
    pub fn from_pack(pack: ContentPack) -> Result<Self, CatalogError> {
        CatalogBuilder::from_pack(pack).build()
    }

    pub fn resources(&self) -> &Table<ResourceId, ResourceDefinition> {
        &self.resources
    }
    pub fn buildings(&self) -> &Table<BuildingId, BuildingDefinition> {
        &self.buildings
    }
    pub fn projects(&self) -> &Table<ProjectId, ProjectDefinition> {
        &self.projects
    }
    pub fn eras(&self) -> &Table<EraId, EraDefinition> {
        &self.eras
    }
    pub fn factions(&self) -> &Table<FactionId, FactionDefinition> {
        &self.factions
    }
    pub fn contracts(&self) -> &Table<ContractId, ContractDefinition> {
        &self.contracts
    }
    pub fn events(&self) -> &Table<EventId, EventDefinition> {
        &self.events
    }
    pub fn policies(&self) -> &Table<PolicyId, PolicyDefinition> {
        &self.policies
    }
    pub fn chains(&self) -> &Table<ChainId, EventChainDefinition> {
        &self.chains
    }
    pub fn metahumans(&self) -> &Table<MetahumanId, MetahumanDefinition> {
        &self.metahumans
    }
    pub fn people(&self) -> &Table<PersonId, PersonDefinition> {
        &self.people
    }
    pub fn legacy_upgrades(&self) -> &Table<LegacyUpgradeId, LegacyUpgradeDefinition> {
        &self.legacy_upgrades
    }
    pub fn domains(&self) -> &Table<DomainId, DomainDefinition> {
        &self.domains
    }
    pub fn dispatches(&self) -> &Table<DispatchId, DispatchDefinition> {
        &self.dispatches
    }
    pub fn families(&self) -> &Table<FamilyId, MegaprojectFamilyDefinition> {
        &self.families
    }
    pub fn achievements(&self) -> &Table<AchievementId, AchievementDefinition> {
        &self.achievements
    }
    pub fn rules(&self) -> &RulesDefinition {
        &self.rules
    }

    pub fn resource(&self, id: &str) -> Option<&ResourceDefinition> {
        self.resources.get(id)
    }
    pub fn building(&self, id: &str) -> Option<&BuildingDefinition> {
        self.buildings.get(id)
    }
    pub fn project(&self, id: &str) -> Option<&ProjectDefinition> {
        self.projects.get(id)
    }
    pub fn era(&self, id: &str) -> Option<&EraDefinition> {
        self.eras.get(id)
    }
    pub fn faction(&self, id: &str) -> Option<&FactionDefinition> {
        self.factions.get(id)
    }
    pub fn contract(&self, id: &str) -> Option<&ContractDefinition> {
        self.contracts.get(id)
    }
    pub fn policy(&self, id: &str) -> Option<&PolicyDefinition> {
        self.policies.get(id)
    }
    pub fn chain(&self, id: &str) -> Option<&EventChainDefinition> {
        self.chains.get(id)
    }
    pub fn metahuman(&self, id: &str) -> Option<&MetahumanDefinition> {
        self.metahumans.get(id)
    }
    pub fn person(&self, id: &str) -> Option<&PersonDefinition> {
        self.people.get(id)
    }
    pub fn legacy_upgrade(&self, id: &str) -> Option<&LegacyUpgradeDefinition> {
        self.legacy_upgrades.get(id)
    }
    pub fn domain(&self, id: &str) -> Option<&DomainDefinition> {
        self.domains.get(id)
    }
    pub fn dispatch(&self, id: &str) -> Option<&DispatchDefinition> {
        self.dispatches.get(id)
    }
    pub fn achievement(&self, id: &str) -> Option<&AchievementDefinition> {
        self.achievements.get(id)
    }

    /// Sort order of an era, if it exists.
    pub fn era_order(&self, id: &str) -> Option<i32> {
        self.eras.get(id).map(|e| e.sort_order)
    }

    /// The era with the lowest sort order.
    pub fn starting_era(&self) -> &EraDefinition {
        // Non-empty: `build` rejects packs without eras.
        let mut first = &self.eras.items[0];
        for era in self.eras.iter() {
            if era.sort_order < first.sort_order {
                first = era;
            }
        }
        first
    }

    /// True when the current era is at or past `required`. Unknown eras on
    /// either side count as locked.
    pub fn era_reached(&self, current: &str, required: &str) -> bool {
        match (self.era_order(current), self.era_order(required)) {
            (Some(current), Some(required)) => current >= required,
            _ => false,
        }
    }

    /// The exclusive-or-not family a project belongs to, if any.
    pub fn family_of(&self, project: &str) -> Option<&MegaprojectFamilyDefinition> {
        self.families
            .iter()
            .find(|f| f.choices.iter().any(|c| c.as_str() == project))
    }

    /// Faction whose relationship drives hostility.
    pub fn hostile_faction(&self) -> Option<&FactionDefinition> {
        self.factions.iter().find(|f| f.hostile)
    }

    // -----------------------------------------------------------------------
    // Referential integrity
    // -----------------------------------------------------------------------

    fn validate_refs(&self) -> Result<(), CatalogError> {
        let check = |ok: bool, kind: &'static str, id: &str, from: &dyn Fn() -> String| {
            if ok {
                Ok(())
            } else {
                Err(unresolved(kind, id, from()))
            }
        };

        for b in self.buildings.iter() {
            let from = || format!("building {}", b.id);
            check(self.eras.contains(b.era.as_str()), "era", b.era.as_str(), &from)?;
            if let Some(adj) = &b.adjacency_bonus {
                let id = adj.requires_building.as_str();
                check(self.buildings.contains(id), "building", id, &from)?;
            }
            self.check_amounts(&b.base_cost, &from)?;
            self.check_amounts(&b.production_per_hour, &from)?;
            self.check_amounts(&b.consumption_per_hour, &from)?;
            self.check_amounts(&b.maintenance_per_hour, &from)?;
            self.check_amounts(&b.storage_cap_add, &from)?;
        }
        for p in self.projects.iter() {
            let from = || format!("project {}", p.id);
            check(self.eras.contains(p.era.as_str()), "era", p.era.as_str(), &from)?;
            self.check_amounts(&p.costs, &from)?;
            self.check_effects(&p.effects, &from)?;
        }
        for e in self.eras.iter() {
            let from = || format!("era {}", e.id);
            for id in &e.keystone_project_ids {
                check(self.projects.contains(id.as_str()), "project", id.as_str(), &from)?;
            }
            for id in &e.unlocks_project_ids {
                check(self.projects.contains(id.as_str()), "project", id.as_str(), &from)?;
            }
            for id in &e.unlocks_building_ids {
                check(self.buildings.contains(id.as_str()), "building", id.as_str(), &from)?;
            }
        }
        for c in self.contracts.iter() {
            let from = || format!("contract {}", c.id);
            let faction = c.faction.as_str();
            check(self.factions.contains(faction), "faction", faction, &from)?;
            self.check_amounts(&c.upkeep_per_hour, &from)?;
            self.check_amounts(&c.effects_per_hour, &from)?;
            self.check_effects(&c.penalty_effects, &from)?;
        }
        for ev in self.events.iter() {
            let from = || format!("event {}", ev.id);
            match &ev.kind {
                RandomEventKind::MarketShock { resource } => {
                    let id = resource.as_str();
                    check(self.resources.contains(id), "resource", id, &from)?;
                }
                RandomEventKind::DiplomaticPressure { faction, .. } => {
                    let id = faction.as_str();
                    check(self.factions.contains(id), "faction", id, &from)?;
                }
                _ => {}
            }
        }
        for p in self.policies.iter() {
            let from = || format!("policy {}", p.id);
            check(self.eras.contains(p.era.as_str()), "era", p.era.as_str(), &from)?;
            self.check_effects(&p.effects, &from)?;
        }
        for chain in self.chains.iter() {
            let from = || format!("event chain {}", chain.id);
            self.check_effects(&chain.effects, &from)?;
            for choice in &chain.choices {
                self.check_effects(&choice.effects, &from)?;
                if let Some(next) = &choice.next {
                    check(self.chains.contains(next.as_str()), "event chain", next.as_str(), &from)?;
                }
            }
            let t = &chain.trigger;
            if let Some(era) = &t.requires_era {
                check(self.eras.contains(era.as_str()), "era", era.as_str(), &from)?;
            }
            if let Some(contract) = &t.requires_contract {
                let id = contract.as_str();
                check(self.contracts.contains(id), "contract", id, &from)?;
            }
            if let Some(resource) = &t.resource_at_cap {
                let id = resource.as_str();
                check(self.resources.contains(id), "resource", id, &from)?;
            }
        }
        for m in self.metahumans.iter() {
            let from = || format!("metahuman {}", m.id);
            self.check_effects(&m.ally_passive_effects, &from)?;
            self.check_effects(&m.enemy_passive_effects, &from)?;
        }
        for p in self.people.iter() {
            let from = || format!("person {}", p.id);
            check(self.eras.contains(p.era.as_str()), "era", p.era.as_str(), &from)?;
            self.check_amounts(&p.costs, &from)?;
            self.check_effects(&p.effects, &from)?;
        }
        for u in self.legacy_upgrades.iter() {
            let from = || format!("legacy upgrade {}", u.id);
            self.check_effects(&u.effects, &from)?;
        }
        for d in self.domains.iter() {
            let from = || format!("domain {}", d.id);
            for tier in &d.tiers {
                self.check_effects(&tier.effects, &from)?;
            }
        }
        for d in self.dispatches.iter() {
            let from = || format!("dispatch {}", d.id);
            check(self.eras.contains(d.era.as_str()), "era", d.era.as_str(), &from)?;
            self.check_amounts(&d.rewards, &from)?;
        }
        for f in self.families.iter() {
            let from = || format!("megaproject family {}", f.id);
            for id in &f.choices {
                check(self.projects.contains(id.as_str()), "project", id.as_str(), &from)?;
            }
        }
        for a in self.achievements.iter() {
            let from = || format!("achievement {}", a.id);
            match &a.condition {
                AchievementCondition::DomainTier { domain, .. } => {
                    let id = domain.as_str();
                    check(self.domains.contains(id), "domain", id, &from)?;
                }
                AchievementCondition::ResourceRate { resource, .. }
                | AchievementCondition::ResourceTotal { resource, .. } => {
                    let id = resource.as_str();
                    check(self.resources.contains(id), "resource", id, &from)?;
                }
                _ => {}
            }
            self.check_effects(&a.effects, &from)?;
        }
        let rules_from = || "rules".to_string();
        if let Some(id) = &self.rules.cohesion_resource {
            check(self.resources.contains(id.as_str()), "resource", id.as_str(), &rules_from)?;
        }
        if let Some(id) = &self.rules.prestige.energy_resource {
            check(self.resources.contains(id.as_str()), "resource", id.as_str(), &rules_from)?;
        }
        Ok(())
    }

    fn check_amounts(
        &self,
        amounts: &ResourceAmounts,
        from: &dyn Fn() -> String,
    ) -> Result<(), CatalogError> {
        for id in amounts.keys() {
            if !self.resources.contains(id.as_str()) {
                return Err(unresolved("resource", id.as_str(), from()));
            }
        }
        Ok(())
    }

    fn check_effects(&self, effects: &[Effect], from: &dyn Fn() -> String) -> Result<(), CatalogError> {
        for effect in effects {
            let (kind, id, ok) = match effect {
                Effect::AddResourceCap { resource, .. }
                | Effect::AddResourceMultiplier { resource, .. }
                | Effect::GrantResource { resource, .. } => {
                    ("resource", resource.as_str(), self.resources.contains(resource.as_str()))
                }
                Effect::UnlockBuilding { building } => {
                    ("building", building.as_str(), self.buildings.contains(building.as_str()))
                }
                Effect::UnlockProject { project } => {
                    ("project", project.as_str(), self.projects.contains(project.as_str()))
                }
                Effect::UnlockEra { era } => ("era", era.as_str(), self.eras.contains(era.as_str())),
                Effect::AdjustFaction { faction, .. } => {
                    ("faction", faction.as_str(), self.factions.contains(faction.as_str()))
                }
                Effect::UnlockContract { contract } => {
                    ("contract", contract.as_str(), self.contracts.contains(contract.as_str()))
                }
                Effect::AdjustMetahumanAffinity { metahuman, .. } => (
                    "metahuman",
                    metahuman.as_str(),
                    self.metahumans.contains(metahuman.as_str()),
                ),
                _ => continue,
            };
            if !ok {
                return Err(unresolved(kind, id, from()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn fixture_builds() {
        let catalog = fixture_catalog();
        assert!(catalog.resource("food").is_some());
        assert_eq!(catalog.starting_era().id.as_str(), "stone");
        assert_eq!(catalog.hostile_faction().map(|f| f.id.as_str()), Some("raiders"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let mut pack = fixture_pack();
        let dup = pack.resources[0].clone();
        pack.resources.push(dup);
        let err = Catalog::from_pack(pack).unwrap_err();
        assert!(matches!(err, CatalogError::DuplicateId { kind: "resource", .. }));
    }

    #[test]
    fn unresolved_effect_target_rejected() {
        let mut pack = fixture_pack();
        pack.projects[0].effects.push(Effect::UnlockBuilding {
            building: "moon_base".into(),
        });
        let err = Catalog::from_pack(pack).unwrap_err();
        assert_eq!(
            err,
            CatalogError::UnresolvedRef {
                kind: "building",
                id: "moon_base".into(),
                from: format!("project {}", fixture_pack().projects[0].id),
            }
        );
    }

    #[test]
    fn unknown_contract_faction_rejected() {
        let mut pack = fixture_pack();
        pack.contracts[0].faction = "ghosts".into();
        assert!(matches!(
            Catalog::from_pack(pack),
            Err(CatalogError::UnresolvedRef { kind: "faction", .. })
        ));
    }

    #[test]
    fn collector_hours_must_be_positive() {
        let mut pack = fixture_pack();
        pack.rules.collector_capacity_hours = 0.0;
        assert!(matches!(
            Catalog::from_pack(pack),
            Err(CatalogError::InvalidValue { .. })
        ));
    }

    #[test]
    fn empty_pack_has_no_eras() {
        assert_eq!(
            Catalog::from_pack(ContentPack::default()).unwrap_err(),
            CatalogError::NoEras
        );
    }

    #[test]
    fn mutate_building_in_builder() {
        let mut builder = CatalogBuilder::from_pack(fixture_pack());
        builder
            .mutate_building("farm", |b| b.max_level = 9)
            .unwrap();
        assert!(builder.mutate_building("nope", |_| {}).is_err());
        let catalog = builder.build().unwrap();
        assert_eq!(catalog.building("farm").unwrap().max_level, 9);
    }

    #[test]
    fn era_reached_compares_sort_order() {
        let catalog = fixture_catalog();
        assert!(catalog.era_reached("bronze", "stone"));
        assert!(!catalog.era_reached("stone", "bronze"));
        assert!(!catalog.era_reached("stone", "unknown"));
    }

    #[test]
    fn table_preserves_authoring_order() {
        let catalog = fixture_catalog();
        let ids: Vec<_> = catalog.resources().iter().map(|r| r.id.as_str()).collect();
        let expected: Vec<_> = fixture_pack()
            .resources
            .iter()
            .map(|r| r.id.to_string())
            .collect();
        assert_eq!(ids, expected);
    }
}
