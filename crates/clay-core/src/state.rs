//! World state: the single mutable aggregate the engine owns.
//!
//! Every map is ordered (`BTreeMap`/`BTreeSet`) and instance collections are
//! `SlotMap`s, so iteration order is deterministic and survives a save/load
//! round-trip unchanged. Every field defaults when missing so older saves
//! decode before migration fills them in.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use slotmap::SlotMap;

use crate::catalog::{Catalog, ResourceAmounts};
use crate::config::EngineConfig;
use crate::event::{EventCategory, EventLog, EventLogEntry};
use crate::id::*;
use crate::rng::SimRng;
use crate::sim::SimClock;

/// Save schema version written by this build.
pub const CURRENT_SAVE_VERSION: u32 = 7;

// ---------------------------------------------------------------------------
// Sub-states
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ResourceState {
    pub amount: f64,
    /// Cached cap; recomputed every step and after load.
    pub cap: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildingInstance {
    pub building: BuildingId,
    pub level: u32,
    pub x: i32,
    pub y: i32,
    /// Simulated second until which the building is offline.
    pub disabled_until: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectSource {
    Research,
    Construction,
    Upgrade,
    Accelerator,
    Megaproject,
}

/// What an active project produces on completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ProjectTarget {
    Definition(ProjectId),
    Construction(BuildingId),
    Upgrade(BuildingId),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectInstance {
    pub target: ProjectTarget,
    pub remaining_seconds: f64,
    pub total_seconds: f64,
    pub crew_required: u32,
    pub started_at: f64,
    pub source: ProjectSource,
    /// Building under construction or upgrade.
    pub building: Option<BuildingKey>,
}

impl ProjectInstance {
    pub fn project_id(&self) -> Option<&ProjectId> {
        match &self.target {
            ProjectTarget::Definition(id) => Some(id),
            _ => None,
        }
    }

    pub fn progress(&self) -> f64 {
        if self.total_seconds <= 0.0 {
            return 1.0;
        }
        (1.0 - self.remaining_seconds / self.total_seconds).clamp(0.0, 1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QueuedProject {
    pub serial: u64,
    pub project: ProjectId,
    pub queued_at: f64,
    pub source: ProjectSource,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContractInstance {
    pub serial: u64,
    pub contract: ContractId,
    pub remaining_seconds: f64,
    pub upkeep_missed: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FactionState {
    /// Clamped to [-2, 2].
    pub relationship: i32,
    pub contracts: Vec<ContractInstance>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchStatus {
    Active,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchInstance {
    pub dispatch: DispatchId,
    pub remaining_seconds: f64,
    pub started_at: f64,
    pub status: DispatchStatus,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MarketState {
    pub index: BTreeMap<ResourceId, f64>,
    /// Simulated hour of the most recent drift.
    pub last_hour: u64,
}

impl MarketState {
    pub fn index_of(&self, resource: &str) -> f64 {
        self.index.get(resource).copied().unwrap_or(1.0)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogisticsState {
    pub capacity: f64,
    pub demand: f64,
    pub factor: f64,
}

impl Default for LogisticsState {
    fn default() -> Self {
        Self {
            capacity: 100.0,
            demand: 0.0,
            factor: 1.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub exposure: f64,
    pub security: f64,
    pub hostility: f64,
    pub raid_chance_per_hour: f64,
}

impl Default for RiskState {
    fn default() -> Self {
        Self {
            exposure: 0.0,
            security: 0.0,
            hostility: 0.4,
            raid_chance_per_hour: 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CollectorState {
    pub stored: BTreeMap<ResourceId, f64>,
    pub capacity_hours: f64,
    pub last_collected_at: Option<f64>,
}

impl CollectorState {
    pub fn total(&self) -> f64 {
        self.stored.values().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DomainState {
    pub points: BTreeMap<DomainId, u32>,
    /// Highest tier whose effects have been applied.
    pub tiers: BTreeMap<DomainId, u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PolicyState {
    pub active: BTreeMap<PolicySlot, PolicyId>,
    /// Simulated second until which each policy cannot be selected.
    pub cooldowns: BTreeMap<PolicyId, f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventChainState {
    pub pending: Option<ChainId>,
    pub cooldowns: BTreeMap<ChainId, f64>,
    /// Countdown to the next event roll.
    pub next_event_in: f64,
    /// Simulated hour the event allowance was last refilled in.
    #[serde(default)]
    pub budget_hour: u64,
    /// Events fired so far in `budget_hour`.
    #[serde(default)]
    pub budget_used: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PrestigeState {
    pub legacy_points: u32,
    pub upgrades: BTreeSet<LegacyUpgradeId>,
    /// Wall-clock time of the last ascension.
    pub last_ascended_at: Option<f64>,
    pub ascensions: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalystState {
    /// `None` until unlocked.
    pub available_at: Option<f64>,
    pub active_project: Option<ProjectKey>,
    pub active_until: Option<f64>,
    pub level: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatsState {
    pub produced: BTreeMap<ResourceId, f64>,
    pub wasted: BTreeMap<ResourceId, f64>,
    pub raid_loss: BTreeMap<ResourceId, f64>,
    pub dispatch_rewards: BTreeMap<ResourceId, f64>,
    pub last_efficiency: f64,
    pub last_raid_at: Option<f64>,
    pub dispatches_completed: u64,
    pub raids: u64,
    pub cache_collects: u64,
}

impl Default for StatsState {
    fn default() -> Self {
        Self {
            produced: BTreeMap::new(),
            wasted: BTreeMap::new(),
            raid_loss: BTreeMap::new(),
            dispatch_rewards: BTreeMap::new(),
            last_efficiency: 1.0,
            last_raid_at: None,
            dispatches_completed: 0,
            raids: 0,
            cache_collects: 0,
        }
    }
}

impl StatsState {
    pub fn record_waste(&mut self, resource: &ResourceId, amount: f64) {
        if amount > 0.0 {
            *self.wasted.entry(resource.clone()).or_insert(0.0) += amount;
        }
    }

    pub fn total_wasted(&self) -> f64 {
        self.wasted.values().sum()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Disposition {
    #[default]
    Neutral,
    Ally,
    Enemy,
}

impl Disposition {
    pub fn from_affinity(affinity: i32) -> Self {
        if affinity >= 2 {
            Self::Ally
        } else if affinity <= -2 {
            Self::Enemy
        } else {
            Self::Neutral
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetahumanState {
    /// Clamped to [-3, 3].
    pub affinity: i32,
    pub disposition: Disposition,
    pub last_encounter_at: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PeopleState {
    pub recruited: Vec<PersonId>,
    pub max_roster: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AutoPlanRules {
    pub enabled: bool,
    pub priority_tags: BTreeSet<String>,
    pub auto_renew_contracts: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlertState {
    /// Wall-clock time each alert id last fired.
    pub last_fired: BTreeMap<String, f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum GuidanceLevel {
    #[default]
    High,
    Balanced,
    Minimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub offline_cap_days: u32,
    pub notifications_enabled: bool,
    pub colorblind_mode: bool,
    pub guidance_level: GuidanceLevel,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            offline_cap_days: 7,
            notifications_enabled: true,
            colorblind_mode: false,
            guidance_level: GuidanceLevel::High,
        }
    }
}

/// Permanent bonuses accumulated from one-shot effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bonuses {
    pub project_speed: f64,
    pub resource_multipliers: BTreeMap<ResourceId, f64>,
    pub global_multiplier: f64,
    pub storage_additions: BTreeMap<ResourceId, f64>,
    pub security: f64,
    pub logistics: f64,
}

impl Default for Bonuses {
    fn default() -> Self {
        Self {
            project_speed: 0.0,
            resource_multipliers: BTreeMap::new(),
            global_multiplier: 1.0,
            storage_additions: BTreeMap::new(),
            security: 0.0,
            logistics: 0.0,
        }
    }
}

impl Bonuses {
    pub fn resource_multiplier(&self, resource: &str) -> f64 {
        self.resource_multipliers.get(resource).copied().unwrap_or(1.0)
    }
}

/// Settlement-wide meters, both clamped to [0, 1].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meters {
    pub cohesion: f64,
    pub biosphere: f64,
}

impl Default for Meters {
    fn default() -> Self {
        Self {
            cohesion: 0.6,
            biosphere: 0.6,
        }
    }
}

impl Meters {
    pub fn add_cohesion(&mut self, delta: f64) {
        self.cohesion = (self.cohesion + delta).clamp(0.0, 1.0);
    }

    pub fn add_biosphere(&mut self, delta: f64) {
        self.biosphere = (self.biosphere + delta).clamp(0.0, 1.0);
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TimeTravelState {
    /// Set when the wall clock jumped backwards; blocks ticking.
    pub pending_warning: bool,
    /// Wall-clock time progress is held at until real time catches up.
    pub clamp_until: Option<f64>,
}

// ---------------------------------------------------------------------------
// World state
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WorldState {
    /// Saves written before versioning carry no field and count as version 1.
    #[serde(default = "legacy_save_version")]
    pub save_version: u32,
    /// Wall-clock seconds of the last save.
    pub last_saved_at: f64,
    /// Wall-clock seconds of the last tick.
    pub last_tick_at: f64,
    pub clock: SimClock,
    pub rng: SimRng,
    pub next_serial: u64,

    pub resources: BTreeMap<ResourceId, ResourceState>,
    pub unlocked_buildings: BTreeSet<BuildingId>,
    pub unlocked_projects: BTreeSet<ProjectId>,
    pub unlocked_contracts: BTreeSet<ContractId>,
    pub completed_projects: BTreeSet<ProjectId>,
    pub buildings: SlotMap<BuildingKey, BuildingInstance>,
    pub projects: SlotMap<ProjectKey, ProjectInstance>,
    pub queue: Vec<QueuedProject>,
    pub crew_count: u32,
    pub max_crew: u32,
    pub era: EraId,
    pub flags: BTreeSet<FlagId>,
    pub grid_size: i32,
    pub factions: BTreeMap<FactionId, FactionState>,
    pub events: EventLog,
    pub catalyst: CatalystState,
    pub chrono_shards: u32,
    pub bonuses: Bonuses,
    pub meters: Meters,
    pub market: MarketState,
    pub logistics: LogisticsState,
    pub risk: RiskState,
    pub policy: PolicyState,
    pub domains: DomainState,
    pub dispatches: SlotMap<DispatchKey, DispatchInstance>,
    pub collector: CollectorState,
    pub chosen_families: BTreeMap<FamilyId, ProjectId>,
    pub achievements: BTreeSet<AchievementId>,
    pub auto_plan: AutoPlanRules,
    pub prestige: PrestigeState,
    pub stats: StatsState,
    pub metahumans: BTreeMap<MetahumanId, MetahumanState>,
    pub people: PeopleState,
    pub chains: EventChainState,
    pub alerts: AlertState,
    pub settings: Settings,
    pub time_travel: TimeTravelState,
}

fn legacy_save_version() -> u32 {
    1
}

// Slot maps have no `PartialEq`; live entries are compared in key order.
impl PartialEq for WorldState {
    fn eq(&self, other: &Self) -> bool {
        self.save_version == other.save_version
            && self.last_saved_at == other.last_saved_at
            && self.last_tick_at == other.last_tick_at
            && self.clock == other.clock
            && self.rng == other.rng
            && self.next_serial == other.next_serial
            && self.resources == other.resources
            && self.unlocked_buildings == other.unlocked_buildings
            && self.unlocked_projects == other.unlocked_projects
            && self.unlocked_contracts == other.unlocked_contracts
            && self.completed_projects == other.completed_projects
            && self.buildings.iter().eq(other.buildings.iter())
            && self.projects.iter().eq(other.projects.iter())
            && self.queue == other.queue
            && self.crew_count == other.crew_count
            && self.max_crew == other.max_crew
            && self.era == other.era
            && self.flags == other.flags
            && self.grid_size == other.grid_size
            && self.factions == other.factions
            && self.events == other.events
            && self.catalyst == other.catalyst
            && self.chrono_shards == other.chrono_shards
            && self.bonuses == other.bonuses
            && self.meters == other.meters
            && self.market == other.market
            && self.logistics == other.logistics
            && self.risk == other.risk
            && self.policy == other.policy
            && self.domains == other.domains
            && self.dispatches.iter().eq(other.dispatches.iter())
            && self.collector == other.collector
            && self.chosen_families == other.chosen_families
            && self.achievements == other.achievements
            && self.auto_plan == other.auto_plan
            && self.prestige == other.prestige
            && self.stats == other.stats
            && self.metahumans == other.metahumans
            && self.people == other.people
            && self.chains == other.chains
            && self.alerts == other.alerts
            && self.settings == other.settings
            && self.time_travel == other.time_travel
    }
}

impl WorldState {
    /// Fresh era-zero world for `catalog`, seeded with `seed`, at wall-clock `now`.
    pub fn new(catalog: &Catalog, config: &EngineConfig, seed: u64, now: f64) -> Self {
        let rules = catalog.rules();
        let start = catalog.starting_era();
        let mut rng = SimRng::new(seed);
        let next_event_in = rng.range(config.initial_event_gap_min, config.initial_event_gap_max);

        let zeroed = || -> BTreeMap<ResourceId, f64> {
            catalog
                .resources()
                .iter()
                .map(|r| (r.id.clone(), 0.0))
                .collect()
        };

        Self {
            save_version: CURRENT_SAVE_VERSION,
            last_saved_at: now,
            last_tick_at: now,
            clock: SimClock::default(),
            rng,
            next_serial: 0,
            resources: catalog
                .resources()
                .iter()
                .map(|r| {
                    let state = ResourceState {
                        amount: r.starting_amount.min(r.base_cap).max(0.0),
                        cap: r.base_cap,
                    };
                    (r.id.clone(), state)
                })
                .collect(),
            unlocked_buildings: start.unlocks_building_ids.iter().cloned().collect(),
            unlocked_projects: start.unlocks_project_ids.iter().cloned().collect(),
            unlocked_contracts: BTreeSet::new(),
            completed_projects: BTreeSet::new(),
            buildings: SlotMap::with_key(),
            projects: SlotMap::with_key(),
            queue: Vec::new(),
            crew_count: rules.starting_crew,
            max_crew: rules.starting_crew,
            era: start.id.clone(),
            flags: BTreeSet::new(),
            grid_size: rules.grid_size,
            factions: catalog
                .factions()
                .iter()
                .map(|f| {
                    let state = FactionState {
                        relationship: f.starting_relationship.clamp(-2, 2),
                        contracts: Vec::new(),
                    };
                    (f.id.clone(), state)
                })
                .collect(),
            events: EventLog::with_cap(config.event_log_cap),
            catalyst: CatalystState::default(),
            chrono_shards: 0,
            bonuses: Bonuses::default(),
            meters: Meters::default(),
            market: MarketState {
                index: catalog
                    .resources()
                    .iter()
                    .map(|r| (r.id.clone(), 1.0))
                    .collect(),
                last_hour: 0,
            },
            logistics: LogisticsState {
                capacity: config.logistics_base_capacity,
                ..LogisticsState::default()
            },
            risk: RiskState::default(),
            policy: PolicyState::default(),
            domains: DomainState {
                points: catalog.domains().iter().map(|d| (d.id.clone(), 0)).collect(),
                tiers: catalog.domains().iter().map(|d| (d.id.clone(), 0)).collect(),
            },
            dispatches: SlotMap::with_key(),
            collector: CollectorState {
                stored: zeroed(),
                capacity_hours: rules.collector_capacity_hours,
                last_collected_at: None,
            },
            chosen_families: BTreeMap::new(),
            achievements: BTreeSet::new(),
            auto_plan: AutoPlanRules::default(),
            prestige: PrestigeState::default(),
            stats: StatsState {
                produced: zeroed(),
                wasted: zeroed(),
                raid_loss: zeroed(),
                ..StatsState::default()
            },
            metahumans: catalog
                .metahumans()
                .iter()
                .map(|m| (m.id.clone(), MetahumanState::default()))
                .collect(),
            people: PeopleState {
                recruited: Vec::new(),
                max_roster: rules.max_roster,
            },
            chains: EventChainState {
                next_event_in,
                ..EventChainState::default()
            },
            alerts: AlertState::default(),
            settings: Settings {
                offline_cap_days: rules.offline_cap_days,
                ..Settings::default()
            },
            time_travel: TimeTravelState::default(),
        }
    }

    // -----------------------------------------------------------------------
    // Bookkeeping helpers
    // -----------------------------------------------------------------------

    pub fn next_serial(&mut self) -> u64 {
        self.next_serial += 1;
        self.next_serial
    }

    /// Append a player-facing entry stamped with the current simulated time.
    /// Entry ids count log writes only, so logging never shifts the serials
    /// handed to contracts and queued projects.
    pub fn log(&mut self, category: EventCategory, title: &str, message: impl Into<String>) {
        let id = self.events.written() + 1;
        self.events.push(EventLogEntry {
            id,
            timestamp: self.clock.seconds,
            category,
            title: title.to_string(),
            message: message.into(),
            severity: 1,
        });
    }

    pub fn has_flag(&self, flag: &str) -> bool {
        self.flags.contains(flag)
    }

    pub fn amount(&self, resource: &str) -> f64 {
        self.resources.get(resource).map_or(0.0, |r| r.amount)
    }

    pub fn can_afford(&self, costs: &ResourceAmounts) -> bool {
        costs.iter().all(|(id, &cost)| self.amount(id.as_str()) >= cost)
    }

    /// The first resource in `costs` the ledger cannot cover.
    pub fn first_shortfall<'a>(&self, costs: &'a ResourceAmounts) -> Option<&'a ResourceId> {
        costs
            .iter()
            .find(|(id, cost)| self.amount(id.as_str()) < **cost)
            .map(|(id, _)| id)
    }

    pub fn spend(&mut self, costs: &ResourceAmounts) {
        for (id, &cost) in costs {
            if let Some(resource) = self.resources.get_mut(id.as_str()) {
                resource.amount = (resource.amount - cost).max(0.0);
            }
        }
    }

    /// Add to the ledger up to the cached cap; excess is recorded as waste.
    /// Returns the amount actually stored.
    pub fn grant_resource(&mut self, resource: &str, amount: f64) -> f64 {
        let Some(entry) = self.resources.get_mut(resource) else {
            return 0.0;
        };
        let before = entry.amount;
        let target = (before + amount).max(0.0);
        let stored = target.min(entry.cap.max(before));
        entry.amount = stored;
        let waste = target - stored;
        if waste > 0.0 {
            let id = ResourceId::from(resource);
            self.stats.record_waste(&id, waste);
        }
        stored - before
    }

    pub fn adjust_faction(&mut self, faction: &str, delta: i32) {
        if let Some(state) = self.factions.get_mut(faction) {
            state.relationship = (state.relationship + delta).clamp(-2, 2);
        }
    }

    pub fn relationship(&self, faction: &str) -> i32 {
        self.factions.get(faction).map_or(0, |f| f.relationship)
    }

    pub fn building_at(&self, x: i32, y: i32) -> Option<(BuildingKey, &BuildingInstance)> {
        self.buildings.iter().find(|(_, b)| b.x == x && b.y == y)
    }

    pub fn contract_active(&self, contract: &str) -> bool {
        self.factions
            .values()
            .any(|f| f.contracts.iter().any(|c| c.contract.as_str() == contract))
    }

    /// Crew tied up in active projects and active dispatches.
    pub fn crew_in_use(&self, catalog: &Catalog) -> u32 {
        let projects: u32 = self.projects.values().map(|p| p.crew_required).sum();
        let dispatches: u32 = self
            .dispatches
            .values()
            .filter(|d| d.status == DispatchStatus::Active)
            .filter_map(|d| catalog.dispatch(d.dispatch.as_str()))
            .map(|d| d.required_crew)
            .sum();
        projects + dispatches
    }

    pub fn available_crew(&self, catalog: &Catalog) -> u32 {
        self.crew_count.saturating_sub(self.crew_in_use(catalog))
    }

    /// Whether an era's keystone project has been completed.
    pub fn era_complete(&self, era: &crate::catalog::EraDefinition) -> bool {
        era.keystone_project_ids
            .iter()
            .any(|id| self.completed_projects.contains(id))
    }

    pub fn project_active(&self, project: &str) -> bool {
        self.projects
            .values()
            .any(|p| p.project_id().is_some_and(|id| id.as_str() == project))
    }

    pub fn project_queued(&self, project: &str) -> bool {
        self.queue.iter().any(|q| q.project.as_str() == project)
    }

    /// Whether a building is held offline at simulated time `at`.
    pub fn building_disabled(&self, key: BuildingKey, at: f64) -> bool {
        self.buildings
            .get(key)
            .and_then(|b| b.disabled_until)
            .is_some_and(|until| until > at)
    }
}
