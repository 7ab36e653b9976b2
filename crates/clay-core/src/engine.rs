//! The simulation engine: owns the world state and drives the sub-step
//! pipeline.
//!
//! # Architecture
//!
//! The `Engine` owns:
//! - A shared, immutable [`Catalog`]
//! - The [`EngineConfig`] tuning constants
//! - The single mutable [`WorldState`]
//!
//! # Sub-step pipeline
//!
//! Each fixed step runs, in order:
//! 1. **Inputs** -- passive modifiers, caps, placement, logistics, locks
//! 2. **Production** -- buildings and contracts; storage clamp; collector overflow
//! 3. **Logistics** -- persist the summary used by this step
//! 4. **Risk** -- recompute, then roll for a raid
//! 5. **Market** -- hourly drift on hour boundaries
//! 6. **Contracts** -- expiry, relationship changes, auto-renew
//! 7. **Dispatches** -- progress and outcome roll
//! 8. **Projects** -- progress, completion, queue, auto-planner
//! 9. **Domains** -- tier watermark
//! 10. **Achievements**
//! 11. **Events** -- chain trigger scan or weighted random event
//! 12. **Meters** -- cohesion and biosphere drift
//! 13. **Bookkeeping** -- tick counter and simulated seconds
//!
//! `advance` runs on a clone of the world and swaps it in at the end, so a
//! caller never observes a partially-applied advance.

use std::sync::Arc;

use crate::achievement;
use crate::catalog::Catalog;
use crate::chain::{self, EventBudget};
use crate::collector;
use crate::command::{Command, CommandError, CommandOutcome, ProjectRef};
use crate::config::EngineConfig;
use crate::contract;
use crate::derived::{self, DerivedState, UpgradePreview};
use crate::dispatch;
use crate::domain;
use crate::event::EventCategory;
use crate::guidance::{self, GuidanceItem};
use crate::id::{BuildingKey, DispatchKey, ProjectKey};
use crate::market;
use crate::meters;
use crate::people;
use crate::policy;
use crate::prestige::{self, LegacyBreakdown};
use crate::production::{self, StepInputs};
use crate::project;
use crate::risk;
use crate::sim::{AdvanceReport, hash_encoded};
use crate::state::{GuidanceLevel, ProjectSource, WorldState};

const SECONDS_PER_DAY: f64 = 86_400.0;

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct Engine {
    catalog: Arc<Catalog>,
    config: EngineConfig,
    state: WorldState,
}

impl Engine {
    /// Fresh world seeded with `seed`, created at wall-clock `now`.
    pub fn new(catalog: Arc<Catalog>, config: EngineConfig, seed: u64, now: f64) -> Self {
        let state = WorldState::new(&catalog, &config, seed, now);
        Self {
            catalog,
            config,
            state,
        }
    }

    /// Wrap an existing (already migrated) world. Cached caps are rebuilt.
    pub fn with_state(catalog: Arc<Catalog>, config: EngineConfig, mut state: WorldState) -> Self {
        production::refresh_caps(&mut state, &catalog);
        Self {
            catalog,
            config,
            state,
        }
    }

    pub fn state(&self) -> &WorldState {
        &self.state
    }

    pub fn into_state(self) -> WorldState {
        self.state
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    // -----------------------------------------------------------------------
    // Advance
    // -----------------------------------------------------------------------

    /// Simulate `elapsed` seconds. Offline advances are clamped to the
    /// offline-day cap first and the excess is discarded. A `now` earlier
    /// than the last tick (beyond the skew tolerance) raises the time-travel
    /// warning and simulates nothing.
    pub fn advance(&mut self, elapsed: f64, now: f64, offline: bool) -> AdvanceReport {
        let mut report = AdvanceReport::default();
        if self.state.time_travel.pending_warning {
            report.suspended = true;
            return report;
        }
        let anchor = self.state.last_tick_at;
        if now < anchor - self.config.clock_skew_tolerance_seconds {
            self.raise_time_travel(anchor, now - anchor);
            report.suspended = true;
            return report;
        }

        let mut next = self.state.clone();
        let written = next.events.written();
        let mut elapsed = if elapsed.is_finite() { elapsed.max(0.0) } else { 0.0 };
        if offline {
            let days = next.settings.offline_cap_days;
            let cap = days as f64 * SECONDS_PER_DAY;
            if elapsed > cap {
                report.seconds_discarded = elapsed - cap;
                elapsed = cap;
                tracing::info!(
                    discarded = report.seconds_discarded,
                    days,
                    "engine.offline_capped"
                );
                next.log(
                    EventCategory::System,
                    "Offline Cap Reached",
                    format!("Offline progress capped at {days} days."),
                );
            }
        }

        let step = self.config.step_seconds;
        let steps = next.clock.accumulate(elapsed, step);
        let mut budget = EventBudget::new(offline);
        for _ in 0..steps {
            run_step(&mut next, &self.catalog, &self.config, &mut budget);
        }

        if offline && budget.generated >= self.config.offline_summary_threshold {
            next.log(
                EventCategory::System,
                "While You Were Away",
                format!("{} events occurred while you were away.", budget.generated),
            );
        }
        next.last_tick_at = now;

        if !offline {
            let derived = derived::derive(&next, &self.catalog, &self.config);
            report.alerts =
                guidance::milestone_alerts(&mut next, &self.catalog, &self.config, &derived, now);
        }

        report.steps_run = steps;
        report.seconds_simulated = steps as f64 * step;
        report.events_logged = (next.events.written() - written) as usize;
        tracing::debug!(
            tick = next.clock.tick,
            steps,
            offline,
            events = report.events_logged,
            "engine.advanced"
        );
        self.state = next;
        report
    }

    /// Online advance from the last tick to `now`.
    pub fn tick(&mut self, now: f64) -> AdvanceReport {
        if self.state.time_travel.pending_warning {
            return AdvanceReport {
                suspended: true,
                ..AdvanceReport::default()
            };
        }
        // While clamped, the wall clock only catches up.
        if let Some(until) = self.state.time_travel.clamp_until {
            if now < until {
                self.state.last_tick_at = now;
                return AdvanceReport::default();
            }
        }
        let delta = now - self.state.last_tick_at;
        if delta < -self.config.clock_skew_tolerance_seconds {
            let anchor = self.state.last_tick_at;
            self.raise_time_travel(anchor, delta);
            return AdvanceReport {
                suspended: true,
                ..AdvanceReport::default()
            };
        }
        if delta <= 0.0 {
            return AdvanceReport::default();
        }
        self.advance(delta, now, false)
    }

    /// Offline catch-up from the last save to `now`. The offline window is
    /// consumed, so `last_saved_at` moves to `now`.
    pub fn reconcile_offline(&mut self, now: f64) -> AdvanceReport {
        if self.state.time_travel.pending_warning {
            return AdvanceReport {
                suspended: true,
                ..AdvanceReport::default()
            };
        }
        let elapsed = now - self.state.last_saved_at;
        if elapsed < -self.config.clock_skew_tolerance_seconds {
            let anchor = self.state.last_saved_at;
            self.raise_time_travel(anchor, elapsed);
            self.state.last_tick_at = now;
            return AdvanceReport {
                suspended: true,
                ..AdvanceReport::default()
            };
        }
        let report = self.advance(elapsed.max(0.0), now, true);
        if !report.suspended {
            self.state.last_saved_at = now;
        }
        report
    }

    fn raise_time_travel(&mut self, anchor: f64, delta: f64) {
        tracing::warn!(delta, anchor, "engine.clock_regressed");
        self.state.time_travel.pending_warning = true;
        self.state.time_travel.clamp_until = Some(anchor);
        self.state.log(
            EventCategory::System,
            "Clock Changed",
            "The system clock moved backwards. Progress is paused.",
        );
    }

    /// Accept the new clock (`allow`) or hold progress until real time
    /// catches up with the old one.
    pub fn resolve_time_travel(&mut self, allow: bool, now: f64) -> Result<(), CommandError> {
        if !self.state.time_travel.pending_warning {
            return Err(CommandError::NoTimeTravelPending);
        }
        self.state.time_travel.pending_warning = false;
        if allow {
            self.state.time_travel.clamp_until = None;
            self.state.last_saved_at = now;
            self.state.last_tick_at = now;
        }
        tracing::info!(allow, "engine.time_travel_resolved");
        Ok(())
    }

    pub fn mark_saved(&mut self, now: f64) {
        self.state.last_saved_at = now;
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    pub fn derived(&self) -> DerivedState {
        derived::derive(&self.state, &self.catalog, &self.config)
    }

    pub fn guidance(&self) -> Vec<GuidanceItem> {
        let derived = self.derived();
        guidance::guidance_items(&self.state, &self.catalog, &derived)
    }

    pub fn legacy_gain_breakdown(&self) -> LegacyBreakdown {
        prestige::legacy_gain_breakdown(&self.state, &self.catalog)
    }

    pub fn upgrade_preview(&self, key: BuildingKey) -> Result<UpgradePreview, CommandError> {
        derived::upgrade_preview(&self.state, &self.catalog, key)
    }

    /// Hash of the whole encoded world.
    pub fn state_hash(&self) -> u64 {
        hash_encoded(&self.state)
    }

    // -----------------------------------------------------------------------
    // Block reasons
    // -----------------------------------------------------------------------

    pub fn project_block_reason(&self, project: &str) -> Option<CommandError> {
        project::check_start(&self.state, &self.catalog, project).err()
    }

    pub fn queue_block_reason(&self, project: &str) -> Option<CommandError> {
        project::check_queue(&self.state, &self.catalog, project).err()
    }

    pub fn building_block_reason(&self, building: &str, x: i32, y: i32) -> Option<CommandError> {
        project::check_build(&self.state, &self.catalog, building, x, y).err()
    }

    pub fn upgrade_block_reason(&self, key: BuildingKey) -> Option<CommandError> {
        project::check_upgrade(&self.state, &self.catalog, key).err()
    }

    pub fn contract_block_reason(&self, contract: &str) -> Option<CommandError> {
        contract::check_start(&self.state, &self.catalog, contract).err()
    }

    pub fn dispatch_block_reason(&self, dispatch: &str) -> Option<CommandError> {
        dispatch::check_start(&self.state, &self.catalog, dispatch).err()
    }

    pub fn collect_dispatch_block_reason(&self, key: DispatchKey) -> Option<CommandError> {
        dispatch::check_collect(&self.state, key).err()
    }

    pub fn cache_block_reason(&self) -> Option<CommandError> {
        collector::check_collect(&self.state).err()
    }

    pub fn policy_block_reason(&self, slot: &str, policy: Option<&str>) -> Option<CommandError> {
        policy::check_set(&self.state, &self.catalog, slot, policy).err()
    }

    pub fn event_choice_block_reason(&self, chain: &str, choice: &str) -> Option<CommandError> {
        chain::check_resolve(&self.state, &self.catalog, chain, choice).err()
    }

    pub fn person_block_reason(&self, person: &str) -> Option<CommandError> {
        people::check_recruit(&self.state, &self.catalog, person).err()
    }

    pub fn legacy_upgrade_block_reason(&self, upgrade: &str) -> Option<CommandError> {
        prestige::check_purchase(&self.state, &self.catalog, upgrade).err()
    }

    pub fn catalyst_block_reason(&self, key: ProjectKey) -> Option<CommandError> {
        project::check_catalyst(&self.state, key).err()
    }

    pub fn chrono_shard_block_reason(&self, key: ProjectKey) -> Option<CommandError> {
        project::check_chrono_shard(&self.state, key).err()
    }

    // -----------------------------------------------------------------------
    // Commands
    // -----------------------------------------------------------------------

    pub fn start_project(&mut self, project: &str, source: ProjectSource) -> Result<ProjectKey, CommandError> {
        project::start(&mut self.state, &self.catalog, project, source)
    }

    pub fn queue_project(&mut self, project: &str, source: ProjectSource) -> Result<u64, CommandError> {
        project::queue(&mut self.state, &self.catalog, project, source)
    }

    pub fn cancel_project(&mut self, target: ProjectRef) -> Result<(), CommandError> {
        project::cancel(&mut self.state, target)
    }

    pub fn start_building(&mut self, building: &str, x: i32, y: i32) -> Result<BuildingKey, CommandError> {
        project::build(&mut self.state, &self.catalog, building, x, y)
    }

    pub fn upgrade_building(&mut self, key: BuildingKey) -> Result<ProjectKey, CommandError> {
        project::upgrade(&mut self.state, &self.catalog, key)
    }

    pub fn start_contract(&mut self, contract: &str) -> Result<(), CommandError> {
        contract::start(&mut self.state, &self.catalog, contract)
    }

    pub fn start_dispatch(&mut self, dispatch: &str) -> Result<DispatchKey, CommandError> {
        dispatch::start(&mut self.state, &self.catalog, dispatch)
    }

    pub fn collect_dispatch(&mut self, key: DispatchKey) -> Result<(), CommandError> {
        dispatch::collect(&mut self.state, &self.catalog, key)
    }

    /// Empty the collector into the ledger; returns the amount banked.
    pub fn collect_cache(&mut self) -> Result<f64, CommandError> {
        collector::collect(&mut self.state)
    }

    pub fn set_policy(&mut self, slot: &str, policy: Option<&str>) -> Result<(), CommandError> {
        policy::set(&mut self.state, &self.catalog, slot, policy)?;
        production::refresh_caps(&mut self.state, &self.catalog);
        Ok(())
    }

    pub fn resolve_event_choice(&mut self, chain: &str, choice: &str) -> Result<(), CommandError> {
        chain::resolve(&mut self.state, &self.catalog, chain, choice)
    }

    pub fn recruit_person(&mut self, person: &str) -> Result<(), CommandError> {
        people::recruit(&mut self.state, &self.catalog, person)
    }

    pub fn set_auto_planner_enabled(&mut self, enabled: bool) {
        self.state.auto_plan.enabled = enabled;
    }

    pub fn set_auto_plan_tag(&mut self, tag: &str, enabled: bool) {
        if enabled {
            self.state.auto_plan.priority_tags.insert(tag.to_string());
        } else {
            self.state.auto_plan.priority_tags.remove(tag);
        }
    }

    pub fn set_auto_renew_contracts(&mut self, enabled: bool) {
        self.state.auto_plan.auto_renew_contracts = enabled;
    }

    pub fn set_offline_cap_days(&mut self, days: u32) -> Result<(), CommandError> {
        if days == 0 {
            return Err(CommandError::InvalidOfflineCap);
        }
        self.state.settings.offline_cap_days = days;
        Ok(())
    }

    pub fn set_notifications_enabled(&mut self, enabled: bool) {
        self.state.settings.notifications_enabled = enabled;
    }

    pub fn set_colorblind_mode(&mut self, enabled: bool) {
        self.state.settings.colorblind_mode = enabled;
    }

    pub fn set_guidance_level(&mut self, level: GuidanceLevel) {
        self.state.settings.guidance_level = level;
    }

    /// Reset the world for legacy points. Returns the gain.
    pub fn ascend(&mut self, now: f64) -> u32 {
        prestige::ascend(&mut self.state, &self.catalog, &self.config, now)
    }

    pub fn purchase_legacy_upgrade(&mut self, upgrade: &str) -> Result<(), CommandError> {
        prestige::purchase(&mut self.state, &self.catalog, upgrade)
    }

    pub fn activate_catalyst(&mut self, key: ProjectKey) -> Result<(), CommandError> {
        project::activate_catalyst(&mut self.state, &self.config, key)
    }

    pub fn use_chrono_shard(&mut self, key: ProjectKey) -> Result<(), CommandError> {
        project::use_chrono_shard(&mut self.state, &self.config, key)
    }

    pub fn grant_domain_points(&mut self, domain: &str, points: u32) -> Result<(), CommandError> {
        domain::grant_points(&mut self.state, &self.catalog, domain, points)
    }

    /// Dispatch a serialized command. Used by replays.
    pub fn execute(&mut self, command: &Command) -> Result<CommandOutcome, CommandError> {
        let outcome = match command {
            Command::StartProject { project, source } => {
                CommandOutcome::Project(self.start_project(project.as_str(), *source)?)
            }
            Command::QueueProject { project, source } => {
                CommandOutcome::Queued(self.queue_project(project.as_str(), *source)?)
            }
            Command::CancelProject(target) => {
                self.cancel_project(*target)?;
                CommandOutcome::Done
            }
            Command::StartBuilding { building, x, y } => {
                CommandOutcome::Building(self.start_building(building.as_str(), *x, *y)?)
            }
            Command::UpgradeBuilding(key) => CommandOutcome::Project(self.upgrade_building(*key)?),
            Command::StartContract(id) => {
                self.start_contract(id.as_str())?;
                CommandOutcome::Done
            }
            Command::StartDispatch(id) => CommandOutcome::Dispatch(self.start_dispatch(id.as_str())?),
            Command::CollectDispatch(key) => {
                self.collect_dispatch(*key)?;
                CommandOutcome::Done
            }
            Command::CollectCache => {
                self.collect_cache()?;
                CommandOutcome::Done
            }
            Command::SetPolicy { slot, policy } => {
                self.set_policy(slot.as_str(), policy.as_ref().map(|p| p.as_str()))?;
                CommandOutcome::Done
            }
            Command::ResolveEventChoice { chain, choice } => {
                self.resolve_event_choice(chain.as_str(), choice.as_str())?;
                CommandOutcome::Done
            }
            Command::RecruitPerson(id) => {
                self.recruit_person(id.as_str())?;
                CommandOutcome::Done
            }
            Command::SetAutoPlannerEnabled(enabled) => {
                self.set_auto_planner_enabled(*enabled);
                CommandOutcome::Done
            }
            Command::SetAutoPlanTag { tag, enabled } => {
                self.set_auto_plan_tag(tag, *enabled);
                CommandOutcome::Done
            }
            Command::SetAutoRenewContracts(enabled) => {
                self.set_auto_renew_contracts(*enabled);
                CommandOutcome::Done
            }
            Command::SetOfflineCapDays(days) => {
                self.set_offline_cap_days(*days)?;
                CommandOutcome::Done
            }
            Command::SetNotificationsEnabled(enabled) => {
                self.set_notifications_enabled(*enabled);
                CommandOutcome::Done
            }
            Command::SetColorblindMode(enabled) => {
                self.set_colorblind_mode(*enabled);
                CommandOutcome::Done
            }
            Command::SetGuidanceLevel(level) => {
                self.set_guidance_level(*level);
                CommandOutcome::Done
            }
            Command::Ascend { now } => CommandOutcome::LegacyGain(self.ascend(*now)),
            Command::PurchaseLegacyUpgrade(id) => {
                self.purchase_legacy_upgrade(id.as_str())?;
                CommandOutcome::Done
            }
            Command::ActivateCatalyst(key) => {
                self.activate_catalyst(*key)?;
                CommandOutcome::Done
            }
            Command::UseChronoShard(key) => {
                self.use_chrono_shard(*key)?;
                CommandOutcome::Done
            }
            Command::ResolveTimeTravel { allow, now } => {
                self.resolve_time_travel(*allow, *now)?;
                CommandOutcome::Done
            }
            Command::GrantDomainPoints { domain, points } => {
                self.grant_domain_points(domain.as_str(), *points)?;
                CommandOutcome::Done
            }
        };
        tracing::debug!(?command, ?outcome, "command.applied");
        Ok(outcome)
    }
}

// ---------------------------------------------------------------------------
// Sub-step
// ---------------------------------------------------------------------------

fn run_step(state: &mut WorldState, catalog: &Catalog, config: &EngineConfig, budget: &mut EventBudget) {
    let dt = config.step_seconds;

    // 1. Inputs reflect every construction completed last step.
    let inputs = StepInputs::gather(state, catalog, config);

    // 2. Production, storage clamp, collector overflow.
    let flows = production::run(state, catalog, &inputs, dt);

    // 3. Logistics.
    state.logistics = inputs.logistics.clone();

    // 4. Risk and raid roll.
    state.risk = risk::compute(state, catalog, config, &inputs.modifiers, &inputs.caps);
    risk::roll_raid(state, config, dt);

    // 5. Market.
    market::drift(state, catalog, config);

    // 6-8. Lifecycles.
    contract::run(state, catalog, config, dt);
    dispatch::run(state, catalog, dt);
    project::run(state, catalog, config, &inputs.modifiers, dt);

    // 9-10. Progression.
    domain::run(state, catalog);
    achievement::run(state, catalog, &flows.net_per_hour);

    // 11. Events.
    chain::run(state, catalog, config, &inputs.caps, budget, dt);

    // 12. Meters.
    meters::run(state, catalog, &inputs, dt);

    // 13. Bookkeeping.
    state.clock.advance_step(dt);
}
