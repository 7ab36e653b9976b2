//! Projects: research, construction, upgrades and megaprojects.
//!
//! Every timed job that ties up crew is a [`ProjectInstance`]. Research and
//! megaprojects complete a catalog definition; construction and upgrade jobs
//! hold a building offline until they finish. A FIFO queue feeds new
//! projects in as crew frees up, and an optional auto-planner picks work
//! when the queue runs dry.

use crate::catalog::{BuildingDefinition, Catalog, ProjectDefinition, ResourceAmounts};
use crate::command::{CommandError, ProjectRef};
use crate::config::EngineConfig;
use crate::contract::shortfall_error;
use crate::domain;
use crate::effect::{self, Modifiers};
use crate::event::EventCategory;
use crate::id::{BuildingKey, ProjectKey};
use crate::state::{
    BuildingInstance, ProjectInstance, ProjectSource, ProjectTarget, QueuedProject, WorldState,
};

/// Each upgrade takes this much longer than the one before.
pub const UPGRADE_DURATION_GROWTH: f64 = 1.3;

/// Slowest a project may ever progress.
pub const MIN_SPEED: f64 = 0.1;

// ---------------------------------------------------------------------------
// Speed
// ---------------------------------------------------------------------------

/// Shared speed multiplier before per-project catalyst boosts.
pub fn base_speed(state: &WorldState, catalog: &Catalog, modifiers: &Modifiers) -> f64 {
    let buildings: f64 = state
        .buildings
        .values()
        .filter_map(|b| {
            catalog
                .building(b.building.as_str())
                .map(|d| d.project_speed_bonus * b.level as f64)
        })
        .sum();
    1.0 + state.bonuses.project_speed + modifiers.project_speed + buildings
}

/// Effective speed of one project, catalyst included.
pub fn speed_for(state: &WorldState, config: &EngineConfig, base: f64, key: ProjectKey) -> f64 {
    let boosted = state.catalyst.active_project == Some(key)
        && state
            .catalyst
            .active_until
            .is_some_and(|until| state.clock.seconds < until);
    let speed = if boosted {
        base + config.catalyst_bonus
    } else {
        base
    };
    speed.max(MIN_SPEED)
}

// ---------------------------------------------------------------------------
// Research and megaprojects
// ---------------------------------------------------------------------------

fn check_family(state: &WorldState, catalog: &Catalog, project: &str) -> Result<(), CommandError> {
    let Some(family) = catalog.family_of(project) else {
        return Ok(());
    };
    if !family.exclusive {
        return Ok(());
    }
    if let Some(chosen) = state.chosen_families.get(&family.id) {
        if chosen.as_str() != project {
            let label = if family.description.is_empty() {
                family.id.to_string()
            } else {
                family.description.clone()
            };
            return Err(CommandError::FamilyLocked(label));
        }
    }
    let taken = family
        .choices
        .iter()
        .filter(|c| c.as_str() != project)
        .any(|c| {
            state.project_active(c.as_str())
                || state.project_queued(c.as_str())
                || state.completed_projects.contains(c)
        });
    if taken {
        return Err(CommandError::FamilyAlreadyChosen);
    }
    Ok(())
}

pub fn check_start<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    project: &str,
) -> Result<&'c ProjectDefinition, CommandError> {
    let def = catalog
        .project(project)
        .ok_or_else(|| CommandError::unknown("project", project))?;
    check_family(state, catalog, project)?;
    if !state.unlocked_projects.contains(project) {
        return Err(CommandError::ProjectLocked);
    }
    if state.completed_projects.contains(project) {
        return Err(CommandError::ProjectCompleted);
    }
    if state.project_active(project) {
        return Err(CommandError::ProjectActive);
    }
    if state.available_crew(catalog) < def.crew_required {
        return Err(CommandError::NoAvailableCrew);
    }
    shortfall_error(state, catalog, &def.costs)?;
    Ok(def)
}

pub fn start(
    state: &mut WorldState,
    catalog: &Catalog,
    project: &str,
    source: ProjectSource,
) -> Result<ProjectKey, CommandError> {
    let def = check_start(state, catalog, project)?;
    if let Some(family) = catalog.family_of(project).filter(|f| f.exclusive) {
        state
            .chosen_families
            .insert(family.id.clone(), def.id.clone());
    }
    state.spend(&def.costs);
    state.queue.retain(|q| q.project != def.id);
    let key = state.projects.insert(ProjectInstance {
        target: ProjectTarget::Definition(def.id.clone()),
        remaining_seconds: def.duration_seconds,
        total_seconds: def.duration_seconds,
        crew_required: def.crew_required,
        started_at: state.clock.seconds,
        source,
        building: None,
    });
    tracing::debug!(project = %def.id, "project.started");
    Ok(key)
}

pub fn check_queue(state: &WorldState, catalog: &Catalog, project: &str) -> Result<(), CommandError> {
    if catalog.project(project).is_none() {
        return Err(CommandError::unknown("project", project));
    }
    check_family(state, catalog, project)?;
    if state.completed_projects.contains(project) {
        return Err(CommandError::ProjectCompleted);
    }
    if state.project_active(project) {
        return Err(CommandError::ProjectActive);
    }
    if state.project_queued(project) {
        return Err(CommandError::ProjectQueued);
    }
    if !state.unlocked_projects.contains(project) {
        return Err(CommandError::ProjectLocked);
    }
    Ok(())
}

pub fn queue(
    state: &mut WorldState,
    catalog: &Catalog,
    project: &str,
    source: ProjectSource,
) -> Result<u64, CommandError> {
    check_queue(state, catalog, project)?;
    let serial = state.next_serial();
    state.queue.push(QueuedProject {
        serial,
        project: project.into(),
        queued_at: state.clock.seconds,
        source,
    });
    Ok(serial)
}

/// Drop a queued entry or abandon an active project. Nothing is refunded.
pub fn cancel(state: &mut WorldState, target: ProjectRef) -> Result<(), CommandError> {
    match target {
        ProjectRef::Queued(serial) => {
            let before = state.queue.len();
            state.queue.retain(|q| q.serial != serial);
            if state.queue.len() == before {
                return Err(CommandError::ProjectNotFound);
            }
        }
        ProjectRef::Active(key) => {
            let instance = state
                .projects
                .remove(key)
                .ok_or(CommandError::ProjectNotFound)?;
            if let (ProjectTarget::Construction(_), Some(building)) =
                (&instance.target, instance.building)
            {
                state.buildings.remove(building);
            }
            if state.catalyst.active_project == Some(key) {
                state.catalyst.active_project = None;
                state.catalyst.active_until = None;
            }
        }
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Construction and upgrades
// ---------------------------------------------------------------------------

pub fn check_build<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    building: &str,
    x: i32,
    y: i32,
) -> Result<&'c BuildingDefinition, CommandError> {
    let def = catalog
        .building(building)
        .filter(|_| state.unlocked_buildings.contains(building))
        .ok_or(CommandError::BuildingLocked)?;
    if !(0..state.grid_size).contains(&x) || !(0..state.grid_size).contains(&y) {
        return Err(CommandError::OutOfBounds);
    }
    if state.building_at(x, y).is_some() {
        return Err(CommandError::TileOccupied);
    }
    if state.available_crew(catalog) < 1 {
        return Err(CommandError::NoAvailableCrew);
    }
    shortfall_error(state, catalog, &def.base_cost)?;
    Ok(def)
}

/// Place a level-1 building and start its construction project.
pub fn build(
    state: &mut WorldState,
    catalog: &Catalog,
    building: &str,
    x: i32,
    y: i32,
) -> Result<BuildingKey, CommandError> {
    let def = check_build(state, catalog, building, x, y)?;
    state.spend(&def.base_cost);
    let key = state.buildings.insert(BuildingInstance {
        building: def.id.clone(),
        level: 1,
        x,
        y,
        disabled_until: None,
    });
    state.projects.insert(ProjectInstance {
        target: ProjectTarget::Construction(def.id.clone()),
        remaining_seconds: def.build_time_seconds,
        total_seconds: def.build_time_seconds,
        crew_required: 1,
        started_at: state.clock.seconds,
        source: ProjectSource::Construction,
        building: Some(key),
    });
    tracing::debug!(building = %def.id, x, y, "building.placed");
    Ok(key)
}

/// Cost of raising a building from `level` to `level + 1`.
pub fn upgrade_cost(def: &BuildingDefinition, level: u32) -> ResourceAmounts {
    let scale = def.cost_growth.powi(level as i32);
    def.base_cost
        .iter()
        .map(|(id, amount)| (id.clone(), amount * scale))
        .collect()
}

/// Nominal duration of the upgrade from `level`.
pub fn upgrade_duration(def: &BuildingDefinition, level: u32) -> f64 {
    def.build_time_seconds * UPGRADE_DURATION_GROWTH.powi(level as i32)
}

pub fn check_upgrade<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    key: BuildingKey,
) -> Result<(&'c BuildingDefinition, ResourceAmounts), CommandError> {
    let instance = state
        .buildings
        .get(key)
        .ok_or(CommandError::BuildingNotFound)?;
    let def = catalog
        .building(instance.building.as_str())
        .ok_or_else(|| CommandError::unknown("building", instance.building.as_str()))?;
    if instance.level >= def.max_level {
        return Err(CommandError::MaxLevel);
    }
    if state.projects.values().any(|p| p.building == Some(key)) {
        return Err(CommandError::UpgradeInProgress);
    }
    if state.available_crew(catalog) < 1 {
        return Err(CommandError::NoAvailableCrew);
    }
    let cost = upgrade_cost(def, instance.level);
    shortfall_error(state, catalog, &cost)?;
    Ok((def, cost))
}

pub fn upgrade(state: &mut WorldState, catalog: &Catalog, key: BuildingKey) -> Result<ProjectKey, CommandError> {
    let (def, cost) = check_upgrade(state, catalog, key)?;
    let level = state.buildings.get(key).map_or(1, |b| b.level);
    state.spend(&cost);
    let duration = upgrade_duration(def, level);
    let project = state.projects.insert(ProjectInstance {
        target: ProjectTarget::Upgrade(def.id.clone()),
        remaining_seconds: duration,
        total_seconds: duration,
        crew_required: 1,
        started_at: state.clock.seconds,
        source: ProjectSource::Upgrade,
        building: Some(key),
    });
    Ok(project)
}

// ---------------------------------------------------------------------------
// Catalyst and chrono shards
// ---------------------------------------------------------------------------

pub fn check_catalyst(state: &WorldState, key: ProjectKey) -> Result<(), CommandError> {
    if !state.projects.contains_key(key) {
        return Err(CommandError::NoActiveProject);
    }
    match state.catalyst.available_at {
        None => Err(CommandError::CatalystLocked),
        Some(at) if state.clock.seconds < at => Err(CommandError::CatalystCooldown),
        Some(_) => Ok(()),
    }
}

pub fn activate_catalyst(
    state: &mut WorldState,
    config: &EngineConfig,
    key: ProjectKey,
) -> Result<(), CommandError> {
    check_catalyst(state, key)?;
    let now = state.clock.seconds;
    let cooldown = (config.catalyst_cooldown_seconds
        - state.catalyst.level as f64 * config.catalyst_cooldown_per_level)
        .max(config.catalyst_boost_seconds);
    state.catalyst.active_project = Some(key);
    state.catalyst.active_until = Some(now + config.catalyst_boost_seconds);
    state.catalyst.available_at = Some(now + cooldown);
    Ok(())
}

pub fn check_chrono_shard(state: &WorldState, key: ProjectKey) -> Result<(), CommandError> {
    if !state.projects.contains_key(key) {
        return Err(CommandError::NoActiveProject);
    }
    if state.chrono_shards == 0 {
        return Err(CommandError::NoChronoShards);
    }
    Ok(())
}

pub fn use_chrono_shard(
    state: &mut WorldState,
    config: &EngineConfig,
    key: ProjectKey,
) -> Result<(), CommandError> {
    check_chrono_shard(state, key)?;
    if let Some(project) = state.projects.get_mut(key) {
        project.remaining_seconds = (project.remaining_seconds - config.chrono_shard_seconds).max(0.0);
    }
    state.chrono_shards -= 1;
    Ok(())
}

// ---------------------------------------------------------------------------
// Per-step progress
// ---------------------------------------------------------------------------

/// Advance every active project, complete the finished ones, then refill
/// crews from the queue and the auto-planner.
pub fn run(
    state: &mut WorldState,
    catalog: &Catalog,
    config: &EngineConfig,
    modifiers: &Modifiers,
    dt: f64,
) {
    let base = base_speed(state, catalog, modifiers);
    let speeds: Vec<(ProjectKey, f64)> = state
        .projects
        .keys()
        .map(|key| (key, speed_for(state, config, base, key)))
        .collect();
    let mut finished = Vec::new();
    for (key, speed) in speeds {
        if let Some(project) = state.projects.get_mut(key) {
            project.remaining_seconds -= dt * speed;
            if project.remaining_seconds <= 0.0 {
                finished.push(key);
            }
        }
    }
    for key in finished {
        if let Some(project) = state.projects.remove(key) {
            complete(state, catalog, project);
        }
    }

    start_queued(state, catalog);
    if state.auto_plan.enabled && state.queue.is_empty() {
        auto_plan(state, catalog);
    }
}

fn complete(state: &mut WorldState, catalog: &Catalog, project: ProjectInstance) {
    match project.target {
        ProjectTarget::Construction(id) => {
            let name = catalog
                .building(id.as_str())
                .map_or_else(|| id.to_string(), |d| d.name.clone());
            state.log(
                EventCategory::Construction,
                "Construction Complete",
                format!("{name} is operational."),
            );
        }
        ProjectTarget::Upgrade(id) => {
            let Some(key) = project.building else {
                return;
            };
            let Some(building) = state.buildings.get_mut(key) else {
                return;
            };
            building.level += 1;
            let level = building.level;
            let name = catalog
                .building(id.as_str())
                .map_or_else(|| id.to_string(), |d| d.name.clone());
            state.log(
                EventCategory::Construction,
                "Upgrade Complete",
                format!("{name} reached level {level}."),
            );
        }
        ProjectTarget::Definition(id) => {
            let Some(def) = catalog.project(id.as_str()) else {
                tracing::warn!(project = %id, "project.definition_missing");
                return;
            };
            effect::apply_all(state, catalog, &def.effects);
            state.completed_projects.insert(id.clone());
            domain::award_for_tags(state, catalog, &def.tags);
            tracing::debug!(project = %id, "project.completed");
            state.log(
                EventCategory::Project,
                "Project Completed",
                format!("{} completed.", def.name),
            );
        }
    }
}

/// Start queued projects in order while crew and stock allow. Entries that
/// can never start (completed, locked, claimed) are dropped.
fn start_queued(state: &mut WorldState, catalog: &Catalog) {
    while let Some(next) = state.queue.first().cloned() {
        match check_start(state, catalog, next.project.as_str()) {
            Ok(_) => {
                if start(state, catalog, next.project.as_str(), next.source).is_err() {
                    break;
                }
            }
            Err(CommandError::NoAvailableCrew | CommandError::Insufficient(_)) => break,
            Err(reason) => {
                tracing::debug!(project = %next.project, %reason, "queue.dropped");
                state.queue.remove(0);
            }
        }
    }
}

fn auto_plan(state: &mut WorldState, catalog: &Catalog) {
    let tags = &state.auto_plan.priority_tags;
    let mut candidates: Vec<&ProjectDefinition> = state
        .unlocked_projects
        .iter()
        .filter(|id| !state.completed_projects.contains(*id) && !state.project_active(id.as_str()))
        .filter_map(|id| catalog.project(id.as_str()))
        .collect();
    candidates.sort_by(|a, b| {
        let a_match = a.tags.iter().any(|t| tags.contains(t));
        let b_match = b.tags.iter().any(|t| tags.contains(t));
        b_match
            .cmp(&a_match)
            .then(a.duration_seconds.total_cmp(&b.duration_seconds))
            .then(a.id.cmp(&b.id))
    });
    let picks: Vec<_> = candidates.into_iter().map(|d| d.id.clone()).collect();
    for id in picks {
        if state.available_crew(catalog) == 0 {
            break;
        }
        if check_start(state, catalog, id.as_str()).is_err() {
            continue;
        }
        let source = if catalog.family_of(id.as_str()).is_some() {
            ProjectSource::Megaproject
        } else {
            ProjectSource::Research
        };
        if start(state, catalog, id.as_str(), source).is_ok() {
            tracing::debug!(project = %id, "autoplan.started");
        }
    }
}
