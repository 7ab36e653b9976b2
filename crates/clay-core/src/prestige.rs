//! Ascension and legacy upgrades.
//!
//! Ascending converts progress into legacy points and resets the world to
//! its era-zero defaults. Prestige state and player settings survive; every
//! owned legacy upgrade is re-applied to the fresh world.

use crate::catalog::{Catalog, LegacyUpgradeDefinition};
use crate::command::CommandError;
use crate::config::EngineConfig;
use crate::effect;
use crate::event::EventCategory;
use crate::production;
use crate::state::WorldState;

/// Components of the legacy gain an ascension would award right now.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LegacyBreakdown {
    /// Completed eras past the first.
    pub era_points: u32,
    /// Sum of unlocked domain tiers, divided by 3.
    pub domain_bonus: u32,
    /// Unlocked achievements, divided by 4.
    pub achievement_bonus: u32,
    /// Orders of magnitude of lifetime energy production above the offset.
    pub energy_bonus: u32,
    pub total: u32,
}

pub fn legacy_gain_breakdown(state: &WorldState, catalog: &Catalog) -> LegacyBreakdown {
    let era_points = catalog
        .eras()
        .iter()
        .filter(|era| era.sort_order > 0 && state.era_complete(era))
        .count() as u32;
    let tiers: u32 = state.domains.tiers.values().sum();
    let domain_bonus = tiers / 3;
    let achievement_bonus = state.achievements.len() as u32 / 4;
    let energy_bonus = energy_bonus(state, catalog);
    LegacyBreakdown {
        era_points,
        domain_bonus,
        achievement_bonus,
        energy_bonus,
        total: era_points + domain_bonus + achievement_bonus + energy_bonus,
    }
}

fn energy_bonus(state: &WorldState, catalog: &Catalog) -> u32 {
    let rules = &catalog.rules().prestige;
    let Some(resource) = &rules.energy_resource else {
        return 0;
    };
    if let Some(flag) = &rules.energy_flag {
        if !state.has_flag(flag.as_str()) {
            return 0;
        }
    }
    let produced = state.stats.produced.get(resource).copied().unwrap_or(0.0);
    let magnitude = produced.max(1.0).log10().floor() as i32;
    (magnitude - rules.energy_log_offset).max(0) as u32
}

/// Reset the world and bank the legacy gain. `now` is wall-clock time.
pub fn ascend(state: &mut WorldState, catalog: &Catalog, config: &EngineConfig, now: f64) -> u32 {
    let gain = legacy_gain_breakdown(state, catalog).total;
    let mut next = WorldState::new(catalog, config, state.rng.state(), now);
    next.prestige = state.prestige.clone();
    next.settings = state.settings.clone();
    next.prestige.legacy_points += gain;
    next.prestige.ascensions += 1;
    next.prestige.last_ascended_at = Some(now);

    let owned: Vec<_> = next.prestige.upgrades.iter().cloned().collect();
    for id in owned {
        if let Some(upgrade) = catalog.legacy_upgrade(id.as_str()) {
            effect::apply_all(&mut next, catalog, &upgrade.effects);
        }
    }
    production::refresh_caps(&mut next, catalog);

    tracing::info!(
        gain,
        total = next.prestige.legacy_points,
        ascensions = next.prestige.ascensions,
        "prestige.ascended"
    );
    next.log(
        EventCategory::Prestige,
        "Ascended",
        format!("Earned {gain} legacy points."),
    );
    *state = next;
    gain
}

pub fn check_purchase<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    upgrade: &str,
) -> Result<&'c LegacyUpgradeDefinition, CommandError> {
    let def = catalog
        .legacy_upgrade(upgrade)
        .ok_or_else(|| CommandError::unknown("legacy upgrade", upgrade))?;
    if state.prestige.upgrades.contains(&def.id) {
        return Err(CommandError::AlreadyOwned);
    }
    if state.prestige.legacy_points < def.cost {
        return Err(CommandError::InsufficientLegacyPoints);
    }
    Ok(def)
}

pub fn purchase(state: &mut WorldState, catalog: &Catalog, upgrade: &str) -> Result<(), CommandError> {
    let def = check_purchase(state, catalog, upgrade)?;
    state.prestige.legacy_points -= def.cost;
    state.prestige.upgrades.insert(def.id.clone());
    effect::apply_all(state, catalog, &def.effects);
    production::refresh_caps(state, catalog);
    state.log(
        EventCategory::Prestige,
        "Legacy Upgrade",
        format!("{} acquired.", def.name),
    );
    Ok(())
}
