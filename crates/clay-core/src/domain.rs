//! Research domains: tag-driven points and tier unlocks.

use crate::catalog::{Catalog, DomainDefinition};
use crate::command::CommandError;
use crate::effect;
use crate::event::EventCategory;
use crate::state::WorldState;

/// One point to every domain sharing a tag with a completed project.
pub fn award_for_tags(state: &mut WorldState, catalog: &Catalog, tags: &[String]) {
    if tags.is_empty() {
        return;
    }
    for domain in catalog.domains().iter() {
        if domain.tags.iter().any(|t| tags.contains(t)) {
            *state.domains.points.entry(domain.id.clone()).or_insert(0) += 1;
            unlock_tiers(state, catalog, domain);
        }
    }
}

pub fn grant_points(
    state: &mut WorldState,
    catalog: &Catalog,
    domain: &str,
    points: u32,
) -> Result<(), CommandError> {
    let def = catalog
        .domain(domain)
        .ok_or_else(|| CommandError::unknown("domain", domain))?;
    *state.domains.points.entry(def.id.clone()).or_insert(0) += points;
    unlock_tiers(state, catalog, def);
    Ok(())
}

/// Unlock every tier the domain's points now reach. Each tier's effects
/// apply once; the stored tier is a watermark.
pub fn unlock_tiers(state: &mut WorldState, catalog: &Catalog, domain: &DomainDefinition) {
    let points = state.domains.points.get(&domain.id).copied().unwrap_or(0);
    let current = state.domains.tiers.get(&domain.id).copied().unwrap_or(0);
    let mut tiers: Vec<_> = domain.tiers.iter().collect();
    tiers.sort_by_key(|t| t.tier);
    let mut reached = current;
    for tier in tiers {
        if tier.tier <= current || points < tier.required_points {
            continue;
        }
        effect::apply_all(state, catalog, &tier.effects);
        reached = reached.max(tier.tier);
        state.log(
            EventCategory::Domain,
            "Domain Tier Unlocked",
            format!("{} Tier {} achieved.", domain.name, tier.tier),
        );
    }
    if reached != current {
        state.domains.tiers.insert(domain.id.clone(), reached);
    }
}

/// Evaluate every domain; a no-op unless points changed elsewhere.
pub fn run(state: &mut WorldState, catalog: &Catalog) {
    for domain in catalog.domains().iter() {
        unlock_tiers(state, catalog, domain);
    }
}
