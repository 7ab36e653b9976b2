//! Achievements: conditions checked every step until they first hold.

use std::collections::BTreeMap;

use crate::catalog::{AchievementCondition, Catalog};
use crate::effect;
use crate::event::EventCategory;
use crate::id::ResourceId;
use crate::state::WorldState;

/// Whether a condition holds. `net_per_hour` is the rate observed over the
/// current step.
pub fn condition_met(
    state: &WorldState,
    condition: &AchievementCondition,
    net_per_hour: &BTreeMap<ResourceId, f64>,
) -> bool {
    match condition {
        AchievementCondition::ResourceRate { resource, amount } => {
            net_per_hour.get(resource).copied().unwrap_or(0.0) >= *amount
        }
        AchievementCondition::ResourceTotal { resource, amount } => {
            state.stats.produced.get(resource).copied().unwrap_or(0.0) >= *amount
        }
        AchievementCondition::DomainTier { domain, tier } => {
            state.domains.tiers.get(domain).copied().unwrap_or(0) >= *tier
        }
        AchievementCondition::RaidFreeHours { hours } => {
            let since = state.stats.last_raid_at.unwrap_or(0.0);
            state.clock.seconds - since >= hours * 3600.0
        }
        AchievementCondition::CohesionAtLeast { amount } => state.meters.cohesion >= *amount,
        AchievementCondition::BiosphereAtLeast { amount } => state.meters.biosphere >= *amount,
        AchievementCondition::Flag { flag } => state.has_flag(flag.as_str()),
    }
}

pub fn run(state: &mut WorldState, catalog: &Catalog, net_per_hour: &BTreeMap<ResourceId, f64>) {
    for def in catalog.achievements().iter() {
        if state.achievements.contains(&def.id) || !condition_met(state, &def.condition, net_per_hour) {
            continue;
        }
        state.achievements.insert(def.id.clone());
        effect::apply_all(state, catalog, &def.effects);
        tracing::debug!(achievement = %def.id, "achievement.unlocked");
        state.log(
            EventCategory::Achievement,
            "Achievement Unlocked",
            format!("{} unlocked.", def.name),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn resource_total_unlocks_once() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        state.stats.produced.insert("food".into(), 1_000.0);
        let shards = state.chrono_shards;
        run(&mut state, &catalog, &BTreeMap::new());
        run(&mut state, &catalog, &BTreeMap::new());
        assert!(state.achievements.contains("first_harvest"));
        assert_eq!(state.chrono_shards, shards + 1);
    }

    #[test]
    fn rate_condition_uses_step_rate() {
        let catalog = fixture_catalog();
        let state = fixture_state(&catalog);
        let condition = AchievementCondition::ResourceRate {
            resource: "food".into(),
            amount: 10.0,
        };
        let mut rates = BTreeMap::new();
        assert!(!condition_met(&state, &condition, &rates));
        rates.insert(ResourceId::from("food"), 12.0);
        assert!(condition_met(&state, &condition, &rates));
    }

    #[test]
    fn raid_free_counts_from_last_raid() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let condition = AchievementCondition::RaidFreeHours { hours: 2.0 };
        state.clock.seconds = 7_200.0;
        assert!(condition_met(&state, &condition, &BTreeMap::new()));
        state.stats.last_raid_at = Some(3_600.0);
        assert!(!condition_met(&state, &condition, &BTreeMap::new()));
    }
}
