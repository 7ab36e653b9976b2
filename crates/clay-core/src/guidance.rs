//! Guidance items and milestone alerts.
//!
//! Guidance is a pure read: a prioritised list of things the player could
//! act on now. Alerts are one-off notifications raised during online
//! advances, rate-limited per id by wall-clock cooldowns kept in the state.

use crate::catalog::Catalog;
use crate::config::EngineConfig;
use crate::derived::DerivedState;
use crate::state::{DispatchStatus, GuidanceLevel, WorldState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Priority {
    Medium,
    High,
    Urgent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GuidanceItem {
    pub id: String,
    pub title: String,
    pub detail: String,
    pub priority: Priority,
}

impl GuidanceItem {
    fn new(id: impl Into<String>, title: impl Into<String>, detail: impl Into<String>, priority: Priority) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            detail: detail.into(),
            priority,
        }
    }
}

fn resource_name(catalog: &Catalog, id: &str) -> String {
    catalog.resource(id).map_or_else(|| id.to_string(), |r| r.name.clone())
}

/// Actionable suggestions, most pressing first, filtered by the player's
/// guidance level.
pub fn guidance_items(state: &WorldState, catalog: &Catalog, derived: &DerivedState) -> Vec<GuidanceItem> {
    let mut items = Vec::new();

    let cache = state.collector.total();
    if cache > 0.0 {
        items.push(GuidanceItem::new(
            "collect_cache",
            "Collect Cache",
            format!("{} ready to claim.", cache.round() as i64),
            Priority::High,
        ));
    }
    let finished = state
        .dispatches
        .values()
        .filter(|d| d.status != DispatchStatus::Active)
        .count();
    if finished > 0 {
        items.push(GuidanceItem::new(
            "collect_dispatches",
            "Collect Dispatches",
            format!("{finished} operations ready."),
            Priority::High,
        ));
    }
    if state.chains.pending.is_some() {
        items.push(GuidanceItem::new(
            "pending_decision",
            "Decision Pending",
            "An event requires your choice.",
            Priority::Urgent,
        ));
    }
    if derived.available_crew > 0 && state.queue.is_empty() {
        items.push(GuidanceItem::new(
            "idle_crews",
            "Idle Crews",
            format!("{} crew idle. Queue a project.", derived.available_crew),
            Priority::High,
        ));
    }
    if derived.logistics.factor < 0.85 {
        items.push(GuidanceItem::new(
            "logistics_bottleneck",
            "Logistics Bottleneck",
            "Output throttled. Build logistics capacity.",
            Priority::Medium,
        ));
    }
    let raid = derived.risk.raid_chance_per_hour;
    if raid > 0.12 {
        items.push(GuidanceItem::new(
            "raid_risk_high",
            "Raid Risk High",
            format!("Risk at {}%. Add defenses or pacts.", (raid * 100.0) as i64),
            Priority::High,
        ));
    }
    // Only the worst deficit and the fullest store are surfaced.
    if let Some((id, rate)) = derived
        .rates_per_hour
        .iter()
        .filter(|(_, rate)| **rate < 0.0)
        .min_by(|a, b| a.1.total_cmp(b.1))
    {
        items.push(GuidanceItem::new(
            format!("negative:{id}"),
            format!("Negative {}", resource_name(catalog, id.as_str())),
            format!("Net {rate:.1}/h. Boost production."),
            Priority::High,
        ));
    }
    let fullest = state
        .resources
        .iter()
        .filter_map(|(id, r)| {
            let cap = derived.caps.get(id).copied().unwrap_or(0.0);
            (cap > 0.0).then(|| (id, r.amount / cap))
        })
        .max_by(|a, b| a.1.total_cmp(&b.1));
    if let Some((id, ratio)) = fullest {
        if ratio >= 0.9 {
            items.push(GuidanceItem::new(
                format!("near_cap:{id}"),
                format!("{} Near Cap", resource_name(catalog, id.as_str())),
                "Add storage or spend resources.",
                Priority::Medium,
            ));
        }
    }
    let expiring = state
        .factions
        .values()
        .flat_map(|f| f.contracts.iter())
        .filter(|c| c.remaining_seconds < 3600.0)
        .count();
    if expiring > 0 {
        items.push(GuidanceItem::new(
            "contracts_expiring",
            "Contracts Expiring",
            format!("{expiring} contract(s) end within 1h."),
            Priority::High,
        ));
    }

    let floor = match state.settings.guidance_level {
        GuidanceLevel::High | GuidanceLevel::Balanced => Priority::Medium,
        GuidanceLevel::Minimal => Priority::High,
    };
    items.retain(|item| item.priority >= floor);
    items.sort_by(|a, b| b.priority.cmp(&a.priority).then_with(|| a.title.cmp(&b.title)));
    items
}

// ---------------------------------------------------------------------------
// Milestone alerts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub id: String,
    pub message: String,
}

/// Raise every milestone alert whose condition holds and whose cooldown has
/// lapsed at wall-clock `now`.
pub fn milestone_alerts(
    state: &mut WorldState,
    catalog: &Catalog,
    config: &EngineConfig,
    derived: &DerivedState,
    now: f64,
) -> Vec<Alert> {
    if !state.settings.notifications_enabled {
        return Vec::new();
    }
    let mut candidates: Vec<(String, String)> = Vec::new();
    for resource in catalog.resources().iter() {
        let cap = derived.caps.get(&resource.id).copied().unwrap_or(0.0);
        if cap > 0.0 && state.amount(resource.id.as_str()) >= cap * 0.9 {
            candidates.push((
                format!("cap:{}", resource.id),
                format!("{} storage nearing cap", resource.name),
            ));
        }
    }
    for contract in state.factions.values().flat_map(|f| f.contracts.iter()) {
        if contract.remaining_seconds <= 7200.0 {
            let message = catalog.contract(contract.contract.as_str()).map_or_else(
                || "Contract expiring soon".to_string(),
                |def| format!("Contract expiring soon: {}", def.name),
            );
            candidates.push((format!("contract:{}", contract.contract), message));
        }
    }
    if derived.risk.raid_chance_per_hour > 0.15 {
        candidates.push((
            "risk:raid".into(),
            "Raid risk elevated. Consider defenses or pacts.".into(),
        ));
    }
    if state.meters.cohesion < 0.3 {
        candidates.push(("world:cohesion_low".into(), "Civil unrest rising.".into()));
    }
    if state.meters.biosphere < 0.3 {
        candidates.push(("world:biosphere_low".into(), "Ecological strain detected.".into()));
    }
    if state.collector.total() > 0.0 {
        candidates.push((
            "collector:ready".into(),
            "Resource cache ready to collect.".into(),
        ));
    }

    let mut fired = Vec::new();
    for (id, message) in candidates {
        let cooling = state
            .alerts
            .last_fired
            .get(&id)
            .is_some_and(|&last| now - last < config.alert_cooldown_seconds);
        if cooling {
            continue;
        }
        state.alerts.last_fired.insert(id.clone(), now);
        fired.push(Alert { id, message });
    }
    fired
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::derived::derive;
    use crate::test_utils::*;

    fn items(state: &WorldState, catalog: &Catalog) -> Vec<GuidanceItem> {
        let derived = derive(state, catalog, &EngineConfig::default());
        guidance_items(state, catalog, &derived)
    }

    #[test]
    fn fresh_world_suggests_idle_crews() {
        let catalog = fixture_catalog();
        let state = fixture_state(&catalog);
        let titles: Vec<_> = items(&state, &catalog).into_iter().map(|i| i.title).collect();
        assert!(titles.contains(&"Idle Crews".to_string()));
    }

    #[test]
    fn pending_decision_sorts_first() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        state.chains.pending = Some("surplus".into());
        state.collector.stored.insert("food".into(), 5.0);
        let list = items(&state, &catalog);
        assert_eq!(list[0].title, "Decision Pending");
        assert_eq!(list[0].priority, Priority::Urgent);
        let priorities: Vec<_> = list.iter().map(|i| i.priority).collect();
        let mut sorted = priorities.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(priorities, sorted);
    }

    #[test]
    fn minimal_level_drops_medium_items() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        fill_all(&mut state);
        let all = items(&state, &catalog);
        assert!(all.iter().any(|i| i.priority == Priority::Medium));
        state.settings.guidance_level = GuidanceLevel::Minimal;
        let minimal = items(&state, &catalog);
        assert!(minimal.iter().all(|i| i.priority >= Priority::High));
    }

    #[test]
    fn alerts_respect_cooldown_and_toggle() {
        let catalog = fixture_catalog();
        let config = EngineConfig::default();
        let mut state = fixture_state(&catalog);
        state.collector.stored.insert("food".into(), 5.0);
        let derived = derive(&state, &catalog, &config);

        let first = milestone_alerts(&mut state, &catalog, &config, &derived, 1_000.0);
        assert!(first.iter().any(|a| a.id == "collector:ready"));
        let again = milestone_alerts(&mut state, &catalog, &config, &derived, 1_100.0);
        assert!(again.iter().all(|a| a.id != "collector:ready"));
        let later = milestone_alerts(&mut state, &catalog, &config, &derived, 1_000.0 + 3_600.0);
        assert!(later.iter().any(|a| a.id == "collector:ready"));

        state.settings.notifications_enabled = false;
        assert!(milestone_alerts(&mut state, &catalog, &config, &derived, 1.0e9).is_empty());
    }
}
