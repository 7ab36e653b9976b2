//! Collector cache: the bounded buffer production overflows into. Filling
//! happens inside [`production::run`](crate::production::run); this module
//! empties it.

use crate::command::CommandError;
use crate::event::EventCategory;
use crate::state::WorldState;

pub fn check_collect(state: &WorldState) -> Result<(), CommandError> {
    if state.collector.total() <= 0.0 {
        return Err(CommandError::CacheEmpty);
    }
    Ok(())
}

/// Move the whole cache into the ledger. Whatever the ledger cannot hold is
/// recorded as waste; the cache is emptied either way.
pub fn collect(state: &mut WorldState) -> Result<f64, CommandError> {
    check_collect(state)?;
    let stored: Vec<_> = state
        .collector
        .stored
        .iter_mut()
        .filter(|(_, amount)| **amount > 0.0)
        .map(|(id, amount)| (id.clone(), std::mem::take(amount)))
        .collect();
    let mut banked = 0.0;
    for (id, amount) in &stored {
        banked += state.grant_resource(id.as_str(), *amount);
    }
    state.stats.cache_collects += 1;
    state.collector.last_collected_at = Some(state.clock.seconds);
    tracing::debug!(banked, "collector.collected");
    state.log(
        EventCategory::System,
        "Cache Collected",
        format!("Collected {} from the cache.", banked.round() as i64),
    );
    Ok(banked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::*;

    #[test]
    fn empty_cache_is_rejected() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let before = state.clone();
        assert_eq!(collect(&mut state), Err(CommandError::CacheEmpty));
        assert_eq!(state, before);
    }

    #[test]
    fn collect_moves_cache_into_ledger() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        set_amount(&mut state, "food", 0.0);
        state.collector.stored.insert("food".into(), 40.0);
        let banked = collect(&mut state).unwrap();
        assert_eq!(banked, 40.0);
        assert_eq!(state.amount("food"), 40.0);
        assert_eq!(state.collector.total(), 0.0);
        assert_eq!(state.stats.cache_collects, 1);
        assert!(state.events.contains_title("Cache Collected"));
    }

    #[test]
    fn collect_near_cap_wastes_excess() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        let cap = state.resources["food"].cap;
        set_amount(&mut state, "food", cap - 10.0);
        let wasted = state.stats.wasted["food"];
        state.collector.stored.insert("food".into(), 40.0);
        assert_eq!(collect(&mut state).unwrap(), 10.0);
        assert_eq!(state.amount("food"), cap);
        assert!((state.stats.wasted["food"] - (wasted + 30.0)).abs() < 1e-9);
        assert_eq!(state.collector.stored["food"], 0.0);
    }
}
