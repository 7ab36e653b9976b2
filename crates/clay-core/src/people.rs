//! Recruited people. Their effects are passive and folded into
//! [`Modifiers`](crate::effect::Modifiers) every step.

use crate::catalog::{Catalog, PersonDefinition};
use crate::command::CommandError;
use crate::contract::shortfall_error;
use crate::event::EventCategory;
use crate::production;
use crate::state::WorldState;

pub fn check_recruit<'c>(
    state: &WorldState,
    catalog: &'c Catalog,
    person: &str,
) -> Result<&'c PersonDefinition, CommandError> {
    let def = catalog
        .person(person)
        .ok_or_else(|| CommandError::unknown("person", person))?;
    if state.people.recruited.contains(&def.id) {
        return Err(CommandError::AlreadyRecruited);
    }
    if state.people.recruited.len() >= state.people.max_roster as usize {
        return Err(CommandError::RosterFull);
    }
    if !catalog.era_reached(state.era.as_str(), def.era.as_str()) {
        return Err(CommandError::LockedByEra);
    }
    shortfall_error(state, catalog, &def.costs)?;
    Ok(def)
}

pub fn recruit(state: &mut WorldState, catalog: &Catalog, person: &str) -> Result<(), CommandError> {
    let def = check_recruit(state, catalog, person)?;
    state.spend(&def.costs);
    state.people.recruited.push(def.id.clone());
    tracing::debug!(person = %def.id, "person.recruited");
    state.log(
        EventCategory::System,
        "Recruit Joined",
        format!("{} joined as {}.", def.name, def.role),
    );
    // Cap bonuses from the newcomer apply immediately.
    production::refresh_caps(state, catalog);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effect::Modifiers;
    use crate::test_utils::*;

    #[test]
    fn recruit_spends_and_applies_passive() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        fill_all(&mut state);
        let food = state.amount("food");
        recruit(&mut state, &catalog, "scout").unwrap();
        let cost = catalog.person("scout").unwrap().costs["food"];
        assert!((state.amount("food") - (food - cost)).abs() < 1e-9);
        assert!(Modifiers::collect(&state, &catalog).project_speed > 0.0);
        assert!(state.events.contains_title("Recruit Joined"));
    }

    #[test]
    fn recruit_rejections() {
        let catalog = fixture_catalog();
        let mut state = fixture_state(&catalog);
        set_amount(&mut state, "food", 0.0);
        assert_eq!(
            recruit(&mut state, &catalog, "scout"),
            Err(CommandError::Insufficient("Food".into()))
        );
        fill_all(&mut state);
        recruit(&mut state, &catalog, "scout").unwrap();
        assert_eq!(
            recruit(&mut state, &catalog, "scout"),
            Err(CommandError::AlreadyRecruited)
        );
        assert_eq!(
            recruit(&mut state, &catalog, "archivist"),
            Err(CommandError::LockedByEra)
        );
        state.people.max_roster = 1;
        assert_eq!(
            recruit(&mut state, &catalog, "archivist"),
            Err(CommandError::RosterFull)
        );
    }
}
