//! Identifier types.
//!
//! Content ids are stable strings authored in the content pack. Instance
//! handles are slotmap keys owned by the [`WorldState`](crate::state::WorldState).

use serde::{Deserialize, Serialize};
use slotmap::new_key_type;
use std::borrow::Borrow;
use std::fmt;

new_key_type! {
    /// Identifies a placed building on the grid.
    pub struct BuildingKey;

    /// Identifies an active project (research, construction, upgrade, ...).
    pub struct ProjectKey;

    /// Identifies an outstanding dispatch.
    pub struct DispatchKey;
}

macro_rules! content_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

content_id!(
    /// A stockpiled resource (food, materials, energy, ...).
    ResourceId
);
content_id!(
    /// A building definition.
    BuildingId
);
content_id!(
    /// A research or megaproject definition.
    ProjectId
);
content_id!(EraId);
content_id!(FactionId);
content_id!(ContractId);
content_id!(PolicyId);
content_id!(
    /// A policy slot name. At most one policy is active per slot.
    PolicySlot
);
content_id!(ChainId);
content_id!(ChoiceId);
content_id!(
    /// A random event definition.
    EventId
);
content_id!(DomainId);
content_id!(DispatchId);
content_id!(PersonId);
content_id!(MetahumanId);
content_id!(AchievementId);
content_id!(LegacyUpgradeId);
content_id!(
    /// A megaproject family. Exclusive families allow a single choice.
    FamilyId
);
content_id!(
    /// A boolean world flag set by effects and read by triggers.
    FlagId
);
