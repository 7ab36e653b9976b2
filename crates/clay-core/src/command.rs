//! Command surface: the discrete operations a player performs between ticks.
//!
//! Each operation is validated against the world and catalog before it
//! touches anything; a rejected command leaves the state untouched and
//! reports a [`CommandError`] whose `Display` is the user-facing reason.
//! [`Command`] is the serializable mirror of the surface used by replays.

use serde::{Deserialize, Serialize};

use crate::id::*;
use crate::state::{GuidanceLevel, ProjectSource};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CommandError {
    #[error("Unknown {kind}: {id}")]
    Unknown { kind: &'static str, id: String },

    // Projects
    #[error("Locked by {0}")]
    FamilyLocked(String),
    #[error("Another Type II path already chosen")]
    FamilyAlreadyChosen,
    #[error("Project locked")]
    ProjectLocked,
    #[error("Project already completed")]
    ProjectCompleted,
    #[error("Project already active")]
    ProjectActive,
    #[error("Project already queued")]
    ProjectQueued,
    #[error("Project not found")]
    ProjectNotFound,
    #[error("No available crews")]
    NoAvailableCrew,
    #[error("Insufficient {0}")]
    Insufficient(String),

    // Buildings
    #[error("Building locked")]
    BuildingLocked,
    #[error("Out of bounds")]
    OutOfBounds,
    #[error("Tile occupied")]
    TileOccupied,
    #[error("Building not found")]
    BuildingNotFound,
    #[error("Max level reached")]
    MaxLevel,
    #[error("Upgrade already in progress")]
    UpgradeInProgress,

    // Contracts and dispatches
    #[error("Relationship too low")]
    RelationshipTooLow,
    #[error("Contract already active")]
    ContractActive,
    #[error("Contract locked")]
    ContractLocked,
    #[error("Dispatch locked")]
    DispatchLocked,
    #[error("Dispatch already active")]
    DispatchActive,
    #[error("Dispatch not ready")]
    DispatchNotReady,
    #[error("Dispatch not found")]
    DispatchNotFound,
    #[error("Cache empty")]
    CacheEmpty,

    // Policies and events
    #[error("Policy already active")]
    PolicyActive,
    #[error("Policy slot mismatch")]
    PolicySlotMismatch,
    #[error("Policy on cooldown")]
    PolicyCooldown,
    #[error("Policy locked by era")]
    PolicyLocked,
    #[error("No policy in slot")]
    PolicySlotEmpty,
    #[error("Event not pending")]
    EventNotPending,

    // People and prestige
    #[error("Already recruited")]
    AlreadyRecruited,
    #[error("Roster full")]
    RosterFull,
    #[error("Locked by era")]
    LockedByEra,
    #[error("Already owned")]
    AlreadyOwned,
    #[error("Insufficient legacy points")]
    InsufficientLegacyPoints,

    // Catalyst and shards
    #[error("Select an active project")]
    NoActiveProject,
    #[error("Catalyst locked")]
    CatalystLocked,
    #[error("Catalyst on cooldown")]
    CatalystCooldown,
    #[error("No Chrono Shards")]
    NoChronoShards,

    // Settings and clock
    #[error("Offline cap must be at least one day")]
    InvalidOfflineCap,
    #[error("No time travel warning pending")]
    NoTimeTravelPending,
}

impl CommandError {
    pub(crate) fn unknown(kind: &'static str, id: impl Into<String>) -> Self {
        Self::Unknown {
            kind,
            id: id.into(),
        }
    }
}

/// Either an active project or a queue entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProjectRef {
    Active(ProjectKey),
    Queued(u64),
}

/// Serializable form of every command-surface operation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Command {
    StartProject {
        project: ProjectId,
        source: ProjectSource,
    },
    QueueProject {
        project: ProjectId,
        source: ProjectSource,
    },
    CancelProject(ProjectRef),
    StartBuilding {
        building: BuildingId,
        x: i32,
        y: i32,
    },
    UpgradeBuilding(BuildingKey),
    StartContract(ContractId),
    StartDispatch(DispatchId),
    CollectDispatch(DispatchKey),
    CollectCache,
    SetPolicy {
        slot: PolicySlot,
        policy: Option<PolicyId>,
    },
    ResolveEventChoice {
        chain: ChainId,
        choice: ChoiceId,
    },
    RecruitPerson(PersonId),
    SetAutoPlannerEnabled(bool),
    SetAutoPlanTag {
        tag: String,
        enabled: bool,
    },
    SetAutoRenewContracts(bool),
    SetOfflineCapDays(u32),
    SetNotificationsEnabled(bool),
    SetColorblindMode(bool),
    SetGuidanceLevel(GuidanceLevel),
    Ascend {
        now: f64,
    },
    PurchaseLegacyUpgrade(LegacyUpgradeId),
    ActivateCatalyst(ProjectKey),
    UseChronoShard(ProjectKey),
    ResolveTimeTravel {
        allow: bool,
        now: f64,
    },
    GrantDomainPoints {
        domain: DomainId,
        points: u32,
    },
}

/// What a successful command produced, for callers that need the handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Done,
    Project(ProjectKey),
    Queued(u64),
    Building(BuildingKey),
    Dispatch(DispatchKey),
    LegacyGain(u32),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reasons_read_as_player_text() {
        assert_eq!(CommandError::NoAvailableCrew.to_string(), "No available crews");
        assert_eq!(
            CommandError::Insufficient("Food".into()).to_string(),
            "Insufficient Food"
        );
        assert_eq!(
            CommandError::FamilyLocked("the Type II choice".into()).to_string(),
            "Locked by the Type II choice"
        );
        assert_eq!(CommandError::CacheEmpty.to_string(), "Cache empty");
    }

    #[test]
    fn commands_round_trip_through_json() {
        let commands = vec![
            Command::StartBuilding {
                building: "farm".into(),
                x: 1,
                y: 2,
            },
            Command::SetPolicy {
                slot: "economy".into(),
                policy: None,
            },
            Command::CollectCache,
        ];
        let json = serde_json::to_string(&commands).unwrap();
        let back: Vec<Command> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, commands);
    }
}
