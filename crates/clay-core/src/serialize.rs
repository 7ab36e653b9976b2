//! Binary persistence for the world state.
//!
//! A snapshot is a versioned [`SnapshotHeader`] followed by the `bitcode`
//! payload of the [`WorldState`]. Loading validates the header, decodes, runs
//! save migrations, then rebuilds cached caps. JSON export/import for
//! human-readable saves sits behind the `json` feature.

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::migration::{MigrationError, MigrationRegistry};
use crate::state::WorldState;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Magic number identifying a Clay world snapshot.
pub const SNAPSHOT_MAGIC: u32 = 0xC1A7_0001;

/// Current wire format version. Increment when breaking the encoding itself;
/// schema changes go through the save version and migrations instead.
pub const FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Errors that can occur during serialization.
#[derive(Debug, thiserror::Error)]
pub enum SerializeError {
    #[error("bitcode encoding failed: {0}")]
    Encode(String),
    #[cfg(feature = "json")]
    #[error("json encoding failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Errors that can occur during deserialization.
#[derive(Debug, thiserror::Error)]
pub enum DeserializeError {
    #[error("invalid magic number: expected 0x{:08X}, got 0x{:08X}", SNAPSHOT_MAGIC, .0)]
    InvalidMagic(u32),
    #[error("unsupported format version: expected {}, got {}", FORMAT_VERSION, .0)]
    UnsupportedVersion(u32),
    #[error("snapshot from future format version {0} (this build supports up to {FORMAT_VERSION})")]
    FutureVersion(u32),
    #[error("bitcode decoding failed: {0}")]
    Decode(String),
    #[cfg(feature = "json")]
    #[error("json decoding failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Migration(#[from] MigrationError),
}

// ---------------------------------------------------------------------------
// Snapshot header
// ---------------------------------------------------------------------------

/// Header stored in front of every snapshot payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotHeader {
    /// Magic number for format detection.
    pub magic: u32,
    /// Wire format version.
    pub format_version: u32,
    /// Save schema version of the encoded world.
    pub save_version: u32,
    /// Simulation tick at the time the snapshot was taken.
    pub sim_tick: u64,
}

impl SnapshotHeader {
    pub fn new(state: &WorldState) -> Self {
        Self {
            magic: SNAPSHOT_MAGIC,
            format_version: FORMAT_VERSION,
            save_version: state.save_version,
            sim_tick: state.clock.tick,
        }
    }

    pub fn validate(&self) -> Result<(), DeserializeError> {
        if self.magic != SNAPSHOT_MAGIC {
            return Err(DeserializeError::InvalidMagic(self.magic));
        }
        if self.format_version > FORMAT_VERSION {
            return Err(DeserializeError::FutureVersion(self.format_version));
        }
        if self.format_version < FORMAT_VERSION {
            return Err(DeserializeError::UnsupportedVersion(self.format_version));
        }
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    header: SnapshotHeader,
    state: &'a WorldState,
}

#[derive(Deserialize)]
struct Snapshot {
    header: SnapshotHeader,
    state: WorldState,
}

// ---------------------------------------------------------------------------
// Binary
// ---------------------------------------------------------------------------

pub fn serialize(state: &WorldState) -> Result<Vec<u8>, SerializeError> {
    let snapshot = SnapshotRef {
        header: SnapshotHeader::new(state),
        state,
    };
    bitcode::serialize(&snapshot).map_err(|e| SerializeError::Encode(e.to_string()))
}

/// Read only the header. bitcode cannot decode a prefix, so this still
/// walks the whole buffer.
pub fn read_snapshot_header(data: &[u8]) -> Result<SnapshotHeader, DeserializeError> {
    let snapshot: Snapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    Ok(snapshot.header)
}

/// Decode without migrating. The returned world may be at an older save
/// version and its cached caps are stale.
pub fn deserialize_raw(data: &[u8]) -> Result<WorldState, DeserializeError> {
    let snapshot: Snapshot =
        bitcode::deserialize(data).map_err(|e| DeserializeError::Decode(e.to_string()))?;
    snapshot.header.validate()?;
    Ok(snapshot.state)
}

/// Decode, migrate to the current save version and rebuild caps.
pub fn deserialize(
    data: &[u8],
    catalog: &Catalog,
    registry: &MigrationRegistry,
) -> Result<WorldState, DeserializeError> {
    let mut state = deserialize_raw(data)?;
    registry.migrate(&mut state, catalog)?;
    tracing::debug!(tick = state.clock.tick, bytes = data.len(), "snapshot.loaded");
    Ok(state)
}

// ---------------------------------------------------------------------------
// JSON
// ---------------------------------------------------------------------------

#[cfg(feature = "json")]
pub fn to_json(state: &WorldState) -> Result<String, SerializeError> {
    Ok(serde_json::to_string_pretty(state)?)
}

/// Import a JSON save. Missing fields default, then migrations fill them in.
#[cfg(feature = "json")]
pub fn from_json(
    json: &str,
    catalog: &Catalog,
    registry: &MigrationRegistry,
) -> Result<WorldState, DeserializeError> {
    let mut state: WorldState = serde_json::from_str(json)?;
    registry.migrate(&mut state, catalog)?;
    Ok(state)
}
