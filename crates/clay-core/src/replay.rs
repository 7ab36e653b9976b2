//! Replay recording and playback.
//!
//! Records every input applied to an engine, starting from a serialized
//! snapshot. Playing the log back reproduces the exact same world, with
//! optional hash verification at checkpoints.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::command::{Command, CommandError};
use crate::config::EngineConfig;
use crate::engine::Engine;
use crate::migration::MigrationRegistry;
use crate::serialize::{self, DeserializeError, SerializeError};

/// One recorded input.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ReplayInput {
    Advance { elapsed: f64, now: f64, offline: bool },
    Command(Command),
}

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error(transparent)]
    Snapshot(#[from] DeserializeError),
    #[error("replay log decoding failed: {0}")]
    Decode(String),
    #[error("input {index}: state hash {actual:#018x} does not match recorded {expected:#018x}")]
    HashMismatch { index: usize, expected: u64, actual: u64 },
    /// A command that succeeded while recording was rejected on playback.
    #[error("input {index}: command rejected on playback: {source}")]
    CommandRejected {
        index: usize,
        #[source]
        source: CommandError,
    },
}

/// A recorded sequence of inputs starting from a snapshot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplayLog {
    /// Serialized world at the start of recording.
    pub initial_snapshot: Vec<u8>,
    pub inputs: Vec<ReplayInput>,
    /// (input index, state hash after that input).
    pub hash_checkpoints: Vec<(usize, u64)>,
}

impl ReplayLog {
    /// Capture the engine's current world as the starting point.
    pub fn new(engine: &Engine) -> Result<Self, SerializeError> {
        Ok(Self {
            initial_snapshot: serialize::serialize(engine.state())?,
            inputs: Vec::new(),
            hash_checkpoints: Vec::new(),
        })
    }

    pub fn record(&mut self, input: ReplayInput) {
        self.inputs.push(input);
    }

    pub fn record_with_hash(&mut self, input: ReplayInput, hash: u64) {
        self.hash_checkpoints.push((self.inputs.len(), hash));
        self.inputs.push(input);
    }

    pub fn input_count(&self) -> usize {
        self.inputs.len()
    }

    pub fn serialize(&self) -> Result<Vec<u8>, SerializeError> {
        bitcode::serialize(self).map_err(|e| SerializeError::Encode(e.to_string()))
    }

    pub fn deserialize(data: &[u8]) -> Result<Self, ReplayError> {
        bitcode::deserialize(data).map_err(|e| ReplayError::Decode(e.to_string()))
    }
}

/// Record-as-you-go wrapper: applies each input to the engine and logs it
/// with a hash checkpoint.
#[derive(Debug)]
pub struct Recorder {
    pub engine: Engine,
    pub log: ReplayLog,
}

impl Recorder {
    pub fn new(engine: Engine) -> Result<Self, SerializeError> {
        let log = ReplayLog::new(&engine)?;
        Ok(Self { engine, log })
    }

    pub fn advance(&mut self, elapsed: f64, now: f64, offline: bool) {
        self.engine.advance(elapsed, now, offline);
        let hash = self.engine.state_hash();
        self.log
            .record_with_hash(ReplayInput::Advance { elapsed, now, offline }, hash);
    }

    /// Apply and record a command. Rejected commands are not recorded.
    pub fn execute(&mut self, command: Command) -> Result<(), CommandError> {
        self.engine.execute(&command)?;
        let hash = self.engine.state_hash();
        self.log.record_with_hash(ReplayInput::Command(command), hash);
        Ok(())
    }
}

/// Play `log` back and stop at the first checkpoint mismatch.
pub fn replay(
    log: &ReplayLog,
    catalog: Arc<Catalog>,
    config: EngineConfig,
) -> Result<Engine, ReplayError> {
    let state = serialize::deserialize(&log.initial_snapshot, &catalog, &MigrationRegistry::default())?;
    let mut engine = Engine::with_state(catalog, config, state);
    let mut checkpoints = log.hash_checkpoints.iter().peekable();

    for (index, input) in log.inputs.iter().enumerate() {
        match input {
            ReplayInput::Advance { elapsed, now, offline } => {
                engine.advance(*elapsed, *now, *offline);
            }
            ReplayInput::Command(command) => {
                engine
                    .execute(command)
                    .map_err(|source| ReplayError::CommandRejected { index, source })?;
            }
        }
        while let Some(&&(at, expected)) = checkpoints.peek() {
            if at != index {
                break;
            }
            checkpoints.next();
            let actual = engine.state_hash();
            if actual != expected {
                return Err(ReplayError::HashMismatch {
                    index,
                    expected,
                    actual,
                });
            }
        }
    }
    tracing::debug!(inputs = log.inputs.len(), "replay.verified");
    Ok(engine)
}
