//! Simulation clock and advance bookkeeping.
//!
//! Elapsed time is fed into an accumulator and consumed in fixed steps; any
//! remainder carries over to the next call. Because every step has the same
//! length, splitting one long advance into many short ones runs exactly the
//! same sequence of steps.

use crate::guidance::Alert;

// ---------------------------------------------------------------------------
// Simulation clock
// ---------------------------------------------------------------------------

/// Simulated time tracked inside the world state.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct SimClock {
    /// Number of fixed steps executed since the world was created.
    pub tick: u64,

    /// Simulated seconds since the world was created. All in-game timers
    /// (cooldowns, catalyst windows, disabled-until) are expressed on this
    /// axis, never in wall-clock time.
    pub seconds: f64,

    /// Elapsed time not yet consumed by a full step.
    pub accumulator: f64,
}

impl SimClock {
    /// Add elapsed time and return how many whole steps are now due.
    pub fn accumulate(&mut self, elapsed: f64, step: f64) -> u64 {
        if elapsed > 0.0 {
            self.accumulator += elapsed;
        }
        if step <= 0.0 || self.accumulator < step {
            return 0;
        }
        let steps = (self.accumulator / step).floor();
        self.accumulator -= steps * step;
        steps as u64
    }

    /// Record one completed step.
    pub fn advance_step(&mut self, step: f64) {
        self.tick += 1;
        self.seconds += step;
    }

    /// Index of the simulated hour the clock is currently in.
    pub fn hour(&self) -> u64 {
        (self.seconds / 3600.0).floor() as u64
    }
}

// ---------------------------------------------------------------------------
// Advance report
// ---------------------------------------------------------------------------

/// Result of an `Engine::advance()` call.
#[derive(Debug, Default, Clone)]
pub struct AdvanceReport {
    /// Number of fixed steps actually executed.
    pub steps_run: u64,

    /// Seconds of simulated time covered by those steps.
    pub seconds_simulated: f64,

    /// Offline seconds dropped because they exceeded the offline cap.
    pub seconds_discarded: f64,

    /// True when ticking was refused because of a clock anomaly.
    pub suspended: bool,

    /// Number of event-log entries written during the call.
    pub events_logged: usize,

    /// Milestone alerts raised (online advances only).
    pub alerts: Vec<Alert>,
}

// ---------------------------------------------------------------------------
// State hash
// ---------------------------------------------------------------------------

/// A simple deterministic hash of simulation state for desync detection.
///
/// Uses FNV-1a (64-bit) for speed and simplicity. Not cryptographic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StateHash(pub u64);

impl StateHash {
    const FNV_OFFSET: u64 = 0xcbf29ce484222325;
    const FNV_PRIME: u64 = 0x100000001b3;

    /// Start a new hash.
    pub fn new() -> Self {
        Self(Self::FNV_OFFSET)
    }

    /// Feed bytes into the hash.
    pub fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 ^= b as u64;
            self.0 = self.0.wrapping_mul(Self::FNV_PRIME);
        }
    }

    pub fn write_u64(&mut self, v: u64) {
        self.write(&v.to_le_bytes());
    }

    /// Feed an `f64` by its bit pattern.
    pub fn write_f64(&mut self, v: f64) {
        self.write(&v.to_bits().to_le_bytes());
    }

    /// Finalize and return the hash value.
    pub fn finish(self) -> u64 {
        self.0
    }
}

impl Default for StateHash {
    fn default() -> Self {
        Self::new()
    }
}

/// Hash any serializable value through its bitcode encoding.
pub fn hash_encoded<T: serde::Serialize + ?Sized>(value: &T) -> u64 {
    let mut h = StateHash::new();
    match bitcode::serialize(value) {
        Ok(bytes) => h.write(&bytes),
        Err(err) => tracing::warn!(error = %err, "hash.encode_failed"),
    }
    h.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulate_runs_whole_steps_and_carries_remainder() {
        let mut clock = SimClock::default();
        assert_eq!(clock.accumulate(2.5, 1.0), 2);
        assert_eq!(clock.accumulator, 0.5);
        assert_eq!(clock.accumulate(0.5, 1.0), 1);
        assert_eq!(clock.accumulator, 0.0);
    }

    #[test]
    fn accumulate_ignores_negative_elapsed() {
        let mut clock = SimClock::default();
        assert_eq!(clock.accumulate(-10.0, 1.0), 0);
        assert_eq!(clock.accumulator, 0.0);
    }

    #[test]
    fn chunked_accumulation_matches_single() {
        let mut one = SimClock::default();
        let mut many = SimClock::default();
        let total = one.accumulate(3600.0, 1.0);
        let split: u64 = (0..60).map(|_| many.accumulate(60.0, 1.0)).sum();
        assert_eq!(total, split);
        assert_eq!(one.accumulator, many.accumulator);
    }

    #[test]
    fn hour_index_tracks_seconds() {
        let mut clock = SimClock::default();
        for _ in 0..3600 {
            clock.advance_step(1.0);
        }
        assert_eq!(clock.hour(), 1);
        assert_eq!(clock.tick, 3600);
    }

    #[test]
    fn hash_deterministic() {
        let mut a = StateHash::new();
        a.write_u64(42);
        a.write_f64(0.5);
        let mut b = StateHash::new();
        b.write_u64(42);
        b.write_f64(0.5);
        assert_eq!(a.finish(), b.finish());
    }

    #[test]
    fn hash_sensitive_to_order() {
        let mut a = StateHash::new();
        a.write_u64(1);
        a.write_u64(2);
        let mut b = StateHash::new();
        b.write_u64(2);
        b.write_u64(1);
        assert_ne!(a.finish(), b.finish());
    }
}
