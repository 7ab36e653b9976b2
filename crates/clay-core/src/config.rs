//! Engine tuning constants.
//!
//! These are simulation coefficients rather than content: they shape the
//! curves every content pack runs through. Hosts may load them from TOML or
//! RON; every field falls back to its default when omitted.

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("step_seconds must be positive, got {0}")]
    NonPositiveStep(f64),
    #[error("logistics_floor must be in (0, 1], got {0}")]
    LogisticsFloor(f64),
    #[error("{field}: min {min} exceeds max {max}")]
    InvertedRange {
        field: &'static str,
        min: f64,
        max: f64,
    },
    #[error("{field} must not be negative, got {value}")]
    Negative { field: &'static str, value: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Length of one fixed simulation step in seconds.
    pub step_seconds: f64,

    pub logistics_base_capacity: f64,
    /// Lowest value the logistics factor may fall to.
    pub logistics_floor: f64,

    /// Ceiling of the raid-chance sigmoid, per hour.
    pub raid_base_rate: f64,
    pub raid_steepness: f64,
    /// Fraction of every stockpile a raid takes before security mitigation.
    pub raid_theft_fraction: f64,
    /// Security stops mitigating theft beyond this value.
    pub raid_security_cap: f64,
    /// Table raids below this hourly chance are averted.
    pub raid_avert_threshold: f64,

    pub market_reversion: f64,
    pub market_shock: f64,
    pub market_min: f64,
    pub market_max: f64,
    /// Index drop applied by a market-shock event.
    pub market_shock_event_delta: f64,

    pub event_gap_min: f64,
    pub event_gap_max: f64,
    pub initial_event_gap_min: f64,
    pub initial_event_gap_max: f64,
    /// Offline events generated in a single advance before a summary entry is logged.
    pub offline_summary_threshold: u32,
    pub event_log_cap: usize,
    pub infrastructure_failure_seconds: f64,

    pub contract_renew_window_seconds: f64,
    pub clock_skew_tolerance_seconds: f64,

    pub catalyst_boost_seconds: f64,
    pub catalyst_bonus: f64,
    pub catalyst_cooldown_seconds: f64,
    pub catalyst_cooldown_per_level: f64,
    pub chrono_shard_seconds: f64,

    pub alert_cooldown_seconds: f64,
    pub raid_cohesion_penalty: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            step_seconds: 1.0,
            logistics_base_capacity: 100.0,
            logistics_floor: 0.05,
            raid_base_rate: 0.3,
            raid_steepness: 4.0,
            raid_theft_fraction: 0.08,
            raid_security_cap: 0.7,
            raid_avert_threshold: 0.02,
            market_reversion: 0.1,
            market_shock: 0.04,
            market_min: 0.6,
            market_max: 1.4,
            market_shock_event_delta: 0.1,
            event_gap_min: 4_800.0,
            event_gap_max: 12_000.0,
            initial_event_gap_min: 5_000.0,
            initial_event_gap_max: 12_000.0,
            offline_summary_threshold: 20,
            event_log_cap: 200,
            infrastructure_failure_seconds: 1_800.0,
            contract_renew_window_seconds: 3_600.0,
            clock_skew_tolerance_seconds: 60.0,
            catalyst_boost_seconds: 3_600.0,
            catalyst_bonus: 0.75,
            catalyst_cooldown_seconds: 86_400.0,
            catalyst_cooldown_per_level: 3_600.0,
            chrono_shard_seconds: 3_600.0,
            alert_cooldown_seconds: 3_600.0,
            raid_cohesion_penalty: 0.03,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.step_seconds > 0.0) {
            return Err(ConfigError::NonPositiveStep(self.step_seconds));
        }
        if !(self.logistics_floor > 0.0 && self.logistics_floor <= 1.0) {
            return Err(ConfigError::LogisticsFloor(self.logistics_floor));
        }
        let ranges = [
            ("market", self.market_min, self.market_max),
            ("event_gap", self.event_gap_min, self.event_gap_max),
            (
                "initial_event_gap",
                self.initial_event_gap_min,
                self.initial_event_gap_max,
            ),
        ];
        for (field, min, max) in ranges {
            if min > max {
                return Err(ConfigError::InvertedRange { field, min, max });
            }
        }
        let non_negative = [
            ("raid_base_rate", self.raid_base_rate),
            ("raid_theft_fraction", self.raid_theft_fraction),
            ("market_shock", self.market_shock),
            ("contract_renew_window_seconds", self.contract_renew_window_seconds),
            ("clock_skew_tolerance_seconds", self.clock_skew_tolerance_seconds),
            ("alert_cooldown_seconds", self.alert_cooldown_seconds),
        ];
        for (field, value) in non_negative {
            if value < 0.0 {
                return Err(ConfigError::Negative { field, value });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_valid() {
        assert_eq!(EngineConfig::default().validate(), Ok(()));
    }

    #[test]
    fn rejects_zero_step() {
        let config = EngineConfig {
            step_seconds: 0.0,
            ..EngineConfig::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveStep(0.0)));
    }

    #[test]
    fn rejects_inverted_gap() {
        let config = EngineConfig {
            event_gap_min: 10.0,
            event_gap_max: 5.0,
            ..EngineConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvertedRange { field: "event_gap", .. })
        ));
    }

    #[test]
    fn rejects_floor_outside_unit_interval() {
        let config = EngineConfig {
            logistics_floor: 0.0,
            ..EngineConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::LogisticsFloor(_))));
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: EngineConfig = serde_json::from_str(r#"{"logistics_floor": 0.1}"#).unwrap();
        assert_eq!(config.logistics_floor, 0.1);
        assert_eq!(config.step_seconds, 1.0);
    }
}
