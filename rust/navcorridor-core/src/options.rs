use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::SettingsError;

pub const DEFAULT_MAX_SIMPLIFICATIONS_PER_CALL: u32 = 3;
pub const DEFAULT_LOCAL_SEARCH_SLOTS_LOW: usize = 9;
pub const DEFAULT_LOCAL_SEARCH_SLOTS_HIGH: usize = 16;
/// Neighbours up to 5% further from the target than their parent are still explored.
pub const DEFAULT_LOCAL_SEARCH_SLACK: f64 = 1.05;
pub const DEFAULT_MAX_FAN_ITERATIONS: u32 = 32;
pub const DEFAULT_MAX_FUNNEL_ITERATIONS_FACTOR: u32 = 4;
pub const DEFAULT_FALLBACK_MAX_DISTANCE: f64 = 2.0;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracerSettings {
    pub simplify_corridor: bool,
    pub max_simplifications_per_call: u32,
    /// Extra cost a simplified run may have over the run it replaces.
    pub simplification_cost_tolerance: u32,

    pub local_search_slots_low: usize,
    pub local_search_slots_high: usize,
    pub local_search_slack: f64,

    pub max_fan_iterations: u32,
    /// Funnel restarts are capped at `(portals + 2) * (max_corners + 2) * factor`.
    pub max_funnel_iterations_factor: u32,

    /// How far the global nearest-node fallback may clamp an uncovered point.
    pub fallback_max_distance: f64,
}

impl Default for TracerSettings {
    fn default() -> Self {
        Self {
            simplify_corridor: true,
            max_simplifications_per_call: DEFAULT_MAX_SIMPLIFICATIONS_PER_CALL,
            simplification_cost_tolerance: 0,
            local_search_slots_low: DEFAULT_LOCAL_SEARCH_SLOTS_LOW,
            local_search_slots_high: DEFAULT_LOCAL_SEARCH_SLOTS_HIGH,
            local_search_slack: DEFAULT_LOCAL_SEARCH_SLACK,
            max_fan_iterations: DEFAULT_MAX_FAN_ITERATIONS,
            max_funnel_iterations_factor: DEFAULT_MAX_FUNNEL_ITERATIONS_FACTOR,
            fallback_max_distance: DEFAULT_FALLBACK_MAX_DISTANCE,
        }
    }
}

impl TracerSettings {
    pub fn from_json_str(s: &str) -> Result<Self, SettingsError> {
        let settings: Self = serde_json::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.local_search_slots_low == 0 || self.local_search_slots_high == 0 {
            return Err(SettingsError::Invalid("local search needs at least one slot".into()));
        }
        if !(self.local_search_slack >= 1.0 && self.local_search_slack.is_finite()) {
            return Err(SettingsError::Invalid(format!(
                "local_search_slack must be finite and >= 1, got {}",
                self.local_search_slack
            )));
        }
        if self.max_fan_iterations == 0 || self.max_funnel_iterations_factor == 0 {
            return Err(SettingsError::Invalid("iteration caps must be positive".into()));
        }
        if !(self.fallback_max_distance >= 0.0) {
            return Err(SettingsError::Invalid(format!(
                "fallback_max_distance must be >= 0, got {}",
                self.fallback_max_distance
            )));
        }
        Ok(())
    }

    pub fn local_search_slots(&self, quality: RepairQuality) -> usize {
        match quality {
            RepairQuality::Low => self.local_search_slots_low,
            RepairQuality::High => self.local_search_slots_high,
        }
    }
}

/// How much work a single start/end repair may spend.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RepairQuality {
    #[default]
    Low,
    High,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let s = TracerSettings::default();
        assert!(s.validate().is_ok());
        assert_eq!(s.max_simplifications_per_call, 3);
        assert_eq!(s.local_search_slots(RepairQuality::Low), 9);
        assert_eq!(s.local_search_slots(RepairQuality::High), 16);
    }

    #[test]
    fn deserializes_with_defaults_when_missing_fields() {
        let s = TracerSettings::from_json_str(r#"{ "simplify_corridor": false, "simplification_cost_tolerance": 50 }"#).unwrap();
        assert!(!s.simplify_corridor);
        assert_eq!(s.simplification_cost_tolerance, 50);
        assert_eq!(s.local_search_slack, DEFAULT_LOCAL_SEARCH_SLACK);
        assert_eq!(s.fallback_max_distance, DEFAULT_FALLBACK_MAX_DISTANCE);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let err = TracerSettings::from_json_str(r#"{ "local_search_slack": 0.5 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
        let err = TracerSettings::from_json_str(r#"{ "local_search_slots_low": 0 }"#).unwrap_err();
        assert!(matches!(err, SettingsError::Invalid(_)));
        let err = TracerSettings::from_json_str("{ not json").unwrap_err();
        assert!(matches!(err, SettingsError::Json(_)));
    }

    #[test]
    fn quality_uses_snake_case() {
        let q: RepairQuality = serde_json::from_str("\"high\"").unwrap();
        assert_eq!(q, RepairQuality::High);
    }
}
