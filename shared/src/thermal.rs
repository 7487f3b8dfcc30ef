/*!
Thermoelectric cooler types.
*/

use serde::{Deserialize, Serialize};

/// Temperatures the cooler can be set to, inclusive, in whole degrees C.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemperatureRange {
    pub min_c: i32,
    pub max_c: i32,
}

impl TemperatureRange {
    pub fn contains(&self, celsius: i32) -> bool {
        (self.min_c..=self.max_c).contains(&celsius)
    }
}

/// Snapshot of the cooler. The current temperature is read from hardware on
/// every query; target and enable state are what this controller last commanded.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ThermalState {
    pub current_temperature_c: f32,
    pub target_temperature_c: f32,
    pub min_c: i32,
    pub max_c: i32,
    pub cooler_enabled: bool,
}

/// Cooling fan speed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FanMode {
    #[default]
    Full,
    Low,
    Off,
}

impl FanMode {
    pub fn raw(self) -> i32 {
        match self {
            Self::Full => 0,
            Self::Low => 1,
            Self::Off => 2,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_is_inclusive() {
        let range = TemperatureRange { min_c: -80, max_c: 50 };
        assert!(range.contains(-80));
        assert!(range.contains(50));
        assert!(range.contains(0));
        assert!(!range.contains(-81));
        assert!(!range.contains(51));
    }
}
