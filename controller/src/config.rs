/*!
Configuration management for the controller.
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use shared::driver::DEFAULT_CONFIG_DIR;
use shared::{AcquisitionConfig, AcquisitionMode, FanMode, ReadMode, ShutterMode};
use std::path::Path;
use std::time::Duration;

/// Main controller configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ControllerConfig {
    pub driver: DriverConfig,
    pub acquisition: AcquisitionDefaults,
    pub thermal: ThermalConfig,
}

impl ControllerConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: ControllerConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config file as TOML")?;

        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self).with_context(|| "Failed to serialize config to TOML")?;

        std::fs::write(path.as_ref(), content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;

        Ok(())
    }

    /// Acquisition parameters described by the `[acquisition]` table
    pub fn acquisition_config(&self) -> AcquisitionConfig {
        let defaults = &self.acquisition;
        AcquisitionConfig::new()
            .with_read_mode(defaults.read_mode)
            .with_acquisition_mode(defaults.acquisition_mode)
            .with_exposure_time(defaults.exposure_time_s)
            .with_kinetic_count(defaults.kinetic_count)
            .with_kinetic_cycle_time(defaults.kinetic_cycle_time_s)
            .with_shutter(defaults.shutter)
    }
}

/// Driver settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Directory holding the driver's detector configuration files
    pub config_dir: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            config_dir: DEFAULT_CONFIG_DIR.to_string(),
        }
    }
}

/// Acquisition parameters applied when nothing else is requested
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AcquisitionDefaults {
    pub read_mode: ReadMode,
    pub acquisition_mode: AcquisitionMode,

    /// Exposure time in seconds
    pub exposure_time_s: f32,

    /// Frames per kinetic series
    pub kinetic_count: u32,

    /// Kinetic cycle time in seconds
    pub kinetic_cycle_time_s: f32,

    pub shutter: ShutterMode,

    /// How long a single wait blocks before reporting a timeout
    pub wait_timeout_ms: u64,
}

impl AcquisitionDefaults {
    pub fn wait_timeout(&self) -> Duration {
        Duration::from_millis(self.wait_timeout_ms)
    }
}

impl Default for AcquisitionDefaults {
    fn default() -> Self {
        Self {
            read_mode: ReadMode::FullImage,
            acquisition_mode: AcquisitionMode::SingleScan,
            exposure_time_s: 0.1,
            kinetic_count: 1,
            kinetic_cycle_time_s: 0.0,
            shutter: ShutterMode::Auto,
            wait_timeout_ms: 5000,
        }
    }
}

/// Cooler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThermalConfig {
    /// Target sensor temperature in whole degrees C
    pub target_c: i32,

    /// Switch the cooler on as soon as the session opens
    pub cooler_on_open: bool,

    pub fan_mode: FanMode,
}

impl Default for ThermalConfig {
    fn default() -> Self {
        Self {
            target_c: -10,
            cooler_on_open: true,
            fan_mode: FanMode::Full,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_config_roundtrip() {
        let mut original_config = ControllerConfig::new();
        original_config.acquisition.acquisition_mode = AcquisitionMode::KineticSeries;
        original_config.acquisition.kinetic_count = 10;
        original_config.thermal.fan_mode = FanMode::Low;

        let temp_file = NamedTempFile::new().unwrap();
        let temp_path = temp_file.path();

        // Save and load
        original_config.save_to_file(temp_path).unwrap();
        let loaded_config = ControllerConfig::load_from_file(temp_path).unwrap();

        assert_eq!(original_config, loaded_config);
    }

    #[test]
    fn test_default_values() {
        let config = ControllerConfig::new();

        assert_eq!(config.driver.config_dir, "/usr/local/etc/andor");

        assert_eq!(config.acquisition.read_mode, ReadMode::FullImage);
        assert_eq!(config.acquisition.acquisition_mode, AcquisitionMode::SingleScan);
        assert_eq!(config.acquisition.exposure_time_s, 0.1);
        assert_eq!(config.acquisition.kinetic_count, 1);
        assert_eq!(config.acquisition.shutter, ShutterMode::Auto);
        assert_eq!(config.acquisition.wait_timeout(), Duration::from_secs(5));

        assert_eq!(config.thermal.target_c, -10);
        assert!(config.thermal.cooler_on_open);
        assert_eq!(config.thermal.fan_mode, FanMode::Full);
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut temp_file = NamedTempFile::new().unwrap();
        writeln!(
            temp_file,
            "[acquisition]\nexposure_time_s = 2.5\nshutter = \"closed\"\n\n[thermal]\ntarget_c = -60"
        )
        .unwrap();

        let config = ControllerConfig::load_from_file(temp_file.path()).unwrap();
        assert_eq!(config.acquisition.exposure_time_s, 2.5);
        assert_eq!(config.acquisition.shutter, ShutterMode::Closed);
        assert_eq!(config.acquisition.read_mode, ReadMode::FullImage);
        assert_eq!(config.thermal.target_c, -60);
        assert_eq!(config.driver, DriverConfig::default());
    }

    #[test]
    fn test_unreadable_file_reports_path() {
        let err = ControllerConfig::load_from_file("/nonexistent/controller.toml").unwrap_err();
        assert!(err.to_string().contains("/nonexistent/controller.toml"));
    }

    #[test]
    fn test_acquisition_config_is_complete() {
        let config = ControllerConfig::new().acquisition_config();
        assert!(config.is_complete());
        assert_eq!(config, AcquisitionConfig::single(0.1));
    }
}
