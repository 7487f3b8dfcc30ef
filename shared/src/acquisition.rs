/*!
Acquisition parameters.

[`AcquisitionConfig`] is built incrementally; it only becomes usable for
arming once [`AcquisitionConfig::is_complete`] holds. Numeric checks that
do not need the hardware live here, range checks against hardware
limits live in the controller.
*/

use crate::geometry::ImageRegion;
use crate::status::StatusCode;
use serde::{Deserialize, Serialize};

/// Sensor readout pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    FullVerticalBinning,
    MultiTrack,
    RandomTrack,
    SingleTrack,
    FullImage,
}

impl ReadMode {
    /// Driver value for this mode
    pub fn raw(self) -> i32 {
        match self {
            Self::FullVerticalBinning => 0,
            Self::MultiTrack => 1,
            Self::RandomTrack => 2,
            Self::SingleTrack => 3,
            Self::FullImage => 4,
        }
    }
}

/// How many exposures one acquisition takes and how they are combined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcquisitionMode {
    SingleScan,
    Accumulate,
    KineticSeries,
    FastKinetics,
    RunTillAbort,
}

impl AcquisitionMode {
    /// Driver value for this mode
    pub fn raw(self) -> i32 {
        match self {
            Self::SingleScan => 1,
            Self::Accumulate => 2,
            Self::KineticSeries => 3,
            Self::FastKinetics => 4,
            Self::RunTillAbort => 5,
        }
    }

    /// Whether the kinetic count sets the number of frames read out.
    pub fn is_series(self) -> bool {
        matches!(self, Self::KineticSeries | Self::FastKinetics)
    }
}

/// Mechanical shutter behaviour during an exposure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutterMode {
    #[default]
    Auto,
    Open,
    Closed,
}

impl ShutterMode {
    pub fn raw(self) -> i32 {
        match self {
            Self::Auto => 0,
            Self::Open => 1,
            Self::Closed => 2,
        }
    }
}

/// Requested acquisition parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionConfig {
    pub read_mode: Option<ReadMode>,
    pub acquisition_mode: Option<AcquisitionMode>,
    pub exposure_time_s: Option<f32>,
    pub kinetic_count: u32,
    pub kinetic_cycle_time_s: f32,
    /// Readout region; the full detector when unset.
    pub region: Option<ImageRegion>,
    pub shutter: ShutterMode,
}

impl Default for AcquisitionConfig {
    fn default() -> Self {
        Self {
            read_mode: None,
            acquisition_mode: None,
            exposure_time_s: None,
            kinetic_count: 1,
            kinetic_cycle_time_s: 0.0,
            region: None,
            shutter: ShutterMode::Auto,
        }
    }
}

impl AcquisitionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full-image single exposure.
    pub fn single(exposure_time_s: f32) -> Self {
        Self::new()
            .with_read_mode(ReadMode::FullImage)
            .with_acquisition_mode(AcquisitionMode::SingleScan)
            .with_exposure_time(exposure_time_s)
    }

    /// Kinetic series of `count` full-image exposures.
    pub fn series(count: u32, exposure_time_s: f32) -> Self {
        Self::new()
            .with_read_mode(ReadMode::FullImage)
            .with_acquisition_mode(AcquisitionMode::KineticSeries)
            .with_exposure_time(exposure_time_s)
            .with_kinetic_count(count)
    }

    /// Continuous run-till-abort at 0.3 s per frame.
    pub fn real_time() -> Self {
        Self::new()
            .with_read_mode(ReadMode::FullImage)
            .with_acquisition_mode(AcquisitionMode::RunTillAbort)
            .with_exposure_time(0.3)
            .with_kinetic_cycle_time(0.0)
    }

    /// Zero-length exposure with the shutter held closed.
    pub fn bias() -> Self {
        Self::single(0.0).with_shutter(ShutterMode::Closed)
    }

    pub fn with_read_mode(mut self, mode: ReadMode) -> Self {
        self.read_mode = Some(mode);
        self
    }

    pub fn with_acquisition_mode(mut self, mode: AcquisitionMode) -> Self {
        self.acquisition_mode = Some(mode);
        self
    }

    pub fn with_exposure_time(mut self, seconds: f32) -> Self {
        self.exposure_time_s = Some(seconds);
        self
    }

    pub fn with_kinetic_count(mut self, count: u32) -> Self {
        self.kinetic_count = count;
        self
    }

    pub fn with_kinetic_cycle_time(mut self, seconds: f32) -> Self {
        self.kinetic_cycle_time_s = seconds;
        self
    }

    pub fn with_region(mut self, region: ImageRegion) -> Self {
        self.region = Some(region);
        self
    }

    pub fn with_shutter(mut self, shutter: ShutterMode) -> Self {
        self.shutter = shutter;
        self
    }

    /// All required fields are set.
    pub fn is_complete(&self) -> bool {
        self.read_mode.is_some() && self.acquisition_mode.is_some() && self.exposure_time_s.is_some()
    }

    /// Frames produced by one acquisition.
    pub fn frames_per_acquisition(&self) -> usize {
        match self.acquisition_mode {
            Some(mode) if mode.is_series() => self.kinetic_count as usize,
            _ => 1,
        }
    }

    /// Check the values that are invalid regardless of hardware.
    pub fn check_values(&self) -> Result<(), StatusCode> {
        if let Some(exposure) = self.exposure_time_s {
            check_seconds(exposure)?;
        }
        check_seconds(self.kinetic_cycle_time_s)?;
        if self.kinetic_count == 0 {
            return Err(StatusCode::InvalidArgument);
        }
        Ok(())
    }
}

/// Durations must be finite and non-negative.
pub fn check_seconds(seconds: f32) -> Result<(), StatusCode> {
    if seconds.is_finite() && seconds >= 0.0 {
        Ok(())
    } else {
        Err(StatusCode::InvalidArgument)
    }
}

/// Timings the hardware actually settled on after configuration.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AcquisitionTimings {
    pub exposure_s: f32,
    pub accumulate_s: f32,
    pub kinetic_s: f32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_completeness() {
        let config = AcquisitionConfig::new();
        assert!(!config.is_complete());

        let config = config.with_read_mode(ReadMode::FullImage).with_acquisition_mode(AcquisitionMode::SingleScan);
        assert!(!config.is_complete());

        assert!(config.with_exposure_time(0.1).is_complete());
    }

    #[test]
    fn test_presets() {
        let bias = AcquisitionConfig::bias();
        assert_eq!(bias.exposure_time_s, Some(0.0));
        assert_eq!(bias.shutter, ShutterMode::Closed);

        let series = AcquisitionConfig::series(5, 0.2);
        assert_eq!(series.frames_per_acquisition(), 5);

        let real_time = AcquisitionConfig::real_time();
        assert_eq!(real_time.acquisition_mode, Some(AcquisitionMode::RunTillAbort));
        assert_eq!(real_time.frames_per_acquisition(), 1);
    }

    #[test]
    fn test_value_checks() {
        assert!(AcquisitionConfig::single(0.1).check_values().is_ok());
        assert_eq!(AcquisitionConfig::single(-1.0).check_values(), Err(StatusCode::InvalidArgument));
        assert_eq!(AcquisitionConfig::single(f32::NAN).check_values(), Err(StatusCode::InvalidArgument));
        assert_eq!(
            AcquisitionConfig::series(0, 0.1).check_values(),
            Err(StatusCode::InvalidArgument)
        );
        assert_eq!(
            AcquisitionConfig::single(0.1).with_kinetic_cycle_time(-0.5).check_values(),
            Err(StatusCode::InvalidArgument)
        );
    }

    #[test]
    fn test_driver_values() {
        assert_eq!(ReadMode::FullImage.raw(), 4);
        assert_eq!(AcquisitionMode::SingleScan.raw(), 1);
        assert_eq!(AcquisitionMode::RunTillAbort.raw(), 5);
        assert_eq!(ShutterMode::Closed.raw(), 2);
    }
}
