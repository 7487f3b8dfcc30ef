/*!
# Shared Types and Utilities

This crate contains the data types shared by the detector controller
components: status codes and their translation, the outcome envelope,
geometry, frames, and acquisition and cooler parameters.

## Core Types

- [`StatusCode`] - Normalised status taxonomy
- [`Outcome`] - Value plus status returned by every controller operation
- [`DetectorGeometry`] / [`ImageRegion`] - Sensor size and readout area
- [`ImageFrame`] - Row-major image readout
- [`AcquisitionConfig`] - Acquisition parameters
- [`ThermalState`] - Cooler snapshot

## Modules

- [`status`] - Raw driver codes and the translator
- [`outcome`] - Outcome envelope
- [`geometry`] - Detector and region geometry
- [`frame`] - Image frames
- [`acquisition`] - Acquisition parameters
- [`thermal`] - Cooler types
- [`error`] - Common error types
*/

pub mod acquisition;
pub mod error;
pub mod frame;
pub mod geometry;
pub mod outcome;
pub mod status;
pub mod thermal;

// Re-export commonly used types
pub use acquisition::{AcquisitionConfig, AcquisitionMode, AcquisitionTimings, ReadMode, ShutterMode};
pub use error::{Result, SharedError};
pub use frame::{ImageFrame, Sample};
pub use geometry::{DetectorGeometry, FrameGeometry, ImageRegion};
pub use outcome::Outcome;
pub use status::{translate, StatusCode};
pub use thermal::{FanMode, TemperatureRange, ThermalState};

/// Version information for the shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Driver constants
pub mod driver {
    /// Default driver configuration directory
    pub const DEFAULT_CONFIG_DIR: &str = "/usr/local/etc/andor";

    /// Shutter control signal type (TTL high opens)
    pub const SHUTTER_TTL_HIGH: i32 = 1;

    /// Shutter opening and closing time in milliseconds
    pub const SHUTTER_TRANSFER_MS: i32 = 50;

    /// Placeholder for a temperature that has not been read or commanded
    pub const TEMPERATURE_UNSET_C: f32 = -999.0;
}
