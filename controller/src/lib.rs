/*!
# CCD Acquisition & Thermal Controller

Safe control layer over a blocking, non-reentrant camera driver: a
session owning the driver handle, parameter validation, an explicit
acquisition state machine, readout into row-major frames, and cooler
control that runs alongside acquisition.

## Components

- [`DeviceSession`] - Driver lifecycle and the one lock serialising driver calls
- [`ConfigurationManager`] - Checked acquisition parameter setters
- [`AcquisitionStateMachine`] - configure, arm, start, wait, abort, retrieve
- [`ImageBufferManager`] - Readout buffers and frame reshaping
- [`ThermalController`] - Cooler on/off, target and temperature polling
- [`Camera`] - All of the above opened from a [`ControllerConfig`]
- [`SimulatedCamera`] - In-process driver for tests and dry runs

Every public operation returns a [`shared::Outcome`] carrying the value
(on success) and the normalised [`shared::StatusCode`].

## Usage

```no_run
use ccd_controller::{Camera, ControllerConfig, SimulatedCamera};
use std::sync::Arc;

ccd_controller::init_tracing();
let config = ControllerConfig::new();
let camera = Camera::open(Arc::new(SimulatedCamera::new()), &config)
    .into_result()
    .unwrap();
let frame = camera.acquire(&config.acquisition_config()).into_result().unwrap();
println!("{}x{} frame", frame.width(), frame.height());
```
*/

pub mod acquisition;
pub mod buffer;
pub mod camera;
pub mod config;
pub mod configuration;
pub mod driver;
pub mod session;
pub mod sim;
pub mod thermal;

pub use acquisition::{AcquisitionStateMachine, SessionState};
pub use buffer::{ImageBuffer, ImageBufferManager};
pub use camera::Camera;
pub use config::ControllerConfig;
pub use configuration::ConfigurationManager;
pub use driver::{RawStatus, VendorApi};
pub use session::{DeviceSession, SessionHandle};
pub use sim::SimulatedCamera;
pub use thermal::ThermalController;

/// Install a stderr `tracing` subscriber. Later calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_writer(std::io::stderr).try_init();
}
