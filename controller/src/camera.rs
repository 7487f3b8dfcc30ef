/*!
One open camera with all of its components wired to a single session.
*/

use crate::acquisition::AcquisitionStateMachine;
use crate::config::ControllerConfig;
use crate::configuration::ConfigurationManager;
use crate::driver::VendorApi;
use crate::session::DeviceSession;
use crate::thermal::ThermalController;
use shared::{AcquisitionConfig, ImageFrame, Outcome, StatusCode};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub struct Camera {
    session: DeviceSession,
    configuration: ConfigurationManager,
    acquisition: AcquisitionStateMachine,
    thermal: ThermalController,
    wait_timeout: Duration,
}

impl Camera {
    /// Open the driver and apply the cooler settings from `config`.
    ///
    /// A cooler failure is logged but does not keep the camera from opening.
    pub fn open(api: Arc<dyn VendorApi>, config: &ControllerConfig) -> Outcome<Camera> {
        let mut session = DeviceSession::new(api);
        let handle = match session.open(&config.driver.config_dir).into_result() {
            Ok(handle) => handle,
            Err(code) => return Outcome::failure(code),
        };

        let camera = Camera {
            configuration: ConfigurationManager::new(handle.clone()),
            acquisition: AcquisitionStateMachine::new(handle.clone()),
            thermal: ThermalController::new(handle),
            wait_timeout: config.acquisition.wait_timeout(),
            session,
        };

        let thermal = &config.thermal;
        for (step, outcome) in [
            ("fan mode", camera.thermal.set_fan_mode(thermal.fan_mode)),
            ("target temperature", camera.thermal.set_target(thermal.target_c as f32)),
        ] {
            if !outcome.is_success() {
                warn!(step, code = ?outcome.code(), "cooler setup failed");
            }
        }
        if thermal.cooler_on_open {
            let outcome = camera.thermal.cooler_on();
            if !outcome.is_success() {
                warn!(code = ?outcome.code(), "could not switch cooler on");
            }
        }

        info!("📷 Camera ready");
        Outcome::success(camera)
    }

    pub fn configuration(&self) -> &ConfigurationManager {
        &self.configuration
    }

    pub fn acquisition(&self) -> &AcquisitionStateMachine {
        &self.acquisition
    }

    pub fn thermal(&self) -> &ThermalController {
        &self.thermal
    }

    /// One full cycle: configure, arm, start, wait once, retrieve.
    ///
    /// A wait that times out is reported as `Timeout` with the acquisition
    /// left running, so the caller can wait again through
    /// [`Camera::acquisition`].
    pub fn acquire(&self, config: &AcquisitionConfig) -> Outcome<ImageFrame> {
        let machine = &self.acquisition;
        let result = machine
            .configure(config)
            .into_result()
            .and_then(|()| machine.arm().into_result())
            .and_then(|()| machine.start().into_result())
            .and_then(|()| machine.wait(self.wait_timeout).into_result())
            .and_then(|()| machine.retrieve().into_result());
        result.into()
    }

    /// Switch the cooler off and shut the driver down.
    pub fn close(mut self) -> Outcome<()> {
        if self.thermal.cooler_off().code() == StatusCode::Success {
            info!("❄️ Cooler switched off before shutdown");
        }
        self.session.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::acquisition::SessionState;
    use crate::sim::SimulatedCamera;
    use shared::status::codes;
    use shared::FanMode;

    #[test]
    fn test_open_applies_thermal_settings() {
        let sim = Arc::new(SimulatedCamera::with_detector(16, 8));
        let mut config = ControllerConfig::new();
        config.thermal.fan_mode = FanMode::Low;
        config.thermal.target_c = -40;

        let camera = Camera::open(sim.clone(), &config).into_result().unwrap();
        assert!(sim.cooler_is_on());
        assert_eq!(sim.fan_mode(), FanMode::Low.raw());

        let state = camera.thermal().get_status().into_result().unwrap();
        assert_eq!(state.target_temperature_c, -40.0);
        assert!(state.cooler_enabled);

        assert!(camera.close().is_success());
        assert!(!sim.cooler_is_on());
        assert!(!sim.is_initialized());
    }

    #[test]
    fn test_cooler_failure_does_not_block_open() {
        let sim = Arc::new(SimulatedCamera::with_detector(16, 8));
        sim.fail_next("cooler_on", codes::DRV_ERROR_ACK);

        let camera = Camera::open(sim.clone(), &ControllerConfig::new()).into_result().unwrap();
        assert!(!sim.cooler_is_on());
        assert_eq!(camera.acquisition().state(), SessionState::Idle);
    }

    #[test]
    fn test_acquire_with_config_defaults() {
        let sim = Arc::new(SimulatedCamera::with_detector(16, 8));
        let config = ControllerConfig::new();
        let camera = Camera::open(sim, &config).into_result().unwrap();

        let frame = camera.acquire(&config.acquisition_config()).into_result().unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 8));
        assert_eq!(camera.acquisition().state(), SessionState::Configured);

        let current = camera.configuration().current().into_result().unwrap();
        assert_eq!(current.exposure_time_s, Some(0.1));
    }

    #[test]
    fn test_open_failure_is_reported() {
        let sim = Arc::new(SimulatedCamera::new());
        sim.fail_next("initialize", codes::DRV_ERROR_NOCAMERA);

        let outcome = Camera::open(sim, &ControllerConfig::new());
        assert_eq!(outcome.code(), StatusCode::HardwareError(codes::DRV_ERROR_NOCAMERA));
    }
}
