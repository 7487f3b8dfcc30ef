/*!
Thermoelectric cooler control.

The cooler is independent of the acquisition cycle: every operation is
valid in any acquisition state and simply queues behind the session lock
while another driver call is in flight. Cooler failures are reported to
the caller but do not end an acquisition cycle.
*/

use crate::session::{SessionGuard, SessionHandle};
use shared::driver::TEMPERATURE_UNSET_C;
use shared::{FanMode, Outcome, StatusCode, TemperatureRange, ThermalState};
use tracing::{debug, info, warn};

#[derive(Debug, Clone)]
pub struct ThermalController {
    session: SessionHandle,
}

impl ThermalController {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn cooler_on(&self) -> Outcome<()> {
        self.set_cooler(true)
    }

    pub fn cooler_off(&self) -> Outcome<()> {
        self.set_cooler(false)
    }

    /// Set the target temperature in whole degrees C.
    ///
    /// The driver takes integer targets, so a fractional or non-finite value
    /// fails `InvalidArgument` without driver I/O. Outside `[min_c, max_c]`
    /// fails `OutOfRange`, with no I/O beyond the one-off range query.
    pub fn set_target(&self, celsius: f32) -> Outcome<()> {
        if !celsius.is_finite() || celsius.fract() != 0.0 {
            warn!(celsius, "target temperature must be whole degrees");
            return Outcome::failure(StatusCode::InvalidArgument);
        }
        // Saturates far outside the range, which the range check rejects.
        let celsius = celsius as i32;

        let result = self.session.lock_open().and_then(|mut guard| {
            let range = guard.temperature_range()?;
            if !range.contains(celsius) {
                warn!(celsius, min_c = range.min_c, max_c = range.max_c, "target temperature out of range");
                return Err(StatusCode::OutOfRange);
            }
            guard.require("set_temperature", |api| api.set_temperature(celsius))?;
            guard.target_c = Some(celsius);
            info!("🌡️ Target temperature {} °C", celsius);
            Ok(())
        });
        result.into()
    }

    /// Read the sensor temperature.
    ///
    /// On success the code is the cooler report (`TemperatureOff`,
    /// `TemperatureNotReached`, `TemperatureStabilized`, ...).
    pub fn get_status(&self) -> Outcome<ThermalState> {
        let result = self.session.lock_open().and_then(|mut guard| {
            let range = guard.temperature_range()?;
            let mut current = TEMPERATURE_UNSET_C;
            let code = guard.call("get_temperature", |api| api.get_temperature(&mut current));
            if !code.is_thermal_report() {
                return Err(code);
            }

            let state = ThermalState {
                current_temperature_c: current,
                target_temperature_c: guard.target_c.map_or(TEMPERATURE_UNSET_C, |target| target as f32),
                min_c: range.min_c,
                max_c: range.max_c,
                cooler_enabled: guard.cooler_enabled,
            };
            debug!(current_c = current, ?code, "temperature polled");
            Ok((state, code))
        });
        Outcome::reported(result)
    }

    /// Settable temperature range, cached for the session.
    pub fn get_range(&self) -> Outcome<TemperatureRange> {
        self.session.lock_open().and_then(|mut guard| guard.temperature_range()).into()
    }

    pub fn set_fan_mode(&self, mode: FanMode) -> Outcome<()> {
        let result = self.session.lock_open().and_then(|guard| {
            guard.require("set_fan_mode", |api| api.set_fan_mode(mode.raw()))?;
            info!(?mode, "fan mode set");
            Ok(())
        });
        result.into()
    }

    fn set_cooler(&self, enabled: bool) -> Outcome<()> {
        let result = self.session.lock_open().and_then(|mut guard| {
            if enabled {
                guard.require("cooler_on", |api| api.cooler_on())?;
            } else {
                guard.require("cooler_off", |api| api.cooler_off())?;
            }
            guard.cooler_enabled = enabled;
            info!("❄️ Cooler {}", if enabled { "on" } else { "off" });
            Ok(())
        });
        result.into()
    }
}

impl SessionGuard<'_> {
    /// Cooler range, queried at most once per session.
    fn temperature_range(&mut self) -> Result<TemperatureRange, StatusCode> {
        if let Some(range) = self.thermal_range {
            return Ok(range);
        }
        let (mut min_c, mut max_c) = (0, 0);
        self.require("get_temperature_range", |api| api.get_temperature_range(&mut min_c, &mut max_c))?;
        let range = TemperatureRange { min_c, max_c };
        self.thermal_range = Some(range);
        Ok(range)
    }
}
