/*!
Vendor device boundary.

One method per blocking driver entry point. Every method returns the raw
driver status code; outputs are written through `&mut` parameters the
same way the driver fills its pointer arguments. Nothing above this
trait interprets a raw code except [`shared::translate`].

The driver is not reentrant. Callers must hold the session lock for
every call except [`VendorApi::wait_for_acquisition`], which is issued
with the lock released so that [`VendorApi::cancel_wait`] and the
cooler calls can interleave.
*/

/// Raw driver return code.
pub type RawStatus = u32;

pub trait VendorApi: Send + Sync {
    // Lifecycle
    fn initialize(&self, config_dir: &str) -> RawStatus;
    fn shut_down(&self) -> RawStatus;

    // Capabilities
    fn get_detector(&self, width: &mut i32, height: &mut i32) -> RawStatus;
    fn get_maximum_exposure(&self, seconds: &mut f32) -> RawStatus;
    /// How many frames the on-board acquisition buffer holds.
    fn get_size_of_circular_buffer(&self, images: &mut i32) -> RawStatus;

    // Acquisition setup
    fn set_read_mode(&self, mode: i32) -> RawStatus;
    fn set_acquisition_mode(&self, mode: i32) -> RawStatus;
    fn set_exposure_time(&self, seconds: f32) -> RawStatus;
    fn set_number_kinetics(&self, count: i32) -> RawStatus;
    fn set_kinetic_cycle_time(&self, seconds: f32) -> RawStatus;
    fn set_image(&self, h_bin: i32, v_bin: i32, h_start: i32, h_end: i32, v_start: i32, v_end: i32) -> RawStatus;
    fn set_shutter(&self, signal: i32, mode: i32, closing_ms: i32, opening_ms: i32) -> RawStatus;
    fn get_acquisition_timings(&self, exposure: &mut f32, accumulate: &mut f32, kinetic: &mut f32) -> RawStatus;

    // Acquisition control
    fn start_acquisition(&self) -> RawStatus;
    /// Block until an acquisition event, a cancelled wait, or the timeout.
    /// Returns `DRV_NO_NEW_DATA` for the latter two.
    fn wait_for_acquisition(&self, timeout_ms: u32) -> RawStatus;
    /// Release a thread blocked in [`VendorApi::wait_for_acquisition`].
    fn cancel_wait(&self) -> RawStatus;
    fn abort_acquisition(&self) -> RawStatus;
    fn get_status(&self, status: &mut RawStatus) -> RawStatus;

    // Readout
    fn get_acquired_data(&self, buffer: &mut [i32]) -> RawStatus;
    fn get_most_recent_image(&self, buffer: &mut [i32]) -> RawStatus;

    // Cooler
    fn cooler_on(&self) -> RawStatus;
    fn cooler_off(&self) -> RawStatus;
    fn set_temperature(&self, celsius: i32) -> RawStatus;
    fn get_temperature(&self, celsius: &mut f32) -> RawStatus;
    fn get_temperature_range(&self, min_c: &mut i32, max_c: &mut i32) -> RawStatus;
    fn set_fan_mode(&self, mode: i32) -> RawStatus;
}
