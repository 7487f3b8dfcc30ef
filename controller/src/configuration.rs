/*!
Acquisition parameter management.

Each setter checks its value first, then the session state, then sends
the value to the driver and records it in the session's configuration
mirror (the driver cannot report most of these values back). Checks
that need a hardware limit query the limit once and cache it for the
session.
*/

use crate::acquisition::SessionState;
use crate::session::{SessionGuard, SessionHandle};
use shared::acquisition::check_seconds;
use shared::driver::{SHUTTER_TRANSFER_MS, SHUTTER_TTL_HIGH};
use shared::{
    AcquisitionConfig, AcquisitionMode, AcquisitionTimings, DetectorGeometry, FrameGeometry, ImageRegion, Outcome,
    ReadMode, ShutterMode, StatusCode,
};
use tracing::{debug, info, warn};

/// Validates and applies acquisition parameters.
#[derive(Debug, Clone)]
pub struct ConfigurationManager {
    session: SessionHandle,
}

impl ConfigurationManager {
    pub fn new(session: SessionHandle) -> Self {
        Self { session }
    }

    pub fn set_read_mode(&self, mode: ReadMode) -> Outcome<()> {
        self.update(|guard| guard.apply_read_mode(mode)).into()
    }

    pub fn set_acquisition_mode(&self, mode: AcquisitionMode) -> Outcome<()> {
        self.update(|guard| guard.apply_acquisition_mode(mode)).into()
    }

    pub fn set_exposure_time(&self, seconds: f32) -> Outcome<()> {
        check_seconds(seconds)
            .and_then(|()| {
                self.update(|guard| {
                    guard.check_exposure(seconds)?;
                    guard.apply_exposure_time(seconds)
                })
            })
            .into()
    }

    /// Frames per kinetic series, at most what one readout can hold.
    pub fn set_kinetic_count(&self, count: u32) -> Outcome<()> {
        check_kinetic_count(count)
            .and_then(|()| {
                self.update(|guard| {
                    let frame = guard.frame_geometry()?;
                    guard.check_series_size(frame, count)?;
                    guard.apply_kinetic_count(count)
                })
            })
            .into()
    }

    pub fn set_kinetic_cycle_time(&self, seconds: f32) -> Outcome<()> {
        check_seconds(seconds)
            .and_then(|()| self.update(|guard| guard.apply_kinetic_cycle_time(seconds)))
            .into()
    }

    /// Readout region; `None` restores the full detector.
    pub fn set_region(&self, region: Option<ImageRegion>) -> Outcome<()> {
        self.update(|guard| {
            let detector = guard.detector_geometry()?;
            let region = region.unwrap_or_else(|| detector.full_region());
            check_region(&region, &detector)?;
            guard.apply_region(region)
        })
        .into()
    }

    pub fn set_shutter(&self, mode: ShutterMode) -> Outcome<()> {
        self.update(|guard| guard.apply_shutter(mode)).into()
    }

    /// The configuration as last applied to the hardware.
    pub fn current(&self) -> Outcome<AcquisitionConfig> {
        self.session.lock_open().map(|guard| guard.config.clone()).into()
    }

    /// Detector size, cached for the session.
    pub fn detector_geometry(&self) -> Outcome<DetectorGeometry> {
        self.session.lock_open().and_then(|mut guard| guard.detector_geometry()).into()
    }

    /// Longest exposure the hardware accepts, cached for the session.
    pub fn maximum_exposure(&self) -> Outcome<f32> {
        self.session.lock_open().and_then(|mut guard| guard.maximum_exposure()).into()
    }

    /// Frames the driver can buffer for one readout, cached for the session.
    pub fn buffer_frames(&self) -> Outcome<u32> {
        self.session.lock_open().and_then(|mut guard| guard.buffer_frames()).into()
    }

    /// Exposure, accumulate and kinetic cycle times the hardware settled on.
    pub fn acquisition_timings(&self) -> Outcome<AcquisitionTimings> {
        let result = self.session.lock_open().and_then(|guard| {
            let (mut exposure, mut accumulate, mut kinetic) = (-1.0, -1.0, -1.0);
            guard.require("get_acquisition_timings", |api| {
                api.get_acquisition_timings(&mut exposure, &mut accumulate, &mut kinetic)
            })?;
            Ok(AcquisitionTimings {
                exposure_s: exposure,
                accumulate_s: accumulate,
                kinetic_s: kinetic,
            })
        });
        result.into()
    }

    fn update(
        &self,
        apply: impl FnOnce(&mut SessionGuard<'_>) -> Result<(), StatusCode>,
    ) -> Result<(), StatusCode> {
        let mut guard = self.session.lock_open()?;
        if !matches!(guard.state, SessionState::Idle | SessionState::Configured) {
            warn!(state = ?guard.state, "parameter change rejected while session busy");
            return Err(StatusCode::SessionBusy);
        }
        apply(&mut guard)
    }
}

fn check_kinetic_count(count: u32) -> Result<(), StatusCode> {
    if count == 0 || i32::try_from(count).is_err() {
        return Err(StatusCode::InvalidArgument);
    }
    Ok(())
}

/// Samples needed to read `frames` frames of `frame`, if that fits in memory.
fn check_readout_size(frame: FrameGeometry, frames: u32) -> Result<(), StatusCode> {
    let samples = usize::try_from(frames).ok().and_then(|frames| frame.readout_len(frames));
    if samples.is_none() {
        warn!(frames, width = frame.width, height = frame.height, "readout too large to allocate");
        return Err(StatusCode::InvalidArgument);
    }
    Ok(())
}

fn check_region(region: &ImageRegion, detector: &DetectorGeometry) -> Result<FrameGeometry, StatusCode> {
    region.frame_geometry(detector).map_err(|err| {
        debug!(%err, "region rejected");
        StatusCode::InvalidDimensions
    })
}

impl SessionGuard<'_> {
    /// Longest exposure the hardware accepts, queried at most once per session.
    pub(crate) fn maximum_exposure(&mut self) -> Result<f32, StatusCode> {
        if let Some(max) = self.max_exposure_s {
            return Ok(max);
        }
        let mut max = 0.0;
        self.require("get_maximum_exposure", |api| api.get_maximum_exposure(&mut max))?;
        self.max_exposure_s = Some(max);
        Ok(max)
    }

    /// Size of the driver's circular buffer in frames, queried at most once per session.
    pub(crate) fn buffer_frames(&mut self) -> Result<u32, StatusCode> {
        if let Some(frames) = self.buffer_frames {
            return Ok(frames);
        }
        let mut frames = 0;
        self.require("get_size_of_circular_buffer", |api| api.get_size_of_circular_buffer(&mut frames))?;
        let frames = frames.max(0) as u32;
        self.buffer_frames = Some(frames);
        Ok(frames)
    }

    /// A series must fit in the driver buffer and in one readout allocation.
    fn check_series_size(&mut self, frame: FrameGeometry, count: u32) -> Result<(), StatusCode> {
        let limit = self.buffer_frames()?;
        if count > limit {
            warn!(count, limit, "kinetic series larger than the driver buffer");
            return Err(StatusCode::InvalidArgument);
        }
        check_readout_size(frame, count)
    }

    fn check_exposure(&mut self, seconds: f32) -> Result<(), StatusCode> {
        check_seconds(seconds)?;
        if seconds > self.maximum_exposure()? {
            return Err(StatusCode::InvalidArgument);
        }
        Ok(())
    }

    /// Geometry of the frames the current configuration reads out.
    pub(crate) fn frame_geometry(&mut self) -> Result<FrameGeometry, StatusCode> {
        let detector = self.detector_geometry()?;
        let region = self.config.region.unwrap_or_else(|| detector.full_region());
        check_region(&region, &detector)
    }

    /// Check a whole configuration without sending anything to the driver.
    ///
    /// Only hardware limits are queried (once per session), and only after the
    /// value checks that need no hardware have passed.
    pub(crate) fn check_config(&mut self, config: &AcquisitionConfig) -> Result<FrameGeometry, StatusCode> {
        if !config.is_complete() {
            return Err(StatusCode::InvalidConfig);
        }
        config.check_values()?;
        check_kinetic_count(config.kinetic_count)?;
        if let Some(exposure) = config.exposure_time_s {
            self.check_exposure(exposure)?;
        }
        let detector = self.detector_geometry()?;
        let frame = check_region(&config.region.unwrap_or_else(|| detector.full_region()), &detector)?;
        self.check_series_size(frame, config.kinetic_count)?;
        Ok(frame)
    }

    /// Send a checked configuration to the driver field by field.
    pub(crate) fn apply_config(&mut self, config: &AcquisitionConfig) -> Result<(), StatusCode> {
        let (Some(read_mode), Some(acquisition_mode), Some(exposure)) =
            (config.read_mode, config.acquisition_mode, config.exposure_time_s)
        else {
            return Err(StatusCode::InvalidConfig);
        };
        let detector = self.detector_geometry()?;

        self.apply_read_mode(read_mode)?;
        self.apply_acquisition_mode(acquisition_mode)?;
        self.apply_exposure_time(exposure)?;
        self.apply_kinetic_count(config.kinetic_count)?;
        self.apply_kinetic_cycle_time(config.kinetic_cycle_time_s)?;
        self.apply_shutter(config.shutter)?;
        self.apply_region(config.region.unwrap_or_else(|| detector.full_region()))?;
        if config.region.is_none() {
            self.config.region = None;
        }

        info!(
            ?read_mode,
            ?acquisition_mode,
            exposure_s = exposure,
            kinetic_count = config.kinetic_count,
            "acquisition configured"
        );
        Ok(())
    }

    fn apply_read_mode(&mut self, mode: ReadMode) -> Result<(), StatusCode> {
        self.command("set_read_mode", |api| api.set_read_mode(mode.raw()))?;
        self.config.read_mode = Some(mode);
        Ok(())
    }

    fn apply_acquisition_mode(&mut self, mode: AcquisitionMode) -> Result<(), StatusCode> {
        self.command("set_acquisition_mode", |api| api.set_acquisition_mode(mode.raw()))?;
        self.config.acquisition_mode = Some(mode);
        Ok(())
    }

    fn apply_exposure_time(&mut self, seconds: f32) -> Result<(), StatusCode> {
        self.command("set_exposure_time", |api| api.set_exposure_time(seconds))?;
        self.config.exposure_time_s = Some(seconds);
        Ok(())
    }

    fn apply_kinetic_count(&mut self, count: u32) -> Result<(), StatusCode> {
        let raw = i32::try_from(count).map_err(|_| StatusCode::InvalidArgument)?;
        self.command("set_number_kinetics", |api| api.set_number_kinetics(raw))?;
        self.config.kinetic_count = count;
        Ok(())
    }

    fn apply_kinetic_cycle_time(&mut self, seconds: f32) -> Result<(), StatusCode> {
        self.command("set_kinetic_cycle_time", |api| api.set_kinetic_cycle_time(seconds))?;
        self.config.kinetic_cycle_time_s = seconds;
        Ok(())
    }

    fn apply_shutter(&mut self, mode: ShutterMode) -> Result<(), StatusCode> {
        self.command("set_shutter", |api| {
            api.set_shutter(SHUTTER_TTL_HIGH, mode.raw(), SHUTTER_TRANSFER_MS, SHUTTER_TRANSFER_MS)
        })?;
        self.config.shutter = mode;
        Ok(())
    }

    fn apply_region(&mut self, region: ImageRegion) -> Result<(), StatusCode> {
        let as_i32 = |value: u32| i32::try_from(value).map_err(|_| StatusCode::InvalidDimensions);
        let (h_bin, v_bin) = (as_i32(region.h_bin)?, as_i32(region.v_bin)?);
        let (h_start, h_end) = (as_i32(region.h_start)?, as_i32(region.h_end)?);
        let (v_start, v_end) = (as_i32(region.v_start)?, as_i32(region.v_end)?);

        self.command("set_image", |api| api.set_image(h_bin, v_bin, h_start, h_end, v_start, v_end))?;
        self.config.region = Some(region);
        Ok(())
    }
}
