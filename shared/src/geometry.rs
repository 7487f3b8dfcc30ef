/*!
Detector and readout geometry.

The driver addresses pixels with 1-based, inclusive coordinates and
separate horizontal / vertical binning factors. [`ImageRegion`] keeps
that convention; [`FrameGeometry`] is what a readout of the region
actually produces.
*/

use crate::error::{Result, SharedError};
use crate::frame::Sample;
use serde::{Deserialize, Serialize};

/// Full sensor size as reported by the hardware. Constant for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DetectorGeometry {
    width: u32,
    height: u32,
}

impl DetectorGeometry {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SharedError::invalid_geometry(format!(
                "detector must be at least 1x1, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// Build from the signed values the driver writes back.
    pub fn from_raw(width: i32, height: i32) -> Result<Self> {
        let width = u32::try_from(width)
            .map_err(|_| SharedError::invalid_geometry(format!("negative width {}", width)))?;
        let height = u32::try_from(height)
            .map_err(|_| SharedError::invalid_geometry(format!("negative height {}", height)))?;
        Self::new(width, height)
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Region covering the whole sensor, unbinned.
    pub fn full_region(&self) -> ImageRegion {
        ImageRegion {
            h_bin: 1,
            v_bin: 1,
            h_start: 1,
            h_end: self.width,
            v_start: 1,
            v_end: self.height,
        }
    }
}

/// Width and height of a frame as it comes off the readout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FrameGeometry {
    pub width: usize,
    pub height: usize,
}

impl FrameGeometry {
    pub fn new(width: usize, height: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(SharedError::invalid_geometry(format!(
                "frame must be at least 1x1, got {}x{}",
                width, height
            )));
        }
        Ok(Self { width, height })
    }

    /// Number of samples in one frame.
    pub fn pixel_count(&self) -> usize {
        self.width * self.height
    }

    /// Samples in a readout of `frames` frames, or `None` if that many
    /// samples could not be allocated.
    pub fn readout_len(&self, frames: usize) -> Option<usize> {
        let max = isize::MAX as usize / std::mem::size_of::<Sample>();
        self.width
            .checked_mul(self.height)?
            .checked_mul(frames)
            .filter(|&samples| samples <= max)
    }
}

impl From<DetectorGeometry> for FrameGeometry {
    fn from(detector: DetectorGeometry) -> Self {
        Self {
            width: detector.width as usize,
            height: detector.height as usize,
        }
    }
}

/// Sub-area of the sensor to read out, in driver coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageRegion {
    pub h_bin: u32,
    pub v_bin: u32,
    pub h_start: u32,
    pub h_end: u32,
    pub v_start: u32,
    pub v_end: u32,
}

impl ImageRegion {
    /// Check the region against the sensor and return the frame it produces.
    ///
    /// Start and end are inclusive and 1-based; each binned span must divide
    /// evenly by its binning factor.
    pub fn frame_geometry(&self, detector: &DetectorGeometry) -> Result<FrameGeometry> {
        if self.h_bin == 0 || self.v_bin == 0 {
            return Err(SharedError::invalid_geometry("binning factors must be at least 1"));
        }
        if self.h_start == 0 || self.v_start == 0 {
            return Err(SharedError::invalid_geometry("region coordinates are 1-based"));
        }
        if self.h_start > self.h_end || self.v_start > self.v_end {
            return Err(SharedError::invalid_geometry(format!(
                "inverted region h {}..={} v {}..={}",
                self.h_start, self.h_end, self.v_start, self.v_end
            )));
        }
        if self.h_end > detector.width() || self.v_end > detector.height() {
            return Err(SharedError::invalid_geometry(format!(
                "region h ..={} v ..={} exceeds detector {}x{}",
                self.h_end,
                self.v_end,
                detector.width(),
                detector.height()
            )));
        }

        let h_span = self.h_end - self.h_start + 1;
        let v_span = self.v_end - self.v_start + 1;
        if h_span % self.h_bin != 0 || v_span % self.v_bin != 0 {
            return Err(SharedError::invalid_geometry(format!(
                "span {}x{} not divisible by binning {}x{}",
                h_span, v_span, self.h_bin, self.v_bin
            )));
        }

        FrameGeometry::new((h_span / self.h_bin) as usize, (v_span / self.v_bin) as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detector() -> DetectorGeometry {
        DetectorGeometry::new(1024, 256).unwrap()
    }

    #[test]
    fn test_zero_sized_detector_rejected() {
        assert!(DetectorGeometry::new(0, 10).is_err());
        assert!(DetectorGeometry::new(10, 0).is_err());
        assert!(DetectorGeometry::from_raw(-1, -1).is_err());
        assert!(DetectorGeometry::from_raw(1, 1).is_ok());
    }

    #[test]
    fn test_full_region_matches_detector() {
        let geometry = detector().full_region().frame_geometry(&detector()).unwrap();
        assert_eq!(geometry, FrameGeometry { width: 1024, height: 256 });
        assert_eq!(geometry.pixel_count(), 1024 * 256);
    }

    #[test]
    fn test_binned_subregion() {
        let region = ImageRegion {
            h_bin: 4,
            v_bin: 2,
            h_start: 101,
            h_end: 500,
            v_start: 1,
            v_end: 100,
        };
        let geometry = region.frame_geometry(&detector()).unwrap();
        assert_eq!(geometry, FrameGeometry { width: 100, height: 50 });
    }

    #[test]
    fn test_region_outside_detector_rejected() {
        let mut region = detector().full_region();
        region.h_end = 1025;
        assert!(region.frame_geometry(&detector()).is_err());

        let mut region = detector().full_region();
        region.v_start = 0;
        assert!(region.frame_geometry(&detector()).is_err());

        let mut region = detector().full_region();
        region.v_start = 200;
        region.v_end = 100;
        assert!(region.frame_geometry(&detector()).is_err());
    }

    #[test]
    fn test_indivisible_binning_rejected() {
        let mut region = detector().full_region();
        region.h_bin = 3;
        let err = region.frame_geometry(&detector()).unwrap_err();
        assert!(matches!(err, SharedError::InvalidGeometry(_)));
    }

    #[test]
    fn test_readout_len_refuses_overflow() {
        let frame = FrameGeometry::new(1024, 1024).unwrap();
        assert_eq!(frame.readout_len(3), Some(3 * 1024 * 1024));
        assert_eq!(frame.readout_len(usize::MAX / 2), None);
        assert_eq!(FrameGeometry::new(usize::MAX, 2).unwrap().readout_len(1), None);
    }
}
