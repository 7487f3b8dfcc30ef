/*!
Readout buffers.

Every readout gets a fresh zeroed buffer sized for the configured frame
geometry and frame count. The driver fills it as one flat row-major
sequence; the buffer is then consumed into [`ImageFrame`]s, so a frame
handed to a caller never shares storage with a later readout.
*/

use crate::session::SessionGuard;
use shared::{FrameGeometry, ImageFrame, Sample, SharedError, StatusCode};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, info, warn};

/// Scratch buffer for one readout.
#[derive(Debug)]
pub struct ImageBuffer {
    geometry: FrameGeometry,
    frames: usize,
    data: Vec<Sample>,
}

impl ImageBuffer {
    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn frames(&self) -> usize {
        self.frames
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_slice(&self) -> &[Sample] {
        &self.data
    }

    /// Flat storage for the driver to fill.
    pub fn as_mut_slice(&mut self) -> &mut [Sample] {
        &mut self.data
    }

    /// Hand the samples over to frames, one per `width * height` block.
    pub fn into_frames(self) -> shared::Result<Vec<ImageFrame>> {
        let ImageBuffer {
            geometry,
            frames,
            mut data,
        } = self;
        let per_frame = geometry.pixel_count();
        if data.len() != per_frame * frames {
            return Err(SharedError::invalid_frame(format!(
                "{} samples for {} frames of {}",
                data.len(),
                frames,
                per_frame
            )));
        }

        // Split from the back; frame 0 keeps the buffer allocation.
        let mut out = Vec::with_capacity(frames);
        for index in (0..frames).rev() {
            let samples = data.split_off(index * per_frame);
            out.push(ImageFrame::from_row_major(geometry, samples)?.with_index(index));
        }
        out.reverse();
        Ok(out)
    }
}

/// Which driver readout fills the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Readout {
    /// Every frame of the finished acquisition
    Acquired,
    /// Only the newest frame
    MostRecent,
}

/// Allocates readout buffers and turns filled buffers into frames.
#[derive(Debug, Default)]
pub struct ImageBufferManager {
    frames_delivered: AtomicU64,
}

impl ImageBufferManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Zeroed buffer for `frames` frames of `geometry`.
    ///
    /// Fails with `InvalidArgument`, allocating nothing, when the readout
    /// would not fit in memory.
    pub fn allocate(&self, geometry: FrameGeometry, frames: usize) -> Result<ImageBuffer, StatusCode> {
        let frames = frames.max(1);
        let Some(len) = geometry.readout_len(frames) else {
            warn!(width = geometry.width, height = geometry.height, frames, "readout buffer too large");
            return Err(StatusCode::InvalidArgument);
        };
        debug!(width = geometry.width, height = geometry.height, frames, "allocating readout buffer");
        Ok(ImageBuffer {
            geometry,
            frames,
            data: vec![0; len],
        })
    }

    /// Fill `buffer` from the driver and split it into frames.
    ///
    /// Must be called with the session lock held.
    pub(crate) fn retrieve(
        &self,
        guard: &SessionGuard<'_>,
        mut buffer: ImageBuffer,
        readout: Readout,
    ) -> Result<Vec<ImageFrame>, StatusCode> {
        let data = buffer.as_mut_slice();
        match readout {
            Readout::Acquired => guard.require("get_acquired_data", |api| api.get_acquired_data(data))?,
            Readout::MostRecent => guard.require("get_most_recent_image", |api| api.get_most_recent_image(data))?,
        }

        let frames = buffer.into_frames().map_err(StatusCode::from)?;
        let total = self.frames_delivered.fetch_add(frames.len() as u64, Ordering::Relaxed) + frames.len() as u64;
        if let Some(first) = frames.first() {
            info!(
                "✅ Retrieved {} frame(s) of {}x{} ({} delivered this session)",
                frames.len(),
                first.width(),
                first.height(),
                total
            );
        }
        Ok(frames)
    }

    /// Frames handed to callers so far.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled(manager: &ImageBufferManager, width: usize, height: usize, frames: usize) -> ImageBuffer {
        let mut buffer = manager.allocate(FrameGeometry::new(width, height).unwrap(), frames).unwrap();
        for (i, sample) in buffer.as_mut_slice().iter_mut().enumerate() {
            *sample = (i as Sample) * 7 + 3;
        }
        buffer
    }

    #[test]
    fn test_allocation_is_zeroed_and_sized() {
        let manager = ImageBufferManager::new();
        let buffer = manager.allocate(FrameGeometry::new(6, 4).unwrap(), 3).unwrap();
        assert_eq!(buffer.len(), 72);
        assert_eq!(buffer.frames(), 3);
        assert!(buffer.as_slice().iter().all(|&s| s == 0));
    }

    #[test]
    fn test_reshape_maps_flat_index_to_row_and_column() {
        let manager = ImageBufferManager::new();
        for (width, height) in [(1, 1), (1, 5), (5, 1), (2, 3), (3, 2), (7, 4), (4, 7), (8, 8), (33, 17)] {
            let buffer = filled(&manager, width, height, 1);
            let flat = buffer.as_slice().to_vec();
            let frames = buffer.into_frames().unwrap();
            assert_eq!(frames.len(), 1);

            let frame = &frames[0];
            assert_eq!((frame.width(), frame.height()), (width, height));
            assert_eq!(frame.samples().len(), width * height);
            for r in 0..height {
                for c in 0..width {
                    assert_eq!(frame.get(r, c), Some(flat[r * width + c]), "{}x{} at ({}, {})", width, height, r, c);
                }
            }
        }
    }

    #[test]
    fn test_series_split_in_order() {
        let manager = ImageBufferManager::new();
        let buffer = filled(&manager, 3, 2, 4);
        let flat = buffer.as_slice().to_vec();
        let frames = buffer.into_frames().unwrap();

        assert_eq!(frames.len(), 4);
        for (index, frame) in frames.iter().enumerate() {
            assert_eq!(frame.index(), index);
            assert_eq!(frame.samples(), &flat[index * 6..(index + 1) * 6]);
        }
    }

    #[test]
    fn test_zero_frames_allocates_one() {
        let manager = ImageBufferManager::new();
        let buffer = manager.allocate(FrameGeometry::new(2, 2).unwrap(), 0).unwrap();
        assert_eq!(buffer.frames(), 1);
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_oversized_allocation_is_refused() {
        let manager = ImageBufferManager::new();
        let geometry = FrameGeometry::new(1024, 1024).unwrap();
        assert_eq!(
            manager.allocate(geometry, usize::MAX / 1024).unwrap_err(),
            StatusCode::InvalidArgument
        );
        assert_eq!(
            manager.allocate(FrameGeometry::new(usize::MAX / 2, 3).unwrap(), 1).unwrap_err(),
            StatusCode::InvalidArgument
        );
        assert_eq!(manager.frames_delivered(), 0);
    }
}
