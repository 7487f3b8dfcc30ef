/*!
Image frames.

The driver hands back a flat readout. A frame keeps those samples in the
same row-major order and addresses them as `samples[row * width + col]`;
nothing is copied or reordered to build the row view.
*/

use crate::error::{Result, SharedError};
use crate::geometry::FrameGeometry;
use chrono::{DateTime, Utc};

/// Sample type written by the driver readout.
pub type Sample = i32;

/// One complete readout, row-major. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFrame {
    geometry: FrameGeometry,
    samples: Vec<Sample>,
    index: usize,
    acquired_at: DateTime<Utc>,
}

impl ImageFrame {
    /// Wrap a flat row-major readout.
    ///
    /// The sample count must equal `width * height` exactly; a short or long
    /// buffer is rejected rather than truncated or padded.
    pub fn from_row_major(geometry: FrameGeometry, samples: Vec<Sample>) -> Result<Self> {
        if samples.len() != geometry.pixel_count() {
            return Err(SharedError::invalid_frame(format!(
                "{} samples for a {}x{} frame",
                samples.len(),
                geometry.width,
                geometry.height
            )));
        }

        Ok(Self {
            geometry,
            samples,
            index: 0,
            acquired_at: Utc::now(),
        })
    }

    /// Position of this frame within a kinetic series.
    pub fn with_index(mut self, index: usize) -> Self {
        self.index = index;
        self
    }

    pub fn width(&self) -> usize {
        self.geometry.width
    }

    pub fn height(&self) -> usize {
        self.geometry.height
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn acquired_at(&self) -> DateTime<Utc> {
        self.acquired_at
    }

    /// Sample at `(row, col)`, or `None` outside the frame.
    pub fn get(&self, row: usize, col: usize) -> Option<Sample> {
        if row >= self.geometry.height || col >= self.geometry.width {
            return None;
        }
        Some(self.samples[row * self.geometry.width + col])
    }

    /// One row of samples.
    pub fn row(&self, row: usize) -> Option<&[Sample]> {
        if row >= self.geometry.height {
            return None;
        }
        let start = row * self.geometry.width;
        Some(&self.samples[start..start + self.geometry.width])
    }

    /// Rows in order, top to bottom.
    pub fn rows(&self) -> impl Iterator<Item = &[Sample]> {
        self.samples.chunks_exact(self.geometry.width)
    }

    /// Copy out as a matrix, `matrix[row][col]`.
    pub fn to_rows(&self) -> Vec<Vec<Sample>> {
        self.rows().map(<[Sample]>::to_vec).collect()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
