/*!
Common error types for the detector controller components.
*/

use crate::status::StatusCode;
use thiserror::Error;

/// Common result type used throughout the shared library
pub type Result<T> = std::result::Result<T, SharedError>;

/// Errors raised while building the shared data types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SharedError {
    /// A driver or controller status
    #[error("Status: {0}")]
    Status(#[from] StatusCode),

    /// Geometry that cannot describe a real sensor area
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Frame whose samples do not match its geometry
    #[error("Invalid frame data: {0}")]
    InvalidFrame(String),
}

impl SharedError {
    /// Create a new invalid geometry error
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create a new invalid frame error
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Status code a caller-facing operation should report for this error
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Status(code) => *code,
            Self::InvalidGeometry(_) | Self::InvalidFrame(_) => StatusCode::InvalidDimensions,
        }
    }
}

impl From<SharedError> for StatusCode {
    fn from(err: SharedError) -> Self {
        err.status()
    }
}
