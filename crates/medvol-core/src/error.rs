//! Error types for volume construction, geometry and format reconciliation.
//!
//! Every failure is raised at the point of violation. Nothing is retried and a
//! `Volume` is never produced in a partially validated state.

use thiserror::Error;

/// Main error type for medvol operations.
#[derive(Error, Debug)]
pub enum VolumeError {
    /// Array rank outside of 2, 3 or 4.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// A file path was combined with manual field overrides.
    #[error("Conflicting arguments: {0}")]
    ConflictingArguments(String),

    /// Spacing, origin or direction of the wrong length or with non-real values.
    #[error("Invalid geometry: {0}")]
    InvalidGeometry(String),

    /// Header that is not a string-to-string mapping, or a value the format cannot parse.
    #[error("Invalid header: {0}")]
    InvalidHeader(String),

    /// Segmentation flag that is not a boolean.
    #[error("Invalid flag: {0}")]
    InvalidFlag(String),

    /// Array rank and stored metadata rank cannot be reconciled.
    #[error("Dimensionality mismatch: {0}")]
    DimensionalityMismatch(String),

    /// The target format cannot persist this many geometric axes.
    #[error("Unsupported dimensionality: {0}")]
    UnsupportedDimensionality(String),

    /// A geometric field needed for the affine is not set.
    #[error("Geometry incomplete: {0} is not set")]
    GeometryIncomplete(&'static str),

    /// I/O failure reported by the image codec.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Any other failure reported by the image codec.
    #[error("Codec error: {0}")]
    Codec(String),
}

/// Result type for medvol operations.
pub type Result<T> = std::result::Result<T, VolumeError>;

impl VolumeError {
    /// Create an invalid shape error.
    pub fn invalid_shape(msg: impl Into<String>) -> Self {
        Self::InvalidShape(msg.into())
    }

    /// Create a conflicting arguments error.
    pub fn conflicting_arguments(msg: impl Into<String>) -> Self {
        Self::ConflictingArguments(msg.into())
    }

    /// Create an invalid geometry error.
    pub fn invalid_geometry(msg: impl Into<String>) -> Self {
        Self::InvalidGeometry(msg.into())
    }

    /// Create an invalid header error.
    pub fn invalid_header(msg: impl Into<String>) -> Self {
        Self::InvalidHeader(msg.into())
    }

    /// Create an invalid flag error.
    pub fn invalid_flag(msg: impl Into<String>) -> Self {
        Self::InvalidFlag(msg.into())
    }

    /// Create a dimensionality mismatch error.
    pub fn dimensionality_mismatch(msg: impl Into<String>) -> Self {
        Self::DimensionalityMismatch(msg.into())
    }

    /// Create an unsupported dimensionality error.
    pub fn unsupported_dimensionality(msg: impl Into<String>) -> Self {
        Self::UnsupportedDimensionality(msg.into())
    }

    /// Create a codec error.
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = VolumeError::invalid_geometry("spacing has 2 values");
        assert!(matches!(err, VolumeError::InvalidGeometry(_)));
    }

    #[test]
    fn test_error_display() {
        let err = VolumeError::invalid_shape("rank 5");
        assert_eq!(err.to_string(), "Invalid shape: rank 5");

        let err = VolumeError::GeometryIncomplete("origin");
        assert_eq!(err.to_string(), "Geometry incomplete: origin is not set");
    }

    #[test]
    fn test_io_error_is_transparent() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err: VolumeError = io.into();
        assert!(matches!(err, VolumeError::Io(_)));
        assert_eq!(err.to_string(), "no such file");
    }
}
