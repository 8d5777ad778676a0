//! Spacing type for representing physical distances between voxels.
//!
//! Spacing represents the physical distance between adjacent voxels along
//! each array axis, in the same axis order as the array.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::check_finite;
use crate::error::{Result, VolumeError};

/// Spacing between adjacent voxels along each axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spacing(pub DVector<f64>);

impl Spacing {
    /// Create spacing from per-axis values.
    pub fn new(values: impl Into<Vec<f64>>) -> Self {
        Self(DVector::from_vec(values.into()))
    }

    /// Create uniform spacing (same value for all `ndims` axes).
    pub fn uniform(ndims: usize, value: f64) -> Self {
        Self(DVector::from_element(ndims, value))
    }

    /// Number of axes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether there are no axes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Spacing values as a slice.
    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice()
    }

    /// Convert spacing to a vector of values.
    pub fn to_vec(&self) -> Vec<f64> {
        self.0.iter().copied().collect()
    }

    /// Check that there is one finite, strictly positive value per axis.
    pub fn validate(&self, ndims: usize) -> Result<()> {
        if self.len() != ndims {
            return Err(VolumeError::invalid_geometry(format!(
                "spacing must have {} values, got {}",
                ndims,
                self.len()
            )));
        }
        check_finite("spacing", self.as_slice())?;
        if let Some(v) = self.0.iter().find(|v| **v <= 0.0) {
            return Err(VolumeError::invalid_geometry(format!(
                "spacing values must be positive, got {}",
                v
            )));
        }
        Ok(())
    }

    /// Get the inner nalgebra vector.
    pub fn inner(&self) -> &DVector<f64> {
        &self.0
    }
}

impl From<Vec<f64>> for Spacing {
    fn from(values: Vec<f64>) -> Self {
        Self::new(values)
    }
}

impl From<&[f64]> for Spacing {
    fn from(values: &[f64]) -> Self {
        Self::new(values.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Spacing {
    fn from(values: [f64; N]) -> Self {
        Self::new(values.to_vec())
    }
}

impl std::ops::Index<usize> for Spacing {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spacing_creation() {
        let s = Spacing::from([1.0, 2.0, 3.0]);
        assert_eq!(s.len(), 3);
        assert_eq!(s[0], 1.0);
        assert_eq!(s[1], 2.0);
        assert_eq!(s[2], 3.0);
    }

    #[test]
    fn test_spacing_uniform() {
        let s = Spacing::uniform(3, 1.0);
        assert_eq!(s, Spacing::from([1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_spacing_validate() {
        assert!(Spacing::from([0.5, 0.5]).validate(2).is_ok());
        assert!(matches!(
            Spacing::from([0.5, 0.5]).validate(3),
            Err(VolumeError::InvalidGeometry(_))
        ));
        assert!(matches!(
            Spacing::from([0.5, f64::NAN]).validate(2),
            Err(VolumeError::InvalidGeometry(_))
        ));
        assert!(matches!(
            Spacing::from([0.5, 0.0]).validate(2),
            Err(VolumeError::InvalidGeometry(_))
        ));
    }
}
