//! Origin type for representing the physical position of the first voxel.

use nalgebra::DVector;
use serde::{Deserialize, Serialize};

use super::check_finite;
use crate::error::{Result, VolumeError};

/// Physical coordinate of the voxel at index (0, 0, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Origin(pub DVector<f64>);

impl Origin {
    /// Create an origin from per-axis coordinates.
    pub fn new(coords: impl Into<Vec<f64>>) -> Self {
        Self(DVector::from_vec(coords.into()))
    }

    /// Create an origin at zero for `ndims` axes.
    pub fn zeros(ndims: usize) -> Self {
        Self(DVector::zeros(ndims))
    }

    /// Number of axes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Check whether there are no axes.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Coordinates as a slice.
    pub fn as_slice(&self) -> &[f64] {
        self.0.as_slice()
    }

    /// Convert origin to a vector of coordinates.
    pub fn to_vec(&self) -> Vec<f64> {
        self.0.iter().copied().collect()
    }

    /// Check that there is one finite coordinate per axis.
    pub fn validate(&self, ndims: usize) -> Result<()> {
        if self.len() != ndims {
            return Err(VolumeError::invalid_geometry(format!(
                "origin must have {} values, got {}",
                ndims,
                self.len()
            )));
        }
        check_finite("origin", self.as_slice())
    }

    /// Get the inner nalgebra vector.
    pub fn inner(&self) -> &DVector<f64> {
        &self.0
    }
}

impl From<Vec<f64>> for Origin {
    fn from(coords: Vec<f64>) -> Self {
        Self::new(coords)
    }
}

impl From<&[f64]> for Origin {
    fn from(coords: &[f64]) -> Self {
        Self::new(coords.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Origin {
    fn from(coords: [f64; N]) -> Self {
        Self::new(coords.to_vec())
    }
}

impl std::ops::Index<usize> for Origin {
    type Output = f64;

    fn index(&self, index: usize) -> &Self::Output {
        &self.0[index]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_origin_creation() {
        let o = Origin::from([1.0, 2.0, 3.0]);
        assert_eq!(o[0], 1.0);
        assert_eq!(o[1], 2.0);
        assert_eq!(o[2], 3.0);
        assert_eq!(o.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_origin_zeros() {
        let o = Origin::zeros(4);
        assert_eq!(o.len(), 4);
        assert!(o.as_slice().iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_origin_validate() {
        assert!(Origin::from([-1.0, 2.0]).validate(2).is_ok());
        assert!(Origin::from([1.0]).validate(2).is_err());
        assert!(Origin::from([1.0, f64::INFINITY]).validate(2).is_err());
    }
}
