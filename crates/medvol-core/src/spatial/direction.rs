//! Direction type for representing image orientation.
//!
//! Direction matrices represent orientation of image axes in physical space.

use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

use super::check_finite;
use crate::error::{Result, VolumeError};

/// Direction cosine matrix.
///
/// An N×N matrix where column i is the physical-space direction of the
/// i-th array axis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Direction(pub DMatrix<f64>);

impl Direction {
    /// Create an identity direction matrix (no rotation).
    pub fn identity(ndims: usize) -> Self {
        Self(DMatrix::identity(ndims, ndims))
    }

    /// Create a direction matrix from `ndims * ndims` values in row-major order.
    pub fn from_row_slice(ndims: usize, values: &[f64]) -> Result<Self> {
        if values.len() != ndims * ndims {
            return Err(VolumeError::invalid_geometry(format!(
                "direction must have {} values for shape ({}, {}), got {}",
                ndims * ndims,
                ndims,
                ndims,
                values.len()
            )));
        }
        Ok(Self(DMatrix::from_row_slice(ndims, ndims, values)))
    }

    /// Create a direction matrix from rows, rejecting ragged or non-square input.
    pub fn from_rows(rows: &[Vec<f64>]) -> Result<Self> {
        let ndims = rows.len();
        if let Some(row) = rows.iter().find(|r| r.len() != ndims) {
            return Err(VolumeError::invalid_geometry(format!(
                "direction must be square ({}, {}), found a row of {} values",
                ndims,
                ndims,
                row.len()
            )));
        }
        let flat: Vec<f64> = rows.iter().flatten().copied().collect();
        Self::from_row_slice(ndims, &flat)
    }

    /// Number of rows (and columns).
    pub fn ndims(&self) -> usize {
        self.0.nrows()
    }

    /// Shape of the matrix as `(rows, columns)`.
    pub fn shape(&self) -> (usize, usize) {
        self.0.shape()
    }

    /// Values in row-major order.
    pub fn to_row_major(&self) -> Vec<f64> {
        self.0.transpose().as_slice().to_vec()
    }

    /// Check that the matrix is `ndims × ndims` with finite entries.
    pub fn validate(&self, ndims: usize) -> Result<()> {
        if self.shape() != (ndims, ndims) {
            return Err(VolumeError::invalid_geometry(format!(
                "direction must have shape ({}, {}), got {:?}",
                ndims,
                ndims,
                self.shape()
            )));
        }
        check_finite("direction", self.0.as_slice())
    }

    /// Check if direction matrix is orthogonal (rotation or reflection).
    pub fn is_orthogonal(&self) -> bool {
        let n = self.ndims();
        let product = &self.0 * self.0.transpose();
        (0..n).all(|i| {
            (0..n).all(|j| {
                let expected = if i == j { 1.0 } else { 0.0 };
                (product[(i, j)] - expected).abs() < 1e-6
            })
        })
    }

    /// Compute the determinant of the direction matrix.
    pub fn determinant(&self) -> f64 {
        self.0.determinant()
    }

    /// Get the inner nalgebra matrix.
    pub fn inner(&self) -> &DMatrix<f64> {
        &self.0
    }
}

impl<const N: usize> From<[[f64; N]; N]> for Direction {
    fn from(rows: [[f64; N]; N]) -> Self {
        Self(DMatrix::from_fn(N, N, |i, j| rows[i][j]))
    }
}

impl std::ops::Index<(usize, usize)> for Direction {
    type Output = f64;

    fn index(&self, index: (usize, usize)) -> &Self::Output {
        &self.0[index]
    }
}
