//! Affine composition and decomposition.
//!
//! The affine maps array indices to physical coordinates:
//! `point = direction * diag(spacing) * index + origin`, written as a
//! homogeneous `(N+1)×(N+1)` matrix.

use nalgebra::{DMatrix, DVector};

use crate::error::{Result, VolumeError};
use crate::field::Field;
use crate::spatial::{Direction, Origin, Spacing};

/// Homogeneous `(N+1)×(N+1)` affine matrix.
pub type Affine = DMatrix<f64>;

/// Components recovered from an affine matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// Last column of the affine without the homogeneous row.
    pub translation: DVector<f64>,
    /// Euclidean norm of each column of the linear block.
    pub scale: DVector<f64>,
    /// Linear block with each column divided by its scale.
    pub rotation: DMatrix<f64>,
    /// `rotationᵀ · linear` with each row divided by its scale.
    pub shear: DMatrix<f64>,
}

/// Build the homogeneous affine from spacing, origin and direction.
///
/// The top-left block is `direction * diag(spacing)`, the last column holds
/// the origin and the bottom row is `[0, ..., 0, 1]`.
pub fn affine(spacing: &Spacing, origin: &Origin, direction: &Direction) -> Result<Affine> {
    let n = spacing.len();
    if origin.len() != n || direction.shape() != (n, n) {
        return Err(VolumeError::invalid_geometry(format!(
            "spacing ({}), origin ({}) and direction {:?} disagree on rank",
            n,
            origin.len(),
            direction.shape()
        )));
    }

    let linear = direction.inner() * DMatrix::from_diagonal(spacing.inner());
    let mut affine = DMatrix::identity(n + 1, n + 1);
    affine.view_mut((0, 0), (n, n)).copy_from(&linear);
    affine.view_mut((0, n), (n, 1)).copy_from(origin.inner());
    Ok(affine)
}

/// Build the affine from possibly unset fields.
///
/// Fails with [`VolumeError::GeometryIncomplete`] naming the first unset field.
pub fn affine_from_fields(
    spacing: &Field<Spacing>,
    origin: &Field<Origin>,
    direction: &Field<Direction>,
) -> Result<Affine> {
    let spacing = spacing.require("spacing")?;
    let origin = origin.require("origin")?;
    let direction = direction.require("direction")?;
    affine(spacing, origin, direction)
}

/// Split an affine into translation, scale, rotation and shear.
///
/// Zero scales are not guarded: the matching rotation column and shear row
/// come out non-finite.
pub fn decompose(affine: &Affine) -> Result<Decomposition> {
    let (rows, cols) = affine.shape();
    if rows != cols || rows < 2 {
        return Err(VolumeError::invalid_geometry(format!(
            "affine must be square with at least 2 rows, got {:?}",
            affine.shape()
        )));
    }
    let n = rows - 1;

    let linear = affine.view((0, 0), (n, n)).into_owned();
    let translation = DVector::from_iterator(n, (0..n).map(|i| affine[(i, n)]));
    let scale = DVector::from_iterator(n, linear.column_iter().map(|c| c.norm()));

    let mut rotation = linear.clone();
    for (j, mut column) in rotation.column_iter_mut().enumerate() {
        column /= scale[j];
    }

    let mut shear = rotation.transpose() * &linear;
    for (i, mut row) in shear.row_iter_mut().enumerate() {
        row /= scale[i];
    }

    Ok(Decomposition {
        translation,
        scale,
        rotation,
        shear,
    })
}
