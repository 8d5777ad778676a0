//! Conversion between the codec's axis order and the volume's axis order.
//!
//! Codecs report geometry with the fastest-varying axis first (x, y, z, ...),
//! while volumes put it last, matching C-order arrays. Converting is the same
//! operation in both directions, so load and save share these functions.

use ndarray::{ArrayD, ArrayViewD};

/// Per-axis geometry as exchanged with a codec.
///
/// `direction` is an `ndims × ndims` matrix flattened in row-major order.
#[derive(Debug, Clone, PartialEq)]
pub struct AxisGeometry {
    pub spacing: Vec<f64>,
    pub origin: Vec<f64>,
    pub direction: Vec<f64>,
}

impl AxisGeometry {
    /// Number of geometric axes.
    pub fn ndims(&self) -> usize {
        self.spacing.len()
    }
}

/// Reverse the axis order of spacing, origin and direction.
///
/// Reversing a row-major flattened matrix maps entry `(i, j)` to
/// `(n-1-i, n-1-j)`, which permutes rows and columns together.
pub fn reverse_geometry(geometry: &AxisGeometry) -> AxisGeometry {
    AxisGeometry {
        spacing: geometry.spacing.iter().rev().copied().collect(),
        origin: geometry.origin.iter().rev().copied().collect(),
        direction: geometry.direction.iter().rev().copied().collect(),
    }
}

/// Reverse the axis order of an owned array.
pub fn reverse_array(array: ArrayD<f32>) -> ArrayD<f32> {
    array.reversed_axes()
}

/// Reverse the axis order of a borrowed array.
pub fn reverse_array_view(array: ArrayViewD<'_, f32>) -> ArrayViewD<'_, f32> {
    array.reversed_axes()
}
