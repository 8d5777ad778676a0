//! Spatial types for representing spacing, origin, and direction matrices.
//!
//! Ranks are dynamic (2, 3 or 4 axes) so all types wrap nalgebra's
//! dynamically sized vectors and matrices.

pub mod direction;
pub mod origin;
pub mod spacing;

pub use direction::Direction;
pub use origin::Origin;
pub use spacing::Spacing;

use crate::error::{Result, VolumeError};

pub(crate) fn check_finite(name: &str, values: &[f64]) -> Result<()> {
    match values.iter().find(|v| !v.is_finite()) {
        Some(v) => Err(VolumeError::invalid_geometry(format!(
            "{} must contain finite real values, got {}",
            name, v
        ))),
        None => Ok(()),
    }
}
