//! Volume type with physical metadata and derived affine geometry.
//!
//! A [`Volume`] is an immutable value: "modifying" one produces a new,
//! validated instance, so the array rank and the geometry lengths cannot
//! drift apart.

use std::path::Path;

use nalgebra::{DMatrix, DVector};
use ndarray::ArrayD;
use tracing::debug;

use super::builder::{Source, VolumeBuilder};
use super::header::Header;
use crate::adapter::{prepare_for_save, AdapterConfig, ImageCodec};
use crate::error::{Result, VolumeError};
use crate::field::Field;
use crate::geometry::{self, Affine, Decomposition};
use crate::spatial::{Direction, Origin, Spacing};

/// Medical volume: a 2D, 3D or 4D array with physical metadata.
///
/// # Coordinate Systems
/// * **Index Space**: array indices, axis order as in the array
/// * **Physical Space**: `affine * [index, 1]`
///
/// # Examples
/// ```rust
/// use medvol_core::Volume;
/// use ndarray::{ArrayD, IxDyn};
///
/// let volume = Volume::builder(ArrayD::<f32>::zeros(IxDyn(&[50, 50, 50])))
///     .build()
///     .unwrap();
/// assert_eq!(volume.affine().unwrap(), nalgebra::DMatrix::identity(4, 4));
/// ```
#[derive(Debug, Clone)]
pub struct Volume {
    pub(crate) array: ArrayD<f32>,
    pub(crate) spacing: Field<Spacing>,
    pub(crate) origin: Field<Origin>,
    pub(crate) direction: Field<Direction>,
    pub(crate) header: Field<Header>,
    pub(crate) is_seg: Field<bool>,
}

impl Volume {
    /// Start building a volume from an array or a file path.
    pub fn builder<'a>(source: impl Into<Source>) -> VolumeBuilder<'a> {
        VolumeBuilder::new(source)
    }

    /// Create a volume with default geometry.
    pub fn from_array(array: ArrayD<f32>) -> Result<Self> {
        Self::builder(array).build()
    }

    /// Load a volume through a codec.
    pub fn load<C: ImageCodec + ?Sized>(path: impl AsRef<Path>, codec: &C) -> Result<Self> {
        Self::builder(path.as_ref()).build_with(codec)
    }

    /// Save the volume through a codec.
    pub fn save<C: ImageCodec + ?Sized>(
        &self,
        path: impl AsRef<Path>,
        codec: &C,
        config: &AdapterConfig,
    ) -> Result<()> {
        let path = path.as_ref();
        let raw = prepare_for_save(self, codec.max_geometry_ndims(), config)?;
        debug!(path = %path.display(), ndims = self.ndims(), "saving volume");
        codec.write(&raw, path)
    }

    /// Get the voxel array.
    pub fn array(&self) -> &ArrayD<f32> {
        &self.array
    }

    /// Consume the volume and return the voxel array.
    pub fn into_array(self) -> ArrayD<f32> {
        self.array
    }

    /// Get the array shape.
    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    /// Number of array dimensions.
    pub fn ndims(&self) -> usize {
        self.array.ndim()
    }

    /// Get the spacing, if set.
    pub fn spacing(&self) -> Option<&Spacing> {
        self.spacing.value()
    }

    /// Get the origin, if set.
    pub fn origin(&self) -> Option<&Origin> {
        self.origin.value()
    }

    /// Get the direction, if set.
    pub fn direction(&self) -> Option<&Direction> {
        self.direction.value()
    }

    /// Get the header, if set.
    pub fn header(&self) -> Option<&Header> {
        self.header.value()
    }

    /// Segmentation flag: `Some(true)` for a label mask, `Some(false)` for an
    /// intensity image, `None` when unknown.
    pub fn is_seg(&self) -> Option<bool> {
        self.is_seg.value().copied()
    }

    pub fn spacing_field(&self) -> &Field<Spacing> {
        &self.spacing
    }

    pub fn origin_field(&self) -> &Field<Origin> {
        &self.origin
    }

    pub fn direction_field(&self) -> &Field<Direction> {
        &self.direction
    }

    pub fn header_field(&self) -> &Field<Header> {
        &self.header
    }

    pub fn is_seg_field(&self) -> &Field<bool> {
        &self.is_seg
    }

    /// Homogeneous `(ndims+1)×(ndims+1)` index-to-physical affine.
    pub fn affine(&self) -> Result<Affine> {
        geometry::affine_from_fields(&self.spacing, &self.origin, &self.direction)
    }

    /// Translation, scale, rotation and shear of the affine.
    pub fn decompose(&self) -> Result<Decomposition> {
        geometry::decompose(&self.affine()?)
    }

    pub fn translation(&self) -> Result<DVector<f64>> {
        Ok(self.decompose()?.translation)
    }

    pub fn scale(&self) -> Result<DVector<f64>> {
        Ok(self.decompose()?.scale)
    }

    pub fn rotation(&self) -> Result<DMatrix<f64>> {
        Ok(self.decompose()?.rotation)
    }

    pub fn shear(&self) -> Result<DMatrix<f64>> {
        Ok(self.decompose()?.shear)
    }

    /// Convert a continuous index to a physical point.
    ///
    /// `point = origin + direction * (index * spacing)`
    pub fn index_to_physical(&self, index: &[f64]) -> Result<DVector<f64>> {
        let affine = self.affine()?;
        apply_homogeneous(&affine, index)
    }

    /// Convert a physical point to a continuous index.
    ///
    /// `index = (direction⁻¹ * (point - origin)) / spacing`
    pub fn physical_to_index(&self, point: &[f64]) -> Result<DVector<f64>> {
        let inverse = self
            .affine()?
            .try_inverse()
            .ok_or_else(|| VolumeError::invalid_geometry("affine is not invertible"))?;
        apply_homogeneous(&inverse, point)
    }

    /// New volume with explicit spacing.
    pub fn with_spacing(&self, spacing: impl Into<Spacing>) -> Result<Self> {
        let spacing = spacing.into();
        spacing.validate(self.ndims())?;
        Ok(Self {
            spacing: Field::Explicit(spacing),
            ..self.clone()
        })
    }

    /// New volume with an explicit origin.
    pub fn with_origin(&self, origin: impl Into<Origin>) -> Result<Self> {
        let origin = origin.into();
        origin.validate(self.ndims())?;
        Ok(Self {
            origin: Field::Explicit(origin),
            ..self.clone()
        })
    }

    /// New volume with an explicit direction.
    pub fn with_direction(&self, direction: impl Into<Direction>) -> Result<Self> {
        let direction = direction.into();
        direction.validate(self.ndims())?;
        Ok(Self {
            direction: Field::Explicit(direction),
            ..self.clone()
        })
    }

    /// New volume with an explicit header.
    pub fn with_header(&self, header: Header) -> Self {
        Self {
            header: Field::Explicit(header),
            ..self.clone()
        }
    }

    /// New volume with an explicit segmentation flag.
    pub fn with_is_seg(&self, is_seg: bool) -> Self {
        Self {
            is_seg: Field::Explicit(is_seg),
            ..self.clone()
        }
    }

    /// New volume holding `array` and this volume's metadata.
    ///
    /// Fails if the inherited geometry does not fit the new array's rank.
    pub fn with_array(&self, array: ArrayD<f32>) -> Result<Self> {
        Self::builder(array).copy_from(self).build()
    }
}

fn apply_homogeneous(matrix: &DMatrix<f64>, coords: &[f64]) -> Result<DVector<f64>> {
    let n = matrix.nrows() - 1;
    if coords.len() != n {
        return Err(VolumeError::invalid_geometry(format!(
            "expected {} coordinates, got {}",
            n,
            coords.len()
        )));
    }
    let homogeneous = DVector::from_iterator(n + 1, coords.iter().copied().chain([1.0]));
    let mapped = matrix * homogeneous;
    Ok(mapped.rows(0, n).into_owned())
}
