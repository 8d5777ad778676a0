//! Format adapter: the seam between volumes and on-disk image codecs.
//!
//! A codec only moves arrays, per-axis geometry and string metadata in its
//! own axis order. Everything else (axis reversal, reconciling 3D metadata
//! with 4D arrays, the segmentation flag) happens here so every codec gets
//! the same behaviour.

pub mod axes;
pub mod config;
pub mod reconcile;

pub use axes::{reverse_geometry, AxisGeometry};
pub use config::{AdapterConfig, FourDPolicy};
pub use reconcile::{prepare_for_save, reconcile_loaded, LoadedVolume};

use std::path::Path;

use ndarray::{ArrayD, ArrayViewD};

use crate::error::Result;
use crate::image::Header;

/// An image as read by a codec, in the codec's axis order.
#[derive(Debug, Clone)]
pub struct RawImage {
    pub array: ArrayD<f32>,
    pub geometry: AxisGeometry,
    pub metadata: Header,
}

/// An image handed to a codec for writing, in the codec's axis order.
#[derive(Debug, Clone)]
pub struct RawImageRef<'a> {
    pub array: ArrayViewD<'a, f32>,
    pub geometry: AxisGeometry,
    pub metadata: Header,
}

/// On-disk image codec.
///
/// Implementations open and close their own file handles within each call.
pub trait ImageCodec {
    /// Largest number of geometric axes the format can store.
    fn max_geometry_ndims(&self) -> usize {
        3
    }

    /// Read an image from `path`.
    fn read(&self, path: &Path) -> Result<RawImage>;

    /// Write an image to `path`.
    fn write(&self, image: &RawImageRef<'_>, path: &Path) -> Result<()>;
}

impl<C: ImageCodec + ?Sized> ImageCodec for &C {
    fn max_geometry_ndims(&self) -> usize {
        (**self).max_geometry_ndims()
    }

    fn read(&self, path: &Path) -> Result<RawImage> {
        (**self).read(path)
    }

    fn write(&self, image: &RawImageRef<'_>, path: &Path) -> Result<()> {
        (**self).write(image, path)
    }
}
