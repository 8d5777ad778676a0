pub mod adapter;
pub mod error;
pub mod field;
pub mod geometry;
pub mod image;
pub mod spatial;

pub use adapter::{AdapterConfig, FourDPolicy, ImageCodec, RawImage, RawImageRef};
pub use error::{Result, VolumeError};
pub use field::Field;
pub use geometry::{Affine, Decomposition};
pub use image::{BuildOptions, Header, Volume, VolumeBuilder};
pub use spatial::{Direction, Origin, Spacing};
