//! Volume type and related functionality.
//!
//! This module provides the [`Volume`] type for representing medical images
//! with physical metadata, its builder, and the free-form header.

pub mod builder;
pub mod header;
pub mod volume;

pub use builder::{BuildOptions, Source, VolumeBuilder};
pub use header::{decode_seg_flag, encode_seg_flag, Header, IMG_INTENT, INTENT_NAME_KEY, SEG_INTENT};
pub use volume::Volume;
