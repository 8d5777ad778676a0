//! Reconciling codec geometry with volume geometry.
//!
//! On load, codec geometry is converted to the volume axis order and, when a
//! 4D array arrives with only 3D metadata, a fourth axis is synthesised with
//! unit spacing, zero origin and an identity direction entry. On save, the
//! geometry is cut down to what the codec can hold.

use ndarray::ArrayD;
use tracing::{debug, info, warn};

use super::axes::{reverse_array, reverse_array_view, reverse_geometry, AxisGeometry};
use super::config::{AdapterConfig, FourDPolicy};
use super::{RawImage, RawImageRef};
use crate::error::{Result, VolumeError};
use crate::image::{Header, Volume};
use crate::spatial::{Direction, Origin, Spacing};

/// Volume parts recovered from a codec read, in volume axis order.
#[derive(Debug, Clone)]
pub struct LoadedVolume {
    pub array: ArrayD<f32>,
    pub spacing: Spacing,
    pub origin: Origin,
    pub direction: Direction,
    pub header: Header,
    pub is_seg: Option<bool>,
}

/// Convert a codec read into volume parts.
///
/// Fails with [`VolumeError::DimensionalityMismatch`] when the array rank and
/// metadata rank cannot be reconciled.
pub fn reconcile_loaded(raw: RawImage, config: &AdapterConfig) -> Result<LoadedVolume> {
    let RawImage {
        array,
        geometry,
        metadata,
    } = raw;

    let array = reverse_array(array);
    let geometry = reverse_geometry(&geometry);
    let ndims = array.ndim();
    let metadata_ndims = geometry.ndims();

    if geometry.origin.len() != metadata_ndims
        || geometry.direction.len() != metadata_ndims * metadata_ndims
    {
        return Err(VolumeError::dimensionality_mismatch(format!(
            "codec reported {} spacing, {} origin and {} direction values",
            metadata_ndims,
            geometry.origin.len(),
            geometry.direction.len()
        )));
    }

    let (spacing, origin, direction) = if ndims == metadata_ndims {
        (
            Spacing::new(geometry.spacing),
            Origin::new(geometry.origin),
            Direction::from_row_slice(ndims, &geometry.direction)?,
        )
    } else if ndims == 4 && metadata_ndims == 3 {
        if config.require_channel_first && !is_channel_first(array.shape()) {
            return Err(VolumeError::dimensionality_mismatch(format!(
                "4D array with shape {:?} is not channel-first",
                array.shape()
            )));
        }
        info!(shape = ?array.shape(), "expanding 3D metadata to 4D");
        expand_to_4d(&geometry)
    } else {
        return Err(VolumeError::dimensionality_mismatch(format!(
            "array has {} dimensions but metadata has {}",
            ndims, metadata_ndims
        )));
    };

    let is_seg = metadata.seg_flag();
    debug!(ndims, metadata_ndims, ?is_seg, "reconciled loaded image");

    Ok(LoadedVolume {
        array,
        spacing,
        origin,
        direction,
        header: metadata,
        is_seg,
    })
}

/// Prepare a volume for a codec that holds at most `max_geometry_ndims` axes.
///
/// Unset geometry is written as the canonical default. The returned header is
/// a copy with the segmentation flag encoded; the volume is not modified.
pub fn prepare_for_save<'a>(
    volume: &'a Volume,
    max_geometry_ndims: usize,
    config: &AdapterConfig,
) -> Result<RawImageRef<'a>> {
    let ndims = volume.ndims();
    let kept = if ndims > max_geometry_ndims {
        match config.four_d_policy {
            FourDPolicy::Reject => {
                return Err(VolumeError::unsupported_dimensionality(format!(
                    "format holds {}D geometry, volume is {}D",
                    max_geometry_ndims, ndims
                )));
            }
            FourDPolicy::Truncate => {
                warn!(
                    ndims,
                    kept = max_geometry_ndims,
                    "dropping geometry axes the format cannot store"
                );
                max_geometry_ndims
            }
        }
    } else {
        ndims
    };

    let spacing = volume
        .spacing()
        .cloned()
        .unwrap_or_else(|| Spacing::uniform(ndims, 1.0));
    let origin = volume
        .origin()
        .cloned()
        .unwrap_or_else(|| Origin::zeros(ndims));
    let direction = volume
        .direction()
        .cloned()
        .unwrap_or_else(|| Direction::identity(ndims));

    let d = direction.inner();
    let geometry = AxisGeometry {
        spacing: spacing.as_slice()[..kept].to_vec(),
        origin: origin.as_slice()[..kept].to_vec(),
        direction: (0..kept)
            .flat_map(|i| (0..kept).map(move |j| d[(i, j)]))
            .collect(),
    };

    let mut metadata = volume.header().cloned().unwrap_or_default();
    metadata.set_seg_flag(volume.is_seg());

    Ok(RawImageRef {
        array: reverse_array_view(volume.array().view()),
        geometry: reverse_geometry(&geometry),
        metadata,
    })
}

fn is_channel_first(shape: &[usize]) -> bool {
    match shape.split_first() {
        Some((first, rest)) => rest.iter().all(|s| first <= s),
        None => false,
    }
}

fn expand_to_4d(geometry: &AxisGeometry) -> (Spacing, Origin, Direction) {
    let mut spacing = geometry.spacing.clone();
    spacing.push(1.0);
    let mut origin = geometry.origin.clone();
    origin.push(0.0);

    let d = &geometry.direction;
    let direction = Direction(nalgebra::DMatrix::from_fn(4, 4, |i, j| {
        if i < 3 && j < 3 {
            d[i * 3 + j]
        } else if i == 3 && j == 3 {
            1.0
        } else {
            0.0
        }
    }));

    (Spacing::new(spacing), Origin::new(origin), direction)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::IxDyn;

    fn raw(shape: &[usize], geometry: AxisGeometry) -> RawImage {
        RawImage {
            array: ArrayD::zeros(IxDyn(shape)),
            geometry,
            metadata: Header::new(),
        }
    }

    fn geometry_3d() -> AxisGeometry {
        AxisGeometry {
            spacing: vec![0.5, 0.75, 2.0],
            origin: vec![10.0, 20.0, 30.0],
            direction: vec![1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0],
        }
    }

    #[test]
    fn test_load_matching_rank_reverses_axes() {
        let loaded = reconcile_loaded(raw(&[4, 5, 6], geometry_3d()), &AdapterConfig::default()).unwrap();
        assert_eq!(loaded.array.shape(), &[6, 5, 4]);
        assert_eq!(loaded.spacing.to_vec(), vec![2.0, 0.75, 0.5]);
        assert_eq!(loaded.origin.to_vec(), vec![30.0, 20.0, 10.0]);
        assert_eq!(loaded.direction, Direction::identity(3));
        assert_eq!(loaded.is_seg, None);
    }

    #[test]
    fn test_load_expands_3d_metadata_for_4d_array() {
        // Codec order [x, y, z, t] -> volume order [t, z, y, x]
        let loaded = reconcile_loaded(raw(&[8, 7, 6, 2], geometry_3d()), &AdapterConfig::default()).unwrap();
        assert_eq!(loaded.array.shape(), &[2, 6, 7, 8]);
        assert_eq!(loaded.spacing.to_vec(), vec![2.0, 0.75, 0.5, 1.0]);
        assert_eq!(loaded.origin.to_vec(), vec![30.0, 20.0, 10.0, 0.0]);
        assert_eq!(loaded.direction, Direction::identity(4));
    }

    #[test]
    fn test_load_expansion_keeps_rotation_block() {
        let mut geometry = geometry_3d();
        geometry.direction = vec![0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0];
        let loaded = reconcile_loaded(raw(&[8, 7, 6, 2], geometry), &AdapterConfig::default()).unwrap();
        let d = &loaded.direction;
        // reversed block of [[0,-1,0],[1,0,0],[0,0,1]]
        assert_eq!(d[(0, 0)], 1.0);
        assert_eq!(d[(1, 2)], 1.0);
        assert_eq!(d[(2, 1)], -1.0);
        assert_eq!(d[(3, 3)], 1.0);
        assert_eq!(d[(0, 3)], 0.0);
        assert_eq!(d[(3, 0)], 0.0);
    }

    #[test]
    fn test_load_rejects_non_channel_first_4d() {
        // volume order would be [9, 6, 7, 8]: axis 1 is the smallest
        let result = reconcile_loaded(raw(&[8, 7, 6, 9], geometry_3d()), &AdapterConfig::default());
        assert!(matches!(result, Err(VolumeError::DimensionalityMismatch(_))));

        let relaxed = AdapterConfig::new().without_channel_first_check();
        assert!(reconcile_loaded(raw(&[8, 7, 6, 9], geometry_3d()), &relaxed).is_ok());
    }

    #[test]
    fn test_load_rejects_other_rank_combinations() {
        let result = reconcile_loaded(raw(&[4, 5], geometry_3d()), &AdapterConfig::default());
        assert!(matches!(result, Err(VolumeError::DimensionalityMismatch(_))));

        let result = reconcile_loaded(raw(&[2, 3, 4, 5, 6], geometry_3d()), &AdapterConfig::default());
        assert!(matches!(result, Err(VolumeError::DimensionalityMismatch(_))));
    }

    #[test]
    fn test_load_decodes_seg_flag() {
        let mut image = raw(&[4, 5, 6], geometry_3d());
        image.metadata.insert("intent_name", "medvol_seg");
        image.metadata.insert("descrip", "labels");
        let loaded = reconcile_loaded(image, &AdapterConfig::default()).unwrap();
        assert_eq!(loaded.is_seg, Some(true));
        assert_eq!(loaded.header.get("descrip"), Some("labels"));
    }

    #[test]
    fn test_channel_first_detection() {
        assert!(is_channel_first(&[2, 5, 5, 5]));
        assert!(is_channel_first(&[5, 5, 5, 5]));
        assert!(!is_channel_first(&[5, 2, 5, 5]));
    }
}
