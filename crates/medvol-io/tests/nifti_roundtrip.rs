use anyhow::Result;
use medvol_core::{AdapterConfig, Header, Volume, VolumeError};
use medvol_io::{load, save, save_with_config, NiftiCodec};
use nalgebra::{DMatrix, Rotation3, Vector3};
use ndarray::{Array3, ArrayD, IxDyn};
use nifti::writer::WriterOptions;
use nifti::{NiftiHeader, NiftiObject, ReaderOptions};
use tempfile::tempdir;

fn ramp(shape: &[usize]) -> ArrayD<f32> {
    let mut counter = 0.0f32;
    ArrayD::from_shape_simple_fn(IxDyn(shape), || {
        counter += 0.5;
        counter
    })
}

// geometry below is exactly representable in f32, the precision NIfTI stores
#[test]
fn test_3d_roundtrip_is_exact() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("t1.nii.gz");

    let volume = Volume::builder(ramp(&[5, 4, 3]))
        .spacing([0.5, 1.25, 2.0])
        .origin([-90.5, 12.0, 3.25])
        .direction([[0.0, 0.0, -1.0], [0.0, 1.0, 0.0], [1.0, 0.0, 0.0]])
        .build()?;
    save(&volume, &path)?;
    let loaded = load(&path)?;

    assert_eq!(loaded.shape(), &[5, 4, 3]);
    assert_eq!(loaded.array(), volume.array());
    assert_eq!(loaded.spacing(), volume.spacing());
    assert_eq!(loaded.origin(), volume.origin());
    assert_eq!(loaded.direction(), volume.direction());
    assert_eq!(loaded.affine()?, volume.affine()?);
    Ok(())
}

#[test]
fn test_2d_roundtrip_is_exact() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("slice.nii");

    let volume = Volume::builder(ramp(&[6, 9]))
        .spacing([0.75, 3.0])
        .origin([4.0, -8.5])
        .direction([[0.0, 1.0], [1.0, 0.0]])
        .build()?;
    save(&volume, &path)?;
    let loaded = load(&path)?;

    assert_eq!(loaded.ndims(), 2);
    assert_eq!(loaded.array(), volume.array());
    assert_eq!(loaded.affine()?, volume.affine()?);
    Ok(())
}

#[test]
fn test_4d_roundtrip() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("dwi.nii.gz");

    let volume = Volume::builder(ramp(&[2, 3, 4, 5]))
        .spacing([7.0, 2.0, 2.0, 2.0])
        .origin([3.0, 1.0, 2.0, 3.0])
        .build()?;
    save(&volume, &path)?;
    let loaded = load(&path)?;

    assert_eq!(loaded.shape(), &[2, 3, 4, 5]);
    assert_eq!(loaded.array(), volume.array());
    assert_eq!(loaded.spacing().unwrap().to_vec(), vec![7.0, 2.0, 2.0, 1.0]);
    assert_eq!(loaded.origin().unwrap().to_vec(), vec![3.0, 1.0, 2.0, 0.0]);

    let affine = loaded.affine()?;
    assert_eq!(affine[(3, 3)], 1.0);
    assert_eq!(affine[(3, 4)], 0.0);
    Ok(())
}

#[test]
fn test_4d_truncation_keeps_leading_internal_axes() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("channels.nii");

    let volume = Volume::builder(ramp(&[2, 3, 4, 5]))
        .spacing([7.0, 3.0, 2.0, 1.5])
        .build()?;
    save(&volume, &path)?;

    // the channel axis spacing lands on file z, x spacing is dropped
    let stored = ReaderOptions::new().read_file(&path)?;
    assert_eq!(stored.header().dim[..5], [4, 5, 4, 3, 2]);
    assert_eq!(stored.header().pixdim[1..4], [2.0, 3.0, 7.0]);

    let loaded = load(&path)?;
    assert_eq!(loaded.spacing().unwrap().to_vec(), vec![7.0, 3.0, 2.0, 1.0]);
    Ok(())
}

#[test]
fn test_4d_save_rejected() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("dwi.nii.gz");

    let volume = Volume::from_array(ramp(&[2, 3, 4, 5]))?;
    let result = save_with_config(&volume, &path, &AdapterConfig::new().rejecting_four_d());
    assert!(matches!(result, Err(VolumeError::UnsupportedDimensionality(_))));
    assert!(!path.exists());
    Ok(())
}

#[test]
fn test_seg_flag_and_header_persist() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("mask.nii.gz");

    let mut header = Header::new();
    header.insert("descrip", "hippocampus labels");
    header.insert("PatientName", "anonymous");
    let volume = Volume::builder(ramp(&[3, 3, 3]))
        .header(header)
        .is_seg(true)
        .build()?;
    save(&volume, &path)?;
    let loaded = load(&path)?;

    assert_eq!(loaded.is_seg(), Some(true));
    let loaded_header = loaded.header().unwrap();
    assert_eq!(loaded_header.get("intent_name"), Some("medvol_seg"));
    assert_eq!(loaded_header.get("descrip"), Some("hippocampus labels"));
    assert_eq!(loaded_header.get("PatientName"), None);
    assert_eq!(loaded_header.get("sform_code"), Some("1"));
    Ok(())
}

#[test]
fn test_unset_seg_flag_reads_back_as_image() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("image.nii");

    let volume = Volume::from_array(ramp(&[3, 3, 3]))?;
    save(&volume, &path)?;
    assert_eq!(load(&path)?.is_seg(), Some(false));
    Ok(())
}

#[test]
fn test_unparsable_header_value() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("bad.nii");

    let header: Header = [("cal_max", "bright")].into_iter().collect();
    let volume = Volume::builder(ramp(&[3, 3])).header(header).build()?;
    assert!(matches!(save(&volume, &path), Err(VolumeError::InvalidHeader(_))));
    Ok(())
}

#[test]
fn test_qform_only_file() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("qform.nii");

    let rotation = Rotation3::from_axis_angle(&Vector3::x_axis(), 0.4);
    let direction = DMatrix::from_iterator(3, 3, rotation.matrix().iter().copied());
    let volume = Volume::builder(ramp(&[4, 4, 4]))
        .spacing([1.5, 1.0, 0.5])
        .origin([10.0, 20.0, 30.0])
        .direction(medvol_core::Direction(direction))
        .build()?;

    let codec = NiftiCodec::new().with_sform_code(0);
    volume.save(&path, &codec, &AdapterConfig::default())?;
    let loaded = Volume::load(&path, &codec)?;

    assert_eq!(loaded.header().unwrap().get("sform_code"), Some("0"));
    let difference = (loaded.affine()? - volume.affine()?).abs().max();
    assert!(difference < 1e-5, "affine differs by {}", difference);
    Ok(())
}

#[test]
fn test_reads_pixdim_only_nifti_in_volume_axis_order() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("plain.nii");

    // file axes are x, y, z
    let data: Vec<f32> = (0..3 * 4 * 5).map(|v| v as f32).collect();
    let array = Array3::from_shape_vec((3, 4, 5), data)?;
    let mut header = NiftiHeader::default();
    header.sform_code = 0;
    header.qform_code = 0;
    header.pixdim = [1.0, 0.5, 0.75, 2.0, 1.0, 1.0, 1.0, 1.0];
    WriterOptions::new(&path)
        .reference_header(&header)
        .write_nifti(&array)?;

    let volume = load(&path)?;
    assert_eq!(volume.shape(), &[5, 4, 3]);
    assert_eq!(volume.array()[IxDyn(&[4, 2, 1])], array[[1, 2, 4]]);
    assert_eq!(volume.array()[IxDyn(&[0, 3, 2])], array[[2, 3, 0]]);
    assert_eq!(volume.spacing().unwrap().to_vec(), vec![2.0, 0.75, 0.5]);
    assert_eq!(volume.origin().unwrap().to_vec(), vec![0.0; 3]);
    assert_eq!(volume.is_seg(), None);
    Ok(())
}

#[test]
fn test_geometry_is_stored_in_single_precision() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("precision.nii");

    let volume = Volume::builder(ramp(&[3, 3, 3]))
        .spacing([0.7, 1.3, 2.9])
        .origin([0.1, -2.2, 3.3])
        .build()?;
    save(&volume, &path)?;
    let loaded = load(&path)?;

    let single = |values: [f64; 3]| values.map(|v| v as f32 as f64).to_vec();
    assert_eq!(loaded.spacing().unwrap().to_vec(), single([0.7, 1.3, 2.9]));
    assert_eq!(loaded.origin().unwrap().to_vec(), single([0.1, -2.2, 3.3]));
    assert_ne!(loaded.spacing(), volume.spacing());
    Ok(())
}

#[test]
fn test_resaving_a_loaded_volume_is_stable() -> Result<()> {
    let dir = tempdir()?;
    let first = dir.path().join("first.nii.gz");
    let second = dir.path().join("second.nii.gz");

    let rotation = Rotation3::from_euler_angles(0.3, -0.2, 1.1);
    let direction = DMatrix::from_iterator(3, 3, rotation.matrix().iter().copied());
    let volume = Volume::builder(ramp(&[4, 5, 6]))
        .spacing([0.7, 1.3, 2.9])
        .origin([-12.3, 4.56, 7.89])
        .direction(medvol_core::Direction(direction))
        .build()?;
    save(&volume, &first)?;
    let loaded = load(&first)?;
    save(&loaded, &second)?;
    let reloaded = load(&second)?;

    assert_eq!(reloaded.array(), loaded.array());
    assert_eq!(reloaded.spacing(), loaded.spacing());
    assert_eq!(reloaded.origin(), loaded.origin());
    assert_eq!(reloaded.direction(), loaded.direction());
    assert_eq!(reloaded.affine()?, loaded.affine()?);
    Ok(())
}

#[test]
fn test_zero_pixdim_loads_with_unit_spacing() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("unscaled.nii");

    let array = Array3::<f32>::zeros((2, 3, 4));
    let mut header = NiftiHeader::default();
    header.sform_code = 0;
    header.qform_code = 0;
    header.pixdim = [0.0; 8];
    WriterOptions::new(&path)
        .reference_header(&header)
        .write_nifti(&array)?;

    let volume = load(&path)?;
    assert_eq!(volume.shape(), &[4, 3, 2]);
    assert_eq!(volume.spacing().unwrap().to_vec(), vec![1.0; 3]);
    Ok(())
}

#[test]
fn test_missing_file_is_io_error() {
    let dir = tempdir().unwrap();
    let result = load(dir.path().join("missing.nii.gz"));
    assert!(matches!(result, Err(VolumeError::Io(_))));
}
