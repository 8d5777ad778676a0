//! Codec selection by file extension.

use std::io;
use std::path::Path;

use medvol_core::error::{Result, VolumeError};
use medvol_core::{AdapterConfig, ImageCodec, Volume};

use crate::nifti_io::NiftiCodec;
use crate::nrrd_io::NrrdCodec;

/// Supported on-disk formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// `.nii`, `.nii.gz`
    Nifti,
    /// `.nrrd`
    Nrrd,
}

impl Format {
    /// Pick the format from a file name, ignoring case.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_ascii_lowercase)
            .unwrap_or_default();
        if name.ends_with(".nii") || name.ends_with(".nii.gz") {
            Ok(Format::Nifti)
        } else if name.ends_with(".nrrd") {
            Ok(Format::Nrrd)
        } else {
            Err(VolumeError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no codec for {}", path.display()),
            )))
        }
    }

    /// The format's codec with default settings.
    pub fn codec(self) -> Box<dyn ImageCodec> {
        match self {
            Format::Nifti => Box::new(NiftiCodec::default()),
            Format::Nrrd => Box::new(NrrdCodec::default()),
        }
    }
}

/// Default codec for `path`.
pub fn codec_for_path(path: &Path) -> Result<Box<dyn ImageCodec>> {
    Ok(Format::from_path(path)?.codec())
}

/// Load a volume, choosing the codec from the file extension.
pub fn load<P: AsRef<Path>>(path: P) -> Result<Volume> {
    let path = path.as_ref();
    let codec = codec_for_path(path)?;
    Volume::load(path, codec.as_ref())
}

/// Save a volume with the default adapter settings.
pub fn save<P: AsRef<Path>>(volume: &Volume, path: P) -> Result<()> {
    save_with_config(volume, path, &AdapterConfig::default())
}

/// Save a volume, choosing the codec from the file extension.
pub fn save_with_config<P: AsRef<Path>>(
    volume: &Volume,
    path: P,
    config: &AdapterConfig,
) -> Result<()> {
    let path = path.as_ref();
    let codec = codec_for_path(path)?;
    volume.save(path, codec.as_ref(), config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(Format::from_path(Path::new("a/b.nii")).unwrap(), Format::Nifti);
        assert_eq!(Format::from_path(Path::new("b.NII.GZ")).unwrap(), Format::Nifti);
        assert_eq!(Format::from_path(Path::new("4d_img.nrrd")).unwrap(), Format::Nrrd);
        assert!(matches!(
            Format::from_path(Path::new("scan.mha")),
            Err(VolumeError::Io(e)) if e.kind() == io::ErrorKind::Unsupported
        ));
        assert!(Format::from_path(Path::new("nii")).is_err());
    }

    #[test]
    fn test_codec_geometry_limits() {
        assert_eq!(Format::Nifti.codec().max_geometry_ndims(), 3);
        assert_eq!(Format::Nrrd.codec().max_geometry_ndims(), 3);
    }
}
