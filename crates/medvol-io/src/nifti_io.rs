//! NIfTI-1 codec.
//!
//! Geometry is read from the sform when present, then the qform, then plain
//! `pixdim` scaling. A zero or non-finite `pixdim` reads as 1. On write both
//! transforms are filled in from the volume geometry. Files ending in `.gz`
//! are compressed.
//!
//! Header geometry is stored as `f32`, so spacing and origin come back
//! rounded to single precision. Reading that file and saving it again is
//! stable.

use std::path::Path;
use std::str::FromStr;

use medvol_core::adapter::{AxisGeometry, RawImage, RawImageRef};
use medvol_core::error::{Result, VolumeError};
use medvol_core::{Direction, Header, ImageCodec};
use nalgebra::{DMatrix, Matrix3, Rotation3, UnitQuaternion, Vector3};
use nifti::writer::WriterOptions;
use nifti::{IntoNdArray, NiftiError, NiftiHeader, NiftiObject, ReaderOptions};
use tracing::{debug, warn};

/// `xyzt_units`: millimetres and seconds.
const UNITS_MM_SEC: u8 = 2 | 8;
/// `qform_code`: scanner-based anatomical coordinates.
const XFORM_SCANNER_ANAT: i16 = 1;

/// NIfTI-1 reader and writer.
#[derive(Debug, Clone)]
pub struct NiftiCodec {
    sform_code: i16,
    write_qform: bool,
}

impl Default for NiftiCodec {
    fn default() -> Self {
        Self {
            sform_code: XFORM_SCANNER_ANAT,
            write_qform: true,
        }
    }
}

impl NiftiCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the `sform_code` written to new files. Zero disables the sform.
    pub fn with_sform_code(mut self, code: i16) -> Self {
        self.sform_code = code;
        self
    }

    /// Do not write a qform. By default one is written whenever the direction
    /// matrix is orthonormal.
    pub fn without_qform(mut self) -> Self {
        self.write_qform = false;
        self
    }
}

impl ImageCodec for NiftiCodec {
    fn read(&self, path: &Path) -> Result<RawImage> {
        let obj = ReaderOptions::new().read_file(path).map_err(nifti_error)?;
        let header = obj.header().clone();
        let array = obj
            .into_volume()
            .into_ndarray::<f32>()
            .map_err(nifti_error)?;

        let geometry_ndims = array.ndim().min(3);
        let geometry = geometry_from_affine(&header_affine(&header), geometry_ndims);
        let metadata = header_metadata(&header);
        debug!(
            path = %path.display(),
            shape = ?array.shape(),
            sform_code = header.sform_code,
            qform_code = header.qform_code,
            "read NIfTI image"
        );

        Ok(RawImage {
            array,
            geometry,
            metadata,
        })
    }

    fn write(&self, image: &RawImageRef<'_>, path: &Path) -> Result<()> {
        let header = self.build_header(image)?;
        WriterOptions::new(path)
            .reference_header(&header)
            .write_nifti(&image.array)
            .map_err(nifti_error)?;
        debug!(path = %path.display(), shape = ?image.array.shape(), "wrote NIfTI image");
        Ok(())
    }
}

impl NiftiCodec {
    fn build_header(&self, image: &RawImageRef<'_>) -> Result<NiftiHeader> {
        let geometry = &image.geometry;
        if geometry.ndims() > 3 {
            return Err(VolumeError::unsupported_dimensionality(format!(
                "NIfTI holds at most 3D geometry, got {}D",
                geometry.ndims()
            )));
        }
        let (spacing, origin, direction) = pad_to_3d(geometry);

        let mut header = NiftiHeader::default();
        header.qform_code = 0;
        let linear = direction * Matrix3::from_diagonal(&spacing);
        header.srow_x = srow(&linear, &origin, 0);
        header.srow_y = srow(&linear, &origin, 1);
        header.srow_z = srow(&linear, &origin, 2);
        header.sform_code = self.sform_code;
        for (i, s) in spacing.iter().enumerate() {
            header.pixdim[i + 1] = *s as f32;
        }
        header.xyzt_units = UNITS_MM_SEC;
        header.scl_slope = 1.0;
        header.scl_inter = 0.0;

        let axes = Direction(DMatrix::from_iterator(3, 3, direction.iter().copied()));
        if self.write_qform && axes.is_orthogonal() {
            set_qform(&mut header, &direction, &origin, axes.determinant() < 0.0);
        }
        apply_metadata(&mut header, &image.metadata)?;
        Ok(header)
    }
}

fn nifti_error(err: NiftiError) -> VolumeError {
    match err {
        NiftiError::Io(e) => VolumeError::Io(e),
        other => VolumeError::codec(other.to_string()),
    }
}

/// Rows of the voxel-to-world transform, `[r0, r1, r2]` with the translation last.
fn header_affine(header: &NiftiHeader) -> [[f64; 4]; 3] {
    let rows = if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z]
    } else if header.qform_code > 0 {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();

        let qfac = if header.pixdim[0] < 0.0 { -1.0 } else { 1.0 };

        let dx = voxel_size(header.pixdim[1]);
        let dy = voxel_size(header.pixdim[2]);
        let dz = voxel_size(header.pixdim[3]) * qfac;

        [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z,
            ],
        ]
    } else {
        [
            [voxel_size(header.pixdim[1]), 0.0, 0.0, 0.0],
            [0.0, voxel_size(header.pixdim[2]), 0.0, 0.0],
            [0.0, 0.0, voxel_size(header.pixdim[3]), 0.0],
        ]
    };
    rows.map(|row| row.map(f64::from))
}

/// Unset (zero) or corrupt `pixdim` entries read as unit spacing.
fn voxel_size(pixdim: f32) -> f32 {
    if pixdim.is_finite() && pixdim != 0.0 {
        pixdim.abs()
    } else {
        1.0
    }
}

/// Split an affine into spacing (column norms), origin and direction cosines,
/// keeping the first `ndims` axes.
fn geometry_from_affine(affine: &[[f64; 4]; 3], ndims: usize) -> AxisGeometry {
    let spacing: Vec<f64> = (0..ndims)
        .map(|j| affine.iter().map(|row| row[j] * row[j]).sum::<f64>().sqrt())
        .collect();
    let origin = (0..ndims).map(|i| affine[i][3]).collect();

    let mut direction = Vec::with_capacity(ndims * ndims);
    for i in 0..ndims {
        for j in 0..ndims {
            // degenerate columns fall back to the unit axis
            direction.push(if spacing[j] > 1e-9 {
                affine[i][j] / spacing[j]
            } else if i == j {
                1.0
            } else {
                0.0
            });
        }
    }

    AxisGeometry {
        spacing,
        origin,
        direction,
    }
}

fn pad_to_3d(geometry: &AxisGeometry) -> (Vector3<f64>, Vector3<f64>, Matrix3<f64>) {
    let n = geometry.ndims();
    let spacing = Vector3::from_fn(|i, _| geometry.spacing.get(i).copied().unwrap_or(1.0));
    let origin = Vector3::from_fn(|i, _| geometry.origin.get(i).copied().unwrap_or(0.0));
    let direction = Matrix3::from_fn(|i, j| {
        if i < n && j < n {
            geometry.direction[i * n + j]
        } else if i == j {
            1.0
        } else {
            0.0
        }
    });
    (spacing, origin, direction)
}

fn srow(linear: &Matrix3<f64>, origin: &Vector3<f64>, row: usize) -> [f32; 4] {
    [
        linear[(row, 0)] as f32,
        linear[(row, 1)] as f32,
        linear[(row, 2)] as f32,
        origin[row] as f32,
    ]
}

/// Fill the qform from an orthonormal direction. A reflection is stored as
/// `qfac = -1` with the third column negated.
fn set_qform(
    header: &mut NiftiHeader,
    direction: &Matrix3<f64>,
    origin: &Vector3<f64>,
    reflected: bool,
) {
    let mut rotation = *direction;
    let qfac = if reflected {
        rotation.column_mut(2).neg_mut();
        -1.0
    } else {
        1.0
    };

    let q = UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix(&rotation)).into_inner();
    // the NIfTI quaternion keeps a >= 0
    let sign = if q.w < 0.0 { -1.0 } else { 1.0 };

    header.quatern_b = (sign * q.i) as f32;
    header.quatern_c = (sign * q.j) as f32;
    header.quatern_d = (sign * q.k) as f32;
    header.quatern_x = origin[0] as f32;
    header.quatern_y = origin[1] as f32;
    header.quatern_z = origin[2] as f32;
    header.pixdim[0] = qfac;
    header.qform_code = XFORM_SCANNER_ANAT;
}

/// Header fields exposed as volume metadata.
fn header_metadata(header: &NiftiHeader) -> Header {
    let mut metadata = Header::new();

    for (key, bytes) in [
        ("intent_name", &header.intent_name[..]),
        ("descrip", &header.descrip[..]),
        ("aux_file", &header.aux_file[..]),
    ] {
        let text = c_string(bytes);
        if !text.is_empty() {
            metadata.insert(key, text);
        }
    }

    metadata.insert("intent_code", header.intent_code.to_string());
    metadata.insert("intent_p1", header.intent_p1.to_string());
    metadata.insert("intent_p2", header.intent_p2.to_string());
    metadata.insert("intent_p3", header.intent_p3.to_string());
    metadata.insert("qform_code", header.qform_code.to_string());
    metadata.insert("sform_code", header.sform_code.to_string());
    metadata.insert("xyzt_units", header.xyzt_units.to_string());
    metadata.insert("cal_min", header.cal_min.to_string());
    metadata.insert("cal_max", header.cal_max.to_string());
    metadata.insert("slice_code", header.slice_code.to_string());
    metadata.insert("slice_duration", header.slice_duration.to_string());
    metadata.insert("toffset", header.toffset.to_string());
    metadata.insert("datatype", header.datatype.to_string());
    metadata.insert("bitpix", header.bitpix.to_string());
    metadata.insert("dim_info", header.dim_info.to_string());

    metadata
}

/// Write metadata entries back into header fields.
///
/// Entries derived from the data or geometry are recomputed, not copied.
/// Entries with no matching field are dropped.
fn apply_metadata(header: &mut NiftiHeader, metadata: &Header) -> Result<()> {
    for (key, value) in metadata.iter() {
        match key {
            "intent_name" => write_c_string(key, &mut header.intent_name[..], value)?,
            "descrip" => write_c_string(key, &mut header.descrip[..], value)?,
            "aux_file" => write_c_string(key, &mut header.aux_file[..], value)?,
            "intent_code" => header.intent_code = parse_value(key, value)?,
            "intent_p1" => header.intent_p1 = parse_value(key, value)?,
            "intent_p2" => header.intent_p2 = parse_value(key, value)?,
            "intent_p3" => header.intent_p3 = parse_value(key, value)?,
            "xyzt_units" => header.xyzt_units = parse_value(key, value)?,
            "cal_min" => header.cal_min = parse_value(key, value)?,
            "cal_max" => header.cal_max = parse_value(key, value)?,
            "slice_code" => header.slice_code = parse_value(key, value)?,
            "slice_duration" => header.slice_duration = parse_value(key, value)?,
            "toffset" => header.toffset = parse_value(key, value)?,
            "dim_info" => header.dim_info = parse_value(key, value)?,
            "qform_code" | "sform_code" | "datatype" | "bitpix" => {}
            other => warn!(key = other, "dropping header entry with no NIfTI field"),
        }
    }
    Ok(())
}

fn parse_value<T>(key: &str, value: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    value.trim().parse().map_err(|e| {
        VolumeError::invalid_header(format!("{}: cannot parse {:?}: {}", key, value, e))
    })
}

fn c_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn write_c_string(key: &str, target: &mut [u8], value: &str) -> Result<()> {
    let bytes = value.as_bytes();
    if bytes.len() > target.len() {
        return Err(VolumeError::invalid_header(format!(
            "{} holds at most {} bytes, got {}",
            key,
            target.len(),
            bytes.len()
        )));
    }
    target.fill(0);
    target[..bytes.len()].copy_from_slice(bytes);
    Ok(())
}
