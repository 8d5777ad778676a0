//! Volume construction, validation and copy resolution.
//!
//! A volume comes either from an in-memory array plus optional metadata, or
//! from a file read through an [`ImageCodec`]. The two are mutually exclusive.
//! Fields the caller leaves unset are taken from a template volume when one is
//! given (`copy_from`), otherwise from canonical defaults: unit spacing, zero
//! origin, identity direction and an empty header.

use std::io;
use std::path::{Path, PathBuf};

use ndarray::{Array, ArrayD, Dimension};
use serde_json::Value;
use tracing::debug;

use super::header::Header;
use super::volume::Volume;
use crate::adapter::{reconcile_loaded, AdapterConfig, ImageCodec};
use crate::error::{Result, VolumeError};
use crate::field::Field;
use crate::spatial::{Direction, Origin, Spacing};

/// Where the voxel data comes from.
#[derive(Debug, Clone)]
pub enum Source {
    Array(ArrayD<f32>),
    Path(PathBuf),
}

impl<D: Dimension> From<Array<f32, D>> for Source {
    fn from(array: Array<f32, D>) -> Self {
        Source::Array(array.into_dyn())
    }
}

impl From<PathBuf> for Source {
    fn from(path: PathBuf) -> Self {
        Source::Path(path)
    }
}

impl From<&Path> for Source {
    fn from(path: &Path) -> Self {
        Source::Path(path.to_path_buf())
    }
}

impl From<&str> for Source {
    fn from(path: &str) -> Self {
        Source::Path(PathBuf::from(path))
    }
}

/// Options controlling how a volume is built.
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Fill unset geometry and header with canonical defaults.
    pub fill_defaults: bool,
    /// Settings used when the source is a file.
    pub adapter: AdapterConfig,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            fill_defaults: true,
            adapter: AdapterConfig::default(),
        }
    }
}

impl BuildOptions {
    /// Create build options with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Leave unset fields unset instead of filling canonical defaults.
    pub fn without_defaults(mut self) -> Self {
        self.fill_defaults = false;
        self
    }

    /// Set the adapter configuration used for file sources.
    pub fn with_adapter_config(mut self, adapter: AdapterConfig) -> Self {
        self.adapter = adapter;
        self
    }
}

/// Builder for [`Volume`].
#[derive(Debug, Clone)]
pub struct VolumeBuilder<'a> {
    source: Source,
    fields: Fields<'a>,
}

#[derive(Debug, Clone, Default)]
struct Fields<'a> {
    spacing: Field<Spacing>,
    origin: Field<Origin>,
    direction: Field<Direction>,
    header: Field<Header>,
    is_seg: Field<bool>,
    template: Option<&'a Volume>,
    options: BuildOptions,
}

impl<'a> VolumeBuilder<'a> {
    pub fn new(source: impl Into<Source>) -> Self {
        Self {
            source: source.into(),
            fields: Fields::default(),
        }
    }

    pub fn spacing(mut self, spacing: impl Into<Spacing>) -> Self {
        self.fields.spacing = Field::Explicit(spacing.into());
        self
    }

    pub fn origin(mut self, origin: impl Into<Origin>) -> Self {
        self.fields.origin = Field::Explicit(origin.into());
        self
    }

    pub fn direction(mut self, direction: impl Into<Direction>) -> Self {
        self.fields.direction = Field::Explicit(direction.into());
        self
    }

    pub fn header(mut self, header: impl Into<Header>) -> Self {
        self.fields.header = Field::Explicit(header.into());
        self
    }

    pub fn is_seg(mut self, is_seg: bool) -> Self {
        self.fields.is_seg = Field::Explicit(is_seg);
        self
    }

    /// Take every field left unset from `template`.
    pub fn copy_from(mut self, template: &'a Volume) -> Self {
        self.fields.template = Some(template);
        self
    }

    pub fn options(mut self, options: BuildOptions) -> Self {
        self.fields.options = options;
        self
    }

    /// Apply untyped metadata, e.g. a JSON sidecar.
    ///
    /// Recognised keys are `spacing`, `origin` (arrays of numbers), `direction`
    /// (array of rows), `header` (object of strings) and `is_seg` (boolean).
    /// `null` leaves a field unset; unknown keys are ignored.
    pub fn metadata_json(mut self, metadata: &Value) -> Result<Self> {
        let object = metadata
            .as_object()
            .ok_or_else(|| VolumeError::invalid_header("metadata must be a JSON object"))?;

        for (key, value) in object {
            if value.is_null() {
                continue;
            }
            match key.as_str() {
                "spacing" => {
                    self.fields.spacing = Field::Explicit(Spacing::new(json_numbers("spacing", value)?));
                }
                "origin" => {
                    self.fields.origin = Field::Explicit(Origin::new(json_numbers("origin", value)?));
                }
                "direction" => {
                    let rows = value
                        .as_array()
                        .ok_or_else(|| {
                            VolumeError::invalid_geometry("direction must be a sequence of rows")
                        })?
                        .iter()
                        .map(|row| json_numbers("direction", row))
                        .collect::<Result<Vec<_>>>()?;
                    self.fields.direction = Field::Explicit(Direction::from_rows(&rows)?);
                }
                "header" => {
                    self.fields.header = Field::Explicit(json_header(value)?);
                }
                "is_seg" => match value {
                    Value::Bool(flag) => self.fields.is_seg = Field::Explicit(*flag),
                    other => {
                        return Err(VolumeError::invalid_flag(format!(
                            "is_seg must be a boolean, got {}",
                            other
                        )));
                    }
                },
                other => debug!(key = other, "ignoring unknown metadata key"),
            }
        }
        Ok(self)
    }

    /// Build from an in-memory array.
    ///
    /// A path source needs a codec: use [`build_with`](Self::build_with).
    pub fn build(self) -> Result<Volume> {
        self.check_conflicts()?;
        match self.source {
            Source::Array(array) => self.fields.assemble(array),
            Source::Path(path) => Err(VolumeError::Io(io::Error::new(
                io::ErrorKind::Unsupported,
                format!("no codec given to read {}", path.display()),
            ))),
        }
    }

    /// Build from either source, reading files through `codec`.
    pub fn build_with<C: ImageCodec + ?Sized>(self, codec: &C) -> Result<Volume> {
        self.check_conflicts()?;
        match self.source {
            Source::Array(array) => self.fields.assemble(array),
            Source::Path(path) => {
                debug!(path = %path.display(), "loading volume");
                let raw = codec.read(&path)?;
                let loaded = reconcile_loaded(raw, &self.fields.options.adapter)?;
                let fields = Fields {
                    spacing: Field::Explicit(loaded.spacing),
                    origin: Field::Explicit(loaded.origin),
                    direction: Field::Explicit(loaded.direction),
                    header: Field::Explicit(loaded.header),
                    is_seg: Field::from_option(loaded.is_seg),
                    template: None,
                    options: self.fields.options,
                };
                fields.assemble(loaded.array)
            }
        }
    }

    fn check_conflicts(&self) -> Result<()> {
        if !matches!(self.source, Source::Path(_)) {
            return Ok(());
        }
        let f = &self.fields;
        let set: Vec<&str> = [
            ("spacing", !f.spacing.is_unset()),
            ("origin", !f.origin.is_unset()),
            ("direction", !f.direction.is_unset()),
            ("header", !f.header.is_unset()),
            ("is_seg", !f.is_seg.is_unset()),
            ("copy", f.template.is_some()),
        ]
        .into_iter()
        .filter_map(|(name, is_set)| is_set.then_some(name))
        .collect();

        if set.is_empty() {
            Ok(())
        } else {
            Err(VolumeError::conflicting_arguments(format!(
                "{} cannot be set when loading from a file",
                set.join(", ")
            )))
        }
    }
}

impl<'a> Fields<'a> {
    fn assemble(self, array: ArrayD<f32>) -> Result<Volume> {
        let ndims = array.ndim();
        if !(2..=4).contains(&ndims) {
            return Err(VolumeError::invalid_shape(format!(
                "array must be 2D, 3D or 4D, got shape {:?}",
                array.shape()
            )));
        }

        let Fields {
            mut spacing,
            mut origin,
            mut direction,
            mut header,
            mut is_seg,
            template,
            options,
        } = self;

        if let Some(template) = template {
            spacing = spacing.or_inherit(&template.spacing);
            origin = origin.or_inherit(&template.origin);
            direction = direction.or_inherit(&template.direction);
            header = header.or_inherit(&template.header);
            is_seg = is_seg.or_inherit(&template.is_seg);
        }

        if options.fill_defaults {
            spacing = spacing.or_default_with(|| Spacing::uniform(ndims, 1.0));
            origin = origin.or_default_with(|| Origin::zeros(ndims));
            direction = direction.or_default_with(|| Direction::identity(ndims));
            header = header.or_default_with(Header::new);
        }

        if let Some(spacing) = spacing.value() {
            spacing.validate(ndims)?;
        }
        if let Some(origin) = origin.value() {
            origin.validate(ndims)?;
        }
        if let Some(direction) = direction.value() {
            direction.validate(ndims)?;
        }

        Ok(Volume {
            array,
            spacing,
            origin,
            direction,
            header,
            is_seg,
        })
    }
}

fn json_numbers(name: &str, value: &Value) -> Result<Vec<f64>> {
    let items = value.as_array().ok_or_else(|| {
        VolumeError::invalid_geometry(format!("{} must be a sequence of numbers", name))
    })?;
    items
        .iter()
        .map(|item| {
            item.as_f64().ok_or_else(|| {
                VolumeError::invalid_geometry(format!("{} must contain real values, got {}", name, item))
            })
        })
        .collect()
}

fn json_header(value: &Value) -> Result<Header> {
    let object = value
        .as_object()
        .ok_or_else(|| VolumeError::invalid_header("header must be a mapping of strings"))?;
    object
        .iter()
        .map(|(key, value)| match value.as_str() {
            Some(text) => Ok((key.clone(), text.to_string())),
            None => Err(VolumeError::invalid_header(format!(
                "header value for {} must be a string, got {}",
                key, value
            ))),
        })
        .collect()
}
