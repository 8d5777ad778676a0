//! NRRD codec.
//!
//! Reads attached-data NRRD files (`raw`, `gzip` or `ascii` encoding) of any
//! scalar type and writes `float` samples with `gzip` or `raw` encoding.
//! Geometry comes from `space directions` and `space origin`. Axes marked
//! `none` must come after the spatial ones. Without `space directions` the
//! per-axis `spacings` are used with an identity direction.
//!
//! Numbers are written with shortest round-trip formatting, so stored values
//! read back at full double precision. Coordinates are passed through as
//! stored: no conversion between named spaces is done.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use medvol_core::adapter::{AxisGeometry, RawImage, RawImageRef};
use medvol_core::error::{Result, VolumeError};
use medvol_core::{Header, ImageCodec};
use ndarray::{ArrayD, IxDyn, ShapeBuilder};
use tracing::{debug, warn};

/// Header fields exposed as volume metadata and written back as fields.
const DESCRIPTIVE_FIELDS: [&str; 2] = ["content", "space"];

/// Header fields recomputed from the data and geometry on write.
const DERIVED_FIELDS: [&str; 12] = [
    "type",
    "dimension",
    "space dimension",
    "sizes",
    "space directions",
    "space origin",
    "spacings",
    "endian",
    "encoding",
    "kinds",
    "data file",
    "byte skip",
];

/// Data encoding used when writing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum NrrdEncoding {
    #[default]
    Gzip,
    Raw,
}

impl NrrdEncoding {
    fn name(self) -> &'static str {
        match self {
            NrrdEncoding::Gzip => "gzip",
            NrrdEncoding::Raw => "raw",
        }
    }
}

/// NRRD reader and writer.
#[derive(Debug, Clone, Default)]
pub struct NrrdCodec {
    encoding: NrrdEncoding,
}

impl NrrdCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data encoding for new files.
    pub fn with_encoding(mut self, encoding: NrrdEncoding) -> Self {
        self.encoding = encoding;
        self
    }
}

impl ImageCodec for NrrdCodec {
    fn read(&self, path: &Path) -> Result<RawImage> {
        let bytes = std::fs::read(path)?;
        let (lines, data) = split_header(&bytes)?;
        let header = NrrdHeader::parse(&lines)?;

        let sizes = header.sizes()?;
        let type_name = header.required("type")?;
        let kind = ScalarType::parse(type_name)
            .ok_or_else(|| VolumeError::codec(format!("unsupported NRRD type {:?}", type_name)))?;
        let count: usize = sizes.iter().product();
        let samples = header.decode_data(data, kind, count)?;

        // first axis varies fastest
        let array = ArrayD::from_shape_vec(IxDyn(&sizes).f(), samples)
            .map_err(|e| VolumeError::codec(e.to_string()))?;
        let geometry = header.geometry(sizes.len())?;
        debug!(
            path = %path.display(),
            shape = ?array.shape(),
            geometry_ndims = geometry.ndims(),
            "read NRRD image"
        );

        Ok(RawImage {
            array,
            geometry,
            metadata: header.metadata(),
        })
    }

    fn write(&self, image: &RawImageRef<'_>, path: &Path) -> Result<()> {
        let text = header_text(image, self.encoding)?;

        let mut raw = Vec::with_capacity(image.array.len() * 4);
        for value in image.array.t().iter() {
            raw.extend_from_slice(&value.to_le_bytes());
        }

        let mut file = BufWriter::new(File::create(path)?);
        file.write_all(text.as_bytes())?;
        match self.encoding {
            NrrdEncoding::Raw => file.write_all(&raw)?,
            NrrdEncoding::Gzip => {
                let mut encoder = GzEncoder::new(&mut file, Compression::default());
                encoder.write_all(&raw)?;
                encoder.finish()?;
            }
        }
        file.flush()?;
        debug!(path = %path.display(), shape = ?image.array.shape(), "wrote NRRD image");
        Ok(())
    }
}

/// Split the header lines from the attached data at the first blank line.
fn split_header(bytes: &[u8]) -> Result<(Vec<String>, &[u8])> {
    let mut lines = Vec::new();
    let mut start = 0;
    while let Some(offset) = bytes[start..].iter().position(|&b| b == b'\n') {
        let line = String::from_utf8_lossy(&bytes[start..start + offset])
            .trim_end_matches('\r')
            .to_string();
        start += offset + 1;
        if line.is_empty() {
            return Ok((lines, &bytes[start..]));
        }
        lines.push(line);
    }
    Err(VolumeError::codec("NRRD header is not followed by data"))
}

#[derive(Debug, Default)]
struct NrrdHeader {
    /// Field values keyed by lower-case field name.
    fields: BTreeMap<String, String>,
    /// `key:=value` pairs, unescaped.
    pairs: Vec<(String, String)>,
}

impl NrrdHeader {
    fn parse(lines: &[String]) -> Result<Self> {
        match lines.first() {
            Some(magic) if magic.starts_with("NRRD000") => {}
            _ => return Err(VolumeError::codec("missing NRRD magic line")),
        }

        let mut header = Self::default();
        for line in &lines[1..] {
            if line.starts_with('#') {
                continue;
            }
            let pair_at = line.find(":=");
            let field_at = line.find(": ");
            match (pair_at, field_at) {
                (Some(p), f) if f.map_or(true, |f| p < f) => {
                    header
                        .pairs
                        .push((line[..p].to_string(), unescape(&line[p + 2..])));
                }
                (_, Some(f)) => {
                    header
                        .fields
                        .insert(line[..f].trim().to_ascii_lowercase(), line[f + 2..].trim().to_string());
                }
                _ => {
                    return Err(VolumeError::codec(format!("malformed NRRD header line {:?}", line)));
                }
            }
        }

        for unsupported in ["data file", "datafile"] {
            if header.fields.contains_key(unsupported) {
                return Err(VolumeError::codec("detached NRRD data files are not supported"));
            }
        }
        for skip in ["line skip", "byte skip"] {
            if let Some(value) = header.fields.get(skip) {
                if value != "0" {
                    return Err(VolumeError::codec(format!("NRRD {} is not supported", skip)));
                }
            }
        }
        Ok(header)
    }

    fn required(&self, name: &str) -> Result<&str> {
        self.fields
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| VolumeError::codec(format!("NRRD header has no {:?} field", name)))
    }

    fn sizes(&self) -> Result<Vec<usize>> {
        let dimension: usize = parse_number("dimension", self.required("dimension")?)?;
        let sizes = self
            .required("sizes")?
            .split_whitespace()
            .map(|s| parse_number("sizes", s))
            .collect::<Result<Vec<usize>>>()?;
        if sizes.len() != dimension {
            return Err(VolumeError::codec(format!(
                "NRRD dimension is {} but {} sizes are given",
                dimension,
                sizes.len()
            )));
        }
        Ok(sizes)
    }

    fn decode_data(&self, data: &[u8], kind: ScalarType, count: usize) -> Result<Vec<f32>> {
        let encoding = self.required("encoding")?;
        let samples = match encoding {
            "raw" => decode_binary(&data[..data.len().min(count * kind.size())], kind, self.big_endian()?)?,
            "gzip" | "gz" => {
                let mut buffer = Vec::with_capacity(count * kind.size());
                GzDecoder::new(data).read_to_end(&mut buffer)?;
                decode_binary(&buffer, kind, self.big_endian()?)?
            }
            "ascii" | "text" | "txt" => String::from_utf8_lossy(data)
                .split(|c: char| c.is_whitespace() || c == ',')
                .filter(|token| !token.is_empty())
                .map(|token| parse_number::<f64>("data", token).map(|v| v as f32))
                .collect::<Result<Vec<f32>>>()?,
            other => {
                return Err(VolumeError::codec(format!("unsupported NRRD encoding {:?}", other)));
            }
        };
        if samples.len() < count {
            return Err(VolumeError::codec(format!(
                "NRRD data holds {} samples, expected {}",
                samples.len(),
                count
            )));
        }
        Ok(samples.into_iter().take(count).collect())
    }

    fn big_endian(&self) -> Result<bool> {
        match self.fields.get("endian").map(String::as_str) {
            None | Some("little") => Ok(false),
            Some("big") => Ok(true),
            Some(other) => Err(VolumeError::codec(format!("unknown NRRD endian {:?}", other))),
        }
    }

    fn geometry(&self, ndims: usize) -> Result<AxisGeometry> {
        let Some(directions) = self.fields.get("space directions") else {
            return self.spacings_geometry(ndims);
        };

        let vectors = parse_vector_list(directions)?;
        if vectors.len() != ndims {
            return Err(VolumeError::codec(format!(
                "NRRD has {} axes but {} space directions",
                ndims,
                vectors.len()
            )));
        }
        let spatial = vectors.iter().take_while(|v| v.is_some()).count();
        if spatial == 0 || vectors[spatial..].iter().any(Option::is_some) {
            return Err(VolumeError::codec(
                "NRRD non-spatial axes must follow the spatial axes",
            ));
        }
        let columns: Vec<&Vec<f64>> = vectors[..spatial].iter().flatten().collect();
        let space_ndims = columns[0].len();
        if space_ndims < spatial || columns.iter().any(|c| c.len() != space_ndims) {
            return Err(VolumeError::codec(format!(
                "NRRD space directions must each have {} components",
                space_ndims.max(spatial)
            )));
        }

        let spacing: Vec<f64> = columns
            .iter()
            .map(|c| c.iter().map(|v| v * v).sum::<f64>().sqrt())
            .collect();
        let mut direction = Vec::with_capacity(spatial * spatial);
        for i in 0..spatial {
            for j in 0..spatial {
                // degenerate columns fall back to the unit axis
                direction.push(if spacing[j] > 1e-9 {
                    columns[j][i] / spacing[j]
                } else if i == j {
                    1.0
                } else {
                    0.0
                });
            }
        }

        let origin = match self.fields.get("space origin") {
            Some(text) => match parse_vector_list(text)?.as_slice() {
                [Some(origin)] if origin.len() >= spatial => origin[..spatial].to_vec(),
                _ => {
                    return Err(VolumeError::codec(format!(
                        "NRRD space origin must be one vector of {} components",
                        space_ndims
                    )));
                }
            },
            None => vec![0.0; spatial],
        };

        Ok(AxisGeometry {
            spacing,
            origin,
            direction,
        })
    }

    fn spacings_geometry(&self, ndims: usize) -> Result<AxisGeometry> {
        let rank = ndims.min(3);
        let mut spacing = vec![1.0; rank];
        if let Some(text) = self.fields.get("spacings") {
            for (slot, token) in spacing.iter_mut().zip(text.split_whitespace()) {
                let value: f64 = parse_number("spacings", token)?;
                if value.is_finite() && value != 0.0 {
                    *slot = value.abs();
                }
            }
        }
        let mut direction = vec![0.0; rank * rank];
        for i in 0..rank {
            direction[i * rank + i] = 1.0;
        }
        Ok(AxisGeometry {
            spacing,
            origin: vec![0.0; rank],
            direction,
        })
    }

    fn metadata(&self) -> Header {
        let mut metadata: Header = self.pairs.iter().cloned().collect();
        for name in DESCRIPTIVE_FIELDS {
            if let Some(value) = self.fields.get(name) {
                metadata.insert(name, value.clone());
            }
        }
        metadata
    }
}

fn header_text(image: &RawImageRef<'_>, encoding: NrrdEncoding) -> Result<String> {
    let shape = image.array.shape();
    let geometry = &image.geometry;
    let rank = geometry.ndims();
    if rank > shape.len() {
        return Err(VolumeError::unsupported_dimensionality(format!(
            "{}D geometry for a {}D array",
            rank,
            shape.len()
        )));
    }

    let mut lines = vec![
        "NRRD0004".to_string(),
        "# Complete NRRD file format specification at:".to_string(),
        "# http://teem.sourceforge.net/nrrd/format.html".to_string(),
        "type: float".to_string(),
        format!("dimension: {}", shape.len()),
    ];
    match image.metadata.get("space") {
        Some(space) if rank == 3 => lines.push(format!("space: {}", space)),
        _ => lines.push(format!("space dimension: {}", rank)),
    }
    lines.push(format!(
        "sizes: {}",
        shape.iter().map(usize::to_string).collect::<Vec<_>>().join(" ")
    ));

    let mut directions: Vec<String> = (0..rank)
        .map(|j| {
            vector_text((0..rank).map(|i| geometry.direction[i * rank + j] * geometry.spacing[j]))
        })
        .collect();
    directions.resize(shape.len(), "none".to_string());
    lines.push(format!("space directions: {}", directions.join(" ")));
    lines.push("endian: little".to_string());
    lines.push(format!("encoding: {}", encoding.name()));
    lines.push(format!(
        "space origin: {}",
        vector_text(geometry.origin.iter().copied())
    ));
    if let Some(content) = image.metadata.get("content") {
        lines.push(format!("content: {}", content));
    }

    for (key, value) in image.metadata.iter() {
        if DESCRIPTIVE_FIELDS.contains(&key) {
            continue;
        }
        if DERIVED_FIELDS.contains(&key) {
            warn!(key, "dropping header entry that NRRD derives from the image");
            continue;
        }
        if key.is_empty() || key.contains(":=") || key.contains('\n') {
            return Err(VolumeError::invalid_header(format!(
                "{:?} cannot be stored as an NRRD key",
                key
            )));
        }
        lines.push(format!("{}:={}", key, escape(value)));
    }

    let mut text = lines.join("\n");
    text.push_str("\n\n");
    Ok(text)
}

fn vector_text(values: impl Iterator<Item = f64>) -> String {
    let parts: Vec<String> = values.map(|v| v.to_string()).collect();
    format!("({})", parts.join(","))
}

/// Parse `(a,b,c) none (d,e,f)` into per-axis vectors.
fn parse_vector_list(text: &str) -> Result<Vec<Option<Vec<f64>>>> {
    let mut vectors = Vec::new();
    let mut rest = text.trim_start();
    while !rest.is_empty() {
        if let Some(inner) = rest.strip_prefix('(') {
            let end = inner
                .find(')')
                .ok_or_else(|| VolumeError::codec(format!("unterminated NRRD vector in {:?}", text)))?;
            let values = inner[..end]
                .split(',')
                .map(|v| parse_number("vector", v.trim()))
                .collect::<Result<Vec<f64>>>()?;
            vectors.push(Some(values));
            rest = inner[end + 1..].trim_start();
        } else {
            let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
            match &rest[..end] {
                "none" => vectors.push(None),
                other => {
                    return Err(VolumeError::codec(format!("unexpected NRRD vector {:?}", other)));
                }
            }
            rest = rest[end..].trim_start();
        }
    }
    Ok(vectors)
}

fn parse_number<T>(field: &str, text: &str) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    text.trim()
        .parse()
        .map_err(|e| VolumeError::codec(format!("NRRD {}: cannot parse {:?}: {}", field, text, e)))
}

fn escape(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\n', "\\n")
}

fn unescape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScalarType {
    Int8,
    UInt8,
    Int16,
    UInt16,
    Int32,
    UInt32,
    Int64,
    UInt64,
    Float,
    Double,
}

impl ScalarType {
    fn parse(name: &str) -> Option<Self> {
        let kind = match name.trim() {
            "signed char" | "int8" | "int8_t" => ScalarType::Int8,
            "uchar" | "unsigned char" | "uint8" | "uint8_t" => ScalarType::UInt8,
            "short" | "short int" | "signed short" | "signed short int" | "int16" | "int16_t" => {
                ScalarType::Int16
            }
            "ushort" | "unsigned short" | "unsigned short int" | "uint16" | "uint16_t" => {
                ScalarType::UInt16
            }
            "int" | "signed int" | "int32" | "int32_t" => ScalarType::Int32,
            "uint" | "unsigned int" | "uint32" | "uint32_t" => ScalarType::UInt32,
            "longlong" | "long long" | "long long int" | "signed long long"
            | "signed long long int" | "int64" | "int64_t" => ScalarType::Int64,
            "ulonglong" | "unsigned long long" | "unsigned long long int" | "uint64"
            | "uint64_t" => ScalarType::UInt64,
            "float" => ScalarType::Float,
            "double" => ScalarType::Double,
            _ => return None,
        };
        Some(kind)
    }

    fn size(self) -> usize {
        match self {
            ScalarType::Int8 | ScalarType::UInt8 => 1,
            ScalarType::Int16 | ScalarType::UInt16 => 2,
            ScalarType::Int32 | ScalarType::UInt32 | ScalarType::Float => 4,
            ScalarType::Int64 | ScalarType::UInt64 | ScalarType::Double => 8,
        }
    }
}

fn decode_binary(bytes: &[u8], kind: ScalarType, big_endian: bool) -> Result<Vec<f32>> {
    macro_rules! convert {
        ($ty:ty) => {
            bytes
                .chunks_exact(std::mem::size_of::<$ty>())
                .map(|chunk| {
                    let mut raw = [0u8; std::mem::size_of::<$ty>()];
                    raw.copy_from_slice(chunk);
                    let value = if big_endian {
                        <$ty>::from_be_bytes(raw)
                    } else {
                        <$ty>::from_le_bytes(raw)
                    };
                    value as f32
                })
                .collect()
        };
    }

    if bytes.len() % kind.size() != 0 {
        return Err(VolumeError::codec(format!(
            "NRRD data length {} is not a multiple of the {}-byte sample size",
            bytes.len(),
            kind.size()
        )));
    }
    Ok(match kind {
        ScalarType::Int8 => convert!(i8),
        ScalarType::UInt8 => convert!(u8),
        ScalarType::Int16 => convert!(i16),
        ScalarType::UInt16 => convert!(u16),
        ScalarType::Int32 => convert!(i32),
        ScalarType::UInt32 => convert!(u32),
        ScalarType::Int64 => convert!(i64),
        ScalarType::UInt64 => convert!(u64),
        ScalarType::Float => convert!(f32),
        ScalarType::Double => convert!(f64),
    })
}
