//! Data loaders for labeled point cloud files.
//!
//! This module provides parsers for:
//! - PCD files (`DATA ascii` and `DATA binary`)
//! - ASCII PLY files
//!
//! Each point carries a packed semantic label. It is read from a `label`
//! field when present, otherwise from a float `intensity` field.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::labels::intensity_to_label;

/// Errors that can occur during file loading.
#[derive(Error, Debug)]
pub enum LoaderError {
    #[error("IO error reading '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("Invalid PCD file: {0}")]
    InvalidPcd(String),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required fields: {0}")]
    MissingFields(String),

    #[error("Unsupported point cloud data: {0}")]
    Unsupported(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Result type for loader operations.
pub type Result<T> = std::result::Result<T, LoaderError>;

/// Upper bound on points reserved up front from a header count.
const MAX_RESERVE: usize = 1 << 20;

/// A single 3D point with its packed semantic label.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabeledPoint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub label: u32,
}

impl LabeledPoint {
    pub fn new(x: f32, y: f32, z: f32, label: u32) -> Self {
        Self { x, y, z, label }
    }

    #[inline]
    pub fn coords(&self) -> [f32; 3] {
        [self.x, self.y, self.z]
    }
}

/// Container for labeled 3D point cloud data.
///
/// Stored as parallel columns; all four vectors always have the same length.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointCloud {
    /// X coordinates of all points.
    pub x: Vec<f32>,
    /// Y coordinates of all points.
    pub y: Vec<f32>,
    /// Z coordinates of all points.
    pub z: Vec<f32>,
    /// Packed semantic labels (class in low 16 bits, instance in high 16 bits).
    pub labels: Vec<u32>,
}

impl PointCloud {
    /// Creates a new empty point cloud.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new point cloud with pre-allocated capacity.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Returns the number of points in the cloud.
    #[inline]
    pub fn len(&self) -> usize {
        self.x.len()
    }

    /// Returns true if the point cloud is empty.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }

    /// Adds a point to the cloud.
    #[inline]
    pub fn push(&mut self, x: f32, y: f32, z: f32, label: u32) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
        self.labels.push(label);
    }

    #[inline]
    pub fn push_point(&mut self, point: LabeledPoint) {
        self.push(point.x, point.y, point.z, point.label);
    }

    /// Returns the point at `index`. Panics if out of bounds.
    #[inline]
    pub fn point(&self, index: usize) -> LabeledPoint {
        LabeledPoint {
            x: self.x[index],
            y: self.y[index],
            z: self.z[index],
            label: self.labels[index],
        }
    }

    /// Iterates over points in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = LabeledPoint> + '_ {
        (0..self.len()).map(move |i| self.point(i))
    }

    /// Converts point cloud to a vector of [x, y, z] coordinate arrays.
    pub fn to_coords(&self) -> Vec<[f32; 3]> {
        self.iter().map(|p| p.coords()).collect()
    }
}

impl FromIterator<LabeledPoint> for PointCloud {
    fn from_iter<I: IntoIterator<Item = LabeledPoint>>(iter: I) -> Self {
        let mut cloud = PointCloud::new();
        for point in iter {
            cloud.push_point(point);
        }
        cloud
    }
}

fn open(path: &Path) -> Result<File> {
    File::open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            LoaderError::NotFound(path.to_path_buf())
        } else {
            LoaderError::Io {
                path: path.to_path_buf(),
                source: e,
            }
        }
    })
}

fn io_err(path: &Path) -> impl Fn(std::io::Error) -> LoaderError + '_ {
    move |source| LoaderError::Io {
        path: path.to_path_buf(),
        source,
    }
}

/// Which field the packed label is read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LabelSource {
    /// Unsigned `label` field, taken as-is.
    Label(usize),
    /// Float `intensity` field, truncated to an integer.
    Intensity(usize),
    None,
}

fn label_source(fields: &HashMap<String, usize>) -> LabelSource {
    if let Some(&i) = fields.get("label") {
        LabelSource::Label(i)
    } else if let Some(&i) = fields.get("intensity") {
        LabelSource::Intensity(i)
    } else {
        LabelSource::None
    }
}

#[inline]
fn label_from_value(source: LabelSource, value: f64) -> u32 {
    match source {
        LabelSource::Label(_) => value as u32,
        LabelSource::Intensity(_) => intensity_to_label(value),
        LabelSource::None => 0,
    }
}

/// Scalar type of a PCD field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PcdType {
    Float,
    Unsigned,
    Signed,
}

/// Storage layout of one PCD field.
#[derive(Debug, Clone, Copy)]
struct PcdField {
    /// Column index of the first element in ASCII data.
    column: usize,
    /// Byte offset within a binary point record.
    byte_offset: usize,
    size: usize,
    kind: PcdType,
}

impl PcdField {
    fn read_binary(&self, record: &[u8]) -> Option<f64> {
        let b = record.get(self.byte_offset..self.byte_offset + self.size)?;
        let value = match (self.kind, self.size) {
            (PcdType::Float, 4) => f32::from_le_bytes(b.try_into().ok()?) as f64,
            (PcdType::Float, 8) => f64::from_le_bytes(b.try_into().ok()?),
            (PcdType::Unsigned, 1) => b[0] as f64,
            (PcdType::Unsigned, 2) => u16::from_le_bytes(b.try_into().ok()?) as f64,
            (PcdType::Unsigned, 4) => u32::from_le_bytes(b.try_into().ok()?) as f64,
            (PcdType::Unsigned, 8) => u64::from_le_bytes(b.try_into().ok()?) as f64,
            (PcdType::Signed, 1) => b[0] as i8 as f64,
            (PcdType::Signed, 2) => i16::from_le_bytes(b.try_into().ok()?) as f64,
            (PcdType::Signed, 4) => i32::from_le_bytes(b.try_into().ok()?) as f64,
            (PcdType::Signed, 8) => i64::from_le_bytes(b.try_into().ok()?) as f64,
            _ => return None,
        };
        Some(value)
    }
}

/// Parsed PCD header.
#[derive(Debug)]
struct PcdHeader {
    fields: HashMap<String, PcdField>,
    points: usize,
    record_size: usize,
    columns: usize,
    data: String,
}

/// Header values collected line by line before the `DATA` line.
#[derive(Debug, Default)]
struct PcdHeaderBuilder {
    names: Vec<String>,
    sizes: Vec<usize>,
    types: Vec<PcdType>,
    counts: Vec<usize>,
    width: Option<usize>,
    height: Option<usize>,
    points: Option<usize>,
}

impl PcdHeaderBuilder {
    fn apply(&mut self, line: &str) -> Result<()> {
        let mut parts = line.split_whitespace();
        let key = match parts.next() {
            Some(k) => k.to_ascii_uppercase(),
            None => return Ok(()),
        };
        let values: Vec<&str> = parts.collect();

        let parse_usize = |s: &str| -> Result<usize> {
            s.parse()
                .map_err(|_| LoaderError::InvalidPcd(format!("invalid {} value: {}", key, s)))
        };
        let parse_all = || -> Result<Vec<usize>> { values.iter().map(|s| parse_usize(*s)).collect() };
        let parse_first = || -> Result<Option<usize>> {
            values.first().map(|s| parse_usize(*s)).transpose()
        };

        match key.as_str() {
            "FIELDS" => self.names = values.iter().map(|s| s.to_string()).collect(),
            "SIZE" => self.sizes = parse_all()?,
            "COUNT" => self.counts = parse_all()?,
            "TYPE" => {
                self.types = values
                    .iter()
                    .map(|s| match *s {
                        "F" => Ok(PcdType::Float),
                        "U" => Ok(PcdType::Unsigned),
                        "I" => Ok(PcdType::Signed),
                        other => Err(LoaderError::InvalidPcd(format!("unknown TYPE {}", other))),
                    })
                    .collect::<Result<_>>()?
            }
            "WIDTH" => self.width = parse_first()?,
            "HEIGHT" => self.height = parse_first()?,
            "POINTS" => self.points = parse_first()?,
            // VERSION and VIEWPOINT carry nothing we need
            _ => {}
        }
        Ok(())
    }

    fn finish(mut self, data: String) -> Result<PcdHeader> {
        if self.names.is_empty() {
            return Err(LoaderError::InvalidPcd("missing FIELDS".to_string()));
        }
        if self.counts.is_empty() {
            self.counts = vec![1; self.names.len()];
        }
        let n = self.names.len();
        if self.sizes.len() != n || self.types.len() != n || self.counts.len() != n {
            return Err(LoaderError::InvalidPcd(format!(
                "FIELDS/SIZE/TYPE/COUNT length mismatch ({}/{}/{}/{})",
                n,
                self.sizes.len(),
                self.types.len(),
                self.counts.len()
            )));
        }

        let points = match (self.points, self.width, self.height) {
            (Some(p), _, _) => p,
            (None, Some(w), Some(h)) => w
                .checked_mul(h)
                .ok_or_else(|| LoaderError::InvalidPcd(format!("WIDTH {} * HEIGHT {} overflows", w, h)))?,
            (None, Some(w), None) => w,
            _ => return Err(LoaderError::InvalidPcd("no POINTS or WIDTH".to_string())),
        };

        let mut fields = HashMap::new();
        let mut column = 0;
        let mut byte_offset = 0;
        for i in 0..n {
            fields.insert(
                self.names[i].to_ascii_lowercase(),
                PcdField {
                    column,
                    byte_offset,
                    size: self.sizes[i],
                    kind: self.types[i],
                },
            );
            column += self.counts[i];
            byte_offset = self.sizes[i]
                .checked_mul(self.counts[i])
                .and_then(|bytes| byte_offset.checked_add(bytes))
                .ok_or_else(|| LoaderError::InvalidPcd("point record size overflows".to_string()))?;
        }

        Ok(PcdHeader {
            fields,
            points,
            record_size: byte_offset,
            columns: column,
            data,
        })
    }
}

fn read_pcd_header<R: BufRead>(reader: &mut R, path: &Path) -> Result<PcdHeader> {
    let mut builder = PcdHeaderBuilder::default();
    let mut line = String::new();

    loop {
        line.clear();
        if reader.read_line(&mut line).map_err(io_err(path))? == 0 {
            return Err(LoaderError::InvalidPcd("missing DATA line".to_string()));
        }
        let stripped = line.trim();
        if stripped.is_empty() || stripped.starts_with('#') {
            continue;
        }
        if stripped.to_ascii_uppercase().starts_with("DATA") {
            let data = stripped
                .split_whitespace()
                .nth(1)
                .map(|s| s.to_ascii_lowercase())
                .ok_or_else(|| LoaderError::InvalidPcd("DATA without a format".to_string()))?;
            return builder.finish(data);
        }
        builder.apply(stripped)?;
    }
}

/// Load a labeled point cloud from a PCD file.
///
/// Requires `x`, `y`, `z` fields. The label is taken from `label` or
/// `intensity`; when neither exists every point gets label 0.
///
/// # Errors
///
/// Returns an error if the file is missing, the header is malformed, the body
/// is truncated, or the data is `binary_compressed`.
pub fn load_pcd<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let mut reader = BufReader::new(open(path)?);
    let header = read_pcd_header(&mut reader, path)?;

    let field = |name: &str| {
        header
            .fields
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingFields(name.to_string()))
    };
    let fx = field("x")?;
    let fy = field("y")?;
    let fz = field("z")?;

    let columns: HashMap<String, usize> = header
        .fields
        .iter()
        .map(|(name, f)| (name.clone(), f.column))
        .collect();
    let source = label_source(&columns);
    let flabel = match source {
        LabelSource::Label(_) => header.fields.get("label").copied(),
        LabelSource::Intensity(_) => header.fields.get("intensity").copied(),
        LabelSource::None => {
            log::warn!("{}: no label or intensity field, labeling all points 0", path.display());
            None
        }
    };

    let mut cloud = PointCloud::with_capacity(header.points.min(MAX_RESERVE));

    match header.data.as_str() {
        "ascii" => {
            let mut line = String::new();
            while cloud.len() < header.points {
                line.clear();
                if reader.read_line(&mut line).map_err(io_err(path))? == 0 {
                    break;
                }
                let values: Vec<&str> = line.split_whitespace().collect();
                if values.is_empty() {
                    continue;
                }
                if values.len() < header.columns {
                    return Err(LoaderError::ParseError(format!(
                        "row {} has {} values, expected {}",
                        cloud.len(),
                        values.len(),
                        header.columns
                    )));
                }

                let parse = |f: PcdField| -> Result<f64> {
                    values[f.column].parse::<f64>().map_err(|_| {
                        LoaderError::ParseError(format!("invalid value: {}", values[f.column]))
                    })
                };
                let label = match flabel {
                    Some(f) => label_from_value(source, parse(f)?),
                    None => 0,
                };
                cloud.push(parse(fx)? as f32, parse(fy)? as f32, parse(fz)? as f32, label);
            }
        }
        "binary" => {
            if header.record_size == 0 {
                return Err(LoaderError::InvalidPcd("zero-sized point record".to_string()));
            }
            let mut body = Vec::new();
            reader.read_to_end(&mut body).map_err(io_err(path))?;
            let expected = header.points.checked_mul(header.record_size);
            if expected.map_or(true, |bytes| body.len() < bytes) {
                return Err(LoaderError::InvalidPcd(format!(
                    "binary body has {} bytes, header declares {} points of {} bytes",
                    body.len(),
                    header.points,
                    header.record_size
                )));
            }

            let truncated = || LoaderError::InvalidPcd("truncated binary record".to_string());
            for record in body.chunks_exact(header.record_size).take(header.points) {
                let x = fx.read_binary(record).ok_or_else(truncated)?;
                let y = fy.read_binary(record).ok_or_else(truncated)?;
                let z = fz.read_binary(record).ok_or_else(truncated)?;
                let label = match flabel {
                    Some(f) => label_from_value(source, f.read_binary(record).ok_or_else(truncated)?),
                    None => 0,
                };
                cloud.push(x as f32, y as f32, z as f32, label);
            }
        }
        other => {
            return Err(LoaderError::Unsupported(format!(
                "{}: DATA {} is not supported",
                path.display(),
                other
            )))
        }
    }

    if cloud.len() < header.points {
        return Err(LoaderError::InvalidPcd(format!(
            "Expected {} points, found {}",
            header.points,
            cloud.len()
        )));
    }

    Ok(cloud)
}

/// Load a labeled point cloud from an ASCII PLY file.
///
/// Supports PLY files with vertex elements containing:
/// - Required: x, y, z properties
/// - Optional: `label` (unsigned) or `intensity` (float-encoded label)
pub fn load_ply<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let reader = BufReader::new(open(path)?);
    let mut lines = reader.lines();

    // Check PLY magic number
    let first_line = lines
        .next()
        .ok_or_else(|| LoaderError::InvalidPly("Empty file".to_string()))?
        .map_err(io_err(path))?;

    if !first_line.trim().starts_with("ply") {
        return Err(LoaderError::InvalidPly(format!(
            "{} is not a PLY file",
            path.display()
        )));
    }

    let mut num_vertices: Option<usize> = None;
    let mut prop_names: Vec<String> = Vec::new();
    let mut in_vertex = false;
    let mut header_done = false;

    for line in &mut lines {
        let line = line.map_err(io_err(path))?;
        let stripped = line.trim();

        if stripped.starts_with("format") && !stripped.contains("ascii") {
            return Err(LoaderError::Unsupported(format!(
                "{}: only ASCII PLY is supported",
                path.display()
            )));
        } else if stripped.starts_with("element") {
            let parts: Vec<&str> = stripped.split_whitespace().collect();
            in_vertex = parts.get(1) == Some(&"vertex");
            if in_vertex {
                num_vertices = parts.last().and_then(|s| s.parse().ok());
            }
        } else if stripped.starts_with("property") && in_vertex {
            if let Some(name) = stripped.split_whitespace().last() {
                prop_names.push(name.to_string());
            }
        } else if stripped == "end_header" {
            header_done = true;
            break;
        }
    }

    let num_vertices = num_vertices
        .ok_or_else(|| LoaderError::InvalidPly("No vertex count in header".to_string()))?;

    if !header_done {
        return Err(LoaderError::InvalidPly("Missing end_header".to_string()));
    }

    let prop_idx: HashMap<String, usize> = prop_names
        .iter()
        .enumerate()
        .map(|(i, name)| (name.clone(), i))
        .collect();

    let index_of = |name: &str| {
        prop_idx
            .get(name)
            .copied()
            .ok_or_else(|| LoaderError::MissingFields(name.to_string()))
    };
    let x_idx = index_of("x")?;
    let y_idx = index_of("y")?;
    let z_idx = index_of("z")?;
    let source = label_source(&prop_idx);

    let mut cloud = PointCloud::with_capacity(num_vertices.min(MAX_RESERVE));

    for line in lines {
        if cloud.len() >= num_vertices {
            break;
        }

        let line = line.map_err(io_err(path))?;
        let values: Vec<&str> = line.split_whitespace().collect();

        if values.len() < prop_names.len() {
            continue;
        }

        let parse = |i: usize| -> Result<f64> {
            values[i]
                .parse::<f64>()
                .map_err(|_| LoaderError::ParseError(format!("Invalid value: {}", values[i])))
        };

        let label = match source {
            LabelSource::Label(i) | LabelSource::Intensity(i) => label_from_value(source, parse(i)?),
            LabelSource::None => 0,
        };
        cloud.push(
            parse(x_idx)? as f32,
            parse(y_idx)? as f32,
            parse(z_idx)? as f32,
            label,
        );
    }

    if cloud.len() < num_vertices {
        return Err(LoaderError::InvalidPly(format!(
            "Expected {} vertices, found {}",
            num_vertices,
            cloud.len()
        )));
    }

    Ok(cloud)
}

/// Load a point cloud, picking the parser from the file extension.
///
/// `.ply` files go to [`load_ply`]; everything else is read as PCD.
pub fn load_cloud<P: AsRef<Path>>(path: P) -> Result<PointCloud> {
    let path = path.as_ref();
    let is_ply = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("ply"))
        .unwrap_or(false);

    let cloud = if is_ply { load_ply(path)? } else { load_pcd(path)? };
    log::debug!("{}: loaded {} points", path.display(), cloud.len());
    Ok(cloud)
}
