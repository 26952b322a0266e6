//! Scan readers and point-set preparation.
//!
//! This module provides:
//! - The `PointCloudReader` seam through which raw x, y, z arrays are obtained
//! - Readers for binary LAS, ASCII PLY, CSV and whitespace XYZ files
//! - `PointSet`, the deduplicated double-precision form every pair consumes

use std::collections::{HashMap, HashSet};
use std::fs::{self, File};
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use csv::ReaderBuilder;
use log::debug;
use thiserror::Error;

use crate::processors::indexing::{normalize_extension, FileRecord};

/// Errors raised by a reader while parsing file contents.
#[derive(Error, Debug)]
pub enum ReaderError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Invalid LAS file: {0}")]
    InvalidLas(String),

    #[error("Invalid PLY file: {0}")]
    InvalidPly(String),

    #[error("Missing required columns: {0}")]
    MissingColumns(String),

    #[error("Parse error: {0}")]
    ParseError(String),
}

/// Errors raised while turning a scan file into a `PointSet`.
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Scan file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ReaderError,
    },

    #[error("Coordinate arrays differ in length in {path}: x={x}, y={y}, z={z}")]
    LengthMismatch {
        path: PathBuf,
        x: usize,
        y: usize,
        z: usize,
    },

    #[error("Non-finite coordinate in {path} at point {index}")]
    NonFiniteCoordinate { path: PathBuf, index: usize },

    #[error("No reader for '.{0}' files")]
    UnsupportedFormat(String),
}

/// Three parallel coordinate arrays as produced by a reader.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawCoordinates {
    pub x: Vec<f64>,
    pub y: Vec<f64>,
    pub z: Vec<f64>,
}

impl RawCoordinates {
    /// Create empty arrays with room for `capacity` points.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            x: Vec::with_capacity(capacity),
            y: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
        }
    }

    #[inline]
    pub fn push(&mut self, x: f64, y: f64, z: f64) {
        self.x.push(x);
        self.y.push(y);
        self.z.push(z);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

/// Parses one scan file into raw coordinate arrays.
pub trait PointCloudReader: Send + Sync {
    fn read(&self, path: &Path) -> Result<RawCoordinates, ReaderError>;
}

/// Set of unique 3D points in double precision.
///
/// No two stored rows are bit-identical. Row order carries no meaning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PointSet {
    points: Vec<[f64; 3]>,
}

/// Map -0.0 to 0.0 so equal coordinates also compare equal bitwise.
#[inline]
fn canonical(v: f64) -> f64 {
    if v == 0.0 {
        0.0
    } else {
        v
    }
}

impl PointSet {
    /// Build a set from arbitrary rows, dropping exact duplicates.
    pub fn from_points<I>(points: I) -> Self
    where
        I: IntoIterator<Item = [f64; 3]>,
    {
        let iter = points.into_iter();
        let mut seen: HashSet<[u64; 3]> = HashSet::with_capacity(iter.size_hint().0);
        let mut unique = Vec::with_capacity(iter.size_hint().0);

        for p in iter {
            let p = [canonical(p[0]), canonical(p[1]), canonical(p[2])];
            if seen.insert([p[0].to_bits(), p[1].to_bits(), p[2].to_bits()]) {
                unique.push(p);
            }
        }

        Self { points: unique }
    }

    /// Number of unique points.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[[f64; 3]] {
        &self.points
    }

    pub fn iter(&self) -> impl Iterator<Item = &[f64; 3]> {
        self.points.iter()
    }

    /// Points as a bitwise-comparable set, for order-free comparisons.
    pub fn to_bit_set(&self) -> HashSet<[u64; 3]> {
        self.points
            .iter()
            .map(|p| [p[0].to_bits(), p[1].to_bits(), p[2].to_bits()])
            .collect()
    }
}

/// Load one indexed scan as a deduplicated `PointSet`.
///
/// # Errors
///
/// `FileNotFound` is returned before the reader is touched if the file has
/// gone missing since indexing.
pub fn load_point_set(
    record: &FileRecord,
    reader: &dyn PointCloudReader,
) -> Result<PointSet, LoadError> {
    let path = record.path.as_path();
    if !path.is_file() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }

    let raw = reader.read(path).map_err(|source| LoadError::Parse {
        path: path.to_path_buf(),
        source,
    })?;

    if raw.x.len() != raw.y.len() || raw.x.len() != raw.z.len() {
        return Err(LoadError::LengthMismatch {
            path: path.to_path_buf(),
            x: raw.x.len(),
            y: raw.y.len(),
            z: raw.z.len(),
        });
    }

    let non_finite = raw
        .x
        .iter()
        .zip(&raw.y)
        .zip(&raw.z)
        .position(|((x, y), z)| !(x.is_finite() && y.is_finite() && z.is_finite()));
    if let Some(index) = non_finite {
        return Err(LoadError::NonFiniteCoordinate {
            path: path.to_path_buf(),
            index,
        });
    }

    let raw_len = raw.len();
    let set = PointSet::from_points(
        raw.x
            .into_iter()
            .zip(raw.y)
            .zip(raw.z)
            .map(|((x, y), z)| [x, y, z]),
    );

    debug!(
        "Loaded {}: {} points, {} unique",
        path.display(),
        raw_len,
        set.len()
    );

    Ok(set)
}

/// Pick the reader matching a scan file extension.
pub fn reader_for_extension(extension: &str) -> Result<Box<dyn PointCloudReader>, LoadError> {
    let ext = normalize_extension(extension).to_ascii_lowercase();
    match ext.as_str() {
        "las" => Ok(Box::new(LasReader)),
        "ply" => Ok(Box::new(PlyReader)),
        "csv" => Ok(Box::new(CsvReader)),
        "xyz" | "txt" | "pts" => Ok(Box::new(XyzReader)),
        _ => Err(LoadError::UnsupportedFormat(ext)),
    }
}

// ---------------------------------------------------------------------------
// LAS
// ---------------------------------------------------------------------------

/// Public header block size of LAS 1.0-1.2, the smallest valid header.
const LAS_MIN_HEADER: usize = 227;
/// Header size from which the 64-bit point count exists (LAS 1.4).
const LAS_14_HEADER: usize = 375;

/// Reader for uncompressed ASPRS LAS files (versions 1.0 to 1.4).
#[derive(Debug, Clone, Copy, Default)]
pub struct LasReader;

fn le_bytes<const N: usize>(data: &[u8], offset: usize) -> Result<[u8; N], ReaderError> {
    data.get(offset..offset + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| {
            ReaderError::InvalidLas(format!("truncated data at byte offset {}", offset))
        })
}

fn read_u16(data: &[u8], offset: usize) -> Result<u16, ReaderError> {
    le_bytes(data, offset).map(u16::from_le_bytes)
}

fn read_u32(data: &[u8], offset: usize) -> Result<u32, ReaderError> {
    le_bytes(data, offset).map(u32::from_le_bytes)
}

fn read_u64(data: &[u8], offset: usize) -> Result<u64, ReaderError> {
    le_bytes(data, offset).map(u64::from_le_bytes)
}

fn read_i32(data: &[u8], offset: usize) -> Result<i32, ReaderError> {
    le_bytes(data, offset).map(i32::from_le_bytes)
}

fn read_f64(data: &[u8], offset: usize) -> Result<f64, ReaderError> {
    le_bytes(data, offset).map(f64::from_le_bytes)
}

/// Decoded fields of the LAS public header that locate and scale points.
#[derive(Debug, Clone, PartialEq)]
struct LasHeader {
    point_offset: usize,
    point_format: u8,
    record_length: usize,
    point_count: u64,
    scale: [f64; 3],
    offset: [f64; 3],
}

impl LasHeader {
    fn parse(data: &[u8]) -> Result<Self, ReaderError> {
        if data.len() < LAS_MIN_HEADER || &data[0..4] != b"LASF" {
            return Err(ReaderError::InvalidLas("missing LASF signature".to_string()));
        }

        let header_size = read_u16(data, 94)? as usize;
        let point_offset = read_u32(data, 96)? as usize;
        let point_format = data[104];
        let record_length = read_u16(data, 105)? as usize;
        let legacy_count = read_u32(data, 107)? as u64;

        if point_format & 0x80 != 0 {
            return Err(ReaderError::InvalidLas(
                "compressed (LAZ) point data is not supported".to_string(),
            ));
        }
        if point_format > 10 {
            return Err(ReaderError::InvalidLas(format!(
                "unknown point data format {}",
                point_format
            )));
        }
        // X, Y, Z are three i32 at the start of every record format
        if record_length < 12 {
            return Err(ReaderError::InvalidLas(format!(
                "point record length {} is too short",
                record_length
            )));
        }

        let point_count = if legacy_count == 0 && header_size >= LAS_14_HEADER {
            read_u64(data, 247)?
        } else {
            legacy_count
        };

        Ok(Self {
            point_offset,
            point_format,
            record_length,
            point_count,
            scale: [read_f64(data, 131)?, read_f64(data, 139)?, read_f64(data, 147)?],
            offset: [read_f64(data, 155)?, read_f64(data, 163)?, read_f64(data, 171)?],
        })
    }
}

impl PointCloudReader for LasReader {
    fn read(&self, path: &Path) -> Result<RawCoordinates, ReaderError> {
        let data = fs::read(path)?;
        let header = LasHeader::parse(&data)?;

        let needed = (header.point_count as usize)
            .checked_mul(header.record_length)
            .and_then(|n| n.checked_add(header.point_offset))
            .ok_or_else(|| ReaderError::InvalidLas("point count overflows".to_string()))?;
        if data.len() < needed {
            return Err(ReaderError::InvalidLas(format!(
                "expected {} points ({} bytes), file has {} bytes",
                header.point_count,
                needed,
                data.len()
            )));
        }

        debug!(
            "LAS {}: format {}, {} points",
            path.display(),
            header.point_format,
            header.point_count
        );

        let mut coords = RawCoordinates::with_capacity(header.point_count as usize);
        for i in 0..header.point_count as usize {
            let base = header.point_offset + i * header.record_length;
            let xi = read_i32(&data, base)?;
            let yi = read_i32(&data, base + 4)?;
            let zi = read_i32(&data, base + 8)?;
            coords.push(
                xi as f64 * header.scale[0] + header.offset[0],
                yi as f64 * header.scale[1] + header.offset[1],
                zi as f64 * header.scale[2] + header.offset[2],
            );
        }

        Ok(coords)
    }
}

// ---------------------------------------------------------------------------
// Text formats
// ---------------------------------------------------------------------------

/// Parse one coordinate; `nan` and `inf` are rejected like any other junk.
fn parse_coord(value: &str, axis: &str) -> Result<f64, ReaderError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ReaderError::ParseError(format!("Invalid {} value: {}", axis, value)))
}

/// Reader for ASCII PLY files with `x`, `y`, `z` vertex properties.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlyReader;

impl PointCloudReader for PlyReader {
    fn read(&self, path: &Path) -> Result<RawCoordinates, ReaderError> {
        let file = File::open(path)?;
        let reader = BufReader::new(file);
        let mut lines = reader.lines();

        let first_line = lines
            .next()
            .ok_or_else(|| ReaderError::InvalidPly("Empty file".to_string()))??;

        if !first_line.trim().starts_with("ply") {
            return Err(ReaderError::InvalidPly(format!(
                "{} is not a PLY file",
                path.display()
            )));
        }

        let mut num_vertices: Option<usize> = None;
        let mut prop_names: Vec<String> = Vec::new();
        let mut in_vertex_element = false;
        let mut header_done = false;

        for line in &mut lines {
            let line = line?;
            let stripped = line.trim();

            if stripped.starts_with("format") && !stripped.contains("ascii") {
                return Err(ReaderError::InvalidPly(format!(
                    "only ASCII PLY is supported, got '{}'",
                    stripped
                )));
            } else if stripped.starts_with("element") {
                in_vertex_element = stripped.starts_with("element vertex");
                if in_vertex_element {
                    num_vertices = stripped
                        .split_whitespace()
                        .last()
                        .and_then(|count| count.parse().ok());
                }
            } else if stripped.starts_with("property") && in_vertex_element {
                if let Some(name) = stripped.split_whitespace().last() {
                    prop_names.push(name.to_string());
                }
            } else if stripped == "end_header" {
                header_done = true;
                break;
            }
        }

        let num_vertices = num_vertices
            .ok_or_else(|| ReaderError::InvalidPly("No vertex count in header".to_string()))?;

        if !header_done {
            return Err(ReaderError::InvalidPly("Missing end_header".to_string()));
        }

        let prop_idx: HashMap<&str, usize> = prop_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let index_of = |name: &str| {
            prop_idx
                .get(name)
                .copied()
                .ok_or_else(|| ReaderError::MissingColumns(name.to_string()))
        };
        let (x_idx, y_idx, z_idx) = (index_of("x")?, index_of("y")?, index_of("z")?);

        let mut coords = RawCoordinates::with_capacity(num_vertices);
        for line in lines {
            if coords.len() >= num_vertices {
                break;
            }

            let line = line?;
            let values: Vec<&str> = line.split_whitespace().collect();
            if values.len() < prop_names.len() {
                return Err(ReaderError::InvalidPly(format!(
                    "vertex {} has {} values, expected {}",
                    coords.len(),
                    values.len(),
                    prop_names.len()
                )));
            }

            coords.push(
                parse_coord(values[x_idx], "x")?,
                parse_coord(values[y_idx], "y")?,
                parse_coord(values[z_idx], "z")?,
            );
        }

        if coords.len() < num_vertices {
            return Err(ReaderError::InvalidPly(format!(
                "Expected {} vertices, found {}",
                num_vertices,
                coords.len()
            )));
        }

        Ok(coords)
    }
}

/// Reader for comma-separated point files.
///
/// Columns named `x`, `y`, `z` (any case) are used when a header row is
/// present, and all three must exist. Without a header the first three
/// columns are taken.
#[derive(Debug, Clone, Copy, Default)]
pub struct CsvReader;

impl PointCloudReader for CsvReader {
    fn read(&self, path: &Path) -> Result<RawCoordinates, ReaderError> {
        let file = File::open(path)?;
        let mut reader = ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(BufReader::new(file));

        let mut records = reader.records();
        let mut coords = RawCoordinates::with_capacity(10_000);

        let first = match records.next() {
            Some(record) => record?,
            None => return Ok(coords),
        };

        let is_header = first.iter().take(3).any(|f| f.parse::<f64>().is_err());
        let (x_idx, y_idx, z_idx) = if is_header {
            let col_map: HashMap<String, usize> = first
                .iter()
                .enumerate()
                .map(|(i, name)| (name.to_lowercase(), i))
                .collect();
            let column = |axis: &str| {
                col_map.get(axis).copied().ok_or_else(|| {
                    ReaderError::MissingColumns(format!("no '{}' column in CSV header", axis))
                })
            };
            (column("x")?, column("y")?, column("z")?)
        } else {
            (0, 1, 2)
        };

        let mut push_record = |record: &csv::StringRecord| -> Result<(), ReaderError> {
            let field = |idx: usize, axis: &str| {
                record
                    .get(idx)
                    .ok_or_else(|| ReaderError::MissingColumns(axis.to_string()))
                    .and_then(|v| parse_coord(v, axis))
            };
            coords.push(field(x_idx, "x")?, field(y_idx, "y")?, field(z_idx, "z")?);
            Ok(())
        };

        if !is_header {
            push_record(&first)?;
        }
        for record in records {
            push_record(&record?)?;
        }

        Ok(coords)
    }
}

/// Reader for whitespace-delimited `x y z [...]` text, one point per line.
///
/// Blank lines and lines starting with `#` or `//` are skipped.
#[derive(Debug, Clone, Copy, Default)]
pub struct XyzReader;

impl PointCloudReader for XyzReader {
    fn read(&self, path: &Path) -> Result<RawCoordinates, ReaderError> {
        let file = File::open(path)?;
        let reader = BufReader::with_capacity(64 * 1024, file);
        let mut coords = RawCoordinates::with_capacity(10_000);

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            let trimmed = line.trim();
            if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
                continue;
            }

            let fields: Vec<&str> = trimmed.split_whitespace().collect();
            if fields.len() < 3 {
                return Err(ReaderError::ParseError(format!(
                    "line {}: expected at least 3 columns, found {}",
                    line_no + 1,
                    fields.len()
                )));
            }

            coords.push(
                parse_coord(fields[0], "x")?,
                parse_coord(fields[1], "y")?,
                parse_coord(fields[2], "z")?,
            );
        }

        Ok(coords)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn record(path: PathBuf) -> FileRecord {
        FileRecord {
            path,
            numeric_key: 0,
        }
    }

    /// Build a minimal LAS 1.2 file with point format 3 (34-byte records).
    fn las_bytes(points_mm: &[[i32; 3]], scale: f64, offset: [f64; 3]) -> Vec<u8> {
        let header_size: u16 = 227;
        let record_length: u16 = 34;
        let mut data = vec![0u8; header_size as usize];

        data[0..4].copy_from_slice(b"LASF");
        data[24] = 1;
        data[25] = 2;
        data[94..96].copy_from_slice(&header_size.to_le_bytes());
        data[96..100].copy_from_slice(&(header_size as u32).to_le_bytes());
        data[104] = 3;
        data[105..107].copy_from_slice(&record_length.to_le_bytes());
        data[107..111].copy_from_slice(&(points_mm.len() as u32).to_le_bytes());
        for base in [131usize, 139, 147] {
            data[base..base + 8].copy_from_slice(&scale.to_le_bytes());
        }
        for (i, base) in [155usize, 163, 171].iter().enumerate() {
            data[*base..*base + 8].copy_from_slice(&offset[i].to_le_bytes());
        }

        for p in points_mm {
            let mut rec = vec![0u8; record_length as usize];
            rec[0..4].copy_from_slice(&p[0].to_le_bytes());
            rec[4..8].copy_from_slice(&p[1].to_le_bytes());
            rec[8..12].copy_from_slice(&p[2].to_le_bytes());
            data.extend_from_slice(&rec);
        }
        data
    }

    fn write_file(dir: &Path, name: &str, contents: &[u8]) -> PathBuf {
        let path = dir.join(name);
        let mut file = File::create(&path).unwrap();
        file.write_all(contents).unwrap();
        path
    }

    #[test]
    fn test_point_set_removes_exact_duplicates() {
        let set = PointSet::from_points(vec![
            [1.0, 2.0, 3.0],
            [1.0, 2.0, 3.0],
            [1.0, 2.0, 3.5],
            [-0.0, 0.0, 0.0],
            [0.0, 0.0, 0.0],
        ]);
        assert_eq!(set.len(), 3);
    }

    #[test]
    fn test_point_set_dedup_is_idempotent() {
        let with_dups = PointSet::from_points(vec![
            [3.0, 2.0, 1.0],
            [1.0, 1.0, 1.0],
            [3.0, 2.0, 1.0],
            [1.0, 1.0, 1.0],
        ]);
        let clean = PointSet::from_points(vec![[1.0, 1.0, 1.0], [3.0, 2.0, 1.0]]);

        assert_eq!(with_dups.to_bit_set(), clean.to_bit_set());
        let again = PointSet::from_points(with_dups.points().iter().copied());
        assert_eq!(again.to_bit_set(), clean.to_bit_set());
    }

    #[test]
    fn test_load_point_set_missing_file() {
        let dir = TempDir::new().unwrap();
        let rec = record(dir.path().join("scan_00.xyz"));

        let err = load_point_set(&rec, &XyzReader).unwrap_err();
        match err {
            LoadError::FileNotFound(path) => assert_eq!(path, rec.path),
            other => panic!("Expected FileNotFound, got {other:?}"),
        }
    }

    #[test]
    fn test_load_point_set_dedups_file_rows() {
        let dir = TempDir::new().unwrap();
        let dup = write_file(dir.path(), "a_1.xyz", b"0 0 0\n1 1 1\n0 0 0\n1 1 1\n2 2 2\n");
        let clean = write_file(dir.path(), "b_2.xyz", b"2 2 2\n0 0 0\n1 1 1\n");

        let from_dup = load_point_set(&record(dup), &XyzReader).unwrap();
        let from_clean = load_point_set(&record(clean), &XyzReader).unwrap();

        assert_eq!(from_dup.len(), 3);
        assert_eq!(from_dup.to_bit_set(), from_clean.to_bit_set());
    }

    struct UnevenReader;

    impl PointCloudReader for UnevenReader {
        fn read(&self, _path: &Path) -> Result<RawCoordinates, ReaderError> {
            Ok(RawCoordinates {
                x: vec![1.0, 2.0],
                y: vec![1.0],
                z: vec![1.0, 2.0],
            })
        }
    }

    #[test]
    fn test_load_point_set_length_mismatch() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "scan_0.bin", b"");

        let err = load_point_set(&record(path), &UnevenReader).unwrap_err();
        assert!(matches!(err, LoadError::LengthMismatch { x: 2, y: 1, z: 2, .. }));
    }

    #[test]
    fn test_load_point_set_rejects_non_finite_from_reader() {
        struct NanReader;

        impl PointCloudReader for NanReader {
            fn read(&self, _path: &Path) -> Result<RawCoordinates, ReaderError> {
                let mut coords = RawCoordinates::default();
                coords.push(0.0, 0.0, 0.0);
                coords.push(1.0, f64::NAN, 0.0);
                coords.push(f64::INFINITY, 0.0, 0.0);
                Ok(coords)
            }
        }

        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "scan_0.bin", b"");

        let err = load_point_set(&record(path), &NanReader).unwrap_err();
        assert!(matches!(err, LoadError::NonFiniteCoordinate { index: 1, .. }));
    }

    #[test]
    fn test_xyz_reader_rejects_nan_and_inf() {
        let dir = TempDir::new().unwrap();
        for (name, body) in [
            ("s_0.xyz", "nan 0 0\n"),
            ("s_1.xyz", "0 inf 0\n"),
            ("s_2.xyz", "0 0 -infinity\n"),
        ] {
            let path = write_file(dir.path(), name, body.as_bytes());
            let err = load_point_set(&record(path), &XyzReader).unwrap_err();
            assert!(
                matches!(
                    err,
                    LoadError::Parse {
                        source: ReaderError::ParseError(_),
                        ..
                    }
                ),
                "{name}: {err:?}"
            );
        }
    }

    #[test]
    fn test_las_reader_scales_coordinates() {
        let dir = TempDir::new().unwrap();
        let bytes = las_bytes(&[[1000, -2000, 500], [1, 2, 3]], 0.001, [10.0, 0.0, 0.0]);
        let path = write_file(dir.path(), "00_scan.las", &bytes);

        let coords = LasReader.read(&path).unwrap();

        assert_eq!(coords.len(), 2);
        assert!((coords.x[0] - 11.0).abs() < 1e-12);
        assert!((coords.y[0] + 2.0).abs() < 1e-12);
        assert!((coords.z[0] - 0.5).abs() < 1e-12);
        assert!((coords.z[1] - 0.003).abs() < 1e-12);
    }

    #[test]
    fn test_las_reader_rejects_bad_signature() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "bad.las", &[0u8; 300]);

        let err = LasReader.read(&path).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidLas(_)));
    }

    #[test]
    fn test_las_reader_rejects_truncated_points() {
        let dir = TempDir::new().unwrap();
        let mut bytes = las_bytes(&[[1, 2, 3], [4, 5, 6]], 0.001, [0.0; 3]);
        bytes.truncate(bytes.len() - 10);
        let path = write_file(dir.path(), "short.las", &bytes);

        assert!(LasReader.read(&path).is_err());
    }

    #[test]
    fn test_ply_reader() {
        let dir = TempDir::new().unwrap();
        let ply = "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\n\
                   property float z\nproperty uchar red\nend_header\n1 2 3 255\n4 5 6 0\n";
        let path = write_file(dir.path(), "scan_1.ply", ply.as_bytes());

        let coords = PlyReader.read(&path).unwrap();
        assert_eq!(coords.x, vec![1.0, 4.0]);
        assert_eq!(coords.z, vec![3.0, 6.0]);
    }

    #[test]
    fn test_ply_reader_rejects_short_vertex_line() {
        let dir = TempDir::new().unwrap();
        let ply = "ply\nformat ascii 1.0\nelement vertex 2\nproperty float x\nproperty float y\n\
                   property float z\nelement face 1\nproperty list uchar int vertex_indices\n\
                   end_header\n1 2 3\n4 5\n3 0 1 2\n";
        let path = write_file(dir.path(), "scan_1.ply", ply.as_bytes());

        let err = PlyReader.read(&path).unwrap_err();
        assert!(matches!(err, ReaderError::InvalidPly(_)), "{err:?}");
        assert!(err.to_string().contains("vertex 1"));
    }

    #[test]
    fn test_ply_reader_rejects_binary() {
        let dir = TempDir::new().unwrap();
        let ply = "ply\nformat binary_little_endian 1.0\nelement vertex 0\nend_header\n";
        let path = write_file(dir.path(), "scan_1.ply", ply.as_bytes());

        assert!(matches!(
            PlyReader.read(&path).unwrap_err(),
            ReaderError::InvalidPly(_)
        ));
    }

    #[test]
    fn test_csv_reader_with_header() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "scan_1.csv", b"id,Z,Y,X\n0,3,2,1\n1,6,5,4\n");

        let coords = CsvReader.read(&path).unwrap();
        assert_eq!(coords.x, vec![1.0, 4.0]);
        assert_eq!(coords.y, vec![2.0, 5.0]);
        assert_eq!(coords.z, vec![3.0, 6.0]);
    }

    #[test]
    fn test_csv_reader_header_missing_axis() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "scan_1.csv", b"id,Z,Y\n0,3,2\n");

        let err = CsvReader.read(&path).unwrap_err();
        match err {
            ReaderError::MissingColumns(msg) => assert!(msg.contains("'x'")),
            other => panic!("Expected MissingColumns, got {other:?}"),
        }
    }

    #[test]
    fn test_csv_reader_without_header() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "scan_1.csv", b"1,2,3\n4,5,6\n");

        let coords = CsvReader.read(&path).unwrap();
        assert_eq!(coords.len(), 2);
        assert_eq!(coords.x, vec![1.0, 4.0]);
    }

    #[test]
    fn test_xyz_reader_reports_bad_line() {
        let dir = TempDir::new().unwrap();
        let path = write_file(dir.path(), "scan_1.xyz", b"# header\n1 2 3\n4 5\n");

        let err = XyzReader.read(&path).unwrap_err();
        assert!(err.to_string().contains("line 3"));
    }

    #[test]
    fn test_reader_for_extension() {
        assert!(reader_for_extension("las").is_ok());
        assert!(reader_for_extension(".PLY").is_ok());
        assert!(reader_for_extension("*.xyz").is_ok());
        assert!(matches!(
            reader_for_extension("lvx"),
            Err(LoadError::UnsupportedFormat(ext)) if ext == "lvx"
        ));
    }
}
