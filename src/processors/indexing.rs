//! Scan discovery and ordering by the numeric identifier in each filename.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use log::debug;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort indexing before any pair is processed.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("Directory not found: {path}: {source}")]
    DirectoryNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Need at least 2 '.{extension}' files in {directory}, found {found}")]
    InsufficientInput {
        directory: PathBuf,
        extension: String,
        found: usize,
    },

    #[error("No numeric identifier in filename: {path}")]
    MissingIdentifier { path: PathBuf },

    #[error("Numeric identifier '{digits}' out of range in filename: {path}")]
    InvalidIdentifier { path: PathBuf, digits: String },

    #[error("Scans {first} and {second} share the base name '{base}' and would write the same results")]
    DuplicateBaseName {
        base: String,
        first: PathBuf,
        second: PathBuf,
    },
}

/// Result type for indexing operations.
pub type Result<T> = std::result::Result<T, IndexError>;

/// Which run of decimal digits in a file stem is used as the ordering key.
///
/// Picking the wrong convention silently misorders a series, so it is always
/// configured explicitly and never derived from the topology:
///
/// - `First` suits chunked exports with a leading index, `00_survey3.las`.
/// - `Last` suits trailing counters, `scan_015.las`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum KeyConvention {
    #[default]
    First,
    Last,
}

impl fmt::Display for KeyConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyConvention::First => write!(f, "first"),
            KeyConvention::Last => write!(f, "last"),
        }
    }
}

/// A discovered scan file and its ordering key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRecord {
    pub path: PathBuf,
    pub numeric_key: u64,
}

impl FileRecord {
    /// File name without its extension.
    pub fn base_name(&self) -> String {
        self.path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

fn digit_runs() -> &'static Regex {
    static DIGITS: OnceLock<Regex> = OnceLock::new();
    DIGITS.get_or_init(|| Regex::new(r"[0-9]+").expect("digit pattern is valid"))
}

/// Strip a leading `*.` or `.` so "las", ".las" and "*.las" are equivalent.
pub fn normalize_extension(extension: &str) -> &str {
    extension.trim_start_matches("*.").trim_start_matches('.')
}

/// Extract the ordering key from a file path's stem.
///
/// # Errors
///
/// `MissingIdentifier` if the stem has no digits, `InvalidIdentifier` if the
/// selected run does not fit in a `u64`.
pub fn extract_numeric_key(path: &Path, convention: KeyConvention) -> Result<u64> {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();

    let mut runs = digit_runs().find_iter(&stem);
    let selected = match convention {
        KeyConvention::First => runs.next(),
        KeyConvention::Last => runs.last(),
    };

    let digits = selected.ok_or_else(|| IndexError::MissingIdentifier {
        path: path.to_path_buf(),
    })?;

    digits
        .as_str()
        .parse::<u64>()
        .map_err(|_| IndexError::InvalidIdentifier {
            path: path.to_path_buf(),
            digits: digits.as_str().to_string(),
        })
}

/// List files in `directory` with the given extension, sorted by name.
///
/// Name order is the tie-break for equal keys, which keeps the final order
/// independent of the platform's directory iteration order.
pub fn list_scan_files(directory: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let extension = normalize_extension(extension);

    let entries = fs::read_dir(directory).map_err(|source| IndexError::DirectoryNotFound {
        path: directory.to_path_buf(),
        source,
    })?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .extension()
                    .map(|ext| ext.eq_ignore_ascii_case(extension))
                    .unwrap_or(false)
        })
        .collect();

    files.sort();
    Ok(files)
}

/// Result names are built from file stems, so `a_1.xyz` and `a_1.XYZ` would
/// overwrite each other's output.
fn check_unique_base_names(records: &[FileRecord]) -> Result<()> {
    let mut seen: HashMap<String, &Path> = HashMap::with_capacity(records.len());
    for record in records {
        let base = record.base_name();
        if let Some(first) = seen.insert(base.clone(), &record.path) {
            return Err(IndexError::DuplicateBaseName {
                base,
                first: first.to_path_buf(),
                second: record.path.clone(),
            });
        }
    }
    Ok(())
}

/// Discover and order the scan series in `directory`.
///
/// # Arguments
///
/// * `directory` - Directory to scan (not recursive)
/// * `extension` - Scan file extension, matched case-insensitively
/// * `convention` - Which digit run supplies the key
///
/// # Returns
///
/// Records sorted ascending by key; equal keys keep filename order.
///
/// # Errors
///
/// Fails before returning anything if fewer than two files match, any
/// matching filename lacks a usable identifier, or two files share a base
/// name.
pub fn discover(
    directory: &Path,
    extension: &str,
    convention: KeyConvention,
) -> Result<Vec<FileRecord>> {
    let files = list_scan_files(directory, extension)?;

    if files.len() < 2 {
        return Err(IndexError::InsufficientInput {
            directory: directory.to_path_buf(),
            extension: normalize_extension(extension).to_string(),
            found: files.len(),
        });
    }

    let mut records = files
        .into_iter()
        .map(|path| {
            let numeric_key = extract_numeric_key(&path, convention)?;
            debug!("Indexed {} -> key {}", path.display(), numeric_key);
            Ok(FileRecord { path, numeric_key })
        })
        .collect::<Result<Vec<_>>>()?;

    check_unique_base_names(&records)?;

    // Vec::sort_by_key is stable
    records.sort_by_key(|r| r.numeric_key);

    Ok(records)
}
