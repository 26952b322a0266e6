//! Result naming and persistence.
//!
//! Each compared pair produces one whitespace-delimited text matrix whose
//! name depends only on the two scan base names and the topology, so a re-run
//! over the same directory overwrites the same files.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::field::MotionField;
use crate::processors::indexing::FileRecord;
use crate::processors::planning::Topology;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path, truncating any existing file.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Result filename for a compared pair.
///
/// `<Prefix>_<source>_to_<target>.txt`, where the prefix is `Consec` for
/// chain runs and `Compare` for hub runs.
///
/// # Example
///
/// ```
/// use scan_motion::core::writers::output_file_name;
/// use scan_motion::processors::indexing::FileRecord;
/// use scan_motion::processors::planning::Topology;
/// use std::path::PathBuf;
///
/// let a = FileRecord { path: PathBuf::from("scan_00.las"), numeric_key: 0 };
/// let b = FileRecord { path: PathBuf::from("scan_01.las"), numeric_key: 1 };
/// assert_eq!(output_file_name(&a, &b, Topology::Chain), "Consec_scan_00_to_scan_01.txt");
/// ```
pub fn output_file_name(source: &FileRecord, target: &FileRecord, topology: Topology) -> String {
    format!(
        "{}_{}_to_{}.txt",
        topology.output_prefix(),
        source.base_name(),
        target.base_name()
    )
}

/// Full result path for a compared pair inside `directory`.
pub fn output_path(
    directory: &Path,
    source: &FileRecord,
    target: &FileRecord,
    topology: Topology,
) -> PathBuf {
    directory.join(output_file_name(source, target, topology))
}

/// Write a motion field as space-delimited decimal rows.
///
/// One line per matrix row, no header. Values use the shortest decimal
/// representation that round-trips to the same `f64`. An existing file at
/// `path` is overwritten.
///
/// # Errors
///
/// Returns an error if:
/// - Parent directories cannot be created
/// - File cannot be created or written to
pub fn write_motion_field(path: &Path, field: &MotionField) -> Result<()> {
    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();

    for row in field.rows() {
        let line = row
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(" ");
        writeln!(writer, "{}", line).map_err(|e| WriteError::WriteFile {
            path: path_str.clone(),
            source: e,
        })?;
    }

    writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str,
        source: e,
    })?;

    Ok(())
}

/// Name the result for a pair and write it into `directory`.
///
/// # Returns
///
/// The path that was written.
pub fn write_pair_result(
    field: &MotionField,
    source: &FileRecord,
    target: &FileRecord,
    directory: &Path,
    topology: Topology,
) -> Result<PathBuf> {
    let path = output_path(directory, source, target, topology);
    write_motion_field(&path, field)?;
    Ok(path)
}
