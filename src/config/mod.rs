//! Configuration types for the batch driver.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::processors::indexing::{normalize_extension, KeyConvention};
use crate::processors::planning::Topology;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to access config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid YAML in config: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Where the scans live and how their filenames are ordered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    /// Directory containing the scan files
    #[serde(default = "default_directory")]
    pub directory: PathBuf,

    /// Scan file extension, without the leading dot (e.g. "las")
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Which digit run in the file stem supplies the ordering key
    #[serde(default)]
    pub key_convention: KeyConvention,
}

fn default_directory() -> PathBuf {
    PathBuf::from(".")
}

fn default_extension() -> String {
    "las".to_string()
}

impl Default for InputConfig {
    fn default() -> Self {
        Self {
            directory: default_directory(),
            extension: default_extension(),
            key_convention: KeyConvention::default(),
        }
    }
}

/// Parameters handed unchanged to the motion estimator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EstimatorParams {
    /// Outlier rejection strength (std-dev multiplier, 0 disables)
    #[serde(default)]
    pub denoise: f64,

    /// Downsampling voxel edge length (0 disables)
    #[serde(default)]
    pub dsp: f64,

    /// Neighbour count for correspondence search
    #[serde(default = "default_k")]
    pub k: usize,

    /// Ask the estimator to produce plots
    #[serde(default)]
    pub plotflag: bool,
}

fn default_k() -> usize {
    8
}

impl Default for EstimatorParams {
    fn default() -> Self {
        Self {
            denoise: 0.0,
            dsp: 0.0,
            k: default_k(),
            plotflag: false,
        }
    }
}

/// How the pair schedule is built and executed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// Pairing topology
    #[serde(default)]
    pub topology: Topology,

    /// Worker threads for pair processing (0 = one per core)
    #[serde(default)]
    pub workers: usize,

    /// Output directory; defaults to the input directory
    #[serde(default)]
    pub output_dir: Option<PathBuf>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            topology: Topology::default(),
            workers: 0,
            output_dir: None,
        }
    }
}

/// Main batch configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchConfig {
    #[serde(default)]
    pub input: InputConfig,

    #[serde(default)]
    pub estimator: EstimatorParams,

    #[serde(default)]
    pub execution: ExecutionConfig,
}

impl BatchConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: BatchConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Directory the result files are written into.
    pub fn output_dir(&self) -> &Path {
        self.execution
            .output_dir
            .as_deref()
            .unwrap_or(&self.input.directory)
    }

    /// Reject values no run could succeed with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if normalize_extension(&self.input.extension).is_empty() {
            return Err(ConfigError::Invalid("input extension is empty".to_string()));
        }
        if self.estimator.k == 0 {
            return Err(ConfigError::Invalid("estimator k must be at least 1".to_string()));
        }
        if !self.estimator.denoise.is_finite() || self.estimator.denoise < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "estimator denoise must be a non-negative number, got {}",
                self.estimator.denoise
            )));
        }
        if !self.estimator.dsp.is_finite() || self.estimator.dsp < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "estimator dsp must be a non-negative number, got {}",
                self.estimator.dsp
            )));
        }
        Ok(())
    }
}
