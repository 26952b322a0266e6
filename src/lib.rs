//! Batch driver for pairwise motion-field estimation over terrestrial scans.
//!
//! This crate provides tools for:
//! - Discovering a scan series and ordering it by the number in each filename
//! - Planning chain (successive) or hub (fixed reference) comparison pairs
//! - Loading LAS, PLY, CSV and XYZ scans as deduplicated double-precision point sets
//! - Running a pluggable motion estimator over every pair on a worker pool
//! - Writing one whitespace-delimited result matrix per pair
//!
//! # Example
//!
//! ```no_run
//! use scan_motion::{BatchConfig, BatchRunner, Topology};
//! use scan_motion::core::loaders::LasReader;
//! use scan_motion::processors::estimator::NearestNeighborEstimator;
//!
//! let mut config = BatchConfig::default();
//! config.input.directory = "scans".into();
//! config.execution.topology = Topology::Hub;
//!
//! let mut runner = BatchRunner::new(config, Box::new(LasReader), Box::new(NearestNeighborEstimator));
//! let report = runner.run().unwrap();
//! assert!(report.is_success());
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{BatchConfig, EstimatorParams, ExecutionConfig, InputConfig};
pub use crate::core::loaders::{PointCloudReader, PointSet};
pub use processors::batch::{BatchReport, BatchRunner};
pub use processors::estimator::MotionEstimator;
pub use processors::indexing::{FileRecord, KeyConvention};
pub use processors::planning::Topology;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
