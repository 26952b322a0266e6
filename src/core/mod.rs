//! Core data types and I/O operations.

pub mod field;
pub mod loaders;
pub mod writers;

pub use field::MotionField;
pub use loaders::{load_point_set, LoadError, PointCloudReader, PointSet, RawCoordinates};
pub use writers::{output_file_name, write_motion_field, WriteError};
