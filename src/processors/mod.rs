//! Indexing, planning, estimation and batch orchestration.

pub mod batch;
pub mod estimator;
pub mod indexing;
pub mod planning;

// Re-export key types for convenience
pub use batch::{
    BatchError, BatchPlan, BatchReport, BatchRunner, BatchStage, PairError, PairOutcome,
    PlannedPair,
};
pub use estimator::{EstimatorError, MotionEstimator, NearestNeighborEstimator};
pub use indexing::{discover, FileRecord, IndexError, KeyConvention};
pub use planning::{plan, Pair, Topology};
