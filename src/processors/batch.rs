//! Batch orchestration: index, plan, then process every pair on a worker pool.
//!
//! Indexing and planning failures abort the run before anything is written.
//! Once processing starts, each pair is independent: a failed load, estimate
//! or write (or a panic in a reader or estimator) is recorded for that pair
//! and its siblings carry on.

use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use log::{error, info, warn};
use rayon::prelude::*;
use thiserror::Error;

use crate::config::{BatchConfig, ConfigError, EstimatorParams};
use crate::core::loaders::{load_point_set, LoadError, PointCloudReader, PointSet};
use crate::core::writers::{output_path, write_motion_field, WriteError};
use crate::processors::estimator::{EstimatorError, MotionEstimator};
use crate::processors::indexing::{discover, FileRecord, IndexError};
use crate::processors::planning::{plan, Pair, Topology};

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Index(#[from] IndexError),

    #[error("Failed to load hub reference scan: {0}")]
    Reference(#[source] LoadError),

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// A failure confined to one pair.
#[derive(Debug, Error)]
pub enum PairError {
    #[error("[{pair}] load failed: {source}")]
    Load {
        pair: String,
        #[source]
        source: LoadError,
    },

    #[error("[{pair}] estimation failed: {source}")]
    Estimate {
        pair: String,
        #[source]
        source: EstimatorError,
    },

    #[error("[{pair}] write failed: {source}")]
    Write {
        pair: String,
        #[source]
        source: WriteError,
    },

    #[error("[{pair}] panicked: {message}")]
    Panicked { pair: String, message: String },
}

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStage {
    Init,
    Indexed,
    Planned,
    Processing,
    Done,
    Failed,
}

impl fmt::Display for BatchStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchStage::Init => "init",
            BatchStage::Indexed => "indexed",
            BatchStage::Planned => "planned",
            BatchStage::Processing => "processing",
            BatchStage::Done => "done",
            BatchStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// A scheduled pair with its result path, as reported by a dry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedPair {
    pub index: usize,
    pub source: PathBuf,
    pub target: PathBuf,
    pub output: PathBuf,
}

/// What happened to one pair.
#[derive(Debug)]
pub struct PairOutcome {
    pub index: usize,
    pub source: PathBuf,
    pub target: PathBuf,
    /// Written result path on success
    pub result: Result<PathBuf, PairError>,
}

impl PairOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// Summary of a completed run, outcomes in schedule order.
#[derive(Debug)]
pub struct BatchReport {
    pub topology: Topology,
    pub scans: usize,
    pub outcomes: Vec<PairOutcome>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn failures(&self) -> impl Iterator<Item = &PairError> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().err())
    }

    pub fn is_success(&self) -> bool {
        self.failed() == 0
    }
}

/// Indexed and planned batch, ready for `BatchRunner::execute`.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    records: Vec<FileRecord>,
    topology: Topology,
    output_dir: PathBuf,
}

impl BatchPlan {
    pub fn topology(&self) -> Topology {
        self.topology
    }

    /// Indexed scans in processing order.
    pub fn records(&self) -> &[FileRecord] {
        &self.records
    }

    /// Number of scheduled pairs.
    pub fn len(&self) -> usize {
        self.records.len().saturating_sub(1)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn pairs(&self) -> Vec<Pair<'_>> {
        plan(&self.records, self.topology)
    }

    /// Scheduled pairs with the result path each one will write.
    pub fn planned_pairs(&self) -> Vec<PlannedPair> {
        self.pairs()
            .iter()
            .map(|pair| PlannedPair {
                index: pair.index,
                source: pair.source.path.clone(),
                target: pair.target.path.clone(),
                output: output_path(&self.output_dir, pair.source, pair.target, self.topology),
            })
            .collect()
    }
}

/// Shared, read-only inputs every pair job needs.
struct PairContext<'a> {
    reader: &'a dyn PointCloudReader,
    estimator: &'a dyn MotionEstimator,
    params: &'a EstimatorParams,
    output_dir: &'a Path,
    topology: Topology,
}

fn run_pair(
    pair: &Pair<'_>,
    reference: Option<&PointSet>,
    ctx: &PairContext<'_>,
) -> Result<PathBuf, PairError> {
    let label = pair.to_string();
    let load = |record: &FileRecord| {
        load_point_set(record, ctx.reader).map_err(|source| PairError::Load {
            pair: label.clone(),
            source,
        })
    };

    let loaded_source;
    let source = match reference {
        Some(shared) => shared,
        None => {
            loaded_source = load(pair.source)?;
            &loaded_source
        }
    };
    let target = load(pair.target)?;

    let field = ctx
        .estimator
        .estimate(source, &target, ctx.params)
        .map_err(|source| PairError::Estimate {
            pair: label.clone(),
            source,
        })?;

    let path = output_path(ctx.output_dir, pair.source, pair.target, ctx.topology);
    write_motion_field(&path, &field).map_err(|source| PairError::Write {
        pair: label.clone(),
        source,
    })?;

    Ok(path)
}

fn process_pair(
    pair: &Pair<'_>,
    reference: Option<&PointSet>,
    ctx: &PairContext<'_>,
) -> PairOutcome {
    let started = Instant::now();
    let result = panic::catch_unwind(AssertUnwindSafe(|| run_pair(pair, reference, ctx)))
        .unwrap_or_else(|payload| {
            Err(PairError::Panicked {
                pair: pair.to_string(),
                message: panic_message(payload.as_ref()),
            })
        });

    match &result {
        Ok(path) => info!(
            "[{:04}] {} -> {} ({:.2?})",
            pair.index,
            pair,
            path.display(),
            started.elapsed()
        ),
        Err(e) => error!("[{:04}] {}", pair.index, e),
    }

    PairOutcome {
        index: pair.index,
        source: pair.source.path.clone(),
        target: pair.target.path.clone(),
        result,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

/// Drives one batch run from directory listing to result files.
///
/// # Example
///
/// ```no_run
/// use scan_motion::config::BatchConfig;
/// use scan_motion::core::loaders::LasReader;
/// use scan_motion::processors::batch::BatchRunner;
/// use scan_motion::processors::estimator::NearestNeighborEstimator;
///
/// let mut runner = BatchRunner::new(
///     BatchConfig::default(),
///     Box::new(LasReader),
///     Box::new(NearestNeighborEstimator),
/// );
/// let report = runner.run().unwrap();
/// println!("{} of {} pairs succeeded", report.succeeded(), report.outcomes.len());
/// ```
pub struct BatchRunner {
    config: BatchConfig,
    reader: Box<dyn PointCloudReader>,
    estimator: Box<dyn MotionEstimator>,
    stage: BatchStage,
}

impl BatchRunner {
    pub fn new(
        config: BatchConfig,
        reader: Box<dyn PointCloudReader>,
        estimator: Box<dyn MotionEstimator>,
    ) -> Self {
        Self {
            config,
            reader,
            estimator,
            stage: BatchStage::Init,
        }
    }

    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    pub fn stage(&self) -> BatchStage {
        self.stage
    }

    fn transition(&mut self, stage: BatchStage) {
        info!("Batch stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    fn fail<E: Into<BatchError>>(&mut self, err: E) -> BatchError {
        let err = err.into();
        error!("Batch aborted during {}: {}", self.stage, err);
        self.stage = BatchStage::Failed;
        err
    }

    fn index(&mut self) -> Result<Vec<FileRecord>, BatchError> {
        self.stage = BatchStage::Init;

        if let Err(e) = self.config.validate() {
            return Err(self.fail(e));
        }

        let input = &self.config.input;
        info!(
            "Indexing '.{}' scans in {} (key: {} digit run)",
            input.extension,
            input.directory.display(),
            input.key_convention
        );

        match discover(&input.directory, &input.extension, input.key_convention) {
            Ok(records) => {
                self.transition(BatchStage::Indexed);
                Ok(records)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    /// Index the input directory and build the pair schedule.
    pub fn plan(&mut self) -> Result<BatchPlan, BatchError> {
        let records = self.index()?;
        let topology = self.config.execution.topology;

        let batch = BatchPlan {
            records,
            topology,
            output_dir: self.config.output_dir().to_path_buf(),
        };
        self.transition(BatchStage::Planned);
        info!(
            "Planned {} {} pairs over {} scans",
            batch.len(),
            topology,
            batch.records.len()
        );
        Ok(batch)
    }

    /// Index and plan without loading or writing anything.
    pub fn plan_only(&mut self) -> Result<Vec<PlannedPair>, BatchError> {
        Ok(self.plan()?.planned_pairs())
    }

    /// Run the whole batch.
    pub fn run(&mut self) -> Result<BatchReport, BatchError> {
        self.run_with_progress(|_| {})
    }

    /// Run the whole batch, calling `on_pair_done` as each pair finishes.
    ///
    /// The callback may be invoked concurrently from worker threads.
    pub fn run_with_progress<F>(&mut self, on_pair_done: F) -> Result<BatchReport, BatchError>
    where
        F: Fn(&PairOutcome) + Sync,
    {
        let batch = self.plan()?;
        self.execute(&batch, on_pair_done)
    }

    /// Process every pair of an already planned batch.
    pub fn execute<F>(
        &mut self,
        batch: &BatchPlan,
        on_pair_done: F,
    ) -> Result<BatchReport, BatchError>
    where
        F: Fn(&PairOutcome) + Sync,
    {
        let started = Instant::now();
        let records = batch.records();
        let topology = batch.topology;
        let pairs = batch.pairs();

        let pool = match rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.execution.workers)
            .build()
        {
            Ok(pool) => pool,
            Err(e) => return Err(self.fail(e)),
        };

        // Hub pairs all share the first scan; load it once, before fan-out
        let reference = match topology {
            Topology::Hub => match load_point_set(&records[0], self.reader.as_ref()) {
                Ok(set) => Some(set),
                Err(e) => return Err(self.fail(BatchError::Reference(e))),
            },
            Topology::Chain => None,
        };

        self.transition(BatchStage::Processing);

        let ctx = PairContext {
            reader: self.reader.as_ref(),
            estimator: self.estimator.as_ref(),
            params: &self.config.estimator,
            output_dir: &batch.output_dir,
            topology,
        };
        let reference = reference.as_ref();

        let outcomes: Vec<PairOutcome> = pool.install(|| {
            pairs
                .par_iter()
                .map(|pair| {
                    let outcome = process_pair(pair, reference, &ctx);
                    on_pair_done(&outcome);
                    outcome
                })
                .collect()
        });

        let report = BatchReport {
            topology,
            scans: records.len(),
            outcomes,
            elapsed: started.elapsed(),
        };

        if report.failed() > 0 {
            warn!(
                "{} of {} pairs failed",
                report.failed(),
                report.outcomes.len()
            );
        }

        self.transition(BatchStage::Done);
        Ok(report)
    }
}
