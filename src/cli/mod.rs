//! Command-line interface for the batch driver.

use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info};

use crate::config::BatchConfig;
use crate::core::loaders::reader_for_extension;
use crate::processors::batch::BatchRunner;
use crate::processors::estimator::NearestNeighborEstimator;
use crate::processors::indexing::KeyConvention;
use crate::processors::planning::Topology;

#[derive(Parser)]
#[command(name = "scan-motion")]
#[command(about = "Pairwise motion-field estimation over a time-ordered scan series", version)]
pub struct Cli {
    /// Path to YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Increase verbosity
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Estimate a motion field for every planned pair
    Run {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Show the planned pairs and output files without processing
    Plan {
        #[command(flatten)]
        batch: BatchArgs,
    },

    /// Write a default config file
    InitConfig {
        /// Destination YAML file
        path: PathBuf,
        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Overrides applied on top of the config file.
#[derive(Args, Debug, Default)]
struct BatchArgs {
    /// Directory containing the scans
    directory: Option<PathBuf>,
    /// Scan file extension (e.g. las, ply, csv, xyz)
    #[arg(short, long)]
    extension: Option<String>,
    /// Pairing topology
    #[arg(short, long, value_enum)]
    topology: Option<Topology>,
    /// Which digit run in each filename orders the series
    #[arg(long, value_enum)]
    key: Option<KeyConvention>,
    /// Worker threads (0 = one per core)
    #[arg(short, long)]
    workers: Option<usize>,
    /// Directory for result files (defaults to the scan directory)
    #[arg(short, long)]
    output_dir: Option<PathBuf>,
    /// Outlier rejection strength (0 disables)
    #[arg(long)]
    denoise: Option<f64>,
    /// Downsampling voxel size (0 disables)
    #[arg(long)]
    dsp: Option<f64>,
    /// Neighbours per correspondence
    #[arg(short, long)]
    k: Option<usize>,
    /// Ask the estimator for plots
    #[arg(long)]
    plot: bool,
}

impl BatchArgs {
    fn apply(self, config: &mut BatchConfig) {
        if let Some(directory) = self.directory {
            config.input.directory = directory;
        }
        if let Some(extension) = self.extension {
            config.input.extension = extension;
        }
        if let Some(topology) = self.topology {
            config.execution.topology = topology;
        }
        if let Some(key) = self.key {
            config.input.key_convention = key;
        }
        if let Some(workers) = self.workers {
            config.execution.workers = workers;
        }
        if let Some(output_dir) = self.output_dir {
            config.execution.output_dir = Some(output_dir);
        }
        if let Some(denoise) = self.denoise {
            config.estimator.denoise = denoise;
        }
        if let Some(dsp) = self.dsp {
            config.estimator.dsp = dsp;
        }
        if let Some(k) = self.k {
            config.estimator.k = k;
        }
        if self.plot {
            config.estimator.plotflag = true;
        }
    }
}

/// Create a progress bar for the pair loop
fn create_progress_bar(total: u64) -> ProgressBar {
    let pb = ProgressBar::new(total);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}

/// Print a summary box
fn print_summary(title: &str, items: &[(&str, String)]) {
    println!();
    println!("╔══════════════════════════════════════════════════════════════╗");
    println!("║ {:<62} ║", title);
    println!("╠══════════════════════════════════════════════════════════════╣");
    for (key, value) in items {
        let display_value = if value.chars().count() > 39 {
            let head: String = value.chars().take(36).collect();
            format!("{}...", head)
        } else {
            value.clone()
        };
        println!("║ {:<20}: {:<39} ║", key, display_value);
    }
    println!("╚══════════════════════════════════════════════════════════════╝");
    println!();
}

pub fn run() {
    let cli = Cli::parse();

    // Initialize logging based on verbosity (must come first)
    env_logger::Builder::new()
        .filter_level(match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            _ => log::LevelFilter::Debug,
        })
        .format_timestamp_secs()
        .init();

    let outcome = match cli.command {
        Commands::Run { batch } => load_config(cli.config.as_deref(), batch).and_then(cmd_run),
        Commands::Plan { batch } => load_config(cli.config.as_deref(), batch).and_then(cmd_plan),
        Commands::InitConfig { path, force } => cmd_init_config(&path, force).map(|_| true),
    };

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(1);
        }
    }
}

fn load_config(path: Option<&Path>, overrides: BatchArgs) -> Result<BatchConfig> {
    let mut config = match path {
        Some(path) => {
            let cfg = BatchConfig::from_yaml(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            info!("Loaded config from: {}", path.display());
            cfg
        }
        None => BatchConfig::default(),
    };
    overrides.apply(&mut config);
    Ok(config)
}

fn build_runner(config: BatchConfig) -> Result<BatchRunner> {
    let reader = reader_for_extension(&config.input.extension)
        .context("Cannot read the configured scan format")?;
    Ok(BatchRunner::new(
        config,
        reader,
        Box::new(NearestNeighborEstimator),
    ))
}

/// Returns whether every pair succeeded.
fn cmd_run(config: BatchConfig) -> Result<bool> {
    let start = Instant::now();

    println!("Estimating motion fields...");
    println!("Input directory: {}", config.input.directory.display());
    println!("Output directory: {}", config.output_dir().display());
    println!("Topology: {}", config.execution.topology);
    println!("Key convention: {} digit run", config.input.key_convention);
    println!(
        "Parameters: denoise={} dsp={} k={} plotflag={}",
        config.estimator.denoise, config.estimator.dsp, config.estimator.k, config.estimator.plotflag
    );

    let mut runner = build_runner(config)?;
    let batch = runner.plan()?;

    let pb = create_progress_bar(batch.len() as u64);
    let report = runner.execute(&batch, |outcome| {
        if let Some(name) = outcome.target.file_name() {
            pb.set_message(name.to_string_lossy().into_owned());
        }
        pb.inc(1);
    });
    pb.finish_and_clear();
    let report = report?;

    for failure in report.failures() {
        error!("{}", failure);
    }

    print_summary(
        "Motion Field Batch Complete",
        &[
            ("Directory", runner.config().input.directory.display().to_string()),
            ("Topology", report.topology.to_string()),
            ("Scans", report.scans.to_string()),
            ("Pairs", report.outcomes.len().to_string()),
            ("Succeeded", report.succeeded().to_string()),
            ("Failed", report.failed().to_string()),
            ("Duration", format!("{:.2?}", start.elapsed())),
        ],
    );

    Ok(report.is_success())
}

fn cmd_plan(config: BatchConfig) -> Result<bool> {
    let topology = config.execution.topology;
    let mut runner = build_runner(config)?;
    let planned = runner.plan_only()?;

    for pair in &planned {
        println!(
            "[{:04}] {} -> {} => {}",
            pair.index,
            pair.source.display(),
            pair.target.display(),
            pair.output.display()
        );
    }

    print_summary(
        "Pair Plan",
        &[
            ("Directory", runner.config().input.directory.display().to_string()),
            ("Topology", topology.to_string()),
            ("Pairs", planned.len().to_string()),
        ],
    );

    Ok(true)
}

fn cmd_init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "{} already exists (use --force to overwrite)",
            path.display()
        );
    }
    BatchConfig::default()
        .to_yaml(path)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;
    println!("Wrote default config to {}", path.display());
    Ok(())
}
