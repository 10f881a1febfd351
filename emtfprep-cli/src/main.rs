//! emtfprep command-line interface.
//!
//! Prepares signal and background trigger-primitive datasets from JSON-lines
//! event files and inspects the written archives.
#![allow(clippy::uninlined_format_args, clippy::cast_precision_loss)]

use clap::{Parser, Subcommand, ValueEnum};
use emtfprep_algorithms::{
    run_background_partitioned, run_signal_partitioned, Algorithm, BackgroundOutput,
    EventPipeline, PipelineConfig, RunStatistics, SignalOutput, TableGeometry,
};
use emtfprep_core::Event;
use emtfprep_io::{output_file_name, read_events, Dataset, MappedDataset};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    EmtfprepIo(#[from] emtfprep_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] emtfprep_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("{0}")]
    Unsupported(String),
}

/// Dataset preparation mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Analysis {
    /// Prompt muon gun, one truth particle per event
    Signal,
    /// Displaced muon gun, prepared like `signal`
    SignalDispl,
    /// Minimum-bias background, one row per end-sector
    Bkgnd,
}

impl Analysis {
    fn stem(self) -> &'static str {
        match self {
            Self::Signal => "signal",
            Self::SignalDispl => "signal_displ",
            Self::Bkgnd => "bkgnd",
        }
    }
}

/// Trigger algorithm configuration.
#[derive(Debug, Clone, Copy, ValueEnum)]
enum Algo {
    /// Phase-2 detectors (CSC, RPC, GEM, ME0)
    Phase2,
    /// Run-3 detectors (CSC, RPC, GE1/1)
    Run3,
}

impl From<Algo> for Algorithm {
    fn from(algo: Algo) -> Self {
        match algo {
            Algo::Phase2 => Self::Phase2,
            Algo::Run3 => Self::Run3,
        }
    }
}

/// Output container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Format {
    /// Native little-endian archive
    Bin,
    /// HDF5 (requires the `hdf5` feature)
    H5,
}

impl Format {
    fn extension(self) -> &'static str {
        match self {
            Self::Bin => "bin",
            Self::H5 => "h5",
        }
    }
}

/// EMTF trigger-primitive dataset preparation.
#[derive(Parser)]
#[command(name = "emtfprep")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Prepare a dataset from JSON-lines event files
    Prepare {
        /// Analysis mode
        #[arg(short, long, value_enum, default_value = "signal")]
        analysis: Analysis,

        /// Input JSON-lines file(s)
        #[arg(short, long, required = true, num_args = 1..)]
        input: Vec<PathBuf>,

        /// Algorithm configuration; overrides the value in --geometry
        #[arg(long, value_enum)]
        algo: Option<Algo>,

        /// Batch job id, appended to the output name
        #[arg(short, long)]
        job_id: Option<i32>,

        /// Stop after this many events
        #[arg(short, long)]
        max_events: Option<usize>,

        /// Worker threads; omit to run sequentially
        #[arg(short, long)]
        workers: Option<usize>,

        /// Geometry tables (JSON)
        #[arg(short, long)]
        geometry: Option<PathBuf>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output_dir: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "bin")]
        format: Format,

        /// Verbose output
        #[arg(short, long)]
        verbose: bool,
    },

    /// Show the arrays of a prepared dataset
    Info {
        /// Dataset file
        input: PathBuf,
    },
}

fn init_logging(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn load_geometry(path: Option<&Path>, algo: Option<Algo>) -> Result<TableGeometry> {
    let mut geometry = match path {
        Some(path) => TableGeometry::from_file(path)?,
        None => TableGeometry::default(),
    };
    if let Some(algo) = algo {
        geometry.algorithm = algo.into();
    }
    Ok(geometry)
}

fn prepare_signal(
    geometry: &TableGeometry,
    config: &PipelineConfig,
    events: &[Event],
    pool: Option<&rayon::ThreadPool>,
) -> Result<SignalOutput> {
    let output = match pool {
        Some(pool) => pool.install(|| {
            run_signal_partitioned(geometry, config, events, pool.current_num_threads() * 4)
        })?,
        None => EventPipeline::new(geometry, config.clone()).run_signal(events)?,
    };
    Ok(output)
}

fn prepare_background(
    geometry: &TableGeometry,
    config: &PipelineConfig,
    events: &[Event],
    pool: Option<&rayon::ThreadPool>,
) -> Result<BackgroundOutput> {
    let output = match pool {
        Some(pool) => pool.install(|| {
            run_background_partitioned(geometry, config, events, pool.current_num_threads() * 4)
        })?,
        None => EventPipeline::new(geometry, config.clone()).run_background(events)?,
    };
    Ok(output)
}

fn write_output(path: &Path, dataset: &Dataset, format: Format) -> Result<()> {
    match format {
        Format::Bin => emtfprep_io::write_dataset(path, dataset)?,
        #[cfg(feature = "hdf5")]
        Format::H5 => emtfprep_io::write_hdf5_dataset(path, dataset)?,
        #[cfg(not(feature = "hdf5"))]
        Format::H5 => {
            return Err(CliError::Unsupported(
                "HDF5 output requires building with the `hdf5` feature".to_string(),
            ))
        }
    }
    Ok(())
}

fn print_stats(stats: &RunStatistics) {
    println!("Events read: {}", stats.events_read);
    println!("Events written: {}", stats.events_written);
    println!("Hits written: {}", stats.hits_written);
    if stats.simhits_written > 0 {
        println!("Simhits written: {}", stats.simhits_written);
    }
}

#[allow(clippy::too_many_arguments)]
fn prepare(
    analysis: Analysis,
    input: &[PathBuf],
    algo: Option<Algo>,
    job_id: Option<i32>,
    max_events: Option<usize>,
    workers: Option<usize>,
    geometry: Option<&Path>,
    output_dir: &Path,
    format: Format,
) -> Result<()> {
    let start = Instant::now();
    log::info!("Start preparing {} dataset", analysis.stem());

    let geometry = load_geometry(geometry, algo)?;
    let config = PipelineConfig::default()
        .with_job_id(job_id.unwrap_or(0))
        .with_max_events(max_events);

    log::info!("Analysis: {:?}", analysis);
    log::info!("Algorithm: {:?}", geometry.algorithm);
    log::info!("Job id: {}", config.job_id);
    log::info!("Input files: {}", input.len());
    if let Some(n) = max_events {
        log::info!("Max events: {}", n);
    }

    let pool = workers
        .map(|n| rayon::ThreadPoolBuilder::new().num_threads(n).build())
        .transpose()?;
    if let Some(pool) = &pool {
        log::info!("Workers: {}", pool.current_num_threads());
    }

    let events = read_events(input, max_events)?;
    log::info!("Loaded {} events", events.len());

    let (dataset, stats) = match analysis {
        Analysis::Signal | Analysis::SignalDispl => {
            let output = prepare_signal(&geometry, &config, &events, pool.as_ref())?;
            (Dataset::from_signal(&output)?, output.stats)
        }
        Analysis::Bkgnd => {
            let output = prepare_background(&geometry, &config, &events, pool.as_ref())?;
            (Dataset::from_background(&output)?, output.stats)
        }
    };

    std::fs::create_dir_all(output_dir)?;
    let path = output_dir.join(output_file_name(
        analysis.stem(),
        job_id,
        format.extension(),
    ));
    write_output(&path, &dataset, format)?;

    for array in dataset.iter() {
        log::info!("{}: {:?} {}", array.name, array.shape, array.data.dtype());
    }
    print_stats(&stats);
    println!("Wrote {}", path.display());
    println!("Elapsed time: {:.2}s", start.elapsed().as_secs_f64());
    Ok(())
}

fn info(input: &Path) -> Result<()> {
    println!("File: {}", input.display());
    let is_hdf5 = input
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("h5"));

    if is_hdf5 {
        #[cfg(feature = "hdf5")]
        {
            let dataset = emtfprep_io::read_hdf5_dataset(input)?;
            for array in dataset.iter() {
                println!("{:<24} {:<8} {:?}", array.name, array.data.dtype(), array.shape);
            }
            return Ok(());
        }
        #[cfg(not(feature = "hdf5"))]
        return Err(CliError::Unsupported(
            "reading HDF5 requires building with the `hdf5` feature".to_string(),
        ));
    }

    let mapped = MappedDataset::open(input)?;
    for entry in mapped.entries() {
        println!("{:<24} {:<8} {:?}", entry.name, entry.dtype, entry.shape);
    }
    if let Ok(hits) = mapped.ragged("out_hits") {
        println!(
            "Rows: {}, hits per row: {:.2}",
            hits.num_rows(),
            hits.num_records() as f64 / hits.num_rows().max(1) as f64
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Prepare {
            analysis,
            input,
            algo,
            job_id,
            max_events,
            workers,
            geometry,
            output_dir,
            format,
            verbose,
        } => {
            init_logging(verbose);
            prepare(
                analysis,
                &input,
                algo,
                job_id,
                max_events,
                workers,
                geometry.as_deref(),
                &output_dir,
                format,
            )?;
        }

        Commands::Info { input } => {
            init_logging(false);
            info(&input)?;
        }
    }

    Ok(())
}
