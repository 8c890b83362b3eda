//! fan-acoustics command line
//!
//! Runs the batch pipeline, or any single stage of it, from a TOML config.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use fan_acoustics::aggregate::volume::volume_db;
use fan_acoustics::logging;
use fan_acoustics::storage::tables::{self, SPECTRA_FILE, VOLUMES_FILE};
use fan_acoustics::{Pipeline, PipelineConfig};

/// Fan noise characterization from repeated recording trials
#[derive(Parser)]
#[command(name = "fan-acoustics")]
#[command(version)]
#[command(about = "Aggregate fan noise recordings into calibrated per-speed spectra")]
struct Cli {
    /// Enable debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Analyze every trial folder and write its per-speed volume table
    Analyze {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Merge per-trial volume tables into the cross-trial table
    ///
    /// Prints per-speed volume statistics once the table is written.
    Aggregate {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Select and average representative spectra from the cross-trial table
    Spectra {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Convert the binned spectra to decibels
    Calibrate {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },

    /// Run every stage in order
    Run {
        #[arg(value_name = "CONFIG")]
        config: PathBuf,
    },
}

fn load_pipeline(path: &Path) -> Result<Pipeline> {
    let config = PipelineConfig::load(path)
        .with_context(|| format!("Failed to load config {}", path.display()))?;
    tracing::debug!(
        "Selection: {}, calibration: {}, data: {}",
        config.selection,
        config.calibration,
        config.data_dir.display()
    );
    Ok(Pipeline::new(config)?)
}

fn handle_analyze(pipeline: &Pipeline) -> Result<()> {
    let (analyses, report) = pipeline.analyze_trials().context("Analysis failed")?;
    for analysis in &analyses {
        println!(
            "{}: {} recordings analyzed, {} skipped",
            analysis.trial,
            analysis.volumes.len(),
            analysis.skipped.len()
        );
    }
    report.log_summary();
    Ok(())
}

fn handle_aggregate(pipeline: &Pipeline) -> Result<()> {
    let (table, report) = pipeline.aggregate_volumes().context("Aggregation failed")?;
    report.log_summary();

    println!(
        "{:>5} {:>6} {:>12} {:>12} {:>12} {:>12}",
        "Speed", "Trials", "Min", "Q25", "Median", "Q75"
    );
    for stats in table.statistics() {
        println!(
            "{:>5} {:>6} {:>12.6} {:>12.6} {:>12.6} {:>12.6}",
            stats.speed, stats.count, stats.min, stats.q25, stats.median, stats.q75
        );
    }

    println!();
    println!(
        "{:>5} {:>10} {:>10} {:>10} {:>10}",
        "Speed", "Min dB", "Q25 dB", "Median dB", "Q75 dB"
    );
    let db = |v: f64| {
        volume_db(v)
            .map(|d| format!("{:.2}", d))
            .unwrap_or_else(|| "-".to_string())
    };
    for stats in table.statistics() {
        println!(
            "{:>5} {:>10} {:>10} {:>10} {:>10}",
            stats.speed,
            db(stats.min),
            db(stats.q25),
            db(stats.median),
            db(stats.q75)
        );
    }
    Ok(())
}

fn handle_spectra(pipeline: &Pipeline) -> Result<()> {
    let path = pipeline.config().output_dir().join(VOLUMES_FILE);
    let (table, _) = tables::read_volume_table(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let outcome = pipeline.select_spectra(&table);
    for skipped in &outcome.skipped_speeds {
        tracing::warn!("Fan speed {} left out: {}", skipped.speed, skipped.reason);
    }

    let binner = pipeline.spectrum_binner(&outcome)?;
    let matrix = pipeline
        .bin_spectra(&outcome, &binner)
        .context("Binning failed")?;

    println!(
        "{} fan speeds, {} frequency bins ({} speeds skipped)",
        matrix.speeds().len(),
        matrix.num_bins(),
        outcome.skipped_speeds.len()
    );
    Ok(())
}

fn handle_calibrate(pipeline: &Pipeline) -> Result<()> {
    let reference = pipeline
        .load_reference()
        .context("Failed to load silence reference")?;

    let path = pipeline.config().output_dir().join(SPECTRA_FILE);
    let matrix = tables::read_spectrum_matrix(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let binner = pipeline.reference_binner(&matrix)?;
    let calibrated = pipeline
        .calibrate(&matrix, reference.as_ref(), &binner)
        .context("Calibration failed")?;

    print_db_range(calibrated.db_range());
    Ok(())
}

fn handle_run(pipeline: &Pipeline) -> Result<()> {
    let output = pipeline.run().context("Pipeline failed")?;
    println!(
        "{} trials, {} fan speeds, {} frequency rows",
        output.report.trials_included.len(),
        output.calibrated.speeds().len(),
        output.calibrated.frequencies().len()
    );
    print_db_range(output.calibrated.db_range());
    Ok(())
}

fn print_db_range(range: Option<(f64, f64)>) {
    match range {
        Some((min, max)) => println!("dB range: {:.2} to {:.2}", min, max),
        None => println!("No calibrated values"),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init_logging(cli.verbose)?;

    match cli.command {
        Commands::Analyze { config } => handle_analyze(&load_pipeline(&config)?),
        Commands::Aggregate { config } => handle_aggregate(&load_pipeline(&config)?),
        Commands::Spectra { config } => handle_spectra(&load_pipeline(&config)?),
        Commands::Calibrate { config } => handle_calibrate(&load_pipeline(&config)?),
        Commands::Run { config } => handle_run(&load_pipeline(&config)?),
    }
}
