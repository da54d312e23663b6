//! Cell Fate Analysis CLI Application
//!
//! Command-line front end for the cellfate-hmm library. It adds:
//! - Plate configuration (config.toml)
//! - A JSON tracking store adapter
//! - Parallel processing of positions
//! - Summary, timing and class reports

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;

mod config;
mod report;
mod runner;
mod store;

/// Cell Fate Analysis - HMM correction of classifier labels and mitotic timing
#[derive(Parser, Debug)]
#[command(name = "cellfate")]
#[command(about = "Correct cell-state tracks with a constrained HMM and measure mitosis", long_about = None)]
#[command(version)]
struct Args {
    /// Path to configuration file (config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: PathBuf,

    /// Output directory (overrides [output] dir)
    #[arg(short, long, value_name = "DIR")]
    output: Option<PathBuf>,

    /// Number of worker threads (default: one per core)
    #[arg(short, long, value_name = "COUNT")]
    jobs: Option<usize>,

    /// Verbosity level (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(args.verbose, args.quiet);

    log::info!("Cell Fate CLI v{}", env!("CARGO_PKG_VERSION"));
    log::info!("Using HMM library v{}", cellfate_hmm::VERSION);

    let started = chrono::Local::now();

    log::info!("Loading configuration from: {:?}", args.config);
    let config = config::load_config(&args.config)?;
    log::debug!("Configuration loaded successfully");

    // Model errors abort the run before any track is decoded
    let analysis = cellfate_hmm::Analysis::from_config(&config.analysis())
        .with_context(|| format!("Failed to build model from {:?}", config.hmm.constraint_file))?;
    log::info!(
        "Model ready: {} states, {} labels",
        analysis.model().n_states(),
        analysis.model().n_symbols()
    );

    runner::configure_threads(args.jobs);
    let reports = runner::run_batch(&analysis, &config.plates);

    let summary = report::RunSummary::new(started, &reports);
    let output_dir = args.output.unwrap_or_else(|| config.output.dir.clone());
    report::write_reports(&output_dir, config.output.format, &reports, &summary)?;

    if !args.quiet {
        print_summary(&reports, &summary);
    }

    Ok(())
}

fn print_summary(reports: &[runner::PlateReport], summary: &report::RunSummary) {
    println!("═══════════════════════════════════════════════");
    println!("  Cell Fate Analysis - Summary");
    println!("═══════════════════════════════════════════════\n");

    for plate in reports {
        match &plate.error {
            Some(e) => println!("✗ {}: {}", plate.name, e),
            None => println!(
                "✓ {}: {} positions, {} tracks, {} skipped, {} corrupt positions",
                plate.name,
                plate.positions.len(),
                plate.track_count(),
                plate.skip_count(),
                plate.corrupt.len()
            ),
        }
    }

    println!(
        "\nTotal: {} tracks, {} skipped",
        summary.total_tracks(),
        summary.total_skipped()
    );
}

/// Initialize logging based on verbosity level
fn init_logging(verbose: u8, quiet: bool) {
    use env_logger::Builder;
    use log::LevelFilter;
    use std::io::Write;

    let level = if quiet {
        LevelFilter::Error
    } else {
        match verbose {
            0 => LevelFilter::Info,
            1 => LevelFilter::Debug,
            _ => LevelFilter::Trace,
        }
    };

    Builder::new()
        .filter_level(level)
        .format(|buf, record| {
            writeln!(
                buf,
                "[{} {}] {}",
                record.level(),
                record.target(),
                record.args()
            )
        })
        .init();
}
