//! oceanqc CLI entry point.
//!
//! Runs the default QC chain over Parquet time-series files in batch (auto)
//! mode and writes the flagged datasets, reports and a job summary.

use anyhow::Context;
use clap::{Parser, Subcommand};
use ocean_qc::checks::{default_suite, ManualOverride};
use ocean_qc::context::DEFAULT_MAX_DESPIKE_ITERATIONS;
use ocean_qc::flags::FlagScheme;
use ocean_qc::orchestrator::{Orchestrator, OrchestratorConfig};
use ocean_qc::params::ParameterSet;
use ocean_qc::runner::QcTest;
use ocean_qc::storage::ParquetStore;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Default output directory for flagged datasets.
const DEFAULT_OUTPUT_DIR: &str = "./qc-output";

/// Automatic quality control for oceanographic time series.
#[derive(Parser)]
#[command(name = "oceanqc")]
#[command(about = "Flag oceanographic time series with an automatic QC chain")]
#[command(version)]
struct Cli {
    /// The subcommand to execute.
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, default_value = "info", global = true)]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// QC Parquet files and write flagged copies.
    Run(RunArgs),

    /// List the tests of the default chain in run order.
    Suite,
}

#[derive(Parser, Debug)]
struct RunArgs {
    /// Parquet files to process, one dataset each.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// JSON parameter file (defaults and per-dataset overrides).
    #[arg(short, long, env = "OCEANQC_PARAMS")]
    params: Option<PathBuf>,

    /// Flag numbering scheme for input and output files (iode, argo).
    #[arg(short, long, default_value = "iode")]
    scheme: String,

    /// Directory for flagged Parquet files.
    #[arg(short, long, default_value = DEFAULT_OUTPUT_DIR)]
    output_dir: PathBuf,

    /// Write a text processing report next to each output file.
    #[arg(long)]
    report: bool,

    /// JSON file of manual flags applied after the automatic chain.
    #[arg(long)]
    manual_flags: Option<PathBuf>,

    /// Bound on iterative despike passes.
    #[arg(long, default_value_t = DEFAULT_MAX_DESPIKE_ITERATIONS)]
    max_despike_iterations: usize,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Priority: RUST_LOG env var > --log-level CLI arg > default "info"
    let log_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| cli.log_level.clone());
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&log_filter)))
        .init();

    match cli.command {
        Commands::Run(args) => run(&args),
        Commands::Suite => {
            for (i, test) in default_suite().iter().enumerate() {
                println!("{:>2}. {}", i + 1, test.name());
            }
            Ok(())
        }
    }
}

fn run(args: &RunArgs) -> anyhow::Result<()> {
    let params = match &args.params {
        Some(path) => ParameterSet::load(path)
            .with_context(|| format!("loading parameters from {}", path.display()))?,
        None => ParameterSet::new(),
    };
    let params = Arc::new(params);
    let store = ParquetStore::new(FlagScheme::by_name(&args.scheme)?);

    let mut tests = default_suite();
    if let Some(path) = &args.manual_flags {
        let manual = ManualOverride::load(path)
            .with_context(|| format!("loading manual flags from {}", path.display()))?;
        info!(flags = manual.len(), "Manual flags loaded");
        tests.push(QcTest::variable(manual));
    }
    let orchestrator = Orchestrator::new(tests).with_config(OrchestratorConfig {
        auto: true,
        max_despike_iterations: args.max_despike_iterations,
    });

    let (datasets, unreadable) = store.load_all(&args.files);

    fs::create_dir_all(&args.output_dir)
        .with_context(|| format!("creating {}", args.output_dir.display()))?;
    let mut batch = orchestrator.run_batch(datasets, &params);
    for outcome in unreadable {
        batch.summary.push(outcome);
    }

    for run in &batch.runs {
        let out = output_path(&args.output_dir, run.dataset.id(), "parquet");
        store
            .save_parquet(&run.dataset, &out)
            .with_context(|| format!("writing {}", out.display()))?;
        if args.report {
            let report = output_path(&args.output_dir, run.dataset.id(), "qc.txt");
            fs::write(&report, run.log.render_report())
                .with_context(|| format!("writing {}", report.display()))?;
        }
        info!(dataset = run.dataset.id(), path = %out.display(), "Flagged dataset written");
    }

    let summary_path = args.output_dir.join("qc_summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&batch.summary)?)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    println!(
        "{} completed, {} failed (summary: {})",
        batch.summary.completed(),
        batch.summary.failed(),
        summary_path.display()
    );
    if batch.summary.failed() > 0 {
        anyhow::bail!("{} dataset(s) aborted", batch.summary.failed());
    }
    Ok(())
}

fn output_path(dir: &Path, id: &str, extension: &str) -> PathBuf {
    dir.join(format!("{id}.{extension}"))
}
