//! Batch pipeline: several moorings, per-dataset parameters, Parquet output
//!
//! This example demonstrates:
//! - Parameter defaults with a per-dataset override
//! - Batch execution where one broken dataset does not stop the others
//! - Writing flagged datasets and a JSON job summary
//!
//! Run with: cargo run --example batch_pipeline

use chrono::{TimeZone, Utc};
use ocean_qc::checks::default_suite;
use ocean_qc::dataset::{epoch_seconds, Dataset, ProcessingMode, Variable, TIME};
use ocean_qc::orchestrator::Orchestrator;
use ocean_qc::params::ParameterSet;
use ocean_qc::storage::ParquetStore;

fn mooring(id: &str, offset: f64) -> Result<Dataset, Box<dyn std::error::Error>> {
    let start = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).single().ok_or("bad date")?;
    let end = Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).single().ok_or("bad date")?;
    let t0 = epoch_seconds(start) + 7200.0;
    let times: Vec<f64> = (0..288).map(|i| t0 + 600.0 * f64::from(i)).collect();
    let temps: Vec<f64> = (0..288)
        .map(|i| offset + 0.3 * (f64::from(i) / 36.0).sin())
        .collect();

    let mut dataset = Dataset::new(id, ProcessingMode::TimeSeries)
        .with_site_code(id)
        .with_deployment(start, end);
    dataset.add_dimension(Variable::series(TIME, times))?;
    dataset.add_variable(Variable::series("TEMP", temps).with_dimensions([TIME]))?;
    Ok(dataset)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== ocean-qc Batch Pipeline Example ===\n");

    let params = ParameterSet::new()
        .with_default("regional_range", "TEMP_min", 10.0)
        .with_default("regional_range", "TEMP_max", 26.0)
        .with_override("NRSKAI", "regional_range", "TEMP_max", 20.0);

    // timestamps in 1900: aborted by the impossible date test
    let mut broken = Dataset::new("BROKEN", ProcessingMode::TimeSeries);
    broken.add_dimension(Variable::series(TIME, vec![-2.2e9, -2.2e9 + 600.0]))?;

    let datasets = vec![mooring("NRSMAI", 17.0)?, mooring("NRSKAI", 20.1)?, broken];
    println!("Running {} datasets...", datasets.len());
    let batch = Orchestrator::new(default_suite()).run_batch(datasets, &std::sync::Arc::new(params));

    let out_dir = std::env::temp_dir().join("ocean-qc-demo");
    std::fs::create_dir_all(&out_dir)?;
    let store = ParquetStore::default();
    for run in &batch.runs {
        let path = out_dir.join(format!("{}.parquet", run.dataset.id()));
        store.save_parquet(&run.dataset, &path)?;
        println!("  ✓ {} -> {} ({} provenance records)", run.dataset.id(), path.display(), run.log.len());
    }

    for outcome in batch.summary.outcomes() {
        if let Some(failure) = &outcome.failure {
            println!("  ✗ {}: {}", outcome.dataset_id, failure.message);
        }
    }

    let summary = out_dir.join("qc_summary.json");
    std::fs::write(&summary, serde_json::to_string_pretty(&batch.summary)?)?;
    println!(
        "\n{} completed, {} failed, summary at {}",
        batch.summary.completed(),
        batch.summary.failed(),
        summary.display()
    );
    Ok(())
}
