//! Basic ocean-qc usage: one mooring through the default QC chain
//!
//! This example demonstrates:
//! - Building a time-series dataset with deployment metadata
//! - Running the default automatic chain
//! - Reading fused flags and the provenance report
//!
//! Run with: cargo run --example basic_usage

use chrono::{TimeZone, Utc};
use ocean_qc::checks::default_suite;
use ocean_qc::dataset::{epoch_seconds, Dataset, ProcessingMode, Variable, TIME};
use ocean_qc::flags::QualityFlag;
use ocean_qc::orchestrator::Orchestrator;
use ocean_qc::params::ParameterSet;
use std::sync::Arc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== ocean-qc Basic Usage Example ===\n");

    // Three days of 10-minute temperature with one spike and one sensor glitch
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().ok_or("bad date")?;
    let end = Utc.with_ymd_and_hms(2024, 1, 4, 0, 0, 0).single().ok_or("bad date")?;
    let t0 = epoch_seconds(start);
    let n = 432;
    let times: Vec<f64> = (0..n).map(|i| t0 + 600.0 * f64::from(i)).collect();
    let mut temps: Vec<f64> = (0..n)
        .map(|i| 18.0 + 0.4 * (f64::from(i) / 72.0 * std::f64::consts::TAU).sin())
        .collect();
    temps[150] = 24.0;
    temps[300] = 99.0;

    println!("Building dataset...");
    let mut dataset = Dataset::new("NRSMAI-demo", ProcessingMode::TimeSeries)
        .with_site_code("NRSMAI")
        .with_instrument("SBE39")
        .with_deployment(start, end);
    dataset.add_dimension(Variable::series(TIME, times))?;
    dataset.add_variable(
        Variable::series("TEMP", temps)
            .with_dimensions([TIME])
            .with_meta("valid_min", -2.5)
            .with_meta("valid_max", 40.0),
    )?;
    println!("  ✓ {} samples, deployment {start} to {end}\n", n);

    println!("Running default chain:");
    let suite = default_suite();
    for test in &suite {
        println!("  - {}", test.name());
    }
    let run = Orchestrator::new(suite).run_all(dataset, Arc::new(ParameterSet::new()))?;
    println!();

    let temp = run.dataset.find("TEMP").ok_or("TEMP missing")?;
    println!("TEMP flag counts:");
    for flag in QualityFlag::ALL {
        let count = temp.flags().iter().filter(|&&f| f == flag).count();
        if count > 0 {
            println!("  {:<14} {count:>5}", flag.name());
        }
    }
    println!("\n  sample 150 -> {}", temp.flags()[150]);
    println!("  sample 300 -> {}\n", temp.flags()[300]);

    println!("Processing report:");
    print!("{}", run.log.render_report());

    Ok(())
}
