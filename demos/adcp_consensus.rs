//! ADCP beam consensus and profile majority
//!
//! This example demonstrates:
//! - Per-beam echo amplitude masks voted into one pass mask
//! - Outward propagation of the first failing bin
//! - Rejection of profiles whose relevant bins mostly fail
//!
//! Run with: cargo run --example adcp_consensus

use ocean_qc::checks::{BeamConsensus, ProfileMajority, HEIGHT_ABOVE_SENSOR};
use ocean_qc::dataset::{Dataset, ProcessingMode, Variable, TIME};
use ocean_qc::flags::QualityFlag;
use ocean_qc::grid::Grid;
use ocean_qc::orchestrator::Orchestrator;
use ocean_qc::params::ParameterSet;
use ocean_qc::runner::QcTest;
use std::sync::Arc;

const ENSEMBLES: usize = 6;
const BINS: usize = 12;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("=== ocean-qc ADCP Consensus Example ===\n");

    let mut dataset = Dataset::new("adcp-demo", ProcessingMode::TimeSeries);
    let times = (0..ENSEMBLES).map(|i| 1.7e9 + 600.0 * i as f64).collect();
    let heights = (0..BINS).map(|b| 2.0 + 2.0 * b as f64).collect();
    dataset.add_dimension(Variable::series(TIME, times))?;
    dataset.add_dimension(Variable::series(HEIGHT_ABOVE_SENSOR, heights))?;
    dataset.add_variable(Variable::series("DEPTH", vec![25.0; ENSEMBLES]))?;

    // echo amplitude fades with range; beam 4 is fouled in ensemble 3
    for beam in 1..=4 {
        let mut amplitude = Grid::filled(ENSEMBLES, BINS, 0.0);
        for row in 0..ENSEMBLES {
            for bin in 0..BINS {
                let mut value = 150.0 - 9.0 * bin as f64 - beam as f64;
                if beam == 4 && row == 3 {
                    value = 30.0;
                }
                amplitude.set(row, bin, value);
            }
        }
        dataset.add_variable(Variable::profile(format!("CMAG{beam}"), amplitude))?;
    }
    for name in ["UCUR", "VCUR", "WCUR"] {
        dataset.add_variable(
            Variable::profile(name, Grid::filled(ENSEMBLES, BINS, 0.25))
                .with_dimensions([TIME, HEIGHT_ABOVE_SENSOR]),
        )?;
    }
    println!("  ✓ {ENSEMBLES} ensembles x {BINS} bins, 4 beams\n");

    let orchestrator = Orchestrator::new(vec![
        QcTest::dataset(BeamConsensus),
        QcTest::dataset(ProfileMajority),
    ]);
    let run = orchestrator.run_all(dataset, Arc::new(ParameterSet::new()))?;

    let ucur = run.dataset.find("UCUR").ok_or("UCUR missing")?;
    let flags = ucur.flag_grid()?;
    println!("UCUR flags ('.' good, 'x' bad), bin 0 on the left:");
    for row in 0..flags.rows() {
        let line: String = flags
            .row(row)
            .iter()
            .map(|f| if *f == QualityFlag::Good { '.' } else { 'x' })
            .collect();
        println!("  ensemble {row}: {line}");
    }

    println!("\nProcessing report:");
    print!("{}", run.log.render_report());
    Ok(())
}
