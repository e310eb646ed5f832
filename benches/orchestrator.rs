//! Orchestrator benchmarks
//!
//! Full default chain on one mooring, and a batch of moorings (rayon when
//! the feature is on).
//!
//! Run with: cargo bench --bench orchestrator

use chrono::{TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ocean_qc::checks::default_suite;
use ocean_qc::dataset::{epoch_seconds, Dataset, ProcessingMode, Variable, TIME};
use ocean_qc::orchestrator::Orchestrator;
use ocean_qc::params::ParameterSet;
use std::sync::Arc;

#[allow(clippy::cast_precision_loss)]
fn mooring(id: &str, n: usize) -> Dataset {
    let start = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    let end = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let t0 = epoch_seconds(start) + 3600.0;
    let times: Vec<f64> = (0..n).map(|i| t0 + 600.0 * i as f64).collect();
    let temps = (0..n)
        .map(|i| if i % 211 == 100 { 35.0 } else { 15.0 + (i as f64 / 72.0).sin() })
        .collect();

    let mut ds = Dataset::new(id, ProcessingMode::TimeSeries).with_deployment(start, end);
    ds.add_dimension(Variable::series(TIME, times)).unwrap();
    ds.add_variable(
        Variable::series("TEMP", temps)
            .with_dimensions([TIME])
            .with_meta("valid_min", -2.5)
            .with_meta("valid_max", 40.0),
    )
    .unwrap();
    ds
}

fn bench_run_all(c: &mut Criterion) {
    let mut group = c.benchmark_group("default_chain");
    let params = Arc::new(ParameterSet::new());
    let orchestrator = Orchestrator::new(default_suite());

    for size in [1_000, 50_000] {
        let dataset = mooring("bench", size);
        group.bench_with_input(BenchmarkId::new("run_all", size), &dataset, |b, ds| {
            b.iter(|| orchestrator.run_all(black_box(ds.clone()), Arc::clone(&params)));
        });
    }

    group.finish();
}

fn bench_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch");
    group.sample_size(10);
    let params = Arc::new(ParameterSet::new());
    let orchestrator = Orchestrator::new(default_suite());
    let datasets: Vec<Dataset> = (0..16).map(|i| mooring(&format!("m{i}"), 10_000)).collect();

    group.bench_function("run_batch_16", |b| {
        b.iter(|| orchestrator.run_batch(black_box(datasets.clone()), &params));
    });

    group.finish();
}

criterion_group!(benches, bench_run_all, bench_batch);
criterion_main!(benches);
