//! Concrete QC tests
//!
//! Each test is a thin configuration of the engine: it reads its thresholds
//! from the run's [`ParameterSet`](crate::params::ParameterSet), calls a
//! detector or consensus policy and turns the verdict into candidate flags.
//! Anything it cannot work with (missing metadata, wrong processing mode,
//! malformed beam layout) makes it not applicable rather than an error.
//!
//! | Test | Kind | Target |
//! |------|------|--------|
//! | [`ImpossibleDate`] | variable | `TIME` |
//! | [`InOutWater`] | variable | `TIME` and everything sampled on it |
//! | [`GlobalRange`] | variable | variables with `valid_min`/`valid_max` |
//! | [`RegionalRange`] | variable | variables with configured bounds |
//! | [`SpikeCheck`] | variable | time series |
//! | [`RateOfChange`] | variable | time series |
//! | [`BeamConsensus`] | dataset | ADCP velocities |
//! | [`ProfileMajority`] | dataset | ADCP velocities |
//! | [`ManualOverride`] | variable | any |

mod adcp;
mod manual;
mod range;
mod spike;
mod time;

pub use adcp::{BeamConsensus, ProfileMajority, HEIGHT_ABOVE_SENSOR, VELOCITY_VARIABLES};
pub use manual::ManualOverride;
pub use range::{GlobalRange, RegionalRange};
pub use spike::{RateOfChange, SpikeCheck, SpikeMethod};
pub use time::{ImpossibleDate, InOutWater};

use crate::dataset::{Dataset, ProcessingMode, Slot, Variable, TIME};
use crate::detectors::Classification;
use crate::flags::QualityFlag;
use crate::grid::Shape;
use crate::runner::QcTest;

/// Standard automatic test chain, in run order.
#[must_use]
pub fn default_suite() -> Vec<QcTest> {
    vec![
        QcTest::variable(ImpossibleDate),
        QcTest::variable(InOutWater),
        QcTest::variable(GlobalRange),
        QcTest::variable(RegionalRange),
        QcTest::variable(SpikeCheck::tukey()),
        QcTest::variable(RateOfChange),
        QcTest::dataset(BeamConsensus),
        QcTest::dataset(ProfileMajority),
    ]
}

/// Time-series variable at `slot` with one sample per `TIME` value.
///
/// Variables without dimension names are taken to be sampled on `TIME` when
/// the lengths agree.
fn time_series(dataset: &Dataset, slot: Slot) -> Option<(&[f64], &Variable)> {
    if dataset.mode() != ProcessingMode::TimeSeries || !matches!(slot, Slot::Variable(_)) {
        return None;
    }
    let variable = dataset.get(slot)?;
    let times = dataset.time_seconds()?;
    let on_time = variable
        .dimensions()
        .first()
        .map_or(true, |d| d == TIME);
    let aligned = matches!(variable.shape(), Shape::Series(n) if n == times.len());
    (on_time && aligned).then_some((times, variable))
}

/// Detector verdict as candidate flags: anomalous samples get `anomaly`,
/// passing samples `good`, inconclusive ones stay `raw`.
fn verdict_flags(verdict: &Classification, anomaly: QualityFlag) -> Vec<QualityFlag> {
    verdict
        .anomalous
        .iter()
        .zip(&verdict.evaluated)
        .map(|(&anomalous, &evaluated)| match (evaluated, anomalous) {
            (true, true) => anomaly,
            (true, false) => QualityFlag::Good,
            (false, _) => QualityFlag::Raw,
        })
        .collect()
}

/// Flags for a bounds check: NaN stays `raw`.
fn range_flags(data: &[f64], min: f64, max: f64, outside: QualityFlag) -> Vec<QualityFlag> {
    data.iter()
        .map(|&v| {
            if v.is_nan() {
                QualityFlag::Raw
            } else if v < min || v > max {
                outside
            } else {
                QualityFlag::Good
            }
        })
        .collect()
}
