//! Spike and anomaly detectors
//!
//! Every detector is a pure function of its inputs: no hidden state, no
//! randomness, identical output for identical input.
//!
//! | Detector | Boundary policy |
//! |----------|-----------------|
//! | [`despike`] (gradient pair) | first and last samples never flagged |
//! | [`tukey_53h`] | first two and last two samples never evaluated |
//! | [`rc_despike`] | first sample never evaluated |
//! | [`rate_of_change`] | edges compared single-sided |
//!
//! NaN input never raises. Samples whose verdict depends on a NaN are left
//! unevaluated, so callers can keep them at `raw`.

mod filters;
mod gradient;
mod rate_of_change;
mod rc_filter;
mod tukey;

pub use filters::{exponential_lowpass, highpass, mean_removed, median3, std_dev};
pub use gradient::{despike, despike_iterative, GradientParams, IterativeDespike};
pub use rate_of_change::{first_month_std, rate_of_change, RateOfChangeParams, SECONDS_PER_DAY};
pub use rc_filter::{rc_despike, RcParams};
pub use tukey::{tukey_53h, TukeyParams};

use serde::{Deserialize, Serialize};

/// Per-sample verdict of a detector.
///
/// `anomalous[i]` is the boolean mask (true = anomalous). `evaluated[i]` is
/// false where the detector could not reach a verdict (boundary samples,
/// NaN-derived comparisons, cancelled neighbours); such samples are never
/// anomalous.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Classification {
    /// True where the sample is anomalous
    pub anomalous: Vec<bool>,
    /// True where the detector reached a verdict
    pub evaluated: Vec<bool>,
}

impl Classification {
    /// Nothing evaluated, nothing anomalous.
    #[must_use]
    pub fn inconclusive(len: usize) -> Self {
        Self {
            anomalous: vec![false; len],
            evaluated: vec![false; len],
        }
    }

    /// Number of samples.
    #[must_use]
    pub fn len(&self) -> usize {
        self.anomalous.len()
    }

    /// Whether the classification covers no samples.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.anomalous.is_empty()
    }

    /// Number of anomalous samples.
    #[must_use]
    pub fn anomaly_count(&self) -> usize {
        self.anomalous.iter().filter(|&&a| a).count()
    }

    /// Indices of anomalous samples.
    #[must_use]
    pub fn anomalous_indices(&self) -> Vec<usize> {
        self.anomalous
            .iter()
            .enumerate()
            .filter_map(|(i, &a)| a.then_some(i))
            .collect()
    }

    /// Whether sample `i` was evaluated and found normal.
    #[must_use]
    pub fn passed(&self, i: usize) -> bool {
        self.evaluated[i] && !self.anomalous[i]
    }

    pub(crate) fn mark(&mut self, i: usize, anomalous: bool) {
        self.evaluated[i] = true;
        self.anomalous[i] = anomalous;
    }
}

fn check_same_len(times: &[f64], values: &[f64]) -> crate::Result<()> {
    if times.len() == values.len() {
        Ok(())
    } else {
        Err(crate::Error::ShapeMismatch {
            expected: values.len(),
            actual: times.len(),
        })
    }
}
