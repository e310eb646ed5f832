//! Tukey 53H spike detection
//!
//! Each interior sample is compared against a robust local estimate built
//! from its 5-sample neighbourhood: a running median of 3 reduces the window
//! to 3 values, which are Hanning-weighted `0.25*(a + 2b + c)`. The residual
//! threshold scales with the standard deviation of a mean-removed, mildly
//! high-passed copy of the whole series.

use super::filters::{highpass, mean_removed, median3, std_dev};
use super::Classification;
use serde::{Deserialize, Serialize};

/// Tukey 53H parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TukeyParams {
    /// Residual threshold in standard deviations
    pub k: f64,
    /// Low-pass memory used to build the high-passed copy (closer to 1 = milder)
    pub highpass_smoothing: f64,
}

impl Default for TukeyParams {
    fn default() -> Self {
        Self {
            k: 1.5,
            highpass_smoothing: 0.99,
        }
    }
}

/// Classify spikes with Tukey 53H.
///
/// The first two and last two samples are never evaluated.
#[must_use]
pub fn tukey_53h(values: &[f64], params: &TukeyParams) -> Classification {
    let n = values.len();
    let mut result = Classification::inconclusive(n);
    if n < 5 {
        return result;
    }

    let filtered = highpass(&mean_removed(values), params.highpass_smoothing);
    let Some(sigma) = std_dev(&filtered) else {
        return result;
    };
    let limit = params.k * sigma;

    for m in 2..n - 2 {
        let window = &values[m - 2..=m + 2];
        if window.iter().any(|v| !v.is_finite()) {
            continue;
        }
        let smoothed = smooth_53h(window);
        result.mark(m, (values[m] - smoothed).abs() > limit);
    }
    result
}

fn smooth_53h(window: &[f64]) -> f64 {
    let a = median3(window[0], window[1], window[2]);
    let b = median3(window[1], window[2], window[3]);
    let c = median3(window[2], window[3], window[4]);
    0.25 * (2.0f64.mul_add(b, a) + c)
}
