//! RC-filter despiking
//!
//! An exponential (RC) low-pass of the mean-removed, high-passed series
//! tracks the local level `lp`; the same filter on the squared series gives
//! `lpsq`, and `lpsq - lp^2` estimates the local variance. Sample `m + 1` is
//! anomalous when it falls outside `lp[m] ± k * sqrt(variance[m])`.

use super::filters::{highpass, mean_removed};
use super::Classification;
use serde::{Deserialize, Serialize};

/// RC-filter despike parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RcParams {
    /// Low-pass memory `a` in `lp[i] = a*lp[i-1] + (1-a)*x[i]`
    pub smoothing: f64,
    /// Acceptance band half-width in local standard deviations
    pub k: f64,
    /// Low-pass memory used to build the high-passed copy
    pub highpass_smoothing: f64,
}

impl Default for RcParams {
    fn default() -> Self {
        Self {
            smoothing: 0.7,
            k: 3.0,
            highpass_smoothing: 0.99,
        }
    }
}

/// Classify spikes with the RC filter.
///
/// The filters start from the series mean (zero after mean removal) and its
/// mean square, so the first evaluated sample already has a variance
/// estimate. The first sample is never evaluated.
#[must_use]
pub fn rc_despike(values: &[f64], params: &RcParams) -> Classification {
    let n = values.len();
    let mut result = Classification::inconclusive(n);
    if n < 2 {
        return result;
    }

    let filtered = highpass(&mean_removed(values), params.highpass_smoothing);
    let squares: Vec<f64> = filtered.iter().map(|v| v * v).collect();
    let finite_squares: Vec<f64> = squares.iter().copied().filter(|v| v.is_finite()).collect();
    if finite_squares.is_empty() {
        return result;
    }
    #[allow(clippy::cast_precision_loss)]
    let mean_square = finite_squares.iter().sum::<f64>() / finite_squares.len() as f64;

    let a = params.smoothing;
    let mut lp = 0.0;
    let mut lpsq = mean_square;
    for m in 0..n - 1 {
        if filtered[m].is_finite() {
            lp = a.mul_add(lp, (1.0 - a) * filtered[m]);
            lpsq = a.mul_add(lpsq, (1.0 - a) * squares[m]);
        }
        let next = filtered[m + 1];
        if !next.is_finite() {
            continue;
        }
        let variance = lp.mul_add(-lp, lpsq).max(0.0);
        result.mark(m + 1, (next - lp).abs() > params.k * variance.sqrt());
    }
    result
}
