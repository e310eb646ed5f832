//! Double-gradient rate-of-change test
//!
//! Interior samples fail when `|x[i]-x[i-1]| + |x[i]-x[i+1]| > 2 * threshold`;
//! with only one usable neighbour the comparison is `|x[i]-x[j]| > threshold`.
//! A neighbour separated by more than `max_gap` seconds (burst sampling
//! gaps) or holding NaN is not usable.

use super::filters::std_dev;
use super::{check_same_len, Classification};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Seconds in a day.
pub const SECONDS_PER_DAY: f64 = 86_400.0;

/// Rate-of-change parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateOfChangeParams {
    /// Single-neighbour change limit, typically a multiple of the standard deviation
    pub threshold: f64,
    /// Largest neighbour spacing, in seconds, that still counts as contiguous
    pub max_gap: f64,
}

impl RateOfChangeParams {
    /// Parameters with `threshold` and a one-hour gap limit.
    #[must_use]
    pub const fn new(threshold: f64) -> Self {
        Self {
            threshold,
            max_gap: 3600.0,
        }
    }
}

/// Classify samples with the double-gradient rule.
///
/// # Errors
/// [`Error::ShapeMismatch`](crate::Error::ShapeMismatch) when `times` and
/// `values` differ in length.
pub fn rate_of_change(
    times: &[f64],
    values: &[f64],
    params: &RateOfChangeParams,
) -> Result<Classification> {
    check_same_len(times, values)?;
    let n = values.len();
    let mut result = Classification::inconclusive(n);

    let usable = |i: usize, j: usize| values[j].is_finite() && (times[i] - times[j]).abs() <= params.max_gap;

    for i in 0..n {
        let x = values[i];
        if !x.is_finite() {
            continue;
        }
        let prev = (i > 0 && usable(i, i - 1)).then(|| (x - values[i - 1]).abs());
        let next = (i + 1 < n && usable(i, i + 1)).then(|| (x - values[i + 1]).abs());
        match (prev, next) {
            (Some(p), Some(q)) => result.mark(i, p + q > 2.0 * params.threshold),
            (Some(d), None) | (None, Some(d)) => result.mark(i, d > params.threshold),
            (None, None) => {}
        }
    }
    Ok(result)
}

/// Standard deviation over the first 30 days of finite data.
///
/// This is the externally precomputed input the threshold is derived from.
#[must_use]
pub fn first_month_std(times: &[f64], values: &[f64]) -> Option<f64> {
    let start = times
        .iter()
        .zip(values)
        .find(|(t, v)| t.is_finite() && v.is_finite())
        .map(|(t, _)| *t)?;
    let end = 30.0f64.mul_add(SECONDS_PER_DAY, start);
    let month: Vec<f64> = times
        .iter()
        .zip(values)
        .filter(|(t, _)| **t >= start && **t <= end)
        .map(|(_, v)| *v)
        .collect();
    std_dev(&month)
}
