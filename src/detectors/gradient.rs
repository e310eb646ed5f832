//! Temporal-gradient-pair despiking
//!
//! A spike is a steep rise followed (within `max_spike_time`) by a steep fall,
//! or the reverse. Gradients live at the midpoint between their two samples;
//! the samples strictly between a paired rise and fall are anomalous, after
//! trimming to the half-threshold crossings on each side.
//!
//! A crossing is recorded at the sample shared by the two gradients it lies
//! between, so trimming only ever drops whole samples on a spike's flanks.

use super::{check_same_len, Classification};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Gradient-pair despike parameters.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GradientParams {
    /// Gradient magnitude (value units per second) that opens or closes a spike
    pub threshold: f64,
    /// Longest rise-to-fall separation, in seconds, treated as one spike
    pub max_spike_time: f64,
}

impl Default for GradientParams {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            max_spike_time: 600.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Gradient {
    time: f64,
    value: f64,
}

/// Classify spikes with the gradient-pair rule.
///
/// `times` are seconds and must increase; a non-increasing step yields a NaN
/// gradient, which can neither open nor close a spike.
///
/// ```rust
/// use ocean_qc::detectors::{despike, GradientParams};
///
/// let times = [0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
/// let values = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0];
/// let params = GradientParams { threshold: 5.0, max_spike_time: 3.0 };
/// let result = despike(&times, &values, &params)?;
/// assert_eq!(result.anomalous_indices(), vec![3]);
/// # Ok::<(), ocean_qc::Error>(())
/// ```
///
/// # Errors
/// [`Error::ShapeMismatch`](crate::Error::ShapeMismatch) when `times` and
/// `values` differ in length.
pub fn despike(times: &[f64], values: &[f64], params: &GradientParams) -> Result<Classification> {
    check_same_len(times, values)?;
    let n = values.len();
    let mut result = Classification::inconclusive(n);
    if n < 3 {
        return Ok(result);
    }

    let gradients = gradients(times, values);
    for i in 1..n - 1 {
        if gradients[i - 1].value.is_finite() && gradients[i].value.is_finite() {
            result.mark(i, false);
        }
    }

    let threshold = params.threshold;
    let candidates: Vec<usize> = (0..gradients.len())
        .filter(|&k| gradients[k].value.abs() > threshold)
        .collect();
    let crossings = crossings(times, &gradients, threshold / 2.0);

    for (pos, &start) in candidates.iter().enumerate() {
        let rise = gradients[start].value > 0.0;
        let start_time = gradients[start].time;

        for &end in &candidates[pos + 1..] {
            let end_time = gradients[end].time;
            if end_time - start_time >= params.max_spike_time {
                break;
            }
            if (gradients[end].value > 0.0) == rise {
                continue;
            }

            let (lo, hi) = tighten(&crossings, start_time, end_time, params.max_spike_time);
            for j in start + 1..=end {
                if times[j] >= lo && times[j] <= hi {
                    result.mark(j, true);
                }
            }
            break;
        }
    }

    Ok(result)
}

/// Gradients between consecutive samples, timestamped at the midpoint.
fn gradients(times: &[f64], values: &[f64]) -> Vec<Gradient> {
    times
        .windows(2)
        .zip(values.windows(2))
        .map(|(t, x)| {
            let dt = t[1] - t[0];
            let value = if dt > 0.0 { (x[1] - x[0]) / dt } else { f64::NAN };
            Gradient {
                time: t[0] + dt / 2.0,
                value,
            }
        })
        .collect()
}

/// Sample times where the gradient passes through `+level` or `-level`.
///
/// Gradients `k` and `k + 1` share sample `k + 1`; a crossing between them is
/// placed at that sample. Sorted ascending.
fn crossings(times: &[f64], gradients: &[Gradient], level: f64) -> Vec<f64> {
    let mut out = Vec::new();
    for (k, pair) in gradients.windows(2).enumerate() {
        let (a, b) = (pair[0].value, pair[1].value);
        if !(a.is_finite() && b.is_finite()) {
            continue;
        }
        let crosses = [level, -level]
            .iter()
            .any(|&target| (a - target) * (b - target) <= 0.0 && a != b);
        if crosses {
            out.push(times[k + 1]);
        }
    }
    out.sort_by(f64::total_cmp);
    out.dedup();
    out
}

/// Narrow `(start, end)` to the first and last crossing inside it, each
/// within `max_spike_time` of the boundary it replaces. Bounds are inclusive.
fn tighten(crossings: &[f64], start: f64, end: f64, max_spike_time: f64) -> (f64, f64) {
    let lo = crossings
        .iter()
        .copied()
        .find(|&c| c > start && c < end && c - start <= max_spike_time)
        .unwrap_or(start);
    let hi = crossings
        .iter()
        .rev()
        .copied()
        .find(|&c| c >= lo && c < end && end - c <= max_spike_time)
        .unwrap_or(end);
    (lo, hi)
}

/// Outcome of [`despike_iterative`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IterativeDespike {
    /// Union of all passes, on the original indices
    pub classification: Classification,
    /// Passes executed
    pub iterations: usize,
    /// False when the iteration bound stopped the loop before a clean pass
    pub converged: bool,
}

/// Re-run [`despike`] on the samples that survive each pass until a pass
/// finds nothing new or `max_iterations` passes have run.
///
/// # Errors
/// [`Error::ShapeMismatch`](crate::Error::ShapeMismatch) when `times` and
/// `values` differ in length.
pub fn despike_iterative(
    times: &[f64],
    values: &[f64],
    params: &GradientParams,
    max_iterations: usize,
) -> Result<IterativeDespike> {
    check_same_len(times, values)?;
    let n = values.len();
    let mut removed = vec![false; n];
    let mut last_evaluated = vec![false; n];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;
        let retained: Vec<usize> = (0..n).filter(|&i| !removed[i]).collect();
        let t: Vec<f64> = retained.iter().map(|&i| times[i]).collect();
        let x: Vec<f64> = retained.iter().map(|&i| values[i]).collect();
        let pass = despike(&t, &x, params)?;

        last_evaluated = vec![false; n];
        let mut found = 0;
        for (local, &original) in retained.iter().enumerate() {
            last_evaluated[original] = pass.evaluated[local];
            if pass.anomalous[local] {
                removed[original] = true;
                found += 1;
            }
        }
        if found == 0 {
            converged = true;
            break;
        }
    }

    let evaluated = last_evaluated
        .iter()
        .zip(&removed)
        .map(|(&e, &r)| e || r)
        .collect();
    Ok(IterativeDespike {
        classification: Classification {
            anomalous: removed,
            evaluated,
        },
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[allow(clippy::cast_precision_loss)]
    fn seconds(n: usize) -> Vec<f64> {
        (0..n).map(|i| i as f64).collect()
    }

    #[test]
    fn test_single_sample_spike() {
        let values = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 3.0,
        };
        let result = despike(&seconds(7), &values, &params).unwrap();
        assert_eq!(result.anomalous_indices(), vec![3]);
        assert!(!result.evaluated[0]);
        assert!(!result.evaluated[6]);
        assert!(result.passed(2));
    }

    #[test]
    fn test_negative_spike() {
        let values = [5.0, 5.0, -5.0, 5.0, 5.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 3.0,
        };
        let result = despike(&seconds(5), &values, &params).unwrap();
        assert_eq!(result.anomalous_indices(), vec![2]);
    }

    #[test]
    fn test_two_sample_spike() {
        let values = [0.0, 0.0, 10.0, 10.0, 0.0, 0.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 3.0,
        };
        let result = despike(&seconds(6), &values, &params).unwrap();
        assert_eq!(result.anomalous_indices(), vec![2, 3]);
    }

    #[test]
    fn test_wide_spike_flags_every_plateau_sample() {
        let values = [0.0, 0.0, 10.0, 10.0, 10.0, 0.0, 0.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 4.0,
        };
        let result = despike(&seconds(7), &values, &params).unwrap();
        assert_eq!(result.anomalous_indices(), vec![2, 3, 4]);
    }

    #[test]
    fn test_ramp_flank_trimmed_by_crossing() {
        // the half-height sample on the rise sits outside the crossing
        let values = [0.0, 0.0, 6.0, 12.0, 12.0, 0.0, 0.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 4.0,
        };
        let result = despike(&seconds(7), &values, &params).unwrap();
        assert_eq!(result.anomalous_indices(), vec![3, 4]);
    }

    #[test]
    fn test_step_is_not_a_spike() {
        let values = [0.0, 0.0, 0.0, 10.0, 10.0, 10.0, 10.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 3.0,
        };
        let result = despike(&seconds(7), &values, &params).unwrap();
        assert_eq!(result.anomaly_count(), 0);
    }

    #[test]
    fn test_pair_too_far_apart() {
        let values = [0.0, 0.0, 10.0, 10.0, 10.0, 10.0, 0.0, 0.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 3.0,
        };
        let result = despike(&seconds(8), &values, &params).unwrap();
        assert_eq!(result.anomaly_count(), 0);
    }

    #[test]
    fn test_edge_spike_never_flagged() {
        let values = [10.0, 0.0, 0.0, 0.0, 10.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 3.0,
        };
        let result = despike(&seconds(5), &values, &params).unwrap();
        assert!(!result.anomalous[0]);
        assert!(!result.anomalous[4]);
    }

    #[test]
    fn test_nan_is_inconclusive() {
        let values = [0.0, 0.0, f64::NAN, 0.0, 0.0];
        let result = despike(&seconds(5), &values, &GradientParams::default()).unwrap();
        assert_eq!(result.anomaly_count(), 0);
        assert!(!result.evaluated[1]);
        assert!(!result.evaluated[2]);
        assert!(!result.evaluated[3]);
    }

    #[test]
    fn test_shape_mismatch() {
        assert!(despike(&[0.0, 1.0], &[0.0], &GradientParams::default()).is_err());
    }

    #[test]
    fn test_short_series() {
        let result = despike(&[0.0, 1.0], &[0.0, 9.0], &GradientParams::default()).unwrap();
        assert_eq!(result.len(), 2);
        assert_eq!(result.anomaly_count(), 0);
    }

    #[test]
    fn test_iterative_converges() {
        let values = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0, 0.0, 0.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 3.0,
        };
        let out = despike_iterative(&seconds(9), &values, &params, 10).unwrap();
        assert!(out.converged);
        assert_eq!(out.iterations, 2);
        assert_eq!(out.classification.anomalous_indices(), vec![3]);
        assert!(out.classification.evaluated[3]);
    }

    #[test]
    fn test_iterative_respects_bound() {
        let values = [0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0];
        let params = GradientParams {
            threshold: 5.0,
            max_spike_time: 3.0,
        };
        let out = despike_iterative(&seconds(7), &values, &params, 1).unwrap();
        assert_eq!(out.iterations, 1);
        assert!(!out.converged);
        assert_eq!(out.classification.anomalous_indices(), vec![3]);
    }

    #[test]
    fn test_iterative_zero_bound_runs_nothing() {
        let out = despike_iterative(&seconds(3), &[0.0; 3], &GradientParams::default(), 0).unwrap();
        assert_eq!(out.iterations, 0);
        assert_eq!(out.classification.anomaly_count(), 0);
    }
}
