//! Shared filtering and statistics helpers. NaN samples are skipped.

/// Subtract the mean of the finite samples. NaNs stay NaN.
#[must_use]
pub fn mean_removed(values: &[f64]) -> Vec<f64> {
    let (sum, count) = values
        .iter()
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        return values.to_vec();
    }
    #[allow(clippy::cast_precision_loss)]
    let mean = sum / count as f64;
    values.iter().map(|v| v - mean).collect()
}

/// First-order exponential low-pass: `lp[i] = a*lp[i-1] + (1-a)*x[i]`.
///
/// `smoothing` is the weight `a` on the previous state, `initial` the state
/// before the first sample. NaN samples hold the previous state.
#[must_use]
pub fn exponential_lowpass(values: &[f64], smoothing: f64, initial: f64) -> Vec<f64> {
    let mut state = initial;
    values
        .iter()
        .map(|&v| {
            if v.is_finite() {
                state = smoothing.mul_add(state, (1.0 - smoothing) * v);
            }
            state
        })
        .collect()
}

/// High-pass as the residual from [`exponential_lowpass`], seeded with the
/// first finite sample. NaNs stay NaN.
#[must_use]
pub fn highpass(values: &[f64], smoothing: f64) -> Vec<f64> {
    let seed = values.iter().copied().find(|v| v.is_finite()).unwrap_or(0.0);
    let low = exponential_lowpass(values, smoothing, seed);
    values.iter().zip(low).map(|(v, l)| v - l).collect()
}

/// Sample standard deviation of the finite samples; `None` below two samples.
#[must_use]
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let finite: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if finite.len() < 2 {
        return None;
    }
    #[allow(clippy::cast_precision_loss)]
    let n = finite.len() as f64;
    let mean = finite.iter().sum::<f64>() / n;
    let var = finite.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
    Some(var.sqrt())
}

/// Median of three finite values.
#[must_use]
pub fn median3(a: f64, b: f64, c: f64) -> f64 {
    a.max(b).min(a.min(b).max(c))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mean_removed_skips_nan() {
        let out = mean_removed(&[1.0, f64::NAN, 3.0]);
        assert!((out[0] + 1.0).abs() < 1e-12);
        assert!(out[1].is_nan());
        assert!((out[2] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_lowpass_holds_over_nan() {
        let out = exponential_lowpass(&[1.0, f64::NAN, 1.0], 0.5, 0.0);
        assert!((out[0] - 0.5).abs() < 1e-12);
        assert!((out[1] - 0.5).abs() < 1e-12);
        assert!((out[2] - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_highpass_of_constant_is_zero() {
        let out = highpass(&[4.0; 10], 0.9);
        assert!(out.iter().all(|v| v.abs() < 1e-12));
    }

    #[test]
    fn test_std_dev() {
        let sd = std_dev(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert!((sd - 2.138_089_935).abs() < 1e-6);
        assert!(std_dev(&[1.0]).is_none());
        assert!(std_dev(&[f64::NAN, 1.0]).is_none());
    }

    #[test]
    fn test_median3() {
        assert!((median3(3.0, 1.0, 2.0) - 2.0).abs() < f64::EPSILON);
        assert!((median3(1.0, 1.0, 9.0) - 1.0).abs() < f64::EPSILON);
        assert!((median3(9.0, 5.0, 7.0) - 7.0).abs() < f64::EPSILON);
    }
}
