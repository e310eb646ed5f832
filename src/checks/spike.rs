//! Spike and rate-of-change checks on moored time series

use super::{time_series, verdict_flags};
use crate::context::RunContext;
use crate::dataset::{Dataset, Slot};
use crate::detectors::{
    despike_iterative, first_month_std, rate_of_change, rc_despike, tukey_53h, GradientParams,
    RateOfChangeParams, RcParams, TukeyParams,
};
use crate::flags::QualityFlag;
use crate::runner::{TestResult, VariableTest};
use crate::Result;
use serde::{Deserialize, Serialize};

/// Detector behind a [`SpikeCheck`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SpikeMethod {
    /// Tukey 53H residual against a median/Hanning smoothing
    Tukey53H,
    /// Exponential low-pass band
    RcFilter,
    /// Iterated temporal-gradient pairs; needs a `threshold` parameter
    Gradient,
}

/// Flags spikes in time series as `spike`.
///
/// | Method | Parameters (defaults) |
/// |--------|-----------------------|
/// | `Tukey53H` | `k` (1.5), `highpass_smoothing` (0.99) |
/// | `RcFilter` | `smoothing` (0.7), `k` (3.0), `highpass_smoothing` (0.99) |
/// | `Gradient` | `threshold` (required), `max_spike_time` (600 s) |
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpikeCheck {
    method: SpikeMethod,
}

impl SpikeCheck {
    /// Check using `method`.
    #[must_use]
    pub const fn new(method: SpikeMethod) -> Self {
        Self { method }
    }

    /// Tukey 53H check.
    #[must_use]
    pub const fn tukey() -> Self {
        Self::new(SpikeMethod::Tukey53H)
    }

    /// RC-filter check.
    #[must_use]
    pub const fn rc_filter() -> Self {
        Self::new(SpikeMethod::RcFilter)
    }

    /// Iterative gradient-pair check.
    #[must_use]
    pub const fn gradient() -> Self {
        Self::new(SpikeMethod::Gradient)
    }

    /// Detector in use.
    #[must_use]
    pub const fn method(&self) -> SpikeMethod {
        self.method
    }
}

impl VariableTest for SpikeCheck {
    fn name(&self) -> &str {
        match self.method {
            SpikeMethod::Tukey53H => "spike_tukey53h",
            SpikeMethod::RcFilter => "spike_rc_filter",
            SpikeMethod::Gradient => "spike_gradient",
        }
    }

    fn evaluate(&self, dataset: &Dataset, slot: Slot, ctx: &mut RunContext) -> Result<TestResult> {
        let Some((times, variable)) = time_series(dataset, slot) else {
            return Ok(TestResult::not_applicable());
        };
        let params = ctx.params();
        let (id, test) = (dataset.id(), self.name());

        let (verdict, parameters) = match self.method {
            SpikeMethod::Tukey53H => {
                let p = TukeyParams {
                    k: params.number_or(id, test, "k", 1.5),
                    highpass_smoothing: params.number_or(id, test, "highpass_smoothing", 0.99),
                };
                (
                    tukey_53h(variable.data(), &p),
                    format!("k={}, highpass_smoothing={}", p.k, p.highpass_smoothing),
                )
            }
            SpikeMethod::RcFilter => {
                let p = RcParams {
                    smoothing: params.number_or(id, test, "smoothing", 0.7),
                    k: params.number_or(id, test, "k", 3.0),
                    highpass_smoothing: params.number_or(id, test, "highpass_smoothing", 0.99),
                };
                (
                    rc_despike(variable.data(), &p),
                    format!(
                        "smoothing={}, k={}, highpass_smoothing={}",
                        p.smoothing, p.k, p.highpass_smoothing
                    ),
                )
            }
            SpikeMethod::Gradient => {
                let Some(threshold) = params.number(id, test, "threshold") else {
                    return Ok(TestResult::not_applicable());
                };
                let p = GradientParams {
                    threshold,
                    max_spike_time: params.number_or(id, test, "max_spike_time", 600.0),
                };
                let bound = ctx.max_despike_iterations();
                let outcome = despike_iterative(times, variable.data(), &p, bound)?;
                if !outcome.converged {
                    tracing::warn!(
                        dataset = id,
                        variable = variable.name(),
                        iterations = outcome.iterations,
                        "Iterative despike hit its bound before converging"
                    );
                }
                (
                    outcome.classification,
                    format!(
                        "threshold={}, max_spike_time={}, iterations={}",
                        p.threshold, p.max_spike_time, outcome.iterations
                    ),
                )
            }
        };

        Ok(TestResult::new(
            verdict_flags(&verdict, QualityFlag::Spike),
            parameters,
        ))
    }
}

/// Flags samples whose change from both neighbours exceeds `multiplier`
/// (default 2) standard deviations of the first month of data, as
/// `probablyBad`.
#[derive(Debug, Clone, Copy, Default)]
pub struct RateOfChange;

impl VariableTest for RateOfChange {
    fn name(&self) -> &str {
        "rate_of_change"
    }

    fn evaluate(&self, dataset: &Dataset, slot: Slot, ctx: &mut RunContext) -> Result<TestResult> {
        let Some((times, variable)) = time_series(dataset, slot) else {
            return Ok(TestResult::not_applicable());
        };
        let Some(std) = first_month_std(times, variable.data()) else {
            return Ok(TestResult::not_applicable());
        };

        let (id, test) = (dataset.id(), self.name());
        let multiplier = ctx.params().number_or(id, test, "multiplier", 2.0);
        let p = RateOfChangeParams {
            threshold: multiplier * std,
            max_gap: ctx.params().number_or(id, test, "max_gap", 3600.0),
        };
        let verdict = rate_of_change(times, variable.data(), &p)?;
        Ok(TestResult::new(
            verdict_flags(&verdict, QualityFlag::ProbablyBad),
            format!("multiplier={multiplier}, std={std:.6}, max_gap={}", p.max_gap),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ProcessingMode, Variable, TIME};
    use crate::params::ParameterSet;
    use std::sync::Arc;
    use QualityFlag::{Good, ProbablyBad, Raw, Spike};

    fn dataset(values: Vec<f64>, step: f64) -> Dataset {
        #[allow(clippy::cast_precision_loss)]
        let times = (0..values.len()).map(|i| i as f64 * step).collect();
        let mut ds = Dataset::new("ds", ProcessingMode::TimeSeries);
        ds.add_dimension(Variable::series(TIME, times)).unwrap();
        ds.add_variable(Variable::series("TEMP", values).with_dimensions([TIME]))
            .unwrap();
        ds
    }

    fn ctx(params: ParameterSet) -> RunContext {
        RunContext::new(true, Arc::new(params))
    }

    #[test]
    fn test_gradient_spike_flagged() {
        let ds = dataset(vec![0.0, 0.0, 0.0, 10.0, 0.0, 0.0, 0.0], 1.0);
        let params = ParameterSet::new()
            .with_default("spike_gradient", "threshold", 5.0)
            .with_default("spike_gradient", "max_spike_time", 3.0);
        let result = SpikeCheck::gradient()
            .evaluate(&ds, Slot::Variable(0), &mut ctx(params))
            .unwrap();
        assert_eq!(result.flags()[3], Spike);
        assert_eq!(result.flags()[0], Raw);
        assert_eq!(result.flags()[6], Raw);
        assert_eq!(result.flags().iter().filter(|&&f| f == Spike).count(), 1);
    }

    #[test]
    fn test_gradient_without_threshold_not_applicable() {
        let ds = dataset(vec![0.0; 7], 1.0);
        let result = SpikeCheck::gradient()
            .evaluate(&ds, Slot::Variable(0), &mut ctx(ParameterSet::new()))
            .unwrap();
        assert!(!result.is_applicable());
    }

    #[test]
    fn test_tukey_keeps_boundaries_raw() {
        let mut values = vec![10.0; 20];
        values[10] = 30.0;
        let ds = dataset(values, 60.0);
        let result = SpikeCheck::tukey()
            .evaluate(&ds, Slot::Variable(0), &mut ctx(ParameterSet::new()))
            .unwrap();
        let flags = result.flags();
        assert_eq!(flags[10], Spike);
        assert_eq!(&flags[..2], &[Raw, Raw]);
        assert_eq!(&flags[18..], &[Raw, Raw]);
        assert!(result.parameters().starts_with("k=1.5"));
    }

    #[test]
    fn test_profile_mode_not_applicable() {
        let mut ds = Dataset::new("ds", ProcessingMode::Profile);
        ds.add_dimension(Variable::series(TIME, vec![0.0, 1.0])).unwrap();
        ds.add_variable(Variable::series("TEMP", vec![1.0, 2.0])).unwrap();
        let result = SpikeCheck::rc_filter()
            .evaluate(&ds, Slot::Variable(0), &mut ctx(ParameterSet::new()))
            .unwrap();
        assert!(!result.is_applicable());
    }

    #[test]
    fn test_rate_of_change() {
        let mut values: Vec<f64> = (0..40).map(|i| if i % 2 == 0 { 10.0 } else { 10.2 }).collect();
        values[20] = 14.0;
        let ds = dataset(values, 600.0);
        let result = RateOfChange
            .evaluate(&ds, Slot::Variable(0), &mut ctx(ParameterSet::new()))
            .unwrap();
        assert_eq!(result.flags()[20], ProbablyBad);
        assert_eq!(result.flags()[5], Good);
    }
}
