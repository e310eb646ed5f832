//! Global and regional range checks

use super::range_flags;
use crate::context::{ClimatologyRange, RunContext};
use crate::dataset::{Dataset, Slot};
use crate::flags::QualityFlag;
use crate::runner::{TestResult, VariableTest};
use crate::Result;

/// Flags samples outside the variable's `valid_min`/`valid_max` metadata as
/// `bad`.
#[derive(Debug, Clone, Copy, Default)]
pub struct GlobalRange;

impl VariableTest for GlobalRange {
    fn name(&self) -> &str {
        "global_range"
    }

    fn evaluate(&self, dataset: &Dataset, slot: Slot, _ctx: &mut RunContext) -> Result<TestResult> {
        let Some(variable) = dataset.get(slot) else {
            return Ok(TestResult::not_applicable());
        };
        let (Some(min), Some(max)) = (variable.meta_f64("valid_min"), variable.meta_f64("valid_max"))
        else {
            return Ok(TestResult::not_applicable());
        };
        Ok(TestResult::new(
            range_flags(variable.data(), min, max, QualityFlag::Bad),
            format!("valid_min={min}, valid_max={max}"),
        ))
    }
}

/// Flags samples outside site-specific bounds as `bound`.
///
/// Bounds are the `<NAME>_min` and `<NAME>_max` parameters of this test,
/// usually set per dataset. The applied range is recorded in the run
/// context's climatology cache.
#[derive(Debug, Clone, Copy, Default)]
pub struct RegionalRange;

impl VariableTest for RegionalRange {
    fn name(&self) -> &str {
        "regional_range"
    }

    fn evaluate(&self, dataset: &Dataset, slot: Slot, ctx: &mut RunContext) -> Result<TestResult> {
        let Some(variable) = dataset.get(slot) else {
            return Ok(TestResult::not_applicable());
        };
        let name = variable.name();
        let bound = |suffix: &str| {
            ctx.params()
                .lookup(dataset.id(), self.name(), &format!("{name}_{suffix}"))
                .and_then(crate::dataset::Scalar::as_f64)
        };
        let (min, max) = match (bound("min"), bound("max")) {
            (Some(min), Some(max)) => (min, max),
            (None, None) => return Ok(TestResult::not_applicable()),
            (min, max) => {
                tracing::warn!(
                    dataset = dataset.id(),
                    variable = name,
                    ?min,
                    ?max,
                    "Regional range needs both bounds, skipping"
                );
                return Ok(TestResult::not_applicable());
            }
        };

        ctx.record_range(dataset.id(), name, ClimatologyRange { min, max });
        Ok(TestResult::new(
            range_flags(variable.data(), min, max, QualityFlag::Bound),
            format!("{name}_min={min}, {name}_max={max}"),
        ))
    }
}
