//! Timestamp checks

use crate::context::RunContext;
use crate::dataset::{epoch_seconds, Dataset, Slot, TIME};
use crate::flags::QualityFlag;
use crate::runner::{TestResult, VariableTest};
use crate::{Error, Result};
use chrono::{TimeZone, Utc};

/// Flags timestamps before `min_year` (default 1950) or in the future.
///
/// Fatal when no timestamp survives.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImpossibleDate;

impl VariableTest for ImpossibleDate {
    fn name(&self) -> &str {
        "impossible_date"
    }

    fn evaluate(&self, dataset: &Dataset, slot: Slot, ctx: &mut RunContext) -> Result<TestResult> {
        let Some(time) = dataset.get(slot).filter(|v| v.name() == TIME) else {
            return Ok(TestResult::not_applicable());
        };
        if time.data().is_empty() {
            return Ok(TestResult::not_applicable());
        }

        let min_year = ctx.params().number_or(dataset.id(), self.name(), "min_year", 1950.0);
        #[allow(clippy::cast_possible_truncation)]
        let lower = Utc
            .with_ymd_and_hms(min_year as i32, 1, 1, 0, 0, 0)
            .single()
            .ok_or_else(|| Error::Config(format!("Invalid min_year: {min_year}")))?;
        let (lo, hi) = (epoch_seconds(lower), epoch_seconds(Utc::now()));

        let flags: Vec<_> = time
            .data()
            .iter()
            .map(|&t| {
                if t >= lo && t <= hi {
                    QualityFlag::Good
                } else {
                    QualityFlag::Bad
                }
            })
            .collect();
        if flags.iter().all(|&f| f == QualityFlag::Bad) {
            return Err(Error::fatal(self.name(), TIME, "every timestamp is impossible"));
        }
        Ok(TestResult::new(flags, format!("min_year={min_year}")))
    }
}

/// Flags samples recorded outside the deployment window.
///
/// Applies to `TIME` and to every variable whose first dimension is `TIME`;
/// a profile row outside the window fails in every bin. Fatal when the
/// instrument was never in the water.
#[derive(Debug, Clone, Copy, Default)]
pub struct InOutWater;

impl VariableTest for InOutWater {
    fn name(&self) -> &str {
        "in_out_water"
    }

    fn evaluate(&self, dataset: &Dataset, slot: Slot, _ctx: &mut RunContext) -> Result<TestResult> {
        let (Some(deployment), Some(times), Some(variable)) =
            (dataset.deployment(), dataset.time_seconds(), dataset.get(slot))
        else {
            return Ok(TestResult::not_applicable());
        };
        let is_time = variable.name() == TIME;
        let on_time = variable.dimensions().first().is_some_and(|d| d == TIME);
        if !(is_time || on_time) || variable.shape().rows() != times.len() {
            return Ok(TestResult::not_applicable());
        }

        let (start, end) = deployment.bounds_seconds();
        let in_water: Vec<bool> = times.iter().map(|&t| t >= start && t <= end).collect();
        if is_time && !in_water.iter().any(|&w| w) {
            return Err(Error::fatal(self.name(), TIME, "no sample recorded in the water"));
        }

        let bins = variable.shape().cols();
        let flags = in_water
            .iter()
            .flat_map(|&w| {
                let flag = if w { QualityFlag::Good } else { QualityFlag::Bad };
                std::iter::repeat(flag).take(bins)
            })
            .collect();
        let parameters = format!(
            "in_water={}, out_water={}",
            deployment.start.to_rfc3339(),
            deployment.end.to_rfc3339()
        );
        Ok(TestResult::new(flags, parameters))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ProcessingMode, Variable};
    use crate::grid::Grid;
    use crate::params::ParameterSet;
    use std::sync::Arc;
    use QualityFlag::{Bad, Good};

    fn ctx() -> RunContext {
        RunContext::new(true, Arc::new(ParameterSet::new()))
    }

    fn at(day: u32) -> f64 {
        epoch_seconds(Utc.with_ymd_and_hms(2024, 3, day, 0, 0, 0).unwrap())
    }

    #[test]
    fn test_impossible_date_flags_out_of_window() {
        let mut ds = Dataset::new("ds", ProcessingMode::TimeSeries);
        ds.add_dimension(Variable::series(TIME, vec![-1e12, at(1), f64::NAN]))
            .unwrap();
        let result = ImpossibleDate.evaluate(&ds, Slot::Dimension(0), &mut ctx()).unwrap();
        assert_eq!(result.flags(), &[Bad, Good, Bad]);
        assert_eq!(result.parameters(), "min_year=1950");
    }

    #[test]
    fn test_impossible_date_all_bad_is_fatal() {
        let mut ds = Dataset::new("ds", ProcessingMode::TimeSeries);
        ds.add_dimension(Variable::series(TIME, vec![-1e12, 1e13])).unwrap();
        let err = ImpossibleDate
            .evaluate(&ds, Slot::Dimension(0), &mut ctx())
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_impossible_date_ignores_other_variables() {
        let mut ds = Dataset::new("ds", ProcessingMode::TimeSeries);
        ds.add_variable(Variable::series("TEMP", vec![1.0])).unwrap();
        let result = ImpossibleDate.evaluate(&ds, Slot::Variable(0), &mut ctx()).unwrap();
        assert!(!result.is_applicable());
    }

    fn deployed() -> Dataset {
        let start = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 3, 4, 0, 0, 0).unwrap();
        let mut ds = Dataset::new("ds", ProcessingMode::TimeSeries).with_deployment(start, end);
        ds.add_dimension(Variable::series(TIME, vec![at(1), at(2), at(3), at(5)]))
            .unwrap();
        ds.add_variable(Variable::series("TEMP", vec![1.0; 4]).with_dimensions([TIME]))
            .unwrap();
        let grid = Grid::filled(4, 2, 0.1);
        ds.add_variable(Variable::profile("UCUR", grid).with_dimensions([TIME, "HEIGHT_ABOVE_SENSOR"]))
            .unwrap();
        ds
    }

    #[test]
    fn test_in_out_water_series_and_profile() {
        let ds = deployed();
        let temp = InOutWater.evaluate(&ds, Slot::Variable(0), &mut ctx()).unwrap();
        assert_eq!(temp.flags(), &[Bad, Good, Good, Bad]);

        let ucur = InOutWater.evaluate(&ds, Slot::Variable(1), &mut ctx()).unwrap();
        assert_eq!(ucur.flags(), &[Bad, Bad, Good, Good, Good, Good, Bad, Bad]);
    }

    #[test]
    fn test_in_out_water_never_deployed_is_fatal() {
        let start = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2025, 2, 1, 0, 0, 0).unwrap();
        let mut ds = Dataset::new("ds", ProcessingMode::TimeSeries).with_deployment(start, end);
        ds.add_dimension(Variable::series(TIME, vec![at(1)])).unwrap();
        let err = InOutWater.evaluate(&ds, Slot::Dimension(0), &mut ctx()).unwrap_err();
        assert_eq!(err.location(), Some(("in_out_water", TIME)));
    }

    #[test]
    fn test_in_out_water_without_deployment() {
        let mut ds = Dataset::new("ds", ProcessingMode::TimeSeries);
        ds.add_dimension(Variable::series(TIME, vec![at(1)])).unwrap();
        let result = InOutWater.evaluate(&ds, Slot::Dimension(0), &mut ctx()).unwrap();
        assert!(!result.is_applicable());
    }
}
