//! Whole-dataset checks for profiling ADCPs
//!
//! Velocity variables are `time × bin` profiles; per-beam diagnostics such as
//! correlation magnitude live in variables named `<prefix><beam>` with the
//! same shape.

use crate::consensus::{majority_of_window, propagate_outward, vote, MajorityRule, VotePolicy};
use crate::context::RunContext;
use crate::dataset::{Dataset, Variable};
use crate::flags::QualityFlag;
use crate::grid::{Grid, Shape};
use crate::runner::DatasetTest;
use crate::Result;
use std::ops::Range;

/// Velocity variables the ADCP checks flag.
pub const VELOCITY_VARIABLES: [&str; 4] = ["UCUR", "VCUR", "WCUR", "ECUR"];

/// Bin-distance dimension of an ADCP dataset.
pub const HEIGHT_ABOVE_SENSOR: &str = "HEIGHT_ABOVE_SENSOR";

/// Instrument depth variable used to locate the surface.
const DEPTH: &str = "DEPTH";

/// Names of the velocity variables with profile shape `shape`.
fn velocity_names(dataset: &Dataset, shape: Shape) -> Vec<&'static str> {
    VELOCITY_VARIABLES
        .into_iter()
        .filter(|name| dataset.find(name).is_some_and(|v| v.shape() == shape))
        .collect()
}

/// Rewrite the flags of `name` in `working` from a per-cell failure mask.
///
/// Failing cells become `bad`. Passing cells become `pass` when given and
/// keep their flag otherwise.
fn write_flags(
    working: &mut Dataset,
    name: &str,
    failed: &Grid<bool>,
    pass: Option<QualityFlag>,
) -> Result<()> {
    let Some(variable) = working.find_mut(name) else {
        return Ok(());
    };
    let flags = variable
        .flags()
        .iter()
        .zip(failed.cells())
        .map(|(&current, &fail)| match (fail, pass) {
            (true, _) => QualityFlag::Bad,
            (false, Some(flag)) => flag,
            (false, None) => current,
        })
        .collect();
    variable.set_flags(flags)
}

/// Per-beam threshold, beam vote and outward propagation.
///
/// Each beam variable `<prefix>1..<prefix>4` (default prefix `CMAG`) passes
/// a cell when its value reaches `threshold` (default 64). A cell passes
/// overall when at least `min_beams` (default 3) beams pass. With
/// `propagate` set (default 1), the first failing bin of each profile fails
/// every bin beyond it. Velocity variables get `bad` where the verdict fails
/// and `good` elsewhere.
#[derive(Debug, Clone, Copy, Default)]
pub struct BeamConsensus;

impl DatasetTest for BeamConsensus {
    fn name(&self) -> &str {
        "beam_consensus"
    }

    fn evaluate(&self, working: &mut Dataset, ctx: &mut RunContext) -> Result<Option<String>> {
        let params = ctx.params();
        let (id, test) = (working.id().to_string(), self.name());
        let prefix = params.text_or(&id, test, "prefix", "CMAG");
        let threshold = params.number_or(&id, test, "threshold", 64.0);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let min_beams = params.number_or(&id, test, "min_beams", 3.0).max(1.0) as usize;
        let propagate = params.number_or(&id, test, "propagate", 1.0) != 0.0;

        let beams: Vec<&Variable> = (1..=4)
            .filter_map(|beam| working.find(&format!("{prefix}{beam}")))
            .collect();
        let Some(shape) = beams.first().map(|b| b.shape()) else {
            return Ok(None);
        };
        if !matches!(shape, Shape::Profile { .. })
            || beams.len() < min_beams
            || beams.iter().any(|b| b.shape() != shape)
        {
            tracing::warn!(
                dataset = %id,
                beams = beams.len(),
                min_beams,
                "Beam variables malformed, skipping beam consensus"
            );
            return Ok(None);
        }
        let targets = velocity_names(working, shape);
        if targets.is_empty() {
            return Ok(None);
        }

        let masks = beams
            .iter()
            .map(|b| Ok(b.data_grid()?.map(|&v| v >= threshold)))
            .collect::<Result<Vec<_>>>()?;
        let beam_count = masks.len();
        let pass = vote(&masks, VotePolicy::AtLeast(min_beams))?;
        let mut failed = pass.map(|&p| !p);
        if propagate {
            failed = propagate_outward(&failed);
        }

        for name in targets {
            write_flags(working, name, &failed, Some(QualityFlag::Good))?;
        }
        Ok(Some(format!(
            "prefix={prefix}, threshold={threshold}, min_beams={min_beams}/{beam_count}, propagate={propagate}"
        )))
    }
}

/// Rejects whole velocity profiles that are mostly failing below the surface.
///
/// The relevant window of each profile is the bins whose
/// `HEIGHT_ABOVE_SENSOR` lies below `DEPTH * cos(beam_angle)` (default 20°),
/// the side-lobe limit of an upward-looking instrument. Profiles with less
/// than `min_fraction` (default 0.5) of relevant bins passing fail in every
/// bin; `ties_pass` (default 1) decides an exact tie.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileMajority;

impl ProfileMajority {
    fn windows(heights: &[f64], depths: &[f64], beam_angle: f64) -> Vec<Option<Range<usize>>> {
        let cos = beam_angle.to_radians().cos();
        depths
            .iter()
            .map(|&depth| {
                if !depth.is_finite() {
                    return None;
                }
                let limit = depth * cos;
                let relevant = heights.iter().take_while(|&&h| h <= limit).count();
                Some(0..relevant)
            })
            .collect()
    }
}

impl DatasetTest for ProfileMajority {
    fn name(&self) -> &str {
        "profile_majority"
    }

    fn evaluate(&self, working: &mut Dataset, ctx: &mut RunContext) -> Result<Option<String>> {
        let (Some(heights), Some(depths)) = (working.find(HEIGHT_ABOVE_SENSOR), working.find(DEPTH))
        else {
            return Ok(None);
        };
        let shape = Shape::Profile {
            times: depths.data().len(),
            bins: heights.data().len(),
        };
        let targets = velocity_names(working, shape);
        if targets.is_empty() {
            return Ok(None);
        }

        let params = ctx.params();
        let (id, test) = (working.id(), self.name());
        let beam_angle = params.number_or(id, test, "beam_angle", 20.0);
        let rule = MajorityRule {
            min_fraction: params.number_or(id, test, "min_fraction", 0.5),
            ties_pass: params.number_or(id, test, "ties_pass", 1.0) != 0.0,
        };
        let windows = Self::windows(heights.data(), depths.data(), beam_angle);

        for name in targets {
            let Some(velocity) = working.find(name) else {
                continue;
            };
            // raw bins have failed nothing yet and vote as passing
            let lattice = ctx.lattice();
            let threshold = lattice.rank(QualityFlag::ProbablyBad);
            let pass = velocity.flag_grid()?.map(|f| lattice.rank(*f) < threshold);
            let kept = majority_of_window(&pass, &windows, rule)?;
            let rejected = Grid::from_vec(
                pass.rows(),
                pass.cols(),
                pass.cells()
                    .iter()
                    .zip(kept.cells())
                    .map(|(&before, &after)| before && !after)
                    .collect(),
            )?;
            write_flags(working, name, &rejected, None)?;
        }
        Ok(Some(format!(
            "beam_angle={beam_angle}, min_fraction={}, ties_pass={}",
            rule.min_fraction, rule.ties_pass
        )))
    }
}
