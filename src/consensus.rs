//! Consensus aggregation over per-beam, per-sensor and per-bin masks
//!
//! Masks are [`Grid<bool>`] with one row per timestamp and one column per
//! bin, bin index increasing away from the instrument. Every policy here is
//! a pure function of its masks; none of them knows about datasets.

use crate::grid::{clamp_range, Grid};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// How many of N pass masks must agree for a cell to pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VotePolicy {
    /// Every mask must pass
    Unanimous,
    /// At least one mask must pass
    Any,
    /// At least `n` masks must pass
    AtLeast(usize),
}

/// Combine same-shape pass masks (true = pass) into one pass mask.
///
/// # Errors
/// [`Error::InvalidInput`] for an empty mask list, [`Error::ShapeMismatch`]
/// when the masks differ in shape.
pub fn vote(masks: &[Grid<bool>], policy: VotePolicy) -> Result<Grid<bool>> {
    let first = masks
        .first()
        .ok_or_else(|| Error::InvalidInput("vote needs at least one mask".to_string()))?;
    if let Some(bad) = masks.iter().find(|m| !m.same_dims(first)) {
        return Err(Error::ShapeMismatch {
            expected: first.cells().len(),
            actual: bad.cells().len(),
        });
    }

    let required = match policy {
        VotePolicy::Unanimous => masks.len(),
        VotePolicy::Any => 1,
        VotePolicy::AtLeast(n) => n,
    };
    let cells = (0..first.cells().len())
        .map(|i| masks.iter().filter(|m| m.cells()[i]).count() >= required)
        .collect();
    Grid::from_vec(first.rows(), first.cols(), cells)
}

/// Propagate the first failing bin of each row outward.
///
/// `failed` is a failure mask (true = fail). In every row the first failing
/// bin and all bins beyond it fail; rows without a failure are unchanged.
///
/// ```rust
/// use ocean_qc::consensus::propagate_outward;
/// use ocean_qc::grid::Grid;
///
/// let failed = Grid::from_rows(&[vec![false, false, true, false, false]])?;
/// let out = propagate_outward(&failed);
/// assert_eq!(out.row(0), &[false, false, true, true, true]);
/// # Ok::<(), ocean_qc::Error>(())
/// ```
#[must_use]
pub fn propagate_outward(failed: &Grid<bool>) -> Grid<bool> {
    let mut out = failed.clone();
    for row in 0..out.rows() {
        let cells = out.row_mut(row);
        if let Some(first) = cells.iter().position(|&f| f) {
            cells[first..].fill(true);
        }
    }
    out
}

/// Threshold for [`majority_of_window`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MajorityRule {
    /// Fraction of relevant bins that must pass
    pub min_fraction: f64,
    /// Whether a fraction exactly equal to `min_fraction` passes (`>=`) or fails (`>`)
    pub ties_pass: bool,
}

impl Default for MajorityRule {
    fn default() -> Self {
        Self {
            min_fraction: 0.5,
            ties_pass: true,
        }
    }
}

impl MajorityRule {
    /// Whether `passed` out of `total` satisfies the rule.
    #[must_use]
    pub fn accepts(&self, passed: usize, total: usize) -> bool {
        if total == 0 {
            return false;
        }
        // compare passed/total with min_fraction without dividing
        #[allow(clippy::cast_precision_loss)]
        let (passed, needed) = (passed as f64, self.min_fraction * total as f64);
        if self.ties_pass {
            passed >= needed
        } else {
            passed > needed
        }
    }
}

/// Reject whole profiles whose relevant window is mostly failing.
///
/// `pass` is a pass mask (true = pass). `windows[row]` is that row's relevant
/// bin range; rows with `None` or an empty (after clamping) window are left
/// to their per-bin verdicts, as are rows that satisfy `rule`. Rows that do
/// not satisfy it fail in every bin.
///
/// # Errors
/// [`Error::ShapeMismatch`] when `windows.len()` differs from the row count.
pub fn majority_of_window(
    pass: &Grid<bool>,
    windows: &[Option<Range<usize>>],
    rule: MajorityRule,
) -> Result<Grid<bool>> {
    if windows.len() != pass.rows() {
        return Err(Error::ShapeMismatch {
            expected: pass.rows(),
            actual: windows.len(),
        });
    }

    let mut out = pass.clone();
    for (row, window) in windows.iter().enumerate() {
        let Some(window) = window.as_ref().and_then(|w| clamp_range(w, pass.cols())) else {
            continue;
        };
        let total = window.len();
        let passed = pass.row(row)[window].iter().filter(|&&p| p).count();
        if !rule.accepts(passed, total) {
            out.row_mut(row).fill(false);
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    const F: bool = true;
    const P: bool = false;

    #[test]
    fn test_propagate_from_first_bin() {
        let failed = Grid::from_rows(&[vec![F, P, P, F, P]]).unwrap();
        assert_eq!(propagate_outward(&failed).row(0), &[F, F, F, F, F]);
    }

    #[test]
    fn test_propagate_from_middle_bin() {
        let failed = Grid::from_rows(&[vec![P, P, F, P, P]]).unwrap();
        assert_eq!(propagate_outward(&failed).row(0), &[P, P, F, F, F]);
    }

    #[test]
    fn test_propagate_clean_row_untouched() {
        let failed = Grid::from_rows(&[vec![P, P, P], vec![P, F, P]]).unwrap();
        let out = propagate_outward(&failed);
        assert_eq!(out.row(0), &[P, P, P]);
        assert_eq!(out.row(1), &[P, F, F]);
    }

    #[test]
    fn test_majority_one_of_four_rejects_profile() {
        let pass = Grid::from_rows(&[vec![true, true, false, false, false, true]]).unwrap();
        // relevant window bins 1..5: one pass, three fail
        let out = majority_of_window(&pass, &[Some(1..5)], MajorityRule::default()).unwrap();
        assert!(out.row(0).iter().all(|&p| !p));
    }

    #[test]
    fn test_majority_three_of_four_keeps_bins() {
        let pass = Grid::from_rows(&[vec![true, true, false, true, false]]).unwrap();
        let out = majority_of_window(&pass, &[Some(0..4)], MajorityRule::default()).unwrap();
        assert_eq!(out.row(0), pass.row(0));
    }

    #[test]
    fn test_majority_tie_policy() {
        let pass = Grid::from_rows(&[vec![true, true, false, false]]).unwrap();
        let inclusive = majority_of_window(&pass, &[Some(0..4)], MajorityRule::default()).unwrap();
        assert_eq!(inclusive.row(0), pass.row(0));

        let strict = MajorityRule {
            min_fraction: 0.5,
            ties_pass: false,
        };
        let out = majority_of_window(&pass, &[Some(0..4)], strict).unwrap();
        assert!(out.row(0).iter().all(|&p| !p));
    }

    #[test]
    fn test_majority_without_window_untouched() {
        let pass = Grid::from_rows(&[vec![false, false], vec![false, true]]).unwrap();
        let out = majority_of_window(&pass, &[None, Some(5..9)], MajorityRule::default()).unwrap();
        assert_eq!(out, pass);
    }

    #[test]
    fn test_majority_window_count_mismatch() {
        let pass = Grid::filled(2, 3, true);
        assert!(majority_of_window(&pass, &[None], MajorityRule::default()).is_err());
    }

    #[test]
    fn test_vote_policies() {
        let a = Grid::from_rows(&[vec![true, true, false]]).unwrap();
        let b = Grid::from_rows(&[vec![true, false, false]]).unwrap();
        let c = Grid::from_rows(&[vec![true, true, true]]).unwrap();
        let masks = [a, b, c];
        assert_eq!(vote(&masks, VotePolicy::Unanimous).unwrap().row(0), &[true, false, false]);
        assert_eq!(vote(&masks, VotePolicy::Any).unwrap().row(0), &[true, true, true]);
        assert_eq!(vote(&masks, VotePolicy::AtLeast(2)).unwrap().row(0), &[true, true, false]);
    }

    #[test]
    fn test_vote_rejects_mixed_shapes() {
        let masks = [Grid::filled(1, 3, true), Grid::filled(1, 2, true)];
        assert!(vote(&masks, VotePolicy::Any).is_err());
        assert!(vote(&[], VotePolicy::Any).is_err());
    }
}
