//! Test invocation and flag reconciliation
//!
//! A QC test is either a [`VariableTest`] (one target variable at a time) or a
//! [`DatasetTest`] (needs cross-variable context and edits a working copy of
//! the whole dataset). The kind is fixed when the test is registered as a
//! [`QcTest`].
//!
//! [`TestRunner`] merges candidate flags through the [`FlagLattice`] and
//! appends one provenance record per resulting flag level.

use crate::context::RunContext;
use crate::dataset::{Dataset, Slot, Variable};
use crate::flags::{FlagLattice, QualityFlag};
use crate::provenance::{ProvenanceLog, ProvenanceRecord};
use crate::{Error, Result};
use std::collections::BTreeMap;
use std::fmt;

/// Output of one test invocation.
///
/// Empty flags mean the test did not apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TestResult {
    flags: Vec<QualityFlag>,
    parameters: String,
}

impl TestResult {
    /// Candidate flags plus the parameter string to report.
    #[must_use]
    pub fn new(flags: Vec<QualityFlag>, parameters: impl Into<String>) -> Self {
        Self {
            flags,
            parameters: parameters.into(),
        }
    }

    /// The test does not apply to this variable.
    #[must_use]
    pub fn not_applicable() -> Self {
        Self::default()
    }

    /// Whether the test produced flags.
    #[must_use]
    pub fn is_applicable(&self) -> bool {
        !self.flags.is_empty()
    }

    /// Candidate flags.
    #[must_use]
    pub fn flags(&self) -> &[QualityFlag] {
        &self.flags
    }

    /// Parameter string.
    #[must_use]
    pub fn parameters(&self) -> &str {
        &self.parameters
    }
}

/// Whether a test wants user confirmation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interaction {
    /// Fully automatic
    #[default]
    None,
    /// Asks for confirmation; skipped in auto mode
    Confirm,
}

/// Test that inspects one dimension or variable.
pub trait VariableTest: Send + Sync {
    /// Name used in logs and parameter lookups.
    fn name(&self) -> &str;

    /// Candidate flags for the variable at `slot`.
    ///
    /// # Errors
    /// [`Error::Fatal`] for data-integrity failures; anything else is
    /// reported against this test and variable.
    fn evaluate(&self, dataset: &Dataset, slot: Slot, ctx: &mut RunContext) -> Result<TestResult>;

    /// Whether candidates may lower a flag.
    fn allows_downgrade(&self) -> bool {
        false
    }

    /// Interaction requirement.
    fn interaction(&self) -> Interaction {
        Interaction::None
    }
}

/// Test that needs the whole dataset.
///
/// It receives a working copy and writes flags straight into it with
/// [`Variable::set_flags`]; the orchestrator diffs the copy against the
/// pre-call state and fuses per variable.
pub trait DatasetTest: Send + Sync {
    /// Name used in logs and parameter lookups.
    fn name(&self) -> &str;

    /// Update `working` in place. Returns the parameter string, or `None`
    /// when the test does not apply.
    ///
    /// # Errors
    /// As for [`VariableTest::evaluate`].
    fn evaluate(&self, working: &mut Dataset, ctx: &mut RunContext) -> Result<Option<String>>;

    /// Whether the reconciled flags may be lowered.
    fn allows_downgrade(&self) -> bool {
        false
    }

    /// Interaction requirement.
    fn interaction(&self) -> Interaction {
        Interaction::None
    }
}

/// A registered test.
pub enum QcTest {
    /// Single-variable test
    Variable(Box<dyn VariableTest>),
    /// Whole-dataset test
    Dataset(Box<dyn DatasetTest>),
}

impl QcTest {
    /// Register a single-variable test.
    pub fn variable(test: impl VariableTest + 'static) -> Self {
        Self::Variable(Box::new(test))
    }

    /// Register a whole-dataset test.
    pub fn dataset(test: impl DatasetTest + 'static) -> Self {
        Self::Dataset(Box::new(test))
    }

    /// Test name.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Self::Variable(t) => t.name(),
            Self::Dataset(t) => t.name(),
        }
    }

    /// Interaction requirement.
    #[must_use]
    pub fn interaction(&self) -> Interaction {
        match self {
            Self::Variable(t) => t.interaction(),
            Self::Dataset(t) => t.interaction(),
        }
    }

    /// Whether the test fuses with downgrades allowed.
    #[must_use]
    pub fn allows_downgrade(&self) -> bool {
        match self {
            Self::Variable(t) => t.allows_downgrade(),
            Self::Dataset(t) => t.allows_downgrade(),
        }
    }
}

impl fmt::Debug for QcTest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Variable(_) => "Variable",
            Self::Dataset(_) => "Dataset",
        };
        f.debug_struct("QcTest")
            .field("kind", &kind)
            .field("name", &self.name())
            .finish()
    }
}

/// Attach test and variable to an error unless it already names them.
pub(crate) fn annotate(err: Error, test: &str, variable: &str) -> Error {
    if err.location().is_some() {
        err
    } else {
        Error::TestFailed {
            test: test.to_string(),
            variable: variable.to_string(),
            source: Box::new(err),
        }
    }
}

/// Runs single tests and fuses their flags.
#[derive(Debug, Clone, Copy)]
pub struct TestRunner<'a> {
    lattice: &'a FlagLattice,
}

impl<'a> TestRunner<'a> {
    /// Runner fusing through `lattice`.
    #[must_use]
    pub const fn new(lattice: &'a FlagLattice) -> Self {
        Self { lattice }
    }

    /// Run `test` on the variable at `slot` and fuse the result in place.
    ///
    /// Returns the number of samples whose flag changed.
    ///
    /// # Errors
    /// Errors from the test, annotated with test and variable names, and
    /// [`Error::ShapeMismatch`] when the candidate flags have the wrong length.
    pub fn run(
        &self,
        test: &dyn VariableTest,
        dataset: &mut Dataset,
        slot: Slot,
        ctx: &mut RunContext,
        log: &mut ProvenanceLog,
    ) -> Result<usize> {
        let variable_name = dataset
            .get(slot)
            .map(|v| v.name().to_string())
            .ok_or_else(|| Error::InvalidInput(format!("No variable at {slot:?}")))?;

        let result = test
            .evaluate(dataset, slot, ctx)
            .map_err(|e| annotate(e, test.name(), &variable_name))?;
        if !result.is_applicable() {
            tracing::debug!(test = test.name(), variable = %variable_name, "Test not applicable");
            return Ok(0);
        }

        let variable = dataset
            .get_mut(slot)
            .ok_or_else(|| Error::InvalidInput(format!("No variable at {slot:?}")))?;
        self.apply(
            test.name(),
            variable,
            result.flags(),
            test.allows_downgrade(),
            result.parameters(),
            log,
        )
    }

    /// Fuse `candidate` into `variable` and log the changes.
    ///
    /// One record per resulting level counts the samples that changed to it.
    /// When nothing changed a single zero-count record at the candidate's
    /// most frequent level keeps the invocation and its parameters.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] (annotated) when lengths differ.
    pub fn apply(
        &self,
        test: &str,
        variable: &mut Variable,
        candidate: &[QualityFlag],
        allow_downgrade: bool,
        parameters: &str,
        log: &mut ProvenanceLog,
    ) -> Result<usize> {
        let before = variable.flags().to_vec();
        self.lattice
            .merge_into(variable.flags_mut(), candidate, allow_downgrade)
            .map_err(|e| annotate(e, test, variable.name()))?;
        variable
            .validate()
            .map_err(|e| annotate(e, test, variable.name()))?;

        let mut changed: BTreeMap<QualityFlag, usize> = BTreeMap::new();
        for (old, new) in before.iter().zip(variable.flags()) {
            if old != new {
                *changed.entry(*new).or_default() += 1;
            }
        }

        let total = changed.values().sum();
        tracing::debug!(test, variable = variable.name(), changed = total, "Flags fused");
        if changed.is_empty() {
            // keep the invocation and its parameters in the log
            changed.insert(dominant_flag(candidate), 0);
        }
        for (flag, count) in changed {
            log.push(ProvenanceRecord {
                test: test.to_string(),
                variable: variable.name().to_string(),
                flag,
                count,
                parameters: parameters.to_string(),
            });
        }
        Ok(total)
    }
}

/// Most frequent level in `flags`; ties go to the later level.
fn dominant_flag(flags: &[QualityFlag]) -> QualityFlag {
    let mut counts: BTreeMap<QualityFlag, usize> = BTreeMap::new();
    for &flag in flags {
        *counts.entry(flag).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by_key(|&(_, count)| count)
        .map_or(QualityFlag::Raw, |(flag, _)| flag)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::ProcessingMode;
    use crate::params::ParameterSet;
    use std::sync::Arc;
    use QualityFlag::{Bad, Good, Raw};

    struct Fixed(&'static str, Vec<QualityFlag>);

    impl VariableTest for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn evaluate(&self, dataset: &Dataset, slot: Slot, _: &mut RunContext) -> Result<TestResult> {
            if dataset.get(slot).map(Variable::name) != Some("TEMP") {
                return Ok(TestResult::not_applicable());
            }
            Ok(TestResult::new(self.1.clone(), "fixed"))
        }
    }

    struct Failing;

    impl VariableTest for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        fn evaluate(&self, _: &Dataset, _: Slot, _: &mut RunContext) -> Result<TestResult> {
            Err(Error::Config("no threshold".to_string()))
        }
    }

    fn setup() -> (Dataset, RunContext) {
        let mut ds = Dataset::new("ds", ProcessingMode::TimeSeries);
        ds.add_variable(Variable::series("TEMP", vec![1.0, 2.0, 3.0, 4.0]))
            .unwrap();
        ds.add_variable(Variable::series("PSAL", vec![35.0; 4])).unwrap();
        (ds, RunContext::new(true, Arc::new(ParameterSet::new())))
    }

    #[test]
    fn test_run_merges_and_logs_changes() {
        let (mut ds, mut ctx) = setup();
        let lattice = FlagLattice::new();
        let runner = TestRunner::new(&lattice);
        let mut log = ProvenanceLog::new();

        let range = Fixed("range", vec![Good, Good, Bad, Good]);
        let changed = runner
            .run(&range, &mut ds, Slot::Variable(0), &mut ctx, &mut log)
            .unwrap();
        assert_eq!(changed, 4);
        assert_eq!(log.len(), 2);
        assert_eq!(log.total(Good), 3);
        assert_eq!(log.total(Bad), 1);

        let spike = Fixed("spike", vec![Raw, Raw, Bad, Raw]);
        let changed = runner
            .run(&spike, &mut ds, Slot::Variable(0), &mut ctx, &mut log)
            .unwrap();
        assert_eq!(changed, 0);
        assert_eq!(log.len(), 3);
        assert_eq!(ds.variables()[0].flags(), &[Good, Good, Bad, Good]);
    }

    #[test]
    fn test_unchanged_invocation_is_still_logged() {
        let (mut ds, mut ctx) = setup();
        let lattice = FlagLattice::new();
        let runner = TestRunner::new(&lattice);
        let mut log = ProvenanceLog::new();

        let range = Fixed("range", vec![Good; 4]);
        for _ in 0..2 {
            runner
                .run(&range, &mut ds, Slot::Variable(0), &mut ctx, &mut log)
                .unwrap();
        }
        let records: Vec<_> = log.for_test("range").collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].count, 4);
        assert_eq!(records[1].count, 0);
        assert_eq!(records[1].flag, Good);
        assert_eq!(records[1].parameters, "fixed");
        assert_eq!(log.total(Good), 4);
        assert!(log.render_report().contains("0 samples -> good"));
    }

    #[test]
    fn test_dominant_flag_prefers_later_level_on_tie() {
        assert_eq!(dominant_flag(&[Raw, Raw, Bad, Raw]), Raw);
        assert_eq!(dominant_flag(&[Good, Bad]), Bad);
    }

    #[test]
    fn test_not_applicable_leaves_flags() {
        let (mut ds, mut ctx) = setup();
        let lattice = FlagLattice::new();
        let mut log = ProvenanceLog::new();
        let test = Fixed("range", vec![Good; 4]);
        TestRunner::new(&lattice)
            .run(&test, &mut ds, Slot::Variable(1), &mut ctx, &mut log)
            .unwrap();
        assert!(log.is_empty());
        assert_eq!(ds.variables()[1].flags(), &[Raw; 4]);
    }

    #[test]
    fn test_shape_mismatch_is_fatal_and_located() {
        let (mut ds, mut ctx) = setup();
        let lattice = FlagLattice::new();
        let mut log = ProvenanceLog::new();
        let test = Fixed("short", vec![Good; 3]);
        let err = TestRunner::new(&lattice)
            .run(&test, &mut ds, Slot::Variable(0), &mut ctx, &mut log)
            .unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.location(), Some(("short", "TEMP")));
        assert_eq!(ds.variables()[0].flags(), &[Raw; 4]);
    }

    #[test]
    fn test_errors_are_annotated() {
        let (mut ds, mut ctx) = setup();
        let lattice = FlagLattice::new();
        let mut log = ProvenanceLog::new();
        let err = TestRunner::new(&lattice)
            .run(&Failing, &mut ds, Slot::Variable(0), &mut ctx, &mut log)
            .unwrap_err();
        assert!(!err.is_fatal());
        assert_eq!(err.location(), Some(("failing", "TEMP")));
    }
}
