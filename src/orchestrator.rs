//! Ordered execution of a QC test chain
//!
//! Tests run strictly in registration order. Each single-variable test visits
//! every dimension and then every variable; a whole-dataset test runs once on
//! a working copy whose flags are then fused back per variable.
//!
//! ## Usage
//!
//! ```rust
//! use ocean_qc::checks::default_suite;
//! use ocean_qc::dataset::{Dataset, ProcessingMode, Variable, TIME};
//! use ocean_qc::orchestrator::Orchestrator;
//! use ocean_qc::params::ParameterSet;
//! use std::sync::Arc;
//!
//! let mut dataset = Dataset::new("NRSROT-2024", ProcessingMode::TimeSeries);
//! dataset.add_dimension(Variable::series(TIME, vec![1.7e9, 1.7e9 + 60.0]))?;
//! dataset.add_variable(
//!     Variable::series("TEMP", vec![15.1, 15.2])
//!         .with_dimensions([TIME])
//!         .with_meta("valid_min", -2.5)
//!         .with_meta("valid_max", 40.0),
//! )?;
//!
//! let run = Orchestrator::new(default_suite()).run_all(dataset, Arc::new(ParameterSet::new()))?;
//! assert!(!run.log.is_empty());
//! # Ok::<(), ocean_qc::Error>(())
//! ```

use crate::context::{RunContext, DEFAULT_MAX_DESPIKE_ITERATIONS};
use crate::dataset::Dataset;
use crate::flags::FlagLattice;
use crate::params::ParameterSet;
use crate::provenance::{BatchSummary, DatasetOutcome, DatasetStatus, Failure, ProvenanceLog};
use crate::runner::{annotate, DatasetTest, Interaction, QcTest, TestRunner, VariableTest};
use crate::{Error, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Run-wide switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Non-interactive: tests needing confirmation are skipped
    pub auto: bool,
    /// Bound on iterative despike passes
    pub max_despike_iterations: usize,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            auto: true,
            max_despike_iterations: DEFAULT_MAX_DESPIKE_ITERATIONS,
        }
    }
}

/// Result of a completed QC run over one dataset.
#[derive(Debug, Clone)]
pub struct QcRun {
    /// Dataset with fused flags
    pub dataset: Dataset,
    /// Provenance of every flag change
    pub log: ProvenanceLog,
    /// Context as left by the last test
    pub context: RunContext,
}

/// Completed runs plus the job-level summary of a batch.
#[derive(Debug, Clone, Default)]
pub struct BatchRun {
    /// Runs that completed, in input order
    pub runs: Vec<QcRun>,
    /// Outcome of every input dataset
    pub summary: BatchSummary,
}

/// Ordered test chain with its fusion lattice.
#[derive(Debug)]
pub struct Orchestrator {
    tests: Vec<QcTest>,
    lattice: FlagLattice,
    config: OrchestratorConfig,
}

impl Orchestrator {
    /// Chain with the canonical lattice and default config.
    #[must_use]
    pub fn new(tests: Vec<QcTest>) -> Self {
        Self {
            tests,
            lattice: FlagLattice::default(),
            config: OrchestratorConfig::default(),
        }
    }

    /// Replace the fusion lattice.
    #[must_use]
    pub fn with_lattice(mut self, lattice: FlagLattice) -> Self {
        self.lattice = lattice;
        self
    }

    /// Replace the config.
    #[must_use]
    pub const fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Registered tests in run order.
    #[must_use]
    pub fn tests(&self) -> &[QcTest] {
        &self.tests
    }

    /// Fusion lattice.
    #[must_use]
    pub const fn lattice(&self) -> &FlagLattice {
        &self.lattice
    }

    /// Current config.
    #[must_use]
    pub const fn config(&self) -> OrchestratorConfig {
        self.config
    }

    /// Run every test over `dataset`.
    ///
    /// Non-fatal test errors are logged and the chain continues.
    ///
    /// # Errors
    /// The first fatal error (see [`Error::is_fatal`]); remaining tests are
    /// not run.
    pub fn run_all(&self, dataset: Dataset, params: Arc<ParameterSet>) -> Result<QcRun> {
        let ctx = RunContext::new(self.config.auto, params)
            .with_max_despike_iterations(self.config.max_despike_iterations);
        self.run_with_context(dataset, ctx)
    }

    /// [`run_all`](Self::run_all) with a caller-built context.
    ///
    /// The context's lattice is replaced with this chain's, so tests rank
    /// flags the same way fusion does.
    ///
    /// # Errors
    /// As for [`run_all`](Self::run_all).
    pub fn run_with_context(&self, mut dataset: Dataset, ctx: RunContext) -> Result<QcRun> {
        let mut ctx = ctx.with_lattice(self.lattice.clone());
        let span = tracing::info_span!("qc_dataset", dataset = %dataset.id());
        let _guard = span.enter();

        let mut log = ProvenanceLog::new();
        for test in &self.tests {
            if ctx.is_auto() && test.interaction() == Interaction::Confirm {
                tracing::info!(test = test.name(), "Skipping test that requires confirmation");
                continue;
            }

            let outcome = match test {
                QcTest::Variable(t) => self.run_variable_test(t.as_ref(), &mut dataset, &mut ctx, &mut log),
                QcTest::Dataset(t) => self.run_dataset_test(t.as_ref(), &mut dataset, &mut ctx, &mut log),
            };
            match outcome {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(test = test.name(), error = %e, "Test failed, continuing"),
            }
        }

        tracing::info!(records = log.len(), "QC complete");
        Ok(QcRun {
            dataset,
            log,
            context: ctx,
        })
    }

    fn run_variable_test(
        &self,
        test: &dyn VariableTest,
        dataset: &mut Dataset,
        ctx: &mut RunContext,
        log: &mut ProvenanceLog,
    ) -> Result<()> {
        let runner = TestRunner::new(&self.lattice);
        for slot in dataset.slots() {
            match runner.run(test, dataset, slot, ctx, log) {
                Ok(_) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => tracing::warn!(test = test.name(), error = %e, "Test failed on variable"),
            }
        }
        Ok(())
    }

    fn run_dataset_test(
        &self,
        test: &dyn DatasetTest,
        dataset: &mut Dataset,
        ctx: &mut RunContext,
        log: &mut ProvenanceLog,
    ) -> Result<()> {
        let mut working = dataset.clone();
        let Some(parameters) = test
            .evaluate(&mut working, ctx)
            .map_err(|e| annotate(e, test.name(), dataset.id()))?
        else {
            tracing::debug!(test = test.name(), "Test not applicable");
            return Ok(());
        };

        let runner = TestRunner::new(&self.lattice);
        for slot in dataset.slots() {
            let Some(variable) = dataset.get_mut(slot) else {
                continue;
            };
            let candidate = working
                .find(variable.name())
                .map(|v| v.flags().to_vec())
                .ok_or_else(|| {
                    Error::fatal(test.name(), variable.name(), "variable removed by test")
                })?;
            if candidate.as_slice() == variable.flags() {
                continue;
            }
            runner.apply(
                test.name(),
                variable,
                &candidate,
                test.allows_downgrade(),
                &parameters,
                log,
            )?;
        }
        Ok(())
    }

    /// Run the chain over independent datasets.
    ///
    /// Each dataset gets its own context and log. A fatal error aborts only
    /// that dataset and is recorded in the summary.
    #[must_use]
    pub fn run_batch(&self, datasets: Vec<Dataset>, params: &Arc<ParameterSet>) -> BatchRun {
        #[cfg(feature = "rayon")]
        let results: Vec<_> = {
            use rayon::prelude::*;
            datasets
                .into_par_iter()
                .map(|ds| self.run_one(ds, Arc::clone(params)))
                .collect()
        };
        #[cfg(not(feature = "rayon"))]
        let results: Vec<_> = datasets
            .into_iter()
            .map(|ds| self.run_one(ds, Arc::clone(params)))
            .collect();

        let mut batch = BatchRun::default();
        for (outcome, run) in results {
            batch.summary.push(outcome);
            batch.runs.extend(run);
        }
        tracing::info!(
            completed = batch.summary.completed(),
            failed = batch.summary.failed(),
            "Batch complete"
        );
        batch
    }

    fn run_one(&self, dataset: Dataset, params: Arc<ParameterSet>) -> (DatasetOutcome, Option<QcRun>) {
        let dataset_id = dataset.id().to_string();
        let started_at = Utc::now();
        match self.run_all(dataset, params) {
            Ok(run) => (
                DatasetOutcome {
                    dataset_id,
                    status: DatasetStatus::Completed,
                    started_at,
                    ended_at: Utc::now(),
                    records: run.log.len(),
                    failure: None,
                },
                Some(run),
            ),
            Err(e) => {
                tracing::error!(dataset = %dataset_id, error = %e, "Dataset aborted");
                let (test, variable) = e
                    .location()
                    .map(|(t, v)| (Some(t.to_string()), Some(v.to_string())))
                    .unwrap_or_default();
                (
                    DatasetOutcome {
                        dataset_id,
                        status: DatasetStatus::Failed,
                        started_at,
                        ended_at: Utc::now(),
                        records: 0,
                        failure: Some(Failure {
                            test,
                            variable,
                            message: e.to_string(),
                        }),
                    },
                    None,
                )
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{ProcessingMode, Slot, Variable};
    use crate::flags::QualityFlag::{self, Bad, Good, ProbablyBad, Raw};
    use crate::runner::TestResult;

    struct Fixed(&'static str, Vec<QualityFlag>);

    impl VariableTest for Fixed {
        fn name(&self) -> &str {
            self.0
        }

        fn evaluate(&self, ds: &Dataset, slot: Slot, _: &mut RunContext) -> Result<TestResult> {
            match ds.get(slot) {
                Some(v) if v.name() == "TEMP" => Ok(TestResult::new(self.1.clone(), "")),
                _ => Ok(TestResult::not_applicable()),
            }
        }
    }

    struct Prompting;

    impl VariableTest for Prompting {
        fn name(&self) -> &str {
            "prompting"
        }

        fn evaluate(&self, _: &Dataset, _: Slot, _: &mut RunContext) -> Result<TestResult> {
            Ok(TestResult::new(vec![Bad; 4], ""))
        }

        fn interaction(&self) -> Interaction {
            Interaction::Confirm
        }
    }

    struct AbortOn(&'static str);

    impl VariableTest for AbortOn {
        fn name(&self) -> &str {
            "abort"
        }

        fn evaluate(&self, ds: &Dataset, slot: Slot, _: &mut RunContext) -> Result<TestResult> {
            match ds.get(slot) {
                Some(v) if v.name() == self.0 => Err(Error::fatal("abort", v.name(), "all samples failed")),
                _ => Ok(TestResult::not_applicable()),
            }
        }
    }

    /// Rewrites TEMP flags on the working copy, trying to downgrade sample 0.
    struct Rewrite;

    impl DatasetTest for Rewrite {
        fn name(&self) -> &str {
            "rewrite"
        }

        fn evaluate(&self, working: &mut Dataset, _: &mut RunContext) -> Result<Option<String>> {
            let temp = working
                .find_mut("TEMP")
                .ok_or_else(|| Error::InvalidInput("no TEMP".to_string()))?;
            temp.set_flags(vec![Raw, ProbablyBad, Good, Good])?;
            Ok(Some("rewrite".to_string()))
        }
    }

    fn dataset(id: &str) -> Dataset {
        let mut ds = Dataset::new(id, ProcessingMode::TimeSeries);
        ds.add_dimension(Variable::series("TIME", vec![0.0, 1.0, 2.0, 3.0]))
            .unwrap();
        ds.add_variable(Variable::series("TEMP", vec![10.0, 11.0, 99.0, 12.0]))
            .unwrap();
        ds
    }

    fn params() -> Arc<ParameterSet> {
        Arc::new(ParameterSet::new())
    }

    #[test]
    fn test_end_to_end_fusion() {
        let orchestrator = Orchestrator::new(vec![
            QcTest::variable(Fixed("range", vec![Good, Good, Bad, Good])),
            QcTest::variable(Fixed("spike", vec![Raw, Raw, Bad, Raw])),
        ]);
        let run = orchestrator.run_all(dataset("a"), params()).unwrap();
        assert_eq!(run.dataset.find("TEMP").unwrap().flags(), &[Good, Good, Bad, Good]);
        let spike: Vec<_> = run.log.for_test("spike").collect();
        assert_eq!(spike.len(), 1);
        assert_eq!(spike[0].count, 0);
        assert_eq!(spike[0].flag, Raw);
    }

    #[test]
    fn test_dataset_test_is_reconciled_upgrade_only() {
        let orchestrator = Orchestrator::new(vec![
            QcTest::variable(Fixed("range", vec![Good; 4])),
            QcTest::dataset(Rewrite),
        ]);
        let run = orchestrator.run_all(dataset("a"), params()).unwrap();
        assert_eq!(run.dataset.find("TEMP").unwrap().flags(), &[Good, ProbablyBad, Good, Good]);
        let records: Vec<_> = run.log.for_test("rewrite").collect();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].count, 1);
        assert_eq!(records[0].parameters, "rewrite");
    }

    #[test]
    fn test_confirm_tests_skipped_in_auto_mode() {
        let run = Orchestrator::new(vec![QcTest::variable(Prompting)])
            .run_all(dataset("a"), params())
            .unwrap();
        assert!(run.log.is_empty());

        let interactive = OrchestratorConfig {
            auto: false,
            ..OrchestratorConfig::default()
        };
        let run = Orchestrator::new(vec![QcTest::variable(Prompting)])
            .with_config(interactive)
            .run_all(dataset("a"), params())
            .unwrap();
        assert_eq!(run.log.total(Bad), 8);
    }

    #[test]
    fn test_fatal_aborts_remaining_tests() {
        let orchestrator = Orchestrator::new(vec![
            QcTest::variable(AbortOn("TIME")),
            QcTest::variable(Fixed("range", vec![Good; 4])),
        ]);
        let err = orchestrator.run_all(dataset("a"), params()).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.location(), Some(("abort", "TIME")));
    }

    #[test]
    fn test_batch_isolates_failures() {
        let orchestrator = Orchestrator::new(vec![
            QcTest::variable(AbortOn("SKIP")),
            QcTest::variable(Fixed("range", vec![Good; 4])),
        ]);
        let mut bad = dataset("b");
        bad.add_variable(Variable::series("SKIP", vec![0.0])).unwrap();

        let batch = orchestrator.run_batch(vec![dataset("a"), bad, dataset("c")], &params());
        assert_eq!(batch.summary.completed(), 2);
        assert_eq!(batch.summary.failed(), 1);
        assert_eq!(batch.runs.len(), 2);

        let failed = &batch.summary.outcomes()[1];
        assert_eq!(failed.dataset_id, "b");
        let failure = failed.failure.as_ref().unwrap();
        assert_eq!(failure.variable.as_deref(), Some("SKIP"));
    }
}
