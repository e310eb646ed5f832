//! Per-run context passed to every test invocation
//!
//! Holds the batch/interactive switch, the parameter provider, the fusion
//! lattice, the iteration bound for iterative despiking and the climatology
//! ranges accumulated by range tests, keyed by dataset id then parameter name.

use crate::flags::FlagLattice;
use crate::params::ParameterSet;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Default bound on iterative despike passes.
pub const DEFAULT_MAX_DESPIKE_ITERATIONS: usize = 10;

/// Accepted range recorded for one parameter.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClimatologyRange {
    /// Lower bound
    pub min: f64,
    /// Upper bound
    pub max: f64,
}

/// Explicit context shared by the tests of one QC run.
#[derive(Debug, Clone)]
pub struct RunContext {
    auto: bool,
    params: Arc<ParameterSet>,
    lattice: FlagLattice,
    max_despike_iterations: usize,
    climatology: FxHashMap<String, BTreeMap<String, ClimatologyRange>>,
}

impl RunContext {
    /// Fresh context.
    #[must_use]
    pub fn new(auto: bool, params: Arc<ParameterSet>) -> Self {
        Self {
            auto,
            params,
            lattice: FlagLattice::default(),
            max_despike_iterations: DEFAULT_MAX_DESPIKE_ITERATIONS,
            climatology: FxHashMap::default(),
        }
    }

    /// Override the despike iteration bound.
    #[must_use]
    pub fn with_max_despike_iterations(mut self, bound: usize) -> Self {
        self.max_despike_iterations = bound;
        self
    }

    /// Replace the lattice tests rank existing flags with.
    #[must_use]
    pub fn with_lattice(mut self, lattice: FlagLattice) -> Self {
        self.lattice = lattice;
        self
    }

    /// Whether the run is non-interactive.
    #[must_use]
    pub const fn is_auto(&self) -> bool {
        self.auto
    }

    /// Parameter provider.
    #[must_use]
    pub fn params(&self) -> &ParameterSet {
        &self.params
    }

    /// Lattice the run fuses with.
    #[must_use]
    pub const fn lattice(&self) -> &FlagLattice {
        &self.lattice
    }

    /// Iterative despike bound.
    #[must_use]
    pub const fn max_despike_iterations(&self) -> usize {
        self.max_despike_iterations
    }

    /// Record the range applied to `param` of `dataset`.
    pub fn record_range(&mut self, dataset: &str, param: &str, range: ClimatologyRange) {
        self.climatology
            .entry(dataset.to_string())
            .or_default()
            .insert(param.to_string(), range);
    }

    /// Range previously recorded for `param` of `dataset`.
    #[must_use]
    pub fn range(&self, dataset: &str, param: &str) -> Option<ClimatologyRange> {
        self.climatology
            .get(dataset)
            .and_then(|ranges| ranges.get(param))
            .copied()
    }

    /// All ranges recorded for `dataset`.
    #[must_use]
    pub fn ranges(&self, dataset: &str) -> Option<&BTreeMap<String, ClimatologyRange>> {
        self.climatology.get(dataset)
    }
}
