//! Threshold and parameter provider
//!
//! Parameters are looked up by (test, parameter) with two tiers: a
//! dataset-specific override first, then the global default. Persisting
//! overrides is the caller's concern; this is a read-only key/value view.
//!
//! ```json
//! {
//!   "defaults":  { "spike_tukey": { "k": 1.5 } },
//!   "overrides": { "NRSROT-2024": { "spike_tukey": { "k": 2.0 } } }
//! }
//! ```

use crate::dataset::Scalar;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

type TestParams = BTreeMap<String, BTreeMap<String, Scalar>>;

/// Global defaults plus per-dataset overrides.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    #[serde(default)]
    defaults: TestParams,
    #[serde(default)]
    overrides: BTreeMap<String, TestParams>,
}

impl ParameterSet {
    /// Empty parameter set; every lookup falls back to built-in defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from JSON text.
    ///
    /// # Errors
    /// Returns error if the JSON does not match the expected layout.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Load from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            Error::Config(format!(
                "Failed to read parameter file {}: {e}",
                path.as_ref().display()
            ))
        })?;
        Self::from_json(&text)
    }

    /// Set a global default.
    #[must_use]
    pub fn with_default(
        mut self,
        test: impl Into<String>,
        param: impl Into<String>,
        value: impl Into<Scalar>,
    ) -> Self {
        self.defaults
            .entry(test.into())
            .or_default()
            .insert(param.into(), value.into());
        self
    }

    /// Set a dataset-specific override.
    #[must_use]
    pub fn with_override(
        mut self,
        dataset: impl Into<String>,
        test: impl Into<String>,
        param: impl Into<String>,
        value: impl Into<Scalar>,
    ) -> Self {
        self.overrides
            .entry(dataset.into())
            .or_default()
            .entry(test.into())
            .or_default()
            .insert(param.into(), value.into());
        self
    }

    /// Look up a value: dataset override first, then global default.
    #[must_use]
    pub fn lookup(&self, dataset: &str, test: &str, param: &str) -> Option<&Scalar> {
        self.overrides
            .get(dataset)
            .and_then(|tests| tests.get(test))
            .and_then(|params| params.get(param))
            .or_else(|| self.defaults.get(test).and_then(|params| params.get(param)))
    }

    /// Numeric value, or `fallback` with a warning when missing or not numeric.
    #[must_use]
    pub fn number_or(&self, dataset: &str, test: &str, param: &str, fallback: f64) -> f64 {
        match self.lookup(dataset, test, param) {
            Some(value) => value.as_f64().unwrap_or_else(|| {
                tracing::warn!(
                    dataset,
                    test,
                    param,
                    ?value,
                    fallback,
                    "Parameter is not numeric, using built-in default"
                );
                fallback
            }),
            None => {
                tracing::debug!(dataset, test, param, fallback, "Parameter not set, using built-in default");
                fallback
            }
        }
    }

    /// Numeric value, `None` with a warning when missing or not numeric.
    ///
    /// Used by tests that decline to run without an explicit threshold.
    #[must_use]
    pub fn number(&self, dataset: &str, test: &str, param: &str) -> Option<f64> {
        let value = self.lookup(dataset, test, param);
        let number = value.and_then(Scalar::as_f64);
        if number.is_none() {
            tracing::warn!(dataset, test, param, ?value, "Parameter missing or not numeric");
        }
        number
    }

    /// Text value, or `fallback` when missing.
    #[must_use]
    pub fn text_or<'a>(&'a self, dataset: &str, test: &str, param: &str, fallback: &'a str) -> &'a str {
        self.lookup(dataset, test, param)
            .and_then(Scalar::as_str)
            .unwrap_or(fallback)
    }
}
