//! Manual flag overrides

use crate::context::RunContext;
use crate::dataset::{Dataset, Slot};
use crate::flags::QualityFlag;
use crate::runner::{TestResult, VariableTest};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Applies flags recorded by an operator, keyed by variable then sample
/// index. The only test allowed to lower a flag.
///
/// ```json
/// { "TEMP": { "12": "good", "13": "bad" } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ManualOverride {
    flags: BTreeMap<String, BTreeMap<usize, QualityFlag>>,
}

impl ManualOverride {
    /// No recorded flags.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `flag` for sample `index` of `variable`.
    #[must_use]
    pub fn with_flag(mut self, variable: impl Into<String>, index: usize, flag: QualityFlag) -> Self {
        self.flags.entry(variable.into()).or_default().insert(index, flag);
        self
    }

    /// Load recorded flags from a JSON file.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or parsed.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Number of recorded flags.
    #[must_use]
    pub fn len(&self) -> usize {
        self.flags.values().map(BTreeMap::len).sum()
    }

    /// Whether nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl VariableTest for ManualOverride {
    fn name(&self) -> &str {
        "manual_override"
    }

    fn evaluate(&self, dataset: &Dataset, slot: Slot, _ctx: &mut RunContext) -> Result<TestResult> {
        let Some(variable) = dataset.get(slot) else {
            return Ok(TestResult::not_applicable());
        };
        let Some(recorded) = self.flags.get(variable.name()).filter(|r| !r.is_empty()) else {
            return Ok(TestResult::not_applicable());
        };

        let mut candidate = variable.flags().to_vec();
        for (&index, &flag) in recorded {
            let slot = candidate.get_mut(index).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "Manual flag index {index} out of range for {} ({} samples)",
                    variable.name(),
                    variable.data().len()
                ))
            })?;
            *slot = flag;
        }
        Ok(TestResult::new(
            candidate,
            format!("{} manual flags", recorded.len()),
        ))
    }

    fn allows_downgrade(&self) -> bool {
        true
    }
}
