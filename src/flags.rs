//! Quality flags and the upgrade-only fusion rule
//!
//! Flags form a severity ladder `raw < good <= probablyGood <= probablyBad <= bad`.
//! Test-specific levels (`spike`, `bound`) carry their own identity for
//! reporting but fuse at the rank of another level (`bad` unless configured).
//!
//! A merge only moves a sample to a flag of equal or greater rank. The single
//! exception is a merge with `allow_downgrade`, reserved for manual overrides.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Ordinal quality code attached to one sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum QualityFlag {
    /// Not yet tested
    Raw,
    /// Passed
    Good,
    /// Passed with reservations
    ProbablyGood,
    /// Failed with reservations
    ProbablyBad,
    /// Failed
    Bad,
    /// Rejected by a spike detector
    Spike,
    /// Outside a range bound
    Bound,
}

impl QualityFlag {
    /// Every level, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Raw,
        Self::Good,
        Self::ProbablyGood,
        Self::ProbablyBad,
        Self::Bad,
        Self::Spike,
        Self::Bound,
    ];

    /// Canonical camelCase name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Good => "good",
            Self::ProbablyGood => "probablyGood",
            Self::ProbablyBad => "probablyBad",
            Self::Bad => "bad",
            Self::Spike => "spike",
            Self::Bound => "bound",
        }
    }

    /// Rank on the canonical ladder, before any lattice overrides.
    #[must_use]
    pub const fn default_rank(self) -> u8 {
        match self {
            Self::Raw => 0,
            Self::Good => 1,
            Self::ProbablyGood => 2,
            Self::ProbablyBad => 3,
            Self::Bad | Self::Spike | Self::Bound => 4,
        }
    }
}

impl fmt::Display for QualityFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for QualityFlag {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|flag| flag.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| Error::InvalidInput(format!("Unknown quality flag: {s}")))
    }
}

/// Rank table and merge rule.
///
/// ```rust
/// use ocean_qc::flags::{FlagLattice, QualityFlag};
///
/// let lattice = FlagLattice::default();
/// assert!(lattice.can_upgrade(QualityFlag::Good, QualityFlag::Spike));
/// assert!(!lattice.can_upgrade(QualityFlag::Bad, QualityFlag::Good));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagLattice {
    #[serde(default)]
    overrides: BTreeMap<QualityFlag, u8>,
}

impl FlagLattice {
    /// Lattice with the canonical ranks.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fuse `flag` at the rank of `as_level` instead of its default rank.
    #[must_use]
    pub fn with_rank_of(mut self, flag: QualityFlag, as_level: QualityFlag) -> Self {
        let rank = self.rank(as_level);
        self.overrides.insert(flag, rank);
        self
    }

    /// Position of `flag` in the severity order.
    #[must_use]
    pub fn rank(&self, flag: QualityFlag) -> u8 {
        self.overrides
            .get(&flag)
            .copied()
            .unwrap_or_else(|| flag.default_rank())
    }

    /// True iff `candidate` is at least as severe as `current`.
    #[must_use]
    pub fn can_upgrade(&self, current: QualityFlag, candidate: QualityFlag) -> bool {
        self.rank(candidate) >= self.rank(current)
    }

    /// Elementwise merge of `candidate` into `current`.
    ///
    /// An empty `candidate` is a no-op and returns `current` unchanged.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if a non-empty `candidate` differs in length.
    pub fn merge(
        &self,
        current: &[QualityFlag],
        candidate: &[QualityFlag],
        allow_downgrade: bool,
    ) -> Result<Vec<QualityFlag>> {
        let mut merged = current.to_vec();
        self.merge_into(&mut merged, candidate, allow_downgrade)?;
        Ok(merged)
    }

    /// In-place variant of [`merge`](Self::merge). Returns how many samples changed.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] if a non-empty `candidate` differs in length.
    pub fn merge_into(
        &self,
        current: &mut [QualityFlag],
        candidate: &[QualityFlag],
        allow_downgrade: bool,
    ) -> Result<usize> {
        if candidate.is_empty() {
            return Ok(0);
        }
        if candidate.len() != current.len() {
            return Err(Error::ShapeMismatch {
                expected: current.len(),
                actual: candidate.len(),
            });
        }

        let mut changed = 0;
        for (slot, &next) in current.iter_mut().zip(candidate) {
            if (allow_downgrade || self.can_upgrade(*slot, next)) && *slot != next {
                *slot = next;
                changed += 1;
            }
        }
        Ok(changed)
    }
}

/// Numeric code table for one flag numbering convention.
///
/// The engine only needs ranks; codes matter when flags are read from or
/// written to files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagScheme {
    name: String,
    codes: BTreeMap<QualityFlag, i8>,
}

impl FlagScheme {
    /// Build a scheme from an explicit code table.
    ///
    /// # Errors
    /// Returns error if a level is missing from the table.
    pub fn from_codes(
        name: impl Into<String>,
        codes: BTreeMap<QualityFlag, i8>,
    ) -> Result<Self> {
        if let Some(missing) = QualityFlag::ALL.iter().find(|f| !codes.contains_key(f)) {
            return Err(Error::Config(format!("Flag scheme has no code for {missing}")));
        }
        Ok(Self {
            name: name.into(),
            codes,
        })
    }

    /// IODE reference scheme (IMOS default).
    #[must_use]
    pub fn iode() -> Self {
        Self::fixed("IMOS IODE", [0, 1, 2, 3, 4, 6, 7])
    }

    /// Argo real-time scheme.
    #[must_use]
    pub fn argo() -> Self {
        Self::fixed("Argo", [0, 1, 2, 3, 4, 4, 4])
    }

    fn fixed(name: &str, codes: [i8; 7]) -> Self {
        Self {
            name: name.to_string(),
            codes: QualityFlag::ALL.into_iter().zip(codes).collect(),
        }
    }

    /// Look a scheme up by its CLI name (`iode`, `argo`).
    ///
    /// # Errors
    /// Returns error for an unknown name.
    pub fn by_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "iode" | "imos" => Ok(Self::iode()),
            "argo" => Ok(Self::argo()),
            other => Err(Error::Config(format!("Unknown flag scheme: {other}"))),
        }
    }

    /// Scheme name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Integer code for `flag`.
    #[must_use]
    pub fn encode(&self, flag: QualityFlag) -> i8 {
        self.codes.get(&flag).copied().unwrap_or_default()
    }

    /// Level for an integer code. When several levels share a code the
    /// generic one (lowest declaration order) wins.
    ///
    /// # Errors
    /// Returns error for a code absent from the table.
    pub fn decode(&self, code: i8) -> Result<QualityFlag> {
        QualityFlag::ALL
            .into_iter()
            .find(|flag| self.codes.get(flag) == Some(&code))
            .ok_or_else(|| {
                Error::InvalidInput(format!("Flag code {code} not defined in {}", self.name))
            })
    }
}

impl Default for FlagScheme {
    fn default() -> Self {
        Self::iode()
    }
}
