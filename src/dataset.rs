//! Dataset model: dimensions, variables and their flag series
//!
//! Data and flags are stored flat and row-major; [`Shape`] gives the layout.
//! `flags.len() == data.len() == shape.len()` holds for every variable built
//! through this module.
//!
//! The `TIME` dimension holds seconds since the Unix epoch.

use crate::flags::QualityFlag;
use crate::grid::{Grid, Shape};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Name of the time dimension.
pub const TIME: &str = "TIME";

/// Scalar metadata or parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Scalar {
    /// Numeric value
    Number(f64),
    /// Text value
    Text(String),
}

impl Scalar {
    /// Numeric value, parsing text when it holds a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(v) => Some(*v),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Text value.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            Self::Number(_) => None,
        }
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<f64> for Scalar {
    fn from(v: f64) -> Self {
        Self::Number(v)
    }
}

impl From<&str> for Scalar {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Scalar {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

/// One named series with its flags.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    name: String,
    shape: Shape,
    data: Vec<f64>,
    flags: Vec<QualityFlag>,
    #[serde(default)]
    dimensions: Vec<String>,
    #[serde(default)]
    metadata: BTreeMap<String, Scalar>,
}

impl Variable {
    /// 1-D variable with every flag `raw`.
    #[must_use]
    pub fn series(name: impl Into<String>, data: Vec<f64>) -> Self {
        let n = data.len();
        Self {
            name: name.into(),
            shape: Shape::Series(n),
            data,
            flags: vec![QualityFlag::Raw; n],
            dimensions: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// 2-D (time × bin) variable with every flag `raw`.
    #[must_use]
    pub fn profile(name: impl Into<String>, grid: Grid<f64>) -> Self {
        let shape = grid.shape();
        let data = grid.into_cells();
        Self {
            name: name.into(),
            shape,
            flags: vec![QualityFlag::Raw; data.len()],
            data,
            dimensions: Vec::new(),
            metadata: BTreeMap::new(),
        }
    }

    /// Replace the initial flags.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when `flags` does not match the data.
    pub fn with_flags(mut self, flags: Vec<QualityFlag>) -> Result<Self> {
        if flags.len() != self.data.len() {
            return Err(Error::ShapeMismatch {
                expected: self.data.len(),
                actual: flags.len(),
            });
        }
        self.flags = flags;
        Ok(self)
    }

    /// Attach dimension names.
    #[must_use]
    pub fn with_dimensions<I, S>(mut self, dimensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dimensions = dimensions.into_iter().map(Into::into).collect();
        self
    }

    /// Attach one metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Variable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sample layout.
    #[must_use]
    pub const fn shape(&self) -> Shape {
        self.shape
    }

    /// Samples, row-major.
    #[must_use]
    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Flags, row-major.
    #[must_use]
    pub fn flags(&self) -> &[QualityFlag] {
        &self.flags
    }

    pub(crate) fn flags_mut(&mut self) -> &mut [QualityFlag] {
        &mut self.flags
    }

    /// Overwrite flags without fusion. Used by whole-dataset tests on their
    /// working copy; the orchestrator reconciles afterwards.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when `flags` does not match the data.
    pub fn set_flags(&mut self, flags: Vec<QualityFlag>) -> Result<()> {
        if flags.len() != self.data.len() {
            return Err(Error::ShapeMismatch {
                expected: self.data.len(),
                actual: flags.len(),
            });
        }
        self.flags = flags;
        Ok(())
    }

    /// Dimension names.
    #[must_use]
    pub fn dimensions(&self) -> &[String] {
        &self.dimensions
    }

    /// All metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Scalar> {
        &self.metadata
    }

    /// Metadata entry.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&Scalar> {
        self.metadata.get(key)
    }

    /// Numeric metadata entry.
    #[must_use]
    pub fn meta_f64(&self, key: &str) -> Option<f64> {
        self.meta(key).and_then(Scalar::as_f64)
    }

    /// Data viewed as a grid (a 1-D series is one column).
    ///
    /// # Errors
    /// Never fails for a well-formed variable.
    pub fn data_grid(&self) -> Result<Grid<f64>> {
        Grid::with_shape(self.shape, &self.data)
    }

    /// Flags viewed as a grid.
    ///
    /// # Errors
    /// Never fails for a well-formed variable.
    pub fn flag_grid(&self) -> Result<Grid<QualityFlag>> {
        Grid::with_shape(self.shape, &self.flags)
    }

    /// Check `flags.len() == data.len() == shape.len()`.
    ///
    /// # Errors
    /// [`Error::ShapeMismatch`] when the invariant is broken.
    pub fn validate(&self) -> Result<()> {
        let expected = self.shape.len();
        for actual in [self.data.len(), self.flags.len()] {
            if actual != expected {
                return Err(Error::ShapeMismatch { expected, actual });
            }
        }
        Ok(())
    }
}

/// Processing mode of a dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ProcessingMode {
    /// Vertical profiles (CTD casts)
    Profile,
    /// Moored time series
    TimeSeries,
}

/// Deployment window: instrument in the water from `start` to `end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deployment {
    /// In-water time
    pub start: DateTime<Utc>,
    /// Out-of-water time
    pub end: DateTime<Utc>,
}

impl Deployment {
    /// Bounds as seconds since the Unix epoch.
    #[must_use]
    pub fn bounds_seconds(&self) -> (f64, f64) {
        (epoch_seconds(self.start), epoch_seconds(self.end))
    }
}

/// Seconds since the Unix epoch, with sub-second precision.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn epoch_seconds(at: DateTime<Utc>) -> f64 {
    at.timestamp() as f64 + f64::from(at.timestamp_subsec_nanos()) * 1e-9
}

/// Where a variable lives inside a [`Dataset`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    /// Index into the dimensions
    Dimension(usize),
    /// Index into the variables
    Variable(usize),
}

/// Ordered dimensions and variables sharing deployment metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    id: String,
    mode: ProcessingMode,
    #[serde(default)]
    site_code: Option<String>,
    #[serde(default)]
    instrument: Option<String>,
    #[serde(default)]
    deployment: Option<Deployment>,
    #[serde(default)]
    metadata: BTreeMap<String, Scalar>,
    dimensions: Vec<Variable>,
    variables: Vec<Variable>,
}

impl Dataset {
    /// Empty dataset.
    #[must_use]
    pub fn new(id: impl Into<String>, mode: ProcessingMode) -> Self {
        Self {
            id: id.into(),
            mode,
            site_code: None,
            instrument: None,
            deployment: None,
            metadata: BTreeMap::new(),
            dimensions: Vec::new(),
            variables: Vec::new(),
        }
    }

    /// Set the site code.
    #[must_use]
    pub fn with_site_code(mut self, site_code: impl Into<String>) -> Self {
        self.site_code = Some(site_code.into());
        self
    }

    /// Set the instrument description.
    #[must_use]
    pub fn with_instrument(mut self, instrument: impl Into<String>) -> Self {
        self.instrument = Some(instrument.into());
        self
    }

    /// Set the deployment window.
    #[must_use]
    pub fn with_deployment(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.deployment = Some(Deployment { start, end });
        self
    }

    /// Attach one dataset-level metadata entry.
    #[must_use]
    pub fn with_meta(mut self, key: impl Into<String>, value: impl Into<Scalar>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Append a dimension.
    ///
    /// # Errors
    /// Returns error if the name is taken or the variable is malformed.
    pub fn add_dimension(&mut self, dimension: Variable) -> Result<()> {
        self.check_new(&dimension)?;
        self.dimensions.push(dimension);
        Ok(())
    }

    /// Append a variable.
    ///
    /// # Errors
    /// Returns error if the name is taken or the variable is malformed.
    pub fn add_variable(&mut self, variable: Variable) -> Result<()> {
        self.check_new(&variable)?;
        self.variables.push(variable);
        Ok(())
    }

    fn check_new(&self, variable: &Variable) -> Result<()> {
        variable.validate()?;
        if self.slot(variable.name()).is_some() {
            return Err(Error::InvalidInput(format!(
                "Duplicate variable name: {}",
                variable.name()
            )));
        }
        Ok(())
    }

    /// Dataset identifier.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Processing mode.
    #[must_use]
    pub const fn mode(&self) -> ProcessingMode {
        self.mode
    }

    /// Site code, if known.
    #[must_use]
    pub fn site_code(&self) -> Option<&str> {
        self.site_code.as_deref()
    }

    /// Instrument description, if known.
    #[must_use]
    pub fn instrument(&self) -> Option<&str> {
        self.instrument.as_deref()
    }

    /// Deployment window, if known.
    #[must_use]
    pub const fn deployment(&self) -> Option<&Deployment> {
        self.deployment.as_ref()
    }

    /// Dataset-level metadata entry.
    #[must_use]
    pub fn meta(&self, key: &str) -> Option<&Scalar> {
        self.metadata.get(key)
    }

    /// All dataset-level metadata.
    #[must_use]
    pub const fn metadata(&self) -> &BTreeMap<String, Scalar> {
        &self.metadata
    }

    /// Dimensions in order.
    #[must_use]
    pub fn dimensions(&self) -> &[Variable] {
        &self.dimensions
    }

    /// Variables in order.
    #[must_use]
    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    /// Slots of all dimensions, then all variables.
    #[must_use]
    pub fn slots(&self) -> Vec<Slot> {
        (0..self.dimensions.len())
            .map(Slot::Dimension)
            .chain((0..self.variables.len()).map(Slot::Variable))
            .collect()
    }

    /// Slot of the dimension or variable called `name`.
    #[must_use]
    pub fn slot(&self, name: &str) -> Option<Slot> {
        self.dimensions
            .iter()
            .position(|d| d.name() == name)
            .map(Slot::Dimension)
            .or_else(|| {
                self.variables
                    .iter()
                    .position(|v| v.name() == name)
                    .map(Slot::Variable)
            })
    }

    /// Variable at `slot`.
    #[must_use]
    pub fn get(&self, slot: Slot) -> Option<&Variable> {
        match slot {
            Slot::Dimension(i) => self.dimensions.get(i),
            Slot::Variable(i) => self.variables.get(i),
        }
    }

    /// Mutable variable at `slot`.
    pub fn get_mut(&mut self, slot: Slot) -> Option<&mut Variable> {
        match slot {
            Slot::Dimension(i) => self.dimensions.get_mut(i),
            Slot::Variable(i) => self.variables.get_mut(i),
        }
    }

    /// Dimension or variable called `name`.
    #[must_use]
    pub fn find(&self, name: &str) -> Option<&Variable> {
        self.slot(name).and_then(|slot| self.get(slot))
    }

    /// Mutable dimension or variable called `name`.
    pub fn find_mut(&mut self, name: &str) -> Option<&mut Variable> {
        let slot = self.slot(name)?;
        self.get_mut(slot)
    }

    /// `TIME` samples in seconds since the epoch.
    #[must_use]
    pub fn time_seconds(&self) -> Option<&[f64]> {
        self.find(TIME).map(Variable::data)
    }
}
