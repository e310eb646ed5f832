//! # ocean-qc: Automatic Quality Control for Oceanographic Time Series
//!
//! **Version**: 0.3.0
//!
//! ocean-qc assigns an ordinal quality flag to every sample of a CTD, ADCP or
//! mooring dataset by running an ordered chain of QC tests and fusing their
//! verdicts.
//!
//! ## Design Principles
//!
//! - **Upgrade-only fusion**: a later test never silently relaxes an earlier
//!   verdict; only the manual override may lower a flag
//! - **Pure detectors**: spike and consensus algorithms are stateless functions
//!   of their input and never raise on NaN
//! - **Explicit capabilities**: single-variable and whole-dataset tests are
//!   distinct traits chosen at registration
//! - **Isolated datasets**: a fatal error aborts one dataset, never the batch
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use ocean_qc::checks::default_suite;
//! use ocean_qc::orchestrator::Orchestrator;
//! use ocean_qc::params::ParameterSet;
//! use ocean_qc::storage::ParquetStore;
//! use std::sync::Arc;
//!
//! let store = ParquetStore::default();
//! let dataset = store.load_parquet("data/NRSROT-2024.parquet")?;
//!
//! let params = Arc::new(ParameterSet::load("qc_params.json")?);
//! let run = Orchestrator::new(default_suite()).run_all(dataset, params)?;
//!
//! print!("{}", run.log.render_report());
//! store.save_parquet(&run.dataset, "out/NRSROT-2024.parquet")?;
//! # Ok::<(), ocean_qc::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod checks;
pub mod consensus;
pub mod context;
pub mod dataset;
pub mod detectors;
pub mod error;
pub mod flags;
pub mod grid;
pub mod orchestrator;
pub mod params;
pub mod provenance;
pub mod runner;
pub mod storage;

pub use error::{Error, Result};
