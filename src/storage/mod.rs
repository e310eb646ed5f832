//! Storage adapter (Arrow/Parquet)
//!
//! Moored time series are stored as one flat table:
//!
//! | Column | Type | Meaning |
//! |--------|------|---------|
//! | `TIME` | `Float64` seconds or `Timestamp` | time dimension |
//! | `<NAME>` | any numeric | one variable, nulls read as NaN |
//! | `<NAME>_quality_control` | any integer | flags in the store's [`FlagScheme`] |
//!
//! Field metadata becomes variable metadata (`valid_min`, `valid_max`, ...).
//! Schema metadata carries `site_code`, `instrument` and the deployment
//! window as RFC 3339 `time_deployment_start` / `time_deployment_end`.
//!
//! Profile (time × bin) variables have no flat-table layout and are skipped
//! on save.

use crate::dataset::{Dataset, ProcessingMode, Scalar, Variable, TIME};
use crate::flags::{FlagScheme, QualityFlag};
use crate::grid::Shape;
use crate::provenance::DatasetOutcome;
use crate::{Error, Result};
use arrow::array::{Array, ArrayRef, Float64Array, Int64Array, Int8Array};
use arrow::compute::cast;
use arrow::datatypes::{DataType, Field, Schema, SchemaRef, TimeUnit};
use arrow::record_batch::RecordBatch;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;

/// Suffix of flag columns.
pub const FLAG_SUFFIX: &str = "_quality_control";

const SITE_CODE: &str = "site_code";
const INSTRUMENT: &str = "instrument";
const DEPLOYMENT_START: &str = "time_deployment_start";
const DEPLOYMENT_END: &str = "time_deployment_end";

/// Reads and writes datasets as Parquet, encoding flags with one scheme.
#[derive(Debug, Clone, Default)]
pub struct ParquetStore {
    scheme: FlagScheme,
}

impl ParquetStore {
    /// Store using `scheme` for flag columns.
    #[must_use]
    pub const fn new(scheme: FlagScheme) -> Self {
        Self { scheme }
    }

    /// Flag scheme in use.
    #[must_use]
    pub const fn scheme(&self) -> &FlagScheme {
        &self.scheme
    }

    /// Load a time-series dataset. The dataset id is the file stem.
    ///
    /// # Errors
    /// Returns error if the file cannot be read or has no usable `TIME` column.
    pub fn load_parquet<P: AsRef<Path>>(&self, path: P) -> Result<Dataset> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;
        let schema = Arc::clone(builder.schema());

        let reader = builder
            .build()
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }

        tracing::debug!(path = %path.display(), batches = batches.len(), "Loaded Parquet file");
        self.from_batches(dataset_id(path), &schema, &batches)
    }

    /// Load every file, keeping going past unreadable ones.
    ///
    /// Returns the loaded datasets in input order and a failed
    /// [`DatasetOutcome`] for each file that could not be loaded.
    pub fn load_all<P: AsRef<Path>>(&self, paths: &[P]) -> (Vec<Dataset>, Vec<DatasetOutcome>) {
        let mut datasets = Vec::with_capacity(paths.len());
        let mut unreadable = Vec::new();
        for path in paths {
            let path = path.as_ref();
            match self.load_parquet(path) {
                Ok(dataset) => datasets.push(dataset),
                Err(e) => {
                    tracing::error!(path = %path.display(), error = %e, "Dataset unreadable, skipping");
                    unreadable.push(DatasetOutcome::unreadable(dataset_id(path), e.to_string()));
                }
            }
        }
        (datasets, unreadable)
    }

    /// Build a time-series dataset from record batches sharing `schema`.
    ///
    /// # Errors
    /// Returns error if `TIME` is missing, a column cannot be read as
    /// numbers, or a flag code is not defined in the scheme.
    pub fn from_batches(
        &self,
        id: impl Into<String>,
        schema: &Schema,
        batches: &[RecordBatch],
    ) -> Result<Dataset> {
        let mut dataset = Dataset::new(id, ProcessingMode::TimeSeries);
        dataset = apply_schema_metadata(dataset, schema.metadata())?;

        if schema.column_with_name(TIME).is_none() {
            return Err(Error::StorageError("Missing TIME column".to_string()));
        }

        // TIME first so it is the leading dimension
        let order = std::iter::once(TIME).chain(
            schema
                .fields()
                .iter()
                .map(|f| f.name().as_str())
                .filter(|name| *name != TIME && !name.ends_with(FLAG_SUFFIX)),
        );

        for name in order {
            let (index, field) = schema
                .column_with_name(name)
                .ok_or_else(|| Error::StorageError(format!("Missing column {name}")))?;
            if !is_numeric(field.data_type()) {
                tracing::debug!(column = name, data_type = %field.data_type(), "Skipping non-numeric column");
                continue;
            }

            let data = column_values(batches, index)?;
            let mut variable = Variable::series(name, data);
            for (key, value) in field.metadata() {
                variable = variable.with_meta(key.as_str(), parse_scalar(value));
            }
            let flag_column = format!("{name}{FLAG_SUFFIX}");
            if let Some((flag_index, _)) = schema.column_with_name(&flag_column) {
                variable = variable.with_flags(self.flag_values(batches, flag_index)?)?;
            }

            if name == TIME {
                dataset.add_dimension(variable)?;
            } else {
                dataset.add_variable(variable.with_dimensions([TIME]))?;
            }
        }
        Ok(dataset)
    }

    fn flag_values(&self, batches: &[RecordBatch], index: usize) -> Result<Vec<QualityFlag>> {
        let mut flags = Vec::new();
        for batch in batches {
            let column = cast(batch.column(index), &DataType::Int8)?;
            let codes = column
                .as_any()
                .downcast_ref::<Int8Array>()
                .ok_or_else(|| Error::StorageError("Flag column is not integer".to_string()))?;
            for code in codes {
                flags.push(match code {
                    Some(code) => self.scheme.decode(code)?,
                    None => QualityFlag::Raw,
                });
            }
        }
        Ok(flags)
    }

    /// Encode the dataset's series variables as one record batch.
    ///
    /// # Errors
    /// Returns error if the columns cannot be assembled.
    pub fn to_record_batch(&self, dataset: &Dataset) -> Result<RecordBatch> {
        let mut fields = Vec::new();
        let mut columns: Vec<ArrayRef> = Vec::new();

        for variable in dataset.dimensions().iter().chain(dataset.variables()) {
            if !matches!(variable.shape(), Shape::Series(_)) {
                tracing::warn!(variable = variable.name(), "Profile variable not stored in flat table");
                continue;
            }
            let metadata: HashMap<String, String> = variable
                .metadata()
                .iter()
                .map(|(k, v)| (k.clone(), v.to_string()))
                .collect();
            fields.push(Field::new(variable.name(), DataType::Float64, true).with_metadata(metadata));
            columns.push(Arc::new(Float64Array::from(variable.data().to_vec())));

            let codes: Vec<i8> = variable.flags().iter().map(|&f| self.scheme.encode(f)).collect();
            fields.push(Field::new(
                format!("{}{FLAG_SUFFIX}", variable.name()),
                DataType::Int8,
                false,
            ));
            columns.push(Arc::new(Int8Array::from(codes)));
        }

        let schema: SchemaRef = Arc::new(Schema::new_with_metadata(fields, schema_metadata(dataset)));
        Ok(RecordBatch::try_new(schema, columns)?)
    }

    /// Write the dataset, flags included, to a Parquet file.
    ///
    /// # Errors
    /// Returns error if the file cannot be created or written.
    pub fn save_parquet<P: AsRef<Path>>(&self, dataset: &Dataset, path: P) -> Result<()> {
        use parquet::arrow::ArrowWriter;
        use parquet::file::properties::WriterProperties;
        use std::fs::File;

        let batch = self.to_record_batch(dataset)?;
        let file = File::create(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet file: {e}")))?;
        let props = WriterProperties::builder()
            .set_created_by(format!("ocean-qc {}", env!("CARGO_PKG_VERSION")))
            .build();
        let mut writer = ArrowWriter::try_new(file, batch.schema(), Some(props))
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet writer: {e}")))?;
        writer
            .write(&batch)
            .map_err(|e| Error::StorageError(format!("Failed to write record batch: {e}")))?;
        writer
            .close()
            .map_err(|e| Error::StorageError(format!("Failed to finish Parquet file: {e}")))?;
        Ok(())
    }
}

/// Dataset id for a file: its stem.
fn dataset_id(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| "dataset".to_string(), |s| s.to_string_lossy().into_owned())
}

fn is_numeric(data_type: &DataType) -> bool {
    data_type.is_numeric() || matches!(data_type, DataType::Timestamp(..))
}

/// Column `index` of every batch as `f64`; nulls become NaN and timestamps
/// become seconds since the epoch.
fn column_values(batches: &[RecordBatch], index: usize) -> Result<Vec<f64>> {
    let mut values = Vec::new();
    for batch in batches {
        let column = batch.column(index);
        if let DataType::Timestamp(unit, _) = column.data_type() {
            let per_second = match unit {
                TimeUnit::Second => 1.0,
                TimeUnit::Millisecond => 1e3,
                TimeUnit::Microsecond => 1e6,
                TimeUnit::Nanosecond => 1e9,
            };
            let ticks = cast(column, &DataType::Int64)?;
            let ticks = ticks
                .as_any()
                .downcast_ref::<Int64Array>()
                .ok_or_else(|| Error::StorageError("Timestamp cast failed".to_string()))?;
            #[allow(clippy::cast_precision_loss)]
            values.extend(ticks.iter().map(|t| t.map_or(f64::NAN, |t| t as f64 / per_second)));
        } else {
            let floats = cast(column, &DataType::Float64)?;
            let floats = floats
                .as_any()
                .downcast_ref::<Float64Array>()
                .ok_or_else(|| Error::StorageError("Numeric cast failed".to_string()))?;
            values.extend(floats.iter().map(|v| v.unwrap_or(f64::NAN)));
        }
    }
    Ok(values)
}

fn parse_scalar(value: &str) -> Scalar {
    value
        .trim()
        .parse::<f64>()
        .map_or_else(|_| Scalar::from(value), Scalar::from)
}

fn parse_time(key: &str, value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| Error::StorageError(format!("Invalid {key} '{value}': {e}")))
}

fn apply_schema_metadata(mut dataset: Dataset, metadata: &HashMap<String, String>) -> Result<Dataset> {
    // sorted so dataset metadata does not depend on hash order
    let sorted: BTreeMap<_, _> = metadata.iter().collect();
    for (key, value) in sorted {
        dataset = match key.as_str() {
            SITE_CODE => dataset.with_site_code(value.as_str()),
            INSTRUMENT => dataset.with_instrument(value.as_str()),
            DEPLOYMENT_START | DEPLOYMENT_END => dataset,
            // arrow's own schema blob
            "ARROW:schema" => dataset,
            _ => dataset.with_meta(key.as_str(), parse_scalar(value)),
        };
    }
    if let (Some(start), Some(end)) = (metadata.get(DEPLOYMENT_START), metadata.get(DEPLOYMENT_END)) {
        dataset = dataset.with_deployment(
            parse_time(DEPLOYMENT_START, start)?,
            parse_time(DEPLOYMENT_END, end)?,
        );
    }
    Ok(dataset)
}

fn schema_metadata(dataset: &Dataset) -> HashMap<String, String> {
    let mut metadata: HashMap<String, String> = dataset
        .metadata()
        .iter()
        .map(|(k, v)| (k.clone(), v.to_string()))
        .collect();
    if let Some(site) = dataset.site_code() {
        metadata.insert(SITE_CODE.to_string(), site.to_string());
    }
    if let Some(instrument) = dataset.instrument() {
        metadata.insert(INSTRUMENT.to_string(), instrument.to_string());
    }
    if let Some(deployment) = dataset.deployment() {
        metadata.insert(DEPLOYMENT_START.to_string(), deployment.start.to_rfc3339());
        metadata.insert(DEPLOYMENT_END.to_string(), deployment.end.to_rfc3339());
    }
    metadata
}
