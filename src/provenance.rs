//! Provenance log and batch summaries
//!
//! ```text
//! BatchSummary (1) ──< DatasetOutcome (N)
//! QcRun ── ProvenanceLog ──< ProvenanceRecord (N)  [append-only, run order]
//! ```

use crate::flags::QualityFlag;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;

/// How many samples one (test, variable) invocation moved to one flag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceRecord {
    /// Test name
    pub test: String,
    /// Variable name
    pub variable: String,
    /// Flag the samples now carry
    pub flag: QualityFlag,
    /// Samples whose flag changed to `flag`
    pub count: usize,
    /// Free-text parameter string reported by the test
    pub parameters: String,
}

/// Append-only record of one QC run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvenanceLog {
    records: Vec<ProvenanceRecord>,
}

impl ProvenanceLog {
    /// Empty log.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record.
    pub fn push(&mut self, record: ProvenanceRecord) {
        self.records.push(record);
    }

    /// Records in append order.
    #[must_use]
    pub fn records(&self) -> &[ProvenanceRecord] {
        &self.records
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records produced by `test`.
    pub fn for_test<'a>(&'a self, test: &'a str) -> impl Iterator<Item = &'a ProvenanceRecord> {
        self.records.iter().filter(move |r| r.test == test)
    }

    /// Records about `variable`.
    pub fn for_variable<'a>(
        &'a self,
        variable: &'a str,
    ) -> impl Iterator<Item = &'a ProvenanceRecord> {
        self.records.iter().filter(move |r| r.variable == variable)
    }

    /// Total samples moved to `flag` across the run.
    #[must_use]
    pub fn total(&self, flag: QualityFlag) -> usize {
        self.records
            .iter()
            .filter(|r| r.flag == flag)
            .map(|r| r.count)
            .sum()
    }

    /// Human-readable processing report.
    #[must_use]
    pub fn render_report(&self) -> String {
        let mut out = String::new();
        let mut current: Option<(&str, &str)> = None;
        for record in &self.records {
            let key = (record.test.as_str(), record.variable.as_str());
            if current != Some(key) {
                let _ = writeln!(out, "{} on {}", record.test, record.variable);
                if !record.parameters.is_empty() {
                    let _ = writeln!(out, "  parameters: {}", record.parameters);
                }
                current = Some(key);
            }
            let _ = writeln!(out, "  {:>6} samples -> {}", record.count, record.flag);
        }
        out
    }
}

/// Final state of one dataset in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetStatus {
    /// Every test ran
    Completed,
    /// A fatal error aborted the remaining tests
    Failed,
}

/// Where and why a dataset was aborted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Failing test, if known
    pub test: Option<String>,
    /// Failing variable, if known
    pub variable: Option<String>,
    /// Error message
    pub message: String,
}

/// Outcome of one dataset in a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetOutcome {
    /// Dataset identifier
    pub dataset_id: String,
    /// Final status
    pub status: DatasetStatus,
    /// When QC started
    pub started_at: DateTime<Utc>,
    /// When QC finished or aborted
    pub ended_at: DateTime<Utc>,
    /// Number of provenance records produced
    pub records: usize,
    /// Failure details when `status == Failed`
    pub failure: Option<Failure>,
}

impl DatasetOutcome {
    /// Outcome for an input that could not be read, so no test ran.
    #[must_use]
    pub fn unreadable(dataset_id: impl Into<String>, message: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            dataset_id: dataset_id.into(),
            status: DatasetStatus::Failed,
            started_at: now,
            ended_at: now,
            records: 0,
            failure: Some(Failure {
                test: None,
                variable: None,
                message: message.into(),
            }),
        }
    }
}

/// Job-level summary of a batch run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    outcomes: Vec<DatasetOutcome>,
}

impl BatchSummary {
    /// Empty summary.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an outcome.
    pub fn push(&mut self, outcome: DatasetOutcome) {
        self.outcomes.push(outcome);
    }

    /// Outcomes in input order.
    #[must_use]
    pub fn outcomes(&self) -> &[DatasetOutcome] {
        &self.outcomes
    }

    /// Number of completed datasets.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(DatasetStatus::Completed)
    }

    /// Number of failed datasets.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.count(DatasetStatus::Failed)
    }

    fn count(&self, status: DatasetStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(test: &str, variable: &str, flag: QualityFlag, count: usize) -> ProvenanceRecord {
        ProvenanceRecord {
            test: test.to_string(),
            variable: variable.to_string(),
            flag,
            count,
            parameters: "k=1.5".to_string(),
        }
    }

    #[test]
    fn test_log_queries() {
        let mut log = ProvenanceLog::new();
        log.push(record("global_range", "TEMP", QualityFlag::Good, 3));
        log.push(record("global_range", "TEMP", QualityFlag::Bad, 1));
        log.push(record("spike_tukey", "PSAL", QualityFlag::Spike, 2));

        assert_eq!(log.len(), 3);
        assert_eq!(log.for_test("global_range").count(), 2);
        assert_eq!(log.for_variable("PSAL").count(), 1);
        assert_eq!(log.total(QualityFlag::Good), 3);
    }

    #[test]
    fn test_report_groups_invocations() {
        let mut log = ProvenanceLog::new();
        log.push(record("global_range", "TEMP", QualityFlag::Good, 3));
        log.push(record("global_range", "TEMP", QualityFlag::Bad, 1));
        let report = log.render_report();
        assert_eq!(report.matches("global_range on TEMP").count(), 1);
        assert!(report.contains("parameters: k=1.5"));
        assert!(report.contains("1 samples -> bad"));
    }

    #[test]
    fn test_log_serializes() {
        let mut log = ProvenanceLog::new();
        log.push(record("spike_tukey", "PSAL", QualityFlag::Spike, 2));
        let json = serde_json::to_string(&log).unwrap();
        assert!(json.contains("\"flag\":\"spike\""));
        let back: ProvenanceLog = serde_json::from_str(&json).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_batch_counts() {
        let now = Utc::now();
        let mut summary = BatchSummary::new();
        for (id, status) in [("a", DatasetStatus::Completed), ("b", DatasetStatus::Failed)] {
            summary.push(DatasetOutcome {
                dataset_id: id.to_string(),
                status,
                started_at: now,
                ended_at: now,
                records: 0,
                failure: None,
            });
        }
        assert_eq!(summary.completed(), 1);
        assert_eq!(summary.failed(), 1);
    }
}
