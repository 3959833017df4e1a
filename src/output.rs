//! Result types: per-record outcomes, batch statistics, the failure report
//! and the final artifact.

use crate::error::{RecordError, RecordErrorKind};
use crate::feed::Record;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The result of attempting one record.
///
/// Exactly one outcome exists per input record, in input order.
#[derive(Debug, Clone)]
pub enum ProcessingOutcome {
    /// The attachment resolved to one or more RGB images (pages in order).
    Success {
        record: Record,
        images: Vec<DynamicImage>,
    },
    /// Resolution failed; the batch carried on.
    Failure { record: Record, error: RecordError },
}

impl ProcessingOutcome {
    pub fn record(&self) -> &Record {
        match self {
            ProcessingOutcome::Success { record, .. } | ProcessingOutcome::Failure { record, .. } => {
                record
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessingOutcome::Success { .. })
    }

    pub fn images(&self) -> &[DynamicImage] {
        match self {
            ProcessingOutcome::Success { images, .. } => images,
            ProcessingOutcome::Failure { .. } => &[],
        }
    }

    pub fn error(&self) -> Option<&RecordError> {
        match self {
            ProcessingOutcome::Success { .. } => None,
            ProcessingOutcome::Failure { error, .. } => Some(error),
        }
    }
}

/// Aggregate numbers for one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    pub total_records: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Images across all successful records (pages count individually).
    pub total_images: usize,
    pub duration_ms: u64,
}

/// Everything the batch runner produced.
#[derive(Debug, Clone)]
pub struct BatchOutput {
    pub outcomes: Vec<ProcessingOutcome>,
    pub stats: BatchStats,
}

impl BatchOutput {
    pub fn failure_report(&self) -> FailureReport {
        FailureReport::from_outcomes(&self.outcomes)
    }
}

/// One failed record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEntry {
    pub row_index: u32,
    pub expense_id: String,
    pub report_id: String,
    pub kind: RecordErrorKind,
    pub error: RecordError,
}

impl FailureEntry {
    pub fn new(record: &Record, error: &RecordError) -> Self {
        Self {
            row_index: record.row_index,
            expense_id: record.expense_id.clone(),
            report_id: record.report_id.clone(),
            kind: error.kind(),
            error: error.clone(),
        }
    }
}

/// Itemised failures, one line per record, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureReport {
    pub entries: Vec<FailureEntry>,
}

impl FailureReport {
    pub fn from_outcomes(outcomes: &[ProcessingOutcome]) -> Self {
        Self {
            entries: outcomes
                .iter()
                .filter_map(|o| match o {
                    ProcessingOutcome::Failure { record, error } => {
                        Some(FailureEntry::new(record, error))
                    }
                    ProcessingOutcome::Success { .. } => None,
                })
                .collect(),
        }
    }

    pub fn push(&mut self, entry: FailureEntry) {
        self.entries.push(entry);
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for e in &self.entries {
            writeln!(
                f,
                "Linha {} | Despesa: {} | Relatório: {} → {}",
                e.row_index, e.expense_id, e.report_id, e.error
            )?;
        }
        Ok(())
    }
}

/// A downloadable file.
#[derive(Debug, Clone)]
pub struct Artifact {
    /// File name including extension, e.g. `anexos_ordenados.docx`.
    pub file_name: String,
    pub mime_type: &'static str,
    pub bytes: Vec<u8>,
}

/// What an export call hands back to the caller.
#[derive(Debug, Clone)]
pub struct EvidenceOutput {
    pub artifact: Artifact,
    pub failures: FailureReport,
    pub stats: BatchStats,
}
