//! Error types for the expense-evidence library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`EvidenceError`] — **Fatal**: the run cannot proceed at all (the
//!   spreadsheet lacks a required column, a manual image is still missing,
//!   the output cannot be written). Returned as `Err(EvidenceError)` from the
//!   top-level `export*` and [`crate::batch::run_batch`] functions.
//!
//! * [`RecordError`] — **Non-fatal**: a single record failed (HTTP 500,
//!   malformed PDF, blank image) but every other record is fine. Stored inside
//!   [`crate::output::ProcessingOutcome::Failure`] so the batch keeps going
//!   and the failure is reported next to the artifact.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the expense-evidence library.
///
/// Record-level failures use [`RecordError`] and never surface here.
#[derive(Debug, Error)]
pub enum EvidenceError {
    // ── Feed errors ───────────────────────────────────────────────────────
    /// The header row lacks one or more required columns.
    #[error("The spreadsheet must contain the columns {}; missing: {}", quoted(.required), quoted(.missing))]
    FeedValidation {
        required: Vec<String>,
        missing: Vec<String>,
    },

    /// The feed has a header row but no records.
    #[error("No records found in the spreadsheet")]
    EmptyFeed,

    /// The spreadsheet could not be opened or parsed.
    #[error("Failed to read spreadsheet '{path}': {detail}")]
    SpreadsheetRead { path: PathBuf, detail: String },

    // ── Precondition errors ───────────────────────────────────────────────
    /// One or more records have no attachment link and no manual image.
    #[error("Waiting for manual images for rows {rows:?} before processing can start")]
    MissingAttachment { rows: Vec<u32> },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Archive mode produced no images at all.
    #[error("No image was processed; {failed} record(s) failed")]
    NoImagesProcessed { failed: usize },

    /// The HTTP client could not be constructed.
    #[error("Failed to initialise HTTP client: {0}")]
    HttpClient(String),

    /// Writing a ZIP container failed.
    #[error("Failed to write archive '{name}': {detail}")]
    ArchiveWrite { name: String, detail: String },

    /// Writing the Word document package failed.
    #[error("Failed to write document: {0}")]
    DocumentWrite(String),

    /// Could not create or write the output file.
    #[error("Failed to write output file '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

fn quoted(names: &[String]) -> String {
    names
        .iter()
        .map(|n| format!("'{n}'"))
        .collect::<Vec<_>>()
        .join(", ")
}

/// A non-fatal error for a single record.
///
/// Carried by [`crate::output::ProcessingOutcome::Failure`] and by the
/// [`crate::output::FailureReport`].
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum RecordError {
    /// No link and no manual image for this row.
    #[error("row {row}: attachment link missing and no manual image supplied")]
    MissingAttachment { row: u32 },

    /// The server answered with a non-success status.
    #[error("HTTP {status} fetching '{url}'")]
    FetchStatus { url: String, status: u16 },

    /// The request exceeded the fetch budget.
    #[error("timed out after {secs}s fetching '{url}'")]
    FetchTimeout { url: String, secs: u64 },

    /// Connection, TLS or body-read failure.
    #[error("failed to fetch '{url}': {reason}")]
    FetchFailed { url: String, reason: String },

    /// The payload was declared as a PDF but could not be parsed.
    #[error("could not read PDF attachment: {detail}")]
    DocumentDecode { detail: String },

    /// The pdfium library could not be loaded.
    #[error("PDF renderer unavailable: {detail}")]
    RendererUnavailable { detail: String },

    /// The payload is not a decodable image.
    #[error("could not decode image: {detail}")]
    ImageDecode { detail: String },

    /// A decoded image could not be re-encoded for output.
    #[error("could not encode image: {detail}")]
    ImageEncode { detail: String },

    /// The image is a single uniform colour.
    #[error("image appears to be blank ({width}x{height} px of a single colour)")]
    BlankImage { width: u32, height: u32 },
}

/// Coarse classification of [`RecordError`], convenient for assertions and
/// summaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RecordErrorKind {
    MissingAttachment,
    Fetch,
    DocumentDecode,
    ImageDecode,
    BlankImage,
}

impl RecordError {
    pub fn kind(&self) -> RecordErrorKind {
        match self {
            RecordError::MissingAttachment { .. } => RecordErrorKind::MissingAttachment,
            RecordError::FetchStatus { .. }
            | RecordError::FetchTimeout { .. }
            | RecordError::FetchFailed { .. } => RecordErrorKind::Fetch,
            RecordError::DocumentDecode { .. } | RecordError::RendererUnavailable { .. } => {
                RecordErrorKind::DocumentDecode
            }
            RecordError::ImageDecode { .. } | RecordError::ImageEncode { .. } => {
                RecordErrorKind::ImageDecode
            }
            RecordError::BlankImage { .. } => RecordErrorKind::BlankImage,
        }
    }
}
