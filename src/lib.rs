//! # expense-evidence
//!
//! Assemble the evidence for an expense report: every attachment linked from
//! a spreadsheet, fetched, turned into images and delivered either as one
//! Word document or as a ZIP of size-bounded ZIPs.
//!
//! ## Pipeline Overview
//!
//! ```text
//! .xlsx
//!  │
//!  ├─ 1. Feed      header check, one Record per row (hyperlink target)
//!  ├─ 2. Resolve   GET the link once, or take the manual image
//!  ├─ 3. Normalise decode to RGB, blank check, PDF pages via pdfium
//!  ├─ 4. Batch     strictly sequential, per-record failures isolated
//!  └─ 5. Output    .docx (page per image)  or  .zip of imagens_partN.zip
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use expense_evidence::{export, read_feed, EvidenceConfig, ManualOverrides};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EvidenceConfig::default();
//!     let records = read_feed("relatorio.xlsx", &config.columns)?;
//!
//!     let mut overrides = ManualOverrides::new();
//!     for record in overrides.missing(&records) {
//!         eprintln!("row {} needs a manual image", record.row_index);
//!     }
//!     overrides.insert(7, std::fs::read("recibo_linha7.jpg")?);
//!
//!     let output = export(&records, &overrides, &config).await?;
//!     std::fs::write(&output.artifact.file_name, &output.artifact.bytes)?;
//!     eprint!("{}", output.failures);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `evidencias` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! expense-evidence = { version = "0.1", default-features = false }
//! ```
//!
//! ## PDF rendering
//!
//! PDF attachments are rasterised with pdfium. The library is looked up in
//! `PDFIUM_LIB_PATH` first, then on the system library path. When it cannot
//! be loaded, PDF records fail with `RendererUnavailable` and image records
//! are unaffected.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod archive;
pub mod batch;
pub mod config;
pub mod document;
pub mod error;
pub mod export;
pub mod feed;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::run_batch;
pub use config::{DocumentLayout, EvidenceConfig, EvidenceConfigBuilder, OutputMode};
pub use error::{EvidenceError, RecordError, RecordErrorKind};
pub use export::{export, export_spreadsheet, export_sync, export_to_file};
pub use feed::xlsx::{read_feed, read_feed_from_bytes};
pub use feed::{FeedColumns, ManualOverrides, Record};
pub use output::{
    Artifact, BatchOutput, BatchStats, EvidenceOutput, FailureEntry, FailureReport,
    ProcessingOutcome,
};
pub use pipeline::render::{PageRasterizer, PdfiumRasterizer};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
