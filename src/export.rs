//! Top-level export entry points.
//!
//! [`export`] runs the batch and turns its outcomes into one artifact,
//! chosen by [`OutputMode`]:
//!
//! * `Document`: one `.docx` with a page per image and an error line per
//!   failed record.
//! * `Archive`: one `.zip` holding `imagens_part{N}.zip` sub-archives of at
//!   most `archive_capacity_bytes` of images each.
//!
//! Either way the failures are returned next to the artifact.

use crate::archive::{collect_entries, pack_archives};
use crate::batch::run_batch;
use crate::config::{EvidenceConfig, OutputMode};
use crate::document::{assemble_document, DOCX_MIME};
use crate::error::EvidenceError;
use crate::feed::{xlsx, ManualOverrides, Record};
use crate::output::{Artifact, BatchOutput, BatchStats, EvidenceOutput};
use std::path::Path;
use tracing::info;

pub const ZIP_MIME: &str = "application/zip";

/// Process `records` and build the artifact selected by `config.mode`.
///
/// # Errors
/// - [`EvidenceError::EmptyFeed`] when `records` is empty
/// - [`EvidenceError::MissingAttachment`] in document mode when a link-less
///   record has no manual image; nothing is fetched in that case
/// - [`EvidenceError::NoImagesProcessed`] in archive mode when no record
///   produced an image
pub async fn export(
    records: &[Record],
    overrides: &ManualOverrides,
    config: &EvidenceConfig,
) -> Result<EvidenceOutput, EvidenceError> {
    if records.is_empty() {
        return Err(EvidenceError::EmptyFeed);
    }

    let batch = run_batch(records, overrides, config).await?;
    match config.mode {
        OutputMode::Document => export_document(batch, config),
        OutputMode::Archive => export_archive(batch, config),
    }
}

/// Build the Word document from a finished batch.
pub fn export_document(
    batch: BatchOutput,
    config: &EvidenceConfig,
) -> Result<EvidenceOutput, EvidenceError> {
    let bytes = assemble_document(&batch.outcomes, &config.layout)?;
    let failures = batch.failure_report();

    info!(
        "Document ready: {} bytes, {} failure(s)",
        bytes.len(),
        failures.len()
    );
    Ok(EvidenceOutput {
        artifact: Artifact {
            file_name: format!("{}.docx", config.document_name),
            mime_type: DOCX_MIME,
            bytes,
        },
        failures,
        stats: batch.stats,
    })
}

/// Build the archive container from a finished batch.
///
/// A record whose images cannot be PNG-encoded is reported as a failure, so
/// the returned stats count it as failed too.
pub fn export_archive(
    batch: BatchOutput,
    config: &EvidenceConfig,
) -> Result<EvidenceOutput, EvidenceError> {
    let (entries, failures) = collect_entries(&batch.outcomes);
    if entries.is_empty() {
        return Err(EvidenceError::NoImagesProcessed {
            failed: failures.len(),
        });
    }

    let bytes = pack_archives(&entries, config.archive_capacity_bytes)?;
    info!(
        "Archive ready: {} entries, {} bytes, {} failure(s)",
        entries.len(),
        bytes.len(),
        failures.len()
    );
    Ok(EvidenceOutput {
        artifact: Artifact {
            file_name: format!("{}.zip", config.archive_name),
            mime_type: ZIP_MIME,
            bytes,
        },
        stats: BatchStats {
            succeeded: batch.stats.total_records.saturating_sub(failures.len()),
            failed: failures.len(),
            total_images: entries.len(),
            ..batch.stats
        },
        failures,
    })
}

/// Read an `.xlsx` feed and export it.
pub async fn export_spreadsheet(
    path: impl AsRef<Path>,
    overrides: &ManualOverrides,
    config: &EvidenceConfig,
) -> Result<EvidenceOutput, EvidenceError> {
    let records = xlsx::read_feed(path, &config.columns)?;
    export(&records, overrides, config).await
}

/// Export and write the artifact to `output_path`.
///
/// The file is written to a sibling temp file first and renamed into place,
/// so a crash never leaves a truncated artifact behind.
pub async fn export_to_file(
    records: &[Record],
    overrides: &ManualOverrides,
    output_path: impl AsRef<Path>,
    config: &EvidenceConfig,
) -> Result<EvidenceOutput, EvidenceError> {
    let output = export(records, overrides, config).await?;
    write_atomic(output_path.as_ref(), &output.artifact.bytes).await?;
    Ok(output)
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), EvidenceError> {
    let fail = |e| EvidenceError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent).await.map_err(fail)?;
    }

    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    tokio::fs::write(&tmp_path, bytes).await.map_err(fail)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(fail)?;
    Ok(())
}

/// Synchronous wrapper around [`export`].
///
/// Creates a temporary tokio runtime internally.
pub fn export_sync(
    records: &[Record],
    overrides: &ManualOverrides,
    config: &EvidenceConfig,
) -> Result<EvidenceOutput, EvidenceError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| EvidenceError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(export(records, overrides, config))
}
