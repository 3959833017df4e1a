//! Batch runner: resolve and normalise every record, in order, isolating
//! failures.
//!
//! Records are processed strictly one after another. A fetch timeout, a
//! malformed PDF or a blank image on record K becomes a
//! [`ProcessingOutcome::Failure`] and record K+1 is processed as usual.
//! Only the manual-image precondition (document mode) and HTTP client
//! construction can abort a run, and both happen before the first record is
//! touched. In archive mode a record with neither link nor manual image is
//! an ordinary `MissingAttachment` failure.

use crate::config::{EvidenceConfig, OutputMode};
use crate::error::{EvidenceError, RecordError};
use crate::feed::{ManualOverrides, Record};
use crate::output::{BatchOutput, BatchStats, ProcessingOutcome};
use crate::pipeline::normalize::{self, RenderSettings};
use crate::pipeline::resolve;
use image::DynamicImage;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// Process every record and return one outcome per record, in input order.
///
/// # Errors
/// Returns `Err(EvidenceError)` only for fatal conditions:
/// - document mode only: a link-less record has no manual image
///   ([`EvidenceError::MissingAttachment`])
/// - the HTTP client cannot be built
pub async fn run_batch(
    records: &[Record],
    overrides: &ManualOverrides,
    config: &EvidenceConfig,
) -> Result<BatchOutput, EvidenceError> {
    let start = Instant::now();

    // ── Step 1: Precondition ─────────────────────────────────────────────
    if config.mode == OutputMode::Document {
        overrides.validate(records)?;
    }

    // ── Step 2: One client for the whole batch ───────────────────────────
    let client = resolve::build_client(config.fetch_timeout_secs)?;
    let render = RenderSettings {
        rasterizer: Arc::clone(&config.rasterizer),
        dpi: config.dpi,
        max_pixels: config.max_rendered_pixels,
    };

    info!("Processing {} records", records.len());
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(records.len());
    }

    // ── Step 3: Records, one at a time ───────────────────────────────────
    let mut outcomes = Vec::with_capacity(records.len());
    for record in records {
        if let Some(ref cb) = config.progress_callback {
            cb.on_record_start(record);
        }

        let outcome = match process_record(record, overrides, &client, &render, config).await {
            Ok(images) => {
                info!(
                    "Row {}: expense {} / report {} → {} image(s)",
                    record.row_index,
                    record.expense_id,
                    record.report_id,
                    images.len()
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_record_complete(record, images.len());
                }
                ProcessingOutcome::Success {
                    record: record.clone(),
                    images,
                }
            }
            Err(error) => {
                warn!(
                    "Row {}: expense {} / report {} failed: {}",
                    record.row_index, record.expense_id, record.report_id, error
                );
                if let Some(ref cb) = config.progress_callback {
                    cb.on_record_error(record, &error);
                }
                ProcessingOutcome::Failure {
                    record: record.clone(),
                    error,
                }
            }
        };
        outcomes.push(outcome);
    }

    // ── Step 4: Stats ────────────────────────────────────────────────────
    let succeeded = outcomes.iter().filter(|o| o.is_success()).count();
    let stats = BatchStats {
        total_records: outcomes.len(),
        succeeded,
        failed: outcomes.len() - succeeded,
        total_images: outcomes.iter().map(|o| o.images().len()).sum(),
        duration_ms: start.elapsed().as_millis() as u64,
    };

    info!(
        "Batch complete: {}/{} records, {} images, {}ms",
        stats.succeeded, stats.total_records, stats.total_images, stats.duration_ms
    );
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(stats.total_records, stats.succeeded);
    }

    Ok(BatchOutput { outcomes, stats })
}

async fn process_record(
    record: &Record,
    overrides: &ManualOverrides,
    client: &reqwest::Client,
    render: &RenderSettings,
    config: &EvidenceConfig,
) -> Result<Vec<DynamicImage>, RecordError> {
    let payload = resolve::resolve(record, overrides, client, config.fetch_timeout_secs).await?;
    normalize::normalize(payload, render).await
}
