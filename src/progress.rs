//! Progress-callback trait for per-record batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::EvidenceConfigBuilder::progress_callback`] to receive an
//! event as the batch runner finishes each record. The runner behaves the
//! same with or without a listener.
//!
//! # Example
//!
//! ```rust
//! use expense_evidence::{BatchProgressCallback, EvidenceConfig, Record};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     done: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_record_complete(&self, record: &Record, image_count: usize) {
//!         let n = self.done.fetch_add(1, Ordering::SeqCst) + 1;
//!         eprintln!("#{n}: row {} ({} images)", record.row_index, image_count);
//!     }
//! }
//!
//! let cb = Arc::new(CountingCallback { done: AtomicUsize::new(0) });
//! let config = EvidenceConfig::builder()
//!     .progress_callback(cb as Arc<dyn BatchProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use crate::error::RecordError;
use crate::feed::Record;
use std::sync::Arc;

/// Called by the batch runner as it processes each record.
///
/// All methods have default no-op implementations so callers only override
/// what they care about. Records are processed one at a time, but the trait
/// is `Send + Sync` so a callback can be shared with the rest of the host
/// application.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once, after the manual-image precondition passed.
    fn on_batch_start(&self, total_records: usize) {
        let _ = total_records;
    }

    /// Called before a record's attachment is resolved.
    fn on_record_start(&self, record: &Record) {
        let _ = record;
    }

    /// Called when a record produced its images.
    fn on_record_complete(&self, record: &Record, image_count: usize) {
        let _ = (record, image_count);
    }

    /// Called when a record failed; the batch continues.
    fn on_record_error(&self, record: &Record, error: &RecordError) {
        let _ = (record, error);
    }

    /// Called once after every record has been attempted.
    fn on_batch_complete(&self, total_records: usize, success_count: usize) {
        let _ = (total_records, success_count);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::EvidenceConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
