//! Configuration types for an evidence run.
//!
//! All behaviour is controlled through [`EvidenceConfig`], built via its
//! [`EvidenceConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share a config between the CLI and library callers and to log
//! exactly what a run used.

use crate::error::EvidenceError;
use crate::feed::FeedColumns;
use crate::pipeline::render::{PageRasterizer, PdfiumRasterizer};
use crate::progress::ProgressCallback;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// 200 MiB — the per-sub-archive ceiling.
pub const DEFAULT_ARCHIVE_CAPACITY: u64 = 200 * 1024 * 1024;

/// Configuration for an evidence run.
///
/// # Example
/// ```rust
/// use expense_evidence::{EvidenceConfig, OutputMode};
///
/// let config = EvidenceConfig::builder()
///     .mode(OutputMode::Archive)
///     .fetch_timeout_secs(30)
///     .build()
///     .unwrap();
/// assert_eq!(config.dpi, 150);
/// ```
#[derive(Clone)]
pub struct EvidenceConfig {
    /// Which artifact to produce. Default: [`OutputMode::Document`].
    pub mode: OutputMode,

    /// Rendering DPI for PDF attachments. Range: 72–400. Default: 150.
    pub dpi: u32,

    /// Cap on either edge of a rendered PDF page, in pixels. Default: 4000.
    ///
    /// An A0 scan at 150 DPI is ~5000 × 7000 px; the cap keeps one page from
    /// dominating memory.
    pub max_rendered_pixels: u32,

    /// Budget for one attachment download, in seconds. Default: 20.
    pub fetch_timeout_secs: u64,

    /// Maximum summed entry size of one sub-archive, in bytes. Default: 200 MiB.
    pub archive_capacity_bytes: u64,

    /// Picture and header layout of the Word document.
    pub layout: DocumentLayout,

    /// Header names of the input spreadsheet.
    pub columns: FeedColumns,

    /// Base name of the Word artifact. Default: `anexos_ordenados`.
    pub document_name: String,

    /// Base name of the archive artifact. Default: `imagens_compactadas`.
    pub archive_name: String,

    /// Per-record progress events.
    pub progress_callback: Option<ProgressCallback>,

    /// PDF page rasteriser. Default: [`PdfiumRasterizer`].
    pub rasterizer: Arc<dyn PageRasterizer>,
}

impl Default for EvidenceConfig {
    fn default() -> Self {
        Self {
            mode: OutputMode::default(),
            dpi: 150,
            max_rendered_pixels: 4000,
            fetch_timeout_secs: 20,
            archive_capacity_bytes: DEFAULT_ARCHIVE_CAPACITY,
            layout: DocumentLayout::default(),
            columns: FeedColumns::default(),
            document_name: "anexos_ordenados".to_string(),
            archive_name: "imagens_compactadas".to_string(),
            progress_callback: None,
            rasterizer: Arc::new(PdfiumRasterizer),
        }
    }
}

impl fmt::Debug for EvidenceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvidenceConfig")
            .field("mode", &self.mode)
            .field("dpi", &self.dpi)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("fetch_timeout_secs", &self.fetch_timeout_secs)
            .field("archive_capacity_bytes", &self.archive_capacity_bytes)
            .field("layout", &self.layout)
            .field("columns", &self.columns)
            .field("document_name", &self.document_name)
            .field("archive_name", &self.archive_name)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl EvidenceConfig {
    /// Create a new builder for `EvidenceConfig`.
    pub fn builder() -> EvidenceConfigBuilder {
        EvidenceConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`EvidenceConfig`].
#[derive(Debug)]
pub struct EvidenceConfigBuilder {
    config: EvidenceConfig,
}

impl EvidenceConfigBuilder {
    pub fn mode(mut self, mode: OutputMode) -> Self {
        self.config.mode = mode;
        self
    }

    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 400);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn fetch_timeout_secs(mut self, secs: u64) -> Self {
        self.config.fetch_timeout_secs = secs;
        self
    }

    pub fn archive_capacity_bytes(mut self, bytes: u64) -> Self {
        self.config.archive_capacity_bytes = bytes;
        self
    }

    pub fn layout(mut self, layout: DocumentLayout) -> Self {
        self.config.layout = layout;
        self
    }

    pub fn columns(mut self, columns: FeedColumns) -> Self {
        self.config.columns = columns;
        self
    }

    pub fn document_name(mut self, name: impl Into<String>) -> Self {
        self.config.document_name = name.into();
        self
    }

    pub fn archive_name(mut self, name: impl Into<String>) -> Self {
        self.config.archive_name = name.into();
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.config.rasterizer = rasterizer;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EvidenceConfig, EvidenceError> {
        let c = &self.config;
        if c.fetch_timeout_secs == 0 {
            return Err(EvidenceError::InvalidConfig(
                "Fetch timeout must be ≥ 1 second".into(),
            ));
        }
        if c.archive_capacity_bytes == 0 {
            return Err(EvidenceError::InvalidConfig(
                "Archive capacity must be ≥ 1 byte".into(),
            ));
        }
        let l = &c.layout;
        if !(l.max_width_in > 0.0 && l.max_height_in > 0.0 && l.upscale > 0.0) {
            return Err(EvidenceError::InvalidConfig(format!(
                "Picture bounds must be positive, got {}×{} in (×{})",
                l.max_width_in, l.max_height_in, l.upscale
            )));
        }
        if c.document_name.trim().is_empty() || c.archive_name.trim().is_empty() {
            return Err(EvidenceError::InvalidConfig(
                "Artifact names must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}

// ── Enums & layout ───────────────────────────────────────────────────────

/// Which artifact a run produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum OutputMode {
    /// One Word document, one block per record. (default)
    #[default]
    Document,
    /// A ZIP of size-bounded ZIPs holding the extracted images.
    Archive,
}

/// Page layout of the Word document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentLayout {
    /// Picture width bound, inches. Default: 5.5.
    pub max_width_in: f64,
    /// Picture height bound, inches. Default: 7.
    pub max_height_in: f64,
    /// Factor applied after fitting. Default: 1.1.
    pub upscale: f64,
    /// Header and error-line typeface. Default: Arial.
    pub font: String,
    /// Header and error-line size, points. Default: 12.
    pub font_size_pt: u32,
}

impl Default for DocumentLayout {
    fn default() -> Self {
        Self {
            max_width_in: 5.5,
            max_height_in: 7.0,
            upscale: 1.1,
            font: "Arial".to_string(),
            font_size_pt: 12,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let c = EvidenceConfig::default();
        assert_eq!(c.mode, OutputMode::Document);
        assert_eq!(c.dpi, 150);
        assert_eq!(c.fetch_timeout_secs, 20);
        assert_eq!(c.archive_capacity_bytes, 200 * 1024 * 1024);
        assert_eq!(c.document_name, "anexos_ordenados");
        assert_eq!(c.archive_name, "imagens_compactadas");
        assert_eq!(c.layout.font, "Arial");
    }

    #[test]
    fn builder_clamps_dpi() {
        let c = EvidenceConfig::builder().dpi(10).build().unwrap();
        assert_eq!(c.dpi, 72);
        let c = EvidenceConfig::builder().dpi(1200).build().unwrap();
        assert_eq!(c.dpi, 400);
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let err = EvidenceConfig::builder()
            .archive_capacity_bytes(0)
            .build()
            .unwrap_err();
        assert!(matches!(err, EvidenceError::InvalidConfig(_)));
    }

    #[test]
    fn zero_timeout_is_rejected() {
        assert!(EvidenceConfig::builder().fetch_timeout_secs(0).build().is_err());
    }

    #[test]
    fn non_positive_layout_is_rejected() {
        let layout = DocumentLayout {
            max_width_in: 0.0,
            ..DocumentLayout::default()
        };
        assert!(EvidenceConfig::builder().layout(layout).build().is_err());
    }

    #[test]
    fn debug_hides_callback_internals() {
        let s = format!("{:?}", EvidenceConfig::default());
        assert!(s.contains("fetch_timeout_secs: 20"));
        assert!(s.contains("progress_callback: None"));
    }
}
