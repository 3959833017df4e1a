//! PDF rasterisation: render every page of an attachment to a
//! `DynamicImage` via pdfium.
//!
//! pdfium wraps a C++ library with thread-local state, so the batch runner
//! calls [`PageRasterizer::rasterize`] inside `spawn_blocking` and awaits it
//! before moving on.
//!
//! The [`PageRasterizer`] trait is the seam that lets callers (and tests)
//! supply another backend.

use crate::error::RecordError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info, warn};

/// Environment variable naming an explicit pdfium shared library.
pub const PDFIUM_LIB_PATH_ENV: &str = "PDFIUM_LIB_PATH";

/// PDF points per inch.
const POINTS_PER_INCH: f32 = 72.0;

/// Turns a paginated document into one image per page, in page order.
pub trait PageRasterizer: Send + Sync {
    /// Rasterise every page of `bytes` at `dpi`, capping each edge at
    /// `max_pixels`.
    fn rasterize(
        &self,
        bytes: &[u8],
        dpi: u32,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, RecordError>;
}

/// The default rasteriser, backed by pdfium-render.
#[derive(Debug, Clone, Copy, Default)]
pub struct PdfiumRasterizer;

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(
        &self,
        bytes: &[u8],
        dpi: u32,
        max_pixels: u32,
    ) -> Result<Vec<DynamicImage>, RecordError> {
        let pdfium = bind_pdfium()?;

        let document = pdfium
            .load_pdf_from_byte_slice(bytes, None)
            .map_err(|e| RecordError::DocumentDecode {
                detail: format!("{:?}", e),
            })?;

        let pages = document.pages();
        info!("PDF loaded: {} pages", pages.len());

        let render_config = PdfRenderConfig::new()
            .scale_page_by_factor(dpi as f32 / POINTS_PER_INCH)
            .set_maximum_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let mut images = Vec::with_capacity(pages.len() as usize);
        for (idx, page) in pages.iter().enumerate() {
            if let Some(effective) =
                capped_dpi(page.width().value, page.height().value, dpi, max_pixels)
            {
                warn!(
                    "Page {} capped at {} px: rendered at {:.0} DPI instead of {}",
                    idx + 1,
                    max_pixels,
                    effective,
                    dpi
                );
            }
            let bitmap = page.render_with_config(&render_config).map_err(|e| {
                RecordError::DocumentDecode {
                    detail: format!("page {}: {:?}", idx + 1, e),
                }
            })?;

            let image = bitmap.as_image();
            debug!(
                "Rendered page {} → {}x{} px",
                idx + 1,
                image.width(),
                image.height()
            );
            images.push(image);
        }

        if images.is_empty() {
            return Err(RecordError::DocumentDecode {
                detail: "document has no pages".to_string(),
            });
        }

        Ok(images)
    }
}

/// Effective DPI of a page whose longest edge at `dpi` exceeds
/// `max_pixels`, or `None` when the page renders at full resolution.
fn capped_dpi(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> Option<f32> {
    let longest_px = width_pt.max(height_pt) * dpi as f32 / POINTS_PER_INCH;
    (longest_px > max_pixels as f32).then(|| dpi as f32 * max_pixels as f32 / longest_px)
}

/// Bind pdfium from `PDFIUM_LIB_PATH` when set, else from the system
/// library search path.
fn bind_pdfium() -> Result<Pdfium, RecordError> {
    let bindings = match std::env::var(PDFIUM_LIB_PATH_ENV) {
        Ok(path) if !path.is_empty() => Pdfium::bind_to_library(&path),
        _ => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| RecordError::RendererUnavailable {
        detail: format!(
            "{:?}; install libpdfium or set {}=/path/to/libpdfium",
            e, PDFIUM_LIB_PATH_ENV
        ),
    })?;

    Ok(Pdfium::new(bindings))
}
