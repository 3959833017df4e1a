//! Image encoding: `DynamicImage` → PNG bytes for the document media parts
//! and the archive entries.
//!
//! PNG is lossless, so receipt text stays as crisp as the source scan.

use crate::error::RecordError;
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Extension used for every emitted image.
pub const IMAGE_EXTENSION: &str = "png";

/// Encode a normalised image as PNG.
pub fn encode_png(img: &DynamicImage) -> Result<Vec<u8>, RecordError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| RecordError::ImageEncode {
            detail: e.to_string(),
        })?;

    debug!(
        "Encoded {}x{} image → {} bytes PNG",
        img.width(),
        img.height(),
        buf.len()
    );
    Ok(buf)
}
