//! Normalisation: every payload becomes an ordered list of RGB images.
//!
//! Fetched single images go through a blank check: if each colour channel
//! has the same minimum and maximum over the whole image, the attachment
//! downloaded fine but shows nothing, and the record is failed. The rule is
//! exact uniformity only; a plain one-colour page is rejected and a nearly
//! uniform scan is accepted.

use super::render::PageRasterizer;
use super::resolve::{Payload, PayloadKind};
use crate::error::RecordError;
use image::{DynamicImage, RgbImage};
use std::sync::Arc;
use tracing::debug;

/// Rendering knobs for the document path.
#[derive(Clone)]
pub struct RenderSettings {
    pub rasterizer: Arc<dyn PageRasterizer>,
    pub dpi: u32,
    pub max_pixels: u32,
}

/// Convert a payload into its images.
pub async fn normalize(
    payload: Payload,
    render: &RenderSettings,
) -> Result<Vec<DynamicImage>, RecordError> {
    match payload.kind {
        PayloadKind::Document => {
            let rasterizer = Arc::clone(&render.rasterizer);
            let (dpi, max_pixels) = (render.dpi, render.max_pixels);
            let bytes = payload.bytes;

            let pages = tokio::task::spawn_blocking(move || {
                rasterizer.rasterize(&bytes, dpi, max_pixels)
            })
            .await
            .map_err(|e| RecordError::DocumentDecode {
                detail: format!("render task panicked: {e}"),
            })??;

            if pages.is_empty() {
                return Err(RecordError::DocumentDecode {
                    detail: "document has no pages".to_string(),
                });
            }
            debug!("Document rasterised to {} page images", pages.len());
            Ok(pages.iter().map(to_rgb).collect())
        }
        PayloadKind::Image => {
            let image = decode_rgb(&payload.bytes)?;
            ensure_not_blank(&image)?;
            Ok(vec![DynamicImage::ImageRgb8(image)])
        }
        PayloadKind::Manual => {
            let image = decode_rgb(&payload.bytes)?;
            Ok(vec![DynamicImage::ImageRgb8(image)])
        }
    }
}

fn to_rgb(image: &DynamicImage) -> DynamicImage {
    match image {
        DynamicImage::ImageRgb8(_) => image.clone(),
        other => DynamicImage::ImageRgb8(other.to_rgb8()),
    }
}

/// Decode any supported raster format and drop alpha.
pub fn decode_rgb(bytes: &[u8]) -> Result<RgbImage, RecordError> {
    image::load_from_memory(bytes)
        .map(|img| img.to_rgb8())
        .map_err(|e| RecordError::ImageDecode {
            detail: e.to_string(),
        })
}

/// Per-channel `(min, max)` over every pixel.
pub fn channel_extrema(image: &RgbImage) -> [(u8, u8); 3] {
    let mut extrema = [(u8::MAX, u8::MIN); 3];
    for pixel in image.pixels() {
        for (channel, value) in pixel.0.iter().enumerate() {
            let (lo, hi) = &mut extrema[channel];
            *lo = (*lo).min(*value);
            *hi = (*hi).max(*value);
        }
    }
    extrema
}

pub fn is_blank(image: &RgbImage) -> bool {
    image.width() == 0
        || image.height() == 0
        || channel_extrema(image).iter().all(|(lo, hi)| lo == hi)
}

fn ensure_not_blank(image: &RgbImage) -> Result<(), RecordError> {
    if is_blank(image) {
        Err(RecordError::BlankImage {
            width: image.width(),
            height: image.height(),
        })
    } else {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordErrorKind;
    use image::{GrayImage, ImageFormat, Luma, Rgb, Rgba, RgbaImage};
    use std::io::Cursor;

    fn png(image: DynamicImage) -> Vec<u8> {
        let mut buf = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    struct FixedPages(usize);

    impl PageRasterizer for FixedPages {
        fn rasterize(&self, _: &[u8], _: u32, _: u32) -> Result<Vec<DynamicImage>, RecordError> {
            Ok((0..self.0)
                .map(|i| {
                    DynamicImage::ImageRgba8(RgbaImage::from_pixel(4, 4, Rgba([i as u8, 0, 0, 255])))
                })
                .collect())
        }
    }

    fn settings(pages: usize) -> RenderSettings {
        RenderSettings {
            rasterizer: Arc::new(FixedPages(pages)),
            dpi: 150,
            max_pixels: 2000,
        }
    }

    fn payload(kind: PayloadKind, bytes: Vec<u8>) -> Payload {
        Payload {
            kind,
            bytes,
            content_type: None,
        }
    }

    #[tokio::test]
    async fn white_grayscale_image_is_blank() {
        let bytes = png(DynamicImage::ImageLuma8(GrayImage::from_pixel(
            32,
            16,
            Luma([255]),
        )));
        let err = normalize(payload(PayloadKind::Image, bytes), &settings(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RecordErrorKind::BlankImage);
        assert_eq!(err, RecordError::BlankImage { width: 32, height: 16 });
    }

    #[tokio::test]
    async fn one_differing_pixel_is_not_blank() {
        let mut img = RgbImage::from_pixel(8, 8, Rgb([10, 10, 10]));
        img.put_pixel(7, 7, Rgb([10, 11, 10]));
        let bytes = png(DynamicImage::ImageRgb8(img));

        let images = normalize(payload(PayloadKind::Image, bytes), &settings(0))
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
        assert!(matches!(images[0], DynamicImage::ImageRgb8(_)));
    }

    #[tokio::test]
    async fn manual_images_skip_blank_check() {
        let bytes = png(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            5,
            5,
            Rgb([255, 255, 255]),
        )));
        let images = normalize(payload(PayloadKind::Manual, bytes), &settings(0))
            .await
            .unwrap();
        assert_eq!(images.len(), 1);
    }

    #[tokio::test]
    async fn alpha_is_dropped() {
        let mut img = RgbaImage::from_pixel(3, 3, Rgba([0, 0, 255, 0]));
        img.put_pixel(0, 0, Rgba([255, 0, 0, 255]));
        let bytes = png(DynamicImage::ImageRgba8(img));

        let images = normalize(payload(PayloadKind::Image, bytes), &settings(0))
            .await
            .unwrap();
        assert_eq!(images[0].color(), image::ColorType::Rgb8);
    }

    #[tokio::test]
    async fn undecodable_bytes_are_image_decode_errors() {
        let err = normalize(payload(PayloadKind::Image, b"<html>".to_vec()), &settings(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RecordErrorKind::ImageDecode);
    }

    #[tokio::test]
    async fn document_pages_keep_order() {
        let images = normalize(payload(PayloadKind::Document, b"%PDF".to_vec()), &settings(4))
            .await
            .unwrap();
        assert_eq!(images.len(), 4);
        for (i, img) in images.iter().enumerate() {
            let rgb = img.as_rgb8().expect("pages are converted to RGB");
            assert_eq!(rgb.get_pixel(0, 0).0[0], i as u8);
        }
    }

    #[tokio::test]
    async fn document_without_pages_is_a_decode_error() {
        let err = normalize(payload(PayloadKind::Document, b"%PDF".to_vec()), &settings(0))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), RecordErrorKind::DocumentDecode);
    }

    #[test]
    fn extrema_cover_each_channel() {
        let mut img = RgbImage::from_pixel(2, 1, Rgb([1, 2, 3]));
        img.put_pixel(1, 0, Rgb([9, 2, 0]));
        assert_eq!(channel_extrema(&img), [(1, 9), (2, 2), (0, 3)]);
    }
}
