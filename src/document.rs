//! Word document assembly: one block per outcome, written as a minimal
//! WordprocessingML (`.docx`) package.
//!
//! Each block starts on a new page with a centered header line naming the
//! expense and report. The header carries keep-with-next and keep-lines so a
//! pagination pass never strands it away from its picture. A successful
//! record emits one header + picture block per image; a failed record emits
//! the header followed by the error text.
//!
//! ## Picture size
//!
//! Pixels are read at 96 per inch. The picture is fitted inside the layout
//! bounds (default 5.5 × 7 in) and then multiplied by the layout's upscale
//! factor (default 1.1), keeping the aspect ratio. At 1.1 the largest
//! picture is 6.05 × 7.7 in, inside the 6.5 × 9 in printable area of a
//! Letter page with 1-inch margins.

use crate::config::DocumentLayout;
use crate::error::EvidenceError;
use crate::output::ProcessingOutcome;
use crate::pipeline::encode::encode_png;
use quick_xml::escape::escape;
use std::io::{Cursor, Write};
use tracing::{debug, warn};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Pixels per inch assumed for image dimensions.
pub const PIXELS_PER_INCH: f64 = 96.0;

/// English Metric Units per inch (DrawingML extents).
const EMU_PER_INCH: f64 = 914_400.0;

pub const DOCX_MIME: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

const W_NS: &str = "http://schemas.openxmlformats.org/wordprocessingml/2006/main";
const R_NS: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships";
const WP_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing";
const A_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/main";
const PIC_NS: &str = "http://schemas.openxmlformats.org/drawingml/2006/picture";
const IMAGE_REL: &str = "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// Header line shown above every block.
pub fn header_text(expense_id: &str, report_id: &str) -> String {
    format!("ID da Despesa: {expense_id} / ID do Relatório: {report_id}")
}

/// Line shown in place of a picture when the record failed.
pub fn error_text(error: &impl std::fmt::Display) -> String {
    format!("⚠️ Erro ao carregar imagem: {error}")
}

/// Display size in inches for a `width_px × height_px` picture.
pub fn fit_inches(width_px: u32, height_px: u32, layout: &DocumentLayout) -> (f64, f64) {
    let (w, h) = (width_px.max(1) as f64, height_px.max(1) as f64);
    let scale = (layout.max_width_in * PIXELS_PER_INCH / w)
        .min(layout.max_height_in * PIXELS_PER_INCH / h)
        * layout.upscale;
    (w * scale / PIXELS_PER_INCH, h * scale / PIXELS_PER_INCH)
}

/// Render all outcomes, in order, into a `.docx` package.
pub fn assemble_document(
    outcomes: &[ProcessingOutcome],
    layout: &DocumentLayout,
) -> Result<Vec<u8>, EvidenceError> {
    let mut doc = DocxWriter::new(layout);

    for outcome in outcomes {
        let record = outcome.record();
        let header = header_text(&record.expense_id, &record.report_id);

        match outcome {
            ProcessingOutcome::Success { images, .. } => {
                for image in images {
                    doc.header(&header);
                    match encode_png(image) {
                        Ok(png) => doc.picture(png, image.width(), image.height()),
                        Err(e) => {
                            warn!("Row {}: {}", record.row_index, e);
                            doc.line(&error_text(&e));
                        }
                    }
                }
            }
            ProcessingOutcome::Failure { error, .. } => {
                doc.header(&header);
                doc.line(&error_text(error));
            }
        }
    }

    debug!(
        "Document: {} blocks, {} pictures",
        doc.blocks,
        doc.media.len()
    );
    doc.finish()
}

/// Accumulates body XML and media parts.
struct DocxWriter<'a> {
    layout: &'a DocumentLayout,
    body: String,
    media: Vec<Vec<u8>>,
    blocks: usize,
}

impl<'a> DocxWriter<'a> {
    fn new(layout: &'a DocumentLayout) -> Self {
        Self {
            layout,
            body: String::new(),
            media: Vec::new(),
            blocks: 0,
        }
    }

    fn run(&self, text: &str) -> String {
        let font = escape(self.layout.font.as_str());
        format!(
            r#"<w:r><w:rPr><w:rFonts w:ascii="{font}" w:hAnsi="{font}" w:eastAsia="{font}" w:cs="{font}"/><w:sz w:val="{size}"/><w:szCs w:val="{size}"/></w:rPr><w:t xml:space="preserve">{text}</w:t></w:r>"#,
            size = self.layout.font_size_pt * 2,
            text = escape(text),
        )
    }

    /// New page, centered header kept with what follows.
    fn header(&mut self, text: &str) {
        self.blocks += 1;
        let run = self.run(text);
        self.body.push_str(&format!(
            r#"<w:p><w:pPr><w:keepNext/><w:keepLines/><w:pageBreakBefore/><w:jc w:val="center"/></w:pPr>{run}</w:p>"#
        ));
    }

    fn line(&mut self, text: &str) {
        let run = self.run(text);
        self.body.push_str(&format!(
            r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr>{run}</w:p>"#
        ));
    }

    fn picture(&mut self, png: Vec<u8>, width_px: u32, height_px: u32) {
        self.media.push(png);
        let n = self.media.len();
        let (w_in, h_in) = fit_inches(width_px, height_px, self.layout);
        let cx = (w_in * EMU_PER_INCH).round() as u64;
        let cy = (h_in * EMU_PER_INCH).round() as u64;

        self.body.push_str(&format!(
            concat!(
                r#"<w:p><w:pPr><w:jc w:val="center"/></w:pPr><w:r><w:drawing>"#,
                r#"<wp:inline distT="0" distB="0" distL="0" distR="0">"#,
                r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{n}" name="Picture {n}"/>"#,
                r#"<wp:cNvGraphicFramePr><a:graphicFrameLocks noChangeAspect="1"/></wp:cNvGraphicFramePr>"#,
                r#"<a:graphic><a:graphicData uri="{pic_ns}"><pic:pic>"#,
                r#"<pic:nvPicPr><pic:cNvPr id="{n}" name="image{n}.png"/><pic:cNvPicPr/></pic:nvPicPr>"#,
                r#"<pic:blipFill><a:blip r:embed="rIdImg{n}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
                r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
                r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr>"#,
                r#"</pic:pic></a:graphicData></a:graphic></wp:inline></w:drawing></w:r></w:p>"#
            ),
            cx = cx,
            cy = cy,
            n = n,
            pic_ns = PIC_NS,
        ));
    }

    fn document_xml(&self) -> String {
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                r#"<w:document xmlns:w="{w}" xmlns:r="{r}" xmlns:wp="{wp}" xmlns:a="{a}" xmlns:pic="{pic}">"#,
                r#"<w:body>{body}"#,
                r#"<w:sectPr><w:pgSz w:w="12240" w:h="15840"/>"#,
                r#"<w:pgMar w:top="1440" w:right="1440" w:bottom="1440" w:left="1440" w:header="720" w:footer="720" w:gutter="0"/>"#,
                r#"</w:sectPr></w:body></w:document>"#
            ),
            w = W_NS,
            r = R_NS,
            wp = WP_NS,
            a = A_NS,
            pic = PIC_NS,
            body = self.body,
        )
    }

    fn document_rels(&self) -> String {
        let mut rels = String::from(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?><Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
        );
        for n in 1..=self.media.len() {
            rels.push_str(&format!(
                r#"<Relationship Id="rIdImg{n}" Type="{IMAGE_REL}" Target="media/image{n}.png"/>"#
            ));
        }
        rels.push_str("</Relationships>");
        rels
    }

    fn finish(self) -> Result<Vec<u8>, EvidenceError> {
        let write_err = |e: zip::result::ZipError| EvidenceError::DocumentWrite(e.to_string());
        let io_err = |e: std::io::Error| EvidenceError::DocumentWrite(e.to_string());
        let opts = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

        let mut zip = ZipWriter::new(Cursor::new(Vec::new()));

        zip.start_file("[Content_Types].xml", opts).map_err(write_err)?;
        zip.write_all(CONTENT_TYPES.as_bytes()).map_err(io_err)?;

        zip.start_file("_rels/.rels", opts).map_err(write_err)?;
        zip.write_all(PACKAGE_RELS.as_bytes()).map_err(io_err)?;

        zip.start_file("word/document.xml", opts).map_err(write_err)?;
        zip.write_all(self.document_xml().as_bytes()).map_err(io_err)?;

        zip.start_file("word/_rels/document.xml.rels", opts)
            .map_err(write_err)?;
        zip.write_all(self.document_rels().as_bytes()).map_err(io_err)?;

        // PNG data is already compressed.
        let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (i, png) in self.media.iter().enumerate() {
            zip.start_file(format!("word/media/image{}.png", i + 1), stored)
                .map_err(write_err)?;
            zip.write_all(png).map_err(io_err)?;
        }

        Ok(zip.finish().map_err(write_err)?.into_inner())
    }
}

const CONTENT_TYPES: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types">"#,
    r#"<Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/>"#,
    r#"<Default Extension="xml" ContentType="application/xml"/>"#,
    r#"<Default Extension="png" ContentType="image/png"/>"#,
    r#"<Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/>"#,
    r#"</Types>"#
);

const PACKAGE_RELS: &str = concat!(
    r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
    r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#,
    r#"<Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/>"#,
    r#"</Relationships>"#
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RecordError;
    use crate::feed::Record;
    use image::{DynamicImage, Rgb, RgbImage};
    use std::io::Read;
    use zip::ZipArchive;

    fn part(docx: &[u8], name: &str) -> String {
        let mut archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        let mut s = String::new();
        archive.by_name(name).unwrap().read_to_string(&mut s).unwrap();
        s
    }

    fn media_count(docx: &[u8]) -> usize {
        let archive = ZipArchive::new(Cursor::new(docx)).unwrap();
        archive
            .file_names()
            .filter(|n| n.starts_with("word/media/"))
            .count()
    }

    fn image(w: u32, h: u32) -> DynamicImage {
        let mut img = RgbImage::from_pixel(w, h, Rgb([200, 200, 200]));
        img.put_pixel(0, 0, Rgb([0, 0, 0]));
        DynamicImage::ImageRgb8(img)
    }

    #[test]
    fn tall_image_is_bound_by_height_then_upscaled() {
        let (w, h) = fit_inches(960, 1280, &DocumentLayout::default());
        // min(528/960, 672/1280) = 0.525, × 1.1 = 0.5775
        assert!((w - 5.775).abs() < 1e-9, "w = {w}");
        assert!((h - 7.7).abs() < 1e-9, "h = {h}");
    }

    #[test]
    fn wide_image_is_bound_by_width_and_keeps_ratio() {
        let (w, h) = fit_inches(2000, 500, &DocumentLayout::default());
        assert!((w - 6.05).abs() < 1e-9, "w = {w}");
        assert!((w / h - 4.0).abs() < 1e-9);
    }

    #[test]
    fn small_image_is_enlarged_to_fit() {
        let (w, _) = fit_inches(48, 48, &DocumentLayout::default());
        assert!((w - 6.05).abs() < 1e-9);
    }

    #[test]
    fn one_block_per_image_and_error_line_for_failures() {
        let outcomes = vec![
            ProcessingOutcome::Success {
                record: Record::new(2, "E1", "R1", Some("u".into())),
                images: vec![image(10, 20), image(20, 10)],
            },
            ProcessingOutcome::Failure {
                record: Record::new(3, "E2", "R1", Some("v".into())),
                error: RecordError::FetchStatus {
                    url: "https://v".into(),
                    status: 500,
                },
            },
        ];

        let docx = assemble_document(&outcomes, &DocumentLayout::default()).unwrap();
        let xml = part(&docx, "word/document.xml");

        assert_eq!(xml.matches("<w:pageBreakBefore/>").count(), 3);
        assert_eq!(xml.matches("<w:keepNext/>").count(), 3);
        assert_eq!(xml.matches("<w:drawing>").count(), 2);
        assert_eq!(media_count(&docx), 2);

        let first = xml.find("ID da Despesa: E1 / ID do Relatório: R1").unwrap();
        let second = xml.find("ID da Despesa: E2 / ID do Relatório: R1").unwrap();
        assert!(first < second);
        assert!(xml.contains("Erro ao carregar imagem: HTTP 500"));

        let rels = part(&docx, "word/_rels/document.xml.rels");
        assert!(rels.contains(r#"Target="media/image2.png""#));
    }

    #[test]
    fn header_uses_configured_font() {
        let outcomes = vec![ProcessingOutcome::Failure {
            record: Record::new(2, "E", "R", None),
            error: RecordError::MissingAttachment { row: 2 },
        }];
        let docx = assemble_document(&outcomes, &DocumentLayout::default()).unwrap();
        let xml = part(&docx, "word/document.xml");
        assert!(xml.contains(r#"w:ascii="Arial""#));
        assert!(xml.contains(r#"<w:sz w:val="24"/>"#));
    }

    #[test]
    fn identifiers_are_xml_escaped() {
        let outcomes = vec![ProcessingOutcome::Failure {
            record: Record::new(2, "A&B", "<R>", None),
            error: RecordError::MissingAttachment { row: 2 },
        }];
        let docx = assemble_document(&outcomes, &DocumentLayout::default()).unwrap();
        let xml = part(&docx, "word/document.xml");
        assert!(xml.contains("A&amp;B"));
        assert!(xml.contains("&lt;R&gt;"));
    }

    #[test]
    fn empty_batch_is_still_a_valid_package() {
        let docx = assemble_document(&[], &DocumentLayout::default()).unwrap();
        let xml = part(&docx, "word/document.xml");
        assert!(xml.contains("<w:sectPr>"));
        assert!(part(&docx, "[Content_Types].xml").contains("/word/document.xml"));
    }
}
