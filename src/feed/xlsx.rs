//! `.xlsx` feed reader.
//!
//! Cell values come from calamine. The attachment link is the *hyperlink
//! target* of the link cell, which calamine does not expose, so the sheet's
//! `<hyperlinks>` block and its relationship part are read directly from the
//! OOXML package.

use super::{FeedColumns, Record};
use crate::error::EvidenceError;
use calamine::{DataType, Reader, Xlsx};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader as XmlReader;
use std::collections::HashMap;
use std::io::{Cursor, Read, Seek};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zip::ZipArchive;

/// Read the records of the active worksheet of an `.xlsx` file.
pub fn read_feed(path: impl AsRef<Path>, columns: &FeedColumns) -> Result<Vec<Record>, EvidenceError> {
    let path = path.as_ref();
    let bytes = std::fs::read(path).map_err(|e| EvidenceError::SpreadsheetRead {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;
    parse_feed(&bytes, columns, path)
}

/// Same as [`read_feed`] for a workbook already held in memory (an upload).
pub fn read_feed_from_bytes(bytes: &[u8], columns: &FeedColumns) -> Result<Vec<Record>, EvidenceError> {
    parse_feed(bytes, columns, Path::new("<memory>"))
}

fn parse_feed(bytes: &[u8], columns: &FeedColumns, origin: &Path) -> Result<Vec<Record>, EvidenceError> {
    let read_err = |detail: String| EvidenceError::SpreadsheetRead {
        path: origin.to_path_buf(),
        detail,
    };

    let mut package = ZipArchive::new(Cursor::new(bytes)).map_err(|e| read_err(e.to_string()))?;
    let sheet = active_sheet(&mut package).map_err(read_err)?;
    let links = sheet_hyperlinks(&mut package, &sheet.part).map_err(read_err)?;
    debug!(
        "Active sheet '{}' ({}) has {} hyperlinks",
        sheet.name,
        sheet.part,
        links.len()
    );

    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes)).map_err(|e| read_err(e.to_string()))?;
    let range = workbook
        .worksheet_range(&sheet.name)
        .map_err(|e| read_err(e.to_string()))?;

    let Some((top, left)) = range.start() else {
        return Err(EvidenceError::FeedValidation {
            required: columns.required(),
            missing: columns.required(),
        });
    };

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .map(|row| {
            row.iter()
                .map(|c| c.as_string().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default();
    let (link_col, expense_col, report_col) = columns.locate(&headers)?;

    let text = |row: &[calamine::Data], col: usize| -> String {
        row.get(col)
            .and_then(|c| c.as_string())
            .map(|s| s.trim().to_string())
            .unwrap_or_default()
    };

    let mut records = Vec::new();
    for (offset, row) in rows.enumerate() {
        let sheet_row = top + 1 + offset as u32;
        let link = links
            .get(&(sheet_row, left + link_col as u32))
            .cloned();
        let expense_id = text(row, expense_col);
        let report_id = text(row, report_col);

        if link.is_none() && expense_id.is_empty() && report_id.is_empty() {
            continue;
        }

        records.push(Record::new(sheet_row + 1, expense_id, report_id, link));
    }

    info!(
        "Read {} records ({} without link)",
        records.len(),
        records.iter().filter(|r| r.needs_manual_image()).count()
    );
    Ok(records)
}

// ── OOXML package helpers ────────────────────────────────────────────────

struct SheetRef {
    name: String,
    /// Package path of the worksheet part, e.g. `xl/worksheets/sheet1.xml`.
    part: String,
}

fn read_part<R: Read + Seek>(package: &mut ZipArchive<R>, name: &str) -> Result<Option<String>, String> {
    let mut file = match package.by_name(name) {
        Ok(f) => f,
        Err(zip::result::ZipError::FileNotFound) => return Ok(None),
        Err(e) => return Err(format!("{name}: {e}")),
    };
    let mut xml = String::new();
    file.read_to_string(&mut xml)
        .map_err(|e| format!("{name}: {e}"))?;
    Ok(Some(xml))
}

fn attr(e: &BytesStart<'_>, local: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == local)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

/// Visit every start/empty element of an XML document.
fn for_each_element(xml: &str, mut visit: impl FnMut(&BytesStart<'_>)) -> Result<(), String> {
    let mut reader = XmlReader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) | Ok(Event::Empty(e)) => visit(&e),
            Ok(Event::Eof) => return Ok(()),
            Err(e) => {
                return Err(format!(
                    "malformed XML at byte {}: {e}",
                    reader.buffer_position()
                ))
            }
            _ => {}
        }
    }
}

/// Relationship id → target, for a `.rels` part.
fn relationships(xml: &str) -> Result<HashMap<String, String>, String> {
    let mut rels = HashMap::new();
    for_each_element(xml, |e| {
        if e.local_name().as_ref() == b"Relationship" {
            if let (Some(id), Some(target)) = (attr(e, b"Id"), attr(e, b"Target")) {
                rels.insert(id, target);
            }
        }
    })?;
    Ok(rels)
}

/// The sheet Excel opens on (`workbookView/@activeTab`, default first).
fn active_sheet<R: Read + Seek>(package: &mut ZipArchive<R>) -> Result<SheetRef, String> {
    let workbook = read_part(package, "xl/workbook.xml")?
        .ok_or_else(|| "not an .xlsx workbook (xl/workbook.xml missing)".to_string())?;

    let mut active_tab = 0usize;
    let mut sheets: Vec<(String, String)> = Vec::new();
    for_each_element(&workbook, |e| match e.local_name().as_ref() {
        b"workbookView" => {
            if let Some(tab) = attr(e, b"activeTab").and_then(|t| t.parse().ok()) {
                active_tab = tab;
            }
        }
        b"sheet" => {
            if let (Some(name), Some(id)) = (attr(e, b"name"), attr(e, b"id")) {
                sheets.push((name, id));
            }
        }
        _ => {}
    })?;

    let (name, rel_id) = sheets
        .get(active_tab)
        .or_else(|| sheets.first())
        .cloned()
        .ok_or_else(|| "workbook has no worksheets".to_string())?;

    let rels = read_part(package, "xl/_rels/workbook.xml.rels")?
        .map(|xml| relationships(&xml))
        .transpose()?
        .unwrap_or_default();
    let target = rels
        .get(&rel_id)
        .ok_or_else(|| format!("no relationship '{rel_id}' for sheet '{name}'"))?;

    Ok(SheetRef {
        name,
        part: resolve_target("xl", target),
    })
}

/// Hyperlinks of one worksheet keyed by 0-based `(row, col)`.
fn sheet_hyperlinks<R: Read + Seek>(
    package: &mut ZipArchive<R>,
    part: &str,
) -> Result<HashMap<(u32, u32), String>, String> {
    let Some(sheet_xml) = read_part(package, part)? else {
        return Err(format!("worksheet part '{part}' missing"));
    };

    let mut anchors: Vec<(String, String)> = Vec::new();
    for_each_element(&sheet_xml, |e| {
        if e.local_name().as_ref() == b"hyperlink" {
            if let (Some(cell), Some(id)) = (attr(e, b"ref"), attr(e, b"id")) {
                anchors.push((cell, id));
            }
        }
    })?;
    if anchors.is_empty() {
        return Ok(HashMap::new());
    }

    let rels = read_part(package, &rels_path(part))?
        .map(|xml| relationships(&xml))
        .transpose()?
        .unwrap_or_default();

    Ok(anchors
        .into_iter()
        .filter_map(|(cell, id)| {
            let pos = parse_cell_ref(&cell)?;
            let target = rels.get(&id)?.trim().to_string();
            Some((pos, target))
        })
        .collect())
}

/// Resolve a relationship target against the directory of its source part.
fn resolve_target(base_dir: &str, target: &str) -> String {
    match target.strip_prefix('/') {
        Some(absolute) => absolute.to_string(),
        None => format!("{base_dir}/{target}"),
    }
}

/// `xl/worksheets/sheet1.xml` → `xl/worksheets/_rels/sheet1.xml.rels`.
fn rels_path(part: &str) -> String {
    let path = PathBuf::from(part);
    let file = path
        .file_name()
        .map(|f| f.to_string_lossy().into_owned())
        .unwrap_or_default();
    match part.rsplit_once('/') {
        Some((dir, _)) => format!("{dir}/_rels/{file}.rels"),
        None => format!("_rels/{file}.rels"),
    }
}

const MAX_COLUMN_LETTERS: usize = 3;

/// `C5` → `(4, 2)`. For a range (`C5:D6`) the top-left cell is used.
fn parse_cell_ref(cell: &str) -> Option<(u32, u32)> {
    let first = cell.split(':').next()?.trim();
    let split = first.find(|c: char| c.is_ascii_digit())?;
    let (letters, digits) = first.split_at(split);
    // Excel columns stop at XFD.
    if letters.is_empty() || letters.len() > MAX_COLUMN_LETTERS {
        return None;
    }

    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col
            .checked_mul(26)?
            .checked_add(ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1)?;
    }
    let row: u32 = digits.parse().ok()?;
    if row == 0 {
        return None;
    }
    Some((row - 1, col - 1))
}
