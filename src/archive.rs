//! Archive packing: named PNG entries → size-bounded sub-archives → one
//! container archive.
//!
//! Entries are bucketed greedily and contiguously: an entry joins the current
//! bucket unless that would push the bucket past the capacity, in which case
//! the bucket is sealed and the entry opens the next one. Entries are never
//! split, so a single entry larger than the capacity gets a bucket of its
//! own. Entries keep their input order across `imagens_part1.zip`,
//! `imagens_part2.zip`, …

use crate::error::EvidenceError;
use crate::output::{FailureEntry, FailureReport, ProcessingOutcome};
use crate::pipeline::encode::{encode_png, IMAGE_EXTENSION};
use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::ops::Range;
use tracing::{debug, info};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// Prefix of each sub-archive inside the container.
pub const SUB_ARCHIVE_PREFIX: &str = "imagens_part";

/// One file destined for a sub-archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl ArchiveEntry {
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// `<expense_id>.png` for one image, `<expense_id>_<n>.png` (1-based) for
/// several.
pub fn entry_names(stem: &str, count: usize) -> Vec<String> {
    if count == 1 {
        vec![format!("{stem}.{IMAGE_EXTENSION}")]
    } else {
        (1..=count)
            .map(|n| format!("{stem}_{n}.{IMAGE_EXTENSION}"))
            .collect()
    }
}

/// Make an identifier usable as a file name inside a ZIP.
fn file_stem(expense_id: &str, row_index: u32) -> String {
    let cleaned: String = expense_id
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect();
    if cleaned.is_empty() {
        format!("linha_{row_index}")
    } else {
        cleaned
    }
}

/// Encode the images of every successful outcome into named entries.
///
/// Failed outcomes contribute no entry and are listed in the returned
/// report, as is a record whose images cannot be PNG-encoded. Names that
/// repeat (two records sharing an expense id) get a `~N` suffix.
pub fn collect_entries(outcomes: &[ProcessingOutcome]) -> (Vec<ArchiveEntry>, FailureReport) {
    let mut entries = Vec::new();
    let mut report = FailureReport::default();
    let mut used: HashSet<String> = HashSet::new();

    for outcome in outcomes {
        let (record, images) = match outcome {
            ProcessingOutcome::Success { record, images } => (record, images),
            ProcessingOutcome::Failure { record, error } => {
                report.push(FailureEntry::new(record, error));
                continue;
            }
        };

        let encoded: Result<Vec<Vec<u8>>, _> = images.iter().map(encode_png).collect();
        let encoded = match encoded {
            Ok(e) => e,
            Err(error) => {
                report.push(FailureEntry::new(record, &error));
                continue;
            }
        };

        let stem = file_stem(&record.expense_id, record.row_index);
        for (name, bytes) in entry_names(&stem, encoded.len()).into_iter().zip(encoded) {
            let name = unique_name(&mut used, name);
            entries.push(ArchiveEntry { name, bytes });
        }
    }

    (entries, report)
}

fn unique_name(used: &mut HashSet<String>, name: String) -> String {
    if used.insert(name.clone()) {
        return name;
    }
    let (stem, ext) = name.rsplit_once('.').unwrap_or((name.as_str(), ""));
    let mut n = 2;
    loop {
        let candidate = if ext.is_empty() {
            format!("{stem}~{n}")
        } else {
            format!("{stem}~{n}.{ext}")
        };
        if used.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

/// Greedy contiguous partition of `sizes` into buckets of at most
/// `capacity` bytes. A bucket only exceeds the capacity when it holds a
/// single oversized entry.
pub fn partition_by_capacity(sizes: &[u64], capacity: u64) -> Vec<Range<usize>> {
    let mut buckets = Vec::new();
    let mut start = 0;
    let mut current: u64 = 0;

    for (i, &size) in sizes.iter().enumerate() {
        if i > start && current.saturating_add(size) > capacity {
            buckets.push(start..i);
            start = i;
            current = 0;
        }
        current = current.saturating_add(size);
    }
    if start < sizes.len() {
        buckets.push(start..sizes.len());
    }
    buckets
}

/// Name of the `n`-th (1-based) sub-archive.
pub fn sub_archive_name(n: usize) -> String {
    format!("{SUB_ARCHIVE_PREFIX}{n}.zip")
}

/// Pack `entries` into sub-archives of at most `capacity` bytes of entry
/// data and wrap them, in order, into one container ZIP.
pub fn pack_archives(entries: &[ArchiveEntry], capacity: u64) -> Result<Vec<u8>, EvidenceError> {
    let sizes: Vec<u64> = entries.iter().map(ArchiveEntry::size).collect();
    let buckets = partition_by_capacity(&sizes, capacity);

    let mut parts = Vec::with_capacity(buckets.len());
    for (idx, range) in buckets.into_iter().enumerate() {
        let name = sub_archive_name(idx + 1);
        let bucket = &entries[range];
        let bytes = write_zip(
            &name,
            bucket.iter().map(|e| (e.name.as_str(), e.bytes.as_slice())),
        )?;
        debug!(
            "Sealed {}: {} entries, {} bytes of images, {} bytes compressed",
            name,
            bucket.len(),
            bucket.iter().map(ArchiveEntry::size).sum::<u64>(),
            bytes.len()
        );
        parts.push((name, bytes));
    }

    info!("Packed {} entries into {} sub-archives", entries.len(), parts.len());
    write_zip(
        "container",
        parts.iter().map(|(n, b)| (n.as_str(), b.as_slice())),
    )
}

fn write_zip<'a>(
    archive_name: &str,
    files: impl IntoIterator<Item = (&'a str, &'a [u8])>,
) -> Result<Vec<u8>, EvidenceError> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, data) in files {
        let opts = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(data.len() as u64 >= u32::MAX as u64);
        writer
            .start_file(name, opts)
            .map_err(|e| archive_error(archive_name, e))?;
        writer
            .write_all(data)
            .map_err(|e| archive_error(archive_name, e))?;
    }
    let cursor = writer
        .finish()
        .map_err(|e| archive_error(archive_name, e))?;
    Ok(cursor.into_inner())
}

fn archive_error(name: &str, e: impl std::fmt::Display) -> EvidenceError {
    EvidenceError::ArchiveWrite {
        name: name.to_string(),
        detail: e.to_string(),
    }
}
