//! Input feed: the ordered records to process and the manual images that
//! stand in for missing links.
//!
//! Records normally come from a spreadsheet ([`xlsx::read_feed`]) but any
//! caller may build them directly — the batch runner only sees a slice of
//! [`Record`] and a [`ManualOverrides`] map, never any UI or session state.

pub mod xlsx;

use crate::error::EvidenceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// One spreadsheet row mapping an expense/report pair to an attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    /// 1-based spreadsheet row number; the record's identity.
    pub row_index: u32,
    pub expense_id: String,
    pub report_id: String,
    /// Hyperlink target of the attachment cell, if any.
    pub attachment_ref: Option<String>,
}

impl Record {
    pub fn new(
        row_index: u32,
        expense_id: impl Into<String>,
        report_id: impl Into<String>,
        attachment_ref: Option<String>,
    ) -> Self {
        Self {
            row_index,
            expense_id: expense_id.into(),
            report_id: report_id.into(),
            attachment_ref: attachment_ref.filter(|r| !r.trim().is_empty()),
        }
    }

    /// True when the record needs a manual image.
    pub fn needs_manual_image(&self) -> bool {
        self.attachment_ref.is_none()
    }
}

/// Header names the feed must expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedColumns {
    pub attachment_link: String,
    pub expense_id: String,
    pub report_id: String,
}

impl Default for FeedColumns {
    fn default() -> Self {
        Self {
            attachment_link: "Link do Anexo".to_string(),
            expense_id: "ID da Despesa".to_string(),
            report_id: "ID do Relatório".to_string(),
        }
    }
}

impl FeedColumns {
    /// Required headers in the order they are reported.
    pub fn required(&self) -> Vec<String> {
        vec![
            self.attachment_link.clone(),
            self.expense_id.clone(),
            self.report_id.clone(),
        ]
    }

    /// Locate the three required columns in a header row.
    ///
    /// Returns `(link, expense, report)` column indices, or
    /// [`EvidenceError::FeedValidation`] naming every missing header.
    pub fn locate(&self, headers: &[String]) -> Result<(usize, usize, usize), EvidenceError> {
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        match (
            find(&self.attachment_link),
            find(&self.expense_id),
            find(&self.report_id),
        ) {
            (Some(link), Some(expense), Some(report)) => Ok((link, expense, report)),
            _ => {
                let missing = self
                    .required()
                    .into_iter()
                    .filter(|name| find(name).is_none())
                    .collect();
                Err(EvidenceError::FeedValidation {
                    required: self.required(),
                    missing,
                })
            }
        }
    }
}

/// Manual images keyed by row index.
///
/// Inserting the same row twice keeps the last image. Records sharing a
/// row index share the override.
#[derive(Debug, Clone, Default)]
pub struct ManualOverrides {
    images: BTreeMap<u32, Vec<u8>>,
}

impl ManualOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, row_index: u32, bytes: Vec<u8>) -> Option<Vec<u8>> {
        self.images.insert(row_index, bytes)
    }

    pub fn get(&self, row_index: u32) -> Option<&[u8]> {
        self.images.get(&row_index).map(Vec::as_slice)
    }

    pub fn len(&self) -> usize {
        self.images.len()
    }

    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    /// Records that have no link and no manual image yet, in feed order.
    pub fn missing<'a>(&self, records: &'a [Record]) -> Vec<&'a Record> {
        records
            .iter()
            .filter(|r| r.needs_manual_image() && !self.images.contains_key(&r.row_index))
            .collect()
    }

    /// Batch precondition: every link-less record must be covered.
    pub fn validate(&self, records: &[Record]) -> Result<(), EvidenceError> {
        let missing = self.missing(records);
        if missing.is_empty() {
            Ok(())
        } else {
            Err(EvidenceError::MissingAttachment {
                rows: missing.iter().map(|r| r.row_index).collect(),
            })
        }
    }
}

impl FromIterator<(u32, Vec<u8>)> for ManualOverrides {
    fn from_iter<T: IntoIterator<Item = (u32, Vec<u8>)>>(iter: T) -> Self {
        Self {
            images: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn records() -> Vec<Record> {
        vec![
            Record::new(2, "100", "R1", Some("https://x/a.png".into())),
            Record::new(3, "101", "R1", None),
            Record::new(4, "102", "R2", Some("   ".into())),
        ]
    }

    #[test]
    fn blank_reference_counts_as_absent() {
        assert!(records()[2].needs_manual_image());
    }

    #[test]
    fn validate_reports_every_uncovered_row() {
        let overrides = ManualOverrides::new();
        match overrides.validate(&records()) {
            Err(EvidenceError::MissingAttachment { rows }) => assert_eq!(rows, vec![3, 4]),
            other => panic!("expected MissingAttachment, got {other:?}"),
        }
    }

    #[test]
    fn validate_passes_when_all_covered() {
        let overrides: ManualOverrides = [(3, vec![1]), (4, vec![2])].into_iter().collect();
        assert!(overrides.validate(&records()).is_ok());
        assert!(overrides.missing(&records()).is_empty());
    }

    #[test]
    fn override_for_linked_row_is_not_required() {
        let overrides: ManualOverrides = [(3, vec![1])].into_iter().collect();
        let records = records();
        let missing = overrides.missing(&records);
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].row_index, 4);
    }

    // Duplicate row indices are not rejected; the last insert wins and every
    // record with that row index reads the same bytes.
    #[test]
    fn duplicate_row_indices_share_override() {
        let mut overrides = ManualOverrides::new();
        overrides.insert(5, vec![1]);
        assert_eq!(overrides.insert(5, vec![2]), Some(vec![1]));

        let dupes = vec![Record::new(5, "a", "r", None), Record::new(5, "b", "r", None)];
        assert!(overrides.validate(&dupes).is_ok());
        assert_eq!(overrides.get(5), Some(&[2u8][..]));
    }

    #[test]
    fn locate_finds_columns_in_any_order() {
        let headers: Vec<String> = ["ID do Relatório", "Valor", "Link do Anexo", "ID da Despesa"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(FeedColumns::default().locate(&headers).unwrap(), (2, 3, 0));
    }

    #[test]
    fn locate_names_missing_columns() {
        let headers = vec!["Link do Anexo".to_string()];
        match FeedColumns::default().locate(&headers) {
            Err(EvidenceError::FeedValidation { missing, .. }) => {
                assert_eq!(missing, vec!["ID da Despesa", "ID do Relatório"]);
            }
            other => panic!("expected FeedValidation, got {other:?}"),
        }
    }
}
