//! Attachment resolution: turn a record into raw bytes plus the path they
//! should take through the normaliser.
//!
//! A record either carries a link (fetched once, no retries) or relies on a
//! manual image supplied by the caller. The response's `Content-Type` decides
//! between the single-image path and the multi-page document path.

use crate::error::{EvidenceError, RecordError};
use crate::feed::{ManualOverrides, Record};
use std::time::Duration;
use tracing::{debug, info};

/// How a payload must be normalised.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// A raster image fetched from a link; subject to the blank check.
    Image,
    /// A paginated document (PDF); every page is rasterised.
    Document,
    /// An image supplied by the user; trusted, no blank check.
    Manual,
}

/// Raw attachment bytes ready for [`crate::pipeline::normalize`].
#[derive(Debug, Clone)]
pub struct Payload {
    pub kind: PayloadKind,
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// A completed HTTP exchange.
#[derive(Debug, Clone)]
pub struct Fetched {
    pub url: String,
    pub status: u16,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

/// Prepend `https://` when the reference carries no scheme.
pub fn normalize_url(raw: &str) -> String {
    let trimmed = raw.trim();
    if has_scheme(trimmed) {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed.trim_start_matches('/'))
    }
}

/// A leading `scheme://`, where scheme is `[A-Za-z][A-Za-z0-9+.-]*`.
fn has_scheme(url: &str) -> bool {
    let Some((scheme, _)) = url.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
}

/// Route on the declared media type; sniff `%PDF` only when none (or a
/// generic `application/octet-stream`) was sent.
pub fn classify(content_type: Option<&str>, body: &[u8]) -> PayloadKind {
    let declared = content_type
        .map(|ct| ct.trim().to_ascii_lowercase())
        .filter(|ct| !ct.is_empty() && !ct.starts_with("application/octet-stream"));
    match declared {
        Some(ct) if ct.contains("pdf") => PayloadKind::Document,
        Some(_) => PayloadKind::Image,
        None if body.starts_with(b"%PDF") => PayloadKind::Document,
        None => PayloadKind::Image,
    }
}

/// Build the one HTTP client used for a whole batch.
pub fn build_client(timeout_secs: u64) -> Result<reqwest::Client, EvidenceError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .user_agent(concat!("expense-evidence/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| EvidenceError::HttpClient(e.to_string()))
}

fn transport_error(url: &str, timeout_secs: u64, e: reqwest::Error) -> RecordError {
    if e.is_timeout() {
        RecordError::FetchTimeout {
            url: url.to_string(),
            secs: timeout_secs,
        }
    } else {
        RecordError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        }
    }
}

/// Single GET; non-2xx and timeouts become [`RecordError`]s.
pub async fn fetch(
    client: &reqwest::Client,
    url: &str,
    timeout_secs: u64,
) -> Result<Fetched, RecordError> {
    debug!("GET {}", url);

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| transport_error(url, timeout_secs, e))?;

    let status = response.status();
    if !status.is_success() {
        return Err(RecordError::FetchStatus {
            url: url.to_string(),
            status: status.as_u16(),
        });
    }

    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport_error(url, timeout_secs, e))?;

    info!(
        "Fetched {} ({} bytes, {})",
        url,
        bytes.len(),
        content_type.as_deref().unwrap_or("no content-type")
    );

    Ok(Fetched {
        url: url.to_string(),
        status: status.as_u16(),
        content_type,
        bytes: bytes.to_vec(),
    })
}

/// Resolve one record to its payload.
pub async fn resolve(
    record: &Record,
    overrides: &ManualOverrides,
    client: &reqwest::Client,
    timeout_secs: u64,
) -> Result<Payload, RecordError> {
    let Some(reference) = record.attachment_ref.as_deref() else {
        let bytes = overrides
            .get(record.row_index)
            .ok_or(RecordError::MissingAttachment {
                row: record.row_index,
            })?;
        debug!("Row {}: using manual image ({} bytes)", record.row_index, bytes.len());
        return Ok(Payload {
            kind: PayloadKind::Manual,
            bytes: bytes.to_vec(),
            content_type: None,
        });
    };

    let url = normalize_url(reference);
    let fetched = fetch(client, &url, timeout_secs).await?;
    let kind = classify(fetched.content_type.as_deref(), &fetched.bytes);

    Ok(Payload {
        kind,
        bytes: fetched.bytes,
        content_type: fetched.content_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_without_scheme_gets_https() {
        assert_eq!(normalize_url("cdn.example.com/a.png"), "https://cdn.example.com/a.png");
        assert_eq!(normalize_url("  //cdn.example.com/a.png "), "https://cdn.example.com/a.png");
    }

    #[test]
    fn url_with_scheme_is_kept() {
        assert_eq!(normalize_url("http://x.test/a.png"), "http://x.test/a.png");
        assert_eq!(normalize_url("https://x.test/a.pdf"), "https://x.test/a.pdf");
    }

    #[test]
    fn embedded_url_in_query_is_not_a_scheme() {
        assert_eq!(
            normalize_url("cdn.example.com/view?next=https://x.test/a.png"),
            "https://cdn.example.com/view?next=https://x.test/a.png"
        );
        assert_eq!(normalize_url("1http://x.test"), "https://1http://x.test");
    }

    #[test]
    fn pdf_content_type_routes_to_document() {
        assert_eq!(classify(Some("application/pdf"), b"..."), PayloadKind::Document);
        assert_eq!(
            classify(Some("application/x-PDF; charset=binary"), b""),
            PayloadKind::Document
        );
    }

    #[test]
    fn declared_type_wins_over_magic() {
        assert_eq!(classify(Some("image/png"), b"%PDF-1.7"), PayloadKind::Image);
    }

    #[test]
    fn missing_type_sniffs_pdf_magic() {
        assert_eq!(classify(None, b"%PDF-1.4\n"), PayloadKind::Document);
        assert_eq!(classify(None, b"\x89PNG"), PayloadKind::Image);
        assert_eq!(
            classify(Some("application/octet-stream"), b"%PDF-1.4\n"),
            PayloadKind::Document
        );
    }

    #[tokio::test]
    async fn manual_override_is_used_without_network() {
        let client = build_client(1).unwrap();
        let overrides: ManualOverrides = [(7, vec![1, 2, 3])].into_iter().collect();
        let record = Record::new(7, "55", "R", None);

        let payload = resolve(&record, &overrides, &client, 1).await.unwrap();
        assert_eq!(payload.kind, PayloadKind::Manual);
        assert_eq!(payload.bytes, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_override_is_a_record_error() {
        let client = build_client(1).unwrap();
        let record = Record::new(8, "55", "R", None);

        let err = resolve(&record, &ManualOverrides::new(), &client, 1)
            .await
            .unwrap_err();
        assert_eq!(err, RecordError::MissingAttachment { row: 8 });
    }
}
