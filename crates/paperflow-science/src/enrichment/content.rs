use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_normalization::UnicodeNormalization;

use paperflow_core::DocumentRecord;

use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;

pub const MAX_PREFIX_LEN: usize = 40;
pub const PDF_MIME: &str = "application/pdf";
pub const TEXT_MIME: &str = "text/plain";

static INVALID_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9._-]").expect("valid regex"));

/// File handed to the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payload {
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

/// Turns a record into the file to upload.
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    async fn acquire(&self, record: &DocumentRecord) -> Result<Payload>;
}

/// ASCII file-name prefix derived from a title.
///
/// Characters outside `[A-Za-z0-9._-]` become `_`; at most
/// [`MAX_PREFIX_LEN`] characters; `tmp` when nothing is left.
pub fn safe_file_prefix(title: &str) -> String {
    let ascii: String = title.nfkd().filter(char::is_ascii).collect();
    let replaced = INVALID_CHARS.replace_all(&ascii, "_");
    let prefix: String = replaced.chars().take(MAX_PREFIX_LEN).collect();
    if prefix.is_empty() { "tmp".to_string() } else { prefix }
}

/// Inline content as a UTF-8 text file.
pub fn text_payload(record: &DocumentRecord) -> Option<Payload> {
    record.content().map(|content| Payload {
        file_name: format!("{}.txt", safe_file_prefix(record.title().as_str())),
        mime_type: TEXT_MIME.to_string(),
        bytes: content.as_bytes().to_vec(),
    })
}

/// Downloads `Download-URL` bodies over the throttled client; falls back to
/// the inline content.
pub struct HttpContentFetcher {
    client: RateLimitedClient,
}

impl HttpContentFetcher {
    pub fn new(client: RateLimitedClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentFetcher for HttpContentFetcher {
    async fn acquire(&self, record: &DocumentRecord) -> Result<Payload> {
        let title = record.title().as_str();
        let Some(url) = record.download_url() else {
            return text_payload(record).ok_or_else(|| ScienceError::ContentAcquisition {
                title: title.to_string(),
                reason: "no download URL and no inline content".to_string(),
            });
        };

        let download = self
            .client
            .get_bytes(url)
            .await
            .map_err(|e| ScienceError::ContentAcquisition {
                title: title.to_string(),
                reason: e.to_string(),
            })?;
        if download.bytes.is_empty() {
            return Err(ScienceError::ContentAcquisition {
                title: title.to_string(),
                reason: format!("empty body from {url}"),
            });
        }
        if !download.bytes.starts_with(b"%PDF") {
            tracing::warn!(
                %title,
                %url,
                content_type = download.content_type.as_deref().unwrap_or("-"),
                "download does not look like a PDF"
            );
        }

        Ok(Payload {
            file_name: format!("{}.pdf", safe_file_prefix(title)),
            mime_type: PDF_MIME.to_string(),
            bytes: download.bytes,
        })
    }
}
