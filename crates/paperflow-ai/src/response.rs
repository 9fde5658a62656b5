use serde::Deserialize;
use serde_json::Value;

use paperflow_core::clamp_keywords;

use crate::error::{AiError, Result};
use crate::oracle::Classification;

/// Removes a surrounding Markdown code fence, if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    if !trimmed.starts_with("```") {
        return trimmed;
    }
    let body = match trimmed.find('\n') {
        Some(idx) => &trimmed[idx + 1..],
        None => return "",
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

#[derive(Debug, Deserialize)]
struct RawClassification {
    #[serde(default, alias = "keywords")]
    #[serde(rename = "Keywords")]
    keywords: Option<Value>,
    #[serde(default, alias = "tags")]
    #[serde(rename = "Tags")]
    tags: Option<Value>,
}

/// Parses the model's JSON answer. Keywords may come back as a string or a
/// list; they are clamped to `keywords_max_len` characters.
pub fn parse_classification(raw: &str, keywords_max_len: usize) -> Result<Classification> {
    let body = strip_code_fence(raw);
    let parsed: RawClassification =
        serde_json::from_str(body).map_err(|e| AiError::MalformedResponse(format!("{e}: {body}")))?;

    let keywords = match parsed.keywords {
        Some(Value::String(s)) => s,
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .collect::<Vec<_>>()
            .join(", "),
        _ => String::new(),
    };

    let tags = match parsed.tags {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_str)
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(str::to_string)
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s.trim().to_string()],
        _ => Vec::new(),
    };

    Ok(Classification {
        tags,
        keywords: clamp_keywords(&keywords, keywords_max_len),
    })
}
