use std::fmt;

use serde::{Deserialize, Serialize};
use unicode_normalization::UnicodeNormalization;

use crate::error::ConstructionError;

const FORBIDDEN_FS_CHARS: &[char] = &['\\', '/', ':', '*', '?', '"', '<', '>', '|'];

/// A title in its canonical dedup-key form.
///
/// Built only through [`NormalizedTitle::parse`], so every value held by the
/// store or a record went through the same normalization.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct NormalizedTitle(String);

impl NormalizedTitle {
    pub fn parse(raw: &str) -> Result<Self, ConstructionError> {
        normalize_title(raw).map(Self)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for NormalizedTitle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for NormalizedTitle {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for NormalizedTitle {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// NFKC, drop control and format characters, replace characters that are
/// unsafe in file names, collapse whitespace.
///
/// Whitespace control characters (`\n`, `\t`, ...) become spaces rather than
/// being dropped, so multi-line feed titles keep their word boundaries.
pub fn normalize_title(raw: &str) -> Result<String, ConstructionError> {
    let cleaned: String = raw
        .nfkc()
        .filter_map(|ch| {
            if ch.is_whitespace() || FORBIDDEN_FS_CHARS.contains(&ch) {
                Some(' ')
            } else if ch.is_control() || is_invisible_format(ch) {
                None
            } else {
                Some(ch)
            }
        })
        .collect();

    let title = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    if title.is_empty() {
        return Err(ConstructionError::EmptyTitle);
    }
    Ok(title)
}

// Unicode general category Cf plus private-use planes.
fn is_invisible_format(ch: char) -> bool {
    matches!(
        ch,
        '\u{00AD}'
            | '\u{0600}'..='\u{0605}'
            | '\u{061C}'
            | '\u{06DD}'
            | '\u{070F}'
            | '\u{180E}'
            | '\u{200B}'..='\u{200F}'
            | '\u{202A}'..='\u{202E}'
            | '\u{2060}'..='\u{2064}'
            | '\u{2066}'..='\u{206F}'
            | '\u{FEFF}'
            | '\u{FFF9}'..='\u{FFFB}'
            | '\u{E000}'..='\u{F8FF}'
            | '\u{E0001}'
            | '\u{E0020}'..='\u{E007F}'
            | '\u{F0000}'..='\u{10FFFF}'
    )
}
