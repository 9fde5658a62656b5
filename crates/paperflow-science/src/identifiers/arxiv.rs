use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScienceError};

// YYMM.NNNN or YYMM.NNNNN, optional version
static NEW_STYLE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4}\.\d{4,5})(?:v(\d+))?$").expect("valid regex"));

// archive(.SUB)/YYMMNNN, optional version
static OLD_STYLE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([a-z][a-z\-]*(?:\.[A-Z]{2})?)/(\d{7})(?:v(\d+))?$").expect("valid regex"));

static ARXIV_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:https?://)?(?:www\.|export\.)?arxiv\.org/(?:abs|pdf)/(.+?)(?:\.pdf)?/?$").expect("valid regex")
});

/// An arXiv identifier without its version suffix, plus the version if one
/// was given.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ArxivId {
    pub id: String,
    pub version: Option<u32>,
    pub archive: Option<String>,
}

impl ArxivId {
    /// Accepts bare IDs, `arXiv:` prefixes and `arxiv.org/abs|pdf` URLs.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();
        let candidate = if let Some(caps) = ARXIV_URL.captures(input) {
            caps.get(1).map_or("", |m| m.as_str())
        } else if let Some(rest) = input
            .strip_prefix("arXiv:")
            .or_else(|| input.strip_prefix("arxiv:"))
        {
            rest.trim()
        } else {
            input
        };

        if let Some(caps) = NEW_STYLE.captures(candidate) {
            return Ok(Self {
                id: caps[1].to_string(),
                version: caps.get(2).and_then(|v| v.as_str().parse().ok()),
                archive: None,
            });
        }

        if let Some(caps) = OLD_STYLE.captures(candidate) {
            let archive = caps[1].to_string();
            return Ok(Self {
                id: format!("{archive}/{}", &caps[2]),
                version: caps.get(3).and_then(|v| v.as_str().parse().ok()),
                archive: Some(archive),
            });
        }

        Err(ScienceError::InvalidArxivId(input.to_string()))
    }

    /// ID with the version suffix, when known.
    pub fn versioned(&self) -> String {
        match self.version {
            Some(v) => format!("{}v{v}", self.id),
            None => self.id.clone(),
        }
    }

    pub fn abs_url(&self) -> String {
        format!("https://arxiv.org/abs/{}", self.versioned())
    }

    pub fn pdf_url(&self) -> String {
        format!("https://arxiv.org/pdf/{}", self.versioned())
    }
}

impl fmt::Display for ArxivId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.versioned())
    }
}
