use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::custom_fields::CustomFields;
use super::title::NormalizedTitle;

/// One row of the dedup store: a title that has been admitted once.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DedupEntry {
    pub title: NormalizedTitle,
    pub date: NaiveDate,
    pub source: String,
    pub custom_fields: Option<CustomFields>,
    pub synced: bool,
}

impl DedupEntry {
    pub fn date_iso(&self) -> String {
        self.date.format("%Y-%m-%d").to_string()
    }
}
