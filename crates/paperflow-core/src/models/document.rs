use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::custom_fields::{CustomFieldName, CustomFields, FieldValue, clamp_keywords};
use super::dates::parse_date;
use super::dedup_entry::DedupEntry;
use super::title::NormalizedTitle;
use crate::error::ConstructionError;

pub const NOT_SPECIFIED: &str = "Not-Specified";
pub const DEFAULT_QURISK_RELEVANCE: i64 = 4;

/// How a document entered the system.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum AddedVia {
    #[default]
    Script,
    Manual,
    /// A site scraper, labelled e.g. `scrapper-quantuminsider`.
    Scraper(String),
}

impl AddedVia {
    pub fn as_str(&self) -> &str {
        match self {
            AddedVia::Script => "Script",
            AddedVia::Manual => "Manual",
            AddedVia::Scraper(label) => label,
        }
    }

    pub fn requires_payload(&self) -> bool {
        !matches!(self, AddedVia::Manual)
    }
}

impl From<&str> for AddedVia {
    fn from(s: &str) -> Self {
        match s.trim() {
            "Script" | "script" => AddedVia::Script,
            "Manual" | "manual" => AddedVia::Manual,
            other => AddedVia::Scraper(other.to_string()),
        }
    }
}

impl From<String> for AddedVia {
    fn from(s: String) -> Self {
        AddedVia::from(s.as_str())
    }
}

impl From<AddedVia> for String {
    fn from(v: AddedVia) -> Self {
        v.as_str().to_string()
    }
}

impl fmt::Display for AddedVia {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One candidate paper or article, from discovery through metadata merge.
///
/// Only [`DocumentRecordBuilder::build`] and [`DocumentRecord::from_entry`]
/// create records, so the title is always normalized and a non-manual record
/// always carries a payload source.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    title: NormalizedTitle,
    created: NaiveDate,
    pub document_type: Option<String>,
    download_url: Option<String>,
    content: Option<String>,
    pub tags: Vec<String>,
    added_via: AddedVia,
    pub fields: CustomFields,
    pub article_url: Option<String>,
    pub storage_path: Option<String>,
    pub correspondent: Option<String>,
}

impl DocumentRecord {
    pub fn builder(title: impl Into<String>) -> DocumentRecordBuilder {
        DocumentRecordBuilder::new(title)
    }

    /// Rebuilds a record from a dedup row and its snapshot.
    ///
    /// Payload fields come back only as far as the snapshot recorded them;
    /// the entry was admitted already so the payload rule is not rechecked.
    /// The snapshot holds custom fields only, so the rebuilt record has no
    /// tags and no document type.
    pub fn from_entry(entry: &DedupEntry) -> Self {
        let mut fields = entry.custom_fields.clone().unwrap_or_default();
        let download_url = match fields.remove(CustomFieldName::DownloadUrl) {
            Some(FieldValue::Text(url)) if !url.trim().is_empty() => Some(url),
            _ => None,
        };
        let added_via = match fields.remove(CustomFieldName::AddedVia) {
            Some(FieldValue::Text(via)) => AddedVia::from(via),
            _ if entry.source == "Manual" => AddedVia::Manual,
            _ => AddedVia::Script,
        };
        if fields.get(CustomFieldName::Source).is_none() {
            fields.set(CustomFieldName::Source, entry.source.as_str());
        }

        Self {
            title: entry.title.clone(),
            created: entry.date,
            document_type: None,
            download_url,
            content: None,
            tags: Vec::new(),
            added_via,
            fields,
            article_url: None,
            storage_path: None,
            correspondent: None,
        }
    }

    pub fn title(&self) -> &NormalizedTitle {
        &self.title
    }

    pub fn created(&self) -> NaiveDate {
        self.created
    }

    pub fn created_iso(&self) -> String {
        self.created.format("%Y-%m-%d").to_string()
    }

    pub fn download_url(&self) -> Option<&str> {
        self.download_url.as_deref()
    }

    pub fn content(&self) -> Option<&str> {
        self.content.as_deref()
    }

    pub fn added_via(&self) -> &AddedVia {
        &self.added_via
    }

    /// Origin label written to the dedup store (`Source` field).
    pub fn source(&self) -> &str {
        self.fields
            .get_text(CustomFieldName::Source)
            .unwrap_or(NOT_SPECIFIED)
    }

    pub fn keywords(&self) -> Option<&str> {
        self.fields.get_text(CustomFieldName::Keywords)
    }

    /// Snapshot of every custom field, including `Download-URL` and
    /// `Added-Via`. With `include_empty = false`, blank values are dropped.
    pub fn custom_fields(&self, include_empty: bool) -> CustomFields {
        let mut fields = self.fields.clone();
        if let Some(url) = &self.download_url {
            fields.set(CustomFieldName::DownloadUrl, url.as_str());
        }
        fields.set(CustomFieldName::AddedVia, self.added_via.as_str());
        if include_empty {
            fields
        } else {
            fields.without_empty()
        }
    }

    /// Adds tags not already present (exact match), keeping first-seen order.
    pub fn merge_tags<I, S>(&mut self, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for tag in tags {
            let tag = tag.into();
            let tag = tag.trim();
            if !tag.is_empty() && !self.tags.iter().any(|t| t == tag) {
                self.tags.push(tag.to_string());
            }
        }
    }

    /// Appends keyword terms not already present (case-insensitive) and
    /// clamps the result to `max_len` characters.
    pub fn merge_keywords(&mut self, keywords: &str, max_len: usize) {
        let mut terms: Vec<String> = self
            .keywords()
            .map(split_terms)
            .unwrap_or_default();
        for term in split_terms(keywords) {
            if !terms.iter().any(|t| t.to_lowercase() == term.to_lowercase()) {
                terms.push(term);
            }
        }
        if terms.is_empty() {
            return;
        }
        let merged = clamp_keywords(&terms.join(", "), max_len);
        self.fields.set(CustomFieldName::Keywords, merged);
    }
}

fn split_terms(s: &str) -> Vec<String> {
    s.split(',')
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

impl fmt::Display for DocumentRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dash = "-";
        writeln!(f, "{:<24}: {}", "Title", self.title)?;
        writeln!(f, "{:<24}: {}", "Created", self.created_iso())?;
        writeln!(
            f,
            "{:<24}: {}",
            "Document type",
            self.document_type.as_deref().unwrap_or(dash)
        )?;
        writeln!(f, "{:<24}: {}", "Download URL", self.download_url().unwrap_or(dash))?;
        if let Some(content) = &self.content {
            let preview: String = content.chars().take(60).collect();
            writeln!(f, "{:<24}: {preview}...", "Content")?;
        }
        let tags = if self.tags.is_empty() {
            dash.to_string()
        } else {
            self.tags.join(", ")
        };
        writeln!(f, "{:<24}: {tags}", "Tags")?;
        for (name, value) in self.custom_fields(false).known() {
            writeln!(f, "{:<24}: {value}", name.remote_name())?;
        }
        for (label, value) in [
            ("Article URL", &self.article_url),
            ("Storage path", &self.storage_path),
            ("Correspondent", &self.correspondent),
        ] {
            if let Some(value) = value {
                writeln!(f, "{label:<24}: {value}")?;
            }
        }
        Ok(())
    }
}

pub struct DocumentRecordBuilder {
    title: String,
    created: Option<String>,
    created_date: Option<NaiveDate>,
    document_type: Option<String>,
    download_url: Option<String>,
    content: Option<String>,
    tags: Vec<String>,
    added_via: AddedVia,
    fields: CustomFields,
    article_url: Option<String>,
    storage_path: Option<String>,
    correspondent: Option<String>,
}

impl DocumentRecordBuilder {
    pub fn new(title: impl Into<String>) -> Self {
        let fields = CustomFields::new()
            .with(CustomFieldName::Authors, NOT_SPECIFIED)
            .with(CustomFieldName::Source, NOT_SPECIFIED)
            .with(CustomFieldName::QuriskRelevance, DEFAULT_QURISK_RELEVANCE);
        Self {
            title: title.into(),
            created: None,
            created_date: None,
            document_type: None,
            download_url: None,
            content: None,
            tags: Vec::new(),
            added_via: AddedVia::Script,
            fields,
            article_url: None,
            storage_path: None,
            correspondent: None,
        }
    }

    /// Raw date string, coerced at build time.
    pub fn created(mut self, raw: impl Into<String>) -> Self {
        self.created = Some(raw.into());
        self
    }

    pub fn created_on(mut self, date: NaiveDate) -> Self {
        self.created_date = Some(date);
        self
    }

    pub fn document_type(mut self, document_type: impl Into<String>) -> Self {
        self.document_type = non_blank(document_type.into());
        self
    }

    pub fn download_url(mut self, url: impl Into<String>) -> Self {
        self.download_url = non_blank(url.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = non_blank(content.into());
        self
    }

    /// Ingest-time tags. They are not written to the dedup snapshot, so a
    /// merge that runs later from the post-consume hook never sees them;
    /// only an inline merge right after upload applies them.
    pub fn tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn added_via(mut self, added_via: AddedVia) -> Self {
        self.added_via = added_via;
        self
    }

    pub fn authors<I, S>(mut self, authors: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let authors: Vec<String> = authors
            .into_iter()
            .map(Into::into)
            .filter(|a| !a.trim().is_empty())
            .collect();
        if !authors.is_empty() {
            self.fields.set(CustomFieldName::Authors, authors);
        }
        self
    }

    pub fn field(mut self, name: CustomFieldName, value: impl Into<FieldValue>) -> Self {
        match name {
            CustomFieldName::DownloadUrl => {
                if let FieldValue::Text(url) = value.into() {
                    self.download_url = non_blank(url);
                }
            }
            CustomFieldName::AddedVia => {
                if let FieldValue::Text(via) = value.into() {
                    self.added_via = AddedVia::from(via);
                }
            }
            _ => self.fields.set(name, value),
        }
        self
    }

    pub fn keywords(self, keywords: impl Into<String>) -> Self {
        self.field(CustomFieldName::Keywords, keywords.into())
    }

    pub fn affiliated_organization(self, org: impl Into<String>) -> Self {
        self.field(CustomFieldName::AffiliatedOrganization, org.into())
    }

    pub fn source(self, source: impl Into<String>) -> Self {
        self.field(CustomFieldName::Source, source.into())
    }

    pub fn scope(self, scope: impl Into<String>) -> Self {
        self.field(CustomFieldName::Scope, scope.into())
    }

    pub fn theme(self, theme: impl Into<String>) -> Self {
        self.field(CustomFieldName::Theme, theme.into())
    }

    pub fn qurisk_relevance(self, relevance: i64) -> Self {
        self.field(CustomFieldName::QuriskRelevance, relevance)
    }

    pub fn import_query(self, query: impl Into<String>) -> Self {
        self.field(CustomFieldName::ImportQuery, query.into())
    }

    pub fn article_url(mut self, url: impl Into<String>) -> Self {
        self.article_url = non_blank(url.into());
        self
    }

    pub fn storage_path(mut self, path: impl Into<String>) -> Self {
        self.storage_path = non_blank(path.into());
        self
    }

    pub fn correspondent(mut self, correspondent: impl Into<String>) -> Self {
        self.correspondent = non_blank(correspondent.into());
        self
    }

    pub fn build(self) -> Result<DocumentRecord, ConstructionError> {
        let title = NormalizedTitle::parse(&self.title)?;
        let created = match (self.created_date, self.created) {
            (Some(date), _) => date,
            (None, Some(raw)) => parse_date(&raw)?,
            (None, None) => return Err(ConstructionError::InvalidDate(String::new())),
        };

        if self.added_via.requires_payload() && self.download_url.is_none() && self.content.is_none() {
            return Err(ConstructionError::MissingPayload {
                title: title.into_inner(),
            });
        }

        Ok(DocumentRecord {
            title,
            created,
            document_type: self.document_type,
            download_url: self.download_url,
            content: self.content,
            tags: self.tags,
            added_via: self.added_via,
            fields: self.fields,
            article_url: self.article_url,
            storage_path: self.storage_path,
            correspondent: self.correspondent,
        })
    }
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else if trimmed.len() == s.len() {
        Some(s)
    } else {
        Some(trimmed.to_string())
    }
}
