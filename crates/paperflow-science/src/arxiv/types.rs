use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use paperflow_core::{ConstructionError, DocumentRecord};

use crate::identifiers::ArxivId;

pub const ARXIV_SOURCE: &str = "https://arxiv.org/";
pub const SCIENTIFIC_PAPER: &str = "Scientific-Paper";

/// One `<entry>` of an arXiv Atom feed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArxivEntry {
    pub arxiv_id: ArxivId,
    pub title: String,
    pub authors: Vec<String>,
    pub affiliations: Vec<String>,
    pub summary: String,
    pub published: DateTime<Utc>,
    pub categories: Vec<String>,
    pub pdf_url: String,
    pub abs_url: String,
}

impl ArxivEntry {
    /// The record that gets uploaded for this entry. `import_query` is the
    /// search or identifier that produced it.
    pub fn to_record(&self, import_query: &str) -> Result<DocumentRecord, ConstructionError> {
        let mut builder = DocumentRecord::builder(&self.title)
            .created_on(self.published.date_naive())
            .document_type(SCIENTIFIC_PAPER)
            .download_url(&self.pdf_url)
            .article_url(&self.abs_url)
            .authors(self.authors.iter().cloned())
            .source(ARXIV_SOURCE)
            .import_query(import_query);
        if !self.affiliations.is_empty() {
            builder = builder.affiliated_organization(self.affiliations.join("; "));
        }
        builder.build()
    }
}

/// Parameters of one arXiv search page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArxivSearch {
    pub query: String,
    pub start: u32,
    pub max_results: u32,
    pub sort_by: SortBy,
    pub sort_order: SortOrder,
}

impl ArxivSearch {
    /// Newest submissions first.
    pub fn new(query: impl Into<String>, start: u32, max_results: u32) -> Self {
        Self {
            query: query.into(),
            start,
            max_results,
            sort_by: SortBy::SubmittedDate,
            sort_order: SortOrder::Descending,
        }
    }

    pub fn next_page(&self) -> Self {
        Self {
            start: self.start + self.max_results,
            ..self.clone()
        }
    }

    pub fn to_params(&self) -> Vec<(&'static str, String)> {
        vec![
            ("search_query", self.query.clone()),
            ("start", self.start.to_string()),
            ("max_results", self.max_results.to_string()),
            ("sortBy", self.sort_by.as_str().to_string()),
            ("sortOrder", self.sort_order.as_str().to_string()),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortBy {
    Relevance,
    LastUpdatedDate,
    SubmittedDate,
}

impl SortBy {
    pub fn as_str(self) -> &'static str {
        match self {
            SortBy::Relevance => "relevance",
            SortBy::LastUpdatedDate => "lastUpdatedDate",
            SortBy::SubmittedDate => "submittedDate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn as_str(self) -> &'static str {
        match self {
            SortOrder::Ascending => "ascending",
            SortOrder::Descending => "descending",
        }
    }
}
