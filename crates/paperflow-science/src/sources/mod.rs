//! Site scraping: one [`SourceAdapter`] per site, driven by [`SiteScraper`].

use std::collections::HashSet;

use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::Url;
use scraper::ElementRef;

use paperflow_core::DocumentRecord;

use crate::error::{Result, ScienceError};
use crate::http::RateLimitedClient;

pub mod nist;
pub mod quantum_insider;

pub use nist::NistSource;
pub use quantum_insider::QuantumInsiderSource;

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d+\b").expect("valid regex"));

/// An article found on a listing page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArticleLink {
    pub category: String,
    pub title: String,
    pub date: Option<String>,
    pub url: String,
}

/// Site-specific parsing. Adapters never do I/O; the driver fetches pages
/// and hands them the HTML.
pub trait SourceAdapter: Send + Sync {
    /// Configuration name, e.g. `quantum-insider`.
    fn name(&self) -> &str;

    fn categories(&self) -> Vec<String>;

    /// Listing URL of `category`; `None` is the unpaginated first page.
    fn listing_url(&self, category: &str, page: Option<u32>) -> String;

    /// Page numbers announced by a listing page. Empty means one page.
    fn paginate(&self, category: &str, html: &str) -> Vec<u32>;

    fn list_articles(&self, category: &str, html: &str) -> Result<Vec<ArticleLink>>;

    fn is_relevant(&self, _link: &ArticleLink) -> bool {
        true
    }

    fn parse_article(&self, link: &ArticleLink, html: &str) -> Result<DocumentRecord>;
}

/// Adapter for a configured site name.
pub fn adapter_for(name: &str) -> Option<Box<dyn SourceAdapter>> {
    match name {
        quantum_insider::NAME => Some(Box::new(QuantumInsiderSource::new())),
        nist::NAME => Some(Box::new(NistSource::new())),
        _ => None,
    }
}

pub fn available_sites() -> [&'static str; 2] {
    [quantum_insider::NAME, nist::NAME]
}

/// Walks the listing pages of one site and turns articles into records.
pub struct SiteScraper {
    client: RateLimitedClient,
    adapter: Box<dyn SourceAdapter>,
    max_pages: Option<usize>,
}

impl SiteScraper {
    pub fn new(client: RateLimitedClient, adapter: Box<dyn SourceAdapter>) -> Self {
        Self {
            client,
            adapter,
            max_pages: None,
        }
    }

    pub fn with_max_pages(mut self, max_pages: Option<usize>) -> Self {
        self.max_pages = max_pages;
        self
    }

    pub fn name(&self) -> &str {
        self.adapter.name()
    }

    /// Every relevant article link, in listing order, without duplicates.
    ///
    /// A failing first listing page aborts the site; later pages are
    /// skipped with a warning.
    pub async fn discover(&self) -> Result<Vec<ArticleLink>> {
        let mut seen = HashSet::new();
        let mut links = Vec::new();

        for category in self.adapter.categories() {
            let first_url = self.adapter.listing_url(&category, None);
            let first = self.client.get(&first_url).await?;
            let mut pages = self.adapter.paginate(&category, &first);
            if let Some(max) = self.max_pages {
                pages.truncate(max);
            }
            tracing::info!(site = self.name(), %category, pages = pages.len().max(1), "listing");

            let mut listings = Vec::new();
            if pages.is_empty() {
                listings.push(first);
            } else {
                for page in pages {
                    let url = self.adapter.listing_url(&category, Some(page));
                    match self.client.get(&url).await {
                        Ok(html) => listings.push(html),
                        Err(e) => tracing::warn!(site = self.name(), %url, error = %e, "listing page skipped"),
                    }
                }
            }

            for html in listings {
                for link in self.adapter.list_articles(&category, &html)? {
                    if !self.adapter.is_relevant(&link) {
                        tracing::debug!(title = %link.title, "not relevant");
                        continue;
                    }
                    if seen.insert(link.url.clone()) {
                        links.push(link);
                    }
                }
            }
        }
        Ok(links)
    }

    pub async fn fetch_record(&self, link: &ArticleLink) -> Result<DocumentRecord> {
        let html = self
            .client
            .get(&link.url)
            .await
            .map_err(|e| ScienceError::ContentAcquisition {
                title: link.title.clone(),
                reason: e.to_string(),
            })?;
        self.adapter.parse_article(link, &html)
    }
}

// ─── HTML helpers ─────────────────────────────────────────────────────────────

pub(crate) fn element_text(element: &ElementRef<'_>) -> String {
    element.text().collect::<Vec<_>>().join(" ").split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Text of a block, one trimmed line per text node.
pub(crate) fn block_text(element: &ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn absolute_url(base: &str, href: &str) -> String {
    match Url::parse(base).and_then(|b| b.join(href.trim())) {
        Ok(url) => url.to_string(),
        Err(_) => href.trim().to_string(),
    }
}

/// Distinct numbers in `texts`, sorted.
pub(crate) fn page_numbers<'a>(texts: impl IntoIterator<Item = &'a str>) -> Vec<u32> {
    let mut numbers: Vec<u32> = texts
        .into_iter()
        .flat_map(|t| NUMBER_RE.find_iter(t).filter_map(|m| m.as_str().parse().ok()).collect::<Vec<u32>>())
        .collect();
    numbers.sort_unstable();
    numbers.dedup();
    numbers
}
