use chrono::NaiveDate;
use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use paperflow_core::{AddedVia, ConstructionError, CustomFieldName, DocumentRecord, parse_date};

use crate::error::Result;
use crate::sources::{ArticleLink, SourceAdapter, absolute_url, block_text, element_text};

pub const NAME: &str = "nist";
pub const BASE_URL: &str = "https://csrc.nist.gov";
pub const ADDED_VIA: &str = "scrapper-nist";
const SOURCE: &str = "https://nist.gov/";
const ORGANIZATION: &str = "NIST";
const TOPIC: &str = "27651%7Cpost-quantum+cryptography";

// (category, document type)
const CATEGORIES: [(&str, &str); 2] = [("news", "News-Article"), ("publications", "Scientific-Paper")];

fn selector(css: &str) -> Selector {
    Selector::parse(css).expect("valid selector")
}

static NEWS_ITEM: Lazy<Selector> = Lazy::new(|| selector("div.news-list-item"));
static NEWS_TITLE: Lazy<Selector> = Lazy::new(|| selector(".news-list-title a"));
static NEWS_DATE: Lazy<Selector> = Lazy::new(|| selector("strong[id^=news-date-]"));
static NEWS_CONTENT: Lazy<Selector> = Lazy::new(|| selector("#news-content"));
static PUB_ROW: Lazy<Selector> = Lazy::new(|| selector("tr[id^=result-]"));
static PUB_TITLE: Lazy<Selector> = Lazy::new(|| selector("a[id^=pub-title-link-]"));
static PUB_DATE: Lazy<Selector> = Lazy::new(|| selector("td[id^=pub-release-date-]"));
static PUB_RELEASE_DATE: Lazy<Selector> = Lazy::new(|| selector("#pub-release-date"));
static PUB_PDF: Lazy<Selector> = Lazy::new(|| selector("#pub-local-download-link"));
static PUB_AUTHORS: Lazy<Selector> = Lazy::new(|| selector("#pub-authors-container"));
static PUB_EDITORS: Lazy<Selector> = Lazy::new(|| selector("#pub-editors-container"));
static PUB_PANEL: Lazy<Selector> = Lazy::new(|| selector("div.publication-panel"));

/// NIST CSRC post-quantum cryptography news and publications.
pub struct NistSource {
    base_url: String,
}

impl NistSource {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn document_type(category: &str) -> &'static str {
        CATEGORIES
            .iter()
            .find(|(name, _)| *name == category)
            .map(|(_, document_type)| *document_type)
            .unwrap_or("News-Article")
    }
}

impl Default for NistSource {
    fn default() -> Self {
        Self::new()
    }
}

/// CSRC writes dates month-first (`08/13/2024`, `August 13, 2024`).
fn us_date(raw: &str) -> std::result::Result<NaiveDate, ConstructionError> {
    let trimmed = raw.trim();
    NaiveDate::parse_from_str(trimmed, "%m/%d/%Y").or_else(|_| parse_date(trimmed))
}

impl SourceAdapter for NistSource {
    fn name(&self) -> &str {
        NAME
    }

    fn categories(&self) -> Vec<String> {
        CATEGORIES.iter().map(|(name, _)| name.to_string()).collect()
    }

    /// `ipp=all` puts every result on one page, so `page` is ignored.
    fn listing_url(&self, category: &str, _page: Option<u32>) -> String {
        match category {
            "publications" => format!(
                "{}/publications/search?ipp-sm=all&topics-sm={TOPIC}&topicsMatch-sm=ANY&controlsMatch-sm=ANY&status-sm=Final,Draft",
                self.base_url
            ),
            other => format!(
                "{}/{other}?sortBy-lg=NewsDateTime+DESC&ipp-lg=all&topics-lg={TOPIC}&topicsMatch-lg=ANY",
                self.base_url
            ),
        }
    }

    fn paginate(&self, _category: &str, _html: &str) -> Vec<u32> {
        Vec::new()
    }

    fn list_articles(&self, category: &str, html: &str) -> Result<Vec<ArticleLink>> {
        let document = Html::parse_document(html);
        let (row, title, date) = match category {
            "publications" => (&*PUB_ROW, &*PUB_TITLE, &*PUB_DATE),
            _ => (&*NEWS_ITEM, &*NEWS_TITLE, &*NEWS_DATE),
        };

        let mut links = Vec::new();
        for item in document.select(row) {
            let Some(anchor) = item.select(title).next() else {
                continue;
            };
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            links.push(ArticleLink {
                category: category.to_string(),
                title: element_text(&anchor),
                date: item
                    .select(date)
                    .next()
                    .map(|d| element_text(&d))
                    .filter(|d| !d.is_empty()),
                url: absolute_url(&self.base_url, href),
            });
        }
        Ok(links)
    }

    fn parse_article(&self, link: &ArticleLink, html: &str) -> Result<DocumentRecord> {
        let document = Html::parse_document(html);
        let mut date = link.date.clone();
        let mut content = None;
        let mut download_url = None;
        let mut authors = None;

        if link.category == "publications" {
            if date.is_none() {
                date = document.select(&PUB_RELEASE_DATE).next().map(|d| element_text(&d));
            }
            download_url = document
                .select(&PUB_PDF)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(|href| absolute_url(&self.base_url, href));
            if download_url.is_none() {
                content = document.select(&PUB_PANEL).next().map(|p| block_text(&p));
            }
            authors = document
                .select(&PUB_AUTHORS)
                .next()
                .or_else(|| document.select(&PUB_EDITORS).next())
                .map(|a| element_text(&a))
                .filter(|a| !a.is_empty());
        } else {
            content = document.select(&NEWS_CONTENT).next().map(|c| block_text(&c));
        }

        let created = us_date(date.as_deref().unwrap_or_default())?;
        let mut builder = DocumentRecord::builder(&link.title)
            .created_on(created)
            .document_type(Self::document_type(&link.category))
            .added_via(AddedVia::Scraper(ADDED_VIA.to_string()))
            .affiliated_organization(ORGANIZATION)
            .source(SOURCE)
            .article_url(&link.url);
        if let Some(url) = download_url {
            builder = builder.download_url(url);
        }
        if let Some(content) = content {
            builder = builder.content(content);
        }
        if let Some(authors) = authors {
            builder = builder.field(CustomFieldName::Authors, authors);
        }
        Ok(builder.build()?)
    }
}
