use once_cell::sync::Lazy;
use scraper::{Html, Selector};

use paperflow_core::{AddedVia, CustomFieldName, DocumentRecord};

use crate::error::Result;
use crate::sources::{ArticleLink, SourceAdapter, absolute_url, block_text, element_text, page_numbers};

pub const NAME: &str = "quantum-insider";
pub const BASE_URL: &str = "https://thequantuminsider.com";
pub const ADDED_VIA: &str = "scrapper-quantuminsider";
const DOCUMENT_TYPE: &str = "News-Article";
const CATEGORY: &str = "category/daily";

static ARTICLE: Lazy<Selector> = Lazy::new(|| Selector::parse("article").expect("valid selector"));
static TITLE_LINK: Lazy<Selector> =
    Lazy::new(|| Selector::parse("h6.elementor-post__title a").expect("valid selector"));
static DATE: Lazy<Selector> = Lazy::new(|| Selector::parse(".elementor-post-date").expect("valid selector"));
static PAGE_NUMBERS: Lazy<Selector> =
    Lazy::new(|| Selector::parse("nav.elementor-pagination .page-numbers").expect("valid selector"));
static AUTHOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("span.elementor-post-info__item--type-author").expect("valid selector"));
static CONTENT: Lazy<Selector> =
    Lazy::new(|| Selector::parse("div.elementor-widget-theme-post-content").expect("valid selector"));

/// The Quantum Insider daily news feed.
pub struct QuantumInsiderSource {
    base_url: String,
}

impl QuantumInsiderSource {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

impl Default for QuantumInsiderSource {
    fn default() -> Self {
        Self::new()
    }
}

impl SourceAdapter for QuantumInsiderSource {
    fn name(&self) -> &str {
        NAME
    }

    fn categories(&self) -> Vec<String> {
        vec![CATEGORY.to_string()]
    }

    fn listing_url(&self, category: &str, page: Option<u32>) -> String {
        match page {
            Some(page) => format!("{}/{category}/page/{page}", self.base_url),
            None => format!("{}/{category}", self.base_url),
        }
    }

    fn paginate(&self, _category: &str, html: &str) -> Vec<u32> {
        let document = Html::parse_document(html);
        let texts: Vec<String> = document.select(&PAGE_NUMBERS).map(|e| element_text(&e)).collect();
        page_numbers(texts.iter().map(String::as_str))
    }

    fn list_articles(&self, category: &str, html: &str) -> Result<Vec<ArticleLink>> {
        let document = Html::parse_document(html);
        let mut links = Vec::new();
        for article in document.select(&ARTICLE) {
            let Some(anchor) = article.select(&TITLE_LINK).next() else {
                continue;
            };
            let Some(href) = anchor.value().attr("href") else {
                continue;
            };
            let title = element_text(&anchor);
            if title.is_empty() {
                continue;
            }
            links.push(ArticleLink {
                category: category.to_string(),
                title,
                date: article.select(&DATE).next().map(|d| element_text(&d)),
                url: absolute_url(&self.base_url, href),
            });
        }
        Ok(links)
    }

    fn parse_article(&self, link: &ArticleLink, html: &str) -> Result<DocumentRecord> {
        let document = Html::parse_document(html);
        let authors = document.select(&AUTHOR).next().map(|a| element_text(&a));
        let content = document.select(&CONTENT).next().map(|c| block_text(&c));

        let mut builder = DocumentRecord::builder(&link.title)
            .created(link.date.clone().unwrap_or_default())
            .document_type(DOCUMENT_TYPE)
            .added_via(AddedVia::Scraper(ADDED_VIA.to_string()))
            .content(content.unwrap_or_default())
            .article_url(&link.url);
        if let Some(authors) = authors.filter(|a| !a.is_empty()) {
            builder = builder.field(CustomFieldName::Authors, authors);
        }
        Ok(builder.build()?)
    }
}
