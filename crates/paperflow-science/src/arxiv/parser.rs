use chrono::{DateTime, Utc};
use quick_xml::de::from_str;
use serde::Deserialize;

use crate::arxiv::types::ArxivEntry;
use crate::error::{Result, ScienceError};
use crate::identifiers::ArxivId;

#[derive(Debug, Deserialize)]
struct AtomFeed {
    #[serde(rename = "entry", default)]
    entries: Vec<AtomEntry>,
}

#[derive(Debug, Deserialize)]
struct AtomEntry {
    id: String,
    title: String,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    published: String,
    #[serde(rename = "author", default)]
    authors: Vec<AtomAuthor>,
    #[serde(rename = "category", default)]
    categories: Vec<AtomCategory>,
    #[serde(rename = "link", default)]
    links: Vec<AtomLink>,
}

#[derive(Debug, Deserialize)]
struct AtomAuthor {
    name: String,
    #[serde(rename = "arxiv:affiliation", alias = "affiliation")]
    affiliation: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomCategory {
    #[serde(rename = "@term")]
    term: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AtomLink {
    #[serde(rename = "@href")]
    href: Option<String>,
    #[serde(rename = "@type")]
    link_type: Option<String>,
    #[serde(rename = "@title")]
    title: Option<String>,
}

/// Parses an arXiv API response. An empty feed is an empty page, not an error.
pub fn parse_feed(xml: &str) -> Result<Vec<ArxivEntry>> {
    let feed: AtomFeed = from_str(xml).map_err(|e| ScienceError::Parse(format!("invalid atom xml: {e}")))?;

    if let Some(error) = feed.entries.iter().find(|e| e.id.contains("/api/errors")) {
        return Err(ScienceError::ApiError(
            "arxiv".to_string(),
            clean_text(&error.summary),
        ));
    }

    feed.entries.into_iter().map(parse_entry).collect()
}

fn parse_entry(entry: AtomEntry) -> Result<ArxivEntry> {
    let arxiv_id = ArxivId::parse(entry.id.trim())
        .map_err(|_| ScienceError::Parse(format!("invalid arXiv id in entry: {}", entry.id)))?;

    let published = DateTime::parse_from_rfc3339(entry.published.trim())
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| ScienceError::Parse(format!("invalid published datetime for {arxiv_id}: {e}")))?;

    let mut affiliations: Vec<String> = Vec::new();
    let mut authors = Vec::with_capacity(entry.authors.len());
    for author in entry.authors {
        authors.push(clean_text(&author.name));
        if let Some(aff) = clean_optional(author.affiliation)
            && !affiliations.contains(&aff)
        {
            affiliations.push(aff);
        }
    }

    let pdf_url = entry
        .links
        .iter()
        .find(|link| {
            link.link_type.as_deref() == Some("application/pdf") || link.title.as_deref() == Some("pdf")
        })
        .and_then(|link| link.href.as_deref())
        .map(https)
        .unwrap_or_else(|| arxiv_id.pdf_url());

    Ok(ArxivEntry {
        title: clean_text(&entry.title),
        authors,
        affiliations,
        summary: clean_text(&entry.summary),
        published,
        categories: entry
            .categories
            .into_iter()
            .filter_map(|c| clean_optional(c.term))
            .collect(),
        pdf_url,
        abs_url: arxiv_id.abs_url(),
        arxiv_id,
    })
}

fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn clean_optional(value: Option<String>) -> Option<String> {
    value.map(|v| clean_text(&v)).filter(|v| !v.is_empty())
}

fn https(url: &str) -> String {
    match url.strip_prefix("http://arxiv.org/") {
        Some(rest) => format!("https://arxiv.org/{rest}"),
        None => url.to_string(),
    }
}
