use std::time::Duration;

use async_trait::async_trait;

use paperflow_core::config::ArxivConfig;

use crate::arxiv::parser::parse_feed;
use crate::arxiv::types::{ArxivEntry, ArxivSearch};
use crate::error::Result;
use crate::http::{HostThrottle, RateLimitedClient};
use crate::identifiers::ArxivId;

/// Paged access to arXiv search results.
#[async_trait]
pub trait PaperSearch: Send + Sync {
    async fn search(&self, search: &ArxivSearch) -> Result<Vec<ArxivEntry>>;
    async fn fetch(&self, id: &ArxivId) -> Result<Option<ArxivEntry>>;
}

pub struct ArxivClient {
    client: RateLimitedClient,
    base_url: String,
}

impl ArxivClient {
    pub fn new(config: &ArxivConfig, throttle: HostThrottle, user_agent: &str) -> Result<Self> {
        Self::with_params(
            &config.base_url,
            Duration::from_millis(config.min_interval_ms),
            throttle,
            user_agent,
        )
    }

    pub fn with_params(base_url: &str, min_interval: Duration, throttle: HostThrottle, user_agent: &str) -> Result<Self> {
        Ok(Self {
            client: RateLimitedClient::new(throttle, min_interval, 3, user_agent)?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn query_url(&self) -> String {
        format!("{}/api/query", self.base_url)
    }
}

#[async_trait]
impl PaperSearch for ArxivClient {
    async fn search(&self, search: &ArxivSearch) -> Result<Vec<ArxivEntry>> {
        let xml = self
            .client
            .get_with_query(&self.query_url(), &search.to_params())
            .await?;
        let entries = parse_feed(&xml)?;
        tracing::debug!(
            query = %search.query,
            start = search.start,
            results = entries.len(),
            "arxiv search page"
        );
        Ok(entries)
    }

    async fn fetch(&self, id: &ArxivId) -> Result<Option<ArxivEntry>> {
        let xml = self
            .client
            .get_with_query(&self.query_url(), &[("id_list", id.versioned())])
            .await?;
        Ok(parse_feed(&xml)?.into_iter().next())
    }
}
