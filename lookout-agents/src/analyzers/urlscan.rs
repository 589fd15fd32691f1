//! urlscan.io search with `search_after` pagination

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use lookout_core::{FetchOptions, RawArtifact};
use lookout_net::{
    check_status, create_client, paginate, HttpConfig, NetError, Page, PageOptions, RetryPolicy,
};

use crate::{Analyzer, FetchError};

pub const URLSCAN_URL: &str = "https://urlscan.io";

/// Results requested per page
pub const PAGE_SIZE: usize = 1000;

/// Page fields turned into artifacts, in output order
const PAGE_FIELDS: [&str; 3] = ["url", "domain", "ip"];

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Value>,
}

pub struct UrlscanAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
    page_size: usize,
}

impl UrlscanAnalyzer {
    pub fn new(http: &HttpConfig, api_key: &str) -> Result<Self, NetError> {
        Ok(Self {
            client: create_client(http)?,
            base_url: URLSCAN_URL.to_string(),
            api_key: api_key.to_string(),
            page_size: PAGE_SIZE,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    fn search_url(&self, query: &str, search_after: Option<&str>) -> String {
        let mut url = format!(
            "{}/api/v1/search/?q={}&size={}",
            self.base_url,
            urlencoding::encode(query),
            self.page_size
        );
        if let Some(cursor) = search_after {
            url.push_str("&search_after=");
            url.push_str(&urlencoding::encode(cursor));
        }
        url
    }

    async fn search_page(
        &self,
        query: &str,
        search_after: Option<String>,
    ) -> Result<Page<Value>, FetchError> {
        let url = self.search_url(query, search_after.as_deref());
        debug!("Querying urlscan: {}", url);

        let response = self
            .client
            .get(&url)
            .header("API-Key", &self.api_key)
            .send()
            .await
            .map_err(NetError::from)?;
        let body: SearchResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| NetError::InvalidResponse(e.to_string()))?;

        let next = next_cursor(&body.results, self.page_size);
        Ok(Page {
            items: body.results,
            next,
        })
    }
}

/// Cursor for the page after `results`, or `None` on a short page
pub fn next_cursor(results: &[Value], page_size: usize) -> Option<String> {
    if results.len() < page_size {
        return None;
    }

    let sort = results.last()?.get("sort")?.as_array()?;
    let parts: Vec<String> = sort
        .iter()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    (!parts.is_empty()).then(|| parts.join(","))
}

/// URL, domain and IP of each scanned page, unique per field
pub fn parse_results(results: &[Value]) -> Vec<RawArtifact> {
    let mut artifacts = Vec::new();

    for field in PAGE_FIELDS {
        let mut seen = std::collections::HashSet::new();
        for result in results {
            let Some(value) = result
                .get("page")
                .and_then(|page| page.get(field))
                .and_then(Value::as_str)
            else {
                continue;
            };

            if !value.is_empty() && seen.insert(value) {
                artifacts.push(RawArtifact::new(value).with_metadata(result.clone()));
            }
        }
    }

    artifacts
}

#[async_trait]
impl Analyzer for UrlscanAnalyzer {
    fn name(&self) -> &str {
        "urlscan"
    }

    async fn fetch(
        &self,
        query: &str,
        options: &FetchOptions,
        retry: &RetryPolicy,
    ) -> Result<Vec<RawArtifact>, FetchError> {
        let page_options = PageOptions {
            interval: Duration::from_millis(options.interval_ms),
            max_pages: options.max_pages,
        };

        let results =
            paginate(&page_options, retry, |cursor| self.search_page(query, cursor)).await?;
        Ok(parse_results(&results))
    }
}
