//! crt.sh certificate transparency search

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use lookout_core::{FetchOptions, RawArtifact};
use lookout_net::{
    check_status, create_client, retry_with_backoff, HttpConfig, NetError, RetryPolicy,
};

use crate::{Analyzer, FetchError};

pub const CRTSH_URL: &str = "https://crt.sh";

/// Turns certificates matching a query into domain artifacts
pub struct CrtshAnalyzer {
    client: Client,
    base_url: String,
    exclude_expired: bool,
}

impl CrtshAnalyzer {
    pub fn new(http: &HttpConfig, exclude_expired: bool) -> Result<Self, NetError> {
        Ok(Self {
            client: create_client(http)?,
            base_url: CRTSH_URL.to_string(),
            exclude_expired,
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn search_url(&self, query: &str) -> String {
        let mut url = format!(
            "{}/?q={}&output=json",
            self.base_url,
            urlencoding::encode(query)
        );
        if self.exclude_expired {
            url.push_str("&exclude=expired");
        }
        url
    }

    async fn search(&self, url: &str) -> Result<Vec<Value>, FetchError> {
        let response = self.client.get(url).send().await.map_err(NetError::from)?;
        let entries: Vec<Value> = check_status(response)?
            .json()
            .await
            .map_err(|e| NetError::InvalidResponse(e.to_string()))?;
        Ok(entries)
    }
}

/// One artifact per name in each certificate's `name_value`.
///
/// Wildcard names are dropped. The certificate entry is kept as metadata.
pub fn parse_certificates(entries: &[Value]) -> Vec<RawArtifact> {
    entries
        .iter()
        .flat_map(|entry| {
            let names = entry
                .get("name_value")
                .and_then(Value::as_str)
                .unwrap_or_default();

            names
                .lines()
                .map(str::trim)
                .filter(|name| !name.is_empty() && !name.starts_with("*."))
                .map(|name| RawArtifact::new(name).with_metadata(entry.clone()))
                .collect::<Vec<_>>()
        })
        .collect()
}

#[async_trait]
impl Analyzer for CrtshAnalyzer {
    fn name(&self) -> &str {
        "crtsh"
    }

    async fn fetch(
        &self,
        query: &str,
        _options: &FetchOptions,
        retry: &RetryPolicy,
    ) -> Result<Vec<RawArtifact>, FetchError> {
        let url = self.search_url(query);
        debug!("Querying crt.sh: {}", url);

        let entries = retry_with_backoff(retry, "crtsh", || self.search(&url)).await?;

        let artifacts = parse_certificates(&entries);
        debug!(
            "crt.sh returned {} certificates, {} names",
            entries.len(),
            artifacts.len()
        );
        Ok(artifacts)
    }
}
