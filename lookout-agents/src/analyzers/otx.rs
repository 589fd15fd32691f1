//! AlienVault OTX passive DNS

use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::net::IpAddr;
use tracing::debug;

use lookout_core::{classify, refang, DataType, FetchOptions, RawArtifact};
use lookout_net::{
    check_status, create_client, retry_with_backoff, HttpConfig, NetError, RetryPolicy,
};

use crate::{Analyzer, FetchError};

pub const OTX_URL: &str = "https://otx.alienvault.com";

/// Resolves a domain to the IPs it pointed at, or an IP to the names that
/// pointed at it
pub struct OtxAnalyzer {
    client: Client,
    base_url: String,
    api_key: String,
}

impl OtxAnalyzer {
    pub fn new(http: &HttpConfig, api_key: &str) -> Result<Self, NetError> {
        Ok(Self {
            client: create_client(http)?,
            base_url: OTX_URL.to_string(),
            api_key: api_key.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    /// Endpoint and the passive DNS field to collect for a refanged query
    fn endpoint(&self, query: &str) -> Result<(String, &'static str), FetchError> {
        let section = match classify(query) {
            DataType::Domain => "domain",
            DataType::Ip => match query.parse::<IpAddr>() {
                Ok(IpAddr::V6(_)) => "IPv6",
                _ => "IPv4",
            },
            other => {
                return Err(FetchError::Permanent(format!(
                    "{} (type: {}) is not supported by otx",
                    query, other
                )))
            }
        };

        let field = if section == "domain" { "address" } else { "hostname" };
        let url = format!(
            "{}/api/v1/indicators/{}/{}/passive_dns",
            self.base_url,
            section,
            urlencoding::encode(query)
        );
        Ok((url, field))
    }

    async fn passive_dns(&self, url: &str) -> Result<Value, FetchError> {
        let response = self
            .client
            .get(url)
            .header("X-OTX-API-KEY", &self.api_key)
            .send()
            .await
            .map_err(NetError::from)?;
        let body: Value = check_status(response)?
            .json()
            .await
            .map_err(|e| NetError::InvalidResponse(e.to_string()))?;
        Ok(body)
    }
}

/// Values of `field` across the passive DNS records
pub fn parse_passive_dns(body: &Value, field: &str) -> Vec<RawArtifact> {
    body.get("passive_dns")
        .and_then(Value::as_array)
        .map(|records| {
            records
                .iter()
                .filter_map(|record| {
                    let value = record.get(field)?.as_str()?;
                    (!value.is_empty()).then(|| RawArtifact::new(value).with_metadata(record.clone()))
                })
                .collect()
        })
        .unwrap_or_default()
}

#[async_trait]
impl Analyzer for OtxAnalyzer {
    fn name(&self) -> &str {
        "otx"
    }

    async fn fetch(
        &self,
        query: &str,
        _options: &FetchOptions,
        retry: &RetryPolicy,
    ) -> Result<Vec<RawArtifact>, FetchError> {
        let query = refang(query.trim());
        let (url, field) = self.endpoint(&query)?;
        debug!("Querying OTX: {}", url);

        let body = retry_with_backoff(retry, "otx", || self.passive_dns(&url)).await?;

        Ok(parse_passive_dns(&body, field))
    }
}
