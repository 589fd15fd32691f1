//! Google Public DNS over its JSON API

use async_trait::async_trait;
use futures::future::join_all;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use lookout_core::{DnsRecord, DnsResource, EnrichmentKind, EnrichmentResult};
use lookout_net::{check_status, create_client, HttpConfig, NetError};

use crate::{Enricher, LookupError};

pub const GOOGLE_DNS_URL: &str = "https://dns.google";

#[derive(Debug, Deserialize)]
pub struct ResolveResponse {
    #[serde(rename = "Status")]
    pub status: u32,
    #[serde(rename = "Answer", default)]
    pub answer: Vec<Answer>,
}

#[derive(Debug, Deserialize)]
pub struct Answer {
    pub name: String,
    #[serde(rename = "type")]
    pub record_type: u16,
    pub data: String,
}

fn type_code(resource: DnsResource) -> u16 {
    match resource {
        DnsResource::A => 1,
        DnsResource::Ns => 2,
        DnsResource::Cname => 5,
        DnsResource::Mx => 15,
        DnsResource::Txt => 16,
        DnsResource::Aaaa => 28,
    }
}

/// Records of the requested type; answers for other types (CNAME chains)
/// are skipped
pub fn records_from(resource: DnsResource, response: &ResolveResponse) -> Vec<DnsRecord> {
    response
        .answer
        .iter()
        .filter(|answer| answer.record_type == type_code(resource))
        .map(|answer| DnsRecord {
            resource,
            value: answer.data.trim_matches('"').to_string(),
        })
        .collect()
}

/// Records of every type that resolved.
///
/// One failing type does not discard the others; only when every type failed
/// is the first error returned.
pub fn merge_resolved(
    results: Vec<(DnsResource, Result<Vec<DnsRecord>, NetError>)>,
) -> Result<Vec<DnsRecord>, NetError> {
    let mut records = Vec::new();
    let mut resolved_any = false;
    let mut first_error = None;

    for (resource, result) in results {
        match result {
            Ok(found) => {
                resolved_any = true;
                records.extend(found);
            }
            Err(e) => {
                debug!("DNS {} query failed: {}", resource.as_str(), e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) if !resolved_any => Err(e),
        _ => Ok(records),
    }
}

pub struct GooglePublicDnsEnricher {
    client: Client,
    base_url: String,
}

impl GooglePublicDnsEnricher {
    pub fn new(http: &HttpConfig) -> Result<Self, NetError> {
        Ok(Self {
            client: create_client(http)?,
            base_url: GOOGLE_DNS_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    async fn resolve(&self, name: &str, resource: DnsResource) -> Result<Vec<DnsRecord>, NetError> {
        let url = format!(
            "{}/resolve?name={}&type={}",
            self.base_url,
            urlencoding::encode(name),
            resource.as_str()
        );

        let response = self.client.get(&url).send().await?;
        let body: ResolveResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| NetError::InvalidResponse(e.to_string()))?;

        Ok(records_from(resource, &body))
    }
}

#[async_trait]
impl Enricher for GooglePublicDnsEnricher {
    fn name(&self) -> &str {
        "google_public_dns"
    }

    fn capabilities(&self) -> &[EnrichmentKind] {
        &[EnrichmentKind::Dns]
    }

    async fn lookup(&self, key: &str) -> Result<Option<EnrichmentResult>, LookupError> {
        let lookups = DnsResource::ALL
            .into_iter()
            .map(|resource| async move { (resource, self.resolve(key, resource).await) });

        let records = merge_resolved(join_all(lookups).await)?;

        if records.is_empty() {
            return Ok(None);
        }

        Ok(Some(EnrichmentResult {
            dns_records: records,
            ..Default::default()
        }))
    }
}
