//! Shodan InternetDB: open ports, CPEs and hostnames in one lookup

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use lookout_core::{Cpe, EnrichmentKind, EnrichmentResult, Port, ReverseDnsName};
use lookout_net::{check_status, create_client, HttpConfig, NetError};

use crate::{Enricher, LookupError};

pub const INTERNETDB_URL: &str = "https://internetdb.shodan.io";

#[derive(Debug, Default, Deserialize)]
pub struct InternetDbResponse {
    #[serde(default)]
    pub ports: Vec<u16>,
    #[serde(default)]
    pub cpes: Vec<String>,
    #[serde(default)]
    pub hostnames: Vec<String>,
}

impl InternetDbResponse {
    pub fn into_result(self) -> Option<EnrichmentResult> {
        let result = EnrichmentResult {
            ports: self.ports.into_iter().map(|port| Port { port }).collect(),
            cpes: self.cpes.into_iter().map(|name| Cpe { name }).collect(),
            reverse_dns_names: self
                .hostnames
                .into_iter()
                .map(|name| ReverseDnsName { name })
                .collect(),
            ..Default::default()
        };
        (!result.is_empty()).then_some(result)
    }
}

pub struct InternetDbEnricher {
    client: Client,
    base_url: String,
}

impl InternetDbEnricher {
    pub fn new(http: &HttpConfig) -> Result<Self, NetError> {
        Ok(Self {
            client: create_client(http)?,
            base_url: INTERNETDB_URL.to_string(),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl Enricher for InternetDbEnricher {
    fn name(&self) -> &str {
        "internetdb"
    }

    fn capabilities(&self) -> &[EnrichmentKind] {
        &[
            EnrichmentKind::Ports,
            EnrichmentKind::Cpes,
            EnrichmentKind::ReverseDns,
        ]
    }

    async fn lookup(&self, key: &str) -> Result<Option<EnrichmentResult>, LookupError> {
        let url = format!("{}/{}", self.base_url, key);
        let response = self.client.get(&url).send().await.map_err(NetError::from)?;

        // {"detail": "No information available"}
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: InternetDbResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| NetError::InvalidResponse(e.to_string()))?;

        Ok(body.into_result())
    }
}
