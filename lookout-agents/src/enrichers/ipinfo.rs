//! IPInfo geolocation and autonomous system

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;

use lookout_core::{AutonomousSystem, EnrichmentKind, EnrichmentResult, Geolocation};
use lookout_net::{check_status, create_client, HttpConfig, NetError};

use crate::{Enricher, LookupError};

/// Free endpoint, rate limited without a token
pub const IPINFO_URL: &str = "https://ipinfo.io";
/// Lite endpoint, requires a token, includes country names
pub const IPINFO_LITE_URL: &str = "https://api.ipinfo.io/lite";

/// Both the standard and the lite response shapes
#[derive(Debug, Default, Deserialize)]
pub struct IpInfoResponse {
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub country_code: Option<String>,
    #[serde(default)]
    pub asn: Option<String>,
    /// `AS13335 Cloudflare, Inc.` in the standard shape
    #[serde(default)]
    pub org: Option<String>,
    #[serde(default)]
    pub bogon: bool,
}

impl IpInfoResponse {
    pub fn into_result(self) -> Option<EnrichmentResult> {
        if self.bogon {
            return None;
        }

        let geolocation = match (self.country_code, self.country) {
            (Some(code), Some(name)) => Some(Geolocation {
                country: name,
                country_code: code,
            }),
            // Standard shape: `country` holds the code
            (None, Some(code)) | (Some(code), None) => Some(Geolocation {
                country: code.clone(),
                country_code: code,
            }),
            (None, None) => None,
        };

        let autonomous_system = self
            .asn
            .as_deref()
            .or(self.org.as_deref())
            .and_then(AutonomousSystem::parse);

        let result = EnrichmentResult {
            geolocation,
            autonomous_system,
            ..Default::default()
        };
        (!result.is_empty()).then_some(result)
    }
}

pub struct IpInfoEnricher {
    client: Client,
    base_url: String,
    token: Option<String>,
}

impl IpInfoEnricher {
    pub fn new(http: &HttpConfig, token: Option<&str>) -> Result<Self, NetError> {
        let base_url = if token.is_some() {
            IPINFO_LITE_URL
        } else {
            IPINFO_URL
        };

        Ok(Self {
            client: create_client(http)?,
            base_url: base_url.to_string(),
            token: token.map(str::to_string),
        })
    }

    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }

    fn lookup_url(&self, ip: &str) -> String {
        let mut url = if self.base_url == IPINFO_URL {
            format!("{}/{}/json", self.base_url, ip)
        } else {
            format!("{}/{}", self.base_url, ip)
        };
        if let Some(token) = &self.token {
            url.push_str("?token=");
            url.push_str(&urlencoding::encode(token));
        }
        url
    }
}

#[async_trait]
impl Enricher for IpInfoEnricher {
    fn name(&self) -> &str {
        "ipinfo"
    }

    fn capabilities(&self) -> &[EnrichmentKind] {
        &[EnrichmentKind::Geolocation, EnrichmentKind::AutonomousSystem]
    }

    async fn lookup(&self, key: &str) -> Result<Option<EnrichmentResult>, LookupError> {
        let response = self
            .client
            .get(self.lookup_url(key))
            .send()
            .await
            .map_err(NetError::from)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body: IpInfoResponse = check_status(response)?
            .json()
            .await
            .map_err(|e| NetError::InvalidResponse(e.to_string()))?;

        Ok(body.into_result())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_shape() {
        let body: IpInfoResponse = serde_json::from_str(
            r#"{"ip": "1.1.1.1", "hostname": "one.one.one.one", "country": "US", "org": "AS13335 Cloudflare, Inc."}"#,
        )
        .unwrap();

        let result = body.into_result().unwrap();
        assert_eq!(result.autonomous_system.unwrap().asn, 13335);
        assert_eq!(result.geolocation.unwrap().country_code, "US");
    }

    #[test]
    fn test_lite_shape() {
        let body: IpInfoResponse = serde_json::from_str(
            r#"{"ip": "8.8.8.8", "asn": "AS15169", "as_name": "Google LLC", "country_code": "US", "country": "United States"}"#,
        )
        .unwrap();

        let result = body.into_result().unwrap();
        let geolocation = result.geolocation.unwrap();
        assert_eq!(geolocation.country, "United States");
        assert_eq!(geolocation.country_code, "US");
        assert_eq!(result.autonomous_system.unwrap().asn, 15169);
    }

    #[test]
    fn test_bogon_has_no_data() {
        let body: IpInfoResponse =
            serde_json::from_str(r#"{"ip": "10.0.0.1", "bogon": true}"#).unwrap();
        assert!(body.into_result().is_none());
        assert!(IpInfoResponse::default().into_result().is_none());
    }

    #[test]
    fn test_lookup_url() {
        let free = IpInfoEnricher::new(&HttpConfig::default(), None).unwrap();
        assert_eq!(free.lookup_url("1.1.1.1"), "https://ipinfo.io/1.1.1.1/json");

        let lite = IpInfoEnricher::new(&HttpConfig::default(), Some("t0k")).unwrap();
        assert_eq!(
            lite.lookup_url("1.1.1.1"),
            "https://api.ipinfo.io/lite/1.1.1.1?token=t0k"
        );
    }
}
