//! Enrichment records attached to artifacts
//!
//! Each record is owned by exactly one artifact and is created at most once:
//! attaching a kind that is already populated leaves the existing value in
//! place.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::DataType;

/// The enrichment capabilities an artifact can receive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrichmentKind {
    Whois,
    Dns,
    ReverseDns,
    Geolocation,
    AutonomousSystem,
    Ports,
    Cpes,
}

impl EnrichmentKind {
    pub const ALL: [EnrichmentKind; 7] = [
        EnrichmentKind::Whois,
        EnrichmentKind::Dns,
        EnrichmentKind::ReverseDns,
        EnrichmentKind::Geolocation,
        EnrichmentKind::AutonomousSystem,
        EnrichmentKind::Ports,
        EnrichmentKind::Cpes,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EnrichmentKind::Whois => "whois",
            EnrichmentKind::Dns => "dns",
            EnrichmentKind::ReverseDns => "reverse_dns",
            EnrichmentKind::Geolocation => "geolocation",
            EnrichmentKind::AutonomousSystem => "autonomous_system",
            EnrichmentKind::Ports => "ports",
            EnrichmentKind::Cpes => "cpes",
        }
    }

    /// Whether this kind is meaningful for an indicator of the given type
    pub fn applies_to(&self, data_type: DataType) -> bool {
        match self {
            EnrichmentKind::Whois | EnrichmentKind::Dns => {
                matches!(data_type, DataType::Domain | DataType::Url)
            }
            EnrichmentKind::ReverseDns
            | EnrichmentKind::Geolocation
            | EnrichmentKind::AutonomousSystem
            | EnrichmentKind::Ports
            | EnrichmentKind::Cpes => data_type == DataType::Ip,
        }
    }

    /// Whether the attachment for this kind is already populated
    pub fn is_satisfied(&self, enrichments: &Enrichments) -> bool {
        match self {
            EnrichmentKind::Whois => enrichments.whois_record.is_some(),
            EnrichmentKind::Dns => !enrichments.dns_records.is_empty(),
            EnrichmentKind::ReverseDns => !enrichments.reverse_dns_names.is_empty(),
            EnrichmentKind::Geolocation => enrichments.geolocation.is_some(),
            EnrichmentKind::AutonomousSystem => enrichments.autonomous_system.is_some(),
            EnrichmentKind::Ports => !enrichments.ports.is_empty(),
            EnrichmentKind::Cpes => !enrichments.cpes.is_empty(),
        }
    }
}

impl fmt::Display for EnrichmentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Autonomous system an IP is announced from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutonomousSystem {
    pub asn: u32,
}

impl AutonomousSystem {
    /// Parse provider ASN notation: `13335`, `AS13335`, `AS13335 Cloudflare, Inc.`
    pub fn parse(raw: &str) -> Option<Self> {
        let token = raw.split_whitespace().next()?;
        let digits = token
            .strip_prefix("AS")
            .or_else(|| token.strip_prefix("as"))
            .unwrap_or(token);
        digits.parse().ok().map(|asn| Self { asn })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Geolocation {
    pub country: String,
    pub country_code: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WhoisRecord {
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registrar: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_on: Option<NaiveDate>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_on: Option<NaiveDate>,
    /// Contact mail addresses found in the record
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contacts: Vec<String>,
}

/// DNS resource record types collected for domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DnsResource {
    A,
    Aaaa,
    Cname,
    Mx,
    Ns,
    Txt,
}

impl DnsResource {
    pub const ALL: [DnsResource; 6] = [
        DnsResource::A,
        DnsResource::Aaaa,
        DnsResource::Cname,
        DnsResource::Mx,
        DnsResource::Ns,
        DnsResource::Txt,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DnsResource::A => "A",
            DnsResource::Aaaa => "AAAA",
            DnsResource::Cname => "CNAME",
            DnsResource::Mx => "MX",
            DnsResource::Ns => "NS",
            DnsResource::Txt => "TXT",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnsRecord {
    pub resource: DnsResource,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Port {
    pub port: u16,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpe {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReverseDnsName {
    pub name: String,
}

/// All enrichment attachments of one artifact
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Enrichments {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub autonomous_system: Option<AutonomousSystem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub geolocation: Option<Geolocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whois_record: Option<WhoisRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_records: Vec<DnsRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ports: Vec<Port>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub cpes: Vec<Cpe>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reverse_dns_names: Vec<ReverseDnsName>,
}

/// What an enricher client hands back from one lookup.
///
/// A client fills only the fields it knows about; one lookup may cover
/// several kinds at once.
pub type EnrichmentResult = Enrichments;

impl Enrichments {
    pub fn is_empty(&self) -> bool {
        EnrichmentKind::ALL.iter().all(|kind| !kind.is_satisfied(self))
    }

    /// Copy one kind over from a lookup result.
    ///
    /// Never overwrites a populated attachment. Returns `true` when something
    /// was attached.
    pub fn attach(&mut self, kind: EnrichmentKind, result: &EnrichmentResult) -> bool {
        if kind.is_satisfied(self) || !kind.is_satisfied(result) {
            return false;
        }

        match kind {
            EnrichmentKind::Whois => self.whois_record = result.whois_record.clone(),
            EnrichmentKind::Dns => self.dns_records = result.dns_records.clone(),
            EnrichmentKind::ReverseDns => self.reverse_dns_names = result.reverse_dns_names.clone(),
            EnrichmentKind::Geolocation => self.geolocation = result.geolocation.clone(),
            EnrichmentKind::AutonomousSystem => {
                self.autonomous_system = result.autonomous_system.clone()
            }
            EnrichmentKind::Ports => self.ports = result.ports.clone(),
            EnrichmentKind::Cpes => self.cpes = result.cpes.clone(),
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn whois(registrar: &str) -> WhoisRecord {
        WhoisRecord {
            domain: "example.com".to_string(),
            registrar: Some(registrar.to_string()),
            created_on: None,
            updated_on: None,
            expires_on: None,
            contacts: vec![],
        }
    }

    #[test]
    fn test_applies_to() {
        assert!(EnrichmentKind::Whois.applies_to(DataType::Url));
        assert!(EnrichmentKind::Dns.applies_to(DataType::Domain));
        assert!(!EnrichmentKind::Dns.applies_to(DataType::Ip));
        assert!(EnrichmentKind::Cpes.applies_to(DataType::Ip));
        assert!(EnrichmentKind::ALL
            .iter()
            .all(|kind| !kind.applies_to(DataType::Unknown)));
        assert!(EnrichmentKind::ALL
            .iter()
            .all(|kind| !kind.applies_to(DataType::Hash)));
    }

    #[test]
    fn test_attach_does_not_clobber() {
        let mut enrichments = Enrichments {
            whois_record: Some(whois("original")),
            ..Default::default()
        };
        let fresh = Enrichments {
            whois_record: Some(whois("fresh")),
            ..Default::default()
        };

        assert!(!enrichments.attach(EnrichmentKind::Whois, &fresh));
        assert_eq!(
            enrichments.whois_record.unwrap().registrar.as_deref(),
            Some("original")
        );
    }

    #[test]
    fn test_attach_only_requested_kind() {
        let mut enrichments = Enrichments::default();
        let result = Enrichments {
            ports: vec![Port { port: 443 }],
            cpes: vec![Cpe { name: "cpe:/a:nginx:nginx".to_string() }],
            ..Default::default()
        };

        assert!(enrichments.attach(EnrichmentKind::Ports, &result));
        assert_eq!(enrichments.ports.len(), 1);
        assert!(enrichments.cpes.is_empty());

        // Nothing in the result for this kind
        assert!(!enrichments.attach(EnrichmentKind::Geolocation, &result));
        assert!(!enrichments.is_empty());
    }

    #[test]
    fn test_parse_asn() {
        assert_eq!(AutonomousSystem::parse("AS13335").map(|a| a.asn), Some(13335));
        assert_eq!(
            AutonomousSystem::parse("AS15169 Google LLC").map(|a| a.asn),
            Some(15169)
        );
        assert_eq!(AutonomousSystem::parse("13335").map(|a| a.asn), Some(13335));
        assert!(AutonomousSystem::parse("Cloudflare").is_none());
        assert!(AutonomousSystem::parse("").is_none());
    }
}
