//! Rules: named recurring queries against one analyzer
//!
//! Rules are loaded from TOML:
//!
//! ```toml
//! id = "phishing-certs"
//! title = "Phishing certificates"
//! query = "%.example-login.com"
//! tags = ["phishing"]
//! artifact_ttl = 86400
//!
//! [analyzer]
//! kind = "crtsh"
//! exclude_expired = true
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;

use crate::{classify, refang, DataType, RuleId, ValidationError};

/// Which analyzer a rule runs against, with its analyzer-specific options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AnalyzerConfig {
    /// Certificate transparency search on crt.sh
    Crtsh {
        #[serde(default = "default_true")]
        exclude_expired: bool,
    },
    /// urlscan.io search API
    Urlscan,
    /// AlienVault OTX passive DNS for one IP or domain
    Otx,
}

impl AnalyzerConfig {
    pub fn name(&self) -> &'static str {
        match self {
            AnalyzerConfig::Crtsh { .. } => "crtsh",
            AnalyzerConfig::Urlscan => "urlscan",
            AnalyzerConfig::Otx => "otx",
        }
    }
}

fn default_true() -> bool {
    true
}

/// Pacing for multi-page fetches
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Delay between page requests, in milliseconds
    #[serde(default)]
    pub interval_ms: u64,
    /// Upper bound on pages fetched per run (unbounded when unset)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_pages: Option<usize>,
}

/// A saved recurring query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub query: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    /// Decay window in seconds; `None` means an indicator never re-alerts
    #[serde(default, rename = "artifact_ttl", skip_serializing_if = "Option::is_none")]
    pub artifact_ttl_secs: Option<u64>,
    /// Restrict accepted artifact types (all types when empty)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub data_types: Vec<DataType>,
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub fetch: FetchOptions,
}

impl Rule {
    /// Parse a rule from its TOML definition
    pub fn from_toml_str(content: &str) -> Result<Self, ValidationError> {
        toml::from_str(content).map_err(|e| ValidationError::Parse(e.to_string()))
    }

    pub fn artifact_ttl(&self) -> Option<Duration> {
        self.artifact_ttl_secs
            .map(|secs| Duration::seconds(i64::try_from(secs).unwrap_or(i64::MAX)))
    }

    /// Whether artifacts of this type are kept for this rule
    pub fn accepts(&self, data_type: DataType) -> bool {
        self.data_types.is_empty() || self.data_types.contains(&data_type)
    }

    /// Schema and required-field checks
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.id.as_str().trim().is_empty() {
            return Err(ValidationError::MissingField("id"));
        }
        if self.id.as_str().chars().any(char::is_whitespace) {
            return Err(ValidationError::invalid("id", "must not contain whitespace"));
        }
        if self.title.trim().is_empty() {
            return Err(ValidationError::MissingField("title"));
        }
        if self.query.trim().is_empty() {
            return Err(ValidationError::MissingField("query"));
        }
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ValidationError::invalid("tags", "tags must not be blank"));
        }
        if self.artifact_ttl_secs == Some(0) {
            return Err(ValidationError::invalid(
                "artifact_ttl",
                "must be positive; omit it to never decay",
            ));
        }
        if self.fetch.max_pages == Some(0) {
            return Err(ValidationError::invalid("fetch.max_pages", "must be positive"));
        }

        if self.analyzer == AnalyzerConfig::Otx {
            let data_type = classify(&refang(&self.query));
            if !matches!(data_type, DataType::Ip | DataType::Domain) {
                return Err(ValidationError::invalid(
                    "query",
                    format!("otx only supports ip and domain queries, got {}", data_type),
                ));
            }
        }

        Ok(())
    }

    /// SHA-256 over the canonical JSON form, used to detect edited rules
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let canonical = serde_json::to_string(self).unwrap_or_default();
        hasher.update(canonical.as_bytes());
        format!("{:x}", hasher.finalize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CRTSH_RULE: &str = r#"
        id = "phishing-certs"
        title = "Phishing certificates"
        description = "New certificates for look-alike domains"
        query = "%.example-login.com"
        tags = ["phishing", "ct"]
        artifact_ttl = 3600

        [analyzer]
        kind = "crtsh"
    "#;

    #[test]
    fn test_parse_rule() {
        let rule = Rule::from_toml_str(CRTSH_RULE).unwrap();
        assert_eq!(rule.id.as_str(), "phishing-certs");
        assert_eq!(rule.tags.len(), 2);
        assert_eq!(rule.artifact_ttl(), Some(Duration::seconds(3600)));
        assert_eq!(
            rule.analyzer,
            AnalyzerConfig::Crtsh {
                exclude_expired: true
            }
        );
        assert_eq!(rule.fetch, FetchOptions::default());
        assert!(rule.validate().is_ok());
    }

    #[test]
    fn test_missing_title_fails_validation() {
        let mut rule = Rule::from_toml_str(CRTSH_RULE).unwrap();
        rule.title = "  ".to_string();
        assert_eq!(rule.validate(), Err(ValidationError::MissingField("title")));
    }

    #[test]
    fn test_zero_ttl_is_invalid() {
        let mut rule = Rule::from_toml_str(CRTSH_RULE).unwrap();
        rule.artifact_ttl_secs = Some(0);
        assert!(matches!(
            rule.validate(),
            Err(ValidationError::InvalidField { field: "artifact_ttl", .. })
        ));
    }

    #[test]
    fn test_otx_requires_ip_or_domain() {
        let mut rule = Rule::from_toml_str(CRTSH_RULE).unwrap();
        rule.analyzer = AnalyzerConfig::Otx;
        rule.query = "example[.]com".to_string();
        assert!(rule.validate().is_ok());

        rule.query = "https://example.com/".to_string();
        assert!(rule.validate().is_err());
    }

    #[test]
    fn test_unknown_analyzer_is_parse_error() {
        let content = CRTSH_RULE.replace("crtsh", "shodan");
        assert!(matches!(
            Rule::from_toml_str(&content),
            Err(ValidationError::Parse(_))
        ));
    }

    #[test]
    fn test_fingerprint_tracks_edits() {
        let rule = Rule::from_toml_str(CRTSH_RULE).unwrap();
        let same = Rule::from_toml_str(CRTSH_RULE).unwrap();
        assert_eq!(rule.fingerprint(), same.fingerprint());
        assert_eq!(rule.fingerprint().len(), 64);

        let mut edited = rule.clone();
        edited.query = "%.other.com".to_string();
        assert_ne!(rule.fingerprint(), edited.fingerprint());
    }

    #[test]
    fn test_accepts() {
        let mut rule = Rule::from_toml_str(CRTSH_RULE).unwrap();
        assert!(rule.accepts(DataType::Unknown));

        rule.data_types = vec![DataType::Domain];
        assert!(rule.accepts(DataType::Domain));
        assert!(!rule.accepts(DataType::Ip));
    }
}
