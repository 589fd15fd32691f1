//! Artifacts: observed indicators and their enrichment attachments

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{classify, url_host, DataType, EnrichmentKind, Enrichments, ValidationError};

/// Identifier of a rule
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleId(pub String);

impl RuleId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RuleId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Candidate indicator as returned by an analyzer, before classification
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawArtifact {
    pub data: String,
    /// Raw provider payload, kept for audit
    #[serde(default)]
    pub metadata: serde_json::Value,
}

impl RawArtifact {
    pub fn new(data: impl Into<String>) -> Self {
        Self {
            data: data.into(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }
}

/// A classified indicator
///
/// `data` and `data_type` are fixed at construction so the type always
/// matches what [`classify`] says about the data.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "StoredArtifact")]
pub struct Artifact {
    data: String,
    data_type: DataType,
    /// Name of the analyzer that produced this artifact
    #[serde(default)]
    pub source: String,
    #[serde(default)]
    pub metadata: serde_json::Value,
    /// Owning rule until the artifact is persisted under an alert
    #[serde(skip)]
    pub rule_id: Option<RuleId>,
    /// Set by persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub enrichments: Enrichments,
}

impl Artifact {
    pub fn new(data: impl Into<String>) -> Result<Self, ValidationError> {
        let data = data.into().trim().to_string();
        if data.is_empty() {
            return Err(ValidationError::EmptyArtifact);
        }

        Ok(Self {
            data_type: classify(&data),
            data,
            source: String::new(),
            metadata: serde_json::Value::Null,
            rule_id: None,
            created_at: None,
            enrichments: Enrichments::default(),
        })
    }

    pub fn from_raw(raw: RawArtifact, source: &str) -> Result<Self, ValidationError> {
        Ok(Self::new(raw.data)?
            .with_source(source)
            .with_metadata(raw.metadata))
    }

    pub fn with_source(mut self, source: &str) -> Self {
        self.source = source.to_string();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_rule_id(mut self, rule_id: RuleId) -> Self {
        self.rule_id = Some(rule_id);
        self
    }

    pub fn data(&self) -> &str {
        &self.data
    }

    pub fn data_type(&self) -> DataType {
        self.data_type
    }

    /// Domain part of the artifact for name-based lookups
    pub fn domain(&self) -> Option<String> {
        match self.data_type {
            DataType::Domain => Some(self.data.to_lowercase()),
            DataType::Url => url_host(&self.data),
            _ => None,
        }
    }

    /// Key an enricher should be queried with for the given kind
    pub fn lookup_key(&self, kind: EnrichmentKind) -> Option<String> {
        if !kind.applies_to(self.data_type) {
            return None;
        }

        match kind {
            EnrichmentKind::Whois | EnrichmentKind::Dns => self.domain(),
            _ => Some(self.data.clone()),
        }
    }

    /// Kinds that apply to this artifact and are not yet populated
    pub fn pending_enrichments(&self) -> Vec<EnrichmentKind> {
        EnrichmentKind::ALL
            .into_iter()
            .filter(|kind| kind.applies_to(self.data_type) && !kind.is_satisfied(&self.enrichments))
            .collect()
    }
}

/// Serialized shape of an artifact; the type is re-derived on load
#[derive(Deserialize)]
struct StoredArtifact {
    data: String,
    #[serde(default)]
    source: String,
    #[serde(default)]
    metadata: serde_json::Value,
    #[serde(default)]
    created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    enrichments: Enrichments,
}

impl TryFrom<StoredArtifact> for Artifact {
    type Error = ValidationError;

    fn try_from(stored: StoredArtifact) -> Result<Self, Self::Error> {
        let mut artifact = Artifact::new(stored.data)?
            .with_source(&stored.source)
            .with_metadata(stored.metadata);
        artifact.created_at = stored.created_at;
        artifact.enrichments = stored.enrichments;
        Ok(artifact)
    }
}
