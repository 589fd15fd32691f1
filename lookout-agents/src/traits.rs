//! Collaborator traits and their error taxonomy
//!
//! The pipeline depends only on these traits. Concrete analyzers, enricher
//! clients, stores and emitters live in the sibling modules.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use lookout_core::{
    Alert, AlertId, Artifact, EnrichmentKind, EnrichmentResult, FetchOptions, RawArtifact, RuleId,
    ValidationError,
};
use lookout_net::{NetError, RetryPolicy, Retryable};

/// Errors from building collaborators at startup
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Missing credential: {0}")]
    MissingCredential(&'static str),

    #[error("Client error: {0}")]
    Client(#[from] NetError),

    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Failure of an analyzer fetch
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("transient fetch failure: {0}")]
    Transient(String),

    #[error("fetch failed: {0}")]
    Permanent(String),
}

/// Failure of one enricher lookup
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LookupError {
    #[error("transient lookup failure: {0}")]
    Transient(String),

    #[error("lookup failed: {0}")]
    Permanent(String),
}

/// Failure of one emitter call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EmitError {
    #[error("transient emit failure: {0}")]
    Transient(String),

    #[error("emit failed: {0}")]
    Permanent(String),
}

/// Failure of the history store
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

macro_rules! transient_or_permanent {
    ($error:ident) => {
        impl From<NetError> for $error {
            fn from(e: NetError) -> Self {
                if e.is_transient() {
                    $error::Transient(e.to_string())
                } else {
                    $error::Permanent(e.to_string())
                }
            }
        }

        impl Retryable for $error {
            fn is_transient(&self) -> bool {
                matches!(self, $error::Transient(_))
            }

            fn timed_out(after: Duration) -> Self {
                $error::Transient(format!("timed out after {:?}", after))
            }
        }
    };
}

transient_or_permanent!(FetchError);
transient_or_permanent!(LookupError);
transient_or_permanent!(EmitError);

/// A data source that turns one rule query into raw artifacts
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Source name recorded on every artifact
    fn name(&self) -> &str;

    /// `retry` wraps each request the analyzer makes, so a failed page is
    /// repeated on its own
    async fn fetch(
        &self,
        query: &str,
        options: &FetchOptions,
        retry: &RetryPolicy,
    ) -> Result<Vec<RawArtifact>, FetchError>;
}

/// An external lookup service covering one or more enrichment kinds
#[async_trait]
pub trait Enricher: Send + Sync {
    fn name(&self) -> &str;

    /// Kinds a single lookup can populate
    fn capabilities(&self) -> &[EnrichmentKind];

    /// `Ok(None)` means the service has no data for `key`
    async fn lookup(&self, key: &str) -> Result<Option<EnrichmentResult>, LookupError>;
}

/// Alert history
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Most recently created artifact with identical `data` under the rule
    async fn find_most_recent(
        &self,
        rule_id: &RuleId,
        data: &str,
    ) -> Result<Option<Artifact>, PersistenceError>;

    /// Store an alert, assigning its id and artifact timestamps
    async fn save(&self, alert: Alert) -> Result<Alert, PersistenceError>;

    /// Newest first, optionally restricted to one rule
    async fn list_alerts(
        &self,
        rule_id: Option<&RuleId>,
        limit: usize,
    ) -> Result<Vec<Alert>, PersistenceError>;

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, PersistenceError>;

    /// Remove an alert and its artifacts from history; `false` if unknown
    async fn delete_alert(&self, id: AlertId) -> Result<bool, PersistenceError>;

    async fn rule_fingerprint(&self, rule_id: &RuleId) -> Result<Option<String>, PersistenceError>;

    async fn store_rule_fingerprint(
        &self,
        rule_id: &RuleId,
        fingerprint: &str,
    ) -> Result<(), PersistenceError>;
}

/// Downstream sink for alerts
#[async_trait]
pub trait Emitter: Send + Sync {
    fn name(&self) -> &str;

    async fn emit(&self, alert: &Alert) -> Result<(), EmitError>;
}

/// API credentials for the hosted services
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub urlscan_api_key: Option<String>,
    pub otx_api_key: Option<String>,
    pub ipinfo_token: Option<String>,
}

impl Credentials {
    pub fn with_urlscan_api_key(mut self, key: &str) -> Self {
        self.urlscan_api_key = Some(key.to_string());
        self
    }

    pub fn with_otx_api_key(mut self, key: &str) -> Self {
        self.otx_api_key = Some(key.to_string());
        self
    }

    pub fn with_ipinfo_token(mut self, token: &str) -> Self {
        self.ipinfo_token = Some(token.to_string());
        self
    }
}
