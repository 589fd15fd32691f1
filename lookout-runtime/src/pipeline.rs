//! Pipeline orchestrator
//!
//! One run of one rule: validate, fetch, classify, dedup, enrich, persist.
//! A run either completes (with or without an alert) or aborts with a
//! reason code. Nothing is written before the single `save`, so a dropped
//! run leaves no partial state.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info};

use lookout_agents::{Analyzer, EnricherRegistry, FetchError, Persistence, PersistenceError};
use lookout_core::{Alert, Artifact, Rule, RuleId, ValidationError};
use lookout_net::RetryPolicy;

use crate::dedup::Deduplicator;
use crate::dispatcher::{Dispatcher, DispatcherConfig};

/// Why a run was aborted
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid rule: {0}")]
    Validation(#[from] ValidationError),

    #[error("{0}")]
    Fetch(#[from] FetchError),

    #[error("persistence failed: {0}")]
    Persistence(#[from] PersistenceError),

    #[error("run cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Stable reason code for logs and exit status
    pub fn reason_code(&self) -> &'static str {
        match self {
            PipelineError::Validation(_) => "validation",
            PipelineError::Fetch(_) => "fetch_failed",
            PipelineError::Persistence(_) => "persistence",
            PipelineError::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Applied to each request an analyzer makes
    pub fetch_retry: RetryPolicy,
    pub dispatcher: DispatcherConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            fetch_retry: RetryPolicy {
                max_retries: 3,
                backoff_schedule: vec![
                    Duration::from_secs(5),
                    Duration::from_secs(15),
                    Duration::from_secs(30),
                ],
                timeout: Duration::from_secs(60),
                jitter: true,
            },
            dispatcher: DispatcherConfig::default(),
        }
    }
}

pub struct Pipeline {
    store: Arc<dyn Persistence>,
    dispatcher: Dispatcher,
    fetch_retry: RetryPolicy,
    rule_locks: DashMap<RuleId, Arc<Mutex<()>>>,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn Persistence>,
        registry: Arc<EnricherRegistry>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            store,
            dispatcher: Dispatcher::new(registry, config.dispatcher),
            fetch_retry: config.fetch_retry,
            rule_locks: DashMap::new(),
        }
    }

    /// Serializes runs of the same rule
    fn rule_lock(&self, rule_id: &RuleId) -> Arc<Mutex<()>> {
        Arc::clone(self.rule_locks.entry(rule_id.clone()).or_default().value())
    }

    /// Run a rule now
    pub async fn run(
        &self,
        rule: &Rule,
        analyzer: &dyn Analyzer,
    ) -> Result<Option<Alert>, PipelineError> {
        self.run_at(rule, analyzer, Utc::now()).await
    }

    /// Run a rule with decay measured against `now`
    pub async fn run_at(
        &self,
        rule: &Rule,
        analyzer: &dyn Analyzer,
        now: DateTime<Utc>,
    ) -> Result<Option<Alert>, PipelineError> {
        rule.validate()?;
        info!("Running rule {} with {}", rule.id, analyzer.name());

        let raw = analyzer
            .fetch(&rule.query, &rule.fetch, &self.fetch_retry)
            .await?;
        debug!("{} returned {} raw artifacts", analyzer.name(), raw.len());

        let artifacts: Vec<Artifact> = raw
            .into_iter()
            .filter_map(|raw| match Artifact::from_raw(raw, analyzer.name()) {
                Ok(artifact) => Some(artifact),
                Err(e) => {
                    debug!("Dropping raw artifact: {}", e);
                    None
                }
            })
            .filter(|artifact| {
                let accepted = rule.accepts(artifact.data_type());
                if !accepted {
                    debug!(
                        "Dropping {} artifact {} (not accepted by rule)",
                        artifact.data_type(),
                        artifact.data()
                    );
                }
                accepted
            })
            .map(|artifact| artifact.with_rule_id(rule.id.clone()))
            .collect();

        let lock = self.rule_lock(&rule.id);
        let _guard = lock.lock().await;

        let fresh = Deduplicator::new(self.store.as_ref(), &rule.id, rule.artifact_ttl(), now)
            .filter(artifacts)
            .await?;
        if fresh.is_empty() {
            info!("There is no new artifact found for rule {}", rule.id);
            return Ok(None);
        }

        let enriched = self.dispatcher.enrich_all(fresh).await;
        let failures: usize = enriched.iter().map(|(_, report)| report.failures()).sum();
        if failures > 0 {
            info!("{} enrichment lookups failed for rule {}", failures, rule.id);
        }

        let artifacts = enriched.into_iter().map(|(artifact, _)| artifact).collect();
        let alert = self.store.save(Alert::new(rule, artifacts, now)).await?;

        info!(
            "Rule {} produced alert {} with {} new artifacts",
            rule.id,
            alert.id.map(|id| id.to_string()).unwrap_or_default(),
            alert.len()
        );
        Ok(Some(alert))
    }
}
