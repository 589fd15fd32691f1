//! Enrichment dispatcher
//!
//! Runs the lookups an artifact still needs. Each client is called at most
//! once per artifact, with all of its pending kinds filled from that single
//! result. Failures are contained to the failing client's kinds.

use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use lookout_agents::{Enricher, EnricherRegistry, LookupError};
use lookout_core::{Artifact, EnrichmentKind, EnrichmentResult};
use lookout_net::{retry_with_backoff, RetryPolicy};

#[derive(Debug, Clone)]
pub struct DispatcherConfig {
    /// Upper bound on lookups in flight across all artifacts
    pub max_concurrent_lookups: usize,
    /// Applied to each lookup
    pub retry: RetryPolicy,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrent_lookups: 8,
            retry: RetryPolicy {
                max_retries: 2,
                backoff_schedule: vec![Duration::from_secs(1), Duration::from_secs(5)],
                timeout: Duration::from_secs(30),
                jitter: true,
            },
        }
    }
}

impl DispatcherConfig {
    pub fn with_max_concurrent_lookups(mut self, max: usize) -> Self {
        self.max_concurrent_lookups = max.max(1);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }
}

/// Why a pending kind was left empty
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// No registered client covers the kind
    NoClient,
    /// The client had nothing for this artifact
    NoData,
    /// The lookup failed permanently or ran out of retries
    Failed(String),
}

/// What happened to one artifact's pending kinds
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnrichmentReport {
    pub attached: Vec<EnrichmentKind>,
    pub skipped: Vec<(EnrichmentKind, SkipReason)>,
}

impl EnrichmentReport {
    pub fn failures(&self) -> usize {
        self.skipped
            .iter()
            .filter(|(_, reason)| matches!(reason, SkipReason::Failed(_)))
            .count()
    }
}

pub struct Dispatcher {
    registry: Arc<EnricherRegistry>,
    config: DispatcherConfig,
    permits: Semaphore,
}

impl Dispatcher {
    pub fn new(registry: Arc<EnricherRegistry>, config: DispatcherConfig) -> Self {
        let permits = Semaphore::new(config.max_concurrent_lookups.max(1));
        Self {
            registry,
            config,
            permits,
        }
    }

    async fn lookup(
        &self,
        client: &Arc<dyn Enricher>,
        key: &str,
    ) -> Result<Option<EnrichmentResult>, LookupError> {
        let _permit = self
            .permits
            .acquire()
            .await
            .map_err(|e| LookupError::Permanent(e.to_string()))?;

        retry_with_backoff(&self.config.retry, client.name(), || client.lookup(key)).await
    }

    /// Fill the artifact's pending kinds. Never fails and never removes an
    /// existing attachment.
    pub async fn enrich(&self, mut artifact: Artifact) -> (Artifact, EnrichmentReport) {
        let mut report = EnrichmentReport::default();
        let pending = artifact.pending_enrichments();
        if pending.is_empty() {
            return (artifact, report);
        }

        let (groups, uncovered) = self.registry.plan(&pending);
        report
            .skipped
            .extend(uncovered.into_iter().map(|kind| (kind, SkipReason::NoClient)));

        let lookups = groups.into_iter().filter_map(|(client, kinds)| {
            let key = artifact.lookup_key(*kinds.first()?)?;
            Some(async move {
                let result = self.lookup(&client, &key).await;
                (client, kinds, result)
            })
        });
        let outcomes = join_all(lookups).await;

        for (client, kinds, result) in outcomes {
            match result {
                Ok(Some(found)) => {
                    for kind in kinds {
                        if artifact.enrichments.attach(kind, &found) {
                            report.attached.push(kind);
                        } else {
                            report.skipped.push((kind, SkipReason::NoData));
                        }
                    }
                }
                Ok(None) => {
                    debug!("{} has no data for {}", client.name(), artifact.data());
                    report
                        .skipped
                        .extend(kinds.into_iter().map(|kind| (kind, SkipReason::NoData)));
                }
                Err(e) => {
                    warn!(
                        "Enricher {} failed for {}: {}",
                        client.name(),
                        artifact.data(),
                        e
                    );
                    let reason = SkipReason::Failed(e.to_string());
                    report
                        .skipped
                        .extend(kinds.into_iter().map(|kind| (kind, reason.clone())));
                }
            }
        }

        (artifact, report)
    }

    /// Enrich artifacts concurrently; output order matches input order
    pub async fn enrich_all(&self, artifacts: Vec<Artifact>) -> Vec<(Artifact, EnrichmentReport)> {
        stream::iter(artifacts)
            .map(|artifact| self.enrich(artifact))
            .buffered(self.config.max_concurrent_lookups.max(1))
            .collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use lookout_core::{AutonomousSystem, Geolocation, Port, WhoisRecord};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays scripted responses, then repeats the last one
    struct ScriptedEnricher {
        name: &'static str,
        kinds: Vec<EnrichmentKind>,
        script: Mutex<Vec<Result<Option<EnrichmentResult>, LookupError>>>,
        calls: AtomicU32,
        keys: Mutex<Vec<String>>,
    }

    impl ScriptedEnricher {
        fn new(
            name: &'static str,
            kinds: &[EnrichmentKind],
            script: Vec<Result<Option<EnrichmentResult>, LookupError>>,
        ) -> Arc<Self> {
            Arc::new(Self {
                name,
                kinds: kinds.to_vec(),
                script: Mutex::new(script),
                calls: AtomicU32::new(0),
                keys: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Enricher for ScriptedEnricher {
        fn name(&self) -> &str {
            self.name
        }

        fn capabilities(&self) -> &[EnrichmentKind] {
            &self.kinds
        }

        async fn lookup(&self, key: &str) -> Result<Option<EnrichmentResult>, LookupError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.keys.lock().push(key.to_string());
            let mut script = self.script.lock();
            if script.len() > 1 {
                script.remove(0)
            } else {
                script[0].clone()
            }
        }
    }

    fn fast_config() -> DispatcherConfig {
        DispatcherConfig::default().with_retry(RetryPolicy {
            max_retries: 2,
            backoff_schedule: vec![Duration::from_millis(1)],
            timeout: Duration::from_secs(1),
            jitter: false,
        })
    }

    fn dispatcher(clients: Vec<Arc<ScriptedEnricher>>) -> Dispatcher {
        let mut registry = EnricherRegistry::new();
        for client in clients {
            registry.register(client).unwrap();
        }
        Dispatcher::new(Arc::new(registry), fast_config())
    }

    fn geo_and_as() -> EnrichmentResult {
        EnrichmentResult {
            geolocation: Some(Geolocation {
                country: "Australia".to_string(),
                country_code: "AU".to_string(),
            }),
            autonomous_system: Some(AutonomousSystem { asn: 13335 }),
            ..Default::default()
        }
    }

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

    #[tokio::test]
    async fn test_existing_whois_is_not_clobbered() {
        let fresh = EnrichmentResult {
            whois_record: Some(whois("fresh")),
            ..Default::default()
        };
        let client = ScriptedEnricher::new("whois", &[EnrichmentKind::Whois], vec![Ok(Some(fresh))]);
        let dispatcher = dispatcher(vec![Arc::clone(&client)]);

        let mut artifact = Artifact::new("example.com").unwrap();
        artifact.enrichments.whois_record = Some(whois("original"));

        let (artifact, _report) = dispatcher.enrich(artifact).await;
        assert_eq!(
            artifact.enrichments.whois_record.unwrap().registrar.as_deref(),
            Some("original")
        );
        assert_eq!(client.calls(), 0);
    }

    #[tokio::test]
    async fn test_partial_failure_is_tolerated() {
        let geo = ScriptedEnricher::new(
            "geo",
            &[EnrichmentKind::Geolocation, EnrichmentKind::AutonomousSystem],
            vec![Ok(Some(geo_and_as()))],
        );
        let rdns = ScriptedEnricher::new(
            "rdns",
            &[EnrichmentKind::ReverseDns],
            vec![Err(LookupError::Permanent("401 Unauthorized".to_string()))],
        );
        let dispatcher = dispatcher(vec![Arc::clone(&geo), Arc::clone(&rdns)]);

        let (artifact, report) = dispatcher.enrich(Artifact::new("1.1.1.1").unwrap()).await;

        assert!(artifact.enrichments.geolocation.is_some());
        assert_eq!(artifact.enrichments.autonomous_system.unwrap().asn, 13335);
        assert!(artifact.enrichments.reverse_dns_names.is_empty());
        assert_eq!(report.failures(), 1);
        assert!(report.attached.contains(&EnrichmentKind::Geolocation));
        // Permanent errors are not retried
        assert_eq!(rdns.calls(), 1);
        // Ports and CPEs have no client here
        assert!(report
            .skipped
            .contains(&(EnrichmentKind::Ports, SkipReason::NoClient)));
    }

    #[tokio::test]
    async fn test_transient_error_is_retried() {
        let geo = ScriptedEnricher::new(
            "geo",
            &[EnrichmentKind::Geolocation, EnrichmentKind::AutonomousSystem],
            vec![
                Err(LookupError::Transient("503".to_string())),
                Ok(Some(geo_and_as())),
            ],
        );
        let dispatcher = dispatcher(vec![Arc::clone(&geo)]);

        let (artifact, report) = dispatcher.enrich(Artifact::new("8.8.8.8").unwrap()).await;
        assert!(artifact.enrichments.geolocation.is_some());
        assert_eq!(report.failures(), 0);
        assert_eq!(geo.calls(), 2);
    }

    #[tokio::test]
    async fn test_no_data_is_not_retried() {
        let shodan = ScriptedEnricher::new(
            "shodan",
            &[EnrichmentKind::Ports, EnrichmentKind::Cpes],
            vec![Ok(None)],
        );
        let dispatcher = dispatcher(vec![Arc::clone(&shodan)]);

        let (artifact, report) = dispatcher.enrich(Artifact::new("8.8.8.8").unwrap()).await;
        assert!(artifact.enrichments.is_empty());
        assert_eq!(shodan.calls(), 1);
        assert!(report
            .skipped
            .contains(&(EnrichmentKind::Ports, SkipReason::NoData)));
    }

    #[tokio::test]
    async fn test_one_lookup_fills_all_client_kinds() {
        let result = EnrichmentResult {
            ports: vec![Port { port: 443 }],
            cpes: vec![lookout_core::Cpe {
                name: "cpe:/a:nginx:nginx".to_string(),
            }],
            ..Default::default()
        };
        let shodan = ScriptedEnricher::new(
            "shodan",
            &[EnrichmentKind::Ports, EnrichmentKind::Cpes],
            vec![Ok(Some(result))],
        );
        let dispatcher = dispatcher(vec![Arc::clone(&shodan)]);

        let (artifact, report) = dispatcher.enrich(Artifact::new("8.8.8.8").unwrap()).await;
        assert_eq!(artifact.enrichments.ports.len(), 1);
        assert_eq!(artifact.enrichments.cpes.len(), 1);
        assert_eq!(report.attached.len(), 2);
        assert_eq!(shodan.calls(), 1);
    }

    #[tokio::test]
    async fn test_url_uses_host_and_unknown_is_skipped() {
        let whois_client = ScriptedEnricher::new(
            "whois",
            &[EnrichmentKind::Whois],
            vec![Ok(Some(EnrichmentResult {
                whois_record: Some(whois("registrar")),
                ..Default::default()
            }))],
        );
        let dispatcher = dispatcher(vec![Arc::clone(&whois_client)]);

        let (artifact, _) = dispatcher
            .enrich(Artifact::new("https://login.example.com/path?q=1").unwrap())
            .await;
        assert!(artifact.enrichments.whois_record.is_some());
        assert_eq!(*whois_client.keys.lock(), vec!["login.example.com".to_string()]);

        let (_, report) = dispatcher
            .enrich(Artifact::new("definitely not an indicator").unwrap())
            .await;
        assert_eq!(report, EnrichmentReport::default());
        assert_eq!(whois_client.calls(), 1);
    }

    #[tokio::test]
    async fn test_enrich_all_keeps_order() {
        let geo = ScriptedEnricher::new(
            "geo",
            &[EnrichmentKind::Geolocation, EnrichmentKind::AutonomousSystem],
            vec![Ok(Some(geo_and_as()))],
        );
        let dispatcher = dispatcher(vec![geo]);

        let artifacts = ["1.1.1.1", "example.com", "8.8.8.8"]
            .into_iter()
            .map(|d| Artifact::new(d).unwrap())
            .collect();
        let enriched = dispatcher.enrich_all(artifacts).await;

        let data: Vec<&str> = enriched.iter().map(|(a, _)| a.data()).collect();
        assert_eq!(data, vec!["1.1.1.1", "example.com", "8.8.8.8"]);
        assert!(enriched[2].0.enrichments.geolocation.is_some());
    }
}
