//! Enricher clients and the kind-to-client registry

pub mod google_dns;
pub mod internetdb;
pub mod ipinfo;
pub mod whois;

pub use google_dns::GooglePublicDnsEnricher;
pub use internetdb::InternetDbEnricher;
pub use ipinfo::IpInfoEnricher;
pub use whois::WhoisEnricher;

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

use lookout_core::{EnrichmentKind, ValidationError};
use lookout_net::{whois::WhoisConfig, HttpConfig};

use crate::{AgentError, Credentials, Enricher};

/// Static mapping from each enrichment kind to exactly one client
#[derive(Default)]
pub struct EnricherRegistry {
    clients: Vec<Arc<dyn Enricher>>,
    by_kind: BTreeMap<EnrichmentKind, usize>,
}

impl EnricherRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The stock clients: WHOIS, Google Public DNS, IPInfo and InternetDB
    pub fn with_defaults(
        http: &HttpConfig,
        whois: WhoisConfig,
        credentials: &Credentials,
    ) -> Result<Self, AgentError> {
        let mut registry = Self::new();
        registry.register(Arc::new(WhoisEnricher::new(whois)))?;
        registry.register(Arc::new(GooglePublicDnsEnricher::new(http)?))?;
        registry.register(Arc::new(IpInfoEnricher::new(
            http,
            credentials.ipinfo_token.as_deref(),
        )?))?;
        registry.register(Arc::new(InternetDbEnricher::new(http)?))?;
        Ok(registry)
    }

    /// Add a client; fails if any of its kinds is already covered
    pub fn register(&mut self, client: Arc<dyn Enricher>) -> Result<(), ValidationError> {
        for kind in client.capabilities() {
            if let Some(&existing) = self.by_kind.get(kind) {
                return Err(ValidationError::DuplicateCapability {
                    kind: kind.to_string(),
                    first: self.clients[existing].name().to_string(),
                    second: client.name().to_string(),
                });
            }
        }

        let index = self.clients.len();
        for kind in client.capabilities() {
            self.by_kind.insert(*kind, index);
        }
        debug!(
            "Registered enricher {} for {:?}",
            client.name(),
            client.capabilities()
        );
        self.clients.push(client);
        Ok(())
    }

    pub fn with(mut self, client: Arc<dyn Enricher>) -> Result<Self, ValidationError> {
        self.register(client)?;
        Ok(self)
    }

    /// Group kinds by the client covering them, in registration order.
    ///
    /// Kinds no client covers are returned separately.
    pub fn plan(
        &self,
        kinds: &[EnrichmentKind],
    ) -> (Vec<(Arc<dyn Enricher>, Vec<EnrichmentKind>)>, Vec<EnrichmentKind>) {
        let mut grouped: BTreeMap<usize, Vec<EnrichmentKind>> = BTreeMap::new();
        let mut uncovered = Vec::new();

        for &kind in kinds {
            match self.by_kind.get(&kind) {
                Some(&index) => grouped.entry(index).or_default().push(kind),
                None => uncovered.push(kind),
            }
        }

        let groups = grouped
            .into_iter()
            .map(|(index, kinds)| (Arc::clone(&self.clients[index]), kinds))
            .collect();
        (groups, uncovered)
    }

    pub fn kinds(&self) -> impl Iterator<Item = EnrichmentKind> + '_ {
        self.by_kind.keys().copied()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
