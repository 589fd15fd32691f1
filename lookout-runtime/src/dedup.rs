//! Decay-aware uniqueness
//!
//! An artifact is new for a rule when the rule has never alerted on the same
//! data, or when the last sighting is older than the rule's artifact TTL.

use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use tracing::debug;

use lookout_agents::{Persistence, PersistenceError};
use lookout_core::{Artifact, RuleId};

/// Decision against the most recent sighting.
///
/// Without a TTL a sighting never decays. With one, the sighting must be
/// strictly older than `ttl` at `now`.
pub fn is_new_at(most_recent: Option<&Artifact>, ttl: Option<Duration>, now: DateTime<Utc>) -> bool {
    let Some(existing) = most_recent else {
        return true;
    };
    let Some(ttl) = ttl else {
        return false;
    };

    existing
        .created_at
        .is_some_and(|created_at| now - created_at > ttl)
}

/// Look up the most recent sighting and decide
pub async fn is_new(
    store: &dyn Persistence,
    artifact: &Artifact,
    rule_id: &RuleId,
    ttl: Option<Duration>,
    now: DateTime<Utc>,
) -> Result<bool, PersistenceError> {
    let most_recent = store.find_most_recent(rule_id, artifact.data()).await?;
    Ok(is_new_at(most_recent.as_ref(), ttl, now))
}

/// Filters one run's artifacts against history and against each other
pub struct Deduplicator<'a> {
    store: &'a dyn Persistence,
    rule_id: &'a RuleId,
    ttl: Option<Duration>,
    now: DateTime<Utc>,
    seen: HashSet<String>,
}

impl<'a> Deduplicator<'a> {
    pub fn new(
        store: &'a dyn Persistence,
        rule_id: &'a RuleId,
        ttl: Option<Duration>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            store,
            rule_id,
            ttl,
            now,
            seen: HashSet::new(),
        }
    }

    /// Keep artifacts that are new, first occurrence wins, input order kept
    pub async fn filter(&mut self, artifacts: Vec<Artifact>) -> Result<Vec<Artifact>, PersistenceError> {
        let mut fresh = Vec::with_capacity(artifacts.len());

        for artifact in artifacts {
            if !self.seen.insert(artifact.data().to_string()) {
                continue;
            }

            if is_new(self.store, &artifact, self.rule_id, self.ttl, self.now).await? {
                fresh.push(artifact);
            } else {
                debug!("Skipping known artifact {} for rule {}", artifact.data(), self.rule_id);
            }
        }

        Ok(fresh)
    }
}
