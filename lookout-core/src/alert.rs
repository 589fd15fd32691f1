//! Alerts: the unit handed to emitters

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use uuid::Uuid;

use crate::{Artifact, Rule, RuleId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlertId(pub Uuid);

impl AlertId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for AlertId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AlertId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Newly found artifacts of one rule run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Assigned by persistence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<AlertId>,
    pub rule_id: RuleId,
    pub title: String,
    #[serde(default)]
    pub tags: BTreeSet<String>,
    pub artifacts: Vec<Artifact>,
    pub created_at: DateTime<Utc>,
}

impl Alert {
    /// Bundle artifacts for a rule.
    ///
    /// Keeps the first artifact per `data` value, in input order.
    pub fn new(rule: &Rule, artifacts: Vec<Artifact>, created_at: DateTime<Utc>) -> Self {
        let mut seen = HashSet::new();
        let artifacts = artifacts
            .into_iter()
            .filter(|artifact| seen.insert(artifact.data().to_string()))
            .collect();

        Self {
            id: None,
            rule_id: rule.id.clone(),
            title: rule.title.clone(),
            tags: rule.tags.clone(),
            artifacts,
            created_at,
        }
    }

    pub fn len(&self) -> usize {
        self.artifacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.artifacts.is_empty()
    }
}
