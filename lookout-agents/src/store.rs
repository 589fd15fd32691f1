//! Alert history stores
//!
//! [`MemoryStore`] keeps everything in process. [`JsonFileStore`] layers a
//! JSON snapshot on top of it, rewritten after every change.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use lookout_core::{Alert, AlertId, Artifact, RuleId};

use crate::{Persistence, PersistenceError};

/// Everything a store holds, also the snapshot file format
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSnapshot {
    #[serde(default)]
    pub alerts: Vec<Alert>,
    /// Rule id to fingerprint of the rule definition last run
    #[serde(default)]
    pub rule_fingerprints: BTreeMap<RuleId, String>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<StoreSnapshot>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_snapshot(snapshot: StoreSnapshot) -> Self {
        Self {
            state: RwLock::new(snapshot),
        }
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        self.state.read().clone()
    }

    fn most_recent(&self, rule_id: &RuleId, data: &str) -> Option<Artifact> {
        let state = self.state.read();
        state
            .alerts
            .iter()
            .filter(|alert| &alert.rule_id == rule_id)
            .flat_map(|alert| alert.artifacts.iter())
            .filter(|artifact| artifact.data() == data)
            .max_by_key(|artifact| artifact.created_at)
            .cloned()
    }

    /// Assign the id and fill artifact timestamps and owning rule
    fn stamp(mut alert: Alert) -> Alert {
        let id = alert.id.unwrap_or_default();
        alert.id = Some(id);
        for artifact in &mut alert.artifacts {
            artifact.created_at.get_or_insert(alert.created_at);
            artifact.rule_id = Some(alert.rule_id.clone());
        }
        alert
    }

    fn replace(&self, snapshot: StoreSnapshot) {
        *self.state.write() = snapshot;
    }

    fn list(&self, rule_id: Option<&RuleId>, limit: usize) -> Vec<Alert> {
        let state = self.state.read();
        let mut alerts: Vec<Alert> = state
            .alerts
            .iter()
            .filter(|alert| rule_id.is_none_or(|id| &alert.rule_id == id))
            .cloned()
            .collect();
        alerts.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        alerts.truncate(limit);
        alerts
    }

    fn get(&self, id: AlertId) -> Option<Alert> {
        self.state
            .read()
            .alerts
            .iter()
            .find(|alert| alert.id == Some(id))
            .cloned()
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn find_most_recent(
        &self,
        rule_id: &RuleId,
        data: &str,
    ) -> Result<Option<Artifact>, PersistenceError> {
        Ok(self.most_recent(rule_id, data))
    }

    async fn save(&self, alert: Alert) -> Result<Alert, PersistenceError> {
        let alert = Self::stamp(alert);
        self.state.write().alerts.push(alert.clone());
        Ok(alert)
    }

    async fn list_alerts(
        &self,
        rule_id: Option<&RuleId>,
        limit: usize,
    ) -> Result<Vec<Alert>, PersistenceError> {
        Ok(self.list(rule_id, limit))
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, PersistenceError> {
        Ok(self.get(id))
    }

    async fn delete_alert(&self, id: AlertId) -> Result<bool, PersistenceError> {
        Ok(remove_alert(&mut self.state.write(), id))
    }

    async fn rule_fingerprint(&self, rule_id: &RuleId) -> Result<Option<String>, PersistenceError> {
        Ok(self.state.read().rule_fingerprints.get(rule_id).cloned())
    }

    async fn store_rule_fingerprint(
        &self,
        rule_id: &RuleId,
        fingerprint: &str,
    ) -> Result<(), PersistenceError> {
        self.state
            .write()
            .rule_fingerprints
            .insert(rule_id.clone(), fingerprint.to_string());
        Ok(())
    }
}

fn remove_alert(snapshot: &mut StoreSnapshot, id: AlertId) -> bool {
    let before = snapshot.alerts.len();
    snapshot.alerts.retain(|alert| alert.id != Some(id));
    snapshot.alerts.len() != before
}

/// [`MemoryStore`] persisted to a JSON file.
///
/// A change becomes visible in memory only after the snapshot holding it
/// has been written, so a failed write leaves history untouched.
pub struct JsonFileStore {
    path: PathBuf,
    memory: MemoryStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl JsonFileStore {
    /// Load the snapshot at `path`, or start empty if it does not exist
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, PersistenceError> {
        let path = path.as_ref().to_path_buf();

        let snapshot = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => StoreSnapshot::default(),
            Err(e) => return Err(e.into()),
        };
        debug!(
            "Opened store {} with {} alerts",
            path.display(),
            snapshot.alerts.len()
        );

        Ok(Self {
            path,
            memory: MemoryStore::from_snapshot(snapshot),
            write_lock: tokio::sync::Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Apply `change` to a copy of the current state, write it through a
    /// temp file and rename, then make it the in-memory state
    async fn commit<R>(
        &self,
        change: impl FnOnce(&mut StoreSnapshot) -> R,
    ) -> Result<R, PersistenceError> {
        let _guard = self.write_lock.lock().await;
        let mut next = self.memory.snapshot();
        let outcome = change(&mut next);

        self.write(&next).await?;
        self.memory.replace(next);
        Ok(outcome)
    }

    async fn write(&self, snapshot: &StoreSnapshot) -> Result<(), PersistenceError> {
        let bytes = serde_json::to_vec_pretty(snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, bytes).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Persistence for JsonFileStore {
    async fn find_most_recent(
        &self,
        rule_id: &RuleId,
        data: &str,
    ) -> Result<Option<Artifact>, PersistenceError> {
        self.memory.find_most_recent(rule_id, data).await
    }

    async fn save(&self, alert: Alert) -> Result<Alert, PersistenceError> {
        let alert = MemoryStore::stamp(alert);
        let saved = alert.clone();
        self.commit(|snapshot| snapshot.alerts.push(alert)).await?;
        Ok(saved)
    }

    async fn list_alerts(
        &self,
        rule_id: Option<&RuleId>,
        limit: usize,
    ) -> Result<Vec<Alert>, PersistenceError> {
        self.memory.list_alerts(rule_id, limit).await
    }

    async fn get_alert(&self, id: AlertId) -> Result<Option<Alert>, PersistenceError> {
        self.memory.get_alert(id).await
    }

    async fn delete_alert(&self, id: AlertId) -> Result<bool, PersistenceError> {
        if self.memory.get(id).is_none() {
            return Ok(false);
        }
        self.commit(|snapshot| remove_alert(snapshot, id)).await
    }

    async fn rule_fingerprint(&self, rule_id: &RuleId) -> Result<Option<String>, PersistenceError> {
        self.memory.rule_fingerprint(rule_id).await
    }

    async fn store_rule_fingerprint(
        &self,
        rule_id: &RuleId,
        fingerprint: &str,
    ) -> Result<(), PersistenceError> {
        self.commit(|snapshot| {
            snapshot
                .rule_fingerprints
                .insert(rule_id.clone(), fingerprint.to_string());
        })
        .await
    }
}
