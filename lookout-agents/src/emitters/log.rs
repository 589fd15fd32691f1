use async_trait::async_trait;
use tracing::info;

use lookout_core::Alert;

use crate::{EmitError, Emitter};

/// Writes each alert and its artifacts to the log
#[derive(Debug, Default)]
pub struct LogEmitter;

impl LogEmitter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Emitter for LogEmitter {
    fn name(&self) -> &str {
        "log"
    }

    async fn emit(&self, alert: &Alert) -> Result<(), EmitError> {
        let id = alert
            .id
            .map(|id| id.to_string())
            .unwrap_or_else(|| "-".to_string());

        info!(
            "Alert {} for rule {} ({}): {} new artifacts",
            id,
            alert.rule_id,
            alert.title,
            alert.len()
        );
        for artifact in &alert.artifacts {
            info!("  [{}] {} (via {})", artifact.data_type(), artifact.data(), artifact.source);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use lookout_core::{Artifact, RuleId};

    #[tokio::test]
    async fn test_log_emit_never_fails() {
        let alert = Alert {
            id: None,
            rule_id: RuleId::from("r1"),
            title: "Test".to_string(),
            tags: Default::default(),
            artifacts: vec![Artifact::new("example.com").unwrap()],
            created_at: Utc::now(),
        };

        assert!(LogEmitter::new().emit(&alert).await.is_ok());
    }
}
