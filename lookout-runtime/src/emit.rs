//! Hands a saved alert to every emitter, each call retried on its own

use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, error};

use lookout_agents::{EmitError, Emitter};
use lookout_core::Alert;
use lookout_net::{retry_with_backoff, RetryPolicy};

#[derive(Debug, Default)]
pub struct EmitReport {
    pub delivered: Vec<String>,
    pub failed: Vec<(String, EmitError)>,
}

impl EmitReport {
    pub fn all_delivered(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Emit concurrently; one emitter failing does not stop the others
pub async fn emit_all(
    emitters: &[Arc<dyn Emitter>],
    alert: &Alert,
    retry: &RetryPolicy,
) -> EmitReport {
    let calls = emitters.iter().map(|emitter| async move {
        let result = retry_with_backoff(retry, emitter.name(), || emitter.emit(alert)).await;
        (emitter.name().to_string(), result)
    });

    let mut report = EmitReport::default();
    for (name, result) in join_all(calls).await {
        match result {
            Ok(()) => {
                debug!("Emitted alert for rule {} via {}", alert.rule_id, name);
                report.delivered.push(name);
            }
            Err(e) => {
                error!("Emitter {} failed for rule {}: {}", name, alert.rule_id, e);
                report.failed.push((name, e));
            }
        }
    }

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use lookout_core::{Artifact, RuleId};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct FlakyEmitter {
        name: &'static str,
        transient_failures: u32,
        permanent: bool,
        calls: AtomicU32,
    }

    impl FlakyEmitter {
        fn new(name: &'static str, transient_failures: u32, permanent: bool) -> Arc<Self> {
            Arc::new(Self {
                name,
                transient_failures,
                permanent,
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Emitter for FlakyEmitter {
        fn name(&self) -> &str {
            self.name
        }

        async fn emit(&self, _alert: &Alert) -> Result<(), EmitError> {
            let attempt = self.calls.fetch_add(1, Ordering::SeqCst);
            if self.permanent {
                Err(EmitError::Permanent("rejected".to_string()))
            } else if attempt < self.transient_failures {
                Err(EmitError::Transient("connection reset".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn alert() -> Alert {
        Alert {
            id: None,
            rule_id: RuleId::from("r1"),
            title: "Test".to_string(),
            tags: Default::default(),
            artifacts: vec![Artifact::new("example.com").unwrap()],
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_failures_are_isolated() {
        let flaky = FlakyEmitter::new("flaky", 1, false);
        let broken = FlakyEmitter::new("broken", 0, true);
        let emitters: Vec<Arc<dyn Emitter>> = vec![flaky.clone(), broken.clone()];
        let retry = RetryPolicy {
            max_retries: 2,
            backoff_schedule: vec![Duration::from_millis(1)],
            timeout: Duration::from_secs(1),
            jitter: false,
        };

        let report = emit_all(&emitters, &alert(), &retry).await;

        assert_eq!(report.delivered, vec!["flaky".to_string()]);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].0, "broken");
        assert!(!report.all_delivered());
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 2);
        assert_eq!(broken.calls.load(Ordering::SeqCst), 1);
    }
}
