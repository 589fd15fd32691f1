use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use lookout_core::Alert;
use lookout_net::{check_status, create_client, HttpConfig, NetError};

use crate::{EmitError, Emitter};

/// POSTs alert JSON to a webhook URL
pub struct WebhookEmitter {
    client: Client,
    url: String,
    headers: Vec<(String, String)>,
}

impl WebhookEmitter {
    pub fn new(http: &HttpConfig, url: &str) -> Result<Self, NetError> {
        Ok(Self {
            client: create_client(http)?,
            url: url.to_string(),
            headers: Vec::new(),
        })
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[async_trait]
impl Emitter for WebhookEmitter {
    fn name(&self) -> &str {
        "webhook"
    }

    async fn emit(&self, alert: &Alert) -> Result<(), EmitError> {
        let body = serde_json::to_vec(alert)
            .map_err(|e| EmitError::Permanent(format!("failed to serialize alert: {}", e)))?;

        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        for (name, value) in &self.headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.body(body).send().await.map_err(NetError::from)?;
        check_status(response)?;

        debug!("Posted alert for rule {} to {}", alert.rule_id, self.url);
        Ok(())
    }
}
