//! Process settings from `lookout.toml`
//!
//! Every section is optional; missing values fall back to defaults.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use lookout_agents::{Credentials, Emitter, LogEmitter, WebhookEmitter};
use lookout_net::{whois::WhoisConfig, HttpConfig, RetryPolicy};
use lookout_runtime::{DispatcherConfig, PipelineConfig};

pub const DEFAULT_SETTINGS_FILE: &str = "lookout.toml";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub store: StoreSettings,
    pub http: HttpSettings,
    pub retry: RetrySettings,
    pub enrichment: EnrichmentSettings,
    pub whois: WhoisSettings,
    pub credentials: CredentialSettings,
    pub emitters: EmitterSettings,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: PathBuf::from("lookout.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub proxy: Option<String>,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            proxy: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_retries: usize,
    pub backoff_ms: Vec<u64>,
    pub jitter: bool,
    /// Per-request timeout of an analyzer (one page)
    pub fetch_timeout_secs: u64,
    /// Per-lookup timeout; also caps a full WHOIS referral chain
    pub lookup_timeout_secs: u64,
    pub emit_timeout_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_ms: vec![1_000, 5_000, 30_000],
            jitter: true,
            fetch_timeout_secs: 60,
            lookup_timeout_secs: 30,
            emit_timeout_secs: 30,
        }
    }
}

impl RetrySettings {
    fn policy(&self, timeout_secs: u64) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            backoff_schedule: self
                .backoff_ms
                .iter()
                .map(|ms| Duration::from_millis(*ms))
                .collect(),
            timeout: Duration::from_secs(timeout_secs.max(1)),
            jitter: self.jitter,
        }
    }

    pub fn fetch_policy(&self) -> RetryPolicy {
        self.policy(self.fetch_timeout_secs)
    }

    pub fn lookup_policy(&self) -> RetryPolicy {
        self.policy(self.lookup_timeout_secs)
    }

    pub fn emit_policy(&self) -> RetryPolicy {
        self.policy(self.emit_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EnrichmentSettings {
    pub enabled: bool,
    pub max_concurrent_lookups: usize,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            max_concurrent_lookups: 8,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WhoisSettings {
    pub timeout_secs: u64,
    pub max_referrals: usize,
}

impl Default for WhoisSettings {
    fn default() -> Self {
        let config = WhoisConfig::default();
        Self {
            timeout_secs: config.timeout_secs,
            max_referrals: config.max_referrals,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct CredentialSettings {
    pub urlscan_api_key: Option<String>,
    pub otx_api_key: Option<String>,
    pub ipinfo_token: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmitterSettings {
    pub log: bool,
    pub webhooks: Vec<WebhookSettings>,
}

impl Default for EmitterSettings {
    fn default() -> Self {
        Self {
            log: true,
            webhooks: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WebhookSettings {
    pub url: String,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
}

impl Settings {
    /// Load from `path`, or from `lookout.toml` in the working directory
    /// when it exists, or fall back to defaults
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_SETTINGS_FILE);
                if !default.exists() {
                    return Ok(Self::default());
                }
                default
            }
        };

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read settings {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid settings {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn http_config(&self) -> HttpConfig {
        let mut config = HttpConfig::default().with_timeout(self.http.timeout_secs);
        if let Some(proxy) = &self.http.proxy {
            config = config.with_proxy(proxy);
        }
        config
    }

    /// WHOIS settings, with the per-server timeout cut down so the whole
    /// referral chain fits in one lookup timeout
    pub fn whois_config(&self) -> WhoisConfig {
        WhoisConfig {
            timeout_secs: self.whois.timeout_secs,
            max_referrals: self.whois.max_referrals,
            ..WhoisConfig::default()
        }
        .within(Duration::from_secs(self.retry.lookup_timeout_secs.max(1)))
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            fetch_retry: self.retry.fetch_policy(),
            dispatcher: DispatcherConfig::default()
                .with_max_concurrent_lookups(self.enrichment.max_concurrent_lookups)
                .with_retry(self.retry.lookup_policy()),
        }
    }

    /// Settings-file credentials, overridden by anything given on the command
    /// line or in the environment
    pub fn credentials(&self, overrides: &Credentials) -> Credentials {
        Credentials {
            urlscan_api_key: overrides
                .urlscan_api_key
                .clone()
                .or_else(|| self.credentials.urlscan_api_key.clone()),
            otx_api_key: overrides
                .otx_api_key
                .clone()
                .or_else(|| self.credentials.otx_api_key.clone()),
            ipinfo_token: overrides
                .ipinfo_token
                .clone()
                .or_else(|| self.credentials.ipinfo_token.clone()),
        }
    }

    pub fn emitters(&self) -> Result<Vec<Arc<dyn Emitter>>> {
        let http = self.http_config();
        let mut emitters: Vec<Arc<dyn Emitter>> = Vec::new();

        if self.emitters.log {
            emitters.push(Arc::new(LogEmitter::new()));
        }
        for webhook in &self.emitters.webhooks {
            let mut emitter = WebhookEmitter::new(&http, &webhook.url)?;
            for (name, value) in &webhook.headers {
                emitter = emitter.with_header(name, value);
            }
            emitters.push(Arc::new(emitter));
        }

        Ok(emitters)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = Settings::from_toml_str("").unwrap();
        assert_eq!(settings.store.path, PathBuf::from("lookout.json"));
        assert_eq!(settings.retry.max_retries, 3);
        assert!(settings.emitters.log);
        assert!(settings.enrichment.enabled);
    }

    #[test]
    fn test_parse_settings() {
        let settings = Settings::from_toml_str(
            r#"
            [store]
            path = "/var/lib/lookout/history.json"

            [retry]
            max_retries = 1
            backoff_ms = [250]
            lookup_timeout_secs = 5

            [enrichment]
            max_concurrent_lookups = 2

            [credentials]
            otx_api_key = "from-file"

            [emitters]
            log = false

            [[emitters.webhooks]]
            url = "https://hooks.example.com/lookout"
            headers = { Authorization = "Bearer abc" }
            "#,
        )
        .unwrap();

        let pipeline = settings.pipeline_config();
        assert_eq!(pipeline.fetch_retry.max_retries, 1);
        assert_eq!(
            pipeline.dispatcher.retry.backoff_schedule,
            vec![Duration::from_millis(250)]
        );
        assert_eq!(pipeline.dispatcher.retry.timeout, Duration::from_secs(5));
        assert_eq!(pipeline.dispatcher.max_concurrent_lookups, 2);

        let emitters = settings.emitters().unwrap();
        assert_eq!(emitters.len(), 1);
        assert_eq!(emitters[0].name(), "webhook");

        // 5s lookups over a 3 server chain
        assert_eq!(settings.whois_config().timeout_secs, 1);
    }

    #[test]
    fn test_whois_chain_fits_lookup_timeout() {
        let settings = Settings::default();
        let whois = settings.whois_config();
        let chain = Duration::from_secs(whois.timeout_secs * (whois.max_referrals as u64 + 1));
        assert_eq!(whois.timeout_secs, 10);
        assert!(chain <= settings.pipeline_config().dispatcher.retry.timeout);
    }

    #[test]
    fn test_command_line_credentials_win() {
        let settings = Settings::from_toml_str(
            "[credentials]\notx_api_key = \"from-file\"\nurlscan_api_key = \"file-urlscan\"\n",
        )
        .unwrap();
        let overrides = Credentials::default().with_otx_api_key("from-env");

        let credentials = settings.credentials(&overrides);
        assert_eq!(credentials.otx_api_key.as_deref(), Some("from-env"));
        assert_eq!(credentials.urlscan_api_key.as_deref(), Some("file-urlscan"));
        assert!(credentials.ipinfo_token.is_none());
    }

    #[test]
    fn test_unknown_file_is_an_error() {
        assert!(Settings::load(Some(Path::new("/nonexistent/lookout.toml"))).is_err());
    }
}
