//! HTTP client construction and error classification
//!
//! Every analyzer and enricher builds its client here so timeouts, proxying
//! and the user agent are configured in one place.

use reqwest::{Client, Proxy, Response, StatusCode};
use std::time::Duration;
use thiserror::Error;

/// HTTP client configuration
#[derive(Debug, Clone)]
pub struct HttpConfig {
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Optional proxy URL (http://, socks5h://)
    pub proxy: Option<String>,
    /// User agent sent with every request
    pub user_agent: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            proxy: None,
            user_agent: format!("lookout/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpConfig {
    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = timeout_secs;
        self
    }

    pub fn with_proxy(mut self, proxy: &str) -> Self {
        self.proxy = Some(proxy.to_string());
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

/// Errors from outbound requests
#[derive(Debug, Error)]
pub enum NetError {
    #[error("Failed to build HTTP client: {0}")]
    ClientBuild(String),

    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { status: StatusCode, url: String },

    #[error("Timeout after {0} seconds")]
    Timeout(u64),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl NetError {
    /// Whether repeating the same request may succeed
    pub fn is_transient(&self) -> bool {
        match self {
            NetError::Request(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            NetError::Status { status, .. } => {
                *status == StatusCode::TOO_MANY_REQUESTS
                    || *status == StatusCode::REQUEST_TIMEOUT
                    || status.is_server_error()
            }
            NetError::Timeout(_) | NetError::Io(_) => true,
            NetError::ClientBuild(_) | NetError::InvalidResponse(_) => false,
        }
    }
}

/// Create an HTTP client from configuration
pub fn create_client(config: &HttpConfig) -> Result<Client, NetError> {
    let mut builder = Client::builder()
        .timeout(config.timeout())
        .user_agent(&config.user_agent);

    // Only the configured proxy is used, never the environment's
    builder = match &config.proxy {
        Some(proxy) => {
            let proxy = Proxy::all(proxy).map_err(|e| NetError::ClientBuild(e.to_string()))?;
            builder.proxy(proxy)
        }
        None => builder.no_proxy(),
    };

    builder
        .build()
        .map_err(|e| NetError::ClientBuild(e.to_string()))
}

/// Turn a non-success response into [`NetError::Status`]
pub fn check_status(response: Response) -> Result<Response, NetError> {
    let status = response.status();
    if status.is_success() {
        Ok(response)
    } else {
        Err(NetError::Status {
            status,
            url: response.url().to_string(),
        })
    }
}
