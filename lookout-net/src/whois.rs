//! WHOIS over TCP port 43
//!
//! Queries start at the IANA root server and follow `refer:` and
//! `Registrar WHOIS Server:` referrals down to the registrar.

use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

use crate::NetError;

pub const IANA_WHOIS_SERVER: &str = "whois.iana.org";
pub const WHOIS_PORT: u16 = 43;

/// Largest response read from a WHOIS server
const MAX_RESPONSE_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone)]
pub struct WhoisConfig {
    /// Server the first query goes to
    pub root_server: String,
    /// How many referrals to follow after the root
    pub max_referrals: usize,
    /// Per-server timeout; a lookup may query `1 + max_referrals` servers
    pub timeout_secs: u64,
}

impl Default for WhoisConfig {
    fn default() -> Self {
        Self {
            root_server: IANA_WHOIS_SERVER.to_string(),
            max_referrals: 2,
            timeout_secs: 15,
        }
    }
}

impl WhoisConfig {
    /// Shrink the per-server timeout so that a full referral chain finishes
    /// within `budget`
    pub fn within(mut self, budget: Duration) -> Self {
        let servers = self.max_referrals as u64 + 1;
        let share = (budget.as_secs() / servers).max(1);
        self.timeout_secs = self.timeout_secs.min(share);
        self
    }
}

/// Raw text of the most specific WHOIS answer
#[derive(Debug, Clone)]
pub struct WhoisResponse {
    /// Server that produced `text`
    pub server: String,
    pub text: String,
}

/// Send one query to one server and read the full answer
pub async fn query_server(server: &str, query: &str, timeout: Duration) -> Result<String, NetError> {
    let exchange = async {
        let stream = TcpStream::connect((server, WHOIS_PORT)).await?;
        let (reader, mut writer) = stream.into_split();
        writer.write_all(format!("{}\r\n", query).as_bytes()).await?;

        let mut buf = Vec::new();
        reader.take(MAX_RESPONSE_BYTES).read_to_end(&mut buf).await?;
        Ok::<_, std::io::Error>(String::from_utf8_lossy(&buf).into_owned())
    };

    tokio::time::timeout(timeout, exchange)
        .await
        .map_err(|_| NetError::Timeout(timeout.as_secs()))?
        .map_err(NetError::from)
}

/// Next server named in a WHOIS answer, if any
pub fn referral(text: &str) -> Option<String> {
    text.lines().find_map(|line| {
        let (key, value) = line.split_once(':')?;
        let key = key.trim().to_ascii_lowercase();
        if !matches!(key.as_str(), "refer" | "whois" | "registrar whois server") {
            return None;
        }

        let value = value.trim();
        let value = value
            .strip_prefix("whois://")
            .or_else(|| value.strip_prefix("rwhois://"))
            .unwrap_or(value)
            .trim_end_matches('/');

        (!value.is_empty()).then(|| value.to_ascii_lowercase())
    })
}

/// Query the root server and follow referrals.
///
/// Fails only when the root query fails. A failing referral keeps the last
/// good answer.
pub async fn lookup(domain: &str, config: &WhoisConfig) -> Result<WhoisResponse, NetError> {
    let timeout = Duration::from_secs(config.timeout_secs);
    let mut server = config.root_server.clone();
    let mut text = query_server(&server, domain, timeout).await?;

    for _ in 0..config.max_referrals {
        let next = match referral(&text) {
            Some(next) if !next.eq_ignore_ascii_case(&server) => next,
            _ => break,
        };

        debug!("WHOIS {} referred from {} to {}", domain, server, next);
        match query_server(&next, domain, timeout).await {
            Ok(answer) => {
                server = next;
                text = answer;
            }
            Err(e) => {
                debug!("WHOIS referral to {} failed: {}", next, e);
                break;
            }
        }
    }

    Ok(WhoisResponse { server, text })
}
