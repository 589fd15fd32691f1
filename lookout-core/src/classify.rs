//! Indicator classification
//!
//! Maps a raw indicator string to the semantic type that decides which
//! enrichments apply. Classification is total: anything that is not
//! recognized is [`DataType::Unknown`].
//!
//! Checks run in a fixed order so that ambiguous values resolve the same way
//! every time (a bare IP is never a domain):
//! 1. IP literal
//! 2. URL with a scheme and a host
//! 3. Mail address
//! 4. Domain name
//! 5. Hex digest (MD5, SHA1, SHA256, SHA512)

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

use crate::MAX_DOMAIN_LENGTH;

/// Semantic type of an indicator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Domain,
    Ip,
    Url,
    Mail,
    Hash,
    Unknown,
}

impl DataType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataType::Domain => "domain",
            DataType::Ip => "ip",
            DataType::Url => "url",
            DataType::Mail => "mail",
            DataType::Hash => "hash",
            DataType::Unknown => "unknown",
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

static URL_SCHEME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z][a-zA-Z0-9+.\-]*://").unwrap()
});

static DOMAIN_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:[a-zA-Z0-9_](?:[a-zA-Z0-9_-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}\.?$").unwrap()
});

static MAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@(?:[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?\.)+[a-zA-Z]{2,63}$")
        .unwrap()
});

static HEX_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-fA-F0-9]+$").unwrap());

static HXXP_REGEX: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\bhxxp(s?)").unwrap());

/// Digest lengths recognized as hashes (MD5, SHA1, SHA256, SHA512)
const HASH_LENGTHS: &[usize] = &[32, 40, 64, 128];

/// Classify a raw indicator value
pub fn classify(raw: &str) -> DataType {
    let value = raw.trim();

    if value.is_empty() {
        DataType::Unknown
    } else if is_ip(value) {
        DataType::Ip
    } else if is_url(value) {
        DataType::Url
    } else if MAIL_REGEX.is_match(value) {
        DataType::Mail
    } else if is_domain(value) {
        DataType::Domain
    } else if is_hash(value) {
        DataType::Hash
    } else {
        DataType::Unknown
    }
}

fn is_ip(value: &str) -> bool {
    value.parse::<IpAddr>().is_ok()
}

fn is_url(value: &str) -> bool {
    url_host(value).is_some()
}

fn is_domain(value: &str) -> bool {
    value.len() <= MAX_DOMAIN_LENGTH && DOMAIN_REGEX.is_match(value)
}

fn is_hash(value: &str) -> bool {
    HASH_LENGTHS.contains(&value.len()) && HEX_REGEX.is_match(value)
}

/// Extract the lowercased host of a URL.
///
/// Returns `None` when the value has no scheme or an empty host. Userinfo,
/// port and IPv6 brackets are stripped.
pub fn url_host(raw: &str) -> Option<String> {
    let value = raw.trim();
    let scheme = URL_SCHEME_REGEX.find(value)?;
    let rest = &value[scheme.end()..];

    let authority = rest
        .split(|c: char| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit('@').next().unwrap_or(authority);

    let host = match host_port.strip_prefix('[') {
        Some(bracketed) => bracketed.split(']').next().unwrap_or_default(),
        None => host_port.split(':').next().unwrap_or_default(),
    };

    if host.is_empty() || host.chars().any(char::is_whitespace) {
        None
    } else {
        Some(host.to_lowercase())
    }
}

/// Undo common indicator defanging (`example[.]com`, `hxxp://`, `a[@]b.com`)
pub fn refang(raw: &str) -> String {
    let value = raw
        .trim()
        .replace("[.]", ".")
        .replace("(.)", ".")
        .replace("{.}", ".")
        .replace("[dot]", ".")
        .replace("[:]", ":")
        .replace("[://]", "://")
        .replace("[@]", "@")
        .replace("[at]", "@");

    HXXP_REGEX.replace_all(&value, "http$1").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_ip() {
        assert_eq!(classify("1.1.1.1"), DataType::Ip);
        assert_eq!(classify("2606:4700:4700::1111"), DataType::Ip);
        assert_eq!(classify(" 8.8.8.8 "), DataType::Ip);
    }

    #[test]
    fn test_ip_is_not_domain() {
        // All-numeric labels never reach the domain check
        assert_ne!(classify("192.168.0.1"), DataType::Domain);
        assert_eq!(classify("999.1.1.1"), DataType::Unknown);
    }

    #[test]
    fn test_classify_url() {
        assert_eq!(classify("https://example.com/path?q=1"), DataType::Url);
        assert_eq!(classify("http://1.1.1.1:8080/"), DataType::Url);
        assert_eq!(classify("https://"), DataType::Unknown);
    }

    #[test]
    fn test_classify_domain_and_mail() {
        assert_eq!(classify("example.com"), DataType::Domain);
        assert_eq!(classify("sub.example.co.uk"), DataType::Domain);
        assert_eq!(classify("admin@example.com"), DataType::Mail);
        assert_eq!(classify("localhost"), DataType::Unknown);
    }

    #[test]
    fn test_classify_hash() {
        assert_eq!(classify("d41d8cd98f00b204e9800998ecf8427e"), DataType::Hash);
        assert_eq!(
            classify("da39a3ee5e6b4b0d3255bfef95601890afd80709"),
            DataType::Hash
        );
        assert_eq!(
            classify("e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"),
            DataType::Hash
        );
        // Wrong length
        assert_eq!(classify("d41d8cd98f00b204e9800998ecf8427"), DataType::Unknown);
    }

    #[test]
    fn test_classify_is_total() {
        let long_label = "a".repeat(300);
        let long_domain = format!("{}.com", "a".repeat(300));
        let inputs: [&str; 12] = [
            "",
            "   ",
            "\u{0}",
            "ü.ü",
            "*.example.com",
            "::",
            "http://[::1]:80/",
            "a@b",
            "....",
            "-example.com",
            &long_label,
            &long_domain,
        ];

        for input in inputs {
            let data_type = classify(input);
            assert_eq!(classify(input), data_type, "not deterministic for {input:?}");
        }

        assert_eq!(classify("*.example.com"), DataType::Unknown);
        assert_eq!(classify(&long_domain), DataType::Unknown);
    }

    #[test]
    fn test_url_host() {
        assert_eq!(
            url_host("https://user:pw@Example.COM:8443/a"),
            Some("example.com".to_string())
        );
        assert_eq!(url_host("http://[::1]:80/"), Some("::1".to_string()));
        assert_eq!(url_host("example.com/path"), None);
    }

    #[test]
    fn test_refang() {
        assert_eq!(refang("example[.]com"), "example.com");
        assert_eq!(refang("hxxps://evil[.]net/x"), "https://evil.net/x");
        assert_eq!(refang("1[.]1[.]1[.]1"), "1.1.1.1");
        assert_eq!(refang("admin[@]example.com"), "admin@example.com");
    }
}
