//! WHOIS enricher: registrar, lifecycle dates and contact mails

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate};
use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use lookout_core::{EnrichmentKind, EnrichmentResult, WhoisRecord};
use lookout_net::whois::{self, WhoisConfig};

use crate::{Enricher, LookupError};

static FIELD_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*([A-Za-z][A-Za-z /().-]*?)\s*:\s*(.+?)\s*$").unwrap());

static MAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}").unwrap()
});

const NOT_FOUND_MARKERS: [&str; 5] = [
    "no match for",
    "not found",
    "no data found",
    "no entries found",
    "status: free",
];

const REGISTRAR_KEYS: [&str; 3] = ["registrar", "sponsoring registrar", "registrar name"];
const CREATED_KEYS: [&str; 5] = [
    "creation date",
    "created",
    "created on",
    "registered on",
    "registration time",
];
const UPDATED_KEYS: [&str; 5] = [
    "updated date",
    "last updated",
    "last-update",
    "changed",
    "last modified",
];
const EXPIRES_KEYS: [&str; 5] = [
    "registry expiry date",
    "registrar registration expiration date",
    "expiration date",
    "expiry date",
    "paid-till",
];

pub struct WhoisEnricher {
    config: WhoisConfig,
}

impl WhoisEnricher {
    pub fn new(config: WhoisConfig) -> Self {
        Self { config }
    }
}

impl Default for WhoisEnricher {
    fn default() -> Self {
        Self::new(WhoisConfig::default())
    }
}

/// Parse a date as registries print them
fn parse_date(raw: &str) -> Option<NaiveDate> {
    let token = raw.split_whitespace().next()?;

    if let Ok(dt) = DateTime::parse_from_rfc3339(token) {
        return Some(dt.date_naive());
    }

    ["%Y-%m-%d", "%Y.%m.%d", "%Y/%m/%d", "%d-%b-%Y", "%d.%m.%Y"]
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
        .or_else(|| {
            // 2024-01-01T00:00:00 without an offset
            token
                .get(..10)
                .and_then(|date| NaiveDate::parse_from_str(date, "%Y-%m-%d").ok())
        })
}

/// Extract a record from raw WHOIS text.
///
/// Returns `None` when the server reports no match or nothing useful was
/// found.
pub fn parse_whois(domain: &str, text: &str) -> Option<WhoisRecord> {
    let lower = text.to_ascii_lowercase();
    if text.trim().is_empty() || NOT_FOUND_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return None;
    }

    let mut record = WhoisRecord {
        domain: domain.to_string(),
        registrar: None,
        created_on: None,
        updated_on: None,
        expires_on: None,
        contacts: vec![],
    };

    for line in text.lines() {
        let Some(caps) = FIELD_RE.captures(line) else {
            continue;
        };
        let key = caps[1].to_ascii_lowercase();
        let value = &caps[2];

        if record.registrar.is_none() && REGISTRAR_KEYS.contains(&key.as_str()) {
            record.registrar = Some(value.to_string());
        } else if record.created_on.is_none() && CREATED_KEYS.contains(&key.as_str()) {
            record.created_on = parse_date(value);
        } else if record.updated_on.is_none() && UPDATED_KEYS.contains(&key.as_str()) {
            record.updated_on = parse_date(value);
        } else if record.expires_on.is_none() && EXPIRES_KEYS.contains(&key.as_str()) {
            record.expires_on = parse_date(value);
        }
    }

    let contacts: BTreeSet<String> = MAIL_RE
        .find_iter(text)
        .map(|m| m.as_str().to_ascii_lowercase())
        .collect();
    record.contacts = contacts.into_iter().collect();

    let found_anything = record.registrar.is_some()
        || record.created_on.is_some()
        || record.expires_on.is_some()
        || !record.contacts.is_empty();
    found_anything.then_some(record)
}

#[async_trait]
impl Enricher for WhoisEnricher {
    fn name(&self) -> &str {
        "whois"
    }

    fn capabilities(&self) -> &[EnrichmentKind] {
        &[EnrichmentKind::Whois]
    }

    async fn lookup(&self, key: &str) -> Result<Option<EnrichmentResult>, LookupError> {
        let response = whois::lookup(key, &self.config).await?;

        Ok(parse_whois(key, &response.text).map(|record| EnrichmentResult {
            whois_record: Some(record),
            ..Default::default()
        }))
    }
}
