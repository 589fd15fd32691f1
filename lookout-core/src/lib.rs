//! Lookout Core - Domain model for rule-driven indicator monitoring
//!
//! This crate provides the foundational primitives:
//! - Indicator classification (domain, ip, url, mail, hash)
//! - Artifacts and their enrichment attachments
//! - Rules with decay windows and analyzer selection
//! - Alerts bundling newly found artifacts

pub mod classify;
pub mod artifact;
pub mod enrichment;
pub mod rule;
pub mod alert;
pub mod error;

pub use classify::*;
pub use artifact::*;
pub use enrichment::*;
pub use rule::*;
pub use alert::*;
pub use error::*;

/// Longest accepted domain name
pub const MAX_DOMAIN_LENGTH: usize = 253;
