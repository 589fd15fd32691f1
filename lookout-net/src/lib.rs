//! Lookout Network Layer
//!
//! Outbound plumbing shared by analyzers and enrichers:
//! - HTTP client construction with optional proxy
//! - Retry with backoff and a per-attempt timeout
//! - Cursor pagination with inter-page pacing
//! - WHOIS over port 43 with referral following

pub mod client;
pub mod pager;
pub mod retry;
pub mod whois;

pub use client::*;
pub use pager::*;
pub use retry::*;
