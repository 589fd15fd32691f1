//! Lookout Agents
//!
//! Collaborators the pipeline talks to through traits:
//! - **Analyzers**: crt.sh, urlscan.io and AlienVault OTX
//! - **Enrichers**: WHOIS, Google Public DNS, IPInfo and Shodan InternetDB,
//!   mapped to enrichment kinds by [`enrichers::EnricherRegistry`]
//! - **Emitters**: log and webhook sinks
//! - **Stores**: in-memory and JSON-file alert history

pub mod analyzers;
pub mod emitters;
pub mod enrichers;
pub mod store;
pub mod traits;

pub use analyzers::build_analyzer;
pub use emitters::{LogEmitter, WebhookEmitter};
pub use enrichers::EnricherRegistry;
pub use store::{JsonFileStore, MemoryStore, StoreSnapshot};
pub use traits::*;
