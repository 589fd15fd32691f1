//! Analyzers: one per supported data source

pub mod crtsh;
pub mod otx;
pub mod urlscan;

pub use crtsh::CrtshAnalyzer;
pub use otx::OtxAnalyzer;
pub use urlscan::UrlscanAnalyzer;

use std::sync::Arc;

use lookout_core::AnalyzerConfig;
use lookout_net::HttpConfig;

use crate::{AgentError, Analyzer, Credentials};

/// Build the analyzer a rule selects
pub fn build_analyzer(
    config: &AnalyzerConfig,
    http: &HttpConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn Analyzer>, AgentError> {
    let analyzer: Arc<dyn Analyzer> = match config {
        AnalyzerConfig::Crtsh { exclude_expired } => {
            Arc::new(CrtshAnalyzer::new(http, *exclude_expired)?)
        }
        AnalyzerConfig::Urlscan => {
            let key = credentials
                .urlscan_api_key
                .as_deref()
                .ok_or(AgentError::MissingCredential("URLSCAN_API_KEY"))?;
            Arc::new(UrlscanAnalyzer::new(http, key)?)
        }
        AnalyzerConfig::Otx => {
            let key = credentials
                .otx_api_key
                .as_deref()
                .ok_or(AgentError::MissingCredential("OTX_API_KEY"))?;
            Arc::new(OtxAnalyzer::new(http, key)?)
        }
    };

    Ok(analyzer)
}
