//! Lookout Runtime
//!
//! The artifact pipeline:
//! - Decay-aware deduplication against alert history
//! - Enrichment dispatch with bounded concurrency and contained failures
//! - Per-rule serialized runs producing at most one alert each
//! - Emitter fan-out for saved alerts

pub mod dedup;
pub mod dispatcher;
pub mod emit;
pub mod pipeline;

pub use dedup::{is_new, is_new_at, Deduplicator};
pub use dispatcher::{Dispatcher, DispatcherConfig, EnrichmentReport, SkipReason};
pub use emit::{emit_all, EmitReport};
pub use pipeline::{Pipeline, PipelineConfig, PipelineError};
