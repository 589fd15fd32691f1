//! Alert sinks

pub mod log;
pub mod webhook;

pub use log::LogEmitter;
pub use webhook::WebhookEmitter;
