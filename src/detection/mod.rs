// Detection module
// Polls a screen region, matches it against the configured icon templates
// and presses the bound key when one shows up.

pub mod channels;
pub mod config;
pub mod controller;
pub mod error;
pub mod stability;
pub mod stats;
pub mod template;
pub mod types;
pub mod worker;

#[cfg(test)]
mod tests;

// Re-export the main types and functions for easy access
pub use channels::create_detection_channel;
pub use config::{DetectionConfig, DetectionSettings};
pub use controller::{DetectionLoop, STOP_TIMEOUT};
pub use error::{DetectionError, DetectionResult, TemplateStoreError, TemplateStoreResult};
pub use stability::StabilityFilter;
pub use stats::{PerformanceReport, PerformanceStats};
pub use template::{Template, TemplateStore};
pub use types::{DetectionEvent, RunState, TickOutcome};
pub use worker::{DetectionWorker, SharedStatus};
