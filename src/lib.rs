pub mod args;
pub mod detection;
pub mod device;
pub mod settings;
pub mod template_matching;

pub use detection::{DetectionConfig, DetectionLoop, TemplateStore};
pub use template_matching::MatchEngine;
