//! Persisted settings: `config.json` plus one PNG per template
//!
//! ```text
//! <dir>/config.json
//! <dir>/templates/<name>.png
//! ```

pub mod error;
pub mod store;

pub use error::{SettingsError, SettingsResult};
pub use store::{SettingsStore, TemplateEntry, default_settings_dir};
