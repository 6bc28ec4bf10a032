use thiserror::Error;

/// A specialized `Result` type for loop configuration checks.
pub type DetectionResult<T> = Result<T, DetectionError>;

/// Configuration problems that keep the loop from starting.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum DetectionError {
    #[error("No scan area configured")]
    ScanAreaUnset,

    #[error("No template has a key binding")]
    NoKeybinds,

    #[error("Detection is already {state}")]
    AlreadyActive { state: String },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DetectionError {
    pub fn invalid(message: impl Into<String>) -> Self {
        DetectionError::InvalidConfig(message.into())
    }
}

pub type TemplateStoreResult<T> = Result<T, TemplateStoreError>;

/// Mutations that would break name uniqueness leave the store untouched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TemplateStoreError {
    #[error("Template '{0}' already exists")]
    DuplicateName(String),

    #[error("Cannot rename to '{0}': name already in use")]
    NameExists(String),

    #[error("Template '{0}' not found")]
    NotFound(String),
}
