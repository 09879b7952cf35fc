//! Configuration error types

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to render configuration as TOML: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid configuration: {field}: {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("XDG directory error: {0}")]
    Xdg(String),
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}
