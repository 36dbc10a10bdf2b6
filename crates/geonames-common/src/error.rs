//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, GeonamesError>;

#[derive(Error, Debug)]
pub enum GeonamesError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to load settings: {0}")]
    Settings(#[from] config::ConfigError),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl GeonamesError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }
}
