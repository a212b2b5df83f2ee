//! Error types shared across the workspace

use thiserror::Error;

/// Result type alias for common operations
pub type Result<T> = std::result::Result<T, CommonError>;

/// Errors raised by shared value types and helpers
#[derive(Error, Debug)]
pub enum CommonError {
    #[error("Invalid IMDb title id: {0}")]
    InvalidImdbId(String),

    #[error("Invalid log setting {name}: {value}")]
    InvalidLogSetting { name: &'static str, value: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
