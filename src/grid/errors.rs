//! Grid-specific error types

use thiserror::Error;

/// Errors that can occur in grid trading operations
#[derive(Error, Debug, Clone)]
pub enum GridError {
    #[error("Invalid grid configuration: {0}")]
    InvalidConfig(String),

    #[error("Configuration load error: {0}")]
    Config(String),

    /// Network failure, timeout, non-2xx status or malformed payload
    #[error("Transport error: {0}")]
    Transport(String),

    /// Authentication still failing after the single re-login retry
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// A gateway call was made before any successful login
    #[error("Not authenticated, login first")]
    NotAuthenticated,

    #[error("Order rejected by venue: {0}")]
    Rejected(String),

    /// Local ledger and venue disagree in a way that cannot be resolved
    #[error("Inconsistent state: {0}")]
    Inconsistent(String),

    #[error("JSON parse error: {0}")]
    JsonParse(String),
}

impl GridError {
    /// Whether the strategy loop should simply try again next cycle
    pub fn is_transient(&self) -> bool {
        !matches!(self, GridError::InvalidConfig(_) | GridError::Config(_))
    }
}

impl From<serde_json::Error> for GridError {
    fn from(err: serde_json::Error) -> Self {
        GridError::JsonParse(err.to_string())
    }
}

impl From<reqwest::Error> for GridError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            GridError::JsonParse(err.to_string())
        } else {
            GridError::Transport(err.to_string())
        }
    }
}

impl From<config::ConfigError> for GridError {
    fn from(err: config::ConfigError) -> Self {
        GridError::Config(err.to_string())
    }
}

/// Result type for grid operations
pub type GridResult<T> = std::result::Result<T, GridError>;
