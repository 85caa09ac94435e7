//! Error types for feedlens.

use thiserror::Error;

/// CLI-specific failures.
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(usize),

    #[error("Insight not found: {0}")]
    InsightNotFound(usize),

    #[error("Timed out after {0}s waiting for the analysis to complete")]
    Timeout(u64),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("{0}")]
    Other(String),
}

impl From<toml::de::Error> for CliError {
    fn from(e: toml::de::Error) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<feedlens_core::Error> for CliError {
    fn from(e: feedlens_core::Error) -> Self {
        CliError::Other(e.to_string())
    }
}
