//! Error types for feedlens-core.

use thiserror::Error;

/// Result type alias using feedlens-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Message written to the store when an empty post is submitted.
pub const EMPTY_INPUT_MESSAGE: &str = "Cannot analyze empty post.";

/// Message written to the store when no API key is configured.
pub const MISSING_CREDENTIALS_MESSAGE: &str =
    "API Key not set. Please configure it with `feedlens credentials set`.";

/// Message used when the service answered without message content.
pub const MALFORMED_RESPONSE_MESSAGE: &str = "Could not parse insights from AI response.";

/// Message shown when the generated text held no bullet lines.
pub const NO_INSIGHTS_MESSAGE: &str = "AI returned no insights or an empty response.";

/// Core error types for feedlens operations
#[derive(Error, Debug)]
pub enum Error {
    // Analysis errors
    #[error("{}", EMPTY_INPUT_MESSAGE)]
    EmptyInput,

    #[error("{}", MISSING_CREDENTIALS_MESSAGE)]
    MissingCredentials,

    #[error("API failed: {}. {detail}", status_label(.status))]
    Transport { status: Option<u16>, detail: String },

    #[error("{}", MALFORMED_RESPONSE_MESSAGE)]
    MalformedResponse,

    #[error("{}", NO_INSIGHTS_MESSAGE)]
    NoInsightsParsed,

    // Page errors
    #[error("No action region found for post")]
    RegionNotFound,

    #[error("Failed to copy text: {0}")]
    ClipboardFailure(String),

    #[error("Markup error: {0}")]
    Markup(String),

    #[error("Trigger not found: {0}")]
    TriggerNotFound(usize),

    // Store errors
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Database lock poisoned")]
    LockPoisoned,

    // Messaging errors
    #[error("Analysis service is not running")]
    ChannelClosed,

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

fn status_label(status: &Option<u16>) -> String {
    match status {
        Some(code) => code.to_string(),
        None => "network".to_string(),
    }
}

impl Error {
    /// Create a transport error from an HTTP status and the service-reported detail
    pub fn transport(status: Option<u16>, detail: impl Into<String>) -> Self {
        Self::Transport {
            status,
            detail: detail.into(),
        }
    }

    /// Whether this error ends an analysis request (as opposed to an infrastructure fault)
    pub fn is_analysis_failure(&self) -> bool {
        matches!(
            self,
            Error::EmptyInput
                | Error::MissingCredentials
                | Error::Transport { .. }
                | Error::MalformedResponse
        )
    }
}
