//! Shared types for feedlens-core.
//!
//! These types cross the boundaries between the page scanner, the analysis
//! orchestrator and the control panel.

use serde::{Deserialize, Serialize};

use crate::dom::NodeId;

/// Model used when the user has not chosen one.
pub const DEFAULT_MODEL: &str = "mistralai/Mixtral-8x7B-Instruct-v0.1";

// ─────────────────────────────────────────────────────────────────────────────
// Page Types
// ─────────────────────────────────────────────────────────────────────────────

/// One discovered unit of text. Recomputed on every scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentBlock {
    /// Post element the text was extracted from.
    pub post: NodeId,
    /// Normalized text.
    pub text: String,
    /// Whether the post already carries a trigger.
    pub has_trigger: bool,
}

// ─────────────────────────────────────────────────────────────────────────────
// Analysis Types
// ─────────────────────────────────────────────────────────────────────────────

/// Request to analyze one piece of text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub source_text: String,
}

impl AnalysisRequest {
    pub fn new(source_text: impl Into<String>) -> Self {
        Self {
            source_text: source_text.into(),
        }
    }
}

/// Outcome of one completed request, written once to the state store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AnalysisResult {
    Success {
        request_id: String,
        source_text: String,
        insights_text: String,
        timestamp: i64,
    },
    Failure {
        request_id: String,
        source_text: String,
        error_message: String,
        timestamp: i64,
    },
}

impl AnalysisResult {
    pub fn request_id(&self) -> &str {
        match self {
            AnalysisResult::Success { request_id, .. } => request_id,
            AnalysisResult::Failure { request_id, .. } => request_id,
        }
    }

    pub fn source_text(&self) -> &str {
        match self {
            AnalysisResult::Success { source_text, .. } => source_text,
            AnalysisResult::Failure { source_text, .. } => source_text,
        }
    }

    pub fn timestamp(&self) -> i64 {
        match self {
            AnalysisResult::Success { timestamp, .. } => *timestamp,
            AnalysisResult::Failure { timestamp, .. } => *timestamp,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, AnalysisResult::Success { .. })
    }

    /// Error message for failures.
    pub fn error_message(&self) -> Option<&str> {
        match self {
            AnalysisResult::Failure { error_message, .. } => Some(error_message),
            AnalysisResult::Success { .. } => None,
        }
    }
}

/// User-supplied service credentials.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub api_key: Option<String>,
    pub model_name: Option<String>,
}

impl Credentials {
    /// Configured model, or the default model.
    pub fn model(&self) -> &str {
        self.model_name
            .as_deref()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or(DEFAULT_MODEL)
    }

    /// API key, if one is set and non-blank.
    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref().filter(|k| !k.trim().is_empty())
    }
}

/// One rendered bullet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Insight {
    pub text: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Messaging Types
// ─────────────────────────────────────────────────────────────────────────────

/// Cross-context message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "ANALYZE_POST")]
    AnalyzePost { text: String },

    #[serde(rename = "ANALYSIS_COMPLETE")]
    AnalysisComplete {
        success: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        #[serde(rename = "requestId", default, skip_serializing_if = "Option::is_none")]
        request_id: Option<String>,
    },
}

/// Acknowledgement status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AckStatus {
    Received,
}

/// Synchronous reply to an `ANALYZE_POST` message. Confirms acceptance only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub status: AckStatus,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub message: String,
}

impl Ack {
    pub fn received(request_id: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Received,
            request_id: request_id.into(),
            message: "Processing request...".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_message_wire_format() {
        let msg = Message::AnalyzePost {
            text: "hello".into(),
        };
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json, serde_json::json!({"type": "ANALYZE_POST", "text": "hello"}));

        let done: Message = serde_json::from_str(
            r#"{"type":"ANALYSIS_COMPLETE","success":false,"error":"API Key not set."}"#,
        )
        .unwrap();
        assert_eq!(
            done,
            Message::AnalysisComplete {
                success: false,
                error: Some("API Key not set.".into()),
                request_id: None,
            }
        );
    }

    #[test]
    fn test_ack_wire_format() {
        let json = serde_json::to_value(Ack::received("r-1")).unwrap();
        assert_eq!(json["status"], "received");
        assert_eq!(json["requestId"], "r-1");
    }

    #[test]
    fn test_credentials_model_fallback() {
        let creds = Credentials::default();
        assert_eq!(creds.model(), DEFAULT_MODEL);
        assert!(creds.api_key().is_none());

        let creds = Credentials {
            api_key: Some("  ".into()),
            model_name: Some("meta-llama/Llama-3-8b".into()),
        };
        assert_eq!(creds.model(), "meta-llama/Llama-3-8b");
        assert!(creds.api_key().is_none());
    }
}
