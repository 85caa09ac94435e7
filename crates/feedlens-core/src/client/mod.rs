//! Generation service client.
//!
//! The orchestrator only sees [`GenerationClient`]: one call in, generated
//! text or an error out. [`HttpGenerationClient`] talks to an
//! OpenAI-compatible chat-completions endpoint.
//!
//! # Usage
//!
//! ```rust,no_run
//! use feedlens_core::client::{GenerationClient, GenerationRequest, HttpGenerationClient};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = HttpGenerationClient::new()?;
//!     let text = client
//!         .generate(GenerationRequest {
//!             api_key: "sk-...".into(),
//!             model: "mistralai/Mixtral-8x7B-Instruct-v0.1".into(),
//!             system_prompt: "Summarize.".into(),
//!             user_text: "Some post".into(),
//!         })
//!         .await?;
//!     println!("{}", text);
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

#[cfg(feature = "client")]
use crate::error::Error;
#[cfg(feature = "client")]
use tracing::{debug, warn};

/// Default chat-completions endpoint.
pub const DEFAULT_API_URL: &str = "https://api.together.xyz/v1/chat/completions";

/// Output token cap for one analysis.
pub const MAX_TOKENS: u32 = 700;

/// Sampling temperature for one analysis.
pub const TEMPERATURE: f32 = 0.7;

/// One call to the generation service.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub api_key: String,
    pub model: String,
    pub system_prompt: String,
    pub user_text: String,
}

/// Opaque generation collaborator.
#[async_trait]
pub trait GenerationClient: Send + Sync {
    /// Run one completion and return the generated message content.
    async fn generate(&self, request: GenerationRequest) -> Result<String>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Wire Types
// ─────────────────────────────────────────────────────────────────────────────

/// Chat message in the request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

/// Chat-completions request body.
#[derive(Debug, Clone, Serialize)]
pub struct ChatCompletionBody {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl ChatCompletionBody {
    pub fn from_request(request: &GenerationRequest) -> Self {
        Self {
            model: request.model.clone(),
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: request.system_prompt.clone(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: request.user_text.clone(),
                },
            ],
            max_tokens: MAX_TOKENS,
            temperature: TEMPERATURE,
        }
    }
}

/// Chat-completions success body. Every level is optional so a malformed
/// body is detected by [`ChatCompletionResponse::content`] rather than by
/// the JSON decoder.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<ChatChoice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoice {
    #[serde(default)]
    pub message: Option<ChatChoiceMessage>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    /// `choices[0].message.content`, when present and non-empty.
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|c| c.message.as_ref())
            .and_then(|m| m.content.as_deref())
            .filter(|c| !c.is_empty())
    }
}

const UNKNOWN_API_ERROR: &str = "Unknown API error";

/// Error detail reported by the service: `error.message`, else `message`.
pub fn error_detail(body: &serde_json::Value) -> Option<String> {
    body.get("error")
        .and_then(|e| e.get("message"))
        .and_then(|m| m.as_str())
        .or_else(|| body.get("message").and_then(|m| m.as_str()))
        .map(String::from)
}

/// Detail for a failed call: the service's message, else the status reason.
pub fn failure_detail(body: &serde_json::Value, status_reason: Option<&str>) -> String {
    error_detail(body)
        .or_else(|| status_reason.map(String::from))
        .unwrap_or_else(|| UNKNOWN_API_ERROR.to_string())
}

// ─────────────────────────────────────────────────────────────────────────────
// HTTP Client
// ─────────────────────────────────────────────────────────────────────────────

/// reqwest-backed client for OpenAI-compatible endpoints.
#[cfg(feature = "client")]
#[derive(Clone)]
pub struct HttpGenerationClient {
    api_url: String,
    client: reqwest::Client,
}

#[cfg(feature = "client")]
impl HttpGenerationClient {
    /// Create a client for the default endpoint.
    pub fn new() -> Result<Self> {
        Self::with_url(DEFAULT_API_URL)
    }

    /// Create a client for a custom endpoint.
    pub fn with_url(api_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(120))
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self {
            api_url: api_url.into(),
            client,
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }
}

#[cfg(feature = "client")]
#[async_trait]
impl GenerationClient for HttpGenerationClient {
    async fn generate(&self, request: GenerationRequest) -> Result<String> {
        let body = ChatCompletionBody::from_request(&request);
        debug!(url = %self.api_url, model = %body.model, "Generation request");

        let resp = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", request.api_key))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::transport(e.status().map(|s| s.as_u16()), e.to_string()))?;

        let status = resp.status();
        if !status.is_success() {
            let error_body: serde_json::Value = resp
                .json()
                .await
                .unwrap_or(serde_json::Value::Null);
            warn!(status = status.as_u16(), body = %error_body, "Generation service error");
            let detail = failure_detail(&error_body, status.canonical_reason());
            return Err(Error::transport(Some(status.as_u16()), detail));
        }

        let data: ChatCompletionResponse = resp.json().await.map_err(|e| {
            warn!(error = %e, "Undecodable generation response");
            Error::MalformedResponse
        })?;

        data.content()
            .map(String::from)
            .ok_or(Error::MalformedResponse)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest {
            api_key: "sk-test".into(),
            model: "model-a".into(),
            system_prompt: "system".into(),
            user_text: "user".into(),
        }
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(ChatCompletionBody::from_request(&request())).unwrap();
        assert_eq!(body["model"], "model-a");
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][0]["content"], "system");
        assert_eq!(body["messages"][1]["role"], "user");
        assert_eq!(body["messages"][1]["content"], "user");
        assert_eq!(body["max_tokens"], 700);
        assert!((body["temperature"].as_f64().unwrap() - 0.7).abs() < 1e-6);
    }

    #[test]
    fn test_response_content_extraction() {
        let ok: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{"content":"- a"}}]}"#).unwrap();
        assert_eq!(ok.content(), Some("- a"));

        let missing: ChatCompletionResponse =
            serde_json::from_str(r#"{"choices":[{"message":{}}]}"#).unwrap();
        assert_eq!(missing.content(), None);

        let empty: ChatCompletionResponse = serde_json::from_str(r#"{"id":"x"}"#).unwrap();
        assert_eq!(empty.content(), None);
    }

    #[test]
    fn test_error_detail_priority() {
        let nested = serde_json::json!({"error": {"message": "Invalid API key"}, "message": "outer"});
        assert_eq!(error_detail(&nested).as_deref(), Some("Invalid API key"));

        let flat = serde_json::json!({"message": "Rate limited"});
        assert_eq!(error_detail(&flat).as_deref(), Some("Rate limited"));

        assert_eq!(error_detail(&serde_json::json!({})), None);
    }

    #[test]
    fn test_failure_detail_falls_back_to_status_reason() {
        let detail = failure_detail(&serde_json::json!({}), Some("Internal Server Error"));
        assert_eq!(detail, "Internal Server Error");
        assert_eq!(
            Error::transport(Some(500), detail).to_string(),
            "API failed: 500. Internal Server Error"
        );

        assert_eq!(failure_detail(&serde_json::Value::Null, None), "Unknown API error");

        let body = serde_json::json!({"error": {"message": "Invalid API key"}});
        assert_eq!(failure_detail(&body, Some("Unauthorized")), "Invalid API key");
    }
}
