//! Result presenter and control panel state.
//!
//! [`parse_insights`] turns generated text into bullets. [`Panel`] reads the
//! analysis slot, tracks the accept/complete state machine for manual
//! submissions and owns the per-item copy confirmation.

pub mod clipboard;

pub use clipboard::{Clipboard, MemoryClipboard, SystemClipboard};

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tokio::time::{Duration, Instant};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::messaging::MessageBus;
use crate::store::{StateChange, StateStore};
use crate::types::{Ack, AckStatus, DEFAULT_MODEL, Insight, Message};

pub const EMPTY_POST_MESSAGE: &str = "Post content is empty.";
pub const KEY_REQUIRED_MESSAGE: &str = "API Key not set. Please save your API Key first.";
pub const INITIATE_FAILED_MESSAGE: &str = "Error initiating analysis. Is the analysis service running?";
pub const SEND_FAILED_MESSAGE: &str = "Failed to send request to the analysis service.";
pub const COPIED_MESSAGE: &str = "Copied to clipboard!";
pub const COPY_FAILED_MESSAGE: &str = "Failed to copy text.";

/// How long a copy confirmation stays on its item.
pub const COPY_CONFIRMATION: Duration = Duration::from_millis(2000);

pub const COPY_LABEL: &str = "📋 Copy";
pub const COPIED_LABEL: &str = "✅ Copied";

// ─────────────────────────────────────────────────────────────────────────────
// Parsing
// ─────────────────────────────────────────────────────────────────────────────

fn bullet_line() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:[-*•→]|\d+\.)").expect("bullet pattern"))
}

fn bullet_prefix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^(?:\d+\.)?[-*•→\s]*").expect("prefix pattern"))
}

fn category_label() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^(?:an?\s+)?(?:key takeaway|something surprising|interesting connection|metaphor(?: or analogy)?|expert perspective|different viewpoint|common mistake(?: to avoid)?|thought-provoking idea|potential benefit|challenge and solution)\s*:\**\s*",
        )
        .expect("category pattern")
    })
}

/// Parse generated text into insights.
///
/// Only bullet (`- * • →`) or numbered (`1.`) lines count; everything else is
/// preamble and dropped. The bullet token and an optional category label are
/// stripped from each line.
pub fn parse_insights(raw: &str) -> Vec<Insight> {
    raw.lines()
        .map(str::trim)
        .filter(|line| bullet_line().is_match(line))
        .filter_map(|line| {
            let rest = bullet_prefix().replace(line, "");
            let text = category_label().replace(rest.trim(), "");
            let text = text.trim();
            if text.is_empty() {
                None
            } else {
                Some(Insight {
                    text: text.to_string(),
                })
            }
        })
        .collect()
}

/// Parse and require at least one insight.
pub fn render(raw: &str) -> Result<Vec<Insight>> {
    let insights = parse_insights(raw);
    if insights.is_empty() {
        return Err(Error::NoInsightsParsed);
    }
    Ok(insights)
}

/// Numbered list, one insight per line.
pub fn format_numbered(insights: &[Insight]) -> String {
    insights
        .iter()
        .enumerate()
        .map(|(i, insight)| format!("{}. {}", i + 1, insight.text))
        .collect::<Vec<_>>()
        .join("\n")
}

// ─────────────────────────────────────────────────────────────────────────────
// Credentials
// ─────────────────────────────────────────────────────────────────────────────

/// Outcome of saving credentials from the panel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyStatus {
    Saved,
    Loaded,
    Missing,
}

impl KeyStatus {
    pub fn message(&self) -> &'static str {
        match self {
            KeyStatus::Saved => "API Key saved!",
            KeyStatus::Loaded => "API Key loaded.",
            KeyStatus::Missing => "Please enter an API Key.",
        }
    }
}

/// Save the API key (when non-blank) and the model name (default when blank).
pub fn save_credentials(store: &StateStore, api_key: &str, model_name: &str) -> Result<KeyStatus> {
    let api_key = api_key.trim();
    let model_name = model_name.trim();

    let status = if api_key.is_empty() {
        KeyStatus::Missing
    } else {
        store.set_api_key(api_key)?;
        KeyStatus::Saved
    };
    let model = if model_name.is_empty() {
        DEFAULT_MODEL
    } else {
        model_name
    };
    store.set_model_name(model)?;
    info!(model = %model, key_saved = status == KeyStatus::Saved, "Saved credentials");
    Ok(status)
}

// ─────────────────────────────────────────────────────────────────────────────
// Panel
// ─────────────────────────────────────────────────────────────────────────────

/// Control panel state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelState {
    Idle,
    /// Request sent, waiting for the ack.
    Submitting,
    /// Ack received, waiting for the outcome.
    Accepted { request_id: String },
    Ready(Vec<Insight>),
    Failed(String),
}

impl PanelState {
    pub fn is_waiting(&self) -> bool {
        matches!(self, PanelState::Submitting | PanelState::Accepted { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Success,
    Error,
}

/// Status line shown above the list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Status {
    pub kind: StatusKind,
    pub text: String,
    until: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
struct CopyConfirmation {
    index: usize,
    until: Instant,
}

/// Reads the analysis slot and drives manual submissions.
pub struct Panel {
    store: Arc<StateStore>,
    bus: MessageBus,
    state: PanelState,
    source_text: Option<String>,
    status: Option<Status>,
    copied: Option<CopyConfirmation>,
}

impl Panel {
    pub fn new(store: Arc<StateStore>, bus: MessageBus) -> Self {
        Self {
            store,
            bus,
            state: PanelState::Idle,
            source_text: None,
            status: None,
            copied: None,
        }
    }

    pub fn state(&self) -> &PanelState {
        &self.state
    }

    /// Text of the post the slot currently describes.
    pub fn source_text(&self) -> Option<&str> {
        self.source_text.as_deref()
    }

    /// Rebuild the state from the slot: insights, then error, then pending.
    pub fn load(&mut self) -> Result<&PanelState> {
        let slot = self.store.read_slot()?;
        self.source_text = slot.source_text.clone();
        self.copied = None;

        self.state = if let Some(raw) = slot.insights_text.as_deref() {
            match render(raw) {
                Ok(insights) => {
                    self.status = None;
                    PanelState::Ready(insights)
                }
                Err(e) => self.failure(e.to_string()),
            }
        } else if let Some(error) = slot.error.as_deref() {
            self.failure(format!("Analysis failed: {}", error))
        } else if slot.source_text.is_some() {
            PanelState::Accepted {
                request_id: slot.request_id.unwrap_or_default(),
            }
        } else {
            PanelState::Idle
        };
        debug!(state = ?self.state, "Panel loaded");
        Ok(&self.state)
    }

    /// Whether the stored key is present.
    pub fn key_status(&self) -> Result<KeyStatus> {
        Ok(match self.store.credentials()?.api_key() {
            Some(_) => KeyStatus::Loaded,
            None => KeyStatus::Missing,
        })
    }

    /// Validate and send text for analysis.
    ///
    /// Validation failures and send failures are reported through the panel
    /// state; the returned ack is present only when the request was accepted.
    pub async fn submit(&mut self, text: &str) -> Result<Option<Ack>> {
        let text = text.trim();
        if text.is_empty() {
            self.state = self.failure(EMPTY_POST_MESSAGE.to_string());
            return Ok(None);
        }
        if self.store.credentials()?.api_key().is_none() {
            self.state = self.failure(KEY_REQUIRED_MESSAGE.to_string());
            return Ok(None);
        }

        self.state = PanelState::Submitting;
        self.status = None;
        self.copied = None;

        match self.bus.analyze(text).await {
            Ok(ack) if ack.status == AckStatus::Received => {
                info!(request_id = %ack.request_id, "Manual analysis accepted");
                self.state = PanelState::Accepted {
                    request_id: ack.request_id.clone(),
                };
                Ok(Some(ack))
            }
            Ok(ack) => {
                warn!(status = ?ack.status, "Unexpected ack status");
                self.state = self.failure(SEND_FAILED_MESSAGE.to_string());
                Ok(None)
            }
            Err(e) => {
                warn!(error = %e, "Failed to send analysis request");
                self.state = self.failure(INITIATE_FAILED_MESSAGE.to_string());
                Ok(None)
            }
        }
    }

    /// React to a completion notification. Notifications for another
    /// request are ignored. Returns whether the panel reloaded.
    pub fn on_completion(&mut self, message: &Message) -> Result<bool> {
        let Message::AnalysisComplete { request_id, .. } = message else {
            return Ok(false);
        };
        let PanelState::Accepted { request_id: waiting } = &self.state else {
            return Ok(false);
        };
        if let Some(id) = request_id {
            if id != waiting {
                debug!(waiting = %waiting, received = %id, "Ignoring completion for another request");
                return Ok(false);
            }
        }
        self.load()?;
        Ok(true)
    }

    /// React to a store write. Reloads when the result or error keys changed.
    pub fn on_state_change(&mut self, change: &StateChange) -> Result<bool> {
        if !change.touches_result() {
            return Ok(false);
        }
        self.load()?;
        Ok(true)
    }

    /// Copy one insight (zero-based index) to the clipboard.
    pub fn copy(&mut self, index: usize, clipboard: &dyn Clipboard) -> Result<()> {
        let PanelState::Ready(insights) = &self.state else {
            return Err(Error::Other("No insights to copy".into()));
        };
        let insight = insights
            .get(index)
            .ok_or_else(|| Error::Other(format!("No insight at position {}", index + 1)))?;

        match clipboard.write_text(&insight.text) {
            Ok(()) => {
                let until = Instant::now() + COPY_CONFIRMATION;
                self.copied = Some(CopyConfirmation { index, until });
                self.status = Some(Status {
                    kind: StatusKind::Success,
                    text: COPIED_MESSAGE.to_string(),
                    until: Some(until),
                });
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to copy");
                self.status = Some(Status {
                    kind: StatusKind::Error,
                    text: COPY_FAILED_MESSAGE.to_string(),
                    until: None,
                });
                Err(e)
            }
        }
    }

    /// Label of an item's copy action.
    pub fn copy_label(&self, index: usize) -> &'static str {
        match self.copied {
            Some(c) if c.index == index && Instant::now() < c.until => COPIED_LABEL,
            _ => COPY_LABEL,
        }
    }

    /// Current status line, if one is showing.
    pub fn status(&self) -> Option<&Status> {
        self.status
            .as_ref()
            .filter(|s| s.until.is_none_or(|until| Instant::now() < until))
    }

    fn failure(&mut self, message: String) -> PanelState {
        self.status = Some(Status {
            kind: StatusKind::Error,
            text: message.clone(),
            until: None,
        });
        PanelState::Failed(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::NO_INSIGHTS_MESSAGE;
    use crate::types::AnalysisResult;

    fn texts(raw: &str) -> Vec<String> {
        parse_insights(raw).into_iter().map(|i| i.text).collect()
    }

    #[test]
    fn test_parse_mixed_bullets() {
        assert_eq!(
            texts("1. Key takeaway: do X\n- Something random\nPreamble sentence\n* → nested"),
            vec!["do X", "Something random", "nested"]
        );
    }

    #[test]
    fn test_parse_category_variants() {
        let raw = "Here are your insights:\n\
                   • A key takeaway: Small steps add up\n\
                   2. An expert perspective: Measure first\n\
                   → METAPHOR OR ANALOGY: Like a relay race\n\
                   - **Common mistake:** Skipping reviews\n\
                   10. Challenge and solution:Too slow, batch it";
        assert_eq!(
            texts(raw),
            vec![
                "Small steps add up",
                "Measure first",
                "Like a relay race",
                "Skipping reviews",
                "Too slow, batch it",
            ]
        );
    }

    #[test]
    fn test_parse_drops_empty_bullets_and_keeps_unlabelled() {
        assert_eq!(texts("-\n*   \n3. Surprising: keep me"), vec!["Surprising: keep me"]);
    }

    #[test]
    fn test_no_bullets_is_no_insights() {
        assert!(parse_insights("Sure! I'm ready.\nSend the text.").is_empty());
        assert!(matches!(render(""), Err(Error::NoInsightsParsed)));
    }

    #[test]
    fn test_format_numbered() {
        let insights = parse_insights("- one\n- two");
        assert_eq!(format_numbered(&insights), "1. one\n2. two");
    }

    #[test]
    fn test_save_credentials() {
        let store = StateStore::open_in_memory().unwrap();
        assert_eq!(save_credentials(&store, "  ", "").unwrap(), KeyStatus::Missing);
        let creds = store.credentials().unwrap();
        assert!(creds.api_key().is_none());
        assert_eq!(creds.model_name.as_deref(), Some(DEFAULT_MODEL));

        assert_eq!(save_credentials(&store, " sk-1 ", "custom/model").unwrap(), KeyStatus::Saved);
        let creds = store.credentials().unwrap();
        assert_eq!(creds.api_key(), Some("sk-1"));
        assert_eq!(creds.model(), "custom/model");
    }

    fn panel() -> (Panel, Arc<StateStore>, crate::messaging::RequestReceiver) {
        let store = Arc::new(StateStore::open_in_memory().unwrap());
        let (bus, rx) = MessageBus::new();
        (Panel::new(store.clone(), bus), store, rx)
    }

    fn outcome(id: &str, insights: Option<&str>, error: Option<&str>) -> AnalysisResult {
        match (insights, error) {
            (Some(text), _) => AnalysisResult::Success {
                request_id: id.into(),
                source_text: "post".into(),
                insights_text: text.into(),
                timestamp: 1,
            },
            (None, error) => AnalysisResult::Failure {
                request_id: id.into(),
                source_text: "post".into(),
                error_message: error.unwrap_or_default().into(),
                timestamp: 1,
            },
        }
    }

    #[test]
    fn test_load_order() {
        let (mut panel, store, _rx) = panel();
        assert_eq!(panel.load().unwrap(), &PanelState::Idle);

        store.mark_pending("r-1", "post").unwrap();
        assert_eq!(
            panel.load().unwrap(),
            &PanelState::Accepted {
                request_id: "r-1".into()
            }
        );

        store.write_outcome(&outcome("r-1", None, Some("API failed: 500. "))).unwrap();
        assert_eq!(
            panel.load().unwrap(),
            &PanelState::Failed("Analysis failed: API failed: 500. ".into())
        );

        store.write_outcome(&outcome("r-2", Some("- a\n- b"), None)).unwrap();
        match panel.load().unwrap() {
            PanelState::Ready(insights) => assert_eq!(insights.len(), 2),
            other => panic!("unexpected state: {:?}", other),
        }
        assert_eq!(panel.source_text(), Some("post"));

        store.write_outcome(&outcome("r-3", Some("Just prose."), None)).unwrap();
        assert_eq!(
            panel.load().unwrap(),
            &PanelState::Failed(NO_INSIGHTS_MESSAGE.into())
        );
    }

    #[tokio::test]
    async fn test_submit_validation() {
        let (mut panel, store, _rx) = panel();
        assert!(panel.submit("   ").await.unwrap().is_none());
        assert_eq!(panel.state(), &PanelState::Failed(EMPTY_POST_MESSAGE.into()));

        assert!(panel.submit("real text").await.unwrap().is_none());
        assert_eq!(panel.state(), &PanelState::Failed(KEY_REQUIRED_MESSAGE.into()));

        store.set_api_key("sk-1").unwrap();
        drop(_rx);
        assert!(panel.submit("real text").await.unwrap().is_none());
        assert_eq!(panel.state(), &PanelState::Failed(INITIATE_FAILED_MESSAGE.into()));
    }

    #[tokio::test]
    async fn test_accept_then_complete() {
        let (mut panel, store, mut rx) = panel();
        store.set_api_key("sk-1").unwrap();
        tokio::spawn(async move {
            while let Some(envelope) = rx.recv().await {
                let _ = envelope.reply.send(Ack::received("r-mine"));
            }
        });

        let ack = panel.submit("real text").await.unwrap().unwrap();
        assert_eq!(ack.request_id, "r-mine");
        assert!(panel.state().is_waiting());

        // Another request's completion does not end the wait.
        store.write_outcome(&outcome("r-other", Some("- other"), None)).unwrap();
        let foreign = Message::AnalysisComplete {
            success: true,
            error: None,
            request_id: Some("r-other".into()),
        };
        assert!(!panel.on_completion(&foreign).unwrap());
        assert!(panel.state().is_waiting());

        store.write_outcome(&outcome("r-mine", Some("- mine"), None)).unwrap();
        let mine = Message::AnalysisComplete {
            success: true,
            error: None,
            request_id: Some("r-mine".into()),
        };
        assert!(panel.on_completion(&mine).unwrap());
        assert_eq!(
            panel.state(),
            &PanelState::Ready(vec![Insight {
                text: "mine".into()
            }])
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_copy_confirmation_is_per_item() {
        let (mut panel, store, _rx) = panel();
        store.write_outcome(&outcome("r-1", Some("- one\n- two\n- three"), None)).unwrap();
        panel.load().unwrap();

        let clipboard = MemoryClipboard::default();
        panel.copy(1, &clipboard).unwrap();
        assert_eq!(clipboard.contents().as_deref(), Some("two"));
        assert_eq!(panel.copy_label(0), COPY_LABEL);
        assert_eq!(panel.copy_label(1), COPIED_LABEL);
        assert_eq!(panel.copy_label(2), COPY_LABEL);
        assert_eq!(panel.status().map(|s| s.text.as_str()), Some(COPIED_MESSAGE));

        tokio::time::sleep(COPY_CONFIRMATION).await;
        assert_eq!(panel.copy_label(1), COPY_LABEL);
        assert!(panel.status().is_none());

        assert!(panel.copy(7, &clipboard).is_err());
    }

    #[test]
    fn test_copy_failure_status() {
        struct Broken;
        impl Clipboard for Broken {
            fn write_text(&self, _text: &str) -> Result<()> {
                Err(Error::ClipboardFailure("denied".into()))
            }
        }

        let (mut panel, store, _rx) = panel();
        store.write_outcome(&outcome("r-1", Some("- one"), None)).unwrap();
        panel.load().unwrap();

        assert!(matches!(panel.copy(0, &Broken), Err(Error::ClipboardFailure(_))));
        let status = panel.status().unwrap();
        assert_eq!(status.kind, StatusKind::Error);
        assert_eq!(status.text, COPY_FAILED_MESSAGE);
        assert_eq!(panel.copy_label(0), COPY_LABEL);
    }
}
