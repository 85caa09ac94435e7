//! Action injector.
//!
//! Attaches one trigger button to every freshly extracted content block and
//! marks the post so later scans skip it. Activating a trigger sends the
//! block's text to the orchestrator and shows a transient label driven by
//! the acceptance ack only; completion arrives later through the store.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::dom::{Document, NodeId, Selector, SharedDocument};
use crate::error::{Error, Result};
use crate::extraction::ExpandedText;
use crate::messaging::MessageBus;
use crate::types::{Ack, AckStatus, ContentBlock};

/// Attribute set on posts that already carry a trigger.
pub const MARKER_ATTR: &str = "data-insight-trigger";

/// Class of the trigger button.
pub const TRIGGER_CLASS: &str = "insight-generator-btn";

/// Class of the wrapper placed in the primary action region.
pub const WRAPPER_CLASS: &str = "insight-btn-wrapper";

pub const PRIMARY_REGION_SELECTOR: &str =
    ".social-details-social-counts, .feed-shared-social-action-bar";
pub const SECONDARY_REGION_SELECTOR: &str = ".feed-shared-social-action-bar";

/// How long a transient label stays before the default returns.
pub const LABEL_REVERT_DELAY: Duration = Duration::from_millis(3000);

static TRIGGER: LazyLock<Selector> = LazyLock::new(|| static_selector(".insight-generator-btn"));
static WRAPPER: LazyLock<Selector> = LazyLock::new(|| static_selector(".insight-btn-wrapper"));
static PRIMARY_REGION: LazyLock<Selector> =
    LazyLock::new(|| static_selector(PRIMARY_REGION_SELECTOR));
static SECONDARY_REGION: LazyLock<Selector> =
    LazyLock::new(|| static_selector(SECONDARY_REGION_SELECTOR));

fn static_selector(source: &str) -> Selector {
    Selector::parse(source).expect("built-in selector must parse")
}

/// Whether the post already carries a trigger (marker or button).
pub fn is_marked(doc: &Document, post: NodeId) -> bool {
    doc.attr(post, MARKER_ATTR) == Some("true") || doc.query(post, &TRIGGER).is_some()
}

/// Index of a trigger in injection order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TriggerId(pub usize);

impl std::fmt::Display for TriggerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Label state of a trigger button.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerState {
    Idle,
    Sending,
    Ready,
    Error,
}

impl TriggerState {
    pub fn label(&self) -> &'static str {
        match self {
            TriggerState::Idle => "✨ Gen Insights",
            TriggerState::Sending => "⏳ Sending...",
            TriggerState::Ready => "✅ Ready",
            TriggerState::Error => "⚠️ Error",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerState::Idle => "idle",
            TriggerState::Sending => "sending",
            TriggerState::Ready => "ready",
            TriggerState::Error => "error",
        }
    }
}

/// One injected trigger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Trigger {
    pub id: TriggerId,
    pub post: NodeId,
    pub button: NodeId,
    pub text: String,
    pub state: TriggerState,
}

#[derive(Default)]
struct Registry {
    triggers: Vec<Trigger>,
    by_post: HashMap<NodeId, TriggerId>,
}

/// Injects triggers into a shared document and tracks them.
#[derive(Clone)]
pub struct ActionInjector {
    document: SharedDocument,
    bus: MessageBus,
    registry: Arc<RwLock<Registry>>,
}

impl ActionInjector {
    pub fn new(document: SharedDocument, bus: MessageBus) -> Self {
        Self {
            document,
            bus,
            registry: Arc::new(RwLock::new(Registry::default())),
        }
    }

    /// Attach triggers to every unmarked block. Returns the new trigger ids.
    ///
    /// `doc` must be the locked document this injector was built for.
    pub fn inject(&self, doc: &mut Document, blocks: &[ContentBlock]) -> Vec<TriggerId> {
        let mut created = Vec::new();
        for block in blocks {
            if block.has_trigger || block.text.trim().is_empty() || is_marked(doc, block.post) {
                continue;
            }
            match attach_trigger(doc, block.post) {
                Ok(button) => {
                    doc.set_attr(block.post, MARKER_ATTR, "true");
                    match self.register(block.post, button, &block.text) {
                        Ok(id) => created.push(id),
                        Err(e) => warn!(post = block.post.index(), error = %e, "Failed to register trigger"),
                    }
                }
                Err(e) => {
                    warn!(post = block.post.index(), error = %e, "Post left without trigger");
                }
            }
        }
        if !created.is_empty() {
            info!(count = created.len(), "Injected triggers");
        }
        created
    }

    fn register(&self, post: NodeId, button: NodeId, text: &str) -> Result<TriggerId> {
        let mut registry = self.registry.write().map_err(|_| Error::LockPoisoned)?;
        let id = TriggerId(registry.triggers.len());
        registry.triggers.push(Trigger {
            id,
            post,
            button,
            text: text.to_string(),
            state: TriggerState::Idle,
        });
        registry.by_post.insert(post, id);
        Ok(id)
    }

    /// Replace a trigger's text with the result of a delayed re-extraction.
    pub fn apply_expanded(&self, expanded: &ExpandedText) -> Result<bool> {
        let mut registry = self.registry.write().map_err(|_| Error::LockPoisoned)?;
        let Some(id) = registry.by_post.get(&expanded.post).copied() else {
            debug!(post = expanded.post.index(), "No trigger for expanded post");
            return Ok(false);
        };
        registry.triggers[id.0].text = expanded.text.clone();
        debug!(trigger = %id, chars = expanded.text.chars().count(), "Refreshed trigger text");
        Ok(true)
    }

    /// Snapshot of every trigger.
    pub fn triggers(&self) -> Result<Vec<Trigger>> {
        let registry = self.registry.read().map_err(|_| Error::LockPoisoned)?;
        Ok(registry.triggers.clone())
    }

    pub fn trigger(&self, id: TriggerId) -> Result<Trigger> {
        let registry = self.registry.read().map_err(|_| Error::LockPoisoned)?;
        registry
            .triggers
            .get(id.0)
            .cloned()
            .ok_or(Error::TriggerNotFound(id.0))
    }

    /// Activate a trigger: send its text and show the ack-driven label.
    ///
    /// Returns the ack when the orchestrator accepted the request. Activation
    /// of a trigger that is still showing a transient label is ignored.
    pub async fn activate(&self, id: TriggerId) -> Result<Option<Ack>> {
        let Some((text, button)) = self.claim(id)? else {
            return Ok(None);
        };
        info!(trigger = %id, preview = %preview(&text), "Trigger activated");
        self.render(button, TriggerState::Sending)?;

        let ack = match self.bus.analyze(text).await {
            Ok(ack) if ack.status == AckStatus::Received => {
                self.show(id, TriggerState::Ready)?;
                Some(ack)
            }
            Ok(ack) => {
                warn!(trigger = %id, status = ?ack.status, "Unexpected ack status");
                self.show(id, TriggerState::Error)?;
                None
            }
            Err(e) => {
                warn!(trigger = %id, error = %e, "Failed to send analysis request");
                self.show(id, TriggerState::Error)?;
                None
            }
        };

        let this = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(LABEL_REVERT_DELAY).await;
            if let Err(e) = this.show(id, TriggerState::Idle) {
                warn!(trigger = %id, error = %e, "Failed to reset trigger label");
            }
        });

        Ok(ack)
    }

    /// Move an idle trigger to `Sending` under one registry lock.
    fn claim(&self, id: TriggerId) -> Result<Option<(String, NodeId)>> {
        let mut registry = self.registry.write().map_err(|_| Error::LockPoisoned)?;
        let trigger = registry
            .triggers
            .get_mut(id.0)
            .ok_or(Error::TriggerNotFound(id.0))?;
        if trigger.state != TriggerState::Idle {
            debug!(trigger = %id, state = trigger.state.as_str(), "Trigger busy");
            return Ok(None);
        }
        trigger.state = TriggerState::Sending;
        Ok(Some((trigger.text.clone(), trigger.button)))
    }

    /// Set the registry state and mirror it onto the button.
    fn show(&self, id: TriggerId, state: TriggerState) -> Result<()> {
        let button = {
            let mut registry = self.registry.write().map_err(|_| Error::LockPoisoned)?;
            let trigger = registry
                .triggers
                .get_mut(id.0)
                .ok_or(Error::TriggerNotFound(id.0))?;
            trigger.state = state;
            trigger.button
        };
        self.render(button, state)
    }

    fn render(&self, button: NodeId, state: TriggerState) -> Result<()> {
        let mut doc = self.document.lock().map_err(|_| Error::LockPoisoned)?;
        doc.set_text(button, state.label());
        if state == TriggerState::Idle {
            doc.remove_attr(button, "disabled");
        } else {
            doc.set_attr(button, "disabled", "");
        }
        Ok(())
    }
}

/// Create the button and place it in the post's action region.
fn attach_trigger(doc: &mut Document, post: NodeId) -> Result<NodeId> {
    if let Some(region) = doc.query(post, &PRIMARY_REGION) {
        let wrapper = match doc.query(region, &WRAPPER) {
            Some(existing) if doc.query(existing, &TRIGGER).is_some() => {
                return Err(Error::Other("Action region already holds a trigger".into()));
            }
            Some(existing) => existing,
            None => {
                let wrapper = doc.create_element("div");
                doc.add_class(wrapper, WRAPPER_CLASS);
                doc.set_attr(wrapper, "style", "display: inline-block");
                doc.append_child(region, wrapper);
                wrapper
            }
        };
        let button = create_button(doc);
        doc.append_child(wrapper, button);
        return Ok(button);
    }

    if let Some(region) = doc.query(post, &SECONDARY_REGION) {
        if doc.query(region, &TRIGGER).is_none() {
            let button = create_button(doc);
            doc.append_child(region, button);
            return Ok(button);
        }
    }

    Err(Error::RegionNotFound)
}

fn create_button(doc: &mut Document) -> NodeId {
    let button = doc.create_element("button");
    doc.add_class(button, TRIGGER_CLASS);
    let label = doc.create_text(TriggerState::Idle.label());
    doc.append_child(button, label);
    button
}

fn preview(text: &str) -> String {
    let head: String = text.chars().take(100).collect();
    if head.len() < text.len() {
        format!("{}...", head)
    } else {
        head
    }
}
