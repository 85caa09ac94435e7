//! Content extraction over feed markup.
//!
//! Each candidate post runs through an ordered table of strategies. The first
//! strategy whose text reaches [`MIN_CONTENT_LENGTH`] wins; otherwise the
//! last non-empty candidate is kept, so the coarse fallback replaces short
//! structured text. Between the structured and the coarse
//! strategy a short post may have its "see more" control activated, which
//! schedules one delayed re-extraction delivered as [`ExpandedText`].

use std::sync::LazyLock;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::dom::{Document, NodeId, Selector, SharedDocument};
use crate::injector;
use crate::types::ContentBlock;

/// Candidate post elements.
pub const POST_SELECTOR: &str = ".feed-shared-update-v2, .feed-shared-post, .feed-shared-article";

/// Structural text selectors, in priority order.
pub const TEXT_SELECTORS: &[&str] = &[
    "[data-attributed-text]",
    ".feed-shared-update-v2__description-wrapper",
    ".feed-shared-text-view",
    ".feed-shared-update-v2__commentary",
    ".update-components-text",
    ".update-components-text__text-view",
    ".feed-shared-inline-show-more-text",
    ".feed-shared-text",
    ".break-words",
];

/// "See more" control of a truncated post.
pub const EXPAND_SELECTOR: &str = "button.feed-shared-inline-show-more-text__see-more-less-btn";

/// Main content region used by the coarse strategy.
pub const CONTENT_REGION_SELECTOR: &str =
    ".feed-shared-update-v2__content, .update-components-update-v2__commentary";

/// Posts nested in this scope are comments and never scanned.
pub const COMMENT_SCOPE_SELECTOR: &str = "[data-testid=\"comment\"]";

/// Text shorter than this is treated as truncated.
pub const MIN_CONTENT_LENGTH: usize = 50;

/// Delay between activating "see more" and re-reading the post.
pub const EXPAND_DELAY: Duration = Duration::from_millis(100);

static POSTS: LazyLock<Selector> = LazyLock::new(|| static_selector(POST_SELECTOR));
static TEXTS: LazyLock<Vec<Selector>> =
    LazyLock::new(|| TEXT_SELECTORS.iter().map(|s| static_selector(s)).collect());
static EXPAND: LazyLock<Selector> = LazyLock::new(|| static_selector(EXPAND_SELECTOR));
static CONTENT_REGION: LazyLock<Selector> =
    LazyLock::new(|| static_selector(CONTENT_REGION_SELECTOR));
static COMMENT_SCOPE: LazyLock<Selector> =
    LazyLock::new(|| static_selector(COMMENT_SCOPE_SELECTOR));
static ARIA_LABEL: LazyLock<Selector> = LazyLock::new(|| static_selector("[aria-label]"));

fn static_selector(source: &str) -> Selector {
    Selector::parse(source).expect("built-in selector must parse")
}

/// One extraction strategy: text for a post, or nothing.
pub type Strategy = fn(&Document, NodeId) -> Option<String>;

/// Strategies in evaluation order. The expand side effect runs after the
/// first entry falls short.
pub const STRATEGIES: &[(&str, Strategy)] = &[
    ("structured", structured_text),
    ("content_region", content_region_text),
];

/// Text captured by the delayed re-extraction after an expand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpandedText {
    pub post: NodeId,
    pub text: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Strategies
// ─────────────────────────────────────────────────────────────────────────────

/// Structured selectors with attributed text, then nested aria-label, then
/// text content. Matches already contained in the accumulated text are skipped.
pub fn structured_text(doc: &Document, post: NodeId) -> Option<String> {
    accumulate(doc, post, |doc, el| {
        if let Some(text) = doc.attr(el, "data-attributed-text") {
            return text.to_string();
        }
        if let Some(labelled) = doc.query(el, &ARIA_LABEL) {
            return doc.attr(labelled, "aria-label").unwrap_or_default().to_string();
        }
        doc.text_content(el)
    })
}

/// Structured selectors read as raw text content (used after an expand).
pub fn raw_structured_text(doc: &Document, post: NodeId) -> Option<String> {
    accumulate(doc, post, |doc, el| doc.text_content(el))
}

/// Every text-bearing child of the post's main content region, one per line.
pub fn content_region_text(doc: &Document, post: NodeId) -> Option<String> {
    let region = doc.query(post, &CONTENT_REGION)?;
    let text = doc
        .children(region)
        .iter()
        .map(|child| doc.text_content(*child))
        .map(|text| text.trim().to_string())
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    non_empty(text)
}

fn accumulate<F>(doc: &Document, post: NodeId, resolve: F) -> Option<String>
where
    F: Fn(&Document, NodeId) -> String,
{
    let mut out = String::new();
    for selector in TEXTS.iter() {
        for el in doc.query_all(post, selector) {
            let text = resolve(doc, el);
            let text = text.trim();
            if !text.is_empty() && !out.contains(text) {
                out.push_str(text);
                out.push('\n');
            }
        }
    }
    non_empty(out.trim().to_string())
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

/// Whether a post is excluded before any strategy runs.
pub fn is_excluded(doc: &Document, post: NodeId) -> bool {
    injector::is_marked(doc, post) || doc.closest(post, &COMMENT_SCOPE).is_some()
}

// ─────────────────────────────────────────────────────────────────────────────
// Extractor
// ─────────────────────────────────────────────────────────────────────────────

/// Runs the cascade over a container and handles the expand side effect.
#[derive(Clone)]
pub struct Extractor {
    document: SharedDocument,
    expanded_tx: Option<mpsc::UnboundedSender<ExpandedText>>,
}

impl Extractor {
    pub fn new(document: SharedDocument) -> Self {
        Self {
            document,
            expanded_tx: None,
        }
    }

    /// Deliver delayed re-extractions on `tx`.
    pub fn with_expansion_channel(mut self, tx: mpsc::UnboundedSender<ExpandedText>) -> Self {
        self.expanded_tx = Some(tx);
        self
    }

    /// Extract content blocks under `container`, in document order.
    ///
    /// `doc` must be the locked document this extractor was built for.
    pub fn extract(&self, doc: &mut Document, container: NodeId) -> Vec<ContentBlock> {
        let posts = doc.query_all(container, &POSTS);
        debug!(count = posts.len(), "Found candidate posts");

        let mut blocks = Vec::new();
        for (index, post) in posts.into_iter().enumerate() {
            if is_excluded(doc, post) {
                continue;
            }
            match self.extract_post(doc, post) {
                Some(text) => blocks.push(ContentBlock {
                    post,
                    text,
                    has_trigger: false,
                }),
                None => debug!(index, post = post.index(), "Post has no text content"),
            }
        }
        blocks
    }

    fn extract_post(&self, doc: &mut Document, post: NodeId) -> Option<String> {
        let mut best = None;
        for (position, (name, strategy)) in STRATEGIES.iter().enumerate() {
            if position == 1 {
                self.expand(doc, post);
            }
            let Some(text) = strategy(doc, post) else {
                continue;
            };
            if text.chars().count() >= MIN_CONTENT_LENGTH {
                debug!(post = post.index(), strategy = name, "Strategy satisfied threshold");
                return Some(text);
            }
            // A later strategy replaces a short earlier result.
            best = Some(text);
        }
        best
    }

    /// Activate the post's expand control and schedule one re-extraction.
    fn expand(&self, doc: &mut Document, post: NodeId) {
        let Some(button) = doc.query(post, &EXPAND) else {
            return;
        };
        doc.activate(button);

        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            debug!(post = post.index(), "No runtime; skipping delayed re-extraction");
            return;
        };
        let document = self.document.clone();
        let tx = self.expanded_tx.clone();
        handle.spawn(async move {
            tokio::time::sleep(EXPAND_DELAY).await;
            let text = {
                let Ok(doc) = document.lock() else {
                    warn!("Document lock poisoned; dropping re-extraction");
                    return;
                };
                if !doc.is_connected(post) {
                    debug!(post = post.index(), "Post detached before re-extraction");
                    return;
                }
                raw_structured_text(&doc, post)
            };
            if let (Some(tx), Some(text)) = (tx, text) {
                let _ = tx.send(ExpandedText { post, text });
            }
        });
    }
}
