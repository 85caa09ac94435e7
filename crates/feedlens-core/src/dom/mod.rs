//! In-process document model for feed markup.
//!
//! The page scanner never talks to a browser. It works against a [`Document`]:
//! an arena tree built from markup that answers the queries the extraction
//! cascade needs, accepts the writes the trigger injector performs, and
//! publishes insertion records to subscribed observers.
//!
//! ```text
//! markup ──parse──▶ Document ──subscribe(scope)──▶ MutationRecord stream
//!                      ▲                                   │
//!                      └──── extraction / injection ◀──────┘ (scan scheduler)
//! ```

mod parse;
pub mod selector;

pub use selector::Selector;

use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::debug;

/// Document shared between the tasks of a page context.
pub type SharedDocument = Arc<Mutex<Document>>;

/// Host behaviour invoked when a control is activated programmatically.
pub type ActivationHook = Arc<dyn Fn(&mut Document, NodeId) + Send + Sync>;

/// Index of a node in its document arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(&self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone)]
enum NodeData {
    Element {
        tag: String,
        attrs: Vec<(String, String)>,
    },
    Text(String),
}

#[derive(Debug, Clone)]
struct Node {
    data: NodeData,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// A child-list change observed under a subscribed scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationRecord {
    /// Parent that received the new children.
    pub target: NodeId,
    /// Inserted nodes, in insertion order.
    pub added: Vec<NodeId>,
    /// Whether any inserted node is an element (label rewrites only add text).
    pub element_inserted: bool,
}

struct Observer {
    scope: NodeId,
    tx: mpsc::UnboundedSender<MutationRecord>,
}

/// Arena-backed markup tree.
pub struct Document {
    nodes: Vec<Node>,
    root: NodeId,
    observers: Vec<Observer>,
    activation_hook: Option<ActivationHook>,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("nodes", &self.nodes.len())
            .field("observers", &self.observers.len())
            .finish()
    }
}

impl Document {
    /// Create an empty document containing only the synthetic root.
    pub fn new() -> Self {
        let root = Node {
            data: NodeData::Element {
                tag: "#document".to_string(),
                attrs: Vec::new(),
            },
            parent: None,
            children: Vec::new(),
        };
        Self {
            nodes: vec![root],
            root: NodeId(0),
            observers: Vec::new(),
            activation_hook: None,
        }
    }

    /// Wrap into the shared handle used by page tasks.
    pub fn into_shared(self) -> SharedDocument {
        Arc::new(Mutex::new(self))
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.root_children().is_empty()
    }

    fn root_children(&self) -> &[NodeId] {
        &self.nodes[self.root.0].children
    }

    fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id.0]
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Construction
    // ─────────────────────────────────────────────────────────────────────────

    /// Create a detached element.
    pub fn create_element(&mut self, tag: &str) -> NodeId {
        self.push_node(NodeData::Element {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
        })
    }

    /// Create a detached text node.
    pub fn create_text(&mut self, text: &str) -> NodeId {
        self.push_node(NodeData::Text(text.to_string()))
    }

    fn push_node(&mut self, data: NodeData) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            data,
            parent: None,
            children: Vec::new(),
        });
        id
    }

    /// Attach a node without notifying observers (used while parsing).
    fn attach(&mut self, parent: NodeId, child: NodeId) {
        if let Some(old_parent) = self.nodes[child.0].parent {
            self.nodes[old_parent.0].children.retain(|c| *c != child);
        }
        self.nodes[child.0].parent = Some(parent);
        self.nodes[parent.0].children.push(child);
    }

    /// Append `child` as the last child of `parent` and notify observers.
    pub fn append_child(&mut self, parent: NodeId, child: NodeId) {
        self.attach(parent, child);
        let element_inserted = self.is_element(child);
        self.notify(MutationRecord {
            target: parent,
            added: vec![child],
            element_inserted,
        });
    }

    /// Parse `markup` and append the resulting top-level nodes to `parent`.
    ///
    /// Markup is parsed under a detached holder and moved to `parent` only
    /// once the whole input parsed, so a failure leaves the tree untouched.
    /// Observers receive a single record covering every inserted node.
    pub fn append_markup(&mut self, parent: NodeId, markup: &str) -> crate::Result<Vec<NodeId>> {
        let holder = self.create_element("#fragment");
        let added = parse::parse_into(self, holder, markup)?;
        for child in &added {
            self.attach(parent, *child);
        }
        if !added.is_empty() {
            let element_inserted = added.iter().any(|id| self.is_element(*id));
            self.notify(MutationRecord {
                target: parent,
                added: added.clone(),
                element_inserted,
            });
        }
        Ok(added)
    }

    /// Detach a node (and its subtree) from the tree.
    pub fn remove(&mut self, node: NodeId) {
        if let Some(parent) = self.nodes[node.0].parent.take() {
            self.nodes[parent.0].children.retain(|c| *c != node);
        }
    }

    /// Replace all children of `node` with a single text node.
    pub fn set_text(&mut self, node: NodeId, text: &str) {
        let old = std::mem::take(&mut self.nodes[node.0].children);
        for child in old {
            self.nodes[child.0].parent = None;
        }
        let text_node = self.create_text(text);
        self.append_child(node, text_node);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Attributes
    // ─────────────────────────────────────────────────────────────────────────

    pub fn is_element(&self, node: NodeId) -> bool {
        matches!(self.node(node).data, NodeData::Element { .. })
    }

    /// Lowercase tag name, or `None` for text nodes.
    pub fn tag(&self, node: NodeId) -> Option<&str> {
        match &self.node(node).data {
            NodeData::Element { tag, .. } => Some(tag.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn attr(&self, node: NodeId, name: &str) -> Option<&str> {
        match &self.node(node).data {
            NodeData::Element { attrs, .. } => attrs
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v.as_str()),
            NodeData::Text(_) => None,
        }
    }

    pub fn has_attr(&self, node: NodeId, name: &str) -> bool {
        self.attr(node, name).is_some()
    }

    pub fn set_attr(&mut self, node: NodeId, name: &str, value: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[node.0].data {
            match attrs.iter_mut().find(|(k, _)| k.eq_ignore_ascii_case(name)) {
                Some((_, v)) => *v = value.to_string(),
                None => attrs.push((name.to_ascii_lowercase(), value.to_string())),
            }
        }
    }

    pub fn remove_attr(&mut self, node: NodeId, name: &str) {
        if let NodeData::Element { attrs, .. } = &mut self.nodes[node.0].data {
            attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        }
    }

    pub fn has_class(&self, node: NodeId, class: &str) -> bool {
        self.attr(node, "class")
            .map(|classes| classes.split_whitespace().any(|c| c == class))
            .unwrap_or(false)
    }

    pub fn add_class(&mut self, node: NodeId, class: &str) {
        if self.has_class(node, class) {
            return;
        }
        let updated = match self.attr(node, "class") {
            Some(existing) if !existing.trim().is_empty() => format!("{} {}", existing.trim(), class),
            _ => class.to_string(),
        };
        self.set_attr(node, "class", &updated);
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Traversal
    // ─────────────────────────────────────────────────────────────────────────

    pub fn parent(&self, node: NodeId) -> Option<NodeId> {
        self.node(node).parent
    }

    pub fn children(&self, node: NodeId) -> &[NodeId] {
        &self.node(node).children
    }

    /// Whether the node is still reachable from the document root.
    pub fn is_connected(&self, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return true;
            }
            current = self.node(id).parent;
        }
        false
    }

    /// Whether `ancestor` is `node` or one of its ancestors.
    pub fn is_inclusive_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.node(id).parent;
        }
        false
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.collect_text(node, &mut out);
        out
    }

    fn collect_text(&self, node: NodeId, out: &mut String) {
        match &self.node(node).data {
            NodeData::Text(text) => out.push_str(text),
            NodeData::Element { .. } => {
                for child in &self.node(node).children {
                    self.collect_text(*child, out);
                }
            }
        }
    }

    /// Descendants of `scope` in document order (excluding `scope`).
    pub fn descendants(&self, scope: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = self.node(scope).children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            out.push(id);
            stack.extend(self.node(id).children.iter().rev().copied());
        }
        out
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Selectors
    // ─────────────────────────────────────────────────────────────────────────

    /// Whether the element matches any alternative of the selector.
    pub fn matches(&self, node: NodeId, selector: &Selector) -> bool {
        self.is_element(node)
            && selector
                .alternatives()
                .iter()
                .any(|chain| self.matches_chain(node, chain))
    }

    fn matches_chain(&self, node: NodeId, chain: &[selector::Compound]) -> bool {
        let Some((subject, ancestors)) = chain.split_last() else {
            return false;
        };
        if !self.matches_compound(node, subject) {
            return false;
        }
        let mut current = self.parent(node);
        for compound in ancestors.iter().rev() {
            loop {
                match current {
                    Some(id) if id == self.root => return false,
                    Some(id) => {
                        current = self.parent(id);
                        if self.matches_compound(id, compound) {
                            break;
                        }
                    }
                    None => return false,
                }
            }
        }
        true
    }

    fn matches_compound(&self, node: NodeId, compound: &selector::Compound) -> bool {
        let Some(tag) = self.tag(node) else {
            return false;
        };
        if let Some(expected) = &compound.tag {
            if expected != tag {
                return false;
            }
        }
        if !compound.classes.iter().all(|c| self.has_class(node, c)) {
            return false;
        }
        compound.attrs.iter().all(|a| match (self.attr(node, &a.name), &a.value) {
            (Some(_), None) => true,
            (Some(actual), Some(expected)) => actual == expected,
            (None, _) => false,
        })
    }

    /// First descendant of `scope` matching the selector.
    pub fn query(&self, scope: NodeId, selector: &Selector) -> Option<NodeId> {
        self.descendants(scope)
            .into_iter()
            .find(|id| self.matches(*id, selector))
    }

    /// All descendants of `scope` matching the selector, in document order.
    pub fn query_all(&self, scope: NodeId, selector: &Selector) -> Vec<NodeId> {
        self.descendants(scope)
            .into_iter()
            .filter(|id| self.matches(*id, selector))
            .collect()
    }

    /// Nearest inclusive ancestor matching the selector.
    pub fn closest(&self, node: NodeId, selector: &Selector) -> Option<NodeId> {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == self.root {
                return None;
            }
            if self.matches(id, selector) {
                return Some(id);
            }
            current = self.parent(id);
        }
        None
    }

    /// Convenience query with a selector string.
    pub fn select(&self, scope: NodeId, selector: &str) -> crate::Result<Vec<NodeId>> {
        let selector = Selector::parse(selector)?;
        Ok(self.query_all(scope, &selector))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Observation & activation
    // ─────────────────────────────────────────────────────────────────────────

    /// Observe child-list insertions anywhere under `scope`.
    pub fn subscribe(&mut self, scope: NodeId) -> mpsc::UnboundedReceiver<MutationRecord> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.observers.push(Observer { scope, tx });
        rx
    }

    fn notify(&mut self, record: MutationRecord) {
        if self.observers.is_empty() {
            return;
        }
        let target = record.target;
        let mut observers = std::mem::take(&mut self.observers);
        observers.retain(|observer| {
            if !self.is_inclusive_ancestor(observer.scope, target) {
                return !observer.tx.is_closed();
            }
            observer.tx.send(record.clone()).is_ok()
        });
        self.observers = observers;
    }

    /// Register the host behaviour for programmatic activation.
    pub fn set_activation_hook(&mut self, hook: ActivationHook) {
        self.activation_hook = Some(hook);
    }

    /// Programmatically activate (click) a control.
    pub fn activate(&mut self, node: NodeId) {
        if self.has_attr(node, "disabled") {
            debug!(node = node.index(), "Ignoring activation of disabled control");
            return;
        }
        if let Some(hook) = self.activation_hook.clone() {
            hook(self, node);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Document {
        Document::parse(
            r#"<main>
                 <div class="post a" id="p1"><p class="body">Hello <b>world</b></p></div>
                 <div class="post" data-testid="comment"><div class="post inner"><p>nested</p></div></div>
               </main>"#,
        )
        .unwrap()
    }

    #[test]
    fn test_query_all_document_order() {
        let doc = sample();
        let sel = Selector::parse(".post").unwrap();
        let posts = doc.query_all(doc.root(), &sel);
        assert_eq!(posts.len(), 3);
        assert_eq!(doc.attr(posts[0], "id"), Some("p1"));
    }

    #[test]
    fn test_text_content_concatenates_descendants() {
        let doc = sample();
        let body = doc.select(doc.root(), ".body").unwrap()[0];
        assert_eq!(doc.text_content(body), "Hello world");
    }

    #[test]
    fn test_descendant_selector_and_closest() {
        let doc = sample();
        let inner = doc.select(doc.root(), "[data-testid=\"comment\"] .inner").unwrap();
        assert_eq!(inner.len(), 1);
        let comment = Selector::parse("[data-testid=\"comment\"]").unwrap();
        assert!(doc.closest(inner[0], &comment).is_some());
        // Id selectors are outside the supported subset.
        assert!(doc.select(doc.root(), "#p1").is_err());
    }

    #[test]
    fn test_class_helpers() {
        let mut doc = sample();
        let post = doc.select(doc.root(), ".a").unwrap()[0];
        assert!(doc.has_class(post, "post"));
        doc.add_class(post, "marked");
        doc.add_class(post, "marked");
        assert_eq!(doc.attr(post, "class"), Some("post a marked"));
    }

    #[test]
    fn test_remove_disconnects_subtree() {
        let mut doc = sample();
        let body = doc.select(doc.root(), ".body").unwrap()[0];
        let post = doc.parent(body).unwrap();
        doc.remove(post);
        assert!(!doc.is_connected(body));
        assert_eq!(doc.select(doc.root(), ".body").unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_reports_insertions_in_scope() {
        let mut doc = sample();
        let main = doc.select(doc.root(), "main").unwrap()[0];
        let mut rx = doc.subscribe(main);

        let div = doc.create_element("div");
        doc.append_child(main, div);
        let record = rx.recv().await.unwrap();
        assert_eq!(record.target, main);
        assert!(record.element_inserted);

        // Outside the observed scope: nothing delivered.
        let other = doc.create_element("aside");
        let root = doc.root();
        doc.append_child(root, other);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_set_text_is_not_an_element_insertion() {
        let mut doc = sample();
        let body = doc.select(doc.root(), ".body").unwrap()[0];
        let mut rx = doc.subscribe(doc.root());
        doc.set_text(body, "replaced");
        assert_eq!(doc.text_content(body), "replaced");
        let record = rx.try_recv().unwrap();
        assert!(!record.element_inserted);
    }

    #[test]
    fn test_activation_hook_runs_unless_disabled() {
        let mut doc = Document::parse(r#"<button class="more">more</button>"#).unwrap();
        let button = doc.select(doc.root(), "button").unwrap()[0];
        doc.set_activation_hook(Arc::new(|doc: &mut Document, node: NodeId| {
            doc.set_attr(node, "data-clicked", "true");
        }));
        doc.activate(button);
        assert_eq!(doc.attr(button, "data-clicked"), Some("true"));

        doc.remove_attr(button, "data-clicked");
        doc.set_attr(button, "disabled", "");
        doc.activate(button);
        assert!(!doc.has_attr(button, "data-clicked"));
    }
}
