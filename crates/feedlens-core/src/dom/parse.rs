//! Lenient markup reader built on quick-xml.
//!
//! Feed snapshots are HTML, not XML: end tags go missing, void elements are
//! never closed and named entities appear everywhere. The reader tolerates
//! all three.

use std::borrow::Cow;

use quick_xml::events::{BytesStart, Event};
use quick_xml::reader::Reader;

use super::{Document, NodeId};
use crate::error::{Error, Result};

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

impl Document {
    /// Build a document from markup.
    pub fn parse(markup: &str) -> Result<Self> {
        let mut doc = Document::new();
        let root = doc.root();
        parse_into(&mut doc, root, markup)?;
        Ok(doc)
    }
}

/// Parse `markup` under `parent` without notifying observers.
///
/// Returns the nodes attached directly to `parent`.
pub(super) fn parse_into(doc: &mut Document, parent: NodeId, markup: &str) -> Result<Vec<NodeId>> {
    let mut reader = Reader::from_str(markup);
    {
        let config = reader.config_mut();
        config.trim_text(false);
        config.check_end_names = false;
        config.allow_unmatched_ends = true;
    }

    // Open elements; the bottom entry is `parent` and is never popped.
    let mut stack: Vec<(NodeId, String)> = vec![(parent, String::new())];
    let mut top_level = Vec::new();

    loop {
        let event = match reader.read_event() {
            Ok(event) => event,
            // Open elements at end of input are closed implicitly.
            Err(_) if reader.buffer_position() as usize >= markup.len() => break,
            Err(e) => {
                return Err(Error::Markup(format!(
                    "at byte {}: {}",
                    reader.buffer_position(),
                    e
                )));
            }
        };

        match event {
            Event::Start(start) => {
                let (id, tag) = element_from(doc, &start);
                attach_open(doc, &stack, &mut top_level, id);
                if !VOID_ELEMENTS.contains(&tag.as_str()) {
                    stack.push((id, tag));
                }
            }
            Event::Empty(start) => {
                let (id, _) = element_from(doc, &start);
                attach_open(doc, &stack, &mut top_level, id);
            }
            Event::End(end) => {
                let name = lowercase_name(end.name().as_ref());
                if let Some(pos) = stack.iter().rposition(|(_, tag)| *tag == name) {
                    if pos > 0 {
                        stack.truncate(pos);
                    }
                }
            }
            Event::Text(text) => {
                let value = match text.unescape_with(html_entity) {
                    Ok(value) => value.into_owned(),
                    Err(_) => String::from_utf8_lossy(&text).into_owned(),
                };
                if !value.is_empty() {
                    let id = doc.create_text(&value);
                    attach_open(doc, &stack, &mut top_level, id);
                }
            }
            Event::CData(data) => {
                let value = String::from_utf8_lossy(&data).into_owned();
                let id = doc.create_text(&value);
                attach_open(doc, &stack, &mut top_level, id);
            }
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(top_level)
}

fn attach_open(
    doc: &mut Document,
    stack: &[(NodeId, String)],
    top_level: &mut Vec<NodeId>,
    child: NodeId,
) {
    let parent = stack.last().map(|(id, _)| *id).unwrap_or_else(|| doc.root());
    doc.attach(parent, child);
    if stack.len() == 1 {
        top_level.push(child);
    }
}

fn element_from(doc: &mut Document, start: &BytesStart<'_>) -> (NodeId, String) {
    let tag = lowercase_name(start.name().as_ref());
    let id = doc.create_element(&tag);
    for attr in start.html_attributes().with_checks(false).flatten() {
        let key = String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase();
        let value: Cow<'_, str> = match attr.unescape_value() {
            Ok(value) => value,
            Err(_) => String::from_utf8_lossy(&attr.value).into_owned().into(),
        };
        doc.set_attr(id, &key, &value);
    }
    (id, tag)
}

fn lowercase_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).to_ascii_lowercase()
}

fn html_entity(name: &str) -> Option<&'static str> {
    match name {
        "amp" => Some("&"),
        "lt" => Some("<"),
        "gt" => Some(">"),
        "quot" => Some("\""),
        "apos" => Some("'"),
        "nbsp" => Some("\u{a0}"),
        "hellip" => Some("…"),
        "mdash" => Some("—"),
        "ndash" => Some("–"),
        "lsquo" => Some("‘"),
        "rsquo" => Some("’"),
        "ldquo" => Some("“"),
        "rdquo" => Some("”"),
        "copy" => Some("©"),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_void_and_unclosed_elements() {
        let doc = Document::parse("<div class=\"a\">one<br>two<img src=x></div><p>three</p>").unwrap();
        let div = doc.select(doc.root(), ".a").unwrap()[0];
        assert_eq!(doc.text_content(div), "onetwo");
        let p = doc.select(doc.root(), "p").unwrap()[0];
        assert_eq!(doc.parent(p), Some(doc.root()));
        assert_eq!(doc.text_content(p), "three");
    }

    #[test]
    fn test_parse_entities_and_bare_attributes() {
        let doc = Document::parse("<button disabled class=x>Read&nbsp;more &amp; more&hellip;</button>").unwrap();
        let button = doc.select(doc.root(), "button.x").unwrap()[0];
        assert!(doc.has_attr(button, "disabled"));
        assert_eq!(doc.text_content(button), "Read\u{a0}more & more…");
    }

    #[test]
    fn test_unmatched_end_tags_are_ignored() {
        let doc = Document::parse("<div><span>a</div></span><em>b</em>").unwrap();
        let em = doc.select(doc.root(), "em").unwrap()[0];
        assert_eq!(doc.parent(em), Some(doc.root()));
    }

    #[test]
    fn test_parse_into_returns_top_level_nodes() {
        let mut doc = Document::parse("<main></main>").unwrap();
        let main = doc.select(doc.root(), "main").unwrap()[0];
        let added = doc
            .append_markup(main, "<article>1</article><article>2</article>")
            .unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(doc.children(main), added.as_slice());
    }

    #[test]
    fn test_failed_append_leaves_tree_untouched() {
        let mut doc = Document::parse("<main><p>existing</p></main>").unwrap();
        let main = doc.select(doc.root(), "main").unwrap()[0];
        let before = doc.children(main).to_vec();
        let mut rx = doc.subscribe(main);

        let result = doc.append_markup(
            main,
            "<div class=\"feed-shared-update-v2\">keep</div><div a=\"x\" a=\"y\"></div><!x",
        );
        assert!(result.is_err());
        assert_eq!(doc.children(main), before.as_slice());
        assert!(doc.select(doc.root(), ".feed-shared-update-v2").unwrap().is_empty());
        assert!(rx.try_recv().is_err());

        let added = doc
            .append_markup(main, "<div class=\"feed-shared-update-v2\">keep</div>")
            .unwrap();
        assert_eq!(added.len(), 1);
        assert_eq!(doc.children(main).len(), before.len() + 1);
        let record = rx.try_recv().unwrap();
        assert_eq!(record.added, added);
        assert!(record.element_inserted);
    }
}
