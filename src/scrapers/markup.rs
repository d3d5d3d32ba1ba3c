//! Markup repair and strict parsing of scraped comment sections.
//!
//! Comment sections are cut out of full HTML pages and parsed as XML with
//! `quick-xml`, so a change in the live site's structure surfaces as a
//! parse error instead of silently producing a different tree. Before
//! parsing, [`html_to_xml`] repairs the HTML-only artifacts that are
//! otherwise valid markup:
//!
//! - `<script>` and `<svg>` blocks are dropped
//! - named entities XML does not predefine (`&nbsp;`, `&uuml;`, …) become
//!   numeric references, stray `&` become `&amp;`
//! - void elements (`<br>`, `<img …>`, `<source …>`, …) are self-closed

use once_cell::sync::Lazy;
use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use regex::{Captures, Regex};
use std::borrow::Cow;
use thiserror::Error;

#[derive(Debug, Error)]
#[error("{0}")]
pub struct MarkupError(String);

impl MarkupError {
    fn new(detail: impl Into<String>) -> Self {
        MarkupError(detail.into())
    }
}

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b.*?</script\s*>").expect("valid regex"));
static SVG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<svg\b.*?</svg\s*>").expect("valid regex"));
static ENTITY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&(#[0-9]+;|#[xX][0-9a-fA-F]+;|[A-Za-z][A-Za-z0-9]*;)?").expect("valid regex")
});
static VOID_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)<(area|base|br|col|embed|hr|img|input|link|meta|param|source|track|wbr)\b([^>]*?)\s*/?>",
    )
    .expect("valid regex")
});

const XML_PREDEFINED: &[&str] = &["amp", "lt", "gt", "quot", "apos"];

/// Numeric character references for an HTML5 named entity XML does not know.
fn html_entity(name: &str) -> Option<String> {
    let resolved = quick_xml::escape::resolve_html5_entity(name)?;
    Some(resolved.chars().map(|c| format!("&#{};", u32::from(c))).collect())
}

/// Repair an HTML fragment so it can be parsed as XML.
pub fn html_to_xml(html: &str) -> String {
    let html = SCRIPT_RE.replace_all(html, "");
    let html = SVG_RE.replace_all(&html, "");
    let html = ENTITY_RE.replace_all(&html, |caps: &Captures| {
        let Some(entity) = caps.get(1) else {
            return "&amp;".to_string();
        };
        let body = entity.as_str();
        let name = &body[..body.len() - 1];
        if name.starts_with('#') || XML_PREDEFINED.contains(&name) {
            return format!("&{body}");
        }
        html_entity(name).unwrap_or_else(|| format!("&{body}"))
    });
    VOID_RE.replace_all(&html, "<$1$2/>").into_owned()
}

/// A parsed element: name, attributes in document order, child nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    Text(String),
}

impl Element {
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Whether the whitespace-separated `class` attribute contains `class`.
    pub fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|c| c.split_whitespace().any(|c| c == class))
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|n| match n {
            Node::Element(e) => Some(e),
            Node::Text(_) => None,
        })
    }

    /// All descendant elements in document order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.child_elements().collect::<Vec<_>>().into_iter().rev().collect(),
        }
    }

    pub fn find(&self, pred: impl Fn(&Element) -> bool) -> Option<&Element> {
        self.descendants().find(|e| pred(*e))
    }

    pub fn find_by_class(&self, class: &str) -> Option<&Element> {
        self.find(|e| e.has_class(class))
    }

    /// Text directly following the first child element named `name`.
    pub fn text_after(&self, name: &str) -> Option<&str> {
        let position = self
            .children
            .iter()
            .position(|n| matches!(n, Node::Element(e) if e.name == name))?;
        match self.children.get(position + 1) {
            Some(Node::Text(t)) => Some(t.as_str()),
            _ => None,
        }
    }

    /// Concatenated text of this element and everything below it.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        for child in &self.children {
            match child {
                Node::Text(t) => out.push_str(t),
                Node::Element(e) => e.collect_text(out),
            }
        }
    }
}

pub struct Descendants<'a> {
    stack: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.stack.pop()?;
        let children: Vec<&Element> = next.child_elements().collect();
        self.stack.extend(children.into_iter().rev());
        Some(next)
    }
}

fn open_element(reader: &Reader<&[u8]>, start: &BytesStart<'_>) -> Result<Element, MarkupError> {
    let name = String::from_utf8_lossy(start.name().as_ref()).into_owned();
    let mut attrs = Vec::new();
    for attr in start.html_attributes() {
        let attr = attr.map_err(|e| MarkupError::new(format!("bad attribute in <{name}>: {e}")))?;
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| MarkupError::new(format!("bad attribute value in <{name}>: {e}")))?
            .into_owned();
        attrs.push((key, value));
    }
    Ok(Element {
        name,
        attrs,
        children: Vec::new(),
    })
}

fn resolve_reference(name: &str) -> Result<Cow<'static, str>, MarkupError> {
    let resolved = if let Some(num) = name.strip_prefix('#') {
        let cp = match num.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => num.parse::<u32>().ok(),
        };
        cp.and_then(char::from_u32).map(|c| Cow::Owned(c.to_string()))
    } else {
        match name {
            "amp" => Some(Cow::Borrowed("&")),
            "lt" => Some(Cow::Borrowed("<")),
            "gt" => Some(Cow::Borrowed(">")),
            "quot" => Some(Cow::Borrowed("\"")),
            "apos" => Some(Cow::Borrowed("'")),
            _ => None,
        }
    };
    resolved.ok_or_else(|| MarkupError::new(format!("unknown entity &{name};")))
}

struct TreeBuilder {
    stack: Vec<Element>,
    root: Option<Element>,
}

impl TreeBuilder {
    fn push_text(&mut self, text: &str) -> Result<(), MarkupError> {
        match self.stack.last_mut() {
            Some(parent) => {
                match parent.children.last_mut() {
                    Some(Node::Text(prev)) => prev.push_str(text),
                    _ => parent.children.push(Node::Text(text.to_string())),
                }
                Ok(())
            }
            None if text.trim().is_empty() => Ok(()),
            None => Err(MarkupError::new("text outside of the root element")),
        }
    }

    fn close(&mut self, element: Element) -> Result<(), MarkupError> {
        match self.stack.last_mut() {
            Some(parent) => parent.children.push(Node::Element(element)),
            None if self.root.is_none() => self.root = Some(element),
            None => return Err(MarkupError::new("more than one root element")),
        }
        Ok(())
    }
}

/// Parse repaired markup into an element tree with a single root.
pub fn parse(xml: &str) -> Result<Element, MarkupError> {
    let mut reader = Reader::from_str(xml);
    let mut tree = TreeBuilder {
        stack: Vec::new(),
        root: None,
    };

    loop {
        let event = reader
            .read_event()
            .map_err(|e| MarkupError::new(format!("at byte {}: {e}", reader.buffer_position())))?;
        match event {
            Event::Start(start) => {
                let element = open_element(&reader, &start)?;
                tree.stack.push(element);
            }
            Event::Empty(start) => {
                let element = open_element(&reader, &start)?;
                tree.close(element)?;
            }
            Event::End(_) => {
                let element = tree
                    .stack
                    .pop()
                    .ok_or_else(|| MarkupError::new("closing tag without opening tag"))?;
                tree.close(element)?;
            }
            Event::Text(text) => {
                let raw = reader
                    .decoder()
                    .decode(&text)
                    .map_err(|e| MarkupError::new(e.to_string()))?;
                let unescaped = quick_xml::escape::unescape(&raw)
                    .map_err(|e| MarkupError::new(e.to_string()))?;
                tree.push_text(&unescaped)?;
            }
            Event::CData(data) => {
                let raw = reader
                    .decoder()
                    .decode(&data)
                    .map_err(|e| MarkupError::new(e.to_string()))?;
                tree.push_text(&raw)?;
            }
            Event::GeneralRef(reference) => {
                let name = reader
                    .decoder()
                    .decode(&reference)
                    .map_err(|e| MarkupError::new(e.to_string()))?;
                let resolved = resolve_reference(&name)?;
                tree.push_text(&resolved)?;
            }
            Event::Eof => break,
            _ => {}
        }
    }

    if let Some(open) = tree.stack.last() {
        return Err(MarkupError::new(format!("unclosed element <{}>", open.name)));
    }
    tree.root.ok_or_else(|| MarkupError::new("no root element"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_named_entities_become_numeric() {
        let xml = html_to_xml("<p>Gr&uuml;&szlig;e&nbsp;&amp; mehr &hellip;</p>");
        assert_eq!(xml, "<p>Gr&#252;&#223;e&#160;&amp; mehr &#8230;</p>");
        let tree = parse(&xml).unwrap();
        assert_eq!(tree.text(), "Grüße\u{a0}& mehr …");
    }

    #[test]
    fn test_any_html5_entity_is_resolved() {
        let xml = html_to_xml("<p>Jos&eacute; Nu&ntilde;ez, &Eacute;mile &Ccedil;elik, Ol&oacute; &trade;</p>");
        assert_eq!(
            xml,
            "<p>Jos&#233; Nu&#241;ez, &#201;mile &#199;elik, Ol&#243; &#8482;</p>"
        );
        assert_eq!(parse(&xml).unwrap().text(), "José Nuñez, Émile Çelik, Oló ™");
    }

    #[test]
    fn test_stray_ampersand_is_escaped() {
        let xml = html_to_xml("<p>Q&A and R & D</p>");
        assert_eq!(xml, "<p>Q&amp;A and R &amp; D</p>");
        assert_eq!(parse(&xml).unwrap().text(), "Q&A and R & D");
    }

    #[test]
    fn test_void_elements_are_self_closed() {
        let xml = html_to_xml(r#"<div>a<br>b<img src="x.png" alt="y"><br/>c</div>"#);
        assert_eq!(xml, r#"<div>a<br/>b<img src="x.png" alt="y"/><br/>c</div>"#);
        let tree = parse(&xml).unwrap();
        assert_eq!(tree.child_elements().count(), 3);
        assert_eq!(tree.text(), "abc");
    }

    #[test]
    fn test_picture_sources_and_head_elements_parse() {
        let xml = html_to_xml(
            r#"<div><meta itemprop="x" content="1"><link rel="a" href="/b"><picture><source srcset="a.webp"><img src="a.png"></picture><video><track src="t.vtt"></video><table><col span="2"><colgroup></colgroup></table></div>"#,
        );
        let tree = parse(&xml).unwrap();
        let picture = tree.find(|e| e.name == "picture").unwrap();
        let names: Vec<&str> = picture.child_elements().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["source", "img"]);
        assert!(tree.find(|e| e.name == "colgroup").is_some());
        assert_eq!(tree.find(|e| e.name == "meta").unwrap().attr("content"), Some("1"));
    }

    #[test]
    fn test_scripts_and_svgs_are_removed() {
        let xml = html_to_xml(
            "<div><script>if (a < b && c) {}</script><svg><path d='M0'></path></svg>ok</div>",
        );
        assert_eq!(xml, "<div>ok</div>");
    }

    #[test]
    fn test_queries_walk_in_document_order() {
        let tree = parse(
            r#"<section><article id="a" class="comment js-comment-toplevel"><p class="x">one</p></article><article id="b" class="comment"><p class="x">two</p></article></section>"#,
        )
        .unwrap();
        let ids: Vec<&str> = tree
            .descendants()
            .filter(|e| e.name == "article")
            .filter_map(|e| e.attr("id"))
            .collect();
        assert_eq!(ids, vec!["a", "b"]);
        let first = tree.find(|e| e.name == "article").unwrap();
        assert!(first.has_class("js-comment-toplevel"));
        assert_eq!(first.find_by_class("x").unwrap().text(), "one");
    }

    #[test]
    fn test_text_after_child() {
        let tree = parse(r#"<div><a href="/m">Name</a> 12.03.2015, 10:15 Uhr<b>x</b></div>"#).unwrap();
        assert_eq!(tree.text_after("a").map(str::trim), Some("12.03.2015, 10:15 Uhr"));
        assert_eq!(tree.text_after("b"), None);
        assert_eq!(tree.text_after("span"), None);
    }

    #[test]
    fn test_attribute_entities_are_resolved() {
        let tree = parse(r#"<a href="/u?a=1&amp;b=2" title="&#252;">x</a>"#).unwrap();
        assert_eq!(tree.attr("href"), Some("/u?a=1&b=2"));
        assert_eq!(tree.attr("title"), Some("ü"));
    }

    #[test]
    fn test_mismatched_tags_fail() {
        assert!(parse("<div><p>text</div>").is_err());
        assert!(parse("<div><p>text</p>").is_err());
    }

    #[test]
    fn test_unknown_entity_fails() {
        let xml = html_to_xml("<p>&bogusentity;</p>");
        assert!(parse(&xml).is_err());
    }

    #[test]
    fn test_multiple_roots_fail() {
        assert!(parse("<a/><b/>").is_err());
    }
}
