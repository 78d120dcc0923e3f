//! Owned XML element tree for feed documents.
//!
//! Feeds are small, so the whole document is materialized once and then
//! queried by tag name and attribute, the way a browser DOM would be.

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// SEC-003: Maximum element nesting depth. Bounds the recursion used by
/// [`Element::text`] and rejects pathological documents early.
const MAX_DEPTH: usize = 64;

/// Structural problems found while parsing a feed document.
#[derive(Debug, Error)]
pub enum DocumentError {
    /// quick-xml rejected the markup (mismatched tags, bad syntax, ...)
    #[error("{0}")]
    Xml(String),
    #[error("nesting depth exceeds maximum of {0} levels")]
    TooDeep(usize),
    #[error("document has no root element")]
    NoRoot,
    #[error("junk after document element: <{0}>")]
    MultipleRoots(String),
    #[error("unexpected end of document inside <{0}>")]
    Unclosed(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    Text(String),
}

/// A single XML element with its qualified name, attributes, and children.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<Node>,
}

impl Element {
    /// Qualified tag name as written in the source, e.g. `media:content`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Tag name with any namespace prefix removed.
    pub fn local_name(&self) -> &str {
        self.name
            .split_once(':')
            .map(|(_, local)| local)
            .unwrap_or(&self.name)
    }

    /// Value of the attribute with the given qualified name.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Direct child elements in document order.
    pub fn children(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(|node| match node {
            Node::Element(el) => Some(el),
            Node::Text(_) => None,
        })
    }

    /// First direct child whose qualified name is exactly `name`.
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children().find(|el| el.name == name)
    }

    /// All descendant elements in document (pre-)order, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: vec![self.children.iter()],
        }
    }

    /// Concatenated text of every descendant text node, like DOM `textContent`.
    pub fn text(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    /// Trimmed text of the first direct child named `name`, or `""` when absent.
    pub fn child_text(&self, name: &str) -> String {
        self.child(name)
            .map(|el| el.text().trim().to_owned())
            .unwrap_or_default()
    }

    fn collect_text(&self, out: &mut String) {
        for node in &self.children {
            match node {
                Node::Text(text) => out.push_str(text),
                Node::Element(el) => el.collect_text(out),
            }
        }
    }
}

/// Pre-order iterator over descendant elements.
pub struct Descendants<'a> {
    stack: Vec<std::slice::Iter<'a, Node>>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<&'a Element> {
        loop {
            let next = self.stack.last_mut()?.next();
            match next {
                Some(Node::Element(el)) => {
                    self.stack.push(el.children.iter());
                    return Some(el);
                }
                Some(Node::Text(_)) => {}
                None => {
                    self.stack.pop();
                }
            }
        }
    }
}

/// A parsed feed document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedDocument {
    root: Element,
}

impl FeedDocument {
    /// Parses markup into an element tree.
    ///
    /// Any structural error (mismatched or unclosed tags, a second root
    /// element, excessive nesting) fails the whole document.
    ///
    /// # Security
    ///
    /// SEC-002: quick-xml (0.37) never expands `<!ENTITY>` declarations, so
    /// external entities cannot be smuggled in through a hostile feed.
    /// A reference to an undefined entity in text or attributes is a
    /// well-formedness error and fails the document.
    pub fn parse(text: &str) -> Result<Self, DocumentError> {
        let mut reader = Reader::from_str(text);

        let mut stack: Vec<Element> = Vec::new();
        let mut root: Option<Element> = None;

        loop {
            match reader.read_event() {
                Ok(Event::Start(e)) => {
                    if stack.len() >= MAX_DEPTH {
                        return Err(DocumentError::TooDeep(MAX_DEPTH));
                    }
                    let el = element_from_start(&e, &reader)?;
                    if stack.is_empty() && root.is_some() {
                        return Err(DocumentError::MultipleRoots(el.name));
                    }
                    stack.push(el);
                }
                Ok(Event::Empty(e)) => {
                    let el = element_from_start(&e, &reader)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Ok(Event::End(_)) => {
                    // quick-xml already verified that the end name matches
                    let el = stack.pop().ok_or(DocumentError::NoRoot)?;
                    attach(&mut stack, &mut root, el)?;
                }
                Ok(Event::Text(e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = e
                            .unescape()
                            .map_err(|err| xml_error(err, &reader))?
                            .into_owned();
                        parent.children.push(Node::Text(text));
                    }
                }
                Ok(Event::CData(e)) => {
                    if let Some(parent) = stack.last_mut() {
                        let text = String::from_utf8_lossy(&e.into_inner()).into_owned();
                        parent.children.push(Node::Text(text));
                    }
                }
                Ok(Event::Eof) => break,
                Err(e) => return Err(xml_error(e, &reader)),
                _ => {}
            }
        }

        if let Some(open) = stack.pop() {
            return Err(DocumentError::Unclosed(open.name));
        }

        root.map(|root| Self { root }).ok_or(DocumentError::NoRoot)
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Every `<item>` element, in document order.
    pub fn items(&self) -> impl Iterator<Item = &Element> {
        self.root
            .descendants()
            .filter(|el| el.local_name() == "item")
    }

    /// The channel-level `<lastBuildDate>`, trimmed, if present and non-empty.
    pub fn last_build_date(&self) -> Option<String> {
        self.root
            .descendants()
            .find(|el| el.name() == "lastBuildDate")
            .map(|el| el.text().trim().to_owned())
            .filter(|date| !date.is_empty())
    }
}

/// Attaches a finished element to its parent, or makes it the root.
fn attach(
    stack: &mut [Element],
    root: &mut Option<Element>,
    el: Element,
) -> Result<(), DocumentError> {
    match stack.last_mut() {
        Some(parent) => parent.children.push(Node::Element(el)),
        None if root.is_some() => return Err(DocumentError::MultipleRoots(el.name)),
        None => *root = Some(el),
    }
    Ok(())
}

fn xml_error(err: impl std::fmt::Display, reader: &Reader<&[u8]>) -> DocumentError {
    DocumentError::Xml(format!("{} (at byte {})", err, reader.buffer_position()))
}

fn element_from_start(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Element, DocumentError> {
    let name = String::from_utf8_lossy(e.name().as_ref()).into_owned();
    let mut attributes = Vec::new();

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(err) => {
                tracing::warn!(element = %name, error = %err, "Skipping malformed attribute");
                continue;
            }
        };
        let key = String::from_utf8_lossy(attr.key.as_ref()).into_owned();
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|err| xml_error(err, reader))?
            .into_owned();
        attributes.push((key, value));
    }

    Ok(Element {
        name,
        attributes,
        children: Vec::new(),
    })
}
