//! HTML template document: tolerant parse, selector queries, region edits.
//!
//! The page template is an HTML export from the CMS designer. It is never
//! regenerated by us, only edited at a few hook points, so the document keeps
//! every token it does not touch byte-for-byte: tags are serialized from their
//! original source text, and text, comments and doctype pass through
//! verbatim.
//!
//! ## Parsing
//!
//! Tokens come from `quick-xml` with all well-formedness checks off. On top
//! of that we handle the HTML rules an XML reader does not know:
//!
//! - void elements (`<img>`, `<br>`, `<meta>` ...) never take children
//! - `script`, `style`, `textarea` and `title` bodies are raw text, scanned
//!   by hand up to the closing tag
//! - an end tag closes the nearest open element of that name and everything
//!   opened inside it; a stray end tag is dropped
//! - elements left open at the end of input stay open on output
//!
//! ## Selectors
//!
//! Descendant chains of compound selectors:
//!
//! ```text
//! div  .class  #id  [attr]  [attr="value"]  *
//! .landingcoverwrapper .coversection
//! [data-category="Roadside Attractions"] .landingstorysection
//! ```
//!
//! Child, sibling and pseudo-class selectors are rejected at parse time.

use quick_xml::Reader;
use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use std::fmt;
use std::io;
use std::iter::Peekable;
use std::path::Path;
use std::str::{Chars, FromStr};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("HTML parse error at byte {position}: {message}")]
    Parse { position: usize, message: String },
    #[error("invalid selector {selector:?}: {reason}")]
    Selector { selector: String, reason: String },
    #[error("no element matches {0}")]
    TargetMissing(String),
}

/// Query-and-mutate access to a page template.
pub trait Document {
    fn has_region(&self, selector: &Selector) -> bool;

    /// Replace the children of the first element matching `selector` with
    /// the parsed `html` fragment.
    fn set_region_content(&mut self, selector: &Selector, html: &str)
    -> Result<(), TemplateError>;

    /// Append the parsed `html` fragment to the first element matching
    /// `selector`.
    fn append_to_region(&mut self, selector: &Selector, html: &str) -> Result<(), TemplateError>;
}

const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "textarea", "title"];

type NodeId = usize;

const ROOT: NodeId = 0;

#[derive(Debug, Clone)]
struct Element {
    name: String,
    /// Lowercased names, unescaped values. `open_tag` keeps the source text.
    attrs: Vec<(String, String)>,
    open_tag: String,
    /// `None` when the source never closed the element.
    close_tag: Option<String>,
}

impl Element {
    fn from_start(tag: &BytesStart<'_>, self_closing: bool) -> Self {
        let raw = lossy(tag);
        let open_tag = if self_closing {
            format!("<{raw}/>")
        } else {
            format!("<{raw}>")
        };
        let attrs = tag
            .html_attributes()
            .flatten()
            .map(|attr| {
                (
                    lossy(attr.key.as_ref()).to_ascii_lowercase(),
                    unescape_value(lossy(&attr.value)),
                )
            })
            .collect();
        Self {
            name: lossy(tag.name().as_ref()),
            attrs,
            open_tag,
            close_tag: None,
        }
    }

    fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    fn has_class(&self, class: &str) -> bool {
        self.attr("class")
            .is_some_and(|classes| classes.split_whitespace().any(|c| c == class))
    }
}

#[derive(Debug, Clone)]
enum NodeKind {
    Root,
    Element(Element),
    /// Text, entity, comment, doctype or processing instruction, as written.
    Raw(String),
}

#[derive(Debug, Clone)]
struct Node {
    kind: NodeKind,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-backed HTML tree implementing [`Document`].
///
/// Replaced children stay in the arena but are unreachable from the root.
#[derive(Debug, Clone)]
pub struct HtmlDocument {
    nodes: Vec<Node>,
}

fn lossy(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Resolve character references in an attribute value. Values with
/// references the XML table does not know (`&nbsp;`) are kept as written.
fn unescape_value(raw: String) -> String {
    match unescape(&raw) {
        Ok(value) => value.into_owned(),
        Err(_) => raw,
    }
}

fn create_html_reader(content: &str) -> Reader<&[u8]> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(false);
    reader.config_mut().enable_all_checks(false);
    reader.config_mut().allow_unmatched_ends = true;
    // A lone `&` in text is valid HTML; keep it as text.
    reader.config_mut().allow_dangling_amp = true;
    reader
}

/// Locate the end of a raw-text body starting at `start`.
///
/// Returns `(body_end, resume_at, close_tag)`. An unterminated body runs to
/// the end of input.
fn find_raw_text_end(source: &str, start: usize, name: &str) -> (usize, usize, Option<String>) {
    let needle = format!("</{name}");
    let tail = source[start..].to_ascii_lowercase();
    match tail.find(&needle) {
        Some(rel) => {
            let body_end = start + rel;
            let resume = source[body_end..]
                .find('>')
                .map_or(source.len(), |i| body_end + i + 1);
            (body_end, resume, Some(source[body_end..resume].to_string()))
        }
        None => (source.len(), source.len(), None),
    }
}

impl HtmlDocument {
    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut doc = Self {
            nodes: vec![Node {
                kind: NodeKind::Root,
                parent: None,
                children: Vec::new(),
            }],
        };
        doc.parse_into(ROOT, source)?;
        Ok(doc)
    }

    pub fn load(path: &Path) -> Result<Self, TemplateError> {
        let source = std::fs::read_to_string(path)?;
        Self::parse(&source)
    }

    /// Serialize back to HTML.
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        self.write_node(ROOT, &mut out);
        out
    }

    /// Number of elements matching `selector`.
    pub fn count(&self, selector: &Selector) -> usize {
        self.find_all(selector).count()
    }

    fn push(&mut self, parent: NodeId, kind: NodeKind) -> NodeId {
        let id = self.nodes.len();
        self.nodes.push(Node {
            kind,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent].children.push(id);
        id
    }

    fn push_raw(&mut self, parent: NodeId, text: String) {
        if !text.is_empty() {
            self.push(parent, NodeKind::Raw(text));
        }
    }

    fn set_close_tag(&mut self, id: NodeId, close_tag: Option<String>) {
        if let NodeKind::Element(element) = &mut self.nodes[id].kind {
            element.close_tag = close_tag;
        }
    }

    fn is_element_named(&self, id: NodeId, name: &str) -> bool {
        matches!(&self.nodes[id].kind, NodeKind::Element(e) if e.name.eq_ignore_ascii_case(name))
    }

    /// Parse `source` and attach the resulting nodes under `parent`.
    fn parse_into(&mut self, parent: NodeId, source: &str) -> Result<(), TemplateError> {
        let mut open: Vec<NodeId> = vec![parent];
        let mut offset = 0;

        // The reader is restarted after every raw-text body.
        'chunks: while offset < source.len() {
            let mut reader = create_html_reader(&source[offset..]);
            loop {
                let current = open.last().copied().unwrap_or(parent);
                let event_start = offset + reader.buffer_position() as usize;
                let event = reader.read_event().map_err(|e| TemplateError::Parse {
                    position: offset + reader.error_position() as usize,
                    message: e.to_string(),
                })?;
                match event {
                    Event::Start(tag) => {
                        let element = Element::from_start(&tag, false);
                        let name = element.name.to_ascii_lowercase();
                        let id = self.push(current, NodeKind::Element(element));
                        if VOID_ELEMENTS.contains(&name.as_str()) {
                            continue;
                        }
                        if RAW_TEXT_ELEMENTS.contains(&name.as_str()) {
                            let body_start = offset + reader.buffer_position() as usize;
                            let (body_end, resume, close_tag) =
                                find_raw_text_end(source, body_start, &name);
                            self.push_raw(id, source[body_start..body_end].to_string());
                            self.set_close_tag(id, close_tag);
                            offset = resume;
                            continue 'chunks;
                        }
                        open.push(id);
                    }
                    Event::Empty(tag) => {
                        self.push(current, NodeKind::Element(Element::from_start(&tag, true)));
                    }
                    Event::End(tag) => {
                        let name = lossy(tag.name().as_ref());
                        let depth = open[1..]
                            .iter()
                            .rposition(|&id| self.is_element_named(id, &name))
                            .map(|i| i + 1);
                        if let Some(depth) = depth {
                            self.set_close_tag(open[depth], Some(format!("</{}>", lossy(&tag))));
                            open.truncate(depth);
                        }
                    }
                    Event::Text(text) => self.push_raw(current, lossy(&text)),
                    Event::GeneralRef(reference) => {
                        self.push_raw(current, format!("&{};", lossy(&reference)))
                    }
                    Event::CData(data) => {
                        self.push_raw(current, format!("<![CDATA[{}]]>", lossy(&data)))
                    }
                    Event::Comment(comment) => {
                        self.push_raw(current, format!("<!--{}-->", lossy(&comment)))
                    }
                    Event::DocType(_) => {
                        let event_end = offset + reader.buffer_position() as usize;
                        self.push_raw(current, source[event_start..event_end].to_string());
                    }
                    Event::Decl(decl) => self.push_raw(current, format!("<?{}?>", lossy(&decl))),
                    Event::PI(pi) => self.push_raw(current, format!("<?{}?>", lossy(&pi))),
                    Event::Eof => break 'chunks,
                }
            }
        }
        Ok(())
    }

    fn write_node(&self, id: NodeId, out: &mut String) {
        let node = &self.nodes[id];
        match &node.kind {
            NodeKind::Root => self.write_children(node, out),
            NodeKind::Raw(text) => out.push_str(text),
            NodeKind::Element(element) => {
                out.push_str(&element.open_tag);
                self.write_children(node, out);
                if let Some(close_tag) = &element.close_tag {
                    out.push_str(close_tag);
                }
            }
        }
    }

    fn write_children(&self, node: &Node, out: &mut String) {
        for &child in &node.children {
            self.write_node(child, out);
        }
    }

    /// Every reachable node in document order.
    fn document_order(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<NodeId> = self.nodes[ROOT].children.iter().rev().copied().collect();
        while let Some(id) = stack.pop() {
            order.push(id);
            stack.extend(self.nodes[id].children.iter().rev().copied());
        }
        order
    }

    fn find_all<'s>(&'s self, selector: &'s Selector) -> impl Iterator<Item = NodeId> + 's {
        self.document_order()
            .into_iter()
            .filter(move |&id| self.matches(id, selector))
    }

    fn find_first(&self, selector: &Selector) -> Option<NodeId> {
        self.find_all(selector).next()
    }

    fn element(&self, id: NodeId) -> Option<&Element> {
        match &self.nodes[id].kind {
            NodeKind::Element(element) => Some(element),
            _ => None,
        }
    }

    /// Right-to-left descendant matching; the nearest matching ancestor is
    /// taken for each step.
    fn matches(&self, id: NodeId, selector: &Selector) -> bool {
        let Some((last, ancestors)) = selector.chain.split_last() else {
            return false;
        };
        if !self.element(id).is_some_and(|e| last.matches(e)) {
            return false;
        }
        let mut cursor = self.nodes[id].parent;
        for compound in ancestors.iter().rev() {
            loop {
                let Some(ancestor) = cursor else {
                    return false;
                };
                cursor = self.nodes[ancestor].parent;
                if self.element(ancestor).is_some_and(|e| compound.matches(e)) {
                    break;
                }
            }
        }
        true
    }

    fn target(&self, selector: &Selector) -> Result<NodeId, TemplateError> {
        self.find_first(selector)
            .ok_or_else(|| TemplateError::TargetMissing(selector.to_string()))
    }
}

impl Document for HtmlDocument {
    fn has_region(&self, selector: &Selector) -> bool {
        self.find_first(selector).is_some()
    }

    fn set_region_content(
        &mut self,
        selector: &Selector,
        html: &str,
    ) -> Result<(), TemplateError> {
        let target = self.target(selector)?;
        self.nodes[target].children.clear();
        self.parse_into(target, html)
    }

    fn append_to_region(&mut self, selector: &Selector, html: &str) -> Result<(), TemplateError> {
        let target = self.target(selector)?;
        self.parse_into(target, html)
    }
}

// ============================================================================
// Selectors
// ============================================================================

/// A parsed descendant-chain selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    chain: Vec<Compound>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Compound {
    tag: Option<String>,
    id: Option<String>,
    classes: Vec<String>,
    attrs: Vec<AttrTest>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct AttrTest {
    name: String,
    value: Option<String>,
}

impl Compound {
    fn matches(&self, element: &Element) -> bool {
        self.tag
            .as_ref()
            .is_none_or(|tag| element.name.eq_ignore_ascii_case(tag))
            && self
                .id
                .as_ref()
                .is_none_or(|id| element.attr("id") == Some(id.as_str()))
            && self.classes.iter().all(|class| element.has_class(class))
            && self.attrs.iter().all(|test| {
                match (element.attr(&test.name), &test.value) {
                    (None, _) => false,
                    (Some(_), None) => true,
                    (Some(have), Some(want)) => have == want,
                }
            })
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

fn ident(chars: &mut Peekable<Chars<'_>>) -> Option<String> {
    let mut out = String::new();
    while let Some(&c) = chars.peek() {
        if !is_ident_char(c) {
            break;
        }
        out.push(c);
        chars.next();
    }
    (!out.is_empty()).then_some(out)
}

fn skip_whitespace(chars: &mut Peekable<Chars<'_>>) {
    while chars.next_if(|c| c.is_whitespace()).is_some() {}
}

fn quoted(chars: &mut Peekable<Chars<'_>>, quote: char) -> Result<String, &'static str> {
    let mut value = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => return Ok(value),
            Some('\\') => match chars.next() {
                Some(escaped) => value.push(escaped),
                None => return Err("unterminated quoted value"),
            },
            Some(c) => value.push(c),
            None => return Err("unterminated quoted value"),
        }
    }
}

/// Body of `[...]`, after the opening bracket.
fn attr_test(chars: &mut Peekable<Chars<'_>>) -> Result<AttrTest, &'static str> {
    skip_whitespace(chars);
    let name = ident(chars)
        .ok_or("expected attribute name")?
        .to_ascii_lowercase();
    skip_whitespace(chars);
    match chars.next() {
        Some(']') => Ok(AttrTest { name, value: None }),
        Some('=') => {
            skip_whitespace(chars);
            let value = match chars.peek().copied() {
                Some(quote @ ('"' | '\'')) => {
                    chars.next();
                    quoted(chars, quote)?
                }
                _ => ident(chars).ok_or("expected attribute value")?,
            };
            skip_whitespace(chars);
            match chars.next() {
                Some(']') => Ok(AttrTest {
                    name,
                    value: Some(value),
                }),
                _ => Err("expected ']'"),
            }
        }
        _ => Err("expected '=' or ']'"),
    }
}

impl Selector {
    pub fn parse(input: &str) -> Result<Self, TemplateError> {
        let fail = |reason: &str| TemplateError::Selector {
            selector: input.to_string(),
            reason: reason.to_string(),
        };

        let mut chain = Vec::new();
        let mut current = Compound::default();
        let mut started = false;
        let mut chars = input.chars().peekable();

        while let Some(&c) = chars.peek() {
            match c {
                c if c.is_whitespace() => {
                    chars.next();
                    if started {
                        chain.push(std::mem::take(&mut current));
                        started = false;
                    }
                }
                '.' => {
                    chars.next();
                    let class = ident(&mut chars).ok_or_else(|| fail("expected class name"))?;
                    current.classes.push(class);
                    started = true;
                }
                '#' => {
                    chars.next();
                    let id = ident(&mut chars).ok_or_else(|| fail("expected id"))?;
                    current.id = Some(id);
                    started = true;
                }
                '[' => {
                    chars.next();
                    current.attrs.push(attr_test(&mut chars).map_err(fail)?);
                    started = true;
                }
                '*' if !started => {
                    chars.next();
                    started = true;
                }
                c if is_ident_char(c) && !started => {
                    current.tag = ident(&mut chars).map(|tag| tag.to_ascii_lowercase());
                    started = true;
                }
                other => return Err(fail(&format!("unsupported character {other:?}"))),
            }
        }
        if started {
            chain.push(current);
        }
        if chain.is_empty() {
            return Err(fail("empty selector"));
        }

        Ok(Self {
            source: input.trim().to_string(),
            chain,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for Selector {
    type Err = TemplateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
