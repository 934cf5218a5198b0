//! In-memory XML document that keeps its source text.
//!
//! Parsing builds an element tree with resolved namespaces on top of
//! `quick_xml::NsReader`. Every attribute remembers where its name sits in the
//! source, so serializing only splices renamed names back in and leaves every
//! other byte of the input (comments, whitespace, entity references, quoting)
//! exactly as it was.

use quick_xml::events::attributes::AttrError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::NsReader;
use std::ops::Range;
use thiserror::Error;

const XMLNS_PREFIX: &str = "xmlns:";
const BYTE_ORDER_MARK: char = '\u{feff}';

/// Reasons a document could not be turned into an element tree
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed XML at byte {position}: {source}")]
    Syntax {
        position: usize,
        #[source]
        source: quick_xml::Error,
    },

    #[error("malformed attribute in tag at byte {position}: {source}")]
    Attribute {
        position: usize,
        #[source]
        source: AttrError,
    },

    #[error("tag at byte {position} could not be mapped back onto the source text")]
    Layout { position: usize },

    #[error("closing tag </{name}> at byte {position} has no matching start tag")]
    UnexpectedEndTag { name: String, position: usize },

    #[error("document has no root element")]
    MissingRoot,

    #[error("second root element <{name}> at byte {position}")]
    MultipleRoots { name: String, position: usize },

    #[error("text outside the root element at byte {position}")]
    TextOutsideRoot { position: usize },

    #[error("element <{name}> is never closed")]
    UnclosedElement { name: String },
}

/// A single attribute as written in the source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    name: String,
    value: String,
    name_span: Range<usize>,
}

impl Attribute {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Raw attribute value, without entity expansion
    pub fn value(&self) -> &str {
        &self.value
    }

    fn is_renamed(&self, source: &str) -> bool {
        source[self.name_span.clone()] != self.name
    }
}

/// Attributes of one element, in declaration order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Attributes(Vec<Attribute>);

impl Attributes {
    pub fn get(&self, name: &str) -> Option<&Attribute> {
        self.0.iter().find(|attribute| attribute.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Rename the first attribute called `from` to `to`, keeping its value.
    ///
    /// Returns whether an attribute was renamed.
    pub fn rename(&mut self, from: &str, to: &str) -> bool {
        match self.0.iter_mut().find(|attribute| attribute.name == from) {
            Some(attribute) => {
                attribute.name = to.to_string();
                true
            }
            None => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    prefix: Option<String>,
    local_name: String,
    namespace: Option<String>,
    attributes: Attributes,
    children: Vec<Element>,
}

impl Element {
    pub fn prefix(&self) -> Option<&str> {
        self.prefix.as_deref()
    }

    pub fn local_name(&self) -> &str {
        &self.local_name
    }

    /// Namespace URI the element's name resolves to, if any
    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn qualified_name(&self) -> String {
        qualified_name(self.prefix.as_deref(), &self.local_name)
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn attribute(&self, name: &str) -> Option<&Attribute> {
        self.attributes.get(name)
    }

    pub fn children(&self) -> &[Element] {
        &self.children
    }

    /// `xmlns:<prefix>` declarations on this element as `(prefix, uri)` pairs,
    /// in declaration order. Default namespace declarations are not included.
    pub fn namespace_declarations(&self) -> impl Iterator<Item = (&str, &str)> {
        self.attributes.iter().filter_map(|attribute| {
            attribute
                .name
                .strip_prefix(XMLNS_PREFIX)
                .map(|prefix| (prefix, attribute.value.as_str()))
        })
    }

    /// This element and all of its descendants in document order
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            pending: vec![self],
        }
    }
}

/// Pre-order walk over an element subtree
pub struct Descendants<'a> {
    pending: Vec<&'a Element>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a Element;

    fn next(&mut self) -> Option<Self::Item> {
        let element = self.pending.pop()?;
        self.pending.extend(element.children.iter().rev());
        Some(element)
    }
}

/// Mutable view of an element selected by [`Document::find_mut`]
#[derive(Debug)]
pub struct ElementMut<'a> {
    pub name: String,
    pub attributes: &'a mut Attributes,
}

#[derive(Debug, Clone)]
pub struct Document {
    source: String,
    root: Element,
}

impl Document {
    pub fn parse(source: impl Into<String>) -> Result<Self, ParseError> {
        let source = source.into();
        let root = TreeBuilder::default().build(&source)?;
        Ok(Self { source, root })
    }

    pub fn root(&self) -> &Element {
        &self.root
    }

    /// Text the document was parsed from
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Every element, root included, whose local name is `local_name` and
    /// whose name resolves to the `namespace` URI, in document order.
    pub fn find_mut(&mut self, local_name: &str, namespace: &str) -> Vec<ElementMut<'_>> {
        let mut found = Vec::new();
        let mut pending = vec![&mut self.root];

        while let Some(element) = pending.pop() {
            let Element {
                prefix,
                local_name: name,
                namespace: bound,
                attributes,
                children,
            } = element;

            if name.as_str() == local_name && bound.as_deref() == Some(namespace) {
                found.push(ElementMut {
                    name: qualified_name(prefix.as_deref(), name),
                    attributes,
                });
            }
            pending.extend(children.iter_mut().rev());
        }

        found
    }

    pub fn is_modified(&self) -> bool {
        self.renamed_attributes().next().is_some()
    }

    /// Serialize the document. An unmodified document yields its source unchanged.
    pub fn to_xml(&self) -> String {
        let mut renamed: Vec<&Attribute> = self.renamed_attributes().collect();
        renamed.sort_by_key(|attribute| attribute.name_span.start);

        let mut output = String::with_capacity(self.source.len() + renamed.len());
        let mut copied = 0;
        for attribute in renamed {
            output.push_str(&self.source[copied..attribute.name_span.start]);
            output.push_str(&attribute.name);
            copied = attribute.name_span.end;
        }
        output.push_str(&self.source[copied..]);
        output
    }

    fn renamed_attributes(&self) -> impl Iterator<Item = &Attribute> {
        self.root
            .descendants()
            .flat_map(|element| element.attributes.iter())
            .filter(|attribute| attribute.is_renamed(&self.source))
    }
}

fn qualified_name(prefix: Option<&str>, local_name: &str) -> String {
    match prefix {
        Some(prefix) => format!("{prefix}:{local_name}"),
        None => local_name.to_string(),
    }
}

#[derive(Default)]
struct TreeBuilder {
    open: Vec<Element>,
    root: Option<Element>,
}

impl TreeBuilder {
    fn build(mut self, source: &str) -> Result<Element, ParseError> {
        // The reader sees the text after any byte order mark; its positions
        // are shifted back onto `source`, which keeps the mark.
        let offset = if source.starts_with(BYTE_ORDER_MARK) {
            BYTE_ORDER_MARK.len_utf8()
        } else {
            0
        };
        let mut reader = NsReader::from_str(&source[offset..]);

        loop {
            let event = reader.read_event().map_err(|source| ParseError::Syntax {
                position: offset + reader.error_position() as usize,
                source,
            })?;
            let position = offset + reader.buffer_position() as usize;

            match event {
                // `position` is just past the closing `>` (or `/>`)
                Event::Start(start) => {
                    let element = read_element(&reader, &start, source, position - 1)?;
                    self.open.push(element);
                }
                Event::Empty(start) => {
                    let element = read_element(&reader, &start, source, position - 2)?;
                    self.close(element, position)?;
                }
                Event::End(end) => {
                    let element = self.open.pop().ok_or_else(|| ParseError::UnexpectedEndTag {
                        name: String::from_utf8_lossy(end.name().as_ref()).into_owned(),
                        position,
                    })?;
                    self.close(element, position)?;
                }
                Event::Text(text) if self.open.is_empty() => {
                    let is_blank = text.iter().all(u8::is_ascii_whitespace);
                    if !is_blank {
                        return Err(ParseError::TextOutsideRoot { position });
                    }
                }
                Event::CData(_) if self.open.is_empty() => {
                    return Err(ParseError::TextOutsideRoot { position });
                }
                Event::Eof => break,
                _ => {}
            }
        }

        if let Some(element) = self.open.pop() {
            return Err(ParseError::UnclosedElement {
                name: element.qualified_name(),
            });
        }
        self.root.ok_or(ParseError::MissingRoot)
    }

    fn close(&mut self, element: Element, position: usize) -> Result<(), ParseError> {
        match self.open.last_mut() {
            Some(parent) => parent.children.push(element),
            None if self.root.is_some() => {
                return Err(ParseError::MultipleRoots {
                    name: element.qualified_name(),
                    position,
                })
            }
            None => self.root = Some(element),
        }
        Ok(())
    }
}

/// Build an element from a start or empty tag whose content (the bytes between
/// `<` and `>` or `/>`) ends at `content_end` in `source`.
fn read_element(
    reader: &NsReader<&[u8]>,
    start: &BytesStart<'_>,
    source: &str,
    content_end: usize,
) -> Result<Element, ParseError> {
    let tag: &[u8] = start;
    let content_start = content_end
        .checked_sub(tag.len())
        .ok_or(ParseError::Layout { position: content_end })?;
    if source.as_bytes().get(content_start..content_end) != Some(tag) {
        return Err(ParseError::Layout {
            position: content_start,
        });
    }
    let text = |range: Range<usize>| &source[content_start + range.start..content_start + range.end];

    let name = start.name();
    let name_len = name.as_ref().len();
    let (resolved, _) = reader.resolve_element(name);
    let namespace = match resolved {
        ResolveResult::Bound(namespace) => {
            Some(String::from_utf8_lossy(namespace.as_ref()).into_owned())
        }
        _ => None,
    };
    let (prefix, local_name) = match text(0..name_len).split_once(':') {
        Some((prefix, local_name)) => (Some(prefix.to_string()), local_name.to_string()),
        None => (None, text(0..name_len).to_string()),
    };

    let parsed = start
        .attributes()
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| ParseError::Attribute {
            position: content_start,
            source,
        })?;
    let spans = attribute_name_spans(tag, name_len);
    if spans.len() != parsed.len() {
        return Err(ParseError::Layout {
            position: content_start,
        });
    }

    let mut attributes = Vec::with_capacity(parsed.len());
    for (attribute, span) in parsed.iter().zip(spans) {
        if attribute.key.as_ref() != &tag[span.clone()] {
            return Err(ParseError::Layout {
                position: content_start + span.start,
            });
        }
        attributes.push(Attribute {
            name: text(span.clone()).to_string(),
            value: String::from_utf8_lossy(&attribute.value).into_owned(),
            name_span: content_start + span.start..content_start + span.end,
        });
    }

    Ok(Element {
        prefix,
        local_name,
        namespace,
        attributes: Attributes(attributes),
        children: Vec::new(),
    })
}

/// Byte ranges of attribute names inside tag content, relative to the content.
///
/// The tag has already been validated by quick-xml, so this only needs to
/// step over `name = "value"` pairs.
fn attribute_name_spans(tag: &[u8], name_len: usize) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut at = name_len;

    loop {
        at = skip_whitespace(tag, at);
        if at >= tag.len() {
            break;
        }

        let start = at;
        while at < tag.len() && tag[at] != b'=' && !tag[at].is_ascii_whitespace() {
            at += 1;
        }
        spans.push(start..at);

        at = skip_whitespace(tag, at);
        if tag.get(at) != Some(&b'=') {
            continue;
        }
        at = skip_whitespace(tag, at + 1);
        match tag.get(at) {
            Some(&quote @ (b'"' | b'\'')) => {
                at = tag[at + 1..]
                    .iter()
                    .position(|&b| b == quote)
                    .map_or(tag.len(), |offset| at + offset + 2);
            }
            _ => {
                while at < tag.len() && !tag[at].is_ascii_whitespace() {
                    at += 1;
                }
            }
        }
    }

    spans
}

fn skip_whitespace(tag: &[u8], mut at: usize) -> usize {
    while at < tag.len() && tag[at].is_ascii_whitespace() {
        at += 1;
    }
    at
}
