//! XML fragment helpers shared by the XLIFF and TMX ingestors.
//!
//! `pure_text` extracts plain text: recurse into `<pc>`/`<mrk>`/`<hi>`, skip
//! `<cp>` entirely, keep everything else. `build_wrapper_element` synthesizes
//! a merged-unit `<source>`/`<target>` wrapper using `quick_xml::Writer`.

use std::collections::HashMap;
use std::io::Cursor;

use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Reader;
use quick_xml::Writer;

use crate::error::{HtmError, Result};

/// A minimal, attribute/child-queryable DOM node built from a SAX walk.
///
/// `raw` is the exact source slice for this element (tags, attributes, and
/// inner markup verbatim) — used to populate `Entry::element` without
/// re-serializing through the writer and risking attribute-order or
/// whitespace drift.
#[derive(Debug, Clone, Default)]
pub struct Node {
    pub name: String,
    pub attrs: HashMap<String, String>,
    pub children: Vec<Node>,
    /// Concatenation of this node's own direct text/CDATA children (not its
    /// descendants' text) — good enough for `<note>`, `<prop>`, `<meta>`.
    pub text: String,
    pub raw: String,
}

impl Node {
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attrs.get(key).map(String::as_str)
    }

    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Node> {
        self.children.iter().find(|c| c.name == name)
    }

    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Node> {
        self.children.iter().filter(move |c| c.name == name)
    }
}

fn local_name(start: &BytesStart<'_>) -> String {
    String::from_utf8_lossy(start.local_name().as_ref()).to_string()
}

fn attrs_of(start: &BytesStart<'_>) -> HashMap<String, String> {
    let mut attrs = HashMap::new();
    for attribute in start.attributes().flatten() {
        let key = String::from_utf8_lossy(attribute.key.local_name().as_ref()).to_string();
        let value = attribute
            .unescape_value()
            .map(|v| v.to_string())
            .unwrap_or_default();
        attrs.insert(key, value);
    }
    attrs
}

fn slice_raw(source: &str, start: usize, end: usize) -> String {
    source.get(start..end).unwrap_or_default().to_string()
}

/// Parse `xml` into a [`Node`] tree rooted at its single top-level element.
pub fn parse_document(xml: &str) -> Result<Node> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(false);
    let mut buf = Vec::new();

    loop {
        let start_pos = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf).map_err(doc_err)?;
        match event {
            Event::Start(e) => {
                let owned = e.into_owned();
                return parse_children(&mut reader, xml, &owned, start_pos);
            }
            Event::Empty(e) => {
                let end_pos = reader.buffer_position() as usize;
                return Ok(Node {
                    name: local_name(&e),
                    attrs: attrs_of(&e),
                    children: Vec::new(),
                    text: String::new(),
                    raw: slice_raw(xml, start_pos, end_pos),
                });
            }
            Event::Eof => {
                return Err(HtmError::UnsupportedFormat {
                    path: String::new(),
                    reason: "document has no root element".to_string(),
                })
            }
            _ => {}
        }
        buf.clear();
    }
}

fn parse_children(
    reader: &mut Reader<&[u8]>,
    source: &str,
    start: &BytesStart<'static>,
    start_pos: usize,
) -> Result<Node> {
    let name = local_name(start);
    let attrs = attrs_of(start);
    let mut children = Vec::new();
    let mut text = String::new();
    let mut buf = Vec::new();
    let end_pos;

    loop {
        let child_pos = reader.buffer_position() as usize;
        let event = reader.read_event_into(&mut buf).map_err(doc_err)?;
        match event {
            Event::Start(e) => {
                let owned = e.into_owned();
                children.push(parse_children(reader, source, &owned, child_pos)?);
            }
            Event::Empty(e) => {
                let close_pos = reader.buffer_position() as usize;
                children.push(Node {
                    name: local_name(&e),
                    attrs: attrs_of(&e),
                    children: Vec::new(),
                    text: String::new(),
                    raw: slice_raw(source, child_pos, close_pos),
                });
            }
            Event::Text(t) => {
                if let Ok(unescaped) = t.unescape() {
                    text.push_str(&unescaped);
                }
            }
            Event::CData(t) => {
                text.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Event::End(_) => {
                end_pos = reader.buffer_position() as usize;
                break;
            }
            Event::Eof => {
                end_pos = reader.buffer_position() as usize;
                break;
            }
            _ => {}
        }
        buf.clear();
    }

    Ok(Node {
        name,
        attrs,
        children,
        text,
        raw: slice_raw(source, start_pos, end_pos),
    })
}

fn doc_err(source: quick_xml::Error) -> HtmError {
    HtmError::UnsupportedFormat {
        path: String::new(),
        reason: source.to_string(),
    }
}

/// Extract the plain-text content of an XML fragment, recursing into inline
/// elements and dropping `<cp>` (code-point placeholder) content entirely.
#[must_use]
pub fn pure_text(xml_fragment: &str) -> String {
    let mut reader = Reader::from_str(xml_fragment);
    reader.config_mut().trim_text(false);

    let mut out = String::new();
    let mut skip_depth: u32 = 0;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                if e.local_name().as_ref() == b"cp" {
                    skip_depth += 1;
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"cp" && skip_depth > 0 {
                    skip_depth -= 1;
                }
            }
            Ok(Event::Text(t)) => {
                if skip_depth == 0 {
                    if let Ok(text) = t.unescape() {
                        out.push_str(&text);
                    }
                }
            }
            Ok(Event::CData(t)) => {
                if skip_depth == 0 {
                    out.push_str(&String::from_utf8_lossy(&t.into_inner()));
                }
            }
            Ok(Event::Eof) => break,
            Err(_) => break,
            _ => {}
        }
        buf.clear();
    }

    out
}

/// Slice the inner XML of a single-root fragment, e.g. turning
/// `<source>foo<pc id="1">bar</pc></source>` into `foo<pc id="1">bar</pc>`.
///
/// Used when concatenating several segments' `<source>`/`<target>` content
/// into one merged wrapper; a malformed or empty fragment yields `""`.
#[must_use]
pub fn inner_xml(element: &str) -> &str {
    let Some(start) = element.find('>').map(|i| i + 1) else {
        return "";
    };
    let Some(end) = element.rfind("</") else {
        return "";
    };
    if end >= start {
        &element[start..end]
    } else {
        ""
    }
}

/// Build a synthetic `<tag>...</tag>` wrapper from the inner XML of several
/// element fragments, preserving their markup without re-escaping it.
pub fn build_wrapper_element(tag: &str, elements: &[String]) -> Result<String> {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .map_err(|e| write_err(tag, e))?;

    for element in elements {
        let inner = inner_xml(element);
        if !inner.is_empty() {
            writer
                .write_event(Event::Text(BytesText::from_escaped(inner)))
                .map_err(|e| write_err(tag, e))?;
        }
    }

    writer
        .write_event(Event::End(BytesEnd::new(tag)))
        .map_err(|e| write_err(tag, e))?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| HtmError::HydrationError {
        id: tag.to_string(),
        reason: e.to_string(),
    })
}

fn write_err(tag: &str, source: quick_xml::Error) -> HtmError {
    HtmError::HydrationError {
        id: tag.to_string(),
        reason: source.to_string(),
    }
}
