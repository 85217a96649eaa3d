#![forbid(unsafe_code)]

//! Serialize a [`Document`] back to XML using quick-xml's `Writer`.
//!
//! Values are escaped by hand before they reach the writer so that characters
//! the parser would normalize away (TAB, LF and CR in attribute values, CR in
//! text) survive as character references. Re-parsing the output yields an
//! equal tree.

use crate::document::Document;
use crate::node::{Element, XmlNode};
use quick_xml::events::attributes::Attribute;
use quick_xml::events::{BytesDecl, BytesEnd, BytesPI, BytesStart, BytesText, Event};
use quick_xml::name::QName as RawName;
use sigwrap_core::Error;
use std::borrow::Cow;

pub struct XmlWriter {
    writer: quick_xml::Writer<Vec<u8>>,
}

impl XmlWriter {
    /// Create a new XML writer.
    pub fn new() -> Self {
        Self {
            writer: quick_xml::Writer::new(Vec::new()),
        }
    }

    /// Write a whole document: declaration, DOCTYPE, top-level nodes.
    pub fn write_document(&mut self, doc: &Document) -> Result<(), Error> {
        let mut first = true;
        if let Some(decl) = &doc.declaration {
            self.event(Event::Decl(BytesDecl::new(
                &decl.version,
                decl.encoding.as_deref(),
                decl.standalone.as_deref(),
            )))?;
            first = false;
        }
        if let Some(doctype) = &doc.doctype {
            self.separator(&mut first);
            self.event(Event::DocType(BytesText::from_escaped(doctype.as_str())))?;
        }
        for node in doc.prolog() {
            self.separator(&mut first);
            self.write_node(node)?;
        }
        self.separator(&mut first);
        self.write_element(doc.root_element())?;
        for node in doc.epilog() {
            self.separator(&mut first);
            self.write_node(node)?;
        }
        Ok(())
    }

    /// Write one node and its descendants.
    pub fn write_node(&mut self, node: &XmlNode) -> Result<(), Error> {
        match node {
            XmlNode::Element(el) => self.write_element(el),
            XmlNode::Text(t) => self.event(Event::Text(BytesText::from_escaped(escape_text(t)))),
            XmlNode::Comment(c) => self.event(Event::Comment(BytesText::from_escaped(c.as_str()))),
            XmlNode::ProcessingInstruction { target, data } => {
                let content = if data.is_empty() {
                    target.clone()
                } else {
                    format!("{target} {data}")
                };
                self.event(Event::PI(BytesPI::new(content)))
            }
        }
    }

    fn write_element(&mut self, el: &Element) -> Result<(), Error> {
        let qualified = el.name.qualified();
        let mut start = BytesStart::new(qualified.as_str());

        for decl in &el.namespace_decls {
            let key = match &decl.prefix {
                Some(p) => format!("xmlns:{p}"),
                None => "xmlns".to_owned(),
            };
            let value = escape_attr(&decl.uri);
            start.push_attribute(Attribute {
                key: RawName(key.as_bytes()),
                value: Cow::Borrowed(value.as_bytes()),
            });
        }
        for attr in &el.attributes {
            let key = attr.name.qualified();
            let value = escape_attr(&attr.value);
            start.push_attribute(Attribute {
                key: RawName(key.as_bytes()),
                value: Cow::Borrowed(value.as_bytes()),
            });
        }

        if el.children.is_empty() {
            return self.event(Event::Empty(start));
        }
        self.event(Event::Start(start))?;
        for child in &el.children {
            self.write_node(child)?;
        }
        self.event(Event::End(BytesEnd::new(qualified.as_str())))
    }

    fn separator(&mut self, first: &mut bool) {
        if !*first {
            self.writer.get_mut().push(b'\n');
        }
        *first = false;
    }

    fn event(&mut self, event: Event<'_>) -> Result<(), Error> {
        self.writer
            .write_event(event)
            .map_err(|e| Error::Other(format!("XML write failed: {e}")))
    }

    /// Finish writing and return the XML bytes.
    pub fn into_bytes(self) -> Vec<u8> {
        self.writer.into_inner()
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> Result<String, Error> {
        String::from_utf8(self.into_bytes())
            .map_err(|e| Error::Other(format!("XML output is not UTF-8: {e}")))
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

/// Serialize a document to bytes.
pub fn to_bytes(doc: &Document) -> Result<Vec<u8>, Error> {
    let mut w = XmlWriter::new();
    w.write_document(doc)?;
    Ok(w.into_bytes())
}

/// Serialize a document to a string.
pub fn to_string(doc: &Document) -> Result<String, Error> {
    let mut w = XmlWriter::new();
    w.write_document(doc)?;
    w.into_string()
}

fn escape_text(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

fn escape_attr(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#9;"),
            '\n' => out.push_str("&#10;"),
            '\r' => out.push_str("&#13;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_str;

    #[test]
    fn test_round_trip_preserves_tree() {
        let src = "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!--c-->\n<r xmlns=\"urn:d\" xmlns:p=\"urn:p\" b=\"1\" a=\"x&#9;&#10;y&quot;\"><p:x>t&amp;&lt;&#13;</p:x><e/><?pi data?></r>";
        let doc = parse_str(src).unwrap();
        let out = to_string(&doc).unwrap();
        let again = parse_str(&out).unwrap();
        assert_eq!(doc, again);
    }

    #[test]
    fn test_output_shape() {
        let doc = parse_str(r#"<r z="2" a="1"><e></e>x &gt; y</r>"#).unwrap();
        assert_eq!(to_string(&doc).unwrap(), r#"<r z="2" a="1"><e/>x &gt; y</r>"#);
    }
}
