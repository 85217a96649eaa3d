#![forbid(unsafe_code)]

//! Build an owned [`Document`] from `quick-xml` events.
//!
//! The adapter performs the parts of XML 1.0 processing a tokenizer leaves
//! out: end-of-line normalization, attribute-value normalization, merging
//! of adjacent text and CDATA, and namespace resolution.

use crate::document::{Document, XmlDeclaration};
use crate::node::{Attribute, Element, NamespaceDecl, QName, XmlNode};
use quick_xml::events::{BytesDecl, BytesStart, Event};
use quick_xml::Reader;
use sigwrap_core::Error;
use std::borrow::Cow;

/// Parse XML bytes (UTF-8) into a document.
pub fn parse(data: &[u8]) -> Result<Document, Error> {
    let text = std::str::from_utf8(data)
        .map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))?;
    parse_str(text)
}

/// Parse XML text into a document.
pub fn parse_str(text: &str) -> Result<Document, Error> {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);
    let normalized = normalize_line_endings(text);

    let mut reader = Reader::from_str(&normalized);
    reader.config_mut().trim_text(false);

    let mut builder = TreeBuilder::default();
    loop {
        match reader.read_event() {
            Ok(Event::Decl(d)) => builder.declaration = Some(read_declaration(&d)?),
            Ok(Event::DocType(t)) => builder.doctype = Some(decode(&t)?.trim().to_owned()),
            Ok(Event::Start(e)) => {
                let el = read_element(&e)?;
                builder.open(el)?;
            }
            Ok(Event::Empty(e)) => {
                let el = read_element(&e)?;
                builder.append(XmlNode::Element(el))?;
            }
            Ok(Event::End(_)) => builder.close()?,
            Ok(Event::Text(t)) => builder.text(decode(&t)?)?,
            Ok(Event::CData(c)) => builder.cdata(decode(&c)?)?,
            Ok(Event::Comment(c)) => builder.append(XmlNode::Comment(decode(&c)?.to_owned()))?,
            Ok(Event::PI(pi)) => {
                let target = decode(pi.target())?.to_owned();
                let data = decode(pi.content())?.trim_start().to_owned();
                builder.append(XmlNode::ProcessingInstruction { target, data })?;
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(Error::XmlParse(format!(
                    "at byte {}: {e}",
                    reader.buffer_position()
                )))
            }
        }
    }

    let doc = builder.finish()?;
    tracing::trace!(elements = doc.elements().len(), "parsed document");
    Ok(doc)
}

/// XML 1.0 §2.11: CRLF and lone CR become LF before parsing.
fn normalize_line_endings(text: &str) -> Cow<'_, str> {
    if !text.contains('\r') {
        return Cow::Borrowed(text);
    }
    Cow::Owned(text.replace("\r\n", "\n").replace('\r', "\n"))
}

/// XML 1.0 §3.3.3 for CDATA attributes: literal whitespace characters
/// become spaces; character references survive as written.
fn normalize_attribute_value(raw: &str) -> Result<String, Error> {
    let spaced = raw.replace(['\t', '\n', '\r'], " ");
    unescape(&spaced)
}

fn unescape(raw: &str) -> Result<String, Error> {
    quick_xml::escape::unescape(raw)
        .map(Cow::into_owned)
        .map_err(|e| Error::XmlParse(format!("bad entity or character reference: {e}")))
}

fn decode(bytes: &[u8]) -> Result<&str, Error> {
    std::str::from_utf8(bytes).map_err(|e| Error::XmlParse(format!("invalid UTF-8: {e}")))
}

fn read_declaration(d: &BytesDecl<'_>) -> Result<XmlDeclaration, Error> {
    let field = |v: Option<Result<Cow<'_, [u8]>, quick_xml::Error>>| -> Result<Option<String>, Error> {
        match v {
            None => Ok(None),
            Some(Ok(bytes)) => Ok(Some(decode(&bytes)?.to_owned())),
            Some(Err(e)) => Err(Error::XmlParse(format!("XML declaration: {e}"))),
        }
    };
    let version = d
        .version()
        .map_err(|e| Error::XmlParse(format!("XML declaration: {e}")))?;
    Ok(XmlDeclaration {
        version: decode(&version)?.to_owned(),
        encoding: field(d.encoding())?,
        standalone: field(d.standalone())?,
    })
}

fn read_element(e: &BytesStart<'_>) -> Result<Element, Error> {
    let name = e.name();
    let qualified = decode(name.as_ref())?;
    let mut el = Element::new(QName::parse(qualified));

    for attr in e.attributes() {
        let attr = attr.map_err(|err| Error::XmlParse(format!("attribute on <{qualified}>: {err}")))?;
        let key = decode(attr.key.as_ref())?;
        let value = normalize_attribute_value(decode(&attr.value)?)?;
        if key == "xmlns" {
            el.namespace_decls.push(NamespaceDecl { prefix: None, uri: value });
        } else if let Some(prefix) = key.strip_prefix("xmlns:") {
            el.namespace_decls.push(NamespaceDecl {
                prefix: Some(prefix.to_owned()),
                uri: value,
            });
        } else {
            el.attributes.push(Attribute {
                name: QName::parse(key),
                value,
            });
        }
    }
    Ok(el)
}

#[derive(Default)]
struct TreeBuilder {
    declaration: Option<XmlDeclaration>,
    doctype: Option<String>,
    prolog: Vec<XmlNode>,
    root: Option<Element>,
    epilog: Vec<XmlNode>,
    stack: Vec<Element>,
}

impl TreeBuilder {
    fn open(&mut self, el: Element) -> Result<(), Error> {
        if self.stack.is_empty() && self.root.is_some() {
            return Err(Error::XmlParse("multiple root elements".into()));
        }
        self.stack.push(el);
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        let el = self
            .stack
            .pop()
            .ok_or_else(|| Error::XmlParse("unexpected end tag".into()))?;
        self.append(XmlNode::Element(el))
    }

    fn text(&mut self, raw: &str) -> Result<(), Error> {
        if self.stack.is_empty() {
            if raw.trim().is_empty() {
                return Ok(());
            }
            return Err(Error::XmlParse("text outside the root element".into()));
        }
        let text = unescape(raw)?;
        self.append(XmlNode::Text(text))
    }

    fn cdata(&mut self, text: &str) -> Result<(), Error> {
        if self.stack.is_empty() {
            return Err(Error::XmlParse("CDATA outside the root element".into()));
        }
        self.append(XmlNode::Text(text.to_owned()))
    }

    fn append(&mut self, node: XmlNode) -> Result<(), Error> {
        if let Some(parent) = self.stack.last_mut() {
            match (parent.children.last_mut(), node) {
                (Some(XmlNode::Text(prev)), XmlNode::Text(t)) => prev.push_str(&t),
                (_, node) => parent.children.push(node),
            }
            return Ok(());
        }
        match node {
            XmlNode::Element(el) => {
                if self.root.is_some() {
                    return Err(Error::XmlParse("multiple root elements".into()));
                }
                self.root = Some(el);
            }
            XmlNode::Text(_) => {
                return Err(Error::XmlParse("text outside the root element".into()));
            }
            other if self.root.is_none() => self.prolog.push(other),
            other => self.epilog.push(other),
        }
        Ok(())
    }

    fn finish(self) -> Result<Document, Error> {
        if let Some(open) = self.stack.last() {
            return Err(Error::XmlParse(format!(
                "unclosed element <{}>",
                open.name.qualified()
            )));
        }
        let root = self
            .root
            .ok_or_else(|| Error::XmlParse("no root element".into()))?;
        Document::from_parts(self.declaration, self.doctype, self.prolog, root, self.epilog).map_err(
            |e| match e {
                Error::XmlStructure(msg) => Error::XmlParse(msg),
                other => other,
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwrap_core::ns;

    #[test]
    fn test_preserves_prefixes_and_attribute_order() {
        let doc = parse_str(
            r#"<samlp:Response xmlns:samlp="urn:oasis:names:tc:SAML:2.0:protocol" z="1" ID="r1" a="2"/>"#,
        )
        .unwrap();
        let root = doc.root_element();
        assert_eq!(root.name.prefix.as_deref(), Some("samlp"));
        assert_eq!(root.name.namespace_uri(), ns::SAML2_PROTOCOL);
        let names: Vec<String> = root.attributes.iter().map(|a| a.name.qualified()).collect();
        assert_eq!(names, ["z", "ID", "a"]);
        assert_eq!(root.namespace_decls.len(), 1);
    }

    #[test]
    fn test_in_scope_namespaces() {
        let doc = parse_str(r#"<a xmlns="urn:d" xmlns:p="urn:p"><b xmlns=""><p:c/></b></a>"#).unwrap();
        let c = doc.find_element("urn:p", "c").unwrap();
        let c = doc.element(&c).unwrap();
        assert_eq!(c.in_scope().get("p").map(String::as_str), Some("urn:p"));
        assert!(c.in_scope().get("").is_none());
        let b = doc.find_element("", "b").unwrap();
        assert!(doc.element(&b).is_some());
    }

    #[test]
    fn test_line_endings_and_character_references() {
        let doc = parse_str("<a>x\r\ny\rz&#13;</a>").unwrap();
        assert_eq!(doc.root_element().text(), "x\ny\nz\r");
    }

    #[test]
    fn test_attribute_value_normalization() {
        let doc = parse_str("<a v=\"1\t2\n3&#10;4\"/>").unwrap();
        assert_eq!(doc.root_element().attribute("v"), Some("1 2 3\n4"));
    }

    #[test]
    fn test_cdata_merges_into_text() {
        let doc = parse_str("<a>x<![CDATA[<y>]]>z</a>").unwrap();
        let root = doc.root_element();
        assert_eq!(root.children.len(), 1);
        assert_eq!(root.text(), "x<y>z");
    }

    #[test]
    fn test_prolog_and_epilog() {
        let doc = parse_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<!--head--><?pi data?>\n<a/>\n<!--tail-->").unwrap();
        let decl = doc.declaration.as_ref().unwrap();
        assert_eq!(decl.version, "1.0");
        assert_eq!(decl.encoding.as_deref(), Some("UTF-8"));
        assert_eq!(doc.prolog().len(), 2);
        assert_eq!(doc.epilog().len(), 1);
        assert!(matches!(
            &doc.prolog()[1],
            XmlNode::ProcessingInstruction { target, data } if target == "pi" && data == "data"
        ));
    }

    #[test]
    fn test_parse_errors() {
        assert!(matches!(parse_str("<a><b></a>"), Err(Error::XmlParse(_))));
        assert!(matches!(parse_str("<a/><b/>"), Err(Error::XmlParse(_))));
        assert!(matches!(parse_str("<p:a/>"), Err(Error::XmlParse(_))));
        assert!(matches!(parse_str("<a>&undefined;</a>"), Err(Error::XmlParse(_))));
        assert!(matches!(parse_str("<!--only-->"), Err(Error::XmlParse(_))));
        assert!(matches!(parse(&[0x3c, 0xff, 0x3e]), Err(Error::XmlParse(_))));
    }
}
