#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.0 (C14N 1.0).
//!
//! Algorithm URI: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315`
//! With comments: `http://www.w3.org/TR/2001/REC-xml-c14n-20010315#WithComments`
//!
//! Every output element carries each in-scope namespace declaration that
//! its nearest output ancestor has not already rendered with the same URI.
//! An apex of a document subset therefore carries its whole namespace
//! context, plus the `xml:*` attributes of its omitted ancestors.

use crate::render::{NamespacePolicy, NsDecl, Rendered, Renderer};
use sigwrap_core::Error;
use sigwrap_xml::{Document, Element, NodeSet};

/// Canonicalize a node set using Inclusive C14N 1.0.
pub fn canonicalize(doc: &Document, node_set: &NodeSet, with_comments: bool) -> Result<Vec<u8>, Error> {
    Renderer::new(doc, node_set, with_comments, Inclusive { c14n11: false }).render()
}

pub(crate) struct Inclusive {
    /// C14N 1.1 inherits only `xml:lang` and `xml:space`.
    pub(crate) c14n11: bool,
}

impl NamespacePolicy for Inclusive {
    fn namespace_decls(&self, el: &Element, rendered: &Rendered) -> Result<Vec<NsDecl>, Error> {
        let in_scope = el.in_scope();
        let mut decls: Vec<NsDecl> = in_scope
            .iter()
            .filter(|(prefix, uri)| rendered.get(*prefix) != Some(*uri))
            .map(|(prefix, uri)| NsDecl {
                prefix: prefix.clone(),
                uri: uri.clone(),
            })
            .collect();

        if !in_scope.contains_key("") && rendered.get("").is_some_and(|u| !u.is_empty()) {
            decls.push(NsDecl {
                prefix: String::new(),
                uri: String::new(),
            });
        }
        Ok(decls)
    }

    fn inherits_xml_attr(&self, local: &str) -> bool {
        !self.c14n11 || matches!(local, "lang" | "space")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwrap_xml::parse_str;

    fn c14n(xml: &str) -> String {
        let doc = parse_str(xml).unwrap();
        String::from_utf8(canonicalize(&doc, &NodeSet::whole_document(false), false).unwrap()).unwrap()
    }

    #[test]
    fn test_simple_c14n() {
        // Attributes should be sorted by local name (no namespace)
        assert_eq!(c14n(r#"<root><a b="1" a="2"/></root>"#), r#"<root><a a="2" b="1"></a></root>"#);
    }

    #[test]
    fn test_namespace_rendering() {
        let output = c14n(r#"<root xmlns:b="http://b" xmlns:a="http://a"><a:child/></root>"#);
        assert_eq!(
            output,
            r#"<root xmlns:a="http://a" xmlns:b="http://b"><a:child></a:child></root>"#
        );
    }

    #[test]
    fn test_redundant_declarations_are_dropped() {
        let output = c14n(r#"<r xmlns:a="urn:a"><x xmlns:a="urn:a"><y xmlns:a="urn:b"/></x></r>"#);
        assert_eq!(output, r#"<r xmlns:a="urn:a"><x><y xmlns:a="urn:b"></y></x></r>"#);
    }

    #[test]
    fn test_text_escaping() {
        assert_eq!(c14n(r#"<root>a &amp; b &lt; c &gt; d</root>"#), "<root>a &amp; b &lt; c &gt; d</root>");
        assert_eq!(c14n("<root a=\"x&#9;y&quot;\">&#13;</root>"), "<root a=\"x&#x9;y&quot;\">&#xD;</root>");
    }

    #[test]
    fn test_default_namespace_undeclaration() {
        assert_eq!(
            c14n(r#"<r xmlns="urn:d"><x xmlns=""/></r>"#),
            r#"<r xmlns="urn:d"><x xmlns=""></x></r>"#
        );
        assert_eq!(c14n(r#"<r><x xmlns=""/></r>"#), "<r><x></x></r>");
    }
}
