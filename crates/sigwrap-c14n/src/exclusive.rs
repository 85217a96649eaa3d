#![forbid(unsafe_code)]

//! Exclusive Canonical XML 1.0 (exc-C14N).
//!
//! Algorithm URI: `http://www.w3.org/2001/10/xml-exc-c14n#`
//! With comments: `http://www.w3.org/2001/10/xml-exc-c14n#WithComments`
//!
//! The key difference from inclusive C14N: only "visibly utilized" namespace
//! declarations are output. A namespace is visibly utilized if its prefix is
//! used by the element's tag name or by one of its attributes. Prefixes in
//! the InclusiveNamespaces PrefixList are treated the inclusive way.

use crate::render::{NamespacePolicy, NsDecl, Rendered, Renderer};
use sigwrap_core::Error;
use sigwrap_xml::{Document, Element, NodeSet};
use std::collections::BTreeSet;

/// Canonicalize a node set using Exclusive C14N 1.0.
///
/// `inclusive_prefixes` is the PrefixList; `#default` names the default
/// namespace.
pub fn canonicalize(
    doc: &Document,
    node_set: &NodeSet,
    with_comments: bool,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    let prefixes = inclusive_prefixes
        .iter()
        .map(|p| if p == "#default" { String::new() } else { p.clone() })
        .collect();
    Renderer::new(doc, node_set, with_comments, Exclusive { prefixes }).render()
}

struct Exclusive {
    prefixes: BTreeSet<String>,
}

impl Exclusive {
    fn decl_for(prefix: &str, el: &Element, rendered: &Rendered) -> Option<NsDecl> {
        match el.in_scope().get(prefix) {
            Some(uri) if rendered.get(prefix) != Some(uri) => Some(NsDecl {
                prefix: prefix.to_owned(),
                uri: uri.clone(),
            }),
            Some(_) => None,
            None if prefix.is_empty() && rendered.get("").is_some_and(|u| !u.is_empty()) => {
                Some(NsDecl {
                    prefix: String::new(),
                    uri: String::new(),
                })
            }
            None => None,
        }
    }
}

impl NamespacePolicy for Exclusive {
    fn namespace_decls(&self, el: &Element, rendered: &Rendered) -> Result<Vec<NsDecl>, Error> {
        let mut utilized: BTreeSet<&str> = BTreeSet::new();
        utilized.insert(el.name.prefix.as_deref().unwrap_or(""));
        for attr in &el.attributes {
            if let Some(p) = attr.name.prefix.as_deref() {
                utilized.insert(p);
            }
        }

        let mut decls = Vec::new();
        for prefix in utilized {
            if prefix == "xml" {
                continue;
            }
            if !prefix.is_empty() && !el.in_scope().contains_key(prefix) {
                return Err(Error::Canonicalization(format!(
                    "prefix '{prefix}' used on <{}> is not declared",
                    el.name.qualified()
                )));
            }
            decls.extend(Self::decl_for(prefix, el, rendered));
        }
        for prefix in &self.prefixes {
            if decls.iter().any(|d| d.prefix == *prefix) {
                continue;
            }
            decls.extend(Self::decl_for(prefix, el, rendered));
        }
        Ok(decls)
    }

    fn inherits_xml_attr(&self, _local: &str) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwrap_xml::parse_str;

    fn exc(xml: &str, prefixes: &[&str]) -> String {
        let doc = parse_str(xml).unwrap();
        let prefixes: Vec<String> = prefixes.iter().map(|p| p.to_string()).collect();
        let out = canonicalize(&doc, &NodeSet::whole_document(false), false, &prefixes).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_unused_namespaces_are_dropped() {
        assert_eq!(
            exc(r#"<r xmlns:u="urn:u" xmlns:a="urn:a"><a:x a:b="1"/></r>"#, &[]),
            r#"<r><a:x xmlns:a="urn:a" a:b="1"></a:x></r>"#
        );
    }

    #[test]
    fn test_declaration_is_not_repeated_below_output_ancestor() {
        assert_eq!(
            exc(r#"<a:r xmlns:a="urn:a"><a:x/></a:r>"#, &[]),
            r#"<a:r xmlns:a="urn:a"><a:x></a:x></a:r>"#
        );
    }

    #[test]
    fn test_prefix_list() {
        assert_eq!(
            exc(r#"<r xmlns:u="urn:u" xmlns="urn:d"><x/></r>"#, &["u"]),
            r#"<r xmlns="urn:d" xmlns:u="urn:u"><x></x></r>"#
        );
        assert_eq!(
            exc(r#"<r xmlns:u="urn:u"><x/></r>"#, &["#default"]),
            r#"<r><x></x></r>"#
        );
    }

    #[test]
    fn test_default_namespace_undeclaration() {
        assert_eq!(
            exc(r#"<r xmlns="urn:d"><x xmlns=""/></r>"#, &[]),
            r#"<r xmlns="urn:d"><x xmlns=""></x></r>"#
        );
    }
}
