#![forbid(unsafe_code)]

//! Shared rendering for C14N output.
//!
//! [`Renderer`] walks a document in document order and writes the canonical
//! form of every node in the node set. The variants differ only in which
//! namespace declarations an output element carries and whether `xml:*`
//! attributes of omitted ancestors are pulled in; both decisions live behind
//! [`NamespacePolicy`].

use crate::escape;
use sigwrap_core::{ns, Error};
use sigwrap_xml::{Document, Element, NodePath, NodeSet, XmlNode};
use std::collections::BTreeMap;

/// A namespace declaration to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NsDecl {
    /// The prefix ("" for default namespace).
    pub prefix: String,
    /// The namespace URI ("" undeclares the default namespace).
    pub uri: String,
}

impl NsDecl {
    /// Render this namespace declaration to a string.
    pub fn render(&self) -> String {
        if self.prefix.is_empty() {
            format!(" xmlns=\"{}\"", escape::escape_attr(&self.uri))
        } else {
            format!(
                " xmlns:{}=\"{}\"",
                self.prefix,
                escape::escape_attr(&self.uri)
            )
        }
    }
}

impl Ord for NsDecl {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Default namespace (empty prefix) sorts first.
        match (self.prefix.is_empty(), other.prefix.is_empty()) {
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            _ => self.prefix.cmp(&other.prefix),
        }
    }
}

impl PartialOrd for NsDecl {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// An attribute to be rendered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attr {
    /// The namespace URI of the attribute ("" for no namespace).
    pub ns_uri: String,
    pub local_name: String,
    /// The qualified name (prefix:local or just local).
    pub qualified_name: String,
    pub value: String,
}

impl Attr {
    /// Render this attribute to a string.
    pub fn render(&self) -> String {
        format!(
            " {}=\"{}\"",
            self.qualified_name,
            escape::escape_attr(&self.value)
        )
    }
}

impl Ord for Attr {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        // Attributes with no namespace come before those with a namespace.
        match (self.ns_uri.is_empty(), other.ns_uri.is_empty()) {
            (true, true) => self.local_name.cmp(&other.local_name),
            (true, false) => std::cmp::Ordering::Less,
            (false, true) => std::cmp::Ordering::Greater,
            (false, false) => self
                .ns_uri
                .cmp(&other.ns_uri)
                .then(self.local_name.cmp(&other.local_name)),
        }
    }
}

impl PartialOrd for Attr {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Prefix to URI of the declarations rendered by the nearest output
/// ancestor (`""` keys the default namespace).
pub type Rendered = BTreeMap<String, String>;

/// The variant-specific decisions of a canonicalization algorithm.
pub trait NamespacePolicy {
    /// Declarations to emit on an output element, given what the nearest
    /// output ancestor already rendered.
    fn namespace_decls(&self, el: &Element, rendered: &Rendered) -> Result<Vec<NsDecl>, Error>;

    /// Whether `xml:{local}` attributes of omitted ancestors are inherited
    /// by an output element whose parent is not in the node set.
    fn inherits_xml_attr(&self, local: &str) -> bool;
}

pub struct Renderer<'a, P> {
    doc: &'a Document,
    node_set: &'a NodeSet,
    with_comments: bool,
    policy: P,
    out: Vec<u8>,
}

impl<'a, P: NamespacePolicy> Renderer<'a, P> {
    pub fn new(doc: &'a Document, node_set: &'a NodeSet, with_comments: bool, policy: P) -> Self {
        Self {
            doc,
            node_set,
            with_comments,
            policy,
            out: Vec::new(),
        }
    }

    pub fn render(mut self) -> Result<Vec<u8>, Error> {
        let doc = self.doc;
        let root_index = doc.prolog().len();
        for (i, node) in doc.prolog().iter().enumerate() {
            if self.top_level_visible(node, i) {
                self.write_leaf(node);
                self.out.push(b'\n');
            }
        }
        self.element(doc.root_element(), &doc.root_path(), &Rendered::new())?;
        for (i, node) in doc.epilog().iter().enumerate() {
            if self.top_level_visible(node, root_index + 1 + i) {
                self.out.push(b'\n');
                self.write_leaf(node);
            }
        }
        Ok(self.out)
    }

    fn top_level_visible(&self, node: &XmlNode, index: usize) -> bool {
        let path = NodePath::from_indices(vec![index]);
        match node {
            XmlNode::Comment(_) => self.with_comments && self.node_set.contains(&path, true),
            XmlNode::ProcessingInstruction { .. } => self.node_set.contains(&path, false),
            XmlNode::Element(_) | XmlNode::Text(_) => false,
        }
    }

    fn element(&mut self, el: &Element, path: &NodePath, rendered: &Rendered) -> Result<(), Error> {
        if el.name.prefix.as_deref().is_some_and(|p| el.lookup_namespace(Some(p)).is_none()) {
            return Err(Error::Canonicalization(format!(
                "prefix of <{}> has no in-scope binding",
                el.name.qualified()
            )));
        }

        if !self.node_set.contains(path, false) {
            return self.children(el, path, rendered);
        }

        let mut decls = self.policy.namespace_decls(el, rendered)?;
        decls.sort();
        let mut child_rendered = rendered.clone();
        for d in &decls {
            if d.uri.is_empty() {
                child_rendered.remove(&d.prefix);
            } else {
                child_rendered.insert(d.prefix.clone(), d.uri.clone());
            }
        }

        let mut attrs: Vec<Attr> = el
            .attributes
            .iter()
            .map(|a| Attr {
                ns_uri: a.name.namespace_uri().to_owned(),
                local_name: a.name.local.clone(),
                qualified_name: a.name.qualified(),
                value: a.value.clone(),
            })
            .collect();
        if self.parent_omitted(path) {
            let extra = self.inherited_xml_attrs(path, &attrs);
            attrs.extend(extra);
        }
        attrs.sort();

        let name = el.name.qualified();
        self.out.push(b'<');
        self.out.extend_from_slice(name.as_bytes());
        for d in &decls {
            self.out.extend_from_slice(d.render().as_bytes());
        }
        for a in &attrs {
            self.out.extend_from_slice(a.render().as_bytes());
        }
        self.out.push(b'>');

        self.children(el, path, &child_rendered)?;

        self.out.extend_from_slice(b"</");
        self.out.extend_from_slice(name.as_bytes());
        self.out.push(b'>');
        Ok(())
    }

    fn children(&mut self, el: &Element, path: &NodePath, rendered: &Rendered) -> Result<(), Error> {
        for (idx, child) in el.children.iter().enumerate() {
            let child_path = path.child(idx);
            match child {
                XmlNode::Element(c) => self.element(c, &child_path, rendered)?,
                XmlNode::Comment(_) => {
                    if self.with_comments && self.node_set.contains(&child_path, true) {
                        self.write_leaf(child);
                    }
                }
                XmlNode::Text(_) | XmlNode::ProcessingInstruction { .. } => {
                    if self.node_set.contains(&child_path, false) {
                        self.write_leaf(child);
                    }
                }
            }
        }
        Ok(())
    }

    fn write_leaf(&mut self, node: &XmlNode) {
        match node {
            XmlNode::Text(t) => self.out.extend_from_slice(escape::escape_text(t).as_bytes()),
            XmlNode::Comment(c) => {
                self.out.extend_from_slice(b"<!--");
                self.out.extend_from_slice(c.as_bytes());
                self.out.extend_from_slice(b"-->");
            }
            XmlNode::ProcessingInstruction { target, data } => {
                self.out.extend_from_slice(b"<?");
                self.out.extend_from_slice(target.as_bytes());
                if !data.is_empty() {
                    self.out.push(b' ');
                    self.out.extend_from_slice(data.as_bytes());
                }
                self.out.extend_from_slice(b"?>");
            }
            XmlNode::Element(_) => {}
        }
    }

    /// True when the element's parent element exists but is not output.
    fn parent_omitted(&self, path: &NodePath) -> bool {
        match path.parent() {
            Some(parent) if self.doc.element(&parent).is_some() => {
                !self.node_set.contains(&parent, false)
            }
            _ => false,
        }
    }

    /// `xml:*` attributes of ancestors, nearest first wins, minus those the
    /// element already carries.
    fn inherited_xml_attrs(&self, path: &NodePath, existing: &[Attr]) -> Vec<Attr> {
        let mut inherited: BTreeMap<String, String> = BTreeMap::new();
        for ancestor in self.doc.ancestors(path).into_iter().rev() {
            for attr in &ancestor.attributes {
                if attr.name.namespace_uri() == ns::XML
                    && self.policy.inherits_xml_attr(&attr.name.local)
                    && !inherited.contains_key(&attr.name.local)
                {
                    inherited.insert(attr.name.local.clone(), attr.value.clone());
                }
            }
        }
        inherited
            .into_iter()
            .filter(|(local, _)| {
                !existing
                    .iter()
                    .any(|a| a.ns_uri == ns::XML && a.local_name == *local)
            })
            .map(|(local, value)| Attr {
                ns_uri: ns::XML.to_owned(),
                qualified_name: format!("xml:{local}"),
                local_name: local,
                value,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ns_decl_order() {
        let mut decls = vec![
            NsDecl { prefix: "b".into(), uri: "urn:b".into() },
            NsDecl { prefix: "".into(), uri: "urn:d".into() },
            NsDecl { prefix: "a".into(), uri: "urn:a".into() },
        ];
        decls.sort();
        let prefixes: Vec<&str> = decls.iter().map(|d| d.prefix.as_str()).collect();
        assert_eq!(prefixes, ["", "a", "b"]);
        assert_eq!(decls[0].render(), " xmlns=\"urn:d\"");
    }

    #[test]
    fn test_attr_order() {
        let attr = |ns_uri: &str, local: &str| Attr {
            ns_uri: ns_uri.into(),
            local_name: local.into(),
            qualified_name: local.into(),
            value: String::new(),
        };
        let mut attrs = vec![attr("urn:b", "a"), attr("", "z"), attr("urn:a", "z"), attr("", "b")];
        attrs.sort();
        let order: Vec<(&str, &str)> = attrs
            .iter()
            .map(|a| (a.ns_uri.as_str(), a.local_name.as_str()))
            .collect();
        assert_eq!(order, [("", "b"), ("", "z"), ("urn:a", "z"), ("urn:b", "a")]);
    }
}
