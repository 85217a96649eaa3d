#![forbid(unsafe_code)]

//! Node types of the owned XML tree.

use sigwrap_core::ns;
use std::collections::BTreeMap;

/// A qualified name as written in the source, plus its resolved namespace.
///
/// `namespace` is derived from the declarations in scope and is rewritten by
/// [`crate::Document::rescope`]; editing it by hand has no lasting effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QName {
    pub prefix: Option<String>,
    pub local: String,
    pub namespace: Option<String>,
}

impl QName {
    /// An unprefixed name. The namespace is resolved on the next rescope.
    pub fn local(local: &str) -> Self {
        Self {
            prefix: None,
            local: local.to_owned(),
            namespace: None,
        }
    }

    /// A name with an explicit prefix (or none).
    pub fn prefixed(prefix: Option<&str>, local: &str) -> Self {
        Self {
            prefix: prefix.map(str::to_owned),
            local: local.to_owned(),
            namespace: None,
        }
    }

    /// Split a `prefix:local` string.
    pub fn parse(qualified: &str) -> Self {
        match qualified.split_once(':') {
            Some((prefix, local)) => Self::prefixed(Some(prefix), local),
            None => Self::local(qualified),
        }
    }

    /// The name as it appears in markup.
    pub fn qualified(&self) -> String {
        match &self.prefix {
            Some(p) => format!("{p}:{}", self.local),
            None => self.local.clone(),
        }
    }

    /// Namespace URI, empty when the name is in no namespace.
    pub fn namespace_uri(&self) -> &str {
        self.namespace.as_deref().unwrap_or("")
    }

    /// True when the name has this namespace URI and local name.
    pub fn is(&self, ns_uri: &str, local: &str) -> bool {
        self.local == local && self.namespace_uri() == ns_uri
    }
}

/// An attribute with a normalized value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: QName,
    pub value: String,
}

impl Attribute {
    pub fn new(qualified: &str, value: &str) -> Self {
        Self {
            name: QName::parse(qualified),
            value: value.to_owned(),
        }
    }
}

/// A namespace declaration written on an element (`xmlns` or `xmlns:p`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceDecl {
    /// `None` for the default namespace.
    pub prefix: Option<String>,
    /// Empty only for the default-namespace undeclaration `xmlns=""`.
    pub uri: String,
}

/// An element node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: QName,
    pub namespace_decls: Vec<NamespaceDecl>,
    pub attributes: Vec<Attribute>,
    pub children: Vec<XmlNode>,
    /// Prefix ("" for the default namespace) to URI, recomputed by rescope.
    pub(crate) in_scope: BTreeMap<String, String>,
}

/// A node of the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum XmlNode {
    Element(Element),
    Text(String),
    Comment(String),
    ProcessingInstruction { target: String, data: String },
}

impl XmlNode {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            XmlNode::Element(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self, XmlNode::Element(_))
    }
}

impl Element {
    /// Create an element with no attributes or children.
    pub fn new(name: QName) -> Self {
        Self {
            name,
            namespace_decls: Vec::new(),
            attributes: Vec::new(),
            children: Vec::new(),
            in_scope: BTreeMap::new(),
        }
    }

    /// In-scope namespace bindings; `""` keys the default namespace.
    ///
    /// The `xml` prefix is implicit and never listed.
    pub fn in_scope(&self) -> &BTreeMap<String, String> {
        &self.in_scope
    }

    /// Resolve a prefix (`None` = default namespace) against the scope.
    pub fn lookup_namespace(&self, prefix: Option<&str>) -> Option<&str> {
        match prefix {
            Some("xml") => Some(ns::XML),
            Some(p) => self.in_scope.get(p).map(String::as_str),
            None => self.in_scope.get("").map(String::as_str),
        }
    }

    /// Value of the un-namespaced attribute `local`.
    pub fn attribute(&self, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.prefix.is_none() && a.name.local == local)
            .map(|a| a.value.as_str())
    }

    /// Value of the attribute with the given namespace and local name.
    pub fn attribute_ns(&self, ns_uri: &str, local: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|a| a.name.is(ns_uri, local))
            .map(|a| a.value.as_str())
    }

    /// Set (or add) the attribute written exactly as `qualified`.
    pub fn set_attribute(&mut self, qualified: &str, value: &str) {
        if let Some(existing) = self
            .attributes
            .iter_mut()
            .find(|a| a.name.qualified() == qualified)
        {
            existing.value = value.to_owned();
        } else {
            self.attributes.push(Attribute::new(qualified, value));
        }
    }

    /// Remove the attribute written exactly as `qualified`.
    pub fn remove_attribute(&mut self, qualified: &str) -> Option<String> {
        let idx = self
            .attributes
            .iter()
            .position(|a| a.name.qualified() == qualified)?;
        Some(self.attributes.remove(idx).value)
    }

    /// Declare a namespace on this element unless the same binding is
    /// already written here.
    pub fn declare_namespace(&mut self, prefix: Option<&str>, uri: &str) {
        let prefix = prefix.map(str::to_owned);
        if let Some(existing) = self.namespace_decls.iter_mut().find(|d| d.prefix == prefix) {
            existing.uri = uri.to_owned();
        } else {
            self.namespace_decls.push(NamespaceDecl {
                prefix,
                uri: uri.to_owned(),
            });
        }
    }

    /// Child elements in document order.
    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(XmlNode::as_element)
    }

    /// First child element with the given namespace and local name.
    pub fn find_child(&self, ns_uri: &str, local: &str) -> Option<&Element> {
        self.child_elements().find(|e| e.name.is(ns_uri, local))
    }

    /// All child elements with the given namespace and local name.
    pub fn find_children<'a>(
        &'a self,
        ns_uri: &'a str,
        local: &'a str,
    ) -> impl Iterator<Item = &'a Element> + 'a {
        self.child_elements().filter(move |e| e.name.is(ns_uri, local))
    }

    /// Index into `children` of the first matching child element.
    pub fn position_of_child(&self, ns_uri: &str, local: &str) -> Option<usize> {
        self.children
            .iter()
            .position(|n| n.as_element().is_some_and(|e| e.name.is(ns_uri, local)))
    }

    /// Concatenated text of the direct text children.
    pub fn text(&self) -> String {
        self.children
            .iter()
            .filter_map(|n| match n {
                XmlNode::Text(t) => Some(t.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Text of the first direct text child, the way naive DOM consumers
    /// read `firstChild.nodeValue`.
    pub fn first_text(&self) -> Option<&str> {
        self.children.iter().find_map(|n| match n {
            XmlNode::Text(t) => Some(t.as_str()),
            _ => None,
        })
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(self, &mut out);
        out
    }

    /// Replace all children with a single text node.
    pub fn set_text(&mut self, text: &str) {
        self.children = vec![XmlNode::Text(text.to_owned())];
    }

    /// True when no child is an element.
    pub fn is_leaf(&self) -> bool {
        !self.children.iter().any(XmlNode::is_element)
    }
}

fn collect_text(el: &Element, out: &mut String) {
    for child in &el.children {
        match child {
            XmlNode::Text(t) => out.push_str(t),
            XmlNode::Element(e) => collect_text(e, out),
            XmlNode::Comment(_) | XmlNode::ProcessingInstruction { .. } => {}
        }
    }
}
