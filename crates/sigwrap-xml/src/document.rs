#![forbid(unsafe_code)]

//! Owned XML document with path addressing and scope-preserving edits.

use crate::node::{Element, XmlNode};
use sigwrap_core::{ns, Error};
use std::collections::BTreeMap;
use std::fmt;

/// Address of a node: child indices starting at the document's top-level
/// node sequence. Lexicographic order is document order.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodePath(Vec<usize>);

impl NodePath {
    /// The document node itself.
    pub fn document() -> Self {
        Self(Vec::new())
    }

    pub fn from_indices(indices: Vec<usize>) -> Self {
        Self(indices)
    }

    pub fn indices(&self) -> &[usize] {
        &self.0
    }

    pub fn child(&self, index: usize) -> Self {
        let mut v = self.0.clone();
        v.push(index);
        Self(v)
    }

    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.0.split_last()?;
        Some(Self(rest.to_vec()))
    }

    pub fn last_index(&self) -> Option<usize> {
        self.0.last().copied()
    }

    pub fn is_document(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_ancestor_or_self_of(&self, other: &NodePath) -> bool {
        other.0.starts_with(&self.0)
    }
}

impl fmt::Display for NodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for idx in &self.0 {
            write!(f, "/{idx}")?;
        }
        Ok(())
    }
}

/// The `<?xml ...?>` declaration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDeclaration {
    pub version: String,
    pub encoding: Option<String>,
    pub standalone: Option<String>,
}

/// A parsed document: comments/PIs before the root, the root element, and
/// comments/PIs after it.
///
/// Every structural edit goes through a method that finishes with
/// [`Document::rescope`], so in-scope namespaces and resolved names never
/// go stale.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub declaration: Option<XmlDeclaration>,
    /// DOCTYPE contents after `<!DOCTYPE `, kept verbatim.
    pub doctype: Option<String>,
    prolog: Vec<XmlNode>,
    root: Element,
    epilog: Vec<XmlNode>,
}

impl Document {
    /// Build a document around a root element.
    pub fn new(root: Element) -> Result<Self, Error> {
        Self::from_parts(None, None, Vec::new(), root, Vec::new())
    }

    pub(crate) fn from_parts(
        declaration: Option<XmlDeclaration>,
        doctype: Option<String>,
        prolog: Vec<XmlNode>,
        root: Element,
        epilog: Vec<XmlNode>,
    ) -> Result<Self, Error> {
        let mut doc = Self {
            declaration,
            doctype,
            prolog,
            root,
            epilog,
        };
        doc.rescope()?;
        Ok(doc)
    }

    pub fn prolog(&self) -> &[XmlNode] {
        &self.prolog
    }

    pub fn epilog(&self) -> &[XmlNode] {
        &self.epilog
    }

    pub fn root_element(&self) -> &Element {
        &self.root
    }

    pub fn root_path(&self) -> NodePath {
        NodePath(vec![self.prolog.len()])
    }

    /// The element at `path`, if the path names an element.
    pub fn element(&self, path: &NodePath) -> Option<&Element> {
        let (first, rest) = path.0.split_first()?;
        if *first != self.prolog.len() {
            return None;
        }
        let mut el = &self.root;
        for idx in rest {
            el = el.children.get(*idx)?.as_element()?;
        }
        Some(el)
    }

    /// Parent element of the node at `path` (`None` for top-level nodes).
    pub fn parent_element(&self, path: &NodePath) -> Option<&Element> {
        let parent = path.parent()?;
        self.element(&parent)
    }

    /// Ancestor elements of `path`, outermost first, excluding the node.
    pub fn ancestors(&self, path: &NodePath) -> Vec<&Element> {
        let mut out = Vec::new();
        let mut current = path.parent();
        while let Some(p) = current {
            if let Some(el) = self.element(&p) {
                out.push(el);
            }
            current = p.parent();
        }
        out.reverse();
        out
    }

    /// Run `edit` against a copy of the root and keep the copy only when it
    /// still scopes. A failed edit leaves the document untouched.
    fn commit<R>(
        &mut self,
        edit: impl FnOnce(&mut Element) -> Result<R, Error>,
    ) -> Result<R, Error> {
        let mut root = self.root.clone();
        let result = edit(&mut root)?;
        scope_element(&mut root, &BTreeMap::new())?;
        self.root = root;
        Ok(result)
    }

    /// Edit an element, then recompute namespace scope.
    pub fn update_element<F, R>(&mut self, path: &NodePath, f: F) -> Result<R, Error>
    where
        F: FnOnce(&mut Element) -> R,
    {
        let top = self.prolog.len();
        self.commit(|root| Ok(f(descend_mut(root, top, path)?)))
    }

    /// Insert `node` as child `index` of the element at `parent`.
    ///
    /// Returns the path of the inserted node. Paths of later siblings shift.
    pub fn insert(
        &mut self,
        parent: &NodePath,
        index: usize,
        node: XmlNode,
    ) -> Result<NodePath, Error> {
        let top = self.prolog.len();
        self.commit(|root| {
            let el = descend_mut(root, top, parent)?;
            if index > el.children.len() {
                return Err(Error::XmlStructure(format!(
                    "insert index {index} out of range at {parent}"
                )));
            }
            el.children.insert(index, node);
            Ok(parent.child(index))
        })
    }

    /// Detach the node at `path`. The root element cannot be removed.
    pub fn remove(&mut self, path: &NodePath) -> Result<XmlNode, Error> {
        let parent = path
            .parent()
            .filter(|p| !p.is_document())
            .ok_or_else(|| Error::XmlStructure("cannot detach a top-level node".into()))?;
        let index = path.last_index().unwrap_or_default();
        let top = self.prolog.len();
        self.commit(|root| {
            let el = descend_mut(root, top, &parent)?;
            if index >= el.children.len() {
                return Err(Error::XmlStructure(format!("no node at {path}")));
            }
            Ok(el.children.remove(index))
        })
    }

    /// Replace the node at `path`, returning the old node.
    pub fn replace(&mut self, path: &NodePath, node: XmlNode) -> Result<XmlNode, Error> {
        if *path == self.root_path() {
            let XmlNode::Element(new_root) = node else {
                return Err(Error::XmlStructure("document root must be an element".into()));
            };
            return self.commit(|root| Ok(XmlNode::Element(std::mem::replace(root, new_root))));
        }
        let parent = path
            .parent()
            .filter(|p| !p.is_document())
            .ok_or_else(|| Error::XmlStructure("cannot replace a top-level node".into()))?;
        let index = path.last_index().unwrap_or_default();
        let top = self.prolog.len();
        self.commit(|root| {
            let slot = descend_mut(root, top, &parent)?
                .children
                .get_mut(index)
                .ok_or_else(|| Error::XmlStructure(format!("no node at {path}")))?;
            Ok(std::mem::replace(slot, node))
        })
    }

    /// Recompute in-scope namespaces and every resolved name from the
    /// declarations, top-down.
    pub fn rescope(&mut self) -> Result<(), Error> {
        scope_element(&mut self.root, &BTreeMap::new())
    }

    /// All elements with their paths, in document order.
    pub fn elements(&self) -> Vec<(NodePath, &Element)> {
        let mut out = Vec::new();
        collect_elements(&self.root, self.root_path(), &mut out);
        out
    }

    /// Elements at or below `path`, in document order.
    pub fn elements_under(&self, path: &NodePath) -> Vec<(NodePath, &Element)> {
        let mut out = Vec::new();
        if let Some(el) = self.element(path) {
            collect_elements(el, path.clone(), &mut out);
        }
        out
    }

    /// First element (document order) with this namespace and local name.
    pub fn find_element(&self, ns_uri: &str, local: &str) -> Option<NodePath> {
        self.elements()
            .into_iter()
            .find(|(_, e)| e.name.is(ns_uri, local))
            .map(|(p, _)| p)
    }

    /// All elements with this namespace and local name, in document order.
    pub fn find_elements(&self, ns_uri: &str, local: &str) -> Vec<NodePath> {
        self.elements()
            .into_iter()
            .filter(|(_, e)| e.name.is(ns_uri, local))
            .map(|(p, _)| p)
            .collect()
    }

    /// Nearest ancestor-or-self element of `path` with this name.
    pub fn enclosing(&self, path: &NodePath, ns_uri: &str, local: &str) -> Option<NodePath> {
        let mut current = Some(path.clone());
        while let Some(p) = current {
            if self.element(&p).is_some_and(|e| e.name.is(ns_uri, local)) {
                return Some(p);
            }
            current = p.parent().filter(|pp| !pp.is_document());
        }
        None
    }
}

fn collect_elements<'a>(el: &'a Element, path: NodePath, out: &mut Vec<(NodePath, &'a Element)>) {
    out.push((path.clone(), el));
    for (idx, child) in el.children.iter().enumerate() {
        if let XmlNode::Element(c) = child {
            collect_elements(c, path.child(idx), out);
        }
    }
}

/// The element at `path` below `root`, which sits at top-level index `top`.
fn descend_mut<'a>(
    root: &'a mut Element,
    top: usize,
    path: &NodePath,
) -> Result<&'a mut Element, Error> {
    let missing = || Error::XmlStructure(format!("no element at {path}"));
    let (first, rest) = path.0.split_first().ok_or_else(missing)?;
    if *first != top {
        return Err(missing());
    }
    let mut el = root;
    for idx in rest {
        el = el
            .children
            .get_mut(*idx)
            .and_then(XmlNode::as_element_mut)
            .ok_or_else(missing)?;
    }
    Ok(el)
}

fn scope_element(el: &mut Element, parent_scope: &BTreeMap<String, String>) -> Result<(), Error> {
    let mut scope = parent_scope.clone();
    for decl in &el.namespace_decls {
        match &decl.prefix {
            None if decl.uri.is_empty() => {
                scope.remove("");
            }
            None => {
                scope.insert(String::new(), decl.uri.clone());
            }
            Some(p) if p == "xmlns" => {
                return Err(Error::XmlStructure("the xmlns prefix cannot be declared".into()));
            }
            Some(p) if decl.uri.is_empty() => {
                return Err(Error::XmlStructure(format!(
                    "prefix '{p}' bound to an empty namespace"
                )));
            }
            Some(p) => {
                scope.insert(p.clone(), decl.uri.clone());
            }
        }
    }

    el.name.namespace = match el.name.prefix.as_deref() {
        None => scope.get("").cloned(),
        Some("xml") => Some(ns::XML.to_owned()),
        Some(p) => Some(scope.get(p).cloned().ok_or_else(|| {
            Error::XmlStructure(format!(
                "undeclared namespace prefix '{p}' on <{}>",
                el.name.qualified()
            ))
        })?),
    };

    for attr in &mut el.attributes {
        attr.name.namespace = match attr.name.prefix.as_deref() {
            None => None,
            Some("xml") => Some(ns::XML.to_owned()),
            Some(p) => Some(scope.get(p).cloned().ok_or_else(|| {
                Error::XmlStructure(format!(
                    "undeclared namespace prefix '{p}' on attribute {}",
                    attr.name.qualified()
                ))
            })?),
        };
    }

    for child in &mut el.children {
        if let XmlNode::Element(c) = child {
            scope_element(c, &scope)?;
        }
    }
    el.in_scope = scope;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::QName;
    use crate::parse_str;

    #[test]
    fn test_paths_follow_document_order() {
        let doc = parse_str("<!--c--><a><b/><c><d/></c></a>").unwrap();
        let names: Vec<String> = doc.elements().iter().map(|(_, e)| e.name.local.clone()).collect();
        assert_eq!(names, ["a", "b", "c", "d"]);
        let paths: Vec<NodePath> = doc.elements().into_iter().map(|(p, _)| p).collect();
        let mut sorted = paths.clone();
        sorted.sort();
        assert_eq!(paths, sorted);
        assert_eq!(doc.root_path().indices(), &[1]);
    }

    #[test]
    fn test_scope_is_recomputed_after_move() {
        let mut doc = parse_str(
            r#"<r xmlns:p="urn:one"><x xmlns:p="urn:two"/><p:y/></r>"#,
        )
        .unwrap();
        let y = doc.find_elements("urn:one", "y");
        assert_eq!(y.len(), 1);
        let moved = doc.remove(&y[0]).unwrap();
        let x = doc.root_path().child(0);
        doc.insert(&x, 0, moved).unwrap();
        // The same prefix now resolves against <x>'s binding.
        assert!(doc.find_element("urn:one", "y").is_none());
        assert!(doc.find_element("urn:two", "y").is_some());
    }

    #[test]
    fn test_undeclared_prefix_after_edit_is_rejected() {
        let mut doc = parse_str("<r/>").unwrap();
        let root = doc.root_path();
        let el = Element::new(QName::parse("q:z"));
        assert!(doc.insert(&root, 0, XmlNode::Element(el)).is_err());
    }

    #[test]
    fn test_failed_edit_leaves_document_unchanged() {
        let mut doc = parse_str(r#"<r xmlns:p="urn:p"><p:a k="v"><b/></p:a></r>"#).unwrap();
        let before = doc.clone();
        let a = doc.find_element("urn:p", "a").unwrap();
        let renamed = doc.update_element(&a, |el| {
            el.set_attribute("k", "changed");
            el.name = QName::parse("u:a");
        });
        assert!(renamed.is_err());
        assert_eq!(doc, before);

        let b = doc.find_element("", "b").unwrap();
        let bad = XmlNode::Element(Element::new(QName::parse("u:c")));
        assert!(doc.replace(&b, bad).is_err());
        assert_eq!(doc, before);
        assert!(doc.update_element(&a.child(5), |_| ()).is_err());
        assert_eq!(doc, before);
    }

    #[test]
    fn test_replace_and_enclosing() {
        let mut doc = parse_str("<r><a><b/></a></r>").unwrap();
        let b = doc.find_element("", "b").unwrap();
        let a = doc.enclosing(&b, "", "a").unwrap();
        assert_eq!(a, doc.root_path().child(0));
        let old = doc
            .replace(&a, XmlNode::Element(Element::new(QName::local("z"))))
            .unwrap();
        assert_eq!(old.as_element().map(|e| e.name.local.as_str()), Some("a"));
        assert!(doc.find_element("", "b").is_none());
        assert!(doc.find_element("", "z").is_some());
    }

    #[test]
    fn test_root_cannot_be_removed() {
        let mut doc = parse_str("<r/>").unwrap();
        let root = doc.root_path();
        assert!(doc.remove(&root).is_err());
    }
}
