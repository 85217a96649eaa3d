#![forbid(unsafe_code)]

//! Node sets as used by reference processing.
//!
//! Only the shapes XML-DSig references produce are representable: the whole
//! document or one subtree, minus any number of excluded subtrees, with or
//! without comment nodes. Membership is decided per node from its
//! [`NodePath`].

use crate::document::{Document, NodePath};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSet {
    /// `None` selects the whole document.
    apex: Option<NodePath>,
    excluded: Vec<NodePath>,
    with_comments: bool,
}

impl NodeSet {
    /// Every node of the document, including or excluding comments.
    pub fn whole_document(with_comments: bool) -> Self {
        Self {
            apex: None,
            excluded: Vec::new(),
            with_comments,
        }
    }

    /// The subtree at `apex`, comments removed (`URI="#id"`).
    pub fn tree_without_comments(apex: NodePath) -> Self {
        Self {
            apex: Some(apex),
            excluded: Vec::new(),
            with_comments: false,
        }
    }

    /// The subtree at `apex`, comments kept (`URI="#xpointer(id('x'))"`).
    pub fn tree_with_comments(apex: NodePath) -> Self {
        Self {
            apex: Some(apex),
            excluded: Vec::new(),
            with_comments: true,
        }
    }

    /// Remove the subtree at `path` from the set.
    pub fn exclude_subtree(&mut self, path: NodePath) {
        if !self.excluded.contains(&path) {
            self.excluded.push(path);
        }
    }

    /// Drop comment nodes from the set.
    pub fn without_comments(mut self) -> Self {
        self.with_comments = false;
        self
    }

    pub fn apex(&self) -> Option<&NodePath> {
        self.apex.as_ref()
    }

    pub fn excluded(&self) -> &[NodePath] {
        &self.excluded
    }

    pub fn with_comments(&self) -> bool {
        self.with_comments
    }

    /// True when the whole document is selected (possibly minus exclusions).
    pub fn is_document(&self) -> bool {
        self.apex.is_none()
    }

    /// Membership test for the node at `path`.
    pub fn contains(&self, path: &NodePath, is_comment: bool) -> bool {
        if is_comment && !self.with_comments {
            return false;
        }
        if let Some(apex) = &self.apex {
            if !apex.is_ancestor_or_self_of(path) {
                return false;
            }
        }
        !self.excluded.iter().any(|ex| ex.is_ancestor_or_self_of(path))
    }

    /// True when the apex (if any) still names an element of `doc`.
    pub fn is_valid_for(&self, doc: &Document) -> bool {
        self.apex.as_ref().map_or(true, |a| doc.element(a).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn p(indices: &[usize]) -> NodePath {
        NodePath::from_indices(indices.to_vec())
    }

    #[test]
    fn test_subtree_membership() {
        let mut set = NodeSet::tree_without_comments(p(&[0, 1]));
        assert!(set.contains(&p(&[0, 1]), false));
        assert!(set.contains(&p(&[0, 1, 3]), false));
        assert!(!set.contains(&p(&[0, 1, 3]), true));
        assert!(!set.contains(&p(&[0, 2]), false));
        assert!(!set.contains(&p(&[0]), false));

        set.exclude_subtree(p(&[0, 1, 3]));
        assert!(!set.contains(&p(&[0, 1, 3, 0]), false));
        assert!(set.contains(&p(&[0, 1, 2]), false));
    }

    #[test]
    fn test_whole_document() {
        let set = NodeSet::whole_document(true);
        assert!(set.is_document());
        assert!(set.contains(&p(&[0]), true));
        let set = set.without_comments();
        assert!(!set.contains(&p(&[0]), true));
        assert!(set.contains(&p(&[1, 4]), false));
    }
}
