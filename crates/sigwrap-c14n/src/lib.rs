#![forbid(unsafe_code)]

//! XML Canonicalization (C14N) for sigwrap.
//!
//! Implements all six W3C canonicalization variants:
//! - Canonical XML 1.0 (with and without comments)
//! - Canonical XML 1.1 (with and without comments)
//! - Exclusive Canonical XML 1.0 (with and without comments)
//!
//! Output is a pure function of the tree, the node set and the mode.

pub mod escape;
pub mod exclusive;
pub mod inclusive;
pub mod inclusive11;
pub mod render;

use sigwrap_core::{algorithm, Error};
use sigwrap_xml::{Document, NodePath, NodeSet};

/// The canonicalization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum C14nMode {
    /// Canonical XML 1.0
    Inclusive,
    /// Canonical XML 1.0 with comments
    InclusiveWithComments,
    /// Canonical XML 1.1
    Inclusive11,
    /// Canonical XML 1.1 with comments
    Inclusive11WithComments,
    /// Exclusive Canonical XML 1.0
    Exclusive,
    /// Exclusive Canonical XML 1.0 with comments
    ExclusiveWithComments,
}

impl C14nMode {
    pub const ALL: [C14nMode; 6] = [
        Self::Inclusive,
        Self::InclusiveWithComments,
        Self::Inclusive11,
        Self::Inclusive11WithComments,
        Self::Exclusive,
        Self::ExclusiveWithComments,
    ];

    /// Get the algorithm URI for this mode.
    pub fn uri(&self) -> &'static str {
        match self {
            Self::Inclusive => algorithm::C14N,
            Self::InclusiveWithComments => algorithm::C14N_WITH_COMMENTS,
            Self::Inclusive11 => algorithm::C14N11,
            Self::Inclusive11WithComments => algorithm::C14N11_WITH_COMMENTS,
            Self::Exclusive => algorithm::EXC_C14N,
            Self::ExclusiveWithComments => algorithm::EXC_C14N_WITH_COMMENTS,
        }
    }

    /// Parse a C14N mode from an algorithm URI.
    pub fn from_uri(uri: &str) -> Option<Self> {
        match uri {
            algorithm::C14N => Some(Self::Inclusive),
            algorithm::C14N_WITH_COMMENTS => Some(Self::InclusiveWithComments),
            algorithm::C14N11 => Some(Self::Inclusive11),
            algorithm::C14N11_WITH_COMMENTS => Some(Self::Inclusive11WithComments),
            algorithm::EXC_C14N => Some(Self::Exclusive),
            algorithm::EXC_C14N_WITH_COMMENTS => Some(Self::ExclusiveWithComments),
            _ => None,
        }
    }

    pub fn with_comments(&self) -> bool {
        matches!(
            self,
            Self::InclusiveWithComments
                | Self::Inclusive11WithComments
                | Self::ExclusiveWithComments
        )
    }

    pub fn is_exclusive(&self) -> bool {
        matches!(self, Self::Exclusive | Self::ExclusiveWithComments)
    }
}

/// Canonicalize a node set of a document.
///
/// - `node_set`: the nodes to output (whole document or a subtree)
/// - `mode`: which C14N variant to use
/// - `inclusive_prefixes`: for exclusive C14N, the InclusiveNamespaces PrefixList
pub fn canonicalize(
    doc: &Document,
    node_set: &NodeSet,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    if !node_set.is_valid_for(doc) {
        return Err(Error::Canonicalization("node set apex is not an element".into()));
    }
    let with_comments = mode.with_comments();
    match mode {
        C14nMode::Inclusive | C14nMode::InclusiveWithComments => {
            inclusive::canonicalize(doc, node_set, with_comments)
        }
        C14nMode::Inclusive11 | C14nMode::Inclusive11WithComments => {
            inclusive11::canonicalize(doc, node_set, with_comments)
        }
        C14nMode::Exclusive | C14nMode::ExclusiveWithComments => {
            exclusive::canonicalize(doc, node_set, with_comments, inclusive_prefixes)
        }
    }
}

/// Canonicalize the subtree at `apex`; comments are kept iff the mode keeps them.
///
/// This is how `SignedInfo` is canonicalized.
pub fn canonicalize_subtree(
    doc: &Document,
    apex: &NodePath,
    mode: C14nMode,
    inclusive_prefixes: &[String],
) -> Result<Vec<u8>, Error> {
    canonicalize(doc, &NodeSet::tree_with_comments(apex.clone()), mode, inclusive_prefixes)
}

/// Canonicalize the whole document.
pub fn canonicalize_document(doc: &Document, mode: C14nMode) -> Result<Vec<u8>, Error> {
    canonicalize(doc, &NodeSet::whole_document(true), mode, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use sigwrap_xml::{parse_str, Attribute, Element, QName, XmlNode};

    fn run(doc: &Document, set: &NodeSet, mode: C14nMode) -> String {
        String::from_utf8(canonicalize(doc, set, mode, &[]).unwrap()).unwrap()
    }

    #[test]
    fn test_mode_uris_round_trip() {
        for mode in C14nMode::ALL {
            assert_eq!(C14nMode::from_uri(mode.uri()), Some(mode));
        }
        assert_eq!(C14nMode::from_uri("urn:nope"), None);
        assert!(C14nMode::ExclusiveWithComments.with_comments());
        assert!(!C14nMode::Inclusive11.is_exclusive());
    }

    #[test]
    fn test_start_and_end_tags() {
        let doc = parse_str(r#"<doc><e1   /><e2   ></e2><e3   name = "elem3"   id="elem3"   /></doc>"#).unwrap();
        assert_eq!(
            run(&doc, &NodeSet::whole_document(false), C14nMode::Inclusive),
            r#"<doc><e1></e1><e2></e2><e3 id="elem3" name="elem3"></e3></doc>"#
        );
    }

    #[test]
    fn test_comments_and_top_level_line_breaks() {
        let doc = parse_str("<?xml version=\"1.0\"?>\n<!--a-->\n<r><!--b-->t</r>\n<?p x?>").unwrap();
        assert_eq!(
            run(&doc, &NodeSet::whole_document(false), C14nMode::Inclusive),
            "<r>t</r>\n<?p x?>"
        );
        assert_eq!(
            run(&doc, &NodeSet::whole_document(true), C14nMode::InclusiveWithComments),
            "<!--a-->\n<r><!--b-->t</r>\n<?p x?>"
        );
        // A with-comments mode still honours a comment-free node set.
        assert_eq!(
            run(&doc, &NodeSet::whole_document(false), C14nMode::ExclusiveWithComments),
            "<r>t</r>\n<?p x?>"
        );
    }

    #[test]
    fn test_pi_data_is_not_escaped() {
        let mut doc = parse_str("<r><?p x?>a\rb</r>").unwrap();
        let pi = doc.root_path().child(0);
        doc.replace(
            &pi,
            XmlNode::ProcessingInstruction {
                target: "p".into(),
                data: "x<&\ry".into(),
            },
        )
        .unwrap();
        assert_eq!(
            run(&doc, &NodeSet::whole_document(false), C14nMode::Inclusive),
            "<r><?p x<&\ry?>a\nb</r>"
        );
    }

    #[test]
    fn test_subset_carries_namespace_context() {
        let doc = parse_str(
            r#"<r xmlns="urn:d" xmlns:a="urn:a" xmlns:u="urn:u" xml:lang="en"><x a:b="1"><y/></x></r>"#,
        )
        .unwrap();
        let x = doc.root_path().child(0);
        let set = NodeSet::tree_without_comments(x);
        assert_eq!(
            run(&doc, &set, C14nMode::Inclusive),
            r#"<x xmlns="urn:d" xmlns:a="urn:a" xmlns:u="urn:u" xml:lang="en" a:b="1"><y></y></x>"#
        );
        assert_eq!(
            run(&doc, &set, C14nMode::Exclusive),
            r#"<x xmlns="urn:d" xmlns:a="urn:a" a:b="1"><y></y></x>"#
        );
    }

    #[test]
    fn test_xml_attribute_inheritance_differs_between_versions() {
        let doc = parse_str(r#"<r xml:lang="en" xml:base="http://x/"><x/></r>"#).unwrap();
        let set = NodeSet::tree_without_comments(doc.root_path().child(0));
        assert_eq!(
            run(&doc, &set, C14nMode::Inclusive),
            r#"<x xml:base="http://x/" xml:lang="en"></x>"#
        );
        assert_eq!(run(&doc, &set, C14nMode::Inclusive11), r#"<x xml:lang="en"></x>"#);
    }

    #[test]
    fn test_excluded_subtree() {
        let doc = parse_str("<r><a>1</a><sig><v/></sig><b>2</b></r>").unwrap();
        let mut set = NodeSet::whole_document(false);
        set.exclude_subtree(doc.root_path().child(1));
        assert_eq!(run(&doc, &set, C14nMode::Exclusive), "<r><a>1</a><b>2</b></r>");
    }

    #[test]
    fn test_subtree_with_comments() {
        let doc = parse_str("<r><s><!--x-->y</s></r>").unwrap();
        let s = doc.root_path().child(0);
        let with = canonicalize_subtree(&doc, &s, C14nMode::InclusiveWithComments, &[]).unwrap();
        assert_eq!(with, b"<s><!--x-->y</s>");
        let without = canonicalize_subtree(&doc, &s, C14nMode::Inclusive, &[]).unwrap();
        assert_eq!(without, b"<s>y</s>");
    }

    #[test]
    fn test_stale_apex_is_rejected() {
        let doc = parse_str("<r/>").unwrap();
        let set = NodeSet::tree_without_comments(doc.root_path().child(3));
        assert!(matches!(
            canonicalize(&doc, &set, C14nMode::Inclusive, &[]),
            Err(Error::Canonicalization(_))
        ));
    }

    fn build(attrs: &[(String, String)]) -> Document {
        let mut child = Element::new(QName::local("c"));
        child.attributes = attrs.iter().map(|(k, v)| Attribute::new(k, v)).collect();
        child.children.push(XmlNode::Text("t".into()));
        let mut root = Element::new(QName::local("r"));
        root.children.push(XmlNode::Element(child));
        Document::new(root).unwrap()
    }

    proptest! {
        #[test]
        fn prop_attribute_order_does_not_change_output(
            attrs in prop::collection::btree_map("[a-z]{1,6}", "[ -~\t\n]{0,8}", 1..6)
        ) {
            let forward: Vec<(String, String)> = attrs.into_iter().collect();
            let mut backward = forward.clone();
            backward.reverse();
            let a = build(&forward);
            let b = build(&backward);
            for mode in C14nMode::ALL {
                prop_assert_eq!(
                    canonicalize_document(&a, mode).unwrap(),
                    canonicalize_document(&b, mode).unwrap()
                );
            }
        }

        #[test]
        fn prop_canonicalization_is_deterministic(
            text in "[ -~]{0,20}",
            value in "[ -~]{0,10}"
        ) {
            let mut root = Element::new(QName::local("r"));
            root.attributes.push(Attribute::new("v", &value));
            root.children.push(XmlNode::Text(text));
            let doc = Document::new(root).unwrap();
            let reparsed = parse_str(&sigwrap_xml::writer::to_string(&doc).unwrap()).unwrap();
            for mode in C14nMode::ALL {
                let first = canonicalize_document(&doc, mode).unwrap();
                prop_assert_eq!(&first, &canonicalize_document(&doc, mode).unwrap());
                prop_assert_eq!(&first, &canonicalize_document(&reparsed, mode).unwrap());
            }
        }
    }
}
