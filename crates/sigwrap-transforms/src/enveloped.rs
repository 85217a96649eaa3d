#![forbid(unsafe_code)]

//! Enveloped signature transform.
//!
//! Removes the `<Signature>` element that owns the Reference from the node
//! set.

use crate::pipeline::{Transform, TransformData};
use sigwrap_core::{algorithm, Error};
use sigwrap_xml::{Document, NodePath};

pub struct EnvelopedSignatureTransform {
    signature: NodePath,
}

impl EnvelopedSignatureTransform {
    /// Create with the path of the Signature element to remove.
    pub fn new(signature: NodePath) -> Self {
        Self { signature }
    }
}

impl Transform for EnvelopedSignatureTransform {
    fn uri(&self) -> &str {
        algorithm::ENVELOPED_SIGNATURE
    }

    fn execute(&self, _doc: &Document, input: TransformData) -> Result<TransformData, Error> {
        match input {
            TransformData::Nodes(mut set) => {
                set.exclude_subtree(self.signature.clone());
                Ok(TransformData::Nodes(set))
            }
            TransformData::Octets(_) => Err(Error::Transform(
                "enveloped-signature transform requires a node set".into(),
            )),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwrap_core::ns;
    use sigwrap_xml::{parse_str, NodeSet};

    #[test]
    fn test_removes_signature_subtree() {
        let xml = format!(
            r#"<r><a>1</a><ds:Signature xmlns:ds="{}"><ds:SignedInfo/></ds:Signature></r>"#,
            ns::DSIG
        );
        let doc = parse_str(&xml).unwrap();
        let sig = doc.find_element(ns::DSIG, ns::node::SIGNATURE).unwrap();
        let t = EnvelopedSignatureTransform::new(sig);
        let out = t
            .execute(&doc, TransformData::Nodes(NodeSet::whole_document(false)))
            .unwrap()
            .into_octets(&doc)
            .unwrap();
        assert_eq!(out, b"<r><a>1</a></r>");

        assert!(t.execute(&doc, TransformData::Octets(vec![])).is_err());
    }
}
