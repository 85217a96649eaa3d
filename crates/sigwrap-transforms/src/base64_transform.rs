#![forbid(unsafe_code)]

//! Base64 decode transform.

use crate::pipeline::{Transform, TransformData};
use sigwrap_core::{algorithm, Error};
use sigwrap_xml::{Document, XmlNode};

/// Base64 decode transform. A node set input contributes the text of its
/// text nodes in document order.
pub struct Base64DecodeTransform;

impl Transform for Base64DecodeTransform {
    fn uri(&self) -> &str {
        algorithm::BASE64
    }

    fn execute(&self, doc: &Document, input: TransformData) -> Result<TransformData, Error> {
        use base64::Engine;
        let engine = base64::engine::general_purpose::STANDARD;

        let text = match input {
            TransformData::Octets(data) => String::from_utf8(data)
                .map_err(|e| Error::Transform(format!("base64 input not UTF-8: {e}")))?,
            TransformData::Nodes(set) => {
                let mut out = String::new();
                let start = set.apex().cloned().unwrap_or_else(|| doc.root_path());
                for (path, el) in doc.elements_under(&start) {
                    for (i, child) in el.children.iter().enumerate() {
                        if let XmlNode::Text(t) = child {
                            if set.contains(&path.child(i), false) {
                                out.push_str(t);
                            }
                        }
                    }
                }
                out
            }
        };

        let cleaned: String = text.chars().filter(|c| !c.is_whitespace()).collect();
        let decoded = engine
            .decode(&cleaned)
            .map_err(|e| Error::Base64(format!("decode error: {e}")))?;
        Ok(TransformData::Octets(decoded))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwrap_xml::{parse_str, NodeSet};

    #[test]
    fn test_decodes_text_of_node_set() {
        let doc = parse_str("<r><v>aGVs\n  bG8=</v></r>").unwrap();
        let out = Base64DecodeTransform
            .execute(&doc, TransformData::Nodes(NodeSet::whole_document(false)))
            .unwrap();
        assert_eq!(out, TransformData::Octets(b"hello".to_vec()));
    }

    #[test]
    fn test_rejects_bad_input() {
        let doc = parse_str("<r/>").unwrap();
        assert!(matches!(
            Base64DecodeTransform.execute(&doc, TransformData::Octets(b"@@@".to_vec())),
            Err(Error::Base64(_))
        ));
    }
}
