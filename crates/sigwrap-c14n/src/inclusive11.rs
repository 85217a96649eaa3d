#![forbid(unsafe_code)]

//! Inclusive Canonical XML 1.1 (C14N 1.1).
//!
//! Algorithm URI: `http://www.w3.org/2006/12/xml-c14n11`
//! With comments: `http://www.w3.org/2006/12/xml-c14n11#WithComments`
//!
//! Identical to C14N 1.0 except for `xml:*` inheritance into a document
//! subset: `xml:id` and `xml:base` are not copied from omitted ancestors.
//! `xml:base` fix-up is not performed.

use crate::inclusive::Inclusive;
use crate::render::Renderer;
use sigwrap_core::Error;
use sigwrap_xml::{Document, NodeSet};

/// Canonicalize a node set using Inclusive C14N 1.1.
pub fn canonicalize(doc: &Document, node_set: &NodeSet, with_comments: bool) -> Result<Vec<u8>, Error> {
    Renderer::new(doc, node_set, with_comments, Inclusive { c14n11: true }).render()
}
