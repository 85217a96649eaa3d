#![forbid(unsafe_code)]

//! URI resolution for XML-DSig references.
//!
//! Handles:
//! - `""`: the whole document, comments removed
//! - `#xpointer(/)`: the whole document, comments kept
//! - `#id`: the identified subtree, comments removed
//! - `#xpointer(id('id'))`: the identified subtree, comments kept
//!
//! Anything else (external URIs, other XPointer schemes) is unsupported.

use sigwrap_xml::xpath::{self, IdAttributes, IdLookupError, IdResolution};
use sigwrap_xml::{Document, NodePath, NodeSet};

/// Why a Reference URI did not yield a node set.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    #[error("ID {id:?}: {source}")]
    Id {
        id: String,
        #[source]
        source: IdLookupError,
    },
    #[error("unsupported reference URI: {0}")]
    Unsupported(String),
}

/// The ID a same-document URI names, if it names one.
pub fn referenced_id(uri: &str) -> Option<&str> {
    let fragment = xpath::parse_same_document_ref(uri)?;
    if fragment.starts_with("xpointer(") {
        return xpath::parse_xpointer_id(fragment);
    }
    Some(fragment)
}

/// Resolve a Reference URI against `doc`.
pub fn resolve_uri(
    doc: &Document,
    uri: &str,
    id_attrs: &IdAttributes,
    policy: IdResolution,
) -> Result<NodeSet, ResolveError> {
    if uri.is_empty() {
        return Ok(NodeSet::whole_document(false));
    }
    let Some(fragment) = xpath::parse_same_document_ref(uri) else {
        return Err(ResolveError::Unsupported(uri.to_owned()));
    };
    if fragment == "xpointer(/)" {
        return Ok(NodeSet::whole_document(true));
    }
    if let Some(id) = xpath::parse_xpointer_id(fragment) {
        return Ok(NodeSet::tree_with_comments(lookup(doc, id, id_attrs, policy)?));
    }
    if fragment.is_empty() || fragment.starts_with("xpointer(") {
        return Err(ResolveError::Unsupported(uri.to_owned()));
    }
    Ok(NodeSet::tree_without_comments(lookup(doc, fragment, id_attrs, policy)?))
}

fn lookup(
    doc: &Document,
    id: &str,
    id_attrs: &IdAttributes,
    policy: IdResolution,
) -> Result<NodePath, ResolveError> {
    xpath::resolve_id_with(doc, id, id_attrs, policy).map_err(|source| ResolveError::Id {
        id: id.to_owned(),
        source,
    })
}
