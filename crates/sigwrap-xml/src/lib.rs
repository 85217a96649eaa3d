#![forbid(unsafe_code)]

//! XML infoset adapter for sigwrap.
//!
//! Wraps `quick-xml` events into an owned, value-semantics node tree that
//! keeps attribute order, source prefixes and comments, and computes the
//! in-scope namespaces of every element. Trees are cloned per mutation; a
//! [`NodePath`] addresses a node inside one particular tree.

pub mod document;
pub mod node;
pub mod nodeset;
pub mod parse;
pub mod writer;
pub mod xpath;

pub use document::{Document, NodePath, XmlDeclaration};
pub use node::{Attribute, Element, NamespaceDecl, QName, XmlNode};
pub use nodeset::NodeSet;
pub use parse::{parse, parse_str};
pub use xpath::{IdAttributeName, IdAttributes, IdLookupError, IdResolution};
