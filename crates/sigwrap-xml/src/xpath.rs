#![forbid(unsafe_code)]

//! Same-document references and ID resolution.
//!
//! Only the patterns XML-DSig references use are supported:
//! - `#id-value`
//! - `#xpointer(/)` and `#xpointer(id('id-value'))`
//!
//! Which attributes count as IDs is configuration ([`IdAttributes`]), and so
//! is what happens when more than one element carries the same value
//! ([`IdResolution`]).

use crate::document::{Document, NodePath};
use crate::node::Attribute;
use sigwrap_core::{ns, Error};
use std::fmt;
use std::str::FromStr;

/// Parse a same-document reference (e.g., `#foo` → `foo`).
pub fn parse_same_document_ref(uri: &str) -> Option<&str> {
    uri.strip_prefix('#')
}

/// Parse an `xpointer(id('...'))` expression and return the ID value.
/// Both quote styles are accepted.
pub fn parse_xpointer_id(expr: &str) -> Option<&str> {
    let inner = expr.strip_prefix("xpointer(id(")?.strip_suffix("))")?;
    inner
        .strip_prefix('\'')
        .and_then(|s| s.strip_suffix('\''))
        .or_else(|| inner.strip_prefix('"').and_then(|s| s.strip_suffix('"')))
}

/// One way of naming an ID attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdAttributeName {
    /// `ID`: an attribute with no prefix and this local name.
    Local(String),
    /// `wsu:Id`: matched against the prefix as written in the source.
    Qualified { prefix: String, local: String },
    /// `{uri}local`: matched against the resolved namespace.
    Expanded { namespace: String, local: String },
}

impl IdAttributeName {
    pub fn matches(&self, attr: &Attribute) -> bool {
        match self {
            IdAttributeName::Local(local) => attr.name.prefix.is_none() && attr.name.local == *local,
            IdAttributeName::Qualified { prefix, local } => {
                attr.name.prefix.as_deref() == Some(prefix.as_str()) && attr.name.local == *local
            }
            IdAttributeName::Expanded { namespace, local } => attr.name.is(namespace, local),
        }
    }
}

impl FromStr for IdAttributeName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        if let Some(rest) = s.strip_prefix('{') {
            let (namespace, local) = rest
                .split_once('}')
                .ok_or_else(|| Error::Other(format!("malformed expanded name: {s}")))?;
            if local.is_empty() {
                return Err(Error::Other(format!("missing local name: {s}")));
            }
            return Ok(IdAttributeName::Expanded {
                namespace: namespace.to_owned(),
                local: local.to_owned(),
            });
        }
        match s.split_once(':') {
            Some((prefix, local)) if !prefix.is_empty() && !local.is_empty() => {
                Ok(IdAttributeName::Qualified {
                    prefix: prefix.to_owned(),
                    local: local.to_owned(),
                })
            }
            None if !s.is_empty() => Ok(IdAttributeName::Local(s.to_owned())),
            _ => Err(Error::Other(format!("invalid attribute name: {s:?}"))),
        }
    }
}

impl fmt::Display for IdAttributeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdAttributeName::Local(l) => write!(f, "{l}"),
            IdAttributeName::Qualified { prefix, local } => write!(f, "{prefix}:{local}"),
            IdAttributeName::Expanded { namespace, local } => write!(f, "{{{namespace}}}{local}"),
        }
    }
}

/// The set of attribute names treated as element IDs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdAttributes {
    names: Vec<IdAttributeName>,
}

impl Default for IdAttributes {
    fn default() -> Self {
        Self {
            names: vec![
                IdAttributeName::Local("Id".into()),
                IdAttributeName::Local("ID".into()),
                IdAttributeName::Local("id".into()),
                IdAttributeName::Expanded {
                    namespace: ns::XML.into(),
                    local: "id".into(),
                },
            ],
        }
    }
}

impl IdAttributes {
    /// No ID attributes at all.
    pub fn empty() -> Self {
        Self { names: Vec::new() }
    }

    /// Register another ID attribute name; duplicates are ignored.
    pub fn add(&mut self, name: IdAttributeName) {
        if !self.names.contains(&name) {
            self.names.push(name);
        }
    }

    pub fn names(&self) -> &[IdAttributeName] {
        &self.names
    }

    pub fn is_id_attribute(&self, attr: &Attribute) -> bool {
        self.names.iter().any(|n| n.matches(attr))
    }

    /// ID values carried by an element, in attribute order.
    pub fn ids_of<'a>(&'a self, el: &'a crate::Element) -> impl Iterator<Item = &'a str> + 'a {
        el.attributes
            .iter()
            .filter(|a| self.is_id_attribute(a))
            .map(|a| a.value.as_str())
    }
}

/// Why an ID did not resolve to exactly one element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum IdLookupError {
    #[error("no element carries the ID")]
    NotFound,
    #[error("{0} elements carry the ID")]
    Ambiguous(usize),
}

/// What the verifier does when an ID value is carried by several elements.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum IdResolution {
    /// First match in document order.
    #[default]
    FirstMatch,
    /// Last match in document order.
    LastMatch,
    /// Ambiguity is a resolution failure.
    Strict,
}

impl FromStr for IdResolution {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.to_ascii_lowercase().replace(['-', '_'], "").as_str() {
            "first" | "firstmatch" => Ok(IdResolution::FirstMatch),
            "last" | "lastmatch" => Ok(IdResolution::LastMatch),
            "strict" => Ok(IdResolution::Strict),
            _ => Err(Error::Other(format!("unknown ID resolution policy: {s}"))),
        }
    }
}

/// All elements carrying `id`, in document order.
pub fn find_all_by_id(doc: &Document, id: &str, id_attrs: &IdAttributes) -> Vec<NodePath> {
    doc.elements()
        .into_iter()
        .filter(|(_, el)| id_attrs.ids_of(el).any(|v| v == id))
        .map(|(path, _)| path)
        .collect()
}

/// Resolve `id` to exactly one element.
pub fn resolve_by_id(
    doc: &Document,
    id: &str,
    id_attrs: &IdAttributes,
) -> Result<NodePath, IdLookupError> {
    resolve_id_with(doc, id, id_attrs, IdResolution::Strict)
}

/// Resolve `id` under a duplicate-ID policy.
pub fn resolve_id_with(
    doc: &Document,
    id: &str,
    id_attrs: &IdAttributes,
    policy: IdResolution,
) -> Result<NodePath, IdLookupError> {
    let mut matches = find_all_by_id(doc, id, id_attrs);
    match (matches.len(), policy) {
        (0, _) => Err(IdLookupError::NotFound),
        (1, _) => Ok(matches.remove(0)),
        (n, IdResolution::Strict) => Err(IdLookupError::Ambiguous(n)),
        (n, IdResolution::FirstMatch) => {
            tracing::debug!(id, count = n, "duplicate ID, taking first match");
            Ok(matches.remove(0))
        }
        (n, IdResolution::LastMatch) => {
            tracing::debug!(id, count = n, "duplicate ID, taking last match");
            Ok(matches.remove(n - 1))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse_str;

    #[test]
    fn test_xpointer_id() {
        assert_eq!(parse_xpointer_id("xpointer(id('a1'))"), Some("a1"));
        assert_eq!(parse_xpointer_id("xpointer(id(\"a1\"))"), Some("a1"));
        assert_eq!(parse_xpointer_id("xpointer(/)"), None);
        assert_eq!(parse_same_document_ref("#x"), Some("x"));
        assert_eq!(parse_same_document_ref("http://x"), None);
    }

    #[test]
    fn test_id_attribute_names() {
        assert_eq!("ID".parse::<IdAttributeName>().unwrap(), IdAttributeName::Local("ID".into()));
        assert_eq!(
            "wsu:Id".parse::<IdAttributeName>().unwrap(),
            IdAttributeName::Qualified {
                prefix: "wsu".into(),
                local: "Id".into()
            }
        );
        let expanded: IdAttributeName = format!("{{{}}}Id", ns::WSU).parse().unwrap();
        assert_eq!(expanded.to_string(), format!("{{{}}}Id", ns::WSU));
        assert!("".parse::<IdAttributeName>().is_err());
        assert!("{urn:x".parse::<IdAttributeName>().is_err());
    }

    #[test]
    fn test_resolve_unique_and_missing() {
        let doc = parse_str(r#"<r><a ID="one"/><b Id="two"/></r>"#).unwrap();
        let attrs = IdAttributes::default();
        let a = resolve_by_id(&doc, "one", &attrs).unwrap();
        assert_eq!(doc.element(&a).unwrap().name.local, "a");
        assert_eq!(resolve_by_id(&doc, "nope", &attrs), Err(IdLookupError::NotFound));
    }

    #[test]
    fn test_duplicate_ids_are_ambiguous() {
        let doc = parse_str(r#"<r><a ID="x"/><b ID="x"/></r>"#).unwrap();
        let attrs = IdAttributes::default();
        assert_eq!(resolve_by_id(&doc, "x", &attrs), Err(IdLookupError::Ambiguous(2)));

        let first = resolve_id_with(&doc, "x", &attrs, IdResolution::FirstMatch).unwrap();
        assert_eq!(doc.element(&first).unwrap().name.local, "a");
        let last = resolve_id_with(&doc, "x", &attrs, IdResolution::LastMatch).unwrap();
        assert_eq!(doc.element(&last).unwrap().name.local, "b");
        assert_eq!(
            resolve_id_with(&doc, "x", &attrs, IdResolution::Strict),
            Err(IdLookupError::Ambiguous(2))
        );
    }

    #[test]
    fn test_one_element_with_two_id_attributes_counts_once() {
        let doc = parse_str(r#"<r><a ID="x" Id="x"/></r>"#).unwrap();
        assert!(resolve_by_id(&doc, "x", &IdAttributes::default()).is_ok());
    }

    #[test]
    fn test_namespaced_id_attributes() {
        let doc = parse_str(&format!(
            r#"<r xmlns:wsu="{}"><Body wsu:Id="b"/><x xml:id="c"/></r>"#,
            ns::WSU
        ))
        .unwrap();
        let mut attrs = IdAttributes::default();
        assert_eq!(resolve_by_id(&doc, "b", &attrs), Err(IdLookupError::NotFound));
        assert!(resolve_by_id(&doc, "c", &attrs).is_ok());
        attrs.add("wsu:Id".parse().unwrap());
        assert!(resolve_by_id(&doc, "b", &attrs).is_ok());
    }

    #[test]
    fn test_resolution_policy_from_str() {
        assert_eq!("first-match".parse::<IdResolution>().unwrap(), IdResolution::FirstMatch);
        assert_eq!("LAST".parse::<IdResolution>().unwrap(), IdResolution::LastMatch);
        assert_eq!("strict".parse::<IdResolution>().unwrap(), IdResolution::Strict);
        assert!("random".parse::<IdResolution>().is_err());
    }
}
