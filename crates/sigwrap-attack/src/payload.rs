#![forbid(unsafe_code)]

//! Rewriting the text of a forged payload.

use sigwrap_core::{ns, Error};
use sigwrap_xml::{Element, XmlNode};
use std::str::FromStr;

/// Text written into the first leaf when no rule matches.
pub const FORGED_MARKER: &str = "forged";

/// Rules `local-name -> new text` applied to the leaf elements of a forged
/// copy.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PayloadRewrite {
    rules: Vec<(String, String)>,
}

impl PayloadRewrite {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a rule; a later rule for the same local name replaces the
    /// earlier one.
    pub fn with_rule(mut self, local: &str, text: &str) -> Self {
        self.add_rule(local, text);
        self
    }

    pub fn add_rule(&mut self, local: &str, text: &str) {
        match self.rules.iter_mut().find(|(l, _)| l == local) {
            Some(rule) => rule.1 = text.to_owned(),
            None => self.rules.push((local.to_owned(), text.to_owned())),
        }
    }

    pub fn rules(&self) -> &[(String, String)] {
        &self.rules
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Rewrite the leaves of `el` in place; returns how many texts changed.
    /// Signature subtrees are not payload and stay as they are.
    ///
    /// Every leaf element whose local name has a rule gets that text. If
    /// none does, the first leaf with non-blank text gets
    /// [`FORGED_MARKER`].
    pub fn apply(&self, el: &mut Element) -> usize {
        let mut changed = 0;
        if !self.rules.is_empty() {
            for_each_leaf(el, &mut |leaf| {
                if let Some((_, text)) = self.rules.iter().find(|(l, _)| *l == leaf.name.local) {
                    leaf.set_text(text);
                    changed += 1;
                }
                true
            });
        }
        if changed == 0 {
            for_each_leaf(el, &mut |leaf| {
                if leaf.text().trim().is_empty() {
                    return true;
                }
                let marker = if leaf.text() == FORGED_MARKER {
                    format!("{FORGED_MARKER}-{FORGED_MARKER}")
                } else {
                    FORGED_MARKER.to_owned()
                };
                leaf.set_text(&marker);
                changed = 1;
                false
            });
        }
        changed
    }
}

impl FromStr for PayloadRewrite {
    type Err = Error;

    /// `Local=text` rules separated by `;`.
    fn from_str(s: &str) -> Result<Self, Error> {
        let mut rewrite = PayloadRewrite::new();
        for rule in s.split(';').map(str::trim).filter(|r| !r.is_empty()) {
            let (local, text) = rule
                .split_once('=')
                .filter(|(l, _)| !l.trim().is_empty())
                .ok_or_else(|| Error::Other(format!("payload rule must be NAME=TEXT: {rule:?}")))?;
            rewrite.add_rule(local.trim(), text);
        }
        Ok(rewrite)
    }
}

/// Visit leaf elements outside Signatures in document order until `f`
/// returns false.
fn for_each_leaf(el: &mut Element, f: &mut dyn FnMut(&mut Element) -> bool) -> bool {
    if el.name.is(ns::DSIG, ns::node::SIGNATURE) {
        return true;
    }
    if el.is_leaf() {
        return f(el);
    }
    for child in &mut el.children {
        if let XmlNode::Element(c) = child {
            if !for_each_leaf(c, f) {
                return false;
            }
        }
    }
    true
}

/// `(local name, first text)` of every leaf under `el`, in document order.
/// The first text is what a consumer reading `firstChild` sees.
pub fn leaf_texts(el: &Element) -> Vec<(String, String)> {
    let mut out = Vec::new();
    collect_leaves(el, &mut out);
    out
}

fn collect_leaves(el: &Element, out: &mut Vec<(String, String)>) {
    if el.is_leaf() {
        out.push((el.name.local.clone(), el.first_text().unwrap_or_default().to_owned()));
        return;
    }
    for c in el.child_elements() {
        collect_leaves(c, out);
    }
}

/// Number of leaf texts that differ between two views of a payload.
pub fn divergence(genuine: &Element, consumed: &Element) -> usize {
    let a = leaf_texts(genuine);
    let b = leaf_texts(consumed);
    let differing = a.iter().zip(&b).filter(|(x, y)| x != y).count();
    differing + a.len().abs_diff(b.len())
}
