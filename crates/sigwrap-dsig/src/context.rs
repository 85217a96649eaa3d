#![forbid(unsafe_code)]

//! Verification context: the configuration every verification runs under.

use sigwrap_c14n::C14nMode;
use sigwrap_keys::TrustAnchors;
use sigwrap_xml::{IdAttributes, IdResolution};
use std::collections::BTreeSet;

/// Configuration for XML-DSig verification and signing.
#[derive(Debug, Clone)]
pub struct VerifyContext {
    /// Attribute names treated as element IDs.
    pub id_attrs: IdAttributes,
    /// Which element wins when an ID is carried more than once.
    pub id_resolution: IdResolution,
    /// Canonicalization methods accepted for `SignedInfo`.
    pub c14n_allow_list: BTreeSet<C14nMode>,
    /// `None` leaves chain trust unevaluated.
    pub trust_anchors: Option<TrustAnchors>,
    /// Clock override for certificate validity checks.
    pub verification_time: Option<der::DateTime>,
}

impl Default for VerifyContext {
    fn default() -> Self {
        Self {
            id_attrs: IdAttributes::default(),
            id_resolution: IdResolution::default(),
            c14n_allow_list: C14nMode::ALL.into_iter().collect(),
            trust_anchors: None,
            verification_time: None,
        }
    }
}

impl VerifyContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_trust_anchors(mut self, anchors: TrustAnchors) -> Self {
        self.trust_anchors = Some(anchors);
        self
    }

    pub fn with_id_resolution(mut self, policy: IdResolution) -> Self {
        self.id_resolution = policy;
        self
    }

    pub fn with_id_attrs(mut self, id_attrs: IdAttributes) -> Self {
        self.id_attrs = id_attrs;
        self
    }

    pub fn with_verification_time(mut self, time: der::DateTime) -> Self {
        self.verification_time = Some(time);
        self
    }

    /// Restrict the accepted `SignedInfo` canonicalization methods.
    pub fn with_c14n_allow_list(mut self, modes: impl IntoIterator<Item = C14nMode>) -> Self {
        self.c14n_allow_list = modes.into_iter().collect();
        self
    }

    pub fn allows(&self, mode: C14nMode) -> bool {
        self.c14n_allow_list.contains(&mode)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_allow_every_mode() {
        let ctx = VerifyContext::new();
        assert!(C14nMode::ALL.into_iter().all(|m| ctx.allows(m)));
        assert_eq!(ctx.id_resolution, IdResolution::FirstMatch);
        assert!(ctx.trust_anchors.is_none());
    }

    #[test]
    fn test_allow_list_restricts() {
        let ctx = VerifyContext::new().with_c14n_allow_list([C14nMode::Exclusive]);
        assert!(ctx.allows(C14nMode::Exclusive));
        assert!(!ctx.allows(C14nMode::ExclusiveWithComments));
        assert!(!ctx.allows(C14nMode::Inclusive));
    }
}
