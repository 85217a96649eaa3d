#![forbid(unsafe_code)]

//! XML-DSig signature verification.
//!
//! Processing order per signature:
//! 1. For each `<Reference>`: resolve the URI, run the transforms, digest,
//!    compare with DigestValue
//! 2. Canonicalize `<SignedInfo>` and check SignatureValue with the KeyInfo
//!    key
//! 3. Evaluate the KeyInfo certificate chain against the trust anchors
//!
//! Every step runs regardless of the outcome of the others; the verdict
//! keeps all of them.

use crate::context::VerifyContext;
use crate::model::{self, Reference, Signature, UnreadableSignature};
use sigwrap_keys::{evaluate_trust, TrustResult};
use sigwrap_transforms::{resolve_uri, ResolveError, TransformData, TransformPipeline};
use sigwrap_xml::{Document, NodePath};
use std::fmt;

/// What a Reference URI pointed at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    WholeDocument,
    Element(NodePath),
    Failed(ResolveError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceResult {
    pub uri: String,
    pub resolution: Resolution,
    pub digest_match: bool,
    /// `None` when no digest could be computed.
    pub computed_digest: Option<Vec<u8>>,
    pub failure: Option<String>,
}

/// Everything that was checked for one Signature.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationVerdict {
    /// Path of the `<ds:Signature>` element.
    pub signature: NodePath,
    pub references: Vec<ReferenceResult>,
    pub signature_value_valid: bool,
    pub signature_value_failure: Option<String>,
    pub chain_trust: TrustResult,
}

impl VerificationVerdict {
    /// Every reference digest matches and the signature value verifies.
    pub fn is_cryptographically_valid(&self) -> bool {
        self.signature_value_valid && self.references.iter().all(|r| r.digest_match)
    }

    /// Cryptographically valid and signed by a trusted key.
    pub fn is_valid(&self) -> bool {
        self.is_cryptographically_valid() && self.chain_trust.is_trusted()
    }

    /// Number of failed checks, trust included.
    pub fn failure_count(&self) -> usize {
        self.references.iter().filter(|r| !r.digest_match).count()
            + usize::from(!self.signature_value_valid)
            + usize::from(!self.chain_trust.is_trusted())
    }

    /// First element a Reference resolved to, if any.
    pub fn first_target(&self) -> Option<&NodePath> {
        self.references.iter().find_map(|r| match &r.resolution {
            Resolution::Element(p) => Some(p),
            _ => None,
        })
    }
}

impl fmt::Display for VerificationVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = if self.is_valid() { "valid" } else { "invalid" };
        writeln!(f, "Signature at {}: {status}", self.signature)?;
        for r in &self.references {
            match &r.failure {
                None => writeln!(f, "  Reference {:?}: digest ok", r.uri)?,
                Some(reason) => writeln!(f, "  Reference {:?}: {reason}", r.uri)?,
            }
        }
        match &self.signature_value_failure {
            None => writeln!(f, "  SignatureValue: ok")?,
            Some(reason) => writeln!(f, "  SignatureValue: {reason}")?,
        }
        write!(f, "  Trust: {}", self.chain_trust)
    }
}

/// Verdicts for every Signature of a document.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DocumentVerdict {
    pub verdicts: Vec<VerificationVerdict>,
    /// Signatures that could not be read; each counts as one failure.
    pub unreadable: Vec<UnreadableSignature>,
}

impl DocumentVerdict {
    /// At least one signature, and all of them readable and valid.
    pub fn is_valid(&self) -> bool {
        self.unreadable.is_empty()
            && !self.verdicts.is_empty()
            && self.verdicts.iter().all(VerificationVerdict::is_valid)
    }

    pub fn signature_count(&self) -> usize {
        self.verdicts.len() + self.unreadable.len()
    }

    /// Failed checks over all signatures, unreadable ones included.
    pub fn failure_count(&self) -> usize {
        self.verdicts.iter().map(VerificationVerdict::failure_count).sum::<usize>() + self.unreadable.len()
    }
}

/// Verify one Signature of `doc`.
pub fn verify(doc: &Document, signature: &Signature, ctx: &VerifyContext) -> VerificationVerdict {
    let references = signature
        .signed_info
        .references
        .iter()
        .map(|r| verify_reference(doc, &signature.path, r, ctx))
        .collect();

    let (signature_value_valid, signature_value_failure) =
        match check_signature_value(doc, signature, ctx) {
            Ok(()) => (true, None),
            Err(reason) => {
                tracing::debug!(signature = %signature.path, %reason, "signature value rejected");
                (false, Some(reason))
            }
        };

    let chain_trust = match &signature.key_info {
        Some(info) => evaluate_trust(info, ctx.trust_anchors.as_ref(), ctx.verification_time),
        None if ctx.trust_anchors.is_none() => TrustResult::Unevaluated,
        None => TrustResult::Untrusted("signature has no KeyInfo".into()),
    };

    VerificationVerdict {
        signature: signature.path.clone(),
        references,
        signature_value_valid,
        signature_value_failure,
        chain_trust,
    }
}

/// Extract and verify every Signature of `doc`.
pub fn verify_document(doc: &Document, ctx: &VerifyContext) -> DocumentVerdict {
    let extraction = model::extract(doc);
    DocumentVerdict {
        verdicts: extraction.signatures.iter().map(|s| verify(doc, s, ctx)).collect(),
        unreadable: extraction.unreadable,
    }
}

fn verify_reference(
    doc: &Document,
    signature: &NodePath,
    reference: &Reference,
    ctx: &VerifyContext,
) -> ReferenceResult {
    let (resolution, octets) = reference_octets(doc, signature, reference, ctx);
    let computed = octets.and_then(|bytes| {
        sigwrap_crypto::digest::digest(&reference.digest_method, &bytes).map_err(|e| e.to_string())
    });

    let (digest_match, computed_digest, failure) = match computed {
        Ok(d) if d == reference.digest_value => (true, Some(d), None),
        Ok(d) => (false, Some(d), Some("digest mismatch".to_owned())),
        Err(reason) => (false, None, Some(reason)),
    };
    tracing::debug!(uri = %reference.uri, digest_match, "reference checked");

    ReferenceResult {
        uri: reference.uri.clone(),
        resolution,
        digest_match,
        computed_digest,
        failure,
    }
}

/// Resolve a Reference and run its transforms; the octets are the digest
/// input.
pub(crate) fn reference_octets(
    doc: &Document,
    signature: &NodePath,
    reference: &Reference,
    ctx: &VerifyContext,
) -> (Resolution, Result<Vec<u8>, String>) {
    let set = match resolve_uri(doc, &reference.uri, &ctx.id_attrs, ctx.id_resolution) {
        Ok(set) => set,
        Err(e) => {
            let reason = e.to_string();
            return (Resolution::Failed(e), Err(reason));
        }
    };
    let resolution = match set.apex() {
        Some(p) => Resolution::Element(p.clone()),
        None => Resolution::WholeDocument,
    };
    let octets = TransformPipeline::from_steps(&reference.transforms, signature)
        .digest_input(doc, TransformData::Nodes(set))
        .map_err(|e| e.to_string());
    (resolution, octets)
}

fn check_signature_value(
    doc: &Document,
    signature: &Signature,
    ctx: &VerifyContext,
) -> Result<(), String> {
    let si = &signature.signed_info;
    if !ctx.allows(si.c14n_mode) {
        return Err(format!(
            "canonicalization method {} is not allowed",
            si.c14n_mode.uri()
        ));
    }
    let canonical = sigwrap_c14n::canonicalize_subtree(doc, &si.path, si.c14n_mode, &si.inclusive_prefixes)
        .map_err(|e| e.to_string())?;

    let key = signature
        .key_info
        .as_ref()
        .map(|info| info.verification_key())
        .transpose()
        .map_err(|e| e.to_string())?
        .flatten()
        .ok_or_else(|| "no key material in KeyInfo".to_owned())?;

    let algorithm = sigwrap_crypto::sign::from_uri(&si.signature_method).map_err(|e| e.to_string())?;
    match algorithm.verify(&key, &canonical, &signature.signature_value) {
        Ok(true) => Ok(()),
        Ok(false) => Err("signature value does not verify".into()),
        Err(e) => Err(e.to_string()),
    }
}
