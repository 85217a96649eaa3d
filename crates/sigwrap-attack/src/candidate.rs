#![forbid(unsafe_code)]

//! Mutated documents, before and after verification.

use crate::strategy::MutationStrategy;
use sigwrap_core::Error;
use sigwrap_dsig::{verify_document, DocumentVerdict, VerificationVerdict, VerifyContext};
use sigwrap_xml::{Document, NodePath};

/// A mutated document that has not been verified yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation {
    pub document: Document,
    pub strategy: MutationStrategy,
    /// Path of the attacked Signature in the input document.
    pub signature: NodePath,
    /// Leaf texts a positional consumer reads differently from the signed
    /// target.
    pub divergence: usize,
}

impl Mutation {
    /// Verify every signature of the mutated document.
    pub fn verify(self, ctx: &VerifyContext) -> Candidate {
        let verdict = verify_document(&self.document, ctx);
        Candidate {
            document: self.document,
            strategy: self.strategy,
            signature: self.signature,
            divergence: self.divergence,
            verdict,
        }
    }
}

/// A verified mutation. Owns its tree; nothing is shared with the input or
/// with other candidates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    document: Document,
    strategy: MutationStrategy,
    signature: NodePath,
    divergence: usize,
    verdict: DocumentVerdict,
}

impl Candidate {
    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn strategy(&self) -> MutationStrategy {
        self.strategy
    }

    pub fn signature(&self) -> &NodePath {
        &self.signature
    }

    pub fn divergence(&self) -> usize {
        self.divergence
    }

    /// Per-signature verdicts computed against the mutated document.
    pub fn verdicts(&self) -> &[VerificationVerdict] {
        &self.verdict.verdicts
    }

    pub fn document_verdict(&self) -> &DocumentVerdict {
        &self.verdict
    }

    pub fn is_valid(&self) -> bool {
        self.verdict.is_valid()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        sigwrap_xml::writer::to_bytes(&self.document)
    }
}

/// True when `candidate` fails no more checks than `baseline`, over the
/// same number of signatures with at least one of them readable.
pub(crate) fn no_worse_than(candidate: &DocumentVerdict, baseline: &DocumentVerdict) -> bool {
    !candidate.verdicts.is_empty()
        && candidate.verdicts.len() == baseline.verdicts.len()
        && candidate.signature_count() == baseline.signature_count()
        && candidate.failure_count() <= baseline.failure_count()
}
