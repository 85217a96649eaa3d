#![forbid(unsafe_code)]

//! XML Digital Signature (XML-DSig) model, verification and signing.
//!
//! [`model::extract`] reads the Signature elements of a document into typed
//! views, [`verify::verify`] checks one of them without stopping at the
//! first failure, and [`sign::sign`] fills in signature templates.

pub mod context;
pub mod model;
pub mod sign;
pub mod verify;

pub use context::VerifyContext;
pub use model::{extract, Extraction, ExtractionError, Reference, Signature, SignedInfo, UnreadableSignature};
pub use sign::{sign, ReferenceTemplate, SignatureTemplate};
pub use verify::{
    verify, verify_document, DocumentVerdict, ReferenceResult, Resolution, VerificationVerdict,
};
