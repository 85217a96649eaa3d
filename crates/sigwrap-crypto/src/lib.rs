#![forbid(unsafe_code)]

//! Cryptographic primitives used by sigwrap's XML-DSig processing.
//!
//! Thin adapters from algorithm URIs to the RustCrypto digest and signature
//! crates. No primitive is implemented here.

pub mod digest;
pub mod sign;

pub use digest::DigestAlgorithm;
pub use sign::{SignatureAlgorithm, SigningKey};
