#![forbid(unsafe_code)]

//! Reference processing for sigwrap.
//!
//! Resolves Reference URIs to node sets and runs the declared transforms
//! (enveloped-signature, the C14N family, base64) to produce the octets
//! that get digested.

pub mod base64_transform;
pub mod enveloped;
pub mod pipeline;
pub mod uri;

pub use pipeline::{Transform, TransformData, TransformPipeline, TransformStep};
pub use uri::{referenced_id, resolve_uri, ResolveError};
