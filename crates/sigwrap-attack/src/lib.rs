#![forbid(unsafe_code)]

//! Signature-wrapping attacks against XML-DSig protected documents.
//!
//! [`run`] verifies the input as a baseline, then lazily yields mutated
//! documents ([`Candidate`]s) that still pass verification while a
//! consumer reading the document by position sees attacker-controlled
//! content. [`mutate::generate`] builds a single mutation; [`forge`] builds
//! stripped and re-signed documents for relying parties that do not pin
//! their signer.

pub mod candidate;
pub mod config;
pub mod forge;
pub mod mutate;
pub mod orchestrator;
pub mod payload;
pub mod strategy;

#[cfg(test)]
mod testutil;

pub use candidate::{Candidate, Mutation};
pub use config::{AttackConfig, DEFAULT_WRAPPER_NAME};
pub use forge::{Forger, Forgery};
pub use mutate::{generate, signed_target, MutationError, SignedTarget, VOID_NAMESPACE};
pub use orchestrator::{run, AttackRun};
pub use payload::{PayloadRewrite, FORGED_MARKER};
pub use strategy::{
    IdCollisionVariant, MutationStrategy, RelocationVariant, StrategyClass, WrapperPlacement,
};
