#![forbid(unsafe_code)]

//! Core types shared by every sigwrap crate: the error type, algorithm
//! identifiers and the XML-DSig element and namespace names.

pub mod algorithm;
pub mod error;
pub mod ns;

pub use error::{Error, Result};
