#![forbid(unsafe_code)]

//! XML-DSig analysis and signature-wrapping attacks.
//!
//! Re-exports the workspace crates under short names and hosts the
//! file-based configuration used by the `sigwrap` binary.

pub mod config;

pub use sigwrap_attack as attack;
pub use sigwrap_c14n as c14n;
pub use sigwrap_core as core;
pub use sigwrap_crypto as crypto;
pub use sigwrap_dsig as dsig;
pub use sigwrap_keys as keys;
pub use sigwrap_transforms as transforms;
pub use sigwrap_xml as xml;

pub use config::CliConfig;
