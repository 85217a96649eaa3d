#![forbid(unsafe_code)]

//! Keys, KeyInfo processing and signer trust for sigwrap.
//!
//! Loads RSA and P-256 keys and X.509 certificates from PEM or DER, reads
//! and writes `<ds:KeyInfo>`, and evaluates whether a signing certificate
//! chains to a configured set of trust anchors.

pub mod key;
pub mod keyinfo;
pub mod loader;
pub mod manager;
pub mod x509;

pub use key::{Key, KeyData};
pub use keyinfo::{parse_key_info, KeyInfoData};
pub use manager::TrustAnchors;
pub use x509::{evaluate_trust, TrustResult};
