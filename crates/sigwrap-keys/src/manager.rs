#![forbid(unsafe_code)]

//! Trust anchors for signer evaluation.

use crate::loader;
use sigwrap_core::Error;
use sigwrap_crypto::SigningKey;

/// Certificates and raw keys the verifier trusts.
///
/// A signature is attributed to a trusted signer when its certificate
/// chains to one of the anchor certificates, or when the key it verifies
/// under is pinned (directly, or as an anchor certificate's key).
#[derive(Debug, Clone, Default)]
pub struct TrustAnchors {
    certificates: Vec<Vec<u8>>,
    pinned_keys: Vec<SigningKey>,
}

impl TrustAnchors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a DER certificate; rejects anything that does not parse.
    pub fn add_certificate(&mut self, der_bytes: Vec<u8>) -> Result<(), Error> {
        loader::load_x509_cert_der(&der_bytes)?;
        if !self.certificates.contains(&der_bytes) {
            self.certificates.push(der_bytes);
        }
        Ok(())
    }

    pub fn add_pinned_key(&mut self, key: SigningKey) {
        self.pinned_keys.push(key.to_public());
    }

    pub fn certificates(&self) -> &[Vec<u8>] {
        &self.certificates
    }

    pub fn pinned_keys(&self) -> &[SigningKey] {
        &self.pinned_keys
    }

    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.pinned_keys.is_empty()
    }

    /// True when `key` is pinned or is the public key of an anchor
    /// certificate.
    pub fn pins(&self, key: &SigningKey) -> bool {
        if self.pinned_keys.iter().any(|k| k.same_public_key(key)) {
            return true;
        }
        self.certificates.iter().any(|der_bytes| {
            loader::load_x509_cert_der(der_bytes)
                .map(|k| k.to_signing_key().same_public_key(key))
                .unwrap_or(false)
        })
    }
}
