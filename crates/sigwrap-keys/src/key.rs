#![forbid(unsafe_code)]

//! Key types and data structures.

use sigwrap_crypto::SigningKey;

/// The underlying key data.
#[derive(Clone)]
pub enum KeyData {
    Rsa {
        private: Option<rsa::RsaPrivateKey>,
        public: rsa::RsaPublicKey,
    },
    EcP256 {
        private: Option<p256::ecdsa::SigningKey>,
        public: p256::ecdsa::VerifyingKey,
    },
}

impl std::fmt::Debug for KeyData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rsa { private, .. } => {
                if private.is_some() {
                    write!(f, "RSA private+public key")
                } else {
                    write!(f, "RSA public key")
                }
            }
            Self::EcP256 { private, .. } => {
                if private.is_some() {
                    write!(f, "EC P-256 private+public key")
                } else {
                    write!(f, "EC P-256 public key")
                }
            }
        }
    }
}

impl From<SigningKey> for KeyData {
    fn from(key: SigningKey) -> Self {
        match key {
            SigningKey::Rsa(pk) => KeyData::Rsa {
                public: pk.to_public_key(),
                private: Some(pk),
            },
            SigningKey::RsaPublic(public) => KeyData::Rsa { private: None, public },
            SigningKey::EcP256(sk) => KeyData::EcP256 {
                public: *sk.verifying_key(),
                private: Some(sk),
            },
            SigningKey::EcP256Public(public) => KeyData::EcP256 { private: None, public },
        }
    }
}

/// A key, optionally named, with the certificates it was loaded with.
#[derive(Debug, Clone)]
pub struct Key {
    pub name: Option<String>,
    pub data: KeyData,
    /// X.509 certificate chain (DER-encoded), leaf first when known.
    pub x509_chain: Vec<Vec<u8>>,
}

impl Key {
    pub fn new(data: KeyData) -> Self {
        Self {
            name: None,
            data,
            x509_chain: Vec::new(),
        }
    }

    /// Set the key name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// The private key if present, else the public key.
    pub fn to_signing_key(&self) -> SigningKey {
        match &self.data {
            KeyData::Rsa { private: Some(pk), .. } => SigningKey::Rsa(pk.clone()),
            KeyData::Rsa { public, .. } => SigningKey::RsaPublic(public.clone()),
            KeyData::EcP256 { private: Some(sk), .. } => SigningKey::EcP256(sk.clone()),
            KeyData::EcP256 { public, .. } => SigningKey::EcP256Public(*public),
        }
    }

    pub fn has_private(&self) -> bool {
        matches!(
            &self.data,
            KeyData::Rsa { private: Some(_), .. } | KeyData::EcP256 { private: Some(_), .. }
        )
    }
}
