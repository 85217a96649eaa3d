#![forbid(unsafe_code)]

//! Key and certificate loading from PEM and DER.
//!
//! Private keys: PKCS#8 (RSA, P-256), PKCS#1 RSA and SEC1 EC. Public keys:
//! SubjectPublicKeyInfo. Certificates: X.509, singly or as a PEM bundle.

use crate::key::{Key, KeyData};
use sigwrap_core::Error;
use std::path::Path;

/// Load an RSA private key from PEM data (PKCS#8 or PKCS#1).
pub fn load_rsa_private_pem(pem_str: &str) -> Result<Key, Error> {
    use rsa::pkcs1::DecodeRsaPrivateKey;
    use rsa::pkcs8::DecodePrivateKey;

    let pk = rsa::RsaPrivateKey::from_pkcs8_pem(pem_str)
        .or_else(|_| rsa::RsaPrivateKey::from_pkcs1_pem(pem_str))
        .map_err(|e| Error::Key(format!("failed to parse RSA private key PEM: {e}")))?;
    let public = pk.to_public_key();
    Ok(Key::new(KeyData::Rsa {
        private: Some(pk),
        public,
    }))
}

/// Load an EC P-256 private key from PEM data (PKCS#8 or SEC1).
pub fn load_ec_p256_private_pem(pem_str: &str) -> Result<Key, Error> {
    use p256::pkcs8::DecodePrivateKey;

    let sk = match p256::ecdsa::SigningKey::from_pkcs8_pem(pem_str) {
        Ok(sk) => sk,
        Err(_) => {
            let secret = p256::SecretKey::from_sec1_pem(pem_str)
                .map_err(|e| Error::Key(format!("failed to parse EC P-256 private key PEM: {e}")))?;
            p256::ecdsa::SigningKey::from(secret)
        }
    };
    let public = *sk.verifying_key();
    Ok(Key::new(KeyData::EcP256 {
        private: Some(sk),
        public,
    }))
}

/// Load a public key from SubjectPublicKeyInfo DER.
pub fn load_spki_der(spki_der: &[u8]) -> Result<Key, Error> {
    use spki::DecodePublicKey;

    if let Ok(public) = rsa::RsaPublicKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::Rsa { private: None, public }));
    }
    if let Ok(public) = p256::ecdsa::VerifyingKey::from_public_key_der(spki_der) {
        return Ok(Key::new(KeyData::EcP256 { private: None, public }));
    }
    Err(Error::Key("unsupported public key algorithm".into()))
}

/// Load the public key of a DER-encoded X.509 certificate.
pub fn load_x509_cert_der(data: &[u8]) -> Result<Key, Error> {
    use der::{Decode, Encode};
    use x509_cert::Certificate;

    let cert = Certificate::from_der(data)
        .map_err(|e| Error::Certificate(format!("failed to parse X.509 certificate: {e}")))?;
    let spki_der = cert
        .tbs_certificate
        .subject_public_key_info
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode SPKI: {e}")))?;

    let mut key = load_spki_der(&spki_der)?;
    key.x509_chain = vec![data.to_vec()];
    Ok(key)
}

/// Decode every `CERTIFICATE` block of a PEM bundle to DER.
pub fn load_certificates_pem(pem_data: &[u8]) -> Result<Vec<Vec<u8>>, Error> {
    let text = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Certificate(format!("invalid PEM encoding: {e}")))?;
    let mut certs = Vec::new();
    for block in pem_blocks(text) {
        let (label, der_bytes) = pem_rfc7468::decode_vec(block.as_bytes())
            .map_err(|e| Error::Certificate(format!("failed to decode PEM: {e}")))?;
        if label == "CERTIFICATE" {
            certs.push(der_bytes);
        }
    }
    if certs.is_empty() {
        return Err(Error::Certificate("no CERTIFICATE block found".into()));
    }
    Ok(certs)
}

/// Auto-detect key format and load from PEM data.
///
/// Tries RSA private, EC P-256 private, SPKI public key, then certificate.
pub fn load_pem_auto(pem_data: &[u8]) -> Result<Key, Error> {
    let pem_str = std::str::from_utf8(pem_data)
        .map_err(|e| Error::Key(format!("invalid PEM encoding: {e}")))?
        .trim();

    if let Ok(key) = load_rsa_private_pem(pem_str) {
        return Ok(key);
    }
    if let Ok(key) = load_ec_p256_private_pem(pem_str) {
        return Ok(key);
    }
    let first = pem_blocks(pem_str).into_iter().next().unwrap_or(pem_str);
    let (label, der_bytes) = pem_rfc7468::decode_vec(first.as_bytes())
        .map_err(|e| Error::Key(format!("failed to decode PEM: {e}")))?;
    match label {
        "PUBLIC KEY" => load_spki_der(&der_bytes),
        "CERTIFICATE" => {
            let mut key = load_x509_cert_der(&der_bytes)?;
            // Remaining blocks of a bundle become the rest of the chain.
            if let Ok(all) = load_certificates_pem(pem_str.as_bytes()) {
                key.x509_chain = all;
            }
            Ok(key)
        }
        _ => Err(Error::Key(format!("unsupported PEM label: {label}"))),
    }
}

/// Load a key from a file: PEM if it looks like PEM, else DER (SPKI or
/// certificate).
pub fn load_key_file(path: &Path) -> Result<Key, Error> {
    let data = std::fs::read(path)?;
    if data.starts_with(b"-----BEGIN") || data.windows(10).any(|w| w == b"-----BEGIN") {
        return load_pem_auto(&data);
    }
    load_spki_der(&data)
        .or_else(|_| load_x509_cert_der(&data))
        .map_err(|_| {
            Error::Key(format!(
                "unable to auto-detect key format from file: {}",
                path.display()
            ))
        })
}

/// Load certificates from a PEM bundle or a single DER certificate file.
pub fn load_certificate_file(path: &Path) -> Result<Vec<Vec<u8>>, Error> {
    let data = std::fs::read(path)?;
    if data.windows(10).any(|w| w == b"-----BEGIN") {
        return load_certificates_pem(&data);
    }
    load_x509_cert_der(&data)?;
    Ok(vec![data])
}

fn pem_blocks(text: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("-----BEGIN ") {
        let after = &rest[start..];
        let Some(end_marker) = after.find("-----END ") else {
            break;
        };
        let tail = &after[end_marker + 9..];
        let Some(close) = tail.find("-----") else {
            break;
        };
        let end = end_marker + 9 + close + 5;
        blocks.push(&after[..end]);
        rest = &after[end..];
    }
    blocks
}

#[cfg(test)]
mod tests {
    use super::*;
    use rsa::pkcs8::EncodePrivateKey;

    #[test]
    fn test_load_rsa_pkcs8_pem() {
        let pk = rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap();
        let pem = pk.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        let key = load_pem_auto(pem.as_bytes()).unwrap();
        assert!(key.has_private());
        assert!(matches!(key.data, KeyData::Rsa { .. }));
    }

    #[test]
    fn test_load_ec_pkcs8_pem() {
        let kp = rcgen::KeyPair::generate().unwrap();
        let key = load_pem_auto(kp.serialize_pem().as_bytes()).unwrap();
        assert!(matches!(key.data, KeyData::EcP256 { private: Some(_), .. }));
    }

    #[test]
    fn test_load_certificate_bundle() {
        let kp = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["a.example".into()])
            .unwrap()
            .self_signed(&kp)
            .unwrap();
        let bundle = format!("{}\n{}", cert.pem(), cert.pem());
        let certs = load_certificates_pem(bundle.as_bytes()).unwrap();
        assert_eq!(certs.len(), 2);
        assert_eq!(certs[0], cert.der().to_vec());

        let key = load_pem_auto(cert.pem().as_bytes()).unwrap();
        assert!(!key.has_private());
        assert_eq!(key.x509_chain.len(), 1);
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(load_pem_auto(b"not a key").is_err());
        assert!(load_certificates_pem(b"-----BEGIN NOTHING-----").is_err());
        assert!(load_spki_der(&[0x30, 0x00]).is_err());
    }
}
