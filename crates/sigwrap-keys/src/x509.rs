#![forbid(unsafe_code)]

//! X.509 chain validation and signer trust evaluation.
//!
//! The leaf certificate of a KeyInfo is walked up to one of the trust
//! anchors through any intermediates the KeyInfo carries, checking each
//! certificate signature and validity period on the way.

use crate::keyinfo::KeyInfoData;
use crate::loader;
use crate::manager::TrustAnchors;
use der::{Decode, Encode};
use sigwrap_core::Error;
use std::fmt;
use x509_cert::Certificate;

const MAX_CHAIN_DEPTH: usize = 10;

/// Outcome of evaluating who signed a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrustResult {
    /// No trust anchors were supplied, so trust was not evaluated.
    Unevaluated,
    Trusted,
    Untrusted(String),
}

impl TrustResult {
    pub fn is_trusted(&self) -> bool {
        matches!(self, TrustResult::Trusted)
    }
}

impl fmt::Display for TrustResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TrustResult::Unevaluated => write!(f, "unevaluated"),
            TrustResult::Trusted => write!(f, "trusted"),
            TrustResult::Untrusted(reason) => write!(f, "untrusted: {reason}"),
        }
    }
}

/// Decide whether the key material in `info` belongs to a trusted signer.
///
/// `time` overrides the clock for validity checks.
pub fn evaluate_trust(
    info: &KeyInfoData,
    anchors: Option<&TrustAnchors>,
    time: Option<der::DateTime>,
) -> TrustResult {
    let Some(anchors) = anchors else {
        return TrustResult::Unevaluated;
    };
    if anchors.is_empty() {
        return TrustResult::Untrusted("trust anchor set is empty".into());
    }

    if let Some(leaf_der) = info.leaf_certificate() {
        let leaf_key = match loader::load_x509_cert_der(leaf_der) {
            Ok(k) => k.to_signing_key(),
            Err(e) => return TrustResult::Untrusted(e.to_string()),
        };
        if let Some(kv) = &info.key_value {
            if !kv.same_public_key(&leaf_key) {
                return TrustResult::Untrusted("KeyValue does not match the certificate".into());
            }
        }
        if anchors.pinned_keys().iter().any(|k| k.same_public_key(&leaf_key)) {
            return TrustResult::Trusted;
        }
        let verification_time = match resolve_verification_time(time) {
            Ok(t) => t,
            Err(e) => return TrustResult::Untrusted(e.to_string()),
        };
        return match validate_cert_chain(
            leaf_der,
            &info.certificates,
            anchors.certificates(),
            &verification_time,
        ) {
            Ok(()) => TrustResult::Trusted,
            Err(e) => {
                tracing::debug!(error = %e, "certificate chain rejected");
                TrustResult::Untrusted(e.to_string())
            }
        };
    }

    match &info.key_value {
        Some(kv) if anchors.pins(kv) => TrustResult::Trusted,
        Some(_) => TrustResult::Untrusted("KeyValue is not a pinned key".into()),
        None => TrustResult::Untrusted("KeyInfo carries no key material".into()),
    }
}

/// Validate a chain from `leaf_der` to one of `trusted`, using
/// `additional` as candidate intermediates.
pub fn validate_cert_chain(
    leaf_der: &[u8],
    additional: &[Vec<u8>],
    trusted: &[Vec<u8>],
    verification_time: &der::DateTime,
) -> Result<(), Error> {
    let leaf = Certificate::from_der(leaf_der)
        .map_err(|e| Error::Certificate(format!("failed to parse leaf certificate: {e}")))?;

    let available: Vec<(Certificate, &[u8])> = additional
        .iter()
        .filter(|der_bytes| der_bytes.as_slice() != leaf_der)
        .filter_map(|der_bytes| Certificate::from_der(der_bytes).ok().map(|c| (c, der_bytes.as_slice())))
        .collect();
    let trusted: Vec<(Certificate, &[u8])> = trusted
        .iter()
        .filter_map(|der_bytes| Certificate::from_der(der_bytes).ok().map(|c| (c, der_bytes.as_slice())))
        .collect();
    if trusted.is_empty() {
        return Err(Error::Certificate("no trusted certificates available".into()));
    }

    check_cert_time_validity(&leaf, verification_time)?;
    build_and_verify_chain(&leaf, leaf_der, &available, &trusted, verification_time)
}

/// Index of the end-entity certificate in `certs`: the first certificate
/// that is not the issuer of another one in the set.
pub fn find_leaf(certs: &[Vec<u8>]) -> Option<usize> {
    let parsed: Vec<Option<(Vec<u8>, Vec<u8>)>> = certs
        .iter()
        .map(|der_bytes| {
            let c = Certificate::from_der(der_bytes).ok()?;
            let subject = c.tbs_certificate.subject.to_der().ok()?;
            let issuer = c.tbs_certificate.issuer.to_der().ok()?;
            Some((subject, issuer))
        })
        .collect();

    let issues_another = |i: usize, subject: &[u8]| {
        parsed
            .iter()
            .enumerate()
            .any(|(j, other)| j != i && other.as_ref().is_some_and(|(_, iss)| iss == subject))
    };
    parsed
        .iter()
        .enumerate()
        .find(|(i, entry)| entry.as_ref().is_some_and(|(subject, _)| !issues_another(*i, subject)))
        .map(|(i, _)| i)
        .or(if certs.is_empty() { None } else { Some(0) })
}

/// Parse a verification time, `YYYY-MM-DD+HH:MM:SS` or
/// `YYYY-MM-DDTHH:MM:SS`.
pub fn parse_verification_time(s: &str) -> Result<der::DateTime, Error> {
    let s = s.trim();
    let invalid = || Error::Certificate(format!("invalid verification time format: {s}"));
    if s.len() < 19 || !s.is_ascii() {
        return Err(invalid());
    }
    let field = |range: std::ops::Range<usize>| s[range].parse::<u16>().map_err(|_| invalid());

    let year = field(0..4)?;
    let month = field(5..7)? as u8;
    let day = field(8..10)? as u8;
    let hour = field(11..13)? as u8;
    let min = field(14..16)? as u8;
    let sec = field(17..19)? as u8;

    der::DateTime::new(year, month, day, hour, min, sec)
        .map_err(|e| Error::Certificate(format!("invalid verification time: {e}")))
}

/// The override if given, else the current system time.
pub fn resolve_verification_time(
    override_time: Option<der::DateTime>,
) -> Result<der::DateTime, Error> {
    if let Some(t) = override_time {
        return Ok(t);
    }
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| Error::Certificate(format!("system time error: {e}")))?;
    der::DateTime::from_unix_duration(now)
        .map_err(|e| Error::Certificate(format!("time conversion error: {e}")))
}

fn check_cert_time_validity(cert: &Certificate, verif_time: &der::DateTime) -> Result<(), Error> {
    let not_before = cert.tbs_certificate.validity.not_before.to_date_time();
    let not_after = cert.tbs_certificate.validity.not_after.to_date_time();

    if *verif_time < not_before {
        return Err(Error::Certificate(format!(
            "certificate is not yet valid (notBefore: {not_before})"
        )));
    }
    if *verif_time > not_after {
        return Err(Error::Certificate(format!(
            "certificate has expired (notAfter: {not_after})"
        )));
    }
    Ok(())
}

fn build_and_verify_chain(
    leaf: &Certificate,
    leaf_der: &[u8],
    available: &[(Certificate, &[u8])],
    trusted: &[(Certificate, &[u8])],
    verif_time: &der::DateTime,
) -> Result<(), Error> {
    // Leaf is itself an anchor; its validity was checked by the caller.
    if trusted.iter().any(|(_, der_bytes)| *der_bytes == leaf_der) {
        return Ok(());
    }

    let leaf_issuer = leaf.tbs_certificate.issuer.to_der().unwrap_or_default();
    let leaf_subject = leaf.tbs_certificate.subject.to_der().unwrap_or_default();
    if leaf_issuer == leaf_subject {
        let anchored = trusted.iter().any(|(tc, _)| {
            tc.tbs_certificate.subject.to_der().unwrap_or_default() == leaf_issuer
                && verify_cert_signature(leaf, &tc.tbs_certificate.subject_public_key_info).is_ok()
        });
        if anchored {
            return Ok(());
        }
        return Err(Error::Certificate(
            "self-signed certificate not in trusted store".into(),
        ));
    }

    let mut current = leaf.clone();
    let mut visited: Vec<&[u8]> = vec![leaf_der];

    for _ in 0..MAX_CHAIN_DEPTH {
        let issuer = current.tbs_certificate.issuer.to_der().unwrap_or_default();

        let issuing_anchor = trusted.iter().find(|(tc, _)| {
            tc.tbs_certificate.subject.to_der().unwrap_or_default() == issuer
                && verify_cert_signature(&current, &tc.tbs_certificate.subject_public_key_info)
                    .is_ok()
        });
        if let Some((tc, _)) = issuing_anchor {
            check_cert_time_validity(tc, verif_time)?;
            return Ok(());
        }

        let intermediate = available.iter().find(|(ic, ic_der)| {
            !visited.contains(ic_der)
                && ic.tbs_certificate.subject.to_der().unwrap_or_default() == issuer
                && verify_cert_signature(&current, &ic.tbs_certificate.subject_public_key_info)
                    .is_ok()
        });
        match intermediate {
            Some((ic, ic_der)) => {
                check_cert_time_validity(ic, verif_time)?;
                visited.push(ic_der);
                current = ic.clone();
            }
            None => {
                return Err(Error::Certificate(
                    "cannot find issuer certificate (incomplete chain)".into(),
                ))
            }
        }
    }

    Err(Error::Certificate("certificate chain too long".into()))
}

fn verify_cert_signature(
    cert: &Certificate,
    issuer_spki: &spki::SubjectPublicKeyInfoOwned,
) -> Result<(), Error> {
    let tbs_der = cert
        .tbs_certificate
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode TBS: {e}")))?;
    let sig_bytes = cert
        .signature
        .as_bytes()
        .ok_or_else(|| Error::Certificate("no signature bytes".into()))?;
    let spki_der = issuer_spki
        .to_der()
        .map_err(|e| Error::Certificate(format!("failed to encode issuer SPKI: {e}")))?;

    const SHA1_RSA: &str = "1.2.840.113549.1.1.5";
    const SHA256_RSA: &str = "1.2.840.113549.1.1.11";
    const SHA384_RSA: &str = "1.2.840.113549.1.1.12";
    const SHA512_RSA: &str = "1.2.840.113549.1.1.13";
    const ECDSA_SHA256: &str = "1.2.840.10045.4.3.2";

    let oid = cert.signature_algorithm.oid.to_string();
    match oid.as_str() {
        SHA1_RSA => verify_rsa_signature::<sha1::Sha1>(&spki_der, &tbs_der, sig_bytes),
        SHA256_RSA => verify_rsa_signature::<sha2::Sha256>(&spki_der, &tbs_der, sig_bytes),
        SHA384_RSA => verify_rsa_signature::<sha2::Sha384>(&spki_der, &tbs_der, sig_bytes),
        SHA512_RSA => verify_rsa_signature::<sha2::Sha512>(&spki_der, &tbs_der, sig_bytes),
        ECDSA_SHA256 => verify_ecdsa_p256_signature(&spki_der, &tbs_der, sig_bytes),
        _ => Err(Error::Certificate(format!(
            "unsupported certificate signature algorithm: {oid}"
        ))),
    }
}

fn verify_rsa_signature<D>(
    issuer_spki_der: &[u8],
    tbs_der: &[u8],
    signature: &[u8],
) -> Result<(), Error>
where
    D: digest::Digest + digest::const_oid::AssociatedOid,
    rsa::pkcs1v15::VerifyingKey<D>: signature::Verifier<rsa::pkcs1v15::Signature>,
{
    use signature::Verifier;
    use spki::DecodePublicKey;

    let public_key = rsa::RsaPublicKey::from_public_key_der(issuer_spki_der)
        .map_err(|e| Error::Certificate(format!("invalid RSA public key: {e}")))?;
    let verifying_key = rsa::pkcs1v15::VerifyingKey::<D>::new(public_key);
    let sig = rsa::pkcs1v15::Signature::try_from(signature)
        .map_err(|e| Error::Certificate(format!("invalid RSA signature: {e}")))?;
    verifying_key
        .verify(tbs_der, &sig)
        .map_err(|e| Error::Certificate(format!("certificate signature verification failed: {e}")))
}

fn verify_ecdsa_p256_signature(
    issuer_spki_der: &[u8],
    tbs_der: &[u8],
    signature: &[u8],
) -> Result<(), Error> {
    use signature::Verifier;
    use spki::DecodePublicKey;

    let vk = p256::ecdsa::VerifyingKey::from_public_key_der(issuer_spki_der)
        .map_err(|e| Error::Certificate(format!("invalid EC P-256 key: {e}")))?;
    // Certificate signatures are DER-encoded.
    let sig = p256::ecdsa::DerSignature::from_bytes(signature)
        .map_err(|e| Error::Certificate(format!("invalid ECDSA signature: {e}")))?;
    vk.verify(tbs_der, &sig)
        .map_err(|e| Error::Certificate(format!("certificate signature verification failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rcgen::{BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};

    struct Issued {
        cert: rcgen::Certificate,
        key: KeyPair,
    }

    fn params(cn: &str) -> CertificateParams {
        let mut p = CertificateParams::new(vec![format!("{}.example", cn.to_lowercase())]).unwrap();
        p.distinguished_name = rcgen::DistinguishedName::new();
        p.distinguished_name.push(DnType::CommonName, cn);
        p
    }

    fn ca(cn: &str) -> Issued {
        let key = KeyPair::generate().unwrap();
        let mut p = params(cn);
        p.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
        Issued { cert: p.self_signed(&key).unwrap(), key }
    }

    fn issue(cn: &str, issuer: &Issued, p: Option<CertificateParams>) -> Issued {
        let key = KeyPair::generate().unwrap();
        let cert = p
            .unwrap_or_else(|| params(cn))
            .signed_by(&key, &issuer.cert, &issuer.key)
            .unwrap();
        Issued { cert, key }
    }

    fn info(certs: &[&Issued]) -> KeyInfoData {
        KeyInfoData {
            certificates: certs.iter().map(|c| c.cert.der().to_vec()).collect(),
            ..KeyInfoData::default()
        }
    }

    fn anchors(certs: &[&Issued]) -> TrustAnchors {
        let mut a = TrustAnchors::new();
        for c in certs {
            a.add_certificate(c.cert.der().to_vec()).unwrap();
        }
        a
    }

    #[test]
    fn test_chain_to_anchor_is_trusted() {
        let root = ca("Root");
        let leaf = issue("Signer", &root, None);
        let result = evaluate_trust(&info(&[&leaf]), Some(&anchors(&[&root])), None);
        assert_eq!(result, TrustResult::Trusted);
    }

    #[test]
    fn test_chain_through_intermediate() {
        let root = ca("Root");
        let inter = {
            let key = KeyPair::generate().unwrap();
            let mut p = params("Intermediate");
            p.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
            Issued { cert: p.signed_by(&key, &root.cert, &root.key).unwrap(), key }
        };
        let leaf = issue("Signer", &inter, None);
        // Intermediate listed first; the leaf is still found.
        let data = info(&[&inter, &leaf]);
        assert_eq!(data.leaf_certificate(), Some(leaf.cert.der().as_ref()));
        assert!(evaluate_trust(&data, Some(&anchors(&[&root])), None).is_trusted());

        let missing_intermediate = info(&[&leaf]);
        assert!(matches!(
            evaluate_trust(&missing_intermediate, Some(&anchors(&[&root])), None),
            TrustResult::Untrusted(_)
        ));
    }

    #[test]
    fn test_wrong_anchor_is_untrusted() {
        let root = ca("Root");
        let other = ca("Other");
        let leaf = issue("Signer", &root, None);
        assert!(matches!(
            evaluate_trust(&info(&[&leaf]), Some(&anchors(&[&other])), None),
            TrustResult::Untrusted(_)
        ));
    }

    #[test]
    fn test_expired_leaf_is_untrusted() {
        let root = ca("Root");
        let mut p = params("Old");
        p.not_before = rcgen::date_time_ymd(2000, 1, 1);
        p.not_after = rcgen::date_time_ymd(2001, 1, 1);
        let leaf = issue("Old", &root, Some(p));
        let a = anchors(&[&root]);
        match evaluate_trust(&info(&[&leaf]), Some(&a), None) {
            TrustResult::Untrusted(reason) => assert!(reason.contains("expired")),
            other => panic!("unexpected {other:?}"),
        }
        // A verification time inside the validity window accepts it, as
        // long as the anchor is valid then too.
        let at = parse_verification_time("2000-06-01+00:00:00").unwrap();
        let result = evaluate_trust(&info(&[&leaf]), Some(&a), Some(at));
        assert!(matches!(result, TrustResult::Untrusted(ref r) if r.contains("not yet valid")));
    }

    #[test]
    fn test_unevaluated_and_empty_anchor_set() {
        let root = ca("Root");
        let leaf = issue("Signer", &root, None);
        assert_eq!(evaluate_trust(&info(&[&leaf]), None, None), TrustResult::Unevaluated);
        assert!(matches!(
            evaluate_trust(&info(&[&leaf]), Some(&TrustAnchors::new()), None),
            TrustResult::Untrusted(_)
        ));
    }

    #[test]
    fn test_raw_key_value_needs_pin() {
        let sk = sigwrap_crypto::SigningKey::EcP256(p256::ecdsa::SigningKey::random(
            &mut rand::thread_rng(),
        ));
        let data = KeyInfoData {
            key_value: Some(sk.to_public()),
            ..KeyInfoData::default()
        };
        let root = ca("Root");
        assert!(matches!(
            evaluate_trust(&data, Some(&anchors(&[&root])), None),
            TrustResult::Untrusted(_)
        ));
        let mut pinned = TrustAnchors::new();
        pinned.add_pinned_key(sk);
        assert_eq!(evaluate_trust(&data, Some(&pinned), None), TrustResult::Trusted);
    }

    #[test]
    fn test_parse_verification_time() {
        let t = parse_verification_time("2025-12-10+01:02:03").unwrap();
        assert_eq!((t.year(), t.month(), t.day(), t.hour()), (2025, 12, 10, 1));
        assert!(parse_verification_time("2025-12-10T01:02:03").is_ok());
        assert!(parse_verification_time("yesterday").is_err());
        assert!(parse_verification_time("2025-13-10+01:02:03").is_err());
    }
}
