#![forbid(unsafe_code)]

//! `<ds:KeyInfo>` reading and writing.
//!
//! Reading collects what a verifier can use: key names, `X509Certificate`
//! values and a raw `KeyValue` (RSA or P-256). Anything else a KeyInfo may
//! carry is skipped. Structural problems with the parts that are read are
//! errors.

use base64::Engine;
use rsa::traits::PublicKeyParts;
use sigwrap_core::{ns, Error};
use sigwrap_crypto::SigningKey;
use sigwrap_xml::{Element, QName, XmlNode};

const P256_CURVE_URI: &str = "urn:oid:1.2.840.10045.3.1.7";

/// Key material found in a KeyInfo element.
#[derive(Debug, Clone, Default)]
pub struct KeyInfoData {
    pub key_names: Vec<String>,
    /// DER certificates in document order.
    pub certificates: Vec<Vec<u8>>,
    pub key_value: Option<SigningKey>,
}

impl KeyInfoData {
    pub fn is_empty(&self) -> bool {
        self.certificates.is_empty() && self.key_value.is_none()
    }

    /// The end-entity certificate: the first one that does not issue
    /// another certificate of the set.
    pub fn leaf_certificate(&self) -> Option<&[u8]> {
        crate::x509::find_leaf(&self.certificates).map(|i| self.certificates[i].as_slice())
    }

    /// The key to check SignatureValue with: the explicit KeyValue, else
    /// the leaf certificate's public key.
    pub fn verification_key(&self) -> Result<Option<SigningKey>, Error> {
        if let Some(k) = &self.key_value {
            return Ok(Some(k.clone()));
        }
        match self.leaf_certificate() {
            Some(der) => Ok(Some(crate::loader::load_x509_cert_der(der)?.to_signing_key())),
            None => Ok(None),
        }
    }
}

/// Decode a base64 element value, ignoring embedded whitespace.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, Error> {
    let clean: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    base64::engine::general_purpose::STANDARD
        .decode(clean)
        .map_err(|e| Error::Base64(e.to_string()))
}

/// Read a `<ds:KeyInfo>` element.
pub fn parse_key_info(key_info: &Element) -> Result<KeyInfoData, Error> {
    let mut data = KeyInfoData::default();
    for child in key_info.child_elements() {
        if child.name.is(ns::DSIG, ns::node::KEY_NAME) {
            data.key_names.push(child.text_content().trim().to_owned());
        } else if child.name.is(ns::DSIG, ns::node::KEY_VALUE) {
            if data.key_value.is_some() {
                return Err(Error::Key("more than one KeyValue".into()));
            }
            data.key_value = Some(parse_key_value(child)?);
        } else if child.name.is(ns::DSIG, ns::node::X509_DATA) {
            for cert_el in child.find_children(ns::DSIG, ns::node::X509_CERTIFICATE) {
                let der_bytes = decode_base64(&cert_el.text_content())
                    .map_err(|e| Error::Key(format!("X509Certificate: {e}")))?;
                crate::loader::load_x509_cert_der(&der_bytes)
                    .map_err(|e| Error::Key(format!("X509Certificate: {e}")))?;
                data.certificates.push(der_bytes);
            }
        } else {
            tracing::debug!(element = %child.name.local, "ignoring KeyInfo child");
        }
    }
    Ok(data)
}

fn parse_key_value(key_value: &Element) -> Result<SigningKey, Error> {
    let inner = key_value
        .child_elements()
        .next()
        .ok_or_else(|| Error::Key("empty KeyValue".into()))?;
    if inner.name.is(ns::DSIG, ns::node::RSA_KEY_VALUE) {
        parse_rsa_key_value(inner)
    } else if inner.name.is(ns::DSIG11, ns::node::EC_KEY_VALUE)
        || inner.name.is(ns::DSIG, ns::node::EC_KEY_VALUE)
    {
        parse_ec_key_value(inner)
    } else {
        Err(Error::Key(format!("unsupported KeyValue type: {}", inner.name.local)))
    }
}

fn child_text(parent: &Element, local: &str) -> Result<String, Error> {
    parent
        .child_elements()
        .find(|e| e.name.local == local)
        .map(Element::text_content)
        .ok_or_else(|| Error::Key(format!("missing {local} in {}", parent.name.local)))
}

/// Extract an RSA public key from `<RSAKeyValue>`.
fn parse_rsa_key_value(rsa_kv: &Element) -> Result<SigningKey, Error> {
    let modulus = decode_base64(&child_text(rsa_kv, ns::node::RSA_MODULUS)?)
        .map_err(|e| Error::Key(format!("Modulus: {e}")))?;
    let exponent = decode_base64(&child_text(rsa_kv, ns::node::RSA_EXPONENT)?)
        .map_err(|e| Error::Key(format!("Exponent: {e}")))?;

    let n = rsa::BigUint::from_bytes_be(&modulus);
    let e = rsa::BigUint::from_bytes_be(&exponent);
    let public = rsa::RsaPublicKey::new(n, e)
        .map_err(|err| Error::Key(format!("invalid RSA public key: {err}")))?;
    Ok(SigningKey::RsaPublic(public))
}

/// Extract a P-256 public key from `<ECKeyValue>`.
fn parse_ec_key_value(ec_kv: &Element) -> Result<SigningKey, Error> {
    let curve_uri = ec_kv
        .child_elements()
        .find(|e| e.name.local == ns::node::NAMED_CURVE)
        .and_then(|e| e.attribute(ns::attr::URI))
        .ok_or_else(|| Error::Key("ECKeyValue without NamedCurve URI".into()))?;
    if curve_uri != P256_CURVE_URI {
        return Err(Error::Key(format!("unsupported EC curve: {curve_uri}")));
    }
    let point = decode_base64(&child_text(ec_kv, ns::node::PUBLIC_KEY)?)
        .map_err(|e| Error::Key(format!("EC PublicKey: {e}")))?;
    let vk = p256::ecdsa::VerifyingKey::from_sec1_bytes(&point)
        .map_err(|e| Error::Key(format!("invalid P-256 public key point: {e}")))?;
    Ok(SigningKey::EcP256Public(vk))
}

/// Children for a KeyInfo element: an `X509Data` with `certificates` if
/// any, else a `KeyValue` for `key`. Element names use `ds_prefix`, which
/// must be bound to the XML-DSig namespace where the nodes are inserted.
pub fn key_info_children(
    key: &SigningKey,
    certificates: &[Vec<u8>],
    ds_prefix: Option<&str>,
) -> Vec<XmlNode> {
    let engine = base64::engine::general_purpose::STANDARD;
    let ds = |local: &str| Element::new(QName::prefixed(ds_prefix, local));

    if !certificates.is_empty() {
        let mut x509 = ds(ns::node::X509_DATA);
        for der_bytes in certificates {
            let mut cert = ds(ns::node::X509_CERTIFICATE);
            cert.set_text(&engine.encode(der_bytes));
            x509.children.push(XmlNode::Element(cert));
        }
        return vec![XmlNode::Element(x509)];
    }

    let mut key_value = ds(ns::node::KEY_VALUE);
    match key.to_public() {
        SigningKey::RsaPublic(public) => {
            let mut rsa_kv = ds(ns::node::RSA_KEY_VALUE);
            let mut modulus = ds(ns::node::RSA_MODULUS);
            modulus.set_text(&engine.encode(public.n().to_bytes_be()));
            let mut exponent = ds(ns::node::RSA_EXPONENT);
            exponent.set_text(&engine.encode(public.e().to_bytes_be()));
            rsa_kv.children.push(XmlNode::Element(modulus));
            rsa_kv.children.push(XmlNode::Element(exponent));
            key_value.children.push(XmlNode::Element(rsa_kv));
        }
        SigningKey::EcP256Public(vk) => {
            let dsig11 = |local: &str| Element::new(QName::prefixed(Some("dsig11"), local));
            let mut ec_kv = dsig11(ns::node::EC_KEY_VALUE);
            ec_kv.declare_namespace(Some("dsig11"), ns::DSIG11);
            let mut curve = dsig11(ns::node::NAMED_CURVE);
            curve.set_attribute(ns::attr::URI, P256_CURVE_URI);
            let mut point = dsig11(ns::node::PUBLIC_KEY);
            point.set_text(&engine.encode(vk.to_encoded_point(false).as_bytes()));
            ec_kv.children.push(XmlNode::Element(curve));
            ec_kv.children.push(XmlNode::Element(point));
            key_value.children.push(XmlNode::Element(ec_kv));
        }
        SigningKey::Rsa(_) | SigningKey::EcP256(_) => {}
    }
    vec![XmlNode::Element(key_value)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwrap_xml::{parse_str, Document};

    fn key_info_doc(children: Vec<XmlNode>) -> Document {
        let mut ki = Element::new(QName::prefixed(Some("ds"), ns::node::KEY_INFO));
        ki.declare_namespace(Some("ds"), ns::DSIG);
        ki.children = children;
        Document::new(ki).unwrap()
    }

    #[test]
    fn test_key_value_round_trip_ec() {
        let sk = SigningKey::EcP256(p256::ecdsa::SigningKey::random(&mut rand::thread_rng()));
        let doc = key_info_doc(key_info_children(&sk, &[], Some("ds")));
        let info = parse_key_info(doc.root_element()).unwrap();
        assert!(info.certificates.is_empty());
        assert!(info.key_value.unwrap().same_public_key(&sk));
    }

    #[test]
    fn test_key_value_round_trip_rsa() {
        let sk = SigningKey::Rsa(rsa::RsaPrivateKey::new(&mut rand::thread_rng(), 1024).unwrap());
        let doc = key_info_doc(key_info_children(&sk, &[], Some("ds")));
        let info = parse_key_info(doc.root_element()).unwrap();
        assert!(info.verification_key().unwrap().unwrap().same_public_key(&sk));
    }

    #[test]
    fn test_certificate_is_verification_key() {
        let kp = rcgen::KeyPair::generate().unwrap();
        let cert = rcgen::CertificateParams::new(vec!["signer.example".into()])
            .unwrap()
            .self_signed(&kp)
            .unwrap();
        let der_bytes = cert.der().to_vec();
        let doc = key_info_doc(key_info_children(&SigningKey::EcP256Public(
            *p256::ecdsa::SigningKey::random(&mut rand::thread_rng()).verifying_key(),
        ), &[der_bytes.clone()], Some("ds")));
        let info = parse_key_info(doc.root_element()).unwrap();
        assert_eq!(info.certificates, vec![der_bytes.clone()]);
        assert_eq!(info.leaf_certificate(), Some(der_bytes.as_slice()));
        assert!(info.verification_key().unwrap().is_some());
    }

    #[test]
    fn test_malformed_key_info() {
        let bad_b64 = format!(
            r#"<ds:KeyInfo xmlns:ds="{}"><ds:X509Data><ds:X509Certificate>!!!</ds:X509Certificate></ds:X509Data></ds:KeyInfo>"#,
            ns::DSIG
        );
        let doc = parse_str(&bad_b64).unwrap();
        assert!(matches!(parse_key_info(doc.root_element()), Err(Error::Key(_))));

        let bad_der = format!(
            r#"<ds:KeyInfo xmlns:ds="{}"><ds:X509Data><ds:X509Certificate>AAAA</ds:X509Certificate></ds:X509Data></ds:KeyInfo>"#,
            ns::DSIG
        );
        let doc = parse_str(&bad_der).unwrap();
        assert!(parse_key_info(doc.root_element()).is_err());

        let no_modulus = format!(
            r#"<ds:KeyInfo xmlns:ds="{}"><ds:KeyValue><ds:RSAKeyValue><ds:Exponent>AQAB</ds:Exponent></ds:RSAKeyValue></ds:KeyValue></ds:KeyInfo>"#,
            ns::DSIG
        );
        let doc = parse_str(&no_modulus).unwrap();
        assert!(parse_key_info(doc.root_element()).is_err());
    }

    #[test]
    fn test_unknown_children_are_skipped() {
        let xml = format!(
            r#"<ds:KeyInfo xmlns:ds="{}"><ds:KeyName>k1</ds:KeyName><ds:RetrievalMethod URI="x"/></ds:KeyInfo>"#,
            ns::DSIG
        );
        let doc = parse_str(&xml).unwrap();
        let info = parse_key_info(doc.root_element()).unwrap();
        assert_eq!(info.key_names, ["k1"]);
        assert!(info.is_empty());
        assert!(info.verification_key().unwrap().is_none());
    }
}
