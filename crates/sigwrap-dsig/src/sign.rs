#![forbid(unsafe_code)]

//! XML-DSig signature creation.
//!
//! Signs a document that contains `<Signature>` templates: elements whose
//! DigestValue and SignatureValue are empty. [`SignatureTemplate`] builds
//! such a template.

use crate::context::VerifyContext;
use crate::model;
use crate::verify::reference_octets;
use base64::Engine;
use sigwrap_c14n::C14nMode;
use sigwrap_core::{algorithm, ns, Error};
use sigwrap_keys::{keyinfo, Key};
use sigwrap_transforms::TransformStep;
use sigwrap_xml::{Document, Element, NodePath, QName, XmlNode};

/// One `<Reference>` of a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReferenceTemplate {
    pub uri: String,
    pub transforms: Vec<TransformStep>,
    pub digest_method: String,
}

impl ReferenceTemplate {
    /// A SHA-256 reference to `uri` with no transforms.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            transforms: Vec::new(),
            digest_method: algorithm::SHA256.to_owned(),
        }
    }

    pub fn with_transform(mut self, step: TransformStep) -> Self {
        self.transforms.push(step);
        self
    }

    pub fn with_digest_method(mut self, uri: &str) -> Self {
        self.digest_method = uri.to_owned();
        self
    }
}

/// Builder for an unsigned `<Signature>` element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureTemplate {
    /// Prefix bound to the XML-DSig namespace; `None` declares it as the
    /// default namespace.
    pub prefix: Option<String>,
    pub id: Option<String>,
    pub c14n_mode: C14nMode,
    pub inclusive_prefixes: Vec<String>,
    pub signature_method: String,
    pub references: Vec<ReferenceTemplate>,
    /// Emit an empty `<KeyInfo>` for the signer to fill.
    pub key_info: bool,
}

impl SignatureTemplate {
    pub fn new(signature_method: &str) -> Self {
        Self {
            prefix: Some("ds".into()),
            id: None,
            c14n_mode: C14nMode::Exclusive,
            inclusive_prefixes: Vec::new(),
            signature_method: signature_method.to_owned(),
            references: Vec::new(),
            key_info: true,
        }
    }

    /// The usual enveloped signature over `uri`: enveloped-signature
    /// transform followed by exclusive C14N.
    pub fn enveloped(signature_method: &str, uri: &str) -> Self {
        Self::new(signature_method).with_reference(
            ReferenceTemplate::new(uri)
                .with_transform(TransformStep::EnvelopedSignature)
                .with_transform(TransformStep::C14n {
                    mode: C14nMode::Exclusive,
                    inclusive_prefixes: Vec::new(),
                }),
        )
    }

    pub fn with_reference(mut self, reference: ReferenceTemplate) -> Self {
        self.references.push(reference);
        self
    }

    pub fn with_c14n(mut self, mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        self.c14n_mode = mode;
        self.inclusive_prefixes = inclusive_prefixes;
        self
    }

    pub fn with_prefix(mut self, prefix: Option<&str>) -> Self {
        self.prefix = prefix.map(str::to_owned);
        self
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.id = Some(id.to_owned());
        self
    }

    pub fn without_key_info(mut self) -> Self {
        self.key_info = false;
        self
    }

    fn ds(&self, local: &str) -> Element {
        Element::new(QName::prefixed(self.prefix.as_deref(), local))
    }

    fn with_algorithm(&self, local: &str, uri: &str) -> Element {
        let mut el = self.ds(local);
        el.set_attribute(ns::attr::ALGORITHM, uri);
        el
    }

    /// The template element, ready to be inserted into a document.
    pub fn to_element(&self) -> Element {
        let mut signature = self.ds(ns::node::SIGNATURE);
        signature.declare_namespace(self.prefix.as_deref(), ns::DSIG);
        if let Some(id) = &self.id {
            signature.set_attribute(ns::attr::ID, id);
        }

        let mut signed_info = self.ds(ns::node::SIGNED_INFO);
        let mut c14n = self.with_algorithm(ns::node::CANONICALIZATION_METHOD, self.c14n_mode.uri());
        if self.c14n_mode.is_exclusive() {
            push_inclusive_namespaces(&mut c14n, &self.inclusive_prefixes);
        }
        signed_info.children.push(XmlNode::Element(c14n));
        signed_info.children.push(XmlNode::Element(
            self.with_algorithm(ns::node::SIGNATURE_METHOD, &self.signature_method),
        ));

        for r in &self.references {
            let mut reference = self.ds(ns::node::REFERENCE);
            reference.set_attribute(ns::attr::URI, &r.uri);
            if !r.transforms.is_empty() {
                let mut transforms = self.ds(ns::node::TRANSFORMS);
                for step in &r.transforms {
                    let mut t = self.with_algorithm(ns::node::TRANSFORM, step.uri());
                    if let TransformStep::C14n { inclusive_prefixes, .. } = step {
                        push_inclusive_namespaces(&mut t, inclusive_prefixes);
                    }
                    transforms.children.push(XmlNode::Element(t));
                }
                reference.children.push(XmlNode::Element(transforms));
            }
            reference.children.push(XmlNode::Element(
                self.with_algorithm(ns::node::DIGEST_METHOD, &r.digest_method),
            ));
            reference.children.push(XmlNode::Element(self.ds(ns::node::DIGEST_VALUE)));
            signed_info.children.push(XmlNode::Element(reference));
        }

        signature.children.push(XmlNode::Element(signed_info));
        signature.children.push(XmlNode::Element(self.ds(ns::node::SIGNATURE_VALUE)));
        if self.key_info {
            signature.children.push(XmlNode::Element(self.ds(ns::node::KEY_INFO)));
        }
        signature
    }
}

fn push_inclusive_namespaces(parent: &mut Element, prefixes: &[String]) {
    if prefixes.is_empty() {
        return;
    }
    let mut inc = Element::new(QName::prefixed(Some("ec"), ns::node::INCLUSIVE_NAMESPACES));
    inc.declare_namespace(Some("ec"), ns::EXC_C14N);
    inc.set_attribute(ns::attr::PREFIX_LIST, &prefixes.join(" "));
    parent.children.push(XmlNode::Element(inc));
}

/// Sign every Signature template of `doc` with `key`.
///
/// The input is left untouched. Per Signature: an empty KeyInfo is filled
/// with the key's certificates (or its KeyValue), every DigestValue is
/// computed, then SignatureValue. Reference URIs resolve under `ctx`.
pub fn sign(doc: &Document, key: &Key, ctx: &VerifyContext) -> Result<Document, Error> {
    let signing_key = key.to_signing_key();
    if !signing_key.is_private() {
        return Err(Error::Key("signing requires a private key".into()));
    }

    let mut out = doc.clone();
    let signatures = out.find_elements(ns::DSIG, ns::node::SIGNATURE);
    if signatures.is_empty() {
        return Err(Error::MissingElement("Signature".into()));
    }

    let engine = base64::engine::general_purpose::STANDARD;
    for path in &signatures {
        fill_key_info(&mut out, path, key)?;
        let sig = model::extract_signature(&out, path)?;

        for reference in &sig.signed_info.references {
            let (_, octets) = reference_octets(&out, path, reference, ctx);
            let octets = octets.map_err(|reason| {
                Error::Transform(format!("Reference {:?}: {reason}", reference.uri))
            })?;
            let digest = sigwrap_crypto::digest::digest(&reference.digest_method, &octets)?;
            set_child_text(&mut out, &reference.path, ns::node::DIGEST_VALUE, &engine.encode(digest))?;
        }

        let si = &sig.signed_info;
        let canonical =
            sigwrap_c14n::canonicalize_subtree(&out, &si.path, si.c14n_mode, &si.inclusive_prefixes)?;
        let value = sigwrap_crypto::sign::from_uri(&si.signature_method)?.sign(&signing_key, &canonical)?;
        set_child_text(&mut out, path, ns::node::SIGNATURE_VALUE, &engine.encode(value))?;
        tracing::debug!(signature = %path, references = si.references.len(), "signed");
    }
    Ok(out)
}

fn fill_key_info(doc: &mut Document, signature: &NodePath, key: &Key) -> Result<(), Error> {
    let sig_el = doc
        .element(signature)
        .ok_or_else(|| Error::MissingElement("Signature".into()))?;
    let Some(index) = sig_el.position_of_child(ns::DSIG, ns::node::KEY_INFO) else {
        return Ok(());
    };
    let prefix = sig_el.name.prefix.clone();
    let ki_path = signature.child(index);
    if doc.element(&ki_path).is_some_and(|ki| ki.child_elements().next().is_some()) {
        return Ok(());
    }
    let children = keyinfo::key_info_children(&key.to_signing_key(), &key.x509_chain, prefix.as_deref());
    doc.update_element(&ki_path, |ki| ki.children = children)
}

fn set_child_text(doc: &mut Document, parent: &NodePath, local: &str, text: &str) -> Result<(), Error> {
    let index = doc
        .element(parent)
        .and_then(|el| el.position_of_child(ns::DSIG, local))
        .ok_or_else(|| Error::MissingElement(local.to_owned()))?;
    doc.update_element(&parent.child(index), |el| el.set_text(text))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwrap_xml::parse_str;

    fn p256_key() -> Key {
        let kp = rcgen::KeyPair::generate().unwrap();
        sigwrap_keys::loader::load_pem_auto(kp.serialize_pem().as_bytes()).unwrap()
    }

    #[test]
    fn test_template_shape() {
        let tpl = SignatureTemplate::enveloped(algorithm::ECDSA_SHA256, "#a")
            .with_c14n(C14nMode::Exclusive, vec!["saml".into()])
            .with_id("sig1");
        let doc = Document::new(tpl.to_element()).unwrap();
        let sig = model::extract(&doc).signatures.remove(0);
        assert_eq!(sig.id.as_deref(), Some("sig1"));
        assert_eq!(sig.signed_info.inclusive_prefixes, ["saml"]);
        assert_eq!(sig.signed_info.signature_method, algorithm::ECDSA_SHA256);
        let r = &sig.signed_info.references[0];
        assert_eq!(r.uri, "#a");
        assert_eq!(r.transforms.len(), 2);
        assert!(r.digest_value.is_empty());
        assert!(sig.signature_value.is_empty());
        assert!(sig.key_info.unwrap().is_empty());
    }

    #[test]
    fn test_sign_fills_values_and_leaves_input() {
        let key = p256_key();
        let mut doc = parse_str(r#"<r><a ID="a">x</a></r>"#).unwrap();
        let root = doc.root_path();
        let tpl = SignatureTemplate::new(algorithm::ECDSA_SHA256)
            .with_prefix(None)
            .with_reference(ReferenceTemplate::new("#a"));
        doc.insert(&root, 1, XmlNode::Element(tpl.to_element())).unwrap();

        let signed = sign(&doc, &key, &VerifyContext::default()).unwrap();
        assert_ne!(signed, doc);
        let before = model::extract(&doc).signatures.remove(0);
        assert!(before.signature_value.is_empty());

        let sig = model::extract(&signed).signatures.remove(0);
        assert_eq!(sig.signed_info.references[0].digest_value.len(), 32);
        assert_eq!(sig.signature_value.len(), 64);
        let ki = sig.key_info.unwrap();
        assert!(ki.certificates.is_empty());
        assert!(ki.verification_key().unwrap().is_some());
        assert!(signed.root_element().find_child(ns::DSIG, ns::node::SIGNATURE).unwrap().name.prefix.is_none());
    }

    #[test]
    fn test_sign_errors() {
        let key = p256_key();
        let plain = parse_str("<r/>").unwrap();
        assert!(matches!(
            sign(&plain, &key, &VerifyContext::default()),
            Err(Error::MissingElement(_))
        ));

        let public = Key::new(sigwrap_keys::KeyData::from(key.to_signing_key().to_public()));
        let mut doc = parse_str(r#"<r ID="a"/>"#).unwrap();
        let root = doc.root_path();
        let tpl = SignatureTemplate::enveloped(algorithm::ECDSA_SHA256, "");
        doc.insert(&root, 0, XmlNode::Element(tpl.to_element())).unwrap();
        assert!(matches!(sign(&doc, &public, &VerifyContext::default()), Err(Error::Key(_))));
    }
}
