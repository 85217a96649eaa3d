#![forbid(unsafe_code)]

//! Signed documents shared by the tests of this crate.

use sigwrap_c14n::C14nMode;
use sigwrap_dsig::{sign, ReferenceTemplate, SignatureTemplate, VerifyContext};
use sigwrap_keys::{loader, Key, TrustAnchors};
use sigwrap_transforms::TransformStep;
use sigwrap_xml::{parse_str, Document, XmlNode};
use std::sync::OnceLock;

pub const BANK: &str = "urn:example:bank";

const PAYMENT: &str = r#"<Envelope xmlns="urn:example:bank"><Body ID="body"><Amount>100</Amount><To>alice</To></Body></Envelope>"#;

struct Signer {
    key: Key,
    anchors: TrustAnchors,
}

/// P-256 signer with a certificate issued by a throwaway CA.
fn signer() -> &'static Signer {
    static SIGNER: OnceLock<Signer> = OnceLock::new();
    SIGNER.get_or_init(|| {
        let ca_key = rcgen::KeyPair::generate().unwrap();
        let mut ca_params = rcgen::CertificateParams::new(vec!["bank-ca.example".to_owned()]).unwrap();
        ca_params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
        ca_params.distinguished_name = rcgen::DistinguishedName::new();
        ca_params.distinguished_name.push(rcgen::DnType::CommonName, "Bank CA");
        let ca = ca_params.self_signed(&ca_key).unwrap();

        let leaf_key = rcgen::KeyPair::generate().unwrap();
        let mut leaf_params = rcgen::CertificateParams::new(vec!["idp.example".to_owned()]).unwrap();
        leaf_params.distinguished_name = rcgen::DistinguishedName::new();
        leaf_params.distinguished_name.push(rcgen::DnType::CommonName, "Bank IdP");
        let leaf = leaf_params.signed_by(&leaf_key, &ca, &ca_key).unwrap();

        let mut key = loader::load_pem_auto(leaf_key.serialize_pem().as_bytes()).unwrap();
        key.x509_chain = vec![leaf.der().to_vec()];
        let mut anchors = TrustAnchors::new();
        anchors.add_certificate(ca.der().to_vec()).unwrap();
        Signer { key, anchors }
    })
}

pub fn trusting_context() -> VerifyContext {
    VerifyContext::default().with_trust_anchors(signer().anchors.clone())
}

fn signed(xml: &str, parent_local: &str, template: SignatureTemplate) -> Document {
    let mut doc = parse_str(xml).unwrap();
    let parent = doc.find_element(BANK, parent_local).unwrap();
    let len = doc.element(&parent).unwrap().children.len();
    doc.insert(&parent, len, XmlNode::Element(template.to_element())).unwrap();
    sign(&doc, &signer().key, &VerifyContext::default()).unwrap()
}

fn algorithm() -> &'static str {
    signer().key.to_signing_key().default_algorithm()
}

/// Signature inside the signed `Body`, enveloped transform.
pub fn enveloped_body() -> Document {
    signed(PAYMENT, "Body", SignatureTemplate::enveloped(algorithm(), "#body"))
}

/// The whole `Envelope` is the signed target.
pub fn enveloped_root() -> Document {
    signed(
        r#"<Envelope xmlns="urn:example:bank" ID="env"><Body><Amount>100</Amount></Body></Envelope>"#,
        "Envelope",
        SignatureTemplate::enveloped(algorithm(), "#env"),
    )
}

/// Signature as a sibling of `Body`, no enveloped transform.
pub fn detached_body() -> Document {
    let template = SignatureTemplate::new(algorithm()).with_reference(
        ReferenceTemplate::new("#body").with_transform(TransformStep::C14n {
            mode: C14nMode::Exclusive,
            inclusive_prefixes: Vec::new(),
        }),
    );
    signed(PAYMENT, "Envelope", template)
}
