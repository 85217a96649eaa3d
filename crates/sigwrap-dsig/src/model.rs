#![forbid(unsafe_code)]

//! Typed, read-only views of the `<ds:Signature>` elements of a document.
//!
//! A view is only meaningful for the tree it was extracted from. After any
//! edit the document has to be extracted again.

use sigwrap_c14n::C14nMode;
use sigwrap_core::{ns, Error};
use sigwrap_keys::keyinfo::{self, KeyInfoData};
use sigwrap_transforms::TransformStep;
use sigwrap_xml::{Document, Element, NodePath};

/// Why a Signature element could not be read.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExtractionError {
    #[error("Signature at {0} has no SignedInfo")]
    MissingSignedInfo(NodePath),
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
    #[error("malformed KeyInfo: {0}")]
    MalformedKeyInfo(String),
    #[error("missing required element: {0}")]
    MissingElement(String),
    #[error("base64 decode error: {0}")]
    Base64(String),
}

impl From<ExtractionError> for Error {
    fn from(e: ExtractionError) -> Self {
        match e {
            ExtractionError::UnsupportedAlgorithm(uri) => Error::UnsupportedAlgorithm(uri),
            ExtractionError::MissingElement(name) => Error::MissingElement(name),
            ExtractionError::Base64(reason) => Error::Base64(reason),
            ExtractionError::MalformedKeyInfo(reason) => Error::Key(reason),
            other @ ExtractionError::MissingSignedInfo(_) => Error::MissingElement(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reference {
    /// Path of the `<ds:Reference>` element.
    pub path: NodePath,
    /// The URI attribute; an absent attribute reads as `""`.
    pub uri: String,
    pub transforms: Vec<TransformStep>,
    pub digest_method: String,
    pub digest_value: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInfo {
    pub path: NodePath,
    pub c14n_mode: C14nMode,
    pub inclusive_prefixes: Vec<String>,
    pub signature_method: String,
    pub references: Vec<Reference>,
}

#[derive(Debug, Clone)]
pub struct Signature {
    pub path: NodePath,
    pub id: Option<String>,
    pub signed_info: SignedInfo,
    pub signature_value: Vec<u8>,
    pub key_info: Option<KeyInfoData>,
}

/// A Signature element that could not be read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnreadableSignature {
    pub path: NodePath,
    pub error: ExtractionError,
}

/// Every Signature of a document. Each one is read on its own; one that
/// fails does not hide its siblings.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub signatures: Vec<Signature>,
    pub unreadable: Vec<UnreadableSignature>,
}

impl Extraction {
    /// Total Signature elements found, readable or not.
    pub fn len(&self) -> usize {
        self.signatures.len() + self.unreadable.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Every Signature of `doc`, in document order.
pub fn extract(doc: &Document) -> Extraction {
    let mut out = Extraction::default();
    for path in doc.find_elements(ns::DSIG, ns::node::SIGNATURE) {
        match extract_signature(doc, &path) {
            Ok(sig) => out.signatures.push(sig),
            Err(error) => {
                tracing::warn!(signature = %path, %error, "unreadable signature skipped");
                out.unreadable.push(UnreadableSignature { path, error });
            }
        }
    }
    out
}

/// The Signature at `path`.
pub fn extract_signature(doc: &Document, path: &NodePath) -> Result<Signature, ExtractionError> {
    let sig_el = doc
        .element(path)
        .filter(|e| e.name.is(ns::DSIG, ns::node::SIGNATURE))
        .ok_or_else(|| ExtractionError::MissingElement(format!("Signature at {path}")))?;

    let si_index = sig_el
        .position_of_child(ns::DSIG, ns::node::SIGNED_INFO)
        .ok_or_else(|| ExtractionError::MissingSignedInfo(path.clone()))?;
    let signed_info = read_signed_info(doc, &path.child(si_index))?;

    let value_el = required_child(sig_el, ns::node::SIGNATURE_VALUE)?;
    let signature_value = decode(value_el, "SignatureValue")?;

    let key_info = sig_el
        .find_child(ns::DSIG, ns::node::KEY_INFO)
        .map(|ki| {
            keyinfo::parse_key_info(ki).map_err(|e| ExtractionError::MalformedKeyInfo(e.to_string()))
        })
        .transpose()?;

    Ok(Signature {
        path: path.clone(),
        id: sig_el.attribute(ns::attr::ID).map(str::to_owned),
        signed_info,
        signature_value,
        key_info,
    })
}

fn read_signed_info(doc: &Document, path: &NodePath) -> Result<SignedInfo, ExtractionError> {
    let si = doc
        .element(path)
        .ok_or_else(|| ExtractionError::MissingElement("SignedInfo".into()))?;

    let c14n_el = required_child(si, ns::node::CANONICALIZATION_METHOD)?;
    let c14n_uri = algorithm_of(c14n_el)?;
    let c14n_mode = C14nMode::from_uri(c14n_uri)
        .ok_or_else(|| ExtractionError::UnsupportedAlgorithm(c14n_uri.to_owned()))?;
    let inclusive_prefixes = if c14n_mode.is_exclusive() {
        read_inclusive_prefixes(c14n_el)
    } else {
        Vec::new()
    };

    let method_el = required_child(si, ns::node::SIGNATURE_METHOD)?;
    let signature_method = algorithm_of(method_el)?;
    if !sigwrap_crypto::sign::is_supported(signature_method) {
        return Err(ExtractionError::UnsupportedAlgorithm(signature_method.to_owned()));
    }

    let mut references = Vec::new();
    for (i, child) in si.children.iter().enumerate() {
        let Some(el) = child.as_element() else { continue };
        if el.name.is(ns::DSIG, ns::node::REFERENCE) {
            references.push(read_reference(el, path.child(i))?);
        }
    }
    if references.is_empty() {
        return Err(ExtractionError::MissingElement("Reference".into()));
    }

    Ok(SignedInfo {
        path: path.clone(),
        c14n_mode,
        inclusive_prefixes,
        signature_method: signature_method.to_owned(),
        references,
    })
}

fn read_reference(el: &Element, path: NodePath) -> Result<Reference, ExtractionError> {
    let mut transforms = Vec::new();
    if let Some(list) = el.find_child(ns::DSIG, ns::node::TRANSFORMS) {
        for t in list.find_children(ns::DSIG, ns::node::TRANSFORM) {
            let uri = algorithm_of(t)?;
            let step = TransformStep::from_uri(uri, read_inclusive_prefixes(t))
                .map_err(|_| ExtractionError::UnsupportedAlgorithm(uri.to_owned()))?;
            transforms.push(step);
        }
    }

    let digest_method = algorithm_of(required_child(el, ns::node::DIGEST_METHOD)?)?;
    if !sigwrap_crypto::digest::is_supported(digest_method) {
        return Err(ExtractionError::UnsupportedAlgorithm(digest_method.to_owned()));
    }
    let digest_value = decode(required_child(el, ns::node::DIGEST_VALUE)?, "DigestValue")?;

    Ok(Reference {
        path,
        uri: el.attribute(ns::attr::URI).unwrap_or_default().to_owned(),
        transforms,
        digest_method: digest_method.to_owned(),
        digest_value,
    })
}

fn required_child<'a>(parent: &'a Element, local: &str) -> Result<&'a Element, ExtractionError> {
    parent
        .find_child(ns::DSIG, local)
        .ok_or_else(|| ExtractionError::MissingElement(format!("{local} in {}", parent.name.local)))
}

fn algorithm_of(el: &Element) -> Result<&str, ExtractionError> {
    el.attribute(ns::attr::ALGORITHM).ok_or_else(|| {
        ExtractionError::MissingElement(format!("Algorithm attribute on {}", el.name.local))
    })
}

fn decode(el: &Element, what: &str) -> Result<Vec<u8>, ExtractionError> {
    keyinfo::decode_base64(&el.text_content())
        .map_err(|e| ExtractionError::Base64(format!("{what}: {e}")))
}

/// `PrefixList` of an `InclusiveNamespaces` child, if any.
fn read_inclusive_prefixes(el: &Element) -> Vec<String> {
    el.find_child(ns::EXC_C14N, ns::node::INCLUSIVE_NAMESPACES)
        .and_then(|inc| inc.attribute(ns::attr::PREFIX_LIST))
        .map(|list| list.split_whitespace().map(str::to_owned).collect())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use sigwrap_core::algorithm;
    use sigwrap_xml::parse_str;

    fn signature_xml(c14n: &str, digest: &str, extra: &str) -> String {
        format!(
            r##"<r><a ID="x">1</a><ds:Signature xmlns:ds="{dsig}" Id="sig1"><ds:SignedInfo><ds:CanonicalizationMethod Algorithm="{c14n}"><ec:InclusiveNamespaces xmlns:ec="{exc}" PrefixList="ds #default"/></ds:CanonicalizationMethod><ds:SignatureMethod Algorithm="{rsa}"/><ds:Reference URI="#x"><ds:Transforms><ds:Transform Algorithm="{env}"/><ds:Transform Algorithm="{exc}"/></ds:Transforms><ds:DigestMethod Algorithm="{digest}"/><ds:DigestValue>AAEC</ds:DigestValue></ds:Reference></ds:SignedInfo><ds:SignatureValue>AQID
BA==</ds:SignatureValue>{extra}</ds:Signature></r>"##,
            dsig = ns::DSIG,
            exc = algorithm::EXC_C14N,
            rsa = algorithm::RSA_SHA256,
            env = algorithm::ENVELOPED_SIGNATURE,
        )
    }

    fn only_failure(doc: &Document) -> ExtractionError {
        let mut extraction = extract(doc);
        assert!(extraction.signatures.is_empty());
        assert_eq!(extraction.unreadable.len(), 1);
        extraction.unreadable.remove(0).error
    }

    #[test]
    fn test_extracts_structure() {
        let doc = parse_str(&signature_xml(algorithm::EXC_C14N, algorithm::SHA256, "")).unwrap();
        let sigs = extract(&doc).signatures;
        assert_eq!(sigs.len(), 1);
        let sig = &sigs[0];
        assert_eq!(sig.id.as_deref(), Some("sig1"));
        assert_eq!(sig.signature_value, [1, 2, 3, 4]);
        assert!(sig.key_info.is_none());

        let si = &sig.signed_info;
        assert_eq!(si.c14n_mode, C14nMode::Exclusive);
        assert_eq!(si.inclusive_prefixes, ["ds", "#default"]);
        assert_eq!(si.signature_method, algorithm::RSA_SHA256);
        assert_eq!(si.references.len(), 1);

        let r = &si.references[0];
        assert_eq!(r.uri, "#x");
        assert_eq!(r.digest_value, [0, 1, 2]);
        assert_eq!(r.transforms.len(), 2);
        assert_eq!(r.transforms[0], TransformStep::EnvelopedSignature);
        assert_eq!(doc.element(&r.path).unwrap().name.local, "Reference");
    }

    #[test]
    fn test_unsupported_algorithms() {
        let doc = parse_str(&signature_xml("urn:unknown-c14n", algorithm::SHA256, "")).unwrap();
        assert_eq!(
            only_failure(&doc),
            ExtractionError::UnsupportedAlgorithm("urn:unknown-c14n".into())
        );
        let doc = parse_str(&signature_xml(algorithm::C14N, "http://www.w3.org/2001/04/xmldsig-more#md5", "")).unwrap();
        assert!(matches!(only_failure(&doc), ExtractionError::UnsupportedAlgorithm(_)));
    }

    #[test]
    fn test_missing_signed_info_and_bad_key_info() {
        let xml = format!(r#"<r><ds:Signature xmlns:ds="{}"><ds:SignatureValue/></ds:Signature></r>"#, ns::DSIG);
        let doc = parse_str(&xml).unwrap();
        assert!(matches!(only_failure(&doc), ExtractionError::MissingSignedInfo(_)));

        let bad_key = "<ds:KeyInfo><ds:KeyValue><ds:RSAKeyValue/></ds:KeyValue></ds:KeyInfo>";
        let doc = parse_str(&signature_xml(algorithm::C14N, algorithm::SHA1, bad_key)).unwrap();
        assert!(matches!(only_failure(&doc), ExtractionError::MalformedKeyInfo(_)));
    }

    #[test]
    fn test_bad_signature_does_not_hide_siblings() {
        let good = signature_xml(algorithm::EXC_C14N, algorithm::SHA256, "");
        let bad = signature_xml(algorithm::EXC_C14N, algorithm::SHA256, "")
            .replace(algorithm::RSA_SHA256, "http://www.w3.org/2001/04/xmldsig-more#rsa-sha512");
        let inner = |xml: &str| xml.trim_start_matches("<r>").trim_end_matches("</r>").to_owned();
        let doc = parse_str(&format!("<r>{}{}</r>", inner(&bad), inner(&good))).unwrap();

        let extraction = extract(&doc);
        assert_eq!(extraction.len(), 2);
        assert_eq!(extraction.signatures.len(), 1);
        assert_eq!(extraction.unreadable.len(), 1);
        assert!(extraction.unreadable[0].path < extraction.signatures[0].path);
        assert!(matches!(
            extraction.unreadable[0].error,
            ExtractionError::UnsupportedAlgorithm(_)
        ));
    }

    #[test]
    fn test_no_signature_is_empty() {
        let doc = parse_str("<r><a/></r>").unwrap();
        assert!(extract(&doc).is_empty());
    }
}
