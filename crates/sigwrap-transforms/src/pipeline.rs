#![forbid(unsafe_code)]

//! Transform pipeline and trait definitions.

use crate::base64_transform::Base64DecodeTransform;
use crate::enveloped::EnvelopedSignatureTransform;
use sigwrap_c14n::C14nMode;
use sigwrap_core::{algorithm, Error};
use sigwrap_xml::{Document, NodePath, NodeSet};

/// Data flowing through the transform pipeline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformData {
    /// A node set over the document being verified.
    Nodes(NodeSet),
    /// Raw octets.
    Octets(Vec<u8>),
}

impl TransformData {
    /// Convert to octets, canonicalizing a node set with inclusive C14N 1.0.
    pub fn into_octets(self, doc: &Document) -> Result<Vec<u8>, Error> {
        match self {
            TransformData::Octets(data) => Ok(data),
            TransformData::Nodes(set) => sigwrap_c14n::canonicalize(doc, &set, C14nMode::Inclusive, &[]),
        }
    }
}

/// Trait for individual transforms.
pub trait Transform: Send + Sync {
    /// The algorithm URI for this transform.
    fn uri(&self) -> &str;

    /// Execute the transform on the given data.
    fn execute(&self, doc: &Document, input: TransformData) -> Result<TransformData, Error>;
}

/// A `<ds:Transform>` as declared by a Reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransformStep {
    EnvelopedSignature,
    C14n {
        mode: C14nMode,
        inclusive_prefixes: Vec<String>,
    },
    Base64,
}

impl TransformStep {
    /// Recognize a transform algorithm. `inclusive_prefixes` is only kept
    /// for exclusive canonicalization.
    pub fn from_uri(uri: &str, inclusive_prefixes: Vec<String>) -> Result<Self, Error> {
        if let Some(mode) = C14nMode::from_uri(uri) {
            let inclusive_prefixes = if mode.is_exclusive() {
                inclusive_prefixes
            } else {
                Vec::new()
            };
            return Ok(TransformStep::C14n {
                mode,
                inclusive_prefixes,
            });
        }
        match uri {
            algorithm::ENVELOPED_SIGNATURE => Ok(TransformStep::EnvelopedSignature),
            algorithm::BASE64 => Ok(TransformStep::Base64),
            other => Err(Error::UnsupportedAlgorithm(format!("transform: {other}"))),
        }
    }

    pub fn uri(&self) -> &'static str {
        match self {
            TransformStep::EnvelopedSignature => algorithm::ENVELOPED_SIGNATURE,
            TransformStep::C14n { mode, .. } => mode.uri(),
            TransformStep::Base64 => algorithm::BASE64,
        }
    }
}

/// A pipeline of transforms executed in sequence.
pub struct TransformPipeline {
    transforms: Vec<Box<dyn Transform>>,
}

impl TransformPipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self {
            transforms: Vec::new(),
        }
    }

    /// Build the pipeline of one Reference of the Signature at `signature`.
    pub fn from_steps(steps: &[TransformStep], signature: &NodePath) -> Self {
        let mut pipeline = Self::new();
        for step in steps {
            let transform: Box<dyn Transform> = match step {
                TransformStep::EnvelopedSignature => {
                    Box::new(EnvelopedSignatureTransform::new(signature.clone()))
                }
                TransformStep::C14n {
                    mode,
                    inclusive_prefixes,
                } => Box::new(C14nTransform::new(*mode, inclusive_prefixes.clone())),
                TransformStep::Base64 => Box::new(Base64DecodeTransform),
            };
            pipeline.push(transform);
        }
        pipeline
    }

    /// Add a transform to the pipeline.
    pub fn push(&mut self, transform: Box<dyn Transform>) {
        self.transforms.push(transform);
    }

    /// Execute all transforms in order.
    pub fn execute(&self, doc: &Document, input: TransformData) -> Result<TransformData, Error> {
        let mut data = input;
        for transform in &self.transforms {
            data = transform.execute(doc, data)?;
        }
        Ok(data)
    }

    /// Execute all transforms, then convert the result to octets.
    pub fn digest_input(&self, doc: &Document, input: TransformData) -> Result<Vec<u8>, Error> {
        self.execute(doc, input)?.into_octets(doc)
    }

    /// Number of transforms in the pipeline.
    pub fn len(&self) -> usize {
        self.transforms.len()
    }

    /// Check if pipeline is empty.
    pub fn is_empty(&self) -> bool {
        self.transforms.is_empty()
    }
}

impl Default for TransformPipeline {
    fn default() -> Self {
        Self::new()
    }
}

// ── C14N Transform ───────────────────────────────────────────────────

/// A canonicalization transform.
pub struct C14nTransform {
    mode: C14nMode,
    inclusive_prefixes: Vec<String>,
}

impl C14nTransform {
    pub fn new(mode: C14nMode, inclusive_prefixes: Vec<String>) -> Self {
        Self {
            mode,
            inclusive_prefixes,
        }
    }
}

impl Transform for C14nTransform {
    fn uri(&self) -> &str {
        self.mode.uri()
    }

    fn execute(&self, doc: &Document, input: TransformData) -> Result<TransformData, Error> {
        match input {
            TransformData::Nodes(set) => {
                let bytes = sigwrap_c14n::canonicalize(doc, &set, self.mode, &self.inclusive_prefixes)?;
                Ok(TransformData::Octets(bytes))
            }
            TransformData::Octets(data) => {
                // Octets are parsed and canonicalized as a whole document.
                let parsed = sigwrap_xml::parse(&data)
                    .map_err(|e| Error::Transform(format!("C14N input is not XML: {e}")))?;
                let set = NodeSet::whole_document(true);
                let bytes = sigwrap_c14n::canonicalize(&parsed, &set, self.mode, &self.inclusive_prefixes)?;
                Ok(TransformData::Octets(bytes))
            }
        }
    }
}
