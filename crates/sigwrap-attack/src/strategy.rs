#![forbid(unsafe_code)]

//! Mutation strategies and the order they are tried in.

use sigwrap_c14n::C14nMode;
use sigwrap_core::{algorithm, Error};
use std::fmt;
use std::str::FromStr;

/// Where the wrapper holding the genuine target goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WrapperPlacement {
    /// Forged copy at the target's position, wrapper as next sibling.
    ForgedThenWrapper,
    /// Forged copy at the target's position, wrapper as its last child.
    /// The only placement that works when the target is the root.
    WrapperInForged,
    /// Wrapper at the target's position, forged copy as next sibling.
    WrapperThenForged,
}

impl WrapperPlacement {
    pub const ALL: [WrapperPlacement; 3] = [
        WrapperPlacement::ForgedThenWrapper,
        WrapperPlacement::WrapperInForged,
        WrapperPlacement::WrapperThenForged,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdCollisionVariant {
    /// A forged sibling carrying the same ID value.
    Duplicate,
    /// A forged sibling carrying the ID both prefixed and plain.
    AttributePollution,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RelocationVariant {
    /// Genuine target moves into a `ds:Object` of the Signature.
    IntoObject,
    /// Signature becomes the first child of the document element.
    ToRoot,
}

/// One way of mutating a signed document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MutationStrategy {
    Wrapping { placement: WrapperPlacement },
    IdCollision { variant: IdCollisionVariant },
    AlgorithmSubstitution { to: C14nMode },
    CommentInjection,
    SignatureRelocation { variant: RelocationVariant },
    /// Forged copy without the ID in place, an internal DTD subset giving it
    /// the ID back as a `#FIXED` default.
    DoctypeIdInjection,
    /// Forged copy in place, the genuine target under an element whose
    /// `xml:xmlns` attribute reads as a namespace declaration to naive
    /// parsers.
    NamespaceConfusion,
}

impl MutationStrategy {
    pub fn class(&self) -> StrategyClass {
        match self {
            MutationStrategy::Wrapping { .. } => StrategyClass::Wrapping,
            MutationStrategy::IdCollision { .. } => StrategyClass::IdCollision,
            MutationStrategy::AlgorithmSubstitution { .. } => StrategyClass::AlgorithmSubstitution,
            MutationStrategy::CommentInjection => StrategyClass::CommentInjection,
            MutationStrategy::SignatureRelocation { .. } => StrategyClass::SignatureRelocation,
            MutationStrategy::DoctypeIdInjection => StrategyClass::DoctypeInjection,
            MutationStrategy::NamespaceConfusion => StrategyClass::NamespaceConfusion,
        }
    }

    /// Whether the strategy puts a rewritten payload where a consumer reads.
    pub fn forges_payload(&self) -> bool {
        match self {
            MutationStrategy::Wrapping { .. }
            | MutationStrategy::IdCollision { .. }
            | MutationStrategy::DoctypeIdInjection
            | MutationStrategy::NamespaceConfusion => true,
            MutationStrategy::SignatureRelocation { variant } => *variant == RelocationVariant::IntoObject,
            MutationStrategy::AlgorithmSubstitution { .. } | MutationStrategy::CommentInjection => false,
        }
    }

    /// A filesystem-friendly name.
    pub fn slug(&self) -> String {
        self.to_string()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect::<String>()
            .split('-')
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("-")
    }
}

impl fmt::Display for MutationStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationStrategy::Wrapping { placement } => {
                let p = match placement {
                    WrapperPlacement::ForgedThenWrapper => "forged-then-wrapper",
                    WrapperPlacement::WrapperInForged => "wrapper-in-forged",
                    WrapperPlacement::WrapperThenForged => "wrapper-then-forged",
                };
                write!(f, "wrapping({p})")
            }
            MutationStrategy::IdCollision { variant } => match variant {
                IdCollisionVariant::Duplicate => write!(f, "id-collision(duplicate)"),
                IdCollisionVariant::AttributePollution => write!(f, "id-collision(attribute-pollution)"),
            },
            MutationStrategy::AlgorithmSubstitution { to } => {
                write!(f, "algorithm-substitution({})", algorithm::short_name(to.uri()))
            }
            MutationStrategy::CommentInjection => write!(f, "comment-injection"),
            MutationStrategy::SignatureRelocation { variant } => match variant {
                RelocationVariant::IntoObject => write!(f, "signature-relocation(into-object)"),
                RelocationVariant::ToRoot => write!(f, "signature-relocation(to-root)"),
            },
            MutationStrategy::DoctypeIdInjection => write!(f, "doctype-id-injection"),
            MutationStrategy::NamespaceConfusion => write!(f, "namespace-confusion"),
        }
    }
}

/// Strategy families. The derived order is the order the orchestrator
/// tries them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum StrategyClass {
    Wrapping,
    IdCollision,
    SignatureRelocation,
    CommentInjection,
    AlgorithmSubstitution,
    DoctypeInjection,
    NamespaceConfusion,
}

impl StrategyClass {
    pub const ALL: [StrategyClass; 7] = [
        StrategyClass::Wrapping,
        StrategyClass::IdCollision,
        StrategyClass::SignatureRelocation,
        StrategyClass::CommentInjection,
        StrategyClass::AlgorithmSubstitution,
        StrategyClass::DoctypeInjection,
        StrategyClass::NamespaceConfusion,
    ];

    /// The concrete strategies of this class. `current` is the SignedInfo
    /// canonicalization method, `allowed` the modes a verifier accepts.
    pub fn variants(
        &self,
        current: C14nMode,
        allowed: impl IntoIterator<Item = C14nMode>,
    ) -> Vec<MutationStrategy> {
        match self {
            StrategyClass::Wrapping => WrapperPlacement::ALL
                .into_iter()
                .map(|placement| MutationStrategy::Wrapping { placement })
                .collect(),
            StrategyClass::IdCollision => vec![
                MutationStrategy::IdCollision {
                    variant: IdCollisionVariant::Duplicate,
                },
                MutationStrategy::IdCollision {
                    variant: IdCollisionVariant::AttributePollution,
                },
            ],
            StrategyClass::SignatureRelocation => vec![
                MutationStrategy::SignatureRelocation {
                    variant: RelocationVariant::IntoObject,
                },
                MutationStrategy::SignatureRelocation {
                    variant: RelocationVariant::ToRoot,
                },
            ],
            StrategyClass::CommentInjection => vec![MutationStrategy::CommentInjection],
            StrategyClass::AlgorithmSubstitution => allowed
                .into_iter()
                .filter(|m| *m != current)
                .map(|to| MutationStrategy::AlgorithmSubstitution { to })
                .collect(),
            StrategyClass::DoctypeInjection => vec![MutationStrategy::DoctypeIdInjection],
            StrategyClass::NamespaceConfusion => vec![MutationStrategy::NamespaceConfusion],
        }
    }
}

impl fmt::Display for StrategyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StrategyClass::Wrapping => "wrapping",
            StrategyClass::IdCollision => "id-collision",
            StrategyClass::SignatureRelocation => "signature-relocation",
            StrategyClass::CommentInjection => "comment-injection",
            StrategyClass::AlgorithmSubstitution => "algorithm-substitution",
            StrategyClass::DoctypeInjection => "doctype-injection",
            StrategyClass::NamespaceConfusion => "namespace-confusion",
        };
        f.write_str(name)
    }
}

impl FromStr for StrategyClass {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        StrategyClass::ALL
            .into_iter()
            .find(|c| c.to_string() == s.trim().to_ascii_lowercase().replace('_', "-"))
            .ok_or_else(|| Error::Other(format!("unknown strategy class: {s}")))
    }
}
