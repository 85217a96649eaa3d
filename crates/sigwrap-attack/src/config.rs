#![forbid(unsafe_code)]

//! Attack configuration.

use crate::payload::PayloadRewrite;
use crate::strategy::StrategyClass;
use sigwrap_dsig::VerifyContext;
use std::collections::BTreeSet;

/// Local name of the element that hides the genuine target.
pub const DEFAULT_WRAPPER_NAME: &str = "Extensions";

#[derive(Debug, Clone)]
pub struct AttackConfig {
    /// How baseline and candidates are verified; the ID policy also picks
    /// the signed target.
    pub verify: VerifyContext,
    pub payload: PayloadRewrite,
    pub wrapper_name: String,
    /// Strategy classes to try; iteration follows the class order.
    pub strategies: BTreeSet<StrategyClass>,
    /// Stop after this many accepted candidates.
    pub max_candidates: Option<usize>,
}

impl Default for AttackConfig {
    fn default() -> Self {
        Self {
            verify: VerifyContext::default(),
            payload: PayloadRewrite::default(),
            wrapper_name: DEFAULT_WRAPPER_NAME.to_owned(),
            strategies: StrategyClass::ALL.into_iter().collect(),
            max_candidates: None,
        }
    }
}

impl AttackConfig {
    pub fn new(verify: VerifyContext) -> Self {
        Self {
            verify,
            ..Self::default()
        }
    }

    pub fn with_payload(mut self, payload: PayloadRewrite) -> Self {
        self.payload = payload;
        self
    }

    pub fn with_wrapper_name(mut self, name: &str) -> Self {
        self.wrapper_name = name.to_owned();
        self
    }

    pub fn with_strategies(mut self, classes: impl IntoIterator<Item = StrategyClass>) -> Self {
        self.strategies = classes.into_iter().collect();
        self
    }

    pub fn with_max_candidates(mut self, max: usize) -> Self {
        self.max_candidates = Some(max);
        self
    }
}
