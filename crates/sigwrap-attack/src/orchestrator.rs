#![forbid(unsafe_code)]

//! The attack orchestrator: a lazy, deterministic stream of candidates
//! that still verify.
//!
//! The plan (signature × strategy × variant) is fixed when the run starts,
//! grouped by strategy class in priority order. A class is only ranked when
//! the consumer pulls past the previous one: each of its mutations is built
//! once to score its payload divergence and then dropped, so a ranked class
//! holds plan entries, not trees. Each `next()` rebuilds the best remaining
//! entry and verifies it, until one is accepted.
//!
//! With a payload rewrite configured, strategies that forge the payload but
//! leave what a consumer reads unchanged (divergence 0) are not ranked.

use crate::candidate::{no_worse_than, Candidate, Mutation};
use crate::config::AttackConfig;
use crate::mutate::generate;
use crate::strategy::{MutationStrategy, StrategyClass};
use sigwrap_dsig::{extract, verify_document, DocumentVerdict, Signature};
use sigwrap_xml::Document;
use std::collections::VecDeque;

/// One planned mutation: which signature, which strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PlanEntry {
    signature: usize,
    strategy: MutationStrategy,
}

pub struct AttackRun {
    input: Document,
    config: AttackConfig,
    signatures: Vec<Signature>,
    baseline: DocumentVerdict,
    plan: VecDeque<(StrategyClass, Vec<PlanEntry>)>,
    /// The class being consumed, best divergence first.
    ranked: VecDeque<PlanEntry>,
    accepted: usize,
}

/// Start an attack run against `doc`. Nothing is mutated until the run
/// is iterated.
pub fn run(doc: &Document, config: &AttackConfig) -> AttackRun {
    let baseline = verify_document(doc, &config.verify);
    let signatures = extract(doc).signatures;
    if signatures.is_empty() {
        tracing::info!("document carries no readable signature");
    } else if !baseline.is_valid() {
        tracing::warn!("baseline does not verify; keeping candidates that fail no more checks");
    }

    let mut plan = VecDeque::new();
    for class in &config.strategies {
        let entries: Vec<PlanEntry> = signatures
            .iter()
            .enumerate()
            .flat_map(|(index, sig)| {
                class
                    .variants(sig.signed_info.c14n_mode, config.verify.c14n_allow_list.iter().copied())
                    .into_iter()
                    .map(move |strategy| PlanEntry {
                        signature: index,
                        strategy,
                    })
            })
            .collect();
        if !entries.is_empty() {
            plan.push_back((*class, entries));
        }
    }
    tracing::debug!(
        signatures = signatures.len(),
        planned = plan.iter().map(|(_, e)| e.len()).sum::<usize>(),
        "attack planned"
    );

    AttackRun {
        input: doc.clone(),
        config: config.clone(),
        signatures,
        baseline,
        plan,
        ranked: VecDeque::new(),
        accepted: 0,
    }
}

impl AttackRun {
    /// Verdicts of the unmodified input.
    pub fn baseline(&self) -> &DocumentVerdict {
        &self.baseline
    }

    pub fn is_baseline_valid(&self) -> bool {
        self.baseline.is_valid()
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// Candidates yielded so far.
    pub fn accepted(&self) -> usize {
        self.accepted
    }

    fn build(&self, entry: PlanEntry) -> Option<Mutation> {
        let signature = &self.signatures[entry.signature];
        match generate(&self.input, signature, entry.strategy, &self.config) {
            Ok(m) => Some(m),
            Err(e) => {
                tracing::debug!(strategy = %entry.strategy, error = %e, "mutation skipped");
                None
            }
        }
    }

    fn rank_class(&mut self, class: StrategyClass, entries: Vec<PlanEntry>) {
        let filter_inert = !self.config.payload.is_empty();
        let mut scored: Vec<(usize, PlanEntry)> = entries
            .into_iter()
            .filter_map(|entry| {
                let divergence = self.build(entry)?.divergence;
                if filter_inert && divergence == 0 && entry.strategy.forges_payload() {
                    tracing::debug!(strategy = %entry.strategy, "forged payload is never read, skipped");
                    return None;
                }
                Some((divergence, entry))
            })
            .collect();
        // Stable: equal divergence keeps plan order.
        scored.sort_by(|a, b| b.0.cmp(&a.0));
        tracing::debug!(%class, mutations = scored.len(), "strategy class ranked");
        self.ranked = scored.into_iter().map(|(_, entry)| entry).collect();
    }

    fn accepts(&self, candidate: &Candidate) -> bool {
        if self.baseline.is_valid() {
            candidate.is_valid()
        } else {
            no_worse_than(candidate.document_verdict(), &self.baseline)
        }
    }
}

impl Iterator for AttackRun {
    type Item = Candidate;

    fn next(&mut self) -> Option<Candidate> {
        loop {
            if self.config.max_candidates.is_some_and(|max| self.accepted >= max) {
                return None;
            }
            let Some(entry) = self.ranked.pop_front() else {
                let (class, entries) = self.plan.pop_front()?;
                self.rank_class(class, entries);
                continue;
            };
            let Some(mutation) = self.build(entry) else {
                continue;
            };
            let candidate = mutation.verify(&self.config.verify);
            if self.accepts(&candidate) {
                self.accepted += 1;
                tracing::info!(
                    strategy = %candidate.strategy(),
                    divergence = candidate.divergence(),
                    "candidate accepted"
                );
                return Some(candidate);
            }
            tracing::debug!(strategy = %candidate.strategy(), "candidate rejected");
        }
    }
}
