//! Resolution engine — turns three validated stance documents into
//! exactly one final verdict.
//!
//! Resolution is a pure function: no external calls, no randomness, no
//! hidden state. The rules live in an explicit ordered table evaluated
//! first-match-wins, so the "exactly one rule fires" invariant is
//! mechanically checkable. Rule 5 is a catch-all; a triple that matches
//! nothing is a defensive error and fails the run closed.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::stance::{AdvocateStance, AdversaryStance, AdvocateDoc, AdversaryDoc, AuditorDoc, AuditorStance};

/// Version identifier of the rule table, folded into the input
/// fingerprint so rule changes invalidate the replay cache.
pub const RULESET_VERSION: &str = "v1";

/// Final decision outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Outcome {
    Approve,
    Reject,
    InsufficientEvidence,
    ConditionalApprove,
    FailClosed,
}

impl Outcome {
    /// Whether this outcome grants approval in any form.
    pub fn is_approving(self) -> bool {
        matches!(self, Self::Approve | Self::ConditionalApprove)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Approve => write!(f, "APPROVE"),
            Self::Reject => write!(f, "REJECT"),
            Self::InsufficientEvidence => write!(f, "INSUFFICIENT_EVIDENCE"),
            Self::ConditionalApprove => write!(f, "CONDITIONAL_APPROVE"),
            Self::FailClosed => write!(f, "FAIL_CLOSED"),
        }
    }
}

/// Identifier of the rule that produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuleId {
    /// Unwaived adversary hard stop.
    #[serde(rename = "RULE_1")]
    HardStop,
    /// Auditor found evidence missing or partial.
    #[serde(rename = "RULE_2")]
    Insufficiency,
    /// Adversary outright denial.
    #[serde(rename = "RULE_3")]
    AdversaryDeny,
    /// Advocate approval is conditional.
    #[serde(rename = "RULE_4")]
    Conditional,
    /// All three roles pass without objection.
    #[serde(rename = "RULE_5")]
    DefaultApprove,
    /// Synthesized by the orchestrator when any stage errored.
    #[serde(rename = "FAIL_CLOSED_ON_ERROR")]
    FailClosedOnError,
}

impl std::fmt::Display for RuleId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HardStop => write!(f, "RULE_1"),
            Self::Insufficiency => write!(f, "RULE_2"),
            Self::AdversaryDeny => write!(f, "RULE_3"),
            Self::Conditional => write!(f, "RULE_4"),
            Self::DefaultApprove => write!(f, "RULE_5"),
            Self::FailClosedOnError => write!(f, "FAIL_CLOSED_ON_ERROR"),
        }
    }
}

/// The resolved decision. Created exactly once per run and immutable
/// thereafter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalVerdict {
    pub outcome: Outcome,
    pub rule_applied: RuleId,
    /// Violations found (blocking claims, denial grounds).
    pub violations: Vec<String>,
    /// What must change or be provided for approval.
    pub conditions_to_satisfy: Vec<String>,
    /// Union of citations from the documents that triggered the rule.
    pub citations: Vec<String>,
    /// Advisory only; never gates which rule fires.
    pub confidence: f64,
}

impl FinalVerdict {
    /// Synthesize the fail-closed verdict for an errored run.
    pub fn fail_closed(conditions: Vec<String>) -> Self {
        Self {
            outcome: Outcome::FailClosed,
            rule_applied: RuleId::FailClosedOnError,
            violations: Vec::new(),
            conditions_to_satisfy: conditions,
            citations: Vec::new(),
            confidence: 0.0,
        }
    }
}

/// Defensive error: the rule table produced no match. Unreachable while
/// rule 5 stays a catch-all, but checked rather than assumed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no resolution rule matched the stance triple")]
pub struct ResolutionError;

/// The three validated documents in fixed role order.
#[derive(Debug, Clone, Copy)]
struct StanceTriple<'a> {
    advocate: &'a AdvocateDoc,
    adversary: &'a AdversaryDoc,
    auditor: &'a AuditorDoc,
}

struct Rule {
    id: RuleId,
    matches: fn(&StanceTriple) -> bool,
    build: fn(&StanceTriple) -> FinalVerdict,
}

fn rule_table() -> [Rule; 5] {
    [
        Rule {
            id: RuleId::HardStop,
            matches: |t| !t.adversary.blocking_hard_stops().is_empty(),
            build: |t| {
                let blocking = t.adversary.blocking_hard_stops();
                FinalVerdict {
                    outcome: Outcome::Reject,
                    rule_applied: RuleId::HardStop,
                    violations: blocking.iter().map(|h| h.claim.clone()).collect(),
                    conditions_to_satisfy: Vec::new(),
                    citations: union_citations(&[&t.adversary.citations]),
                    confidence: 0.0,
                }
            },
        },
        Rule {
            id: RuleId::Insufficiency,
            matches: |t| t.auditor.stance.is_incomplete(),
            build: |t| FinalVerdict {
                outcome: Outcome::InsufficientEvidence,
                rule_applied: RuleId::Insufficiency,
                violations: Vec::new(),
                conditions_to_satisfy: t.auditor.missing_evidence.clone(),
                citations: union_citations(&[&t.auditor.citations]),
                confidence: 0.0,
            },
        },
        Rule {
            id: RuleId::AdversaryDeny,
            matches: |t| t.adversary.stance == AdversaryStance::Deny,
            build: |t| FinalVerdict {
                outcome: Outcome::Reject,
                rule_applied: RuleId::AdversaryDeny,
                violations: t.adversary.risk_flags.clone(),
                conditions_to_satisfy: Vec::new(),
                citations: union_citations(&[&t.adversary.citations]),
                confidence: 0.0,
            },
        },
        Rule {
            id: RuleId::Conditional,
            matches: |t| t.advocate.stance == AdvocateStance::AffirmWithConditions,
            build: |t| FinalVerdict {
                outcome: Outcome::ConditionalApprove,
                rule_applied: RuleId::Conditional,
                violations: Vec::new(),
                conditions_to_satisfy: t.advocate.conditions.clone(),
                citations: union_citations(&[&t.advocate.citations]),
                confidence: 0.0,
            },
        },
        Rule {
            id: RuleId::DefaultApprove,
            matches: |_| true,
            build: |t| FinalVerdict {
                outcome: Outcome::Approve,
                rule_applied: RuleId::DefaultApprove,
                violations: Vec::new(),
                conditions_to_satisfy: Vec::new(),
                citations: union_citations(&[
                    &t.advocate.citations,
                    &t.adversary.citations,
                    &t.auditor.citations,
                ]),
                confidence: 0.0,
            },
        },
    ]
}

/// Resolve a validated stance triple into the final verdict.
pub fn resolve(
    advocate: &AdvocateDoc,
    adversary: &AdversaryDoc,
    auditor: &AuditorDoc,
) -> Result<FinalVerdict, ResolutionError> {
    let triple = StanceTriple {
        advocate,
        adversary,
        auditor,
    };

    for rule in rule_table() {
        if (rule.matches)(&triple) {
            let mut verdict = (rule.build)(&triple);
            debug_assert_eq!(verdict.rule_applied, rule.id);
            verdict.confidence = confidence(verdict.outcome, &triple);
            return Ok(verdict);
        }
    }

    Err(ResolutionError)
}

/// Advisory confidence: monotonically decreasing in the number of
/// roles whose stance disagrees with the winning outcome.
fn confidence(outcome: Outcome, triple: &StanceTriple) -> f64 {
    let dissenters = [
        advocate_dissents(outcome, triple.advocate),
        adversary_dissents(outcome, triple.adversary),
        auditor_dissents(outcome, triple.auditor),
    ]
    .into_iter()
    .filter(|d| *d)
    .count();

    match dissenters {
        0 => 0.95,
        1 => 0.70,
        2 => 0.45,
        _ => 0.20,
    }
}

fn advocate_dissents(outcome: Outcome, doc: &AdvocateDoc) -> bool {
    if outcome.is_approving() {
        doc.stance == AdvocateStance::Deny
    } else {
        doc.stance != AdvocateStance::Deny
    }
}

fn adversary_dissents(outcome: Outcome, doc: &AdversaryDoc) -> bool {
    let objects = doc.stance == AdversaryStance::Deny || !doc.blocking_hard_stops().is_empty();
    match outcome {
        _ if outcome.is_approving() => objects,
        Outcome::Reject => !objects,
        // The adversary takes no position on evidence sufficiency.
        _ => false,
    }
}

fn auditor_dissents(outcome: Outcome, doc: &AuditorDoc) -> bool {
    match outcome {
        _ if outcome.is_approving() => doc.stance.is_incomplete(),
        Outcome::InsufficientEvidence => doc.stance == AuditorStance::Sufficient,
        // The auditor takes no position on rejection grounds.
        _ => false,
    }
}

/// Sorted, deduplicated union of citation lists.
fn union_citations(lists: &[&Vec<String>]) -> Vec<String> {
    let mut out: Vec<String> = lists.iter().flat_map(|l| l.iter().cloned()).collect();
    out.sort_unstable();
    out.dedup();
    out
}
