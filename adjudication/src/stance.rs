//! Stance documents — the structured positions produced by the three
//! adversarial reasoner roles.
//!
//! Each role has its own closed stance enumeration and document shape.
//! Reasoner output arrives as untrusted JSON; these types are only
//! constructed through guard validation (see `guard`), after which they
//! are immutable for the rest of the run.

use serde::{Deserialize, Serialize};

/// Reasoner role. The three roles carry deliberately conflicting
/// objectives so disagreement is structural, not accidental.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Permissive interpreter — looks for a way to approve, naming
    /// the conditions approval would require.
    Advocate,
    /// Conservative guardian — surfaces risk flags and hard stops.
    Adversary,
    /// Strict verifier — demands documented proof for every claim.
    Auditor,
}

impl Role {
    /// All roles in the fixed resolution order.
    pub const ALL: [Role; 3] = [Role::Advocate, Role::Adversary, Role::Auditor];

    /// Stable index used to reassemble concurrent results in role order.
    pub fn index(self) -> usize {
        match self {
            Self::Advocate => 0,
            Self::Adversary => 1,
            Self::Auditor => 2,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Advocate => write!(f, "advocate"),
            Self::Adversary => write!(f, "adversary"),
            Self::Auditor => write!(f, "auditor"),
        }
    }
}

/// Advocate stance values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvocateStance {
    /// Approvable as-is.
    Affirm,
    /// Approvable once the stated conditions hold.
    AffirmWithConditions,
    /// Not approvable even on a permissive reading.
    Deny,
}

/// Adversary stance values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdversaryStance {
    /// No objection.
    Affirm,
    /// Risks flagged, none blocking on their own.
    AffirmWithConditions,
    /// Outright denial.
    Deny,
}

/// Auditor stance values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditorStance {
    /// Every required fact is documented in the bundle.
    Sufficient,
    /// Some required facts documented, some not.
    Partial,
    /// Required facts are absent from the bundle.
    Missing,
}

impl AuditorStance {
    /// Whether the auditor found the evidence incomplete.
    pub fn is_incomplete(self) -> bool {
        matches!(self, Self::Partial | Self::Missing)
    }
}

/// A blocking claim raised by the adversary.
///
/// The flag-versus-hard-stop boundary is an explicit classification,
/// not something inferred from free text: non-blocking concerns go in
/// `risk_flags`, blocking claims arrive here. A hard stop only loses
/// its blocking force when `waived` is set and backed by a citation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardStop {
    /// The blocking claim.
    pub claim: String,
    /// Whether cited evidence explicitly resolves or waives the claim.
    #[serde(default)]
    pub waived: bool,
    /// The excerpt id backing the waiver, if any.
    #[serde(default)]
    pub citation: Option<String>,
}

impl HardStop {
    /// Whether this hard stop still blocks approval.
    pub fn is_blocking(&self) -> bool {
        !(self.waived && self.citation.is_some())
    }
}

/// Advocate document — the permissive case for approval.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvocateDoc {
    pub stance: AdvocateStance,
    /// Conditions that must hold for approval.
    #[serde(default)]
    pub conditions: Vec<String>,
    pub rationale: String,
    /// Excerpt ids cited in support.
    #[serde(default)]
    pub citations: Vec<String>,
}

/// Adversary document — risks, hard stops, and the case against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdversaryDoc {
    pub stance: AdversaryStance,
    /// Non-blocking warning signs.
    #[serde(default)]
    pub risk_flags: Vec<String>,
    /// Blocking claims; unwaived entries force rejection.
    #[serde(default)]
    pub hard_stops: Vec<HardStop>,
    pub rationale: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl AdversaryDoc {
    /// Hard stops that still block approval.
    pub fn blocking_hard_stops(&self) -> Vec<&HardStop> {
        self.hard_stops.iter().filter(|h| h.is_blocking()).collect()
    }
}

/// Auditor document — what is proven and what is not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditorDoc {
    pub stance: AuditorStance,
    /// Facts documented in the bundle.
    #[serde(default)]
    pub available_evidence: Vec<String>,
    /// Facts required for approval but absent.
    #[serde(default)]
    pub missing_evidence: Vec<String>,
    pub rationale: String,
    #[serde(default)]
    pub citations: Vec<String>,
}

/// A role-tagged stance document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "snake_case")]
pub enum StanceDocument {
    Advocate(AdvocateDoc),
    Adversary(AdversaryDoc),
    Auditor(AuditorDoc),
}

impl StanceDocument {
    /// The role that produced this document.
    pub fn role(&self) -> Role {
        match self {
            Self::Advocate(_) => Role::Advocate,
            Self::Adversary(_) => Role::Adversary,
            Self::Auditor(_) => Role::Auditor,
        }
    }

    /// Every citation appearing anywhere in the document, including
    /// citations attached to hard-stop waivers.
    pub fn all_citations(&self) -> Vec<&str> {
        let mut out: Vec<&str> = match self {
            Self::Advocate(d) => d.citations.iter().map(String::as_str).collect(),
            Self::Adversary(d) => {
                let mut cites: Vec<&str> = d.citations.iter().map(String::as_str).collect();
                cites.extend(
                    d.hard_stops
                        .iter()
                        .filter_map(|h| h.citation.as_deref()),
                );
                cites
            }
            Self::Auditor(d) => d.citations.iter().map(String::as_str).collect(),
        };
        out.sort_unstable();
        out.dedup();
        out
    }

    /// Stance value rendered in its wire spelling.
    pub fn stance_label(&self) -> &'static str {
        match self {
            Self::Advocate(d) => match d.stance {
                AdvocateStance::Affirm => "affirm",
                AdvocateStance::AffirmWithConditions => "affirm_with_conditions",
                AdvocateStance::Deny => "deny",
            },
            Self::Adversary(d) => match d.stance {
                AdversaryStance::Affirm => "affirm",
                AdversaryStance::AffirmWithConditions => "affirm_with_conditions",
                AdversaryStance::Deny => "deny",
            },
            Self::Auditor(d) => match d.stance {
                AuditorStance::Sufficient => "sufficient",
                AuditorStance::Partial => "partial",
                AuditorStance::Missing => "missing",
            },
        }
    }
}
