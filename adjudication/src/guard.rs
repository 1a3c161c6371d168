//! Guard layer — the trust boundary between raw reasoner output and
//! the resolution engine.
//!
//! Raw payloads are untrusted JSON. Validation runs in a fixed order:
//! structural conformance first (the payload must deserialize into the
//! role's closed document shape), then citation whitelist closure.
//! A structural violation is fatal with zero retries. A hallucinated
//! citation earns exactly one repair retry, driven by the orchestrator
//! with the note built here; a second violation is unconditionally
//! fatal for the run.

use std::collections::BTreeSet;

use thiserror::Error;
use tracing::warn;

use crate::stance::{AdvocateDoc, AdversaryDoc, AuditorDoc, Role, StanceDocument};

/// A guard validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardViolation {
    /// The payload does not conform to the role's output contract.
    /// Always fatal immediately.
    #[error("structural violation from {role}: {reason}")]
    Structural { role: Role, reason: String },

    /// One or more citations fall outside the run's whitelist.
    /// Allows a single repair retry before becoming fatal.
    #[error("hallucinated citations from {role}: {ids:?}")]
    HallucinatedCitation { role: Role, ids: Vec<String> },
}

impl GuardViolation {
    /// Whether this violation is eligible for the bounded repair retry.
    pub fn is_repairable(&self) -> bool {
        matches!(self, Self::HallucinatedCitation { .. })
    }
}

/// A stance document that has passed guard validation.
///
/// The inner document is private; the only way to obtain one is
/// through [`validate`], so anything holding a `ValidatedStance` is
/// downstream of the whitelist check by construction.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedStance {
    document: StanceDocument,
}

impl ValidatedStance {
    pub fn role(&self) -> Role {
        self.document.role()
    }

    pub fn document(&self) -> &StanceDocument {
        &self.document
    }

    pub fn into_document(self) -> StanceDocument {
        self.document
    }
}

/// Validate a raw reasoner payload for `role` against `whitelist`.
pub fn validate(
    role: Role,
    raw: &serde_json::Value,
    whitelist: &BTreeSet<String>,
) -> Result<ValidatedStance, GuardViolation> {
    let document = deserialize_for_role(role, raw)?;

    let hallucinated: Vec<String> = document
        .all_citations()
        .into_iter()
        .filter(|id| !whitelist.contains(*id))
        .map(str::to_string)
        .collect();

    if !hallucinated.is_empty() {
        warn!(role = %role, ids = ?hallucinated, "citations outside whitelist");
        return Err(GuardViolation::HallucinatedCitation {
            role,
            ids: hallucinated,
        });
    }

    Ok(ValidatedStance { document })
}

/// Build the correction note appended to a repair retry prompt.
pub fn repair_note(invalid: &[String], whitelist: &BTreeSet<String>) -> String {
    let allowed: Vec<&str> = whitelist.iter().map(String::as_str).collect();
    format!(
        "INVALID_CITATIONS: The following citations are not allowed: {:?}. \
         Allowed citations are: {:?}. Correct your response, citing only allowed excerpts.",
        invalid, allowed
    )
}

fn deserialize_for_role(
    role: Role,
    raw: &serde_json::Value,
) -> Result<StanceDocument, GuardViolation> {
    // Payloads may arrive with or without the role tag; the expected
    // role is authoritative, and a conflicting tag is a violation.
    if let Some(tag) = raw.get("role").and_then(|v| v.as_str()) {
        if tag != role.to_string() {
            return Err(GuardViolation::Structural {
                role,
                reason: format!("payload tagged for role {tag:?}"),
            });
        }
    }
    let mut body = raw.clone();
    if let Some(obj) = body.as_object_mut() {
        obj.remove("role");
    }

    let structural = |e: serde_json::Error| GuardViolation::Structural {
        role,
        reason: e.to_string(),
    };

    Ok(match role {
        Role::Advocate => {
            StanceDocument::Advocate(serde_json::from_value::<AdvocateDoc>(body).map_err(structural)?)
        }
        Role::Adversary => StanceDocument::Adversary(
            serde_json::from_value::<AdversaryDoc>(body).map_err(structural)?,
        ),
        Role::Auditor => {
            StanceDocument::Auditor(serde_json::from_value::<AuditorDoc>(body).map_err(structural)?)
        }
    })
}
