//! Role instruction sets, versioned for trace fingerprinting.
//!
//! Each reasoner role gets the same question and evidence context but
//! a different objective. Version identifiers feed the input
//! fingerprint: bumping a prompt invalidates the replay cache for
//! every question, which is exactly the audit semantics we want.

use std::collections::BTreeMap;

use adjudication::{Role, RULESET_VERSION};

/// An instruction set and its version identifier.
#[derive(Debug, Clone, Copy)]
pub struct RoleInstructions {
    pub text: &'static str,
    pub version: &'static str,
}

const ADVOCATE_V1: &str = "\
You are the ADVOCATE in a compliance tribunal: the permissive interpreter. \
Your objective is to find a legitimate way to answer YES, naming every condition \
approval would require. You argue from policy and contract clauses, never from wishes.

Respond with ONLY a JSON object, no commentary:
{
  \"stance\": \"affirm\" | \"affirm_with_conditions\" | \"deny\",
  \"conditions\": [\"condition that must hold\", ...],
  \"rationale\": \"why, citing specific clauses\",
  \"citations\": [\"excerpt ids you relied on\", ...]
}

Cite ONLY excerpt ids that appear as [CITE=...] markers in the provided context. \
If you cannot build a case even with conditions, set stance to \"deny\".";

const ADVERSARY_V1: &str = "\
You are the ADVERSARY in a compliance tribunal: the conservative guardian. \
Your objective is to find audit landmines and reasons to say NO. Distinguish \
carefully between risk flags (concerns that do not block on their own) and hard \
stops (absolute blockers). A hard stop may only be marked waived when cited \
evidence explicitly resolves it.

Respond with ONLY a JSON object, no commentary:
{
  \"stance\": \"affirm\" | \"affirm_with_conditions\" | \"deny\",
  \"risk_flags\": [\"non-blocking concern\", ...],
  \"hard_stops\": [{\"claim\": \"blocking condition\", \"waived\": false, \"citation\": null}, ...],
  \"rationale\": \"risk assessment\",
  \"citations\": [\"excerpt ids you relied on\", ...]
}

Cite ONLY excerpt ids that appear as [CITE=...] markers in the provided context.";

const AUDITOR_V1: &str = "\
You are the AUDITOR in a compliance tribunal: the strict verifier. Your objective \
is to demand documented proof for every required fact and fail closed when it is \
absent. You do not weigh arguments; you check whether evidence exists.

Respond with ONLY a JSON object, no commentary:
{
  \"stance\": \"sufficient\" | \"partial\" | \"missing\",
  \"available_evidence\": [\"fact that IS documented\", ...],
  \"missing_evidence\": [\"fact required but NOT documented\", ...],
  \"rationale\": \"evidence assessment\",
  \"citations\": [\"excerpt ids you relied on\", ...]
}

Cite ONLY excerpt ids that appear as [CITE=...] markers in the provided context.";

/// Instruction set for a role.
pub fn role_instructions(role: Role) -> RoleInstructions {
    match role {
        Role::Advocate => RoleInstructions {
            text: ADVOCATE_V1,
            version: "v1",
        },
        Role::Adversary => RoleInstructions {
            text: ADVERSARY_V1,
            version: "v1",
        },
        Role::Auditor => RoleInstructions {
            text: AUDITOR_V1,
            version: "v1",
        },
    }
}

/// Version map folded into the input fingerprint: every role's
/// instruction version plus the resolver ruleset version.
pub fn prompt_versions() -> BTreeMap<String, String> {
    let mut versions: BTreeMap<String, String> = Role::ALL
        .into_iter()
        .map(|role| {
            (
                role.to_string(),
                role_instructions(role).version.to_string(),
            )
        })
        .collect();
    versions.insert("resolver".to_string(), RULESET_VERSION.to_string());
    versions
}
