//! Trace and replay — fingerprinting and the audit record of a run.
//!
//! The input fingerprint is the correctness anchor: a pure blake3
//! digest of (question, excerpt ids in bundle order, prompt/ruleset
//! versions). Identical inputs always produce identical fingerprints,
//! and a cached run is returned byte-for-byte with `replayed = true`.

mod store;

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resolve::FinalVerdict;
use crate::stance::StanceDocument;

pub use store::{JsonlTraceStore, MemoryTraceStore, TraceStore, TraceStoreError};

/// A blake3 digest rendered as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// Fingerprint a run's inputs.
    ///
    /// The payload is a canonical concatenation with `|` and `,`
    /// separators; excerpt ids are taken in bundle order, versions in
    /// sorted key order. Any change to question, bundle composition or
    /// ordering, or any instruction/ruleset version changes the digest.
    pub fn compute(
        question: &str,
        excerpt_ids: &[String],
        versions: &BTreeMap<String, String>,
    ) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(question.as_bytes());
        hasher.update(b"|");
        hasher.update(excerpt_ids.join(",").as_bytes());
        hasher.update(b"|");
        let version_pairs: Vec<String> =
            versions.iter().map(|(k, v)| format!("{k}:{v}")).collect();
        hasher.update(version_pairs.join(",").as_bytes());
        Self(hasher.finalize().to_hex().to_string())
    }

    /// Fingerprint a stage output from its canonical JSON rendering.
    pub fn of_stance(document: &StanceDocument) -> Self {
        Self::of_json(document)
    }

    /// Fingerprint a final verdict.
    pub fn of_verdict(verdict: &FinalVerdict) -> Self {
        Self::of_json(verdict)
    }

    fn of_json<T: Serialize>(value: &T) -> Self {
        let json = serde_json::to_string(value).expect("stage output serializes");
        Self(blake3::hash(json.as_bytes()).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The validated stance documents of a completed run, in fixed role
/// order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutputs {
    pub advocate: StanceDocument,
    pub adversary: StanceDocument,
    pub auditor: StanceDocument,
}

impl StageOutputs {
    /// Per-stage output fingerprints keyed by role name.
    pub fn output_hashes(&self) -> BTreeMap<String, String> {
        [
            ("advocate", &self.advocate),
            ("adversary", &self.adversary),
            ("auditor", &self.auditor),
        ]
        .into_iter()
        .map(|(role, doc)| (role.to_string(), Fingerprint::of_stance(doc).to_string()))
        .collect()
    }
}

/// Append-only audit record of a single run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunTrace {
    pub run_id: String,
    /// Fingerprint of the run's inputs; the replay cache key.
    pub input_hash: Fingerprint,
    pub question: String,
    /// Excerpt ids in bundle order.
    pub excerpt_ids: Vec<String>,
    /// Role instruction versions plus the resolver ruleset version.
    pub prompt_versions: BTreeMap<String, String>,
    /// blake3 of each validated stance document, keyed by role.
    pub agent_output_hashes: BTreeMap<String, String>,
    /// blake3 of the final verdict.
    pub final_output_hash: String,
    /// True when this result was served from the replay cache.
    pub replayed: bool,
    pub timestamp: DateTime<Utc>,
    pub latency_ms: Option<u64>,
}

/// A stored run: the trace plus everything needed to replay the result
/// byte-for-byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredRun {
    pub trace: RunTrace,
    pub stage_outputs: StageOutputs,
    pub verdict: FinalVerdict,
}

impl StoredRun {
    /// Self-consistency check: stage hashes and the final hash must be
    /// re-derivable from the stored outputs.
    pub fn is_consistent(&self) -> bool {
        self.trace.agent_output_hashes == self.stage_outputs.output_hashes()
            && self.trace.final_output_hash == Fingerprint::of_verdict(&self.verdict).to_string()
    }
}
