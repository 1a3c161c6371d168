//! Adjudication kernel
//!
//! The deterministic core of the gavel decision pipeline:
//!
//! - `evidence`: document ingestion, excerpt catalog, and per-run
//!   evidence bundles with derived citation whitelists
//! - `stance`: closed, role-tagged stance documents produced by the
//!   three adversarial reasoners
//! - `guard`: schema + citation-whitelist validation with a bounded
//!   repair note for invented citations
//! - `resolve`: the fixed, priority-ordered rule table that turns
//!   three validated stances into exactly one final verdict
//! - `trace`: input/output fingerprinting and the replay cache
//! - `state`: the per-run phase machine with an absorbing
//!   fail-closed terminal
//!
//! Everything in this crate is pure or local-disk only. Reasoner
//! invocation and run orchestration live in `gavel-agents`.

pub mod evidence;
pub mod guard;
pub mod resolve;
pub mod stance;
pub mod state;
pub mod trace;

pub use evidence::{
    CategoryLimitSelector, Document, EmptyBundleError, EvidenceBundle, Excerpt, ExcerptCatalog,
    ExcerptCategory, ExcerptSelector,
};
pub use guard::{GuardViolation, ValidatedStance};
pub use resolve::{FinalVerdict, Outcome, ResolutionError, RuleId, RULESET_VERSION};
pub use stance::{
    AdvocateDoc, AdvocateStance, AdversaryDoc, AdversaryStance, AuditorDoc, AuditorStance,
    HardStop, Role, StanceDocument,
};
pub use state::{PhaseTransition, RunPhase, RunState, TransitionError};
pub use trace::{
    Fingerprint, JsonlTraceStore, MemoryTraceStore, RunTrace, StageOutputs, StoredRun, TraceStore,
    TraceStoreError,
};
