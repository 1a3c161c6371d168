//! Gavel — adversarial reasoner orchestration.
//!
//! Drives one governed compliance decision end-to-end: fan three
//! reasoners with conflicting objectives out over the same evidence
//! bundle, guard every output against the citation whitelist, resolve
//! disagreement through the fixed rule table, and fingerprint the run
//! for byte-for-byte replay. The deterministic kernel lives in the
//! `adjudication` crate; this crate owns the concurrency, transport,
//! and configuration.

pub mod config;
pub mod orchestrator;
pub mod prompts;
pub mod reasoner;

pub use config::GavelConfig;
pub use orchestrator::{GavelOrchestrator, RunOutput};
pub use reasoner::{HttpReasoner, Reasoner, ReasonerError};
