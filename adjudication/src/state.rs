//! Run state machine — phases, transitions, and the absorbing
//! fail-closed terminal.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Phase of a decision run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunPhase {
    /// Run accepted, nothing built yet.
    Started,
    /// Evidence bundle and whitelist derived.
    BundleBuilt,
    /// Three reasoner invocations in flight.
    ReasonersRunning,
    /// All stances guard-validated.
    GuardsChecked,
    /// Final verdict produced by the resolution engine.
    Resolved,
    /// Trace record written.
    Traced,
    /// Terminal success.
    Done,
    /// Terminal failure — absorbing, reachable from any non-terminal
    /// phase.
    FailedClosed,
}

impl RunPhase {
    /// Whether this is a terminal phase. `Done` and `FailedClosed` are
    /// the only exits.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::FailedClosed)
    }

    /// Valid transitions from this phase.
    pub fn valid_transitions(self) -> &'static [RunPhase] {
        match self {
            Self::Started => &[Self::BundleBuilt, Self::FailedClosed],
            Self::BundleBuilt => &[Self::ReasonersRunning, Self::FailedClosed],
            Self::ReasonersRunning => &[Self::GuardsChecked, Self::FailedClosed],
            Self::GuardsChecked => &[Self::Resolved, Self::FailedClosed],
            Self::Resolved => &[Self::Traced, Self::FailedClosed],
            Self::Traced => &[Self::Done, Self::FailedClosed],
            Self::Done | Self::FailedClosed => &[],
        }
    }
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "STARTED"),
            Self::BundleBuilt => write!(f, "BUNDLE_BUILT"),
            Self::ReasonersRunning => write!(f, "REASONERS_RUNNING"),
            Self::GuardsChecked => write!(f, "GUARDS_CHECKED"),
            Self::Resolved => write!(f, "RESOLVED"),
            Self::Traced => write!(f, "TRACED"),
            Self::Done => write!(f, "DONE"),
            Self::FailedClosed => write!(f, "FAILED_CLOSED"),
        }
    }
}

/// A recorded phase transition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseTransition {
    pub from: RunPhase,
    pub to: RunPhase,
    pub timestamp: DateTime<Utc>,
    pub reason: String,
}

/// Error for invalid phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionError {
    pub from: RunPhase,
    pub to: RunPhase,
}

impl std::fmt::Display for TransitionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "invalid transition {} → {} (allowed: {:?})",
            self.from,
            self.to,
            self.from.valid_transitions()
        )
    }
}

impl std::error::Error for TransitionError {}

/// The lifecycle view of a single run. Only the orchestrator holds one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    pub run_id: String,
    pub phase: RunPhase,
    pub transitions: Vec<PhaseTransition>,
    pub started_at: DateTime<Utc>,
}

impl RunState {
    pub fn new(run_id: &str) -> Self {
        Self {
            run_id: run_id.to_string(),
            phase: RunPhase::Started,
            transitions: Vec::new(),
            started_at: Utc::now(),
        }
    }

    /// Transition to a new phase with a reason.
    pub fn transition(&mut self, to: RunPhase, reason: &str) -> Result<(), TransitionError> {
        if !self.phase.valid_transitions().contains(&to) {
            return Err(TransitionError {
                from: self.phase,
                to,
            });
        }
        self.transitions.push(PhaseTransition {
            from: self.phase,
            to,
            timestamp: Utc::now(),
            reason: reason.to_string(),
        });
        self.phase = to;
        Ok(())
    }

    /// Absorb into the fail-closed terminal. Valid from every
    /// non-terminal phase; a no-op error from terminals.
    pub fn fail_closed(&mut self, reason: &str) -> Result<(), TransitionError> {
        self.transition(RunPhase::FailedClosed, reason)
    }

    pub fn is_complete(&self) -> bool {
        self.phase.is_terminal()
    }

    /// Elapsed wall time since the run started.
    pub fn elapsed_ms(&self) -> u64 {
        (Utc::now() - self.started_at).num_milliseconds().max(0) as u64
    }
}
