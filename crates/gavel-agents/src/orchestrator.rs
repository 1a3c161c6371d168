//! Decision orchestrator — composes one governed run end-to-end.
//!
//! ```text
//! fingerprint → cache lookup ── hit ──→ stored verdict (replayed=true)
//!      │ miss
//! bundle → JoinSet fan-out (advocate | adversary | auditor)
//!      │         each: invoke → guard → (one repair retry) → validated
//!      │ join barrier, fixed role order
//! resolve → trace write → output
//! ```
//!
//! Every failure path converts to a synthesized FAIL_CLOSED verdict and
//! the run still returns normally. No code path reaches an approving
//! outcome without passing through `resolve` on guard-validated inputs.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use adjudication::guard::{self, GuardViolation, ValidatedStance};
use adjudication::resolve::resolve;
use adjudication::{
    EvidenceBundle, ExcerptSelector, FinalVerdict, Fingerprint, JsonlTraceStore, RunState,
    RunPhase, RunTrace, Role, StageOutputs, StanceDocument, StoredRun, TraceStore,
};

use crate::config::GavelConfig;
use crate::prompts::prompt_versions;
use crate::reasoner::{HttpReasoner, Reasoner, ReasonerError};

/// Result of one decision run.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub run_id: String,
    pub verdict: FinalVerdict,
    /// Validated stance documents in fixed role order; absent on
    /// fail-closed runs.
    pub stage_outputs: Option<StageOutputs>,
    pub trace: RunTrace,
}

/// Internal fatal-failure record carried to the fail-closed boundary.
struct FailClosed {
    kind: &'static str,
    cause: String,
    excerpt_ids: Vec<String>,
}

impl FailClosed {
    fn new(kind: &'static str, cause: impl Into<String>) -> Self {
        Self {
            kind,
            cause: cause.into(),
            excerpt_ids: Vec::new(),
        }
    }

    fn with_excerpts(mut self, excerpt_ids: Vec<String>) -> Self {
        self.excerpt_ids = excerpt_ids;
        self
    }

    fn condition(&self) -> String {
        format!("{}: {}", self.kind, self.cause)
    }
}

/// Fatal failure inside one reasoner task.
enum TaskFailure {
    Reasoner(ReasonerError),
    Guard(GuardViolation),
    Cancelled(Role),
    /// The task itself panicked or was aborted; the join error does
    /// not identify the role.
    Panic(String),
}

impl TaskFailure {
    fn kind(&self) -> &'static str {
        match self {
            Self::Reasoner(e) => e.kind(),
            Self::Guard(GuardViolation::Structural { .. }) => "STRUCTURAL_VIOLATION",
            Self::Guard(GuardViolation::HallucinatedCitation { .. }) => "HALLUCINATED_CITATION",
            Self::Cancelled(_) => "CANCELLED",
            Self::Panic(_) => "INTERNAL_ERROR",
        }
    }

    fn cause(&self) -> String {
        match self {
            Self::Reasoner(e) => e.to_string(),
            Self::Guard(v) => v.to_string(),
            Self::Cancelled(role) => format!("{role} cancelled after sibling failure"),
            Self::Panic(cause) => format!("reasoner task panicked: {cause}"),
        }
    }
}

/// The decision orchestrator. Dependencies are injected so tests can
/// substitute scripted reasoners and an in-memory trace store.
pub struct GavelOrchestrator {
    reasoner: Arc<dyn Reasoner>,
    selector: Arc<dyn ExcerptSelector>,
    store: Arc<dyn TraceStore>,
    config: GavelConfig,
}

impl GavelOrchestrator {
    pub fn new(
        reasoner: Arc<dyn Reasoner>,
        selector: Arc<dyn ExcerptSelector>,
        store: Arc<dyn TraceStore>,
        config: GavelConfig,
    ) -> Self {
        Self {
            reasoner,
            selector,
            store,
            config,
        }
    }

    /// Build the production wiring: HTTP reasoner, document-pack
    /// selector, durable JSONL trace store.
    pub fn from_config(config: GavelConfig) -> anyhow::Result<Self> {
        let catalog = adjudication::evidence::load_catalog(&config.docs_dir)?;
        let selector = Arc::new(adjudication::CategoryLimitSelector::new(catalog));
        let reasoner = Arc::new(HttpReasoner::new(
            config.endpoint.clone(),
            config.reasoner_timeout,
        ));
        let store = Arc::new(JsonlTraceStore::open(&config.trace_path)?);
        Ok(Self::new(reasoner, selector, store, config))
    }

    /// Run one governed decision. Always returns normally: errored
    /// runs carry a fully-formed FAIL_CLOSED verdict.
    pub async fn run(&self, question: &str) -> RunOutput {
        let started = Instant::now();
        let run_id = new_run_id();
        let mut state = RunState::new(&run_id);

        match self.execute(question, &run_id, &mut state, started).await {
            Ok(output) => output,
            Err(failure) => {
                let _ = state.fail_closed(&failure.condition());
                warn!(
                    run_id = %run_id,
                    kind = failure.kind,
                    cause = %failure.cause,
                    "run failed closed"
                );
                self.fail_closed_output(&run_id, question, failure, started)
            }
        }
    }

    async fn execute(
        &self,
        question: &str,
        run_id: &str,
        state: &mut RunState,
        started: Instant,
    ) -> Result<RunOutput, FailClosed> {
        let internal = |e: adjudication::TransitionError| {
            FailClosed::new("INTERNAL_ERROR", e.to_string())
        };

        // Bundle + whitelist. An empty bundle never silently approves;
        // it fails the run closed with a distinct condition.
        let bundle = EvidenceBundle::build(self.selector.as_ref(), question)
            .map_err(|e| FailClosed::new("EMPTY_BUNDLE", e.to_string()))?;
        let excerpt_ids = bundle.excerpt_ids();
        state
            .transition(
                RunPhase::BundleBuilt,
                &format!("{} excerpts selected", excerpt_ids.len()),
            )
            .map_err(internal)?;

        let versions = prompt_versions();
        let fingerprint = Fingerprint::compute(question, &excerpt_ids, &versions);

        // Replay: a hit short-circuits all reasoner, guard, and
        // resolution work and returns the stored verdict unchanged.
        if self.config.deterministic_replay {
            let cached = self.store.get(&fingerprint).await.map_err(|e| {
                FailClosed::new("TRACE_STORE_ERROR", e.to_string())
                    .with_excerpts(excerpt_ids.clone())
            })?;
            if let Some(stored) = cached {
                info!(run_id = %run_id, fingerprint = %fingerprint, "replaying cached run");
                let mut trace = stored.trace;
                trace.replayed = true;
                return Ok(RunOutput {
                    run_id: trace.run_id.clone(),
                    verdict: stored.verdict,
                    stage_outputs: Some(stored.stage_outputs),
                    trace,
                });
            }
        }

        state
            .transition(RunPhase::ReasonersRunning, "fan-out of 3 reasoners")
            .map_err(internal)?;
        let outputs = self
            .fan_out(question, &bundle)
            .await
            .map_err(|failure| {
                FailClosed::new(failure.kind(), failure.cause())
                    .with_excerpts(excerpt_ids.clone())
            })?;
        state
            .transition(RunPhase::GuardsChecked, "all stances validated")
            .map_err(internal)?;

        let (StanceDocument::Advocate(advocate), StanceDocument::Adversary(adversary), StanceDocument::Auditor(auditor)) =
            (&outputs.advocate, &outputs.adversary, &outputs.auditor)
        else {
            return Err(FailClosed::new("INTERNAL_ERROR", "stance documents out of role order")
                .with_excerpts(excerpt_ids));
        };

        let verdict = resolve(advocate, adversary, auditor).map_err(|e| {
            FailClosed::new("RESOLUTION_ERROR", e.to_string()).with_excerpts(excerpt_ids.clone())
        })?;
        state
            .transition(RunPhase::Resolved, &verdict.rule_applied.to_string())
            .map_err(internal)?;

        let trace = RunTrace {
            run_id: run_id.to_string(),
            input_hash: fingerprint,
            question: question.to_string(),
            excerpt_ids: excerpt_ids.clone(),
            prompt_versions: versions,
            agent_output_hashes: outputs.output_hashes(),
            final_output_hash: Fingerprint::of_verdict(&verdict).to_string(),
            replayed: false,
            timestamp: Utc::now(),
            latency_ms: Some(started.elapsed().as_millis() as u64),
        };
        let stored = StoredRun {
            trace: trace.clone(),
            stage_outputs: outputs.clone(),
            verdict: verdict.clone(),
        };
        debug_assert!(stored.is_consistent());
        self.store.put(stored).await.map_err(|e| {
            FailClosed::new("TRACE_STORE_ERROR", e.to_string()).with_excerpts(excerpt_ids)
        })?;
        state
            .transition(RunPhase::Traced, "trace recorded")
            .map_err(internal)?;
        state.transition(RunPhase::Done, "complete").map_err(internal)?;

        info!(
            run_id = %run_id,
            outcome = %verdict.outcome,
            rule = %verdict.rule_applied,
            latency_ms = trace.latency_ms.unwrap_or(0),
            "run complete"
        );

        Ok(RunOutput {
            run_id: run_id.to_string(),
            verdict,
            stage_outputs: Some(outputs),
            trace,
        })
    }

    /// Fan out the three reasoner invocations, cancel siblings on the
    /// first fatal failure, and reassemble results in fixed role order.
    async fn fan_out(
        &self,
        question: &str,
        bundle: &EvidenceBundle,
    ) -> Result<StageOutputs, TaskFailure> {
        let cancel = CancellationToken::new();
        let bundle = Arc::new(bundle.clone());
        let question: Arc<str> = Arc::from(question);
        let mut join_set: JoinSet<(Role, Result<ValidatedStance, TaskFailure>)> = JoinSet::new();

        for role in Role::ALL {
            let reasoner = Arc::clone(&self.reasoner);
            let bundle = Arc::clone(&bundle);
            let question = Arc::clone(&question);
            let cancel = cancel.clone();
            let repair_retries = self.config.max_repair_retries;

            join_set.spawn(async move {
                let result = tokio::select! {
                    _ = cancel.cancelled() => Err(TaskFailure::Cancelled(role)),
                    result = invoke_and_guard(
                        reasoner.as_ref(), role, &question, &bundle, repair_retries,
                    ) => result,
                };
                (role, result)
            });
        }

        // Join barrier. Completion order is unpredictable; slots are
        // keyed by role so resolution input order never depends on
        // external latency.
        let mut slots: [Option<ValidatedStance>; 3] = [None, None, None];
        let mut first_failure: Option<TaskFailure> = None;

        while let Some(joined) = join_set.join_next().await {
            match joined {
                Ok((role, Ok(stance))) => slots[role.index()] = Some(stance),
                Ok((_, Err(failure))) => {
                    if first_failure.is_none() {
                        first_failure = Some(failure);
                        cancel.cancel();
                    }
                }
                Err(e) => {
                    if first_failure.is_none() {
                        first_failure = Some(TaskFailure::Panic(e.to_string()));
                        cancel.cancel();
                    }
                }
            }
        }

        if let Some(failure) = first_failure {
            return Err(failure);
        }

        let [Some(advocate), Some(adversary), Some(auditor)] = slots else {
            return Err(TaskFailure::Cancelled(Role::Advocate));
        };

        Ok(StageOutputs {
            advocate: advocate.into_document(),
            adversary: adversary.into_document(),
            auditor: auditor.into_document(),
        })
    }

    /// Synthesize the fail-closed output. The run returns normally so
    /// callers render it like any other verdict. Fail-closed runs are
    /// not written to the replay cache: a transient fault must not be
    /// replayed as the permanent answer for its inputs.
    fn fail_closed_output(
        &self,
        run_id: &str,
        question: &str,
        failure: FailClosed,
        started: Instant,
    ) -> RunOutput {
        let verdict = FinalVerdict::fail_closed(vec![failure.condition()]);
        let trace = RunTrace {
            run_id: run_id.to_string(),
            input_hash: Fingerprint::compute(question, &failure.excerpt_ids, &prompt_versions()),
            question: question.to_string(),
            excerpt_ids: failure.excerpt_ids,
            prompt_versions: prompt_versions(),
            agent_output_hashes: Default::default(),
            final_output_hash: Fingerprint::of_verdict(&verdict).to_string(),
            replayed: false,
            timestamp: Utc::now(),
            latency_ms: Some(started.elapsed().as_millis() as u64),
        };
        RunOutput {
            run_id: run_id.to_string(),
            verdict,
            stage_outputs: None,
            trace,
        }
    }
}

/// Invoke one reasoner and guard its output, with the bounded repair
/// retry for hallucinated citations. Structural violations and
/// transport failures never retry.
async fn invoke_and_guard(
    reasoner: &dyn Reasoner,
    role: Role,
    question: &str,
    bundle: &EvidenceBundle,
    repair_retries: u32,
) -> Result<ValidatedStance, TaskFailure> {
    let raw = reasoner
        .invoke(role, question, bundle, None)
        .await
        .map_err(TaskFailure::Reasoner)?;

    match guard::validate(role, &raw, bundle.whitelist()) {
        Ok(validated) => Ok(validated),
        Err(GuardViolation::HallucinatedCitation { ids, .. }) if repair_retries > 0 => {
            warn!(role = %role, ids = ?ids, "repair retry after hallucinated citations");
            let note = guard::repair_note(&ids, bundle.whitelist());
            let raw = reasoner
                .invoke(role, question, bundle, Some(&note))
                .await
                .map_err(TaskFailure::Reasoner)?;
            // Second violation of any kind is unconditionally fatal.
            guard::validate(role, &raw, bundle.whitelist()).map_err(TaskFailure::Guard)
        }
        Err(violation) => Err(TaskFailure::Guard(violation)),
    }
}

fn new_run_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}
