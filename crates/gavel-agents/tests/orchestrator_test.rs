//! End-to-end pipeline tests with scripted reasoners and an in-memory
//! trace store. Each test drives a full run through bundle, fan-out,
//! guard, resolution, and trace.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use adjudication::{
    EvidenceBundle, Excerpt, ExcerptCategory, ExcerptSelector, JsonlTraceStore, MemoryTraceStore,
    Outcome, Role, RuleId, StanceDocument, TraceStore,
};
use gavel_agents::{GavelConfig, GavelOrchestrator, Reasoner, ReasonerError};

// ── test doubles ─────────────────────────────────────────────────────────────

/// One recorded invocation: the role and the repair note, if any.
#[derive(Debug, Clone)]
struct Call {
    role: Role,
    repair_note: Option<String>,
}

/// Reasoner that replays scripted responses per role, in order.
/// Running off the end of a script is a transport error, so an
/// unexpected extra invocation fails the run visibly instead of
/// hanging the test.
#[derive(Default)]
struct ScriptedReasoner {
    scripts: Mutex<HashMap<Role, VecDeque<Result<Value, ReasonerError>>>>,
    delays: HashMap<Role, Duration>,
    calls: Mutex<Vec<Call>>,
}

impl ScriptedReasoner {
    fn new() -> Self {
        Self::default()
    }

    fn respond(self, role: Role, payload: Value) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(Ok(payload));
        self
    }

    fn fail(self, role: Role, error: ReasonerError) -> Self {
        self.scripts
            .lock()
            .unwrap()
            .entry(role)
            .or_default()
            .push_back(Err(error));
        self
    }

    fn with_delay(mut self, role: Role, delay: Duration) -> Self {
        self.delays.insert(role, delay);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn calls_for(&self, role: Role) -> usize {
        self.calls().iter().filter(|c| c.role == role).count()
    }
}

#[async_trait]
impl Reasoner for ScriptedReasoner {
    async fn invoke(
        &self,
        role: Role,
        _question: &str,
        _bundle: &EvidenceBundle,
        repair_note: Option<&str>,
    ) -> Result<Value, ReasonerError> {
        self.calls.lock().unwrap().push(Call {
            role,
            repair_note: repair_note.map(str::to_string),
        });
        if let Some(delay) = self.delays.get(&role) {
            tokio::time::sleep(*delay).await;
        }
        self.scripts
            .lock()
            .unwrap()
            .get_mut(&role)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| {
                Err(ReasonerError::Transport {
                    role,
                    cause: "script exhausted".to_string(),
                })
            })
    }
}

struct FixedSelector(Vec<Excerpt>);

impl ExcerptSelector for FixedSelector {
    fn select(&self, _question: &str) -> Vec<Excerpt> {
        self.0.clone()
    }
}

// ── fixtures ─────────────────────────────────────────────────────────────────

fn excerpts() -> Vec<Excerpt> {
    vec![
        Excerpt::new(
            "POL-001",
            "policy_pack",
            ExcerptCategory::Policy,
            "Revenue may be recognized on delivery.",
        ),
        Excerpt::new(
            "CON-001",
            "contract_k",
            ExcerptCategory::Contractual,
            "Acceptance requires written sign-off.",
        ),
        Excerpt::new(
            "EVI-001",
            "invoice",
            ExcerptCategory::Evidentiary,
            "Invoice 42 issued and paid.",
        ),
    ]
}

fn test_config() -> GavelConfig {
    GavelConfig {
        max_repair_retries: 1,
        deterministic_replay: true,
        ..GavelConfig::default()
    }
}

fn orchestrator(
    reasoner: Arc<ScriptedReasoner>,
    store: Arc<MemoryTraceStore>,
    config: GavelConfig,
) -> GavelOrchestrator {
    GavelOrchestrator::new(reasoner, Arc::new(FixedSelector(excerpts())), store, config)
}

fn advocate_json(stance: &str, conditions: &[&str], citations: &[&str]) -> Value {
    json!({
        "stance": stance,
        "conditions": conditions,
        "rationale": "scripted",
        "citations": citations,
    })
}

fn adversary_json(stance: &str, hard_stops: Value, citations: &[&str]) -> Value {
    json!({
        "stance": stance,
        "risk_flags": [],
        "hard_stops": hard_stops,
        "rationale": "scripted",
        "citations": citations,
    })
}

fn auditor_json(stance: &str, missing: &[&str], citations: &[&str]) -> Value {
    json!({
        "stance": stance,
        "available_evidence": [],
        "missing_evidence": missing,
        "rationale": "scripted",
        "citations": citations,
    })
}

fn clean_scripts() -> ScriptedReasoner {
    ScriptedReasoner::new()
        .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
        .respond(
            Role::Adversary,
            adversary_json("affirm", json!([]), &["CON-001"]),
        )
        .respond(
            Role::Auditor,
            auditor_json("sufficient", &[], &["EVI-001"]),
        )
}

// ── resolution paths ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_unanimous_pass_approves_with_union_citations() {
    let reasoner = Arc::new(clean_scripts());
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(Arc::clone(&reasoner), Arc::clone(&store), test_config());

    let output = gavel.run("Can we recognize revenue for order 42?").await;

    assert_eq!(output.verdict.outcome, Outcome::Approve);
    assert_eq!(output.verdict.rule_applied, RuleId::DefaultApprove);
    assert_eq!(output.verdict.citations, vec!["CON-001", "EVI-001", "POL-001"]);
    assert!(output.verdict.confidence > 0.9);
    assert!(!output.trace.replayed);
    assert_eq!(
        output.trace.excerpt_ids,
        vec!["POL-001", "CON-001", "EVI-001"]
    );
    assert_eq!(output.trace.agent_output_hashes.len(), 3);

    // The run is persisted under its input fingerprint.
    let stored = store.get(&output.trace.input_hash).await.unwrap().unwrap();
    assert!(stored.is_consistent());
    assert_eq!(stored.verdict, output.verdict);
}

#[tokio::test]
async fn test_unwaived_hard_stop_rejects() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(
                Role::Adversary,
                adversary_json(
                    "deny",
                    json!([{
                        "claim": "termination window still open",
                        "waived": false,
                        "citation": null,
                    }]),
                    &["CON-001"],
                ),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, store, test_config());

    let output = gavel.run("Can we recognize revenue?").await;

    assert_eq!(output.verdict.outcome, Outcome::Reject);
    assert_eq!(output.verdict.rule_applied, RuleId::HardStop);
    assert_eq!(
        output.verdict.violations,
        vec!["termination window still open"]
    );
}

#[tokio::test]
async fn test_waived_hard_stop_does_not_block() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(
                Role::Adversary,
                adversary_json(
                    "affirm",
                    json!([{
                        "claim": "termination window",
                        "waived": true,
                        "citation": "CON-001",
                    }]),
                    &["CON-001"],
                ),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, store, test_config());

    let output = gavel.run("Can we recognize revenue?").await;
    assert_eq!(output.verdict.outcome, Outcome::Approve);
    assert_eq!(output.verdict.rule_applied, RuleId::DefaultApprove);
}

#[tokio::test]
async fn test_insufficiency_outranks_adversary_denial() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(
                Role::Adversary,
                adversary_json("deny", json!([]), &["CON-001"]),
            )
            .respond(
                Role::Auditor,
                auditor_json("missing", &["signed acceptance certificate"], &["EVI-001"]),
            ),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, store, test_config());

    let output = gavel.run("Can we recognize revenue?").await;

    assert_eq!(output.verdict.outcome, Outcome::InsufficientEvidence);
    assert_eq!(output.verdict.rule_applied, RuleId::Insufficiency);
    assert_eq!(
        output.verdict.conditions_to_satisfy,
        vec!["signed acceptance certificate"]
    );
}

#[tokio::test]
async fn test_conditional_approval_carries_conditions() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(
                Role::Advocate,
                advocate_json(
                    "affirm_with_conditions",
                    &["obtain written acceptance"],
                    &["POL-001", "CON-001"],
                ),
            )
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, store, test_config());

    let output = gavel.run("Can we recognize revenue?").await;

    assert_eq!(output.verdict.outcome, Outcome::ConditionalApprove);
    assert_eq!(output.verdict.rule_applied, RuleId::Conditional);
    assert_eq!(
        output.verdict.conditions_to_satisfy,
        vec!["obtain written acceptance"]
    );
}

// ── guard and repair ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_repair_retry_recovers_from_hallucinated_citation() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-999"]))
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(Arc::clone(&reasoner), store, test_config());

    let output = gavel.run("Can we recognize revenue?").await;

    assert_eq!(output.verdict.outcome, Outcome::Approve);
    assert_eq!(reasoner.calls_for(Role::Advocate), 2);

    let repair_call = reasoner
        .calls()
        .into_iter()
        .find(|c| c.role == Role::Advocate && c.repair_note.is_some())
        .expect("repair invocation recorded");
    let note = repair_call.repair_note.unwrap();
    assert!(note.contains("INVALID_CITATIONS"));
    assert!(note.contains("POL-999"));
    assert!(note.contains("POL-001"));
}

#[tokio::test]
async fn test_second_hallucination_fails_closed() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-999"]))
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-888"]))
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(Arc::clone(&reasoner), Arc::clone(&store), test_config());

    let output = gavel.run("Can we recognize revenue?").await;

    assert_eq!(output.verdict.outcome, Outcome::FailClosed);
    assert_eq!(output.verdict.rule_applied, RuleId::FailClosedOnError);
    assert!(output.stage_outputs.is_none());
    assert!(output.verdict.conditions_to_satisfy[0].starts_with("HALLUCINATED_CITATION:"));
    assert_eq!(reasoner.calls_for(Role::Advocate), 2);

    // Failed runs never enter the replay cache.
    assert!(store.recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_structural_violation_is_fatal_without_retry() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, json!({ "stance": "MAYBE", "rationale": "?" }))
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(Arc::clone(&reasoner), store, test_config());

    let output = gavel.run("Can we recognize revenue?").await;

    assert_eq!(output.verdict.outcome, Outcome::FailClosed);
    assert!(output.verdict.conditions_to_satisfy[0].starts_with("STRUCTURAL_VIOLATION:"));
    assert_eq!(reasoner.calls_for(Role::Advocate), 1);
}

#[tokio::test]
async fn test_transport_error_fails_closed() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .fail(
                Role::Adversary,
                ReasonerError::Transport {
                    role: Role::Adversary,
                    cause: "connection refused".to_string(),
                },
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, Arc::clone(&store), test_config());

    let output = gavel.run("Can we recognize revenue?").await;

    assert_eq!(output.verdict.outcome, Outcome::FailClosed);
    assert!(output.verdict.conditions_to_satisfy[0].starts_with("TRANSPORT_ERROR:"));
    assert!(store.recent(10).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_empty_bundle_fails_closed() {
    let reasoner = Arc::new(ScriptedReasoner::new());
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = GavelOrchestrator::new(
        Arc::clone(&reasoner) as Arc<dyn Reasoner>,
        Arc::new(FixedSelector(Vec::new())),
        store,
        test_config(),
    );

    let output = gavel.run("Can we recognize revenue?").await;

    assert_eq!(output.verdict.outcome, Outcome::FailClosed);
    assert!(output.verdict.conditions_to_satisfy[0].starts_with("EMPTY_BUNDLE:"));
    // No reasoner was ever invoked.
    assert!(reasoner.calls().is_empty());
}

// ── replay ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_replay_serves_cached_verdict_without_reinvoking() {
    // Scripts cover exactly one round; a second invocation would hit
    // "script exhausted" and fail the run, so a passing replay proves
    // no reasoner ran twice.
    let reasoner = Arc::new(clean_scripts());
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(Arc::clone(&reasoner), store, test_config());

    let first = gavel.run("Can we recognize revenue?").await;
    let second = gavel.run("Can we recognize revenue?").await;

    assert!(!first.trace.replayed);
    assert!(second.trace.replayed);
    assert_eq!(second.verdict, first.verdict);
    assert_eq!(second.run_id, first.run_id);
    assert_eq!(second.trace.input_hash, first.trace.input_hash);
    assert_eq!(second.trace.final_output_hash, first.trace.final_output_hash);
    assert_eq!(reasoner.calls().len(), 3);
}

#[tokio::test]
async fn test_different_question_misses_the_cache() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"]))
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, store, test_config());

    let first = gavel.run("Can we recognize revenue for order 1?").await;
    let second = gavel.run("Can we recognize revenue for order 2?").await;

    assert!(!second.trace.replayed);
    assert_ne!(second.trace.input_hash, first.trace.input_hash);
}

#[tokio::test]
async fn test_replay_disabled_forces_fresh_run() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"]))
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let config = GavelConfig {
        deterministic_replay: false,
        ..test_config()
    };
    let gavel = orchestrator(Arc::clone(&reasoner), store, config);

    let first = gavel.run("Can we recognize revenue?").await;
    let second = gavel.run("Can we recognize revenue?").await;

    assert!(!second.trace.replayed);
    assert_eq!(second.trace.input_hash, first.trace.input_hash);
    assert_eq!(second.trace.final_output_hash, first.trace.final_output_hash);
    assert_eq!(reasoner.calls().len(), 6);
}

#[tokio::test]
async fn test_replay_survives_store_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("traces.jsonl");

    let reasoner = Arc::new(clean_scripts());
    let store = Arc::new(JsonlTraceStore::open(&path).unwrap());
    let gavel = GavelOrchestrator::new(
        Arc::clone(&reasoner) as Arc<dyn Reasoner>,
        Arc::new(FixedSelector(excerpts())),
        store,
        test_config(),
    );
    let first = gavel.run("Can we recognize revenue?").await;
    assert!(!first.trace.replayed);
    drop(gavel);

    // Fresh orchestrator over a reopened store: still a cache hit.
    let reopened = Arc::new(JsonlTraceStore::open(&path).unwrap());
    let gavel = GavelOrchestrator::new(
        Arc::new(ScriptedReasoner::new()),
        Arc::new(FixedSelector(excerpts())),
        reopened,
        test_config(),
    );
    let second = gavel.run("Can we recognize revenue?").await;

    assert!(second.trace.replayed);
    assert_eq!(second.verdict, first.verdict);
    assert_eq!(second.trace.final_output_hash, first.trace.final_output_hash);
}

#[tokio::test]
async fn test_failed_run_is_not_cached_and_next_run_is_fresh() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            // First round: advocate hallucinates twice, run fails closed.
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-999"]))
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-888"]))
            // Second round: everyone behaves.
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(
                Role::Adversary,
                adversary_json("affirm", json!([]), &["CON-001"]),
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"]))
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"])),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, store, test_config());

    let first = gavel.run("Can we recognize revenue?").await;
    assert_eq!(first.verdict.outcome, Outcome::FailClosed);

    let second = gavel.run("Can we recognize revenue?").await;
    assert_eq!(second.verdict.outcome, Outcome::Approve);
    assert!(!second.trace.replayed);
}

// ── ordering and determinism ─────────────────────────────────────────────────

#[tokio::test]
async fn test_role_order_is_independent_of_completion_order() {
    // Advocate is the slowest, auditor the fastest; outputs must still
    // land in fixed role slots.
    let reasoner = Arc::new(
        clean_scripts()
            .with_delay(Role::Advocate, Duration::from_millis(40))
            .with_delay(Role::Adversary, Duration::from_millis(5))
            .with_delay(Role::Auditor, Duration::from_millis(1)),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, store, test_config());

    let output = gavel.run("Can we recognize revenue?").await;
    let outputs = output.stage_outputs.expect("successful run");

    assert!(matches!(outputs.advocate, StanceDocument::Advocate(_)));
    assert!(matches!(outputs.adversary, StanceDocument::Adversary(_)));
    assert!(matches!(outputs.auditor, StanceDocument::Auditor(_)));
    assert_eq!(output.verdict.outcome, Outcome::Approve);
}

#[tokio::test]
async fn test_sibling_failure_cancels_slow_reasoner() {
    let reasoner = Arc::new(
        ScriptedReasoner::new()
            .respond(Role::Advocate, advocate_json("affirm", &[], &["POL-001"]))
            .fail(
                Role::Adversary,
                ReasonerError::Transport {
                    role: Role::Adversary,
                    cause: "connection refused".to_string(),
                },
            )
            .respond(Role::Auditor, auditor_json("sufficient", &[], &["EVI-001"]))
            .with_delay(Role::Auditor, Duration::from_secs(30)),
    );
    let store = Arc::new(MemoryTraceStore::new());
    let gavel = orchestrator(reasoner, store, test_config());

    // Must return promptly: the auditor's 30s sleep is cancelled when
    // the adversary's transport failure lands.
    let output = tokio::time::timeout(Duration::from_secs(5), gavel.run("q"))
        .await
        .expect("run returns before the slow reasoner would finish");

    assert_eq!(output.verdict.outcome, Outcome::FailClosed);
    assert!(output.verdict.conditions_to_satisfy[0].starts_with("TRANSPORT_ERROR:"));
}
