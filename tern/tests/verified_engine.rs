//! End-to-end verification loop scenarios over mock collaborators.
//!
//! The engine runs against the in-memory document store, the deterministic
//! mock embedder, a scripted reranker, and a scripted generator, so every
//! scenario asserts exact call counts and terminal states.

use std::sync::{Arc, Mutex};

use tern::verify::{ProgressCallback, ProgressEvent, ProgressEventType, VerifiedEngine, WARNING_SUFFIX};
use tern::{
    Document, EngineSettings, InMemoryDocumentStore, MockEmbedder, MockGenerator, MockReranker,
    PromptBuilder, QueryStatus, RetrieveRequest, Retriever, SkepticExamples, Strictness,
    TemperatureOverrides, LOW_RELEVANCE_MESSAGE,
};

const VERIFIED_JSON: &str =
    r#"{"is_verified": true, "reasoning": "supported by Source 0", "hallucinations": [], "missing_evidence": []}"#;
const FAILED_JSON: &str =
    r#"{"is_verified": false, "reasoning": "the color is unsupported", "hallucinations": ["green"], "missing_evidence": ["a source stating the color"]}"#;

struct Fixture {
    engine: VerifiedEngine,
    generator: Arc<MockGenerator>,
    store: Arc<InMemoryDocumentStore>,
}

/// Builds a verified engine over one seeded document ("The sky is blue.")
/// with scripted generator responses and reranker scores.
fn fixture(responses: Vec<&str>, scores: Vec<Vec<f32>>, settings: EngineSettings) -> Fixture {
    let store = Arc::new(InMemoryDocumentStore::new());
    store.insert_global(Document::new("The sky is blue.", "sky.txt"), vec![1.0, 0.5, 0.25]);

    let generator = Arc::new(MockGenerator::new(responses));
    let retriever = Arc::new(Retriever::new(
        Arc::new(MockEmbedder::new(3)),
        store.clone(),
        Some(Arc::new(MockReranker::new(scores))),
        settings,
    ));
    let prompts = Arc::new(PromptBuilder::new(Strictness::Strict, SkepticExamples::default()));
    let engine = VerifiedEngine::new(retriever, generator.clone(), prompts, store.clone());
    Fixture {
        engine,
        generator,
        store,
    }
}

fn request(query: &str) -> RetrieveRequest {
    RetrieveRequest::new(query).with_session("s-test")
}

/// **Scenario**: Immediate verification — the skeptic passes the draft on the
/// first attempt; one attempt, zero refiner calls, answer equals the draft.
#[tokio::test]
async fn immediate_verification() {
    let f = fixture(
        vec!["The sky is blue [Source 0].", VERIFIED_JSON],
        vec![vec![0.9]],
        EngineSettings::default(),
    );

    let outcome = f
        .engine
        .run(&request("What color is the sky?"), &TemperatureOverrides::default())
        .await
        .unwrap();

    assert_eq!(outcome.answer, "The sky is blue [Source 0].");
    assert_eq!(outcome.status, QueryStatus::Verified);
    assert_eq!(outcome.sources.len(), 1);
    assert_eq!(outcome.sources[0].source, "sky.txt");
    // draft + one skeptic call, no refiner.
    assert_eq!(f.generator.call_count(), 2);

    let logs = f.store.debate_logs();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].attempt_count, 1);
    assert!(logs[0].is_verified);
    assert!(!logs[0].was_refined);
    assert_eq!(logs[0].session_id, "s-test");
    assert!(!logs[0].trace_id.is_empty());
}

/// **Scenario**: One-shot refinement — skeptic rejects the draft, the refiner
/// fixes it, the second audit passes. Two skeptic calls, one refiner call.
#[tokio::test]
async fn one_shot_refinement() {
    let f = fixture(
        vec![
            "The sky is green.",
            FAILED_JSON,
            "The sky is blue.",
            VERIFIED_JSON,
        ],
        vec![vec![0.9]],
        EngineSettings::default(),
    );

    let outcome = f
        .engine
        .run(&request("What color is the sky?"), &TemperatureOverrides::default())
        .await
        .unwrap();

    assert_eq!(outcome.answer, "The sky is blue.");
    assert_eq!(outcome.status, QueryStatus::Verified);
    // draft + skeptic + refiner + skeptic = 4 calls.
    assert_eq!(f.generator.call_count(), 4);

    let logs = f.store.debate_logs();
    assert_eq!(logs[0].attempt_count, 2);
    assert!(logs[0].was_refined);
    assert_eq!(logs[0].draft_answer, "The sky is green.");
    assert_eq!(logs[0].final_answer, "The sky is blue.");
}

/// **Scenario**: Exhaustion — the skeptic never passes; with max_attempts 3
/// the loop stops after three audits and the answer carries the warning.
#[tokio::test]
async fn exhaustion_after_max_attempts() {
    let f = fixture(
        vec![
            "The sky is green.",
            FAILED_JSON,
            "The sky is purple.",
            FAILED_JSON,
            "The sky is orange.",
            FAILED_JSON,
        ],
        vec![vec![0.9]],
        EngineSettings::default(),
    );

    let outcome = f
        .engine
        .run(&request("What color is the sky?"), &TemperatureOverrides::default())
        .await
        .unwrap();

    assert_eq!(outcome.answer, format!("The sky is orange.{}", WARNING_SUFFIX));
    assert_eq!(outcome.status, QueryStatus::Unverified);
    // draft + 3 skeptic + 2 refiner = 6 calls.
    assert_eq!(f.generator.call_count(), 6);

    let logs = f.store.debate_logs();
    assert_eq!(logs[0].attempt_count, 3);
    assert!(!logs[0].is_verified);
    assert_eq!(logs[0].hallucinations_found, vec!["green".to_string()]);
}

/// **Scenario**: Stall exit — the refiner keeps returning the same answer;
/// two consecutive stalls terminate the loop before the attempt budget.
#[tokio::test]
async fn stall_exit_after_two_repeats() {
    let same = "The sky has a color that no source names.";
    let f = fixture(
        vec![same, FAILED_JSON, same, FAILED_JSON, same],
        vec![vec![0.9]],
        EngineSettings::default(),
    );

    let outcome = f
        .engine
        .run(&request("What color is the sky?"), &TemperatureOverrides::default())
        .await
        .unwrap();

    assert!(outcome.answer.ends_with(WARNING_SUFFIX));
    assert_eq!(outcome.status, QueryStatus::Unverified);

    let logs = f.store.debate_logs();
    assert!(logs[0].attempt_count <= 3);
    assert_eq!(logs[0].attempt_count, 2, "two audits before the stall exit");
    // draft + 2 skeptic + 2 refiner = 5 calls.
    assert_eq!(f.generator.call_count(), 5);
}

/// **Scenario**: Relevance-gated refusal — top rerank score below the gate
/// with no history returns the canonical message and never calls the LLM.
#[tokio::test]
async fn relevance_gate_refuses_without_generation() {
    let f = fixture(vec!["never used"], vec![vec![0.2]], EngineSettings::default());

    let outcome = f
        .engine
        .run(&request("Unrelated question"), &TemperatureOverrides::default())
        .await
        .unwrap();

    assert_eq!(outcome.answer, LOW_RELEVANCE_MESSAGE);
    assert_eq!(outcome.status, QueryStatus::Gated);
    assert!(outcome.sources.is_empty());
    assert_eq!(f.generator.call_count(), 0, "no generation behind the gate");
    assert!(f.store.debate_logs().is_empty(), "gated runs persist nothing");
}

/// **Scenario**: max_attempts=1 — the skeptic is called exactly once and the
/// refiner never runs.
#[tokio::test]
async fn single_attempt_budget() {
    let settings = EngineSettings {
        max_attempts: 1,
        ..EngineSettings::default()
    };
    let f = fixture(vec!["The sky is green.", FAILED_JSON], vec![vec![0.9]], settings);

    let outcome = f
        .engine
        .run(&request("What color is the sky?"), &TemperatureOverrides::default())
        .await
        .unwrap();

    assert!(outcome.answer.ends_with(WARNING_SUFFIX));
    // draft + single skeptic call.
    assert_eq!(f.generator.call_count(), 2);
    assert_eq!(f.store.debate_logs()[0].attempt_count, 1);
}

/// **Scenario**: An empty skeptic response fails closed (audit rejected) and
/// the loop proceeds to refinement instead of passing the draft.
#[tokio::test]
async fn empty_skeptic_response_fails_closed() {
    let f = fixture(
        vec!["The sky is green.", "", "The sky is blue.", VERIFIED_JSON],
        vec![vec![0.9]],
        EngineSettings::default(),
    );

    let outcome = f
        .engine
        .run(&request("What color is the sky?"), &TemperatureOverrides::default())
        .await
        .unwrap();

    assert_eq!(outcome.answer, "The sky is blue.");
    assert_eq!(outcome.status, QueryStatus::Verified);
    assert_eq!(f.store.debate_logs()[0].attempt_count, 2);
}

/// **Scenario**: Role temperatures — the skeptic call carries the configured
/// skeptic temperature and model override; the optimist carries its own.
#[tokio::test]
async fn role_temperatures_and_skeptic_model() {
    let settings = EngineSettings {
        optimist_temperature: 0.7,
        skeptic_temperature: 0.1,
        refiner_temperature: 0.4,
        skeptic_model: Some("auditor-model".into()),
        ..EngineSettings::default()
    };
    let f = fixture(
        vec![
            "The sky is green.",
            FAILED_JSON,
            "The sky is blue.",
            VERIFIED_JSON,
        ],
        vec![vec![0.9]],
        settings,
    );

    f.engine
        .run(&request("What color is the sky?"), &TemperatureOverrides::default())
        .await
        .unwrap();

    let calls = f.generator.calls();
    assert_eq!(calls[0].temperature, Some(0.7), "optimist temperature");
    assert_eq!(calls[1].temperature, Some(0.1), "skeptic temperature");
    assert_eq!(calls[1].model.as_deref(), Some("auditor-model"));
    assert_eq!(calls[2].temperature, Some(0.4), "refiner temperature");
    assert_eq!(calls[2].model, None, "refiner uses the default model");
}

/// **Scenario**: Request-level temperature overrides beat instance settings.
#[tokio::test]
async fn request_overrides_win() {
    let f = fixture(
        vec!["The sky is blue [Source 0].", VERIFIED_JSON],
        vec![vec![0.9]],
        EngineSettings::default(),
    );
    let overrides = TemperatureOverrides {
        optimist: Some(1.5),
        skeptic: None,
        refiner: None,
    };

    f.engine
        .run(&request("What color is the sky?"), &overrides)
        .await
        .unwrap();

    let calls = f.generator.calls();
    assert_eq!(calls[0].temperature, Some(1.5));
    assert_eq!(calls[1].temperature, Some(0.6), "unoverridden role keeps its default");
}

fn collecting_callback(events: Arc<Mutex<Vec<ProgressEvent>>>) -> ProgressCallback {
    Arc::new(move |event| {
        let events = events.clone();
        Box::pin(async move {
            events.lock().map_err(|_| "poisoned".to_string())?.push(event);
            Ok(())
        })
    })
}

/// **Scenario**: Progress events are emitted in state-machine order with
/// retrieval and audit details at verbosity 2.
#[tokio::test]
async fn progress_events_in_order() {
    let f = fixture(
        vec![
            "The sky is green [Source 0].",
            FAILED_JSON,
            "The sky is blue.",
            VERIFIED_JSON,
        ],
        vec![vec![0.9]],
        EngineSettings::default(),
    );
    let events: Arc<Mutex<Vec<ProgressEvent>>> = Arc::new(Mutex::new(Vec::new()));

    f.engine
        .run_with_progress(
            &request("What color is the sky?"),
            &TemperatureOverrides::default(),
            Some(collecting_callback(events.clone())),
            2,
        )
        .await
        .unwrap();

    let events = events.lock().unwrap();
    let kinds: Vec<ProgressEventType> = events.iter().map(|e| e.event_type).collect();
    assert_eq!(
        kinds,
        vec![
            ProgressEventType::RetrievalStart,
            ProgressEventType::RetrievalComplete,
            ProgressEventType::DraftStart,
            ProgressEventType::DraftComplete,
            ProgressEventType::SkepticAuditStart,
            ProgressEventType::SkepticAuditComplete,
            ProgressEventType::RefinementStart,
            ProgressEventType::RefinementComplete,
            ProgressEventType::SkepticAuditStart,
            ProgressEventType::SkepticAuditComplete,
            ProgressEventType::VerificationComplete,
        ]
    );

    let retrieval = events
        .iter()
        .find(|e| e.event_type == ProgressEventType::RetrievalComplete)
        .unwrap();
    let details = retrieval.retrieval_details.as_ref().unwrap();
    assert_eq!(details.document_count, 1);
    assert_eq!(details.sources, vec!["sky.txt".to_string()]);
    assert!(details.has_relevant_docs);

    let audit = events
        .iter()
        .find(|e| e.event_type == ProgressEventType::SkepticAuditComplete)
        .unwrap();
    let details = audit.audit_details.as_ref().unwrap();
    assert!(!details.is_verified);
    assert_eq!(details.hallucinations, vec!["green".to_string()]);
    assert_eq!(details.sources_cited, vec![0], "draft cites Source 0");

    assert!(events.iter().all(|e| e.trace_id.is_some()));
    let max_attempt = events.iter().map(|e| e.attempt).max().unwrap();
    assert!(max_attempt >= 1 && max_attempt <= 3);
}

/// **Scenario**: A callback that always fails never aborts the run.
#[tokio::test]
async fn failing_callback_does_not_abort() {
    let f = fixture(
        vec!["The sky is blue [Source 0].", VERIFIED_JSON],
        vec![vec![0.9]],
        EngineSettings::default(),
    );
    let callback: ProgressCallback =
        Arc::new(|_| Box::pin(async { Err("sink closed".to_string()) }));

    let outcome = f
        .engine
        .run_with_progress(
            &request("What color is the sky?"),
            &TemperatureOverrides::default(),
            Some(callback),
            1,
        )
        .await
        .unwrap();

    assert_eq!(outcome.status, QueryStatus::Verified);
}
