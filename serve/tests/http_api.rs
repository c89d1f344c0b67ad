//! Router tests over mock engines: one request per pipeline, no network.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use serve::{router, AppState};
use tern::provider::{ChatOutcome, MockToolChat};
use tern::{
    AgentStep, Document, EngineSettings, InMemoryDocumentStore, MockEmbedder, MockGenerator,
    MockReranker, PromptBuilder, RerankingEngine, Retriever, SimpleEngine, SkepticExamples,
    Strictness, VerifiedEngine,
};

const VERIFIED_JSON: &str =
    r#"{"is_verified": true, "reasoning": "ok", "hallucinations": [], "missing_evidence": []}"#;

/// Builds an app over the in-memory store with scripted generator responses,
/// scripted rerank scores, and a scripted agent chat.
fn mock_state(
    responses: Vec<&str>,
    scores: Vec<Vec<f32>>,
    chat_outcomes: Vec<ChatOutcome>,
) -> AppState {
    let store = Arc::new(InMemoryDocumentStore::new());
    store.insert_global(Document::new("The sky is blue.", "sky.txt"), vec![1.0, 0.5]);

    let generator = Arc::new(MockGenerator::new(responses));
    let retriever = Arc::new(Retriever::new(
        Arc::new(MockEmbedder::new(2)),
        store.clone(),
        Some(Arc::new(MockReranker::new(scores))),
        EngineSettings::default(),
    ));
    let prompts = Arc::new(PromptBuilder::new(Strictness::Strict, SkepticExamples::default()));

    AppState {
        simple: Arc::new(SimpleEngine::new(
            retriever.clone(),
            generator.clone(),
            prompts.clone(),
        )),
        reranking: Arc::new(RerankingEngine::new(
            retriever.clone(),
            generator.clone(),
            prompts.clone(),
        )),
        verified: Arc::new(VerifiedEngine::new(
            retriever.clone(),
            generator,
            prompts,
            store,
        )),
        retriever,
        agent: Arc::new(AgentStep::new(Arc::new(MockToolChat::new(chat_outcomes)))),
    }
}

async fn post_json(state: AppState, uri: &str, body: Value) -> (StatusCode, Value) {
    let response = router(state)
        .oneshot(
            Request::post(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
    (status, value)
}

/// **Scenario**: Health returns ok.
#[tokio::test]
async fn health() {
    let state = mock_state(vec![], vec![], vec![]);
    let response = router(state)
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let value: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(value["status"], "ok");
}

/// **Scenario**: A verified query over HTTP returns the answer and sources.
#[tokio::test]
async fn verified_pipeline_roundtrip() {
    let state = mock_state(
        vec!["The sky is blue [Source 0].", VERIFIED_JSON],
        vec![vec![0.9]],
        vec![],
    );
    let (status, body) = post_json(
        state,
        "/rag/verified",
        json!({"query": "What color is the sky?", "session_id": "s1"}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "The sky is blue [Source 0].");
    assert_eq!(body["sources"][0]["source"], "sky.txt");
}

/// **Scenario**: The standard pipeline answers without reranking.
#[tokio::test]
async fn standard_pipeline_roundtrip() {
    let state = mock_state(vec!["An answer."], vec![], vec![]);
    let (status, body) = post_json(state, "/rag/standard", json!({"query": "sky?"})).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["answer"], "An answer.");
}

/// **Scenario**: An unknown pipeline is a 404 with a JSON error body.
#[tokio::test]
async fn unknown_pipeline_404() {
    let state = mock_state(vec![], vec![], vec![]);
    let (status, body) = post_json(state, "/rag/raptor", json!({"query": "q"})).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("unknown pipeline"));
}

/// **Scenario**: Retrieve-only returns chunks, the evidence block, and the
/// relevance flag without calling the generator.
#[tokio::test]
async fn retrieve_without_generation() {
    let state = mock_state(vec![], vec![vec![0.9]], vec![]);
    let (status, body) = post_json(state, "/rag/retrieve/reranking", json!({"query": "sky?"})).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["chunks"][0]["source"], "sky.txt");
    let score = body["chunks"][0]["rerank_score"].as_f64().unwrap();
    assert!((score - 0.9).abs() < 1e-6, "score was {}", score);
    assert!(body["context_text"].as_str().unwrap().contains("[Source 0]"));
    assert_eq!(body["has_relevant_docs"], true);
}

/// **Scenario**: The agent step endpoint returns the normalized instruction.
#[tokio::test]
async fn agent_step_roundtrip() {
    let state = mock_state(
        vec![],
        vec![],
        vec![ChatOutcome {
            content: "src/main.rs is the entrypoint".into(),
            tool_calls: vec![],
            raw: None,
        }],
    );
    let (status, body) = post_json(
        state,
        "/agent/step",
        json!({"query": "where is the entrypoint?", "history": []}),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["type"], "answer");
    assert_eq!(body["content"], "src/main.rs is the entrypoint");
}

/// **Scenario**: A malformed body is a client error, not a crash.
#[tokio::test]
async fn malformed_body_is_client_error() {
    let state = mock_state(vec![], vec![], vec![]);
    let response = router(state)
        .oneshot(
            Request::post("/rag/verified")
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
