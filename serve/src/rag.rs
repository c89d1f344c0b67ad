//! Handlers for `POST /rag/{pipeline}` and `POST /rag/retrieve/{pipeline}`.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use tracing::info;

use super::app::{error_response, AppState};
use super::types::{ErrorResponse, RagRequest, RagResponse, RetrieveResponse};

fn unknown_pipeline(pipeline: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse {
            error: format!("unknown pipeline: {}", pipeline),
        }),
    )
        .into_response()
}

/// Runs one query through the named pipeline.
pub(crate) async fn rag_query(
    Path(pipeline): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RagRequest>,
) -> Response {
    info!(pipeline = %pipeline, query_len = request.query.len(), "rag query");
    let retrieve = request.to_retrieve_request();
    let overrides = request.overrides();
    let outcome = match pipeline.as_str() {
        "standard" => state.simple.run(&retrieve, &overrides).await,
        "reranking" => state.reranking.run(&retrieve, &overrides).await,
        "verified" => state.verified.run(&retrieve, &overrides).await,
        other => return unknown_pipeline(other),
    };
    match outcome {
        Ok(outcome) => Json(RagResponse::from(outcome)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}

/// Retrieval without generation: ranked chunks plus the evidence block.
pub(crate) async fn rag_retrieve(
    Path(pipeline): Path<String>,
    State(state): State<AppState>,
    Json(request): Json<RagRequest>,
) -> Response {
    info!(pipeline = %pipeline, query_len = request.query.len(), "rag retrieve");
    let retrieve = request.to_retrieve_request();
    let retrieval = match pipeline.as_str() {
        "standard" => state.retriever.retrieve_simple(&retrieve).await,
        "reranking" | "verified" => state.retriever.retrieve_reranked(&retrieve).await,
        other => return unknown_pipeline(other),
    };
    match retrieval {
        Ok(retrieval) => Json(RetrieveResponse::from(retrieval)).into_response(),
        Err(e) => error_response(e).into_response(),
    }
}
