//! Handler for `POST /agent/step`.

use axum::extract::State;
use axum::Json;
use tracing::info;

use tern::{AgentStepRequest, AgentStepResponse};

use super::app::AppState;

/// One stateless agent turn: history in, answer or tool instruction out.
/// Never fails with a 5xx; LLM trouble comes back as a terminal answer.
pub(crate) async fn agent_step(
    State(state): State<AppState>,
    Json(request): Json<AgentStepRequest>,
) -> Json<AgentStepResponse> {
    info!(history_len = request.history.len(), "agent step");
    Json(state.agent.run_step(&request).await)
}
