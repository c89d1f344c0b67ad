//! HTTP server for the Tern RAG engine (axum + JSON).
//!
//! Routes: `POST /rag/{standard|reranking|verified}`,
//! `POST /rag/retrieve/{pipeline}`, `POST /agent/step`, `GET /health`.
//!
//! **Public API**: [`run_serve`], [`run_serve_on_listener`], [`router`],
//! [`AppState`].

mod agent;
mod app;
mod rag;
pub mod types;

pub use app::{router, AppState};

use tokio::net::TcpListener;
use tracing::info;

const DEFAULT_ADDR: &str = "127.0.0.1:8090";

/// Runs the server on an existing listener. Used by tests (bind to
/// 127.0.0.1:0, then pass the listener).
pub async fn run_serve_on_listener(
    listener: TcpListener,
    state: AppState,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let addr = listener.local_addr()?;
    info!("rag engine listening on http://{}", addr);
    axum::serve(listener, router(state)).await?;
    Ok(())
}

/// Binds and serves on `addr` (default `127.0.0.1:8090`), building the engine
/// stack from the environment.
pub async fn run_serve(addr: Option<&str>) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let state = AppState::from_env()?;
    let listener = TcpListener::bind(addr.unwrap_or(DEFAULT_ADDR)).await?;
    run_serve_on_listener(listener, state).await
}
