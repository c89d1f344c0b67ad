//! Embedding client: query text to vector via the external embedding server.
//!
//! Queries are prefixed with the model family's asymmetric-search marker so
//! query vectors land in the query half of the embedding space (documents are
//! ingested with the matching document prefix elsewhere).

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Fixed query-side prefix for asymmetric search.
pub const QUERY_PREFIX: &str = "search_query: ";

/// Produces one vector per query text. Implementations must be `Send + Sync`
/// because retrieval tasks share one client.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Embeds the query text. Empty input yields an empty vector without a
    /// network call.
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError>;
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embeddings: Vec<Vec<f32>>,
}

/// HTTP client for the external embedding server.
pub struct HttpEmbeddingClient {
    url: String,
    model: String,
    /// Model's fixed vector dimension, when known; responses of any other
    /// size are rejected as schema errors.
    dimension: Option<usize>,
    http: reqwest::Client,
}

impl HttpEmbeddingClient {
    pub fn new(url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            model: model.into(),
            dimension: None,
            http: crate::http::shared_client(),
        }
    }

    /// Pins the expected vector dimension for this model family.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        self.dimension = Some(dimension);
        self
    }
}

#[async_trait]
impl Embedder for HttpEmbeddingClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        if text.is_empty() {
            warn!("empty text passed to embed");
            return Ok(Vec::new());
        }
        let payload = json!({
            "model": self.model,
            "input": [format!("{}{}", QUERY_PREFIX, text)],
        });
        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("embedding service: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::upstream_status(status.as_u16(), detail));
        }
        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| EngineError::UpstreamSchema(format!("embedding response: {}", e)))?;

        // Exactly one vector for one input; anything else is a contract break.
        if body.embeddings.len() != 1 || body.embeddings[0].is_empty() {
            return Err(EngineError::UpstreamSchema(format!(
                "expected one non-empty vector, got batch of {}",
                body.embeddings.len()
            )));
        }
        let vector = body.embeddings.into_iter().next().unwrap_or_default();
        if let Some(expected) = self.dimension {
            if vector.len() != expected {
                return Err(EngineError::UpstreamSchema(format!(
                    "embedding dimension {} does not match model dimension {}",
                    vector.len(),
                    expected
                )));
            }
        }
        debug!(dims = vector.len(), "embedding received");
        Ok(vector)
    }
}

/// Deterministic embedder for tests: hashes bytes into a fixed-dimension
/// vector so equal texts embed equally and similar texts land nearby.
pub struct MockEmbedder {
    dimension: usize,
}

impl MockEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self { dimension }
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, EngineError> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let mut v = vec![0f32; self.dimension];
        for (i, b) in text.bytes().enumerate() {
            v[i % self.dimension] += b as f32 / 256.0;
        }
        Ok(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Empty input returns an empty vector without erroring.
    #[tokio::test]
    async fn empty_input_empty_vector() {
        let client = HttpEmbeddingClient::new("http://127.0.0.1:1/embed", "m");
        assert_eq!(client.embed("").await.unwrap(), Vec::<f32>::new());

        let mock = MockEmbedder::new(8);
        assert_eq!(mock.embed("").await.unwrap(), Vec::<f32>::new());
    }

    /// **Scenario**: The mock embedder is deterministic and fixed-dimension.
    #[tokio::test]
    async fn mock_embedder_deterministic() {
        let mock = MockEmbedder::new(16);
        let a = mock.embed("hello").await.unwrap();
        let b = mock.embed("hello").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    /// **Scenario**: An unreachable embedding server yields a Transport error.
    #[tokio::test]
    async fn unreachable_server_is_transport_error() {
        let client = HttpEmbeddingClient::new("http://127.0.0.1:1/embed", "m");
        match client.embed("question").await {
            Err(EngineError::Transport(_)) => {}
            other => panic!("expected Transport error, got {:?}", other.map(|v| v.len())),
        }
    }
}
