//! HTTP client for the external vector store.
//!
//! Collections: `Document` for retrieval (with `by_ref_count` / `by_ref`
//! filter support) and `VerificationLog` for debate transcripts. The store
//! exposes a JSON search API; this client never interprets vectors, it only
//! ships filters and maps the returned objects into [`Document`]s.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::document::{DocMetadata, Document};
use crate::error::EngineError;

use super::{DebateLogRecord, DocumentStore, ScopeFilter};

const DOCUMENTS_COLLECTION: &str = "Document";
const VERIFICATION_LOG_COLLECTION: &str = "VerificationLog";

#[derive(Deserialize)]
struct SearchHit {
    content: String,
    source: String,
    #[serde(default)]
    parent_source: Option<String>,
    #[serde(default)]
    distance: Option<f32>,
}

#[derive(Deserialize)]
struct SearchResponse {
    objects: Vec<SearchHit>,
}

/// Vector store client over its JSON HTTP API.
pub struct VectorHttpStore {
    base_url: String,
    http: reqwest::Client,
}

impl VectorHttpStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: crate::http::shared_client(),
        }
    }

    fn collection_url(&self, collection: &str, op: &str) -> String {
        format!("{}/collections/{}/{}", self.base_url, collection, op)
    }

    async fn post(
        &self,
        url: &str,
        payload: &serde_json::Value,
    ) -> Result<reqwest::Response, EngineError> {
        let response = self
            .http
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| EngineError::Transport(format!("vector store: {}", e)))?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::upstream_status(status.as_u16(), detail));
        }
        Ok(response)
    }

    fn hits_to_documents(hits: Vec<SearchHit>, keep_distance: bool) -> Vec<Document> {
        hits.into_iter()
            .map(|h| Document {
                content: h.content,
                source: h.source,
                parent_source: h.parent_source,
                metadata: DocMetadata {
                    distance: if keep_distance { h.distance } else { None },
                    ..DocMetadata::default()
                },
            })
            .collect()
    }
}

#[async_trait]
impl DocumentStore for VectorHttpStore {
    async fn search_near_vector(
        &self,
        vector: &[f32],
        limit: usize,
        filter: &ScopeFilter,
        return_distance: bool,
    ) -> Result<Vec<Document>, EngineError> {
        if vector.is_empty() {
            return Ok(Vec::new());
        }
        let payload = json!({
            "near_vector": vector,
            "limit": limit,
            "filters": filter.to_filter_json(),
            "return_distance": return_distance,
            "return_properties": ["content", "source", "parent_source"],
        });
        let url = self.collection_url(DOCUMENTS_COLLECTION, "search");
        let body: SearchResponse = self
            .post(&url, &payload)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::UpstreamSchema(format!("search response: {}", e)))?;
        debug!(count = body.objects.len(), limit = limit, "vector search complete");
        Ok(Self::hits_to_documents(body.objects, return_distance))
    }

    async fn fetch_by_parent_sources(
        &self,
        parent_ids: &[String],
        limit: usize,
    ) -> Result<Vec<Document>, EngineError> {
        if parent_ids.is_empty() {
            return Ok(Vec::new());
        }
        let payload = json!({
            "filters": {
                "path": ["parent_source"],
                "operator": "ContainsAny",
                "valueTextArray": parent_ids,
            },
            "limit": limit,
        });
        let url = self.collection_url(DOCUMENTS_COLLECTION, "fetch");
        let body: SearchResponse = self
            .post(&url, &payload)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::UpstreamSchema(format!("fetch response: {}", e)))?;
        debug!(count = body.objects.len(), parents = parent_ids.len(), "parent fetch complete");
        Ok(Self::hits_to_documents(body.objects, false))
    }

    async fn insert_debate_log(&self, record: DebateLogRecord) -> Result<(), EngineError> {
        let record = record.truncate();
        let url = self.collection_url(VERIFICATION_LOG_COLLECTION, "objects");
        let payload = serde_json::to_value(&record)
            .map_err(|e| EngineError::Internal(format!("debate log serialize: {}", e)))?;
        self.post(&url, &json!({ "properties": payload })).await?;
        debug!(trace_id = %record.trace_id, "debate log saved");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: Collection URLs are joined without duplicate slashes.
    #[test]
    fn collection_urls() {
        let store = VectorHttpStore::new("http://db:8080/");
        assert_eq!(
            store.collection_url("Document", "search"),
            "http://db:8080/collections/Document/search"
        );
    }

    /// **Scenario**: Searching with an empty vector short-circuits to empty
    /// without a network call.
    #[tokio::test]
    async fn empty_vector_short_circuits() {
        let store = VectorHttpStore::new("http://127.0.0.1:1");
        let docs = store
            .search_near_vector(&[], 5, &ScopeFilter::GlobalOnly, true)
            .await
            .unwrap();
        assert!(docs.is_empty());
    }

    /// **Scenario**: Fetch with no parent ids short-circuits to empty.
    #[tokio::test]
    async fn no_parents_short_circuits() {
        let store = VectorHttpStore::new("http://127.0.0.1:1");
        let docs = store.fetch_by_parent_sources(&[], 100).await.unwrap();
        assert!(docs.is_empty());
    }

    /// **Scenario**: Distances are dropped from results when not requested.
    #[test]
    fn distance_dropped_when_not_requested() {
        let hits = vec![SearchHit {
            content: "c".into(),
            source: "s".into(),
            parent_source: None,
            distance: Some(0.4),
        }];
        let docs = VectorHttpStore::hits_to_documents(hits, false);
        assert_eq!(docs[0].metadata.distance, None);
    }
}
