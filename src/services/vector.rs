//! Vector-similarity search collaborator.

use async_trait::async_trait;
use serde::Deserialize;

use crate::error::ServiceError;

/// Similarity search over previously successful email threads.
#[async_trait]
pub trait VectorSearch: Send + Sync {
    /// Return up to `top_k` reference texts ordered by similarity.
    /// An empty vec means no matches, not an error.
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, ServiceError>;
}

/// HTTP client for a JSON similarity endpoint.
///
/// POSTs `{"query": ..., "top_k": ...}` and expects
/// `{"results": [{"text": ...}, ...]}` ordered best-first.
pub struct HttpVectorSearch {
    http: reqwest::Client,
    endpoint: String,
}

impl HttpVectorSearch {
    pub fn new(endpoint: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            endpoint,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchHit>,
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    text: String,
}

#[async_trait]
impl VectorSearch for HttpVectorSearch {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, ServiceError> {
        let body = serde_json::json!({ "query": query, "top_k": top_k });

        let response = self
            .http
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| ServiceError::VectorSearch(e.to_string()))?
            .error_for_status()
            .map_err(|e| ServiceError::VectorSearch(e.to_string()))?;

        let parsed: SearchResponse = response
            .json()
            .await
            .map_err(|e| ServiceError::VectorSearch(format!("malformed response: {e}")))?;

        Ok(parsed
            .results
            .into_iter()
            .take(top_k)
            .map(|hit| hit.text)
            .collect())
    }
}

/// Fallback when no endpoint is configured — pipeline proceeds with no references.
pub struct UnavailableVectorSearch;

#[async_trait]
impl VectorSearch for UnavailableVectorSearch {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<String>, ServiceError> {
        Ok(Vec::new())
    }
}
