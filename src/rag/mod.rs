//! Retrieval services — HTTP clients for the disease and price
//! knowledge bases.

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::ToolError;

/// Sentinel prefix a retrieval service emits when its corpus has no
/// answer and a web search should be attempted instead.
pub const SEARCH_NEEDED_MARKER: &str = "SEARCH_NEEDED:";

/// A question-answering service over a document corpus.
#[async_trait]
pub trait RagEngine: Send + Sync {
    async fn ask(&self, query: &str, session_id: &str) -> Result<String, ToolError>;
}

/// RAG service reached over a simple JSON POST API.
pub struct HttpRagEngine {
    client: reqwest::Client,
    url: String,
}

impl HttpRagEngine {
    pub fn new(client: reqwest::Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }
}

#[async_trait]
impl RagEngine for HttpRagEngine {
    async fn ask(&self, query: &str, session_id: &str) -> Result<String, ToolError> {
        let response = self
            .client
            .post(&self.url)
            .json(&json!({"query": query, "session_id": session_id}))
            .send()
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool: "rag".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ToolError::ExecutionFailed {
                tool: "rag".to_string(),
                reason: format!("HTTP {status}"),
            });
        }

        let payload: Value = response.json().await.map_err(|e| ToolError::ExecutionFailed {
            tool: "rag".to_string(),
            reason: format!("bad JSON: {e}"),
        })?;
        payload
            .get("answer")
            .and_then(Value::as_str)
            .map(String::from)
            .ok_or_else(|| ToolError::ExecutionFailed {
                tool: "rag".to_string(),
                reason: "response had no answer field".to_string(),
            })
    }
}

/// Whether a RAG answer is the corpus-miss sentinel. Returns the query
/// the service suggests searching for.
pub fn search_needed(answer: &str) -> Option<&str> {
    answer
        .trim()
        .strip_prefix(SEARCH_NEEDED_MARKER)
        .map(str::trim)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinel_detection() {
        assert_eq!(
            search_needed("SEARCH_NEEDED: tomato price pune today"),
            Some("tomato price pune today")
        );
        assert_eq!(search_needed("  SEARCH_NEEDED:onion rates"), Some("onion rates"));
        assert!(search_needed("Tomato sells at Rs 20/kg.").is_none());
    }
}
