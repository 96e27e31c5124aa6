//! Crop disease lookup tool backed by the pesticide knowledge base.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::warn;

use crate::error::ToolError;
use crate::rag::RagEngine;
use crate::tools::{Tool, ToolContext};

pub struct DiseaseLookupTool {
    rag: Arc<dyn RagEngine>,
}

impl DiseaseLookupTool {
    pub fn new(rag: Arc<dyn RagEngine>) -> Self {
        Self { rag }
    }
}

#[async_trait]
impl Tool for DiseaseLookupTool {
    fn name(&self) -> &str {
        "get_disease_info"
    }

    fn description(&self) -> &str {
        "Look up crop diseases, pests, symptoms, and pesticide or treatment \
         recommendations. Use this for any question about plant health."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The disease or pest question, in English",
                }
            },
            "required": ["query"],
        })
    }

    async fn execute(&self, params: Value, ctx: &ToolContext) -> Result<String, ToolError> {
        let query = params
            .get("query")
            .and_then(Value::as_str)
            .ok_or_else(|| ToolError::InvalidParameters {
                tool: self.name().to_string(),
                reason: "missing query".to_string(),
            })?;

        match self.rag.ask(query, &ctx.phone).await {
            Ok(answer) => Ok(format!("🌿 Crop Disease Information:\n\n{answer}")),
            Err(e) => {
                warn!(error = %e, "Disease lookup failed");
                Ok("I couldn't reach the crop disease knowledge base right now. \
                    Please try again in a few minutes."
                    .to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StubRag {
        result: Result<String, String>,
    }

    #[async_trait]
    impl RagEngine for StubRag {
        async fn ask(&self, _query: &str, _session_id: &str) -> Result<String, ToolError> {
            self.result.clone().map_err(|reason| ToolError::ExecutionFailed {
                tool: "rag".to_string(),
                reason,
            })
        }
    }

    #[tokio::test]
    async fn wraps_answer_with_header() {
        let tool = DiseaseLookupTool::new(Arc::new(StubRag {
            result: Ok("Use copper fungicide.".to_string()),
        }));
        let ctx = ToolContext::default();
        let reply = tool
            .execute(json!({"query": "tomato blight"}), &ctx)
            .await
            .unwrap();
        assert!(reply.starts_with("🌿 Crop Disease Information:"));
        assert!(reply.contains("copper fungicide"));
    }

    #[tokio::test]
    async fn rag_failure_becomes_friendly_text() {
        let tool = DiseaseLookupTool::new(Arc::new(StubRag {
            result: Err("connection refused".to_string()),
        }));
        let ctx = ToolContext::default();
        let reply = tool
            .execute(json!({"query": "wheat rust"}), &ctx)
            .await
            .unwrap();
        assert!(reply.contains("try again"));
    }

    #[tokio::test]
    async fn missing_query_is_invalid() {
        let tool = DiseaseLookupTool::new(Arc::new(StubRag {
            result: Ok(String::new()),
        }));
        let ctx = ToolContext::default();
        assert!(tool.execute(json!({}), &ctx).await.is_err());
    }
}
