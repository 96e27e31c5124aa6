//! Market price tool — RAG first, LLM web-knowledge fallback when the
//! corpus signals a miss.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::{debug, warn};

use crate::error::ToolError;
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};
use crate::rag::{search_needed, RagEngine};
use crate::tools::{Tool, ToolContext};

pub struct MarketPriceTool {
    rag: Arc<dyn RagEngine>,
    llm: Arc<dyn LlmProvider>,
}

impl MarketPriceTool {
    pub fn new(rag: Arc<dyn RagEngine>, llm: Arc<dyn LlmProvider>) -> Self {
        Self { rag, llm }
    }

    /// The price corpus covers a fixed set of mandis and dates. On a
    /// corpus miss the model answers from general knowledge instead,
    /// flagged as approximate.
    async fn answer_from_model(&self, search_query: &str) -> Result<String, ToolError> {
        let prompt = format!(
            "You are a commodity price assistant for Indian farmers. The local price \
             database has no data for this query. Using your general knowledge of \
             Indian agricultural markets, give a brief, approximate answer and clearly \
             say the figures are estimates. Query: {search_query}"
        );
        let response = self
            .llm
            .complete(CompletionRequest::new(vec![ChatMessage::user(prompt)]))
            .await
            .map_err(|e| ToolError::ExecutionFailed {
                tool: "get_market_price".to_string(),
                reason: e.to_string(),
            })?;
        Ok(response.text)
    }
}

#[async_trait]
impl Tool for MarketPriceTool {
    fn name(&self) -> &str {
        "get_market_price"
    }

    fn description(&self) -> &str {
        "Look up current mandi (market) prices for crops and commodities. \
         Use this for any question about selling prices or rates."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "query": {
                    "type": "string",
                    "description": "The price question, in English, including crop and place",
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

        let answer = match self.rag.ask(query, &ctx.phone).await {
            Ok(answer) => {
                if let Some(search_query) = search_needed(&answer) {
                    debug!(search_query, "Price corpus miss, falling back to model");
                    self.answer_from_model(search_query).await?
                } else {
                    answer
                }
            }
            Err(e) => {
                warn!(error = %e, "Price lookup failed");
                return Ok("I couldn't reach the market price service right now. \
                           Please try again in a few minutes."
                    .to_string());
            }
        };

        Ok(format!("🌾 {answer}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LlmError;
    use crate::llm::{CompletionResponse, ToolCompletionRequest};

    struct StubRag {
        answer: String,
    }

    #[async_trait]
    impl RagEngine for StubRag {
        async fn ask(&self, _query: &str, _session_id: &str) -> Result<String, ToolError> {
            Ok(self.answer.clone())
        }
    }

    struct StubLlm;

    #[async_trait]
    impl LlmProvider for StubLlm {
        fn model_name(&self) -> &str {
            "stub"
        }

        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let ChatMessage::User { content } = &request.messages[0] else {
                panic!("expected user message");
            };
            assert!(content.contains("onion price nashik"));
            Ok(CompletionResponse {
                text: "Roughly Rs 25/kg (estimate).".to_string(),
                tool_calls: Vec::new(),
            })
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            unimplemented!("not used in price tests")
        }
    }

    #[tokio::test]
    async fn corpus_hit_passes_through() {
        let tool = MarketPriceTool::new(
            Arc::new(StubRag {
                answer: "Onion at Nashik mandi: Rs 22/kg.".to_string(),
            }),
            Arc::new(StubLlm),
        );
        let reply = tool
            .execute(json!({"query": "onion price nashik"}), &ToolContext::default())
            .await
            .unwrap();
        assert_eq!(reply, "🌾 Onion at Nashik mandi: Rs 22/kg.");
    }

    #[tokio::test]
    async fn corpus_miss_falls_back_to_model() {
        let tool = MarketPriceTool::new(
            Arc::new(StubRag {
                answer: "SEARCH_NEEDED: onion price nashik today".to_string(),
            }),
            Arc::new(StubLlm),
        );
        let reply = tool
            .execute(json!({"query": "onion price nashik"}), &ToolContext::default())
            .await
            .unwrap();
        assert!(reply.starts_with("🌾"));
        assert!(reply.contains("estimate"));
    }
}
