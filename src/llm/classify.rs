//! Small single-shot classification calls used by onboarding.

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{ChatMessage, CompletionRequest, LlmProvider};
use crate::session::AddressDetails;

/// Classifies caller utterances during onboarding.
#[async_trait]
pub trait Classifier: Send + Sync {
    /// Whether the message is a greeting or an attempt to start a
    /// conversation, as opposed to a real question.
    async fn is_greeting(&self, text: &str) -> Result<bool, LlmError>;

    /// Extract structured address fields from a free-form message.
    async fn extract_address(&self, text: &str) -> Result<AddressDetails, LlmError>;
}

/// LLM-backed classifier.
pub struct LlmClassifier {
    llm: std::sync::Arc<dyn LlmProvider>,
}

impl LlmClassifier {
    pub fn new(llm: std::sync::Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }
}

/// Strip a Markdown code fence (``` or ```json) wrapping, if present.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let inner = inner.strip_prefix("json").unwrap_or(inner);
    let inner = inner.strip_suffix("```").unwrap_or(inner);
    inner.trim()
}

#[async_trait]
impl Classifier for LlmClassifier {
    async fn is_greeting(&self, text: &str) -> Result<bool, LlmError> {
        let prompt = format!(
            "Is the following message a greeting or an attempt to start a conversation \
             (like 'hi', 'hello', 'namaste', 'good morning'), rather than an actual \
             question or request? Answer with only 'yes' or 'no'.\n\nMessage: {text}"
        );
        let response = self
            .llm
            .complete(CompletionRequest::new(vec![ChatMessage::user(prompt)]))
            .await?;
        let answer = response.text.trim().to_lowercase();
        debug!(answer = %answer, "Greeting classification");
        Ok(answer.starts_with("yes"))
    }

    async fn extract_address(&self, text: &str) -> Result<AddressDetails, LlmError> {
        let prompt = format!(
            "Extract address details from the following message. Respond with only a \
             JSON object with these keys: \"is_address\" (true if the message contains \
             any location information), \"state\", \"district\", \"city\", \"village\". \
             Use null for fields that are not mentioned.\n\nMessage: {text}"
        );
        let response = self
            .llm
            .complete(CompletionRequest::json(vec![ChatMessage::user(prompt)]))
            .await?;

        let parsed: Value = serde_json::from_str(strip_code_fence(&response.text)).map_err(|e| {
            LlmError::InvalidResponse {
                provider: self.llm.model_name().to_string(),
                reason: format!("address extraction was not JSON: {e}"),
            }
        })?;

        let is_address = parsed
            .get("is_address")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !is_address {
            return Ok(AddressDetails::default());
        }

        let field = |key: &str| {
            parsed
                .get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(String::from)
        };
        Ok(AddressDetails {
            state: field("state"),
            district: field("district"),
            city: field("city"),
            village: field("village"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::provider::{CompletionResponse, ToolCompletionRequest};
    use std::sync::Arc;

    struct CannedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmProvider for CannedLlm {
        fn model_name(&self) -> &str {
            "canned"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Ok(CompletionResponse {
                text: self.reply.clone(),
                tool_calls: Vec::new(),
            })
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            unimplemented!("not used in classifier tests")
        }
    }

    fn classifier(reply: &str) -> LlmClassifier {
        LlmClassifier::new(Arc::new(CannedLlm {
            reply: reply.to_string(),
        }))
    }

    #[tokio::test]
    async fn greeting_yes_and_no() {
        assert!(classifier("Yes").is_greeting("hello").await.unwrap());
        assert!(classifier("yes.").is_greeting("namaste").await.unwrap());
        assert!(!classifier("No").is_greeting("tomato prices").await.unwrap());
    }

    #[tokio::test]
    async fn address_extraction_parses_json() {
        let reply = r#"{"is_address": true, "state": "Maharashtra", "district": "Pune", "city": null, "village": "Wagholi"}"#;
        let details = classifier(reply).extract_address("I live in Wagholi, Pune").await.unwrap();
        assert_eq!(details.state.as_deref(), Some("Maharashtra"));
        assert_eq!(details.district.as_deref(), Some("Pune"));
        assert!(details.city.is_none());
        assert_eq!(details.village.as_deref(), Some("Wagholi"));
    }

    #[tokio::test]
    async fn address_extraction_strips_code_fence() {
        let reply = "```json\n{\"is_address\": true, \"state\": \"Punjab\", \"district\": null, \"city\": null, \"village\": null}\n```";
        let details = classifier(reply).extract_address("Punjab").await.unwrap();
        assert_eq!(details.state.as_deref(), Some("Punjab"));
    }

    #[tokio::test]
    async fn non_address_returns_empty() {
        let reply = r#"{"is_address": false, "state": null, "district": null, "city": null, "village": null}"#;
        let details = classifier(reply).extract_address("what is DAP").await.unwrap();
        assert_eq!(details, AddressDetails::default());
    }

    #[tokio::test]
    async fn malformed_json_is_an_error() {
        assert!(classifier("not json").extract_address("x").await.is_err());
    }
}
