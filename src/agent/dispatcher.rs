//! Query dispatcher — routes a farmer's question through the LLM and
//! its tools.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::LlmError;
use crate::llm::{ChatMessage, LlmProvider, ToolCompletionRequest, ToolDefinition};
use crate::session::{ConversationTurn, TurnRole};
use crate::tools::{Tool, ToolContext};

/// Shown when the model or a tool fails and no answer can be produced.
pub const APOLOGY_REPLY: &str =
    "I'm having a little trouble understanding. Could you please rephrase your question? 🌱";

const SYSTEM_PROMPT: &str = "You are a helpful farming assistant for Indian farmers. \
    Answer questions about crops, diseases, weather, and market prices. \
    Use the available tools whenever they apply; do not invent weather data or prices. \
    Keep answers short, practical, and free of technical jargon. Always answer in English; \
    translation to the farmer's language happens elsewhere.";

/// Handles fully-onboarded turns. Implementations must not fail a
/// turn; errors become apologies.
#[async_trait]
pub trait QueryDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        utterance: &str,
        history: &[ConversationTurn],
        ctx: &ToolContext,
    ) -> String;
}

/// LLM agent with a fixed tool set.
pub struct ToolCallingAgent {
    llm: Arc<dyn LlmProvider>,
    tools: Vec<Arc<dyn Tool>>,
    max_iterations: usize,
}

impl ToolCallingAgent {
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Vec<Arc<dyn Tool>>, max_iterations: usize) -> Self {
        Self {
            llm,
            tools,
            max_iterations,
        }
    }

    fn tool_definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .iter()
            .map(|tool| ToolDefinition {
                name: tool.name().to_string(),
                description: tool.description().to_string(),
                parameters: tool.parameters_schema(),
            })
            .collect()
    }

    fn find_tool(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.iter().find(|t| t.name() == name)
    }

    async fn run(
        &self,
        utterance: &str,
        history: &[ConversationTurn],
        ctx: &ToolContext,
    ) -> Result<String, LlmError> {
        let mut messages = vec![ChatMessage::system(SYSTEM_PROMPT)];
        for turn in history {
            messages.push(match turn.role {
                TurnRole::User => ChatMessage::user(&turn.text),
                TurnRole::Bot => ChatMessage::assistant(&turn.text),
            });
        }
        messages.push(ChatMessage::user(utterance));

        let definitions = self.tool_definitions();

        for iteration in 0..self.max_iterations {
            let response = self
                .llm
                .complete_with_tools(ToolCompletionRequest {
                    messages: messages.clone(),
                    tools: definitions.clone(),
                })
                .await?;

            if response.tool_calls.is_empty() {
                return Ok(response.text);
            }

            messages.push(ChatMessage::Assistant {
                content: response.text.clone(),
                tool_calls: response.tool_calls.clone(),
            });

            for call in &response.tool_calls {
                let output = match self.find_tool(&call.name) {
                    Some(tool) => {
                        debug!(iteration, tool = %call.name, "Executing tool");
                        match tool.execute(call.arguments.clone(), ctx).await {
                            Ok(output) => output,
                            Err(e) => {
                                warn!(tool = %call.name, error = %e, "Tool failed");
                                format!("Tool error: {e}")
                            }
                        }
                    }
                    None => {
                        warn!(tool = %call.name, "Model requested unknown tool");
                        format!("Unknown tool: {}", call.name)
                    }
                };
                messages.push(ChatMessage::tool_result(&call.name, output));
            }
        }

        // Iteration budget spent with tool calls still pending.
        // Ask for a final text-only answer.
        let response = self
            .llm
            .complete_with_tools(ToolCompletionRequest {
                messages,
                tools: Vec::new(),
            })
            .await?;
        Ok(response.text)
    }
}

#[async_trait]
impl QueryDispatcher for ToolCallingAgent {
    async fn dispatch(
        &self,
        utterance: &str,
        history: &[ConversationTurn],
        ctx: &ToolContext,
    ) -> String {
        match self.run(utterance, history, ctx).await {
            Ok(text) if !text.trim().is_empty() => text,
            Ok(_) => {
                warn!("Agent produced an empty answer");
                APOLOGY_REPLY.to_string()
            }
            Err(e) => {
                warn!(error = %e, "Agent run failed");
                APOLOGY_REPLY.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ToolError;
    use crate::llm::{CompletionRequest, CompletionResponse, ToolCall};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockTool;

    #[async_trait]
    impl Tool for MockTool {
        fn name(&self) -> &str {
            "get_weather_forecast"
        }

        fn description(&self) -> &str {
            "mock"
        }

        fn parameters_schema(&self) -> serde_json::Value {
            json!({"type": "object", "properties": {}})
        }

        async fn execute(
            &self,
            _params: serde_json::Value,
            _ctx: &ToolContext,
        ) -> Result<String, ToolError> {
            Ok("📅 2026-08-29: 🌡️ 24°C / 31°C, ☀️ Clear".to_string())
        }
    }

    /// First call returns a tool call, second a final answer.
    struct ScriptedLlm {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmProvider for ScriptedLlm {
        fn model_name(&self) -> &str {
            "scripted"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            unimplemented!("not used in agent tests")
        }

        async fn complete_with_tools(
            &self,
            request: ToolCompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call == 0 {
                Ok(CompletionResponse {
                    text: String::new(),
                    tool_calls: vec![ToolCall {
                        name: "get_weather_forecast".to_string(),
                        arguments: json!({}),
                    }],
                })
            } else {
                // Tool output must have made it back into the transcript
                let has_result = request.messages.iter().any(|m| {
                    matches!(m, ChatMessage::ToolResult { content, .. } if content.contains("31°C"))
                });
                assert!(has_result);
                Ok(CompletionResponse {
                    text: "Clear skies, highs around 31°C.".to_string(),
                    tool_calls: Vec::new(),
                })
            }
        }
    }

    struct FailingLlm;

    #[async_trait]
    impl LlmProvider for FailingLlm {
        fn model_name(&self) -> &str {
            "failing"
        }

        async fn complete(
            &self,
            _request: CompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            unimplemented!("not used in agent tests")
        }

        async fn complete_with_tools(
            &self,
            _request: ToolCompletionRequest,
        ) -> Result<CompletionResponse, LlmError> {
            Err(LlmError::RequestFailed {
                provider: "failing".to_string(),
                reason: "down".to_string(),
            })
        }
    }

    #[tokio::test]
    async fn tool_call_loop_produces_answer() {
        let agent = ToolCallingAgent::new(
            Arc::new(ScriptedLlm {
                calls: AtomicUsize::new(0),
            }),
            vec![Arc::new(MockTool)],
            4,
        );
        let reply = agent
            .dispatch("will it rain", &[], &ToolContext::default())
            .await;
        assert_eq!(reply, "Clear skies, highs around 31°C.");
    }

    #[tokio::test]
    async fn llm_failure_yields_apology() {
        let agent = ToolCallingAgent::new(Arc::new(FailingLlm), vec![Arc::new(MockTool)], 4);
        let reply = agent
            .dispatch("will it rain", &[], &ToolContext::default())
            .await;
        assert_eq!(reply, APOLOGY_REPLY);
    }
}
