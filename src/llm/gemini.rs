//! Gemini provider — talks to the generateContent REST API directly.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::LlmError;
use crate::llm::provider::{
    ChatMessage, CompletionRequest, CompletionResponse, LlmProvider, ToolCall,
    ToolCompletionRequest, ToolDefinition,
};

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

pub struct GeminiProvider {
    client: reqwest::Client,
    api_key: SecretString,
    model: String,
    base_url: String,
}

impl GeminiProvider {
    pub fn new(client: reqwest::Client, api_key: SecretString, model: impl Into<String>) -> Self {
        Self {
            client,
            api_key,
            model: model.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the provider at a different endpoint (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/models/{}:generateContent?key={}",
            self.base_url,
            self.model,
            self.api_key.expose_secret()
        )
    }

    async fn call(&self, body: Value) -> Result<CompletionResponse, LlmError> {
        let response = self
            .client
            .post(self.endpoint())
            .json(&body)
            .send()
            .await
            .map_err(|e| LlmError::RequestFailed {
                provider: "gemini".to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(LlmError::RateLimited {
                provider: "gemini".to_string(),
                retry_after: None,
            });
        }
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(LlmError::AuthFailed {
                provider: "gemini".to_string(),
            });
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(LlmError::RequestFailed {
                provider: "gemini".to_string(),
                reason: format!("HTTP {status}: {text}"),
            });
        }

        let payload: Value = response.json().await.map_err(|e| LlmError::RequestFailed {
            provider: "gemini".to_string(),
            reason: e.to_string(),
        })?;
        parse_candidate(&payload)
    }
}

/// Build the `contents` array from chat messages. System messages are
/// extracted separately because Gemini takes them as `systemInstruction`.
fn build_contents(messages: &[ChatMessage]) -> (Option<String>, Vec<Value>) {
    let mut system = None;
    let mut contents = Vec::new();

    for message in messages {
        match message {
            ChatMessage::System { content } => {
                system = Some(content.clone());
            }
            ChatMessage::User { content } => {
                contents.push(json!({
                    "role": "user",
                    "parts": [{"text": content}],
                }));
            }
            ChatMessage::Assistant { content, tool_calls } => {
                let mut parts = Vec::new();
                if !content.is_empty() {
                    parts.push(json!({"text": content}));
                }
                for call in tool_calls {
                    parts.push(json!({
                        "functionCall": {"name": call.name, "args": call.arguments},
                    }));
                }
                contents.push(json!({"role": "model", "parts": parts}));
            }
            ChatMessage::ToolResult { name, content } => {
                contents.push(json!({
                    "role": "user",
                    "parts": [{
                        "functionResponse": {
                            "name": name,
                            "response": {"result": content},
                        }
                    }],
                }));
            }
        }
    }

    (system, contents)
}

fn tool_declarations(tools: &[ToolDefinition]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|t| {
            json!({
                "name": t.name,
                "description": t.description,
                "parameters": t.parameters,
            })
        })
        .collect();
    json!([{"functionDeclarations": declarations}])
}

/// Pull text and function calls out of the first candidate.
fn parse_candidate(payload: &Value) -> Result<CompletionResponse, LlmError> {
    let parts = payload
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .ok_or_else(|| LlmError::InvalidResponse {
            provider: "gemini".to_string(),
            reason: "no candidates in response".to_string(),
        })?;

    let mut text = String::new();
    let mut tool_calls = Vec::new();
    for part in parts {
        if let Some(t) = part.get("text").and_then(Value::as_str) {
            text.push_str(t);
        }
        if let Some(call) = part.get("functionCall") {
            let name = call
                .get("name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let arguments = call.get("args").cloned().unwrap_or(json!({}));
            tool_calls.push(ToolCall { name, arguments });
        }
    }

    if text.is_empty() && tool_calls.is_empty() {
        return Err(LlmError::InvalidResponse {
            provider: "gemini".to_string(),
            reason: "candidate had no text or function calls".to_string(),
        });
    }

    Ok(CompletionResponse { text, tool_calls })
}

#[async_trait]
impl LlmProvider for GeminiProvider {
    fn model_name(&self) -> &str {
        &self.model
    }

    async fn complete(&self, request: CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let (system, contents) = build_contents(&request.messages);
        let mut body = json!({"contents": contents});
        if let Some(system) = system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }
        if request.json_mode {
            body["generationConfig"] = json!({"responseMimeType": "application/json"});
        }

        debug!(model = %self.model, json_mode = request.json_mode, "Gemini completion");
        self.call(body).await
    }

    async fn complete_with_tools(
        &self,
        request: ToolCompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        let (system, contents) = build_contents(&request.messages);
        let mut body = json!({"contents": contents});
        // An empty declarations array is rejected by the API
        if !request.tools.is_empty() {
            body["tools"] = tool_declarations(&request.tools);
        }
        if let Some(system) = system {
            body["systemInstruction"] = json!({"parts": [{"text": system}]});
        }

        debug!(model = %self.model, tools = request.tools.len(), "Gemini tool completion");
        self.call(body).await
    }
}
