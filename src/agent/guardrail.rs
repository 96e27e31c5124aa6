//! Confidence guardrail — replaces low-confidence refusals with a real
//! answer and enforces the reply length cap.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::warn;

use crate::llm::{ChatMessage, CompletionRequest, LlmProvider};

const MAX_REPLY_CHARS: usize = 1000;
const ELLIPSIS: &str = "...";

static BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*\*(.*?)\*\*").unwrap());
static ITALIC: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\*(.*?)\*").unwrap());
static UNDERSCORE_BOLD: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.*?)__").unwrap());
static HEADER: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^#{1,6}\s*").unwrap());
static BULLET: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?m)^\s*[\*\-]\s+").unwrap());

/// Remove the Markdown the model tends to emit. WhatsApp and the app
/// render replies as plain text.
pub fn strip_markdown(text: &str) -> String {
    let text = BOLD.replace_all(text, "$1");
    let text = UNDERSCORE_BOLD.replace_all(&text, "$1");
    let text = ITALIC.replace_all(&text, "$1");
    let text = HEADER.replace_all(&text, "");
    let text = BULLET.replace_all(&text, "- ");
    text.replace('`', "")
}

/// Cap a reply at the channel limit, cutting on a char boundary.
pub fn clamp_reply(text: &str) -> String {
    if text.chars().count() <= MAX_REPLY_CHARS {
        return text.to_string();
    }
    let keep = MAX_REPLY_CHARS - ELLIPSIS.len();
    let mut clamped: String = text.chars().take(keep).collect();
    clamped.push_str(ELLIPSIS);
    clamped
}

/// Screens agent answers for low-confidence refusals before they
/// reach the caller. Confident answers pass through unchanged.
pub struct ConfidenceGuardrail {
    llm: Arc<dyn LlmProvider>,
}

impl ConfidenceGuardrail {
    pub fn new(llm: Arc<dyn LlmProvider>) -> Self {
        Self { llm }
    }

    /// Produce the final reply for `answer` to `original_query`. The
    /// reviewing model replaces the answer only when it is a refusal
    /// such as "I cannot help" or "I don't have information"; when the
    /// review itself fails, the original answer is stripped and
    /// clamped instead of being dropped.
    pub async fn review(&self, original_query: &str, answer: &str) -> String {
        let system = format!(
            "You are an expert AI quality assurance system for a farming assistant bot.\n\n\
             CONTEXT:\n\
             - Farmer's Original Question: \"{original_query}\"\n\
             - Primary AI's Answer: \"{answer}\"\n\n\
             YOUR TASK:\n\
             Analyze the primary AI's answer. If it is a low-confidence refusal (it says \
             \"I cannot help\", \"I don't have information\", is evasive, or is clearly \
             unhelpful), you MUST generate a new, helpful, and direct answer to the \
             farmer's original question. Otherwise, you MUST output the primary AI's \
             original answer unchanged.\n\n\
             RESPONSE RULES:\n\
             - Keep your answer under 1000 characters.\n\
             - Output ONLY the text of the answer itself, with no introductions, \
             explanations, or extra formatting."
        );

        let reviewed = match self
            .llm
            .complete(CompletionRequest::new(vec![
                ChatMessage::system(system),
                ChatMessage::user("Provide the direct answer string based on the rules."),
            ]))
            .await
        {
            Ok(response) if !response.text.trim().is_empty() => response.text,
            Ok(_) => answer.to_string(),
            Err(e) => {
                warn!(error = %e, "Answer review failed, using raw answer");
                answer.to_string()
            }
        };

        clamp_reply(&strip_markdown(&reviewed))
    }
}
