//! Query agent — tool-calling dispatch and reply guardrails.

pub mod dispatcher;
pub mod guardrail;

pub use dispatcher::{QueryDispatcher, ToolCallingAgent, APOLOGY_REPLY};
pub use guardrail::{clamp_reply, strip_markdown, ConfidenceGuardrail};
