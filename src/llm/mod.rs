//! LLM integration.
//!
//! Gemini is accessed over its generateContent REST API. Everything
//! above this module works against the `LlmProvider` trait so tests can
//! substitute canned providers.

pub mod classify;
pub mod gemini;
pub mod provider;

pub use classify::{Classifier, LlmClassifier};
pub use gemini::GeminiProvider;
pub use provider::*;

use std::sync::Arc;

use crate::error::LlmError;

/// Supported LLM backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmBackend {
    Gemini,
}

/// Configuration for creating an LLM provider.
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub backend: LlmBackend,
    pub api_key: secrecy::SecretString,
    pub model: String,
}

/// Create an LLM provider from configuration.
pub fn create_provider(
    config: &LlmConfig,
    client: reqwest::Client,
) -> Result<Arc<dyn LlmProvider>, LlmError> {
    match config.backend {
        LlmBackend::Gemini => {
            tracing::info!("Using Gemini (model: {})", config.model);
            Ok(Arc::new(GeminiProvider::new(
                client,
                config.api_key.clone(),
                &config.model,
            )))
        }
    }
}
