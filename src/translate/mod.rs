//! Translation gateway.
//!
//! Wraps a single-attempt translation API with no-op short circuits and
//! bounded retries. Translation never fails a turn: when every attempt
//! errors out, the caller gets the original text back.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::TranslationError;

const MAX_ATTEMPTS: u32 = 3;
const RETRY_DELAY: Duration = Duration::from_millis(500);

/// One translation attempt against a concrete backend.
#[async_trait]
pub trait TranslateApi: Send + Sync {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError>;
}

/// Infallible translation surface the rest of the system uses.
#[async_trait]
pub trait Translator: Send + Sync {
    /// Translate `text` from `source` to `target`, returning the
    /// original text when translation is unnecessary or unavailable.
    async fn translate(&self, text: &str, source: &str, target: &str) -> String;
}

/// Google Translate's unofficial gtx endpoint. Takes no API key.
pub struct GoogleTranslateApi {
    client: reqwest::Client,
    base_url: String,
}

impl GoogleTranslateApi {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            base_url: "https://translate.googleapis.com".to_string(),
        }
    }

    /// Point the API at a different endpoint (for tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[async_trait]
impl TranslateApi for GoogleTranslateApi {
    async fn translate(
        &self,
        text: &str,
        source: &str,
        target: &str,
    ) -> Result<String, TranslationError> {
        let url = format!("{}/translate_a/single", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("client", "gtx"),
                ("sl", source),
                ("tl", target),
                ("dt", "t"),
                ("q", text),
            ])
            .send()
            .await
            .map_err(|e| TranslationError::RequestFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(TranslationError::RequestFailed(format!("HTTP {status}")));
        }

        // Response shape: [[[translated, original, ...], ...], ...]
        let payload: Value = response
            .json()
            .await
            .map_err(|e| TranslationError::InvalidResponse(e.to_string()))?;
        let segments = payload
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| TranslationError::InvalidResponse("missing segment array".into()))?;

        let mut translated = String::new();
        for segment in segments {
            if let Some(part) = segment.get(0).and_then(Value::as_str) {
                translated.push_str(part);
            }
        }
        if translated.is_empty() {
            return Err(TranslationError::EmptyResult);
        }
        Ok(translated)
    }
}

/// Retry and no-op policy around a `TranslateApi`.
pub struct TranslationGateway {
    api: Arc<dyn TranslateApi>,
}

impl TranslationGateway {
    pub fn new(api: Arc<dyn TranslateApi>) -> Self {
        Self { api }
    }
}

/// Whether the text is only digits, whitespace, and phone punctuation.
/// Menu choices and pincodes read the same in every language.
fn is_numeric_input(text: &str) -> bool {
    !text.is_empty()
        && text
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_whitespace() || c == '-' || c == '+')
}

#[async_trait]
impl Translator for TranslationGateway {
    async fn translate(&self, text: &str, source: &str, target: &str) -> String {
        if text.trim().is_empty() {
            return text.to_string();
        }
        if source == target {
            return text.to_string();
        }
        if target == "en" && is_numeric_input(text) {
            return text.to_string();
        }

        for attempt in 1..=MAX_ATTEMPTS {
            match self.api.translate(text, source, target).await {
                Ok(translated) => return translated,
                Err(e) => {
                    warn!(attempt, source, target, error = %e, "Translation attempt failed");
                    if attempt < MAX_ATTEMPTS {
                        tokio::time::sleep(RETRY_DELAY).await;
                    }
                }
            }
        }

        debug!(source, target, "Translation exhausted, passing text through");
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FlakyApi {
        calls: AtomicU32,
        fail_first: u32,
    }

    #[async_trait]
    impl TranslateApi for FlakyApi {
        async fn translate(
            &self,
            text: &str,
            _source: &str,
            _target: &str,
        ) -> Result<String, TranslationError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if call <= self.fail_first {
                Err(TranslationError::RequestFailed("boom".into()))
            } else {
                Ok(format!("[t]{text}"))
            }
        }
    }

    fn gateway(fail_first: u32) -> (TranslationGateway, Arc<FlakyApi>) {
        let api = Arc::new(FlakyApi {
            calls: AtomicU32::new(0),
            fail_first,
        });
        (TranslationGateway::new(api.clone()), api)
    }

    #[tokio::test(start_paused = true)]
    async fn same_language_is_a_noop() {
        let (gw, api) = gateway(0);
        assert_eq!(gw.translate("hello", "en", "en").await, "hello");
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn empty_text_is_a_noop() {
        let (gw, api) = gateway(0);
        assert_eq!(gw.translate("   ", "hi", "en").await, "   ");
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn numeric_input_skips_translation_to_english() {
        let (gw, api) = gateway(0);
        assert_eq!(gw.translate("411 001", "hi", "en").await, "411 001");
        assert_eq!(api.calls.load(Ordering::SeqCst), 0);
        // Outbound numeric text still translates
        assert_eq!(gw.translate("2", "en", "hi").await, "[t]2");
    }

    #[tokio::test(start_paused = true)]
    async fn retries_then_succeeds() {
        let (gw, api) = gateway(2);
        assert_eq!(gw.translate("hello", "hi", "en").await, "[t]hello");
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_original() {
        let (gw, api) = gateway(10);
        assert_eq!(gw.translate("hello", "hi", "en").await, "hello");
        assert_eq!(api.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn numeric_detection() {
        assert!(is_numeric_input("411001"));
        assert!(is_numeric_input("411-001"));
        assert!(is_numeric_input("+91 98765"));
        assert!(!is_numeric_input("411001 please"));
        assert!(!is_numeric_input(""));
    }
}
