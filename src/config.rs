//! Configuration types and the static language table.

use std::time::Duration;

/// A language a caller can pick from the onboarding menu.
///
/// `choice` is the numeric menu code, `code` the ISO 639-1 code used for
/// translation, `voice` the Twilio voice locale for the voice channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SupportedLanguage {
    pub choice: &'static str,
    pub code: &'static str,
    pub name: &'static str,
    pub voice: &'static str,
}

/// Languages offered during onboarding. Immutable after startup; safe for
/// unrestricted concurrent reads.
pub const SUPPORTED_LANGUAGES: &[SupportedLanguage] = &[
    SupportedLanguage {
        choice: "1",
        code: "en",
        name: "English",
        voice: "en-US",
    },
    SupportedLanguage {
        choice: "2",
        code: "hi",
        name: "हिन्दी (Hindi)",
        voice: "hi-IN",
    },
    SupportedLanguage {
        choice: "3",
        code: "mr",
        name: "मराठी (Marathi)",
        voice: "mr-IN",
    },
    SupportedLanguage {
        choice: "4",
        code: "ta",
        name: "தமிழ் (Tamil)",
        voice: "ta-IN",
    },
    SupportedLanguage {
        choice: "5",
        code: "te",
        name: "తెలుగు (Telugu)",
        voice: "te-IN",
    },
    SupportedLanguage {
        choice: "6",
        code: "kn",
        name: "ಕನ್ನಡ (Kannada)",
        voice: "kn-IN",
    },
];

/// Look up a language by its numeric menu choice (exact match only).
pub fn language_for_choice(choice: &str) -> Option<&'static SupportedLanguage> {
    SUPPORTED_LANGUAGES.iter().find(|l| l.choice == choice)
}

/// Voice locale for an ISO language code, defaulting to en-US.
pub fn voice_locale(code: &str) -> &'static str {
    SUPPORTED_LANGUAGES
        .iter()
        .find(|l| l.code == code)
        .map(|l| l.voice)
        .unwrap_or("en-US")
}

/// Assistant configuration.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    /// Assistant name for identification.
    pub name: String,
    /// Maximum LLM→tool→LLM round trips per dispatched query.
    pub max_tool_iterations: usize,
    /// Hard cap on reply length after the confidence guardrail.
    pub max_reply_chars: usize,
    /// Per-request timeout applied to outbound HTTP clients.
    pub http_timeout: Duration,
    /// Forecast horizon requested from the weather API.
    pub forecast_days: u8,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            name: "krishi-assist".to_string(),
            max_tool_iterations: 4,
            max_reply_chars: 1000,
            http_timeout: Duration::from_secs(15),
            forecast_days: 5,
        }
    }
}
