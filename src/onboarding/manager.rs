//! Onboarding manager — drives a session through the conversation
//! state machine and hands finished sessions to the query dispatcher.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::agent::QueryDispatcher;
use crate::geo::Geocoder;
use crate::llm::Classifier;
use crate::onboarding::prompts;
use crate::session::{
    AddressDetails, ConversationTurn, FailureOutcome, Session, SessionState,
};
use crate::tools::ToolContext;

const EXIT_COMMANDS: &[&str] = &["exit", "quit", "bye", "goodbye", "stop"];
const HELP_COMMANDS: &[&str] = &["help", "menu", "options"];

/// What a processed turn produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnOutcome {
    /// Normal reply; the conversation continues.
    Reply(String),
    /// The caller ended the conversation; reply then reset the session.
    Exit(String),
}

impl TurnOutcome {
    pub fn text(&self) -> &str {
        match self {
            Self::Reply(text) | Self::Exit(text) => text,
        }
    }
}

static DIGIT_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[0-9]+").unwrap());

/// Extract a six-digit pincode, tolerating spaces and hyphens inside
/// the digits. Runs of any other length are rejected.
fn find_pincode(text: &str) -> Option<String> {
    let squeezed: String = text.chars().filter(|c| *c != ' ' && *c != '-').collect();
    DIGIT_RUN
        .find_iter(&squeezed)
        .find(|m| m.as_str().len() == 6)
        .map(|m| m.as_str().to_string())
}

fn has_any_field(details: &AddressDetails) -> bool {
    details.state.is_some()
        || details.district.is_some()
        || details.city.is_some()
        || details.village.is_some()
}

pub struct OnboardingManager {
    classifier: Arc<dyn Classifier>,
    geocoder: Arc<dyn Geocoder>,
    dispatcher: Arc<dyn QueryDispatcher>,
}

impl OnboardingManager {
    pub fn new(
        classifier: Arc<dyn Classifier>,
        geocoder: Arc<dyn Geocoder>,
        dispatcher: Arc<dyn QueryDispatcher>,
    ) -> Self {
        Self {
            classifier,
            geocoder,
            dispatcher,
        }
    }

    /// Process one English-language turn. `history` is the session's
    /// prior conversation, oldest first; `phone` identifies the caller.
    pub async fn process(
        &self,
        text: &str,
        session: &mut Session,
        phone: &str,
        history: &[ConversationTurn],
    ) -> TurnOutcome {
        let command = text.trim().to_lowercase();

        // Universal overrides apply in every state
        if EXIT_COMMANDS.contains(&command.as_str()) {
            return TurnOutcome::Exit(prompts::FAREWELL.to_string());
        }
        if HELP_COMMANDS.contains(&command.as_str()) {
            return TurnOutcome::Reply(prompts::HELP_MENU.to_string());
        }

        let reply = match session.state {
            SessionState::None => self.handle_initial(text, session).await,
            SessionState::AwaitingGreetingAck => {
                session.advance(SessionState::AwaitingLanguageChoice);
                prompts::language_menu()
            }
            SessionState::AwaitingLanguageChoice => self.handle_language_choice(text, session),
            SessionState::AwaitingPinCode => self.handle_pincode(text, session),
            SessionState::AwaitingAddress => self.handle_address(text, session).await,
            SessionState::AwaitingProblemType => {
                let ctx = ToolContext {
                    phone: phone.to_string(),
                    latitude: session.latitude,
                    longitude: session.longitude,
                };
                self.dispatcher.dispatch(text, history, &ctx).await
            }
        };
        TurnOutcome::Reply(reply)
    }

    async fn handle_initial(&self, text: &str, session: &mut Session) -> String {
        // A failed classification is treated as a direct question, which
        // still lands the caller on the language menu.
        let is_greeting = match self.classifier.is_greeting(text).await {
            Ok(flag) => flag,
            Err(e) => {
                warn!(error = %e, "Greeting classification failed");
                false
            }
        };

        if is_greeting {
            session.advance(SessionState::AwaitingGreetingAck);
            prompts::INTRO_TEXT.to_string()
        } else {
            session.advance(SessionState::AwaitingLanguageChoice);
            prompts::welcome_with_menu()
        }
    }

    fn handle_language_choice(&self, text: &str, session: &mut Session) -> String {
        let choice = text.trim();
        if let Some(lang) = crate::config::language_for_choice(choice) {
            session.lang = lang.code.to_string();
            session.advance(SessionState::AwaitingPinCode);
            debug!(lang = lang.code, "Language selected");
            return prompts::language_set(lang.name);
        }

        match session.register_failure() {
            FailureOutcome::SkippedTo(_) => {
                session.lang = "en".to_string();
                prompts::LANGUAGE_SKIPPED.to_string()
            }
            FailureOutcome::Retry => prompts::invalid_language_choice(),
        }
    }

    fn handle_pincode(&self, text: &str, session: &mut Session) -> String {
        if let Some(pincode) = find_pincode(text) {
            session.pincode = Some(pincode);
            session.advance(SessionState::AwaitingAddress);
            return prompts::PINCODE_SAVED.to_string();
        }

        match session.register_failure() {
            FailureOutcome::SkippedTo(_) => prompts::PINCODE_SKIPPED.to_string(),
            FailureOutcome::Retry => prompts::invalid_pincode(session.retry_count),
        }
    }

    async fn handle_address(&self, text: &str, session: &mut Session) -> String {
        let details = match self.classifier.extract_address(text).await {
            Ok(details) => details,
            Err(e) => {
                // Extraction errors skip the step outright rather than
                // burning the caller's retries on our failure.
                warn!(error = %e, "Address extraction failed, skipping step");
                session.advance(SessionState::AwaitingProblemType);
                return prompts::ADDRESS_SKIPPED.to_string();
            }
        };

        if !has_any_field(&details) {
            return match session.register_failure() {
                FailureOutcome::SkippedTo(_) => prompts::ADDRESS_SKIPPED.to_string(),
                FailureOutcome::Retry => prompts::ADDRESS_INCOMPLETE.to_string(),
            };
        }

        match self.geocoder.geocode(text).await {
            Ok(Some(point)) => {
                session.latitude = Some(point.latitude);
                session.longitude = Some(point.longitude);
                let reply = prompts::address_saved(
                    details.state.as_deref(),
                    details.district.as_deref(),
                    details.city.as_deref(),
                );
                session.address = details;
                session.advance(SessionState::AwaitingProblemType);
                reply
            }
            Ok(None) => match session.register_failure() {
                FailureOutcome::SkippedTo(_) => prompts::ADDRESS_NOT_FOUND_SKIPPED.to_string(),
                FailureOutcome::Retry => prompts::ADDRESS_NOT_FOUND.to_string(),
            },
            Err(e) => {
                warn!(error = %e, "Geocoding failed, skipping step");
                session.advance(SessionState::AwaitingProblemType);
                prompts::ADDRESS_SKIPPED.to_string()
            }
        }
    }
}
