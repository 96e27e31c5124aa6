//! End-to-end conversation turns through the engine with an in-memory
//! database and scripted service doubles.

use std::sync::Arc;

use async_trait::async_trait;

use krishi_assist::agent::QueryDispatcher;
use krishi_assist::config::AssistantConfig;
use krishi_assist::engine::Assistant;
use krishi_assist::error::{GeoError, LlmError};
use krishi_assist::geo::{GeoPoint, Geocoder};
use krishi_assist::llm::Classifier;
use krishi_assist::onboarding::{prompts, OnboardingManager};
use krishi_assist::session::{AddressDetails, ConversationTurn, SessionState};
use krishi_assist::store::{Database, LibSqlBackend};
use krishi_assist::tools::ToolContext;
use krishi_assist::translate::Translator;

struct StubClassifier;

#[async_trait]
impl Classifier for StubClassifier {
    async fn is_greeting(&self, text: &str) -> Result<bool, LlmError> {
        let t = text.trim().to_lowercase();
        Ok(t == "hi" || t == "hello")
    }

    async fn extract_address(&self, text: &str) -> Result<AddressDetails, LlmError> {
        // Comma-separated input stands in for a parseable address.
        if text.contains(',') {
            Ok(AddressDetails {
                state: Some("Maharashtra".to_string()),
                district: Some("Pune".to_string()),
                city: Some("Pune".to_string()),
                village: None,
            })
        } else {
            Ok(AddressDetails::default())
        }
    }
}

struct StubGeocoder {
    found: bool,
}

#[async_trait]
impl Geocoder for StubGeocoder {
    async fn geocode(&self, _query: &str) -> Result<Option<GeoPoint>, GeoError> {
        Ok(self.found.then_some(GeoPoint {
            latitude: 18.52,
            longitude: 73.85,
        }))
    }
}

struct EchoDispatcher;

#[async_trait]
impl QueryDispatcher for EchoDispatcher {
    async fn dispatch(
        &self,
        utterance: &str,
        _history: &[ConversationTurn],
        _ctx: &ToolContext,
    ) -> String {
        format!("echo: {utterance}")
    }
}

struct PassThrough;

#[async_trait]
impl Translator for PassThrough {
    async fn translate(&self, text: &str, _source: &str, _target: &str) -> String {
        text.to_string()
    }
}

async fn assistant_with_db(geocoder_found: bool) -> (Assistant, Arc<dyn Database>) {
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_memory()
            .await
            .expect("in-memory db should open"),
    );

    let onboarding = OnboardingManager::new(
        Arc::new(StubClassifier),
        Arc::new(StubGeocoder {
            found: geocoder_found,
        }),
        Arc::new(EchoDispatcher),
    );

    let bot = Assistant::new(
        AssistantConfig::default(),
        db.clone(),
        Arc::new(PassThrough),
        onboarding,
    );
    (bot, db)
}

async fn assistant(geocoder_found: bool) -> Assistant {
    assistant_with_db(geocoder_found).await.0
}

const PHONE: &str = "+919876543210";

/// Walk a fresh session through greeting, language, pincode, and
/// address so tests can start from a later state.
async fn onboard_to_pincode(bot: &Assistant) {
    bot.handle_turn("whatsapp", PHONE, "hi").await;
    bot.handle_turn("whatsapp", PHONE, "ok").await;
    let reply = bot.handle_turn("whatsapp", PHONE, "1").await;
    assert_eq!(reply.state, SessionState::AwaitingPinCode);
}

#[tokio::test]
async fn greeting_starts_onboarding() {
    let bot = assistant(true).await;

    let reply = bot.handle_turn("whatsapp", PHONE, "hi").await;
    assert_eq!(reply.text, prompts::INTRO_TEXT);
    assert_eq!(reply.state, SessionState::AwaitingGreetingAck);
    assert!(!reply.ended);

    let reply = bot.handle_turn("whatsapp", PHONE, "ok").await;
    assert_eq!(reply.text, prompts::language_menu());
    assert_eq!(reply.state, SessionState::AwaitingLanguageChoice);
}

#[tokio::test]
async fn non_greeting_first_message_skips_intro() {
    let bot = assistant(true).await;

    let reply = bot.handle_turn("whatsapp", PHONE, "what is wheat price").await;
    assert_eq!(reply.text, prompts::welcome_with_menu());
    assert_eq!(reply.state, SessionState::AwaitingLanguageChoice);
}

#[tokio::test]
async fn language_choice_sets_lang_but_replies_in_turn_start_language() {
    let bot = assistant(true).await;
    bot.handle_turn("whatsapp", PHONE, "hi").await;
    bot.handle_turn("whatsapp", PHONE, "ok").await;

    let reply = bot.handle_turn("whatsapp", PHONE, "2").await;
    assert_eq!(reply.state, SessionState::AwaitingPinCode);
    // The reply to the choosing turn still goes out in the language
    // that was in effect when the turn arrived.
    assert_eq!(reply.lang, "en");

    let session = bot.session_snapshot("whatsapp", PHONE).await.unwrap();
    assert_eq!(session.lang, "hi");
}

#[tokio::test]
async fn invalid_language_three_times_falls_back_to_english() {
    let bot = assistant(true).await;
    bot.handle_turn("whatsapp", PHONE, "hi").await;
    bot.handle_turn("whatsapp", PHONE, "ok").await;

    bot.handle_turn("whatsapp", PHONE, "9").await;
    bot.handle_turn("whatsapp", PHONE, "9").await;
    let reply = bot.handle_turn("whatsapp", PHONE, "9").await;

    assert_eq!(reply.text, prompts::LANGUAGE_SKIPPED);
    assert_eq!(reply.state, SessionState::AwaitingPinCode);

    let session = bot.session_snapshot("whatsapp", PHONE).await.unwrap();
    assert_eq!(session.lang, "en");
}

#[tokio::test]
async fn valid_pincode_advances_to_address() {
    let bot = assistant(true).await;
    onboard_to_pincode(&bot).await;

    let reply = bot.handle_turn("whatsapp", PHONE, "my pin is 411 001").await;
    assert_eq!(reply.text, prompts::PINCODE_SAVED);
    assert_eq!(reply.state, SessionState::AwaitingAddress);

    let session = bot.session_snapshot("whatsapp", PHONE).await.unwrap();
    assert_eq!(session.pincode.as_deref(), Some("411001"));
}

#[tokio::test]
async fn invalid_pincode_three_times_skips_to_questions() {
    let bot = assistant(true).await;
    onboard_to_pincode(&bot).await;

    let reply = bot.handle_turn("whatsapp", PHONE, "no idea").await;
    assert_eq!(reply.text, prompts::invalid_pincode(1));
    bot.handle_turn("whatsapp", PHONE, "still no").await;
    let reply = bot.handle_turn("whatsapp", PHONE, "nope").await;

    assert_eq!(reply.text, prompts::PINCODE_SKIPPED);
    assert_eq!(reply.state, SessionState::AwaitingProblemType);

    let session = bot.session_snapshot("whatsapp", PHONE).await.unwrap();
    assert!(session.pincode.is_none());
}

#[tokio::test]
async fn address_geocode_hit_stores_coordinates() {
    let bot = assistant(true).await;
    onboard_to_pincode(&bot).await;
    bot.handle_turn("whatsapp", PHONE, "411001").await;

    let reply = bot
        .handle_turn("whatsapp", PHONE, "Kothrud, Pune, Maharashtra")
        .await;
    assert_eq!(
        reply.text,
        prompts::address_saved(Some("Maharashtra"), Some("Pune"), Some("Pune")),
    );
    assert_eq!(reply.state, SessionState::AwaitingProblemType);

    let session = bot.session_snapshot("whatsapp", PHONE).await.unwrap();
    assert_eq!(session.latitude, Some(18.52));
    assert_eq!(session.longitude, Some(73.85));
}

#[tokio::test]
async fn completed_address_writes_coordinates_to_profile() {
    let (bot, db) = assistant_with_db(true).await;
    onboard_to_pincode(&bot).await;
    bot.handle_turn("whatsapp", PHONE, "411001").await;
    bot.handle_turn("whatsapp", PHONE, "Kothrud, Pune, Maharashtra")
        .await;

    // The profile keeps the geocoded point so other channels can use it.
    let user = db.get_user(PHONE).await.unwrap().unwrap();
    assert_eq!(user.latitude, Some(18.52));
    assert_eq!(user.longitude, Some(73.85));
}

#[tokio::test]
async fn address_geocode_miss_twice_skips_onward() {
    let bot = assistant(false).await;
    onboard_to_pincode(&bot).await;
    bot.handle_turn("whatsapp", PHONE, "411001").await;

    let reply = bot
        .handle_turn("whatsapp", PHONE, "Somewhere, Nowhere, Atlantis")
        .await;
    assert_eq!(reply.text, prompts::ADDRESS_NOT_FOUND);
    assert_eq!(reply.state, SessionState::AwaitingAddress);

    let reply = bot
        .handle_turn("whatsapp", PHONE, "Somewhere, Nowhere, Atlantis")
        .await;
    assert_eq!(reply.text, prompts::ADDRESS_NOT_FOUND_SKIPPED);
    assert_eq!(reply.state, SessionState::AwaitingProblemType);

    let session = bot.session_snapshot("whatsapp", PHONE).await.unwrap();
    assert!(session.latitude.is_none());
}

#[tokio::test]
async fn onboarded_session_dispatches_questions() {
    let bot = assistant(true).await;
    onboard_to_pincode(&bot).await;
    bot.handle_turn("whatsapp", PHONE, "411001").await;
    bot.handle_turn("whatsapp", PHONE, "Kothrud, Pune, Maharashtra")
        .await;

    let reply = bot.handle_turn("whatsapp", PHONE, "when should I sow wheat").await;
    assert_eq!(reply.text, "echo: when should I sow wheat");
    assert_eq!(reply.state, SessionState::AwaitingProblemType);

    // The state is absorbing.
    let reply = bot.handle_turn("whatsapp", PHONE, "and rice?").await;
    assert_eq!(reply.text, "echo: and rice?");
    assert_eq!(reply.state, SessionState::AwaitingProblemType);
}

#[tokio::test]
async fn exit_ends_and_archives_from_any_state() {
    let bot = assistant(true).await;
    onboard_to_pincode(&bot).await;
    bot.handle_turn("whatsapp", PHONE, "411001").await;

    let reply = bot.handle_turn("whatsapp", PHONE, "BYE").await;
    assert_eq!(reply.text, prompts::FAREWELL);
    assert!(reply.ended);
    assert_eq!(reply.state, SessionState::None);

    // The next contact starts from a fresh session.
    let session = bot.session_snapshot("whatsapp", PHONE).await.unwrap();
    assert_eq!(session.state, SessionState::None);
    let reply = bot.handle_turn("whatsapp", PHONE, "hi").await;
    assert_eq!(reply.text, prompts::INTRO_TEXT);
}

#[tokio::test]
async fn help_replies_without_losing_state() {
    let bot = assistant(true).await;
    onboard_to_pincode(&bot).await;

    let reply = bot.handle_turn("whatsapp", PHONE, "help").await;
    assert_eq!(reply.text, prompts::HELP_MENU);
    assert_eq!(reply.state, SessionState::AwaitingPinCode);
}

#[tokio::test]
async fn channels_have_independent_sessions() {
    let bot = assistant(true).await;
    bot.handle_turn("whatsapp", PHONE, "hi").await;

    let session = bot.session_snapshot("voice", PHONE).await.unwrap();
    assert_eq!(session.state, SessionState::None);
}
