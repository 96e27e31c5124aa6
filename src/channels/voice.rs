//! Voice channel — Twilio voice webhook with Gather-based turns.
//!
//! The menu states collect DTMF digits; once onboarding reaches free
//! text the call switches to speech gathering in the caller's locale.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::IntoResponse,
    routing::get,
    Form, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::channels::twiml;
use crate::config::voice_locale;
use crate::engine::{Assistant, TurnReply};
use crate::session::SessionState;

pub const CHANNEL_NAME: &str = "voice";

#[derive(Debug, Deserialize)]
pub struct VoiceInbound {
    #[serde(rename = "From", default)]
    pub from: String,
    #[serde(rename = "SpeechResult", default)]
    pub speech_result: String,
    #[serde(rename = "Digits", default)]
    pub digits: String,
    #[serde(rename = "CallSid", default)]
    pub call_sid: String,
}

impl VoiceInbound {
    /// Digits win over speech when Twilio sends both.
    fn input(&self) -> &str {
        if !self.digits.trim().is_empty() {
            &self.digits
        } else {
            &self.speech_result
        }
    }
}

/// Render the reply as TwiML appropriate for where the session is.
fn render_reply(reply: &TurnReply) -> String {
    let locale = voice_locale(&reply.lang);
    if reply.ended {
        return twiml::say_hangup_response(&reply.text, locale);
    }
    match reply.state {
        // Menu states take single-digit answers
        SessionState::None
        | SessionState::AwaitingGreetingAck
        | SessionState::AwaitingLanguageChoice => twiml::gather_digits_response(&reply.text, locale),
        _ => twiml::gather_speech_response(&reply.text, locale),
    }
}

#[derive(Clone)]
struct VoiceState {
    assistant: Arc<Assistant>,
}

/// Build the voice webhook router. Twilio sends GET or POST depending
/// on the number's configuration, so both are accepted.
pub fn router(assistant: Arc<Assistant>) -> Router {
    Router::new()
        .route("/webhook/voice", get(inbound_query).post(inbound_form))
        .with_state(VoiceState { assistant })
}

async fn inbound_form(
    State(state): State<VoiceState>,
    Form(payload): Form<VoiceInbound>,
) -> impl IntoResponse {
    inbound(state, payload).await
}

async fn inbound_query(
    State(state): State<VoiceState>,
    Query(payload): Query<VoiceInbound>,
) -> impl IntoResponse {
    inbound(state, payload).await
}

async fn inbound(state: VoiceState, payload: VoiceInbound) -> impl IntoResponse {
    info!(phone = %payload.from, call_sid = %payload.call_sid, "Voice webhook");

    let input = payload.input();
    let reply = if input.trim().is_empty() {
        // Call start (or silence): greet without consuming a turn
        let session = state
            .assistant
            .session_snapshot(CHANNEL_NAME, &payload.from)
            .await
            .unwrap_or_default();
        let locale = voice_locale(&session.lang);
        let prompt = crate::onboarding::prompts::voice_language_menu();
        return (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/xml")],
            twiml::gather_digits_response(&prompt, locale),
        );
    } else {
        state
            .assistant
            .handle_turn(CHANNEL_NAME, &payload.from, input)
            .await
    };

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        render_reply(&reply),
    )
}
