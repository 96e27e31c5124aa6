//! WhatsApp channel — Twilio inbound webhook returning TwiML.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    routing::post,
    Form, Router,
};
use serde::Deserialize;
use tracing::info;

use crate::channels::twiml;
use crate::engine::Assistant;

pub const CHANNEL_NAME: &str = "whatsapp";

/// Twilio's form-encoded webhook payload. Only the fields we read.
#[derive(Debug, Deserialize)]
pub struct WhatsAppInbound {
    #[serde(rename = "Body", default)]
    pub body: String,
    #[serde(rename = "From", default)]
    pub from: String,
}

/// Strip Twilio's `whatsapp:` prefix from the sender address.
fn normalize_phone(from: &str) -> &str {
    from.strip_prefix("whatsapp:").unwrap_or(from)
}

#[derive(Clone)]
struct WhatsAppState {
    assistant: Arc<Assistant>,
}

/// Build the WhatsApp webhook router.
pub fn router(assistant: Arc<Assistant>) -> Router {
    Router::new()
        .route("/webhook/whatsapp", post(inbound))
        .with_state(WhatsAppState { assistant })
}

async fn inbound(
    State(state): State<WhatsAppState>,
    Form(payload): Form<WhatsAppInbound>,
) -> impl IntoResponse {
    let phone = normalize_phone(&payload.from).to_string();
    info!(phone = %phone, "WhatsApp message received");

    let reply = state
        .assistant
        .handle_turn(CHANNEL_NAME, &phone, &payload.body)
        .await;

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, "application/xml")],
        twiml::message_response(&reply.text),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whatsapp_prefix() {
        assert_eq!(normalize_phone("whatsapp:+919999999999"), "+919999999999");
        assert_eq!(normalize_phone("+919999999999"), "+919999999999");
    }
}
