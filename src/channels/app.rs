//! Mobile app channel — JSON REST endpoints for profiles, OTP login,
//! titled chat threads, crops, and farmer-to-farmer chat.

use std::sync::Arc;

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::{Duration, Utc};
use rand::Rng;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, warn};
use uuid::Uuid;

use crate::agent::{ConfidenceGuardrail, QueryDispatcher};
use crate::session::{ConversationTurn, TurnRole};
use crate::store::{AppChat, AppTurn, Database, FarmerCrop, OtpRecord, PeerChat, UserProfile};
use crate::tools::ToolContext;
use crate::translate::Translator;

/// How long a login passcode stays valid.
const OTP_TTL_SECS: i64 = 300;

/// Shared state for the app router.
#[derive(Clone)]
pub struct AppContext {
    pub db: Arc<dyn Database>,
    pub translator: Arc<dyn Translator>,
    pub dispatcher: Arc<dyn QueryDispatcher>,
    pub guardrail: Arc<ConfidenceGuardrail>,
}

/// Build the mobile app REST router.
pub fn router(ctx: AppContext) -> Router {
    Router::new()
        .route("/api/users", post(create_user))
        .route("/api/users/check", post(check_user))
        .route("/api/users/by-phone", post(user_by_phone))
        .route("/api/otp", post(request_otp))
        .route("/api/otp/verify", post(verify_otp))
        .route("/api/chat", post(chat).get(get_chat))
        .route("/api/chat/titles", get(chat_titles))
        .route("/api/crops", post(add_crop).get(list_crops))
        .route("/api/peer-chat", post(send_peer_message))
        .route("/api/peer-chats", get(list_peer_chats))
        .with_state(ctx)
}

fn internal_error(e: impl std::fmt::Display) -> (StatusCode, Json<serde_json::Value>) {
    warn!(error = %e, "App API request failed");
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(json!({ "success": false, "error": e.to_string() })),
    )
}

// ── Users ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CreateUserRequest {
    phone: String,
    name: Option<String>,
    village: Option<String>,
    district: Option<String>,
    state: Option<String>,
    #[serde(default)]
    language: Option<String>,
}

async fn create_user(
    State(ctx): State<AppContext>,
    Json(req): Json<CreateUserRequest>,
) -> impl IntoResponse {
    let mut user = UserProfile::new(&req.phone);
    user.name = req.name;
    user.village = req.village;
    user.district = req.district;
    user.state = req.state;
    if let Some(lang) = req.language {
        user.preferred_language = lang;
    }

    match ctx.db.upsert_user(&user).await {
        Ok(()) => {
            info!(phone = %user.phone, "App user registered");
            (
                StatusCode::CREATED,
                Json(json!({ "success": true, "data": user })),
            )
        }
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct PhoneRequest {
    // The app login screen posts the phone as `sender`.
    #[serde(alias = "sender")]
    phone: String,
}

async fn check_user(
    State(ctx): State<AppContext>,
    Json(req): Json<PhoneRequest>,
) -> impl IntoResponse {
    match ctx.db.get_user(&req.phone).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": user })),
        ),
        Ok(None) => (
            StatusCode::OK,
            Json(json!({ "success": false, "error": "User not found" })),
        ),
        Err(e) => internal_error(e),
    }
}

async fn user_by_phone(
    State(ctx): State<AppContext>,
    Json(req): Json<PhoneRequest>,
) -> impl IntoResponse {
    match ctx.db.get_user(&req.phone).await {
        Ok(Some(user)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": user })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "data": null })),
        ),
        Err(e) => internal_error(e),
    }
}

// ── OTP ─────────────────────────────────────────────────────────────────

fn generate_code() -> String {
    let mut rng = rand::thread_rng();
    (0..6).map(|_| rng.gen_range(0..10).to_string()).collect()
}

async fn request_otp(
    State(ctx): State<AppContext>,
    Json(req): Json<PhoneRequest>,
) -> impl IntoResponse {
    // Reuse an unexpired code so rapid retries do not invalidate the
    // SMS already in flight.
    let existing = match ctx.db.get_otp(&req.phone).await {
        Ok(record) => record.filter(|r| r.expires_at > Utc::now()),
        Err(e) => return internal_error(e),
    };

    let record = match existing {
        Some(record) => record,
        None => {
            let record = OtpRecord {
                phone: req.phone.clone(),
                code: generate_code(),
                expires_at: Utc::now() + Duration::seconds(OTP_TTL_SECS),
            };
            if let Err(e) = ctx.db.put_otp(&record).await {
                return internal_error(e);
            }
            record
        }
    };

    // SMS delivery is out of process; the code is surfaced in logs for
    // the gateway worker.
    info!(phone = %record.phone, code = %record.code, "OTP issued");

    (StatusCode::OK, Json(json!({ "success": true })))
}

#[derive(Debug, Deserialize)]
struct VerifyOtpRequest {
    #[serde(alias = "sender")]
    phone: String,
    code: String,
}

async fn verify_otp(
    State(ctx): State<AppContext>,
    Json(req): Json<VerifyOtpRequest>,
) -> impl IntoResponse {
    let record = match ctx.db.get_otp(&req.phone).await {
        Ok(record) => record,
        Err(e) => return internal_error(e),
    };

    let valid = record
        .as_ref()
        .is_some_and(|r| r.expires_at > Utc::now() && r.code == req.code);

    if valid {
        if let Err(e) = ctx.db.delete_otp(&req.phone).await {
            return internal_error(e);
        }
        (StatusCode::OK, Json(json!({ "success": true })))
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "success": false, "error": "Invalid or expired code" })),
        )
    }
}

// ── Chat ────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct ChatRequest {
    phone: String,
    #[serde(default)]
    title: String,
    message: String,
}

fn app_turn(role: &str, text: &str) -> AppTurn {
    AppTurn {
        role: role.to_string(),
        text: text.to_string(),
        timestamp: Utc::now(),
    }
}

/// Rebuild agent context from the English shadow history.
fn shadow_history(turns_en: &[AppTurn]) -> Vec<ConversationTurn> {
    turns_en
        .iter()
        .map(|t| ConversationTurn {
            role: if t.role == "user" {
                TurnRole::User
            } else {
                TurnRole::Bot
            },
            text: t.text.clone(),
            timestamp: t.timestamp,
        })
        .collect()
}

async fn chat(State(ctx): State<AppContext>, Json(req): Json<ChatRequest>) -> impl IntoResponse {
    let message = req.message.trim();
    if message.is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(json!({ "success": false, "error": "Message is required" })),
        );
    }

    let user = match ctx.db.ensure_user(&req.phone).await {
        Ok(user) => user,
        Err(e) => return internal_error(e),
    };
    let lang = user.preferred_language.clone();

    let mut thread = match ctx.db.get_app_chat(&req.phone, &req.title).await {
        Ok(Some(thread)) => thread,
        Ok(None) => AppChat::new(&req.phone, &req.title),
        Err(e) => return internal_error(e),
    };

    // The agent runs in English against the shadow history; the
    // display thread keeps the user's language.
    let message_en = ctx.translator.translate(message, &lang, "en").await;
    let history = shadow_history(&thread.turns_en);
    // Coordinates come from the profile; onboarding on any channel
    // fills them in, and the weather tool needs them.
    let tool_ctx = ToolContext {
        phone: req.phone.clone(),
        latitude: user.latitude,
        longitude: user.longitude,
    };
    let answer_en = ctx.dispatcher.dispatch(&message_en, &history, &tool_ctx).await;
    let answer_en = ctx.guardrail.review(&message_en, &answer_en).await;
    let answer = ctx.translator.translate(&answer_en, "en", &lang).await;

    thread.turns.push(app_turn("user", message));
    thread.turns.push(app_turn("bot", &answer));
    thread.turns_en.push(app_turn("user", &message_en));
    thread.turns_en.push(app_turn("bot", &answer_en));
    thread.updated_at = Utc::now();

    if let Err(e) = ctx.db.save_app_chat(&thread).await {
        return internal_error(e);
    }
    if let Err(e) = ctx.db.touch_user(&req.phone).await {
        return internal_error(e);
    }

    (
        StatusCode::OK,
        Json(json!({ "success": true, "reply": answer, "title": thread.title })),
    )
}

#[derive(Debug, Deserialize)]
struct ChatQuery {
    phone: String,
    #[serde(default)]
    title: String,
}

async fn get_chat(
    State(ctx): State<AppContext>,
    Query(query): Query<ChatQuery>,
) -> impl IntoResponse {
    match ctx.db.get_app_chat(&query.phone, &query.title).await {
        Ok(Some(thread)) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": thread.turns })),
        ),
        Ok(None) => (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Chat not found" })),
        ),
        Err(e) => internal_error(e),
    }
}

#[derive(Debug, Deserialize)]
struct PhoneQuery {
    phone: String,
}

async fn chat_titles(
    State(ctx): State<AppContext>,
    Query(query): Query<PhoneQuery>,
) -> impl IntoResponse {
    match ctx.db.list_chat_titles(&query.phone).await {
        Ok(titles) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": titles })),
        ),
        Err(e) => internal_error(e),
    }
}

// ── Crops ───────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct AddCropRequest {
    phone: String,
    crop_name: String,
    #[serde(default)]
    crop_price: f64,
    #[serde(default)]
    quantity: f64,
    #[serde(default = "default_unit")]
    unit: String,
    #[serde(default)]
    description: String,
}

fn default_unit() -> String {
    "kg".to_string()
}

async fn add_crop(
    State(ctx): State<AppContext>,
    Json(req): Json<AddCropRequest>,
) -> impl IntoResponse {
    if ctx.db.get_user(&req.phone).await.ok().flatten().is_none() {
        return (
            StatusCode::NOT_FOUND,
            Json(json!({ "success": false, "error": "Farmer with this phone does not exist" })),
        );
    }

    let crop = FarmerCrop {
        id: Uuid::new_v4(),
        phone: req.phone,
        crop_name: req.crop_name,
        crop_price: req.crop_price,
        quantity: req.quantity,
        unit: req.unit,
        description: req.description,
        is_available: true,
        created_at: Utc::now(),
    };

    match ctx.db.insert_crop(&crop).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "data": crop })),
        ),
        Err(e) => internal_error(e),
    }
}

async fn list_crops(
    State(ctx): State<AppContext>,
    Query(query): Query<PhoneQuery>,
) -> impl IntoResponse {
    match ctx.db.list_crops(&query.phone).await {
        Ok(crops) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": crops })),
        ),
        Err(e) => internal_error(e),
    }
}

// ── Peer chat ───────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct PeerMessageRequest {
    from: String,
    to: String,
    message: String,
}

async fn send_peer_message(
    State(ctx): State<AppContext>,
    Json(req): Json<PeerMessageRequest>,
) -> impl IntoResponse {
    let mut thread = match ctx.db.find_peer_chat(&req.from, &req.to).await {
        Ok(Some(thread)) => thread,
        Ok(None) => {
            let (phone_a, phone_b) = PeerChat::canonical_pair(&req.from, &req.to);
            PeerChat {
                id: Uuid::new_v4(),
                phone_a,
                phone_b,
                turns: Vec::new(),
                updated_at: Utc::now(),
            }
        }
        Err(e) => return internal_error(e),
    };

    // Role records the sender so either side can render the thread.
    thread.turns.push(app_turn(&req.from, &req.message));
    thread.updated_at = Utc::now();

    match ctx.db.save_peer_chat(&thread).await {
        Ok(()) => (
            StatusCode::CREATED,
            Json(json!({ "success": true, "data": thread })),
        ),
        Err(e) => internal_error(e),
    }
}

async fn list_peer_chats(
    State(ctx): State<AppContext>,
    Query(query): Query<PhoneQuery>,
) -> impl IntoResponse {
    match ctx.db.list_peer_chats(&query.phone).await {
        Ok(threads) => (
            StatusCode::OK,
            Json(json!({ "success": true, "data": threads })),
        ),
        Err(e) => internal_error(e),
    }
}
