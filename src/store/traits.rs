//! Unified `Database` trait — single async interface for all persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::DatabaseError;
use crate::session::{ConversationTurn, Session};
use crate::store::model::{AppChat, FarmerCrop, PeerChat, UserProfile};

/// A one-time passcode issued over SMS, valid until `expires_at`.
#[derive(Debug, Clone)]
pub struct OtpRecord {
    pub phone: String,
    pub code: String,
    pub expires_at: DateTime<Utc>,
}

/// Backend-agnostic database trait covering sessions, users, chats, and
/// crops.
#[async_trait]
pub trait Database: Send + Sync {
    /// Run all pending schema migrations.
    async fn run_migrations(&self) -> Result<(), DatabaseError>;

    // ── Sessions ────────────────────────────────────────────────────

    /// Get a session by its key, if one exists.
    async fn get_session(&self, key: &str) -> Result<Option<Session>, DatabaseError>;

    /// Insert or replace a session.
    async fn put_session(&self, key: &str, session: &Session) -> Result<(), DatabaseError>;

    /// Delete a session. Missing keys are not an error.
    async fn delete_session(&self, key: &str) -> Result<(), DatabaseError>;

    // ── Session history ─────────────────────────────────────────────

    /// Append a turn to a session's history.
    async fn append_turn(&self, key: &str, turn: &ConversationTurn) -> Result<(), DatabaseError>;

    /// List a session's history, oldest first.
    async fn get_history(&self, key: &str) -> Result<Vec<ConversationTurn>, DatabaseError>;

    /// Move a session's history into the archive and clear the live
    /// rows. Returns the number of turns archived.
    async fn archive_history(&self, key: &str) -> Result<usize, DatabaseError>;

    // ── Users ───────────────────────────────────────────────────────

    /// Get a user by phone number.
    async fn get_user(&self, phone: &str) -> Result<Option<UserProfile>, DatabaseError>;

    /// Insert or update a user profile.
    async fn upsert_user(&self, user: &UserProfile) -> Result<(), DatabaseError>;

    /// Fetch the user for `phone`, creating a bare profile on first
    /// contact.
    async fn ensure_user(&self, phone: &str) -> Result<UserProfile, DatabaseError>;

    /// Bump a user's last-seen timestamp.
    async fn touch_user(&self, phone: &str) -> Result<(), DatabaseError>;

    /// Store the coordinates geocoded for a user during onboarding.
    async fn set_user_coordinates(
        &self,
        phone: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), DatabaseError>;

    // ── App chats ───────────────────────────────────────────────────

    /// Get a titled chat thread for a user.
    async fn get_app_chat(
        &self,
        phone: &str,
        title: &str,
    ) -> Result<Option<AppChat>, DatabaseError>;

    /// Insert or replace a chat thread.
    async fn save_app_chat(&self, chat: &AppChat) -> Result<(), DatabaseError>;

    /// List a user's chat titles, most recently updated first.
    async fn list_chat_titles(&self, phone: &str) -> Result<Vec<String>, DatabaseError>;

    // ── Crops ───────────────────────────────────────────────────────

    /// Register a crop for a farmer.
    async fn insert_crop(&self, crop: &FarmerCrop) -> Result<(), DatabaseError>;

    /// List a farmer's registered crops, newest first.
    async fn list_crops(&self, phone: &str) -> Result<Vec<FarmerCrop>, DatabaseError>;

    // ── Peer chats ──────────────────────────────────────────────────

    /// Find the thread between two phones, if one exists. Participant
    /// order does not matter.
    async fn find_peer_chat(&self, a: &str, b: &str) -> Result<Option<PeerChat>, DatabaseError>;

    /// Insert or replace a peer chat thread.
    async fn save_peer_chat(&self, chat: &PeerChat) -> Result<(), DatabaseError>;

    /// List all peer threads a phone participates in.
    async fn list_peer_chats(&self, phone: &str) -> Result<Vec<PeerChat>, DatabaseError>;

    // ── OTP ─────────────────────────────────────────────────────────

    /// Store a one-time passcode, replacing any previous one for the
    /// phone.
    async fn put_otp(&self, record: &OtpRecord) -> Result<(), DatabaseError>;

    /// Get the current passcode for a phone, expired or not.
    async fn get_otp(&self, phone: &str) -> Result<Option<OtpRecord>, DatabaseError>;

    /// Delete the passcode for a phone.
    async fn delete_otp(&self, phone: &str) -> Result<(), DatabaseError>;
}
