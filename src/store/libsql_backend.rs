//! libSQL backend — async `Database` trait implementation.
//!
//! Supports local file and in-memory databases. Sessions and chat
//! threads are stored as JSON blobs; history rows are flat.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use libsql::{params, Connection, Database as LibSqlDatabase};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DatabaseError;
use crate::session::{ConversationTurn, Session, TurnRole};
use crate::store::migrations;
use crate::store::model::{AppChat, AppTurn, FarmerCrop, PeerChat, UserProfile};
use crate::store::traits::{Database, OtpRecord};

/// libSQL database backend.
///
/// Stores a single connection that is reused for all operations.
/// `libsql::Connection` is `Send + Sync` and safe for concurrent async use.
pub struct LibSqlBackend {
    #[allow(dead_code)]
    db: Arc<LibSqlDatabase>,
    conn: Connection,
}

impl LibSqlBackend {
    /// Open (or create) a local database file and run migrations.
    pub async fn new_local(path: &Path) -> Result<Self, DatabaseError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                DatabaseError::Pool(format!("Failed to create database directory: {e}"))
            })?;
        }

        let db = libsql::Builder::new_local(path)
            .build()
            .await
            .map_err(|e| DatabaseError::Pool(format!("Failed to open libSQL database: {e}")))?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        info!(path = %path.display(), "Database opened");
        Ok(backend)
    }

    /// Create an in-memory database (for tests).
    pub async fn new_memory() -> Result<Self, DatabaseError> {
        let db = libsql::Builder::new_local(":memory:")
            .build()
            .await
            .map_err(|e| {
                DatabaseError::Pool(format!("Failed to create in-memory database: {e}"))
            })?;

        let conn = db
            .connect()
            .map_err(|e| DatabaseError::Pool(format!("Failed to create connection: {e}")))?;

        let backend = Self {
            db: Arc::new(db),
            conn,
        };
        backend.run_migrations().await?;
        Ok(backend)
    }

    fn conn(&self) -> &Connection {
        &self.conn
    }
}

// ── Helper functions ────────────────────────────────────────────────

/// Parse an RFC 3339 or SQLite datetime string into DateTime<Utc>.
fn parse_datetime(s: &str) -> DateTime<Utc> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return dt.with_timezone(&Utc);
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S%.f") {
        return ndt.and_utc();
    }
    if let Ok(ndt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return ndt.and_utc();
    }
    DateTime::<Utc>::MIN_UTC
}

/// Convert `Option<&str>` to libsql Value.
fn opt_text(s: Option<&str>) -> libsql::Value {
    match s {
        Some(s) => libsql::Value::Text(s.to_string()),
        None => libsql::Value::Null,
    }
}

fn opt_real(v: Option<f64>) -> libsql::Value {
    match v {
        Some(v) => libsql::Value::Real(v),
        None => libsql::Value::Null,
    }
}

fn role_to_str(role: TurnRole) -> &'static str {
    match role {
        TurnRole::User => "user",
        TurnRole::Bot => "bot",
    }
}

fn str_to_role(s: &str) -> TurnRole {
    match s {
        "bot" => TurnRole::Bot,
        _ => TurnRole::User,
    }
}

/// Map a libsql Row to a UserProfile.
///
/// Column order matches USER_COLUMNS:
/// 0:phone, 1:name, 2:village, 3:district, 4:state,
/// 5:preferred_language, 6:latitude, 7:longitude,
/// 8:created_at, 9:last_seen_at
fn row_to_user(row: &libsql::Row) -> Result<UserProfile, libsql::Error> {
    let created_str: String = row.get(8)?;
    let seen_str: String = row.get(9)?;
    Ok(UserProfile {
        phone: row.get(0)?,
        name: row.get(1).ok(),
        village: row.get(2).ok(),
        district: row.get(3).ok(),
        state: row.get(4).ok(),
        preferred_language: row.get(5)?,
        latitude: row.get(6).ok(),
        longitude: row.get(7).ok(),
        created_at: parse_datetime(&created_str),
        last_seen_at: parse_datetime(&seen_str),
    })
}

fn row_to_crop(row: &libsql::Row) -> Result<FarmerCrop, libsql::Error> {
    let id_str: String = row.get(0)?;
    let available: i64 = row.get(7)?;
    let created_str: String = row.get(8)?;
    Ok(FarmerCrop {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        phone: row.get(1)?,
        crop_name: row.get(2)?,
        crop_price: row.get(3)?,
        quantity: row.get(4)?,
        unit: row.get(5)?,
        description: row.get(6)?,
        is_available: available != 0,
        created_at: parse_datetime(&created_str),
    })
}

fn parse_turns(json: &str) -> Vec<AppTurn> {
    serde_json::from_str(json).unwrap_or_default()
}

fn row_to_app_chat(row: &libsql::Row) -> Result<AppChat, libsql::Error> {
    let turns_str: String = row.get(2)?;
    let turns_en_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;
    Ok(AppChat {
        phone: row.get(0)?,
        title: row.get(1)?,
        turns: parse_turns(&turns_str),
        turns_en: parse_turns(&turns_en_str),
        updated_at: parse_datetime(&updated_str),
    })
}

fn row_to_peer_chat(row: &libsql::Row) -> Result<PeerChat, libsql::Error> {
    let id_str: String = row.get(0)?;
    let turns_str: String = row.get(3)?;
    let updated_str: String = row.get(4)?;
    Ok(PeerChat {
        id: Uuid::parse_str(&id_str).unwrap_or_else(|_| Uuid::nil()),
        phone_a: row.get(1)?,
        phone_b: row.get(2)?,
        turns: parse_turns(&turns_str),
        updated_at: parse_datetime(&updated_str),
    })
}

// ── Trait implementation ────────────────────────────────────────────

const USER_COLUMNS: &str = "phone, name, village, district, state, preferred_language, \
     latitude, longitude, created_at, last_seen_at";

const CROP_COLUMNS: &str =
    "id, phone, crop_name, crop_price, quantity, unit, description, is_available, created_at";

const APP_CHAT_COLUMNS: &str = "phone, title, turns, turns_en, updated_at";

const PEER_CHAT_COLUMNS: &str = "id, phone_a, phone_b, turns, updated_at";

#[async_trait]
impl Database for LibSqlBackend {
    async fn run_migrations(&self) -> Result<(), DatabaseError> {
        migrations::run_migrations(self.conn()).await
    }

    // ── Sessions ────────────────────────────────────────────────────

    async fn get_session(&self, key: &str) -> Result<Option<Session>, DatabaseError> {
        let conn = self.conn();
        let mut rows = conn
            .query("SELECT data FROM sessions WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("get_session: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let data: String = row
                    .get(0)
                    .map_err(|e| DatabaseError::Query(format!("get_session row: {e}")))?;
                let session = serde_json::from_str(&data)
                    .map_err(|e| DatabaseError::Serialization(format!("session decode: {e}")))?;
                Ok(Some(session))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_session: {e}"))),
        }
    }

    async fn put_session(&self, key: &str, session: &Session) -> Result<(), DatabaseError> {
        let data = serde_json::to_string(session)
            .map_err(|e| DatabaseError::Serialization(format!("session encode: {e}")))?;
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "INSERT INTO sessions (key, data, updated_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (key) DO UPDATE SET data = ?2, updated_at = ?3",
                params![key, data, now],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_session: {e}")))?;

        debug!(key, state = %session.state, "Session saved");
        Ok(())
    }

    async fn delete_session(&self, key: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM sessions WHERE key = ?1", params![key])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_session: {e}")))?;
        Ok(())
    }

    // ── Session history ─────────────────────────────────────────────

    async fn append_turn(&self, key: &str, turn: &ConversationTurn) -> Result<(), DatabaseError> {
        let id = Uuid::new_v4().to_string();
        self.conn()
            .execute(
                "INSERT INTO session_history (id, session_key, role, content, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    id,
                    key,
                    role_to_str(turn.role),
                    turn.text.as_str(),
                    turn.timestamp.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("append_turn: {e}")))?;
        Ok(())
    }

    async fn get_history(&self, key: &str) -> Result<Vec<ConversationTurn>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT role, content, created_at FROM session_history
                 WHERE session_key = ?1 ORDER BY created_at ASC, rowid ASC",
                params![key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_history: {e}")))?;

        let mut turns = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            let role_str: String = row.get(0).unwrap_or_default();
            let content: String = row.get(1).unwrap_or_default();
            let created_str: String = row.get(2).unwrap_or_default();
            turns.push(ConversationTurn {
                role: str_to_role(&role_str),
                text: content,
                timestamp: parse_datetime(&created_str),
            });
        }
        Ok(turns)
    }

    async fn archive_history(&self, key: &str) -> Result<usize, DatabaseError> {
        let conn = self.conn();
        let moved = conn
            .execute(
                "INSERT INTO archived_turns (id, session_key, role, content, created_at)
                 SELECT id, session_key, role, content, created_at
                 FROM session_history WHERE session_key = ?1",
                params![key],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("archive_history copy: {e}")))?;

        conn.execute(
            "DELETE FROM session_history WHERE session_key = ?1",
            params![key],
        )
        .await
        .map_err(|e| DatabaseError::Query(format!("archive_history clear: {e}")))?;

        if moved > 0 {
            debug!(key, count = moved, "History archived");
        }
        Ok(moved as usize)
    }

    // ── Users ───────────────────────────────────────────────────────

    async fn get_user(&self, phone: &str) -> Result<Option<UserProfile>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {USER_COLUMNS} FROM users WHERE phone = ?1"),
                params![phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_user: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let user = row_to_user(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_user row parse: {e}")))?;
                Ok(Some(user))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_user: {e}"))),
        }
    }

    async fn upsert_user(&self, user: &UserProfile) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO users (phone, name, village, district, state, preferred_language,
                                    latitude, longitude, created_at, last_seen_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
                 ON CONFLICT (phone) DO UPDATE SET
                    name = ?2, village = ?3, district = ?4, state = ?5,
                    preferred_language = ?6,
                    latitude = COALESCE(?7, latitude),
                    longitude = COALESCE(?8, longitude),
                    last_seen_at = ?10",
                params![
                    user.phone.as_str(),
                    opt_text(user.name.as_deref()),
                    opt_text(user.village.as_deref()),
                    opt_text(user.district.as_deref()),
                    opt_text(user.state.as_deref()),
                    user.preferred_language.as_str(),
                    opt_real(user.latitude),
                    opt_real(user.longitude),
                    user.created_at.to_rfc3339(),
                    user.last_seen_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("upsert_user: {e}")))?;
        Ok(())
    }

    async fn ensure_user(&self, phone: &str) -> Result<UserProfile, DatabaseError> {
        if let Some(user) = self.get_user(phone).await? {
            return Ok(user);
        }
        let user = UserProfile::new(phone);
        self.upsert_user(&user).await?;
        debug!(phone, "New user created");
        Ok(user)
    }

    async fn touch_user(&self, phone: &str) -> Result<(), DatabaseError> {
        let now = Utc::now().to_rfc3339();
        self.conn()
            .execute(
                "UPDATE users SET last_seen_at = ?1 WHERE phone = ?2",
                params![now, phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("touch_user: {e}")))?;
        Ok(())
    }

    async fn set_user_coordinates(
        &self,
        phone: &str,
        latitude: f64,
        longitude: f64,
    ) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "UPDATE users SET latitude = ?1, longitude = ?2 WHERE phone = ?3",
                params![latitude, longitude, phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("set_user_coordinates: {e}")))?;
        Ok(())
    }

    // ── App chats ───────────────────────────────────────────────────

    async fn get_app_chat(
        &self,
        phone: &str,
        title: &str,
    ) -> Result<Option<AppChat>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!("SELECT {APP_CHAT_COLUMNS} FROM app_chats WHERE phone = ?1 AND title = ?2"),
                params![phone, title],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_app_chat: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let chat = row_to_app_chat(&row)
                    .map_err(|e| DatabaseError::Query(format!("get_app_chat row parse: {e}")))?;
                Ok(Some(chat))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_app_chat: {e}"))),
        }
    }

    async fn save_app_chat(&self, chat: &AppChat) -> Result<(), DatabaseError> {
        let turns = serde_json::to_string(&chat.turns)
            .map_err(|e| DatabaseError::Serialization(format!("app chat turns: {e}")))?;
        let turns_en = serde_json::to_string(&chat.turns_en)
            .map_err(|e| DatabaseError::Serialization(format!("app chat turns_en: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO app_chats (phone, title, turns, turns_en, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (phone, title) DO UPDATE SET
                    turns = ?3, turns_en = ?4, updated_at = ?5",
                params![
                    chat.phone.as_str(),
                    chat.title.as_str(),
                    turns,
                    turns_en,
                    chat.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_app_chat: {e}")))?;
        Ok(())
    }

    async fn list_chat_titles(&self, phone: &str) -> Result<Vec<String>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT title FROM app_chats WHERE phone = ?1 ORDER BY updated_at DESC",
                params![phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_chat_titles: {e}")))?;

        let mut titles = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            if let Ok(title) = row.get::<String>(0) {
                titles.push(title);
            }
        }
        Ok(titles)
    }

    // ── Crops ───────────────────────────────────────────────────────

    async fn insert_crop(&self, crop: &FarmerCrop) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                &format!(
                    "INSERT INTO farmer_crops ({CROP_COLUMNS}) \
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)"
                ),
                params![
                    crop.id.to_string(),
                    crop.phone.as_str(),
                    crop.crop_name.as_str(),
                    crop.crop_price,
                    crop.quantity,
                    crop.unit.as_str(),
                    crop.description.as_str(),
                    crop.is_available as i64,
                    crop.created_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("insert_crop: {e}")))?;
        Ok(())
    }

    async fn list_crops(&self, phone: &str) -> Result<Vec<FarmerCrop>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {CROP_COLUMNS} FROM farmer_crops WHERE phone = ?1 ORDER BY created_at DESC"
                ),
                params![phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_crops: {e}")))?;

        let mut crops = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_crop(&row) {
                Ok(crop) => crops.push(crop),
                Err(e) => {
                    tracing::warn!("Skipping crop row: {e}");
                }
            }
        }
        Ok(crops)
    }

    // ── Peer chats ──────────────────────────────────────────────────

    async fn find_peer_chat(&self, a: &str, b: &str) -> Result<Option<PeerChat>, DatabaseError> {
        let (first, second) = PeerChat::canonical_pair(a, b);
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PEER_CHAT_COLUMNS} FROM peer_chats WHERE phone_a = ?1 AND phone_b = ?2"
                ),
                params![first, second],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("find_peer_chat: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let chat = row_to_peer_chat(&row)
                    .map_err(|e| DatabaseError::Query(format!("find_peer_chat row parse: {e}")))?;
                Ok(Some(chat))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("find_peer_chat: {e}"))),
        }
    }

    async fn save_peer_chat(&self, chat: &PeerChat) -> Result<(), DatabaseError> {
        let (first, second) = PeerChat::canonical_pair(&chat.phone_a, &chat.phone_b);
        let turns = serde_json::to_string(&chat.turns)
            .map_err(|e| DatabaseError::Serialization(format!("peer chat turns: {e}")))?;
        self.conn()
            .execute(
                "INSERT INTO peer_chats (id, phone_a, phone_b, turns, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)
                 ON CONFLICT (phone_a, phone_b) DO UPDATE SET
                    turns = ?4, updated_at = ?5",
                params![
                    chat.id.to_string(),
                    first,
                    second,
                    turns,
                    chat.updated_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("save_peer_chat: {e}")))?;
        Ok(())
    }

    async fn list_peer_chats(&self, phone: &str) -> Result<Vec<PeerChat>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                &format!(
                    "SELECT {PEER_CHAT_COLUMNS} FROM peer_chats
                     WHERE phone_a = ?1 OR phone_b = ?1 ORDER BY updated_at DESC"
                ),
                params![phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("list_peer_chats: {e}")))?;

        let mut chats = Vec::new();
        while let Ok(Some(row)) = rows.next().await {
            match row_to_peer_chat(&row) {
                Ok(chat) => chats.push(chat),
                Err(e) => {
                    tracing::warn!("Skipping peer chat row: {e}");
                }
            }
        }
        Ok(chats)
    }

    // ── OTP ─────────────────────────────────────────────────────────

    async fn put_otp(&self, record: &OtpRecord) -> Result<(), DatabaseError> {
        self.conn()
            .execute(
                "INSERT INTO otp_codes (phone, code, expires_at) VALUES (?1, ?2, ?3)
                 ON CONFLICT (phone) DO UPDATE SET code = ?2, expires_at = ?3",
                params![
                    record.phone.as_str(),
                    record.code.as_str(),
                    record.expires_at.to_rfc3339(),
                ],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("put_otp: {e}")))?;
        Ok(())
    }

    async fn get_otp(&self, phone: &str) -> Result<Option<OtpRecord>, DatabaseError> {
        let mut rows = self
            .conn()
            .query(
                "SELECT phone, code, expires_at FROM otp_codes WHERE phone = ?1",
                params![phone],
            )
            .await
            .map_err(|e| DatabaseError::Query(format!("get_otp: {e}")))?;

        match rows.next().await {
            Ok(Some(row)) => {
                let expires_str: String = row
                    .get(2)
                    .map_err(|e| DatabaseError::Query(format!("get_otp row: {e}")))?;
                Ok(Some(OtpRecord {
                    phone: row
                        .get(0)
                        .map_err(|e| DatabaseError::Query(format!("get_otp row: {e}")))?,
                    code: row
                        .get(1)
                        .map_err(|e| DatabaseError::Query(format!("get_otp row: {e}")))?,
                    expires_at: parse_datetime(&expires_str),
                }))
            }
            Ok(None) => Ok(None),
            Err(e) => Err(DatabaseError::Query(format!("get_otp: {e}"))),
        }
    }

    async fn delete_otp(&self, phone: &str) -> Result<(), DatabaseError> {
        self.conn()
            .execute("DELETE FROM otp_codes WHERE phone = ?1", params![phone])
            .await
            .map_err(|e| DatabaseError::Query(format!("delete_otp: {e}")))?;
        Ok(())
    }
}
