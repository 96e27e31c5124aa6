//! Session persistence — key derivation and a thin wrapper over the
//! database trait.

use std::sync::Arc;

use crate::error::DatabaseError;
use crate::session::{ConversationTurn, Session};
use crate::store::Database;

/// Derive the storage key for a channel's session with a phone number.
pub fn session_key(channel: &str, phone: &str) -> String {
    format!("{channel}_session_{phone}")
}

/// Loads and saves per-caller sessions.
#[derive(Clone)]
pub struct SessionStore {
    db: Arc<dyn Database>,
}

impl SessionStore {
    pub fn new(db: Arc<dyn Database>) -> Self {
        Self { db }
    }

    /// Load the session under `key`, or a fresh one if none exists.
    pub async fn load(&self, key: &str) -> Result<Session, DatabaseError> {
        Ok(self.db.get_session(key).await?.unwrap_or_default())
    }

    pub async fn save(&self, key: &str, session: &Session) -> Result<(), DatabaseError> {
        self.db.put_session(key, session).await
    }

    pub async fn append_turn(
        &self,
        key: &str,
        turn: &ConversationTurn,
    ) -> Result<(), DatabaseError> {
        self.db.append_turn(key, turn).await
    }

    pub async fn history(&self, key: &str) -> Result<Vec<ConversationTurn>, DatabaseError> {
        self.db.get_history(key).await
    }

    /// End a conversation: move the history to the archive and drop the
    /// session so the next contact starts onboarding from scratch.
    pub async fn archive_and_reset(&self, key: &str) -> Result<usize, DatabaseError> {
        let archived = self.db.archive_history(key).await?;
        self.db.delete_session(key).await?;
        Ok(archived)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionState;
    use crate::store::LibSqlBackend;

    #[test]
    fn key_format() {
        assert_eq!(
            session_key("whatsapp", "+919999999999"),
            "whatsapp_session_+919999999999"
        );
        assert_eq!(session_key("voice", "+91000"), "voice_session_+91000");
    }

    #[tokio::test]
    async fn load_returns_default_for_unknown_key() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = SessionStore::new(db);
        let session = store.load("whatsapp_session_+91").await.unwrap();
        assert_eq!(session.state, SessionState::None);
    }

    #[tokio::test]
    async fn archive_and_reset_clears_everything() {
        let db = Arc::new(LibSqlBackend::new_memory().await.unwrap());
        let store = SessionStore::new(db);
        let key = session_key("whatsapp", "+919999999999");

        let mut session = Session::default();
        session.state = SessionState::AwaitingProblemType;
        store.save(&key, &session).await.unwrap();
        store
            .append_turn(&key, &ConversationTurn::user("tomato prices"))
            .await
            .unwrap();

        let archived = store.archive_and_reset(&key).await.unwrap();
        assert_eq!(archived, 1);
        assert!(store.history(&key).await.unwrap().is_empty());
        let fresh = store.load(&key).await.unwrap();
        assert_eq!(fresh.state, SessionState::None);
    }
}
