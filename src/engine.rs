//! Conversation engine — one entry point shared by every channel.

use std::sync::Arc;

use tracing::{error, info};

use crate::config::AssistantConfig;
use crate::error::Error;
use crate::onboarding::{prompts, OnboardingManager, TurnOutcome};
use crate::session::{session_key, ConversationTurn, Session, SessionState, SessionStore};
use crate::store::Database;
use crate::translate::Translator;

/// The reply for one inbound message, plus the session facts channels
/// need for rendering (gather mode, voice locale).
#[derive(Debug, Clone)]
pub struct TurnReply {
    pub text: String,
    pub state: SessionState,
    pub lang: String,
    /// True when the caller ended the conversation this turn.
    pub ended: bool,
}

/// Channel-independent conversation engine.
pub struct Assistant {
    config: AssistantConfig,
    sessions: SessionStore,
    db: Arc<dyn Database>,
    translator: Arc<dyn Translator>,
    onboarding: OnboardingManager,
}

impl Assistant {
    pub fn new(
        config: AssistantConfig,
        db: Arc<dyn Database>,
        translator: Arc<dyn Translator>,
        onboarding: OnboardingManager,
    ) -> Self {
        Self {
            config,
            sessions: SessionStore::new(db.clone()),
            db,
            translator,
            onboarding,
        }
    }

    pub fn config(&self) -> &AssistantConfig {
        &self.config
    }

    /// Handle one inbound message from `phone` on `channel`.
    ///
    /// Never fails: internal errors collapse to a translated apology so
    /// the caller always hears something.
    pub async fn handle_turn(&self, channel: &str, phone: &str, text: &str) -> TurnReply {
        match self.try_handle_turn(channel, phone, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(channel, phone, error = %e, "Turn failed");
                // Best effort: the session may be unreadable, so the
                // apology goes out untranslated when lookup fails too.
                let lang = self
                    .sessions
                    .load(&session_key(channel, phone))
                    .await
                    .map(|s| s.lang)
                    .unwrap_or_else(|_| "en".to_string());
                let text = self
                    .translator
                    .translate(prompts::UNEXPECTED_ERROR, "en", &lang)
                    .await;
                TurnReply {
                    text,
                    state: SessionState::None,
                    lang,
                    ended: false,
                }
            }
        }
    }

    async fn try_handle_turn(
        &self,
        channel: &str,
        phone: &str,
        text: &str,
    ) -> Result<TurnReply, Error> {
        self.db.ensure_user(phone).await?;

        let key = session_key(channel, phone);
        let mut session = self.sessions.load(&key).await?;

        // The language in effect when the turn arrived. Replies go out
        // in this language even when this same turn changes it.
        let lang = session.lang.clone();

        let history = self.sessions.history(&key).await?;
        self.sessions
            .append_turn(&key, &ConversationTurn::user(text))
            .await?;

        let english_input = self.translator.translate(text, &lang, "en").await;
        let had_coordinates = session.latitude.is_some();
        let outcome = self
            .onboarding
            .process(&english_input, &mut session, phone, &history)
            .await;

        // Write-once: the address step is the only place coordinates
        // appear, and the profile keeps them for later app queries.
        if !had_coordinates {
            if let (Some(lat), Some(lon)) = (session.latitude, session.longitude) {
                self.db.set_user_coordinates(phone, lat, lon).await?;
            }
        }

        let reply_text = self.translator.translate(outcome.text(), "en", &lang).await;

        match outcome {
            TurnOutcome::Exit(_) => {
                let archived = self.sessions.archive_and_reset(&key).await?;
                info!(channel, phone, archived, "Conversation ended");
                self.db.touch_user(phone).await?;
                Ok(TurnReply {
                    text: reply_text,
                    state: SessionState::None,
                    lang,
                    ended: true,
                })
            }
            TurnOutcome::Reply(_) => {
                self.sessions
                    .append_turn(&key, &ConversationTurn::bot(&reply_text))
                    .await?;
                self.sessions.save(&key, &session).await?;
                self.db.touch_user(phone).await?;
                Ok(TurnReply {
                    text: reply_text,
                    state: session.state,
                    lang,
                    ended: false,
                })
            }
        }
    }

    /// Peek at a session without processing any message.
    pub async fn session_snapshot(&self, channel: &str, phone: &str) -> Result<Session, Error> {
        Ok(self.sessions.load(&session_key(channel, phone)).await?)
    }
}
