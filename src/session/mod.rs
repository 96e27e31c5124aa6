//! Conversation session state — one session per (channel, phone).

mod store;

pub use store::{session_key, SessionStore};

use serde::{Deserialize, Serialize};

/// The phases of a caller's conversation.
///
/// Onboarding progresses linearly: None → AwaitingGreetingAck →
/// AwaitingLanguageChoice → AwaitingPinCode → AwaitingAddress →
/// AwaitingProblemType. The last phase is absorbing; every turn after it
/// is dispatched to the query agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    None,
    AwaitingGreetingAck,
    AwaitingLanguageChoice,
    AwaitingPinCode,
    AwaitingAddress,
    AwaitingProblemType,
}

impl SessionState {
    /// Get the next phase in the linear progression, if any.
    pub fn next(&self) -> Option<SessionState> {
        use SessionState::*;
        match self {
            None => Some(AwaitingGreetingAck),
            AwaitingGreetingAck => Some(AwaitingLanguageChoice),
            AwaitingLanguageChoice => Some(AwaitingPinCode),
            AwaitingPinCode => Some(AwaitingAddress),
            AwaitingAddress => Some(AwaitingProblemType),
            AwaitingProblemType => Option::None,
        }
    }

    /// Whether onboarding is finished and turns go to the query agent.
    pub fn is_onboarded(&self) -> bool {
        matches!(self, Self::AwaitingProblemType)
    }
}

impl Default for SessionState {
    fn default() -> Self {
        Self::None
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::None => "none",
            Self::AwaitingGreetingAck => "awaiting_greeting_ack",
            Self::AwaitingLanguageChoice => "awaiting_language_choice",
            Self::AwaitingPinCode => "awaiting_pin_code",
            Self::AwaitingAddress => "awaiting_address",
            Self::AwaitingProblemType => "awaiting_problem_type",
        };
        write!(f, "{s}")
    }
}

/// How many consecutive failures a state tolerates and where it falls
/// through to when they are exhausted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub fallback: SessionState,
}

/// Retry budget for each state that validates input. States not listed
/// never consume retries.
pub fn retry_policy(state: SessionState) -> Option<RetryPolicy> {
    use SessionState::*;
    match state {
        AwaitingLanguageChoice => Some(RetryPolicy {
            max_retries: 3,
            fallback: AwaitingPinCode,
        }),
        AwaitingPinCode => Some(RetryPolicy {
            max_retries: 3,
            fallback: AwaitingProblemType,
        }),
        AwaitingAddress => Some(RetryPolicy {
            max_retries: 2,
            fallback: AwaitingProblemType,
        }),
        _ => Option::None,
    }
}

/// Structured address captured during onboarding. Fields stay `None`
/// when extraction could not fill them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressDetails {
    pub state: Option<String>,
    pub district: Option<String>,
    pub city: Option<String>,
    pub village: Option<String>,
}

/// Per-caller conversation state, persisted between turns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    /// Current conversation phase.
    pub state: SessionState,
    /// ISO 639-1 language the caller chose. Defaults to English until
    /// the language step completes or is skipped.
    pub lang: String,
    /// Six-digit postal code, once captured.
    pub pincode: Option<String>,
    /// Structured address, once captured.
    pub address: AddressDetails,
    /// Coordinates geocoded from the address during onboarding.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Consecutive failures in the current state. Resets on every
    /// state change.
    pub retry_count: u32,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            state: SessionState::default(),
            lang: "en".to_string(),
            pincode: None,
            address: AddressDetails::default(),
            latitude: None,
            longitude: None,
            retry_count: 0,
        }
    }
}

/// Outcome of recording a failed attempt in the current state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    /// Budget not yet exhausted; re-prompt in place.
    Retry,
    /// Budget exhausted; the session moved to the fallback state.
    SkippedTo(SessionState),
}

impl Session {
    /// Move to `target`, resetting the retry counter.
    pub fn advance(&mut self, target: SessionState) {
        self.state = target;
        self.retry_count = 0;
    }

    /// Record a failed attempt in the current state. When the state's
    /// retry budget is exhausted, falls through to the policy's
    /// fallback state. States without a policy always retry.
    pub fn register_failure(&mut self) -> FailureOutcome {
        let Some(policy) = retry_policy(self.state) else {
            return FailureOutcome::Retry;
        };
        self.retry_count += 1;
        if self.retry_count >= policy.max_retries {
            self.advance(policy.fallback);
            FailureOutcome::SkippedTo(policy.fallback)
        } else {
            FailureOutcome::Retry
        }
    }
}

/// Who produced a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnRole {
    User,
    Bot,
}

impl std::fmt::Display for TurnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Bot => write!(f, "bot"),
        }
    }
}

/// One message in a session's history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub text: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl ConversationTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::User,
            text: text.into(),
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            role: TurnRole::Bot,
            text: text.into(),
            timestamp: chrono::Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn next_walks_all_states() {
        use SessionState::*;
        let expected = [
            AwaitingGreetingAck,
            AwaitingLanguageChoice,
            AwaitingPinCode,
            AwaitingAddress,
            AwaitingProblemType,
        ];
        let mut current = None;
        for expected_next in expected {
            let next = current.next().unwrap();
            assert_eq!(next, expected_next);
            current = next;
        }
        assert!(current.next().is_none());
    }

    #[test]
    fn display_matches_serde() {
        use SessionState::*;
        let states = [
            None,
            AwaitingGreetingAck,
            AwaitingLanguageChoice,
            AwaitingPinCode,
            AwaitingAddress,
            AwaitingProblemType,
        ];
        for state in states {
            let display = format!("{state}");
            let json = serde_json::to_string(&state).unwrap();
            // JSON wraps in quotes
            assert_eq!(
                format!("\"{display}\""),
                json,
                "Display and serde should match for {state:?}"
            );
        }
    }

    #[test]
    fn retry_policies() {
        use SessionState::*;
        assert_eq!(
            retry_policy(AwaitingLanguageChoice),
            Some(RetryPolicy {
                max_retries: 3,
                fallback: AwaitingPinCode
            })
        );
        assert_eq!(
            retry_policy(AwaitingPinCode),
            Some(RetryPolicy {
                max_retries: 3,
                fallback: AwaitingProblemType
            })
        );
        assert_eq!(
            retry_policy(AwaitingAddress),
            Some(RetryPolicy {
                max_retries: 2,
                fallback: AwaitingProblemType
            })
        );
        assert!(retry_policy(None).is_none());
        assert!(retry_policy(AwaitingGreetingAck).is_none());
        assert!(retry_policy(AwaitingProblemType).is_none());
    }

    #[test]
    fn failures_exhaust_into_fallback() {
        let mut session = Session {
            state: SessionState::AwaitingPinCode,
            ..Session::default()
        };
        assert_eq!(session.register_failure(), FailureOutcome::Retry);
        assert_eq!(session.register_failure(), FailureOutcome::Retry);
        assert_eq!(
            session.register_failure(),
            FailureOutcome::SkippedTo(SessionState::AwaitingProblemType)
        );
        assert_eq!(session.state, SessionState::AwaitingProblemType);
        assert_eq!(session.retry_count, 0, "counter should reset on skip");
    }

    #[test]
    fn address_exhausts_after_two() {
        let mut session = Session {
            state: SessionState::AwaitingAddress,
            ..Session::default()
        };
        assert_eq!(session.register_failure(), FailureOutcome::Retry);
        assert_eq!(
            session.register_failure(),
            FailureOutcome::SkippedTo(SessionState::AwaitingProblemType)
        );
    }

    #[test]
    fn states_without_policy_never_skip() {
        let mut session = Session::default();
        for _ in 0..10 {
            assert_eq!(session.register_failure(), FailureOutcome::Retry);
        }
        assert_eq!(session.state, SessionState::None);
        assert_eq!(session.retry_count, 0);
    }

    #[test]
    fn advance_resets_retry_count() {
        let mut session = Session {
            state: SessionState::AwaitingLanguageChoice,
            retry_count: 2,
            ..Session::default()
        };
        session.advance(SessionState::AwaitingPinCode);
        assert_eq!(session.state, SessionState::AwaitingPinCode);
        assert_eq!(session.retry_count, 0);
    }

    #[test]
    fn session_serde_roundtrip() {
        let session = Session {
            state: SessionState::AwaitingAddress,
            lang: "hi".to_string(),
            pincode: Some("411001".to_string()),
            address: AddressDetails {
                state: Some("Maharashtra".to_string()),
                district: Some("Pune".to_string()),
                city: None,
                village: None,
            },
            latitude: Some(18.52),
            longitude: Some(73.85),
            retry_count: 1,
        };
        let json = serde_json::to_string(&session).unwrap();
        let parsed: Session = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.state, SessionState::AwaitingAddress);
        assert_eq!(parsed.lang, "hi");
        assert_eq!(parsed.pincode.as_deref(), Some("411001"));
        assert_eq!(parsed.address.district.as_deref(), Some("Pune"));
        assert_eq!(parsed.retry_count, 1);
    }

    #[test]
    fn default_session() {
        let session = Session::default();
        assert_eq!(session.state, SessionState::None);
        assert_eq!(session.lang, "en");
        assert!(session.pincode.is_none());
        assert_eq!(session.retry_count, 0);
    }
}
