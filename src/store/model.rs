//! Persisted row types shared across backends.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A registered user, keyed by phone number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub phone: String,
    pub name: Option<String>,
    pub village: Option<String>,
    pub district: Option<String>,
    pub state: Option<String>,
    pub preferred_language: String,
    /// Geocoded during onboarding; the weather tool reads these.
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub created_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl UserProfile {
    /// A bare profile for a phone number seen for the first time.
    pub fn new(phone: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            phone: phone.into(),
            name: None,
            village: None,
            district: None,
            state: None,
            preferred_language: "en".to_string(),
            latitude: None,
            longitude: None,
            created_at: now,
            last_seen_at: now,
        }
    }
}

/// A crop listing a farmer has posted through the app marketplace.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FarmerCrop {
    pub id: Uuid,
    pub phone: String,
    pub crop_name: String,
    pub crop_price: f64,
    pub quantity: f64,
    pub unit: String,
    pub description: String,
    pub is_available: bool,
    pub created_at: DateTime<Utc>,
}

/// One message inside an app chat thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppTurn {
    pub role: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// A titled chat thread in the mobile app. `turns` holds the
/// display-language history; `turns_en` the English shadow used as
/// model context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppChat {
    pub phone: String,
    pub title: String,
    pub turns: Vec<AppTurn>,
    pub turns_en: Vec<AppTurn>,
    pub updated_at: DateTime<Utc>,
}

impl AppChat {
    pub fn new(phone: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            phone: phone.into(),
            title: title.into(),
            turns: Vec::new(),
            turns_en: Vec::new(),
            updated_at: Utc::now(),
        }
    }
}

/// A farmer-to-farmer chat thread between two phone numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerChat {
    pub id: Uuid,
    pub phone_a: String,
    pub phone_b: String,
    pub turns: Vec<AppTurn>,
    pub updated_at: DateTime<Utc>,
}

impl PeerChat {
    /// Canonical participant ordering so (a, b) and (b, a) hit the
    /// same thread.
    pub fn canonical_pair(a: &str, b: &str) -> (String, String) {
        if a <= b {
            (a.to_string(), b.to_string())
        } else {
            (b.to_string(), a.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonical_pair_is_order_independent() {
        assert_eq!(
            PeerChat::canonical_pair("+911111", "+910000"),
            PeerChat::canonical_pair("+910000", "+911111"),
        );
    }

    #[test]
    fn new_profile_defaults_to_english() {
        let user = UserProfile::new("+919999999999");
        assert_eq!(user.preferred_language, "en");
        assert!(user.name.is_none());
    }
}
