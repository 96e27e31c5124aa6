//! Canned reply text for the onboarding conversation.
//!
//! Everything here is English; outbound translation happens at the
//! engine boundary.

use crate::config::SUPPORTED_LANGUAGES;

pub const INTRO_TEXT: &str = "Hello! I am your farming assistant. I'll give advice on \
    crops, weather, pests, prices, and schemes.";

pub const FAREWELL: &str = "Thank you for using our farming assistant! Your conversation \
    has been saved. Feel free to message us anytime. 🌱";

pub const UNEXPECTED_ERROR: &str =
    "I'm sorry, an unexpected error occurred. Please try again.";

pub const PINCODE_SAVED: &str = "Perfect! PIN code saved. 📍\n\nNow, please provide your \
    detailed address (Village, City, District, State) so I can give you accurate local \
    information.";

pub const PINCODE_SKIPPED: &str = "I'll continue without your PIN code for now. What \
    farming question can I help you with? 🌱";

pub const LANGUAGE_SKIPPED: &str =
    "I'll continue in English. Please provide your 6-digit PIN code.";

pub const ADDRESS_NOT_FOUND: &str = "I couldn't find that location. Please provide a \
    more detailed address with village/city, district, and state.";

pub const ADDRESS_NOT_FOUND_SKIPPED: &str = "I couldn't locate your exact address, but \
    that's okay. What farming question can I help you with? 🌱";

pub const ADDRESS_INCOMPLETE: &str = "Please provide a complete address with your \
    village/city, district, and state.";

pub const ADDRESS_SKIPPED: &str =
    "Let's continue. What farming question can I help you with? 🌱";

pub const HELP_MENU: &str = "🌾 Farming Assistant Help Menu:\n\n\
    You can ask me about:\n\
    - Weather forecasts 🌦️\n\
    - Crop prices 💰\n\
    - Crop diseases 🐛\n\
    - General farming advice 🚜\n\n\
    Type 'exit' to end our conversation.";

/// Numbered language menu for text channels.
pub fn language_menu() -> String {
    let mut prompt =
        String::from("Please choose your preferred language / कृपया अपनी पसंदीदा भाषा चुनें:\n\n");
    for lang in SUPPORTED_LANGUAGES {
        prompt.push_str(&format!("{}. {}\n", lang.choice, lang.name));
    }
    prompt.push_str("\nReply with the number of your choice.");
    prompt
}

/// Spoken language menu for the voice channel.
pub fn voice_language_menu() -> String {
    let mut prompt = String::from("Welcome to farming assistant. Please choose your language. ");
    for lang in SUPPORTED_LANGUAGES {
        prompt.push_str(&format!("For {}, say {}. ", lang.name, lang.choice));
    }
    prompt.trim_end().to_string()
}

pub fn welcome_with_menu() -> String {
    format!(
        "Hello! Welcome to your farming assistant. 🌾\n\n{}",
        language_menu()
    )
}

pub fn language_set(name: &str) -> String {
    format!(
        "Great! Language set to {name}. 🌍\n\nNow, please provide your 6-digit PIN code \
         so I can give you location-specific information."
    )
}

pub fn invalid_language_choice() -> String {
    format!(
        "Please select a valid option (1-{}):\n\n{}",
        SUPPORTED_LANGUAGES.len(),
        language_menu()
    )
}

pub fn invalid_pincode(attempt: u32) -> String {
    format!("Please provide a valid 6-digit PIN code (e.g., 123456). Attempt {attempt}/3")
}

pub fn address_saved(state: Option<&str>, district: Option<&str>, city: Option<&str>) -> String {
    format!(
        "Excellent! Your location has been saved: State: {}, District: {}, City: {} 📍✅\n\n\
         Now, what farming question can I help you with? You can ask about:\n\
         • Crop diseases 🦠\n\
         • Weather forecasts ☀️🌧️\n\
         • Crop prices 💰\n\
         • Farming advice 🌾",
        state.unwrap_or("N/A"),
        district.unwrap_or("N/A"),
        city.unwrap_or("N/A"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_lists_every_language() {
        let menu = language_menu();
        for lang in SUPPORTED_LANGUAGES {
            assert!(menu.contains(lang.name), "menu missing {}", lang.name);
            assert!(menu.contains(&format!("{}. ", lang.choice)));
        }
        assert!(menu.ends_with("Reply with the number of your choice."));
    }

    #[test]
    fn voice_menu_speaks_choices() {
        let menu = voice_language_menu();
        assert!(menu.starts_with("Welcome to farming assistant."));
        assert!(menu.contains("For English, say 1."));
        assert!(menu.ends_with("say 6."));
    }

    #[test]
    fn address_summary_uses_na_for_missing() {
        let text = address_saved(Some("Punjab"), None, None);
        assert!(text.contains("State: Punjab, District: N/A, City: N/A"));
    }
}
