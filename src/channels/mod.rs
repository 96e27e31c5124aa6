//! Inbound channels — Twilio webhooks for WhatsApp and voice, plus the
//! mobile app's JSON API.

pub mod app;
pub mod twiml;
pub mod voice;
pub mod whatsapp;

pub use app::AppContext;
