//! Krishi Assist — multi-channel farming assistant core.

pub mod agent;
pub mod channels;
pub mod config;
pub mod engine;
pub mod error;
pub mod geo;
pub mod llm;
pub mod onboarding;
pub mod rag;
pub mod session;
pub mod store;
pub mod tools;
pub mod translate;
