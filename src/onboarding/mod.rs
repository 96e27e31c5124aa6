//! Onboarding state machine — greets callers, captures language and
//! location, then hands over to the query agent.

pub mod manager;
pub mod prompts;

pub use manager::{OnboardingManager, TurnOutcome};
