//! Yuno onboarding — the signup wizard state machine and its backends.

pub mod api;
pub mod config;
pub mod error;
pub mod onboarding;
pub mod store;
pub mod wizard;
