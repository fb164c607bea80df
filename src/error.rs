//! Error types for yuno-onboarding.

use crate::onboarding::OnboardingStep;

/// Top-level error type.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Human-readable message suitable for `OnboardingState::error`.
    pub fn user_message(&self) -> String {
        match self {
            Self::Api(e) => e.user_message(),
            Self::Session(e) => e.to_string(),
            Self::Validation(e) => e.message.clone(),
            other => other.to_string(),
        }
    }
}

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// Failures talking to the Onboarding API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The server answered, but refused the request.
    #[error("{operation} rejected (status {status:?}): {message}")]
    Rejected {
        operation: &'static str,
        status: Option<u16>,
        message: String,
    },

    #[error("{operation} request failed: {reason}")]
    Transport {
        operation: &'static str,
        reason: String,
    },

    #[error("Invalid response for {operation}: {reason}")]
    InvalidResponse {
        operation: &'static str,
        reason: String,
    },
}

impl ApiError {
    /// The text the user should see for this failure.
    pub fn user_message(&self) -> String {
        match self {
            Self::Rejected { message, .. } => message.clone(),
            Self::Transport { operation, .. } | Self::InvalidResponse { operation, .. } => {
                fallback_message(operation).to_string()
            }
        }
    }

    /// Whether the server rejected the credential outright.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Rejected { status: Some(401 | 403), .. })
    }
}

/// Default user-facing text per operation, used when the server gives none.
pub fn fallback_message(operation: &str) -> &'static str {
    match operation {
        "send_otp" => "Failed to send OTP",
        "verify_otp" => "Invalid OTP",
        "complete_signup" => "Failed to create account",
        "create_site" => "Failed to create site",
        "get_site_status" => "Failed to get site status",
        "upload_text" => "Failed to upload text content",
        "upload_file" => "Failed to upload file",
        "update_contact_info" => "Failed to save contact info",
        "generate_widget" => "Failed to generate widget",
        "verify_widget" => "Failed to verify widget",
        "get_user_state" => "Failed to get onboarding state",
        "update_step" => "Failed to save step progress",
        "complete_onboarding" => "Failed to complete onboarding",
        _ => "Request failed",
    }
}

/// Persistence errors.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Session-level rule violations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SessionError {
    #[error("Another request is still in progress")]
    ActionInFlight,

    #[error("Step {0} is not complete yet")]
    StepIncomplete(OnboardingStep),

    #[error("Step {0} cannot be opened until the earlier steps are done")]
    StepLocked(OnboardingStep),

    #[error("Onboarding is already complete")]
    AlreadyComplete,

    #[error("Session has already been restored")]
    AlreadyRestored,

    #[error("Missing {0}; please restart from the previous step")]
    MissingCredential(&'static str),

    #[error("No website has been registered yet")]
    MissingSite,
}

/// A single form field failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct ValidationError {
    pub field: &'static str,
    pub message: String,
}

impl ValidationError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Result type alias for the crate.
pub type Result<T> = std::result::Result<T, Error>;
