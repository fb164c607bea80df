//! The seven screens of the signup wizard.

use serde::{Deserialize, Serialize};

/// The steps of the onboarding wizard.
///
/// Progresses linearly: EmailEntry → OtpVerification → PasswordSetup →
/// DomainSetup → ContentIngestion → WidgetInstallation → Complete.
/// Serialized as its step number (1–7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum OnboardingStep {
    EmailEntry = 1,
    OtpVerification = 2,
    PasswordSetup = 3,
    DomainSetup = 4,
    ContentIngestion = 5,
    WidgetInstallation = 6,
    Complete = 7,
}

impl OnboardingStep {
    pub const FIRST: OnboardingStep = OnboardingStep::EmailEntry;
    pub const LAST: OnboardingStep = OnboardingStep::Complete;

    /// All steps in order.
    pub const ALL: [OnboardingStep; 7] = [
        Self::EmailEntry,
        Self::OtpVerification,
        Self::PasswordSetup,
        Self::DomainSetup,
        Self::ContentIngestion,
        Self::WidgetInstallation,
        Self::Complete,
    ];

    /// The 1-based step number.
    pub fn number(self) -> u8 {
        self as u8
    }

    pub fn from_number(n: u8) -> Option<Self> {
        Self::ALL.get(usize::from(n).checked_sub(1)?).copied()
    }

    /// Map any integer onto a step, clamping to [1, 7].
    pub fn clamped(n: i64) -> Self {
        let n = n.clamp(1, 7) as u8;
        Self::ALL[usize::from(n - 1)]
    }

    /// Whether this step is terminal (onboarding is done).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Get the next step, if any.
    pub fn next(self) -> Option<Self> {
        Self::from_number(self.number() + 1)
    }

    /// Get the previous step, if any.
    pub fn previous(self) -> Option<Self> {
        Self::from_number(self.number() - 1)
    }

    /// Heading shown above the step's form.
    pub fn title(self) -> &'static str {
        match self {
            Self::EmailEntry => "Enter Your Email",
            Self::OtpVerification => "Verify Your Email",
            Self::PasswordSetup => "Set Your Password",
            Self::DomainSetup => "Add Your Website",
            Self::ContentIngestion => "Add Contact Info",
            Self::WidgetInstallation => "Install Widget",
            Self::Complete => "Complete Setup",
        }
    }
}

impl Default for OnboardingStep {
    fn default() -> Self {
        Self::FIRST
    }
}

impl From<OnboardingStep> for u8 {
    fn from(step: OnboardingStep) -> u8 {
        step.number()
    }
}

impl TryFrom<u8> for OnboardingStep {
    type Error = String;

    fn try_from(n: u8) -> Result<Self, Self::Error> {
        Self::from_number(n).ok_or_else(|| format!("step {n} is outside 1..=7"))
    }
}

impl std::fmt::Display for OnboardingStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::EmailEntry => "email_entry",
            Self::OtpVerification => "otp_verification",
            Self::PasswordSetup => "password_setup",
            Self::DomainSetup => "domain_setup",
            Self::ContentIngestion => "content_ingestion",
            Self::WidgetInstallation => "widget_installation",
            Self::Complete => "complete",
        };
        write!(f, "{} ({s})", self.number())
    }
}
