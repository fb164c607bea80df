//! Onboarding state and its per-step sub-state.

use serde::{Deserialize, Serialize};

use super::step::OnboardingStep;

/// Progress of the backend's website crawl.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScrapingStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ScrapingStatus {
    /// Whether polling should stop on this status.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl std::fmt::Display for ScrapingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Processing state of uploaded support content.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessingStatus {
    #[default]
    Pending,
    Processing,
    Completed,
}

/// The registered website.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SiteData {
    pub site_id: Option<String>,
    pub domain: String,
    pub scraping_status: ScrapingStatus,
    /// 0–100. Only meaningful while `scraping_status` is `InProgress`.
    pub scraping_progress: u8,
}

impl SiteData {
    pub fn has_site(&self) -> bool {
        self.site_id.as_deref().is_some_and(|id| !id.is_empty())
    }
}

/// Support contact details shown by the chatbot when it cannot answer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContactInfo {
    pub support_email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub company_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_phone: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub support_person_name: Option<String>,
}

/// Receipt for one piece of uploaded content, in upload order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    pub upload_id: String,
    /// File name, or `None` for pasted text.
    pub name: Option<String>,
    pub status: String,
}

/// Support content ingested for the chatbot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ContentData {
    pub text_content: String,
    pub uploaded_files: Vec<UploadedFile>,
    pub contact_info: ContactInfo,
    pub processing_status: ProcessingStatus,
}

/// The embeddable widget and its installation check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WidgetData {
    pub script_tag: String,
    pub is_verified: bool,
    pub verification_url: String,
}

/// Everything the wizard knows about the signup in progress.
///
/// Credentials are deliberately absent; the session keeps them separately.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OnboardingState {
    pub current_step: OnboardingStep,
    pub email: String,
    pub is_email_verified: bool,
    pub is_password_set: bool,
    pub site_data: SiteData,
    pub content_data: ContentData,
    pub widget_data: WidgetData,
    /// True only while a network action is pending.
    pub loading: bool,
    /// Last user-facing failure message.
    pub error: Option<String>,
}

impl OnboardingState {
    /// Whether `step`'s completion requirement is met.
    pub fn is_step_completed(&self, step: OnboardingStep) -> bool {
        match step {
            OnboardingStep::EmailEntry => !self.email.is_empty(),
            OnboardingStep::OtpVerification => self.is_email_verified,
            OnboardingStep::PasswordSetup => self.is_password_set,
            OnboardingStep::DomainSetup => self.site_data.has_site(),
            OnboardingStep::ContentIngestion => {
                !self.content_data.contact_info.support_email.is_empty()
            }
            OnboardingStep::WidgetInstallation => self.widget_data.is_verified,
            OnboardingStep::Complete => false,
        }
    }

    /// Whether the "continue" affordance should be enabled.
    pub fn can_proceed_to_next_step(&self) -> bool {
        self.is_step_completed(self.current_step) && !self.loading
    }

    /// Whether the user may open `step` from the current position.
    ///
    /// Going back is always allowed. Going forward needs `step` itself done
    /// and no incomplete step between here and there.
    pub fn can_navigate_to(&self, step: OnboardingStep) -> bool {
        if step <= self.current_step {
            return true;
        }
        self.is_step_completed(step)
            && OnboardingStep::ALL
                .iter()
                .filter(|s| **s >= self.current_step && **s < step)
                .all(|s| self.is_step_completed(*s))
    }

    /// Share of the six actionable steps that are complete, 0–100.
    pub fn progress_percent(&self) -> u8 {
        let done = OnboardingStep::ALL
            .iter()
            .filter(|s| self.is_step_completed(**s))
            .count();
        (done * 100 / 6) as u8
    }

    /// The subset that survives a reload.
    pub fn snapshot(&self) -> PersistedSnapshot {
        PersistedSnapshot {
            current_step: self.current_step,
            email: self.email.clone(),
            is_email_verified: self.is_email_verified,
            is_password_set: self.is_password_set,
            site_data: self.site_data.clone(),
            content_data: self.content_data.clone(),
            widget_data: self.widget_data.clone(),
        }
    }

    /// Rebuild a state from a persisted snapshot; transient fields start clear.
    pub fn from_snapshot(snapshot: PersistedSnapshot) -> Self {
        Self {
            current_step: snapshot.current_step,
            email: snapshot.email,
            is_email_verified: snapshot.is_email_verified,
            is_password_set: snapshot.is_password_set,
            site_data: snapshot.site_data,
            content_data: snapshot.content_data,
            widget_data: snapshot.widget_data,
            loading: false,
            error: None,
        }
    }
}

/// Session-scoped snapshot written after every state change.
///
/// Stored as JSON under [`SNAPSHOT_KEY`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PersistedSnapshot {
    pub current_step: OnboardingStep,
    pub email: String,
    pub is_email_verified: bool,
    pub is_password_set: bool,
    pub site_data: SiteData,
    pub content_data: ContentData,
    pub widget_data: WidgetData,
}

pub const SNAPSHOT_KEY: &str = "yuno-onboarding-state";
