//! Onboarding API: the backend the wizard talks to.
//!
//! `OnboardingApi` is the seam between the session and the network. Two
//! implementations ship with the crate:
//! - **HttpApiClient**: the real REST backend via reqwest
//! - **MockApiClient**: canned, offline responses for demos and tests

pub mod http;
pub mod mock;

pub use http::HttpApiClient;
pub use mock::MockApiClient;

use async_trait::async_trait;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::onboarding::model::{ContactInfo, ScrapingStatus};
use crate::onboarding::OnboardingStep;

/// Response to a one-time-code request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OtpSent {
    pub success: bool,
    pub message: String,
}

/// Successful code verification; carries the short-lived temp token.
#[derive(Debug)]
pub struct OtpVerified {
    pub temp_token: SecretString,
}

/// Account created; carries the long-lived access token.
#[derive(Debug)]
pub struct SignupCompleted {
    pub user_id: String,
    pub access_token: SecretString,
}

/// Consent flags collected on the domain step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SiteConfirmations {
    pub ownership_confirmed: bool,
    pub scraping_consent: bool,
    pub terms_accepted: bool,
}

impl SiteConfirmations {
    /// The form has a single "I confirm all of the following" checkbox.
    pub fn all(accepted: bool) -> Self {
        Self {
            ownership_confirmed: accepted,
            scraping_consent: accepted,
            terms_accepted: accepted,
        }
    }

    pub fn all_accepted(&self) -> bool {
        self.ownership_confirmed && self.scraping_consent && self.terms_accepted
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SiteCreated {
    pub site_id: String,
    pub domain: String,
    pub scraping_status: ScrapingStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct SiteStatus {
    pub scraping_status: ScrapingStatus,
    #[serde(default)]
    pub scraping_progress: u8,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadReceipt {
    pub upload_id: String,
    pub status: String,
}

/// A file picked for upload on the content step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileUpload {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WidgetScript {
    pub script_tag: String,
    pub site_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WidgetVerification {
    pub verified: bool,
    #[serde(default)]
    pub message: String,
}

/// Fine-grained completion flags the server keeps per signup.
///
/// Every field is optional; older backends omit most of them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SessionData {
    pub email: Option<String>,
    pub otp_sent_at: Option<String>,
    pub otp_verified: Option<bool>,
    pub email_verified: Option<bool>,
    pub profile_completed: Option<bool>,
    pub site_id: Option<String>,
    pub domain: Option<String>,
    pub content_complete: Option<bool>,
    pub support_email: Option<String>,
    pub company_name: Option<String>,
    pub support_phone: Option<String>,
    pub address: Option<String>,
    pub support_person_name: Option<String>,
    pub widget_script: Option<String>,
    pub widget_verified: Option<bool>,
}

/// Server-side view of the signup, used for resume reconciliation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct UserState {
    pub email: Option<String>,
    /// Cursor the server advances on `update_step`. May lag the flags.
    pub current_step: Option<i64>,
    pub session_data: SessionData,
}

/// Context sent with a step-progress notification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepContext {
    pub email: String,
    pub step: OnboardingStep,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct OnboardingCompleted {
    #[serde(default)]
    pub success: bool,
    pub redirect_url: Option<String>,
}

/// Render the embeddable widget snippet for a site.
pub fn widget_script_tag(cdn_base: &str, site_id: &str) -> String {
    format!(
        r#"<script src="{}/widget.js" site_id="{site_id}" defer></script>"#,
        cdn_base.trim_end_matches('/')
    )
}

/// The onboarding backend.
///
/// Calls that need a credential take it explicitly; implementations never
/// read token storage themselves.
#[async_trait]
pub trait OnboardingApi: Send + Sync {
    async fn send_otp(&self, email: &str) -> Result<OtpSent, ApiError>;

    async fn verify_otp(&self, email: &str, code: &str) -> Result<OtpVerified, ApiError>;

    /// Set the account password. Authorized by the temp token.
    async fn complete_signup(
        &self,
        password: &SecretString,
        temp_token: &SecretString,
    ) -> Result<SignupCompleted, ApiError>;

    async fn create_site(
        &self,
        access_token: &SecretString,
        domain: &str,
        confirmations: SiteConfirmations,
    ) -> Result<SiteCreated, ApiError>;

    async fn get_site_status(
        &self,
        access_token: &SecretString,
        site_id: &str,
    ) -> Result<SiteStatus, ApiError>;

    async fn upload_text(
        &self,
        access_token: &SecretString,
        site_id: &str,
        text: &str,
    ) -> Result<UploadReceipt, ApiError>;

    async fn upload_file(
        &self,
        access_token: &SecretString,
        site_id: &str,
        file: &FileUpload,
    ) -> Result<UploadReceipt, ApiError>;

    async fn update_contact_info(
        &self,
        access_token: &SecretString,
        site_id: &str,
        contact: &ContactInfo,
    ) -> Result<(), ApiError>;

    async fn generate_widget(
        &self,
        access_token: &SecretString,
        site_id: &str,
    ) -> Result<WidgetScript, ApiError>;

    async fn verify_widget(
        &self,
        access_token: &SecretString,
        site_id: &str,
        page_url: &str,
    ) -> Result<WidgetVerification, ApiError>;

    async fn get_user_state(&self, access_token: &SecretString) -> Result<UserState, ApiError>;

    /// Record that `completed_step` is done. Best-effort; callers ignore failures.
    async fn update_step(
        &self,
        access_token: Option<&SecretString>,
        completed_step: OnboardingStep,
        context: &StepContext,
    ) -> Result<(), ApiError>;

    async fn complete_onboarding(
        &self,
        access_token: &SecretString,
    ) -> Result<OnboardingCompleted, ApiError>;
}
