//! Offline stand-in for the onboarding backend.
//!
//! Used when no API base URL is configured, and by tests. It keeps just
//! enough server-side state (issued tokens, per-signup flags) to answer
//! `get_user_state`, so resume works in mock mode too.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use rand::distributions::Alphanumeric;
use rand::Rng;
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex;
use tracing::info;

use super::{
    widget_script_tag, FileUpload, OnboardingApi, OnboardingCompleted, OtpSent, OtpVerified,
    SessionData, SignupCompleted, SiteConfirmations, SiteCreated, SiteStatus, StepContext,
    UploadReceipt, UserState, WidgetScript, WidgetVerification,
};
use crate::error::ApiError;
use crate::onboarding::model::{ContactInfo, ScrapingStatus};
use crate::onboarding::OnboardingStep;

/// Progress added per status poll.
const PROGRESS_PER_POLL: u8 = 50;

#[derive(Default)]
struct MockBackend {
    /// Temp token → email.
    temp_tokens: HashMap<String, String>,
    /// Access token → email.
    access_tokens: HashMap<String, String>,
    /// Email → server-side flags.
    signups: HashMap<String, SessionData>,
    /// Site id → crawl progress.
    crawls: HashMap<String, u8>,
    last_step: HashMap<String, i64>,
}

impl MockBackend {
    fn email_for(&self, access_token: &SecretString) -> Result<String, ApiError> {
        self.access_tokens
            .get(access_token.expose_secret())
            .cloned()
            .ok_or_else(|| unauthorized("authorize"))
    }
}

/// Canned backend with optional artificial latency.
pub struct MockApiClient {
    cdn_base: String,
    latency: Duration,
    backend: Mutex<MockBackend>,
}

impl MockApiClient {
    pub fn new(cdn_base: impl Into<String>) -> Self {
        Self {
            cdn_base: cdn_base.into(),
            latency: Duration::ZERO,
            backend: Mutex::new(MockBackend::default()),
        }
    }

    /// Delay every response, to make the wizard feel like a network.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    async fn delay(&self) {
        if !self.latency.is_zero() {
            tokio::time::sleep(self.latency).await;
        }
    }
}

fn mock_id(prefix: &str) -> String {
    let suffix: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(9)
        .map(char::from)
        .collect();
    format!("{prefix}_{}", suffix.to_lowercase())
}

fn unauthorized(operation: &'static str) -> ApiError {
    ApiError::Rejected {
        operation,
        status: Some(401),
        message: "Invalid or expired token".to_string(),
    }
}

fn rejected(operation: &'static str, message: &str) -> ApiError {
    ApiError::Rejected {
        operation,
        status: Some(400),
        message: message.to_string(),
    }
}

#[async_trait]
impl OnboardingApi for MockApiClient {
    async fn send_otp(&self, email: &str) -> Result<OtpSent, ApiError> {
        self.delay().await;
        info!(email, "MOCK: sending OTP");
        let mut backend = self.backend.lock().await;
        let signup = backend.signups.entry(email.to_string()).or_default();
        signup.email = Some(email.to_string());
        signup.otp_sent_at = Some(chrono::Utc::now().to_rfc3339());
        Ok(OtpSent {
            success: true,
            message: "OTP sent successfully".to_string(),
        })
    }

    async fn verify_otp(&self, email: &str, code: &str) -> Result<OtpVerified, ApiError> {
        self.delay().await;
        // Any six-digit code passes.
        if code.len() != 6 || !code.chars().all(|c| c.is_ascii_digit()) {
            return Err(rejected("verify_otp", "Invalid OTP"));
        }
        let mut backend = self.backend.lock().await;
        let signup = backend.signups.entry(email.to_string()).or_default();
        signup.email = Some(email.to_string());
        signup.otp_verified = Some(true);
        signup.email_verified = Some(true);

        let token = mock_id("mock_session_token");
        backend.temp_tokens.insert(token.clone(), email.to_string());
        Ok(OtpVerified {
            temp_token: SecretString::from(token),
        })
    }

    async fn complete_signup(
        &self,
        _password: &SecretString,
        temp_token: &SecretString,
    ) -> Result<SignupCompleted, ApiError> {
        self.delay().await;
        let mut backend = self.backend.lock().await;
        let email = backend
            .temp_tokens
            .remove(temp_token.expose_secret())
            .ok_or_else(|| unauthorized("complete_signup"))?;

        backend.signups.entry(email.clone()).or_default().profile_completed = Some(true);
        let access = mock_id("mock_access_token");
        backend.access_tokens.insert(access.clone(), email);
        Ok(SignupCompleted {
            user_id: mock_id("mock_user"),
            access_token: SecretString::from(access),
        })
    }

    async fn create_site(
        &self,
        access_token: &SecretString,
        domain: &str,
        confirmations: SiteConfirmations,
    ) -> Result<SiteCreated, ApiError> {
        self.delay().await;
        if !confirmations.all_accepted() {
            return Err(rejected(
                "create_site",
                "You must accept all confirmations to proceed",
            ));
        }
        let mut backend = self.backend.lock().await;
        let email = backend.email_for(access_token)?;
        let site_id = mock_id("mock_site");
        backend.crawls.insert(site_id.clone(), 0);
        let signup = backend.signups.entry(email).or_default();
        signup.site_id = Some(site_id.clone());
        signup.domain = Some(domain.to_string());

        Ok(SiteCreated {
            site_id,
            domain: domain.to_string(),
            scraping_status: ScrapingStatus::InProgress,
        })
    }

    async fn get_site_status(
        &self,
        access_token: &SecretString,
        site_id: &str,
    ) -> Result<SiteStatus, ApiError> {
        self.delay().await;
        let mut backend = self.backend.lock().await;
        backend.email_for(access_token)?;
        let progress = backend
            .crawls
            .get_mut(site_id)
            .ok_or_else(|| rejected("get_site_status", "Site not found"))?;
        *progress = progress.saturating_add(PROGRESS_PER_POLL).min(100);

        Ok(SiteStatus {
            scraping_status: if *progress >= 100 {
                ScrapingStatus::Completed
            } else {
                ScrapingStatus::InProgress
            },
            scraping_progress: *progress,
        })
    }

    async fn upload_text(
        &self,
        access_token: &SecretString,
        site_id: &str,
        text: &str,
    ) -> Result<UploadReceipt, ApiError> {
        self.delay().await;
        self.backend.lock().await.email_for(access_token)?;
        info!(site_id, chars = text.len(), "MOCK: uploading text content");
        Ok(UploadReceipt {
            upload_id: mock_id("mock_upload"),
            status: "processing".to_string(),
        })
    }

    async fn upload_file(
        &self,
        access_token: &SecretString,
        site_id: &str,
        file: &FileUpload,
    ) -> Result<UploadReceipt, ApiError> {
        self.delay().await;
        self.backend.lock().await.email_for(access_token)?;
        info!(site_id, file = %file.name, "MOCK: uploading file");
        Ok(UploadReceipt {
            upload_id: mock_id("mock_upload"),
            status: "processing".to_string(),
        })
    }

    async fn update_contact_info(
        &self,
        access_token: &SecretString,
        _site_id: &str,
        contact: &ContactInfo,
    ) -> Result<(), ApiError> {
        self.delay().await;
        let mut backend = self.backend.lock().await;
        let email = backend.email_for(access_token)?;
        let signup = backend.signups.entry(email).or_default();
        signup.support_email = Some(contact.support_email.clone());
        signup.company_name = contact.company_name.clone();
        signup.support_phone = contact.support_phone.clone();
        signup.address = contact.address.clone();
        signup.support_person_name = contact.support_person_name.clone();
        signup.content_complete = Some(true);
        Ok(())
    }

    async fn generate_widget(
        &self,
        access_token: &SecretString,
        site_id: &str,
    ) -> Result<WidgetScript, ApiError> {
        self.delay().await;
        let mut backend = self.backend.lock().await;
        let email = backend.email_for(access_token)?;
        let script_tag = widget_script_tag(&self.cdn_base, site_id);
        backend.signups.entry(email).or_default().widget_script = Some(script_tag.clone());
        Ok(WidgetScript {
            script_tag,
            site_id: site_id.to_string(),
        })
    }

    async fn verify_widget(
        &self,
        access_token: &SecretString,
        _site_id: &str,
        page_url: &str,
    ) -> Result<WidgetVerification, ApiError> {
        self.delay().await;
        let mut backend = self.backend.lock().await;
        let email = backend.email_for(access_token)?;
        info!(page_url, "MOCK: verifying widget");
        backend.signups.entry(email).or_default().widget_verified = Some(true);
        Ok(WidgetVerification {
            verified: true,
            message: "Widget verified successfully".to_string(),
        })
    }

    async fn get_user_state(&self, access_token: &SecretString) -> Result<UserState, ApiError> {
        self.delay().await;
        let backend = self.backend.lock().await;
        let email = backend.email_for(access_token)?;
        Ok(UserState {
            email: Some(email.clone()),
            current_step: backend.last_step.get(&email).copied(),
            session_data: backend.signups.get(&email).cloned().unwrap_or_default(),
        })
    }

    async fn update_step(
        &self,
        _access_token: Option<&SecretString>,
        completed_step: OnboardingStep,
        context: &StepContext,
    ) -> Result<(), ApiError> {
        self.delay().await;
        info!(step = %completed_step, "MOCK: step progress saved");
        self.backend
            .lock()
            .await
            .last_step
            .insert(context.email.clone(), i64::from(context.step.number()));
        Ok(())
    }

    async fn complete_onboarding(
        &self,
        access_token: &SecretString,
    ) -> Result<OnboardingCompleted, ApiError> {
        self.delay().await;
        self.backend.lock().await.email_for(access_token)?;
        Ok(OnboardingCompleted {
            success: true,
            redirect_url: Some("https://dashboard.helloyuno.com".to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn api() -> MockApiClient {
        MockApiClient::new("https://cdn.helloyuno.com")
    }

    async fn signed_up(api: &MockApiClient) -> SecretString {
        api.send_otp("a@b.com").await.unwrap();
        let verified = api.verify_otp("a@b.com", "123456").await.unwrap();
        let password = SecretString::from("Abcdef12".to_string());
        api.complete_signup(&password, &verified.temp_token)
            .await
            .unwrap()
            .access_token
    }

    #[tokio::test]
    async fn rejects_malformed_code() {
        let err = api().verify_otp("a@b.com", "12ab56").await.unwrap_err();
        assert_eq!(err.user_message(), "Invalid OTP");
    }

    #[tokio::test]
    async fn temp_token_is_single_use() {
        let api = api();
        let verified = api.verify_otp("a@b.com", "123456").await.unwrap();
        let password = SecretString::from("Abcdef12".to_string());
        api.complete_signup(&password, &verified.temp_token).await.unwrap();
        let err = api
            .complete_signup(&password, &verified.temp_token)
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn crawl_completes_after_two_polls() {
        let api = api();
        let token = signed_up(&api).await;
        let site = api
            .create_site(&token, "https://example.com", SiteConfirmations::all(true))
            .await
            .unwrap();

        let first = api.get_site_status(&token, &site.site_id).await.unwrap();
        assert_eq!(first.scraping_status, ScrapingStatus::InProgress);
        assert_eq!(first.scraping_progress, 50);
        let second = api.get_site_status(&token, &site.site_id).await.unwrap();
        assert_eq!(second.scraping_status, ScrapingStatus::Completed);
        assert_eq!(second.scraping_progress, 100);
    }

    #[tokio::test]
    async fn user_state_tracks_flags() {
        let api = api();
        let token = signed_up(&api).await;
        let site = api
            .create_site(&token, "https://example.com", SiteConfirmations::all(true))
            .await
            .unwrap();

        let state = api.get_user_state(&token).await.unwrap();
        let data = state.session_data;
        assert_eq!(state.email.as_deref(), Some("a@b.com"));
        assert_eq!(data.otp_verified, Some(true));
        assert_eq!(data.profile_completed, Some(true));
        assert_eq!(data.site_id, Some(site.site_id));
        assert!(data.content_complete.is_none());
    }

    #[tokio::test]
    async fn unknown_access_token_is_unauthorized() {
        let token = SecretString::from("nope".to_string());
        let err = api().get_user_state(&token).await.unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn widget_script_references_site() {
        let api = api();
        let token = signed_up(&api).await;
        let widget = api.generate_widget(&token, "mock_site_x").await.unwrap();
        assert!(widget.script_tag.contains(r#"site_id="mock_site_x""#));
        assert!(widget.script_tag.ends_with("defer></script>"));
    }
}
