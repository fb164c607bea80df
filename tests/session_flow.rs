//! End-to-end session scenarios against the mock backend.
//!
//! A "restart" is a new `OnboardingSession` over the same store and API;
//! `end_session` on the store plays the part of closing the browser tab.

use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::time::timeout;

use yuno_onboarding::api::{MockApiClient, OnboardingApi, SiteConfirmations};
use yuno_onboarding::error::{Error, SessionError};
use yuno_onboarding::onboarding::{
    ContactInfo, ContentSubmission, OnboardingSession, OnboardingState, OnboardingStep,
    ProcessingStatus, RestoreSource, ScrapingStatus, SessionConfig,
};
use yuno_onboarding::store::{LibSqlStore, MemoryStore, SessionStore};

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

fn config() -> SessionConfig {
    SessionConfig {
        poll_interval: Duration::from_millis(5),
    }
}

fn password() -> SecretString {
    SecretString::from("Abcdef12".to_string())
}

fn contact() -> ContactInfo {
    ContactInfo {
        support_email: "help@example.com".into(),
        company_name: Some("Acme".into()),
        ..Default::default()
    }
}

/// Walk a session through steps 1–3.
async fn sign_up(session: &OnboardingSession) {
    session.send_otp("owner@example.com").await.unwrap();
    session.advance().await.unwrap();
    session.verify_otp("owner@example.com", "123456").await.unwrap();
    session.advance().await.unwrap();
    session.complete_signup(&password()).await.unwrap();
    session.advance().await.unwrap();
}

#[tokio::test]
async fn happy_path_reaches_completion() {
    timeout(TEST_TIMEOUT, async {
        let session = OnboardingSession::new(
            Arc::new(MockApiClient::new("https://cdn.helloyuno.com")),
            Arc::new(MemoryStore::new()),
            config(),
        );
        assert_eq!(session.restore().await.unwrap(), RestoreSource::Fresh);
        assert_eq!(session.state().await.progress_percent(), 0);

        sign_up(&session).await;
        assert_eq!(session.current_step().await, OnboardingStep::DomainSetup);
        assert_eq!(session.state().await.progress_percent(), 50);

        session
            .create_site("https://example.com", SiteConfirmations::all(true))
            .await
            .unwrap();
        let poller = session.watch_scraping().await.unwrap();
        poller.join().await;
        let site = session.state().await.site_data;
        assert_eq!(site.scraping_status, ScrapingStatus::Completed);
        assert_eq!(site.scraping_progress, 100);
        session.advance().await.unwrap();

        session
            .upload_content(ContentSubmission {
                text_content: Some("Returns accepted within 30 days.".into()),
                files: vec![],
                contact_info: contact(),
            })
            .await
            .unwrap();
        session.advance().await.unwrap();

        let script = session.generate_widget().await.unwrap();
        assert!(script.starts_with(r#"<script src="https://cdn.helloyuno.com/widget.js""#));
        session.verify_widget("https://example.com").await.unwrap();
        session.complete_onboarding().await.unwrap();

        let state = session.state().await;
        assert_eq!(state.current_step, OnboardingStep::Complete);
        assert_eq!(state.progress_percent(), 100);
        assert!(state.widget_data.is_verified);
        assert_eq!(state.widget_data.verification_url, "https://example.com");
        assert!(!state.loading);
        assert!(state.error.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn reload_restores_snapshot_and_temp_token() {
    timeout(TEST_TIMEOUT, async {
        let api = Arc::new(MockApiClient::new("https://cdn.helloyuno.com"));
        let store = Arc::new(MemoryStore::new());

        let first = OnboardingSession::new(api.clone(), store.clone(), config());
        first.restore().await.unwrap();
        first.send_otp("owner@example.com").await.unwrap();
        first.advance().await.unwrap();
        first.verify_otp("owner@example.com", "123456").await.unwrap();
        first.advance().await.unwrap();
        drop(first);

        let second = OnboardingSession::new(api, store, config());
        assert_eq!(second.restore().await.unwrap(), RestoreSource::Snapshot);
        assert_eq!(second.current_step().await, OnboardingStep::PasswordSetup);
        assert!(second.has_temp_token().await);

        // The restored temp token still authorizes the password step.
        second.complete_signup(&password()).await.unwrap();
        assert!(second.state().await.is_password_set);
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn new_tab_resumes_from_server_flags() {
    timeout(TEST_TIMEOUT, async {
        let api = Arc::new(MockApiClient::new("https://cdn.helloyuno.com"));
        let store = Arc::new(MemoryStore::new());

        let first = OnboardingSession::new(api.clone(), store.clone(), config());
        first.restore().await.unwrap();
        sign_up(&first).await;
        first
            .create_site("https://example.com", SiteConfirmations::all(true))
            .await
            .unwrap();
        drop(first);

        // Session-scoped data is gone; only the access token remains.
        store.end_session().await;
        assert!(store.load_snapshot().await.unwrap().is_none());

        let second = OnboardingSession::new(api, store, config());
        assert_eq!(second.restore().await.unwrap(), RestoreSource::Server);

        let state = second.state().await;
        assert_eq!(state.current_step, OnboardingStep::ContentIngestion);
        assert_eq!(state.email, "owner@example.com");
        assert!(state.is_email_verified);
        assert!(state.is_password_set);
        assert_eq!(state.site_data.domain, "https://example.com");
        assert!(state.site_data.has_site());

        // Resumed sessions can carry on where they left off.
        second
            .upload_content(ContentSubmission {
                contact_info: contact(),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(
            second.state().await.content_data.processing_status,
            ProcessingStatus::Processing
        );
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn rejected_token_falls_back_without_error() {
    timeout(TEST_TIMEOUT, async {
        let store = Arc::new(MemoryStore::new());
        store
            .save_access_token(&SecretString::from("revoked".to_string()))
            .await
            .unwrap();

        let session = OnboardingSession::new(
            Arc::new(MockApiClient::new("https://cdn.helloyuno.com")),
            store.clone(),
            config(),
        );
        assert_eq!(session.restore().await.unwrap(), RestoreSource::Fresh);

        let state = session.state().await;
        assert_eq!(state, OnboardingState::default());
        assert!(state.error.is_none());
        assert!(store.load_access_token().await.unwrap().is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn failed_action_keeps_step_and_reports() {
    timeout(TEST_TIMEOUT, async {
        let session = OnboardingSession::new(
            Arc::new(MockApiClient::new("https://cdn.helloyuno.com")),
            Arc::new(MemoryStore::new()),
            config(),
        );
        session.send_otp("owner@example.com").await.unwrap();
        session.advance().await.unwrap();

        let err = session
            .verify_otp("owner@example.com", "12ab")
            .await
            .unwrap_err();
        assert_eq!(err.user_message(), "Invalid OTP");

        let state = session.state().await;
        assert_eq!(state.error.as_deref(), Some("Invalid OTP"));
        assert!(!state.is_email_verified);
        assert!(!state.loading);

        let err = session.advance().await.unwrap_err();
        assert!(matches!(
            err,
            Error::Session(SessionError::StepIncomplete(OnboardingStep::OtpVerification))
        ));

        // The next attempt clears the old error.
        session.verify_otp("owner@example.com", "654321").await.unwrap();
        assert!(session.state().await.error.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn refused_confirmations_leave_no_site() {
    timeout(TEST_TIMEOUT, async {
        let session = OnboardingSession::new(
            Arc::new(MockApiClient::new("https://cdn.helloyuno.com")),
            Arc::new(MemoryStore::new()),
            config(),
        );
        sign_up(&session).await;

        let err = session
            .create_site("https://example.com", SiteConfirmations::all(false))
            .await
            .unwrap_err();
        assert_eq!(
            err.user_message(),
            "You must accept all confirmations to proceed"
        );
        assert!(!session.state().await.site_data.has_site());
        assert!(session.watch_scraping().await.is_none());
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn slow_backend_rejects_overlapping_actions() {
    timeout(TEST_TIMEOUT, async {
        let api = Arc::new(
            MockApiClient::new("https://cdn.helloyuno.com")
                .with_latency(Duration::from_millis(100)),
        );
        let session = OnboardingSession::new(api, Arc::new(MemoryStore::new()), config());

        let pending = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.send_otp("owner@example.com").await })
        };
        // Wait until the first action holds the slot.
        while !session.is_busy() {
            tokio::task::yield_now().await;
        }

        let err = session.send_otp("other@example.com").await.unwrap_err();
        assert!(matches!(err, Error::Session(SessionError::ActionInFlight)));

        pending.await.unwrap().unwrap();
        assert_eq!(session.state().await.email, "owner@example.com");
    })
    .await
    .expect("test timed out");
}

#[tokio::test]
async fn libsql_store_survives_restart() {
    timeout(TEST_TIMEOUT, async {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("onboarding.db");
        let api: Arc<dyn OnboardingApi> = Arc::new(MockApiClient::new("https://cdn.helloyuno.com"));

        {
            let store = Arc::new(LibSqlStore::new_local(&path, "tab-1").await.unwrap());
            let session = OnboardingSession::new(Arc::clone(&api), store, config());
            session.restore().await.unwrap();
            sign_up(&session).await;
        }

        // Same session id: the snapshot is still there, but the access token
        // wins and the server decides.
        let store = Arc::new(LibSqlStore::new_local(&path, "tab-1").await.unwrap());
        let session = OnboardingSession::new(api, store, config());
        assert_eq!(session.restore().await.unwrap(), RestoreSource::Server);
        assert_eq!(session.current_step().await, OnboardingStep::DomainSetup);
    })
    .await
    .expect("test timed out");
}
