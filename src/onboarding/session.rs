//! OnboardingSession — owns the wizard state and runs every step's action.
//!
//! All network-backed actions share one contract:
//! 1. Claim the in-flight slot (a second mutating call is rejected), set
//!    `loading`, clear `error`.
//! 2. On success, merge the response into the state.
//! 3. On failure, store the user-facing message in `error`.
//! 4. Always clear `loading`, persist the snapshot, and notify subscribers.
//!
//! Responses that arrive after a `reset` are dropped on the floor: each
//! action remembers the session generation it started in.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};
use tokio::sync::{broadcast, Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::api::{
    FileUpload, OnboardingApi, OnboardingCompleted, OtpSent, SiteConfirmations, SiteCreated,
    SiteStatus, StepContext, WidgetVerification,
};
use crate::error::{ApiError, Error, Result, SessionError};
use crate::store::SessionStore;

use super::model::{
    ContactInfo, OnboardingState, PersistedSnapshot, ProcessingStatus, ScrapingStatus,
    UploadedFile,
};
use super::poller::{spawn_status_poller, StatusPoller};
use super::reconcile::reconcile;
use super::step::OnboardingStep;

/// Broadcast channel capacity for state-change events.
const EVENT_CAPACITY: usize = 64;

const WIDGET_NOT_FOUND: &str =
    "Widget not found on the specified page. Please make sure you've added the script correctly.";

/// Tunables for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// How often to re-check scraping status while a crawl runs.
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(3),
        }
    }
}

/// Emitted after every state change.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    StateChanged(Box<OnboardingState>),
}

/// Where `restore` got its state from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RestoreSource {
    /// Reconciled against the server using the stored access token.
    Server,
    /// Loaded from the session-scoped snapshot.
    Snapshot,
    /// Nothing to restore; a brand-new signup.
    Fresh,
}

/// Everything the user fills in on the content step.
#[derive(Debug, Clone, Default)]
pub struct ContentSubmission {
    pub text_content: Option<String>,
    pub files: Vec<FileUpload>,
    pub contact_info: ContactInfo,
}

#[derive(Debug, Default)]
struct Credentials {
    temp_token: Option<SecretString>,
    access_token: Option<SecretString>,
}

#[derive(Debug, Default)]
struct Inner {
    state: OnboardingState,
    credentials: Credentials,
}

/// Proof that an action holds the in-flight slot.
struct ActionTicket {
    generation: u64,
}

fn duplicate(token: &SecretString) -> SecretString {
    SecretString::from(token.expose_secret().to_string())
}

/// The onboarding state container.
pub struct OnboardingSession {
    api: Arc<dyn OnboardingApi>,
    store: Arc<dyn SessionStore>,
    config: SessionConfig,
    inner: RwLock<Inner>,
    in_flight: AtomicBool,
    generation: AtomicU64,
    restored: AtomicBool,
    persist_lock: Mutex<()>,
    events: broadcast::Sender<SessionEvent>,
}

impl OnboardingSession {
    /// Create a fresh session. Call [`restore`](Self::restore) before use to
    /// pick up a previous run.
    pub fn new(
        api: Arc<dyn OnboardingApi>,
        store: Arc<dyn SessionStore>,
        config: SessionConfig,
    ) -> Arc<Self> {
        let (events, _rx) = broadcast::channel(EVENT_CAPACITY);
        Arc::new(Self {
            api,
            store,
            config,
            inner: RwLock::new(Inner::default()),
            in_flight: AtomicBool::new(false),
            generation: AtomicU64::new(0),
            restored: AtomicBool::new(false),
            persist_lock: Mutex::new(()),
            events,
        })
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// A copy of the current state.
    pub async fn state(&self) -> OnboardingState {
        self.inner.read().await.state.clone()
    }

    pub async fn current_step(&self) -> OnboardingStep {
        self.inner.read().await.state.current_step
    }

    pub async fn is_step_completed(&self, step: OnboardingStep) -> bool {
        self.inner.read().await.state.is_step_completed(step)
    }

    pub async fn can_proceed_to_next_step(&self) -> bool {
        self.inner.read().await.state.can_proceed_to_next_step()
    }

    pub async fn can_navigate_to(&self, step: OnboardingStep) -> bool {
        self.inner.read().await.state.can_navigate_to(step)
    }

    pub async fn has_temp_token(&self) -> bool {
        self.inner.read().await.credentials.temp_token.is_some()
    }

    pub async fn has_access_token(&self) -> bool {
        self.inner.read().await.credentials.access_token.is_some()
    }

    /// Whether a mutating action is currently pending.
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Subscribe to state-change events.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Rehydrate from a previous run. Runs at most once per session.
    ///
    /// With a stored access token the server's flags decide the step. If
    /// that call fails the token is discarded and the local snapshot (or a
    /// fresh state) is used instead; `error` is left untouched either way.
    pub async fn restore(&self) -> Result<RestoreSource> {
        if self.restored.swap(true, Ordering::SeqCst) {
            return Err(SessionError::AlreadyRestored.into());
        }

        let access_token = match self.store.load_access_token().await {
            Ok(token) => token,
            Err(e) => {
                warn!("Failed to read stored access token: {e}");
                None
            }
        };

        if let Some(token) = access_token {
            match self.api.get_user_state(&token).await {
                Ok(user) => {
                    let state = reconcile(&user);
                    let step = state.current_step;
                    {
                        let mut inner = self.inner.write().await;
                        inner.state = state;
                        inner.credentials = Credentials {
                            temp_token: None,
                            access_token: Some(token),
                        };
                    }
                    info!(step = %step, "Resumed onboarding from server session");
                    self.after_change().await;
                    return Ok(RestoreSource::Server);
                }
                Err(e) => {
                    warn!(error = %e, "Resume failed; discarding stored access token");
                    if let Err(e) = self.store.clear_access_token().await {
                        warn!("Failed to clear stored access token: {e}");
                    }
                }
            }
        }

        let source = match self.load_snapshot().await {
            Some(snapshot) => {
                let temp_token = self.store.load_temp_token().await.unwrap_or_else(|e| {
                    warn!("Failed to read stored temp token: {e}");
                    None
                });
                let mut inner = self.inner.write().await;
                inner.state = OnboardingState::from_snapshot(snapshot);
                inner.credentials = Credentials {
                    temp_token,
                    access_token: None,
                };
                info!(step = %inner.state.current_step, "Restored onboarding from local snapshot");
                RestoreSource::Snapshot
            }
            None => {
                debug!("No saved onboarding state; starting fresh");
                RestoreSource::Fresh
            }
        };

        self.after_change().await;
        Ok(source)
    }

    /// Read and parse the snapshot. A corrupt one is removed and ignored.
    async fn load_snapshot(&self) -> Option<PersistedSnapshot> {
        let raw = match self.store.load_snapshot().await {
            Ok(raw) => raw?,
            Err(e) => {
                warn!("Failed to read onboarding snapshot: {e}");
                return None;
            }
        };

        match serde_json::from_str::<PersistedSnapshot>(&raw) {
            Ok(snapshot) => Some(snapshot),
            Err(e) => {
                warn!("Failed to load saved onboarding state: {e}");
                if let Err(e) = self.store.clear_snapshot().await {
                    warn!("Failed to clear corrupt snapshot: {e}");
                }
                None
            }
        }
    }

    /// Forget everything: state, credentials, snapshot, stored tokens.
    pub async fn reset(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        {
            let mut inner = self.inner.write().await;
            *inner = Inner::default();
        }

        {
            let _guard = self.persist_lock.lock().await;
            if let Err(e) = self.store.clear_snapshot().await {
                warn!("Failed to clear onboarding snapshot: {e}");
            }
            if let Err(e) = self.store.clear_temp_token().await {
                warn!("Failed to clear temp token: {e}");
            }
            if let Err(e) = self.store.clear_access_token().await {
                warn!("Failed to clear access token: {e}");
            }
        }

        info!("Onboarding state reset");
        self.publish().await;
    }

    // ── Navigation ──────────────────────────────────────────────────

    /// Move to the next step once the current one is complete.
    ///
    /// The backend is told about the new step on a background task; if
    /// that fails it is only logged.
    pub async fn advance(&self) -> Result<OnboardingStep> {
        let (previous, next, context_email, access_token) = {
            let mut inner = self.inner.write().await;
            let current = inner.state.current_step;
            let next = current.next().ok_or(SessionError::AlreadyComplete)?;
            if inner.state.loading {
                return Err(SessionError::ActionInFlight.into());
            }
            if !inner.state.is_step_completed(current) {
                return Err(SessionError::StepIncomplete(current).into());
            }
            inner.state.current_step = next;
            (
                current,
                next,
                inner.state.email.clone(),
                inner.credentials.access_token.as_ref().map(duplicate),
            )
        };

        info!(from = %previous, to = %next, "Advanced onboarding step");
        self.after_change().await;
        self.notify_step_progress(previous, next, context_email, access_token);
        Ok(next)
    }

    /// Fire-and-forget progress notification.
    fn notify_step_progress(
        &self,
        completed: OnboardingStep,
        next: OnboardingStep,
        email: String,
        access_token: Option<SecretString>,
    ) {
        let api = Arc::clone(&self.api);
        tokio::spawn(async move {
            let context = StepContext { email, step: next };
            if let Err(e) = api
                .update_step(access_token.as_ref(), completed, &context)
                .await
            {
                warn!(step = %completed, "Failed to save step progress: {e}");
            }
        });
    }

    /// Jump to a step. `n` is clamped to 1–7; steps past an incomplete one
    /// are refused.
    pub async fn go_to_step(&self, n: i64) -> Result<OnboardingStep> {
        let target = OnboardingStep::clamped(n);
        {
            let mut inner = self.inner.write().await;
            if !inner.state.can_navigate_to(target) {
                return Err(SessionError::StepLocked(target).into());
            }
            inner.state.current_step = target;
        }
        debug!(step = %target, "Navigated to step");
        self.after_change().await;
        Ok(target)
    }

    /// Developer override: jump anywhere without the completion gate.
    pub async fn force_step(&self, step: OnboardingStep) {
        self.inner.write().await.state.current_step = step;
        warn!(step = %step, "Step forced without completion check");
        self.after_change().await;
    }

    // ── Actions ─────────────────────────────────────────────────────

    /// Step 1: email a one-time code.
    pub async fn send_otp(&self, email: &str) -> Result<OtpSent> {
        self.run_action(
            "send_otp",
            async { self.api.send_otp(email).await.map_err(Error::from) },
            |inner, _| inner.state.email = email.to_string(),
        )
        .await
    }

    /// Step 2: check the code; keeps the temp token for the password step.
    pub async fn verify_otp(&self, email: &str, code: &str) -> Result<()> {
        self.run_action(
            "verify_otp",
            async { self.api.verify_otp(email, code).await.map_err(Error::from) },
            |inner, verified| {
                inner.state.is_email_verified = true;
                inner.credentials.temp_token = Some(duplicate(&verified.temp_token));
            },
        )
        .await
        .map(|_| ())
    }

    /// Step 3: set the password, trading the temp token for an access token.
    /// Returns the new user id.
    pub async fn complete_signup(&self, password: &SecretString) -> Result<String> {
        let temp_token = self.inner.read().await.credentials.temp_token.as_ref().map(duplicate);
        let Some(temp_token) = temp_token else {
            return self
                .fail_precondition(SessionError::MissingCredential("verification token"))
                .await;
        };

        self.run_action(
            "complete_signup",
            async {
                self.api
                    .complete_signup(password, &temp_token)
                    .await
                    .map_err(Error::from)
            },
            |inner, signup| {
                inner.state.is_password_set = true;
                inner.credentials.access_token = Some(duplicate(&signup.access_token));
                inner.credentials.temp_token = None;
            },
        )
        .await
        .map(|signup| signup.user_id)
    }

    /// Step 4: register the website and start crawling it.
    pub async fn create_site(
        &self,
        domain: &str,
        confirmations: SiteConfirmations,
    ) -> Result<SiteCreated> {
        let access_token = self.require_access_token().await?;

        self.run_action(
            "create_site",
            async {
                self.api
                    .create_site(&access_token, domain, confirmations)
                    .await
                    .map_err(Error::from)
            },
            |inner, site| {
                let site_data = &mut inner.state.site_data;
                site_data.site_id = Some(site.site_id.clone());
                site_data.domain = domain.to_string();
                site_data.scraping_status = ScrapingStatus::InProgress;
                site_data.scraping_progress = 0;
            },
        )
        .await
    }

    /// One scraping-status poll. Not an action: it does not touch `loading`
    /// or `error`, and may run while an action is pending.
    pub async fn refresh_site_status(&self) -> Result<SiteStatus> {
        let (site_id, access_token) = {
            let inner = self.inner.read().await;
            (
                inner.state.site_data.site_id.clone(),
                inner.credentials.access_token.as_ref().map(duplicate),
            )
        };
        let site_id = site_id.ok_or(SessionError::MissingSite)?;
        let access_token = access_token.ok_or(SessionError::MissingCredential("access token"))?;
        let generation = self.generation();

        let status = self.api.get_site_status(&access_token, &site_id).await?;

        {
            let mut inner = self.inner.write().await;
            let site_data = &mut inner.state.site_data;
            if self.generation() != generation || site_data.site_id.as_deref() != Some(site_id.as_str()) {
                debug!(site_id = %site_id, "Discarding status for a superseded site");
                return Ok(status);
            }
            site_data.scraping_status = status.scraping_status;
            site_data.scraping_progress = status.scraping_progress.min(100);
        }
        self.after_change().await;
        Ok(status)
    }

    /// Start polling scraping status, if a crawl is running.
    pub async fn watch_scraping(self: &Arc<Self>) -> Option<StatusPoller> {
        spawn_status_poller(Arc::clone(self), self.config.poll_interval).await
    }

    /// Step 5: upload support text and files, then save contact details.
    pub async fn upload_content(&self, submission: ContentSubmission) -> Result<Vec<UploadedFile>> {
        let access_token = self.require_access_token().await?;
        let site_id = self.inner.read().await.state.site_data.site_id.clone();
        let Some(site_id) = site_id else {
            return self.fail_precondition(SessionError::MissingSite).await;
        };

        let call = async {
            let mut uploads = Vec::new();
            if let Some(text) = submission
                .text_content
                .as_deref()
                .filter(|t| !t.trim().is_empty())
            {
                let receipt = self.api.upload_text(&access_token, &site_id, text).await?;
                uploads.push(UploadedFile {
                    upload_id: receipt.upload_id,
                    name: None,
                    status: receipt.status,
                });
            }
            for file in &submission.files {
                let receipt = self.api.upload_file(&access_token, &site_id, file).await?;
                uploads.push(UploadedFile {
                    upload_id: receipt.upload_id,
                    name: Some(file.name.clone()),
                    status: receipt.status,
                });
            }
            self.api
                .update_contact_info(&access_token, &site_id, &submission.contact_info)
                .await?;
            Ok::<_, Error>(uploads)
        };

        self.run_action("upload_content", call, |inner, uploads| {
            let content = &mut inner.state.content_data;
            content.text_content = submission.text_content.clone().unwrap_or_default();
            content.uploaded_files = uploads.clone();
            content.contact_info = submission.contact_info.clone();
            content.processing_status = ProcessingStatus::Processing;
        })
        .await
    }

    /// Step 6: fetch the embeddable script tag.
    pub async fn generate_widget(&self) -> Result<String> {
        let access_token = self.require_access_token().await?;
        let site_id = self.inner.read().await.state.site_data.site_id.clone();
        let Some(site_id) = site_id else {
            return self.fail_precondition(SessionError::MissingSite).await;
        };

        self.run_action(
            "generate_widget",
            async {
                self.api
                    .generate_widget(&access_token, &site_id)
                    .await
                    .map_err(Error::from)
            },
            |inner, widget| inner.state.widget_data.script_tag = widget.script_tag.clone(),
        )
        .await
        .map(|widget| widget.script_tag)
    }

    /// Step 6: ask the backend to find the widget on a live page.
    pub async fn verify_widget(&self, page_url: &str) -> Result<WidgetVerification> {
        let access_token = self.require_access_token().await?;
        let site_id = self.inner.read().await.state.site_data.site_id.clone();
        let Some(site_id) = site_id else {
            return self.fail_precondition(SessionError::MissingSite).await;
        };

        self.run_action(
            "verify_widget",
            async {
                let result = self
                    .api
                    .verify_widget(&access_token, &site_id, page_url)
                    .await?;
                if !result.verified {
                    let message = if result.message.is_empty() {
                        WIDGET_NOT_FOUND.to_string()
                    } else {
                        result.message
                    };
                    return Err(Error::from(ApiError::Rejected {
                        operation: "verify_widget",
                        status: None,
                        message,
                    }));
                }
                Ok::<_, Error>(result)
            },
            |inner, _| {
                inner.state.widget_data.is_verified = true;
                inner.state.widget_data.verification_url = page_url.to_string();
            },
        )
        .await
    }

    /// Step 6 escape hatch: mark the widget as installed without checking.
    pub async fn skip_widget_verification(&self) {
        {
            let mut inner = self.inner.write().await;
            inner.state.widget_data.is_verified = true;
            inner.state.widget_data.verification_url = "skipped".to_string();
        }
        info!("Widget verification skipped");
        self.after_change().await;
    }

    /// Finish onboarding on the backend and land on the completion step.
    pub async fn complete_onboarding(&self) -> Result<OnboardingCompleted> {
        let access_token = self.require_access_token().await?;

        self.run_action(
            "complete_onboarding",
            async {
                self.api
                    .complete_onboarding(&access_token)
                    .await
                    .map_err(Error::from)
            },
            |inner, _| inner.state.current_step = OnboardingStep::Complete,
        )
        .await
    }

    // ── Internals ───────────────────────────────────────────────────

    async fn require_access_token(&self) -> Result<SecretString> {
        let token = self.inner.read().await.credentials.access_token.as_ref().map(duplicate);
        match token {
            Some(token) => Ok(token),
            None => {
                self.fail_precondition(SessionError::MissingCredential("access token"))
                    .await
            }
        }
    }

    /// Record a precondition failure as the visible error and return it.
    ///
    /// Takes the in-flight slot for the write, so a busy session reports
    /// `ActionInFlight` and the pending action keeps its `error`.
    async fn fail_precondition<T>(&self, err: SessionError) -> Result<T> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(error = %err, "Rejected: another onboarding action is in flight");
            return Err(SessionError::ActionInFlight.into());
        }

        warn!(error = %err, "Onboarding action refused");
        self.inner.write().await.state.error = Some(err.to_string());
        self.in_flight.store(false, Ordering::Release);
        self.publish().await;
        Err(err.into())
    }

    async fn begin_action(&self, action: &'static str) -> Result<ActionTicket> {
        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            warn!(action, "Rejected: another onboarding action is in flight");
            return Err(SessionError::ActionInFlight.into());
        }

        let generation = {
            let mut inner = self.inner.write().await;
            inner.state.loading = true;
            inner.state.error = None;
            self.generation()
        };
        debug!(action, "Onboarding action started");
        self.publish().await;
        Ok(ActionTicket { generation })
    }

    /// Run `call` under the three-phase contract, applying `merge` on success.
    async fn run_action<T, Fut, M>(&self, action: &'static str, call: Fut, merge: M) -> Result<T>
    where
        Fut: Future<Output = Result<T>>,
        M: FnOnce(&mut Inner, &T),
    {
        let ticket = self.begin_action(action).await?;
        let outcome = call.await;

        let applied = {
            let mut inner = self.inner.write().await;
            if self.generation() == ticket.generation {
                match &outcome {
                    Ok(value) => merge(&mut *inner, value),
                    Err(e) => inner.state.error = Some(e.user_message()),
                }
                inner.state.loading = false;
                true
            } else {
                false
            }
        };
        self.in_flight.store(false, Ordering::Release);

        match &outcome {
            Ok(_) => info!(action, "Onboarding action succeeded"),
            Err(e) => warn!(action, error = %e, "Onboarding action failed"),
        }

        if applied {
            self.after_change().await;
        } else {
            debug!(action, "Discarded response for a superseded session");
        }
        outcome
    }

    async fn after_change(&self) {
        self.persist().await;
        self.publish().await;
    }

    /// Mirror the snapshot and credentials into the store. Failures are
    /// logged; the in-memory state is already updated.
    async fn persist(&self) {
        let _guard = self.persist_lock.lock().await;
        let (snapshot, temp_token, access_token) = {
            let inner = self.inner.read().await;
            (
                inner.state.snapshot(),
                inner.credentials.temp_token.as_ref().map(duplicate),
                inner.credentials.access_token.as_ref().map(duplicate),
            )
        };

        match serde_json::to_string(&snapshot) {
            Ok(json) => {
                if let Err(e) = self.store.save_snapshot(&json).await {
                    warn!("Failed to persist onboarding snapshot: {e}");
                }
            }
            Err(e) => warn!("Failed to serialize onboarding snapshot: {e}"),
        }

        let temp_result = match &temp_token {
            Some(token) => self.store.save_temp_token(token).await,
            None => self.store.clear_temp_token().await,
        };
        if let Err(e) = temp_result {
            warn!("Failed to persist temp token: {e}");
        }

        let access_result = match &access_token {
            Some(token) => self.store.save_access_token(token).await,
            None => self.store.clear_access_token().await,
        };
        if let Err(e) = access_result {
            warn!("Failed to persist access token: {e}");
        }
    }

    async fn publish(&self) {
        let state = self.state().await;
        // No subscribers is fine.
        let _ = self.events.send(SessionEvent::StateChanged(Box::new(state)));
    }
}
