//! CLI wizard — a line-oriented view over an `OnboardingSession`.
//!
//! Each loop iteration renders the current step, prompts for that step's
//! fields, validates them, runs the step's action, and advances on success.
//! Any prompt also accepts a command: `:back`, `:reset`, `:skip`, `:resend`,
//! `:quit`.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use secrecy::SecretString;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, Lines};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api::{FileUpload, SiteConfirmations};
use crate::error::{Error, Result};
use crate::onboarding::validation::{
    mime_type_for, normalize_domain, normalize_email, normalize_page_url, validate_contact_info,
    validate_files, validate_otp, validate_password,
};
use crate::onboarding::{
    ContactInfo, ContentSubmission, OnboardingSession, OnboardingStep, ScrapingStatus,
    SessionEvent, StatusPoller,
};

/// Something typed at a prompt that is not an answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Back,
    Reset,
    Skip,
    Resend,
    Quit,
}

/// Minimum wait between verification codes.
pub const RESEND_COOLDOWN: Duration = Duration::from_secs(60);

impl Command {
    pub fn parse(input: &str) -> Option<Self> {
        match input.trim().to_ascii_lowercase().as_str() {
            ":back" => Some(Self::Back),
            ":reset" => Some(Self::Reset),
            ":skip" => Some(Self::Skip),
            ":resend" => Some(Self::Resend),
            ":quit" | ":q" => Some(Self::Quit),
            _ => None,
        }
    }
}

/// How a wizard run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardOutcome {
    Completed { dashboard_url: String },
    Quit,
}

enum Flow {
    Continue,
    Stop(WizardOutcome),
}

enum Reply {
    Text(String),
    Handled(Flow),
}

/// Unwrap a prompt reply, returning from the step when a command ran.
macro_rules! answer {
    ($wizard:expr, $label:expr) => {
        match $wizard.prompt($label).await? {
            Reply::Text(text) => text,
            Reply::Handled(flow) => return Ok(flow),
        }
    };
}

pub struct Wizard<R, W> {
    session: Arc<OnboardingSession>,
    input: Lines<R>,
    out: W,
    dashboard_url: String,
    poller: Option<StatusPoller>,
    progress: Option<JoinHandle<()>>,
    code_sent_at: Option<Instant>,
    resend_cooldown: Duration,
}

impl<R, W> Wizard<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        session: Arc<OnboardingSession>,
        input: R,
        out: W,
        dashboard_url: impl Into<String>,
    ) -> Self {
        Self {
            session,
            input: input.lines(),
            out,
            dashboard_url: dashboard_url.into(),
            poller: None,
            progress: None,
            code_sent_at: None,
            resend_cooldown: RESEND_COOLDOWN,
        }
    }

    pub fn with_resend_cooldown(mut self, cooldown: Duration) -> Self {
        self.resend_cooldown = cooldown;
        self
    }

    /// Drive the session until onboarding completes or the user quits.
    pub async fn run(mut self) -> Result<WizardOutcome> {
        self.resume_scraping_watch().await;

        let outcome = loop {
            let step = self.session.current_step().await;
            if !step.is_terminal() {
                self.render_header(step).await?;
            }

            let flow = match step {
                OnboardingStep::EmailEntry => self.email_step().await?,
                OnboardingStep::OtpVerification => self.otp_step().await?,
                OnboardingStep::PasswordSetup => self.password_step().await?,
                OnboardingStep::DomainSetup => self.domain_step().await?,
                OnboardingStep::ContentIngestion => self.content_step().await?,
                OnboardingStep::WidgetInstallation => self.widget_step().await?,
                OnboardingStep::Complete => self.complete_step().await?,
            };

            if let Flow::Stop(outcome) = flow {
                break outcome;
            }
        };

        self.stop_watching();
        Ok(outcome)
    }

    // ── Steps ───────────────────────────────────────────────────────

    async fn email_step(&mut self) -> Result<Flow> {
        if let Some(flow) = self.offer_continue(OnboardingStep::EmailEntry).await? {
            return Ok(flow);
        }
        let raw = answer!(self, "Work email");
        let email = match normalize_email(&raw) {
            Ok(email) => email,
            Err(e) => return self.reject(e.into()).await,
        };
        match self.session.send_otp(&email).await {
            Ok(_) => {
                self.code_sent_at = Some(Instant::now());
                self.say(&format!("A 6-digit code is on its way to {email}.")).await?;
                self.advance().await
            }
            Err(e) => self.reject(e).await,
        }
    }

    async fn otp_step(&mut self) -> Result<Flow> {
        if let Some(flow) = self.offer_continue(OnboardingStep::OtpVerification).await? {
            return Ok(flow);
        }
        let email = self.session.state().await.email;
        let raw = answer!(self, &format!("Code sent to {email} (:resend for a new one)"));
        let code = match validate_otp(&raw) {
            Ok(code) => code,
            Err(e) => return self.reject(e.into()).await,
        };
        match self.session.verify_otp(&email, &code).await {
            Ok(()) => {
                self.say("Email verified.").await?;
                self.advance().await
            }
            Err(e) => self.reject(e).await,
        }
    }

    async fn password_step(&mut self) -> Result<Flow> {
        if let Some(flow) = self.offer_continue(OnboardingStep::PasswordSetup).await? {
            return Ok(flow);
        }
        let password = SecretString::from(answer!(self, "Password"));
        let confirm = SecretString::from(answer!(self, "Confirm password"));
        if let Err(e) = validate_password(&password, &confirm) {
            return self.reject(e.into()).await;
        }
        match self.session.complete_signup(&password).await {
            Ok(_) => {
                self.say("Account created.").await?;
                self.advance().await
            }
            Err(e) => self.reject(e).await,
        }
    }

    async fn domain_step(&mut self) -> Result<Flow> {
        if let Some(flow) = self.offer_continue(OnboardingStep::DomainSetup).await? {
            return Ok(flow);
        }
        let raw = answer!(self, "Website (e.g. example.com)");
        let domain = match normalize_domain(&raw) {
            Ok(domain) => domain,
            Err(e) => return self.reject(e.into()).await,
        };
        let consent = answer!(
            self,
            "You own this site, allow Yuno to crawl it, and accept the terms? [y/N]"
        );
        let confirmations = SiteConfirmations::all(is_yes(&consent));
        if !confirmations.all_accepted() {
            self.say("You must accept all confirmations to proceed.").await?;
            return Ok(Flow::Continue);
        }

        match self.session.create_site(&domain, confirmations).await {
            Ok(site) => {
                self.say(&format!("Site {} registered; crawling started.", site.site_id))
                    .await?;
                self.resume_scraping_watch().await;
                self.advance().await
            }
            Err(e) => self.reject(e).await,
        }
    }

    async fn content_step(&mut self) -> Result<Flow> {
        if let Some(flow) = self.offer_continue(OnboardingStep::ContentIngestion).await? {
            return Ok(flow);
        }
        let text = answer!(self, "Anything the chatbot should know (optional)");
        let paths = answer!(self, "Files to upload, comma-separated (optional)");
        let files = match load_files(&paths).await {
            Ok(files) => files,
            Err(e) => return self.reject(e).await,
        };
        if let Err(e) = validate_files(&files) {
            return self.reject(e.into()).await;
        }

        let contact = ContactInfo {
            support_email: answer!(self, "Support email"),
            company_name: optional(answer!(self, "Company name (optional)")),
            support_phone: optional(answer!(self, "Support phone (optional)")),
            address: optional(answer!(self, "Address (optional)")),
            support_person_name: optional(answer!(self, "Support contact name (optional)")),
        };
        let contact_info = match validate_contact_info(contact) {
            Ok(contact) => contact,
            Err(e) => return self.reject(e.into()).await,
        };

        let submission = ContentSubmission {
            text_content: optional(text),
            files,
            contact_info,
        };
        match self.session.upload_content(submission).await {
            Ok(uploads) => {
                self.say(&format!("Uploaded {} item(s); contact details saved.", uploads.len()))
                    .await?;
                self.advance().await
            }
            Err(e) => self.reject(e).await,
        }
    }

    async fn widget_step(&mut self) -> Result<Flow> {
        let state = self.session.state().await;
        if state.widget_data.is_verified {
            return self.finish().await;
        }

        let script_tag = if state.widget_data.script_tag.is_empty() {
            match self.session.generate_widget().await {
                Ok(tag) => tag,
                Err(e) => {
                    self.say(&format!("! {}", e.user_message())).await?;
                    // Wait for the user before calling the backend again.
                    answer!(self, "Press Enter to retry");
                    return Ok(Flow::Continue);
                }
            }
        } else {
            state.widget_data.script_tag
        };
        self.say("Add this snippet to your site's HTML:").await?;
        self.say(&format!("  {script_tag}")).await?;

        let raw = answer!(self, "Page URL where it is installed (:skip to verify later)");
        let page_url = match normalize_page_url(&raw) {
            Ok(url) => url,
            Err(e) => return self.reject(e.into()).await,
        };
        match self.session.verify_widget(&page_url).await {
            Ok(_) => {
                self.say("Widget found.").await?;
                self.finish().await
            }
            Err(e) => self.reject(e).await,
        }
    }

    /// Close out onboarding once the widget step is satisfied.
    async fn finish(&mut self) -> Result<Flow> {
        match self.session.complete_onboarding().await {
            Ok(done) => {
                if let Some(url) = done.redirect_url {
                    self.dashboard_url = url;
                }
                Ok(Flow::Continue)
            }
            Err(e) => {
                warn!("complete_onboarding failed; finishing locally: {e}");
                self.say(&format!("! {}", e.user_message())).await?;
                self.advance().await
            }
        }
    }

    async fn complete_step(&mut self) -> Result<Flow> {
        let state = self.session.state().await;
        self.say("").await?;
        self.say("You're all set!").await?;
        self.say(&format!("  Account:  {}", state.email)).await?;
        if !state.site_data.domain.is_empty() {
            self.say(&format!("  Website:  {}", state.site_data.domain)).await?;
        }
        self.say(&format!(
            "  Content:  {} upload(s), support at {}",
            state.content_data.uploaded_files.len(),
            state.content_data.contact_info.support_email
        ))
        .await?;
        let widget = if state.widget_data.verification_url == "skipped" {
            "verification skipped"
        } else if state.widget_data.is_verified {
            "verified"
        } else {
            "not verified"
        };
        self.say(&format!("  Widget:   {widget}")).await?;
        self.say(&format!("Open your dashboard: {}", self.dashboard_url)).await?;

        Ok(Flow::Stop(WizardOutcome::Completed {
            dashboard_url: self.dashboard_url.clone(),
        }))
    }

    // ── Plumbing ────────────────────────────────────────────────────

    /// For a step that is already done, let the user move on or redo it.
    ///
    /// `None` means the step's form should run.
    async fn offer_continue(&mut self, step: OnboardingStep) -> Result<Option<Flow>> {
        if !self.session.is_step_completed(step).await {
            return Ok(None);
        }
        match self
            .prompt("Already done. Press Enter to continue, or type e to edit")
            .await?
        {
            Reply::Handled(flow) => Ok(Some(flow)),
            Reply::Text(text) if text.is_empty() => self.advance().await.map(Some),
            Reply::Text(_) => Ok(None),
        }
    }

    /// Send a fresh verification code, at most once per cooldown.
    async fn resend_code(&mut self) -> Result<()> {
        if let Some(sent_at) = self.code_sent_at {
            let elapsed = sent_at.elapsed();
            if elapsed < self.resend_cooldown {
                let wait = (self.resend_cooldown - elapsed).as_secs().max(1);
                return self.say(&format!("You can request a new code in {wait}s.")).await;
            }
        }

        let email = self.session.state().await.email;
        match self.session.send_otp(&email).await {
            Ok(_) => {
                self.code_sent_at = Some(Instant::now());
                self.say(&format!("A new code is on its way to {email}.")).await
            }
            Err(e) => self.say(&format!("! {}", e.user_message())).await,
        }
    }

    async fn advance(&mut self) -> Result<Flow> {
        if let Err(e) = self.session.advance().await {
            self.say(&format!("! {}", e.user_message())).await?;
        }
        Ok(Flow::Continue)
    }

    async fn reject(&mut self, error: Error) -> Result<Flow> {
        debug!("Step input rejected: {error}");
        self.say(&format!("! {}", error.user_message())).await?;
        Ok(Flow::Continue)
    }

    async fn prompt(&mut self, label: &str) -> Result<Reply> {
        self.out.write_all(format!("{label}: ").as_bytes()).await?;
        self.out.flush().await?;

        let Some(line) = self.input.next_line().await? else {
            // EOF behaves like :quit.
            self.say("").await?;
            return Ok(Reply::Handled(Flow::Stop(WizardOutcome::Quit)));
        };
        let line = line.trim().to_string();
        match Command::parse(&line) {
            Some(command) => self.command(command).await.map(Reply::Handled),
            None => Ok(Reply::Text(line)),
        }
    }

    async fn command(&mut self, command: Command) -> Result<Flow> {
        match command {
            Command::Quit => {
                self.say("Progress saved. Run again to pick up where you left off.")
                    .await?;
                Ok(Flow::Stop(WizardOutcome::Quit))
            }
            Command::Reset => {
                self.stop_watching();
                self.session.reset().await;
                self.say("Starting over.").await?;
                Ok(Flow::Continue)
            }
            Command::Back => {
                let step = self.session.current_step().await;
                match step.previous() {
                    Some(previous) => {
                        if let Err(e) = self.session.go_to_step(i64::from(previous.number())).await {
                            self.say(&format!("! {}", e.user_message())).await?;
                        }
                    }
                    None => self.say("Already at the first step.").await?,
                }
                Ok(Flow::Continue)
            }
            Command::Skip => {
                if self.session.current_step().await == OnboardingStep::WidgetInstallation {
                    self.session.skip_widget_verification().await;
                    self.say("Skipping widget verification.").await?;
                } else {
                    self.say("Only widget verification can be skipped.").await?;
                }
                Ok(Flow::Continue)
            }
            Command::Resend => {
                if self.session.current_step().await == OnboardingStep::OtpVerification {
                    self.resend_code().await?;
                } else {
                    self.say("Only the verification code can be resent.").await?;
                }
                Ok(Flow::Continue)
            }
        }
    }

    async fn render_header(&mut self, step: OnboardingStep) -> Result<()> {
        let state = self.session.state().await;
        self.say("").await?;
        self.say(&format!(
            "Step {}/6: {} ({}% complete)",
            step.number(),
            step.title(),
            state.progress_percent()
        ))
        .await
    }

    async fn say(&mut self, line: &str) -> Result<()> {
        self.out.write_all(line.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await?;
        Ok(())
    }

    /// Start the poller and progress printer if a crawl is running.
    async fn resume_scraping_watch(&mut self) {
        if self.poller.as_ref().is_some_and(|p| !p.is_finished()) {
            return;
        }
        if let Some(poller) = self.session.watch_scraping().await {
            self.progress = Some(spawn_progress_printer(self.session.subscribe()));
            self.poller = Some(poller);
        }
    }

    fn stop_watching(&mut self) {
        if let Some(poller) = self.poller.take() {
            poller.stop();
        }
        if let Some(progress) = self.progress.take() {
            progress.abort();
        }
    }
}

/// Print crawl progress to stderr until it reaches a terminal status.
fn spawn_progress_printer(mut rx: broadcast::Receiver<SessionEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut last = None;
        loop {
            match rx.recv().await {
                Ok(SessionEvent::StateChanged(state)) => {
                    let site = &state.site_data;
                    if site.site_id.is_none() {
                        return;
                    }
                    let seen = (site.scraping_status, site.scraping_progress);
                    if last == Some(seen) {
                        continue;
                    }
                    last = Some(seen);
                    match site.scraping_status {
                        ScrapingStatus::Completed => {
                            eprintln!("  Crawl finished.");
                            return;
                        }
                        ScrapingStatus::Failed => {
                            eprintln!("  Crawl failed; you can still add content manually.");
                            return;
                        }
                        status => eprintln!("  Crawl {status}: {}%", site.scraping_progress),
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return,
            }
        }
    })
}

fn is_yes(input: &str) -> bool {
    matches!(input.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn optional(input: String) -> Option<String> {
    let trimmed = input.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Read a comma-separated list of paths into uploads.
async fn load_files(paths: &str) -> Result<Vec<FileUpload>> {
    let mut files = Vec::new();
    for raw in paths.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let path = Path::new(raw);
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(raw)
            .to_string();
        let bytes = tokio::fs::read(path).await?;
        files.push(FileUpload {
            mime_type: mime_type_for(&name)
                .unwrap_or("application/octet-stream")
                .to_string(),
            name,
            bytes,
        });
    }
    Ok(files)
}
