use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::BufReader;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use yuno_onboarding::config::OnboardingConfig;
use yuno_onboarding::onboarding::{OnboardingSession, RestoreSource};
use yuno_onboarding::store::{LibSqlStore, SessionStore};
use yuno_onboarding::wizard::{Wizard, WizardOutcome};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = OnboardingConfig::from_env().context("Invalid YUNO_* configuration")?;
    let _log_guard = init_tracing(config.log_dir.as_deref())?;

    eprintln!("Yuno onboarding v{}", env!("CARGO_PKG_VERSION"));
    if config.mock_api {
        eprintln!("   API: mock (set YUNO_API_BASE_URL to use the real backend)");
    } else {
        eprintln!("   API: {}", config.api_base_url);
    }
    eprintln!("   Store: {}", config.db_path.display());
    eprintln!("   Commands: :back  :reset  :skip  :resend  :quit\n");

    // ── Store ────────────────────────────────────────────────────────────
    let store = Arc::new(
        LibSqlStore::new_local(&config.db_path, &config.session_id)
            .await
            .with_context(|| format!("Failed to open store at {}", config.db_path.display()))?,
    );

    // ── Session ──────────────────────────────────────────────────────────
    let api = config.api_client()?;
    let session = OnboardingSession::new(
        api,
        Arc::clone(&store) as Arc<dyn SessionStore>,
        config.session_config(),
    );

    match session.restore().await? {
        RestoreSource::Server => eprintln!(
            "Welcome back! Resuming at: {}",
            session.current_step().await.title()
        ),
        RestoreSource::Snapshot => eprintln!("Picking up where you left off."),
        RestoreSource::Fresh => {}
    }

    // ── Wizard ───────────────────────────────────────────────────────────
    let wizard = Wizard::new(
        Arc::clone(&session),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
        config.dashboard_url.clone(),
    );

    match wizard.run().await? {
        WizardOutcome::Completed { dashboard_url } => {
            tracing::info!(dashboard_url = %dashboard_url, "Onboarding complete");
            let cleared = store.end_session().await?;
            tracing::debug!(cleared, "Cleared session-scoped onboarding data");
        }
        WizardOutcome::Quit => tracing::info!("Wizard exited; progress saved"),
    }

    Ok(())
}

/// Console logging on stderr, plus daily-rotated files when `log_dir` is set.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing(log_dir: Option<&Path>) -> anyhow::Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, "yuno-onboarding.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .context("Failed to initialize tracing")?;

    Ok(guard)
}
