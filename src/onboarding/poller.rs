//! Scraping status poller. Keeps `site_data` fresh while a crawl runs.
//!
//! Polls on a fixed interval until the backend reports a terminal status,
//! the session is reset, the site changes, or the shutdown flag is set.
//! Failed polls are logged and retried on the next tick.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::model::ScrapingStatus;
use super::session::OnboardingSession;

/// Handle to a running poller.
pub struct StatusPoller {
    handle: JoinHandle<()>,
    shutdown: Arc<AtomicBool>,
}

impl StatusPoller {
    /// Ask the poller to stop at its next tick.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the poller task to exit.
    pub async fn join(self) {
        if let Err(e) = self.handle.await {
            warn!("Scraping status poller panicked: {e}");
        }
    }
}

/// Spawn a poller for the session's current site.
///
/// Returns `None` when there is nothing to watch: no site yet, or the
/// crawl is not in progress. The first poll happens one interval in.
pub async fn spawn_status_poller(
    session: Arc<OnboardingSession>,
    interval: Duration,
) -> Option<StatusPoller> {
    let state = session.state().await;
    let site_id = state.site_data.site_id.clone().filter(|id| !id.is_empty())?;
    if state.site_data.scraping_status != ScrapingStatus::InProgress {
        return None;
    }

    let generation = session.generation();
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_flag = Arc::clone(&shutdown);

    let handle = tokio::spawn(async move {
        info!(
            site_id = %site_id,
            "Scraping status poller started, polling every {}ms",
            interval.as_millis()
        );

        let mut tick = tokio::time::interval_at(Instant::now() + interval, interval);

        loop {
            tick.tick().await;

            if shutdown_flag.load(Ordering::Relaxed) {
                info!("Scraping status poller shutting down");
                return;
            }
            if session.generation() != generation {
                debug!("Session was reset; scraping status poller exiting");
                return;
            }
            let current_site = session.state().await.site_data.site_id;
            if current_site.as_deref() != Some(site_id.as_str()) {
                debug!("Site changed; scraping status poller exiting");
                return;
            }

            match session.refresh_site_status().await {
                Ok(status) if status.scraping_status.is_terminal() => {
                    info!(
                        site_id = %site_id,
                        status = %status.scraping_status,
                        "Scraping finished"
                    );
                    return;
                }
                Ok(status) => {
                    debug!(progress = status.scraping_progress, "Scraping in progress");
                }
                Err(e) => warn!("Scraping status poll failed: {e}"),
            }
        }
    });

    Some(StatusPoller { handle, shutdown })
}
