//! Onboarding wizard — the seven-step signup flow for new Yuno customers.
//!
//! A signup moves from email entry through verification, password, website,
//! content, and widget installation to completion. `OnboardingSession` owns
//! the state and every action; the CLI wizard is only a view over it.

pub mod model;
pub mod poller;
pub mod reconcile;
pub mod session;
pub mod step;
pub mod validation;

pub use model::{
    ContactInfo, ContentData, OnboardingState, PersistedSnapshot, ProcessingStatus,
    ScrapingStatus, SiteData, UploadedFile, WidgetData,
};
pub use poller::StatusPoller;
pub use session::{
    ContentSubmission, OnboardingSession, RestoreSource, SessionConfig, SessionEvent,
};
pub use step::OnboardingStep;
