//! Resume reconciliation — turn server-side completion flags into a step.
//!
//! The server also reports a `current_step` cursor, but it only moves when
//! the best-effort step notification lands, so it can lag behind. The flags
//! are facts; the rule table below is the only source of the resume step.

use crate::api::{SessionData, UserState};

use super::model::{ContactInfo, OnboardingState, ProcessingStatus, ScrapingStatus};
use super::step::OnboardingStep;

/// One rung of the resume ladder.
pub struct ResumeRule {
    pub name: &'static str,
    pub applies: fn(&SessionData) -> bool,
    pub step: OnboardingStep,
}

fn has_site(data: &SessionData) -> bool {
    data.site_id.as_deref().is_some_and(|id| !id.is_empty())
}

fn flag(value: Option<bool>) -> bool {
    value.unwrap_or(false)
}

/// Evaluated top-down; the first match wins.
pub static RESUME_RULES: &[ResumeRule] = &[
    ResumeRule {
        name: "widget_verified",
        applies: |d| flag(d.widget_verified),
        step: OnboardingStep::Complete,
    },
    ResumeRule {
        name: "site_and_content",
        applies: |d| has_site(d) && flag(d.content_complete),
        step: OnboardingStep::WidgetInstallation,
    },
    ResumeRule {
        name: "site_created",
        applies: has_site,
        step: OnboardingStep::ContentIngestion,
    },
    ResumeRule {
        name: "profile_completed",
        applies: |d| flag(d.profile_completed),
        step: OnboardingStep::DomainSetup,
    },
    ResumeRule {
        name: "otp_verified",
        applies: |d| flag(d.otp_verified),
        step: OnboardingStep::PasswordSetup,
    },
    ResumeRule {
        name: "otp_sent",
        applies: |d| d.otp_sent_at.as_deref().is_some_and(|s| !s.is_empty()),
        step: OnboardingStep::OtpVerification,
    },
];

/// The rule that decides where `data` resumes, if any.
pub fn matching_rule(data: &SessionData) -> Option<&'static ResumeRule> {
    RESUME_RULES.iter().find(|rule| (rule.applies)(data))
}

/// The step a returning user should land on.
pub fn resume_step(data: &SessionData) -> OnboardingStep {
    matching_rule(data)
        .map(|rule| rule.step)
        .unwrap_or(OnboardingStep::EmailEntry)
}

/// Build a fresh state from the server's view of the signup.
///
/// Scraping progress is not recovered; a live poll picks it up if needed.
pub fn reconcile(user: &UserState) -> OnboardingState {
    let data = &user.session_data;
    let step = resume_step(data);

    match (matching_rule(data), user.current_step) {
        (rule, Some(cursor)) if cursor != i64::from(step.number()) => {
            tracing::debug!(
                server_cursor = cursor,
                resumed = %step,
                rule = rule.map(|r| r.name).unwrap_or("none"),
                "Server step cursor disagrees with completion flags; using flags"
            );
        }
        _ => {}
    }

    let mut state = OnboardingState {
        current_step: step,
        ..Default::default()
    };

    state.email = user
        .email
        .clone()
        .or_else(|| data.email.clone())
        .unwrap_or_default();
    state.is_email_verified = flag(data.email_verified) || flag(data.otp_verified);
    state.is_password_set = flag(data.profile_completed);

    if has_site(data) {
        state.site_data.site_id = data.site_id.clone();
        state.site_data.scraping_status = ScrapingStatus::Completed;
        state.site_data.scraping_progress = 100;
    }
    state.site_data.domain = data.domain.clone().unwrap_or_default();

    state.content_data.contact_info = ContactInfo {
        support_email: data.support_email.clone().unwrap_or_default(),
        company_name: data.company_name.clone(),
        support_phone: data.support_phone.clone(),
        address: data.address.clone(),
        support_person_name: data.support_person_name.clone(),
    };
    if flag(data.content_complete) {
        state.content_data.processing_status = ProcessingStatus::Completed;
    }

    state.widget_data.script_tag = data.widget_script.clone().unwrap_or_default();
    state.widget_data.is_verified = flag(data.widget_verified);

    state
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data() -> SessionData {
        SessionData::default()
    }

    #[test]
    fn empty_flags_start_at_email() {
        assert_eq!(resume_step(&data()), OnboardingStep::EmailEntry);
        assert!(matching_rule(&data()).is_none());
    }

    #[test]
    fn widget_verified_wins_even_without_site() {
        let d = SessionData {
            widget_verified: Some(true),
            site_id: None,
            ..data()
        };
        assert_eq!(resume_step(&d), OnboardingStep::Complete);
    }

    #[test]
    fn site_rule_beats_profile_and_otp() {
        let d = SessionData {
            site_id: Some("abc".into()),
            content_complete: Some(false),
            profile_completed: Some(true),
            otp_verified: Some(true),
            ..data()
        };
        assert_eq!(resume_step(&d), OnboardingStep::ContentIngestion);
        assert_eq!(matching_rule(&d).unwrap().name, "site_created");
    }

    #[test]
    fn content_complete_needs_site() {
        let with_site = SessionData {
            site_id: Some("abc".into()),
            content_complete: Some(true),
            ..data()
        };
        assert_eq!(resume_step(&with_site), OnboardingStep::WidgetInstallation);

        let without_site = SessionData {
            content_complete: Some(true),
            profile_completed: Some(true),
            ..data()
        };
        assert_eq!(resume_step(&without_site), OnboardingStep::DomainSetup);
    }

    #[test]
    fn lower_rungs() {
        let otp = SessionData {
            otp_verified: Some(true),
            otp_sent_at: Some("2026-01-01T00:00:00Z".into()),
            ..data()
        };
        assert_eq!(resume_step(&otp), OnboardingStep::PasswordSetup);

        let sent = SessionData {
            otp_sent_at: Some("2026-01-01T00:00:00Z".into()),
            ..data()
        };
        assert_eq!(resume_step(&sent), OnboardingStep::OtpVerification);

        let blank = SessionData {
            otp_sent_at: Some(String::new()),
            site_id: Some(String::new()),
            ..data()
        };
        assert_eq!(resume_step(&blank), OnboardingStep::EmailEntry);
    }

    #[test]
    fn rules_are_ordered_by_descending_step() {
        let steps: Vec<_> = RESUME_RULES.iter().map(|r| r.step).collect();
        let mut sorted = steps.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(steps, sorted);
    }

    #[test]
    fn stale_cursor_is_ignored() {
        let user = UserState {
            email: Some("a@b.com".into()),
            current_step: Some(5),
            session_data: SessionData {
                site_id: Some("abc".into()),
                content_complete: Some(true),
                ..data()
            },
        };
        let state = reconcile(&user);
        assert_eq!(state.current_step, OnboardingStep::WidgetInstallation);
    }

    #[test]
    fn derived_fields() {
        let user = UserState {
            email: None,
            current_step: None,
            session_data: SessionData {
                email: Some("a@b.com".into()),
                email_verified: Some(true),
                profile_completed: Some(true),
                site_id: Some("abc".into()),
                domain: Some("https://example.com".into()),
                content_complete: Some(true),
                support_email: Some("s@e.com".into()),
                company_name: Some("Acme".into()),
                widget_script: Some("<script></script>".into()),
                ..data()
            },
        };
        let state = reconcile(&user);
        assert_eq!(state.email, "a@b.com");
        assert!(state.is_email_verified);
        assert!(state.is_password_set);
        assert_eq!(state.site_data.site_id.as_deref(), Some("abc"));
        assert_eq!(state.site_data.scraping_status, ScrapingStatus::Completed);
        assert_eq!(state.content_data.contact_info.support_email, "s@e.com");
        assert_eq!(state.content_data.contact_info.company_name.as_deref(), Some("Acme"));
        assert_eq!(state.content_data.processing_status, ProcessingStatus::Completed);
        assert_eq!(state.widget_data.script_tag, "<script></script>");
        assert!(!state.widget_data.is_verified);
        assert!(!state.loading);
        assert!(state.error.is_none());
    }

    #[test]
    fn no_site_means_pending_scrape() {
        let user = UserState {
            session_data: SessionData {
                otp_verified: Some(true),
                ..data()
            },
            ..Default::default()
        };
        let state = reconcile(&user);
        assert_eq!(state.site_data.scraping_status, ScrapingStatus::Pending);
        assert!(state.is_email_verified);
        assert!(!state.is_password_set);
    }
}
