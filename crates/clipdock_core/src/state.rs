use chrono::{DateTime, Utc};

use crate::decision::decide;
use crate::notifications::{Notification, NotificationCenter};
use crate::version::classify;
use crate::view_model::{AppViewModel, JobRowView};
use crate::{JobRegistry, UpdateSettings, UpdateState};

/// The one state container. Owned by the coordinator and changed only by
/// [`crate::update`]; everyone else reads it through `&AppState`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppState {
    pub(crate) settings: UpdateSettings,
    pub(crate) updates: UpdateState,
    pub(crate) jobs: JobRegistry,
    pub(crate) notifications: NotificationCenter,
    dirty: bool,
}

impl AppState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_settings(settings: UpdateSettings) -> Self {
        let mut state = Self::default();
        state.settings = settings;
        state.updates.preferred_channel = settings.preferred_channel();
        state
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    pub fn update_state(&self) -> &UpdateState {
        &self.updates
    }

    pub fn jobs(&self) -> &JobRegistry {
        &self.jobs
    }

    pub fn notifications(&self) -> &NotificationCenter {
        &self.notifications
    }

    /// Toasts that have not been shown yet in this process.
    pub fn take_toasts(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        self.notifications.take_toasts(now)
    }

    pub fn view(&self, now: DateTime<Utc>) -> AppViewModel {
        AppViewModel {
            update: self.updates.clone(),
            active_jobs: self
                .jobs
                .active_jobs()
                .map(|job| JobRowView {
                    job_id: job.job_id.clone(),
                    title: job.title.clone().or_else(|| job.url.clone()),
                    status: job.status,
                    percent: job.percent,
                    speed: job.speed.clone(),
                    eta: job.eta.clone(),
                    error: job.error.clone(),
                })
                .collect(),
            history_len: self.jobs.history().len(),
            unread_notifications: self.notifications.unread_count(),
            modal: self.notifications.modal(now).cloned(),
            dirty: self.dirty,
        }
    }

    /// Returns whether anything changed since the last call, and resets the flag.
    pub fn consume_dirty(&mut self) -> bool {
        std::mem::take(&mut self.dirty)
    }

    pub(crate) fn mark_dirty(&mut self) {
        self.dirty = true;
    }

    pub(crate) fn set_local_version(&mut self, version: &str) {
        let version = version.trim();
        self.updates.local_channel = classify(version);
        self.updates.local_version = Some(version.to_string());
    }

    /// Re-runs the decision engine against the current local/remote data.
    pub(crate) fn apply_decision(&mut self) {
        let decision = decide(
            self.updates.local_version.as_deref(),
            self.settings.prefer_nightly,
            &self.updates.latest,
        );
        self.updates.preferred_channel = self.settings.preferred_channel();
        self.updates.needs_update = decision.needs_update;
        self.updates.target_version = decision.target;
    }

    /// Whether an unforced check may start at `now`.
    pub(crate) fn check_due(&self, now: DateTime<Utc>) -> bool {
        match self.settings.frequency.interval() {
            None => false,
            // Failed attempts count too, so a down feed is not hit every tick.
            Some(interval) => self
                .updates
                .last_attempt
                .or(self.updates.last_checked)
                .map_or(true, |last| now - last >= interval),
        }
    }
}
