use chrono::{DateTime, Utc};
use clipdock_core::{update, AppState, AppViewModel, Effect, JobRowView, Msg, Notification, UpdateState};
use clipdock_engine::EventBus;

/// Notification changes as seen by subscribers.
#[derive(Debug, Clone, PartialEq)]
pub enum NotificationEvent {
    Changed {
        unread: usize,
        modal: Option<Notification>,
    },
    /// A toast to show now; each id is sent at most once per process.
    Toast(Notification),
}

/// One bus per category of state change.
#[derive(Clone, Default)]
pub struct StateBuses {
    pub jobs: EventBus<Vec<JobRowView>>,
    pub updates: EventBus<UpdateState>,
    pub notifications: EventBus<NotificationEvent>,
}

/// Owns the single `AppState` and applies messages to it one at a time.
pub struct Coordinator {
    state: AppState,
    buses: StateBuses,
    published: Option<AppViewModel>,
}

impl Coordinator {
    pub fn new(state: AppState, buses: StateBuses) -> Self {
        Self {
            state,
            buses,
            published: None,
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    pub fn dispatch(&mut self, msg: Msg, now: DateTime<Utc>) -> Vec<Effect> {
        let state = std::mem::take(&mut self.state);
        let (state, effects) = update(state, msg);
        self.state = state;

        if self.state.consume_dirty() {
            self.publish_changes(now);
        }
        for toast in self.state.take_toasts(now) {
            self.buses
                .notifications
                .publish(&NotificationEvent::Toast(toast));
        }
        effects
    }

    /// Publishes each category whose view differs from what subscribers last saw.
    fn publish_changes(&mut self, now: DateTime<Utc>) {
        let view = self.state.view(now);
        let previous = self.published.take();
        let previous = previous.as_ref();

        if previous.map_or(true, |p| p.active_jobs != view.active_jobs) {
            self.buses.jobs.publish(&view.active_jobs);
        }
        if previous.map_or(true, |p| p.update != view.update) {
            self.buses.updates.publish(&view.update);
        }
        if previous.map_or(true, |p| {
            p.unread_notifications != view.unread_notifications || p.modal != view.modal
        }) {
            self.buses.notifications.publish(&NotificationEvent::Changed {
                unread: view.unread_notifications,
                modal: view.modal.clone(),
            });
        }
        self.published = Some(view);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use chrono::TimeZone;
    use clipdock_core::{JobEvent, JobPatch, JobSnapshot, JobStatus};
    use pretty_assertions::assert_eq;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    fn record<E: Clone + Send + 'static>(bus: &EventBus<E>) -> (Arc<Mutex<Vec<E>>>, clipdock_engine::Subscription<E>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let subscription = bus.subscribe(move |event: &E| sink.lock().unwrap().push(event.clone()));
        (seen, subscription)
    }

    #[test]
    fn job_changes_reach_job_subscribers_only_when_rows_change() {
        let buses = StateBuses::default();
        let (jobs, _jobs_sub) = record(&buses.jobs);
        let (updates, _updates_sub) = record(&buses.updates);
        let mut coordinator = Coordinator::new(AppState::new(), buses);

        coordinator.dispatch(
            Msg::JobsReconciled {
                listed: vec![JobSnapshot::partial("a", JobStatus::Queued)],
                completed: Vec::new(),
            },
            now(),
        );
        coordinator.dispatch(
            Msg::Supervisor {
                event: JobEvent::Progress {
                    job_id: "a".to_string(),
                    patch: JobPatch {
                        percent: Some(12.0),
                        ..JobPatch::default()
                    },
                },
                now: now(),
            },
            now(),
        );
        coordinator.dispatch(
            Msg::JobsReconciled {
                listed: vec![{
                    let mut job = JobSnapshot::partial("a", JobStatus::Queued);
                    job.percent = Some(12.0);
                    job
                }],
                completed: Vec::new(),
            },
            now(),
        );

        let jobs = jobs.lock().unwrap();
        assert_eq!(jobs.len(), 2);
        assert_eq!(jobs[1][0].percent, Some(12.0));
        assert_eq!(jobs[1][0].status, JobStatus::Queued);
        assert_eq!(updates.lock().unwrap().len(), 1);
    }

    #[test]
    fn failed_check_publishes_state_and_one_toast() {
        let buses = StateBuses::default();
        let (updates, _updates_sub) = record(&buses.updates);
        let (notifications, _notifications_sub) = record(&buses.notifications);
        let mut coordinator = Coordinator::new(AppState::new(), buses);

        let effects = coordinator.dispatch(Msg::CheckRequested { force: true, now: now() }, now());
        assert_eq!(effects.len(), 1);
        coordinator.dispatch(
            Msg::CheckCompleted {
                local_version: None,
                outcome: Err("feed returned http status 502".to_string()),
                now: now(),
            },
            now(),
        );
        coordinator.dispatch(Msg::NoOp, now());

        let updates = updates.lock().unwrap();
        assert!(updates[0].is_checking);
        assert_eq!(
            updates.last().and_then(|u| u.last_error.as_deref()),
            Some("feed returned http status 502")
        );

        let notifications = notifications.lock().unwrap();
        let toasts: Vec<&str> = notifications
            .iter()
            .filter_map(|event| match event {
                NotificationEvent::Toast(n) => Some(n.id.as_str()),
                NotificationEvent::Changed { .. } => None,
            })
            .collect();
        assert_eq!(toasts, vec!["local:check-failed:initial"]);
        assert!(notifications.contains(&NotificationEvent::Changed {
            unread: 1,
            modal: None
        }));
    }

    #[test]
    fn disposed_subscribers_stop_receiving() {
        let buses = StateBuses::default();
        let (jobs, mut subscription) = record(&buses.jobs);
        let mut coordinator = Coordinator::new(AppState::new(), buses);
        subscription.dispose();

        coordinator.dispatch(
            Msg::JobSubmitted {
                job_id: "x".to_string(),
                url: Some("https://v.example/x".to_string()),
            },
            now(),
        );
        assert!(jobs.lock().unwrap().is_empty());
    }
}
