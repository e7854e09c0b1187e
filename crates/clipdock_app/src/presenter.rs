use clipdock_core::{JobRowView, UpdateState};
use clipdock_engine::Subscription;
use clipdock_logging::{engine_info, engine_warn};

use crate::coordinator::{NotificationEvent, StateBuses};

/// Headless consumer: reports state changes through the log.
pub struct LogPresenter {
    _jobs: Subscription<Vec<JobRowView>>,
    _updates: Subscription<UpdateState>,
    _notifications: Subscription<NotificationEvent>,
}

impl LogPresenter {
    pub fn attach(buses: &StateBuses) -> Self {
        Self {
            _jobs: buses.jobs.subscribe(log_jobs),
            _updates: buses.updates.subscribe(log_update_state),
            _notifications: buses.notifications.subscribe(log_notification),
        }
    }
}

#[allow(clippy::ptr_arg)]
fn log_jobs(rows: &Vec<JobRowView>) {
    engine_info!("{} active job(s)", rows.len());
    for row in rows {
        let title = row.title.as_deref().unwrap_or("(untitled)");
        let percent = row
            .percent
            .map(|p| format!("{p:.1}%"))
            .unwrap_or_else(|| "-".to_string());
        match &row.error {
            Some(error) => engine_warn!("  {} {:?} {title}: {error}", row.job_id, row.status),
            None => engine_info!(
                "  {} {:?} {percent} {} {} {title}",
                row.job_id,
                row.status,
                row.speed.as_deref().unwrap_or(""),
                row.eta.as_deref().unwrap_or("")
            ),
        }
    }
}

fn log_update_state(state: &UpdateState) {
    if state.is_checking {
        engine_info!("Checking for yt-dlp updates");
        return;
    }
    if state.is_updating {
        engine_info!("Updating yt-dlp");
        return;
    }
    engine_info!(
        "yt-dlp {} ({}), latest {} {}",
        state.local_version.as_deref().unwrap_or("unknown"),
        state.local_channel,
        state
            .target_version
            .as_ref()
            .map_or("unknown", |v| v.version.as_str()),
        if state.needs_update {
            "(update available)"
        } else {
            "(current)"
        }
    );
    if let Some(error) = &state.last_error {
        engine_warn!("Last update error: {error}");
    }
}

fn log_notification(event: &NotificationEvent) {
    match event {
        NotificationEvent::Changed { unread, modal } => {
            engine_info!("{unread} unread notification(s)");
            if let Some(modal) = modal {
                engine_warn!("[{:?}] {}: {}", modal.kind, modal.title, modal.message);
            }
        }
        NotificationEvent::Toast(toast) => {
            engine_info!("[{:?}] {}: {}", toast.kind, toast.title, toast.message);
        }
    }
}
