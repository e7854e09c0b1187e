use chrono::{DateTime, Duration, Utc};
use clipdock_logging::{engine_debug, engine_info, engine_trace, engine_warn};

use crate::notifications::{Notification, NotificationKind, LOCAL_PREFIX};
use crate::version::classify;
use crate::{AppState, Channel, Effect, FeedSnapshot, Msg, SupervisorOp, UpdateFailure};

/// Action id that re-runs an update check.
pub const RETRY_CHECK_ACTION: &str = "retry-check";
/// Action id prefix that starts remediation for the channel after the colon.
pub const UPDATE_ACTION_PREFIX: &str = "update:";
/// Action id that retries the update named by the failure notification.
pub const RETRY_UPDATE_ACTION: &str = "retry-update";

const CHECK_FAILED_KEY: &str = "check-failed";
const UPDATE_AVAILABLE_KEY: &str = "update-available";
const UPDATE_FAILED_KEY: &str = "update-failed";
const UPDATE_SUCCESS_KEY: &str = "update-success";

/// Pure update function: applies a message to state and returns any effects.
pub fn update(mut state: AppState, msg: Msg) -> (AppState, Vec<Effect>) {
    let effects = match msg {
        Msg::Tick { now } => begin_check(&mut state, false, now),
        Msg::CheckRequested { force, now } => begin_check(&mut state, force, now),
        Msg::CheckCompleted {
            local_version,
            outcome,
            now,
        } => finish_check(&mut state, local_version, outcome, now),
        Msg::UpdateRequested { channel } => {
            let channel = channel.unwrap_or_else(|| state.settings.preferred_channel());
            begin_update(&mut state, channel)
        }
        Msg::RemediationCompleted {
            channel,
            outcome,
            now,
        } => finish_update(&mut state, channel, outcome, now),
        Msg::SettingsChanged(settings) => {
            state.settings = settings;
            state.apply_decision();
            state.mark_dirty();
            Vec::new()
        }

        Msg::Supervisor { event, now } => {
            let follow_up = state.jobs.apply_event(event, now);
            state.mark_dirty();
            follow_up
                .map(|job_id| Effect::FetchJobDetail { job_id })
                .into_iter()
                .collect()
        }
        Msg::ReconcileRequested => vec![Effect::ReconcileJobs],
        Msg::JobsReconciled { listed, completed } => {
            let history_changed = state.jobs.reconcile(listed, completed);
            state.mark_dirty();
            persist_history_if(&state, history_changed)
        }
        Msg::JobDetailFetched { job_id, detail } => {
            let recorded = state.jobs.complete_detail(&job_id, detail);
            if recorded {
                state.mark_dirty();
            }
            persist_history_if(&state, recorded)
        }
        Msg::SubmitRequested(request) => vec![Effect::SubmitJob(request)],
        Msg::JobSubmitted { job_id, url } => {
            state.jobs.insert_submitted(job_id, url);
            state.mark_dirty();
            Vec::new()
        }
        Msg::CancelRequested { job_id } => {
            if state.jobs.optimistic_cancel(&job_id) {
                state.mark_dirty();
            }
            vec![Effect::CancelJob { job_id }]
        }
        Msg::CancelAcknowledged { job_id, cancelled } => {
            if cancelled {
                Vec::new()
            } else {
                engine_info!("Supervisor refused to cancel job {job_id}, reconciling");
                vec![Effect::ReconcileJobs]
            }
        }
        Msg::RetryRequested { job_id } => {
            if state.jobs.mark_retrying(&job_id) {
                state.mark_dirty();
            }
            vec![Effect::RetryJob { job_id }]
        }
        Msg::ClearQueueRequested => vec![Effect::ClearQueue],
        Msg::CleanupRequested { max_age_ms, now } => {
            let max_age = Duration::milliseconds(i64::try_from(max_age_ms).unwrap_or(i64::MAX));
            let pruned = state.jobs.prune_history(max_age, now);
            let mut effects = vec![Effect::CleanupCompleted { max_age_ms }];
            if pruned {
                state.mark_dirty();
                effects.extend(persist_history_if(&state, true));
            }
            effects
        }
        Msg::SupervisorFailed { operation, message } => {
            engine_warn!("Supervisor {operation:?} failed: {message}");
            match operation {
                // Optimistic local changes may now be wrong.
                SupervisorOp::Cancel | SupervisorOp::Retry => vec![Effect::ReconcileJobs],
                _ => Vec::new(),
            }
        }
        Msg::RestoreHistory(jobs) => {
            state.jobs.restore_history(jobs);
            state.mark_dirty();
            Vec::new()
        }

        Msg::RestoreNotificationState { dismissed, read } => {
            state.notifications.restore(dismissed, read);
            state.mark_dirty();
            Vec::new()
        }
        Msg::NotificationRead { id } => {
            if state.notifications.mark_read(&id) {
                state.mark_dirty();
                vec![persist_notifications(&state)]
            } else {
                Vec::new()
            }
        }
        Msg::NotificationDismissed { id } => {
            if state.notifications.dismiss(&id) {
                state.mark_dirty();
                vec![persist_notifications(&state)]
            } else {
                Vec::new()
            }
        }
        Msg::NotificationAction { id, action_id, now } => {
            let mut effects = Vec::new();
            if state.notifications.mark_read(&id) {
                state.mark_dirty();
                effects.push(persist_notifications(&state));
            }
            effects.extend(run_action(&mut state, &id, &action_id, now));
            effects
        }
        Msg::NoOp => Vec::new(),
    };

    (state, effects)
}

fn begin_check(state: &mut AppState, force: bool, now: DateTime<Utc>) -> Vec<Effect> {
    if state.updates.is_busy() {
        engine_debug!(
            "Update check coalesced (checking={}, updating={})",
            state.updates.is_checking,
            state.updates.is_updating
        );
        return Vec::new();
    }
    if !force && !state.check_due(now) {
        engine_trace!("Update check not due yet");
        return Vec::new();
    }

    state.updates.is_checking = true;
    state.updates.last_attempt = Some(now);
    state.updates.last_error = None;
    state.mark_dirty();
    engine_info!("Starting update check (forced={force})");
    vec![Effect::CheckForUpdates {
        read_local_version: state.updates.local_version.is_none(),
    }]
}

fn finish_check(
    state: &mut AppState,
    local_version: Option<String>,
    outcome: Result<FeedSnapshot, String>,
    now: DateTime<Utc>,
) -> Vec<Effect> {
    if !state.updates.is_checking {
        engine_warn!("Dropping check result: no check in flight");
        return Vec::new();
    }
    state.updates.is_checking = false;
    state.mark_dirty();
    if let Some(version) = local_version.as_deref() {
        state.set_local_version(version);
    }

    let feed = match outcome {
        Ok(feed) => feed,
        Err(message) => {
            engine_warn!("Update check failed: {message}");
            state.updates.last_error = Some(message.clone());
            // One alert per run of failures since the last good check.
            let key = check_failed_key(state.updates.last_checked);
            state.notifications.publish_local(
                Notification::local(
                    &key,
                    NotificationKind::Error,
                    "Update check failed",
                    message,
                    now,
                )
                .with_action(RETRY_CHECK_ACTION, "Retry"),
            );
            return Vec::new();
        }
    };

    state
        .notifications
        .retract_local_matching(&local_id(&format!("{CHECK_FAILED_KEY}:")), None);
    state.updates.latest = feed.latest;
    state.updates.app_latest_version = feed.app_latest_version;
    state.updates.last_checked = Some(now);
    state.apply_decision();
    state.notifications.merge_remote(feed.notifications);

    let preferred = state.settings.preferred_channel();
    let target = match &state.updates.target_version {
        Some(target) if state.updates.needs_update => target.clone(),
        _ => {
            engine_info!(
                "yt-dlp is current ({})",
                state.updates.local_version.as_deref().unwrap_or("unknown")
            );
            state.notifications.retract_local_matching(
                &local_id(&channel_key(UPDATE_AVAILABLE_KEY, preferred)),
                None,
            );
            return Vec::new();
        }
    };

    let target_channel = classify(&target.version);
    if state.settings.auto_update && !state.updates.is_updating && target_channel == preferred {
        engine_info!("Auto-updating yt-dlp to {} ({preferred})", target.version);
        state.updates.is_updating = true;
        return vec![Effect::RunRemediation { channel: preferred }];
    }

    engine_info!("yt-dlp {} available on {preferred}", target.version);
    let key = version_key(UPDATE_AVAILABLE_KEY, preferred, &target.version);
    state.notifications.retract_local_matching(
        &local_id(&channel_key(UPDATE_AVAILABLE_KEY, preferred)),
        Some(&local_id(&key)),
    );
    state.notifications.publish_local(
        Notification::local(
            &key,
            NotificationKind::Update,
            "yt-dlp update available",
            format!(
                "Version {} is available on the {preferred} channel.",
                target.version
            ),
            now,
        )
        .with_action(format!("{UPDATE_ACTION_PREFIX}{preferred}"), "Update now"),
    );
    Vec::new()
}

fn begin_update(state: &mut AppState, channel: Channel) -> Vec<Effect> {
    if channel == Channel::Unknown {
        engine_warn!("Ignoring update request for unknown channel");
        return Vec::new();
    }
    if state.updates.is_busy() {
        engine_debug!("Update request coalesced, a cycle is already running");
        return Vec::new();
    }
    state.updates.is_updating = true;
    state.updates.last_error = None;
    state.mark_dirty();
    engine_info!("Starting yt-dlp update ({channel})");
    vec![Effect::RunRemediation { channel }]
}

fn finish_update(
    state: &mut AppState,
    channel: Channel,
    outcome: Result<String, UpdateFailure>,
    now: DateTime<Utc>,
) -> Vec<Effect> {
    if !state.updates.is_updating {
        engine_warn!("Dropping remediation result: no update in flight");
        return Vec::new();
    }
    state.updates.is_updating = false;
    state.mark_dirty();

    match outcome {
        Ok(version) => {
            state.set_local_version(&version);
            state.apply_decision();
            for kind in [UPDATE_AVAILABLE_KEY, UPDATE_FAILED_KEY, UPDATE_SUCCESS_KEY] {
                state
                    .notifications
                    .retract_local_matching(&local_id(&channel_key(kind, channel)), None);
            }
            state.notifications.publish_local(Notification::local(
                &version_key(UPDATE_SUCCESS_KEY, channel, &version),
                NotificationKind::Success,
                "yt-dlp updated",
                format!("yt-dlp is now at version {version} ({channel})."),
                now,
            ));
            engine_info!("yt-dlp updated to {version} ({channel})");
        }
        Err(failure) => {
            engine_warn!("yt-dlp update ({channel}) failed: {failure}");
            state.updates.last_error = Some(failure.user_message());
            let target = state
                .updates
                .target_version
                .as_ref()
                .filter(|target| classify(&target.version) == channel)
                .map_or("latest", |target| target.version.as_str());
            let key = version_key(UPDATE_FAILED_KEY, channel, target);
            state.notifications.retract_local_matching(
                &local_id(&channel_key(UPDATE_FAILED_KEY, channel)),
                Some(&local_id(&key)),
            );
            state.notifications.publish_local(
                Notification::local(
                    &key,
                    NotificationKind::Error,
                    "yt-dlp update failed",
                    failure.user_message(),
                    now,
                )
                .with_action(RETRY_UPDATE_ACTION, "Retry"),
            );
        }
    }
    Vec::new()
}

fn run_action(
    state: &mut AppState,
    notification_id: &str,
    action_id: &str,
    now: DateTime<Utc>,
) -> Vec<Effect> {
    if action_id == RETRY_CHECK_ACTION {
        return begin_check(state, true, now);
    }
    if action_id == RETRY_UPDATE_ACTION {
        let channel = failed_update_channel(notification_id)
            .unwrap_or_else(|| state.settings.preferred_channel());
        return begin_update(state, channel);
    }
    match action_id
        .strip_prefix(UPDATE_ACTION_PREFIX)
        .and_then(channel_named)
    {
        Some(channel) => begin_update(state, channel),
        None => {
            engine_debug!("No engine handler for notification action {action_id}");
            Vec::new()
        }
    }
}

fn channel_named(name: &str) -> Option<Channel> {
    match name {
        "stable" => Some(Channel::Stable),
        "nightly" => Some(Channel::Nightly),
        _ => None,
    }
}

/// Channel from a `local:update-failed:<channel>:<version>` id.
fn failed_update_channel(notification_id: &str) -> Option<Channel> {
    let rest = notification_id
        .strip_prefix(LOCAL_PREFIX)?
        .strip_prefix(UPDATE_FAILED_KEY)?
        .strip_prefix(':')?;
    rest.split(':').next().and_then(channel_named)
}

fn check_failed_key(last_checked: Option<DateTime<Utc>>) -> String {
    match last_checked {
        Some(at) => format!("{CHECK_FAILED_KEY}:{}", at.timestamp_millis()),
        None => format!("{CHECK_FAILED_KEY}:initial"),
    }
}

/// `<kind>:<channel>:`, the prefix shared by all versions of an alert.
fn channel_key(kind: &str, channel: Channel) -> String {
    format!("{kind}:{channel}:")
}

fn version_key(kind: &str, channel: Channel, version: &str) -> String {
    format!("{kind}:{channel}:{version}")
}

fn local_id(key: &str) -> String {
    format!("{LOCAL_PREFIX}{key}")
}

fn persist_history_if(state: &AppState, changed: bool) -> Vec<Effect> {
    if changed {
        vec![Effect::PersistJobHistory(state.jobs.history().to_vec())]
    } else {
        Vec::new()
    }
}

fn persist_notifications(state: &AppState) -> Effect {
    Effect::PersistNotificationState {
        dismissed: state.notifications.dismissed_ids().iter().cloned().collect(),
        read: state.notifications.read_status().clone(),
    }
}
