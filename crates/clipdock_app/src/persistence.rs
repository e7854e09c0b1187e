use std::collections::{BTreeMap, BTreeSet};

use clipdock_core::{JobSnapshot, Msg};
use clipdock_engine::{
    load_json, save_json, KeyValueStore, DISMISSED_NOTIFICATIONS_KEY, JOB_HISTORY_KEY,
    NOTIFICATION_READ_KEY,
};
use clipdock_logging::{engine_error, engine_info, engine_warn};
use serde::de::DeserializeOwned;

/// Messages that seed a fresh `AppState` from what the last run saved.
pub(crate) fn restore_messages(store: &dyn KeyValueStore) -> Vec<Msg> {
    let history: Vec<JobSnapshot> = load_or_default(store, JOB_HISTORY_KEY);
    let dismissed: BTreeSet<String> = load_or_default::<Vec<String>>(store, DISMISSED_NOTIFICATIONS_KEY)
        .into_iter()
        .collect();
    let read: BTreeMap<String, bool> = load_or_default(store, NOTIFICATION_READ_KEY);

    engine_info!(
        "Restored {} history entries, {} dismissed and {} read notifications",
        history.len(),
        dismissed.len(),
        read.len()
    );
    vec![
        Msg::RestoreNotificationState { dismissed, read },
        Msg::RestoreHistory(history),
    ]
}

pub(crate) fn save_history(store: &dyn KeyValueStore, history: &[JobSnapshot]) {
    if let Err(err) = save_json(store, JOB_HISTORY_KEY, history) {
        engine_error!("Failed to persist job history: {err}");
    }
}

pub(crate) fn save_notification_state(
    store: &dyn KeyValueStore,
    dismissed: &[String],
    read: &BTreeMap<String, bool>,
) {
    if let Err(err) = save_json(store, DISMISSED_NOTIFICATIONS_KEY, dismissed) {
        engine_error!("Failed to persist dismissed notifications: {err}");
    }
    if let Err(err) = save_json(store, NOTIFICATION_READ_KEY, read) {
        engine_error!("Failed to persist notification read status: {err}");
    }
}

/// Unreadable values are logged and treated as absent so a corrupt file
/// never blocks startup.
fn load_or_default<T: DeserializeOwned + Default>(store: &dyn KeyValueStore, key: &str) -> T {
    match load_json(store, key) {
        Ok(Some(value)) => value,
        Ok(None) => T::default(),
        Err(err) => {
            engine_warn!("Ignoring persisted {key}: {err}");
            T::default()
        }
    }
}
