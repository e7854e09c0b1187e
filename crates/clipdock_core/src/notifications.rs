use std::collections::{BTreeMap, BTreeSet, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Prefix for notifications raised on this machine rather than by the feed.
pub const LOCAL_PREFIX: &str = "local:";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NotificationKind {
    #[default]
    Info,
    Success,
    Warning,
    Error,
    Update,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DisplayType {
    Modal,
    Toast,
    #[default]
    List,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationAction {
    pub id: String,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    #[serde(rename = "type", default)]
    pub kind: NotificationKind,
    pub title: String,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub priority: i32,
    pub start_date: DateTime<Utc>,
    #[serde(default)]
    pub end_date: Option<DateTime<Utc>>,
    #[serde(default = "default_true")]
    pub dismissible: bool,
    #[serde(default)]
    pub is_read: bool,
    #[serde(default)]
    pub actions: Vec<NotificationAction>,
    #[serde(default)]
    pub display_type: DisplayType,
}

fn default_true() -> bool {
    true
}

impl Notification {
    /// A notification raised locally, effective from `now`.
    pub fn local(
        key: &str,
        kind: NotificationKind,
        title: impl Into<String>,
        message: impl Into<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: format!("{LOCAL_PREFIX}{key}"),
            kind,
            title: title.into(),
            message: message.into(),
            priority: 0,
            start_date: now,
            end_date: None,
            dismissible: true,
            is_read: false,
            actions: Vec::new(),
            display_type: DisplayType::Toast,
        }
    }

    pub fn with_action(mut self, id: impl Into<String>, label: impl Into<String>) -> Self {
        self.actions.push(NotificationAction {
            id: id.into(),
            label: label.into(),
        });
        self
    }

    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.start_date <= now && self.end_date.map_or(true, |end| now < end)
    }
}

/// Merges a fresh remote list with local interaction history.
///
/// Dismissed ids are dropped. Ids already known keep their local read flag;
/// new ids keep whatever the server sent.
pub fn merge(
    remote: Vec<Notification>,
    dismissed: &BTreeSet<String>,
    prior_read: &BTreeMap<String, bool>,
) -> Vec<Notification> {
    remote
        .into_iter()
        .filter(|n| !dismissed.contains(&n.id))
        .map(|mut n| {
            if let Some(read) = prior_read.get(&n.id) {
                n.is_read = *read;
            }
            n
        })
        .collect()
}

/// Remote and local notifications plus the persisted read/dismissed state.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NotificationCenter {
    remote: Vec<Notification>,
    local: Vec<Notification>,
    dismissed: BTreeSet<String>,
    read: BTreeMap<String, bool>,
    toasts_shown: HashSet<String>,
}

impl NotificationCenter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds persisted interaction state, typically once at startup.
    pub fn restore(&mut self, dismissed: BTreeSet<String>, read: BTreeMap<String, bool>) {
        self.dismissed = dismissed;
        self.read = read;
        self.remote.retain(|n| !self.dismissed.contains(&n.id));
        self.local.retain(|n| !self.dismissed.contains(&n.id));
        for n in self.remote.iter_mut().chain(self.local.iter_mut()) {
            if let Some(read) = self.read.get(&n.id) {
                n.is_read = *read;
            }
        }
    }

    pub fn merge_remote(&mut self, remote: Vec<Notification>) {
        let mut prior = self.read.clone();
        for n in &self.remote {
            prior.entry(n.id.clone()).or_insert(n.is_read);
        }
        self.remote = merge(remote, &self.dismissed, &prior);
    }

    /// Adds a local notification or refreshes the content of the one with the
    /// same id. Read, dismissed and toast bookkeeping for the id is kept, so a
    /// repeat of the same alert neither toasts again nor undoes a dismissal.
    /// Returns false when the id was dismissed.
    pub fn publish_local(&mut self, mut notification: Notification) -> bool {
        if self.dismissed.contains(&notification.id) {
            return false;
        }
        let previous = self.local.iter().position(|n| n.id == notification.id);
        notification.is_read = match self.read.get(&notification.id) {
            Some(read) => *read,
            None => previous.map_or(notification.is_read, |i| self.local[i].is_read),
        };
        match previous {
            Some(i) => self.local[i] = notification,
            None => self.local.push(notification),
        }
        true
    }

    pub fn retract_local(&mut self, id: &str) -> bool {
        let before = self.local.len();
        self.local.retain(|n| n.id != id);
        before != self.local.len()
    }

    /// Retracts every local notification whose id starts with `prefix`,
    /// except `keep`.
    pub fn retract_local_matching(&mut self, prefix: &str, keep: Option<&str>) -> bool {
        let before = self.local.len();
        self.local
            .retain(|n| !n.id.starts_with(prefix) || Some(n.id.as_str()) == keep);
        before != self.local.len()
    }

    pub fn mark_read(&mut self, id: &str) -> bool {
        let Some(n) = self.find_mut(id) else {
            return false;
        };
        n.is_read = true;
        self.read.insert(id.to_string(), true);
        true
    }

    /// Hides a notification permanently. Non-dismissible ones stay.
    pub fn dismiss(&mut self, id: &str) -> bool {
        match self.find(id) {
            Some(n) if n.dismissible => {}
            _ => return false,
        }
        self.remote.retain(|n| n.id != id);
        self.local.retain(|n| n.id != id);
        self.dismissed.insert(id.to_string());
        true
    }

    pub fn find(&self, id: &str) -> Option<&Notification> {
        self.remote.iter().chain(self.local.iter()).find(|n| n.id == id)
    }

    fn find_mut(&mut self, id: &str) -> Option<&mut Notification> {
        self.remote
            .iter_mut()
            .chain(self.local.iter_mut())
            .find(|n| n.id == id)
    }

    pub fn all(&self) -> impl Iterator<Item = &Notification> {
        self.remote.iter().chain(self.local.iter())
    }

    pub fn unread_count(&self) -> usize {
        self.all().filter(|n| !n.is_read).count()
    }

    pub fn dismissed_ids(&self) -> &BTreeSet<String> {
        &self.dismissed
    }

    pub fn read_status(&self) -> &BTreeMap<String, bool> {
        &self.read
    }

    /// The single modal to show: unread, active, highest priority.
    pub fn modal(&self, now: DateTime<Utc>) -> Option<&Notification> {
        self.all()
            .filter(|n| n.display_type == DisplayType::Modal && !n.is_read && n.is_active_at(now))
            .max_by_key(|n| n.priority)
    }

    /// Toasts not yet shown during this process lifetime. Each id is yielded once.
    pub fn take_toasts(&mut self, now: DateTime<Utc>) -> Vec<Notification> {
        let fresh: Vec<Notification> = self
            .remote
            .iter()
            .chain(self.local.iter())
            .filter(|n| {
                n.display_type == DisplayType::Toast
                    && !n.is_read
                    && n.is_active_at(now)
                    && !self.toasts_shown.contains(&n.id)
            })
            .cloned()
            .collect();
        for n in &fresh {
            self.toasts_shown.insert(n.id.clone());
        }
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 10, hour, 0, 0).unwrap()
    }

    fn remote(id: &str) -> Notification {
        Notification {
            id: id.to_string(),
            kind: NotificationKind::Info,
            title: id.to_uppercase(),
            message: String::new(),
            priority: 0,
            start_date: at(0),
            end_date: None,
            dismissible: true,
            is_read: false,
            actions: Vec::new(),
            display_type: DisplayType::List,
        }
    }

    #[test]
    fn merge_filters_dismissed_and_carries_read_flags() {
        let dismissed = BTreeSet::from(["gone".to_string()]);
        let prior = BTreeMap::from([("seen".to_string(), true)]);
        let mut server_read = remote("server-read");
        server_read.is_read = true;

        let merged = merge(
            vec![remote("gone"), remote("seen"), remote("new"), server_read],
            &dismissed,
            &prior,
        );

        let ids: Vec<_> = merged.iter().map(|n| (n.id.as_str(), n.is_read)).collect();
        assert_eq!(ids, vec![("seen", true), ("new", false), ("server-read", true)]);
    }

    #[test]
    fn modal_picks_highest_priority_unread_active() {
        let mut center = NotificationCenter::new();
        let mut low = remote("low");
        low.display_type = DisplayType::Modal;
        low.priority = 1;
        let mut high = remote("high");
        high.display_type = DisplayType::Modal;
        high.priority = 5;
        let mut expired = remote("expired");
        expired.display_type = DisplayType::Modal;
        expired.priority = 9;
        expired.end_date = Some(at(1));
        center.merge_remote(vec![low, high, expired]);

        assert_eq!(center.modal(at(2)).map(|n| n.id.as_str()), Some("high"));
        center.mark_read("high");
        assert_eq!(center.modal(at(2)).map(|n| n.id.as_str()), Some("low"));
    }

    #[test]
    fn toasts_are_yielded_once() {
        let mut center = NotificationCenter::new();
        let mut toast = remote("toast");
        toast.display_type = DisplayType::Toast;
        center.merge_remote(vec![toast.clone()]);

        assert_eq!(center.take_toasts(at(1)).len(), 1);
        assert!(center.take_toasts(at(1)).is_empty());
        center.merge_remote(vec![toast]);
        assert!(center.take_toasts(at(1)).is_empty());
    }

    #[test]
    fn non_dismissible_notifications_stay() {
        let mut center = NotificationCenter::new();
        let mut pinned = remote("pinned");
        pinned.dismissible = false;
        center.merge_remote(vec![pinned]);

        assert!(!center.dismiss("pinned"));
        assert!(center.find("pinned").is_some());
        assert!(center.dismissed_ids().is_empty());
    }

    fn local_toast(message: &str) -> Notification {
        Notification::local("disk-low", NotificationKind::Warning, "Disk low", message, at(1))
    }

    #[test]
    fn republished_local_alert_keeps_its_bookkeeping() {
        let mut center = NotificationCenter::new();
        assert!(center.publish_local(local_toast("5 GB left")));
        assert_eq!(center.take_toasts(at(1)).len(), 1);
        center.mark_read("local:disk-low");

        assert!(center.publish_local(local_toast("4 GB left")));
        let refreshed = center.find("local:disk-low").unwrap();
        assert_eq!(refreshed.message, "4 GB left");
        assert!(refreshed.is_read);
        assert!(center.take_toasts(at(1)).is_empty());
        assert_eq!(center.all().count(), 1);
    }

    #[test]
    fn dismissed_local_alert_is_not_republished() {
        let mut center = NotificationCenter::new();
        center.publish_local(local_toast("5 GB left"));
        assert!(center.dismiss("local:disk-low"));

        assert!(!center.publish_local(local_toast("4 GB left")));
        assert!(center.find("local:disk-low").is_none());
        assert!(center.dismissed_ids().contains("local:disk-low"));
    }

    #[test]
    fn retract_matching_spares_the_kept_id() {
        let mut center = NotificationCenter::new();
        for key in ["update-available:stable:1", "update-available:stable:2", "other"] {
            center.publish_local(Notification::local(
                key,
                NotificationKind::Update,
                key,
                "",
                at(1),
            ));
        }

        assert!(center.retract_local_matching(
            "local:update-available:stable:",
            Some("local:update-available:stable:2")
        ));
        let ids: Vec<_> = center.all().map(|n| n.id.as_str()).collect();
        assert_eq!(ids, vec!["local:update-available:stable:2", "local:other"]);
    }
}
