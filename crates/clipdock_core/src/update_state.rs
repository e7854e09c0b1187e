use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::notifications::Notification;
use crate::version::Channel;

/// One release as advertised by the remote feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    #[serde(default)]
    pub release_date: String,
    #[serde(default)]
    pub download_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub changelog: Option<String>,
}

impl VersionInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            release_date: String::new(),
            download_url: String::new(),
            changelog: None,
        }
    }
}

/// Latest release per channel from one feed fetch.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LatestVersions {
    #[serde(default)]
    pub stable: Option<VersionInfo>,
    #[serde(default)]
    pub nightly: Option<VersionInfo>,
}

impl LatestVersions {
    pub fn get(&self, channel: Channel) -> Option<&VersionInfo> {
        match channel {
            Channel::Stable => self.stable.as_ref(),
            Channel::Nightly => self.nightly.as_ref(),
            Channel::Unknown => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.stable.is_none() && self.nightly.is_none()
    }
}

/// Everything one successful feed fetch yields.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FeedSnapshot {
    pub latest: LatestVersions,
    pub app_latest_version: Option<String>,
    pub notifications: Vec<Notification>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckFrequency {
    Always,
    Hourly,
    #[default]
    Daily,
    Weekly,
    Never,
}

impl CheckFrequency {
    /// Minimum spacing between unforced checks; `None` disables them.
    pub fn interval(self) -> Option<Duration> {
        match self {
            CheckFrequency::Always => Some(Duration::zero()),
            CheckFrequency::Hourly => Some(Duration::hours(1)),
            CheckFrequency::Daily => Some(Duration::days(1)),
            CheckFrequency::Weekly => Some(Duration::weeks(1)),
            CheckFrequency::Never => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdateSettings {
    pub auto_update: bool,
    pub prefer_nightly: bool,
    pub frequency: CheckFrequency,
}

impl UpdateSettings {
    pub fn preferred_channel(&self) -> Channel {
        Channel::preferred(self.prefer_nightly)
    }
}

/// Process-wide "is the tool current" state.
///
/// Only the orchestrator transitions in [`crate::update`] write to it.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateState {
    pub local_version: Option<String>,
    pub local_channel: Channel,
    pub latest: LatestVersions,
    pub preferred_channel: Channel,
    pub needs_update: bool,
    pub target_version: Option<VersionInfo>,
    pub last_checked: Option<DateTime<Utc>>,
    /// When the last check started, successful or not.
    pub last_attempt: Option<DateTime<Utc>>,
    pub is_checking: bool,
    pub is_updating: bool,
    pub last_error: Option<String>,
    pub app_latest_version: Option<String>,
}

impl UpdateState {
    pub fn is_busy(&self) -> bool {
        self.is_checking || self.is_updating
    }
}

/// Why a remediation attempt did not leave the tool on a verified version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateFailure {
    PermissionDenied,
    Network,
    Verification(String),
    Failed(String),
}

impl UpdateFailure {
    pub fn user_message(&self) -> String {
        match self {
            UpdateFailure::PermissionDenied => {
                "Permission denied while updating yt-dlp. Check that the install location is writable."
                    .to_string()
            }
            UpdateFailure::Network => {
                "Could not reach the update server. Check your internet connection and try again."
                    .to_string()
            }
            UpdateFailure::Verification(detail) => {
                format!("The update reported success but could not be verified: {detail}")
            }
            UpdateFailure::Failed(detail) => format!("yt-dlp update failed: {detail}"),
        }
    }
}

impl fmt::Display for UpdateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UpdateFailure::PermissionDenied => write!(f, "permission denied"),
            UpdateFailure::Network => write!(f, "network unreachable"),
            UpdateFailure::Verification(detail) => write!(f, "verification failed: {detail}"),
            UpdateFailure::Failed(detail) => write!(f, "update failed: {detail}"),
        }
    }
}
