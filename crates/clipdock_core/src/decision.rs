use crate::update_state::{LatestVersions, VersionInfo};
use crate::version::{is_newer, Channel};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct UpdateDecision {
    pub needs_update: bool,
    /// What to recommend to the user. May come from the non-preferred channel
    /// when the preferred one has no data, but then `needs_update` is false.
    pub target: Option<VersionInfo>,
}

/// Decides whether the local tool is stale for the preferred channel.
pub fn decide(local: Option<&str>, prefer_nightly: bool, latest: &LatestVersions) -> UpdateDecision {
    if latest.is_empty() {
        return UpdateDecision::default();
    }

    let preferred = Channel::preferred(prefer_nightly);
    let other = match preferred {
        Channel::Nightly => Channel::Stable,
        _ => Channel::Nightly,
    };

    match latest.get(preferred) {
        Some(info) => UpdateDecision {
            needs_update: local.is_none() || is_newer(local, Some(&info.version)),
            target: Some(info.clone()),
        },
        None => UpdateDecision {
            needs_update: false,
            target: latest.get(other).cloned(),
        },
    }
}
