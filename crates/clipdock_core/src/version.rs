use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Release track of the download tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Stable,
    Nightly,
    #[default]
    Unknown,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Stable => "stable",
            Channel::Nightly => "nightly",
            Channel::Unknown => "unknown",
        }
    }

    /// The channel a user preference resolves to.
    pub fn preferred(prefer_nightly: bool) -> Self {
        if prefer_nightly {
            Channel::Nightly
        } else {
            Channel::Stable
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classifies a calendar version by shape alone.
///
/// `YYYY.MM.DD` is stable, `YYYY.MM.DD.<build>` and
/// `YYYY.MM.DD.nightly.<build>` are nightly, everything else is unknown.
pub fn classify(version: &str) -> Channel {
    let parts: Vec<&str> = version.trim().split('.').collect();
    if parts.len() < 3 || !is_calendar_date(&parts[..3]) {
        return Channel::Unknown;
    }
    match &parts[3..] {
        [] => Channel::Stable,
        [build] if is_digits(build, None) => Channel::Nightly,
        ["nightly", build] if is_digits(build, None) => Channel::Nightly,
        _ => Channel::Unknown,
    }
}

fn is_calendar_date(parts: &[&str]) -> bool {
    is_digits(parts[0], Some(4)) && is_digits(parts[1], Some(2)) && is_digits(parts[2], Some(2))
}

fn is_digits(token: &str, width: Option<usize>) -> bool {
    !token.is_empty()
        && token.bytes().all(|b| b.is_ascii_digit())
        && width.map_or(true, |w| token.len() == w)
}

/// Returns true when `candidate` is strictly newer than `current`.
///
/// A missing `current` is older than anything; a missing `candidate` is never
/// newer. Components compare numerically, `nightly` and non-numeric tokens
/// count as zero and the shorter version is padded with zeros, so
/// `2024.03.10.1` is newer than `2024.03.10`.
pub fn is_newer(current: Option<&str>, candidate: Option<&str>) -> bool {
    match (current, candidate) {
        (_, None) => false,
        (None, Some(_)) => true,
        (Some(current), Some(candidate)) => {
            compare_versions(current, candidate) == Ordering::Less
        }
    }
}

/// Component-wise comparison with zero padding.
pub fn compare_versions(left: &str, right: &str) -> Ordering {
    let left = components(left);
    let right = components(right);
    let len = left.len().max(right.len());
    for idx in 0..len {
        let l = left.get(idx).copied().unwrap_or(0);
        let r = right.get(idx).copied().unwrap_or(0);
        match l.cmp(&r) {
            Ordering::Equal => continue,
            other => return other,
        }
    }
    Ordering::Equal
}

fn components(version: &str) -> Vec<u64> {
    version
        .trim()
        .split('.')
        .map(|token| {
            if token == "nightly" {
                0
            } else {
                token.parse::<u64>().unwrap_or(0)
            }
        })
        .collect()
}
