use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clipdock_core::UpdateSettings;
use clipdock_engine::{EngineSettings, FeedSettings, SupervisorSettings};
use serde::{Deserialize, Serialize};

use crate::logging::LogDestination;

/// Everything the coordinator reads at startup. Every field has a default, so
/// a config file only needs to name what it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub feed_url: String,
    pub supervisor_url: String,
    pub tool_path: PathBuf,
    pub state_dir: PathBuf,
    pub update: UpdateSettings,
    pub log: LogConfig,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub tool_timeout_secs: u64,
    pub tick_interval_secs: u64,
    pub stream_events: bool,
    pub reconnect_delay_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub destination: LogDestination,
    pub level: String,
    pub file: PathBuf,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            destination: LogDestination::Both,
            level: "info".to_string(),
            file: PathBuf::from("./clipdock.log"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let feed = FeedSettings::default();
        let supervisor = SupervisorSettings::default();
        Self {
            feed_url: feed.base_url,
            supervisor_url: supervisor.base_url,
            tool_path: PathBuf::from("yt-dlp"),
            state_dir: PathBuf::from("./.clipdock"),
            update: UpdateSettings {
                auto_update: true,
                ..UpdateSettings::default()
            },
            log: LogConfig::default(),
            connect_timeout_secs: 10,
            request_timeout_secs: 30,
            tool_timeout_secs: 120,
            tick_interval_secs: 60,
            stream_events: true,
            reconnect_delay_secs: 5,
        }
    }
}

impl AppConfig {
    /// Reads `path`; a missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(err).with_context(|| format!("reading config {}", path.display()))
            }
        };
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        Ok(ron::from_str(text)?)
    }

    pub fn feed_settings(&self) -> FeedSettings {
        FeedSettings {
            base_url: self.feed_url.clone(),
            connect_timeout: self.connect_timeout(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn supervisor_settings(&self) -> SupervisorSettings {
        SupervisorSettings {
            base_url: self.supervisor_url.clone(),
            connect_timeout: self.connect_timeout(),
            request_timeout: self.request_timeout(),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            stream_events: self.stream_events,
            reconnect_delay: Duration::from_secs(self.reconnect_delay_secs),
        }
    }

    pub fn tool_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_timeout_secs.max(1))
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs.max(1))
    }

    fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs.max(1))
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}
