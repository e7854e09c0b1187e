use std::time::Duration;

use clipdock_core::{FeedSnapshot, LatestVersions, Notification};
use clipdock_logging::{engine_debug, engine_warn};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct FeedSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            base_url: "https://clipdock.app".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeedError {
    #[error("invalid feed url: {0}")]
    InvalidUrl(String),
    #[error("feed returned http status {0}")]
    HttpStatus(u16),
    #[error("feed request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed feed payload: {0}")]
    Decode(String),
    #[error("feed reported failure: {0}")]
    Rejected(String),
}

/// Source of the remote release/notification config.
#[async_trait::async_trait]
pub trait ReleaseFeed: Send + Sync {
    async fn fetch(&self) -> Result<FeedSnapshot, FeedError>;
}

#[derive(Deserialize)]
struct Envelope {
    success: bool,
    #[serde(default)]
    data: Option<AppConfigData>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct AppConfigData {
    #[serde(default)]
    ytdlp: LatestVersions,
    #[serde(default)]
    app: Option<AppInfo>,
    #[serde(default)]
    notifications: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppInfo {
    #[serde(default)]
    latest_version: Option<String>,
}

/// `GET <base>/api/app-config` over reqwest.
#[derive(Debug, Clone)]
pub struct ReqwestReleaseFeed {
    endpoint: reqwest::Url,
    client: reqwest::Client,
}

impl ReqwestReleaseFeed {
    pub fn new(settings: FeedSettings) -> Result<Self, FeedError> {
        let endpoint = format!("{}/api/app-config", settings.base_url.trim_end_matches('/'));
        let endpoint = reqwest::Url::parse(&endpoint)
            .map_err(|err| FeedError::InvalidUrl(format!("{endpoint}: {err}")))?;
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| FeedError::Network(err.to_string()))?;
        Ok(Self { endpoint, client })
    }

    pub fn endpoint(&self) -> &reqwest::Url {
        &self.endpoint
    }
}

#[async_trait::async_trait]
impl ReleaseFeed for ReqwestReleaseFeed {
    async fn fetch(&self) -> Result<FeedSnapshot, FeedError> {
        engine_debug!("Fetching release feed from {}", self.endpoint);
        let response = self
            .client
            .get(self.endpoint.clone())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::HttpStatus(status.as_u16()));
        }

        let body = response.bytes().await.map_err(map_reqwest_error)?;
        parse_app_config(&body)
    }
}

/// Decodes the app-config envelope. Individual malformed notifications are
/// skipped rather than failing the whole feed.
pub fn parse_app_config(body: &[u8]) -> Result<FeedSnapshot, FeedError> {
    let envelope: Envelope =
        serde_json::from_slice(body).map_err(|err| FeedError::Decode(err.to_string()))?;
    if !envelope.success {
        return Err(FeedError::Rejected(
            envelope.error.unwrap_or_else(|| "unspecified".to_string()),
        ));
    }
    let data = envelope
        .data
        .ok_or_else(|| FeedError::Decode("missing data".to_string()))?;

    let notifications = data
        .notifications
        .into_iter()
        .filter_map(|raw| match serde_json::from_value::<Notification>(raw) {
            Ok(notification) => Some(notification),
            Err(err) => {
                engine_warn!("Skipping malformed notification: {err}");
                None
            }
        })
        .collect();

    Ok(FeedSnapshot {
        latest: data.ytdlp,
        app_latest_version: data.app.and_then(|app| app.latest_version),
        notifications,
    })
}

fn map_reqwest_error(err: reqwest::Error) -> FeedError {
    if err.is_timeout() {
        return FeedError::Timeout;
    }
    FeedError::Network(err.to_string())
}
