use std::time::Duration;

use bytes::{Buf, BytesMut};
use clipdock_core::{JobEvent, JobId, JobRequest, JobSnapshot};
use clipdock_logging::{engine_debug, engine_warn};
use futures_util::StreamExt;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Clone)]
pub struct SupervisorSettings {
    pub base_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
}

impl Default for SupervisorSettings {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:7823".to_string(),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(15),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SupervisorError {
    #[error("invalid supervisor url: {0}")]
    InvalidUrl(String),
    #[error("supervisor returned http status {0}")]
    HttpStatus(u16),
    #[error("supervisor request timed out")]
    Timeout,
    #[error("network error: {0}")]
    Network(String),
    #[error("malformed supervisor response: {0}")]
    Decode(String),
}

/// Receives push events relayed from the supervisor.
pub trait JobEventSink: Send + Sync {
    fn emit(&self, event: JobEvent);
}

/// The external process manager that actually runs downloads.
#[async_trait::async_trait]
pub trait JobSupervisor: Send + Sync {
    async fn list_jobs(&self) -> Result<Vec<JobSnapshot>, SupervisorError>;
    async fn completed_jobs(&self) -> Result<Vec<JobSnapshot>, SupervisorError>;
    /// `Ok(None)` when the supervisor no longer knows the job.
    async fn job_detail(&self, job_id: &str) -> Result<Option<JobSnapshot>, SupervisorError>;
    async fn submit(&self, request: &JobRequest) -> Result<JobId, SupervisorError>;
    async fn cancel(&self, job_id: &str) -> Result<bool, SupervisorError>;
    async fn retry(&self, job_id: &str) -> Result<(), SupervisorError>;
    async fn clear_queue(&self) -> Result<(), SupervisorError>;
    async fn cleanup_completed(&self, max_age_ms: u64) -> Result<(), SupervisorError>;
    /// Relays push events into `sink` until the stream ends.
    async fn stream_events(&self, sink: &dyn JobEventSink) -> Result<(), SupervisorError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Submitted {
    job_id: JobId,
}

#[derive(Deserialize)]
struct Cancelled {
    cancelled: bool,
}

/// JSON-over-HTTP supervisor client. Push events arrive as newline-delimited
/// JSON from `GET <base>/events`.
#[derive(Debug, Clone)]
pub struct HttpSupervisor {
    base: Url,
    client: reqwest::Client,
    stream_client: reqwest::Client,
}

impl HttpSupervisor {
    pub fn new(settings: SupervisorSettings) -> Result<Self, SupervisorError> {
        let base = Url::parse(&settings.base_url)
            .map_err(|err| SupervisorError::InvalidUrl(format!("{}: {err}", settings.base_url)))?;
        if base.cannot_be_a_base() {
            return Err(SupervisorError::InvalidUrl(settings.base_url));
        }
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| SupervisorError::Network(err.to_string()))?;
        // The event stream stays open indefinitely, so no total timeout here.
        let stream_client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .build()
            .map_err(|err| SupervisorError::Network(err.to_string()))?;
        Ok(Self {
            base,
            client,
            stream_client,
        })
    }

    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    async fn send(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, SupervisorError> {
        let mut request = self.client.request(method, self.endpoint(segments));
        if let Some(body) = body {
            request = request.header(CONTENT_TYPE, "application/json").body(body);
        }
        request.send().await.map_err(map_reqwest_error)
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: Method,
        segments: &[&str],
        body: Option<Vec<u8>>,
    ) -> Result<T, SupervisorError> {
        let response = self.send(method, segments, body).await?;
        decode(response).await
    }

    async fn call_unit(&self, method: Method, segments: &[&str], body: Option<Vec<u8>>) -> Result<(), SupervisorError> {
        let response = self.send(method, segments, body).await?;
        check_status(&response)?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl JobSupervisor for HttpSupervisor {
    async fn list_jobs(&self) -> Result<Vec<JobSnapshot>, SupervisorError> {
        self.call(Method::GET, &["jobs"], None).await
    }

    async fn completed_jobs(&self) -> Result<Vec<JobSnapshot>, SupervisorError> {
        self.call(Method::GET, &["jobs", "completed"], None).await
    }

    async fn job_detail(&self, job_id: &str) -> Result<Option<JobSnapshot>, SupervisorError> {
        let response = self.send(Method::GET, &["jobs", job_id], None).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        decode(response).await.map(Some)
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobId, SupervisorError> {
        let body = encode(request)?;
        let submitted: Submitted = self.call(Method::POST, &["jobs"], Some(body)).await?;
        Ok(submitted.job_id)
    }

    async fn cancel(&self, job_id: &str) -> Result<bool, SupervisorError> {
        let response = self
            .send(Method::POST, &["jobs", job_id, "cancel"], None)
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        let cancelled: Cancelled = decode(response).await?;
        Ok(cancelled.cancelled)
    }

    async fn retry(&self, job_id: &str) -> Result<(), SupervisorError> {
        self.call_unit(Method::POST, &["jobs", job_id, "retry"], None)
            .await
    }

    async fn clear_queue(&self) -> Result<(), SupervisorError> {
        self.call_unit(Method::POST, &["queue", "clear"], None).await
    }

    async fn cleanup_completed(&self, max_age_ms: u64) -> Result<(), SupervisorError> {
        let body = encode(&serde_json::json!({ "maxAgeMs": max_age_ms }))?;
        self.call_unit(Method::POST, &["jobs", "cleanup"], Some(body))
            .await
    }

    async fn stream_events(&self, sink: &dyn JobEventSink) -> Result<(), SupervisorError> {
        let response = self
            .stream_client
            .get(self.endpoint(&["events"]))
            .send()
            .await
            .map_err(map_reqwest_error)?;
        check_status(&response)?;
        engine_debug!("Supervisor event stream open");

        let mut buffer = BytesMut::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(map_reqwest_error)?;
            buffer.extend_from_slice(&chunk);
            while let Some(newline) = buffer.iter().position(|b| *b == b'\n') {
                let line = buffer.split_to(newline + 1);
                relay_line(&line, sink);
            }
        }
        if buffer.has_remaining() {
            relay_line(&buffer, sink);
        }
        Ok(())
    }
}

fn relay_line(line: &[u8], sink: &dyn JobEventSink) {
    let text = String::from_utf8_lossy(line);
    let text = text.trim();
    if text.is_empty() {
        return;
    }
    match serde_json::from_str::<JobEvent>(text) {
        Ok(event) => sink.emit(event),
        Err(err) => engine_warn!("Skipping malformed supervisor event: {err}"),
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), SupervisorError> {
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(SupervisorError::HttpStatus(status.as_u16()))
    }
}

async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, SupervisorError> {
    check_status(&response)?;
    let body = response.bytes().await.map_err(map_reqwest_error)?;
    serde_json::from_slice(&body).map_err(|err| SupervisorError::Decode(err.to_string()))
}

fn encode<T: serde::Serialize + ?Sized>(value: &T) -> Result<Vec<u8>, SupervisorError> {
    serde_json::to_vec(value).map_err(|err| SupervisorError::Decode(err.to_string()))
}

fn map_reqwest_error(err: reqwest::Error) -> SupervisorError {
    if err.is_timeout() {
        return SupervisorError::Timeout;
    }
    SupervisorError::Network(err.to_string())
}
