use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use clipdock_logging::{engine_debug, engine_trace};
use serde::{Deserialize, Serialize};

/// Maximum number of finished jobs kept in history.
pub const HISTORY_LIMIT: usize = 200;

pub type JobId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    #[default]
    Queued,
    Started,
    Downloading,
    Processing,
    Completed,
    Error,
    Cancelled,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Cancelled)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobSnapshot {
    pub job_id: JobId,
    #[serde(default)]
    pub status: JobStatus,
    #[serde(default)]
    pub percent: Option<f32>,
    #[serde(default)]
    pub speed: Option<String>,
    #[serde(default)]
    pub eta: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub ended_at: Option<DateTime<Utc>>,
}

impl JobSnapshot {
    /// A record holding nothing but an id and a status.
    pub fn partial(job_id: impl Into<JobId>, status: JobStatus) -> Self {
        Self {
            job_id: job_id.into(),
            status,
            percent: None,
            speed: None,
            eta: None,
            size: None,
            title: None,
            output_path: None,
            error: None,
            url: None,
            started_at: None,
            ended_at: None,
        }
    }

    fn apply(&mut self, patch: JobPatch) {
        let JobPatch {
            status,
            percent,
            speed,
            eta,
            size,
            title,
            output_path,
            url,
        } = patch;
        if let Some(status) = status {
            self.status = status;
        }
        if percent.is_some() {
            self.percent = percent;
        }
        if speed.is_some() {
            self.speed = speed;
        }
        if eta.is_some() {
            self.eta = eta;
        }
        if size.is_some() {
            self.size = size;
        }
        if title.is_some() {
            self.title = title;
        }
        if output_path.is_some() {
            self.output_path = output_path;
        }
        if url.is_some() {
            self.url = url;
        }
    }
}

/// Fields carried by incremental supervisor events; `None` leaves a field as is.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct JobPatch {
    pub status: Option<JobStatus>,
    pub percent: Option<f32>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub size: Option<String>,
    pub title: Option<String>,
    pub output_path: Option<String>,
    pub url: Option<String>,
}

/// Push notification from the job supervisor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum JobEvent {
    Progress {
        job_id: JobId,
        #[serde(flatten)]
        patch: JobPatch,
    },
    Start {
        job_id: JobId,
        #[serde(flatten)]
        patch: JobPatch,
    },
    End {
        job_id: JobId,
        #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
        ended_at: Option<DateTime<Utc>>,
    },
    Error {
        job_id: JobId,
        #[serde(default, alias = "error")]
        message: String,
    },
    JobCancelled {
        job_id: JobId,
    },
    QueueUpdate {
        job_id: JobId,
        #[serde(flatten)]
        patch: JobPatch,
    },
    QueueCleared,
}

/// Active jobs plus finished-job history, kept in step with the supervisor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobRegistry {
    active: BTreeMap<JobId, JobSnapshot>,
    history: Vec<JobSnapshot>,
    /// Jobs that ended and are waiting for their full detail before entering history.
    awaiting_detail: BTreeMap<JobId, JobSnapshot>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, job_id: &str) -> Option<&JobSnapshot> {
        self.active.get(job_id)
    }

    pub fn active_jobs(&self) -> impl Iterator<Item = &JobSnapshot> {
        self.active.values()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Finished jobs, most recently ended first.
    pub fn history(&self) -> &[JobSnapshot] {
        &self.history
    }

    /// Replaces the active set with the supervisor's full list.
    ///
    /// Returns true when history changed.
    pub fn reconcile(&mut self, listed: Vec<JobSnapshot>, completed: Vec<JobSnapshot>) -> bool {
        let mut active = BTreeMap::new();
        let mut finished = Vec::new();
        for job in listed {
            if job.status.is_terminal() {
                if job.status == JobStatus::Completed {
                    finished.push(job);
                }
            } else {
                active.insert(job.job_id.clone(), job);
            }
        }
        engine_debug!(
            "Reconciled jobs: {} active (was {}), {} finished",
            active.len(),
            self.active.len(),
            finished.len() + completed.len()
        );
        self.active = active;

        let mut changed = false;
        for job in finished.into_iter().chain(completed) {
            if job.status == JobStatus::Cancelled {
                continue;
            }
            self.awaiting_detail.remove(&job.job_id);
            changed |= self.record_history(job);
        }
        changed
    }

    /// Applies one push event. Returns the id of a job whose full detail
    /// should be fetched before it lands in history.
    pub fn apply_event(&mut self, event: JobEvent, now: DateTime<Utc>) -> Option<JobId> {
        match event {
            JobEvent::Progress { job_id, patch } => {
                self.patch(job_id, patch, JobStatus::Downloading);
                None
            }
            JobEvent::Start { job_id, mut patch } => {
                if patch.status.is_none() {
                    patch.status = Some(JobStatus::Started);
                }
                let job = self.patch(job_id, patch, JobStatus::Started);
                job.started_at = job.started_at.or(Some(now));
                None
            }
            JobEvent::QueueUpdate { job_id, patch } => {
                self.patch(job_id, patch, JobStatus::Queued);
                None
            }
            JobEvent::End { job_id, ended_at } => self.finish(job_id, ended_at.unwrap_or(now)),
            JobEvent::Error { job_id, message } => {
                let job = self
                    .active
                    .entry(job_id.clone())
                    .or_insert_with(|| JobSnapshot::partial(job_id, JobStatus::Error));
                job.status = JobStatus::Error;
                job.error = Some(message);
                None
            }
            JobEvent::JobCancelled { job_id } => {
                self.active.remove(&job_id);
                None
            }
            JobEvent::QueueCleared => {
                let before = self.active.len();
                self.active.retain(|_, job| job.status != JobStatus::Queued);
                engine_debug!("Queue cleared, dropped {} queued jobs", before - self.active.len());
                None
            }
        }
    }

    /// Moves a job awaiting detail into history. Falls back to the last known
    /// snapshot when the detail fetch produced nothing.
    pub fn complete_detail(&mut self, job_id: &str, detail: Option<JobSnapshot>) -> bool {
        let Some(stashed) = self.awaiting_detail.remove(job_id) else {
            engine_trace!("Ignoring detail for job {job_id}: not awaiting one");
            return false;
        };
        let entry = match detail {
            Some(mut detail) => {
                detail.status = JobStatus::Completed;
                detail.ended_at = detail.ended_at.or(stashed.ended_at);
                detail.started_at = detail.started_at.or(stashed.started_at);
                detail
            }
            None => stashed,
        };
        self.record_history(entry)
    }

    pub fn is_awaiting_detail(&self, job_id: &str) -> bool {
        self.awaiting_detail.contains_key(job_id)
    }

    /// Registers a freshly submitted job so it shows before the first event.
    pub fn insert_submitted(&mut self, job_id: JobId, url: Option<String>) {
        let job = self
            .active
            .entry(job_id.clone())
            .or_insert_with(|| JobSnapshot::partial(job_id, JobStatus::Queued));
        if job.url.is_none() {
            job.url = url;
        }
    }

    /// Removes a job ahead of the supervisor confirming the cancellation.
    pub fn optimistic_cancel(&mut self, job_id: &str) -> bool {
        self.active.remove(job_id).is_some()
    }

    /// Puts a job back into the queue, clearing its previous failure.
    pub fn mark_retrying(&mut self, job_id: &str) -> bool {
        match self.active.get_mut(job_id) {
            Some(job) => {
                job.status = JobStatus::Queued;
                job.error = None;
                job.percent = None;
                job.speed = None;
                job.eta = None;
                true
            }
            None => false,
        }
    }

    /// Drops history entries that ended before `now - max_age`.
    pub fn prune_history(&mut self, max_age: Duration, now: DateTime<Utc>) -> bool {
        let Some(cutoff) = now.checked_sub_signed(max_age) else {
            return false;
        };
        let before = self.history.len();
        self.history
            .retain(|job| job.ended_at.map_or(true, |ended| ended >= cutoff));
        before != self.history.len()
    }

    /// Seeds history from persisted state, keeping the usual ordering rules.
    pub fn restore_history(&mut self, jobs: Vec<JobSnapshot>) {
        for job in jobs {
            self.record_history(job);
        }
    }

    fn patch(&mut self, job_id: JobId, patch: JobPatch, fallback: JobStatus) -> &mut JobSnapshot {
        let job = self
            .active
            .entry(job_id.clone())
            .or_insert_with(|| JobSnapshot::partial(job_id, fallback));
        job.apply(patch);
        job
    }

    fn finish(&mut self, job_id: JobId, ended_at: DateTime<Utc>) -> Option<JobId> {
        let removed = self.active.remove(&job_id);
        if removed.is_none()
            && (self.awaiting_detail.contains_key(&job_id)
                || self.history.iter().any(|job| job.job_id == job_id))
        {
            engine_trace!("Duplicate end for job {job_id}");
            return None;
        }
        let mut job = removed.unwrap_or_else(|| JobSnapshot::partial(job_id.clone(), JobStatus::Completed));
        job.status = JobStatus::Completed;
        job.percent = Some(100.0);
        job.ended_at = job.ended_at.or(Some(ended_at));
        self.awaiting_detail.insert(job_id.clone(), job);
        Some(job_id)
    }

    fn record_history(&mut self, job: JobSnapshot) -> bool {
        if let Some(existing) = self.history.iter().find(|j| j.job_id == job.job_id) {
            if *existing == job {
                return false;
            }
        }
        self.history.retain(|j| j.job_id != job.job_id);
        self.history.push(job);
        self.history.sort_by(|a, b| b.ended_at.cmp(&a.ended_at));
        self.history.truncate(HISTORY_LIMIT);
        true
    }
}
