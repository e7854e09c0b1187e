use crate::{JobId, JobStatus, Notification, UpdateState};

#[derive(Debug, Clone, PartialEq, Default)]
pub struct AppViewModel {
    pub update: UpdateState,
    pub active_jobs: Vec<JobRowView>,
    pub history_len: usize,
    pub unread_notifications: usize,
    pub modal: Option<Notification>,
    pub dirty: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobRowView {
    pub job_id: JobId,
    pub title: Option<String>,
    pub status: JobStatus,
    pub percent: Option<f32>,
    pub speed: Option<String>,
    pub eta: Option<String>,
    pub error: Option<String>,
}
