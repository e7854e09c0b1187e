use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Channel, JobId, JobSnapshot};

#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    /// Fetch the remote feed, reading the installed version first when asked.
    CheckForUpdates { read_local_version: bool },
    /// Run the tool's self-update for `channel` and re-verify the version.
    RunRemediation { channel: Channel },
    ReconcileJobs,
    FetchJobDetail { job_id: JobId },
    SubmitJob(JobRequest),
    CancelJob { job_id: JobId },
    RetryJob { job_id: JobId },
    ClearQueue,
    CleanupCompleted { max_age_ms: u64 },
    PersistJobHistory(Vec<JobSnapshot>),
    PersistNotificationState {
        dismissed: Vec<String>,
        read: BTreeMap<String, bool>,
    },
}

/// Download request forwarded verbatim to the supervisor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct JobRequest {
    pub url: String,
    #[serde(default)]
    pub options: BTreeMap<String, String>,
}

impl JobRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            options: BTreeMap::new(),
        }
    }
}

/// Supervisor operations, for reporting failures back into the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorOp {
    Reconcile,
    Submit,
    Cancel,
    Retry,
    ClearQueue,
    Cleanup,
}
