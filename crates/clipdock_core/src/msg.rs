use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};

use crate::{
    Channel, FeedSnapshot, JobEvent, JobId, JobRequest, JobSnapshot, SupervisorOp, UpdateFailure,
    UpdateSettings,
};

#[derive(Debug, Clone, PartialEq)]
pub enum Msg {
    /// Scheduler tick; starts a check when the configured frequency allows.
    Tick { now: DateTime<Utc> },
    /// User or caller asked for an update check.
    CheckRequested { force: bool, now: DateTime<Utc> },
    /// Engine finished the IO half of a check.
    CheckCompleted {
        /// Freshly read local version, when one was requested and the read worked.
        local_version: Option<String>,
        outcome: Result<FeedSnapshot, String>,
        now: DateTime<Utc>,
    },
    /// User asked to update the tool; `None` means the preferred channel.
    UpdateRequested { channel: Option<Channel> },
    /// Engine finished remediation; `Ok` carries the re-verified local version.
    RemediationCompleted {
        channel: Channel,
        outcome: Result<String, UpdateFailure>,
        now: DateTime<Utc>,
    },
    SettingsChanged(UpdateSettings),

    /// Push event from the job supervisor.
    Supervisor { event: JobEvent, now: DateTime<Utc> },
    ReconcileRequested,
    /// Full pull from the supervisor.
    JobsReconciled {
        listed: Vec<JobSnapshot>,
        completed: Vec<JobSnapshot>,
    },
    /// Best-effort detail lookup for a job that just ended.
    JobDetailFetched {
        job_id: JobId,
        detail: Option<JobSnapshot>,
    },
    SubmitRequested(JobRequest),
    JobSubmitted { job_id: JobId, url: Option<String> },
    CancelRequested { job_id: JobId },
    CancelAcknowledged { job_id: JobId, cancelled: bool },
    RetryRequested { job_id: JobId },
    ClearQueueRequested,
    CleanupRequested { max_age_ms: u64, now: DateTime<Utc> },
    /// A supervisor call failed; state is left as is.
    SupervisorFailed { operation: SupervisorOp, message: String },
    /// Restore finished jobs from persisted state.
    RestoreHistory(Vec<JobSnapshot>),

    /// Restore persisted notification interaction state.
    RestoreNotificationState {
        dismissed: BTreeSet<String>,
        read: BTreeMap<String, bool>,
    },
    NotificationRead { id: String },
    NotificationDismissed { id: String },
    /// User clicked an action button on a notification.
    NotificationAction {
        id: String,
        action_id: String,
        now: DateTime<Utc>,
    },
    /// Wakes the loop without changing state.
    NoOp,
}
