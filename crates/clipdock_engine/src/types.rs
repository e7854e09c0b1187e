use clipdock_core::{Channel, FeedSnapshot, JobEvent, JobId, JobSnapshot, SupervisorOp};

use crate::{FeedError, SupervisorError, ToolError};

/// Result of one full pull from the supervisor.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct JobList {
    pub listed: Vec<JobSnapshot>,
    pub completed: Vec<JobSnapshot>,
}

/// Everything the engine reports back to the coordinator.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    CheckFinished {
        local_version: Option<String>,
        feed: Result<FeedSnapshot, FeedError>,
    },
    /// `Ok` carries the version read back after the update.
    RemediationFinished {
        channel: Channel,
        result: Result<String, ToolError>,
    },
    JobsListed(Result<JobList, SupervisorError>),
    JobDetail {
        job_id: JobId,
        detail: Option<JobSnapshot>,
    },
    JobSubmitted {
        url: String,
        result: Result<JobId, SupervisorError>,
    },
    CancelFinished {
        job_id: JobId,
        result: Result<bool, SupervisorError>,
    },
    /// A fire-and-forget supervisor call failed.
    SupervisorCallFailed {
        operation: SupervisorOp,
        error: SupervisorError,
    },
    /// Push event relayed from the supervisor stream.
    Supervisor(JobEvent),
    /// The push stream ended; events may have been missed.
    EventStreamInterrupted { reason: Option<String> },
}

/// Receives engine events; implemented by whoever owns the state machine.
pub trait EngineEventSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Sink that forwards into a std channel.
pub struct ChannelEventSink {
    tx: std::sync::mpsc::Sender<EngineEvent>,
}

impl ChannelEventSink {
    pub fn new(tx: std::sync::mpsc::Sender<EngineEvent>) -> Self {
        Self { tx }
    }
}

impl EngineEventSink for ChannelEventSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }
}
