use std::sync::{mpsc, Arc};

use anyhow::{Context, Result};
use chrono::Utc;
use clipdock_core::{Effect, Msg, SupervisorOp, UpdateFailure};
use clipdock_engine::{
    EngineCommand, EngineEvent, EngineEventSink, EngineHandle, EngineServices, HttpSupervisor,
    KeyValueStore, ProcessVersionTool, ReqwestReleaseFeed, ToolError,
};
use clipdock_logging::{engine_debug, engine_warn};

use crate::config::AppConfig;
use crate::persistence;

/// Turns core effects into engine commands or local persistence writes.
pub struct EffectRunner {
    engine: EngineHandle,
    store: Arc<dyn KeyValueStore>,
}

impl EffectRunner {
    pub fn new(config: &AppConfig, store: Arc<dyn KeyValueStore>, msg_tx: mpsc::Sender<Msg>) -> Result<Self> {
        let services = EngineServices {
            feed: Arc::new(
                ReqwestReleaseFeed::new(config.feed_settings()).context("configuring release feed")?,
            ),
            tool: Arc::new(ProcessVersionTool::new(
                config.tool_path.clone(),
                config.tool_timeout(),
            )),
            supervisor: Arc::new(
                HttpSupervisor::new(config.supervisor_settings())
                    .context("configuring job supervisor")?,
            ),
        };
        let sink = Arc::new(MsgSink { msg_tx });
        let engine = EngineHandle::new(services, config.engine_settings(), sink)
            .context("starting engine runtime")?;
        Ok(Self { engine, store })
    }

    pub fn run(&self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::PersistJobHistory(history) => {
                    persistence::save_history(self.store.as_ref(), &history);
                }
                Effect::PersistNotificationState { dismissed, read } => {
                    persistence::save_notification_state(self.store.as_ref(), &dismissed, &read);
                }
                other => {
                    if let Some(command) = engine_command(other) {
                        if !self.engine.send(command) {
                            engine_warn!("Engine stopped; dropping command");
                        }
                    }
                }
            }
        }
    }
}

fn engine_command(effect: Effect) -> Option<EngineCommand> {
    let command = match effect {
        Effect::CheckForUpdates { read_local_version } => {
            EngineCommand::CheckForUpdates { read_local_version }
        }
        Effect::RunRemediation { channel } => EngineCommand::RunRemediation { channel },
        Effect::ReconcileJobs => EngineCommand::ReconcileJobs,
        Effect::FetchJobDetail { job_id } => EngineCommand::FetchJobDetail { job_id },
        Effect::SubmitJob(request) => EngineCommand::SubmitJob(request),
        Effect::CancelJob { job_id } => EngineCommand::CancelJob { job_id },
        Effect::RetryJob { job_id } => EngineCommand::RetryJob { job_id },
        Effect::ClearQueue => EngineCommand::ClearQueue,
        Effect::CleanupCompleted { max_age_ms } => EngineCommand::CleanupCompleted { max_age_ms },
        Effect::PersistJobHistory(_) | Effect::PersistNotificationState { .. } => return None,
    };
    Some(command)
}

/// Feeds engine results back into the coordinator's message queue.
struct MsgSink {
    msg_tx: mpsc::Sender<Msg>,
}

impl EngineEventSink for MsgSink {
    fn emit(&self, event: EngineEvent) {
        let _ = self.msg_tx.send(map_event(event));
    }
}

pub(crate) fn map_event(event: EngineEvent) -> Msg {
    let now = Utc::now();
    match event {
        EngineEvent::CheckFinished {
            local_version,
            feed,
        } => Msg::CheckCompleted {
            local_version,
            outcome: feed.map_err(|err| err.to_string()),
            now,
        },
        EngineEvent::RemediationFinished { channel, result } => Msg::RemediationCompleted {
            channel,
            outcome: result.map_err(map_tool_error),
            now,
        },
        EngineEvent::JobsListed(Ok(list)) => Msg::JobsReconciled {
            listed: list.listed,
            completed: list.completed,
        },
        EngineEvent::JobsListed(Err(err)) => supervisor_failed(SupervisorOp::Reconcile, err),
        EngineEvent::JobDetail { job_id, detail } => Msg::JobDetailFetched { job_id, detail },
        EngineEvent::JobSubmitted {
            url,
            result: Ok(job_id),
        } => Msg::JobSubmitted {
            job_id,
            url: Some(url),
        },
        EngineEvent::JobSubmitted { result: Err(err), .. } => {
            supervisor_failed(SupervisorOp::Submit, err)
        }
        EngineEvent::CancelFinished {
            job_id,
            result: Ok(cancelled),
        } => Msg::CancelAcknowledged { job_id, cancelled },
        EngineEvent::CancelFinished { result: Err(err), .. } => {
            supervisor_failed(SupervisorOp::Cancel, err)
        }
        EngineEvent::SupervisorCallFailed { operation, error } => supervisor_failed(operation, error),
        EngineEvent::Supervisor(event) => Msg::Supervisor { event, now },
        EngineEvent::EventStreamInterrupted { reason } => {
            engine_debug!(
                "Event stream interrupted ({}); reconciling",
                reason.as_deref().unwrap_or("closed")
            );
            Msg::ReconcileRequested
        }
    }
}

fn supervisor_failed(operation: SupervisorOp, err: impl std::fmt::Display) -> Msg {
    Msg::SupervisorFailed {
        operation,
        message: err.to_string(),
    }
}

fn map_tool_error(err: ToolError) -> UpdateFailure {
    match err {
        ToolError::PermissionDenied(_) => UpdateFailure::PermissionDenied,
        ToolError::Network(_) => UpdateFailure::Network,
        ToolError::Verification(detail) => UpdateFailure::Verification(detail),
        other => UpdateFailure::Failed(other.to_string()),
    }
}
