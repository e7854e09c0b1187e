use std::io;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use clipdock_core::{Channel, JobId, JobRequest, SupervisorOp};
use clipdock_logging::{engine_debug, engine_info, engine_warn};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::feed::ReleaseFeed;
use crate::supervisor::{JobEventSink, JobSupervisor};
use crate::tool::{read_version, remediate, VersionTool};
use crate::types::{EngineEvent, EngineEventSink, JobList};

/// IO requests accepted by the engine thread.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineCommand {
    CheckForUpdates { read_local_version: bool },
    RunRemediation { channel: Channel },
    ReconcileJobs,
    FetchJobDetail { job_id: JobId },
    SubmitJob(JobRequest),
    CancelJob { job_id: JobId },
    RetryJob { job_id: JobId },
    ClearQueue,
    CleanupCompleted { max_age_ms: u64 },
}

/// The collaborators the engine talks to.
#[derive(Clone)]
pub struct EngineServices {
    pub feed: Arc<dyn ReleaseFeed>,
    pub tool: Arc<dyn VersionTool>,
    pub supervisor: Arc<dyn JobSupervisor>,
}

#[derive(Debug, Clone)]
pub struct EngineSettings {
    /// Keep a push-event stream open against the supervisor.
    pub stream_events: bool,
    pub reconnect_delay: Duration,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            stream_events: true,
            reconnect_delay: Duration::from_secs(5),
        }
    }
}

#[derive(Clone)]
struct Shared {
    services: EngineServices,
    sink: Arc<dyn EngineEventSink>,
    /// Single permit: at most one tool invocation at a time.
    tool_gate: Arc<Semaphore>,
}

/// Owns a background thread with its own tokio runtime. Commands are queued
/// through [`EngineHandle::send`]; results come back through the sink.
pub struct EngineHandle {
    cmd_tx: mpsc::Sender<EngineCommand>,
    shutdown: CancellationToken,
}

impl EngineHandle {
    pub fn new(
        services: EngineServices,
        settings: EngineSettings,
        sink: Arc<dyn EngineEventSink>,
    ) -> io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("clipdock-engine")
            .enable_all()
            .build()?;
        let (cmd_tx, cmd_rx) = mpsc::channel::<EngineCommand>();
        let shutdown = CancellationToken::new();
        let shared = Shared {
            services,
            sink,
            tool_gate: Arc::new(Semaphore::new(1)),
        };

        if settings.stream_events {
            runtime.spawn(pump_events(
                shared.clone(),
                settings.reconnect_delay,
                shutdown.clone(),
            ));
        }

        let token = shutdown.clone();
        thread::Builder::new()
            .name("clipdock-engine-commands".to_string())
            .spawn(move || {
                while let Ok(command) = cmd_rx.recv() {
                    let shared = shared.clone();
                    let token = token.clone();
                    runtime.spawn(async move {
                        tokio::select! {
                            _ = token.cancelled() => {}
                            _ = handle_command(&shared, command) => {}
                        }
                    });
                }
                token.cancel();
                engine_debug!("Engine command loop stopped");
            })?;

        Ok(Self { cmd_tx, shutdown })
    }

    /// Queues a command. Returns false once the engine has stopped.
    pub fn send(&self, command: EngineCommand) -> bool {
        self.cmd_tx.send(command).is_ok()
    }
}

impl Drop for EngineHandle {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn handle_command(shared: &Shared, command: EngineCommand) {
    let services = &shared.services;
    let supervisor = services.supervisor.as_ref();
    engine_debug!("Engine command: {command:?}");
    let event = match command {
        EngineCommand::CheckForUpdates { read_local_version } => {
            let local_version = if read_local_version {
                let _permit = shared.tool_gate.acquire().await.ok();
                match read_version(services.tool.as_ref()).await {
                    Ok(version) => Some(version),
                    Err(err) => {
                        engine_warn!("Could not read installed yt-dlp version: {err}");
                        None
                    }
                }
            } else {
                None
            };
            let feed = services.feed.fetch().await;
            if let Err(err) = &feed {
                engine_warn!("Release feed check failed: {err}");
            }
            EngineEvent::CheckFinished {
                local_version,
                feed,
            }
        }
        EngineCommand::RunRemediation { channel } => {
            let _permit = shared.tool_gate.acquire().await.ok();
            let result = remediate(services.tool.as_ref(), channel).await;
            match &result {
                Ok(version) => engine_info!("yt-dlp now at {version} ({channel})"),
                Err(err) => engine_warn!("yt-dlp update to {channel} failed: {err}"),
            }
            EngineEvent::RemediationFinished { channel, result }
        }
        EngineCommand::ReconcileJobs => {
            let result = tokio::try_join!(supervisor.list_jobs(), supervisor.completed_jobs())
                .map(|(listed, completed)| JobList { listed, completed });
            EngineEvent::JobsListed(result)
        }
        EngineCommand::FetchJobDetail { job_id } => {
            let detail = match supervisor.job_detail(&job_id).await {
                Ok(detail) => detail,
                Err(err) => {
                    engine_warn!("Detail lookup for job {job_id} failed: {err}");
                    None
                }
            };
            EngineEvent::JobDetail { job_id, detail }
        }
        EngineCommand::SubmitJob(request) => {
            let result = supervisor.submit(&request).await;
            EngineEvent::JobSubmitted {
                url: request.url,
                result,
            }
        }
        EngineCommand::CancelJob { job_id } => {
            let result = supervisor.cancel(&job_id).await;
            EngineEvent::CancelFinished { job_id, result }
        }
        EngineCommand::RetryJob { job_id } => {
            match supervisor.retry(&job_id).await {
                Ok(()) => return,
                Err(error) => EngineEvent::SupervisorCallFailed {
                    operation: SupervisorOp::Retry,
                    error,
                },
            }
        }
        EngineCommand::ClearQueue => match supervisor.clear_queue().await {
            Ok(()) => return,
            Err(error) => EngineEvent::SupervisorCallFailed {
                operation: SupervisorOp::ClearQueue,
                error,
            },
        },
        EngineCommand::CleanupCompleted { max_age_ms } => {
            match supervisor.cleanup_completed(max_age_ms).await {
                Ok(()) => return,
                Err(error) => EngineEvent::SupervisorCallFailed {
                    operation: SupervisorOp::Cleanup,
                    error,
                },
            }
        }
    };
    shared.sink.emit(event);
}

struct RelaySink<'a> {
    sink: &'a dyn EngineEventSink,
}

impl JobEventSink for RelaySink<'_> {
    fn emit(&self, event: clipdock_core::JobEvent) {
        self.sink.emit(EngineEvent::Supervisor(event));
    }
}

/// Keeps the supervisor push stream open, reporting each interruption and
/// reconnecting after `delay` until shutdown.
async fn pump_events(shared: Shared, delay: Duration, shutdown: CancellationToken) {
    let relay = RelaySink {
        sink: shared.sink.as_ref(),
    };
    loop {
        let result = tokio::select! {
            _ = shutdown.cancelled() => break,
            result = shared.services.supervisor.stream_events(&relay) => result,
        };
        let reason = match result {
            Ok(()) => {
                engine_info!("Supervisor event stream closed");
                None
            }
            Err(err) => {
                engine_warn!("Supervisor event stream failed: {err}");
                Some(err.to_string())
            }
        };
        shared.sink.emit(EngineEvent::EventStreamInterrupted { reason });
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(delay) => {}
        }
    }
    engine_debug!("Event pump stopped");
}
