use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex, Once};
use std::time::Duration;

use clipdock_core::{
    Channel, FeedSnapshot, JobEvent, JobId, JobPatch, JobRequest, JobSnapshot, JobStatus,
    LatestVersions, SupervisorOp, VersionInfo,
};
use clipdock_engine::{
    ChannelEventSink, EngineCommand, EngineEvent, EngineHandle, EngineServices, EngineSettings,
    FeedError, JobEventSink, JobList, JobSupervisor, ReleaseFeed, SupervisorError, ToolError,
    ToolOutput, VersionTool,
};
use pretty_assertions::assert_eq;

const WAIT: Duration = Duration::from_secs(5);

fn init_logging() {
    static INIT: Once = Once::new();
    INIT.call_once(clipdock_logging::initialize_for_tests);
}

struct FixedFeed(Result<FeedSnapshot, FeedError>);

#[async_trait::async_trait]
impl ReleaseFeed for FixedFeed {
    async fn fetch(&self) -> Result<FeedSnapshot, FeedError> {
        self.0.clone()
    }
}

/// Pretends to be yt-dlp; tracks how many invocations overlap.
struct FakeTool {
    version: Mutex<String>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeTool {
    fn new(version: &str) -> Self {
        Self {
            version: Mutex::new(version.to_string()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }
}

#[async_trait::async_trait]
impl VersionTool for FakeTool {
    async fn run(&self, args: &[&str]) -> Result<ToolOutput, ToolError> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let stdout = if args.first() == Some(&"--update-to") {
            *self.version.lock().unwrap() = "2024.05.27".to_string();
            "Updated yt-dlp to stable@2024.05.27".to_string()
        } else {
            self.version.lock().unwrap().clone()
        };
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok(ToolOutput {
            success: true,
            stdout,
            stderr: String::new(),
        })
    }
}

#[derive(Default)]
struct FakeSupervisor {
    pushed: Vec<JobEvent>,
}

#[async_trait::async_trait]
impl JobSupervisor for FakeSupervisor {
    async fn list_jobs(&self) -> Result<Vec<JobSnapshot>, SupervisorError> {
        Ok(vec![JobSnapshot::partial("a", JobStatus::Downloading)])
    }

    async fn completed_jobs(&self) -> Result<Vec<JobSnapshot>, SupervisorError> {
        Ok(vec![JobSnapshot::partial("done", JobStatus::Completed)])
    }

    async fn job_detail(&self, job_id: &str) -> Result<Option<JobSnapshot>, SupervisorError> {
        if job_id == "a" {
            Ok(Some(JobSnapshot::partial("a", JobStatus::Completed)))
        } else {
            Err(SupervisorError::HttpStatus(500))
        }
    }

    async fn submit(&self, request: &JobRequest) -> Result<JobId, SupervisorError> {
        Ok(format!("job-for-{}", request.url.len()))
    }

    async fn cancel(&self, job_id: &str) -> Result<bool, SupervisorError> {
        Ok(job_id == "a")
    }

    async fn retry(&self, _job_id: &str) -> Result<(), SupervisorError> {
        Err(SupervisorError::Network("connection refused".to_string()))
    }

    async fn clear_queue(&self) -> Result<(), SupervisorError> {
        Ok(())
    }

    async fn cleanup_completed(&self, _max_age_ms: u64) -> Result<(), SupervisorError> {
        Err(SupervisorError::Timeout)
    }

    async fn stream_events(&self, sink: &dyn JobEventSink) -> Result<(), SupervisorError> {
        for event in &self.pushed {
            sink.emit(event.clone());
        }
        Err(SupervisorError::Network("stream reset".to_string()))
    }
}

fn snapshot() -> FeedSnapshot {
    FeedSnapshot {
        latest: LatestVersions {
            stable: Some(VersionInfo::new("2024.05.27")),
            nightly: None,
        },
        app_latest_version: None,
        notifications: Vec::new(),
    }
}

struct Harness {
    engine: EngineHandle,
    events: mpsc::Receiver<EngineEvent>,
    tool: Arc<FakeTool>,
}

fn start(supervisor: FakeSupervisor, stream_events: bool) -> Harness {
    init_logging();
    let tool = Arc::new(FakeTool::new("2024.04.09"));
    let services = EngineServices {
        feed: Arc::new(FixedFeed(Ok(snapshot()))),
        tool: tool.clone(),
        supervisor: Arc::new(supervisor),
    };
    let (tx, events) = mpsc::channel();
    let engine = EngineHandle::new(
        services,
        EngineSettings {
            stream_events,
            reconnect_delay: Duration::from_secs(60),
        },
        Arc::new(ChannelEventSink::new(tx)),
    )
    .expect("engine starts");
    Harness {
        engine,
        events,
        tool,
    }
}

#[test]
fn check_reads_local_version_then_fetches_feed() {
    let harness = start(FakeSupervisor::default(), false);
    assert!(harness.engine.send(EngineCommand::CheckForUpdates {
        read_local_version: true
    }));

    let event = harness.events.recv_timeout(WAIT).expect("check result");
    assert_eq!(
        event,
        EngineEvent::CheckFinished {
            local_version: Some("2024.04.09".to_string()),
            feed: Ok(snapshot()),
        }
    );
}

#[test]
fn check_without_local_read_skips_the_tool() {
    let harness = start(FakeSupervisor::default(), false);
    harness.engine.send(EngineCommand::CheckForUpdates {
        read_local_version: false,
    });

    let event = harness.events.recv_timeout(WAIT).expect("check result");
    assert!(matches!(
        event,
        EngineEvent::CheckFinished {
            local_version: None,
            feed: Ok(_)
        }
    ));
    assert_eq!(harness.tool.max_in_flight.load(Ordering::SeqCst), 0);
}

#[test]
fn tool_invocations_never_overlap() {
    let harness = start(FakeSupervisor::default(), false);
    harness.engine.send(EngineCommand::RunRemediation {
        channel: Channel::Stable,
    });
    harness.engine.send(EngineCommand::CheckForUpdates {
        read_local_version: true,
    });
    harness.engine.send(EngineCommand::RunRemediation {
        channel: Channel::Stable,
    });

    let mut remediations = 0;
    for _ in 0..3 {
        match harness.events.recv_timeout(WAIT).expect("event") {
            EngineEvent::RemediationFinished { .. } => remediations += 1,
            EngineEvent::CheckFinished { .. } => {}
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(remediations, 2);
    assert_eq!(harness.tool.max_in_flight.load(Ordering::SeqCst), 1);
}

#[test]
fn reconcile_returns_listed_and_completed() {
    let harness = start(FakeSupervisor::default(), false);
    harness.engine.send(EngineCommand::ReconcileJobs);

    let event = harness.events.recv_timeout(WAIT).expect("jobs");
    assert_eq!(
        event,
        EngineEvent::JobsListed(Ok(JobList {
            listed: vec![JobSnapshot::partial("a", JobStatus::Downloading)],
            completed: vec![JobSnapshot::partial("done", JobStatus::Completed)],
        }))
    );
}

#[test]
fn failed_detail_lookup_reports_none() {
    let harness = start(FakeSupervisor::default(), false);
    harness.engine.send(EngineCommand::FetchJobDetail {
        job_id: "b".to_string(),
    });

    let event = harness.events.recv_timeout(WAIT).expect("detail");
    assert_eq!(
        event,
        EngineEvent::JobDetail {
            job_id: "b".to_string(),
            detail: None
        }
    );
}

#[test]
fn fire_and_forget_failures_are_reported() {
    let harness = start(FakeSupervisor::default(), false);
    harness.engine.send(EngineCommand::ClearQueue);
    harness.engine.send(EngineCommand::RetryJob {
        job_id: "a".to_string(),
    });

    let event = harness.events.recv_timeout(WAIT).expect("failure");
    assert_eq!(
        event,
        EngineEvent::SupervisorCallFailed {
            operation: SupervisorOp::Retry,
            error: SupervisorError::Network("connection refused".to_string()),
        }
    );
    assert!(harness
        .events
        .recv_timeout(Duration::from_millis(200))
        .is_err());
}

#[test]
fn cancel_reports_the_acknowledgement() {
    let harness = start(FakeSupervisor::default(), false);
    harness.engine.send(EngineCommand::CancelJob {
        job_id: "zzz".to_string(),
    });

    let event = harness.events.recv_timeout(WAIT).expect("cancel");
    assert_eq!(
        event,
        EngineEvent::CancelFinished {
            job_id: "zzz".to_string(),
            result: Ok(false)
        }
    );
}

#[test]
fn pushed_events_are_relayed_then_interruption_reported() {
    let pushed = JobEvent::Progress {
        job_id: "a".to_string(),
        patch: JobPatch {
            percent: Some(10.0),
            ..JobPatch::default()
        },
    };
    let harness = start(
        FakeSupervisor {
            pushed: vec![pushed.clone()],
        },
        true,
    );

    assert_eq!(
        harness.events.recv_timeout(WAIT).expect("relayed"),
        EngineEvent::Supervisor(pushed)
    );
    assert_eq!(
        harness.events.recv_timeout(WAIT).expect("interrupted"),
        EngineEvent::EventStreamInterrupted {
            reason: Some("network error: stream reset".to_string())
        }
    );
}
