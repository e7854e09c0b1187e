use chrono::{DateTime, Duration, TimeZone, Utc};
use clipdock_core::{
    update, AppState, Effect, JobEvent, JobPatch, JobRequest, JobSnapshot, JobStatus, Msg,
    SupervisorOp,
};

fn t(minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 5, 1, 10, minute, 0).unwrap()
}

fn event(state: AppState, event: JobEvent) -> (AppState, Vec<Effect>) {
    update(state, Msg::Supervisor { event, now: t(0) })
}

fn progress(job_id: &str, percent: f32) -> JobEvent {
    JobEvent::Progress {
        job_id: job_id.to_string(),
        patch: JobPatch {
            percent: Some(percent),
            ..JobPatch::default()
        },
    }
}

fn job(job_id: &str, status: JobStatus) -> JobSnapshot {
    JobSnapshot::partial(job_id, status)
}

fn finished(job_id: &str, minute: u32) -> JobSnapshot {
    let mut job = job(job_id, JobStatus::Completed);
    job.ended_at = Some(t(minute));
    job
}

#[test]
fn progress_patches_only_the_matching_job() {
    let (state, _) = update(
        AppState::new(),
        Msg::JobsReconciled {
            listed: vec![job("a", JobStatus::Downloading), job("b", JobStatus::Queued)],
            completed: Vec::new(),
        },
    );
    let (mut state, effects) = event(state, progress("a", 40.0));
    assert!(effects.is_empty());

    let jobs = state.jobs();
    assert_eq!(jobs.get("a").unwrap().percent, Some(40.0));
    assert_eq!(jobs.get("b").unwrap(), &job("b", JobStatus::Queued));
    assert!(state.consume_dirty());
}

#[test]
fn reconcile_is_authoritative_for_active_set() {
    let (state, _) = event(AppState::new(), progress("x", 40.0));
    assert!(state.jobs().get("x").is_some());

    let (state, effects) = update(
        state,
        Msg::JobsReconciled {
            listed: vec![job("y", JobStatus::Downloading)],
            completed: Vec::new(),
        },
    );
    assert!(effects.is_empty());
    assert!(state.jobs().get("x").is_none());
    assert_eq!(state.jobs().active_count(), 1);
}

#[test]
fn reconcile_moves_terminal_jobs_to_history() {
    let (state, effects) = update(
        AppState::new(),
        Msg::JobsReconciled {
            listed: vec![
                job("active", JobStatus::Processing),
                finished("done-early", 1),
                job("dropped", JobStatus::Cancelled),
            ],
            completed: vec![finished("done-late", 5)],
        },
    );

    let ids: Vec<_> = state.jobs().active_jobs().map(|j| j.job_id.as_str()).collect();
    assert_eq!(ids, vec!["active"]);
    let history: Vec<_> = state.jobs().history().iter().map(|j| j.job_id.as_str()).collect();
    assert_eq!(history, vec!["done-late", "done-early"]);
    assert!(matches!(effects.as_slice(), [Effect::PersistJobHistory(jobs)] if jobs.len() == 2));

    // Same pull again changes nothing.
    let (_, effects) = update(
        state,
        Msg::JobsReconciled {
            listed: vec![job("active", JobStatus::Processing)],
            completed: vec![finished("done-late", 5), finished("done-early", 1)],
        },
    );
    assert!(effects.is_empty());
}

#[test]
fn end_moves_job_to_history_exactly_once() {
    let (state, _) = event(AppState::new(), progress("y", 90.0));
    let end = JobEvent::End {
        job_id: "y".to_string(),
        ended_at: Some(t(3)),
    };

    let (state, effects) = event(state, end.clone());
    assert_eq!(
        effects,
        vec![Effect::FetchJobDetail {
            job_id: "y".to_string()
        }]
    );
    assert!(state.jobs().get("y").is_none());
    assert!(state.jobs().history().is_empty());

    let (state, effects) = event(state, end.clone());
    assert!(effects.is_empty());

    let mut detail = job("y", JobStatus::Completed);
    detail.title = Some("Talk".to_string());
    detail.output_path = Some("/tmp/talk.mp4".to_string());
    let (state, effects) = update(
        state,
        Msg::JobDetailFetched {
            job_id: "y".to_string(),
            detail: Some(detail),
        },
    );
    assert!(matches!(effects.as_slice(), [Effect::PersistJobHistory(_)]));

    let (state, effects) = event(state, end);
    assert!(effects.is_empty());

    let history = state.jobs().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].title.as_deref(), Some("Talk"));
    assert_eq!(history[0].ended_at, Some(t(3)));
    assert_eq!(history[0].status, JobStatus::Completed);
}

#[test]
fn missing_detail_falls_back_to_last_snapshot() {
    let (state, _) = event(
        AppState::new(),
        JobEvent::Start {
            job_id: "z".to_string(),
            patch: JobPatch {
                title: Some("Clip".to_string()),
                ..JobPatch::default()
            },
        },
    );
    assert_eq!(state.jobs().get("z").unwrap().status, JobStatus::Started);
    let (state, _) = event(
        state,
        JobEvent::End {
            job_id: "z".to_string(),
            ended_at: None,
        },
    );
    let (state, _) = update(
        state,
        Msg::JobDetailFetched {
            job_id: "z".to_string(),
            detail: None,
        },
    );

    let history = state.jobs().history();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].title.as_deref(), Some("Clip"));
    assert_eq!(history[0].percent, Some(100.0));
    assert_eq!(history[0].ended_at, Some(t(0)));
}

#[test]
fn error_keeps_job_active() {
    let (state, _) = event(AppState::new(), progress("e", 10.0));
    let (state, effects) = event(
        state,
        JobEvent::Error {
            job_id: "e".to_string(),
            message: "HTTP Error 403".to_string(),
        },
    );
    assert!(effects.is_empty());
    let failed = state.jobs().get("e").unwrap();
    assert_eq!(failed.status, JobStatus::Error);
    assert_eq!(failed.error.as_deref(), Some("HTTP Error 403"));
    assert_eq!(failed.percent, Some(10.0));

    let (state, effects) = update(
        state,
        Msg::RetryRequested {
            job_id: "e".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::RetryJob {
            job_id: "e".to_string()
        }]
    );
    let retried = state.jobs().get("e").unwrap();
    assert_eq!(retried.status, JobStatus::Queued);
    assert_eq!(retried.error, None);
}

#[test]
fn cancel_removes_without_history() {
    let (state, _) = event(AppState::new(), progress("c", 10.0));
    let (state, _) = event(
        state,
        JobEvent::JobCancelled {
            job_id: "c".to_string(),
        },
    );
    assert!(state.jobs().get("c").is_none());
    assert!(state.jobs().history().is_empty());
}

#[test]
fn optimistic_cancel_is_corrected_by_reconcile() {
    let (state, _) = event(AppState::new(), progress("c", 10.0));
    let (state, effects) = update(
        state,
        Msg::CancelRequested {
            job_id: "c".to_string(),
        },
    );
    assert_eq!(
        effects,
        vec![Effect::CancelJob {
            job_id: "c".to_string()
        }]
    );
    assert!(state.jobs().get("c").is_none());

    let (state, effects) = update(
        state,
        Msg::CancelAcknowledged {
            job_id: "c".to_string(),
            cancelled: false,
        },
    );
    assert_eq!(effects, vec![Effect::ReconcileJobs]);

    let (state, _) = update(
        state,
        Msg::JobsReconciled {
            listed: vec![job("c", JobStatus::Downloading)],
            completed: Vec::new(),
        },
    );
    assert!(state.jobs().get("c").is_some());

    let (_, effects) = update(
        state,
        Msg::SupervisorFailed {
            operation: SupervisorOp::Cancel,
            message: "connection refused".to_string(),
        },
    );
    assert_eq!(effects, vec![Effect::ReconcileJobs]);
}

#[test]
fn queue_cleared_drops_only_queued_jobs() {
    let (state, _) = update(
        AppState::new(),
        Msg::JobsReconciled {
            listed: vec![
                job("q1", JobStatus::Queued),
                job("d", JobStatus::Downloading),
                job("q2", JobStatus::Queued),
                job("err", JobStatus::Error),
            ],
            completed: Vec::new(),
        },
    );
    let (state, _) = event(state, JobEvent::QueueCleared);

    let ids: Vec<_> = state.jobs().active_jobs().map(|j| j.job_id.as_str()).collect();
    assert_eq!(ids, vec!["d", "err"]);
}

#[test]
fn unknown_job_patch_synthesizes_partial_record() {
    let (state, effects) = event(AppState::new(), progress("ghost", 5.0));
    assert!(effects.is_empty());
    let ghost = state.jobs().get("ghost").unwrap();
    assert_eq!(ghost.status, JobStatus::Downloading);
    assert_eq!(ghost.title, None);

    let (state, _) = event(
        state,
        JobEvent::QueueUpdate {
            job_id: "later".to_string(),
            patch: JobPatch::default(),
        },
    );
    assert_eq!(state.jobs().get("later").unwrap().status, JobStatus::Queued);
}

#[test]
fn submit_round_trip_registers_queued_job() {
    let request = JobRequest::new("https://video.example/watch?v=1");
    let (state, effects) = update(AppState::new(), Msg::SubmitRequested(request.clone()));
    assert_eq!(effects, vec![Effect::SubmitJob(request)]);

    let (state, _) = update(
        state,
        Msg::JobSubmitted {
            job_id: "j1".to_string(),
            url: Some("https://video.example/watch?v=1".to_string()),
        },
    );
    let queued = state.jobs().get("j1").unwrap();
    assert_eq!(queued.status, JobStatus::Queued);
    assert_eq!(queued.url.as_deref(), Some("https://video.example/watch?v=1"));

    let view = state.view(t(0));
    assert_eq!(view.active_jobs.len(), 1);
    assert_eq!(
        view.active_jobs[0].title.as_deref(),
        Some("https://video.example/watch?v=1")
    );
}

#[test]
fn cleanup_prunes_old_history_and_forwards_to_supervisor() {
    let (state, _) = update(
        AppState::new(),
        Msg::JobsReconciled {
            listed: Vec::new(),
            completed: vec![finished("old", 0), finished("recent", 50)],
        },
    );

    let (state, effects) = update(
        state,
        Msg::CleanupRequested {
            max_age_ms: 30 * 60 * 1000,
            now: t(55),
        },
    );
    assert_eq!(effects[0], Effect::CleanupCompleted { max_age_ms: 1_800_000 });
    assert!(matches!(&effects[1], Effect::PersistJobHistory(jobs) if jobs.len() == 1));
    let history: Vec<_> = state.jobs().history().iter().map(|j| j.job_id.as_str()).collect();
    assert_eq!(history, vec!["recent"]);

    let (_, effects) = update(
        state,
        Msg::CleanupRequested {
            max_age_ms: u64::MAX,
            now: t(55) + Duration::days(1),
        },
    );
    assert_eq!(effects.len(), 1);
}
