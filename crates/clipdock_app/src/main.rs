//! clipdock: keeps yt-dlp current and mirrors download jobs from the job
//! supervisor, driven by a single message loop.
mod config;
mod coordinator;
mod effects;
mod logging;
mod persistence;
mod presenter;

use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use clipdock_core::{AppState, JobRequest, Msg};
use clipdock_engine::{ensure_state_dir, JsonFileStore, KeyValueStore};
use clipdock_logging::{engine_debug, engine_info};

use config::AppConfig;
use coordinator::{Coordinator, StateBuses};
use effects::EffectRunner;
use presenter::LogPresenter;

/// How long `--once` waits for further engine results before exiting.
const ONCE_IDLE: Duration = Duration::from_secs(3);

#[derive(Parser)]
#[command(name = "clipdock")]
#[command(about = "Keeps yt-dlp current and tracks download jobs")]
#[command(version)]
struct Cli {
    /// RON config file; defaults apply when it does not exist
    #[arg(long, short, value_name = "PATH", default_value = "clipdock.ron")]
    config: PathBuf,

    /// Run one forced check and one reconcile, then exit when idle
    #[arg(long)]
    once: bool,

    /// Submit a download to the supervisor at startup (repeatable)
    #[arg(long, value_name = "URL")]
    submit: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(&cli.config)?;
    logging::initialize(config.log.destination, &config.log.level, &config.log.file);
    engine_info!("clipdock starting (config {})", cli.config.display());

    ensure_state_dir(&config.state_dir)
        .with_context(|| format!("preparing state dir {}", config.state_dir.display()))?;
    let store: Arc<dyn KeyValueStore> = Arc::new(JsonFileStore::new(config.state_dir.clone()));

    let (msg_tx, msg_rx) = mpsc::channel::<Msg>();
    let tick_tx = msg_tx.clone();
    let runner = EffectRunner::new(&config, store.clone(), msg_tx)?;
    let buses = StateBuses::default();
    let _presenter = LogPresenter::attach(&buses);
    let mut coordinator = Coordinator::new(AppState::with_settings(config.update), buses);

    let mut startup = persistence::restore_messages(store.as_ref());
    startup.push(Msg::ReconcileRequested);
    startup.push(Msg::CheckRequested {
        force: cli.once,
        now: Utc::now(),
    });
    startup.extend(
        cli.submit
            .into_iter()
            .map(|url| Msg::SubmitRequested(JobRequest::new(url))),
    );
    for msg in startup {
        runner.run(coordinator.dispatch(msg, Utc::now()));
    }

    if cli.once {
        run_until_idle(&mut coordinator, &runner, &msg_rx);
    } else {
        spawn_ticker(tick_tx, config.tick_interval())?;
        run_forever(&mut coordinator, &runner, &msg_rx);
    }
    engine_info!("clipdock stopped");
    Ok(())
}

/// Background tick that drives scheduled update checks. Ticks share the
/// inbox with engine results, so a busy inbox cannot starve them.
fn spawn_ticker(tx: mpsc::Sender<Msg>, interval: Duration) -> Result<()> {
    thread::Builder::new()
        .name("clipdock-ticker".to_string())
        .spawn(move || loop {
            thread::sleep(interval);
            if tx.send(Msg::Tick { now: Utc::now() }).is_err() {
                break;
            }
        })
        .context("spawning tick thread")?;
    Ok(())
}

fn run_forever(coordinator: &mut Coordinator, runner: &EffectRunner, msg_rx: &mpsc::Receiver<Msg>) {
    while let Ok(msg) = msg_rx.recv() {
        runner.run(coordinator.dispatch(msg, Utc::now()));
    }
}

fn run_until_idle(coordinator: &mut Coordinator, runner: &EffectRunner, msg_rx: &mpsc::Receiver<Msg>) {
    loop {
        match msg_rx.recv_timeout(ONCE_IDLE) {
            Ok(msg) => runner.run(coordinator.dispatch(msg, Utc::now())),
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if coordinator.state().update_state().is_busy() {
                    engine_debug!("Still waiting on the update check");
                    continue;
                }
                break;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => break,
        }
    }
}
