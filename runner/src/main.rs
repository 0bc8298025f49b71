mod config;
mod database;
mod execution;
mod executors;
mod git;
mod github;
mod ingest;
mod notifier;
mod planner;
mod queue;
mod sync;
#[cfg(test)]
mod testing;

use crate::{
    config::{Config, ConfigErrors},
    database::{memory::MemoryStore, ResultStore, StoreError},
    executors::LocalRunner,
    git::GitMirror,
    github::GhCli,
    notifier::{CommandMessenger, Messenger, RegressionNotifier, TracingMessenger},
    planner::{CronPlanner, Pass},
    queue::{ExecutionQueue, QueueError, QueueSettings},
    sync::Shutdown,
};
use clap::Parser;
use std::{path::PathBuf, process::ExitCode, sync::Arc, thread, time::Duration};
use thiserror::Error;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Continuously benchmark a repository and report performance regressions
#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// path to the yaml configuration
    #[arg(short, long, default_value = "perfwatch.yaml")]
    config: PathBuf,
    /// log filter directive, takes precedence over RUST_LOG
    #[arg(long)]
    log_level: Option<String>,
    /// run every enabled planning pass once, drain the queue and exit
    #[arg(long)]
    once: bool,
    /// keep results in memory instead of the configured database
    #[arg(long)]
    dry_run: bool,
}

#[derive(Error, Debug)]
enum StartupError {
    #[error(transparent)]
    Config(#[from] ConfigErrors),
    #[error("Failed to open the result store: {0}")]
    Store(#[from] StoreError),
    #[error("Failed to start the execution queue: {0}")]
    Queue(#[from] QueueError),
}

fn init_tracing(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .init();
}

fn open_store(config: &Config, dry_run: bool) -> Result<Arc<dyn ResultStore>, StoreError> {
    if dry_run {
        warn!("Dry run, results are kept in memory and lost on exit");
        return Ok(Arc::new(MemoryStore::new()));
    }

    #[cfg(feature = "rusqlite")]
    {
        let connection = database::sqlite::SharedConnection::load(&config.database.path)?;
        info!(path = %config.database.path.display(), "Opened result store");
        Ok(Arc::new(connection))
    }

    #[cfg(not(feature = "rusqlite"))]
    {
        Err(StoreError::Unavailable(format!(
            "built without SQLite support, cannot open {}",
            config.database.path.display()
        )))
    }
}

fn passes(config: &Config) -> Vec<(Pass, Duration)> {
    [
        (Pass::Branches, config.schedule.branches),
        (Pass::PullRequests, config.schedule.pull_requests),
        (Pass::Tags, config.schedule.tags),
    ]
    .into_iter()
    .filter(|(_, interval)| *interval > 0)
    .map(|(pass, interval)| (pass, Duration::from_secs(interval)))
    .collect()
}

fn run(cli: Cli) -> Result<(), StartupError> {
    let mut config = Config::load(&cli.config)?;
    if config.preflight_checks() {
        return Err(ConfigErrors::Preflight.into());
    }

    let store = open_store(&config, cli.dry_run)?;
    let shutdown = Shutdown::new();

    let messenger: Arc<dyn Messenger> = match config.notifier.command.as_ref() {
        Some(command) => Arc::new(CommandMessenger::new(
            command.clone(),
            config.notifier.params.clone(),
            Duration::from_secs(config.notifier.timeout),
        )),
        None => Arc::new(TracingMessenger),
    };
    let notifier = Arc::new(RegressionNotifier::new(
        store.clone(),
        messenger,
        config.statistics.comparator(),
        &config.notifier,
    ));

    let queue = ExecutionQueue::new(
        QueueSettings::from(&config.queue),
        store.clone(),
        Arc::new(LocalRunner::load(&config.runner)),
        notifier,
        shutdown.clone(),
    )?;
    let planner = CronPlanner::new(
        &config,
        queue.clone(),
        store,
        Arc::new(GitMirror::load(&config.repository)),
        Arc::new(GhCli::load(&config.pull_requests)),
    );
    let passes = passes(&config);

    if cli.once {
        for (pass, _) in passes.iter() {
            if let Err(error) = planner.run(*pass) {
                error!(pass = pass.name(), "Planning pass failed: {error}");
            }
        }

        match serde_json::to_string(&queue.pending()) {
            Ok(pending) => info!(elements = queue.len(), %pending, "Draining the queue"),
            Err(error) => warn!("Failed to serialize the pending elements: {error}"),
        }
        queue.drain();

        return Ok(());
    }

    // NOTE: nothing triggers the shutdown in daemon mode, the process runs until it is killed
    let mut handles = Vec::new();

    let watcher = queue.clone();
    handles.push(
        thread::Builder::new()
            .name("dispatcher".to_owned())
            .spawn(move || watcher.watch())
            .map_err(QueueError::Spawn)?,
    );

    for (pass, interval) in passes {
        let planner = planner.clone();
        let shutdown = shutdown.clone();
        info!(pass = pass.name(), interval = ?interval, "Scheduling planning pass");

        handles.push(
            thread::Builder::new()
                .name(format!("planner-{}", pass.name()))
                .spawn(move || planner.schedule(pass, interval, &shutdown))
                .map_err(QueueError::Spawn)?,
        );
    }

    for handle in handles {
        if handle.join().is_err() {
            error!("A worker thread panicked");
        }
    }

    queue.join_comparisons();

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_level.as_deref());

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            error!("{error}");
            ExitCode::FAILURE
        }
    }
}
