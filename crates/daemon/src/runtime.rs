use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{info, warn, Instrument};
use uuid::Uuid;

use crate::config::Config;
use crate::git::auth::GitAuth;
use crate::git::scheduler::{CommitScheduler, FlushOutcome, SchedulerExit};
use crate::git::worker::GitWorker;
use crate::startup::{remove_pid_file, write_pid_file, RepositoryContext};
use crate::watcher::FileWatcher;

/// One watcher plus one scheduler for one repository.
pub struct WatchSession;

pub struct WatchSessionHandle {
    session_id: Uuid,
    shutdown_tx: broadcast::Sender<()>,
    task: Option<JoinHandle<SchedulerExit>>,
}

impl WatchSessionHandle {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// Stop the session and wait for the scheduler to drain.
    pub async fn wait(mut self) -> Result<SchedulerExit> {
        self.shutdown();
        let task = self.task.take().context("watch session already joined")?;
        task.await.context("watch session task panicked")
    }
}

impl Drop for WatchSessionHandle {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl WatchSession {
    /// Must be called from within a Tokio runtime; the loop is spawned onto it.
    pub fn start(
        config: Config,
        context: RepositoryContext,
        auth: GitAuth,
    ) -> Result<WatchSessionHandle> {
        Self::start_with_reports(config, context, auth, None)
    }

    /// Like `start`, forwarding every flush outcome to `reports`.
    pub fn start_with_reports(
        config: Config,
        context: RepositoryContext,
        auth: GitAuth,
        reports: Option<mpsc::UnboundedSender<FlushOutcome>>,
    ) -> Result<WatchSessionHandle> {
        let session_id = Uuid::new_v4();
        let span = tracing::info_span!("session", id = %session_id);

        let (watcher, events) =
            FileWatcher::start(&context.watch_root, config.monitoring.recursive)?;
        let git = Arc::new(GitWorker::new(&context.repo_root).with_env(auth.env().to_vec()));
        let mut scheduler = CommitScheduler::new(git, config, watcher.root())?;
        if let Some(reports) = reports {
            scheduler = scheduler.with_reports(reports);
        }

        let pid_path = context.pid_path();
        if let Err(error) = write_pid_file(&pid_path) {
            warn!(error = %error, "could not write session PID file");
        }

        let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
        let task = tokio::spawn(
            async move {
                let _watcher = watcher;
                let exit = scheduler.run(events, shutdown_rx).await;
                remove_pid_file(&pid_path);
                info!(discarded = exit.discarded, "watch session ended");
                exit
            }
            .instrument(span),
        );

        info!(
            session = %session_id,
            repo = %context.repo_root.display(),
            watch = %context.watch_root.display(),
            credentials = %auth.source(),
            "watch session started"
        );
        Ok(WatchSessionHandle { session_id, shutdown_tx, task: Some(task) })
    }
}

/// Run a session until Ctrl-C, then shut down gracefully.
pub async fn run_until_ctrl_c(
    config: Config,
    context: RepositoryContext,
    auth: GitAuth,
) -> Result<SchedulerExit> {

    let watch_root: PathBuf = context.watch_root.clone();
    let handle = WatchSession::start(config, context, auth)?;
    info!(path = %watch_root.display(), "watching for changes; press Ctrl-C to stop");

    tokio::signal::ctrl_c().await.context("failed to listen for Ctrl-C")?;
    info!("shutdown requested");
    handle.wait().await
}
