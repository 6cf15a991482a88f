// Commit scheduler: debounce accepted changes, then flush them as one commit.
//
// Events re-arm a single quiet-period timer. When it fires, the flush runs
// on a blocking worker under an owned commit lock: drain → plan against
// live status → branch and rate gates → conflict guard → message → add,
// commit, push. At most one flush runs at a time; a firing that finds the
// lock held is skipped. When a flush finishes with changes still pending
// (kept after a gate or failure, or arrived mid-flush) the timer is re-armed.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use autocommit_common::path::relative_slash_path;
use autocommit_common::types::ChangeEvent;
use chrono::Local;
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::conflict::{ConflictGuard, ConflictSettings};
use super::message::{self, MessageSettings};
use super::plan::CommitPlan;
use super::rate_limit::CommitRateLimiter;
use super::runner::{CommandRunner, ProcessCommandRunner};
use super::worker::GitWorker;
use crate::config::Config;
use crate::error::AutoCommitError;
use crate::watcher::{
    ChangeAggregator, DebounceTimer, FileChangeFilter, FsMetadata, MetadataProvider,
    PendingChangeSet,
};

/// Result of one flush attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// No changes were pending.
    Empty,
    /// Every recorded change had already reverted or been committed.
    NothingToCommit,
    BranchNotAllowed { branch: String },
    DetachedHead,
    RateLimited,
    /// Another flush held the commit lock.
    Skipped,
    Abandoned { kind: String, error: String },
    Committed { message: String, files: usize, pushed: bool },
}

impl FlushOutcome {
    pub fn is_committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }
}

/// How the run loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerExit {
    /// Pending changes left uncommitted at shutdown.
    pub discarded: usize,
    /// An in-flight flush outlived the shutdown grace period.
    pub flush_timed_out: bool,
}

struct Inner<R: CommandRunner> {
    git: Arc<GitWorker<R>>,
    guard: ConflictGuard<R>,
    config: Config,
    repo_root: PathBuf,
    aggregator: Arc<ChangeAggregator>,
    filter: FileChangeFilter,
    metadata: Box<dyn MetadataProvider>,
    limiter: Mutex<CommitRateLimiter>,
    message: MessageSettings,
    cancel: Arc<AtomicBool>,
}

pub struct CommitScheduler<R: CommandRunner + 'static = ProcessCommandRunner> {
    inner: Arc<Inner<R>>,
    flush_lock: Arc<tokio::sync::Mutex<()>>,
    reports: Option<mpsc::UnboundedSender<FlushOutcome>>,
}

impl<R: CommandRunner + 'static> Clone for CommitScheduler<R> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            flush_lock: Arc::clone(&self.flush_lock),
            reports: self.reports.clone(),
        }
    }
}

impl<R: CommandRunner + 'static> CommitScheduler<R> {
    /// `watch_root` scopes the filter; `git.repo_path()` is the repository
    /// root that plan paths are made relative to.
    pub fn new(
        git: Arc<GitWorker<R>>,
        config: Config,
        watch_root: &Path,
    ) -> Result<Self, AutoCommitError> {
        Self::with_metadata(git, config, watch_root, Box::new(FsMetadata))
    }

    pub fn with_metadata(
        git: Arc<GitWorker<R>>,
        config: Config,
        watch_root: &Path,
        metadata: Box<dyn MetadataProvider>,
    ) -> Result<Self, AutoCommitError> {
        let cancel = Arc::new(AtomicBool::new(false));
        let guard = ConflictGuard::new(Arc::clone(&git), ConflictSettings::from_config(&config))
            .with_cancel(Arc::clone(&cancel));
        let scheduling = &config.scheduling;
        let limiter = CommitRateLimiter::new(
            scheduling.enable_rate_limiting.then_some(scheduling.max_commits_per_hour),
        );

        let inner = Inner {
            repo_root: git.repo_path().to_path_buf(),
            filter: FileChangeFilter::new(watch_root, &config.monitoring)?,
            message: MessageSettings::from(&config.commit),
            limiter: Mutex::new(limiter),
            aggregator: Arc::new(ChangeAggregator::new()),
            metadata,
            guard,
            git,
            config,
            cancel,
        };

        Ok(Self {
            inner: Arc::new(inner),
            flush_lock: Arc::new(tokio::sync::Mutex::new(())),
            reports: None,
        })
    }

    /// Send every loop flush outcome to `reports`.
    pub fn with_reports(mut self, reports: mpsc::UnboundedSender<FlushOutcome>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn aggregator(&self) -> &Arc<ChangeAggregator> {
        &self.inner.aggregator
    }

    pub fn pending(&self) -> usize {
        self.inner.aggregator.len()
    }

    /// Flag checked between conflict retries.
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.inner.cancel)
    }

    /// Filter and record one event. Returns whether it was accepted.
    pub fn record(&self, event: ChangeEvent) -> bool {
        if !self.inner.filter.should_include(&event.path, self.inner.metadata.as_ref()) {
            return false;
        }
        debug!(path = %event.path.display(), kind = %event.kind, "change recorded");
        self.inner.aggregator.record(event);
        true
    }

    /// Flush on the calling thread. Returns `Skipped` if another flush
    /// holds the commit lock.
    pub fn try_flush(&self) -> FlushOutcome {
        let Ok(_guard) = self.flush_lock.try_lock() else {
            debug!("commit already in progress, skipping flush");
            return FlushOutcome::Skipped;
        };
        let outcome = self.inner.flush_locked();
        log_outcome(&outcome);
        outcome
    }

    /// Drive the debounce loop until shutdown or until the event stream ends.
    pub async fn run(
        self,
        mut events: mpsc::Receiver<ChangeEvent>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SchedulerExit {
        let mut timer = DebounceTimer::new(self.inner.config.scheduling.commit_delay());
        let mut in_flight: Option<JoinHandle<()>> = None;
        let (done_tx, mut done_rx) = mpsc::unbounded_channel();

        info!(delay_ms = timer.window().as_millis() as u64, "commit scheduler started");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.recv() => break,
                maybe = events.recv() => match maybe {
                    Some(event) => {
                        if self.record(event) {
                            timer.arm();
                        }
                    }
                    None => {
                        debug!("event stream closed");
                        break;
                    }
                },
                Some(outcome) = done_rx.recv() => self.rearm_after(&outcome, &mut timer),
                () = timer.expired() => match self.start_flush(done_tx.clone()) {
                    Some(handle) => in_flight = Some(handle),
                    // Lock held outside this loop: no completion will re-arm.
                    None if in_flight.as_ref().is_none_or(JoinHandle::is_finished) => timer.arm(),
                    None => {}
                },
            }
        }

        self.shutdown(timer, in_flight).await
    }

    fn start_flush(&self, done: mpsc::UnboundedSender<FlushOutcome>) -> Option<JoinHandle<()>> {
        let Ok(guard) = Arc::clone(&self.flush_lock).try_lock_owned() else {
            debug!("commit already in progress, skipping this timer cycle");
            self.report(FlushOutcome::Skipped);
            return None;
        };

        let scheduler = self.clone();
        Some(tokio::task::spawn_blocking(move || {
            let outcome = {
                let _guard = guard;
                scheduler.inner.flush_locked()
            };
            log_outcome(&outcome);
            scheduler.report(outcome.clone());
            let _ = done.send(outcome);
        }))
    }

    /// Re-arm the timer if a finished flush left changes pending and no
    /// newer event has armed it already.
    fn rearm_after(&self, outcome: &FlushOutcome, timer: &mut DebounceTimer) {
        let pending = self.pending();
        if pending == 0 || timer.is_armed() {
            return;
        }
        let delay = self.retry_delay(outcome).max(timer.window());
        debug!(
            pending,
            delay_ms = delay.as_millis() as u64,
            "changes still pending after flush, re-arming"
        );
        timer.arm_after(delay);
    }

    fn retry_delay(&self, outcome: &FlushOutcome) -> Duration {
        match outcome {
            FlushOutcome::RateLimited => self
                .inner
                .limiter
                .lock()
                .expect("rate limiter lock poisoned")
                .retry_after()
                .unwrap_or_default(),
            FlushOutcome::BranchNotAllowed { .. } | FlushOutcome::DetachedHead => {
                self.inner.config.scheduling.retry_interval()
            }
            _ => Duration::ZERO,
        }
    }

    async fn shutdown(
        &self,
        mut timer: DebounceTimer,
        in_flight: Option<JoinHandle<()>>,
    ) -> SchedulerExit {
        timer.disarm();
        self.inner.cancel.store(true, Ordering::SeqCst);

        let mut flush_timed_out = false;
        if let Some(handle) = in_flight.filter(|handle| !handle.is_finished()) {
            let grace = self.inner.config.scheduling.shutdown_grace();
            info!(grace_ms = grace.as_millis() as u64, "waiting for in-flight commit");
            match tokio::time::timeout(grace, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(join_error)) => error!(error = %join_error, "flush worker failed"),
                Err(_) => {
                    warn!("in-flight commit did not finish within the shutdown grace period");
                    flush_timed_out = true;
                }
            }
        }

        let discarded = self.pending();
        if discarded > 0 {
            warn!(discarded, "shutting down with uncommitted changes");
        }
        info!("commit scheduler stopped");
        SchedulerExit { discarded, flush_timed_out }
    }

    fn report(&self, outcome: FlushOutcome) {
        if let Some(reports) = &self.reports {
            let _ = reports.send(outcome);
        }
    }
}

impl<R: CommandRunner> Inner<R> {
    /// Body of a flush. Caller holds the commit lock.
    fn flush_locked(&self) -> FlushOutcome {
        let drained = self.aggregator.drain_all();
        if drained.is_empty() {
            return FlushOutcome::Empty;
        }

        let recorded = self.relative_paths(&drained);

        let branch = match self.git.current_branch() {
            Ok(Some(branch)) => branch,
            Ok(None) => {
                warn!(files = drained.len(), "detached HEAD, not committing");
                self.keep(drained);
                return FlushOutcome::DetachedHead;
            }
            Err(error) => return self.abandon(drained, "unknown", error.into()),
        };

        let status = match self.git.status() {
            Ok(status) => status,
            Err(error) => return self.abandon(drained, &branch, error.into()),
        };
        let Some(mut plan) = CommitPlan::build(&recorded, &status, &branch) else {
            debug!(
                branch = %branch,
                recorded = recorded.len(),
                "recorded changes no longer differ from HEAD"
            );
            return FlushOutcome::NothingToCommit;
        };

        if !self.config.branch.allows(&branch) {
            info!(
                branch = %branch,
                files = plan.files.len(),
                "branch not in allow-list, not committing"
            );
            self.keep(drained);
            return FlushOutcome::BranchNotAllowed { branch };
        }

        if !self.limiter.lock().expect("rate limiter lock poisoned").allows() {
            info!(
                branch = %branch,
                files = plan.files.len(),
                max_per_hour = self.config.scheduling.max_commits_per_hour,
                "commit rate limit reached"
            );
            self.keep(drained);
            return FlushOutcome::RateLimited;
        }

        if self.config.conflict.enabled {
            let target = self.config.git.target_branch().unwrap_or(&branch);
            match self.guard.resolve(Some(target), self.config.conflict.max_retry_attempts) {
                Ok(resolution) if resolution.moved_head() => {
                    info!(
                        branch = %branch,
                        outcome = %resolution.message,
                        "re-reading status after resolution"
                    );
                    let status = match self.git.status() {
                        Ok(status) => status,
                        Err(error) => return self.abandon(drained, &branch, error.into()),
                    };
                    match CommitPlan::build(&recorded, &status, &branch) {
                        Some(rebuilt) => plan = rebuilt,
                        None => return FlushOutcome::NothingToCommit,
                    }
                }
                Ok(_) => {}
                Err(error) => return self.abandon(drained, &branch, error),
            }
        }

        let message = message::generate(
            plan.change_type,
            &plan.file_names(),
            &self.message,
            Local::now().naive_local(),
        );

        if let Err(error) = self.git.add_paths(&plan.stage_paths()) {
            return self.abandon(drained, &branch, error.into());
        }
        if let Err(error) = self.git.commit(&message) {
            return self.abandon(drained, &branch, error.into());
        }
        self.limiter.lock().expect("rate limiter lock poisoned").record();
        info!(branch = %branch, files = plan.files.len(), message = %message, "committed");

        let pushed = self.config.git.auto_push && self.push(&branch);
        FlushOutcome::Committed { message, files: plan.files.len(), pushed }
    }

    fn push(&self, branch: &str) -> bool {
        let remote = self.config.git.remote.as_str();
        match self.git.push(remote, branch) {
            Ok(_) => {
                info!(remote = %remote, branch = %branch, "pushed");
                true
            }
            Err(error) => {
                let error = AutoCommitError::connectivity(remote, &error);
                warn!(
                    branch = %branch,
                    command = error.command().unwrap_or("git push"),
                    error = %error,
                    "push failed, commit kept locally"
                );
                false
            }
        }
    }

    fn relative_paths(&self, drained: &PendingChangeSet) -> BTreeSet<String> {
        drained
            .paths()
            .filter_map(|path| match relative_slash_path(path, &self.repo_root) {
                Ok(relative) => Some(relative),
                Err(error) => {
                    warn!(
                        path = %path.display(),
                        error = %error,
                        "dropping change outside repository"
                    );
                    None
                }
            })
            .collect()
    }

    fn keep(&self, drained: PendingChangeSet) {
        if self.config.scheduling.retain_skipped_changes {
            self.aggregator.restore(drained);
        }
    }

    fn abandon(
        &self,
        drained: PendingChangeSet,
        branch: &str,
        error: AutoCommitError,
    ) -> FlushOutcome {
        warn!(
            branch = %branch,
            files = drained.len(),
            kind = error.kind(),
            command = error.command().unwrap_or("-"),
            error = %error,
            "flush abandoned"
        );
        self.keep(drained);
        FlushOutcome::Abandoned { kind: error.kind().to_string(), error: error.to_string() }
    }
}

fn log_outcome(outcome: &FlushOutcome) {
    match outcome {
        FlushOutcome::Empty | FlushOutcome::Skipped => debug!(?outcome, "flush finished"),
        FlushOutcome::Committed { pushed, .. } => debug!(pushed, "flush finished"),
        _ => info!(?outcome, "flush finished"),
    }
}
