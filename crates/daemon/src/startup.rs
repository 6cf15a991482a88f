// Startup preflight: repository discovery, remote check, session PID file.

use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::config::{state_dir, Config};
use crate::error::AutoCommitError;
use crate::git::runner::{CommandRunner, ProcessCommandRunner};
use crate::git::worker::GitWorker;
use crate::security::{ensure_owner_only_dir, ensure_owner_only_file};

const PID_FILE_NAME: &str = "session.pid";

/// Where a watch session runs, resolved once at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RepositoryContext {
    pub repo_root: PathBuf,
    pub watch_root: PathBuf,
    /// `None` on a detached HEAD.
    pub branch: Option<String>,
    pub remote_url: Option<String>,
}

impl RepositoryContext {
    pub fn pid_path(&self) -> PathBuf {
        state_dir(&self.repo_root).join(PID_FILE_NAME)
    }
}

/// Validate that `root` can be watched and committed to.
pub fn preflight(config: &Config, root: &Path) -> Result<RepositoryContext, AutoCommitError> {
    preflight_with_runner(config, root, ProcessCommandRunner::default())
}

pub fn preflight_with_runner<R: CommandRunner + Clone>(
    config: &Config,
    root: &Path,
    runner: R,
) -> Result<RepositoryContext, AutoCommitError> {
    let root = root.canonicalize().map_err(|error| {
        AutoCommitError::repository(root, format!("directory is not accessible: {error}"))
    })?;
    if !root.is_dir() {
        return Err(AutoCommitError::repository(&root, "not a directory"));
    }

    let worker = GitWorker::with_runner(&root, runner.clone());
    let repo_root = worker.toplevel().map_err(|error| {
        let detail = format!("not inside a git repository ({})", error.detail());
        AutoCommitError::repository(&root, detail)
    })?;

    let watch_root = {
        let requested = repo_root.join(&config.monitoring.watch_directory);
        requested.canonicalize().map_err(|error| {
            let detail = format!("watch directory is not accessible: {error}");
            AutoCommitError::repository(&requested, detail)
        })?
    };
    if !watch_root.starts_with(&repo_root) {
        return Err(AutoCommitError::repository(
            &watch_root,
            "watch directory is outside the repository",
        ));
    }

    let git = GitWorker::with_runner(&repo_root, runner);
    let branch = git.current_branch()?;
    let remote = config.git.remote.as_str();
    let remote_url = git.remote_url(remote)?;

    if remote_url.is_none() && config.needs_remote() {
        return Err(AutoCommitError::repository(
            &repo_root,
            format!("remote `{remote}` is not configured (needed for push and conflict checks)"),
        ));
    }

    match &branch {
        Some(branch) if !config.branch.allows(branch) => {
            warn!(branch = %branch, "current branch is not in the allow-list; commits are held")
        }
        None => warn!("HEAD is detached; changes will not be committed"),
        _ => {}
    }

    info!(
        repo = %repo_root.display(),
        watch = %watch_root.display(),
        branch = branch.as_deref().unwrap_or("(detached)"),
        remote = remote_url.as_deref().unwrap_or("(none)"),
        "preflight passed"
    );

    Ok(RepositoryContext { repo_root, watch_root, branch, remote_url })
}

/// Record the session's PID under the repository state directory.
pub fn write_pid_file(path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
        ensure_owner_only_dir(dir)?;
    }
    let pid = std::process::id();
    let mut file = fs::File::create(path).context("failed to create PID file")?;
    write!(file, "{pid}").context("failed to write PID")?;
    ensure_owner_only_file(path)?;
    info!(pid, path = %path.display(), "wrote PID file");
    Ok(())
}

/// PID of a recorded session, if the file exists and parses.
pub fn read_pid_file(path: &Path) -> Option<u32> {
    fs::read_to_string(path).ok()?.trim().parse().ok()
}

/// Remove the PID file on shutdown.
pub fn remove_pid_file(path: &Path) {
    if let Err(e) = fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            warn!(error = %e, "failed to remove PID file");
        }
    }
}
