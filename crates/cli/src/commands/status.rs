// `autocommit status`: branch, pending changes and a dry-run commit message.

use std::path::PathBuf;

use anyhow::Context;
use autocommit_daemon::config::{state_dir, Config};
use autocommit_daemon::git::message::{self, MessageSettings};
use autocommit_daemon::git::plan::CommitPlan;
use autocommit_daemon::git::worker::{GitWorker, StatusEntry};
use autocommit_daemon::startup::read_pid_file;
use autocommit_daemon::watcher::filter::{FileChangeFilter, FsMetadata};
use chrono::Local;
use clap::Args;
use serde::Serialize;

use super::{load_config_readonly, resolve_root};
use crate::output::{self, OutputFormat};
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct StatusArgs {
    /// Repository to inspect (defaults to current directory).
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub repo_root: String,
    pub branch: Option<String>,
    pub branch_allowed: bool,
    pub remote: String,
    pub remote_url: Option<String>,
    pub auto_push: bool,
    pub session_pid: Option<u32>,
    pub pending: Vec<PendingFile>,
    /// Message the next commit would get, if anything is pending.
    pub next_message: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendingFile {
    pub path: String,
    pub kind: String,
}

pub fn run(args: StatusArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    crate::init_tracing(global.verbose);
    let format = OutputFormat::detect(args.json);

    match collect(args.path, global) {
        Ok(report) => {
            output::print_output(format, &report, format_human)?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn collect(path: Option<PathBuf>, global: &GlobalArgs) -> anyhow::Result<StatusReport> {
    let root = resolve_root(path)?;
    let config = load_config_readonly(global, &root)?;

    let worker = GitWorker::new(&root);
    let repo_root = worker.toplevel().context("not inside a git repository")?;
    let git = GitWorker::new(&repo_root);

    let branch = git.current_branch()?;
    let remote_url = git.remote_url(&config.git.remote)?;
    let watch_root = repo_root.join(&config.monitoring.watch_directory);
    let filter = FileChangeFilter::new(&watch_root, &config.monitoring)?;
    let status: Vec<StatusEntry> = git
        .status()?
        .into_iter()
        .filter(|entry| filter.should_include(&repo_root.join(&entry.path), &FsMetadata))
        .collect();

    let session_pid = read_pid_file(&state_dir(&repo_root).join("session.pid"));
    let root = repo_root.display().to_string();
    Ok(build_report(&config, root, branch, remote_url, session_pid, &status))
}

fn build_report(
    config: &Config,
    repo_root: String,
    branch: Option<String>,
    remote_url: Option<String>,
    session_pid: Option<u32>,
    status: &[StatusEntry],
) -> StatusReport {
    let branch_allowed = branch.as_deref().is_some_and(|name| config.branch.allows(name));
    let plan = branch.as_deref().and_then(|name| CommitPlan::from_status(status, name));
    let next_message = plan.as_ref().map(|plan| {
        let settings = MessageSettings::from(&config.commit);
        let now = Local::now().naive_local();
        message::generate(plan.change_type, &plan.file_names(), &settings, now)
    });

    StatusReport {
        repo_root,
        branch,
        branch_allowed,
        remote: config.git.remote.clone(),
        remote_url,
        auto_push: config.git.auto_push,
        session_pid,
        pending: status
            .iter()
            .map(|entry| PendingFile { path: entry.path.clone(), kind: entry.kind.to_string() })
            .collect(),
        next_message,
    }
}

fn format_human(report: &StatusReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!("Repository: {}", report.repo_root));
    match &report.branch {
        Some(branch) if report.branch_allowed => lines.push(format!("  Branch: {branch}")),
        Some(branch) => lines.push(format!("  Branch: {branch} (not allowed, commits are held)")),
        None => lines.push("  Branch: detached HEAD (commits are held)".into()),
    }
    let url = report.remote_url.as_deref().unwrap_or("not configured");
    let push = if report.auto_push { "push on" } else { "push off" };
    lines.push(format!("  Remote: {} ({url}, {push})", report.remote));
    match report.session_pid {
        Some(pid) => lines.push(format!("  Session: running (pid {pid})")),
        None => lines.push("  Session: not running".into()),
    }

    if report.pending.is_empty() {
        lines.push("  No pending changes.".into());
    } else {
        lines.push(format!("  Pending changes ({})", report.pending.len()));
        for file in &report.pending {
            lines.push(format!("    {:<9} {}", file.kind, file.path));
        }
    }
    if let Some(message) = &report.next_message {
        lines.push(String::new());
        lines.push(format!("  Next commit: {message}"));
    }

    lines.join("\n")
}
