// `autocommit start`: watch a repository until Ctrl-C.

use std::path::PathBuf;

use anyhow::Context;
use autocommit_daemon::config::Config;
use autocommit_daemon::git::auth::{test_connection, GitAuth};
use autocommit_daemon::git::worker::GitWorker;
use autocommit_daemon::runtime::run_until_ctrl_c;
use autocommit_daemon::startup::{preflight, RepositoryContext};
use clap::Args;
use serde::Serialize;
use tracing::info;

use super::{config_path, resolve_root};
use crate::output::{self, OutputFormat};
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct StartArgs {
    /// Repository to watch (defaults to current directory).
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct SessionSummary {
    repo_root: String,
    discarded_changes: usize,
    flush_timed_out: bool,
}

pub fn run(args: StartArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let format = OutputFormat::Human;
    let result = start(args, global);
    if let Err(error) = &result {
        output::print_anyhow_error(format, error);
    }
    result
}

fn start(args: StartArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    let root = resolve_root(args.path)?;
    let path = config_path(global, &root);
    let (config, created) = Config::load_or_init(&path)?;
    crate::init_tracing(global.verbose || config.debug);
    if created {
        info!(path = %path.display(), "wrote default configuration");
    }

    let context = preflight(&config, &root)?;
    let auth = GitAuth::resolve(&config.auth, &context.repo_root)?;
    if config.needs_remote() {
        check_remote(&config, &context, &auth);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let repo_root = context.repo_root.display().to_string();
    let exit = runtime.block_on(run_until_ctrl_c(config, context, auth))?;

    let summary = SessionSummary {
        repo_root,
        discarded_changes: exit.discarded,
        flush_timed_out: exit.flush_timed_out,
    };
    output::print_output(OutputFormat::Human, &summary, format_human)?;
    Ok(())
}

/// A failed connection check is only a warning; pushes retry every cycle.
fn check_remote(config: &Config, context: &RepositoryContext, auth: &GitAuth) {
    let git = GitWorker::new(&context.repo_root).with_env(auth.env().to_vec());
    match test_connection(&git, &config.git.remote) {
        Ok(heads) => info!(remote = %config.git.remote, heads, "remote reachable"),
        Err(error) => output::print_warning(
            OutputFormat::Human,
            "REMOTE_UNREACHABLE",
            &format!("{error}; commits will stay local until the remote is reachable"),
        ),
    }
}

fn format_human(summary: &SessionSummary) -> String {
    let mut lines = vec![format!("Stopped watching {}", summary.repo_root)];
    if summary.discarded_changes > 0 {
        lines.push(format!(
            "  {} uncommitted change(s) were left in the working tree",
            summary.discarded_changes
        ));
    }
    if summary.flush_timed_out {
        lines.push("  A commit was still running at exit; check `git status`".into());
    }
    lines.join("\n")
}
