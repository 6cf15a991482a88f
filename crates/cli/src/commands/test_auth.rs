// `autocommit test-auth`: check the remote with the configured credentials.

use std::path::PathBuf;

use anyhow::Context;
use autocommit_daemon::config::AuthMethod;
use autocommit_daemon::error::AutoCommitError;
use autocommit_daemon::git::auth::{test_connection, GitAuth};
use autocommit_daemon::git::worker::GitWorker;
use clap::Args;
use serde::Serialize;

use super::{load_config_readonly, resolve_root};
use crate::output::{self, OutputFormat};
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct TestAuthArgs {
    /// Repository whose remote to test (defaults to current directory).
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct AuthReport {
    remote: String,
    url: Option<String>,
    method: AuthMethod,
    source: String,
    heads: usize,
}

pub fn run(args: TestAuthArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    crate::init_tracing(global.verbose);
    let format = OutputFormat::detect(args.json);

    match check_auth(args.path, global) {
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

fn check_auth(path: Option<PathBuf>, global: &GlobalArgs) -> anyhow::Result<AuthReport> {
    let root = resolve_root(path)?;
    let config = load_config_readonly(global, &root)?;
    let repo_root = GitWorker::new(&root)
        .toplevel()
        .map_err(|_| AutoCommitError::repository(&root, "not inside a git repository"))?;

    let auth = GitAuth::resolve(&config.auth, &repo_root).context("failed to resolve credentials")?;
    let git = GitWorker::new(&repo_root).with_env(auth.env().to_vec());
    let remote = config.git.remote.clone();
    let url = git.remote_url(&remote)?;
    if url.is_none() {
        let detail = format!("remote `{remote}` is not configured");
        return Err(AutoCommitError::repository(&repo_root, detail).into());
    }

    let heads = test_connection(&git, &remote)?;
    Ok(AuthReport { remote, url, method: auth.method(), source: auth.source().to_string(), heads })
}

fn method_label(method: AuthMethod) -> &'static str {
    match method {
        AuthMethod::Token => "token",
        AuthMethod::Ssh => "ssh key",
        AuthMethod::None => "git defaults",
    }
}

fn format_human(report: &AuthReport) -> String {
    let url = report.url.as_deref().unwrap_or("?");
    [
        format!("Remote `{}` is reachable ({url})", report.remote),
        format!("  Credentials: {} via {}", method_label(report.method), report.source),
        format!("  Branches on remote: {}", report.heads),
    ]
    .join("\n")
}
