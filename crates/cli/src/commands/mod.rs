// CLI subcommand dispatch.

use std::path::{Path, PathBuf};

use anyhow::Context;
use autocommit_daemon::config::{default_config_path, Config};
use clap::Subcommand;

use crate::GlobalArgs;

pub mod init_config;
pub mod start;
pub mod status;
pub mod test_auth;

#[derive(Subcommand)]
pub enum Command {
    /// Watch the repository and commit changes until Ctrl-C
    Start(start::StartArgs),
    /// Check that the configured remote accepts our credentials
    TestAuth(test_auth::TestAuthArgs),
    /// Write the default configuration file
    InitConfig(init_config::InitConfigArgs),
    /// Show branch, pending changes and the commit message they would get
    Status(status::StatusArgs),
}

pub fn run(cmd: Command, global: &GlobalArgs) -> anyhow::Result<()> {
    match cmd {
        Command::Start(args) => start::run(args, global),
        Command::TestAuth(args) => test_auth::run(args, global),
        Command::InitConfig(args) => init_config::run(args, global),
        Command::Status(args) => status::run(args, global),
    }
}

/// The directory a command operates on: `path` or the current directory.
pub(crate) fn resolve_root(path: Option<PathBuf>) -> anyhow::Result<PathBuf> {
    match path {
        Some(path) => Ok(path),
        None => std::env::current_dir().context("failed to determine current directory"),
    }
}

pub(crate) fn config_path(global: &GlobalArgs, root: &Path) -> PathBuf {
    global.config.clone().unwrap_or_else(|| default_config_path(root))
}

/// Load the config without writing anything; defaults when absent.
pub(crate) fn load_config_readonly(global: &GlobalArgs, root: &Path) -> anyhow::Result<Config> {
    let path = config_path(global, root);
    if path.exists() {
        Ok(Config::load_from(&path)?)
    } else {
        Ok(Config::default())
    }
}
