// `autocommit init-config`: write the default configuration file.

use std::path::{Path, PathBuf};

use anyhow::bail;
use autocommit_daemon::config::Config;
use clap::Args;
use serde::Serialize;

use super::{config_path, resolve_root};
use crate::output::{self, OutputFormat};
use crate::GlobalArgs;

#[derive(Debug, Args)]
pub struct InitConfigArgs {
    /// Repository to configure (defaults to current directory).
    #[arg(value_name = "PATH")]
    path: Option<PathBuf>,

    /// Overwrite an existing file.
    #[arg(long)]
    force: bool,

    /// Force JSON output.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct InitResult {
    path: String,
    overwritten: bool,
}

pub fn run(args: InitConfigArgs, global: &GlobalArgs) -> anyhow::Result<()> {
    crate::init_tracing(global.verbose);
    let format = OutputFormat::detect(args.json);

    let result = resolve_root(args.path)
        .and_then(|root| write_default(&config_path(global, &root), args.force));

    match result {
        Ok(result) => {
            output::print_output(format, &result, |r| format!("Wrote {}", r.path))?;
            Ok(())
        }
        Err(error) => {
            output::print_anyhow_error(format, &error);
            Err(error)
        }
    }
}

fn write_default(path: &Path, force: bool) -> anyhow::Result<InitResult> {
    let exists = path.exists();
    if exists && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }
    Config::default().save_to(path)?;
    Ok(InitResult { path: path.display().to_string(), overwritten: exists })
}
