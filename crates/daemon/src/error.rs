// Error taxonomy for the auto-commit engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::config::ConfigError;
use crate::git::worker::GitCommandError;

#[derive(Debug, Error)]
pub enum AutoCommitError {
    /// Missing, malformed or invalid configuration. Fatal at startup.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The watch root is not usable as a repository. Fatal at startup.
    #[error("repository error at {}: {reason}", path.display())]
    Repository { path: PathBuf, reason: String },

    /// The remote could not be reached. Logged and retried next cycle.
    #[error("cannot reach remote `{remote}` ({command}): {detail}")]
    Connectivity { remote: String, command: String, detail: String },

    /// Divergent history that bounded resolution could not settle.
    #[error("unresolved conflict on `{branch}` after {attempts} attempt(s): {detail}")]
    Conflict { branch: String, attempts: u32, detail: String },

    /// A git subprocess failed unexpectedly.
    #[error(transparent)]
    Command(#[from] GitCommandError),
}

impl AutoCommitError {
    pub fn repository(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Repository { path: path.into(), reason: reason.into() }
    }

    pub fn connectivity(remote: &str, error: &GitCommandError) -> Self {
        Self::Connectivity {
            remote: remote.to_string(),
            command: error.command().unwrap_or("git").to_string(),
            detail: error.detail(),
        }
    }

    /// Errors that stop the process instead of abandoning one cycle.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Repository { .. })
    }

    /// Short machine-readable kind for logs and JSON output.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Repository { .. } => "repository",
            Self::Connectivity { .. } => "connectivity",
            Self::Conflict { .. } => "conflict",
            Self::Command(_) => "command",
        }
    }

    /// The git command line involved, when there is one.
    pub fn command(&self) -> Option<&str> {
        match self {
            Self::Connectivity { command, .. } => Some(command),
            Self::Command(error) => error.command(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fetch_failure() -> GitCommandError {
        GitCommandError::CommandFailed {
            command: "git fetch origin".into(),
            code: Some(128),
            stderr: "fatal: unable to access 'https://example.com/': Could not resolve host\n"
                .into(),
        }
    }

    #[test]
    fn connectivity_keeps_command_and_detail() {
        let err = AutoCommitError::connectivity("origin", &fetch_failure());
        assert_eq!(err.kind(), "connectivity");
        assert_eq!(err.command(), Some("git fetch origin"));
        assert!(err.to_string().contains("Could not resolve host"));
        assert!(!err.is_fatal());
    }

    #[test]
    fn setup_errors_are_fatal() {
        assert!(AutoCommitError::repository("/tmp/x", "not a git repository").is_fatal());
        assert!(AutoCommitError::from(ConfigError::Invalid("bad".into())).is_fatal());
    }

    #[test]
    fn cycle_errors_are_not_fatal() {
        let conflict = AutoCommitError::Conflict {
            branch: "main".into(),
            attempts: 3,
            detail: "diverged".into(),
        };

        assert!(!conflict.is_fatal());
        assert!(conflict.to_string().contains("after 3 attempt(s)"));
        assert!(!AutoCommitError::from(fetch_failure()).is_fatal());
    }

    #[test]
    fn repository_message_names_path() {
        let err = AutoCommitError::repository("/work/site", "missing remote `origin`");
        assert_eq!(err.to_string(), "repository error at /work/site: missing remote `origin`");
    }
}
