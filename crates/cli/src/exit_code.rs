// Consistent exit codes for the autocommit CLI.
//
//   0  = success
//   1  = general error
//   2  = usage/argument error
//   3  = invalid configuration
//   10 = not a git repository
//   11 = authentication error
//   12 = unresolved conflict
//   13 = network error

use std::process;

use autocommit_daemon::config::ConfigError;
use autocommit_daemon::error::AutoCommitError;

/// Named exit codes for the CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    Error = 1,
    Usage = 2,
    Config = 3,
    NotRepository = 10,
    Auth = 11,
    Conflict = 12,
    Network = 13,
}

/// Substrings git prints when the remote rejects credentials.
const AUTH_MARKERS: &[&str] = &[
    "authentication failed",
    "could not read username",
    "permission denied (publickey",
    "invalid username or password",
    "403",
    "401",
];

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    /// Map an anyhow error to an exit code by inspecting the error chain.
    pub fn from_error(err: &anyhow::Error) -> Self {
        for cause in err.chain() {
            if let Some(error) = cause.downcast_ref::<AutoCommitError>() {
                return Self::from_autocommit_error(error);
            }
            if cause.downcast_ref::<ConfigError>().is_some() {
                return Self::Config;
            }
        }
        Self::Error
    }

    pub fn from_autocommit_error(error: &AutoCommitError) -> Self {
        match error {
            AutoCommitError::Config(_) => Self::Config,
            AutoCommitError::Repository { .. } => Self::NotRepository,
            AutoCommitError::Connectivity { detail, .. } => {
                let lower = detail.to_ascii_lowercase();
                if AUTH_MARKERS.iter().any(|marker| lower.contains(marker)) {
                    Self::Auth
                } else {
                    Self::Network
                }
            }
            AutoCommitError::Conflict { .. } => Self::Conflict,
            AutoCommitError::Command(_) => Self::Error,
        }
    }

    /// Exit the process with this code.
    pub fn exit(self) -> ! {
        process::exit(self.code())
    }
}

impl From<ExitCode> for process::ExitCode {
    fn from(code: ExitCode) -> Self {
        process::ExitCode::from(code.code() as u8)
    }
}
